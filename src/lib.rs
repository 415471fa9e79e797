//! Media Stream Gateway
//!
//! An HTTP gateway that serves media stored behind a remote chunked-object API
//! as ordinary HTTP resources, with full support for byte-range requests.
//!
//! # Overview
//!
//! A client asks for `/stream/{container}/{object}`. The gateway picks a
//! worker (one authenticated session to the remote API), resolves the object's
//! metadata through a TTL cache, frames a `200` or `206` response from the
//! client's `Range` header, and then streams exactly the requested bytes by
//! fetching aligned fixed-size blocks from the remote API and slicing them.
//!
//! # Features
//!
//! - **Byte-range streaming**: `bytes=a-b`, `bytes=a-` and `bytes=-n` with correct `Content-Range`
//! - **Aligned block fetches**: every remote read starts on a block boundary
//! - **Metadata caching**: resolutions are cached per worker identity with a TTL
//! - **Worker pool**: round-robin over several remote sessions
//! - **Peer directories**: container access handles persisted per worker
//! - **Metrics**: Prometheus text exposition on `/metrics`
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use media_stream::{AppState, Server, StreamConfig, WorkerPool};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StreamConfig::from_file("media_stream.yaml")?;
//! let pool = WorkerPool::from_config(&config)?;
//! let state = Arc::new(AppState::new(&config, pool)?);
//!
//! let server = Server::bind(config.listen_address.parse()?, state).await?;
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`WorkerPool`]: hands out workers round-robin
//! - [`MetadataResolver`]: resolves and caches [`MediaFile`] descriptions
//! - [`resolve_peer`]: turns a container id into an addressable peer
//! - [`ResponseFramer`]: decides status and headers from the `Range` header
//! - [`ChunkedReader`]: streams an exact byte window as aligned block fetches
//! - [`Server`]: hyper HTTP/1.1 front end
//!
//! # Configuration
//!
//! ```yaml
//! listen_address: "0.0.0.0:8080"
//! block_size: 1048576
//! cache:
//!   ttl_secs: 3600
//! workers:
//!   - name: primary
//!     base_url: "http://127.0.0.1:8081"
//!     token: "secret"
//!     identity: 1001
//! ```
//!
//! See [`StreamConfig`] for every option.

pub mod block_calculator;
pub mod chunked_reader;
pub mod config;
pub mod error;
pub mod metadata_cache;
pub mod metadata_resolver;
pub mod metrics;
pub mod metrics_endpoint;
pub mod models;
pub mod peer_directory;
pub mod peer_resolver;
pub mod range_parser;
pub mod remote;
pub mod response_framer;
pub mod server;
pub mod stream_handler;
pub mod worker_metrics;
pub mod worker_pool;

// Re-export commonly used types
pub use block_calculator::BlockCalculator;
pub use chunked_reader::ChunkedReader;
pub use config::StreamConfig;
pub use error::{Result, StreamError};
pub use metadata_cache::MetadataCache;
pub use metadata_resolver::MetadataResolver;
pub use metrics::{MetricsSnapshot, StreamMetrics};
pub use metrics_endpoint::MetricsEndpoint;
pub use models::{BlockSpec, ByteRange, FileLocation, MediaFile};
pub use peer_directory::{MemoryPeerDirectory, PeerDirectory};
pub use peer_resolver::resolve_peer;
pub use remote::{HttpRemoteClient, MemoryRemoteClient, RemoteClient};
pub use response_framer::{Disposition, ResponseFramer};
pub use server::Server;
pub use stream_handler::{handle_request, AppState, ResponseBody};
pub use worker_metrics::WorkerMetrics;
pub use worker_pool::{Worker, WorkerPool};
