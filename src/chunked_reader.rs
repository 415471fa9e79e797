//! Chunked remote reader
//!
//! Turns an inclusive byte window of a remote object into a lazy sequence of
//! block-aligned fetches. Fetches run strictly one after another and only one
//! block is held at a time; the caller pulls the next chunk when it is ready
//! for more bytes.

use crate::block_calculator::BlockCalculator;
use crate::error::{Result, StreamError};
use crate::metrics::StreamMetrics;
use crate::models::{BlockSpec, FileLocation};
use crate::remote::{BlockPayload, RemoteClient};
use crate::worker_metrics::WorkerMetrics;
use bytes::Bytes;
use futures::Stream;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Lazy, forward-only reader over `[start, end]` of a remote object
pub struct ChunkedReader {
    client: Arc<dyn RemoteClient>,
    location: FileLocation,
    calculator: BlockCalculator,
    /// Next absolute byte to deliver
    cursor: u64,
    end: u64,
    total_length: u64,
    delivered: u64,
    next_index: usize,
    finished: bool,
    timeout: Option<Duration>,
    metrics: Option<Arc<StreamMetrics>>,
    worker_metrics: Option<(Arc<WorkerMetrics>, String)>,
}

impl ChunkedReader {
    /// Create a reader for the inclusive window `[start, end]`
    ///
    /// `total_length` must equal `end - start + 1`.
    pub fn new(
        client: Arc<dyn RemoteClient>,
        location: FileLocation,
        start: u64,
        end: u64,
        total_length: u64,
        block_size: usize,
    ) -> Result<Self> {
        if start > end {
            return Err(StreamError::InvalidRange(format!(
                "start ({}) must be <= end ({})",
                start, end
            )));
        }
        if end - start + 1 != total_length {
            return Err(StreamError::InvalidRange(format!(
                "window {}-{} holds {} bytes, not {}",
                start,
                end,
                end - start + 1,
                total_length
            )));
        }
        if block_size == 0 {
            return Err(StreamError::ConfigError(
                "block size must be greater than 0".to_string(),
            ));
        }

        Ok(ChunkedReader {
            client,
            location,
            calculator: BlockCalculator::new(block_size),
            cursor: start,
            end,
            total_length,
            delivered: 0,
            next_index: 0,
            finished: false,
            timeout: None,
            metrics: None,
            worker_metrics: None,
        })
    }

    /// Fail a block fetch that takes longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<StreamMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Attribute block fetches to the named worker
    pub fn with_worker_metrics(mut self, metrics: Arc<WorkerMetrics>, worker: impl Into<String>) -> Self {
        self.worker_metrics = Some((metrics, worker.into()));
        self
    }

    /// Bytes delivered so far
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Fetch the next chunk
    ///
    /// # Returns
    /// * `Ok(Some(bytes))` for the next non-empty chunk
    /// * `Ok(None)` once the window is exhausted, or after an error
    /// * `Err(_)` if the remote fetch failed or returned too little data
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.finished || self.delivered >= self.total_length {
            return Ok(None);
        }

        let block = self
            .calculator
            .block_at(self.next_index, self.cursor, self.end);

        match self.read_block(&block).await {
            Ok(chunk) => {
                self.cursor += block.take as u64;
                self.delivered += block.take as u64;
                self.next_index += 1;
                if self.delivered >= self.total_length {
                    self.finished = true;
                }
                Ok(Some(chunk))
            }
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }

    async fn read_block(&self, block: &BlockSpec) -> Result<Bytes> {
        let limit = self.calculator.block_size();
        let started = Instant::now();
        let result = fetch_payload(
            self.client.as_ref(),
            &self.location,
            block.offset,
            limit,
            self.timeout,
        )
        .await;
        self.observe_fetch(result.is_ok(), started.elapsed());

        let data = result?;
        if let Some(metrics) = &self.metrics {
            metrics.record_bytes_from_remote(data.len() as u64);
        }

        let needed = block.skip + block.take;
        if data.len() < needed {
            warn!(
                "Short block: media={}, offset={}, got={}, needed={}",
                self.location.id(),
                block.offset,
                data.len(),
                needed
            );
            return Err(StreamError::TruncatedStream {
                expected: self.total_length,
                delivered: self.delivered,
            });
        }

        debug!(
            "Block {} delivered: offset={}, skip={}, take={}",
            block.index, block.offset, block.skip, block.take
        );
        Ok(data.slice(block.skip..needed))
    }

    fn observe_fetch(&self, success: bool, elapsed: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.record_block_fetch(success, elapsed);
        }
        if let Some((metrics, worker)) = &self.worker_metrics {
            metrics.record_block_fetch(worker, success, elapsed.as_secs_f64());
        }
    }

    /// Expose the reader as a stream of chunks
    ///
    /// The stream ends after the last chunk or after the first error.
    /// Dropping it drops any in-flight fetch.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
        futures::stream::unfold(self, |mut reader| async move {
            match reader.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), reader)),
                Ok(None) => None,
                Err(e) => Some((Err(e), reader)),
            }
        })
    }
}

/// Fetch an object of unknown size with a single bounded request
///
/// Used for photos, whose size is not known up front. The payload is
/// returned as-is, up to `limit` bytes.
pub async fn fetch_whole(
    client: &dyn RemoteClient,
    location: &FileLocation,
    limit: usize,
    timeout: Option<Duration>,
) -> Result<Bytes> {
    let data = fetch_payload(client, location, 0, limit, timeout).await?;
    debug!("Fetched whole object: media={}, size={}", location.id(), data.len());
    Ok(data)
}

async fn fetch_payload(
    client: &dyn RemoteClient,
    location: &FileLocation,
    offset: u64,
    limit: usize,
    timeout: Option<Duration>,
) -> Result<Bytes> {
    let fetch = client.fetch_block(location, offset, limit as u32);
    let result = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, fetch).await.map_err(|_| {
            StreamError::RemoteFetchError(format!(
                "block fetch at offset {} timed out after {:?}",
                offset, timeout
            ))
        })?,
        None => fetch.await,
    };

    let payload = result.map_err(|e| {
        warn!(
            "Block fetch failed: media={}, offset={}, error={}",
            location.id(),
            offset,
            e
        );
        match e {
            StreamError::RemoteFetchError(_) => e,
            other => StreamError::RemoteFetchError(other.to_string()),
        }
    })?;

    match payload {
        BlockPayload::Bytes(data) => Ok(data),
        BlockPayload::CdnRedirect { location: target } => {
            Err(StreamError::UnexpectedResponseShape(format!(
                "block at offset {} redirected to CDN {}",
                offset, target
            )))
        }
    }
}
