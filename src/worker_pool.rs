//! Pool of interchangeable remote API workers
//!
//! Each worker is one authenticated session with the remote API plus the
//! peer directory scoped to that session. Selection is round-robin over an
//! atomic counter and never blocks.

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::peer_directory::{MemoryPeerDirectory, PeerDirectory};
use crate::remote::{HttpRemoteClient, RemoteClient};
use crate::worker_metrics::WorkerMetrics;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One authenticated handle to the remote API
pub struct Worker {
    pub index: usize,
    pub name: String,
    /// Remote identity of the session; scopes location handles and cache keys
    pub identity: i64,
    pub client: Arc<dyn RemoteClient>,
    pub directory: Arc<dyn PeerDirectory>,
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        identity: i64,
        client: Arc<dyn RemoteClient>,
        directory: Arc<dyn PeerDirectory>,
    ) -> Self {
        Worker {
            index: 0,
            name: name.into(),
            identity,
            client,
            directory,
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("identity", &self.identity)
            .finish()
    }
}

/// Round-robin pool of workers
pub struct WorkerPool {
    workers: Vec<Arc<Worker>>,
    next: AtomicUsize,
    metrics: Option<Arc<WorkerMetrics>>,
}

impl WorkerPool {
    /// Create a pool; workers are re-indexed in the given order
    ///
    /// # Returns
    /// * `Err(StreamError::ConfigError)` if `workers` is empty
    pub fn new(workers: Vec<Worker>) -> Result<Self> {
        if workers.is_empty() {
            return Err(StreamError::ConfigError(
                "worker pool requires at least one worker".to_string(),
            ));
        }

        let workers = workers
            .into_iter()
            .enumerate()
            .map(|(index, mut worker)| {
                worker.index = index;
                Arc::new(worker)
            })
            .collect();

        Ok(WorkerPool {
            workers,
            next: AtomicUsize::new(0),
            metrics: None,
        })
    }

    /// Build a pool of HTTP bridge workers from configuration
    ///
    /// When `peer_directory_path` is set, each worker's directory is persisted
    /// to `<path>/<worker name>.json`.
    pub fn from_config(config: &StreamConfig) -> Result<Self> {
        let mut workers = Vec::with_capacity(config.workers.len());

        for worker_config in &config.workers {
            let client = HttpRemoteClient::new(&worker_config.base_url, &worker_config.token)?;
            let directory: Arc<dyn PeerDirectory> = match &config.peer_directory_path {
                Some(dir) => Arc::new(MemoryPeerDirectory::open(
                    Path::new(dir).join(format!("{}.json", worker_config.name)),
                )?),
                None => Arc::new(MemoryPeerDirectory::new()),
            };

            info!(
                "Configured worker '{}' (identity={}) against {}",
                worker_config.name,
                worker_config.identity,
                client.base_url()
            );
            workers.push(Worker::new(
                worker_config.name.clone(),
                worker_config.identity,
                Arc::new(client),
                directory,
            ));
        }

        Self::new(workers)
    }

    /// Count acquisitions per worker in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<WorkerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Hand out the next worker in round-robin order
    pub fn acquire(&self) -> Arc<Worker> {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        let worker = Arc::clone(&self.workers[slot]);
        debug!("Acquired worker {} ({})", worker.index, worker.name);

        if let Some(metrics) = &self.metrics {
            metrics.record_acquisition(&worker.name);
        }
        worker
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    /// Flush every worker's peer directory, returning the first error
    pub async fn flush_directories(&self) -> Result<()> {
        let mut first_error = None;
        for worker in &self.workers {
            if let Err(e) = worker.directory.flush().await {
                warn!("Failed to flush peer directory of '{}': {}", worker.name, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
