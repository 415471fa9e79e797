//! Prometheus metrics broken down per worker

use prometheus::{CounterVec, Encoder, HistogramVec, Registry, TextEncoder};
use std::sync::Arc;

/// Per-worker counters, kept in a registry owned by this struct
#[derive(Clone)]
pub struct WorkerMetrics {
    registry: Registry,

    /// Number of times each worker was handed out by the pool
    pub acquisitions_total: Arc<CounterVec>,

    /// Block fetches by worker and result (success/failure)
    pub block_fetches_total: Arc<CounterVec>,

    /// Duration of block fetches
    pub block_fetch_duration_seconds: Arc<HistogramVec>,
}

impl WorkerMetrics {
    /// Create metrics registered in a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Create metrics registered in the given registry
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let acquisitions_total = CounterVec::new(
            prometheus::Opts::new(
                "media_stream_worker_acquisitions_total",
                "Total number of times a worker was selected for a request",
            ),
            &["worker"],
        )?;
        registry.register(Box::new(acquisitions_total.clone()))?;

        let block_fetches_total = CounterVec::new(
            prometheus::Opts::new(
                "media_stream_worker_block_fetches_total",
                "Total number of remote block fetches by result",
            ),
            &["worker", "result"],
        )?;
        registry.register(Box::new(block_fetches_total.clone()))?;

        let block_fetch_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "media_stream_worker_block_fetch_duration_seconds",
                "Duration of remote block fetches in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["worker"],
        )?;
        registry.register(Box::new(block_fetch_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            acquisitions_total: Arc::new(acquisitions_total),
            block_fetches_total: Arc::new(block_fetches_total),
            block_fetch_duration_seconds: Arc::new(block_fetch_duration_seconds),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_acquisition(&self, worker: &str) {
        self.acquisitions_total.with_label_values(&[worker]).inc();
    }

    pub fn record_block_fetch(&self, worker: &str, success: bool, duration_secs: f64) {
        let result = if success { "success" } else { "failure" };
        self.block_fetches_total
            .with_label_values(&[worker, result])
            .inc();
        self.block_fetch_duration_seconds
            .with_label_values(&[worker])
            .observe(duration_secs);
    }

    /// Render every registered metric in Prometheus text format
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
