//! Metrics collection for the streaming gateway
//!
//! Thread-safe counters updated with atomic operations. They track requests,
//! metadata cache lookups, remote block fetches, byte totals and latencies.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// How a stream request was framed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// 206 response for a Range request
    Range,
    /// 200 response for the whole object
    Full,
    /// Whole-object photo fetch
    Photo,
}

/// Metrics collector for the gateway
///
/// All operations are thread-safe using atomic operations.
#[derive(Debug, Default)]
pub struct StreamMetrics {
    // Request statistics
    total_requests: AtomicU64,
    range_requests: AtomicU64,
    full_requests: AtomicU64,
    photo_requests: AtomicU64,
    head_requests: AtomicU64,

    // Metadata cache statistics
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_errors: AtomicU64,

    // Remote block fetch statistics
    total_block_fetches: AtomicU64,
    failed_block_fetches: AtomicU64,
    aborted_streams: AtomicU64,

    // Byte statistics
    bytes_from_remote: AtomicU64,
    bytes_to_client: AtomicU64,

    // Error responses
    client_errors: AtomicU64,
    server_errors: AtomicU64,

    // Latency statistics (stored as microseconds)
    total_request_duration_us: AtomicU64,
    total_block_fetch_duration_us: AtomicU64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub range_requests: u64,
    pub full_requests: u64,
    pub photo_requests: u64,
    pub head_requests: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_errors: u64,

    pub total_block_fetches: u64,
    pub failed_block_fetches: u64,
    pub aborted_streams: u64,

    pub bytes_from_remote: u64,
    pub bytes_to_client: u64,

    pub client_errors: u64,
    pub server_errors: u64,

    pub total_request_duration_us: u64,
    pub total_block_fetch_duration_us: u64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an incoming stream request, before it is framed
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how a successful request was framed
    pub fn record_framing(&self, kind: RequestKind) {
        let counter = match kind {
            RequestKind::Range => &self.range_requests,
            RequestKind::Full => &self.full_requests,
            RequestKind::Photo => &self.photo_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_head_request(&self) {
        self.head_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed cache write
    pub fn record_cache_error(&self) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a remote block fetch
    ///
    /// # Arguments
    /// * `success` - Whether the fetch produced usable bytes
    /// * `duration` - Time spent waiting on the remote
    pub fn record_block_fetch(&self, success: bool, duration: Duration) {
        self.total_block_fetches.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_block_fetches.fetch_add(1, Ordering::Relaxed);
        }
        self.total_block_fetch_duration_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record a body stream that ended with an error after headers were sent
    pub fn record_aborted_stream(&self) {
        self.aborted_streams.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_from_remote(&self, bytes: u64) {
        self.bytes_from_remote.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_bytes_to_client(&self, bytes: u64) {
        self.bytes_to_client.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record an error response by its status code
    pub fn record_error_status(&self, status: u16) {
        if status >= 500 {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        } else if status >= 400 {
            self.client_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record time until response headers were ready
    pub fn record_request_duration(&self, duration: Duration) {
        self.total_request_duration_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    ///
    /// Fields are loaded one by one, so a snapshot taken under load may not be
    /// perfectly consistent across fields.
    pub fn get_stats(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            range_requests: self.range_requests.load(Ordering::Relaxed),
            full_requests: self.full_requests.load(Ordering::Relaxed),
            photo_requests: self.photo_requests.load(Ordering::Relaxed),
            head_requests: self.head_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
            total_block_fetches: self.total_block_fetches.load(Ordering::Relaxed),
            failed_block_fetches: self.failed_block_fetches.load(Ordering::Relaxed),
            aborted_streams: self.aborted_streams.load(Ordering::Relaxed),
            bytes_from_remote: self.bytes_from_remote.load(Ordering::Relaxed),
            bytes_to_client: self.bytes_to_client.load(Ordering::Relaxed),
            client_errors: self.client_errors.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            total_request_duration_us: self.total_request_duration_us.load(Ordering::Relaxed),
            total_block_fetch_duration_us: self
                .total_block_fetch_duration_us
                .load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Cache hit rate as a percentage (0.0 to 100.0)
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / total as f64) * 100.0
        }
    }

    /// Average time to response headers in milliseconds
    pub fn avg_request_duration_ms(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.total_request_duration_us as f64 / self.total_requests as f64) / 1000.0
        }
    }

    /// Average remote block fetch latency in milliseconds
    pub fn avg_block_fetch_duration_ms(&self) -> f64 {
        if self.total_block_fetches == 0 {
            0.0
        } else {
            (self.total_block_fetch_duration_us as f64 / self.total_block_fetches as f64) / 1000.0
        }
    }

    /// Block fetch failure rate as a percentage (0.0 to 100.0)
    pub fn block_fetch_failure_rate(&self) -> f64 {
        if self.total_block_fetches == 0 {
            0.0
        } else {
            (self.failed_block_fetches as f64 / self.total_block_fetches as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_record_requests_and_framing() {
        let metrics = StreamMetrics::new();

        metrics.record_request();
        metrics.record_request();
        metrics.record_request();
        metrics.record_framing(RequestKind::Range);
        metrics.record_framing(RequestKind::Full);
        metrics.record_framing(RequestKind::Photo);
        metrics.record_head_request();

        let stats = metrics.get_stats();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.range_requests, 1);
        assert_eq!(stats.full_requests, 1);
        assert_eq!(stats.photo_requests, 1);
        assert_eq!(stats.head_requests, 1);
    }

    #[test]
    fn test_block_fetches() {
        let metrics = StreamMetrics::new();

        metrics.record_block_fetch(true, Duration::from_millis(10));
        metrics.record_block_fetch(true, Duration::from_millis(20));
        metrics.record_block_fetch(false, Duration::from_millis(30));
        metrics.record_block_fetch(false, Duration::from_millis(40));

        let stats = metrics.get_stats();
        assert_eq!(stats.total_block_fetches, 4);
        assert_eq!(stats.failed_block_fetches, 2);
        assert_eq!(stats.total_block_fetch_duration_us, 100_000);
        assert_eq!(stats.block_fetch_failure_rate(), 50.0);
        assert_eq!(stats.avg_block_fetch_duration_ms(), 25.0);
    }

    #[test]
    fn test_error_status_buckets() {
        let metrics = StreamMetrics::new();
        metrics.record_error_status(400);
        metrics.record_error_status(405);
        metrics.record_error_status(500);
        metrics.record_error_status(206);

        let stats = metrics.get_stats();
        assert_eq!(stats.client_errors, 2);
        assert_eq!(stats.server_errors, 1);
    }

    #[test]
    fn test_cache_hit_rate() {
        let metrics = StreamMetrics::new();
        assert_eq!(metrics.get_stats().cache_hit_rate(), 0.0);

        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        assert_eq!(metrics.get_stats().cache_hit_rate(), 75.0);
    }

    #[test]
    fn test_avg_request_duration() {
        let metrics = StreamMetrics::new();
        metrics.record_request();
        metrics.record_request_duration(Duration::from_millis(100));
        metrics.record_request();
        metrics.record_request_duration(Duration::from_millis(200));

        assert_eq!(metrics.get_stats().avg_request_duration_ms(), 150.0);
    }

    #[test]
    fn test_thread_safety() {
        let metrics = Arc::new(StreamMetrics::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let metrics = Arc::clone(&metrics);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    metrics.record_request();
                    metrics.record_bytes_to_client(10);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = metrics.get_stats();
        assert_eq!(stats.total_requests, 1000);
        assert_eq!(stats.bytes_to_client, 10_000);
    }
}
