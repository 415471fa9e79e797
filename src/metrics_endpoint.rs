//! Metrics HTTP Endpoint
//!
//! Exposes gateway metrics in Prometheus text format. The same rendering is
//! served on the main listener at `/metrics`; this endpoint can additionally
//! be bound to a separate, private address.

use crate::metrics::{MetricsSnapshot, StreamMetrics};
use crate::worker_metrics::WorkerMetrics;
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Content type of the Prometheus text exposition format
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Standalone metrics server
pub struct MetricsEndpoint {
    metrics: Arc<StreamMetrics>,
    worker_metrics: Option<Arc<WorkerMetrics>>,
    addr: SocketAddr,
}

impl MetricsEndpoint {
    pub fn new(metrics: Arc<StreamMetrics>, addr: SocketAddr) -> Self {
        Self {
            metrics,
            worker_metrics: None,
            addr,
        }
    }

    /// Append per-worker metrics to every scrape
    pub fn with_worker_metrics(mut self, worker_metrics: Arc<WorkerMetrics>) -> Self {
        self.worker_metrics = Some(worker_metrics);
        self
    }

    /// Serve `/metrics` and `/health` until `shutdown` completes
    pub async fn run_until<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Metrics endpoint listening on http://{}/metrics", self.addr);
        tokio::pin!(shutdown);

        loop {
            let (stream, _) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Metrics endpoint accept failed: {}", e);
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    info!("Metrics endpoint shutting down");
                    return Ok(());
                }
            };

            let io = TokioIo::new(stream);
            let metrics = Arc::clone(&self.metrics);
            let worker_metrics = self.worker_metrics.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let metrics = Arc::clone(&metrics);
                    let worker_metrics = worker_metrics.clone();
                    async move { handle_request(req, metrics, worker_metrics) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving metrics connection: {:?}", err);
                }
            });
        }
    }
}

fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<StreamMetrics>,
    worker_metrics: Option<Arc<WorkerMetrics>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match req.uri().path() {
        "/metrics" => metrics_response(&metrics, worker_metrics.as_deref()),
        "/health" => health_response(),
        _ => text_response(StatusCode::NOT_FOUND, "text/plain", "404 Not Found"),
    };
    Ok(response)
}

/// Prometheus scrape response for the given collectors
pub fn metrics_response(
    metrics: &StreamMetrics,
    worker_metrics: Option<&WorkerMetrics>,
) -> Response<Full<Bytes>> {
    let body = render_metrics(&metrics.get_stats(), worker_metrics);
    text_response(StatusCode::OK, PROMETHEUS_CONTENT_TYPE, body)
}

pub fn health_response() -> Response<Full<Bytes>> {
    text_response(StatusCode::OK, "application/json", r#"{"status":"healthy"}"#)
}

/// Build a response with a fixed body
pub fn text_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Render a snapshot, followed by per-worker metrics when available
pub fn render_metrics(snapshot: &MetricsSnapshot, worker_metrics: Option<&WorkerMetrics>) -> String {
    let mut output = format_prometheus_metrics(snapshot);

    if let Some(worker_metrics) = worker_metrics {
        match worker_metrics.encode_text() {
            Ok(text) => output.push_str(&text),
            Err(e) => warn!("Failed to encode worker metrics: {}", e),
        }
    }
    output
}

fn push_metric(output: &mut String, name: &str, help: &str, kind: &str, value: impl std::fmt::Display) {
    // Writing to a String cannot fail
    let _ = writeln!(output, "# HELP media_stream_{} {}", name, help);
    let _ = writeln!(output, "# TYPE media_stream_{} {}", name, kind);
    let _ = writeln!(output, "media_stream_{} {}", name, value);
    output.push('\n');
}

/// Format a snapshot in Prometheus exposition format
pub fn format_prometheus_metrics(snapshot: &MetricsSnapshot) -> String {
    let mut output = String::new();
    let out = &mut output;

    // Requests
    push_metric(out, "requests_total", "Total number of stream requests", "counter", snapshot.total_requests);
    push_metric(out, "range_requests_total", "Requests answered with 206 Partial Content", "counter", snapshot.range_requests);
    push_metric(out, "full_requests_total", "Requests answered with the whole object", "counter", snapshot.full_requests);
    push_metric(out, "photo_requests_total", "Requests served by a single whole-object fetch", "counter", snapshot.photo_requests);
    push_metric(out, "head_requests_total", "HEAD requests", "counter", snapshot.head_requests);

    // Metadata cache
    push_metric(out, "cache_hits_total", "Metadata cache hits", "counter", snapshot.cache_hits);
    push_metric(out, "cache_misses_total", "Metadata cache misses", "counter", snapshot.cache_misses);
    push_metric(out, "cache_errors_total", "Failed metadata cache writes", "counter", snapshot.cache_errors);
    push_metric(out, "cache_hit_rate", "Metadata cache hit rate percentage", "gauge", format!("{:.2}", snapshot.cache_hit_rate()));

    // Remote fetches
    push_metric(out, "block_fetches_total", "Remote block fetches", "counter", snapshot.total_block_fetches);
    push_metric(out, "failed_block_fetches_total", "Failed remote block fetches", "counter", snapshot.failed_block_fetches);
    push_metric(out, "block_fetch_failure_rate", "Remote block fetch failure rate percentage", "gauge", format!("{:.2}", snapshot.block_fetch_failure_rate()));
    push_metric(out, "aborted_streams_total", "Response bodies aborted after headers were sent", "counter", snapshot.aborted_streams);

    // Bytes
    push_metric(out, "bytes_from_remote_total", "Bytes received from the remote API", "counter", snapshot.bytes_from_remote);
    push_metric(out, "bytes_to_client_total", "Body bytes sent to clients", "counter", snapshot.bytes_to_client);

    // Errors
    push_metric(out, "client_errors_total", "Responses with a 4xx status", "counter", snapshot.client_errors);
    push_metric(out, "server_errors_total", "Responses with a 5xx status", "counter", snapshot.server_errors);

    // Latency (milliseconds)
    push_metric(out, "request_duration_ms_avg", "Average time to response headers in milliseconds", "gauge", format!("{:.2}", snapshot.avg_request_duration_ms()));
    push_metric(out, "block_fetch_duration_ms_avg", "Average remote block fetch duration in milliseconds", "gauge", format!("{:.2}", snapshot.avg_block_fetch_duration_ms()));

    output
}
