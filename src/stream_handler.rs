//! HTTP request handling
//!
//! Routes requests and drives one stream request from path parsing to the
//! response body:
//!
//! 1. parse `/stream/{container}/{object}`
//! 2. pick a worker
//! 3. resolve metadata (cached)
//! 4. frame the response from the `Range` header
//! 5. stream the body through a [`ChunkedReader`], or fetch photos whole
//!
//! Errors before the response head is sent become a plain-text error
//! response. Errors while streaming end the body early.

use crate::chunked_reader::{fetch_whole, ChunkedReader};
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::metadata_cache::MetadataCache;
use crate::metadata_resolver::MetadataResolver;
use crate::metrics::{RequestKind, StreamMetrics};
use crate::metrics_endpoint::{health_response, metrics_response, text_response};
use crate::models::MediaFile;
use crate::response_framer::{Disposition, ResponseFramer};
use crate::worker_metrics::WorkerMetrics;
use crate::worker_pool::{Worker, WorkerPool};
use bytes::Bytes;
use futures::StreamExt;
use http::header::{ALLOW, RANGE};
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Body type of every response the gateway sends
pub type ResponseBody = UnsyncBoxBody<Bytes, StreamError>;

/// Shared state injected into every request
pub struct AppState {
    pub pool: Arc<WorkerPool>,
    pub resolver: MetadataResolver,
    pub framer: ResponseFramer,
    pub block_size: usize,
    pub photo_fetch_limit: usize,
    pub fetch_timeout: Option<Duration>,
    pub metrics: Arc<StreamMetrics>,
    pub worker_metrics: Option<Arc<WorkerMetrics>>,
}

impl AppState {
    /// Wire up the cache, resolver, framer and metrics for `pool`
    pub fn new(config: &StreamConfig, pool: WorkerPool) -> Result<Self> {
        let metrics = Arc::new(StreamMetrics::new());
        let worker_metrics = Arc::new(WorkerMetrics::new().map_err(|e| {
            StreamError::InternalError(format!("Failed to register worker metrics: {}", e))
        })?);

        let cache = match config.cache.max_entries {
            Some(max_entries) => MetadataCache::with_max_entries(max_entries),
            None => MetadataCache::new(),
        };
        let resolver = MetadataResolver::new(Arc::new(cache), config.cache_ttl())
            .with_fail_open(config.cache.fail_open)
            .with_metrics(Arc::clone(&metrics));

        Ok(AppState {
            pool: Arc::new(pool.with_metrics(Arc::clone(&worker_metrics))),
            resolver,
            framer: ResponseFramer::new()
                .with_range_not_satisfiable_416(config.range_not_satisfiable_416),
            block_size: config.block_size,
            photo_fetch_limit: config.photo_fetch_limit,
            fetch_timeout: config.fetch_timeout(),
            metrics,
            worker_metrics: Some(worker_metrics),
        })
    }
}

/// Route a request
///
/// The request body is never read.
pub async fn handle_request<B>(state: Arc<AppState>, req: Request<B>) -> Response<ResponseBody> {
    let path = req.uri().path().to_string();

    match path.as_str() {
        "/health" => return full_body(health_response()),
        "/metrics" => {
            return full_body(metrics_response(
                &state.metrics,
                state.worker_metrics.as_deref(),
            ))
        }
        _ => {}
    }

    let Some(ids) = path.strip_prefix("/stream/") else {
        return full_body(text_response(StatusCode::NOT_FOUND, "text/plain", "404 Not Found"));
    };

    let is_head = match *req.method() {
        Method::GET => false,
        Method::HEAD => true,
        _ => {
            let mut response = text_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "text/plain",
                "Method Not Allowed",
            );
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
            state.metrics.record_error_status(405);
            return full_body(response);
        }
    };

    let request = StreamRequest {
        ids: ids.to_string(),
        is_head,
        download: download_requested(req.uri().query()),
        range: req
            .headers()
            .get(RANGE)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned()),
    };

    let started = Instant::now();
    state.metrics.record_request();
    if is_head {
        state.metrics.record_head_request();
    }

    let response = handle_stream(&state, request).await;
    state.metrics.record_request_duration(started.elapsed());
    response
}

/// Parsed parts of a stream request
struct StreamRequest {
    /// `{container}/{object}` path remainder
    ids: String,
    is_head: bool,
    download: bool,
    range: Option<String>,
}

/// Parse the container and object ids of a stream path
///
/// # Returns
/// * `Err(StreamError::InvalidIdentifier)` naming the id that failed to parse
pub fn parse_stream_ids(ids: &str) -> Result<(i64, i32)> {
    let mut parts = ids.trim_end_matches('/').splitn(2, '/');
    let container = parts.next().unwrap_or_default();
    let object = parts.next().unwrap_or_default();

    let container_id = container
        .parse::<i64>()
        .map_err(|_| StreamError::InvalidIdentifier("Invalid Channel ID".to_string()))?;
    let object_id = object
        .parse::<i32>()
        .map_err(|_| StreamError::InvalidIdentifier("Invalid Message ID".to_string()))?;

    Ok((container_id, object_id))
}

/// Whether the query string asks for `Content-Disposition: attachment`
pub fn download_requested(query: Option<&str>) -> bool {
    query
        .unwrap_or_default()
        .split('&')
        .any(|pair| pair == "d=true")
}

async fn handle_stream(state: &AppState, request: StreamRequest) -> Response<ResponseBody> {
    let (container_id, object_id) = match parse_stream_ids(&request.ids) {
        Ok(ids) => ids,
        Err(e) => return error_response(state, &e, None, request.is_head),
    };

    let worker = state.pool.acquire();
    debug!(
        "Stream request: container={}, object={}, worker={}, range={:?}",
        container_id, object_id, worker.name, request.range
    );

    let file = match state.resolver.resolve(&worker, container_id, object_id).await {
        Ok(file) => file,
        Err(e) => {
            warn!(
                "Failed to resolve {}/{}: {}",
                container_id, object_id, e
            );
            return error_response(state, &e, None, request.is_head);
        }
    };

    let disposition = Disposition::from_download_flag(request.download);
    if file.is_size_unknown() {
        return serve_whole(state, &worker, &file, disposition, request.is_head).await;
    }

    let framed = match state
        .framer
        .frame(&file, request.range.as_deref(), disposition)
    {
        Ok(framed) => framed,
        Err(e) => return error_response(state, &e, Some(file.total_size), request.is_head),
    };

    let kind = if framed.status == StatusCode::PARTIAL_CONTENT {
        RequestKind::Range
    } else {
        RequestKind::Full
    };
    state.metrics.record_framing(kind);

    if request.is_head {
        return build_response(framed.status, framed.headers, empty_body());
    }

    let reader = match ChunkedReader::new(
        Arc::clone(&worker.client),
        file.location.clone(),
        framed.range.start,
        framed.range.end,
        framed.range.size(),
        state.block_size,
    ) {
        Ok(reader) => reader,
        Err(e) => return error_response(state, &e, Some(file.total_size), false),
    };

    let mut reader = reader
        .with_timeout(state.fetch_timeout)
        .with_metrics(Arc::clone(&state.metrics));
    if let Some(worker_metrics) = &state.worker_metrics {
        reader = reader.with_worker_metrics(Arc::clone(worker_metrics), worker.name.clone());
    }

    info!(
        "Streaming {}/{}: status={}, bytes={}-{}/{}",
        container_id,
        object_id,
        framed.status.as_u16(),
        framed.range.start,
        framed.range.end,
        file.total_size
    );

    let body = stream_body(reader, Arc::clone(&state.metrics), container_id, object_id);
    build_response(framed.status, framed.headers, body)
}

/// Serve an object of unknown size with a single bounded fetch
async fn serve_whole(
    state: &AppState,
    worker: &Worker,
    file: &MediaFile,
    disposition: Disposition,
    is_head: bool,
) -> Response<ResponseBody> {
    if is_head {
        return match state.framer.frame_whole(file, None, disposition) {
            Ok((status, headers)) => {
                state.metrics.record_framing(RequestKind::Photo);
                build_response(status, headers, empty_body())
            }
            Err(e) => error_response(state, &e, None, true),
        };
    }

    let started = Instant::now();
    let fetched = fetch_whole(
        worker.client.as_ref(),
        &file.location,
        state.photo_fetch_limit,
        state.fetch_timeout,
    )
    .await;
    state.metrics.record_block_fetch(fetched.is_ok(), started.elapsed());
    if let Some(worker_metrics) = &state.worker_metrics {
        worker_metrics.record_block_fetch(
            &worker.name,
            fetched.is_ok(),
            started.elapsed().as_secs_f64(),
        );
    }

    let data = match fetched {
        Ok(data) => data,
        Err(e) => {
            warn!("Whole-object fetch failed for media {}: {}", file.object_id, e);
            return error_response(state, &e, None, false);
        }
    };

    match state
        .framer
        .frame_whole(file, Some(data.len() as u64), disposition)
    {
        Ok((status, headers)) => {
            state.metrics.record_framing(RequestKind::Photo);
            state.metrics.record_bytes_from_remote(data.len() as u64);
            state.metrics.record_bytes_to_client(data.len() as u64);
            info!("Serving media {} whole: {} bytes", file.object_id, data.len());
            build_response(status, headers, full_bytes(data))
        }
        Err(e) => error_response(state, &e, None, false),
    }
}

fn stream_body(
    reader: ChunkedReader,
    metrics: Arc<StreamMetrics>,
    container_id: i64,
    object_id: i32,
) -> ResponseBody {
    let total = reader.total_length();
    let frames = reader.into_stream().map(move |chunk| match chunk {
        Ok(data) => {
            metrics.record_bytes_to_client(data.len() as u64);
            Ok(Frame::data(data))
        }
        Err(e) => {
            error!(
                "Stream {}/{} aborted ({} bytes promised): {}",
                container_id, object_id, total, e
            );
            metrics.record_aborted_stream();
            Err(e)
        }
    });
    StreamBody::new(frames).boxed_unsync()
}

fn error_response(
    state: &AppState,
    err: &StreamError,
    total_size: Option<u64>,
    is_head: bool,
) -> Response<ResponseBody> {
    let (status, headers) = state.framer.error_head(err, total_size);
    state.metrics.record_error_status(status.as_u16());
    debug!("Error response: status={}, error={}", status, err);

    let body = if is_head {
        empty_body()
    } else {
        full_bytes(Bytes::from(err.to_string()))
    };
    build_response(status, headers, body)
}

fn build_response(status: StatusCode, headers: HeaderMap, body: ResponseBody) -> Response<ResponseBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn full_body(response: Response<Full<Bytes>>) -> Response<ResponseBody> {
    response.map(|body| body.map_err(|never: Infallible| match never {}).boxed_unsync())
}

fn full_bytes(data: Bytes) -> ResponseBody {
    Full::new(data)
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

fn empty_body() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}
