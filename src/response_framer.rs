//! Response framing for streamed media
//!
//! Decides status and headers for a resolved object: 200 for the whole
//! object, 206 with `Content-Range` for a partial one, and the single-shot
//! framing used for photos whose size is unknown.

use crate::error::{Result, StreamError};
use crate::models::{ByteRange, MediaFile};
use crate::range_parser::resolve_request_range;
use http::header::{
    ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE,
};
use http::{HeaderMap, HeaderValue, StatusCode};
use tracing::{debug, info};

/// How the client should present the body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    /// `attachment` when the caller asked for a download
    pub fn from_download_flag(download: bool) -> Self {
        if download {
            Disposition::Attachment
        } else {
            Disposition::Inline
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

/// Status, headers and byte window of a ranged response
#[derive(Debug, Clone)]
pub struct FramedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Bytes of the object the body must carry
    pub range: ByteRange,
}

/// Builds response heads for streamed media
#[derive(Debug, Clone, Default)]
pub struct ResponseFramer {
    range_not_satisfiable_416: bool,
}

impl ResponseFramer {
    /// Create a framer that answers bad ranges with 400
    pub fn new() -> Self {
        ResponseFramer::default()
    }

    /// Answer unsatisfiable ranges with 416 instead of 400
    pub fn with_range_not_satisfiable_416(mut self, enabled: bool) -> Self {
        self.range_not_satisfiable_416 = enabled;
        self
    }

    /// Frame a response for an object of known size
    ///
    /// # Returns
    /// * `Ok(FramedResponse)` with status 200 (no range) or 206 (range)
    /// * `Err(StreamError::InvalidRange)` if the range header cannot be served
    pub fn frame(
        &self,
        file: &MediaFile,
        range_header: Option<&str>,
        disposition: Disposition,
    ) -> Result<FramedResponse> {
        let (range, partial) = resolve_request_range(range_header, file.total_size)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        insert_common(&mut headers, file, disposition)?;
        headers.insert(CONTENT_LENGTH, HeaderValue::from(range.size()));

        let status = if partial {
            let content_range = range.to_content_range(file.total_size);
            info!("Content-Range: {}", content_range);
            headers.insert(CONTENT_RANGE, header_value(&content_range)?);
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        };

        debug!(
            "Framed response: status={}, range={}-{}, total={}",
            status, range.start, range.end, file.total_size
        );

        Ok(FramedResponse {
            status,
            headers,
            range,
        })
    }

    /// Frame a whole-object response for an object of unknown size
    ///
    /// Any `Range` header is ignored. `payload_len` is the size of the
    /// fetched body; `None` (HEAD) omits `Content-Length`.
    pub fn frame_whole(
        &self,
        file: &MediaFile,
        payload_len: Option<u64>,
        disposition: Disposition,
    ) -> Result<(StatusCode, HeaderMap)> {
        let mut headers = HeaderMap::new();
        insert_common(&mut headers, file, disposition)?;
        if let Some(len) = payload_len {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        }
        Ok((StatusCode::OK, headers))
    }

    /// Status and extra headers for an error response
    ///
    /// `total_size` is the object size when known; it is reported in
    /// `Content-Range: bytes */<size>` when 416 responses are enabled.
    pub fn error_head(&self, err: &StreamError, total_size: Option<u64>) -> (StatusCode, HeaderMap) {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));

        if let (StreamError::InvalidRange(_), true) = (err, self.range_not_satisfiable_416) {
            if let Some(total) = total_size {
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", total)) {
                    headers.insert(CONTENT_RANGE, value);
                }
            }
            return (StatusCode::RANGE_NOT_SATISFIABLE, headers);
        }

        let status = StatusCode::from_u16(err.to_http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, headers)
    }
}

fn insert_common(headers: &mut HeaderMap, file: &MediaFile, disposition: Disposition) -> Result<()> {
    let content_type = HeaderValue::from_str(file.content_type())
        .unwrap_or_else(|_| HeaderValue::from_static(crate::models::DEFAULT_MIME_TYPE));
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(
        CONTENT_DISPOSITION,
        content_disposition(disposition, &file.display_name)?,
    );
    Ok(())
}

/// Build a `Content-Disposition` value for `file_name`
///
/// Quotes, backslashes and control characters are replaced so the name
/// always fits inside the quoted-string.
pub fn content_disposition(disposition: Disposition, file_name: &str) -> Result<HeaderValue> {
    let sanitized: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let value = format!("{}; filename=\"{}\"", disposition.as_str(), sanitized);
    HeaderValue::from_bytes(value.as_bytes()).map_err(|e| {
        StreamError::InternalError(format!("invalid Content-Disposition '{}': {}", value, e))
    })
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| StreamError::InternalError(format!("invalid header value '{}': {}", value, e)))
}
