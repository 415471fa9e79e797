//! HTTP `Range` header parsing
//!
//! Only single-range responses are produced. A header listing several
//! ranges is parsed in full and the first satisfiable one is served.

use crate::error::{Result, StreamError};
use crate::models::ByteRange;
use tracing::debug;

/// One byte-range-spec from a `Range` header, before it is applied to a size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `a-b`
    Bounded { start: u64, end: u64 },
    /// `a-`
    From { start: u64 },
    /// `-n`, the last n bytes
    Suffix { length: u64 },
}

impl RangeSpec {
    /// Apply this spec to an object of `total_size` bytes
    ///
    /// The end is clamped to the last byte. Returns `None` when the spec
    /// selects no bytes of the object.
    pub fn resolve(&self, total_size: u64) -> Option<ByteRange> {
        if total_size == 0 {
            return None;
        }
        let last = total_size - 1;

        let (start, end) = match *self {
            RangeSpec::Bounded { start, end } => (start, end.min(last)),
            RangeSpec::From { start } => (start, last),
            RangeSpec::Suffix { length: 0 } => return None,
            RangeSpec::Suffix { length } => (total_size.saturating_sub(length), last),
        };

        if start > last || start > end {
            return None;
        }
        Some(ByteRange { start, end })
    }
}

/// Parse the specs of a `Range` header value
///
/// # Returns
/// * `Ok(specs)` in header order, never empty
/// * `Err(StreamError::InvalidRange)` if the unit is not `bytes` or any spec is malformed
pub fn parse_range_specs(header: &str) -> Result<Vec<RangeSpec>> {
    let header = header.trim();
    let specs = header
        .strip_prefix("bytes=")
        .ok_or_else(|| StreamError::InvalidRange(format!("unsupported range unit in '{}'", header)))?;

    let mut parsed = Vec::new();
    for spec in specs.split(',') {
        let spec = spec.trim();
        if spec.is_empty() {
            continue;
        }
        parsed.push(parse_spec(spec)?);
    }

    if parsed.is_empty() {
        return Err(StreamError::InvalidRange(format!("no ranges in '{}'", header)));
    }
    Ok(parsed)
}

fn parse_spec(spec: &str) -> Result<RangeSpec> {
    let malformed = || StreamError::InvalidRange(format!("malformed range '{}'", spec));

    let (start, end) = spec.split_once('-').ok_or_else(malformed)?;
    let (start, end) = (start.trim(), end.trim());

    let number = |s: &str| -> Result<u64> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        s.parse::<u64>().map_err(|_| malformed())
    };

    match (start.is_empty(), end.is_empty()) {
        (true, true) => Err(malformed()),
        (true, false) => Ok(RangeSpec::Suffix { length: number(end)? }),
        (false, true) => Ok(RangeSpec::From { start: number(start)? }),
        (false, false) => {
            let (start, end) = (number(start)?, number(end)?);
            if start > end {
                return Err(StreamError::InvalidRange(format!(
                    "range start {} is after end {}",
                    start, end
                )));
            }
            Ok(RangeSpec::Bounded { start, end })
        }
    }
}

/// Parse a `Range` header against an object of `total_size` bytes
///
/// # Returns
/// * `Ok(ByteRange)` for the first satisfiable range, end clamped to `total_size - 1`
/// * `Err(StreamError::InvalidRange)` if the header is malformed or nothing is satisfiable
pub fn parse_range_header(header: &str, total_size: u64) -> Result<ByteRange> {
    let specs = parse_range_specs(header)?;
    if specs.len() > 1 {
        debug!("Multiple ranges requested, serving the first satisfiable: {}", header);
    }

    specs
        .iter()
        .find_map(|spec| spec.resolve(total_size))
        .ok_or_else(|| {
            StreamError::InvalidRange(format!(
                "range '{}' not satisfiable for size {}",
                header.trim(),
                total_size
            ))
        })
}

/// Decide the window to serve for an optional `Range` header
///
/// # Returns
/// * `Ok((range, false))` for the whole object when no header is given
/// * `Ok((range, true))` for a partial response
pub fn resolve_request_range(header: Option<&str>, total_size: u64) -> Result<(ByteRange, bool)> {
    match header {
        None => Ok((ByteRange::full(total_size)?, false)),
        Some(value) => Ok((parse_range_header(value, total_size)?, true)),
    }
}
