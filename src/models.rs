//! Core data models for the media streaming gateway

use crate::error::{Result, StreamError};
use serde::{Deserialize, Serialize};

/// MIME type used when the remote object carries none
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Represents an inclusive byte range within a remote object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    /// Starting byte position (inclusive)
    pub start: u64,
    /// Ending byte position (inclusive)
    pub end: u64,
}

impl ByteRange {
    /// Create a new ByteRange
    ///
    /// # Arguments
    /// * `start` - Starting byte position (inclusive)
    /// * `end` - Ending byte position (inclusive)
    ///
    /// # Returns
    /// * `Ok(ByteRange)` if the range is valid
    /// * `Err(StreamError)` if start > end
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(StreamError::InvalidRange(format!(
                "start ({}) must be <= end ({})",
                start, end
            )));
        }
        Ok(ByteRange { start, end })
    }

    /// Range covering a whole object of `total_size` bytes
    pub fn full(total_size: u64) -> Result<Self> {
        if total_size == 0 {
            return Err(StreamError::InvalidRange(
                "cannot build a range over an empty object".to_string(),
            ));
        }
        ByteRange::new(0, total_size - 1)
    }

    /// Get the size of this byte range in bytes
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Check if this byte range is valid
    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// Format this range as a Content-Range header value
    pub fn to_content_range(&self, total_size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total_size)
    }
}

/// Opaque handle addressing byte ranges of a remote object
///
/// Each variant carries exactly what a block fetch needs for that media kind.
/// Never mutated once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileLocation {
    Document {
        id: i64,
        access_hash: i64,
        file_reference: Vec<u8>,
    },
    Photo {
        id: i64,
        access_hash: i64,
        file_reference: Vec<u8>,
        /// Size variant selector, e.g. "y" or "w"
        thumb_size: String,
    },
}

impl FileLocation {
    /// Remote id of the addressed media
    pub fn id(&self) -> i64 {
        match self {
            FileLocation::Document { id, .. } | FileLocation::Photo { id, .. } => *id,
        }
    }

    /// Short name of the location kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            FileLocation::Document { .. } => "document",
            FileLocation::Photo { .. } => "photo",
        }
    }
}

/// Descriptor of a streamable remote object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    /// Where to fetch the bytes from
    pub location: FileLocation,
    /// Total size in bytes; 0 means "unknown, fetch whole" (photos)
    pub total_size: u64,
    /// MIME type as reported by the remote object (may be empty)
    pub mime_type: String,
    /// Best-effort file name
    pub display_name: String,
    /// Remote-assigned media id
    pub object_id: i64,
}

impl MediaFile {
    /// Whether the size is unknown and the object must be fetched whole
    pub fn is_size_unknown(&self) -> bool {
        self.total_size == 0
    }

    /// Content type to advertise, falling back to octet-stream
    pub fn content_type(&self) -> &str {
        if self.mime_type.is_empty() {
            DEFAULT_MIME_TYPE
        } else {
            &self.mime_type
        }
    }
}

/// One block-aligned remote fetch and the part of it delivered to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpec {
    /// Index of this block in the sequence
    pub index: usize,
    /// Block-aligned offset passed to the remote fetch
    pub offset: u64,
    /// Bytes to discard at the front of the fetched block
    pub skip: usize,
    /// Bytes to deliver after `skip`
    pub take: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> MediaFile {
        MediaFile {
            location: FileLocation::Document {
                id: 42,
                access_hash: 7,
                file_reference: vec![1, 2, 3],
            },
            total_size: 1024,
            mime_type: String::new(),
            display_name: "clip.mp4".to_string(),
            object_id: 42,
        }
    }

    #[test]
    fn test_byte_range_new() {
        let range = ByteRange::new(0, 1023).unwrap();
        assert_eq!(range.start, 0);
        assert_eq!(range.end, 1023);
        assert_eq!(range.size(), 1024);
    }

    #[test]
    fn test_byte_range_invalid() {
        let result = ByteRange::new(100, 50);
        assert!(result.is_err());
    }

    #[test]
    fn test_byte_range_full() {
        let range = ByteRange::full(500).unwrap();
        assert_eq!(range, ByteRange { start: 0, end: 499 });
        assert!(ByteRange::full(0).is_err());
    }

    #[test]
    fn test_content_range_format() {
        let range = ByteRange::new(0, 0).unwrap();
        assert_eq!(range.to_content_range(2048), "bytes 0-0/2048");
    }

    #[test]
    fn test_media_file_content_type_fallback() {
        let mut file = document();
        assert_eq!(file.content_type(), DEFAULT_MIME_TYPE);

        file.mime_type = "video/mp4".to_string();
        assert_eq!(file.content_type(), "video/mp4");
    }

    #[test]
    fn test_media_file_bincode_round_trip() {
        let file = document();
        let encoded = bincode::serialize(&file).unwrap();
        let decoded: MediaFile = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, file);
    }

    #[test]
    fn test_location_kind() {
        let photo = FileLocation::Photo {
            id: 9,
            access_hash: 1,
            file_reference: vec![],
            thumb_size: "y".to_string(),
        };
        assert_eq!(photo.kind(), "photo");
        assert_eq!(photo.id(), 9);
        assert_eq!(document().location.kind(), "document");
    }
}
