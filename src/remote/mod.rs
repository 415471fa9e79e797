//! Remote chunked-object API
//!
//! This module defines the contract the gateway consumes from the remote
//! storage service and the data shapes that cross it:
//!
//! - [`RemoteClient`]: container lookup, message lookup and block fetches
//! - [`HttpRemoteClient`]: a client for an HTTP/JSON bridge exposing those calls
//! - [`MemoryRemoteClient`]: an in-process store with call counters
//!
//! Implementations must be safe for concurrent use: one client instance is
//! shared by every request routed to its worker.

pub mod http;
pub mod memory;

use crate::error::Result;
use crate::models::FileLocation;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use self::http::HttpRemoteClient;
pub use self::memory::MemoryRemoteClient;

/// Kind of addressable peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerKind {
    User,
    Chat,
    Channel,
}

impl fmt::Display for PeerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerKind::User => "user",
            PeerKind::Chat => "chat",
            PeerKind::Channel => "channel",
        };
        f.write_str(name)
    }
}

/// Addressable reference to a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerHandle {
    pub id: i64,
    pub access_hash: i64,
    pub kind: PeerKind,
}

/// Container description returned by the remote lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: i64,
    pub access_hash: i64,
    pub kind: PeerKind,
    #[serde(default)]
    pub title: String,
}

impl PeerInfo {
    pub fn handle(&self) -> PeerHandle {
        PeerHandle {
            id: self.id,
            access_hash: self.access_hash,
            kind: self.kind,
        }
    }
}

/// An item inside a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// A regular message, possibly carrying media
    #[serde(rename = "message")]
    Regular {
        id: i32,
        #[serde(default)]
        media: Option<MessageMedia>,
    },
    /// A service message (joins, pins, ...)
    Service { id: i32 },
    /// Placeholder left behind by a deleted message
    Empty { id: i32 },
}

impl Message {
    pub fn id(&self) -> i32 {
        match self {
            Message::Regular { id, .. } | Message::Service { id } | Message::Empty { id } => *id,
        }
    }
}

/// Media payload attached to a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageMedia {
    /// `None` when the remote reports an empty document
    Document { document: Option<Document> },
    /// `None` when the remote reports an empty photo
    Photo { photo: Option<Photo> },
    Geo,
    Contact,
    Poll,
    WebPage,
    #[serde(other)]
    Unknown,
}

impl MessageMedia {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageMedia::Document { .. } => "document",
            MessageMedia::Photo { .. } => "photo",
            MessageMedia::Geo => "geo",
            MessageMedia::Contact => "contact",
            MessageMedia::Poll => "poll",
            MessageMedia::WebPage => "web_page",
            MessageMedia::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub access_hash: i64,
    #[serde(default)]
    pub file_reference: Vec<u8>,
    pub size: u64,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub attributes: Vec<DocumentAttribute>,
}

impl Document {
    /// File name attribute, if the document carries one
    pub fn file_name(&self) -> Option<&str> {
        self.attributes.iter().find_map(|attribute| match attribute {
            DocumentAttribute::Filename { file_name } => Some(file_name.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentAttribute {
    Filename { file_name: String },
    Video { duration: f64, w: u32, h: u32 },
    Audio {
        duration: u32,
        #[serde(default)]
        title: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: i64,
    pub access_hash: i64,
    #[serde(default)]
    pub file_reference: Vec<u8>,
    #[serde(default)]
    pub sizes: Vec<PhotoSize>,
}

/// One size variant of a photo; remotes list them smallest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PhotoSize {
    Empty { size_type: String },
    Sized { size_type: String, w: u32, h: u32, size: u32 },
    Progressive { size_type: String, w: u32, h: u32, sizes: Vec<u32> },
}

impl PhotoSize {
    /// Size selector of a usable variant, `None` for empty variants
    pub fn usable_type(&self) -> Option<&str> {
        match self {
            PhotoSize::Empty { .. } => None,
            PhotoSize::Sized { size_type, .. } | PhotoSize::Progressive { size_type, .. } => {
                Some(size_type.as_str())
            }
        }
    }
}

/// What a block fetch returned
#[derive(Debug, Clone, PartialEq)]
pub enum BlockPayload {
    /// The requested block (shorter than the limit at end of object)
    Bytes(Bytes),
    /// The object must be fetched from a CDN node instead
    CdnRedirect { location: String },
}

/// Client for the remote chunked-object API
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Look up a container by id
    async fn get_container_info(&self, id: i64) -> Result<Vec<PeerInfo>>;

    /// Fetch messages by id from a resolved container
    async fn get_messages_by_id(&self, peer: &PeerHandle, ids: &[i32]) -> Result<Vec<Message>>;

    /// Fetch at most `limit` bytes of the object at `offset`
    async fn fetch_block(&self, location: &FileLocation, offset: u64, limit: u32) -> Result<BlockPayload>;
}
