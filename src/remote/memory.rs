//! In-memory remote client
//!
//! Holds containers, messages and object bodies in process memory and counts
//! every call made against it. Block fetches follow the remote API's rules:
//! at most `limit` bytes are returned and a fetch past the end of the object
//! yields an empty block.

use super::{
    BlockPayload, Document, DocumentAttribute, Message, MessageMedia, PeerHandle, PeerInfo,
    PeerKind, Photo, PhotoSize, RemoteClient,
};
use crate::error::{Result, StreamError};
use crate::models::FileLocation;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

/// Number of calls made against a [`MemoryRemoteClient`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub container_info: u64,
    pub messages: u64,
    pub blocks: u64,
}

#[derive(Default)]
struct Store {
    containers: HashMap<i64, PeerInfo>,
    messages: HashMap<(i64, i32), Message>,
    objects: HashMap<i64, Bytes>,
}

/// Remote client backed by process memory
pub struct MemoryRemoteClient {
    store: RwLock<Store>,
    next_media_id: AtomicI64,
    container_info_calls: AtomicU64,
    message_calls: AtomicU64,
    block_calls: AtomicU64,
    /// Fail every block fetch once this many have succeeded
    fail_blocks_after: RwLock<Option<u64>>,
    /// Answer block fetches with a CDN redirect
    redirect_blocks: RwLock<bool>,
    /// Artificial latency added to every block fetch
    block_latency: RwLock<Option<Duration>>,
}

impl Default for MemoryRemoteClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteClient {
    pub fn new() -> Self {
        MemoryRemoteClient {
            store: RwLock::new(Store::default()),
            next_media_id: AtomicI64::new(1_000),
            container_info_calls: AtomicU64::new(0),
            message_calls: AtomicU64::new(0),
            block_calls: AtomicU64::new(0),
            fail_blocks_after: RwLock::new(None),
            redirect_blocks: RwLock::new(false),
            block_latency: RwLock::new(None),
        }
    }

    /// Register a container of the given kind
    pub fn add_container(&self, id: i64, access_hash: i64, kind: PeerKind) {
        if let Ok(mut store) = self.store.write() {
            store.containers.insert(
                id,
                PeerInfo {
                    id,
                    access_hash,
                    kind,
                    title: format!("container {}", id),
                },
            );
        }
    }

    /// Register a channel container
    pub fn add_channel(&self, id: i64, access_hash: i64) {
        self.add_container(id, access_hash, PeerKind::Channel);
    }

    /// Store an arbitrary message as-is
    pub fn add_message(&self, container_id: i64, message: Message) {
        if let Ok(mut store) = self.store.write() {
            store.messages.insert((container_id, message.id()), message);
        }
    }

    /// Store a document message and its body, returning the media id
    pub fn add_document(
        &self,
        container_id: i64,
        message_id: i32,
        file_name: Option<&str>,
        mime_type: &str,
        data: impl Into<Bytes>,
    ) -> i64 {
        let data = data.into();
        let media_id = self.next_media_id.fetch_add(1, Ordering::Relaxed);
        let attributes = file_name
            .map(|name| {
                vec![DocumentAttribute::Filename {
                    file_name: name.to_string(),
                }]
            })
            .unwrap_or_default();

        let document = Document {
            id: media_id,
            access_hash: media_id * 31,
            file_reference: media_id.to_be_bytes().to_vec(),
            size: data.len() as u64,
            mime_type: mime_type.to_string(),
            attributes,
        };

        if let Ok(mut store) = self.store.write() {
            store.objects.insert(media_id, data);
        }
        self.add_message(
            container_id,
            Message::Regular {
                id: message_id,
                media: Some(MessageMedia::Document {
                    document: Some(document),
                }),
            },
        );
        media_id
    }

    /// Store a photo message and its body, returning the media id
    pub fn add_photo(&self, container_id: i64, message_id: i32, data: impl Into<Bytes>) -> i64 {
        let data = data.into();
        let media_id = self.next_media_id.fetch_add(1, Ordering::Relaxed);
        let photo = Photo {
            id: media_id,
            access_hash: media_id * 17,
            file_reference: media_id.to_be_bytes().to_vec(),
            sizes: vec![
                PhotoSize::Sized {
                    size_type: "m".to_string(),
                    w: 320,
                    h: 240,
                    size: 4_096,
                },
                PhotoSize::Sized {
                    size_type: "y".to_string(),
                    w: 1280,
                    h: 960,
                    size: data.len() as u32,
                },
            ],
        };

        if let Ok(mut store) = self.store.write() {
            store.objects.insert(media_id, data);
        }
        self.add_message(
            container_id,
            Message::Regular {
                id: message_id,
                media: Some(MessageMedia::Photo { photo: Some(photo) }),
            },
        );
        media_id
    }

    /// Make block fetches fail once `successes` fetches have been served
    pub fn fail_blocks_after(&self, successes: u64) {
        if let Ok(mut limit) = self.fail_blocks_after.write() {
            *limit = Some(successes);
        }
    }

    /// Answer block fetches with a CDN redirect instead of bytes
    pub fn redirect_blocks(&self, redirect: bool) {
        if let Ok(mut flag) = self.redirect_blocks.write() {
            *flag = redirect;
        }
    }

    /// Delay every block fetch by `latency`
    pub fn set_block_latency(&self, latency: Duration) {
        if let Ok(mut value) = self.block_latency.write() {
            *value = Some(latency);
        }
    }

    pub fn call_counts(&self) -> CallCounts {
        CallCounts {
            container_info: self.container_info_calls.load(Ordering::Relaxed),
            messages: self.message_calls.load(Ordering::Relaxed),
            blocks: self.block_calls.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl RemoteClient for MemoryRemoteClient {
    async fn get_container_info(&self, id: i64) -> Result<Vec<PeerInfo>> {
        self.container_info_calls.fetch_add(1, Ordering::Relaxed);
        let store = self
            .store
            .read()
            .map_err(|e| StreamError::InternalError(format!("store lock poisoned: {}", e)))?;

        Ok(store.containers.get(&id).cloned().into_iter().collect())
    }

    async fn get_messages_by_id(&self, peer: &PeerHandle, ids: &[i32]) -> Result<Vec<Message>> {
        self.message_calls.fetch_add(1, Ordering::Relaxed);
        let store = self
            .store
            .read()
            .map_err(|e| StreamError::InternalError(format!("store lock poisoned: {}", e)))?;

        match store.containers.get(&peer.id) {
            Some(info) if info.access_hash == peer.access_hash => {}
            _ => {
                return Err(StreamError::remote(format!(
                    "CHANNEL_INVALID: {}",
                    peer.id
                )))
            }
        }

        Ok(ids
            .iter()
            .map(|id| {
                store
                    .messages
                    .get(&(peer.id, *id))
                    .cloned()
                    .unwrap_or(Message::Empty { id: *id })
            })
            .collect())
    }

    async fn fetch_block(&self, location: &FileLocation, offset: u64, limit: u32) -> Result<BlockPayload> {
        let served = self.block_calls.fetch_add(1, Ordering::Relaxed);

        let latency = self.block_latency.read().ok().and_then(|value| *value);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(limit) = self.fail_blocks_after.read().ok().and_then(|value| *value) {
            if served >= limit {
                return Err(StreamError::remote("FILE_REFERENCE_EXPIRED"));
            }
        }

        if self.redirect_blocks.read().map(|flag| *flag).unwrap_or(false) {
            return Ok(BlockPayload::CdnRedirect {
                location: format!("cdn://{}", location.id()),
            });
        }

        let store = self
            .store
            .read()
            .map_err(|e| StreamError::InternalError(format!("store lock poisoned: {}", e)))?;
        let data = store
            .objects
            .get(&location.id())
            .ok_or_else(|| StreamError::remote(format!("FILE_ID_INVALID: {}", location.id())))?;

        let len = data.len() as u64;
        let start = offset.min(len) as usize;
        let end = offset.saturating_add(limit as u64).min(len) as usize;
        debug!(
            "Memory block fetch: media={}, offset={}, limit={}, returned={}",
            location.id(),
            offset,
            limit,
            end - start
        );

        Ok(BlockPayload::Bytes(data.slice(start..end)))
    }
}
