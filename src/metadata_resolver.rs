//! Metadata resolver
//!
//! Maps a (container, object) pair to a [`MediaFile`] through a read-through
//! cache keyed by the worker's identity.

use crate::error::{Result, StreamError};
use crate::metadata_cache::MetadataCache;
use crate::metrics::StreamMetrics;
use crate::models::{FileLocation, MediaFile};
use crate::peer_resolver::resolve_peer;
use crate::remote::{Message, MessageMedia};
use crate::worker_pool::Worker;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// MIME type reported for photos
pub const PHOTO_MIME_TYPE: &str = "image/jpeg";

/// Resolves media metadata, caching results for a fixed TTL
pub struct MetadataResolver {
    cache: Arc<MetadataCache>,
    ttl: Duration,
    fail_open: bool,
    metrics: Option<Arc<StreamMetrics>>,
}

impl MetadataResolver {
    /// Create a resolver that fails a resolution when caching it fails
    pub fn new(cache: Arc<MetadataCache>, ttl: Duration) -> Self {
        MetadataResolver {
            cache,
            ttl,
            fail_open: false,
            metrics: None,
        }
    }

    /// Serve resolutions even when storing them in the cache fails
    pub fn with_fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<StreamMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Resolve the media of `object_id` in `container_id`
    ///
    /// # Returns
    /// * `Ok(MediaFile)` from the cache or a fresh remote lookup
    /// * `Err(StreamError::ObjectNotFound)` if the object is missing or deleted
    /// * `Err(StreamError::UnsupportedMediaType)` if it carries no streamable media
    /// * `Err(StreamError::MalformedMedia)` if the media is structurally unusable
    pub async fn resolve(&self, worker: &Worker, container_id: i64, object_id: i32) -> Result<MediaFile> {
        let key = MetadataCache::cache_key(container_id, object_id, worker.identity);

        if let Some(file) = self.cache.get::<MediaFile>(&key) {
            debug!("Metadata cache hit: {}", key);
            if let Some(metrics) = &self.metrics {
                metrics.record_cache_hit();
            }
            return Ok(file);
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_miss();
        }

        let file = self.fetch(worker, container_id, object_id).await?;

        if let Err(e) = self.cache.set(&key, &file, self.ttl) {
            if let Some(metrics) = &self.metrics {
                metrics.record_cache_error();
            }
            if !self.fail_open {
                warn!("Failed to cache metadata for {}: {}", key, e);
                return Err(e);
            }
            warn!("Serving uncached metadata for {}: {}", key, e);
        }

        Ok(file)
    }

    async fn fetch(&self, worker: &Worker, container_id: i64, object_id: i32) -> Result<MediaFile> {
        let peer = resolve_peer(worker, container_id).await?;
        let messages = worker.client.get_messages_by_id(&peer, &[object_id]).await?;

        let media = match messages.into_iter().next() {
            None => return Err(StreamError::ObjectNotFound("message not found".to_string())),
            Some(Message::Regular { media, .. }) => media,
            Some(Message::Service { .. } | Message::Empty { .. }) => {
                return Err(StreamError::ObjectNotFound("file was deleted".to_string()))
            }
        };

        let media = media.ok_or_else(|| {
            StreamError::UnsupportedMediaType("message carries no media".to_string())
        })?;
        let file = media_file_from_media(media)?;

        info!(
            "Resolved {}/{}: media={}, kind={}, size={}, mime={}",
            container_id,
            object_id,
            file.object_id,
            file.location.kind(),
            file.total_size,
            file.content_type()
        );
        Ok(file)
    }
}

/// Build a [`MediaFile`] from a message's media
///
/// Documents keep their reported size, type and name. Photos are addressed
/// through their last (largest) size variant and have an unknown size.
pub fn media_file_from_media(media: MessageMedia) -> Result<MediaFile> {
    match media {
        MessageMedia::Document { document } => {
            let document = document
                .ok_or_else(|| StreamError::MalformedMedia("document is empty".to_string()))?;
            let display_name = document.file_name().unwrap_or_default().to_string();

            Ok(MediaFile {
                location: FileLocation::Document {
                    id: document.id,
                    access_hash: document.access_hash,
                    file_reference: document.file_reference,
                },
                total_size: document.size,
                mime_type: document.mime_type,
                display_name,
                object_id: document.id,
            })
        }
        MessageMedia::Photo { photo } => {
            let photo =
                photo.ok_or_else(|| StreamError::MalformedMedia("photo is empty".to_string()))?;
            let thumb_size = photo
                .sizes
                .last()
                .ok_or_else(|| StreamError::MalformedMedia("photo has no sizes".to_string()))?
                .usable_type()
                .ok_or_else(|| StreamError::MalformedMedia("largest photo size is empty".to_string()))?
                .to_string();

            Ok(MediaFile {
                location: FileLocation::Photo {
                    id: photo.id,
                    access_hash: photo.access_hash,
                    file_reference: photo.file_reference,
                    thumb_size,
                },
                total_size: 0,
                mime_type: PHOTO_MIME_TYPE.to_string(),
                display_name: format!("photo_{}.jpg", photo.id),
                object_id: photo.id,
            })
        }
        other @ (MessageMedia::Geo
        | MessageMedia::Contact
        | MessageMedia::Poll
        | MessageMedia::WebPage
        | MessageMedia::Unknown) => Err(StreamError::UnsupportedMediaType(other.kind().to_string())),
    }
}
