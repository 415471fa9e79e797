//! Local directory of resolved container peers
//!
//! Access hashes are scoped to the remote session that obtained them, so each
//! worker owns its own directory. Entries are created on the first successful
//! remote lookup and never removed.

use crate::error::{Result, StreamError};
use crate::remote::{PeerHandle, PeerKind};
use serde::{Deserialize, Serialize};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

const SNAPSHOT_VERSION: u32 = 1;

/// Store of previously resolved peers
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    /// Find a stored peer by id
    fn lookup_by_id(&self, id: i64) -> Option<PeerHandle>;

    /// Record a resolved peer, replacing any previous entry for `id`
    async fn store(&self, id: i64, access_hash: i64, kind: PeerKind, label: &str) -> Result<()>;

    /// Persist pending entries, if the directory is backed by storage
    async fn flush(&self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredPeer {
    access_hash: i64,
    kind: PeerKind,
    #[serde(default)]
    label: String,
}

/// On-disk JSON layout
#[derive(Debug, Serialize, Deserialize)]
struct PeerSnapshot {
    version: u32,
    /// BTreeMap for a stable file layout
    peers: BTreeMap<i64, StoredPeer>,
}

/// In-memory peer directory with optional JSON persistence
pub struct MemoryPeerDirectory {
    peers: RwLock<HashMap<i64, StoredPeer>>,
    path: Option<PathBuf>,
    /// Serialises snapshot writes; held from snapshot build through rename
    write_lock: Mutex<()>,
}

impl Default for MemoryPeerDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPeerDirectory {
    /// Create a directory that lives only in memory
    pub fn new() -> Self {
        MemoryPeerDirectory {
            peers: RwLock::new(HashMap::new()),
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Open a directory persisted at `path`
    ///
    /// A missing file yields an empty directory; the file is created on the
    /// first flush. Called once at startup, before any request is served.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let peers = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let snapshot: PeerSnapshot = serde_json::from_str(&content).map_err(|e| {
                StreamError::ConfigError(format!(
                    "Failed to parse peer directory {}: {}",
                    path.display(),
                    e
                ))
            })?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(StreamError::ConfigError(format!(
                    "Unsupported peer directory version {} in {}",
                    snapshot.version,
                    path.display()
                )));
            }
            info!("Loaded {} peers from {}", snapshot.peers.len(), path.display());
            snapshot.peers.into_iter().collect()
        } else {
            debug!("Peer directory {} does not exist yet", path.display());
            HashMap::new()
        };

        Ok(MemoryPeerDirectory {
            peers: RwLock::new(peers),
            path: Some(path),
            write_lock: Mutex::new(()),
        })
    }

    pub fn len(&self) -> usize {
        self.peers.read().map(|peers| peers.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned<E: std::fmt::Display>(e: E) -> StreamError {
        StreamError::InternalError(format!("peer directory lock poisoned: {}", e))
    }

    async fn write_snapshot(&self, path: &Path) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let snapshot = {
            let peers = self.peers.read().map_err(Self::poisoned)?;
            PeerSnapshot {
                version: SNAPSHOT_VERSION,
                peers: peers.iter().map(|(id, peer)| (*id, peer.clone())).collect(),
            }
        };

        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| StreamError::InternalError(format!("peer snapshot encoding: {}", e)))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Atomic replace
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!("Flushed {} peers to {}", snapshot.peers.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl PeerDirectory for MemoryPeerDirectory {
    fn lookup_by_id(&self, id: i64) -> Option<PeerHandle> {
        let peers = self.peers.read().ok()?;
        peers.get(&id).map(|peer| PeerHandle {
            id,
            access_hash: peer.access_hash,
            kind: peer.kind,
        })
    }

    async fn store(&self, id: i64, access_hash: i64, kind: PeerKind, label: &str) -> Result<()> {
        {
            let mut peers = self.peers.write().map_err(Self::poisoned)?;
            peers.insert(
                id,
                StoredPeer {
                    access_hash,
                    kind,
                    label: label.to_string(),
                },
            );
        }
        debug!("Stored peer: id={}, kind={}", id, kind);

        match &self.path {
            Some(path) => self.write_snapshot(path).await,
            None => Ok(()),
        }
    }

    async fn flush(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.write_snapshot(path).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_store_and_lookup() {
        let directory = MemoryPeerDirectory::new();
        assert_eq!(directory.lookup_by_id(-100), None);

        directory.store(-100, 42, PeerKind::Channel, "").await.unwrap();
        assert_eq!(
            directory.lookup_by_id(-100),
            Some(PeerHandle { id: -100, access_hash: 42, kind: PeerKind::Channel })
        );
        assert_eq!(directory.len(), 1);
    }

    #[tokio::test]
    async fn test_store_replaces_entry() {
        let directory = MemoryPeerDirectory::new();
        directory.store(7, 1, PeerKind::User, "").await.unwrap();
        directory.store(7, 2, PeerKind::Channel, "").await.unwrap();

        let handle = directory.lookup_by_id(7).unwrap();
        assert_eq!(handle.access_hash, 2);
        assert_eq!(handle.kind, PeerKind::Channel);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("peers").join("worker-1.json");

        {
            let directory = MemoryPeerDirectory::open(&path).unwrap();
            assert!(directory.is_empty());
            directory.store(-100, 42, PeerKind::Channel, "news").await.unwrap();
        }

        let reopened = MemoryPeerDirectory::open(&path).unwrap();
        assert_eq!(reopened.lookup_by_id(-100).map(|h| h.access_hash), Some(42));
    }

    #[test]
    fn test_open_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("peers.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            MemoryPeerDirectory::open(&path),
            Err(StreamError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_flush_without_path_is_noop() {
        let directory = MemoryPeerDirectory::new();
        directory.store(1, 1, PeerKind::Channel, "").await.unwrap();
        assert!(directory.flush().await.is_ok());
    }
}
