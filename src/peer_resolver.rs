//! Container peer resolution
//!
//! Turns a bare container id into an addressable [`PeerHandle`]. The worker's
//! local directory is consulted first; only on a miss is the remote asked,
//! and a successful answer is stored so later requests skip the round trip.

use crate::error::{Result, StreamError};
use crate::remote::{PeerHandle, PeerKind};
use crate::worker_pool::Worker;
use tracing::{debug, info, warn};

/// Resolve `container_id` to a channel handle using `worker`'s session
///
/// # Returns
/// * `Ok(PeerHandle)` of kind `Channel`
/// * `Err(StreamError::ContainerNotFound)` if the remote knows no such container
/// * `Err(StreamError::UnexpectedPeerKind)` if the container is not a channel
/// * `Err(StreamError::RemoteFetchError)` if the remote lookup failed
pub async fn resolve_peer(worker: &Worker, container_id: i64) -> Result<PeerHandle> {
    match worker.directory.lookup_by_id(container_id) {
        Some(handle) if handle.kind == PeerKind::Channel => {
            debug!(
                "Peer directory hit: worker={}, container={}",
                worker.name, container_id
            );
            return Ok(handle);
        }
        Some(handle) => {
            debug!(
                "Ignoring stored {} peer for container {}",
                handle.kind, container_id
            );
        }
        None => {}
    }

    let peers = worker.client.get_container_info(container_id).await?;
    let info = peers
        .into_iter()
        .next()
        .ok_or(StreamError::ContainerNotFound(container_id))?;

    if info.kind != PeerKind::Channel {
        warn!(
            "Container {} resolved to a {}, not a channel",
            container_id, info.kind
        );
        return Err(StreamError::UnexpectedPeerKind {
            id: container_id,
            kind: info.kind.to_string(),
        });
    }

    let handle = info.handle();
    worker
        .directory
        .store(handle.id, handle.access_hash, PeerKind::Channel, "")
        .await?;
    info!(
        "Resolved container {} via remote lookup (worker={})",
        container_id, worker.name
    );

    Ok(handle)
}
