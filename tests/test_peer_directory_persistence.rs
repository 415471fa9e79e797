//! Peer directories survive a restart

use media_stream::remote::PeerKind;
use media_stream::{resolve_peer, MemoryPeerDirectory, MemoryRemoteClient, PeerDirectory, Worker};
use std::sync::Arc;

#[tokio::test]
async fn test_resolved_peer_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("w0.json");
    let client = Arc::new(MemoryRemoteClient::new());
    client.add_channel(-100, 99);

    {
        let worker = Worker::new(
            "w0",
            1,
            client.clone(),
            Arc::new(MemoryPeerDirectory::open(&path).unwrap()),
        );
        let peer = resolve_peer(&worker, -100).await.unwrap();
        assert_eq!(peer.access_hash, 99);
        worker.directory.flush().await.unwrap();
    }
    assert_eq!(client.call_counts().container_info, 1);

    // Fresh process: directory reloaded from disk, no remote lookup
    let directory = MemoryPeerDirectory::open(&path).unwrap();
    assert_eq!(directory.len(), 1);
    let worker = Worker::new("w0", 1, client.clone(), Arc::new(directory));
    let peer = resolve_peer(&worker, -100).await.unwrap();

    assert_eq!(peer.kind, PeerKind::Channel);
    assert_eq!(peer.access_hash, 99);
    assert_eq!(client.call_counts().container_info, 1);
}

#[tokio::test]
async fn test_non_channel_is_not_stored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("w0.json");
    let client = Arc::new(MemoryRemoteClient::new());
    client.add_container(5, 1, PeerKind::User);

    let directory = Arc::new(MemoryPeerDirectory::open(&path).unwrap());
    let worker = Worker::new("w0", 1, client, directory.clone());

    assert!(resolve_peer(&worker, 5).await.is_err());
    assert!(directory.is_empty());
    assert!(directory.lookup_by_id(5).is_none());
}

#[test]
fn test_corrupt_snapshot_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{\"version\": 1, \"peers\": [").unwrap();

    assert!(MemoryPeerDirectory::open(&path).is_err());
}

#[tokio::test]
async fn test_store_writes_through() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("w1.json");

    let directory = MemoryPeerDirectory::open(&path).unwrap();
    directory.store(-7, 70, PeerKind::Channel, "films").await.unwrap();
    assert!(path.exists());

    let reopened = MemoryPeerDirectory::open(&path).unwrap();
    let handle = reopened.lookup_by_id(-7).unwrap();
    assert_eq!(handle.access_hash, 70);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stores_all_persist() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("w0.json");
    let directory = Arc::new(MemoryPeerDirectory::open(&path).unwrap());

    let mut handles = vec![];
    for task in 0..8i64 {
        let directory = Arc::clone(&directory);
        handles.push(tokio::spawn(async move {
            for i in 0..50i64 {
                let id = -(task * 1000 + i + 1);
                directory.store(id, id * 3, PeerKind::Channel, "").await?;
            }
            Ok::<_, media_stream::StreamError>(())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(directory.len(), 400);

    // Last snapshot on disk holds every entry
    let reopened = MemoryPeerDirectory::open(&path).unwrap();
    assert_eq!(reopened.len(), 400);
    assert_eq!(reopened.lookup_by_id(-7050).map(|h| h.access_hash), Some(-7050 * 3));
    assert!(!path.with_extension("json.tmp").exists());
}
