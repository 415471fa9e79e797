//! Integration tests for HttpRemoteClient against a mock bridge

use media_stream::models::FileLocation;
use media_stream::remote::{BlockPayload, Message, MessageMedia, PeerHandle, PeerKind, RemoteClient};
use media_stream::{
    ChunkedReader, HttpRemoteClient, MemoryPeerDirectory, Result, StreamError, Worker,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn location() -> FileLocation {
    FileLocation::Document {
        id: 10,
        access_hash: 20,
        file_reference: vec![1, 2, 3],
    }
}

fn object(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 199) as u8).collect()
}

/// Serve `/blocks` by slicing `data` at the requested offset and limit
async fn mount_blocks(server: &MockServer, data: Vec<u8>) {
    Mock::given(method("POST"))
        .and(path("/blocks"))
        .respond_with(move |req: &wiremock::Request| {
            let mut offset = 0usize;
            let mut limit = 0usize;
            for (key, value) in req.url.query_pairs() {
                match key.as_ref() {
                    "offset" => offset = value.parse().unwrap_or(0),
                    "limit" => limit = value.parse().unwrap_or(0),
                    _ => {}
                }
            }
            let start = offset.min(data.len());
            let end = (offset + limit).min(data.len());
            ResponseTemplate::new(200).set_body_bytes(data[start..end].to_vec())
        })
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_get_container_info() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/containers/-100"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": -100, "access_hash": 55, "kind": "channel", "title": "Films"}
        ])))
        .mount(&server)
        .await;

    let client = HttpRemoteClient::new(server.uri(), "secret").unwrap();
    let peers = client.get_container_info(-100).await.unwrap();

    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].access_hash, 55);
    assert_eq!(peers[0].kind, PeerKind::Channel);
    assert_eq!(peers[0].title, "Films");
}

#[tokio::test]
async fn test_unknown_container_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/containers/7"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = HttpRemoteClient::new(server.uri(), "t").unwrap();
    assert!(client.get_container_info(7).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_messages_by_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/containers/-100/messages"))
        .and(query_param("ids", "4,5"))
        .and(query_param("access_hash", "55"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"type": "message", "id": 4, "media": {"type": "geo"}},
            {"type": "empty", "id": 5}
        ])))
        .mount(&server)
        .await;

    let client = HttpRemoteClient::new(server.uri(), "t").unwrap();
    let peer = PeerHandle { id: -100, access_hash: 55, kind: PeerKind::Channel };
    let messages = client.get_messages_by_id(&peer, &[4, 5]).await.unwrap();

    assert_eq!(
        messages,
        vec![
            Message::Regular { id: 4, media: Some(MessageMedia::Geo) },
            Message::Empty { id: 5 },
        ]
    );
}

#[tokio::test]
async fn test_malformed_json_is_unexpected_shape() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/containers/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let client = HttpRemoteClient::new(server.uri(), "t").unwrap();
    assert!(matches!(
        client.get_container_info(1).await,
        Err(StreamError::UnexpectedResponseShape(_))
    ));
}

#[tokio::test]
async fn test_server_error_is_remote_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/blocks"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = HttpRemoteClient::new(server.uri(), "t").unwrap();
    assert!(matches!(
        client.fetch_block(&location(), 0, 4096).await,
        Err(StreamError::RemoteFetchError(_))
    ));
}

#[tokio::test]
async fn test_fetch_block_and_cdn_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/blocks"))
        .and(query_param("offset", "4096"))
        .respond_with(ResponseTemplate::new(303).insert_header("location", "https://cdn.example/1"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/blocks"))
        .and(query_param("offset", "0"))
        .and(query_param("limit", "4096"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
        .mount(&server)
        .await;

    let client = HttpRemoteClient::new(server.uri(), "t").unwrap();

    match client.fetch_block(&location(), 0, 4096).await.unwrap() {
        BlockPayload::Bytes(data) => assert_eq!(data.len(), 4096),
        other => panic!("expected bytes, got {:?}", other),
    }
    assert_eq!(
        client.fetch_block(&location(), 4096, 4096).await.unwrap(),
        BlockPayload::CdnRedirect { location: "https://cdn.example/1".to_string() }
    );
}

#[tokio::test]
async fn test_chunked_reader_over_http() -> Result<()> {
    let server = MockServer::start().await;
    let data = object(20_000);
    mount_blocks(&server, data.clone()).await;

    let client = Arc::new(HttpRemoteClient::new(server.uri(), "t")?);
    let mut reader = ChunkedReader::new(client, location(), 5_000, 17_000, 12_001, 4096)?
        .with_timeout(Some(Duration::from_secs(5)));

    let mut out = Vec::new();
    while let Some(chunk) = reader.next_chunk().await? {
        out.extend_from_slice(&chunk);
    }
    assert_eq!(out, &data[5_000..=17_000]);
    Ok(())
}

#[tokio::test]
async fn test_chunked_reader_rejects_cdn_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/blocks"))
        .respond_with(ResponseTemplate::new(303).insert_header("location", "https://cdn.example/2"))
        .mount(&server)
        .await;

    let client = Arc::new(HttpRemoteClient::new(server.uri(), "t").unwrap());
    let mut reader = ChunkedReader::new(client, location(), 0, 99, 100, 4096).unwrap();
    assert!(matches!(
        reader.next_chunk().await,
        Err(StreamError::UnexpectedResponseShape(_))
    ));
    // The reader is finished after an error
    assert!(reader.next_chunk().await.unwrap().is_none());
}

#[tokio::test]
async fn test_short_block_truncates_stream() {
    let server = MockServer::start().await;
    // The bridge claims a bigger object than it serves
    mount_blocks(&server, object(1000)).await;

    let client = Arc::new(HttpRemoteClient::new(server.uri(), "t").unwrap());
    let mut reader = ChunkedReader::new(client, location(), 0, 4999, 5000, 4096).unwrap();
    assert!(matches!(
        reader.next_chunk().await,
        Err(StreamError::TruncatedStream { expected: 5000, delivered: 0 })
    ));
}

#[tokio::test]
async fn test_peer_resolution_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/containers/-100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": -100, "access_hash": 55, "kind": "channel"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let worker = Worker::new(
        "http",
        1,
        Arc::new(HttpRemoteClient::new(server.uri(), "t").unwrap()),
        Arc::new(MemoryPeerDirectory::new()),
    );

    for _ in 0..3 {
        let peer = media_stream::resolve_peer(&worker, -100).await.unwrap();
        assert_eq!(peer.access_hash, 55);
    }
    // Dropping the server verifies the lookup happened once
}
