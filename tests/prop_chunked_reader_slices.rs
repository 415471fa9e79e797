// Property: for any object and any window inside it, the chunked reader
// delivers exactly the bytes of that window, in order, with every remote
// fetch starting on a block boundary.

use bytes::{Bytes, BytesMut};
use media_stream::models::FileLocation;
use media_stream::remote::{BlockPayload, RemoteClient};
use media_stream::{BlockCalculator, ByteRange, ChunkedReader, MemoryRemoteClient};
use proptest::prelude::*;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn object(len: usize, seed: u8) -> Bytes {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect::<Vec<u8>>()
        .into()
}

/// Store one document and return its location
fn store(client: &MemoryRemoteClient, data: Bytes) -> FileLocation {
    client.add_channel(-1, 1);
    let id = client.add_document(-1, 1, None, "", data);
    FileLocation::Document {
        id,
        access_hash: id * 31,
        file_reference: id.to_be_bytes().to_vec(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Concatenated chunks equal the requested slice of the object
    #[test]
    fn prop_reader_delivers_exact_window(
        len in 1usize..20_000,
        block_pow in 0u32..4,
        a in 0usize..20_000,
        b in 0usize..20_000,
        seed in any::<u8>(),
    ) {
        let rt = Runtime::new().unwrap();
        let block_size = 1024usize << block_pow;
        let start = (a % len) as u64;
        let end = (b % len) as u64;
        let (start, end) = if start <= end { (start, end) } else { (end, start) };

        let result: Result<(), TestCaseError> = rt.block_on(async {
            let client = Arc::new(MemoryRemoteClient::new());
            let data = object(len, seed);
            let location = store(&client, data.clone());

            let mut reader = ChunkedReader::new(
                client.clone(),
                location,
                start,
                end,
                end - start + 1,
                block_size,
            ).unwrap();

            let mut out = BytesMut::new();
            let mut chunks = 0u64;
            while let Some(chunk) = reader.next_chunk().await.unwrap() {
                prop_assert!(!chunk.is_empty());
                prop_assert!(chunk.len() <= block_size);
                out.extend_from_slice(&chunk);
                chunks += 1;
            }

            prop_assert_eq!(&out[..], &data[start as usize..=end as usize]);
            prop_assert_eq!(reader.delivered(), end - start + 1);

            let expected_blocks = BlockCalculator::new(block_size)
                .count_blocks(ByteRange { start, end }) as u64;
            prop_assert_eq!(chunks, expected_blocks);
            prop_assert_eq!(client.call_counts().blocks, expected_blocks);
            Ok(())
        });
        result?;
    }

    /// Every block fetch offset is a multiple of the block size
    #[test]
    fn prop_fetch_offsets_are_aligned(
        len in 1usize..50_000,
        a in 0usize..50_000,
        block_pow in 0u32..3,
    ) {
        let rt = Runtime::new().unwrap();
        let block_size = 4096usize << block_pow;
        let start = (a % len) as u64;
        let end = len as u64 - 1;

        let result: Result<(), TestCaseError> = rt.block_on(async {
            let inner = Arc::new(MemoryRemoteClient::new());
            let location = store(&inner, object(len, 7));
            let recorder = Arc::new(OffsetRecorder { inner, offsets: Default::default() });

            let stream = ChunkedReader::new(recorder.clone(), location, start, end, end - start + 1, block_size)
                .unwrap()
                .into_stream();
            futures::pin_mut!(stream);
            while let Some(chunk) = futures::StreamExt::next(&mut stream).await {
                prop_assert!(chunk.is_ok());
            }

            let offsets = recorder.offsets.lock().unwrap().clone();
            prop_assert!(!offsets.is_empty());
            for (offset, limit) in offsets {
                prop_assert_eq!(offset % block_size as u64, 0);
                prop_assert_eq!(limit as usize, block_size);
            }
            Ok(())
        });
        result?;
    }
}

/// Records the offset and limit of every block fetch
struct OffsetRecorder {
    inner: Arc<MemoryRemoteClient>,
    offsets: std::sync::Mutex<Vec<(u64, u32)>>,
}

#[async_trait::async_trait]
impl RemoteClient for OffsetRecorder {
    async fn get_container_info(&self, id: i64) -> media_stream::Result<Vec<media_stream::remote::PeerInfo>> {
        self.inner.get_container_info(id).await
    }

    async fn get_messages_by_id(
        &self,
        peer: &media_stream::remote::PeerHandle,
        ids: &[i32],
    ) -> media_stream::Result<Vec<media_stream::remote::Message>> {
        self.inner.get_messages_by_id(peer, ids).await
    }

    async fn fetch_block(
        &self,
        location: &FileLocation,
        offset: u64,
        limit: u32,
    ) -> media_stream::Result<BlockPayload> {
        self.offsets.lock().unwrap().push((offset, limit));
        self.inner.fetch_block(location, offset, limit).await
    }
}
