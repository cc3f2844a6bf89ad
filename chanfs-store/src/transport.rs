// SPDX-License-Identifier: AGPL-3.0-or-later
//! Chunked content transfer
//!
//! Splits content into chunks no larger than the configured size and moves
//! them through the backend with bounded parallelism. Chunk order is tracked
//! by index, so results never depend on completion order.

use bytes::{Bytes, BytesMut};
use chanfs_core::{
    ByteStream, ChanfsConfig, ChanfsError, ChanfsResult, ContentLocator, FileVersion,
    MessageBackend, StoredContent,
};
use futures::future;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::Instrument;

use crate::retry::RetryPolicy;

/// Split `data` into `ceil(len / chunk_size)` chunks. Empty input yields no
/// chunks.
pub fn split_chunks(data: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    let chunk_size = chunk_size.max(1);
    (0..data.len())
        .step_by(chunk_size)
        .map(|start| data.slice(start..(start + chunk_size).min(data.len())))
        .collect()
}

/// Moves file content to and from a [`MessageBackend`].
pub struct ChunkedTransport {
    backend: Arc<dyn MessageBackend>,
    channel: String,
    chunk_size: usize,
    max_concurrency: usize,
    retry: RetryPolicy,
}

impl ChunkedTransport {
    /// Build a transport, checking the configuration against the backend.
    pub fn new(backend: Arc<dyn MessageBackend>, config: &ChanfsConfig) -> ChanfsResult<Self> {
        config.validate(backend.max_message_size())?;
        Ok(Self {
            backend,
            channel: config.content_channel.clone(),
            chunk_size: config.chunk_size,
            max_concurrency: config.transfer.max_concurrency,
            retry: RetryPolicy::new(config.transfer.retry.clone()),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn backend(&self) -> &Arc<dyn MessageBackend> {
        &self.backend
    }

    /// Upload `data` and return its locators in content order.
    ///
    /// Any chunk that exhausts its retries aborts the whole upload with
    /// `TransferFailed`. Chunks already sent stay behind as orphans.
    pub async fn upload(&self, what: &str, data: Bytes) -> ChanfsResult<StoredContent> {
        let size = data.len() as u64;
        let content_hash = StoredContent::hash_of(&data);
        let chunks = split_chunks(&data, self.chunk_size);
        let count = chunks.len();

        let span = tracing::info_span!("upload", what, size, chunks = count);
        async move {
            let mut indexed: Vec<(usize, ContentLocator)> = stream::iter(chunks.into_iter().enumerate())
                .map(|(index, chunk)| self.upload_chunk(what, index, chunk))
                .buffer_unordered(self.max_concurrency)
                .try_collect()
                .await?;
            indexed.sort_by_key(|(index, _)| *index);

            tracing::info!("Uploaded {} ({} bytes in {} chunk(s))", what, size, count);
            Ok(StoredContent {
                size,
                content_hash,
                locators: indexed.into_iter().map(|(_, locator)| locator).collect(),
            })
        }
        .instrument(span)
        .await
    }

    async fn upload_chunk(
        &self,
        what: &str,
        index: usize,
        chunk: Bytes,
    ) -> ChanfsResult<(usize, ContentLocator)> {
        let label = format!("{what} chunk {index}");
        let len = chunk.len();
        let locator = self
            .retry
            .run(&label, || self.backend.send_chunk(&self.channel, chunk.clone()))
            .await
            .map_err(|e| e.into_transfer_failed(&label))?;
        tracing::debug!(index, len, %locator, "Sent chunk");
        Ok((index, locator))
    }

    /// Fetch the chunks and concatenate them in locator order.
    pub async fn download(&self, what: &str, locators: &[ContentLocator]) -> ChanfsResult<Bytes> {
        let span = tracing::info_span!("download", what, chunks = locators.len());
        async move {
            let mut parts: Vec<Option<Bytes>> = vec![None; locators.len()];
            let mut fetched = stream::iter(locators.iter().enumerate())
                .map(|(index, locator)| {
                    fetch_indexed(self.backend.as_ref(), &self.retry, what, index, locator)
                })
                .buffer_unordered(self.max_concurrency);
            while let Some((index, chunk)) = fetched.try_next().await? {
                parts[index] = Some(chunk);
            }

            let total = parts.iter().flatten().map(Bytes::len).sum();
            let mut buffer = BytesMut::with_capacity(total);
            for part in parts.into_iter().flatten() {
                buffer.extend_from_slice(&part);
            }
            Ok(buffer.freeze())
        }
        .instrument(span)
        .await
    }

    /// Download one version and check its length and content hash.
    pub async fn download_version(&self, what: &str, version: &FileVersion) -> ChanfsResult<Bytes> {
        let data = self.download(what, &version.locators).await?;
        if data.len() as u64 != version.size {
            return Err(integrity_error(
                what,
                format!("expected {} bytes, reassembled {}", version.size, data.len()),
            ));
        }
        if let Some(expected) = &version.content_hash {
            let actual = StoredContent::hash_of(&data);
            if &actual != expected {
                return Err(integrity_error(what, format!("content hash mismatch: {actual}")));
            }
        }
        Ok(data)
    }

    /// Lazily fetch chunks in locator order. The stream ends after the
    /// first error.
    pub fn download_stream(&self, what: &str, locators: Vec<ContentLocator>) -> ByteStream {
        let backend = Arc::clone(&self.backend);
        let retry = self.retry.clone();
        let what = what.to_string();
        let mut failed = false;

        let chunks = stream::iter(locators.into_iter().enumerate())
            .map(move |(index, locator)| {
                let backend = Arc::clone(&backend);
                let retry = retry.clone();
                let what = what.clone();
                async move {
                    fetch_indexed(backend.as_ref(), &retry, &what, index, &locator)
                        .await
                        .map(|(_, chunk)| chunk)
                }
            })
            .buffered(self.max_concurrency)
            .take_while(move |item| {
                let keep = !failed;
                failed |= item.is_err();
                future::ready(keep)
            });
        Box::pin(chunks)
    }
}

async fn fetch_indexed(
    backend: &dyn MessageBackend,
    retry: &RetryPolicy,
    what: &str,
    index: usize,
    locator: &ContentLocator,
) -> ChanfsResult<(usize, Bytes)> {
    let label = format!("{what} chunk {index}");
    let chunk = retry
        .run(&label, || backend.fetch_chunk(locator))
        .await
        .map_err(|e| e.into_transfer_failed(&label))?;
    tracing::debug!(index, len = chunk.len(), "Fetched chunk");
    Ok((index, chunk))
}

fn integrity_error(what: &str, reason: String) -> ChanfsError {
    ChanfsError::TransferFailed {
        what: what.to_string(),
        attempts: 1,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chanfs_core::RetrySettings;
    use chanfs_providers::{Fault, MemoryBackend, Operation};
    use std::time::Duration;

    const CHUNK: usize = 16;

    fn config() -> ChanfsConfig {
        ChanfsConfig::default()
            .with_chunk_size(CHUNK)
            .with_retry(RetrySettings::immediate(3))
    }

    fn payload(len: usize) -> Bytes {
        (0..len).map(|i| (i * 7 % 251) as u8).collect::<Vec<u8>>().into()
    }

    #[test]
    fn test_split_chunk_counts() {
        assert!(split_chunks(&Bytes::new(), CHUNK).is_empty());
        for (len, expected) in [(1, 1), (CHUNK - 1, 1), (CHUNK, 1), (CHUNK + 1, 2), (3 * CHUNK + 1, 4)] {
            let chunks = split_chunks(&payload(len), CHUNK);
            assert_eq!(chunks.len(), expected, "len {len}");
            assert!(chunks.iter().all(|c| c.len() <= CHUNK && !c.is_empty()));
            assert_eq!(chunks.iter().map(Bytes::len).sum::<usize>(), len);
        }
    }

    #[tokio::test]
    async fn test_round_trip_at_boundaries() {
        let backend = Arc::new(MemoryBackend::default());
        let transport = ChunkedTransport::new(backend, &config()).unwrap();

        for len in [0, 1, CHUNK - 1, CHUNK, 3 * CHUNK + 1] {
            let data = payload(len);
            let stored = transport.upload("f", data.clone()).await.unwrap();
            assert_eq!(stored.size, len as u64);
            assert_eq!(stored.locators.len(), len.div_ceil(CHUNK));

            let back = transport.download("f", &stored.locators).await.unwrap();
            assert_eq!(back, data, "len {len}");
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let backend = Arc::new(MemoryBackend::default());
        backend.inject(Operation::Send, Fault::Network, 2);
        backend.inject(Operation::Fetch, Fault::RateLimited(None), 1);
        let transport = ChunkedTransport::new(backend.clone(), &config()).unwrap();

        let data = payload(2 * CHUNK);
        let stored = transport.upload("f", data.clone()).await.unwrap();
        assert_eq!(backend.calls(Operation::Send), 4);
        assert_eq!(transport.download("f", &stored.locators).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_exhausted_retries_abort_upload() {
        let backend = Arc::new(MemoryBackend::default());
        backend.fail_always(Operation::Send, Fault::Timeout);
        let transport = ChunkedTransport::new(backend, &config()).unwrap();

        let err = transport.upload("f", payload(3 * CHUNK)).await.unwrap_err();
        match err {
            ChanfsError::TransferFailed { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exhausted_retries_abort_download() {
        let backend = Arc::new(MemoryBackend::default());
        let transport = ChunkedTransport::new(backend.clone(), &config()).unwrap();
        let single = transport.upload("f", payload(CHUNK)).await.unwrap();
        let several = transport.upload("f", payload(3 * CHUNK)).await.unwrap();

        backend.fail_always(Operation::Fetch, Fault::Timeout);
        let err = transport.download("f", &single.locators).await.unwrap_err();
        assert!(matches!(err, ChanfsError::TransferFailed { attempts: 3, .. }));
        assert_eq!(backend.calls(Operation::Fetch), 3);

        let err = transport.download("f", &several.locators).await.unwrap_err();
        assert!(matches!(err, ChanfsError::TransferFailed { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_fatal_fetch_fails_without_retry() {
        let backend = Arc::new(MemoryBackend::default());
        let transport = ChunkedTransport::new(backend.clone(), &config()).unwrap();
        let stored = transport.upload("f", payload(CHUNK)).await.unwrap();

        backend.fail_always(Operation::Fetch, Fault::Fatal);
        let err = transport.download("f", &stored.locators).await.unwrap_err();
        assert!(matches!(err, ChanfsError::TransferFailed { attempts: 1, .. }));
        assert_eq!(backend.calls(Operation::Fetch), 1);
    }

    #[tokio::test]
    async fn test_version_integrity_checked() {
        let backend = Arc::new(MemoryBackend::default());
        let transport = ChunkedTransport::new(backend, &config()).unwrap();
        let stored = transport.upload("f", payload(40)).await.unwrap();

        let mut version = FileVersion {
            id: "v".into(),
            size: stored.size,
            updated_at: chrono::Utc::now(),
            content_hash: Some(stored.content_hash.clone()),
            locators: stored.locators.clone(),
        };
        assert_eq!(transport.download_version("f", &version).await.unwrap(), payload(40));

        version.content_hash = Some(StoredContent::hash_of(b"other"));
        assert!(transport.download_version("f", &version).await.is_err());

        version.content_hash = None;
        version.size = 41;
        assert!(transport.download_version("f", &version).await.is_err());
    }

    #[tokio::test]
    async fn test_stream_yields_in_order() {
        let backend = Arc::new(MemoryBackend::default());
        let transport = ChunkedTransport::new(backend, &config()).unwrap();
        let data = payload(5 * CHUNK + 3);
        let stored = transport.upload("f", data.clone()).await.unwrap();

        let chunks: Vec<Bytes> = transport
            .download_stream("f", stored.locators)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.len(), 6);
        assert_eq!(chunks.concat(), data.to_vec());
    }

    /// Backend whose early chunks complete last.
    struct SlowStart {
        inner: MemoryBackend,
    }

    #[async_trait]
    impl MessageBackend for SlowStart {
        fn id(&self) -> &str {
            "slow-start"
        }
        fn display_name(&self) -> &str {
            "slow start"
        }
        fn max_message_size(&self) -> usize {
            self.inner.max_message_size()
        }
        async fn is_available(&self) -> bool {
            true
        }
        async fn send_chunk(&self, channel: &str, data: Bytes) -> ChanfsResult<ContentLocator> {
            let delay = 40u64.saturating_sub(data[0] as u64 * 10);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.inner.send_chunk(channel, data).await
        }
        async fn fetch_chunk(&self, locator: &ContentLocator) -> ChanfsResult<Bytes> {
            let data = self.inner.fetch_chunk(locator).await?;
            let delay = 40u64.saturating_sub(data[0] as u64 * 10);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(data)
        }
        async fn read_slot(&self, slot: &str) -> ChanfsResult<Option<Bytes>> {
            self.inner.read_slot(slot).await
        }
        async fn write_slot(&self, slot: &str, data: Bytes) -> ChanfsResult<()> {
            self.inner.write_slot(slot, data).await
        }
    }

    #[tokio::test]
    async fn test_order_independent_of_completion() {
        let backend = Arc::new(SlowStart {
            inner: MemoryBackend::default(),
        });
        let transport = ChunkedTransport::new(backend, &config().with_max_concurrency(4)).unwrap();

        // First byte of chunk i is i, so chunk 0 is the slowest.
        let data: Bytes = (0..4u8)
            .flat_map(|i| std::iter::repeat(i).take(CHUNK))
            .collect::<Vec<u8>>()
            .into();
        let stored = transport.upload("f", data.clone()).await.unwrap();
        assert_eq!(transport.download("f", &stored.locators).await.unwrap(), data);
    }
}
