// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message backend trait

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use crate::error::ChanfsResult;
use crate::version::ContentLocator;

/// Byte stream type
pub type ByteStream = Pin<Box<dyn Stream<Item = ChanfsResult<Bytes>> + Send>>;

/// A message-based store used as a durable blob store.
///
/// Content goes out as individual messages on a channel, each bounded by
/// [`max_message_size`](MessageBackend::max_message_size). Metadata lives
/// in named slots that are overwritten as a whole.
///
/// Implementations report transient trouble as `Network`, `RateLimited` or
/// `Timeout` so callers can retry; anything else is treated as fatal.
#[async_trait]
pub trait MessageBackend: Send + Sync {
    fn id(&self) -> &str;
    fn display_name(&self) -> &str;

    /// Largest payload a single message may carry.
    fn max_message_size(&self) -> usize;

    async fn is_available(&self) -> bool;

    /// Store one chunk as a new message on `channel`.
    async fn send_chunk(&self, channel: &str, data: Bytes) -> ChanfsResult<ContentLocator>;

    /// Fetch a previously stored chunk.
    async fn fetch_chunk(&self, locator: &ContentLocator) -> ChanfsResult<Bytes>;

    /// Read the current contents of a slot, `None` if it was never written.
    async fn read_slot(&self, slot: &str) -> ChanfsResult<Option<Bytes>>;

    /// Replace the contents of a slot.
    async fn write_slot(&self, slot: &str, data: Bytes) -> ChanfsResult<()>;
}
