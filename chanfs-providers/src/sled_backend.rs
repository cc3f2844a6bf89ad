// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sled-backed message store
//!
//! Each channel is its own tree keyed by big-endian message id. Slots share
//! one dedicated tree and are flushed on every write.

use async_trait::async_trait;
use bytes::Bytes;
use chanfs_core::{ChanfsError, ChanfsResult, ContentLocator, MessageBackend};
use sled::{Db, Tree};
use std::path::Path;

use crate::locator;

/// Default per-message limit (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

const SLOT_TREE: &str = "__slots";
const CHANNEL_PREFIX: &str = "channel:";

/// Message backend persisted in a local sled database
pub struct SledBackend {
    id: String,
    db: Db,
    slots: Tree,
    max_message_size: usize,
}

impl SledBackend {
    /// Open or create a database at the given path
    pub fn open(path: impl AsRef<Path>) -> ChanfsResult<Self> {
        let db = sled::open(path).map_err(|e| db_error("sled", e))?;
        Self::from_db(db)
    }

    /// Database that is deleted when dropped
    pub fn temporary() -> ChanfsResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| db_error("sled", e))?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> ChanfsResult<Self> {
        let slots = db.open_tree(SLOT_TREE).map_err(|e| db_error("sled", e))?;
        Ok(Self {
            id: "sled".into(),
            db,
            slots,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        })
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    fn channel(&self, channel: &str) -> ChanfsResult<Tree> {
        self.db
            .open_tree(format!("{CHANNEL_PREFIX}{channel}"))
            .map_err(|e| db_error(&self.id, e))
    }

    /// Get database size on disk
    pub fn size_on_disk(&self) -> ChanfsResult<u64> {
        self.db.size_on_disk().map_err(|e| db_error(&self.id, e))
    }
}

fn db_error(backend: &str, e: sled::Error) -> ChanfsError {
    ChanfsError::Backend {
        backend: backend.to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl MessageBackend for SledBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Local sled store"
    }

    fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    async fn is_available(&self) -> bool {
        self.db.size_on_disk().is_ok()
    }

    async fn send_chunk(&self, channel: &str, data: Bytes) -> ChanfsResult<ContentLocator> {
        if data.len() > self.max_message_size {
            return Err(ChanfsError::Backend {
                backend: self.id.clone(),
                message: format!(
                    "message of {} bytes exceeds limit of {}",
                    data.len(),
                    self.max_message_size
                ),
            });
        }

        let tree = self.channel(channel)?;
        let message_id = self.db.generate_id().map_err(|e| db_error(&self.id, e))?;
        tree.insert(message_id.to_be_bytes(), data.as_ref())
            .map_err(|e| db_error(&self.id, e))?;

        tracing::trace!(channel, message_id, size = data.len(), "Stored message");
        Ok(locator::encode(channel, message_id))
    }

    async fn fetch_chunk(&self, locator: &ContentLocator) -> ChanfsResult<Bytes> {
        let (channel, message_id) = locator::decode(&self.id, locator)?;
        let tree = self.channel(channel)?;
        tree.get(message_id.to_be_bytes())
            .map_err(|e| db_error(&self.id, e))?
            .map(|value| Bytes::from(value.to_vec()))
            .ok_or_else(|| ChanfsError::Backend {
                backend: self.id.clone(),
                message: format!("no message at {locator}"),
            })
    }

    async fn read_slot(&self, slot: &str) -> ChanfsResult<Option<Bytes>> {
        self.slots
            .get(slot)
            .map_err(|e| db_error(&self.id, e))
            .map(|opt| opt.map(|value| Bytes::from(value.to_vec())))
    }

    async fn write_slot(&self, slot: &str, data: Bytes) -> ChanfsResult<()> {
        self.slots
            .insert(slot, data.as_ref())
            .map_err(|e| db_error(&self.id, e))?;
        self.db
            .flush_async()
            .await
            .map_err(|e| db_error(&self.id, e))?;
        Ok(())
    }
}
