// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtime configuration
//!
//! One [`ChanfsConfig`] value is built at startup and handed to every
//! component that needs it. Nothing reads configuration from globals.

use serde::{Deserialize, Serialize};

use crate::error::{ChanfsError, ChanfsResult};

/// Default chunk size (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Default number of chunks in flight per transfer.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChanfsConfig {
    /// Bytes per content chunk
    pub chunk_size: usize,
    /// Backend location receiving content chunks
    pub content_channel: String,
    /// Well-known slot holding the metadata snapshot
    pub metadata_slot: String,
    pub transfer: TransferSettings,
    pub snapshot: SnapshotSettings,
}

impl Default for ChanfsConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            content_channel: "chanfs-content".into(),
            metadata_slot: "chanfs-metadata".into(),
            transfer: TransferSettings::default(),
            snapshot: SnapshotSettings::default(),
        }
    }
}

impl ChanfsConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.transfer.retry = retry;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.transfer.max_concurrency = max_concurrency;
        self
    }

    /// Check the configuration against the backend's message size limit.
    pub fn validate(&self, max_message_size: usize) -> ChanfsResult<()> {
        if self.chunk_size == 0 {
            return Err(ChanfsError::Config("chunk_size must be positive".into()));
        }
        if self.chunk_size > max_message_size {
            return Err(ChanfsError::Config(format!(
                "chunk_size {} exceeds the backend message limit of {} bytes",
                self.chunk_size, max_message_size
            )));
        }
        if self.content_channel.trim().is_empty() {
            return Err(ChanfsError::Config("content_channel must not be empty".into()));
        }
        if self.metadata_slot.trim().is_empty() {
            return Err(ChanfsError::Config("metadata_slot must not be empty".into()));
        }
        if self.transfer.max_concurrency == 0 {
            return Err(ChanfsError::Config("transfer.max_concurrency must be positive".into()));
        }
        self.transfer.retry.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Chunks in flight at once for one file version
    pub max_concurrency: usize,
    pub retry: RetrySettings,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            retry: RetrySettings::default(),
        }
    }
}

/// Retry settings for backend calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Backoff multiplier (exponential backoff).
    pub backoff_multiplier: f64,
    /// Fraction of each delay randomized away, in `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 200,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl RetrySettings {
    /// Settings with no waiting between attempts. Handy in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 1.0,
            jitter: 0.0,
        }
    }

    pub fn validate(&self) -> ChanfsResult<()> {
        if self.max_attempts == 0 {
            return Err(ChanfsError::Config("retry.max_attempts must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ChanfsError::Config("retry.jitter must be within 0.0..=1.0".into()));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(ChanfsError::Config("retry.backoff_multiplier must be >= 1.0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    /// LZ4-compress the snapshot payload when that makes it smaller
    pub compress: bool,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self { compress: true }
    }
}
