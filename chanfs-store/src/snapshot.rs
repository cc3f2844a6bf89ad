// SPDX-License-Identifier: AGPL-3.0-or-later
//! Metadata snapshot persistence
//!
//! The whole namespace is serialized as one nested document and written to
//! a single backend slot, replacing whatever was there.
//!
//! Frame layout:
//!
//! ```text
//! "CHFS" | format: u8 | flags: u8 | blake3(payload): [u8; 32] | payload
//! ```
//!
//! The payload is JSON, LZ4-compressed when that makes it smaller.

use bytes::Bytes;
use chanfs_core::{
    ChanfsConfig, ChanfsError, ChanfsResult, DirectoryId, FileDescriptor, FileId, MessageBackend,
    Namespace,
};
use chrono::{DateTime, Utc};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::retry::RetryPolicy;

/// Current snapshot format version
pub const SNAPSHOT_FORMAT: u8 = 1;

const MAGIC: &[u8; 4] = b"CHFS";
const FLAG_LZ4: u8 = 0b0000_0001;
const HEADER_LEN: usize = MAGIC.len() + 2 + blake3::OUT_LEN;

/// Serialized form of a whole namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format: u8,
    pub saved_at: DateTime<Utc>,
    /// File id allocator position, so removed ids are never reissued
    #[serde(default)]
    pub next_file_id: u64,
    pub root: SnapshotDirectory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDirectory {
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub directories: Vec<SnapshotDirectory>,
    #[serde(default)]
    pub files: Vec<SnapshotFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub descriptor: FileDescriptor,
}

impl Snapshot {
    /// Capture the full state of `namespace`.
    pub fn capture(namespace: &Namespace, saved_at: DateTime<Utc>) -> ChanfsResult<Self> {
        let root = capture_directory(namespace, namespace.tree().root())?;
        Ok(Self {
            format: SNAPSHOT_FORMAT,
            saved_at,
            next_file_id: namespace.files().next_id().0,
            root,
        })
    }

    /// Rebuild a namespace, rejecting snapshots that break tree invariants.
    pub fn restore(&self) -> ChanfsResult<Namespace> {
        let mut namespace = Namespace::with_root_created_at(self.root.created_at);
        let root = namespace.tree().root();
        restore_directory(&mut namespace, root, &self.root).map_err(|e| match e {
            ChanfsError::PersistenceFailed(_) => e,
            other => ChanfsError::PersistenceFailed(format!("invalid snapshot: {other}")),
        })?;
        namespace.reserve_file_ids(FileId(self.next_file_id));
        Ok(namespace)
    }

    pub fn encode(&self, compress: bool) -> ChanfsResult<Vec<u8>> {
        let json = serde_json::to_vec(self)
            .map_err(|e| ChanfsError::PersistenceFailed(format!("encode snapshot: {e}")))?;

        let mut flags = 0;
        let payload = if compress {
            let compressed = compress_prepend_size(&json);
            if compressed.len() < json.len() {
                flags |= FLAG_LZ4;
                compressed
            } else {
                json
            }
        } else {
            json
        };

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(MAGIC);
        frame.push(self.format);
        frame.push(flags);
        frame.extend_from_slice(blake3::hash(&payload).as_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    pub fn decode(frame: &[u8]) -> ChanfsResult<Self> {
        if frame.len() < HEADER_LEN || &frame[..MAGIC.len()] != MAGIC {
            return Err(corrupt("missing snapshot header"));
        }
        let format = frame[4];
        if format != SNAPSHOT_FORMAT {
            return Err(corrupt(format!("unsupported snapshot format {format}")));
        }
        let flags = frame[5];
        let checksum = &frame[6..HEADER_LEN];
        let payload = &frame[HEADER_LEN..];
        if blake3::hash(payload).as_bytes() != checksum {
            return Err(corrupt("snapshot checksum mismatch"));
        }

        let json = if flags & FLAG_LZ4 != 0 {
            decompress_size_prepended(payload).map_err(|e| corrupt(format!("decompress: {e}")))?
        } else {
            payload.to_vec()
        };
        let snapshot: Self =
            serde_json::from_slice(&json).map_err(|e| corrupt(format!("decode snapshot: {e}")))?;
        if snapshot.format != format {
            return Err(corrupt("snapshot format does not match its header"));
        }
        Ok(snapshot)
    }
}

fn corrupt(reason: impl Into<String>) -> ChanfsError {
    ChanfsError::PersistenceFailed(reason.into())
}

fn capture_directory(namespace: &Namespace, id: DirectoryId) -> ChanfsResult<SnapshotDirectory> {
    let tree = namespace.tree();
    let node = tree.node(id)?;

    let directories = node
        .children()
        .iter()
        .map(|child| capture_directory(namespace, *child))
        .collect::<ChanfsResult<Vec<_>>>()?;
    let files = node
        .files()
        .iter()
        .map(|file| {
            Ok(SnapshotFile {
                name: file.name.clone(),
                created_at: file.created_at,
                descriptor: namespace.descriptor(file)?.clone(),
            })
        })
        .collect::<ChanfsResult<Vec<_>>>()?;

    Ok(SnapshotDirectory {
        name: node.name.clone(),
        created_at: node.created_at,
        directories,
        files,
    })
}

fn restore_directory(
    namespace: &mut Namespace,
    id: DirectoryId,
    directory: &SnapshotDirectory,
) -> ChanfsResult<()> {
    for child in &directory.directories {
        let child_id = namespace.restore_directory(&child.name, id, child.created_at)?;
        restore_directory(namespace, child_id, child)?;
    }
    for file in &directory.files {
        if file.descriptor.version_count() == 0 {
            return Err(corrupt(format!("file {} has no versions", file.name)));
        }
        namespace.restore_file(id, &file.name, file.created_at, file.descriptor.clone())?;
    }
    Ok(())
}

/// Saves and loads the snapshot slot.
pub struct MetadataStore {
    backend: Arc<dyn MessageBackend>,
    slot: String,
    compress: bool,
    retry: RetryPolicy,
}

impl MetadataStore {
    pub fn new(backend: Arc<dyn MessageBackend>, config: &ChanfsConfig) -> Self {
        Self {
            backend,
            slot: config.metadata_slot.clone(),
            compress: config.snapshot.compress,
            retry: RetryPolicy::new(config.transfer.retry.clone()),
        }
    }

    /// Load the latest snapshot. An empty slot yields an empty namespace.
    pub async fn load(&self) -> ChanfsResult<Namespace> {
        let frame = self
            .retry
            .run("snapshot load", || self.backend.read_slot(&self.slot))
            .await
            .map_err(|e| e.into_persistence_failed("snapshot load"))?;

        let Some(frame) = frame else {
            tracing::info!("No snapshot in slot {}, starting empty", self.slot);
            return Ok(Namespace::with_root_created_at(Utc::now()));
        };
        let snapshot = Snapshot::decode(&frame)?;
        let namespace = snapshot.restore()?;
        tracing::info!(
            slot = %self.slot,
            saved_at = %snapshot.saved_at,
            directories = namespace.tree().len(),
            files = namespace.files().len(),
            "Loaded snapshot"
        );
        Ok(namespace)
    }

    /// Overwrite the slot with the full state of `namespace`.
    pub async fn save(&self, namespace: &Namespace) -> ChanfsResult<()> {
        let frame = Bytes::from(Snapshot::capture(namespace, Utc::now())?.encode(self.compress)?);
        let size = frame.len();
        self.retry
            .run("snapshot save", || self.backend.write_slot(&self.slot, frame.clone()))
            .await
            .map_err(|e| e.into_persistence_failed("snapshot save"))?;
        tracing::debug!(slot = %self.slot, size, "Saved snapshot");
        Ok(())
    }
}
