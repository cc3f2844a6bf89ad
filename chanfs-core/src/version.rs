// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-file version history
//!
//! A [`FileDescriptor`] is the complete, append-only history of one logical
//! file. "Latest" always means the most recently appended version; version
//! ids and timestamps are never compared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{ChanfsError, ChanfsResult};

/// Identifier of a [`FileDescriptor`] inside the version store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Opaque version identifier. Carries no ordering meaning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionId(pub String);

impl VersionId {
    /// Derive a fresh id from the owning file, its slot in the history and
    /// the update time.
    fn derive(file: FileId, index: usize, at: &DateTime<Utc>) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&file.0.to_le_bytes());
        hasher.update(&(index as u64).to_le_bytes());
        hasher.update(at.to_rfc3339().as_bytes());
        let hash = hasher.finalize();
        Self(hex::encode(&hash.as_bytes()[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque handle to one stored chunk, produced by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentLocator(pub String);

impl ContentLocator {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content produced by one upload, ready to become a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub size: u64,
    /// BLAKE3 hex digest of the full content
    pub content_hash: String,
    /// Chunk locators in content order
    pub locators: Vec<ContentLocator>,
}

impl StoredContent {
    pub fn hash_of(data: &[u8]) -> String {
        blake3::hash(data).to_hex().to_string()
    }
}

/// One immutable version of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersion {
    pub id: VersionId,
    pub size: u64,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub content_hash: Option<String>,
    /// Concatenating these chunks in order yields the version's bytes.
    pub locators: Vec<ContentLocator>,
}

/// Complete version history of one logical file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: FileId,
    pub created_at: DateTime<Utc>,
    versions: Vec<FileVersion>,
}

impl FileDescriptor {
    fn new(id: FileId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at,
            versions: Vec::new(),
        }
    }

    /// Rebuild a descriptor from persisted parts. The history must be
    /// non-empty.
    pub fn from_parts(
        id: FileId,
        created_at: DateTime<Utc>,
        versions: Vec<FileVersion>,
    ) -> ChanfsResult<Self> {
        if versions.is_empty() {
            return Err(ChanfsError::PersistenceFailed(format!(
                "file {id} has no versions"
            )));
        }
        Ok(Self {
            id,
            created_at,
            versions,
        })
    }

    /// Append a version. Earlier versions are never touched.
    pub fn append_version(&mut self, content: StoredContent, updated_at: DateTime<Utc>) -> &FileVersion {
        let id = VersionId::derive(self.id, self.versions.len(), &updated_at);
        self.versions.push(FileVersion {
            id,
            size: content.size,
            updated_at,
            content_hash: Some(content.content_hash),
            locators: content.locators,
        });
        let last = self.versions.len() - 1;
        &self.versions[last]
    }

    /// The most recently appended version.
    pub fn latest(&self) -> Option<&FileVersion> {
        self.versions.last()
    }

    pub fn latest_version_id(&self) -> Option<&VersionId> {
        self.latest().map(|v| &v.id)
    }

    pub fn version(&self, id: &VersionId) -> Option<&FileVersion> {
        self.versions.iter().find(|v| &v.id == id)
    }

    /// Versions in append order, oldest first.
    pub fn versions(&self) -> &[FileVersion] {
        &self.versions
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }
}

/// All file descriptors, keyed by [`FileId`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileVersionStore {
    descriptors: HashMap<FileId, FileDescriptor>,
    next_id: u64,
}

impl FileVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a descriptor whose first version is `content`.
    pub fn create(&mut self, content: StoredContent, now: DateTime<Utc>) -> FileId {
        let id = FileId(self.next_id);
        self.next_id += 1;

        let mut descriptor = FileDescriptor::new(id, now);
        descriptor.append_version(content, now);
        self.descriptors.insert(id, descriptor);
        id
    }

    /// Insert a persisted descriptor, keeping the id allocator ahead of it.
    pub fn insert(&mut self, descriptor: FileDescriptor) -> ChanfsResult<()> {
        let id = descriptor.id;
        if self.descriptors.contains_key(&id) {
            return Err(ChanfsError::PersistenceFailed(format!(
                "duplicate file id {id}"
            )));
        }
        self.next_id = self.next_id.max(id.0 + 1);
        self.descriptors.insert(id, descriptor);
        Ok(())
    }

    /// The id the next [`create`](Self::create) hands out.
    pub fn next_id(&self) -> FileId {
        FileId(self.next_id)
    }

    /// Never hand out ids below `next`, even ones no live descriptor holds.
    pub fn reserve_until(&mut self, next: FileId) {
        self.next_id = self.next_id.max(next.0);
    }

    pub fn get(&self, id: FileId) -> Option<&FileDescriptor> {
        self.descriptors.get(&id)
    }

    pub fn get_or_err(&self, id: FileId) -> ChanfsResult<&FileDescriptor> {
        self.get(id)
            .ok_or_else(|| ChanfsError::NotFound(format!("file descriptor {id}")))
    }

    pub fn append_version(
        &mut self,
        id: FileId,
        content: StoredContent,
        now: DateTime<Utc>,
    ) -> ChanfsResult<&FileVersion> {
        let descriptor = self
            .descriptors
            .get_mut(&id)
            .ok_or_else(|| ChanfsError::NotFound(format!("file descriptor {id}")))?;
        Ok(descriptor.append_version(content, now))
    }

    /// Drop a descriptor and its whole history.
    pub fn remove(&mut self, id: FileId) -> Option<FileDescriptor> {
        self.descriptors.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
