// SPDX-License-Identifier: AGPL-3.0-or-later
//! File system entries and listings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path::FsPath;
use crate::tree::FileRef;
use crate::version::FileDescriptor;

/// Entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
}

/// A file system entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub path: FsPath,
    pub kind: EntryKind,
    pub created: DateTime<Utc>,
    /// Latest version's update time (files only)
    pub modified: Option<DateTime<Utc>>,
    /// Latest version's size (files only)
    pub size: Option<u64>,
    pub file: Option<FileRef>,
}

impl Entry {
    pub fn directory(path: FsPath, created: DateTime<Utc>) -> Self {
        Self {
            path,
            kind: EntryKind::Directory,
            created,
            modified: None,
            size: None,
            file: None,
        }
    }

    pub fn file(path: FsPath, file: &FileRef, descriptor: &FileDescriptor) -> Self {
        let latest = descriptor.latest();
        Self {
            path,
            kind: EntryKind::File,
            created: descriptor.created_at,
            modified: latest.map(|v| v.updated_at),
            size: latest.map(|v| v.size),
            file: Some(file.clone()),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn name(&self) -> &str {
        self.path.name().unwrap_or("/")
    }
}

/// Result of listing a path: the children of a directory, or the single
/// file the path names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    Directory { path: FsPath, entries: Vec<Entry> },
    File { file: FileRef, descriptor: FileDescriptor },
}

impl Listing {
    /// True for a directory listing, false for a single-file stat.
    pub fn is_collection(&self) -> bool {
        matches!(self, Listing::Directory { .. })
    }

    pub fn entries(&self) -> Option<&[Entry]> {
        match self {
            Listing::Directory { entries, .. } => Some(entries),
            Listing::File { .. } => None,
        }
    }

    /// Child names for a directory, or the file's own name.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Listing::Directory { entries, .. } => entries.iter().map(|e| e.name()).collect(),
            Listing::File { file, .. } => vec![file.name.as_str()],
        }
    }

    pub fn into_file(self) -> Option<(FileRef, FileDescriptor)> {
        match self {
            Listing::File { file, descriptor } => Some((file, descriptor)),
            Listing::Directory { .. } => None,
        }
    }
}
