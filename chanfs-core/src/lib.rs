// SPDX-License-Identifier: AGPL-3.0-or-later
//! chanfs core
//!
//! Core types for a versioned filesystem whose content and metadata live in
//! a message-based backend: paths, the directory tree, per-file version
//! histories, the backend trait and configuration.

pub mod backend;
pub mod config;
pub mod entry;
pub mod error;
pub mod namespace;
pub mod path;
pub mod tree;
pub mod version;

pub use backend::{ByteStream, MessageBackend};
pub use config::{ChanfsConfig, RetrySettings, SnapshotSettings, TransferSettings};
pub use entry::{Entry, EntryKind, Listing};
pub use error::{ChanfsError, ChanfsResult};
pub use namespace::{Lookup, Namespace, UploadTarget};
pub use path::{split_path, FsPath};
pub use tree::{DirectoryId, DirectoryNode, DirectoryTree, FileRef};
pub use version::{
    ContentLocator, FileDescriptor, FileId, FileVersion, FileVersionStore, StoredContent, VersionId,
};
