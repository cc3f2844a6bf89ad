// SPDX-License-Identifier: AGPL-3.0-or-later
//! WebDAV verb interface
//!
//! A protocol server drives [`DavFileSystem`], one method per verb.
//! [`ChanfsDav`] implements it over [`Filesystem`]. Locks, properties and
//! HTTP handling belong to the server.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chanfs_core::{ByteStream, ChanfsError, ChanfsResult, FileDescriptor, Listing};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::filesystem::Filesystem;

/// Resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    File,
    Directory,
}

/// Filesystem verbs needed by a WebDAV server
#[async_trait]
pub trait DavFileSystem: Send + Sync {
    /// Create a resource. Files with a known non-zero length are created
    /// by the write stream instead.
    async fn create(
        &self,
        path: &str,
        kind: ResourceType,
        content_length: Option<u64>,
    ) -> ChanfsResult<()>;

    /// Delete a file, or a directory with everything in it.
    async fn delete(&self, path: &str) -> ChanfsResult<()>;

    /// Size of the latest version, 0 for directories.
    async fn size(&self, path: &str) -> ChanfsResult<u64>;

    async fn read_dir(&self, path: &str) -> ChanfsResult<Vec<String>>;

    async fn resource_type(&self, path: &str) -> ChanfsResult<ResourceType>;

    async fn open_read_stream(&self, path: &str) -> ChanfsResult<ByteStream>;

    async fn open_write_stream(&self, path: &str) -> ChanfsResult<DavWriteStream>;

    async fn creation_date(&self, path: &str) -> ChanfsResult<DateTime<Utc>>;

    async fn last_modified_date(&self, path: &str) -> ChanfsResult<DateTime<Utc>>;
}

/// Buffers a PUT body and stores it as a new version on [`finish`].
///
/// [`finish`]: DavWriteStream::finish
pub struct DavWriteStream {
    fs: Arc<Filesystem>,
    path: String,
    buffer: BytesMut,
}

impl DavWriteStream {
    pub fn write(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Upload the buffered body. Dropping the stream discards it.
    pub async fn finish(self) -> ChanfsResult<FileDescriptor> {
        let data: Bytes = self.buffer.freeze();
        self.fs.upload_bytes(data, &self.path).await
    }
}

/// [`DavFileSystem`] over a [`Filesystem`]
#[derive(Clone)]
pub struct ChanfsDav {
    fs: Arc<Filesystem>,
}

impl ChanfsDav {
    pub fn new(fs: Arc<Filesystem>) -> Self {
        Self { fs }
    }

    pub fn filesystem(&self) -> &Arc<Filesystem> {
        &self.fs
    }
}

#[async_trait]
impl DavFileSystem for ChanfsDav {
    async fn create(
        &self,
        path: &str,
        kind: ResourceType,
        content_length: Option<u64>,
    ) -> ChanfsResult<()> {
        match kind {
            ResourceType::Directory => self.fs.create_dir(path, false).await,
            ResourceType::File if content_length == Some(0) => Err(ChanfsError::InvalidOperation(
                format!("cannot create empty file {path}"),
            )),
            ResourceType::File => Ok(()),
        }
    }

    async fn delete(&self, path: &str) -> ChanfsResult<()> {
        if self.fs.stat(path)?.is_directory() {
            self.fs.remove_dir(path, true).await
        } else {
            self.fs.remove_file(path).await
        }
    }

    async fn size(&self, path: &str) -> ChanfsResult<u64> {
        Ok(self.fs.stat(path)?.size.unwrap_or(0))
    }

    async fn read_dir(&self, path: &str) -> ChanfsResult<Vec<String>> {
        match self.fs.list(path)? {
            Listing::Directory { entries, .. } => {
                Ok(entries.iter().map(|entry| entry.name().to_string()).collect())
            }
            Listing::File { .. } => Err(ChanfsError::InvalidOperation(format!(
                "{path} is not a directory"
            ))),
        }
    }

    async fn resource_type(&self, path: &str) -> ChanfsResult<ResourceType> {
        Ok(match self.fs.list(path)?.is_collection() {
            true => ResourceType::Directory,
            false => ResourceType::File,
        })
    }

    async fn open_read_stream(&self, path: &str) -> ChanfsResult<ByteStream> {
        let file = self.fs.file_ref(path)?;
        self.fs.open_read_stream(&file, None)
    }

    async fn open_write_stream(&self, path: &str) -> ChanfsResult<DavWriteStream> {
        let path = chanfs_core::FsPath::parse(path)?;
        self.fs.namespace().resolve_upload(&path)?;
        Ok(DavWriteStream {
            fs: Arc::clone(&self.fs),
            path: path.to_path_string(),
            buffer: BytesMut::new(),
        })
    }

    async fn creation_date(&self, path: &str) -> ChanfsResult<DateTime<Utc>> {
        Ok(self.fs.stat(path)?.created)
    }

    async fn last_modified_date(&self, path: &str) -> ChanfsResult<DateTime<Utc>> {
        let entry = self.fs.stat(path)?;
        Ok(entry.modified.unwrap_or(entry.created))
    }
}

/// HTTP status a DAV server should answer with for an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DavStatus(pub u16);

impl DavStatus {
    pub const BAD_REQUEST: Self = Self(400);
    pub const NOT_FOUND: Self = Self(404);
    pub const METHOD_NOT_ALLOWED: Self = Self(405);
    pub const CONFLICT: Self = Self(409);
    pub const PRECONDITION_FAILED: Self = Self(412);
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);
    pub const BAD_GATEWAY: Self = Self(502);
    pub const SERVICE_UNAVAILABLE: Self = Self(503);

    pub fn code(self) -> u16 {
        self.0
    }

    pub fn is_client_error(self) -> bool {
        (400..500).contains(&self.0)
    }
}

impl From<&ChanfsError> for DavStatus {
    fn from(err: &ChanfsError) -> Self {
        match err {
            ChanfsError::InvalidPath(_) => Self::BAD_REQUEST,
            ChanfsError::NotFound(_) => Self::NOT_FOUND,
            ChanfsError::InvalidOperation(_) => Self::METHOD_NOT_ALLOWED,
            ChanfsError::DirectoryNotEmpty(_) => Self::CONFLICT,
            ChanfsError::NameExists(_) => Self::PRECONDITION_FAILED,
            ChanfsError::TransferFailed { .. }
            | ChanfsError::PersistenceFailed(_)
            | ChanfsError::Backend { .. } => Self::BAD_GATEWAY,
            ChanfsError::Network(_) | ChanfsError::RateLimited { .. } | ChanfsError::Timeout => {
                Self::SERVICE_UNAVAILABLE
            }
            _ => Self::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_keeps_logical_and_transient_apart() {
        let logical = [
            ChanfsError::InvalidPath("x".into()),
            ChanfsError::NotFound("x".into()),
            ChanfsError::NameExists("x".into()),
            ChanfsError::DirectoryNotEmpty("x".into()),
            ChanfsError::InvalidOperation("x".into()),
        ];
        for err in &logical {
            assert!(err.is_logical());
            assert!(DavStatus::from(err).is_client_error(), "{err}");
        }

        let transient = [
            ChanfsError::TransferFailed {
                what: "f".into(),
                attempts: 5,
                reason: "timeout".into(),
            },
            ChanfsError::PersistenceFailed("x".into()),
            ChanfsError::Timeout,
            ChanfsError::Io("x".into()),
        ];
        for err in &transient {
            assert!(!DavStatus::from(err).is_client_error(), "{err}");
        }
    }

    #[test]
    fn test_specific_codes() {
        assert_eq!(DavStatus::from(&ChanfsError::NotFound("a".into())).code(), 404);
        assert_eq!(DavStatus::from(&ChanfsError::DirectoryNotEmpty("a".into())).code(), 409);
        assert_eq!(
            DavStatus::from(&ChanfsError::RateLimited { retry_after_secs: None }).code(),
            503
        );
    }
}
