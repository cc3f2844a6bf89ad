// SPDX-License-Identifier: AGPL-3.0-or-later
//! Filesystem operations
//!
//! [`Filesystem`] is the one entry point front ends use. Reads work on the
//! last committed [`Namespace`]. Mutations are serialized, applied to a copy,
//! persisted, and only then published, so an operation that returns `Ok` is
//! already durable and one that fails leaves no trace.

use bytes::Bytes;
use chanfs_core::{
    ByteStream, ChanfsConfig, ChanfsError, ChanfsResult, Entry, FileDescriptor, FileRef,
    FileVersion, FsPath, Listing, Lookup, MessageBackend, Namespace, VersionId,
};
use chanfs_store::{ChunkedTransport, MetadataStore};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A versioned filesystem stored in a message backend
pub struct Filesystem {
    backend: Arc<dyn MessageBackend>,
    transport: ChunkedTransport,
    metadata: MetadataStore,
    committed: RwLock<Arc<Namespace>>,
    writer: Mutex<()>,
}

impl Filesystem {
    /// Validate `config` against the backend and load the latest snapshot.
    pub async fn open(backend: Arc<dyn MessageBackend>, config: ChanfsConfig) -> ChanfsResult<Self> {
        let transport = ChunkedTransport::new(Arc::clone(&backend), &config)?;
        let metadata = MetadataStore::new(Arc::clone(&backend), &config);
        let namespace = metadata.load().await?;
        tracing::info!(
            backend = backend.id(),
            chunk_size = config.chunk_size,
            "Opened filesystem"
        );

        Ok(Self {
            backend,
            transport,
            metadata,
            committed: RwLock::new(Arc::new(namespace)),
            writer: Mutex::new(()),
        })
    }

    pub fn backend(&self) -> &Arc<dyn MessageBackend> {
        &self.backend
    }

    /// The last committed state.
    pub fn namespace(&self) -> Arc<Namespace> {
        Arc::clone(&self.committed.read())
    }

    /// Children of a directory, or the descriptor of a single file.
    pub fn list(&self, path: &str) -> ChanfsResult<Listing> {
        self.namespace().list(&FsPath::parse(path)?)
    }

    pub fn stat(&self, path: &str) -> ChanfsResult<Entry> {
        self.namespace().stat(&FsPath::parse(path)?)
    }

    /// The file entry at `path`. Directories are `InvalidOperation`.
    pub fn file_ref(&self, path: &str) -> ChanfsResult<FileRef> {
        let path = FsPath::parse(path)?;
        let namespace = self.namespace();
        match namespace.lookup(&path)? {
            Lookup::File(file) => Ok(file.clone()),
            Lookup::Directory(_) => Err(ChanfsError::InvalidOperation(format!(
                "{path} is a directory"
            ))),
        }
    }

    pub fn get_file_info(&self, file: &FileRef) -> ChanfsResult<FileDescriptor> {
        self.namespace().descriptor(file).cloned()
    }

    /// Version history, oldest first.
    pub fn versions(&self, file: &FileRef) -> ChanfsResult<Vec<FileVersion>> {
        Ok(self.get_file_info(file)?.versions().to_vec())
    }

    pub async fn create_dir(&self, path: &str, recursive: bool) -> ChanfsResult<()> {
        let path = FsPath::parse(path)?;
        self.mutate(|ns| {
            let changed = ns.create_dir(&path, recursive, Utc::now())?;
            Ok(((), changed))
        })
        .await?;
        tracing::info!("Created directory {}", path);
        Ok(())
    }

    pub async fn remove_dir(&self, path: &str, recursive: bool) -> ChanfsResult<()> {
        let path = FsPath::parse(path)?;
        let removed = self
            .mutate(|ns| Ok((ns.remove_dir(&path, recursive)?, true)))
            .await?;
        tracing::info!(files = removed, "Removed directory {}", path);
        Ok(())
    }

    pub async fn remove_file(&self, path: &str) -> ChanfsResult<()> {
        let path = FsPath::parse(path)?;
        let descriptor = self.mutate(|ns| Ok((ns.remove_file(&path)?, true))).await?;
        tracing::info!(
            versions = descriptor.version_count(),
            "Removed file {}",
            path
        );
        Ok(())
    }

    /// Store `data` as the next version of the file at `path`, creating the
    /// file if needed, and return the updated descriptor.
    ///
    /// The target is resolved before any chunk is sent and the writer lock
    /// is held for the whole transfer.
    pub async fn upload_bytes(&self, data: Bytes, path: &str) -> ChanfsResult<FileDescriptor> {
        let path = FsPath::parse(path)?;
        let _writer = self.writer.lock().await;

        let target = self.namespace().resolve_upload(&path)?;
        let content = self.transport.upload(&path.to_path_string(), data).await?;
        let descriptor = self
            .apply(|ns| {
                let descriptor = ns.commit_upload(&target, content, Utc::now())?;
                Ok((descriptor, true))
            })
            .await?;

        tracing::info!(
            versions = descriptor.version_count(),
            "Uploaded {}",
            path
        );
        Ok(descriptor)
    }

    /// Create a zero-length file unless one already exists at `path`.
    ///
    /// An existing file is left untouched and its descriptor returned. An
    /// existing directory is `NameExists`.
    pub async fn create_empty_file(&self, path: &str) -> ChanfsResult<FileDescriptor> {
        let path = FsPath::parse(path)?;
        let _writer = self.writer.lock().await;

        let namespace = self.namespace();
        let target = match namespace.lookup(&path) {
            Ok(Lookup::File(file)) => return namespace.descriptor(file).cloned(),
            Ok(Lookup::Directory(_)) => {
                return Err(ChanfsError::NameExists(format!("{path} is a directory")))
            }
            Err(ChanfsError::NotFound(_)) => namespace.resolve_upload(&path)?,
            Err(e) => return Err(e),
        };

        let content = self
            .transport
            .upload(&path.to_path_string(), Bytes::new())
            .await?;
        let descriptor = self
            .apply(|ns| Ok((ns.commit_upload(&target, content, Utc::now())?, true)))
            .await?;
        tracing::info!("Created empty file {}", path);
        Ok(descriptor)
    }

    /// Full content of one version, `None` meaning the latest.
    pub async fn download_at_version(
        &self,
        file: &FileRef,
        version: Option<&VersionId>,
    ) -> ChanfsResult<Bytes> {
        let chosen = self.select_version(file, version)?;
        let data = self.transport.download_version(&file.name, &chosen).await?;
        tracing::debug!(version = %chosen.id, size = data.len(), "Downloaded {}", file.name);
        Ok(data)
    }

    /// Chunks of one version in order, fetched lazily.
    pub fn open_read_stream(
        &self,
        file: &FileRef,
        version: Option<&VersionId>,
    ) -> ChanfsResult<ByteStream> {
        let chosen = self.select_version(file, version)?;
        Ok(self.transport.download_stream(&file.name, chosen.locators))
    }

    fn select_version(&self, file: &FileRef, version: Option<&VersionId>) -> ChanfsResult<FileVersion> {
        let namespace = self.namespace();
        let descriptor = namespace.descriptor(file)?;
        let chosen = match version {
            Some(id) => descriptor.version(id),
            None => descriptor.latest(),
        };
        chosen.cloned().ok_or_else(|| {
            ChanfsError::NotFound(match version {
                Some(id) => format!("version {id} of {}", file.name),
                None => format!("latest version of {}", file.name),
            })
        })
    }

    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Namespace) -> ChanfsResult<(T, bool)>,
    ) -> ChanfsResult<T> {
        let _writer = self.writer.lock().await;
        self.apply(f).await
    }

    /// Run `f` on a copy of the committed state and publish the copy once it
    /// is saved. `f` reports whether it changed anything; unchanged copies
    /// are dropped without a save. The caller holds the writer lock.
    async fn apply<T>(
        &self,
        f: impl FnOnce(&mut Namespace) -> ChanfsResult<(T, bool)>,
    ) -> ChanfsResult<T> {
        let mut next = Namespace::clone(&self.namespace());
        let (value, changed) = f(&mut next)?;
        if changed {
            self.metadata.save(&next).await?;
            *self.committed.write() = Arc::new(next);
        }
        Ok(value)
    }
}
