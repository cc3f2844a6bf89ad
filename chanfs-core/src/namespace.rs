// SPDX-License-Identifier: AGPL-3.0-or-later
//! Path-level operations over the directory tree and version store
//!
//! Everything here is synchronous and purely in memory. Callers that need
//! durability apply these operations to a copy and persist it before
//! publishing (see `chanfs-vfs`).

use chrono::{DateTime, Utc};

use crate::entry::{Entry, Listing};
use crate::error::{ChanfsError, ChanfsResult};
use crate::path::FsPath;
use crate::tree::{DirectoryId, DirectoryTree, FileRef};
use crate::version::{FileDescriptor, FileId, FileVersionStore, StoredContent};

/// What a path currently denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Directory(DirectoryId),
    File(&'a FileRef),
}

/// Where an upload will land, resolved before any content is transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadTarget {
    /// A file already exists; the upload becomes its next version.
    Existing { file_id: FileId },
    /// Nothing exists yet; a descriptor and entry will be created.
    New { parent: DirectoryId, name: String },
}

/// The whole virtual filesystem state: tree plus version histories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespace {
    tree: DirectoryTree,
    files: FileVersionStore,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root_created_at(created_at: DateTime<Utc>) -> Self {
        Self {
            tree: DirectoryTree::new(created_at),
            files: FileVersionStore::new(),
        }
    }

    pub fn tree(&self) -> &DirectoryTree {
        &self.tree
    }

    pub fn files(&self) -> &FileVersionStore {
        &self.files
    }

    /// Add a persisted directory while rebuilding from a snapshot.
    pub fn restore_directory(
        &mut self,
        name: &str,
        under: DirectoryId,
        created_at: DateTime<Utc>,
    ) -> ChanfsResult<DirectoryId> {
        self.tree.create_directory(name, under, created_at)
    }

    /// Add a persisted file entry and its descriptor while rebuilding from a
    /// snapshot.
    pub fn restore_file(
        &mut self,
        under: DirectoryId,
        name: &str,
        created_at: DateTime<Utc>,
        descriptor: FileDescriptor,
    ) -> ChanfsResult<()> {
        let file_id = descriptor.id;
        self.tree.add_file(
            under,
            FileRef {
                name: name.to_string(),
                file_id,
                created_at,
            },
        )?;
        self.files.insert(descriptor)
    }

    /// Keep file ids below `next` out of circulation after a restore.
    pub fn reserve_file_ids(&mut self, next: FileId) {
        self.files.reserve_until(next);
    }

    pub fn lookup(&self, path: &FsPath) -> ChanfsResult<Lookup<'_>> {
        let (parent, name) = match path.split() {
            Ok(parts) => parts,
            Err(_) => return Ok(Lookup::Directory(self.tree.root())),
        };
        let dir = self.tree.navigate(&parent)?;
        if let Some(child) = self.tree.child_directory(dir, &name) {
            return Ok(Lookup::Directory(child));
        }
        if let Some(file) = self.tree.file(dir, &name) {
            return Ok(Lookup::File(file));
        }
        Err(ChanfsError::NotFound(path.to_path_string()))
    }

    pub fn descriptor(&self, file: &FileRef) -> ChanfsResult<&FileDescriptor> {
        self.files.get_or_err(file.file_id)
    }

    /// Directory children (directories first, then files, each in insertion
    /// order), or the single file the path names.
    pub fn list(&self, path: &FsPath) -> ChanfsResult<Listing> {
        match self.lookup(path)? {
            Lookup::File(file) => Ok(Listing::File {
                file: file.clone(),
                descriptor: self.descriptor(file)?.clone(),
            }),
            Lookup::Directory(id) => {
                let node = self.tree.node(id)?;
                let mut entries = Vec::with_capacity(node.children().len() + node.files().len());
                for child in node.children() {
                    let child = self.tree.node(*child)?;
                    entries.push(Entry::directory(path.join(&child.name)?, child.created_at));
                }
                for file in node.files() {
                    entries.push(Entry::file(path.join(&file.name)?, file, self.descriptor(file)?));
                }
                Ok(Listing::Directory {
                    path: path.clone(),
                    entries,
                })
            }
        }
    }

    pub fn stat(&self, path: &FsPath) -> ChanfsResult<Entry> {
        match self.lookup(path)? {
            Lookup::Directory(id) => Ok(Entry::directory(path.clone(), self.tree.node(id)?.created_at)),
            Lookup::File(file) => Ok(Entry::file(path.clone(), file, self.descriptor(file)?)),
        }
    }

    /// Create a directory. Returns `true` if the tree changed.
    ///
    /// Non-recursive: the parent must exist and the leaf must be absent.
    /// Recursive: missing intermediates are created; an existing directory
    /// leaf is a successful no-op, an existing file anywhere on the way is
    /// `NameExists`.
    pub fn create_dir(&mut self, path: &FsPath, recursive: bool, now: DateTime<Utc>) -> ChanfsResult<bool> {
        let (parent, name) = path.split()?;

        if !recursive {
            let dir = self.tree.navigate(&parent)?;
            self.tree.create_directory(&name, dir, now)?;
            return Ok(true);
        }

        let mut current = self.tree.root();
        let mut changed = false;
        for segment in path.segments() {
            current = match self.tree.child_directory(current, segment) {
                Some(existing) => existing,
                None => {
                    changed = true;
                    self.tree.create_directory(segment, current, now)?
                }
            };
        }
        Ok(changed)
    }

    /// Remove a directory. Returns the number of file descriptors deleted
    /// with it.
    pub fn remove_dir(&mut self, path: &FsPath, recursive: bool) -> ChanfsResult<usize> {
        if path.is_root() {
            return Err(ChanfsError::InvalidOperation(
                "the root directory cannot be removed".into(),
            ));
        }
        let id = match self.lookup(path)? {
            Lookup::Directory(id) => id,
            Lookup::File(_) => {
                return Err(ChanfsError::InvalidOperation(format!(
                    "{path} is a file, not a directory"
                )));
            }
        };

        if !recursive && !self.tree.node(id)?.is_empty() {
            return Err(ChanfsError::DirectoryNotEmpty(path.to_path_string()));
        }

        let removed = self.tree.remove_directory(id)?;
        for file_id in &removed {
            self.files.remove(*file_id);
        }
        Ok(removed.len())
    }

    /// Remove a file entry together with its descriptor and every version.
    pub fn remove_file(&mut self, path: &FsPath) -> ChanfsResult<FileDescriptor> {
        let (parent, name) = path.split()?;
        let dir = self.tree.navigate(&parent)?;
        if self.tree.child_directory(dir, &name).is_some() {
            return Err(ChanfsError::InvalidOperation(format!(
                "{path} is a directory, not a file"
            )));
        }
        let file = self.tree.remove_file(dir, &name)?;
        self.files
            .remove(file.file_id)
            .ok_or_else(|| ChanfsError::NotFound(format!("file descriptor {}", file.file_id)))
    }

    pub fn resolve_upload(&self, path: &FsPath) -> ChanfsResult<UploadTarget> {
        let (parent, name) = path.split()?;
        let dir = self.tree.navigate(&parent)?;
        if self.tree.child_directory(dir, &name).is_some() {
            return Err(ChanfsError::NameExists(format!(
                "{path} is a directory"
            )));
        }
        match self.tree.file(dir, &name) {
            Some(file) => Ok(UploadTarget::Existing {
                file_id: file.file_id,
            }),
            None => Ok(UploadTarget::New { parent: dir, name }),
        }
    }

    /// Record uploaded content at a previously resolved target and return
    /// the updated descriptor.
    pub fn commit_upload(
        &mut self,
        target: &UploadTarget,
        content: StoredContent,
        now: DateTime<Utc>,
    ) -> ChanfsResult<FileDescriptor> {
        let file_id = match target {
            UploadTarget::Existing { file_id } => {
                self.files.append_version(*file_id, content, now)?;
                *file_id
            }
            UploadTarget::New { parent, name } => {
                if self.tree.contains_name(*parent, name) {
                    return Err(ChanfsError::NameExists(name.clone()));
                }
                let file_id = self.files.create(content, now);
                let added = self.tree.add_file(
                    *parent,
                    FileRef {
                        name: name.clone(),
                        file_id,
                        created_at: now,
                    },
                );
                if let Err(e) = added {
                    self.files.remove(file_id);
                    return Err(e);
                }
                file_id
            }
        };
        Ok(self.files.get_or_err(file_id)?.clone())
    }
}
