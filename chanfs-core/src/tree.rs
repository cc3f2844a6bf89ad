// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory directory hierarchy
//!
//! Directories live in an arena keyed by [`DirectoryId`]. A node's `parent`
//! is only a navigation aid; ownership runs strictly from the arena.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{ChanfsError, ChanfsResult};
use crate::path::{validate_name, FsPath};
use crate::version::FileId;

/// Stable identifier of a directory node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DirectoryId(pub u64);

impl fmt::Display for DirectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dir#{}", self.0)
    }
}

/// Named directory entry pointing at a file descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    pub file_id: FileId,
    pub created_at: DateTime<Utc>,
}

/// A directory node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryNode {
    pub id: DirectoryId,
    pub name: String,
    pub parent: Option<DirectoryId>,
    pub created_at: DateTime<Utc>,
    children: Vec<DirectoryId>,
    files: Vec<FileRef>,
}

impl DirectoryNode {
    /// Child directories in insertion order.
    pub fn children(&self) -> &[DirectoryId] {
        &self.children
    }

    /// File entries in insertion order.
    pub fn files(&self) -> &[FileRef] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.files.is_empty()
    }
}

const ROOT: DirectoryId = DirectoryId(0);

/// The directory hierarchy, rooted at a single always-present node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTree {
    nodes: HashMap<DirectoryId, DirectoryNode>,
    next_id: u64,
}

impl Default for DirectoryTree {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl DirectoryTree {
    pub fn new(root_created_at: DateTime<Utc>) -> Self {
        let root = DirectoryNode {
            id: ROOT,
            name: String::new(),
            parent: None,
            created_at: root_created_at,
            children: Vec::new(),
            files: Vec::new(),
        };
        let mut nodes = HashMap::new();
        nodes.insert(ROOT, root);
        Self { nodes, next_id: 1 }
    }

    pub fn root(&self) -> DirectoryId {
        ROOT
    }

    pub fn get(&self, id: DirectoryId) -> Option<&DirectoryNode> {
        self.nodes.get(&id)
    }

    pub fn node(&self, id: DirectoryId) -> ChanfsResult<&DirectoryNode> {
        self.get(id)
            .ok_or_else(|| ChanfsError::NotFound(format!("directory {id}")))
    }

    fn node_mut(&mut self, id: DirectoryId) -> ChanfsResult<&mut DirectoryNode> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| ChanfsError::NotFound(format!("directory {id}")))
    }

    /// Number of directories, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.get(&ROOT).map_or(true, |root| root.is_empty())
    }

    pub fn child_directory(&self, parent: DirectoryId, name: &str) -> Option<DirectoryId> {
        let node = self.get(parent)?;
        node.children
            .iter()
            .copied()
            .find(|child| self.get(*child).map_or(false, |c| c.name == name))
    }

    pub fn file(&self, parent: DirectoryId, name: &str) -> Option<&FileRef> {
        self.get(parent)?.files.iter().find(|f| f.name == name)
    }

    /// Whether any entry, file or directory, in `parent` is called `name`.
    pub fn contains_name(&self, parent: DirectoryId, name: &str) -> bool {
        self.child_directory(parent, name).is_some() || self.file(parent, name).is_some()
    }

    /// Child directories of `parent` whose names appear in `names`, in the
    /// order of `names`. Missing names are skipped.
    pub fn find_children<S: AsRef<str>>(&self, parent: DirectoryId, names: &[S]) -> Vec<DirectoryId> {
        names
            .iter()
            .filter_map(|name| self.child_directory(parent, name.as_ref()))
            .collect()
    }

    /// File entries of `parent` whose names appear in `names`, in the order
    /// of `names`. Missing names are skipped.
    pub fn find_files<S: AsRef<str>>(&self, parent: DirectoryId, names: &[S]) -> Vec<&FileRef> {
        names
            .iter()
            .filter_map(|name| self.file(parent, name.as_ref()))
            .collect()
    }

    /// Walk from the root through directory segments.
    pub fn navigate(&self, path: &FsPath) -> ChanfsResult<DirectoryId> {
        let mut current = ROOT;
        for segment in path.segments() {
            current = match self.child_directory(current, segment) {
                Some(child) => child,
                None if self.file(current, segment).is_some() => {
                    return Err(ChanfsError::NotFound(format!(
                        "{path}: '{segment}' is a file, not a directory"
                    )));
                }
                None => {
                    return Err(ChanfsError::NotFound(format!(
                        "{path}: no such directory '{segment}'"
                    )));
                }
            };
        }
        Ok(current)
    }

    pub fn create_directory(
        &mut self,
        name: &str,
        under: DirectoryId,
        created_at: DateTime<Utc>,
    ) -> ChanfsResult<DirectoryId> {
        validate_name(name)?;
        self.node(under)?;
        if self.contains_name(under, name) {
            return Err(ChanfsError::NameExists(self.describe(under, name)));
        }

        let id = DirectoryId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            DirectoryNode {
                id,
                name: name.to_string(),
                parent: Some(under),
                created_at,
                children: Vec::new(),
                files: Vec::new(),
            },
        );
        self.node_mut(under)?.children.push(id);
        Ok(id)
    }

    pub fn add_file(&mut self, under: DirectoryId, file: FileRef) -> ChanfsResult<()> {
        validate_name(&file.name)?;
        self.node(under)?;
        if self.contains_name(under, &file.name) {
            return Err(ChanfsError::NameExists(self.describe(under, &file.name)));
        }
        self.node_mut(under)?.files.push(file);
        Ok(())
    }

    pub fn remove_file(&mut self, under: DirectoryId, name: &str) -> ChanfsResult<FileRef> {
        let described = self.describe(under, name);
        let node = self.node_mut(under)?;
        let pos = node
            .files
            .iter()
            .position(|f| f.name == name)
            .ok_or(ChanfsError::NotFound(described))?;
        Ok(node.files.remove(pos))
    }

    /// Detach and drop a directory with its whole subtree. Returns the file
    /// ids that were referenced from inside it.
    pub fn remove_directory(&mut self, id: DirectoryId) -> ChanfsResult<Vec<FileId>> {
        if id == ROOT {
            return Err(ChanfsError::InvalidOperation(
                "the root directory cannot be removed".into(),
            ));
        }
        let parent = self.node(id)?.parent;
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|c| *c != id);
        }

        let mut removed_files = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                removed_files.extend(node.files.iter().map(|f| f.file_id));
                stack.extend(node.children);
            }
        }
        Ok(removed_files)
    }

    /// Rebuild the absolute path of a directory by following parent links.
    pub fn path_of(&self, id: DirectoryId) -> Option<FsPath> {
        let mut names = Vec::new();
        let mut current = self.get(id)?;
        while let Some(parent) = current.parent {
            names.push(current.name.clone());
            current = self.get(parent)?;
        }
        names.reverse();
        FsPath::parse(format!("/{}", names.join("/"))).ok()
    }

    fn describe(&self, under: DirectoryId, name: &str) -> String {
        match self.path_of(under).and_then(|p| p.join(name).ok()) {
            Some(path) => path.to_path_string(),
            None => name.to_string(),
        }
    }
}
