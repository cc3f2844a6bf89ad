// SPDX-License-Identifier: AGPL-3.0-or-later
//! Absolute path parsing for the virtual tree

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ChanfsError, ChanfsResult};

/// Validated absolute path inside the virtual tree.
///
/// Repeated separators collapse and a trailing separator is ignored, so
/// `//d1///d2/` and `/d1/d2` are the same path. `.` and `..` are rejected
/// rather than interpreted: names are stored verbatim in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FsPath {
    segments: Vec<String>,
}

impl FsPath {
    pub fn parse(path: impl AsRef<str>) -> ChanfsResult<Self> {
        let path = path.as_ref();
        if !path.starts_with('/') {
            return Err(ChanfsError::InvalidPath(format!(
                "{path}: path must start with '/'"
            )));
        }

        let mut segments = Vec::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            validate_name(segment).map_err(|_| {
                ChanfsError::InvalidPath(format!("{path}: invalid segment '{segment}'"))
            })?;
            segments.push(segment.to_string());
        }

        Ok(Self { segments })
    }

    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            None
        } else {
            let mut segments = self.segments.clone();
            segments.pop();
            Some(Self { segments })
        }
    }

    /// Split into (parent, name). The root has no name and cannot be split.
    pub fn split(&self) -> ChanfsResult<(FsPath, String)> {
        match self.segments.split_last() {
            Some((name, parent)) => Ok((
                FsPath {
                    segments: parent.to_vec(),
                },
                name.clone(),
            )),
            None => Err(ChanfsError::InvalidPath(
                "/: the root directory has no name".into(),
            )),
        }
    }

    pub fn join(&self, name: impl AsRef<str>) -> ChanfsResult<Self> {
        let name = name.as_ref();
        validate_name(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments })
    }

    pub fn to_path_string(&self) -> String {
        if self.segments.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", self.segments.join("/"))
        }
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_path_string())
    }
}

impl FromStr for FsPath {
    type Err = ChanfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Split a path string into its parent path string and final name.
pub fn split_path(path: &str) -> ChanfsResult<(String, String)> {
    let (parent, name) = FsPath::parse(path)?.split()?;
    Ok((parent.to_path_string(), name))
}

/// Check that a single entry name can be stored in the tree.
pub fn validate_name(name: &str) -> ChanfsResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0')
    {
        return Err(ChanfsError::InvalidPath(format!("invalid name '{name}'")));
    }
    Ok(())
}
