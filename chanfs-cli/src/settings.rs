// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration file and backend selection

use chanfs_core::{ChanfsConfig, ChanfsError, ChanfsResult, MessageBackend};
use chanfs_providers::{MemoryBackend, SledBackend};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Contents of `config.toml`
///
/// Filesystem settings sit at the top level next to a `[backend]` table:
///
/// ```toml
/// chunk_size = 1048576
///
/// [transfer]
/// max_concurrency = 4
///
/// [backend]
/// kind = "sled"
/// path = "/var/lib/chanfs"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendSettings,
    #[serde(flatten)]
    pub filesystem: ChanfsConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub kind: BackendKind,
    /// Database directory for `sled`; defaults to the platform data dir
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sled,
    /// Discarded when the process exits
    Memory,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "hyperpolymath", "chanfs")
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

impl Settings {
    pub fn parse(text: &str) -> ChanfsResult<Self> {
        toml::from_str(text).map_err(|e| ChanfsError::Config(e.to_string()))
    }

    /// Load `explicit`, which must exist, or the default config file if
    /// there is one. Without either the built-in defaults apply.
    pub fn load(explicit: Option<&Path>) -> ChanfsResult<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let text = std::fs::read_to_string(&path).map_err(|e| {
            ChanfsError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let settings = Self::parse(&text)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(settings)
    }

    pub fn open_backend(&self) -> ChanfsResult<Arc<dyn MessageBackend>> {
        match self.backend.kind {
            BackendKind::Memory => Ok(Arc::new(MemoryBackend::default())),
            BackendKind::Sled => {
                let path = match &self.backend.path {
                    Some(path) => path.clone(),
                    None => project_dirs()
                        .map(|dirs| dirs.data_dir().join("store"))
                        .ok_or_else(|| {
                            ChanfsError::Config("no home directory; set backend.path".into())
                        })?,
                };
                std::fs::create_dir_all(&path)?;
                tracing::info!("Opening sled store at {}", path.display());
                Ok(Arc::new(SledBackend::open(&path)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_file_gives_defaults() {
        let settings = Settings::parse("").unwrap();
        assert_eq!(settings.backend.kind, BackendKind::Sled);
        assert_eq!(settings.filesystem, ChanfsConfig::default());
    }

    #[test]
    fn test_full_file() {
        let settings = Settings::parse(
            r#"
            chunk_size = 4096
            content_channel = "files"
            metadata_slot = "tree"

            [transfer]
            max_concurrency = 2

            [transfer.retry]
            max_attempts = 7

            [snapshot]
            compress = false

            [backend]
            kind = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(settings.backend.kind, BackendKind::Memory);
        assert_eq!(settings.filesystem.chunk_size, 4096);
        assert_eq!(settings.filesystem.content_channel, "files");
        assert_eq!(settings.filesystem.metadata_slot, "tree");
        assert_eq!(settings.filesystem.transfer.max_concurrency, 2);
        assert_eq!(settings.filesystem.transfer.retry.max_attempts, 7);
        assert!(!settings.filesystem.snapshot.compress);
    }

    #[test]
    fn test_unknown_backend_kind() {
        assert!(Settings::parse("[backend]\nkind = \"carrier-pigeon\"").is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "chunk_size = 2048").unwrap();
        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.filesystem.chunk_size, 2048);

        let missing = file.path().with_extension("missing");
        assert!(matches!(Settings::load(Some(&missing)), Err(ChanfsError::Config(_))));
    }

    #[test]
    fn test_sled_backend_at_configured_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = Settings {
            backend: BackendSettings {
                kind: BackendKind::Sled,
                path: Some(dir.path().join("db")),
            },
            filesystem: ChanfsConfig::default(),
        };
        let backend = settings.open_backend().unwrap();
        assert_eq!(backend.id(), "sled");
    }
}
