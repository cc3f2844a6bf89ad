// SPDX-License-Identifier: AGPL-3.0-or-later
//! CLI command implementations

use bytes::Bytes;
use chanfs_core::{
    ChanfsError, ChanfsResult, Entry, EntryKind, FileDescriptor, FileRef, FsPath, Listing,
    VersionId,
};
use chanfs_vfs::Filesystem;
use chrono::{DateTime, Utc};
use console::style;
use futures::StreamExt;
use std::io::Write;
use std::path::Path;
use tabled::{Table, Tabled};

/// Format a timestamp for display
fn format_time(dt: Option<DateTime<Utc>>) -> String {
    dt.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Format file size
fn format_size(size: Option<u64>) -> String {
    match size {
        Some(s) => bytesize::ByteSize(s).to_string(),
        None => "-".to_string(),
    }
}

/// Format entry kind
fn format_kind(kind: EntryKind) -> String {
    match kind {
        EntryKind::Directory => style("d").cyan().to_string(),
        EntryKind::File => "-".to_string(),
    }
}

#[derive(Tabled)]
struct LsEntry {
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Modified")]
    modified: String,
    #[tabled(rename = "Name")]
    name: String,
}

impl From<&Entry> for LsEntry {
    fn from(e: &Entry) -> Self {
        let name = match e.kind {
            EntryKind::Directory => style(e.name()).cyan().bold().to_string(),
            EntryKind::File => e.name().to_string(),
        };
        Self {
            kind: format_kind(e.kind),
            size: format_size(e.size),
            modified: format_time(e.modified.or(Some(e.created))),
            name,
        }
    }
}

#[derive(Tabled)]
struct VersionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Version")]
    id: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

/// Text for a file listed on its own
fn describe_file(file: &FileRef, descriptor: &FileDescriptor) -> String {
    let latest = descriptor.latest();
    let mut out = String::new();
    out.push_str(&format!("  Name: {}\n", file.name));
    out.push_str(&format!("  Size: {}\n", format_size(latest.map(|v| v.size))));
    out.push_str(&format!("  Created: {}\n", file.created_at));
    out.push_str(&format!("  Versions: {}\n", descriptor.version_count()));
    out.push_str(&format!(
        "  Latest version: {}",
        descriptor
            .latest_version_id()
            .map_or("-", |id| id.as_str())
    ));
    out
}

/// Text printed by `ls`
pub fn format_listing(listing: &Listing, long: bool) -> String {
    match listing {
        Listing::File { file, descriptor } => describe_file(file, descriptor),
        Listing::Directory { entries, .. } if entries.is_empty() => String::new(),
        Listing::Directory { entries, .. } if long => {
            let rows: Vec<LsEntry> = entries.iter().map(LsEntry::from).collect();
            Table::new(rows).to_string()
        }
        Listing::Directory { entries, .. } => entries
            .iter()
            .map(Entry::name)
            .collect::<Vec<_>>()
            .join("  "),
    }
}

/// List a directory, or show one file
pub async fn ls(fs: &Filesystem, path: &str, long: bool) -> ChanfsResult<()> {
    let listing = fs.list(path)?;
    let text = format_listing(&listing, long);
    if !text.is_empty() {
        println!("{text}");
    }
    Ok(())
}

/// Create directories
pub async fn mkdir(fs: &Filesystem, paths: &[String], parents: bool) -> ChanfsResult<()> {
    for path in paths {
        fs.create_dir(path, parents).await?;
        tracing::info!("Created {}", path);
    }
    Ok(())
}

/// Where `cp` stores a local file: into `remote` itself, or under it when
/// it names a directory.
fn upload_destination(fs: &Filesystem, local: &Path, remote: &str) -> ChanfsResult<String> {
    let is_dir = match fs.stat(remote) {
        Ok(entry) => entry.is_directory(),
        Err(ChanfsError::NotFound(_)) => false,
        Err(e) => return Err(e),
    };
    if !is_dir {
        return Ok(remote.to_string());
    }
    let name = local
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ChanfsError::InvalidPath(format!("{} has no file name", local.display())))?;
    Ok(FsPath::parse(remote)?.join(name)?.to_path_string())
}

/// Errors on the local side are never misses in the virtual tree.
fn local_error(action: &str, local: &Path, err: std::io::Error) -> ChanfsError {
    ChanfsError::Io(format!("cannot {action} local file {}: {err}", local.display()))
}

/// Upload a local file
pub async fn cp(fs: &Filesystem, local: &Path, remote: &str) -> ChanfsResult<()> {
    let data = tokio::fs::read(local)
        .await
        .map(Bytes::from)
        .map_err(|e| local_error("read", local, e))?;
    let destination = upload_destination(fs, local, remote)?;
    let size = data.len() as u64;

    let descriptor = fs.upload_bytes(data, &destination).await?;
    println!(
        "{} -> {} ({}, version {})",
        local.display(),
        destination,
        bytesize::ByteSize(size),
        descriptor
            .latest_version_id()
            .map_or("-", |id| id.as_str())
    );
    Ok(())
}

async fn read_version(fs: &Filesystem, remote: &str, version: Option<&str>) -> ChanfsResult<Bytes> {
    let file = fs.file_ref(remote)?;
    let version = version.map(VersionId::from);
    fs.download_at_version(&file, version.as_ref()).await
}

/// Download a file to the local disk
pub async fn get(
    fs: &Filesystem,
    remote: &str,
    local: &Path,
    version: Option<&str>,
) -> ChanfsResult<()> {
    let data = read_version(fs, remote, version).await?;
    tokio::fs::write(local, &data)
        .await
        .map_err(|e| local_error("write", local, e))?;
    println!(
        "{} -> {} ({})",
        remote,
        local.display(),
        bytesize::ByteSize(data.len() as u64)
    );
    Ok(())
}

/// Write file contents to stdout
pub async fn cat(fs: &Filesystem, remote: &str, version: Option<&str>) -> ChanfsResult<()> {
    let file = fs.file_ref(remote)?;
    let version = version.map(VersionId::from);
    let mut stream = fs.open_read_stream(&file, version.as_ref())?;

    let mut stdout = std::io::stdout().lock();
    while let Some(chunk) = stream.next().await {
        stdout.write_all(&chunk?)?;
    }
    stdout.flush()?;
    Ok(())
}

/// Remove files or directories
pub async fn rm(fs: &Filesystem, paths: &[String], recursive: bool) -> ChanfsResult<()> {
    for path in paths {
        if fs.stat(path)?.is_directory() {
            fs.remove_dir(path, recursive).await?;
        } else {
            fs.remove_file(path).await?;
        }
        tracing::info!("Removed {}", path);
    }
    Ok(())
}

/// Create empty files
pub async fn touch(fs: &Filesystem, paths: &[String]) -> ChanfsResult<()> {
    for path in paths {
        fs.create_empty_file(path).await?;
    }
    Ok(())
}

/// Show file or directory information
pub async fn stat(fs: &Filesystem, path: &str) -> ChanfsResult<()> {
    let entry = fs.stat(path)?;

    println!("  Path: {}", entry.path);
    println!("  Type: {:?}", entry.kind);
    if let Some(size) = entry.size {
        println!("  Size: {} ({})", size, bytesize::ByteSize(size));
    }
    println!("  Created: {}", entry.created);
    if let Some(modified) = entry.modified {
        println!("  Modified: {}", modified);
    }

    if let Some(file) = &entry.file {
        let versions = fs.versions(file)?;
        if let Some(hash) = versions.last().and_then(|v| v.content_hash.as_deref()) {
            println!("  Hash: {}", hash);
        }
        let rows: Vec<VersionRow> = versions
            .iter()
            .enumerate()
            .map(|(index, v)| VersionRow {
                index: index + 1,
                id: v.id.to_string(),
                size: format_size(Some(v.size)),
                updated: format_time(Some(v.updated_at)),
            })
            .collect();
        println!("{}", Table::new(rows));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanfs_core::{ChanfsConfig, MessageBackend, RetrySettings};
    use chanfs_providers::MemoryBackend;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn filesystem() -> Filesystem {
        let backend: Arc<dyn MessageBackend> = Arc::new(MemoryBackend::default());
        let config = ChanfsConfig::default()
            .with_chunk_size(4)
            .with_retry(RetrySettings::immediate(1));
        Filesystem::open(backend, config).await.unwrap()
    }

    #[tokio::test]
    async fn test_ls_joins_names() {
        let fs = filesystem().await;
        fs.create_dir("/d1", false).await.unwrap();
        fs.upload_bytes(Bytes::from_static(b"data"), "/f1").await.unwrap();

        let listing = fs.list("/").unwrap();
        assert_eq!(format_listing(&listing, false), "d1  f1");
    }

    #[tokio::test]
    async fn test_ls_of_file_shows_latest_version() {
        let fs = filesystem().await;
        let descriptor = fs
            .upload_bytes(Bytes::from_static(b"data"), "/f1")
            .await
            .unwrap();

        let text = format_listing(&fs.list("/f1").unwrap(), false);
        let latest = descriptor.latest_version_id().unwrap();
        assert!(text.contains(latest.as_str()), "{text}");
    }

    #[tokio::test]
    async fn test_ls_long_has_table() {
        let fs = filesystem().await;
        fs.upload_bytes(Bytes::from_static(b"data"), "/f1").await.unwrap();
        let text = format_listing(&fs.list("/").unwrap(), true);
        assert!(text.contains("Name"));
        assert!(text.contains("f1"));
    }

    #[tokio::test]
    async fn test_ls_empty_root() {
        let fs = filesystem().await;
        assert_eq!(format_listing(&fs.list("/").unwrap(), false), "");
    }

    #[tokio::test]
    async fn test_mkdir_rm_touch() {
        let fs = filesystem().await;
        mkdir(&fs, &["/a/b/c".to_string()], true).await.unwrap();
        assert!(mkdir(&fs, &["/x/y".to_string()], false).await.is_err());

        touch(&fs, &["/a/b/c/file".to_string()]).await.unwrap();
        assert!(rm(&fs, &["/a".to_string()], false).await.is_err());
        rm(&fs, &["/a".to_string()], true).await.unwrap();
        assert_eq!(format_listing(&fs.list("/").unwrap(), false), "");
    }

    #[tokio::test]
    async fn test_cp_and_get_round_trip() {
        let fs = filesystem().await;
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("notes.txt");
        std::fs::write(&local, b"some notes for later").unwrap();

        fs.create_dir("/docs", false).await.unwrap();
        cp(&fs, &local, "/docs").await.unwrap();
        cp(&fs, &local, "/docs/copy.txt").await.unwrap();
        assert_eq!(
            format_listing(&fs.list("/docs").unwrap(), false),
            "notes.txt  copy.txt"
        );

        let out = dir.path().join("out.txt");
        get(&fs, "/docs/notes.txt", &out, None).await.unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"some notes for later");
    }

    #[tokio::test]
    async fn test_local_file_errors_name_the_path() {
        let fs = filesystem().await;
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.txt");

        match cp(&fs, &missing, "/copy").await {
            Err(ChanfsError::Io(message)) => assert!(message.contains("missing.txt"), "{message}"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(format_listing(&fs.list("/").unwrap(), false), "");

        fs.upload_bytes(Bytes::from_static(b"data"), "/f").await.unwrap();
        let unwritable = dir.path().join("no-such-dir").join("out");
        match get(&fs, "/f", &unwritable, None).await {
            Err(ChanfsError::Io(message)) => assert!(message.contains("no-such-dir"), "{message}"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_older_version() {
        let fs = filesystem().await;
        let first = fs
            .upload_bytes(Bytes::from_static(b"one"), "/f")
            .await
            .unwrap();
        fs.upload_bytes(Bytes::from_static(b"two"), "/f").await.unwrap();

        let dir = TempDir::new().unwrap();
        let out = dir.path().join("f");
        let id = first.latest_version_id().unwrap().to_string();
        get(&fs, "/f", &out, Some(&id)).await.unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"one");

        assert!(matches!(
            get(&fs, "/f", &out, Some("missing")).await,
            Err(ChanfsError::NotFound(_))
        ));
    }
}
