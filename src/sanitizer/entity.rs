//! Library archive identity as tracked by the sanitizer cache.

use super::hash::ContentHasher;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// A library archive with a lazily computed content hash.
///
/// The hash is trusted only while the file's last-modified time equals the
/// value observed when the hash was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JarEntity {
    path: PathBuf,
    last_modified: u64,
    length: u64,
    sha1: Option<String>,
}

impl JarEntity {
    /// Stat a file on disk. No hashing happens here.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let (last_modified, length) = stat(path)?;
        Ok(Self { path: path.to_path_buf(), last_modified, length, sha1: None })
    }

    /// Rebuild an entity from a cache record.
    pub fn from_cache(path: PathBuf, last_modified: u64, length: u64, sha1: String) -> Self {
        Self { path, last_modified, length, sha1: Some(sha1) }
    }

    /// Absolute path of the archive.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name used for grouping duplicates.
    pub fn name(&self) -> String {
        self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    }

    /// Last-modified time in milliseconds since the epoch.
    pub fn last_modified(&self) -> u64 {
        self.last_modified
    }

    /// Length in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Hash if already known.
    pub fn cached_sha1(&self) -> Option<&str> {
        self.sha1.as_deref()
    }

    /// Hash, computing it with `hasher` on first access.
    pub fn sha1(&mut self, hasher: &dyn ContentHasher) -> io::Result<&str> {
        if self.sha1.is_none() {
            self.sha1 = Some(hasher.hash_file(&self.path)?);
        }
        Ok(self.sha1.as_deref().unwrap_or_default())
    }

    /// Re-stat the file.
    ///
    /// Returns `Ok(false)` if the file vanished. A changed last-modified time
    /// refreshes the length and clears the hash; `Ok(true)` is returned
    /// either way as long as the file exists.
    pub fn revalidate(&mut self) -> io::Result<bool> {
        if !self.path.is_file() {
            return Ok(false);
        }
        let (last_modified, length) = stat(&self.path)?;
        if last_modified != self.last_modified {
            self.last_modified = last_modified;
            self.length = length;
            self.sha1 = None;
        }
        Ok(true)
    }
}

fn stat(path: &Path) -> io::Result<(u64, u64)> {
    let metadata = fs::metadata(path)?;
    let last_modified = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    Ok((last_modified, metadata.len()))
}
