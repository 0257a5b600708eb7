//! Library archive deduplication.
//!
//! Projects often pull the same library in through several paths. The
//! sanitizer keeps one canonical archive per file name and refuses to
//! continue when two archives share a name but differ in content.
//!
//! Hashing is the expensive part, so hashes of duplicated archives are kept
//! in a cache file (see [`cache`]) and reused while the file's
//! last-modified time is unchanged.

pub mod cache;
pub mod entity;
pub mod hash;

pub use entity::JarEntity;
pub use hash::{ContentHasher, Sha1Hasher};

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// One candidate listed in a conflict report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictCandidate {
    /// Absolute path of the candidate
    pub path: PathBuf,
    /// Length in bytes
    pub length: u64,
    /// Hex SHA-1 of the contents
    pub sha1: String,
}

/// Sanitizer failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SanitizeError {
    /// Two archives share a name but not their contents
    #[error("Found {} versions of {name} in the dependency list", candidates.len())]
    Conflict {
        /// Shared file name
        name: String,
        /// Every candidate with that name
        candidates: Vec<ConflictCandidate>,
    },
    /// A supplied library does not exist
    #[error("Library not found: {}", .0.display())]
    Missing(PathBuf),
    /// A library could not be read
    #[error("Failed to read library {}: {source}", path.display())]
    Io {
        /// Library that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl SanitizeError {
    /// Human-readable explanation, one line per entry.
    pub fn details(&self) -> Vec<String> {
        match self {
            SanitizeError::Conflict { name, candidates } => {
                let mut lines = vec![
                    format!("Found {} versions of {} in the dependency list,", candidates.len(), name),
                    "but not all the versions are identical (check is based on SHA-1 only at this time)."
                        .to_string(),
                    "All versions of the libraries must be the same at this time.".to_string(),
                    "Versions found are:".to_string(),
                ];
                for candidate in candidates {
                    lines.push(format!("Path: {}", candidate.path.display()));
                    lines.push(format!("\tLength: {}", candidate.length));
                    lines.push(format!("\tSHA-1: {}", candidate.sha1));
                }
                lines
            }
            other => vec![other.to_string()],
        }
    }
}

/// A (broader, narrower) pair: when both are present the narrower archive
/// is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supersession {
    /// Archive name that includes the other
    pub broader: String,
    /// Archive name dropped when the broader one is present
    pub narrower: String,
}

impl Supersession {
    /// Create a supersession rule.
    pub fn new(broader: impl Into<String>, narrower: impl Into<String>) -> Self {
        Self { broader: broader.into(), narrower: narrower.into() }
    }
}

/// Rules applied when none are configured.
pub fn default_supersessions() -> Vec<Supersession> {
    vec![Supersession::new("android-support-v13.jar", "android-support-v4.jar")]
}

/// Canonical archives, one per file name, in order of first appearance.
#[derive(Debug, Clone, Default)]
pub struct SanitizedDependencySet {
    entries: Vec<JarEntity>,
    notes: Vec<String>,
}

impl SanitizedDependencySet {
    /// Canonical archive for a file name.
    pub fn get(&self, name: &str) -> Option<&JarEntity> {
        self.entries.iter().find(|e| e.name() == name)
    }

    /// Canonical archive paths.
    pub fn files(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|e| e.path().to_path_buf()).collect()
    }

    /// Canonical file names.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(JarEntity::name).collect()
    }

    /// Iterate over the canonical archives.
    pub fn iter(&self) -> impl Iterator<Item = &JarEntity> {
        self.entries.iter()
    }

    /// Warning notes produced by supersession rules.
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Number of canonical archives.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no archives.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Content-addressed library deduplication with a persistent hash cache.
pub struct DependencySanitizer {
    cache_file: PathBuf,
    hasher: Box<dyn ContentHasher>,
    supersessions: Vec<Supersession>,
}

impl std::fmt::Debug for DependencySanitizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencySanitizer")
            .field("cache_file", &self.cache_file)
            .field("supersessions", &self.supersessions)
            .finish()
    }
}

impl DependencySanitizer {
    /// Create a sanitizer whose cache lives in `out_dir`.
    pub fn new(out_dir: &Path) -> Self {
        Self {
            cache_file: out_dir.join(cache::CACHE_FILE_NAME),
            hasher: Box::new(Sha1Hasher),
            supersessions: default_supersessions(),
        }
    }

    /// Replace the content hasher.
    pub fn with_hasher(mut self, hasher: Box<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Replace the supersession rules.
    pub fn with_supersessions(mut self, supersessions: Vec<Supersession>) -> Self {
        self.supersessions = supersessions;
        self
    }

    /// Path of the cache file.
    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    /// Reduce `paths` to one canonical archive per file name.
    ///
    /// Candidates sharing a name are accepted only if every one has the same
    /// length and SHA-1; the first listed becomes canonical. Cache problems
    /// are logged and never fail the call.
    pub fn sanitize(&self, paths: &[PathBuf]) -> Result<SanitizedDependencySet, SanitizeError> {
        let mut cached = cache::load(&self.cache_file);
        let mut dirty = false;

        let before = cached.len();
        cached.retain(|path, entity| match entity.revalidate() {
            Ok(valid) => {
                if entity.cached_sha1().is_none() {
                    debug!(library = %path.display(), "cached hash invalidated");
                }
                valid
            }
            Err(_) => false,
        });
        if cached.len() != before {
            dirty = true;
        }

        // Group by file name, preserving order of first appearance.
        let mut groups: Vec<(String, Vec<JarEntity>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut seen: HashSet<PathBuf> = HashSet::new();

        for path in paths {
            let absolute = std::path::absolute(path).unwrap_or_else(|_| path.clone());
            if !seen.insert(absolute.clone()) {
                continue;
            }
            if !absolute.is_file() {
                return Err(SanitizeError::Missing(absolute));
            }
            let entity = match cached.remove(&absolute) {
                Some(entity) => entity,
                None => JarEntity::from_file(&absolute)
                    .map_err(|source| SanitizeError::Io { path: absolute.clone(), source })?,
            };
            let name = entity.name();
            match index.get(&name) {
                Some(&i) => groups[i].1.push(entity),
                None => {
                    index.insert(name.clone(), groups.len());
                    groups.push((name, vec![entity]));
                }
            }
        }

        let mut result = SanitizedDependencySet::default();
        let mut conflict = None;

        for (name, mut candidates) in groups {
            if candidates.len() > 1 && conflict.is_none() {
                let mut identical = true;
                let mut reference: Option<(u64, String)> = None;
                for candidate in candidates.iter_mut() {
                    let had_hash = candidate.cached_sha1().is_some();
                    let length = candidate.length();
                    let path = candidate.path().to_path_buf();
                    let sha1 = candidate
                        .sha1(self.hasher.as_ref())
                        .map_err(|source| SanitizeError::Io { path, source })?
                        .to_string();
                    if !had_hash {
                        dirty = true;
                    }
                    match &reference {
                        None => reference = Some((length, sha1)),
                        Some((len, hash)) => {
                            if *len != length || *hash != sha1 {
                                identical = false;
                            }
                        }
                    }
                }
                if !identical {
                    conflict = Some(SanitizeError::Conflict {
                        name: name.clone(),
                        candidates: candidates
                            .iter()
                            .map(|c| ConflictCandidate {
                                path: c.path().to_path_buf(),
                                length: c.length(),
                                sha1: c.cached_sha1().unwrap_or_default().to_string(),
                            })
                            .collect(),
                    });
                }
                for candidate in &candidates {
                    cached.insert(candidate.path().to_path_buf(), candidate.clone());
                }
            }

            let mut canonical = candidates.into_iter();
            if let Some(first) = canonical.next() {
                result.entries.push(first);
            }
        }

        if dirty {
            if let Err(e) = cache::store(&self.cache_file, cached.values()) {
                warn!(cache = %self.cache_file.display(), error = %e, "failed to write dependency cache");
            }
        }

        if let Some(conflict) = conflict {
            return Err(conflict);
        }

        for rule in &self.supersessions {
            let has_broader = result.entries.iter().any(|e| e.name() == rule.broader);
            let has_narrower = result.entries.iter().any(|e| e.name() == rule.narrower);
            if has_broader && has_narrower {
                result.entries.retain(|e| e.name() != rule.narrower);
                let note = format!(
                    "Found both {} and {} in the dependency list. Because {} includes {}, using only {}.",
                    rule.narrower, rule.broader, rule.broader, rule.narrower, rule.broader
                );
                warn!("{}", note);
                result.notes.push(note);
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct CountingHasher(Arc<AtomicUsize>);

    impl ContentHasher for CountingHasher {
        fn hash_file(&self, path: &Path) -> std::io::Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Sha1Hasher.hash_file(path)
        }
    }

    fn create_jar(dir: &Path, rel: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_single_candidates_pass_through_unhashed() {
        let temp = TempDir::new().unwrap();
        let a = create_jar(temp.path(), "libs/a.jar", b"a");
        let b = create_jar(temp.path(), "libs/b.jar", b"b");
        let calls = Arc::new(AtomicUsize::new(0));

        let sanitizer = DependencySanitizer::new(&temp.path().join("out"))
            .with_hasher(Box::new(CountingHasher(calls.clone())));
        let set = sanitizer.sanitize(&[a, b]).unwrap();

        assert_eq!(set.names(), vec!["a.jar", "b.jar"]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!sanitizer.cache_file().exists());
    }

    #[test]
    fn test_identical_duplicates_collapse_to_first() {
        let temp = TempDir::new().unwrap();
        let first = create_jar(temp.path(), "x/lib.jar", b"same");
        let second = create_jar(temp.path(), "y/lib.jar", b"same");

        let sanitizer = DependencySanitizer::new(&temp.path().join("out"));
        let set = sanitizer.sanitize(&[first.clone(), second]).unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(set.get("lib.jar").unwrap().path(), first.as_path());
        assert!(sanitizer.cache_file().exists());
    }

    #[test]
    fn test_same_path_listed_twice_is_not_a_duplicate() {
        let temp = TempDir::new().unwrap();
        let a = create_jar(temp.path(), "libs/a.jar", b"a");
        let sanitizer = DependencySanitizer::new(&temp.path().join("out"));
        let set = sanitizer.sanitize(&[a.clone(), a]).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_different_length_conflicts() {
        let temp = TempDir::new().unwrap();
        let first = create_jar(temp.path(), "x/lib.jar", b"short");
        let second = create_jar(temp.path(), "y/lib.jar", b"much longer");

        let sanitizer = DependencySanitizer::new(&temp.path().join("out"));
        let err = sanitizer.sanitize(&[first, second]).unwrap_err();
        assert!(matches!(err, SanitizeError::Conflict { .. }));
        assert!(err.details().iter().any(|l| l.starts_with("\tLength: 5")));
    }

    #[test]
    fn test_missing_library_is_error() {
        let temp = TempDir::new().unwrap();
        let sanitizer = DependencySanitizer::new(temp.path());
        let err = sanitizer.sanitize(&[temp.path().join("gone.jar")]).unwrap_err();
        assert!(matches!(err, SanitizeError::Missing(_)));
    }

    #[test]
    fn test_supersession_drops_narrower() {
        let temp = TempDir::new().unwrap();
        let v4 = create_jar(temp.path(), "libs/android-support-v4.jar", b"v4");
        let v13 = create_jar(temp.path(), "libs/android-support-v13.jar", b"v13");

        let sanitizer = DependencySanitizer::new(&temp.path().join("out"));
        let set = sanitizer.sanitize(&[v4, v13]).unwrap();

        assert_eq!(set.names(), vec!["android-support-v13.jar"]);
        assert_eq!(set.notes().len(), 1);
    }

    #[test]
    fn test_supersession_table_is_configurable() {
        let temp = TempDir::new().unwrap();
        let core = create_jar(temp.path(), "libs/core.jar", b"c");
        let full = create_jar(temp.path(), "libs/full.jar", b"f");

        let sanitizer = DependencySanitizer::new(&temp.path().join("out"))
            .with_supersessions(vec![Supersession::new("full.jar", "core.jar")]);
        let set = sanitizer.sanitize(&[core, full]).unwrap();
        assert_eq!(set.names(), vec!["full.jar"]);

        let plain = DependencySanitizer::new(&temp.path().join("out2")).with_supersessions(vec![]);
        let set = plain
            .sanitize(&[temp.path().join("libs/core.jar"), temp.path().join("libs/full.jar")])
            .unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_unwritable_cache_does_not_fail() {
        let temp = TempDir::new().unwrap();
        let first = create_jar(temp.path(), "x/lib.jar", b"same");
        let second = create_jar(temp.path(), "y/lib.jar", b"same");
        // A regular file where the output directory should be.
        let blocker = create_jar(temp.path(), "out", b"not a dir");

        let sanitizer = DependencySanitizer::new(&blocker);
        assert!(sanitizer.sanitize(&[first, second]).is_ok());
    }
}
