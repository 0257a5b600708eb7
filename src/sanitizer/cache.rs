//! On-disk hash cache for library archives.
//!
//! The cache is a UTF-8 text file with three comment lines followed by one
//! record per archive:
//!
//! ```text
//! <lastModified> <length> <sha1-hex> <absolutePath>
//! ```
//!
//! Every operation here is best-effort. Unreadable files yield an empty
//! cache and malformed lines are skipped.

use super::entity::JarEntity;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// File name of the cache inside the build output directory.
pub const CACHE_FILE_NAME: &str = "jarlist.cache";

const HEADER: [&str; 3] = [
    "# cache for current jar dependency. DO NOT EDIT.",
    "# format is <lastModified> <length> <SHA-1> <path>",
    "# Encoding is UTF-8",
];

static RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+) (\d+) ([0-9a-f]+) (.+)$").expect("cache record regex is valid")
});

/// Cached entities keyed by absolute path.
pub type CacheMap = HashMap<PathBuf, JarEntity>;

/// Parse one cache record.
pub fn parse_record(line: &str) -> Option<JarEntity> {
    let caps = RECORD.captures(line)?;
    let last_modified = caps[1].parse().ok()?;
    let length = caps[2].parse().ok()?;
    Some(JarEntity::from_cache(PathBuf::from(&caps[4]), last_modified, length, caps[3].to_string()))
}

/// Format one cache record. Entities without a hash have no record.
pub fn format_record(entity: &JarEntity) -> Option<String> {
    let sha1 = entity.cached_sha1()?;
    Some(format!(
        "{} {} {} {}",
        entity.last_modified(),
        entity.length(),
        sha1,
        entity.path().display()
    ))
}

/// Load the cache, returning an empty map if the file is missing or unreadable.
pub fn load(path: &Path) -> CacheMap {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return CacheMap::new(),
        Err(e) => {
            warn!(cache = %path.display(), error = %e, "failed to read dependency cache");
            return CacheMap::new();
        }
    };

    let map: CacheMap = contents
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(parse_record)
        .map(|entity| (entity.path().to_path_buf(), entity))
        .collect();
    debug!(cache = %path.display(), entries = map.len(), "loaded dependency cache");
    map
}

/// Write the cache atomically, replacing any previous file.
pub fn store<'a, I>(path: &Path, entities: I) -> io::Result<()>
where
    I: IntoIterator<Item = &'a JarEntity>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut records: Vec<String> = entities.into_iter().filter_map(format_record).collect();
    records.sort();

    let tmp = path.with_extension("cache.tmp");
    {
        let mut file = io::BufWriter::new(fs::File::create(&tmp)?);
        for line in HEADER {
            writeln!(file, "{}", line)?;
        }
        for record in &records {
            writeln!(file, "{}", record)?;
        }
        file.flush()?;
    }
    fs::rename(&tmp, path)?;
    debug!(cache = %path.display(), entries = records.len(), "wrote dependency cache");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_record() {
        let entity = parse_record("1700000000000 1234 0a1b2c /libs/android-support-v4.jar").unwrap();
        assert_eq!(entity.last_modified(), 1700000000000);
        assert_eq!(entity.length(), 1234);
        assert_eq!(entity.cached_sha1(), Some("0a1b2c"));
        assert_eq!(entity.path(), Path::new("/libs/android-support-v4.jar"));
    }

    #[test]
    fn test_parse_record_path_with_spaces() {
        let entity = parse_record("1 2 ab /my libs/a b.jar").unwrap();
        assert_eq!(entity.path(), Path::new("/my libs/a b.jar"));
    }

    #[test]
    fn test_malformed_records_skipped() {
        assert!(parse_record("not a record").is_none());
        assert!(parse_record("1 2 XYZ /a.jar").is_none());
        assert!(parse_record("1 2 ab").is_none());
    }

    #[test]
    fn test_store_then_load() {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join("out").join(CACHE_FILE_NAME);
        let a = JarEntity::from_cache(PathBuf::from("/a/lib.jar"), 5, 10, "aa".to_string());
        let b = JarEntity::from_cache(PathBuf::from("/b/lib.jar"), 6, 10, "aa".to_string());

        store(&cache, [&a, &b]).unwrap();
        let text = fs::read_to_string(&cache).unwrap();
        assert!(text.starts_with("# cache for current jar dependency. DO NOT EDIT.\n"));

        let loaded = load(&cache);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(Path::new("/a/lib.jar")), Some(&a));
    }

    #[test]
    fn test_load_tolerates_garbage() {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join(CACHE_FILE_NAME);
        fs::write(&cache, "# header\ngarbage line\n1 2 ab /x.jar\n").unwrap();
        assert_eq!(load(&cache).len(), 1);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(load(&temp.path().join(CACHE_FILE_NAME)).is_empty());
    }
}
