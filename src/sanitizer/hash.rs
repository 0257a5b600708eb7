//! Content hashing for library archives.

use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

/// Computes the hex content hash of a file.
///
/// The sanitizer only calls this when no trusted cached hash exists, so
/// tests can count invocations to observe cache behavior.
pub trait ContentHasher: Send + Sync {
    /// Hash the full contents of `path`.
    fn hash_file(&self, path: &Path) -> io::Result<String>;
}

/// SHA-1 hasher streaming the file through the digest.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha1Hasher;

impl ContentHasher for Sha1Hasher {
    fn hash_file(&self, path: &Path) -> io::Result<String> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut hasher = Sha1::new();
        io::copy(&mut reader, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sha1_of_known_content() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        let hash = Sha1Hasher.hash_file(file.path()).unwrap();
        assert_eq!(hash, "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_sha1_of_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let hash = Sha1Hasher.hash_file(file.path()).unwrap();
        assert_eq!(hash, "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(Sha1Hasher.hash_file(Path::new("/nonexistent/lib.jar")).is_err());
    }

    #[test]
    fn test_sha1_spans_buffer_boundaries() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![b'a'; 1_000_000]).unwrap();
        let hash = Sha1Hasher.hash_file(file.path()).unwrap();
        assert_eq!(hash, "34aa973cd4c4daa4f61eeb2bdbad27316534016f");
    }
}
