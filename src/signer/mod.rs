//! Streaming archive writer with jar signing.
//!
//! [`ArchiveSigner`] copies entries into a zip archive while feeding every
//! chunk through one reusable SHA-1 instance, so each entry's digest is known
//! the moment it has been written. On [`close`](ArchiveSigner::close) the
//! recorded digests become the manifest, the manifest is digested into the
//! signature file, and the signature file is signed into a PKCS#7 block.
//!
//! Without a [`SigningKey`] the same writer produces a plain unsigned
//! archive, which is how the packaging step assembles its intermediate
//! output.

pub mod block;
pub mod credentials;
pub mod der;
pub mod manifest;

pub use credentials::SigningKey;
pub use manifest::{pad_signature_file, Manifest};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use manifest::{DIGEST_ATTR, MANIFEST_NAME, SIGNATURE_BLOCK_NAME, SIGNATURE_FILE_NAME};
use sha1::{Digest, Sha1};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Default value of the `Created-By` attributes.
pub const DEFAULT_CREATED_BY: &str = "1.0 (Android)";

/// Archive writing or signing failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignError {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Zip format error
    #[error("Archive error: {0}")]
    Zip(#[from] ZipError),
    /// An entry filter vetoed the copy
    #[error("Packaging aborted: {0}")]
    Aborted(#[from] ZipAbort),
    /// The writer was already closed
    #[error("Archive is already closed")]
    Closed,
    /// The private key could not be parsed
    #[error("Invalid signing key: {0}")]
    Key(String),
    /// The certificate could not be parsed
    #[error("Invalid certificate: {0}")]
    Certificate(String),
    /// The RSA signature could not be produced
    #[error("Signature failed: {0}")]
    Signature(#[from] rsa::Error),
}

/// Raised by an [`EntryFilter`] to stop copying an archive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ZipAbort(pub String);

/// Decides which entries of a source archive are copied.
pub trait EntryFilter {
    /// `Ok(true)` copies the entry, `Ok(false)` skips it, and an error
    /// aborts the whole copy.
    fn check_entry(&mut self, name: &str) -> Result<bool, ZipAbort>;
}

impl<F> EntryFilter for F
where
    F: FnMut(&str) -> Result<bool, ZipAbort>,
{
    fn check_entry(&mut self, name: &str) -> Result<bool, ZipAbort> {
        self(name)
    }
}

/// Diverts selected entries of a source archive instead of copying them.
pub trait EntryExtractor {
    /// Whether this extractor takes the entry.
    fn wants(&mut self, name: &str) -> bool;

    /// Consume the entry's bytes.
    fn extract(&mut self, name: &str, data: &mut dyn Read) -> io::Result<()>;
}

/// Entries of a source archive that never carry over into a new one.
pub fn is_skipped_entry(name: &str) -> bool {
    if name == MANIFEST_NAME || name.starts_with("META-INF/maven/") {
        return true;
    }
    let Some(file) = name.strip_prefix("META-INF/") else {
        return false;
    };
    if file.contains('/') {
        return false;
    }
    let upper = file.to_ascii_uppercase();
    [".SF", ".RSA", ".DSA", ".EC"].iter().any(|ext| upper.ends_with(ext))
}

/// Zip writer that digests entries as it copies them and signs on close.
pub struct ArchiveSigner {
    path: PathBuf,
    writer: Option<ZipWriter<BufWriter<File>>>,
    manifest: Manifest,
    digest: Sha1,
    key: Option<SigningKey>,
    created_by: String,
    signature_file_len: Option<usize>,
}

impl std::fmt::Debug for ArchiveSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveSigner")
            .field("path", &self.path)
            .field("open", &self.writer.is_some())
            .field("signed", &self.key.is_some())
            .field("entries", &self.manifest.len())
            .finish()
    }
}

impl ArchiveSigner {
    /// Create the output archive. Parent directories are created as needed.
    pub fn create(path: &Path, key: Option<SigningKey>) -> Result<Self, SignError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(ZipWriter::new(BufWriter::new(file))),
            manifest: Manifest::new(DEFAULT_CREATED_BY),
            digest: Sha1::new(),
            key,
            created_by: DEFAULT_CREATED_BY.to_string(),
            signature_file_len: None,
        })
    }

    /// Set the `Created-By` value written into the manifest and signature file.
    pub fn with_created_by(mut self, created_by: &str) -> Self {
        self.manifest.set_main_attribute("Created-By", created_by);
        self.created_by = created_by.to_string();
        self
    }

    /// Output path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Digests recorded so far.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Whether the archive will be signed on close.
    pub fn is_signing(&self) -> bool {
        self.key.is_some()
    }

    /// Length of the signature file written on close, padding included.
    pub fn signature_file_len(&self) -> Option<usize> {
        self.signature_file_len
    }

    /// Copy `input` into a new deflated entry and record its digest.
    pub fn write_entry<R: Read + ?Sized>(
        &mut self,
        input: &mut R,
        name: &str,
    ) -> Result<(), SignError> {
        self.copy_entry(input, name, CompressionMethod::Deflated)
    }

    /// Copy a file from disk into a new entry.
    pub fn write_file(&mut self, path: &Path, name: &str) -> Result<(), SignError> {
        let mut file = File::open(path)?;
        self.write_entry(&mut file, name)
    }

    /// Copy the entries of another zip archive.
    ///
    /// Directories, the source manifest, its signature files and anything
    /// under `META-INF/maven/` are skipped. The extractor sees entries
    /// before the filter; stored entries stay stored.
    pub fn write_zip<R: Read + Seek>(
        &mut self,
        input: R,
        mut filter: Option<&mut dyn EntryFilter>,
        mut extractor: Option<&mut dyn EntryExtractor>,
    ) -> Result<(), SignError> {
        let mut archive = ZipArchive::new(input)?;

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            let name = entry.name().to_string();

            if entry.is_dir() || is_skipped_entry(&name) {
                continue;
            }

            if let Some(extractor) = extractor.as_deref_mut() {
                if extractor.wants(&name) {
                    extractor.extract(&name, &mut entry)?;
                    continue;
                }
            }

            if let Some(filter) = filter.as_deref_mut() {
                if !filter.check_entry(&name)? {
                    continue;
                }
            }

            let method = match entry.compression() {
                CompressionMethod::Stored => CompressionMethod::Stored,
                _ => CompressionMethod::Deflated,
            };
            self.copy_entry(&mut entry, &name, method)?;
        }

        Ok(())
    }

    fn copy_entry<R: Read + ?Sized>(
        &mut self,
        input: &mut R,
        name: &str,
        method: CompressionMethod,
    ) -> Result<(), SignError> {
        let writer = self.writer.as_mut().ok_or(SignError::Closed)?;
        writer.start_file(name, SimpleFileOptions::default().compression_method(method))?;

        let mut buffer = [0u8; 8192];
        loop {
            let count = input.read(&mut buffer)?;
            if count == 0 {
                break;
            }
            writer.write_all(&buffer[..count])?;
            self.digest.update(&buffer[..count]);
        }

        let digest = self.digest.finalize_reset();
        self.manifest.set_entry_attribute(name, DIGEST_ATTR, BASE64.encode(digest));
        Ok(())
    }

    /// Finish the archive, writing the signature files if a key was given.
    pub fn close(&mut self) -> Result<(), SignError> {
        let mut writer = self.writer.take().ok_or(SignError::Closed)?;
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        if let Some(key) = &self.key {
            let manifest_bytes = self.manifest.to_bytes();
            writer.start_file(MANIFEST_NAME, options)?;
            writer.write_all(&manifest_bytes)?;

            let mut signature_file =
                manifest::signature_file(&self.manifest, &manifest_bytes, &self.created_by);
            if pad_signature_file(&mut signature_file) {
                debug!(archive = %self.path.display(), "padded signature file");
            }
            self.signature_file_len = Some(signature_file.len());
            writer.start_file(SIGNATURE_FILE_NAME, options)?;
            writer.write_all(&signature_file)?;

            let block = block::signature_block(
                key.key(),
                key.certificate(),
                key.certificate_info(),
                &signature_file,
            )?;
            writer.start_file(SIGNATURE_BLOCK_NAME, options)?;
            writer.write_all(&block)?;
        }

        let mut inner = writer.finish()?;
        inner.flush()?;
        debug!(
            archive = %self.path.display(),
            entries = self.manifest.len(),
            signed = self.key.is_some(),
            "closed archive"
        );
        Ok(())
    }

    /// Best-effort close for failure paths. Safe to call repeatedly.
    pub fn clean_up(&mut self) {
        if let Some(writer) = self.writer.take() {
            match writer.finish() {
                Ok(mut inner) => {
                    let _ = inner.flush();
                }
                Err(e) => {
                    warn!(archive = %self.path.display(), error = %e, "failed to close archive")
                }
            }
        }
    }
}

impl Drop for ArchiveSigner {
    fn drop(&mut self) {
        self.clean_up();
    }
}
