//! Output directory layout.
//!
//! ```text
//! <out>/
//!   gen/                       generated R.java and AIDL stubs
//!   bin/classes/               compiled classes
//!   bin/classes.dex            converted application classes
//!   bin/merged/classes.dex     application plus library classes
//!   bin/resources.ap_          compiled resources
//!   bin/<name>-unsigned.apk    PACKAGE output
//!   bin/<name>-unaligned.apk   SIGN output
//!   bin/<name>-aligned.apk     ALIGN output
//!   <name>-<variant>.apk       published package
//!   jarlist.cache              sanitizer cache, never removed
//! ```

use super::request::BuildRequest;
use super::stage::Stage;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Paths of every artifact a build produces.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    name: String,
    published: PathBuf,
}

impl OutputLayout {
    pub fn new(request: &BuildRequest) -> Self {
        let root = request.output_dir().to_path_buf();
        let published = root.join(format!("{}-{}.apk", request.name(), request.variant()));
        Self { root, name: request.name().to_string(), published }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn gen_dir(&self) -> PathBuf {
        self.root.join("gen")
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn classes_dir(&self) -> PathBuf {
        self.bin_dir().join("classes")
    }

    pub fn dex_file(&self) -> PathBuf {
        self.bin_dir().join("classes.dex")
    }

    pub fn merged_dex_dir(&self) -> PathBuf {
        self.bin_dir().join("merged")
    }

    pub fn merged_dex(&self) -> PathBuf {
        self.merged_dex_dir().join("classes.dex")
    }

    pub fn resources_archive(&self) -> PathBuf {
        self.bin_dir().join("resources.ap_")
    }

    pub fn unsigned_package(&self) -> PathBuf {
        self.bin_dir().join(format!("{}-unsigned.apk", self.name))
    }

    pub fn signed_package(&self) -> PathBuf {
        self.bin_dir().join(format!("{}-unaligned.apk", self.name))
    }

    pub fn aligned_package(&self) -> PathBuf {
        self.bin_dir().join(format!("{}-aligned.apk", self.name))
    }

    pub fn published_package(&self) -> &Path {
        &self.published
    }

    /// Artifacts written by `stage`.
    pub fn artifacts(&self, stage: Stage) -> Vec<PathBuf> {
        match stage {
            Stage::Clean => Vec::new(),
            Stage::GenerateResources => vec![self.gen_dir(), self.resources_archive()],
            Stage::Compile => vec![self.classes_dir()],
            Stage::Convert => vec![self.dex_file()],
            Stage::Package => vec![self.merged_dex_dir(), self.unsigned_package()],
            Stage::Sign => vec![self.signed_package()],
            Stage::Align => vec![self.aligned_package()],
            Stage::Publish => vec![self.published.clone()],
        }
    }

    /// Delete the artifacts of `stage` and of every stage after it.
    pub fn invalidate_from(&self, stage: Stage) -> io::Result<()> {
        for later in stage.and_later() {
            for path in self.artifacts(*later) {
                remove_path(&path)?;
            }
        }
        Ok(())
    }
}

/// Remove a file or directory tree; a missing path is not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => {
            debug!(path = %path.display(), "removed");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
