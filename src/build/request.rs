//! The description of one build.

use crate::signer::{SignError, SigningKey, DEFAULT_CREATED_BY};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Build flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Debuggable build with full debug info
    #[default]
    Debug,
    /// Optimized build without debug info
    Release,
}

impl Variant {
    /// Lower-case name, also used in the published file name.
    pub fn name(self) -> &'static str {
        match self {
            Variant::Debug => "debug",
            Variant::Release => "release",
        }
    }

    /// Whether tools should emit debug information.
    pub fn is_debug(self) -> bool {
        self == Variant::Debug
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where to find the signing key and certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningCredentials {
    /// PEM private key (PKCS#8 or PKCS#1)
    pub key: PathBuf,
    /// PEM or DER X.509 certificate
    pub certificate: PathBuf,
    /// Value for the `Created-By` attributes
    pub created_by: String,
}

impl SigningCredentials {
    /// Reference a key and certificate on disk.
    pub fn new(key: impl Into<PathBuf>, certificate: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            certificate: certificate.into(),
            created_by: DEFAULT_CREATED_BY.to_string(),
        }
    }

    /// Override the `Created-By` value.
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    /// Read and parse the key material.
    pub fn load(&self) -> Result<SigningKey, SignError> {
        SigningKey::from_files(&self.key, &self.certificate)
    }
}

/// Everything one pipeline run needs to know about the project.
///
/// A request is immutable once the pipeline has it; re-running a build means
/// submitting a new request.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Application name, used for artifact file names
    name: String,
    /// `AndroidManifest.xml`
    manifest: PathBuf,
    /// Java source roots (also searched for `.aidl` files)
    source_dirs: Vec<PathBuf>,
    /// Resource directories
    resource_dirs: Vec<PathBuf>,
    /// Asset directories
    asset_dirs: Vec<PathBuf>,
    /// Library archives
    libraries: Vec<PathBuf>,
    /// Output directory
    output_dir: PathBuf,
    /// Signing key material, if the package should be signed
    signing: Option<SigningCredentials>,
    /// Build flavor
    variant: Variant,
}

impl BuildRequest {
    /// Create a request with no sources, resources or libraries.
    pub fn new(name: impl Into<String>, manifest: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            manifest: manifest.into(),
            source_dirs: Vec::new(),
            resource_dirs: Vec::new(),
            asset_dirs: Vec::new(),
            libraries: Vec::new(),
            output_dir: output_dir.into(),
            signing: None,
            variant: Variant::Debug,
        }
    }

    /// Set the Java source roots.
    pub fn with_sources(mut self, dirs: Vec<PathBuf>) -> Self {
        self.source_dirs = dirs;
        self
    }

    /// Set the resource directories.
    pub fn with_resources(mut self, dirs: Vec<PathBuf>) -> Self {
        self.resource_dirs = dirs;
        self
    }

    /// Set the asset directories.
    pub fn with_assets(mut self, dirs: Vec<PathBuf>) -> Self {
        self.asset_dirs = dirs;
        self
    }

    /// Set the library archives.
    pub fn with_libraries(mut self, libraries: Vec<PathBuf>) -> Self {
        self.libraries = libraries;
        self
    }

    /// Sign the package with these credentials.
    pub fn with_signing(mut self, signing: SigningCredentials) -> Self {
        self.signing = Some(signing);
        self
    }

    /// Set the build flavor.
    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manifest(&self) -> &Path {
        &self.manifest
    }

    pub fn source_dirs(&self) -> &[PathBuf] {
        &self.source_dirs
    }

    pub fn resource_dirs(&self) -> &[PathBuf] {
        &self.resource_dirs
    }

    pub fn asset_dirs(&self) -> &[PathBuf] {
        &self.asset_dirs
    }

    pub fn libraries(&self) -> &[PathBuf] {
        &self.libraries
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn signing(&self) -> Option<&SigningCredentials> {
        self.signing.as_ref()
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Check the request before anything is touched on disk.
    ///
    /// Returns every problem found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push("name must not be empty".to_string());
        } else if self.name.contains(['/', '\\']) {
            errors.push(format!("name '{}' must not contain path separators", self.name));
        }
        if !self.manifest.is_file() {
            errors.push(format!("manifest not found: {}", self.manifest.display()));
        }
        let dirs = self.source_dirs.iter().chain(&self.resource_dirs).chain(&self.asset_dirs);
        for dir in dirs {
            if !dir.is_dir() {
                errors.push(format!("directory not found: {}", dir.display()));
            }
        }
        for dir in [&self.source_dirs, &self.resource_dirs, &self.asset_dirs].into_iter().flatten() {
            if dir.starts_with(&self.output_dir) {
                errors.push(format!("{} is inside the output directory", dir.display()));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_variant_names() {
        assert_eq!(Variant::default(), Variant::Debug);
        assert_eq!(Variant::Release.to_string(), "release");
        assert!(Variant::Debug.is_debug());
        assert!(!Variant::Release.is_debug());
    }

    #[test]
    fn test_builder_sets_fields() {
        let request = BuildRequest::new("app", "AndroidManifest.xml", "out")
            .with_sources(vec![PathBuf::from("src")])
            .with_libraries(vec![PathBuf::from("libs/a.jar")])
            .with_variant(Variant::Release)
            .with_signing(SigningCredentials::new("key.pem", "cert.pem"));

        assert_eq!(request.name(), "app");
        assert_eq!(request.source_dirs(), &[PathBuf::from("src")]);
        assert_eq!(request.libraries().len(), 1);
        assert_eq!(request.variant(), Variant::Release);
        assert_eq!(request.signing().unwrap().created_by, DEFAULT_CREATED_BY);
    }

    #[test]
    fn test_validate_ok() {
        let temp = TempDir::new().unwrap();
        let manifest = temp.path().join("AndroidManifest.xml");
        fs::write(&manifest, "<manifest/>").unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();

        let request = BuildRequest::new("app", &manifest, temp.path().join("out"))
            .with_sources(vec![temp.path().join("src")]);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_errors() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        let request = BuildRequest::new("a/b", temp.path().join("missing.xml"), &out)
            .with_sources(vec![temp.path().join("nope"), out.join("gen")]);

        let errors = request.validate().unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors[0].contains("path separators"));
        assert!(errors[1].contains("manifest not found"));
        assert!(errors.iter().any(|e| e.contains("inside the output directory")));
    }
}
