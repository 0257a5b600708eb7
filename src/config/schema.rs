//! Configuration schema types for `apkpipe.toml`
//!
//! Defines the structure and validation rules for an application project.

use crate::build::request::Variant;
use crate::build::toolchain::DEFAULT_JAVA_LEVEL;
use crate::sanitizer::{default_supersessions, Supersession};
use crate::signer::DEFAULT_CREATED_BY;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Project section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Application name (required), used for package file names
    pub name: String,
    /// Application manifest
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,
    /// Java source roots
    #[serde(default = "default_sources")]
    pub sources: Vec<PathBuf>,
    /// Resource directories
    #[serde(default = "default_resources")]
    pub resources: Vec<PathBuf>,
    /// Asset directories
    #[serde(default)]
    pub assets: Vec<PathBuf>,
    /// Glob patterns for library jars
    #[serde(default = "default_libraries")]
    pub libraries: Vec<String>,
    /// Build output directory
    #[serde(default = "default_out")]
    pub out: PathBuf,
    /// Build flavor
    #[serde(default)]
    pub variant: Variant,
}

fn default_manifest() -> PathBuf {
    PathBuf::from("AndroidManifest.xml")
}

fn default_sources() -> Vec<PathBuf> {
    vec![PathBuf::from("src")]
}

fn default_resources() -> Vec<PathBuf> {
    vec![PathBuf::from("res")]
}

fn default_libraries() -> Vec<String> {
    vec!["libs/*.jar".to_string()]
}

fn default_out() -> PathBuf {
    PathBuf::from("build")
}

/// How to invoke one external tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Executable path or name
    pub program: PathBuf,
    /// Arguments placed before the stage's own arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ToolConfig {
    fn named(program: &str) -> Self {
        Self { program: PathBuf::from(program), args: Vec::new(), env: BTreeMap::new() }
    }
}

/// Toolchain section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Platform class library (`android.jar`)
    #[serde(default = "default_platform_jar")]
    pub platform_jar: PathBuf,
    /// Framework interface definitions passed to the interface compiler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_aidl: Option<PathBuf>,
    /// Java source and target level
    #[serde(default = "default_java_level")]
    pub java_level: String,
    /// Interface compiler; AIDL files are skipped when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aidl: Option<ToolConfig>,
    /// Resource compiler
    #[serde(default = "default_aapt")]
    pub aapt: ToolConfig,
    /// Java compiler
    #[serde(default = "default_javac")]
    pub javac: ToolConfig,
    /// Dex converter
    #[serde(default = "default_dex")]
    pub dex: ToolConfig,
    /// Aligner; ALIGN passes the package through when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zipalign: Option<ToolConfig>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            platform_jar: default_platform_jar(),
            framework_aidl: None,
            java_level: default_java_level(),
            aidl: None,
            aapt: default_aapt(),
            javac: default_javac(),
            dex: default_dex(),
            zipalign: None,
        }
    }
}

fn default_platform_jar() -> PathBuf {
    PathBuf::from("android.jar")
}

fn default_java_level() -> String {
    DEFAULT_JAVA_LEVEL.to_string()
}

fn default_aapt() -> ToolConfig {
    ToolConfig::named("aapt")
}

fn default_javac() -> ToolConfig {
    ToolConfig::named("javac")
}

fn default_dex() -> ToolConfig {
    ToolConfig::named("dx")
}

/// Signing section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// PEM private key
    pub key: PathBuf,
    /// PEM or DER certificate
    pub certificate: PathBuf,
    /// `Created-By` attribute value
    #[serde(default = "default_created_by")]
    pub created_by: String,
}

fn default_created_by() -> String {
    DEFAULT_CREATED_BY.to_string()
}

/// Sanitizer section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Library names that make narrower ones redundant
    #[serde(default = "default_supersessions")]
    pub supersedes: Vec<Supersession>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self { supersedes: default_supersessions() }
    }
}

/// Complete `apkpipe.toml` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApkConfig {
    /// Project layout (required)
    pub project: ProjectConfig,
    /// External tools
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    /// Signing credentials; packages stay unsigned without them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing: Option<SigningConfig>,
    /// Library deduplication rules
    #[serde(default)]
    pub sanitizer: SanitizerConfig,
}

/// A single problem found while validating a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "toolchain.javac.program")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "apkpipe.toml: '{}' {}", self.field, self.message)
    }
}

impl ApkConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: String, message: &str| {
            errors.push(ConfigValidationError { field, message: message.to_string() });
        };

        let name = &self.project.name;
        if name.is_empty() {
            push("project.name".to_string(), "must be a non-empty string");
        } else if name.contains(['/', '\\']) {
            push("project.name".to_string(), "must not contain path separators");
        }

        if self.project.sources.is_empty() {
            push("project.sources".to_string(), "must contain at least one directory");
        }

        for (i, pattern) in self.project.libraries.iter().enumerate() {
            if let Err(e) = glob::Pattern::new(pattern) {
                push(format!("project.libraries[{}]", i), &format!("is not a valid glob: {}", e));
            }
        }

        let toolchain = &self.toolchain;
        if toolchain.java_level.trim().is_empty() {
            push("toolchain.java_level".to_string(), "must be a non-empty string");
        }
        let tools = [
            ("aidl", toolchain.aidl.as_ref()),
            ("aapt", Some(&toolchain.aapt)),
            ("javac", Some(&toolchain.javac)),
            ("dex", Some(&toolchain.dex)),
            ("zipalign", toolchain.zipalign.as_ref()),
        ];
        for (tool, config) in tools {
            if config.is_some_and(|c| c.program.as_os_str().is_empty()) {
                push(format!("toolchain.{}.program", tool), "must be a non-empty path");
            }
        }

        if let Some(signing) = &self.signing {
            if signing.key.as_os_str().is_empty() {
                push("signing.key".to_string(), "must be a non-empty path");
            }
            if signing.certificate.as_os_str().is_empty() {
                push("signing.certificate".to_string(), "must be a non-empty path");
            }
        }

        for (i, rule) in self.sanitizer.supersedes.iter().enumerate() {
            if rule.broader.is_empty() || rule.narrower.is_empty() {
                push(format!("sanitizer.supersedes[{}]", i), "names must be non-empty");
            } else if rule.broader == rule.narrower {
                push(format!("sanitizer.supersedes[{}]", i), "cannot supersede itself");
            }
        }

        errors
    }
}
