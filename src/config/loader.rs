//! Configuration loading and discovery for `apkpipe.toml`
//!
//! Provides functions to find, load, and merge configuration, and to turn a
//! loaded configuration into a [`BuildRequest`] and [`Toolchain`].

use super::schema::{ApkConfig, ProjectConfig, SanitizerConfig, ToolConfig, ToolchainConfig};
use crate::build::request::{BuildRequest, SigningCredentials, Variant};
use crate::build::toolchain::{ToolCommand, Toolchain};
use crate::build::Pipeline;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Name of the project configuration file.
pub const CONFIG_FILE_NAME: &str = "apkpipe.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse apkpipe.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
    /// A library pattern could not be expanded
    #[error("Invalid library pattern '{pattern}': {source}")]
    Pattern {
        /// The offending pattern
        pattern: String,
        /// Underlying error
        #[source]
        source: glob::PatternError,
    },
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override output directory
    pub out: Option<PathBuf>,
    /// Override build variant
    pub variant: Option<Variant>,
    /// Override Java language level
    pub java_level: Option<String>,
    /// Leave the package unsigned even when signing is configured
    pub unsigned: Option<bool>,
}

/// Find apkpipe.toml by walking up from the current working directory.
///
/// # Returns
/// - `Some(path)` if an apkpipe.toml file is found
/// - `None` if no config file is found
pub fn find_config() -> Option<PathBuf> {
    env::current_dir().ok().and_then(find_config_from)
}

/// Find apkpipe.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from an apkpipe.toml file.
///
/// If a path is provided, loads from that file. Otherwise, uses `find_config()`
/// to locate the config file. If no config file is found, returns a default
/// configuration.
///
/// # Example
/// ```ignore
/// let config = load_config(Some(Path::new("notes/apkpipe.toml")))?;
/// ```
pub fn load_config(path: Option<&Path>) -> Result<ApkConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(default_config()),
    }
}

/// Load configuration from a specific file path.
fn load_config_file(path: &Path) -> Result<ApkConfig, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let contents = fs::read_to_string(path)?;
    let config: ApkConfig = toml::from_str(&contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    Ok(config)
}

/// Create a default configuration when no apkpipe.toml is found.
///
/// The project name is taken from the current directory name.
pub fn default_config() -> ApkConfig {
    let project_name = env::current_dir()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "app".to_string());

    ApkConfig {
        project: ProjectConfig {
            name: project_name,
            manifest: PathBuf::from("AndroidManifest.xml"),
            sources: vec![PathBuf::from("src")],
            resources: vec![PathBuf::from("res")],
            assets: Vec::new(),
            libraries: vec!["libs/*.jar".to_string()],
            out: PathBuf::from("build"),
            variant: Variant::Debug,
        },
        toolchain: ToolchainConfig::default(),
        signing: None,
        sanitizer: SanitizerConfig::default(),
    }
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut ApkConfig, overrides: &CliOverrides) {
    if let Some(ref out) = overrides.out {
        config.project.out = out.clone();
    }

    if let Some(variant) = overrides.variant {
        config.project.variant = variant;
    }

    if let Some(ref level) = overrides.java_level {
        config.toolchain.java_level = level.clone();
    }

    if overrides.unsigned == Some(true) {
        config.signing = None;
    }
}

/// Get the project root directory from a config file path.
///
/// Returns the parent directory of the apkpipe.toml file.
pub fn project_root(config_path: &Path) -> Option<&Path> {
    config_path.parent()
}

/// Resolve a path relative to the project root.
///
/// If the path is absolute, returns it unchanged.
/// If relative, joins it with the project root.
pub fn resolve_path(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}

/// Resolve a tool program.
///
/// Bare names like `javac` are left for a `PATH` lookup; anything with a
/// directory component is relative to the project root.
fn resolve_program(project_root: &Path, program: &Path) -> PathBuf {
    if program.components().count() > 1 || program.is_absolute() {
        resolve_path(project_root, program)
    } else {
        program.to_path_buf()
    }
}

/// Expand the library patterns into a sorted list of existing files.
pub fn expand_libraries(config: &ApkConfig, project_root: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let mut libraries = Vec::new();
    for pattern in &config.project.libraries {
        let full = resolve_path(project_root, Path::new(pattern));
        let full = full.to_string_lossy();
        let paths = glob::glob(&full)
            .map_err(|source| ConfigError::Pattern { pattern: pattern.clone(), source })?;
        for entry in paths {
            let path = entry.map_err(|e| ConfigError::Io(e.into_error()))?;
            if path.is_file() {
                libraries.push(path);
            }
        }
    }
    libraries.sort();
    libraries.dedup();
    debug!(count = libraries.len(), "expanded library patterns");
    Ok(libraries)
}

/// Build the request described by `config`, resolving paths against
/// `project_root`.
pub fn build_request(config: &ApkConfig, project_root: &Path) -> Result<BuildRequest, ConfigError> {
    let project = &config.project;
    let resolve_all =
        |dirs: &[PathBuf]| dirs.iter().map(|d| resolve_path(project_root, d)).collect::<Vec<_>>();

    let mut request = BuildRequest::new(
        project.name.clone(),
        resolve_path(project_root, &project.manifest),
        resolve_path(project_root, &project.out),
    )
    .with_sources(resolve_all(&project.sources))
    .with_resources(resolve_all(&project.resources))
    .with_assets(resolve_all(&project.assets))
    .with_libraries(expand_libraries(config, project_root)?)
    .with_variant(project.variant);

    if let Some(signing) = &config.signing {
        request = request.with_signing(
            SigningCredentials::new(
                resolve_path(project_root, &signing.key),
                resolve_path(project_root, &signing.certificate),
            )
            .with_created_by(signing.created_by.clone()),
        );
    }

    Ok(request)
}

fn tool_command(project_root: &Path, tool: &ToolConfig) -> ToolCommand {
    tool.env.iter().fold(
        ToolCommand::new(resolve_program(project_root, &tool.program)).with_args(&tool.args),
        |command, (key, value)| command.with_env(key, value),
    )
}

/// Build the toolchain described by `config`.
pub fn toolchain(config: &ApkConfig, project_root: &Path) -> Toolchain {
    let tools = &config.toolchain;
    let mut chain = Toolchain::new(
        tool_command(project_root, &tools.aapt),
        tool_command(project_root, &tools.javac),
        tool_command(project_root, &tools.dex),
        &resolve_path(project_root, &tools.platform_jar),
    )
    .with_java_level(tools.java_level.clone());

    if let Some(aidl) = &tools.aidl {
        chain = chain.with_aidl(tool_command(project_root, aidl));
    }
    if let Some(zipalign) = &tools.zipalign {
        chain = chain.with_zipalign(tool_command(project_root, zipalign));
    }
    if let Some(framework) = &tools.framework_aidl {
        chain = chain.with_framework_aidl(resolve_path(project_root, framework));
    }
    chain
}

/// Build a pipeline with the configured toolchain and supersession rules.
pub fn pipeline(config: &ApkConfig, project_root: &Path) -> Pipeline {
    Pipeline::new(toolchain(config, project_root))
        .with_supersessions(config.sanitizer.supersedes.clone())
}
