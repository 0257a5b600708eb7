//! External tool locations.
//!
//! The pipeline never looks tools up on its own; the caller hands it a
//! [`Toolchain`] describing how to start each one.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// How to start one external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Executable to run
    pub program: PathBuf,
    /// Arguments placed before the ones the pipeline adds
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl ToolCommand {
    /// Run `program` with no fixed arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new(), env: Vec::new() }
    }

    /// Arguments that precede the pipeline's own.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Fixed arguments followed by `extra`, as passed to the process.
    pub fn full_args(&self, extra: &[OsString]) -> Vec<OsString> {
        self.args.iter().map(OsString::from).chain(extra.iter().cloned()).collect()
    }

    /// Printable command line for logs.
    pub fn display_line(&self, extra: &[OsString]) -> String {
        let mut line = self.program.display().to_string();
        for arg in self.full_args(extra) {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// The set of tools and SDK files a build uses.
#[derive(Debug, Clone)]
pub struct Toolchain {
    /// Interface definition compiler; `.aidl` files are ignored without it
    pub aidl: Option<ToolCommand>,
    /// Resource compiler
    pub aapt: ToolCommand,
    /// Java compiler
    pub javac: ToolCommand,
    /// Dex converter
    pub dex: ToolCommand,
    /// Zip aligner; ALIGN passes the signed package through without it
    pub zipalign: Option<ToolCommand>,
    /// Platform `android.jar`
    pub platform_jar: PathBuf,
    /// Platform `framework.aidl`
    pub framework_aidl: Option<PathBuf>,
    /// Java `-source`/`-target` level
    pub java_level: String,
}

/// Java language level used when none is configured.
pub const DEFAULT_JAVA_LEVEL: &str = "1.7";

impl Toolchain {
    /// A toolchain with the required tools and no optional ones.
    pub fn new(aapt: ToolCommand, javac: ToolCommand, dex: ToolCommand, platform_jar: &Path) -> Self {
        Self {
            aidl: None,
            aapt,
            javac,
            dex,
            zipalign: None,
            platform_jar: platform_jar.to_path_buf(),
            framework_aidl: None,
            java_level: DEFAULT_JAVA_LEVEL.to_string(),
        }
    }

    pub fn with_aidl(mut self, aidl: ToolCommand) -> Self {
        self.aidl = Some(aidl);
        self
    }

    pub fn with_zipalign(mut self, zipalign: ToolCommand) -> Self {
        self.zipalign = Some(zipalign);
        self
    }

    pub fn with_framework_aidl(mut self, path: impl Into<PathBuf>) -> Self {
        self.framework_aidl = Some(path.into());
        self
    }

    pub fn with_java_level(mut self, level: impl Into<String>) -> Self {
        self.java_level = level.into();
        self
    }
}
