//! Structured diagnostics extracted from build tool output.
//!
//! Every external tool prints problems in its own line-oriented dialect.
//! This module turns that text into [`Diagnostic`] records:
//!
//! - **Reader**: a line cursor with push-back for multi-line reports
//! - **Formats**: ordered matcher tables, one per tool
//! - **Parser**: runs the matchers over a stream and emits diagnostics
//!
//! # Example
//!
//! ```ignore
//! use apkpipe::diagnostic::{DiagnosticParser, Tool};
//!
//! let parser = DiagnosticParser::new(Tool::Javac);
//! let diagnostics = parser.parse_text("Foo.java:10: error: cannot find symbol\n");
//! assert_eq!(diagnostics[0].line, Some(10));
//! ```

pub mod formats;
pub mod parser;
pub mod reader;

pub use formats::{MatchOutcome, Matcher};
pub use parser::*;
pub use reader::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The tool reported a failure
    Error,
    /// The tool reported a problem that does not stop the build
    Warning,
    /// Informational note
    Info,
    /// Raw text the parser could not classify
    Unknown,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
            Severity::Unknown => write!(f, "unknown"),
        }
    }
}

/// Tool that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Interface definition compiler
    Aidl,
    /// Resource compiler and packager
    Aapt,
    /// Java compiler
    Javac,
    /// Bytecode to dex converter
    Dex,
    /// Archive alignment tool
    Zipalign,
    /// Library deduplication
    Sanitizer,
    /// Archive signer
    Signer,
    /// The pipeline itself
    Pipeline,
}

impl Tool {
    /// Short lowercase name used in logs and JSON output.
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Aidl => "aidl",
            Tool::Aapt => "aapt",
            Tool::Javac => "javac",
            Tool::Dex => "dex",
            Tool::Zipalign => "zipalign",
            Tool::Sanitizer => "sanitizer",
            Tool::Signer => "signer",
            Tool::Pipeline => "pipeline",
        }
    }

    /// Parse a tool from its short name.
    pub fn from_name(name: &str) -> Option<Tool> {
        match name {
            "aidl" => Some(Tool::Aidl),
            "aapt" => Some(Tool::Aapt),
            "javac" | "ecj" => Some(Tool::Javac),
            "dex" | "dx" | "d8" => Some(Tool::Dex),
            "zipalign" => Some(Tool::Zipalign),
            _ => None,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A structured, optionally located message from a build tool.
///
/// Lines and columns are 1-based. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity of the problem
    pub severity: Severity,
    /// Source file the problem refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// 1-based line number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// 1-based column number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// Message text
    pub message: String,
    /// Originating tool
    pub tool: Tool,
}

impl Diagnostic {
    /// Create an unlocated diagnostic.
    pub fn new(tool: Tool, severity: Severity, message: impl Into<String>) -> Self {
        Self { severity, path: None, line: None, column: None, message: message.into(), tool }
    }

    /// Create an error diagnostic.
    pub fn error(tool: Tool, message: impl Into<String>) -> Self {
        Self::new(tool, Severity::Error, message)
    }

    /// Create a warning diagnostic.
    pub fn warning(tool: Tool, message: impl Into<String>) -> Self {
        Self::new(tool, Severity::Warning, message)
    }

    /// Create a diagnostic carrying a raw, unclassified line.
    pub fn raw(tool: Tool, line: impl Into<String>) -> Self {
        Self::new(tool, Severity::Unknown, line)
    }

    /// Attach a source path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach a 1-based line number.
    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Attach a 1-based column number.
    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }

    /// Check if this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Check if this diagnostic is a warning.
    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}", path.display())?;
            if let Some(line) = self.line {
                write!(f, ":{}", line)?;
                if let Some(column) = self.column {
                    write!(f, ":{}", column)?;
                }
            }
            write!(f, ": ")?;
        }
        if self.severity == Severity::Unknown {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.severity, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display_located() {
        let diag = Diagnostic::error(Tool::Javac, "cannot find symbol")
            .with_path("src/Foo.java")
            .with_line(12)
            .with_column(5);
        assert_eq!(diag.to_string(), "src/Foo.java:12:5: error: cannot find symbol");
    }

    #[test]
    fn test_diagnostic_display_raw() {
        let diag = Diagnostic::raw(Tool::Dex, "at com.android.dx.Main");
        assert_eq!(diag.to_string(), "at com.android.dx.Main");
    }

    #[test]
    fn test_diagnostic_structural_equality() {
        let a = Diagnostic::warning(Tool::Aapt, "x").with_line(1);
        let b = Diagnostic::warning(Tool::Aapt, "x").with_line(1);
        assert_eq!(a, b);
        assert_ne!(a, b.with_column(2));
    }

    #[test]
    fn test_tool_from_name() {
        assert_eq!(Tool::from_name("dx"), Some(Tool::Dex));
        assert_eq!(Tool::from_name("ecj"), Some(Tool::Javac));
        assert_eq!(Tool::from_name("signer"), None);
    }

    #[test]
    fn test_diagnostic_json_skips_missing_location() {
        let diag = Diagnostic::warning(Tool::Sanitizer, "dropped");
        let json = serde_json::to_string(&diag).unwrap();
        assert!(!json.contains("path"));
        assert!(json.contains(r#""severity":"warning""#));
    }
}
