//! Per-tool matcher tables.
//!
//! Each tool gets an ordered list of [`Matcher`]s. The parser tries them
//! top to bottom and the first pattern that matches a line wins, so
//! specific shapes (`path:line: error: msg`) must precede the generic
//! ones (`path:line: msg`) they would otherwise be swallowed by.

use super::{Diagnostic, LineReader, Severity, Tool};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Result of a matcher that recognized its line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The line (plus any read-ahead) produced a diagnostic
    Diagnostic(Diagnostic),
    /// Known noise, dropped silently
    Ignored,
    /// The rest of the stream cannot be parsed structurally
    Abort(Option<Diagnostic>),
}

/// Builds an outcome from a matched line, optionally reading ahead.
pub type Extractor = fn(&Captures<'_>, &mut LineReader<'_>, Tool) -> MatchOutcome;

/// A (pattern, extractor) pair.
pub struct Matcher {
    name: &'static str,
    pattern: Regex,
    extract: Extractor,
}

impl Matcher {
    fn new(name: &'static str, pattern: &str, extract: Extractor) -> Self {
        let pattern = Regex::new(pattern).expect("matcher pattern is valid");
        Self { name, pattern, extract }
    }

    /// Name of the format this matcher recognizes.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Try this matcher against a line.
    ///
    /// Returns `None` when the pattern does not match; the reader is left
    /// untouched in that case.
    pub fn try_match(
        &self,
        line: &str,
        reader: &mut LineReader<'_>,
        tool: Tool,
    ) -> Option<MatchOutcome> {
        let caps = self.pattern.captures(line)?;
        Some((self.extract)(&caps, reader, tool))
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

/// Matcher table for a tool. Tools without a known dialect get an empty one.
pub fn matchers_for(tool: Tool) -> &'static [Matcher] {
    match tool {
        Tool::Aapt => AAPT.as_slice(),
        Tool::Javac => JAVAC.as_slice(),
        Tool::Dex => DEX.as_slice(),
        Tool::Aidl => AIDL.as_slice(),
        _ => &[],
    }
}

// ============================================================================
// Shared extractors
// ============================================================================

fn ignore(_: &Captures<'_>, _: &mut LineReader<'_>, _: Tool) -> MatchOutcome {
    MatchOutcome::Ignored
}

/// Build a diagnostic from the `path`, `line`, `col` and `msg` groups.
fn from_groups(caps: &Captures<'_>, tool: Tool, severity: Severity) -> Diagnostic {
    let message = caps.name("msg").map_or("", |m| m.as_str()).trim();
    let mut diag = Diagnostic::new(tool, severity, message);
    if let Some(path) = caps.name("path") {
        diag = diag.with_path(path.as_str().trim_matches('"'));
    }
    if let Some(line) = caps.name("line").and_then(|m| m.as_str().parse().ok()) {
        diag = diag.with_line(line);
    }
    if let Some(col) = caps.name("col").and_then(|m| m.as_str().parse().ok()) {
        diag = diag.with_column(col);
    }
    diag
}

fn error_at(caps: &Captures<'_>, _: &mut LineReader<'_>, tool: Tool) -> MatchOutcome {
    MatchOutcome::Diagnostic(from_groups(caps, tool, Severity::Error))
}

fn warning_at(caps: &Captures<'_>, _: &mut LineReader<'_>, tool: Tool) -> MatchOutcome {
    MatchOutcome::Diagnostic(from_groups(caps, tool, Severity::Warning))
}

fn abort_with_error(caps: &Captures<'_>, _: &mut LineReader<'_>, tool: Tool) -> MatchOutcome {
    MatchOutcome::Abort(Some(from_groups(caps, tool, Severity::Error)))
}

/// Severity named by a `kind` group (`ERROR`, `Warning`, ...).
fn kind_severity(caps: &Captures<'_>) -> Severity {
    match caps.name("kind").map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
        Some("warning") => Severity::Warning,
        Some("info") => Severity::Info,
        _ => Severity::Error,
    }
}

/// Consume the next line if it is indented, returning its trimmed text.
fn read_indented(reader: &mut LineReader<'_>) -> Option<String> {
    let next = reader.read_line()?;
    if next.starts_with(char::is_whitespace) && !next.trim().is_empty() {
        Some(next.trim().to_string())
    } else {
        reader.push_back(next);
        None
    }
}

// ============================================================================
// aapt
// ============================================================================

static AAPT_OCCURRED_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s+\(Occurred while parsing\s+(?P<path>.+)\)$").expect("aapt regex is valid")
});

static AAPT: LazyLock<Vec<Matcher>> = LazyLock::new(|| {
    vec![
        Matcher::new("aapt-hidden-file", r"^\s*\(skipping hidden file '.*'\)$", ignore),
        Matcher::new(
            "aapt-ignore-pattern",
            r"^\s*\(skipping (?:file|dir) '.*' due to ANDROID_AAPT_IGNORE pattern '.*'\)$",
            ignore,
        ),
        Matcher::new(
            "aapt-backup-file",
            r"^\s*\(skipping (?:backup|thumbnail|editor) file '.*'\)$",
            ignore,
        ),
        Matcher::new(
            "aapt-noise-file",
            r"^(?:.*/)?(?:Thumbs\.db|\.DS_Store|desktop\.ini|[^/\s]+~|[^/\s]+\.orig|[^/\s]+\.bak): Invalid file name.*$",
            ignore,
        ),
        Matcher::new(
            "aapt-error-at-line",
            r"^ERROR\s+at\s+line\s+(?P<line>\d+):\s+(?P<msg>.*)$",
            aapt_error_at_line,
        ),
        Matcher::new(
            "aapt-bad-nine-patch",
            r"^ERROR:\s+9-patch\s+image\s+(?P<path>.+)\s+malformed\.$",
            aapt_bad_nine_patch,
        ),
        Matcher::new(
            "aapt-error-error",
            r"^(?P<path>.+?):(?P<line>\d+): error: Error: (?P<msg>.+)$",
            error_at,
        ),
        Matcher::new("aapt-error", r"^(?P<path>.+?):(?P<line>\d+): error: (?P<msg>.+)$", error_at),
        Matcher::new(
            "aapt-warning",
            r"^(?P<path>.+?):(?P<line>\d+): warning: (?P<msg>.+)$",
            warning_at,
        ),
        Matcher::new("aapt-generic", r"^(?P<path>.+?):(?P<line>\d+): (?P<msg>.+)$", error_at),
        Matcher::new(
            "aapt-file-error",
            r"^(?P<path>[^\s:][^:]*?): error: (?P<msg>.+)$",
            error_at,
        ),
        Matcher::new(
            "aapt-file-warning",
            r"^(?P<path>[^\s:][^:]*?): warning: (?P<msg>.+)$",
            warning_at,
        ),
        Matcher::new(
            "aapt-bad-resource-dir",
            r"^invalid resource directory name: (?P<path>\S+)\s+(?P<dir>\S+)$",
            aapt_bad_resource_dir,
        ),
        Matcher::new("aapt-fatal", r"^ERROR:\s+(?P<msg>.+)$", abort_with_error),
    ]
});

fn aapt_error_at_line(caps: &Captures<'_>, reader: &mut LineReader<'_>, tool: Tool) -> MatchOutcome {
    let mut diag = from_groups(caps, tool, Severity::Error);
    if let Some(next) = reader.read_line() {
        match AAPT_OCCURRED_IN.captures(&next) {
            Some(source) => diag = diag.with_path(source["path"].trim()),
            None => reader.push_back(next),
        }
    }
    MatchOutcome::Diagnostic(diag)
}

fn aapt_bad_nine_patch(caps: &Captures<'_>, reader: &mut LineReader<'_>, tool: Tool) -> MatchOutcome {
    let message =
        read_indented(reader).unwrap_or_else(|| "malformed 9-patch image".to_string());
    MatchOutcome::Diagnostic(Diagnostic::error(tool, message).with_path(caps["path"].trim()))
}

fn aapt_bad_resource_dir(caps: &Captures<'_>, _: &mut LineReader<'_>, tool: Tool) -> MatchOutcome {
    let dir = &caps["dir"];
    let path = std::path::Path::new(&caps["path"]).join(dir);
    MatchOutcome::Diagnostic(
        Diagnostic::error(tool, format!("invalid resource directory name: {}", dir))
            .with_path(path),
    )
}

// ============================================================================
// javac / ecj
// ============================================================================

static JAVAC_CARET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\^\s*$").expect("caret regex is valid"));

static JAVAC_DETAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s+(?:symbol|location|required|found|reason)\s*:").expect("detail regex is valid")
});

static ECJ_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-{5,}$").expect("separator regex is valid"));

static JAVAC: LazyLock<Vec<Matcher>> = LazyLock::new(|| {
    vec![
        Matcher::new("javac-note", r"^Note: .*$", ignore),
        Matcher::new("javac-summary", r"^\d+ (?:errors?|warnings?)$", ignore),
        Matcher::new("ecj-summary", r"^\d+ problems? \(.*\)$", ignore),
        Matcher::new("ecj-separator", r"^-{5,}$", ignore),
        Matcher::new(
            "javac-error",
            r"^(?P<path>.+?\.java):(?P<line>\d+): error: (?P<msg>.*)$",
            javac_error,
        ),
        Matcher::new(
            "javac-warning",
            r"^(?P<path>.+?\.java):(?P<line>\d+): warning: (?P<msg>.*)$",
            javac_warning,
        ),
        Matcher::new(
            "javac-generic",
            r"^(?P<path>.+?\.java):(?P<line>\d+): (?P<msg>.*)$",
            javac_error,
        ),
        Matcher::new(
            "ecj-problem",
            r"^\d+\. (?P<kind>ERROR|WARNING|INFO) in (?P<path>.+?) \(at line (?P<line>\d+)\)$",
            ecj_problem,
        ),
        Matcher::new("javac-bare-error", r"^error: (?P<msg>.+)$", error_at),
        Matcher::new("javac-bare-warning", r"^warning: (?P<msg>.+)$", warning_at),
        Matcher::new("javac-fatal", r"^javac: (?P<msg>.+)$", abort_with_error),
    ]
});

fn javac_error(caps: &Captures<'_>, reader: &mut LineReader<'_>, tool: Tool) -> MatchOutcome {
    MatchOutcome::Diagnostic(javac_detail(from_groups(caps, tool, Severity::Error), reader))
}

fn javac_warning(caps: &Captures<'_>, reader: &mut LineReader<'_>, tool: Tool) -> MatchOutcome {
    MatchOutcome::Diagnostic(javac_detail(from_groups(caps, tool, Severity::Warning), reader))
}

/// Consume the echoed source line, the caret marker and any indented
/// `symbol:`/`location:` lines that javac prints after a located message.
fn javac_detail(mut diag: Diagnostic, reader: &mut LineReader<'_>) -> Diagnostic {
    let Some(source) = reader.read_line() else {
        return diag;
    };
    let Some(marker) = reader.read_line() else {
        reader.push_back(source);
        return diag;
    };
    if !JAVAC_CARET.is_match(&marker) {
        reader.push_back(marker);
        reader.push_back(source);
        return diag;
    }
    if let Some(index) = marker.chars().position(|c| c == '^') {
        diag = diag.with_column(index as u32 + 1);
    }
    while let Some(next) = reader.peek() {
        if !JAVAC_DETAIL.is_match(next) {
            break;
        }
        if let Some(detail) = reader.read_line() {
            diag.message.push('\n');
            diag.message.push_str(detail.trim());
        }
    }
    diag
}

/// ecj prints the source line, a marker line and the message, then a
/// separator.
fn ecj_problem(caps: &Captures<'_>, reader: &mut LineReader<'_>, tool: Tool) -> MatchOutcome {
    let mut diag = from_groups(caps, tool, kind_severity(caps));
    let mut message = Vec::new();
    let mut consumed = 0;
    while let Some(next) = reader.read_line() {
        if ECJ_SEPARATOR.is_match(&next) {
            break;
        }
        consumed += 1;
        match consumed {
            1 => {}
            2 => {
                if let Some(index) = next.chars().position(|c| c == '^') {
                    diag = diag.with_column(index as u32 + 1);
                }
            }
            _ => message.push(next.trim().to_string()),
        }
    }
    diag.message = message.join("\n");
    MatchOutcome::Diagnostic(diag)
}

// ============================================================================
// dx / d8
// ============================================================================

static DEX: LazyLock<Vec<Matcher>> = LazyLock::new(|| {
    vec![
        Matcher::new("dex-aborting", r"^\d+ errors?; aborting$", ignore),
        Matcher::new(
            "dex-top-level-exception",
            r"^(?P<msg>UNEXPECTED TOP-LEVEL (?:EXCEPTION|ERROR)):?$",
            abort_with_error,
        ),
        Matcher::new(
            "dex-thread-exception",
            r#"^Exception in thread "[^"]*" (?P<msg>.+)$"#,
            abort_with_error,
        ),
        Matcher::new("dex-trouble", r"^trouble processing(?: (?P<path>.+?))?:$", dex_trouble),
        Matcher::new("dex-located", r"^(?P<kind>Warning|Error) in (?P<path>.+?):$", dex_located),
        Matcher::new("dex-warning", r"^(?:dx |d8 )?(?i:warning): (?P<msg>.+)$", warning_at),
        Matcher::new("dex-error", r"^(?:dx |d8 )?(?i:error): (?P<msg>.+)$", error_at),
    ]
});

fn dex_trouble(caps: &Captures<'_>, reader: &mut LineReader<'_>, tool: Tool) -> MatchOutcome {
    let mut diag = from_groups(caps, tool, Severity::Error);
    diag.message = match reader.read_line() {
        Some(next) if !next.trim().is_empty() => next.trim().to_string(),
        Some(next) => {
            reader.push_back(next);
            "trouble processing".to_string()
        }
        None => "trouble processing".to_string(),
    };
    MatchOutcome::Diagnostic(diag)
}

fn dex_located(caps: &Captures<'_>, reader: &mut LineReader<'_>, tool: Tool) -> MatchOutcome {
    let mut diag = from_groups(caps, tool, kind_severity(caps));
    diag.message = read_indented(reader).unwrap_or_default();
    MatchOutcome::Diagnostic(diag)
}

// ============================================================================
// aidl
// ============================================================================

static AIDL: LazyLock<Vec<Matcher>> = LazyLock::new(|| {
    vec![
        Matcher::new(
            "aidl-tagged",
            r"^(?P<kind>ERROR|WARNING): (?P<path>.+?\.aidl):(?P<line>\d+)(?:\.(?P<col>\d+))?(?:-[\d.]+)?:? (?P<msg>.+)$",
            aidl_tagged,
        ),
        Matcher::new(
            "aidl-located",
            r"^(?P<path>.+?\.aidl):(?P<line>\d+):? (?P<msg>.+)$",
            error_at,
        ),
    ]
});

fn aidl_tagged(caps: &Captures<'_>, _: &mut LineReader<'_>, tool: Tool) -> MatchOutcome {
    MatchOutcome::Diagnostic(from_groups(caps, tool, kind_severity(caps)))
}
