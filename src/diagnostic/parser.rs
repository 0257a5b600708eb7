//! Stream-level diagnostic parsing.

use super::formats::{matchers_for, MatchOutcome, Matcher};
use super::{Diagnostic, LineReader, Severity, Tool};

/// Counts collected while parsing one stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseSummary {
    /// Number of error diagnostics emitted
    pub errors: usize,
    /// Number of warning diagnostics emitted
    pub warnings: usize,
    /// Number of noise lines dropped
    pub ignored: usize,
    /// Whether a matcher gave up on structured parsing
    pub aborted: bool,
}

impl ParseSummary {
    fn record(&mut self, diag: &Diagnostic) {
        match diag.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            _ => {}
        }
    }
}

/// Classifies the output lines of one tool.
///
/// The parser holds no state between lines; the only cursor is the
/// [`LineReader`] passed in, so one parser can be reused for every stage
/// that runs the same tool.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticParser {
    tool: Tool,
    matchers: &'static [Matcher],
}

impl DiagnosticParser {
    /// Create a parser for a tool's output dialect.
    pub fn new(tool: Tool) -> Self {
        Self { tool, matchers: matchers_for(tool) }
    }

    /// Tool whose output this parser understands.
    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Classify a single line.
    ///
    /// Matchers may consume further lines from `reader`. Returns `None` when
    /// no matcher recognizes the line.
    pub fn parse_line(&self, line: &str, reader: &mut LineReader<'_>) -> Option<MatchOutcome> {
        let outcome = self
            .matchers
            .iter()
            .find_map(|matcher| matcher.try_match(line, reader, self.tool))?;

        Some(match outcome {
            MatchOutcome::Diagnostic(diag) => MatchOutcome::Diagnostic(reclassify(diag)),
            MatchOutcome::Abort(diag) => MatchOutcome::Abort(diag.map(reclassify)),
            MatchOutcome::Ignored => MatchOutcome::Ignored,
        })
    }

    /// Consume and classify the next line of `reader`.
    ///
    /// Diagnostics go to `emit` and the counts to `summary`. Returns `false`
    /// once the reader is exhausted. Once `summary` records an abort, every
    /// further line is emitted verbatim as [`Severity::Unknown`] with no
    /// location.
    pub fn parse_next<F>(
        &self,
        reader: &mut LineReader<'_>,
        summary: &mut ParseSummary,
        emit: &mut F,
    ) -> bool
    where
        F: FnMut(Diagnostic),
    {
        let Some(line) = reader.read_line() else {
            return false;
        };
        if summary.aborted {
            emit(Diagnostic::raw(self.tool, line));
            return true;
        }
        if line.trim().is_empty() {
            return true;
        }

        match self.parse_line(&line, reader) {
            Some(MatchOutcome::Diagnostic(diag)) => {
                summary.record(&diag);
                emit(diag);
            }
            Some(MatchOutcome::Ignored) => summary.ignored += 1,
            Some(MatchOutcome::Abort(diag)) => {
                summary.aborted = true;
                match diag {
                    Some(diag) => {
                        summary.record(&diag);
                        emit(diag);
                    }
                    None => emit(Diagnostic::raw(self.tool, line)),
                }
            }
            None => emit(Diagnostic::raw(self.tool, line.trim_end())),
        }
        true
    }

    /// Parse every line of a stream, handing diagnostics to `emit` in order.
    ///
    /// Lines no matcher recognizes are emitted as [`Severity::Unknown`].
    pub fn parse_stream<F>(&self, reader: &mut LineReader<'_>, mut emit: F) -> ParseSummary
    where
        F: FnMut(Diagnostic),
    {
        let mut summary = ParseSummary::default();
        while self.parse_next(reader, &mut summary, &mut emit) {}
        summary
    }

    /// Parse a complete block of text.
    pub fn parse_text(&self, text: &str) -> Vec<Diagnostic> {
        let mut reader = LineReader::from_text(text);
        let mut diagnostics = Vec::new();
        self.parse_stream(&mut reader, |diag| diagnostics.push(diag));
        diagnostics
    }
}

/// Tools reuse the error-shaped line for warnings; trust the message prefix.
fn reclassify(mut diag: Diagnostic) -> Diagnostic {
    if diag.severity == Severity::Error {
        if let Some(rest) = diag.message.strip_prefix("warning:") {
            diag.message = rest.trim_start().to_string();
            diag.severity = Severity::Warning;
        }
    }
    diag
}
