//! Build progress reporting.
//!
//! Provides a flexible progress reporting system for pipeline runs.
//! Supports console output (with colors), JSON lines, and a channel for
//! callers that consume events on another thread.
//!
//! # Example
//!
//! ```ignore
//! use apkpipe::build::progress::{ConsoleProgress, ProgressEvent, ProgressReporter};
//! use apkpipe::build::Stage;
//!
//! let reporter = ConsoleProgress::new();
//! reporter.report(ProgressEvent::BuildStarted { name: "app".to_string(), total_stages: 8 });
//! reporter.report(ProgressEvent::StageStarted { stage: Stage::Clean });
//! ```

use super::result::{BuildState, StageStatus};
use super::stage::Stage;
use crate::diagnostic::{Diagnostic, Severity};
use serde::Serialize;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Events that can be reported during a build.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Pipeline started
    BuildStarted {
        /// Application name
        name: String,
        /// Number of stages that will run
        total_stages: usize,
    },
    /// A stage started
    StageStarted {
        /// Stage tag
        stage: Stage,
    },
    /// A stage completed
    StageCompleted {
        /// Stage tag
        stage: Stage,
        /// Stage outcome
        #[serde(flatten)]
        status: StageStatus,
        /// Duration in milliseconds
        duration_ms: u64,
    },
    /// A tool reported something
    Diagnostic {
        /// Stage the diagnostic came from
        stage: Stage,
        /// The diagnostic itself
        diagnostic: Diagnostic,
    },
    /// Pipeline reached a terminal state
    BuildCompleted {
        /// Terminal state
        state: BuildState,
        /// Stage that failed or was interrupted
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<Stage>,
        /// Total duration in milliseconds
        duration_ms: u64,
        /// Number of error diagnostics
        errors: usize,
        /// Number of warning diagnostics
        warnings: usize,
    },
}

/// Trait for progress reporters.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event.
    fn report(&self, event: ProgressEvent);

    /// Check if this reporter wants verbose output.
    fn is_verbose(&self) -> bool {
        false
    }
}

/// A progress reporter that discards all events.
#[derive(Debug, Default)]
pub struct NullProgress;

impl NullProgress {
    /// Create a new null progress reporter.
    pub fn new() -> Self {
        Self
    }
}

impl ProgressReporter for NullProgress {
    fn report(&self, _event: ProgressEvent) {
        // Discard all events
    }
}

/// Console progress reporter with optional colors.
pub struct ConsoleProgress {
    /// Whether to use colors
    use_colors: bool,
    /// Whether to show verbose output
    verbose: bool,
    /// Completed stage count
    current: AtomicUsize,
    /// Total stage count
    total: AtomicUsize,
    /// Output writer (for testing)
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleProgress")
            .field("use_colors", &self.use_colors)
            .field("verbose", &self.verbose)
            .field("current", &self.current)
            .field("total", &self.total)
            .finish()
    }
}

impl ConsoleProgress {
    /// Create a new console progress reporter.
    pub fn new() -> Self {
        Self {
            use_colors: true,
            verbose: false,
            current: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            output: Mutex::new(Box::new(std::io::stderr())),
        }
    }

    /// Create a console progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self {
            use_colors: false, // Disable colors for custom output
            verbose: false,
            current: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            output: Mutex::new(Box::new(output)),
        }
    }

    /// Set whether to use colors.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    /// Set verbose mode.
    ///
    /// Verbose output also shows stage starts and unclassified tool output.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Format a colored string.
    fn color(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{}{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    fn green(&self, text: &str) -> String {
        self.color(text, "\x1b[32m")
    }

    fn yellow(&self, text: &str) -> String {
        self.color(text, "\x1b[33m")
    }

    fn red(&self, text: &str) -> String {
        self.color(text, "\x1b[31m")
    }

    fn cyan(&self, text: &str) -> String {
        self.color(text, "\x1b[36m")
    }

    fn bold(&self, text: &str) -> String {
        self.color(text, "\x1b[1m")
    }

    /// Write a line to output.
    fn writeln(&self, line: &str) {
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", line);
        }
    }

    fn diagnostic_line(&self, diagnostic: &Diagnostic) -> Option<String> {
        let tag = match diagnostic.severity {
            Severity::Error => self.red("[error]"),
            Severity::Warning => self.yellow("[warn]"),
            Severity::Info => self.cyan("[info]"),
            Severity::Unknown if self.verbose => "       ".to_string(),
            Severity::Unknown => return None,
        };
        Some(format!("{} {}", tag, diagnostic))
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::BuildStarted { name, total_stages } => {
                self.total.store(total_stages, Ordering::SeqCst);
                self.current.store(0, Ordering::SeqCst);
                self.writeln(&format!(
                    "{} Building {} ({} stages)...",
                    self.cyan("[build]"),
                    self.bold(&name),
                    total_stages
                ));
            }
            ProgressEvent::StageStarted { stage } => {
                if self.verbose {
                    let current = self.current.load(Ordering::SeqCst) + 1;
                    let total = self.total.load(Ordering::SeqCst);
                    self.writeln(&format!(
                        "{} [{}/{}] {}...",
                        self.cyan("[build]"),
                        current,
                        total,
                        stage
                    ));
                }
            }
            ProgressEvent::StageCompleted { stage, status, duration_ms } => {
                self.current.fetch_add(1, Ordering::SeqCst);
                let current = self.current.load(Ordering::SeqCst);
                let total = self.total.load(Ordering::SeqCst);

                let status_str = match &status {
                    StageStatus::Success => self.green("ok"),
                    StageStatus::Failed(_) => self.red("FAILED"),
                    StageStatus::Cancelled => self.yellow("cancelled"),
                };

                self.writeln(&format!(
                    "{} [{}/{}] {} {} ({})",
                    self.cyan("[build]"),
                    current,
                    total,
                    status_str,
                    stage,
                    format_duration(duration_ms)
                ));

                if let StageStatus::Failed(err) = status {
                    self.writeln(&format!("        {}", self.red(&err)));
                }
            }
            ProgressEvent::Diagnostic { diagnostic, .. } => {
                if let Some(line) = self.diagnostic_line(&diagnostic) {
                    self.writeln(&line);
                }
            }
            ProgressEvent::BuildCompleted { state, stage, duration_ms, errors, warnings } => {
                let duration_str = format_duration(duration_ms);
                match state {
                    BuildState::Succeeded => self.writeln(&format!(
                        "\n{} Package built with {} {} in {}",
                        self.green("[done]"),
                        self.bold(&warnings.to_string()),
                        if warnings == 1 { "warning" } else { "warnings" },
                        duration_str
                    )),
                    BuildState::Failed => self.writeln(&format!(
                        "\n{} Build failed at {}: {} {}, {} {} in {}",
                        self.red("[error]"),
                        stage.map(|s| s.name()).unwrap_or("?"),
                        errors,
                        if errors == 1 { "error" } else { "errors" },
                        warnings,
                        if warnings == 1 { "warning" } else { "warnings" },
                        duration_str
                    )),
                    BuildState::Cancelled => self.writeln(&format!(
                        "\n{} Build cancelled during {} after {}",
                        self.yellow("[cancelled]"),
                        stage.map(|s| s.name()).unwrap_or("?"),
                        duration_str
                    )),
                }
            }
        }
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// JSON progress reporter for machine-readable output.
///
/// Writes one JSON object per event, one per line.
pub struct JsonProgress {
    /// Output writer
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for JsonProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonProgress").finish()
    }
}

impl JsonProgress {
    /// Create a new JSON progress reporter writing to stdout.
    pub fn new() -> Self {
        Self { output: Mutex::new(Box::new(std::io::stdout())) }
    }

    /// Create a JSON progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self { output: Mutex::new(Box::new(output)) }
    }
}

impl Default for JsonProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let Ok(json) = serde_json::to_string(&event) else {
            return;
        };
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", json);
        }
    }
}

/// Forwards events to a channel, for callers on another thread.
#[derive(Debug)]
pub struct ChannelProgress {
    sender: Mutex<Sender<ProgressEvent>>,
}

impl ChannelProgress {
    /// Report into `sender`. Events are dropped once the receiver is gone.
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        Self { sender: Mutex::new(sender) }
    }
}

impl ProgressReporter for ChannelProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(sender) = self.sender.lock() {
            let _ = sender.send(event);
        }
    }
}

/// Progress tracker for aggregating build statistics.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    /// Start time of the build
    start_time: Option<Instant>,
    /// Stage currently running
    current: Option<Stage>,
    /// Stages that completed successfully
    completed: Vec<Stage>,
    /// Number of error diagnostics
    errors: usize,
    /// Number of warning diagnostics
    warnings: usize,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a build.
    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
        self.current = None;
        self.completed.clear();
        self.errors = 0;
        self.warnings = 0;
    }

    /// Mark a stage as started.
    pub fn stage_started(&mut self, stage: Stage) {
        self.current = Some(stage);
    }

    /// Mark a stage as completed.
    pub fn stage_completed(&mut self, stage: Stage, status: &StageStatus) {
        if status.is_success() {
            self.completed.push(stage);
            self.current = None;
        }
    }

    /// Count a diagnostic.
    pub fn diagnostic(&mut self, diagnostic: &Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            _ => {}
        }
    }

    /// Get the elapsed time since the build started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.map(|t| t.elapsed()).unwrap_or(Duration::ZERO)
    }

    /// Get the elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Get the completion percentage.
    pub fn percentage(&self) -> f64 {
        (self.completed.len() as f64 / Stage::ALL.len() as f64) * 100.0
    }

    /// The stage that is running, or the one that stopped the build.
    pub fn current(&self) -> Option<Stage> {
        self.current
    }

    /// Stages completed so far, in order.
    pub fn completed(&self) -> &[Stage] {
        &self.completed
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    pub fn warnings(&self) -> usize {
        self.warnings
    }

    /// Generate a BuildCompleted event from current state.
    pub fn build_completed_event(&self, state: BuildState) -> ProgressEvent {
        ProgressEvent::BuildCompleted {
            state,
            stage: if state == BuildState::Succeeded { None } else { self.current },
            duration_ms: self.elapsed_ms(),
            errors: self.errors,
            warnings: self.warnings,
        }
    }
}

/// Format a duration in milliseconds to a human-readable string.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) / 1000;
        format!("{}m {}s", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Tool;
    use std::sync::{mpsc, Arc};

    fn console() -> (ConsoleProgress, Arc<Mutex<Vec<u8>>>) {
        let output = Arc::new(Mutex::new(Vec::new()));
        let reporter =
            ConsoleProgress::with_output(TestWriter(Arc::clone(&output))).with_colors(false);
        (reporter, output)
    }

    fn text(output: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8_lossy(&output.lock().unwrap()).into_owned()
    }

    #[test]
    fn test_null_progress() {
        let reporter = NullProgress::new();
        // Should not panic
        reporter.report(ProgressEvent::StageStarted { stage: Stage::Clean });
        assert!(!reporter.is_verbose());
    }

    #[test]
    fn test_console_progress_build_started() {
        let (reporter, output) = console();
        reporter.report(ProgressEvent::BuildStarted { name: "demo".to_string(), total_stages: 8 });
        assert!(text(&output).contains("Building demo (8 stages)"));
    }

    #[test]
    fn test_console_progress_stage_started_only_verbose() {
        let (reporter, output) = console();
        reporter.report(ProgressEvent::StageStarted { stage: Stage::Compile });
        assert!(text(&output).is_empty());

        let reporter = reporter.with_verbose(true);
        reporter.report(ProgressEvent::StageStarted { stage: Stage::Compile });
        assert!(text(&output).contains("COMPILE..."));
    }

    #[test]
    fn test_console_progress_stage_failed() {
        let (reporter, output) = console();
        reporter.report(ProgressEvent::BuildStarted { name: "demo".to_string(), total_stages: 8 });
        reporter.report(ProgressEvent::StageCompleted {
            stage: Stage::Compile,
            status: StageStatus::Failed("javac exited with status 1".to_string()),
            duration_ms: 1500,
        });

        let text = text(&output);
        assert!(text.contains("[1/8] FAILED COMPILE (1.5s)"));
        assert!(text.contains("javac exited with status 1"));
    }

    #[test]
    fn test_console_progress_diagnostics() {
        let (reporter, output) = console();
        let error = Diagnostic::error(Tool::Javac, "cannot find symbol").with_path("A.java").with_line(3);
        reporter.report(ProgressEvent::Diagnostic { stage: Stage::Compile, diagnostic: error });
        reporter.report(ProgressEvent::Diagnostic {
            stage: Stage::Compile,
            diagnostic: Diagnostic::raw(Tool::Javac, "raw noise"),
        });

        let text = text(&output);
        assert!(text.contains("[error] A.java:3: error: cannot find symbol"));
        assert!(!text.contains("raw noise"));
    }

    #[test]
    fn test_console_progress_build_completed() {
        let (reporter, output) = console();
        reporter.report(ProgressEvent::BuildCompleted {
            state: BuildState::Failed,
            stage: Some(Stage::Package),
            duration_ms: 500,
            errors: 1,
            warnings: 2,
        });
        reporter.report(ProgressEvent::BuildCompleted {
            state: BuildState::Cancelled,
            stage: Some(Stage::Compile),
            duration_ms: 20,
            errors: 0,
            warnings: 0,
        });

        let text = text(&output);
        assert!(text.contains("Build failed at PACKAGE: 1 error, 2 warnings"));
        assert!(text.contains("Build cancelled during COMPILE"));
    }

    #[test]
    fn test_json_progress_events() {
        let output = Arc::new(Mutex::new(Vec::new()));
        let reporter = JsonProgress::with_output(TestWriter(Arc::clone(&output)));
        reporter.report(ProgressEvent::StageStarted { stage: Stage::GenerateResources });
        reporter.report(ProgressEvent::StageCompleted {
            stage: Stage::Compile,
            status: StageStatus::Failed("boom".to_string()),
            duration_ms: 7,
        });

        let text = text(&output);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], r#"{"event":"stage_started","stage":"GENERATE_RESOURCES"}"#);
        let completed: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(completed["event"], "stage_completed");
        assert_eq!(completed["status"], "failed");
        assert_eq!(completed["error"], "boom");
        assert_eq!(completed["duration_ms"], 7);
    }

    #[test]
    fn test_json_progress_diagnostic() {
        let output = Arc::new(Mutex::new(Vec::new()));
        let reporter = JsonProgress::with_output(TestWriter(Arc::clone(&output)));
        let diagnostic = Diagnostic::warning(Tool::Aapt, "say \"hi\"").with_line(4);
        reporter.report(ProgressEvent::Diagnostic { stage: Stage::GenerateResources, diagnostic });

        let value: serde_json::Value = serde_json::from_str(text(&output).trim()).unwrap();
        assert_eq!(value["event"], "diagnostic");
        assert_eq!(value["diagnostic"]["message"], "say \"hi\"");
        assert_eq!(value["diagnostic"]["line"], 4);
    }

    #[test]
    fn test_channel_progress() {
        let (tx, rx) = mpsc::channel();
        let reporter = ChannelProgress::new(tx);
        reporter.report(ProgressEvent::StageStarted { stage: Stage::Sign });
        assert_eq!(rx.recv().unwrap(), ProgressEvent::StageStarted { stage: Stage::Sign });

        drop(rx);
        // Should not panic
        reporter.report(ProgressEvent::StageStarted { stage: Stage::Align });
    }

    #[test]
    fn test_progress_tracker_lifecycle() {
        let mut tracker = ProgressTracker::new();
        tracker.start();
        assert_eq!(tracker.percentage(), 0.0);

        tracker.stage_started(Stage::Clean);
        tracker.stage_completed(Stage::Clean, &StageStatus::Success);
        tracker.stage_started(Stage::GenerateResources);
        tracker.stage_completed(Stage::GenerateResources, &StageStatus::Success);
        assert_eq!(tracker.percentage(), 25.0);

        tracker.stage_started(Stage::Compile);
        tracker.diagnostic(&Diagnostic::error(Tool::Javac, "x"));
        tracker.diagnostic(&Diagnostic::warning(Tool::Javac, "y"));
        tracker.diagnostic(&Diagnostic::raw(Tool::Javac, "z"));
        tracker.stage_completed(Stage::Compile, &StageStatus::Failed("x".to_string()));

        assert_eq!(tracker.completed(), &[Stage::Clean, Stage::GenerateResources]);
        assert_eq!(tracker.current(), Some(Stage::Compile));
        match tracker.build_completed_event(BuildState::Failed) {
            ProgressEvent::BuildCompleted { state, stage, errors, warnings, .. } => {
                assert_eq!(state, BuildState::Failed);
                assert_eq!(stage, Some(Stage::Compile));
                assert_eq!(errors, 1);
                assert_eq!(warnings, 1);
            }
            _ => panic!("Expected BuildCompleted event"),
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0ms");
        assert_eq!(format_duration(999), "999ms");
        assert_eq!(format_duration(1500), "1.5s");
        assert_eq!(format_duration(90000), "1m 30s");
    }

    // Helper for testing output
    struct TestWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
