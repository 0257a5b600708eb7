//! Build result types.
//!
//! Contains types for representing the outcome of a pipeline run.

use super::pipeline::StageError;
use super::stage::Stage;
use crate::diagnostic::Diagnostic;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    /// Every stage completed
    Succeeded,
    /// A stage failed; see [`BuildResult::failed_stage`]
    Failed,
    /// The caller cancelled the run
    Cancelled,
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildState::Succeeded => write!(f, "succeeded"),
            BuildState::Failed => write!(f, "failed"),
            BuildState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum StageStatus {
    /// Stage completed
    Success,
    /// Stage failed with error
    Failed(String),
    /// Stage was interrupted by cancellation
    Cancelled,
}

impl StageStatus {
    /// Check if the status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, StageStatus::Success)
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Success => write!(f, "success"),
            StageStatus::Failed(err) => write!(f, "failed: {}", err),
            StageStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One stage that ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    /// Which stage
    pub stage: Stage,
    /// How it ended
    pub status: StageStatus,
    /// Wall-clock time spent in it
    pub duration: Duration,
}

/// Result of a complete pipeline run.
#[derive(Debug)]
pub struct BuildResult {
    /// Terminal state
    pub state: BuildState,
    /// The stage that failed or was interrupted
    pub failed_stage: Option<Stage>,
    /// Why the run did not succeed
    pub cause: Option<StageError>,
    /// Every diagnostic, in emission order
    pub diagnostics: Vec<Diagnostic>,
    /// The published package on success
    pub artifact: Option<PathBuf>,
    /// Stages that ran, in order
    pub stages: Vec<StageReport>,
    /// Total build duration
    pub total_duration: Duration,
}

impl BuildResult {
    /// Check if the build succeeded.
    pub fn is_success(&self) -> bool {
        self.state == BuildState::Succeeded
    }

    /// Check if the build was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.state == BuildState::Cancelled
    }

    /// Get the number of error diagnostics.
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    /// Get the number of warning diagnostics.
    pub fn warning_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_warning()).count()
    }

    /// Error diagnostics, in order.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    /// Format a summary of the build result.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        match self.state {
            BuildState::Succeeded => {
                let artifact = self
                    .artifact
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(none)".to_string());
                lines.push(format!(
                    "Build succeeded: {} stages in {:?}, {} warning(s)",
                    self.stages.len(),
                    self.total_duration,
                    self.warning_count()
                ));
                lines.push(format!("  Package: {}", artifact));
            }
            BuildState::Failed => {
                let stage = self.failed_stage.map(|s| s.name()).unwrap_or("?");
                lines.push(format!(
                    "Build failed at {}: {} error(s), {} warning(s)",
                    stage,
                    self.error_count(),
                    self.warning_count()
                ));
                if let Some(cause) = &self.cause {
                    lines.push(format!("  Cause: {}", cause));
                }
            }
            BuildState::Cancelled => {
                let stage = self.failed_stage.map(|s| s.name()).unwrap_or("?");
                lines.push(format!("Build cancelled during {}", stage));
            }
        }

        let errors: Vec<_> = self.errors().collect();
        if !errors.is_empty() {
            lines.push(format!("Errors ({}):", errors.len()));
            for error in errors.iter().take(5) {
                lines.push(format!("  - {}", error));
            }
            if errors.len() > 5 {
                lines.push(format!("  ... and {} more", errors.len() - 5));
            }
        }

        lines.join("\n")
    }
}
