//! Build pipeline orchestration.
//!
//! The pipeline runs every [`Stage`] in order, stops at the first failure,
//! and always reports a terminal [`BuildResult`]. Before a stage starts, its
//! own artifacts and those of every later stage are deleted, so a failed or
//! cancelled run never leaves a stale package behind.

use super::cancel::CancelToken;
use super::layout::OutputLayout;
use super::progress::{ProgressEvent, ProgressReporter, ProgressTracker};
use super::request::BuildRequest;
use super::result::{BuildResult, BuildState, StageReport, StageStatus};
use super::stage::Stage;
use super::toolchain::Toolchain;
use crate::diagnostic::{Diagnostic, Tool};
use crate::sanitizer::{default_supersessions, SanitizeError, Supersession};
use crate::signer::SignError;
use std::io;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

/// Why a stage failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StageError {
    /// The request itself is unusable
    #[error("Invalid build request: {}", .0.join("; "))]
    InvalidRequest(Vec<String>),
    /// A tool could not be started
    #[error("Failed to start {tool}: {source}")]
    ToolSpawn {
        /// Which tool
        tool: Tool,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// A tool exited unsuccessfully
    #[error("{tool} {} ({errors} error(s) reported)", exit_description(code))]
    ToolExit {
        /// Which tool
        tool: Tool,
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// Error diagnostics parsed from its output
        errors: usize,
    },
    /// A tool reported success but did not write its output
    #[error("Expected artifact missing: {}", .0.display())]
    MissingArtifact(PathBuf),
    /// Conflicting library archives
    #[error(transparent)]
    Dependency(#[from] SanitizeError),
    /// Manifest or signature generation failed
    #[error("Signing failed: {0}")]
    Signing(#[source] SignError),
    /// Assembling the package failed
    #[error("Packaging failed: {0}")]
    Archive(#[source] SignError),
    /// File system error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The caller cancelled the build
    #[error("Build cancelled")]
    Cancelled,
    /// The build worker died
    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {}", code),
        None => "was terminated by a signal".to_string(),
    }
}

/// Runs builds with a fixed toolchain.
///
/// A pipeline holds no per-build state and can run any number of requests,
/// one after another or from several threads.
#[derive(Debug, Clone)]
pub struct Pipeline {
    toolchain: Toolchain,
    supersessions: Vec<Supersession>,
}

impl Pipeline {
    /// Create a pipeline using `toolchain` and the default supersession rules.
    pub fn new(toolchain: Toolchain) -> Self {
        Self { toolchain, supersessions: default_supersessions() }
    }

    /// Replace the library supersession rules.
    pub fn with_supersessions(mut self, supersessions: Vec<Supersession>) -> Self {
        self.supersessions = supersessions;
        self
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    pub fn supersessions(&self) -> &[Supersession] {
        &self.supersessions
    }

    /// Run every stage for `request` on the calling thread.
    pub fn run(
        &self,
        request: &BuildRequest,
        reporter: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> BuildResult {
        let start = Instant::now();
        let mut run = Run::new(self, request, reporter, cancel.clone());

        info!(name = request.name(), variant = %request.variant(), "build started");
        reporter.report(ProgressEvent::BuildStarted {
            name: request.name().to_string(),
            total_stages: Stage::ALL.len(),
        });
        run.tracker.start();

        let mut failure = None;
        for stage in Stage::ALL {
            run.tracker.stage_started(stage);
            if cancel.is_cancelled() {
                failure = Some((stage, StageError::Cancelled));
                break;
            }

            info!(stage = %stage, "stage started");
            reporter.report(ProgressEvent::StageStarted { stage });
            let stage_start = Instant::now();
            let result = run.run_stage(stage);
            let duration = stage_start.elapsed();

            let status = match &result {
                Ok(()) => StageStatus::Success,
                Err(StageError::Cancelled) => StageStatus::Cancelled,
                Err(e) => StageStatus::Failed(e.to_string()),
            };
            info!(stage = %stage, status = %status, ?duration, "stage completed");
            run.tracker.stage_completed(stage, &status);
            reporter.report(ProgressEvent::StageCompleted {
                stage,
                status: status.clone(),
                duration_ms: duration.as_millis() as u64,
            });
            run.stages.push(StageReport { stage, status, duration });

            if let Err(e) = result {
                failure = Some((stage, e));
                break;
            }
        }

        let (state, failed_stage, cause) = match failure {
            None => (BuildState::Succeeded, None, None),
            Some((stage, e)) => {
                run.clean_up(stage);
                let state = match e {
                    StageError::Cancelled => BuildState::Cancelled,
                    _ => BuildState::Failed,
                };
                (state, Some(stage), Some(e))
            }
        };

        reporter.report(run.tracker.build_completed_event(state));
        match &cause {
            Some(cause) => info!(%state, stage = ?failed_stage, "build stopped: {}", cause),
            None => info!("build succeeded"),
        }

        let artifact = match state {
            BuildState::Succeeded => Some(run.layout.published_package().to_path_buf()),
            _ => None,
        };

        BuildResult {
            state,
            failed_stage,
            cause,
            diagnostics: run.diagnostics,
            artifact,
            stages: run.stages,
            total_duration: start.elapsed(),
        }
    }
}

/// State of one pipeline run, shared by the stage implementations.
pub(super) struct Run<'a> {
    pub(super) request: &'a BuildRequest,
    pub(super) toolchain: &'a Toolchain,
    pub(super) supersessions: &'a [Supersession],
    pub(super) layout: OutputLayout,
    pub(super) reporter: &'a dyn ProgressReporter,
    pub(super) cancel: CancelToken,
    pub(super) tracker: ProgressTracker,
    pub(super) diagnostics: Vec<Diagnostic>,
    pub(super) stages: Vec<StageReport>,
    /// Canonical library archives, known once PACKAGE has sanitized them
    pub(super) libraries: Vec<PathBuf>,
    /// The newest package, handed from stage to stage after PACKAGE
    pub(super) package: Option<PathBuf>,
}

impl<'a> Run<'a> {
    fn new(
        pipeline: &'a Pipeline,
        request: &'a BuildRequest,
        reporter: &'a dyn ProgressReporter,
        cancel: CancelToken,
    ) -> Self {
        Self {
            request,
            toolchain: &pipeline.toolchain,
            supersessions: &pipeline.supersessions,
            layout: OutputLayout::new(request),
            reporter,
            cancel,
            tracker: ProgressTracker::new(),
            diagnostics: Vec::new(),
            stages: Vec::new(),
            libraries: Vec::new(),
            package: None,
        }
    }

    fn run_stage(&mut self, stage: Stage) -> Result<(), StageError> {
        if stage != Stage::Clean {
            self.layout.invalidate_from(stage)?;
        }
        match stage {
            Stage::Clean => self.clean(),
            Stage::GenerateResources => self.generate_resources(),
            Stage::Compile => self.compile(),
            Stage::Convert => self.convert(),
            Stage::Package => self.package(),
            Stage::Sign => self.sign(),
            Stage::Align => self.align(),
            Stage::Publish => self.publish(),
        }
    }

    /// Record a diagnostic and forward it to the reporter.
    pub(super) fn emit(&mut self, stage: Stage, diagnostic: Diagnostic) {
        self.tracker.diagnostic(&diagnostic);
        self.reporter.report(ProgressEvent::Diagnostic { stage, diagnostic: diagnostic.clone() });
        self.diagnostics.push(diagnostic);
    }

    /// Remove whatever the failed stage and later ones left behind.
    fn clean_up(&mut self, stage: Stage) {
        // CLEAN fails before touching anything, and its artifacts are
        // everyone's; leave the tree alone in that case.
        if stage == Stage::Clean {
            return;
        }
        if let Err(e) = self.layout.invalidate_from(stage) {
            warn!(stage = %stage, "cleanup failed: {}", e);
        }
    }
}
