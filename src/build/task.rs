//! Running a build on a worker thread.

use super::cancel::CancelToken;
use super::pipeline::{Pipeline, StageError};
use super::progress::{ChannelProgress, ProgressEvent, ProgressReporter};
use super::request::BuildRequest;
use super::result::{BuildResult, BuildState};
use std::io;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A build running in the background.
///
/// Dropping the handle does not stop the build; call
/// [`cancel`](BuildHandle::cancel) for that.
#[derive(Debug)]
pub struct BuildHandle {
    cancel: CancelToken,
    worker: JoinHandle<BuildResult>,
}

impl BuildHandle {
    /// Ask the build to stop. Returns immediately.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that cancels this build, for use from other threads.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Whether the build has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Block until the build ends.
    pub fn wait(self) -> BuildResult {
        self.worker.join().unwrap_or_else(|_| BuildResult {
            state: BuildState::Failed,
            failed_stage: None,
            cause: Some(StageError::Internal("build worker panicked".to_string())),
            diagnostics: Vec::new(),
            artifact: None,
            stages: Vec::new(),
            total_duration: Duration::ZERO,
        })
    }
}

/// Start `request` on a dedicated thread, reporting to `reporter`.
pub fn submit(
    pipeline: Arc<Pipeline>,
    request: BuildRequest,
    reporter: Arc<dyn ProgressReporter>,
) -> io::Result<BuildHandle> {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    let worker = thread::Builder::new()
        .name(format!("build-{}", request.name()))
        .spawn(move || pipeline.run(&request, reporter.as_ref(), &token))?;
    Ok(BuildHandle { cancel, worker })
}

/// Start `request` and receive its progress events on a channel.
///
/// The channel closes when the build ends.
pub fn submit_with_events(
    pipeline: Arc<Pipeline>,
    request: BuildRequest,
) -> io::Result<(BuildHandle, Receiver<ProgressEvent>)> {
    let (tx, rx) = mpsc::channel();
    let handle = submit(pipeline, request, Arc::new(ChannelProgress::new(tx)))?;
    Ok((handle, rx))
}
