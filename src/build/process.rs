//! External tool processes.
//!
//! A [`ToolProcess`] owns one running tool. Its stdout and stderr are each
//! drained by a dedicated reader thread so a tool that fills one pipe never
//! stalls on the other. Chunks from both readers arrive on one channel and
//! are reassembled into lines per stream. Lines stay tagged with their
//! [`Stream`], so a consumer can follow one stream without ever seeing a
//! line of the other.
//!
//! On unix the tool is started as the leader of a new process group.
//! Cancelling signals the whole group, which takes down any helpers the tool
//! spawned along with it.

use super::cancel::CancelToken;
use super::lines::LineAssembler;
use super::toolchain::ToolCommand;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// How often a blocked reader checks for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Time between SIGTERM and SIGKILL when cancelling.
const KILL_GRACE: Duration = Duration::from_millis(500);

const READ_BUFFER_SIZE: usize = 4096;

/// One of the two output pipes of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

enum Chunk {
    Data(Stream, Vec<u8>),
    Closed(Stream),
}

/// How a tool process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolExit {
    /// Exit status zero
    Success,
    /// Non-zero exit, or killed by a signal (`None`)
    Failed(Option<i32>),
    /// Terminated because the build was cancelled
    Cancelled,
}

/// A running external tool.
pub struct ToolProcess {
    child: Child,
    label: String,
    chunks: Receiver<Chunk>,
    stdout: LineAssembler,
    stderr: LineAssembler,
    ready: VecDeque<(Stream, String)>,
    stdout_open: bool,
    stderr_open: bool,
    cancel: CancelToken,
    terminated: bool,
    reaped: bool,
}

impl std::fmt::Debug for ToolProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolProcess")
            .field("label", &self.label)
            .field("pid", &self.child.id())
            .field("stdout_open", &self.stdout_open)
            .field("stderr_open", &self.stderr_open)
            .field("terminated", &self.terminated)
            .finish()
    }
}

impl ToolProcess {
    /// Start `tool` with `args` appended to its fixed arguments.
    pub fn spawn(
        tool: &ToolCommand,
        args: &[OsString],
        working_dir: Option<&Path>,
        cancel: CancelToken,
    ) -> io::Result<Self> {
        let label = tool.display_line(args);
        debug!(command = %label, "spawning tool");

        let mut command = Command::new(&tool.program);
        command
            .args(tool.full_args(args))
            .envs(tool.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn()?;
        let (tx, rx) = mpsc::channel();

        let stdout_open = match child.stdout.take() {
            Some(stdout) => {
                spawn_reader(stdout, Stream::Stdout, tx.clone())?;
                true
            }
            None => false,
        };
        let stderr_open = match child.stderr.take() {
            Some(stderr) => {
                spawn_reader(stderr, Stream::Stderr, tx)?;
                true
            }
            None => false,
        };

        Ok(Self {
            child,
            label,
            chunks: rx,
            stdout: LineAssembler::new(),
            stderr: LineAssembler::new(),
            ready: VecDeque::new(),
            stdout_open,
            stderr_open,
            cancel,
            terminated: false,
            reaped: false,
        })
    }

    /// OS process id (and process group id on unix).
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// The command line, for messages.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Block until either stream has a complete line and report which.
    ///
    /// The line is not consumed; read it with
    /// [`next_line_from`](Self::next_line_from). Returns `None` once both
    /// streams are closed and drained, or as soon as the build is cancelled.
    pub fn peek_stream(&mut self) -> Option<Stream> {
        loop {
            if self.check_cancelled() {
                return None;
            }
            if let Some((stream, _)) = self.ready.front() {
                return Some(*stream);
            }
            if !self.stdout_open && !self.stderr_open {
                return None;
            }
            self.receive();
        }
    }

    /// Block until the next complete line of `stream`.
    ///
    /// Lines of the other stream that arrive meanwhile are kept for later.
    /// Returns `None` once `stream` is closed and drained, or as soon as the
    /// build is cancelled. Cancellation terminates the process group and
    /// discards any buffered output.
    pub fn next_line_from(&mut self, stream: Stream) -> Option<String> {
        loop {
            if self.check_cancelled() {
                return None;
            }
            if let Some(pos) = self.ready.iter().position(|(s, _)| *s == stream) {
                return self.ready.remove(pos).map(|(_, line)| line);
            }
            if !self.is_open(stream) {
                return None;
            }
            self.receive();
        }
    }

    /// Drain remaining output and wait for the process to exit.
    pub fn finish(mut self) -> io::Result<ToolExit> {
        while !self.check_cancelled() && (self.stdout_open || self.stderr_open) {
            self.ready.clear();
            self.receive();
        }

        loop {
            if self.cancel.is_cancelled() || self.terminated {
                self.terminate();
                return Ok(ToolExit::Cancelled);
            }
            if let Some(status) = self.child.try_wait()? {
                self.reaped = true;
                debug!(command = %self.label, ?status, "tool exited");
                return Ok(if status.success() {
                    ToolExit::Success
                } else {
                    ToolExit::Failed(status.code())
                });
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Terminate the tool if the build was cancelled.
    fn check_cancelled(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            self.terminate();
            return true;
        }
        false
    }

    fn is_open(&self, stream: Stream) -> bool {
        match stream {
            Stream::Stdout => self.stdout_open,
            Stream::Stderr => self.stderr_open,
        }
    }

    /// Wait one poll interval for output and queue any completed lines.
    fn receive(&mut self) {
        match self.chunks.recv_timeout(POLL_INTERVAL) {
            Ok(Chunk::Data(stream, bytes)) => {
                let lines = self.assembler(stream).push(&bytes);
                self.ready.extend(lines.into_iter().map(|line| (stream, line)));
            }
            Ok(Chunk::Closed(stream)) => {
                match stream {
                    Stream::Stdout => self.stdout_open = false,
                    Stream::Stderr => self.stderr_open = false,
                }
                if let Some(rest) = self.assembler(stream).finish() {
                    self.ready.push_back((stream, rest));
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                self.stdout_open = false;
                self.stderr_open = false;
                if let Some(rest) = self.stdout.finish() {
                    self.ready.push_back((Stream::Stdout, rest));
                }
                if let Some(rest) = self.stderr.finish() {
                    self.ready.push_back((Stream::Stderr, rest));
                }
            }
        }
    }

    fn assembler(&mut self, stream: Stream) -> &mut LineAssembler {
        match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        }
    }

    /// Kill the tool and everything in its process group. Idempotent.
    fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.ready.clear();
        debug!(command = %self.label, pid = self.child.id(), "terminating tool");
        kill_tree(&mut self.child);
        self.reaped = true;
    }
}

impl Drop for ToolProcess {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        match self.child.try_wait() {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(command = %self.label, "tool still running when dropped, killing it");
                self.terminate();
            }
            Err(e) => warn!(command = %self.label, "failed to poll tool: {}", e),
        }
    }
}

fn spawn_reader<R>(mut stream: R, kind: Stream, tx: Sender<Chunk>) -> io::Result<()>
where
    R: Read + Send + 'static,
{
    let name = match kind {
        Stream::Stdout => "tool-stdout",
        Stream::Stderr => "tool-stderr",
    };
    thread::Builder::new().name(name.to_string()).spawn(move || {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(Chunk::Data(kind, buf[..n].to_vec())).is_err() {
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        let _ = tx.send(Chunk::Closed(kind));
    })?;
    Ok(())
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    use std::time::Instant;

    let group = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(group, Signal::SIGTERM) {
        debug!(pgid = child.id(), "SIGTERM failed: {}", e);
    }

    let deadline = Instant::now() + KILL_GRACE;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(_)) | Err(_) => break,
            Ok(None) => thread::sleep(Duration::from_millis(10)),
        }
    }

    // Helpers may outlive the leader or ignore SIGTERM.
    let _ = killpg(group, Signal::SIGKILL);
    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
