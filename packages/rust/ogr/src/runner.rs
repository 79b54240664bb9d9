//! Subprocess seam for the external conversion tool.
//!
//! [`ToolRunner`] is the only thing the bridge knows about process
//! execution, so tests can substitute a fake without GDAL installed.

use std::ffi::OsString;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use gps2shp_shared::{Gps2ShpError, Result};
use tracing::{debug, warn};

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Extra time, past the run deadline, allowed for the output pipes to close.
const PIPE_GRACE: Duration = Duration::from_millis(500);

/// Captured result of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs the conversion tool with the given arguments.
///
/// Implementations return `Err` only when the tool could not be run to
/// completion (spawn failure, timeout); a non-zero exit is a normal
/// [`ToolOutput`].
pub trait ToolRunner {
    fn run(&self, args: &[OsString]) -> Result<ToolOutput>;
}

/// Runs a real executable, killing it after `timeout`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, args: &[OsString]) -> Result<ToolOutput> {
        debug!(
            program = %self.program,
            args = ?args,
            timeout_secs = self.timeout.as_secs(),
            "running external tool"
        );

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Gps2ShpError::ExternalTool {
                tool: self.program.clone(),
                exit_code: None,
                stderr: format!("failed to start: {e}. Is `{}` installed?", self.program),
            })?;

        // Drain both pipes concurrently so a chatty tool cannot block on a full pipe.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    warn!(program = %self.program, "external tool timed out, killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Gps2ShpError::ExternalToolTimeout {
                        tool: self.program.clone(),
                        timeout: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(Gps2ShpError::ExternalTool {
                        tool: self.program.clone(),
                        exit_code: None,
                        stderr: format!("failed to wait for process: {e}"),
                    });
                }
            }
        };

        // A background grandchild can hold the pipes open after the tool
        // exits, so reading them is bounded by the same deadline.
        let pipe_deadline = deadline + PIPE_GRACE;
        let output = ToolOutput {
            exit_code: status.code(),
            stdout: collect(stdout, pipe_deadline, &self.program),
            stderr: collect(stderr, pipe_deadline, &self.program),
        };
        debug!(program = %self.program, exit_code = ?output.exit_code, "external tool exited");
        Ok(output)
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

/// Output read before `deadline`. A pipe still open then is abandoned and
/// its reader thread finishes on its own once the last holder exits.
fn collect(rx: Option<Receiver<Vec<u8>>>, deadline: Instant, program: &str) -> String {
    let Some(rx) = rx else {
        return String::new();
    };
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => {
            warn!(program, "output pipe still open after exit, discarding its contents");
            String::new()
        }
    }
}
