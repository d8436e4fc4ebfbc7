//! Running host-side tools with captured output and an optional deadline.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// How often a child with a deadline is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Output from a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output from the command.
    pub stdout: String,
    /// Standard error from the command.
    pub stderr: String,
    /// Exit code returned by the command, `-1` if it died from a signal.
    pub exit_code: i32,
}

impl ExecOutput {
    /// Returns whether the command exited with code zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the last non-empty line of stderr, trimmed.
    #[must_use]
    pub fn stderr_tail(&self) -> &str {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
    }
}

/// Result of [`run`]: either the command finished or its deadline expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The command exited on its own.
    Finished(ExecOutput),
    /// The deadline expired and the command was killed.
    TimedOut,
}

/// Spawns `command`, captures its output, and waits for it to exit.
///
/// With a `timeout`, the child is polled until the deadline and killed when
/// it expires. Output pipes are drained on helper threads so a chatty child
/// never blocks on a full pipe. The same deadline bounds the drain: a
/// process left behind by the command that keeps the pipes open counts as
/// a timeout.
///
/// # Errors
///
/// Returns an error if the process cannot be spawned or waited on.
pub fn run(command: &mut Command, timeout: Option<Duration>) -> std::io::Result<Completion> {
    tracing::debug!(cmd = ?command, ?timeout, "spawning command");

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let deadline = timeout.map(|limit| Instant::now() + limit);
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match deadline {
        None => child.wait()?,
        Some(deadline) => {
            if let Some(status) = wait_until(&mut child, deadline)? {
                status
            } else {
                tracing::warn!(cmd = ?command, ?timeout, "command timed out, killing it");
                let _ = child.kill();
                let _ = child.wait();
                return Ok(Completion::TimedOut);
            }
        }
    };

    let (Some(stdout), Some(stderr)) = (collect(stdout, deadline), collect(stderr, deadline))
    else {
        tracing::warn!(
            cmd = ?command,
            ?timeout,
            "command exited but its output pipes stayed open past the deadline"
        );
        return Ok(Completion::TimedOut);
    };

    Ok(Completion::Finished(ExecOutput {
        stdout,
        stderr,
        exit_code: status.code().unwrap_or(-1),
    }))
}

fn wait_until(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    pipe.map(|mut reader| {
        let (tx, rx) = mpsc::channel();
        let _ = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
        rx
    })
}

/// Waits for a drained pipe, returning `None` if `deadline` passes first.
fn collect(pipe: Option<Receiver<String>>, deadline: Option<Instant>) -> Option<String> {
    let Some(rx) = pipe else {
        return Some(String::new());
    };
    let received = match deadline {
        None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
    };
    match received {
        Ok(text) => Some(text),
        Err(RecvTimeoutError::Disconnected) => Some(String::new()),
        Err(RecvTimeoutError::Timeout) => None,
    }
}
