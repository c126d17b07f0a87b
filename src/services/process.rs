// WG Profile Manager - Child Processes
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Child process plumbing shared by the sequencer, diagnostics and
//! elevated captures.
//!
//! Every child runs in its own process group. Stopping a child signals the
//! whole group with SIGTERM first, which `sudo` and `doas` relay to the
//! command they run, and only falls back to SIGKILL after a grace period.
//!
//! A step is over when its process exits. Output still buffered at that
//! point is collected for a short while; pipes held open by background
//! processes it left behind are then detached.

use std::future::pending;
use std::io::Read;
use std::process::Stdio;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, warn};

use super::privilege::{CommandOutput, CommandSpec};
use crate::models::{Error, Result};

/// Time a stopped process group gets before SIGKILL.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Time output is still read after the process exited.
pub const OUTPUT_DRAIN: Duration = Duration::from_millis(250);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Which pipe a line of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

// ============================================================================
// Output
// ============================================================================

/// Line reader that never mistakes bad bytes for end of stream.
pub struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// Next line without its terminator, lossily decoded.
    ///
    /// Cancel safe: bytes of a partially read line are kept for the next
    /// call.
    pub async fn next_line(&mut self) -> Option<String> {
        match self.reader.read_until(b'\n', &mut self.buf).await {
            Ok(0) if self.buf.is_empty() => None,
            Ok(_) => Some(self.take_line()),
            Err(e) => {
                debug!("Output read failed: {}", e);
                None
            }
        }
    }

    fn take_line(&mut self) -> String {
        let mut line = self.buf.as_slice();
        if let Some(rest) = line.strip_suffix(b"\n") {
            line = rest;
        }
        if let Some(rest) = line.strip_suffix(b"\r") {
            line = rest;
        }
        let text = String::from_utf8_lossy(line).into_owned();
        self.buf.clear();
        text
    }
}

async fn next_from<R: AsyncRead + Unpin>(reader: &mut Option<LineReader<R>>) -> Option<String> {
    match reader {
        Some(reader) => reader.next_line().await,
        None => pending().await,
    }
}

/// Interleaved line output of a child's stdout and stderr.
pub struct OutputPump {
    stdout: Option<LineReader<ChildStdout>>,
    stderr: Option<LineReader<ChildStderr>>,
}

impl OutputPump {
    /// Take the child's pipes.
    pub fn take(child: &mut Child) -> Self {
        Self {
            stdout: child.stdout.take().map(LineReader::new),
            stderr: child.stderr.take().map(LineReader::new),
        }
    }

    pub fn is_open(&self) -> bool {
        self.stdout.is_some() || self.stderr.is_some()
    }

    /// Next line from whichever pipe has one. None once both are closed.
    ///
    /// Cancel safe.
    pub async fn next(&mut self) -> Option<(OutputStream, String)> {
        loop {
            tokio::select! {
                line = next_from(&mut self.stdout), if self.stdout.is_some() => match line {
                    Some(line) => return Some((OutputStream::Stdout, line)),
                    None => self.stdout = None,
                },
                line = next_from(&mut self.stderr), if self.stderr.is_some() => match line {
                    Some(line) => return Some((OutputStream::Stderr, line)),
                    None => self.stderr = None,
                },
                else => return None,
            }
        }
    }

    /// Read what is left after the process exited, for at most `limit`.
    pub async fn drain<F>(&mut self, limit: Duration, mut on_line: F)
    where
        F: FnMut(OutputStream, String),
    {
        let deadline = tokio::time::sleep(limit);
        tokio::pin!(deadline);
        while self.is_open() {
            tokio::select! {
                _ = &mut deadline => {
                    debug!("Output pipes still held open after exit, detaching");
                    self.stdout = None;
                    self.stderr = None;
                }
                item = self.next() => match item {
                    Some((stream, line)) => on_line(stream, line),
                    None => break,
                },
            }
        }
    }
}

// ============================================================================
// Spawning and stopping
// ============================================================================

/// Spawn `spec` with piped output in a new process group.
pub fn spawn_piped(spec: &CommandSpec) -> std::io::Result<Child> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);
    command.spawn()
}

/// Resolves after `limit`, or never when there is none.
pub async fn deadline(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => pending::<()>().await,
    }
}

#[derive(Debug, Clone, Copy)]
enum Stop {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_group(pgid: u32, stop: Stop) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let signal = match stop {
        Stop::Term => Signal::SIGTERM,
        Stop::Kill => Signal::SIGKILL,
    };
    match killpg(Pid::from_raw(pgid as i32), signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => debug!("Signalling process group {} failed: {}", pgid, e),
    }
}

#[cfg(not(unix))]
fn signal_group(_pgid: u32, _stop: Stop) {}

/// Stop a child and everything in its process group.
pub async fn terminate(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    signal_group(pid, Stop::Term);
    if tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_err() {
        warn!("Process {} ignored SIGTERM, killing", pid);
    }
    signal_group(pid, Stop::Kill);
    let _ = child.start_kill();
    let _ = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await;
}

fn terminate_blocking(child: &mut std::process::Child) {
    let pid = child.id();
    signal_group(pid, Stop::Term);
    let started = Instant::now();
    while started.elapsed() < TERMINATE_GRACE {
        match child.try_wait() {
            Ok(None) => thread::sleep(POLL_INTERVAL),
            _ => break,
        }
    }
    signal_group(pid, Stop::Kill);
    let _ = child.kill();
    let _ = child.try_wait();
}

// ============================================================================
// Captured runs
// ============================================================================

fn push_line(output: &mut CommandOutput, stream: OutputStream, line: String) {
    let target = match stream {
        OutputStream::Stdout => &mut output.stdout,
        OutputStream::Stderr => &mut output.stderr,
    };
    target.push_str(&line);
    target.push('\n');
}

/// Run `spec` to completion and capture its output.
///
/// A run longer than `timeout` is stopped and reported as a failed command
/// with no exit code.
pub async fn run_captured(spec: &CommandSpec, timeout: Option<Duration>) -> Result<CommandOutput> {
    let mut child = spawn_piped(spec).map_err(|e| Error::SpawnFailed {
        program: spec.program.clone(),
        reason: e.to_string(),
    })?;
    let mut pump = OutputPump::take(&mut child);
    let mut output = CommandOutput::default();

    let limit = deadline(timeout);
    tokio::pin!(limit);

    let status = loop {
        tokio::select! {
            _ = &mut limit => {
                warn!("{} exceeded its timeout, stopping it", spec.display());
                terminate(&mut child).await;
                return Err(Error::command_failed(0, spec.display(), None));
            }
            item = pump.next(), if pump.is_open() => {
                if let Some((stream, line)) = item {
                    push_line(&mut output, stream, line);
                }
            }
            status = child.wait() => break status?,
        }
    };

    pump.drain(OUTPUT_DRAIN, |stream, line| push_line(&mut output, stream, line))
        .await;
    output.exit_code = status.code();
    Ok(output)
}

fn read_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut bytes = Vec::new();
            let _ = pipe.read_to_end(&mut bytes);
            let _ = tx.send(bytes);
        });
    }
    rx
}

/// Blocking counterpart of [`run_captured`].
pub fn run_captured_blocking(
    spec: &CommandSpec,
    timeout: Option<Duration>,
) -> Result<CommandOutput> {
    let mut command = std::process::Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let mut child = command.spawn().map_err(|e| Error::SpawnFailed {
        program: spec.program.clone(),
        reason: e.to_string(),
    })?;

    let stdout = read_pipe(child.stdout.take());
    let stderr = read_pipe(child.stderr.take());
    let started = Instant::now();

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if timeout.map_or(false, |limit| started.elapsed() >= limit) {
            warn!("{} exceeded its timeout, stopping it", spec.display());
            terminate_blocking(&mut child);
            return Err(Error::command_failed(0, spec.display(), None));
        }
        thread::sleep(POLL_INTERVAL);
    };

    let collect = |rx: mpsc::Receiver<Vec<u8>>| {
        rx.recv_timeout(OUTPUT_DRAIN)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    };
    Ok(CommandOutput {
        exit_code: status.code(),
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_not_end_of_output() {
        let mut child = spawn_piped(&sh(r"printf 'ok\n\377\376bad\r\nlast'")).unwrap();
        let mut pump = OutputPump::take(&mut child);
        let mut lines = Vec::new();
        while let Some((stream, line)) = pump.next().await {
            assert_eq!(stream, OutputStream::Stdout);
            lines.push(line);
        }
        assert_eq!(lines, vec!["ok", "\u{fffd}\u{fffd}bad", "last"]);
        assert!(child.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn test_stderr_flood_does_not_stall_stdout() {
        let script = "i=0; while [ $i -lt 5000 ]; do echo err $i >&2; i=$((i+1)); done; echo out";
        let output = tokio::time::timeout(Duration::from_secs(10), run_captured(&sh(script), None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr.lines().count(), 5000);
    }

    #[tokio::test]
    async fn test_capture_returns_when_process_exits() {
        let started = Instant::now();
        let output = run_captured(&sh("sleep 3 & echo launched; echo warn >&2; exit 0"), None)
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.stdout, "launched\n");
        assert_eq!(output.stderr, "warn\n");
    }

    #[tokio::test]
    async fn test_capture_timeout_stops_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let script = format!("sh -c 'sleep 1; touch {}'; echo done", marker.display());

        let err = run_captured(&sh(&script), Some(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { exit_code: None, .. }));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[test]
    fn test_blocking_capture() {
        let output = run_captured_blocking(&sh("echo hello; echo oops >&2; exit 3"), None).unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[test]
    fn test_blocking_capture_timeout() {
        let started = Instant::now();
        let err = run_captured_blocking(&sh("sleep 10"), Some(Duration::from_millis(200))).unwrap_err();
        assert!(matches!(err, Error::CommandFailed { exit_code: None, .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
