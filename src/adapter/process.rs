/// External process runner
///
/// Spawns a toolchain or artifact, captures stdout/stderr on reader threads
/// and enforces a wall-clock timeout by polling the child.
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::{RunOutput, ToolchainStatus};
use crate::error::BuildError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Captured output of a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stderr followed by stdout, trimmed; what compilers print is split
    /// across both.
    pub fn combined(&self) -> String {
        let mut out = self.stderr.trim_end().to_string();
        let stdout = self.stdout.trim_end();
        if !stdout.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(stdout);
        }
        out
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },
}

/// Run `cmd` to completion, killing it once `timeout` elapses.
pub fn run(cmd: &mut Command, timeout: Duration) -> Result<ProcessOutput, ProcessError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let start = Instant::now();

    tracing::debug!("[polybuild] Command: {:?}", cmd);

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let (status, timed_out) =
        wait_with_timeout(&mut child, timeout).map_err(|source| ProcessError::Wait {
            program: program.clone(),
            source,
        })?;

    // A killed child may leave grandchildren holding the pipes; readers are
    // detached rather than joined in that case.
    if timed_out {
        return Err(ProcessError::TimedOut { program, timeout });
    }

    let stdout = stdout.map(join_reader).unwrap_or_default();
    let stderr = stderr.map(join_reader).unwrap_or_default();

    let duration = start.elapsed();
    let exit_code = exit_code(&status);

    tracing::debug!(
        "[polybuild] {} completed in {:.2}s with exit code {}",
        program,
        duration.as_secs_f64(),
        exit_code
    );

    Ok(ProcessOutput {
        exit_code,
        stdout,
        stderr,
        duration,
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(handle: thread::JoinHandle<Vec<u8>>) -> String {
    let bytes = handle.join().unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<(ExitStatus, bool)> {
    let start = Instant::now();

    loop {
        match child.try_wait()? {
            Some(status) => return Ok((status, false)),
            None => {
                if start.elapsed() >= timeout {
                    child.kill()?;
                    let status = child.wait()?; // Reap zombie
                    return Ok((status, true));
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

#[cfg(unix)]
fn exit_code(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Run an artifact command; launch failures and timeouts surface as `RunFailed`.
pub fn run_artifact(cmd: &mut Command, timeout: Duration) -> Result<RunOutput, BuildError> {
    match run(cmd, timeout) {
        Ok(output) => Ok(RunOutput {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        }),
        Err(e) => Err(BuildError::RunFailed {
            exit_code: -1,
            stderr: e.to_string(),
        }),
    }
}

/// Resolve `program` from PATH.
pub fn find_program(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Probe a tool by running it with `args` and reporting its first output line.
pub fn probe_tool(program: &Path, args: &[&str]) -> ToolchainStatus {
    let display = program.display().to_string();
    match run(Command::new(program).args(args), PROBE_TIMEOUT) {
        Ok(output) if output.success() => {
            let version = first_line(&output.stdout)
                .or_else(|| first_line(&output.stderr))
                .unwrap_or_else(|| display.clone());
            ToolchainStatus::available(version)
        }
        Ok(output) => ToolchainStatus::unavailable(format!(
            "{} exited with code {}: {}",
            display,
            output.exit_code,
            output.combined()
        )),
        Err(e) => ToolchainStatus::unavailable(e.to_string()),
    }
}

/// Probe a tool that must be on PATH.
pub fn probe_on_path(program: &str, args: &[&str]) -> ToolchainStatus {
    match find_program(program) {
        Some(path) => probe_tool(&path, args),
        None => ToolchainStatus::unavailable(format!("{} not found in PATH", program)),
    }
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
