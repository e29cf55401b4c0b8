//! Bounded invocation of the external `git` executable
//!
//! Output goes to anonymous temp files rather than pipes so a chatty child can
//! never stall on a full pipe while we wait on it. A child that outlives its
//! timeout is killed and reported as [`GitError::Timeout`].

use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::debug;
use wait_timeout::ChildExt;

use crate::GitError;

/// Toolchain probe (`git --version`)
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Quick queries such as branch detection and `rev-list --count`
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Clone and garbage collection
pub const LONG_TIMEOUT: Duration = Duration::from_secs(600);

/// Run `git <args>` in `cwd`, returning trimmed stdout on success
pub fn run_git(args: &[&str], cwd: &Path, timeout: Duration) -> Result<String, GitError> {
    debug!(cwd = %cwd.display(), "running git {}", args.join(" "));
    let mut command = Command::new("git");
    command
        .args(args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GCM_INTERACTIVE", "never");
    run_bounded(command, args.first().copied().unwrap_or(""), timeout)
}

/// Spawn `command` and wait at most `timeout` for it; `label` names it in errors
fn run_bounded(mut command: Command, label: &str, timeout: Duration) -> Result<String, GitError> {
    let mut stdout = tempfile::tempfile()?;
    let mut stderr = tempfile::tempfile()?;

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout.try_clone()?))
        .stderr(Stdio::from(stderr.try_clone()?))
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => GitError::Unavailable(e.to_string()),
            _ => GitError::Io(e),
        })?;

    let status = match child.wait_timeout(timeout)? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GitError::Timeout {
                command: label.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
    };

    if !status.success() {
        return Err(GitError::CommandFailed {
            command: label.to_string(),
            message: read_all(&mut stderr)?.trim().to_string(),
        });
    }
    Ok(read_all(&mut stdout)?.trim().to_string())
}

fn read_all(file: &mut std::fs::File) -> Result<String, GitError> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Whether a working `git` executable is on `PATH`
pub fn git_available() -> bool {
    if which::which("git").is_err() {
        return false;
    }
    match run_git(&["--version"], &std::env::temp_dir(), PROBE_TIMEOUT) {
        Ok(version) => {
            debug!("found {}", version);
            true
        }
        Err(e) => {
            debug!("git probe failed: {}", e);
            false
        }
    }
}
