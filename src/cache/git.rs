//! Git operations using a hybrid CLI + libgit2 approach.
//!
//! **CLI (with hardening) for network operations:**
//! - `fetch` - `git clone --branch` into an empty destination
//! - `update` - `git pull` inside an existing working tree
//!
//! **libgit2 for read operations:**
//! - `head_commit` - report what a refresh checked out

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use git2::Repository;
use thiserror::Error;

/// Upper bound for a single clone or pull.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors returned by git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// libgit2 reported an error.
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
    /// Clone failed.
    #[error("clone failed: {0}")]
    CloneError(String),
    /// Pull failed.
    #[error("pull failed: {0}")]
    PullError(String),
    /// The git process did not finish in time and was killed.
    #[error("git {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    /// Underlying IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid inputs were provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Validate that a branch name is safe to pass to git and to use as a
/// directory name below the cache root.
///
/// Rejects:
/// - Empty strings
/// - Strings containing `..` (path traversal)
/// - Strings starting with `-` (could be interpreted as flags)
/// - Strings starting with `/` (would escape the cache root)
/// - Strings containing null bytes or control characters
pub fn validate_branch(value: &str) -> Result<(), GitError> {
    if value.is_empty() {
        return Err(GitError::InvalidInput("branch cannot be empty".into()));
    }
    if value.contains("..") {
        return Err(GitError::InvalidInput("branch cannot contain '..'".into()));
    }
    if value.starts_with('-') {
        return Err(GitError::InvalidInput(
            "branch cannot start with '-'".into(),
        ));
    }
    if value.starts_with('/') {
        return Err(GitError::InvalidInput(
            "branch cannot start with '/'".into(),
        ));
    }
    if value.bytes().any(|b| b < 0x20 || b == 0x7f) {
        return Err(GitError::InvalidInput(
            "branch cannot contain null or control characters".into(),
        ));
    }
    Ok(())
}

/// Validate that a repository URI cannot be mistaken for a git option.
pub fn validate_uri(value: &str) -> Result<(), GitError> {
    if value.is_empty() {
        return Err(GitError::InvalidInput("git uri cannot be empty".into()));
    }
    if value.starts_with('-') {
        return Err(GitError::InvalidInput(
            "git uri cannot start with '-'".into(),
        ));
    }
    if value.bytes().any(|b| b < 0x20 || b == 0x7f) {
        return Err(GitError::InvalidInput(
            "git uri cannot contain null or control characters".into(),
        ));
    }
    Ok(())
}

/// The two operations the cache needs from a version-control tool.
pub trait Fetcher {
    /// Populate `dest` with the content of `branch` from `git_uri`.
    fn fetch(&self, git_uri: &str, branch: &str, dest: &Path) -> Result<(), GitError>;

    /// Bring the checked-out branch in `dest` up to date.
    fn update(&self, dest: &Path) -> Result<(), GitError>;
}

/// Git CLI wrapper with security hardening.
pub struct GitCli {
    git_path: String,
    timeout: Duration,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    /// Create a new GitCli instance using the system git.
    pub fn new() -> Self {
        Self {
            git_path: "git".into(),
            timeout: GIT_TIMEOUT,
        }
    }

    /// Create a hardened Command with security settings.
    ///
    /// Applies:
    /// - `GIT_TERMINAL_PROMPT=0` - disable interactive prompts
    /// - `core.hooksPath=` - disable hooks execution
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.git_path);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.args(["-c", "core.hooksPath="]);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());
        cmd
    }

    /// Clone `branch` of `git_uri` into `dest`.
    pub fn clone_branch(&self, git_uri: &str, branch: &str, dest: &Path) -> Result<(), GitError> {
        validate_uri(git_uri)?;
        validate_branch(branch)?;

        let mut cmd = self.command();
        cmd.args(["clone", "--quiet", "--branch", branch, "--"])
            .arg(git_uri)
            .arg(dest);

        let stderr = self.run_with_timeout(cmd, "clone")?;
        stderr.map_err(GitError::CloneError)
    }

    /// Pull the tracked branch inside the working tree at `worktree`.
    pub fn pull(&self, worktree: &Path) -> Result<(), GitError> {
        let mut cmd = self.command();
        cmd.current_dir(worktree).args(["pull", "--quiet"]);

        let stderr = self.run_with_timeout(cmd, "pull")?;
        stderr.map_err(GitError::PullError)
    }

    /// Run `cmd`, killing it once the timeout expires.
    ///
    /// The outer result carries spawn/timeout failures; the inner one is
    /// `Err(stderr)` when git exited unsuccessfully.
    fn run_with_timeout(
        &self,
        mut cmd: Command,
        operation: &'static str,
    ) -> Result<Result<(), String>, GitError> {
        own_process_group(&mut cmd);
        let mut child = cmd.spawn()?;

        // Drain stderr on its own thread so a chatty git cannot fill the pipe
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        let status = match wait_with_deadline(&mut child, self.timeout)? {
            Some(status) => status,
            None => {
                // Transport helpers share the group and go down with git
                kill_process_group(&child);
                let _ = child.kill();
                let _ = child.wait();
                return Err(GitError::Timeout {
                    operation,
                    timeout: self.timeout,
                });
            }
        };

        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if status.success() {
            Ok(Ok(()))
        } else {
            Ok(Err(format!("{} ({})", stderr.trim(), status)))
        }
    }
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

#[cfg(unix)]
fn kill_process_group(child: &Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: kill(2) only sends a signal; the group was created for this child
        unsafe { libc::kill(-pgid, libc::SIGKILL) };
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

impl Fetcher for GitCli {
    fn fetch(&self, git_uri: &str, branch: &str, dest: &Path) -> Result<(), GitError> {
        self.clone_branch(git_uri, branch, dest)
    }

    fn update(&self, dest: &Path) -> Result<(), GitError> {
        self.pull(dest)
    }
}

/// Poll `child` with exponential backoff until it exits or `timeout` elapses.
///
/// Returns `None` on timeout; the child is left running.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let start = Instant::now();
    let mut sleep_duration = Duration::from_millis(10);
    let max_sleep = Duration::from_millis(500);

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Ok(None);
        }
        std::thread::sleep(sleep_duration.min(timeout - elapsed));
        sleep_duration = (sleep_duration * 2).min(max_sleep);
    }
}

/// Resolve the commit checked out in the working tree at `path`.
pub fn head_commit(path: &Path) -> Result<String, GitError> {
    let repo = Repository::open(path)?;
    let commit = repo.head()?.peel_to_commit()?;
    Ok(commit.id().to_string())
}
