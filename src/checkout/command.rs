//! Remote command execution interface.
//!
//! The state machine never touches the worker directly; it emits [`Command`]
//! values and an executor carries them out on the remote side. Commands
//! within one checkout are strictly sequential: each later command depends on
//! the on-disk effects and exit status of the previous one.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// One remote operation issued by the checkout state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a VCS command in the working directory.
    Shell {
        workdir: String,
        argv: Vec<String>,
        env: BTreeMap<String, String>,
        timeout: Option<Duration>,
    },
    /// Probe whether a path exists on the worker. A negative answer is the
    /// expected "repository absent" branch, not a failure.
    Stat { path: String },
    /// Recursively delete a directory on the worker.
    RemoveDir { path: String },
}

/// Exit status and captured output of one shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Transport-level failure reaching the remote worker.
///
/// A timeout is treated identically to a failed command for step-outcome
/// purposes; a transport error fails the step as well.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("remote command timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote transport error: {0}")]
    Transport(#[source] anyhow::Error),
}

/// Asynchronous, cancellable command execution on a remote worker.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run(
        &self,
        workdir: &str,
        argv: &[String],
        env: &BTreeMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, ExecError>;

    async fn stat(&self, path: &str) -> Result<bool, ExecError>;

    async fn remove_dir(&self, path: &str) -> Result<(), ExecError>;
}
