//! The checkout state machine.
//!
//! [`Planner`] is the pure core: a tagged state plus a transition function
//! that is handed the result of the previous remote command and answers with
//! the next command to issue, or the final step status. It never executes
//! anything itself, so every transition can be unit-tested without a worker.
//!
//! [`Checkout`] is the async driver. It owns the executor, feeds command
//! results back into the planner one at a time, honors cancellation between
//! (and during) commands, and collects the step log.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::checkout::command::{Command, CommandResult, RemoteExecutor};
use crate::checkout::config::{BranchType, CheckoutConfig, Method, Mode};
use crate::checkout::vcs::VcsCommands;
use crate::errors::CheckoutError;
use crate::source::SourceSpecifier;

/// Terminal status of one checkout step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Success,
    Failure,
    /// Aborted by an external cancellation signal; distinct from failure so
    /// callers can tell "build was stopped" from "build failed".
    Cancelled,
}

/// What one checkout run produced.
#[derive(Debug)]
pub struct CheckoutOutcome {
    pub status: StepStatus,
    /// The concrete revision now present on disk, resolved even when the
    /// request asked for "latest". Feed it to `merge::resolve_absolute` to
    /// pin the specifier.
    pub resolved_revision: Option<String>,
    pub log: Vec<String>,
}

/// Logical phase whose command is currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    ProbeTool,
    ProbeExistence,
    Purge,
    Pull,
    IdentifyBranch,
    Destroy,
    Clone { no_update: bool },
    Update,
    IdentifyResult,
}

/// What the driver observed for the command last issued.
#[derive(Debug)]
pub enum Input {
    /// Begin the checkout.
    Start,
    /// A shell command finished.
    Finished(CommandResult),
    /// The existence probe answered.
    Exists(bool),
    /// The directory removal finished.
    Removed,
}

/// The planner's answer: either issue this command, or the step is over.
#[derive(Debug)]
pub enum Next {
    Run(Command),
    Finish(StepStatus),
}

/// Pure transition core of the checkout state machine.
pub struct Planner<'a> {
    config: &'a CheckoutConfig,
    vcs: &'a dyn VcsCommands,
    workdir: String,
    url: String,
    branch: Option<String>,
    revision: Option<String>,
    /// Branch the workdir was last built with, as tracked by the caller.
    /// Only consulted for dirname backends, which have no command to ask.
    prior_branch: Option<String>,
    state: State,
    destroyed: bool,
    resolved_revision: Option<String>,
}

impl<'a> Planner<'a> {
    pub fn new(
        config: &'a CheckoutConfig,
        vcs: &'a dyn VcsCommands,
        spec: &SourceSpecifier,
        workdir: &str,
        prior_branch: Option<&str>,
    ) -> Self {
        let branch = spec
            .branch()
            .or(config.default_branch.as_deref())
            .map(String::from);
        let url = config.url_for(branch.as_deref());
        Self {
            config,
            vcs,
            workdir: workdir.to_string(),
            url,
            branch,
            revision: spec.revision().map(String::from),
            prior_branch: prior_branch.map(String::from),
            state: State::Idle,
            destroyed: false,
            resolved_revision: None,
        }
    }

    /// The revision `identify-result` reported, once the step succeeded.
    pub fn resolved_revision(&self) -> Option<&str> {
        self.resolved_revision.as_deref()
    }

    /// Advance the machine one transition.
    ///
    /// # Panics
    ///
    /// Panics if `input` does not answer the command the machine last
    /// issued; that is a driver bug, not a runtime condition.
    pub fn step(&mut self, input: Input) -> Next {
        match (self.state, input) {
            (State::Idle, Input::Start) => {
                self.state = State::ProbeTool;
                self.shell(self.vcs.version_probe())
            }

            // A missing tool is fatal for the step: fail immediately, no
            // further commands.
            (State::ProbeTool, Input::Finished(result)) => {
                if !result.success() {
                    return Next::Finish(StepStatus::Failure);
                }
                if self.config.mode == Mode::Full(Method::Clobber) {
                    // Clobber never reuses the workdir, so probing it is
                    // pointless.
                    self.destroy()
                } else {
                    self.state = State::ProbeExistence;
                    Next::Run(Command::Stat {
                        path: format!("{}/{}", self.workdir, self.vcs.existence_marker()),
                    })
                }
            }

            (State::ProbeExistence, Input::Exists(true)) => match self.config.mode {
                Mode::Full(Method::Clean) => self.purge(false),
                Mode::Full(Method::Fresh) => self.purge(true),
                Mode::Full(Method::Clobber) => {
                    unreachable!("clobber skips the existence probe")
                }
                Mode::Incremental => {
                    // Dirname backends cannot switch branches in place, and
                    // have no command to ask which branch is on disk; the
                    // caller-tracked prior branch decides.
                    if self.config.branch_type == BranchType::Dirname
                        && self.config.clobber_on_branch_change
                        && self.dirname_branch_changed()
                    {
                        self.destroy()
                    } else {
                        self.pull()
                    }
                }
            },

            (State::ProbeExistence, Input::Exists(false)) => {
                let no_update = self.config.mode == Mode::Incremental;
                self.clone_repo(no_update)
            }

            (State::Purge, Input::Finished(result)) => {
                if !result.success() {
                    return Next::Finish(StepStatus::Failure);
                }
                self.pull()
            }

            (State::Pull, Input::Finished(result)) => {
                if !result.success() {
                    return Next::Finish(StepStatus::Failure);
                }
                if self.config.branch_type == BranchType::InRepo {
                    self.state = State::IdentifyBranch;
                    self.shell(self.vcs.identify_branch())
                } else {
                    self.update()
                }
            }

            (State::IdentifyBranch, Input::Finished(result)) => {
                if !result.success() {
                    return Next::Finish(StepStatus::Failure);
                }
                let Some(current) = self.vcs.parse_branch(&result.stdout) else {
                    return Next::Finish(StepStatus::Failure);
                };
                if current != self.requested_branch()
                    && self.config.clobber_on_branch_change
                    && !self.destroyed
                {
                    self.destroy()
                } else {
                    self.update()
                }
            }

            (State::Destroy, Input::Removed) => {
                self.destroyed = true;
                self.clone_repo(true)
            }

            (State::Clone { no_update }, Input::Finished(result)) => {
                if !result.success() {
                    return Next::Finish(StepStatus::Failure);
                }
                if no_update || self.revision.is_some() {
                    self.update()
                } else {
                    self.identify_result()
                }
            }

            (State::Update, Input::Finished(result)) => {
                if !result.success() {
                    return Next::Finish(StepStatus::Failure);
                }
                self.identify_result()
            }

            (State::IdentifyResult, Input::Finished(result)) => {
                if !result.success() {
                    return Next::Finish(StepStatus::Failure);
                }
                self.resolved_revision = self.vcs.parse_revision(&result.stdout);
                Next::Finish(StepStatus::Success)
            }

            (state, input) => {
                unreachable!("checkout machine in state {state:?} fed mismatched input {input:?}")
            }
        }
    }

    /// Branch this build is for, for comparison against the working copy.
    fn requested_branch(&self) -> &str {
        self.branch
            .as_deref()
            .unwrap_or(self.vcs.default_branch_name())
    }

    fn dirname_branch_changed(&self) -> bool {
        self.prior_branch
            .as_deref()
            .is_some_and(|prior| prior != self.requested_branch())
    }

    fn shell(&self, argv: Vec<String>) -> Next {
        Next::Run(Command::Shell {
            workdir: self.workdir.clone(),
            argv,
            env: self.config.env.clone(),
            timeout: self.config.timeout,
        })
    }

    fn purge(&mut self, include_ignored: bool) -> Next {
        self.state = State::Purge;
        self.shell(self.vcs.purge(include_ignored))
    }

    fn pull(&mut self) -> Next {
        self.state = State::Pull;
        let update = self.config.mode == Mode::Incremental;
        self.shell(self.vcs.pull(&self.url, update))
    }

    fn clone_repo(&mut self, no_update: bool) -> Next {
        self.state = State::Clone { no_update };
        self.shell(self.vcs.clone_repo(&self.url, no_update))
    }

    fn update(&mut self) -> Next {
        self.state = State::Update;
        self.shell(self.vcs.update(self.revision.as_deref()))
    }

    fn destroy(&mut self) -> Next {
        self.state = State::Destroy;
        Next::Run(Command::RemoveDir {
            path: self.workdir.clone(),
        })
    }

    fn identify_result(&mut self) -> Next {
        self.state = State::IdentifyResult;
        self.shell(self.vcs.identify_revision())
    }
}

/// Async driver that realizes a source specifier in a working directory.
pub struct Checkout {
    config: CheckoutConfig,
    vcs: Arc<dyn VcsCommands>,
    executor: Arc<dyn RemoteExecutor>,
}

impl Checkout {
    /// Validates the configuration up front; a bad URL/branch-type
    /// combination never issues a single command.
    pub fn new(
        config: CheckoutConfig,
        vcs: Arc<dyn VcsCommands>,
        executor: Arc<dyn RemoteExecutor>,
    ) -> Result<Self, CheckoutError> {
        config.validate()?;
        Ok(Self {
            config,
            vcs,
            executor,
        })
    }

    /// Bring `workdir` to the state `spec` describes.
    ///
    /// `prior_branch` is the branch the workdir was last built with, if the
    /// caller tracked one; dirname backends need it to detect branch
    /// changes. Commands run strictly one at a time. The token cancels
    /// between commands and interrupts an in-flight one; either way the
    /// outcome is `Cancelled`, never a phantom success.
    pub async fn run(
        &self,
        spec: &SourceSpecifier,
        workdir: &str,
        prior_branch: Option<&str>,
        cancel: &CancellationToken,
    ) -> CheckoutOutcome {
        let mut planner = Planner::new(&self.config, self.vcs.as_ref(), spec, workdir, prior_branch);
        let mut log = Vec::new();
        let mut next = planner.step(Input::Start);

        loop {
            let command = match next {
                Next::Finish(status) => {
                    return self.finish(status, planner.resolved_revision(), log, workdir);
                }
                Next::Run(command) => command,
            };

            if cancel.is_cancelled() {
                log.push("interrupted before next command".to_string());
                return self.finish(StepStatus::Cancelled, None, log, workdir);
            }

            let input = match &command {
                Command::Shell {
                    workdir,
                    argv,
                    env,
                    timeout,
                } => {
                    debug!(workdir, command = %argv.join(" "), "running");
                    log.push(format!("$ {}", argv.join(" ")));
                    let run = self.executor.run(workdir, argv, env, *timeout);
                    let result = tokio::select! {
                        _ = cancel.cancelled() => {
                            log.push("interrupted".to_string());
                            return self.finish(StepStatus::Cancelled, None, log, workdir);
                        }
                        result = run => result,
                    };
                    match result {
                        Ok(result) => {
                            if !result.stdout.is_empty() {
                                log.push(result.stdout.trim_end().to_string());
                            }
                            if !result.success() {
                                log.push(format!("command failed: exit {}", result.exit_code));
                            }
                            Input::Finished(result)
                        }
                        Err(err) => {
                            warn!(error = %err, "remote command error");
                            log.push(format!("remote command error: {err}"));
                            return self.finish(StepStatus::Failure, None, log, workdir);
                        }
                    }
                }
                Command::Stat { path } => {
                    debug!(path, "stat");
                    log.push(format!("stat {path}"));
                    match self.executor.stat(path).await {
                        Ok(exists) => Input::Exists(exists),
                        Err(err) => {
                            log.push(format!("remote command error: {err}"));
                            return self.finish(StepStatus::Failure, None, log, workdir);
                        }
                    }
                }
                Command::RemoveDir { path } => {
                    debug!(path, "rmdir");
                    log.push(format!("rmdir {path}"));
                    match self.executor.remove_dir(path).await {
                        Ok(()) => Input::Removed,
                        Err(err) => {
                            log.push(format!("remote command error: {err}"));
                            return self.finish(StepStatus::Failure, None, log, workdir);
                        }
                    }
                }
            };

            next = planner.step(input);
        }
    }

    fn finish(
        &self,
        status: StepStatus,
        resolved_revision: Option<&str>,
        log: Vec<String>,
        workdir: &str,
    ) -> CheckoutOutcome {
        info!(workdir, ?status, revision = resolved_revision, "checkout finished");
        CheckoutOutcome {
            status,
            resolved_revision: resolved_revision.map(String::from),
            log,
        }
    }
}
