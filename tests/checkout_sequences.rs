//! End-to-end checkout runs against a scripted remote executor.
//!
//! Each test declares the exact command sequence the worker should see and
//! the canned result for each command; any deviation (wrong command, extra
//! command, leftover script) fails the test.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use stoker::checkout::{
    BranchType, Checkout, CheckoutConfig, CommandResult, ExecError, Mercurial, Method, Mode,
    RemoteExecutor, StepStatus,
};
use stoker::source::{Revision, SourceSpecifier};

const NODE: &str = "f6ad368298bd941e934a41f3babc827b2aa95a1d";

/// What to answer when the expected command arrives.
enum Reply {
    Exit { code: i32, stdout: &'static str },
    Transport,
    TimedOut,
    /// Never complete; used to cancel mid-command.
    Hang,
}

enum Expect {
    Shell { argv: &'static str, reply: Reply },
    Stat { path: &'static str, exists: bool },
    RemoveDir { path: &'static str },
}

fn shell(argv: &'static str, stdout: &'static str) -> Expect {
    Expect::Shell {
        argv,
        reply: Reply::Exit { code: 0, stdout },
    }
}

fn shell_fails(argv: &'static str) -> Expect {
    Expect::Shell {
        argv,
        reply: Reply::Exit {
            code: 1,
            stdout: "",
        },
    }
}

struct ScriptedRemote {
    script: Mutex<VecDeque<Expect>>,
}

impl ScriptedRemote {
    fn new(script: Vec<Expect>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
        })
    }

    fn next(&self, seen: &str) -> Expect {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected command past end of script: {seen}"))
    }

    fn assert_consumed(&self) {
        let remaining = self.script.lock().unwrap().len();
        assert_eq!(remaining, 0, "{remaining} scripted commands never ran");
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedRemote {
    async fn run(
        &self,
        _workdir: &str,
        argv: &[String],
        _env: &BTreeMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, ExecError> {
        let seen = argv.join(" ");
        match self.next(&seen) {
            Expect::Shell { argv: want, reply } => {
                assert_eq!(seen, want);
                match reply {
                    Reply::Exit { code, stdout } => Ok(CommandResult {
                        exit_code: code,
                        stdout: stdout.to_string(),
                    }),
                    Reply::Transport => {
                        Err(ExecError::Transport(anyhow::anyhow!("connection lost")))
                    }
                    Reply::TimedOut => Err(ExecError::Timeout(
                        timeout.unwrap_or(Duration::from_secs(1200)),
                    )),
                    Reply::Hang => {
                        std::future::pending::<()>().await;
                        unreachable!()
                    }
                }
            }
            _ => panic!("expected a non-shell command, worker saw: {seen}"),
        }
    }

    async fn stat(&self, path: &str) -> Result<bool, ExecError> {
        match self.next(path) {
            Expect::Stat { path: want, exists } => {
                assert_eq!(path, want);
                Ok(exists)
            }
            _ => panic!("unexpected stat of {path}"),
        }
    }

    async fn remove_dir(&self, path: &str) -> Result<(), ExecError> {
        match self.next(path) {
            Expect::RemoveDir { path: want } => {
                assert_eq!(path, want);
                Ok(())
            }
            _ => panic!("unexpected rmdir of {path}"),
        }
    }
}

fn spec(branch: Option<&str>, revision: Option<&str>) -> SourceSpecifier {
    SourceSpecifier::new(
        "",
        branch.map(String::from),
        revision.map(|r| Revision::Text(r.to_string())),
        None,
    )
}

fn checkout(config: CheckoutConfig, remote: Arc<ScriptedRemote>) -> Checkout {
    Checkout::new(config, Arc::new(Mercurial), remote).unwrap()
}

#[tokio::test]
async fn test_incremental_fresh_clone() {
    let remote = ScriptedRemote::new(vec![
        shell("hg --verbose --version", ""),
        Expect::Stat {
            path: "wkdir/.hg",
            exists: false,
        },
        shell("hg --verbose clone --noupdate http://hg.mozilla.org .", ""),
        shell("hg --verbose update --clean", ""),
        shell("hg --verbose identify --id --debug", NODE),
    ]);
    let config = CheckoutConfig::new(Mode::Incremental, BranchType::InRepo)
        .with_repo_url("http://hg.mozilla.org");

    let outcome = checkout(config, remote.clone())
        .run(&spec(None, None), "wkdir", None, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, StepStatus::Success);
    assert_eq!(outcome.resolved_revision.as_deref(), Some(NODE));
    remote.assert_consumed();
}

#[tokio::test]
async fn test_full_clean_existing_repo() {
    let remote = ScriptedRemote::new(vec![
        shell("hg --verbose --version", ""),
        Expect::Stat {
            path: "wkdir/.hg",
            exists: true,
        },
        shell("hg --verbose --config extensions.purge= purge", ""),
        shell("hg --verbose pull http://hg.mozilla.org", ""),
        shell("hg --verbose identify --branch", "default\n"),
        shell("hg --verbose update --clean", ""),
        shell("hg --verbose identify --id --debug", NODE),
    ]);
    let config = CheckoutConfig::new(Mode::Full(Method::Clean), BranchType::InRepo)
        .with_repo_url("http://hg.mozilla.org");

    let outcome = checkout(config, remote.clone())
        .run(&spec(None, None), "wkdir", None, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, StepStatus::Success);
    assert_eq!(outcome.resolved_revision.as_deref(), Some(NODE));
    assert!(outcome.log.iter().any(|line| line.contains("purge")));
    remote.assert_consumed();
}

#[tokio::test]
async fn test_full_clobber_always_reclones() {
    let remote = ScriptedRemote::new(vec![
        shell("hg --verbose --version", ""),
        Expect::RemoveDir { path: "wkdir" },
        shell("hg --verbose clone --noupdate http://hg.mozilla.org .", ""),
        shell("hg --verbose update --clean", ""),
        shell("hg --verbose identify --id --debug", NODE),
    ]);
    let config = CheckoutConfig::new(Mode::Full(Method::Clobber), BranchType::InRepo)
        .with_repo_url("http://hg.mozilla.org");

    let outcome = checkout(config, remote.clone())
        .run(&spec(None, None), "wkdir", None, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, StepStatus::Success);
    remote.assert_consumed();
}

#[tokio::test]
async fn test_incremental_branch_change_reclones() {
    let remote = ScriptedRemote::new(vec![
        shell("hg --verbose --version", ""),
        Expect::Stat {
            path: "wkdir/.hg",
            exists: true,
        },
        shell("hg --verbose pull http://hg.mozilla.org --update", ""),
        shell("hg --verbose identify --branch", "default\n"),
        Expect::RemoveDir { path: "wkdir" },
        shell("hg --verbose clone --noupdate http://hg.mozilla.org .", ""),
        shell("hg --verbose update --clean", ""),
        shell("hg --verbose identify --id --debug", NODE),
    ]);
    let config = CheckoutConfig::new(Mode::Incremental, BranchType::InRepo)
        .with_repo_url("http://hg.mozilla.org");

    let outcome = checkout(config, remote.clone())
        .run(
            &spec(Some("stable"), None),
            "wkdir",
            None,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.status, StepStatus::Success);
    remote.assert_consumed();
}

#[tokio::test]
async fn test_dirname_branch_change_reclones_from_branch_url() {
    let remote = ScriptedRemote::new(vec![
        shell("hg --verbose --version", ""),
        Expect::Stat {
            path: "wkdir/.hg",
            exists: true,
        },
        Expect::RemoveDir { path: "wkdir" },
        shell(
            "hg --verbose clone --noupdate http://hg.mozilla.org/stable .",
            "",
        ),
        shell("hg --verbose update --clean", ""),
        shell("hg --verbose identify --id --debug", NODE),
    ]);
    let config = CheckoutConfig::new(Mode::Incremental, BranchType::Dirname)
        .with_base_url("http://hg.mozilla.org/");

    let outcome = checkout(config, remote.clone())
        .run(
            &spec(Some("stable"), None),
            "wkdir",
            Some("devel"),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.status, StepStatus::Success);
    remote.assert_consumed();
}

#[tokio::test]
async fn test_missing_tool_fails_without_further_commands() {
    let remote = ScriptedRemote::new(vec![shell_fails("hg --verbose --version")]);
    let config = CheckoutConfig::new(Mode::Incremental, BranchType::InRepo)
        .with_repo_url("http://hg.mozilla.org");

    let outcome = checkout(config, remote.clone())
        .run(&spec(None, None), "wkdir", None, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, StepStatus::Failure);
    assert!(outcome.resolved_revision.is_none());
    remote.assert_consumed();
}

#[tokio::test]
async fn test_transport_error_fails_the_step() {
    let remote = ScriptedRemote::new(vec![
        shell("hg --verbose --version", ""),
        Expect::Stat {
            path: "wkdir/.hg",
            exists: true,
        },
        Expect::Shell {
            argv: "hg --verbose pull http://hg.mozilla.org --update",
            reply: Reply::Transport,
        },
    ]);
    let config = CheckoutConfig::new(Mode::Incremental, BranchType::InRepo)
        .with_repo_url("http://hg.mozilla.org");

    let outcome = checkout(config, remote.clone())
        .run(&spec(None, None), "wkdir", None, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, StepStatus::Failure);
    assert!(outcome
        .log
        .iter()
        .any(|line| line.contains("connection lost")));
    remote.assert_consumed();
}

#[tokio::test]
async fn test_command_timeout_fails_the_step() {
    let remote = ScriptedRemote::new(vec![
        shell("hg --verbose --version", ""),
        Expect::Stat {
            path: "wkdir/.hg",
            exists: true,
        },
        Expect::Shell {
            argv: "hg --verbose pull http://hg.mozilla.org --update",
            reply: Reply::TimedOut,
        },
    ]);
    let config = CheckoutConfig::new(Mode::Incremental, BranchType::InRepo)
        .with_repo_url("http://hg.mozilla.org")
        .with_timeout(Duration::from_secs(5));

    let outcome = checkout(config, remote.clone())
        .run(&spec(None, None), "wkdir", None, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, StepStatus::Failure);
    remote.assert_consumed();
}

#[tokio::test]
async fn test_cancelled_before_start_runs_nothing() {
    let remote = ScriptedRemote::new(Vec::new());
    let config = CheckoutConfig::new(Mode::Incremental, BranchType::InRepo)
        .with_repo_url("http://hg.mozilla.org");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = checkout(config, remote.clone())
        .run(&spec(None, None), "wkdir", None, &cancel)
        .await;

    assert_eq!(outcome.status, StepStatus::Cancelled);
    remote.assert_consumed();
}

#[tokio::test]
async fn test_cancellation_interrupts_a_running_command() {
    let remote = ScriptedRemote::new(vec![
        shell("hg --verbose --version", ""),
        Expect::Stat {
            path: "wkdir/.hg",
            exists: true,
        },
        Expect::Shell {
            argv: "hg --verbose pull http://hg.mozilla.org --update",
            reply: Reply::Hang,
        },
    ]);
    let config = CheckoutConfig::new(Mode::Incremental, BranchType::InRepo)
        .with_repo_url("http://hg.mozilla.org");
    let cancel = CancellationToken::new();

    let stopper = cancel.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        stopper.cancel();
    });

    let outcome = checkout(config, remote.clone())
        .run(&spec(None, None), "wkdir", None, &cancel)
        .await;
    handle.await.unwrap();

    assert_eq!(outcome.status, StepStatus::Cancelled);
    assert!(outcome.resolved_revision.is_none());
    remote.assert_consumed();
}
