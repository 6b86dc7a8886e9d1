//! Turning a source specifier into an on-disk working copy.
//!
//! The subsystem is split along testability seams:
//! - [`config`] holds the per-builder checkout policy and validates it,
//! - [`vcs`] maps logical phases to concrete VCS command lines,
//! - [`command`] is the executor boundary to the remote worker,
//! - [`machine`] is the state machine itself plus its async driver.

pub mod command;
pub mod config;
pub mod machine;
pub mod vcs;

pub use command::{Command, CommandResult, ExecError, RemoteExecutor};
pub use config::{BranchType, CheckoutConfig, Method, Mode};
pub use machine::{Checkout, CheckoutOutcome, Input, Next, Planner, StepStatus};
pub use vcs::{Mercurial, VcsCommands};
