//! Typed error hierarchy for the coordination core.
//!
//! Four top-level enums cover the four subsystems:
//! - `SourceError` — source specifier construction and record upgrades
//! - `StoreError` — record store backend failures
//! - `RequestError` — build request assembly failures
//! - `CheckoutError` — checkout configuration rejections
//!
//! Command-level failures during a checkout are deliberately *not* errors:
//! they are captured as step outcomes (see `checkout::CheckoutOutcome`) so the
//! orchestrator can record the failed step and keep managing the rest of the
//! build lifecycle.

use thiserror::Error;

/// Errors from source specifier construction and legacy record upgrades.
///
/// These are structural data errors: there is no safe partial result for a
/// malformed source specification, so they abort the enclosing operation.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("revision must be a string or an integer, got {found}")]
    InvalidRevision { found: String },

    #[error("branch must be a string, got {found}")]
    InvalidBranch { found: String },

    #[error("patch level must be a non-negative integer, got {found}")]
    InvalidPatchLevel { found: String },

    #[error("patch diff must be a string, got {found}")]
    InvalidPatchDiff { found: String },

    #[error("a specifier built from changes requires at least one change")]
    EmptyChangeList,
}

/// Errors from the record store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("store backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Errors from build request assembly.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The persisted buildset carries no sourcestamps. This is corrupt
    /// upstream state and is surfaced, never defaulted.
    #[error("buildset {buildset_id} of request {request_id} has no sourcestamps")]
    EmptySourceSet { request_id: i64, buildset_id: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Errors from checkout configuration.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("exactly one of repo_url and base_url must be set")]
    ConflictingUrls,

    #[error("branch type {branch_type} requires {required}")]
    UrlForBranchType {
        branch_type: &'static str,
        required: &'static str,
    },
}
