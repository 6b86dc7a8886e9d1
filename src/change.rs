//! Change records read from the persistent store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a change record in the persistent store.
pub type ChangeId = i64;

/// One commit/submission against a codebase.
///
/// Changes are read-only from the coordination core's perspective: the store
/// layer produced them, and the core only orders and groups them. Within a
/// sequence, changes appear in submission order, so the last element is the
/// most recent one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub id: ChangeId,
    pub codebase: String,
    /// `None` means the VCS's default branch.
    pub branch: Option<String>,
    /// Always the string form, even for VCSes that number revisions.
    pub revision: String,
    pub author: String,
    pub comments: String,
    pub files: Vec<String>,
    /// When the change was submitted, if recorded.
    pub when: Option<DateTime<Utc>>,
}
