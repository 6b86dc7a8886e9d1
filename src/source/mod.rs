//! Source specifiers: the exact source state one codebase must be checked
//! out to for a given build.
//!
//! A specifier is an immutable value. It is constructed exactly once, either
//! from an explicit branch/revision/patch triple or from a non-empty change
//! list, and every derived form (a merge of several specifiers, or a copy
//! pinned to the revision actually found on disk) is a new value.

pub mod merge;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::change::Change;
use crate::errors::SourceError;

/// A revision value as it appears in persisted records.
///
/// Several VCSes number revisions with integers; the core always stores the
/// string form so comparisons behave the same across backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Revision {
    Text(String),
    Number(i64),
}

impl Revision {
    /// Normalize to the canonical string form.
    pub fn into_string(self) -> String {
        match self {
            Revision::Text(text) => text,
            Revision::Number(number) => number.to_string(),
        }
    }

    /// Parse a revision from an untyped persisted value.
    ///
    /// Only strings and integers are accepted; anything else is a
    /// construction error, rejected at the boundary and never stored.
    pub fn from_json(value: &Value) -> Result<Revision, SourceError> {
        match value {
            Value::String(text) => Ok(Revision::Text(text.clone())),
            Value::Number(number) => number
                .as_i64()
                .map(Revision::Number)
                .ok_or_else(|| SourceError::InvalidRevision {
                    found: number.to_string(),
                }),
            other => Err(SourceError::InvalidRevision {
                found: json_kind(other).to_string(),
            }),
        }
    }
}

/// A diff to apply after checkout, with its strip level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// Strip level, as in `patch -p<level>`.
    pub level: u32,
    /// Unified diff body.
    pub diff: String,
    /// Subdirectory to apply the diff in, if any.
    pub subdir: Option<String>,
}

/// The source state one codebase must be checked out to for a build.
///
/// Known as a "sourcestamp" in scheduler terminology. Fields are private so
/// the derived-from-changes invariant cannot be broken after construction:
/// whenever `changes` is non-empty, `branch` and `revision` are those of the
/// last (most recent) change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpecifier {
    codebase: String,
    branch: Option<String>,
    revision: Option<String>,
    patch: Option<Patch>,
    changes: Vec<Change>,
}

impl SourceSpecifier {
    /// Build a specifier from an explicit branch/revision/patch triple.
    ///
    /// `branch = None` means the VCS's default branch; `revision = None`
    /// means "latest". Integer revisions are normalized to strings.
    pub fn new(
        codebase: impl Into<String>,
        branch: Option<String>,
        revision: Option<Revision>,
        patch: Option<Patch>,
    ) -> Self {
        Self {
            codebase: codebase.into(),
            branch,
            revision: revision.map(Revision::into_string),
            patch,
            changes: Vec::new(),
        }
    }

    /// Build a specifier from a non-empty change list.
    ///
    /// Branch and revision are derived from the last change; there are no
    /// explicit branch/revision arguments to silently override.
    pub fn from_changes(
        codebase: impl Into<String>,
        patch: Option<Patch>,
        changes: Vec<Change>,
    ) -> Result<Self, SourceError> {
        let last = changes.last().ok_or(SourceError::EmptyChangeList)?;
        Ok(Self {
            codebase: codebase.into(),
            branch: last.branch.clone(),
            revision: Some(last.revision.clone()),
            patch,
            changes,
        })
    }

    /// Internal constructor for derived values (merges, pinned copies).
    pub(crate) fn from_parts(
        codebase: String,
        branch: Option<String>,
        revision: Option<String>,
        patch: Option<Patch>,
        changes: Vec<Change>,
    ) -> Self {
        if let Some(last) = changes.last() {
            debug_assert_eq!(branch, last.branch);
            debug_assert_eq!(revision.as_deref(), Some(last.revision.as_str()));
        }
        Self {
            codebase,
            branch,
            revision,
            patch,
            changes,
        }
    }

    /// The codebase this specifier belongs to. Empty string is the unnamed
    /// default codebase.
    pub fn codebase(&self) -> &str {
        &self.codebase
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    /// `None` means "latest".
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn patch(&self) -> Option<&Patch> {
        self.patch.as_ref()
    }

    /// Contributing changes in submission order, oldest first.
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Whether this build exists to cover pending changes rather than a
    /// fixed revision or HEAD.
    pub fn is_change_driven(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Stable human-readable summary: the revision (or `latest`), the branch
    /// if one is set, and a `[patch]` marker.
    pub fn summary(&self) -> String {
        let mut text = match &self.revision {
            Some(revision) => revision.clone(),
            None => "latest".to_string(),
        };
        if let Some(branch) = &self.branch {
            text.push_str(&format!(" in '{branch}'"));
        }
        if self.patch.is_some() {
            text.push_str(" [patch]");
        }
        text
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(id: i64, branch: Option<&str>, revision: &str) -> Change {
        Change {
            id,
            codebase: String::new(),
            branch: branch.map(String::from),
            revision: revision.to_string(),
            author: "dev".to_string(),
            comments: "fix".to_string(),
            files: vec!["src/main.c".to_string()],
            when: None,
        }
    }

    #[test]
    fn test_new_normalizes_integer_revision() {
        let spec = SourceSpecifier::new("", None, Some(Revision::Number(9283)), None);
        assert_eq!(spec.revision(), Some("9283"));
    }

    #[test]
    fn test_revision_from_json_rejects_other_types() {
        assert!(Revision::from_json(&serde_json::json!("abc")).is_ok());
        assert!(Revision::from_json(&serde_json::json!(42)).is_ok());
        assert!(Revision::from_json(&serde_json::json!(true)).is_err());
        assert!(Revision::from_json(&serde_json::json!(["x"])).is_err());
    }

    #[test]
    fn test_from_changes_derives_branch_and_revision_from_last() {
        let spec = SourceSpecifier::from_changes(
            "",
            None,
            vec![
                change(13, Some("trunk"), "9283"),
                change(15, Some("stable"), "9284"),
            ],
        )
        .unwrap();

        assert_eq!(spec.branch(), Some("stable"));
        assert_eq!(spec.revision(), Some("9284"));
        assert_eq!(spec.changes().len(), 2);
        assert!(spec.is_change_driven());
    }

    #[test]
    fn test_from_changes_rejects_empty_list() {
        let result = SourceSpecifier::from_changes("", None, Vec::new());
        assert!(matches!(result, Err(SourceError::EmptyChangeList)));
    }

    #[test]
    fn test_summary_latest() {
        let spec = SourceSpecifier::new("", None, None, None);
        assert_eq!(spec.summary(), "latest");
    }

    #[test]
    fn test_summary_with_branch_and_patch() {
        let patch = Patch {
            level: 1,
            diff: "--- a\n+++ b\n".to_string(),
            subdir: None,
        };
        let spec = SourceSpecifier::new(
            "",
            Some("trunk".to_string()),
            Some(Revision::Text("9284".to_string())),
            Some(patch),
        );
        assert_eq!(spec.summary(), "9284 in 'trunk' [patch]");
    }
}
