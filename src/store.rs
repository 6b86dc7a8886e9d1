//! Read-only access to persisted build records.
//!
//! The coordination core never talks to a database directly. It consumes the
//! narrow lookup interface below, which backends must implement so that every
//! call returns a committed snapshot: a buildset is either fully visible or
//! not visible at all.
//!
//! `MemoryStore` is the reference implementation, used by the test suite and
//! suitable for small single-process deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::change::{Change, ChangeId};
use crate::errors::StoreError;
use crate::source::Patch;

pub type RequestId = i64;
pub type BuildsetId = i64;

/// Persisted build request row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequestRecord {
    pub id: RequestId,
    pub buildset_id: BuildsetId,
    pub builder_name: String,
    /// Higher is more urgent.
    pub priority: i32,
    pub reason: String,
    /// `None` if the submission time was never recorded.
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Persisted sourcestamp row, current schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStampRecord {
    pub codebase: String,
    pub branch: Option<String>,
    pub revision: Option<String>,
    pub patch: Option<Patch>,
    /// Contributing changes in submission order, oldest first.
    pub change_ids: Vec<ChangeId>,
}

/// Persisted buildset property row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub name: String,
    pub value: serde_json::Value,
    /// Who set the property (scheduler name, force-build form, ...).
    pub source: String,
}

/// Lookup interface the core requires from the persistent store.
///
/// Implementations must only surface already-committed state; no partial
/// buildset may ever be visible through these calls.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn build_request(&self, id: RequestId) -> Result<BuildRequestRecord, StoreError>;

    async fn source_stamps(
        &self,
        buildset_id: BuildsetId,
    ) -> Result<Vec<SourceStampRecord>, StoreError>;

    async fn properties(&self, buildset_id: BuildsetId) -> Result<Vec<PropertyRecord>, StoreError>;

    /// Resolve change ids to records, preserving the order of `ids`.
    async fn changes(&self, ids: &[ChangeId]) -> Result<Vec<Change>, StoreError>;
}

pub mod legacy {
    //! One-shot schema migration for version-0 sourcestamp rows.
    //!
    //! Version 0 predates typed columns: branch and revision were stored as
    //! raw JSON scalars, and some backends wrote integer revisions. Store
    //! adapters call [`upgrade`] once when loading such a row; the runtime
    //! data model stays schema-version-free.

    use serde::Deserialize;
    use serde_json::Value;

    use super::SourceStampRecord;
    use crate::change::ChangeId;
    use crate::errors::SourceError;
    use crate::source::{json_kind, Patch, Revision};

    /// A version-0 sourcestamp row with untyped scalar columns.
    #[derive(Debug, Clone, Deserialize)]
    pub struct SourceStampV0 {
        #[serde(default)]
        pub codebase: String,
        pub branch: Value,
        pub revision: Value,
        #[serde(default)]
        pub patch_level: Value,
        #[serde(default)]
        pub patch_body: Value,
        #[serde(default)]
        pub patch_subdir: Option<String>,
        #[serde(default)]
        pub change_ids: Vec<ChangeId>,
    }

    /// Upgrade a version-0 row to the current schema.
    ///
    /// Integer revisions become their string form; any other non-string,
    /// non-null value is rejected as a construction error. A patch is
    /// present when the body column is non-null, in which case the level
    /// must be a non-negative integer.
    pub fn upgrade(row: SourceStampV0) -> Result<SourceStampRecord, SourceError> {
        let branch = match row.branch {
            Value::Null => None,
            Value::String(text) => Some(text),
            other => {
                return Err(SourceError::InvalidBranch {
                    found: json_kind(&other).to_string(),
                });
            }
        };
        let revision = match row.revision {
            Value::Null => None,
            other => Some(Revision::from_json(&other)?.into_string()),
        };
        let patch = match row.patch_body {
            Value::Null => None,
            Value::String(diff) => {
                let level = row
                    .patch_level
                    .as_u64()
                    .ok_or_else(|| SourceError::InvalidPatchLevel {
                        found: json_kind(&row.patch_level).to_string(),
                    })? as u32;
                Some(Patch {
                    level,
                    diff,
                    subdir: row.patch_subdir,
                })
            }
            other => {
                return Err(SourceError::InvalidPatchDiff {
                    found: json_kind(&other).to_string(),
                });
            }
        };
        Ok(SourceStampRecord {
            codebase: row.codebase,
            branch,
            revision,
            patch,
            change_ids: row.change_ids,
        })
    }
}

/// In-memory record store.
///
/// Rows are inserted up front and the store is read-only afterwards, which
/// trivially satisfies the committed-snapshot contract.
#[derive(Debug, Default)]
pub struct MemoryStore {
    requests: HashMap<RequestId, BuildRequestRecord>,
    stamps: HashMap<BuildsetId, Vec<SourceStampRecord>>,
    properties: HashMap<BuildsetId, Vec<PropertyRecord>>,
    changes: HashMap<ChangeId, Change>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_request(&mut self, record: BuildRequestRecord) -> &mut Self {
        self.requests.insert(record.id, record);
        self
    }

    pub fn insert_source_stamp(
        &mut self,
        buildset_id: BuildsetId,
        stamp: SourceStampRecord,
    ) -> &mut Self {
        self.stamps.entry(buildset_id).or_default().push(stamp);
        self
    }

    pub fn insert_property(&mut self, buildset_id: BuildsetId, prop: PropertyRecord) -> &mut Self {
        self.properties.entry(buildset_id).or_default().push(prop);
        self
    }

    pub fn insert_change(&mut self, change: Change) -> &mut Self {
        self.changes.insert(change.id, change);
        self
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn build_request(&self, id: RequestId) -> Result<BuildRequestRecord, StoreError> {
        self.requests
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: "build request",
                id,
            })
    }

    async fn source_stamps(
        &self,
        buildset_id: BuildsetId,
    ) -> Result<Vec<SourceStampRecord>, StoreError> {
        Ok(self.stamps.get(&buildset_id).cloned().unwrap_or_default())
    }

    async fn properties(&self, buildset_id: BuildsetId) -> Result<Vec<PropertyRecord>, StoreError> {
        Ok(self
            .properties
            .get(&buildset_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn changes(&self, ids: &[ChangeId]) -> Result<Vec<Change>, StoreError> {
        ids.iter()
            .map(|id| {
                self.changes
                    .get(id)
                    .cloned()
                    .ok_or(StoreError::NotFound { kind: "change", id: *id })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SourceError;
    use serde_json::json;

    #[test]
    fn test_upgrade_converts_integer_revision() {
        let row = legacy::SourceStampV0 {
            codebase: String::new(),
            branch: json!("trunk"),
            revision: json!(9283),
            patch_level: json!(null),
            patch_body: json!(null),
            patch_subdir: None,
            change_ids: vec![13],
        };
        let record = legacy::upgrade(row).unwrap();
        assert_eq!(record.branch.as_deref(), Some("trunk"));
        assert_eq!(record.revision.as_deref(), Some("9283"));
    }

    #[test]
    fn test_upgrade_assembles_patch_from_scalar_columns() {
        let row = legacy::SourceStampV0 {
            codebase: String::new(),
            branch: json!("trunk"),
            revision: json!("9283"),
            patch_level: json!(1),
            patch_body: json!("--- a\n+++ b\n"),
            patch_subdir: Some("sub".to_string()),
            change_ids: Vec::new(),
        };
        let record = legacy::upgrade(row).unwrap();
        let patch = record.patch.unwrap();
        assert_eq!(patch.level, 1);
        assert_eq!(patch.subdir.as_deref(), Some("sub"));

        // A body without a usable level is rejected, not defaulted.
        let row = legacy::SourceStampV0 {
            codebase: String::new(),
            branch: json!("trunk"),
            revision: json!("9283"),
            patch_level: json!(null),
            patch_body: json!("--- a\n+++ b\n"),
            patch_subdir: None,
            change_ids: Vec::new(),
        };
        assert!(matches!(
            legacy::upgrade(row),
            Err(SourceError::InvalidPatchLevel { .. })
        ));
    }

    #[test]
    fn test_upgrade_keeps_nulls_as_none() {
        let row = legacy::SourceStampV0 {
            codebase: String::new(),
            branch: json!(null),
            revision: json!(null),
            patch_level: json!(null),
            patch_body: json!(null),
            patch_subdir: None,
            change_ids: Vec::new(),
        };
        let record = legacy::upgrade(row).unwrap();
        assert!(record.branch.is_none());
        assert!(record.revision.is_none());
    }

    #[test]
    fn test_upgrade_rejects_untyped_values() {
        let row = legacy::SourceStampV0 {
            codebase: String::new(),
            branch: json!("trunk"),
            revision: json!(true),
            patch_level: json!(null),
            patch_body: json!(null),
            patch_subdir: None,
            change_ids: Vec::new(),
        };
        assert!(legacy::upgrade(row).is_err());

        let row = legacy::SourceStampV0 {
            codebase: String::new(),
            branch: json!(42),
            revision: json!("9283"),
            patch_level: json!(null),
            patch_body: json!(null),
            patch_subdir: None,
            change_ids: Vec::new(),
        };
        assert!(legacy::upgrade(row).is_err());
    }

    #[tokio::test]
    async fn test_memory_store_preserves_change_order() {
        let mut store = MemoryStore::new();
        for (id, revision) in [(14, "9200"), (13, "9283")] {
            store.insert_change(Change {
                id,
                codebase: String::new(),
                branch: Some("trunk".to_string()),
                revision: revision.to_string(),
                author: "dev".to_string(),
                comments: String::new(),
                files: Vec::new(),
                when: None,
            });
        }

        let changes = store.changes(&[13, 14]).await.unwrap();
        assert_eq!(changes[0].id, 13);
        assert_eq!(changes[1].id, 14);
    }

    #[tokio::test]
    async fn test_memory_store_missing_request() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.build_request(288).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
