//! Build requests assembled from persisted records.
//!
//! A `BuildRequest` is the queue's view of one pending build: one source
//! specifier per contributing codebase plus the metadata the scheduler wrote
//! when it created the request. It is assembled at the moment the queue needs
//! to evaluate or merge it and never mutated afterwards; merging produces a
//! fresh per-codebase specifier map, not an in-place update.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::errors::RequestError;
use crate::source::{merge, Revision, SourceSpecifier};
use crate::store::{BuildsetId, RecordStore, RequestId};

/// A build property: the value plus who set it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyValue {
    pub value: Value,
    pub source: String,
}

/// One pending build, assembled from the persistent store.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    id: RequestId,
    buildset_id: BuildsetId,
    builder_name: String,
    priority: i32,
    reason: String,
    submitted_at: Option<DateTime<Utc>>,
    sources: BTreeMap<String, SourceSpecifier>,
    properties: BTreeMap<String, PropertyValue>,
}

impl BuildRequest {
    /// Load a request and everything hanging off its buildset: sourcestamps,
    /// their contributing changes, and the property bag.
    ///
    /// A buildset with zero sourcestamps is corrupt upstream state and fails
    /// with [`RequestError::EmptySourceSet`]; it is never silently defaulted.
    pub async fn from_record(
        store: &dyn RecordStore,
        id: RequestId,
    ) -> Result<Self, RequestError> {
        let record = store.build_request(id).await?;
        let stamps = store.source_stamps(record.buildset_id).await?;
        if stamps.is_empty() {
            return Err(RequestError::EmptySourceSet {
                request_id: id,
                buildset_id: record.buildset_id,
            });
        }

        let mut sources = BTreeMap::new();
        for stamp in stamps {
            let spec = if stamp.change_ids.is_empty() {
                SourceSpecifier::new(
                    stamp.codebase.clone(),
                    stamp.branch,
                    stamp.revision.map(Revision::Text),
                    stamp.patch,
                )
            } else {
                let changes = store.changes(&stamp.change_ids).await?;
                SourceSpecifier::from_changes(stamp.codebase.clone(), stamp.patch, changes)?
            };
            sources.insert(stamp.codebase, spec);
        }

        let mut properties = BTreeMap::new();
        for prop in store.properties(record.buildset_id).await? {
            properties.insert(
                prop.name,
                PropertyValue {
                    value: prop.value,
                    source: prop.source,
                },
            );
        }

        debug!(request = id, buildset = record.buildset_id, codebases = sources.len(), "assembled build request");

        Ok(Self {
            id,
            buildset_id: record.buildset_id,
            builder_name: record.builder_name,
            priority: record.priority,
            reason: record.reason,
            submitted_at: record.submitted_at,
            sources,
            properties,
        })
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn buildset_id(&self) -> BuildsetId {
        self.buildset_id
    }

    pub fn builder_name(&self) -> &str {
        &self.builder_name
    }

    /// Higher is more urgent.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    /// One specifier per contributing codebase, keyed by codebase name.
    pub fn sources(&self) -> &BTreeMap<String, SourceSpecifier> {
        &self.sources
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    /// Whether this request and `other` can be collapsed into one build.
    ///
    /// Requires exactly the same set of codebases on both sides, and a
    /// compatible specifier pair for every codebase. Requests spanning
    /// different codebase sets never merge: the combined build would be
    /// ill-defined for the codebases only one side has.
    pub fn can_merge_with(&self, other: &BuildRequest) -> bool {
        if self.sources.len() != other.sources.len() {
            return false;
        }
        self.sources.iter().all(|(codebase, ours)| {
            other
                .sources
                .get(codebase)
                .is_some_and(|theirs| merge::compatible(ours, theirs))
        })
    }

    /// Fold the specifiers of `others` into this request's, per codebase.
    ///
    /// The result is the per-codebase source map of the single build that
    /// subsumes every contributing request. Iteration order over codebases
    /// does not affect the result; the order of `others` is preserved within
    /// each codebase's change list.
    ///
    /// # Panics
    ///
    /// Panics if [`Self::can_merge_with`] does not hold against every element
    /// of `others`; callers must have checked already.
    pub fn merge_sources_with(
        &self,
        others: &[&BuildRequest],
    ) -> BTreeMap<String, SourceSpecifier> {
        for other in others {
            assert!(
                self.can_merge_with(other),
                "merge precondition violated: request {} cannot merge with request {}",
                self.id,
                other.id,
            );
        }

        self.sources
            .iter()
            .map(|(codebase, ours)| {
                let contributions: Vec<&SourceSpecifier> =
                    others.iter().map(|other| &other.sources[codebase]).collect();
                (codebase.clone(), merge::merge(ours, &contributions))
            })
            .collect()
    }
}
