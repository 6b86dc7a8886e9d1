//! Partitioning pending build requests into one coalesced build.
//!
//! When many small changes land in a burst, the queue asks the coalescer
//! whether the oldest pending request can subsume its siblings. Coalescing
//! reduces total build count at the cost of coarser pass/fail attribution;
//! requests with incompatible intents (different branches, patched builds,
//! change-driven vs. pinned) are never folded because that would silently
//! change what the build means.
//!
//! The whole computation is pure and side-effect-free over immutable request
//! snapshots. Keeping the snapshot consistent (no candidate concurrently
//! claimed by another build) is the outer queue's responsibility.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::request::BuildRequest;
use crate::source::SourceSpecifier;

/// Coalescing policy knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoalesceConfig {
    /// Upper bound on the number of changes a single codebase may accumulate
    /// across the coalesced build. `None` (the default) keeps the historical
    /// unbounded behavior; a bound trades batch size back for latency.
    pub max_coalesced_changes: Option<usize>,
}

impl CoalesceConfig {
    /// Cap the number of changes coalesced per codebase.
    pub fn with_max_coalesced_changes(mut self, max: usize) -> Self {
        self.max_coalesced_changes = Some(max);
        self
    }
}

/// Result of one coalescing pass.
#[derive(Debug)]
pub struct Coalesced {
    /// Candidates folded into the primary, in the order they were offered.
    pub merged: Vec<BuildRequest>,
    /// Candidates that must be scheduled independently.
    pub rejected: Vec<BuildRequest>,
    /// One merged specifier per codebase, covering the primary and every
    /// merged candidate. The queue builds the single subsuming build from
    /// this map.
    pub sources: BTreeMap<String, SourceSpecifier>,
}

/// Decides which pending requests ride along with a primary request.
#[derive(Debug, Default)]
pub struct Coalescer {
    config: CoalesceConfig,
}

impl Coalescer {
    pub fn new(config: CoalesceConfig) -> Self {
        Self { config }
    }

    /// Partition `candidates` against `primary`.
    ///
    /// A candidate is folded in when it can merge with the primary and, if a
    /// change cap is configured, when no codebase's accumulated change count
    /// would exceed the cap. Compatibility with the primary pins every
    /// specifier to the primary's branch and change-drivenness, so accepted
    /// candidates are pairwise mergeable as well.
    pub fn partition(&self, primary: &BuildRequest, candidates: Vec<BuildRequest>) -> Coalesced {
        let mut merged: Vec<BuildRequest> = Vec::new();
        let mut rejected = Vec::new();

        let mut change_totals: BTreeMap<String, usize> = primary
            .sources()
            .iter()
            .map(|(codebase, spec)| (codebase.clone(), spec.changes().len()))
            .collect();

        for candidate in candidates {
            if !primary.can_merge_with(&candidate) {
                debug!(
                    primary = primary.id(),
                    candidate = candidate.id(),
                    "rejecting candidate: incompatible sources"
                );
                rejected.push(candidate);
                continue;
            }

            if let Some(cap) = self.config.max_coalesced_changes {
                let over_cap = candidate.sources().iter().any(|(codebase, spec)| {
                    let current = change_totals.get(codebase).copied().unwrap_or(0);
                    current + spec.changes().len() > cap
                });
                if over_cap {
                    debug!(
                        primary = primary.id(),
                        candidate = candidate.id(),
                        cap,
                        "rejecting candidate: change cap reached"
                    );
                    rejected.push(candidate);
                    continue;
                }
            }

            for (codebase, spec) in candidate.sources() {
                *change_totals.entry(codebase.clone()).or_insert(0) += spec.changes().len();
            }
            merged.push(candidate);
        }

        let contributors: Vec<&BuildRequest> = merged.iter().collect();
        let sources = primary.merge_sources_with(&contributors);

        debug!(
            primary = primary.id(),
            merged = merged.len(),
            rejected = rejected.len(),
            "coalescing pass complete"
        );

        Coalesced {
            merged,
            rejected,
            sources,
        }
    }
}
