//! Compatibility and fold rules for coalescing source specifiers.
//!
//! These are pure, total functions over immutable values: two specifiers
//! either describe states of the same line of work or they do not, and
//! folding compatible specifiers only concatenates their change lists. No
//! shared mutable state is involved, so concurrent callers never race.

use crate::source::SourceSpecifier;

/// Decide whether two specifiers may be collapsed into a single build.
///
/// The rules, in order:
/// 1. Different branches are unrelated lines of work.
/// 2. Two change-driven specifiers always merge: both mean "build whatever
///    changes are pending", and coalescing them trades finer-grained
///    pass/fail attribution for fewer builds.
/// 3. A change-driven specifier never merges with a pinned one; doing so
///    would silently drop the pinned-revision intent.
/// 4. A patched build's diff is build-specific and must never be applied to
///    an unrelated build.
/// 5. Otherwise, the specifiers merge iff they pin the same revision
///    (both `None` means both build HEAD).
pub fn compatible(a: &SourceSpecifier, b: &SourceSpecifier) -> bool {
    if a.branch() != b.branch() {
        return false;
    }

    if a.is_change_driven() && b.is_change_driven() {
        return true;
    }
    if a.is_change_driven() != b.is_change_driven() {
        return false;
    }

    if a.patch().is_some() || b.patch().is_some() {
        return false;
    }

    a.revision() == b.revision()
}

/// Fold `others` into `a`, producing one specifier that covers every
/// contributor's changes.
///
/// Change lists are concatenated in the order given, preserving submission
/// order within each contributor. When the result carries changes, branch
/// and revision are re-derived from the most recent change, so the merged
/// specifier points at the newest contributing revision.
///
/// # Panics
///
/// Panics if any element of `others` is not [`compatible`] with `a`. The
/// coalescing decision must always be checked before folding; violating
/// that is a programming error, not a recoverable failure.
pub fn merge(a: &SourceSpecifier, others: &[&SourceSpecifier]) -> SourceSpecifier {
    let mut changes = a.changes().to_vec();
    for other in others {
        assert!(
            compatible(a, other),
            "merge precondition violated: '{}' is not compatible with '{}'",
            a.summary(),
            other.summary(),
        );
        changes.extend(other.changes().iter().cloned());
    }

    match changes.last() {
        Some(last) => {
            let branch = last.branch.clone();
            let revision = Some(last.revision.clone());
            SourceSpecifier::from_parts(
                a.codebase().to_string(),
                branch,
                revision,
                a.patch().cloned(),
                changes,
            )
        }
        // Nothing was change-driven; the contributors all pinned the same
        // revision, so the fold is a copy of `a`.
        None => a.clone(),
    }
}

/// Pin a specifier to the concrete revision found on disk after checkout.
///
/// The copy has its revision replaced and its change list cleared, so
/// downstream consumers see a reproducible specifier instead of a floating
/// "latest".
pub fn resolve_absolute(spec: &SourceSpecifier, got_revision: &str) -> SourceSpecifier {
    SourceSpecifier::from_parts(
        spec.codebase().to_string(),
        spec.branch().map(String::from),
        Some(got_revision.to_string()),
        spec.patch().cloned(),
        Vec::new(),
    )
}
