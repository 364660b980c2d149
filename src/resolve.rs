//! Generic version resolution over an external candidate source
//!
//! A [`Resolver`] is implemented once per reference kind (image, chart,
//! action). Each implementation enumerates candidates from its source and
//! delegates the decision to [`select_latest`], which in turn delegates
//! every comparison to the version core.

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

use crate::version::semver::{self, Comparison, UpdateOptions};
use crate::version::VersionError;

/// Error from an external candidate source (registry, chart repository,
/// code-hosting API).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("rate limited: retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("source unavailable: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Version(#[from] VersionError),
}

/// Options for one resolution: tags to ignore plus comparison configuration.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub excludes: HashSet<String>,
    pub update: UpdateOptions,
}

/// Resolves the best acceptable version for a reference from one external
/// source.
///
/// `Ok(None)` means no candidate qualified; `Ok(Some(v))` is the best
/// candidate and may equal the baseline when the reference is already up to
/// date.
#[async_trait::async_trait]
pub trait Resolver<R: Sync>: Send + Sync {
    async fn resolve(
        &self,
        reference: &R,
        opts: &ResolveOptions,
    ) -> Result<Option<String>, ResolveError>;
}

/// Picks the best acceptable candidate for a baseline version.
///
/// Enumeration order is authoritative: the most recently seen candidate that
/// compares `Equal` or `Newer` wins; candidates are never re-sorted. An
/// `Equal` candidate is recorded as the baseline itself, so a candidate that
/// merely spells the pinned version differently (or whose upgrade was
/// suppressed by a release-class gate) never rewrites the reference.
/// Excluded candidates are skipped before comparison. A candidate at a
/// different granularity is skipped as "no upgrade"; any other comparison
/// failure aborts the resolution, since a broken extraction rule should
/// surface instead of silently dropping valid upgrades.
pub fn select_latest(
    baseline: &str,
    candidates: &[String],
    opts: &ResolveOptions,
) -> Result<Option<String>, VersionError> {
    let mut best = None;
    for candidate in candidates {
        if opts.excludes.contains(candidate) {
            debug!(candidate, baseline, "candidate excluded by exclude list");
            continue;
        }
        match semver::compare(baseline, candidate, &opts.update) {
            Ok(Comparison::Newer) => best = Some(candidate.clone()),
            Ok(Comparison::Equal) => best = Some(baseline.to_string()),
            Ok(Comparison::Older) => {
                debug!(candidate, baseline, "candidate older than baseline");
            }
            Err(VersionError::TypeMismatch { .. }) => {
                debug!(candidate, baseline, "candidate granularity differs from baseline");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{ExtractionRule, ReleaseClass};

    fn versions(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keeps_most_recently_seen_acceptable_candidate() {
        let candidates = versions(&["v2", "v4", "v3"]);
        let best = select_latest("v1", &candidates, &ResolveOptions::default()).unwrap();
        // Enumeration order wins over semantic order.
        assert_eq!(best.as_deref(), Some("v3"));
    }

    #[test]
    fn returns_none_when_only_upgrade_is_excluded() {
        let candidates = versions(&["v2"]);
        let opts = ResolveOptions {
            excludes: HashSet::from(["v2".to_string()]),
            ..Default::default()
        };
        assert_eq!(select_latest("v1", &candidates, &opts).unwrap(), None);
    }

    #[test]
    fn excluded_candidates_never_reach_comparison() {
        // "dev" is not a parseable version; exclusion must skip it before
        // comparison or the whole resolution would abort.
        let candidates = versions(&["dev"]);
        let opts = ResolveOptions {
            excludes: HashSet::from(["dev".to_string()]),
            ..Default::default()
        };
        assert_eq!(select_latest("old", &candidates, &opts).unwrap(), None);
    }

    #[test]
    fn equal_candidate_is_acceptable() {
        let candidates = versions(&["v1"]);
        let best = select_latest("v1", &candidates, &ResolveOptions::default()).unwrap();
        assert_eq!(best.as_deref(), Some("v1"));
    }

    #[test]
    fn equal_candidate_keeps_baseline_spelling() {
        // "1" and "v1" canonicalize identically; the pinned spelling wins.
        let candidates = versions(&["1"]);
        let best = select_latest("v1", &candidates, &ResolveOptions::default()).unwrap();
        assert_eq!(best.as_deref(), Some("v1"));
    }

    #[test]
    fn gate_suppressed_upgrade_is_not_selected() {
        let opts = ResolveOptions {
            update: UpdateOptions {
                release_class_gate: Some(ReleaseClass::Patch),
                ..Default::default()
            },
            ..Default::default()
        };
        // Baseline is major-class, the gate demands patch-class.
        let candidates = versions(&["v1.2.4"]);
        let best = select_latest("v1.2.3", &candidates, &opts).unwrap();
        assert_eq!(best.as_deref(), Some("v1.2.3"));
    }

    #[test]
    fn mismatched_granularity_is_skipped_not_fatal() {
        let candidates = versions(&["v1.1", "v2"]);
        let best = select_latest("v1", &candidates, &ResolveOptions::default()).unwrap();
        assert_eq!(best.as_deref(), Some("v2"));
    }

    #[test]
    fn invalid_candidate_aborts_resolution() {
        let candidates = versions(&["not-a-version"]);
        let err = select_latest("v1", &candidates, &ResolveOptions::default()).unwrap_err();
        assert!(matches!(err, VersionError::InvalidVersion(_)));
    }

    #[test]
    fn extraction_rule_applies_to_baseline_and_candidates() {
        let opts = ResolveOptions {
            update: UpdateOptions {
                extraction: Some(
                    ExtractionRule::new(r"^release-(?P<major>\d+)-(?P<minor>\d+)-(?P<patch>\d+)$")
                        .unwrap(),
                ),
                ..Default::default()
            },
            ..Default::default()
        };
        let candidates = versions(&["release-1-2-4", "release-1-2-2"]);
        let best = select_latest("release-1-2-3", &candidates, &opts).unwrap();
        assert_eq!(best.as_deref(), Some("release-1-2-4"));
    }

    #[test]
    fn latest_sentinel_accepts_any_candidate() {
        let candidates = versions(&["v0.0.1"]);
        let best = select_latest("latest", &candidates, &ResolveOptions::default()).unwrap();
        assert_eq!(best.as_deref(), Some("v0.0.1"));
    }
}
