//! Version canonicalization, classification and comparison
//!
//! All decisions about whether one tag is an upgrade over another live here;
//! the per-source resolvers only enumerate candidates and delegate.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;

use crate::version::error::VersionError;
use crate::version::extract::ExtractionRule;

/// Baseline sentinel that accepts any concrete candidate as an upgrade.
pub const LATEST: &str = "latest";

/// Canonical version syntax: leading `v`, one to three numeric components,
/// optional prerelease and build suffixes.
static VERSION_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v\d+(\.\d+){0,2}(-[0-9A-Za-z.-]+)?(\+[0-9A-Za-z.-]+)?$").unwrap()
});

/// Relative ordering of a candidate version against a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    /// The candidate is newer than the baseline.
    Newer,
    /// The candidate is older than the baseline.
    Older,
}

/// The granularity at which a version is pinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionType {
    /// Only a major component (`v1`).
    Major,
    /// Major and minor, no patch (`v1.1`).
    MajorMinor,
    /// Fully qualified `major.minor.patch` (`v1.1.1`).
    Canonical,
    /// Carries prerelease or build metadata (`v2.1.0-rc`, `v2.1.0+b1`).
    PreRelease,
}

impl fmt::Display for VersionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VersionType::Major => "major",
            VersionType::MajorMinor => "major-minor",
            VersionType::Canonical => "canonical",
            VersionType::PreRelease => "prerelease",
        };
        f.write_str(s)
    }
}

/// Coarse magnitude bucket used to gate upgrades for pre-1.0 baselines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseClass {
    Major,
    Minor,
    Patch,
}

/// Immutable per-call comparison configuration.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub extraction: Option<ExtractionRule>,
    pub release_class_gate: Option<ReleaseClass>,
}

/// Normalizes a tag into canonical form: extraction rule applied if
/// configured, leading marker folded to a single `v`, syntax validated.
///
/// Without an extraction rule this is idempotent: canonicalizing a canonical
/// version yields itself.
pub fn canonical(v: &str, opts: &UpdateOptions) -> Result<String, VersionError> {
    let raw = match &opts.extraction {
        Some(rule) => rule.extract(v)?,
        None => v.to_string(),
    };
    let normalized = normalize_marker(&raw);
    if !VERSION_SYNTAX.is_match(&normalized) {
        return Err(VersionError::InvalidVersion(v.to_string()));
    }
    Ok(normalized)
}

/// Classifies the granularity of a version string.
///
/// With an extraction rule, classification is driven by which named groups
/// were populated; prerelease/build always wins over the numeric groups so a
/// fully-specified prerelease tag is never mistaken for a bare major pin.
pub fn version_type(v: &str, opts: &UpdateOptions) -> Result<VersionType, VersionError> {
    if let Some(rule) = &opts.extraction {
        let parts = rule.captures(v)?;
        if let Some(version) = parts.version {
            let canon = canonical(&version, &UpdateOptions::default())?;
            return Ok(classify(&canon));
        }
        if parts.prerelease.is_some() || parts.build.is_some() {
            return Ok(VersionType::PreRelease);
        }
        if parts.patch.is_some() {
            return Ok(VersionType::Canonical);
        }
        if parts.minor.is_some() {
            return Ok(VersionType::MajorMinor);
        }
        if parts.major.is_some() {
            return Ok(VersionType::Major);
        }
        return Err(VersionError::InvalidVersion(v.to_string()));
    }

    Ok(classify(&canonical(v, opts)?))
}

/// Compares a candidate against a baseline.
///
/// Both sides must be pinned at the same granularity; a baseline of
/// `"latest"` accepts any candidate. When a release-class gate is set, a
/// would-be upgrade whose baseline is in a different class reports `Equal`
/// (no upgrade) instead of failing.
pub fn compare(
    baseline: &str,
    candidate: &str,
    opts: &UpdateOptions,
) -> Result<Comparison, VersionError> {
    if baseline == LATEST {
        return Ok(Comparison::Newer);
    }

    let baseline_type = version_type(baseline, opts)?;
    let candidate_type = version_type(candidate, opts)?;
    if baseline_type != candidate_type {
        return Err(VersionError::TypeMismatch {
            baseline: baseline_type,
            candidate: candidate_type,
        });
    }

    let baseline_canon = canonical(baseline, opts)?;
    let candidate_canon = canonical(candidate, opts)?;
    let baseline_version = parse_padded(&baseline_canon)?;
    let candidate_version = parse_padded(&candidate_canon)?;

    match baseline_version.cmp(&candidate_version) {
        Ordering::Equal => Ok(Comparison::Equal),
        Ordering::Less => {
            if let Some(gate) = opts.release_class_gate
                && release_class_of(&baseline_canon)? != gate
            {
                return Ok(Comparison::Equal);
            }
            Ok(Comparison::Newer)
        }
        Ordering::Greater => Ok(Comparison::Older),
    }
}

/// Classifies the magnitude of a version: `Major` for 1.x+, `Minor` for 0.x
/// with a nonzero minor, `Patch` for 0.0.x.
pub fn release_class(v: &str) -> Result<ReleaseClass, VersionError> {
    release_class_of(&canonical(v, &UpdateOptions::default())?)
}

fn release_class_of(canon: &str) -> Result<ReleaseClass, VersionError> {
    let version = parse_padded(canon)?;
    if version.major > 0 {
        return Ok(ReleaseClass::Major);
    }
    if version.minor > 0 {
        return Ok(ReleaseClass::Minor);
    }
    if version.patch > 0 {
        return Ok(ReleaseClass::Patch);
    }
    Ok(ReleaseClass::Major)
}

fn normalize_marker(v: &str) -> String {
    if let Some(rest) = v.strip_prefix('V') {
        return format!("v{rest}");
    }
    if v.starts_with('v') {
        return v.to_string();
    }
    format!("v{v}")
}

fn classify(canon: &str) -> VersionType {
    if canon.contains('-') || canon.contains('+') {
        return VersionType::PreRelease;
    }
    match canon.matches('.').count() {
        0 => VersionType::Major,
        1 => VersionType::MajorMinor,
        _ => VersionType::Canonical,
    }
}

/// Parses a canonical version into a `semver::Version`, padding missing
/// minor/patch components with zeros so partial pins stay comparable.
fn parse_padded(canon: &str) -> Result<Version, VersionError> {
    let body = canon.strip_prefix('v').unwrap_or(canon);
    let (core, suffix) = match body.find(['-', '+']) {
        Some(i) => (&body[..i], &body[i..]),
        None => (body, ""),
    };
    let padded = match core.matches('.').count() {
        0 => format!("{core}.0.0"),
        1 => format!("{core}.0"),
        _ => core.to_string(),
    };
    Version::parse(&format!("{padded}{suffix}"))
        .map_err(|_| VersionError::InvalidVersion(canon.to_string()))
}
