//! Extraction rules for pulling a version out of a non-standard tag string

use regex::Regex;

use crate::version::error::VersionError;

/// A pattern with named capture groups used to extract a version from tags
/// that don't follow the plain `v1.2.3` shape (e.g. `release-1-2-3`).
///
/// Either a single `version` group captures the whole version verbatim, or
/// the numeric groups `major`/`minor`/`patch` (plus optional `prerelease`
/// and `build`) are assembled into a canonical string.
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    pattern: Regex,
}

/// The named capture groups matched against one input string.
#[derive(Debug, Default)]
pub struct ExtractedParts {
    pub version: Option<String>,
    pub major: Option<String>,
    pub minor: Option<String>,
    pub patch: Option<String>,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

impl ExtractionRule {
    pub fn new(pattern: &str) -> Result<Self, VersionError> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Matches the input and returns the populated capture groups.
    pub fn captures(&self, input: &str) -> Result<ExtractedParts, VersionError> {
        let caps = self
            .pattern
            .captures(input)
            .ok_or_else(|| VersionError::Extraction {
                pattern: self.pattern.as_str().to_string(),
                input: input.to_string(),
            })?;

        let group = |name: &str| {
            caps.name(name)
                .map(|m| m.as_str().to_string())
                .filter(|s| !s.is_empty())
        };

        Ok(ExtractedParts {
            version: group("version"),
            major: group("major"),
            minor: group("minor"),
            patch: group("patch"),
            prerelease: group("prerelease"),
            build: group("build"),
        })
    }

    /// Extracts the raw version string from the input.
    ///
    /// A `version` group is used verbatim; otherwise the numeric groups are
    /// assembled, with missing `major`/`minor`/`patch` defaulting to `0`.
    pub fn extract(&self, input: &str) -> Result<String, VersionError> {
        let parts = self.captures(input)?;
        if let Some(version) = parts.version {
            return Ok(version);
        }

        let major = parts.major.as_deref().unwrap_or("0");
        let minor = parts.minor.as_deref().unwrap_or("0");
        let patch = parts.patch.as_deref().unwrap_or("0");
        let mut assembled = format!("v{major}.{minor}.{patch}");
        if let Some(pre) = &parts.prerelease {
            assembled.push('-');
            assembled.push_str(pre);
        }
        if let Some(build) = &parts.build {
            assembled.push('+');
            assembled.push_str(build);
        }
        Ok(assembled)
    }
}
