use thiserror::Error;

use crate::version::semver::VersionType;

#[derive(Debug, Error)]
pub enum VersionError {
    /// The extraction pattern did not match the input tag.
    #[error("pattern {pattern:?} did not match {input:?}")]
    Extraction { pattern: String, input: String },

    /// The value is not a parseable version after extraction.
    #[error("not a valid version: {0:?}")]
    InvalidVersion(String),

    /// Baseline and candidate are pinned at different granularities.
    #[error("version granularity mismatch: baseline is {baseline}, candidate is {candidate}")]
    TypeMismatch {
        baseline: VersionType,
        candidate: VersionType,
    },

    #[error("invalid extraction pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}
