//! Version classification and comparison core
//!
//! Pure functions over version strings; no I/O. The per-source resolvers in
//! [`crate::sources`] enumerate candidate tags and delegate every accept or
//! reject decision to [`semver::compare`].
//!
//! - [`semver`]: canonicalization, granularity classification, comparison
//! - [`extract`]: named-capture-group extraction for non-standard tags
//! - [`error`]: the version error taxonomy

pub mod error;
pub mod extract;
pub mod semver;

pub use error::VersionError;
pub use extract::ExtractionRule;
pub use semver::{Comparison, ReleaseClass, UpdateOptions, VersionType};
