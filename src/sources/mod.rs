//! Candidate version sources
//!
//! One module per external source: container registries ([`image`]), Helm
//! chart repositories ([`chart`]) and GitHub repository tags ([`action`]).
//! Each exposes a listing trait for its HTTP client plus a [`Resolver`]
//! implementation that feeds the listing into the version core.
//!
//! [`Resolver`]: crate::resolve::Resolver

pub mod action;
pub mod chart;
pub mod image;
pub mod rate_limit;

pub use action::{ActionRef, ActionResolver, GitHubClient};
pub use chart::{ChartRef, ChartResolver, HelmRepoClient};
pub use image::{ImageRef, ImageResolver, RegistryClient};

pub(crate) const USER_AGENT: &str = concat!("tagsweep/", env!("CARGO_PKG_VERSION"));
