//! tagsweep keeps version references in YAML manifests up to date:
//! container image tags in kustomization files, Helm chart versions in
//! cluster configs and action versions in GitHub workflows.

pub mod config;
pub mod document;
pub mod orchestrator;
pub mod pipeline;
pub mod resolve;
pub mod sources;
pub mod version;

pub use config::Config;
pub use orchestrator::{Orchestrator, RunReport};
pub use pipeline::PipelineKind;
