//! Document filters and the per-file update pipeline
//!
//! A [`Pipeline`] is an ordered chain of [`DocumentFilter`]s for one kind of
//! manifest. Each filter inspects the parsed document, resolves the
//! references it understands and returns byte-range edits; the pipeline
//! commits the edits between filters so later filters observe earlier
//! rewrites.

use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::document::{DocumentError, Edit, YamlDocument};

pub mod charts;
pub mod images;
pub mod labels;
pub mod workflows;

pub use charts::ChartVersionFilter;
pub use images::ImageTagFilter;
pub use labels::RecommendedLabelsFilter;
pub use workflows::WorkflowActionFilter;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("invalid update rules: {0}")]
    InvalidRules(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of one filter pass: the edits to splice plus the number of
/// entries whose resolution failed (logged, not fatal).
#[derive(Debug, Default)]
pub struct FilterReport {
    pub edits: Vec<Edit>,
    pub failed_entries: usize,
}

/// One rewriting concern applied to a parsed document.
#[async_trait::async_trait]
pub trait DocumentFilter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(&self, doc: &YamlDocument) -> Result<FilterReport, PipelineError>;
}

/// The kinds of manifest the tool rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Kustomization,
    ClusterConfig,
    Workflow,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 3] = [
        PipelineKind::Kustomization,
        PipelineKind::ClusterConfig,
        PipelineKind::Workflow,
    ];
}

/// Classifies a file path by name and location.
pub fn detect_pipeline_kind(path: &Path) -> Option<PipelineKind> {
    let file_name = path.file_name()?.to_str()?;
    match file_name {
        "kustomization.yaml" | "kustomization.yml" => {
            return Some(PipelineKind::Kustomization);
        }
        "cluster.yaml" => return Some(PipelineKind::ClusterConfig),
        _ => {}
    }
    if matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml")) {
        let mut ancestors = path.iter().rev().skip(1);
        if ancestors.next().and_then(|s| s.to_str()) == Some("workflows")
            && ancestors.next().and_then(|s| s.to_str()) == Some(".github")
        {
            return Some(PipelineKind::Workflow);
        }
    }
    None
}

/// Outcome of running a pipeline over one document.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub source: String,
    pub changed: bool,
    pub failed_entries: usize,
}

/// An ordered filter chain for one manifest kind.
pub struct Pipeline {
    filters: Vec<Box<dyn DocumentFilter>>,
}

impl Pipeline {
    pub fn new(filters: Vec<Box<dyn DocumentFilter>>) -> Self {
        Self { filters }
    }

    /// Runs every filter over the document, committing edits between
    /// filters.
    pub async fn run(&self, source: String) -> Result<PipelineOutcome, PipelineError> {
        let mut doc = YamlDocument::parse(source)?;
        let mut changed = false;
        let mut failed_entries = 0;
        for filter in &self.filters {
            let report = filter.apply(&doc).await?;
            failed_entries += report.failed_entries;
            if report.edits.is_empty() {
                continue;
            }
            debug!(filter = filter.name(), edits = report.edits.len(), "applying edits");
            doc = doc.apply(report.edits)?;
            changed = true;
        }
        Ok(PipelineOutcome {
            source: doc.into_source(),
            changed,
            failed_entries,
        })
    }

    /// Runs the pipeline over a file, writing it back only when the content
    /// changed.
    pub async fn run_file(&self, path: &Path) -> Result<PipelineOutcome, PipelineError> {
        let source = tokio::fs::read_to_string(path).await?;
        let outcome = self.run(source).await?;
        if outcome.changed {
            tokio::fs::write(path, &outcome.source).await?;
        }
        Ok(outcome)
    }
}
