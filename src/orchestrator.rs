//! Concurrent fan-out over directory trees
//!
//! Walks the requested roots, classifies every YAML file into a pipeline
//! kind and runs one task per file. Tasks are joined with
//! `futures::future::join_all`: a failing file never cancels its siblings,
//! and per-file results are folded into a single [`RunReport`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::pipeline::{
    ChartVersionFilter, DocumentFilter, ImageTagFilter, Pipeline, PipelineKind,
    RecommendedLabelsFilter, WorkflowActionFilter, detect_pipeline_kind,
};
use crate::resolve::Resolver;
use crate::sources::{
    ActionRef, ActionResolver, ChartRef, ChartResolver, GitHubClient, HelmRepoClient, ImageRef,
    ImageResolver, RegistryClient,
};

/// Aggregate result of one run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Files matched by the requested pipeline kinds.
    pub files: usize,
    /// Files written back with updated references.
    pub changed: usize,
    /// Files with a pipeline error or at least one failed entry.
    pub failed: usize,
}

pub struct Orchestrator {
    images: Arc<dyn Resolver<ImageRef>>,
    charts: Arc<dyn Resolver<ChartRef>>,
    actions: Arc<dyn Resolver<ActionRef>>,
}

impl Orchestrator {
    pub fn new(config: &Config) -> Self {
        Self {
            images: Arc::new(ImageResolver::new(RegistryClient::new())),
            charts: Arc::new(ChartResolver::new(HelmRepoClient::new())),
            actions: Arc::new(ActionResolver::new(GitHubClient::new(
                config.github_token.clone(),
            ))),
        }
    }

    pub fn with_resolvers(
        images: Arc<dyn Resolver<ImageRef>>,
        charts: Arc<dyn Resolver<ChartRef>>,
        actions: Arc<dyn Resolver<ActionRef>>,
    ) -> Self {
        Self {
            images,
            charts,
            actions,
        }
    }

    /// Updates every matching file under the given roots.
    pub async fn run(&self, roots: &[PathBuf], kinds: &[PipelineKind]) -> RunReport {
        let mut files = Vec::new();
        for root in roots {
            collect_files(root, kinds, &mut files);
        }

        let tasks = files.iter().map(|(path, kind)| {
            let pipeline = self.pipeline_for(*kind);
            async move {
                match pipeline.run_file(path).await {
                    Ok(outcome) => {
                        if outcome.changed {
                            info!(path = %path.display(), "updated");
                        }
                        if outcome.failed_entries > 0 {
                            warn!(
                                path = %path.display(),
                                entries = outcome.failed_entries,
                                "some references could not be resolved"
                            );
                        }
                        (outcome.changed, outcome.failed_entries > 0)
                    }
                    Err(err) => {
                        error!(path = %path.display(), error = %err, "failed to update file");
                        (false, true)
                    }
                }
            }
        });

        let mut report = RunReport {
            files: files.len(),
            ..Default::default()
        };
        for (changed, failed) in join_all(tasks).await {
            if changed {
                report.changed += 1;
            }
            if failed {
                report.failed += 1;
            }
        }
        report
    }

    fn pipeline_for(&self, kind: PipelineKind) -> Pipeline {
        let filters: Vec<Box<dyn DocumentFilter>> = match kind {
            PipelineKind::Kustomization => vec![
                Box::new(ImageTagFilter::new(self.images.clone())),
                Box::new(RecommendedLabelsFilter),
            ],
            PipelineKind::ClusterConfig => {
                vec![Box::new(ChartVersionFilter::new(self.charts.clone()))]
            }
            PipelineKind::Workflow => {
                vec![Box::new(WorkflowActionFilter::new(self.actions.clone()))]
            }
        };
        Pipeline::new(filters)
    }
}

/// Recursively collects files matching the requested kinds. Hidden
/// directories are skipped, except `.github` (workflows live there).
fn collect_files(root: &Path, kinds: &[PipelineKind], out: &mut Vec<(PathBuf, PipelineKind)>) {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path = %root.display(), error = %err, "cannot read directory");
            return;
        }
    };
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else { continue };
        if file_type.is_dir() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') && name != ".github" {
                continue;
            }
            collect_files(&path, kinds, out);
        } else if file_type.is_file()
            && let Some(kind) = detect_pipeline_kind(&path)
            && kinds.contains(&kind)
        {
            out.push((path, kind));
        }
    }
}
