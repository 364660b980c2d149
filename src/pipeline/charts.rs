//! Chart version filter for cluster config files
//!
//! Reads the Helm extension block of a k0sctl cluster config, matches each
//! chart's `chartname` (`repo/chart`) against the declared repositories and
//! rewrites `version` when the repository publishes something newer.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::document::{Edit, YamlDocument};
use crate::pipeline::{DocumentFilter, FilterReport, PipelineError};
use crate::resolve::{ResolveOptions, Resolver};
use crate::sources::ChartRef;

pub const HELM_EXTENSIONS_PATH: [&str; 6] =
    ["spec", "k0s", "config", "spec", "extensions", "helm"];

pub struct ChartVersionFilter {
    resolver: Arc<dyn Resolver<ChartRef>>,
}

impl ChartVersionFilter {
    pub fn new(resolver: Arc<dyn Resolver<ChartRef>>) -> Self {
        Self { resolver }
    }
}

struct Target {
    reference: ChartRef,
    range: Range<usize>,
}

#[async_trait::async_trait]
impl DocumentFilter for ChartVersionFilter {
    fn name(&self) -> &'static str {
        "charts"
    }

    async fn apply(&self, doc: &YamlDocument) -> Result<FilterReport, PipelineError> {
        let mut report = FilterReport::default();
        let Some(helm) = doc.lookup(doc.root(), &HELM_EXTENSIONS_PATH) else {
            return Ok(report);
        };

        let mut repositories = HashMap::new();
        if let Some(repos) = doc.get(helm, "repositories") {
            for item in doc.items(repos) {
                let name = doc.get(item, "name").and_then(|n| doc.scalar(n));
                let url = doc.get(item, "url").and_then(|n| doc.scalar(n));
                if let (Some(name), Some(url)) = (name, url) {
                    repositories.insert(name.value, url.value);
                }
            }
        }

        let mut targets = Vec::new();
        if let Some(charts) = doc.get(helm, "charts") {
            for item in doc.items(charts) {
                let Some(chartname) = doc.get(item, "chartname").and_then(|n| doc.scalar(n))
                else {
                    warn!("chart entry without a chartname, skipping");
                    continue;
                };
                let Some((repo, chart)) = chartname.value.split_once('/') else {
                    warn!(chartname = chartname.value, "chartname is not repo/chart, skipping");
                    continue;
                };
                let Some(repository) = repositories.get(repo) else {
                    warn!(repository = repo, "chart references an undeclared repository, skipping");
                    continue;
                };
                if !repository.contains("://") {
                    warn!(repository = repo, url = repository, "repository URL has no scheme, skipping");
                    continue;
                }
                let Some(version) = doc.get(item, "version").and_then(|n| doc.scalar(n)) else {
                    debug!(chartname = chartname.value, "chart has no version, skipping");
                    continue;
                };
                targets.push(Target {
                    reference: ChartRef {
                        repository: repository.clone(),
                        name: chart.to_string(),
                        version: version.value,
                    },
                    range: version.range,
                });
            }
        }

        let opts = ResolveOptions::default();
        for target in targets {
            match self.resolver.resolve(&target.reference, &opts).await {
                Ok(Some(version)) if version != target.reference.version => {
                    debug!(
                        chart = target.reference.name,
                        from = target.reference.version,
                        to = version,
                        "updating chart version"
                    );
                    report.edits.push(Edit {
                        range: target.range,
                        value: version,
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    error!(chart = target.reference.name, error = %err, "failed to resolve chart version");
                    report.failed_entries += 1;
                }
            }
        }
        Ok(report)
    }
}
