//! Action version filter for GitHub workflow files
//!
//! Rewrites `jobs.*.steps[].uses` references of the `owner/repo@version`
//! shape. Local actions, `docker://` images and subdirectory actions are
//! left alone.

use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, error};

use crate::document::{Edit, YamlDocument};
use crate::pipeline::{DocumentFilter, FilterReport, PipelineError};
use crate::resolve::{ResolveOptions, Resolver};
use crate::sources::ActionRef;

pub struct WorkflowActionFilter {
    resolver: Arc<dyn Resolver<ActionRef>>,
}

impl WorkflowActionFilter {
    pub fn new(resolver: Arc<dyn Resolver<ActionRef>>) -> Self {
        Self { resolver }
    }
}

struct Target {
    reference: ActionRef,
    range: Range<usize>,
}

#[async_trait::async_trait]
impl DocumentFilter for WorkflowActionFilter {
    fn name(&self) -> &'static str {
        "workflows"
    }

    async fn apply(&self, doc: &YamlDocument) -> Result<FilterReport, PipelineError> {
        let mut report = FilterReport::default();
        let Some(jobs) = doc.get(doc.root(), "jobs") else {
            return Ok(report);
        };

        let mut targets = Vec::new();
        for (job_name, job) in doc.fields(jobs) {
            let Some(steps) = doc.get(job, "steps") else {
                continue;
            };
            for step in doc.items(steps) {
                let Some(uses) = doc.get(step, "uses").and_then(|n| doc.scalar(n)) else {
                    continue;
                };
                let name = uses.value.split('@').next().unwrap_or("");
                if name.split('/').count() != 2 {
                    debug!(job = job_name, uses = uses.value, "not a repository action, skipping");
                    continue;
                }
                let reference = match ActionRef::parse(&uses.value) {
                    Ok(reference) => reference,
                    Err(err) => {
                        debug!(job = job_name, uses = uses.value, error = %err, "unparseable action reference, skipping");
                        continue;
                    }
                };
                targets.push(Target {
                    reference,
                    range: uses.range,
                });
            }
        }

        let opts = ResolveOptions::default();
        for target in targets {
            match self.resolver.resolve(&target.reference, &opts).await {
                Ok(Some(version)) if version != target.reference.version => {
                    let mut updated = target.reference.clone();
                    updated.version = version;
                    debug!(from = %target.reference, to = %updated, "updating action reference");
                    report.edits.push(Edit {
                        range: target.range,
                        value: updated.to_string(),
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    error!(action = %target.reference, error = %err, "failed to resolve action version");
                    report.failed_entries += 1;
                }
            }
        }
        Ok(report)
    }
}
