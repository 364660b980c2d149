//! Recommended-labels filter for kustomization manifests
//!
//! Keeps `app.kubernetes.io/version` in sync with the tag pinned for the
//! image named by `app.kubernetes.io/name`. Runs after the image filter so
//! it observes freshly rewritten tags. Purely local, no resolver involved.

use tracing::debug;

use crate::document::{Edit, YamlDocument};
use crate::pipeline::images::image_rules;
use crate::pipeline::{DocumentFilter, FilterReport, PipelineError};
use crate::version::semver::{self, UpdateOptions};

pub const NAME_LABEL: &str = "app.kubernetes.io/name";
pub const VERSION_LABEL: &str = "app.kubernetes.io/version";

#[derive(Default)]
pub struct RecommendedLabelsFilter;

#[async_trait::async_trait]
impl DocumentFilter for RecommendedLabelsFilter {
    fn name(&self) -> &'static str {
        "labels"
    }

    async fn apply(&self, doc: &YamlDocument) -> Result<FilterReport, PipelineError> {
        let rules = image_rules(doc)?;
        let mut report = FilterReport::default();

        let Some(labels) = doc.get(doc.root(), "labels") else {
            return Ok(report);
        };

        for item in doc.items(labels) {
            let Some(pairs) = doc.get(item, "pairs") else {
                continue;
            };
            let Some(name) = doc.get(pairs, NAME_LABEL).and_then(|n| doc.scalar(n)) else {
                continue;
            };
            let Some(tag) = pinned_tag(doc, &name.value) else {
                debug!(name = name.value, "no pinned image for labelled name");
                continue;
            };

            let opts = UpdateOptions {
                extraction: rules
                    .get(&name.value)
                    .and_then(|rule| rule.extraction().cloned()),
                ..Default::default()
            };
            let canonical = match semver::canonical(&tag, &opts) {
                Ok(canonical) => canonical,
                Err(err) => {
                    debug!(name = name.value, tag, error = %err, "tag has no canonical form");
                    continue;
                }
            };

            match doc.pair(pairs, VERSION_LABEL) {
                Some(version_pair) => match version_pair.child_by_field_name("value") {
                    Some(value) => match doc.scalar(value) {
                        Some(version) if version.value == canonical => {}
                        Some(version) => report.edits.push(Edit {
                            range: version.range,
                            value: canonical,
                        }),
                        // Non-scalar value, leave the block alone.
                        None => {}
                    },
                    None => {
                        // The key exists without a value; fill it in rather
                        // than inserting a duplicate key.
                        let end = version_pair.end_byte();
                        report.edits.push(Edit {
                            range: end..end,
                            value: format!(" {canonical}"),
                        });
                    }
                },
                None => {
                    // Insert the version label right below the name label,
                    // at the same indentation.
                    let Some(name_pair) = doc.pair(pairs, NAME_LABEL) else {
                        continue;
                    };
                    let indent = " ".repeat(name_pair.start_position().column);
                    let end = name_pair.end_byte();
                    report.edits.push(Edit {
                        range: end..end,
                        value: format!("\n{indent}{VERSION_LABEL}: {canonical}"),
                    });
                }
            }
        }
        Ok(report)
    }
}

/// The `newTag` currently pinned for an image name in `images[]`.
fn pinned_tag(doc: &YamlDocument, name: &str) -> Option<String> {
    let images = doc.get(doc.root(), "images")?;
    for item in doc.items(images) {
        let Some(entry_name) = doc.get(item, "name").and_then(|n| doc.scalar(n)) else {
            continue;
        };
        if entry_name.value == name {
            return doc.get(item, "newTag").and_then(|n| doc.scalar(n)).map(|s| s.value);
        }
    }
    None
}
