//! Image tag filter for kustomization manifests
//!
//! Update rules are declared on the document itself, as a JSON array in the
//! `tagsweep.dev/images` annotation:
//!
//! ```yaml
//! metadata:
//!   annotations:
//!     tagsweep.dev/images: '[{"name": "app", "exclude-tags": ["dev"]}]'
//! ```
//!
//! Each rule may carry a `tag-regex` extraction pattern, an `exclude-tags`
//! list and an `update-strategy` (`full`, `minor` or `patch`) gating
//! upgrades to the pinned version's release class. Only `images[]` entries
//! named by a rule are updated; everything else in the manifest is left
//! alone.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::document::{Edit, YamlDocument};
use crate::pipeline::{DocumentFilter, FilterReport, PipelineError};
use crate::resolve::{ResolveOptions, Resolver};
use crate::sources::ImageRef;
use crate::version::{ExtractionRule, ReleaseClass, UpdateOptions};

pub const IMAGES_ANNOTATION: &str = "tagsweep.dev/images";

#[derive(Deserialize)]
struct RawImageRule {
    name: String,
    #[serde(rename = "tag-regex", default)]
    tag_regex: Option<String>,
    #[serde(rename = "exclude-tags", default)]
    exclude_tags: Vec<String>,
    #[serde(rename = "update-strategy", default)]
    update_strategy: Option<String>,
}

/// A compiled per-image update rule.
#[derive(Debug)]
pub(crate) struct ImageRule {
    extraction: Option<ExtractionRule>,
    excludes: HashSet<String>,
    release_class_gate: Option<ReleaseClass>,
}

impl ImageRule {
    pub(crate) fn to_options(&self) -> ResolveOptions {
        ResolveOptions {
            excludes: self.excludes.clone(),
            update: UpdateOptions {
                extraction: self.extraction.clone(),
                release_class_gate: self.release_class_gate,
            },
        }
    }

    pub(crate) fn extraction(&self) -> Option<&ExtractionRule> {
        self.extraction.as_ref()
    }
}

/// Reads and compiles the update rules annotated on a document, keyed by
/// image name in annotation order. Returns an empty map when the annotation
/// is absent; a malformed annotation is an error for the whole document.
pub(crate) fn image_rules(
    doc: &YamlDocument,
) -> Result<IndexMap<String, ImageRule>, PipelineError> {
    let annotations = doc
        .lookup(doc.root(), &["metadata", "annotations"])
        .or_else(|| doc.get(doc.root(), "annotations"));
    let Some(value) = annotations
        .and_then(|node| doc.get(node, IMAGES_ANNOTATION))
        .and_then(|node| doc.scalar(node))
    else {
        return Ok(IndexMap::new());
    };

    let raw: Vec<RawImageRule> = serde_json::from_str(&value.value).map_err(|e| {
        PipelineError::InvalidRules(format!("{IMAGES_ANNOTATION} is not a valid rule list: {e}"))
    })?;

    let mut rules = IndexMap::with_capacity(raw.len());
    for rule in raw {
        let extraction = rule
            .tag_regex
            .as_deref()
            .map(ExtractionRule::new)
            .transpose()
            .map_err(|e| {
                PipelineError::InvalidRules(format!(
                    "invalid tag-regex for image {}: {e}",
                    rule.name
                ))
            })?;
        let release_class_gate = match rule.update_strategy.as_deref() {
            None => None,
            Some(strategy) => match strategy.to_ascii_lowercase().as_str() {
                "full" => None,
                "minor" => Some(ReleaseClass::Minor),
                "patch" => Some(ReleaseClass::Patch),
                other => {
                    return Err(PipelineError::InvalidRules(format!(
                        "invalid update-strategy {other:?} for image {}: \
                         must be one of full, minor, patch",
                        rule.name
                    )));
                }
            },
        };
        rules.insert(
            rule.name,
            ImageRule {
                extraction,
                excludes: rule.exclude_tags.into_iter().collect(),
                release_class_gate,
            },
        );
    }
    Ok(rules)
}

/// Rewrites `images[].newTag` in kustomization manifests according to the
/// document's annotated rules.
pub struct ImageTagFilter {
    resolver: Arc<dyn Resolver<ImageRef>>,
}

impl ImageTagFilter {
    pub fn new(resolver: Arc<dyn Resolver<ImageRef>>) -> Self {
        Self { resolver }
    }
}

struct Target {
    reference: ImageRef,
    opts: ResolveOptions,
    range: Range<usize>,
    current: String,
}

#[async_trait::async_trait]
impl DocumentFilter for ImageTagFilter {
    fn name(&self) -> &'static str {
        "images"
    }

    async fn apply(&self, doc: &YamlDocument) -> Result<FilterReport, PipelineError> {
        let rules = image_rules(doc)?;
        let mut report = FilterReport::default();
        if rules.is_empty() {
            return Ok(report);
        }

        let mut targets = Vec::new();
        if let Some(images) = doc.get(doc.root(), "images") {
            for item in doc.items(images) {
                let Some(name) = doc.get(item, "name").and_then(|n| doc.scalar(n)) else {
                    warn!("images entry without a name, skipping");
                    continue;
                };
                let Some(rule) = rules.get(&name.value) else {
                    debug!(image = name.value, "no update rule for image");
                    continue;
                };
                let Some(tag) = doc.get(item, "newTag").and_then(|n| doc.scalar(n)) else {
                    debug!(image = name.value, "image has no newTag, skipping");
                    continue;
                };
                let reference_name = doc
                    .get(item, "newName")
                    .and_then(|n| doc.scalar(n))
                    .map(|s| s.value)
                    .unwrap_or_else(|| name.value.clone());
                targets.push(Target {
                    reference: ImageRef {
                        name: reference_name,
                        tag: tag.value.clone(),
                    },
                    opts: rule.to_options(),
                    range: tag.range,
                    current: tag.value,
                });
            }
        }

        for target in targets {
            match self.resolver.resolve(&target.reference, &target.opts).await {
                Ok(Some(tag)) if tag != target.current => {
                    debug!(
                        image = target.reference.name,
                        from = target.current,
                        to = tag,
                        "updating image tag"
                    );
                    report.edits.push(Edit {
                        range: target.range,
                        value: tag,
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    error!(image = target.reference.name, error = %err, "failed to resolve image tag");
                    report.failed_entries += 1;
                }
            }
        }
        Ok(report)
    }
}
