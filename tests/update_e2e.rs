//! End-to-end update runs over a real directory tree with fake resolvers.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tagsweep::orchestrator::{Orchestrator, RunReport};
use tagsweep::pipeline::PipelineKind;
use tagsweep::resolve::{ResolveError, ResolveOptions, Resolver, SourceError, select_latest};
use tagsweep::sources::{ActionRef, ChartRef, ImageRef};

const KUSTOMIZATION: &str = r#"# deploy manifest
apiVersion: kustomize.config.k8s.io/v1beta1
kind: Kustomization
metadata:
  annotations:
    tagsweep.dev/images: '[{"name": "app", "exclude-tags": ["v1.3.0"]}]'
images:
- name: app
  newName: registry.example.com/team/app
  newTag: v1.2.3
labels:
- pairs:
    app.kubernetes.io/name: app
    app.kubernetes.io/version: v1.2.3
"#;

const CLUSTER: &str = "\
apiVersion: k0sctl.k0sproject.io/v1beta1
kind: Cluster
spec:
  k0s:
    config:
      spec:
        extensions:
          helm:
            repositories:
            - name: metallb
              url: https://metallb.github.io/metallb
            charts:
            - name: metallb
              chartname: metallb/metallb
              version: v0.14.8
";

const WORKFLOW: &str = "\
name: ci
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
    - uses: actions/checkout@v3 # pinned
    - run: make build
";

struct FakeSource {
    candidates: Vec<String>,
}

impl FakeSource {
    fn new(candidates: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            candidates: candidates.iter().map(|s| s.to_string()).collect(),
        })
    }
}

#[async_trait::async_trait]
impl Resolver<ImageRef> for FakeSource {
    async fn resolve(
        &self,
        reference: &ImageRef,
        opts: &ResolveOptions,
    ) -> Result<Option<String>, ResolveError> {
        Ok(select_latest(&reference.tag, &self.candidates, opts)?)
    }
}

#[async_trait::async_trait]
impl Resolver<ChartRef> for FakeSource {
    async fn resolve(
        &self,
        reference: &ChartRef,
        opts: &ResolveOptions,
    ) -> Result<Option<String>, ResolveError> {
        Ok(select_latest(&reference.version, &self.candidates, opts)?)
    }
}

#[async_trait::async_trait]
impl Resolver<ActionRef> for FakeSource {
    async fn resolve(
        &self,
        reference: &ActionRef,
        opts: &ResolveOptions,
    ) -> Result<Option<String>, ResolveError> {
        Ok(select_latest(&reference.version, &self.candidates, opts)?)
    }
}

struct UnreachableSource;

#[async_trait::async_trait]
impl Resolver<ImageRef> for UnreachableSource {
    async fn resolve(
        &self,
        reference: &ImageRef,
        _opts: &ResolveOptions,
    ) -> Result<Option<String>, ResolveError> {
        Err(ResolveError::Source(SourceError::NotFound(
            reference.name.clone(),
        )))
    }
}

fn write_tree(root: &Path) {
    fs::create_dir_all(root.join("deploy")).unwrap();
    fs::create_dir_all(root.join(".github/workflows")).unwrap();
    fs::write(root.join("deploy/kustomization.yaml"), KUSTOMIZATION).unwrap();
    fs::write(root.join("cluster.yaml"), CLUSTER).unwrap();
    fs::write(root.join(".github/workflows/ci.yaml"), WORKFLOW).unwrap();
}

fn healthy_orchestrator() -> Orchestrator {
    Orchestrator::with_resolvers(
        FakeSource::new(&["v1.2.4", "v1.3.0"]),
        FakeSource::new(&["v0.14.8", "v0.14.9"]),
        FakeSource::new(&["v3", "v4"]),
    )
}

#[tokio::test]
async fn updates_every_manifest_kind_in_one_run() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path());

    let report = healthy_orchestrator()
        .run(&[dir.path().to_path_buf()], &PipelineKind::ALL)
        .await;
    assert_eq!(
        report,
        RunReport {
            files: 3,
            changed: 3,
            failed: 0,
        }
    );

    let kustomization =
        fs::read_to_string(dir.path().join("deploy/kustomization.yaml")).unwrap();
    // v1.3.0 is excluded by the annotation, so the rewrite stops at v1.2.4,
    // and the labels filter sees the fresh tag.
    assert!(kustomization.contains("newTag: v1.2.4"));
    assert!(kustomization.contains("app.kubernetes.io/version: v1.2.4"));
    assert!(kustomization.starts_with("# deploy manifest\n"));

    let cluster = fs::read_to_string(dir.path().join("cluster.yaml")).unwrap();
    assert!(cluster.contains("version: v0.14.9"));

    let workflow = fs::read_to_string(dir.path().join(".github/workflows/ci.yaml")).unwrap();
    assert!(workflow.contains("uses: actions/checkout@v4 # pinned"));
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path());
    let roots = [dir.path().to_path_buf()];

    healthy_orchestrator().run(&roots, &PipelineKind::ALL).await;
    let before = fs::read_to_string(dir.path().join("deploy/kustomization.yaml")).unwrap();

    let report = healthy_orchestrator().run(&roots, &PipelineKind::ALL).await;
    assert_eq!(
        report,
        RunReport {
            files: 3,
            changed: 0,
            failed: 0,
        }
    );
    let after = fs::read_to_string(dir.path().join("deploy/kustomization.yaml")).unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn failing_source_does_not_stop_sibling_files() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path());

    let orchestrator = Orchestrator::with_resolvers(
        Arc::new(UnreachableSource),
        FakeSource::new(&["v0.14.8", "v0.14.9"]),
        FakeSource::new(&["v3", "v4"]),
    );
    let report = orchestrator
        .run(&[dir.path().to_path_buf()], &PipelineKind::ALL)
        .await;
    assert_eq!(
        report,
        RunReport {
            files: 3,
            changed: 2,
            failed: 1,
        }
    );

    let kustomization =
        fs::read_to_string(dir.path().join("deploy/kustomization.yaml")).unwrap();
    assert_eq!(kustomization, KUSTOMIZATION);
    let cluster = fs::read_to_string(dir.path().join("cluster.yaml")).unwrap();
    assert!(cluster.contains("version: v0.14.9"));
}

#[tokio::test]
async fn kind_selection_limits_which_files_are_touched() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path());

    let report = healthy_orchestrator()
        .run(&[dir.path().to_path_buf()], &[PipelineKind::Workflow])
        .await;
    assert_eq!(
        report,
        RunReport {
            files: 1,
            changed: 1,
            failed: 0,
        }
    );

    let kustomization =
        fs::read_to_string(dir.path().join("deploy/kustomization.yaml")).unwrap();
    assert_eq!(kustomization, KUSTOMIZATION);
}
