use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tagsweep::config::{Config, LogFormat};
use tagsweep::orchestrator::Orchestrator;
use tagsweep::pipeline::PipelineKind;

#[derive(Parser)]
#[command(name = "tagsweep")]
#[command(version, about = "Updates version references in YAML manifests")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Update version references in manifests under the given directories
    Update {
        /// Which manifests to update
        #[arg(value_enum)]
        target: UpdateTarget,
        /// Directories to scan
        #[arg(required = true)]
        roots: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum UpdateTarget {
    All,
    Images,
    Charts,
    Workflows,
}

impl UpdateTarget {
    fn kinds(self) -> Vec<PipelineKind> {
        match self {
            UpdateTarget::All => PipelineKind::ALL.to_vec(),
            UpdateTarget::Images => vec![PipelineKind::Kustomization],
            UpdateTarget::Charts => vec![PipelineKind::ClusterConfig],
            UpdateTarget::Workflows => vec![PipelineKind::Workflow],
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();
    init_tracing(&config);

    match cli.command {
        Command::Update { target, roots } => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(async {
                let orchestrator = Orchestrator::new(&config);
                let report = orchestrator.run(&roots, &target.kinds()).await;
                info!(
                    files = report.files,
                    changed = report.changed,
                    failed = report.failed,
                    "run finished"
                );
                if report.failed > 0 {
                    anyhow::bail!("{} of {} files failed to update", report.failed, report.files);
                }
                Ok(())
            }),
    }
}
