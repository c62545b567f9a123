//! cdrforge: antibody variant generation and CDR diversity analysis.
//! Entry point for the command-line binary.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cdrforge_common::sandbox::SandboxClient;
use cdrforge_common::{CdrForgeError, TargetPanel};
use cdrforge_pipeline::pdb::{RcsbRepository, StructureFetcher};
use cdrforge_pipeline::regions::HttpNumberingService;
use cdrforge_pipeline::report::format_stat;
use cdrforge_pipeline::variants::HttpGenerationService;
use cdrforge_pipeline::{AntibodyPipeline, ArtifactStore, RegionAnnotator, RunSummary, VariantGenerator};
use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;

const API_KEY_ENV: &str = "CDRFORGE_API_KEY";

#[derive(Parser)]
#[command(name = "cdrforge", version, about = "Antibody variant generation and CDR diversity analysis")]
struct Cli {
    /// Configuration file (default: ./cdrforge.toml)
    #[arg(long, global = true, env = "CDRFORGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch structures, generate variants and write the report
    Run(RunArgs),
    /// Rebuild annotations and the report from persisted variants
    Report(RunArgs),
    /// Print the configured target panel
    Targets(TargetsArgs),
}

#[derive(Args)]
struct TargetsArgs {
    #[command(flatten)]
    panel: PanelArgs,

    /// Also write the selected panel as YAML
    #[arg(long)]
    export: Option<PathBuf>,
}

#[derive(Args)]
struct PanelArgs {
    /// YAML or JSON panel file replacing the configured targets
    #[arg(long)]
    targets_file: Option<PathBuf>,

    /// Restrict the run to these targets
    #[arg(long, num_args = 1..)]
    only: Vec<String>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    panel: PanelArgs,

    /// Output directory for all artifacts
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Variants requested per target
    #[arg(long)]
    variants: Option<u32>,

    /// Sampling temperature
    #[arg(long)]
    temperature: Option<f64>,
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.output_dir {
            config.pipeline.output_directory = dir.clone();
        }
        if let Some(n) = self.variants {
            config.pipeline.variant_count = n;
        }
        if let Some(t) = self.temperature {
            config.pipeline.sampling_temperature = t;
        }
    }
}

fn load_panel(config: &Config, args: &PanelArgs) -> anyhow::Result<TargetPanel> {
    let mut panel = match &args.targets_file {
        Some(path) => TargetPanel::from_path(&path.to_string_lossy())
            .with_context(|| format!("reading target panel {}", path.display()))?,
        None => config.panel(),
    };
    panel.retain_named(&args.only)?;
    panel.validate()?;
    Ok(panel)
}

/// Config value first, then the environment.
fn resolve_credential(config: &mut Config) -> Option<SecretString> {
    config.generation.api_key.take().or_else(|| {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from)
    })
}

fn build_pipeline(config: &Config, credential: Option<SecretString>) -> anyhow::Result<AntibodyPipeline> {
    let mut structure_client =
        SandboxClient::with_timeout(Duration::from_secs(config.structure.timeout_secs))?;
    structure_client.allow_url(&config.structure.base_url)?;

    let mut generation_client =
        SandboxClient::with_timeout(Duration::from_secs(config.generation.timeout_secs))?;
    generation_client.allow_url(&config.generation.endpoint)?;

    let annotator = match &config.numbering {
        Some(numbering) => {
            let mut client = structure_client.clone();
            client.allow_url(&numbering.endpoint)?;
            info!("Numbering service: {} ({})", numbering.endpoint, numbering.scheme);
            RegionAnnotator::with_numbering(
                Arc::new(HttpNumberingService::new(client, &numbering.endpoint)),
                &numbering.scheme,
            )
        }
        None => RegionAnnotator::heuristic(),
    };

    let repository = RcsbRepository::with_base_url(structure_client, &config.structure.base_url);
    let service = HttpGenerationService::new(generation_client, &config.generation.endpoint);

    Ok(AntibodyPipeline::new(
        ArtifactStore::new(&config.pipeline.output_directory),
        StructureFetcher::new(Arc::new(repository)),
        VariantGenerator::new(Arc::new(service), credential, config.pipeline.generation_params()),
        annotator,
    ))
}

fn print_summary(summary: &RunSummary) {
    println!("Run {}", summary.run_id);
    for s in &summary.report.summaries {
        println!(
            "  {:<8} {:>5} variants  score {:>8}  global {:>8}  mutations {:>8}",
            s.target,
            s.variant_count,
            format_stat(s.mean_score),
            format_stat(s.mean_global_score),
            format_stat(s.mean_mutations),
        );
    }
    for f in &summary.failures {
        println!("  {:<8} FAILED at {}: {}", f.target, f.stage, f.message);
    }
    println!("Combined dataset: {}", summary.report.combined_path.display());
    println!("Summary report:   {}", summary.report.summary_path.display());
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Targets(args) => {
            let panel = load_panel(&config, &args.panel)?;
            println!("{:<8} {:<10} {:>5} {:>5} {:>7}", "target", "structure", "heavy", "light", "antigen");
            for t in &panel.targets {
                println!(
                    "{:<8} {:<10} {:>5} {:>5} {:>7}",
                    t.name, t.structure_id, t.chains.heavy, t.chains.light, t.chains.antigen
                );
            }
            if let Some(path) = &args.export {
                panel.to_yaml(&path.to_string_lossy())?;
                info!("Panel written to {}", path.display());
            }
            Ok(())
        }
        Command::Run(args) => {
            args.apply(&mut config);
            config.validate()?;
            let panel = load_panel(&config, &args.panel)?;
            let credential = resolve_credential(&mut config);
            if credential.is_none() {
                warn!("No generation credential (set generation.api_key or {})", API_KEY_ENV);
            }

            let pipeline = build_pipeline(&config, credential)?;
            let summary = pipeline.run(&panel.targets).await?;
            print_summary(&summary);
            if summary.succeeded.is_empty() {
                anyhow::bail!("no target completed; see the failures above");
            }
            Ok(())
        }
        Command::Report(args) => {
            args.apply(&mut config);
            config.validate()?;
            let panel = load_panel(&config, &args.panel)?;

            let pipeline = build_pipeline(&config, None)?;
            let summary = pipeline.report_only(&panel.targets).await?;
            print_summary(&summary);
            if summary.succeeded.is_empty() {
                anyhow::bail!(
                    "no persisted variants under {}",
                    pipeline.store().root().display()
                );
            }
            Ok(())
        }
    }
}

/// 2 for failures that stop a run outright (missing credential, bad
/// configuration), 1 for everything else.
fn exit_status(err: &anyhow::Error) -> u8 {
    let fatal = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<CdrForgeError>())
        .any(CdrForgeError::is_fatal);
    if fatal {
        2
    } else {
        1
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cdrforge=info,info")),
        )
        .init();

    let cli = Cli::parse();
    info!("cdrforge {}", env!("CARGO_PKG_VERSION"));

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_status(&e))
        }
    }
}
