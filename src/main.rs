use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use disclosuresim::config::ExperimentConfig;
use disclosuresim::config_loader::{self, CliOverrides};
use disclosuresim::experiment::{self, ExperimentReport, ReportMetadata};

/// Disclosure attack simulations against Tor-like overlays
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to the experiment configuration YAML file
    #[arg(short, long, global = true, default_value = "experiment.yaml")]
    config: PathBuf,

    /// Output directory for reports
    #[arg(short, long, global = true, default_value = "disclosuresim_output")]
    output: PathBuf,

    /// Override the number of replicas
    #[arg(short, long, global = true)]
    replicas: Option<usize>,

    /// Override the base seed
    #[arg(short, long, global = true)]
    seed: Option<u64>,

    /// Number of parallel workers (0 = auto-detect)
    #[arg(short = 'j', long, global = true)]
    threads: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Run the replicas and write JSON and text reports
    Run,

    /// Load and validate the configuration only
    Check,

    /// Re-run the experiment for each server count
    Sweep {
        /// Server counts to sweep over
        #[arg(long, value_delimiter = ',', required = true)]
        num_servers: Vec<usize>,
    },
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            replicas: self.replicas,
            seed: self.seed,
            threads: self.threads,
            log_level: self.log_level.clone(),
        }
    }
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    let mut config = config_loader::load_config(&args.config)?;
    config_loader::apply_overrides(&mut config, &args.overrides())?;

    // CLI flag wins over the file, which wins over "info"
    let level = config.general.log_level.clone().unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    info!("Configuration file: {:?}", args.config);
    info!("Output directory: {:?}", args.output);

    let (report, stem) = match &args.command {
        Command::Check => {
            info!(
                "Configuration is valid: {} scenario, {} adversary, {} replicas",
                config.scenario.name(),
                config.adversary.name(),
                config.general.replicas
            );
            return Ok(());
        }
        Command::Run => {
            prepare(&config, &args.output)?;
            (run(&config, &args.config), "experiment")
        }
        Command::Sweep { num_servers } => {
            prepare(&config, &args.output)?;
            let report = ExperimentReport {
                metadata: ReportMetadata::new(&config, &args.config),
                config: config.clone(),
                summaries: experiment::sweep(&config, num_servers)?,
                replicas: Vec::new(),
            };
            (report, "sweep")
        }
    };

    experiment::generate_json_report(&report, &args.output.join(format!("{}_report.json", stem)))?;
    experiment::generate_text_report(&report, &args.output.join(format!("{}_report.txt", stem)))?;
    experiment::print_summary(&report);

    Ok(())
}

/// Size the worker pool and create the output directory
fn prepare(config: &ExperimentConfig, output: &Path) -> Result<()> {
    if config.general.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.general.threads)
            .build_global()
            .wrap_err("Failed to configure thread pool")?;
    }

    fs::create_dir_all(output)
        .wrap_err_with(|| format!("Failed to create output directory: {}", output.display()))?;
    Ok(())
}

fn run(config: &ExperimentConfig, config_path: &Path) -> ExperimentReport {
    let batch = experiment::run_replicas(config);
    let summary = experiment::summarize(config, &batch);
    ExperimentReport {
        metadata: ReportMetadata::new(config, config_path),
        config: config.clone(),
        summaries: vec![summary],
        replicas: batch.outcomes,
    }
}
