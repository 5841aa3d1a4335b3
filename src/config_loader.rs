use crate::config::ExperimentConfig;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::Path;

/// Load and parse an experiment from a YAML file
pub fn load_config(config_path: &Path) -> Result<ExperimentConfig> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration file {:?}", config_path))?;

    let config: ExperimentConfig = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse configuration file {:?}", config_path))?;

    info!(
        "Detected {} scenario with {} adversary",
        config.scenario.name(),
        config.adversary.name()
    );

    config.validate()?;

    Ok(config)
}

/// CLI arguments that override settings from the YAML file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub replicas: Option<usize>,
    pub seed: Option<u64>,
    pub threads: Option<usize>,
    pub log_level: Option<String>,
}

/// Apply CLI overrides to an experiment configuration
pub fn apply_overrides(config: &mut ExperimentConfig, overrides: &CliOverrides) -> Result<()> {
    if let Some(replicas) = overrides.replicas {
        info!("Overriding replicas: {}", replicas);
        config.general.replicas = replicas;
    }
    if let Some(seed) = overrides.seed {
        info!("Overriding seed: {}", seed);
        config.general.seed = seed;
    }
    if let Some(threads) = overrides.threads {
        config.general.threads = threads;
    }
    if let Some(level) = &overrides.log_level {
        config.general.log_level = Some(level.clone());
    }

    // Re-validate after applying overrides
    config.validate()?;

    Ok(())
}
