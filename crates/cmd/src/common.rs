use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use diagnostics::{Level, LogOptions};
use pusher::Configuration;

/// Load and validate the configuration file, reporting acceptance.
pub fn load_configuration(path: &Path) -> Result<Configuration> {
    let config = Configuration::load(path)
        .with_context(|| format!("Configuration failed to load from file: {}", path.display()))?;
    println!("Configuration accepted");
    Ok(config)
}

/// Directory for the deployment's log file and error artifacts
pub fn log_directory(config: &Configuration, data_directory: &Path) -> PathBuf {
    pusher::first_existing_dir(&[config.log_file_location.as_path(), data_directory])
}

pub fn log_options(log_dir: &Path, deployment_id: &str, trace: bool) -> LogOptions {
    LogOptions {
        level: if trace { Level::Debug } else { Level::Info },
        log_file: Some(log_dir.join(format!("{}.log", deployment_id))),
    }
}
