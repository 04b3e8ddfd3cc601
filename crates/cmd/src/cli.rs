use std::path::PathBuf;

use anyhow::Result;
use archive::UploadMode;
use clap::{Args, Parser, Subcommand};

use crate::commands::{start_command, stop_command};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "apds-pusher")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start near-real-time archival of a deployment
    Start(StartArgs),
    /// Stop archival of a deployment
    Stop(StopArgs),
    /// Upload a recovered deployment; the first confirmed upload stops it
    Recovery(StartArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StartArgs {
    /// The code/ID for the specific deployment
    #[arg(long, value_parser = non_empty)]
    pub deployment_id: String,

    /// Directory holding the files to upload
    #[arg(long, value_parser = existing_dir)]
    pub data_directory: PathBuf,

    /// JSON configuration file
    #[arg(long, value_parser = existing_file)]
    pub config_file: PathBuf,

    /// Mark the run as production (recorded in logs)
    #[arg(long, overrides_with = "non_production")]
    pub production: bool,

    #[arg(long, overrides_with = "production")]
    pub non_production: bool,

    /// Report what would be sent without uploading
    #[arg(long, overrides_with = "no_dry_run")]
    pub dry_run: bool,

    #[arg(long, overrides_with = "dry_run")]
    pub no_dry_run: bool,

    /// Search subdirectories of the data directory (default)
    #[arg(long, overrides_with = "non_recursive")]
    pub recursive: bool,

    #[arg(long, overrides_with = "recursive")]
    pub non_recursive: bool,

    /// Advance the watermark only when every upload in a cycle succeeded
    #[arg(long)]
    pub strict_watermark: bool,

    /// Very verbose logging
    #[arg(short, long)]
    pub trace: bool,
}

impl StartArgs {
    pub fn is_production(&self) -> bool {
        self.production && !self.non_production
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run && !self.no_dry_run
    }

    pub fn is_recursive(&self) -> bool {
        !self.non_recursive
    }
}

#[derive(Args, Debug, Clone)]
pub struct StopArgs {
    /// The code/ID for the deployment to stop
    #[arg(long, value_parser = non_empty)]
    pub deployment_id: String,

    /// JSON configuration file locating the active deployments
    #[arg(long, value_parser = existing_file)]
    pub config_file: PathBuf,
}

fn non_empty(value: &str) -> Result<String, String> {
    if value.trim().is_empty() {
        Err("must not be empty".to_string())
    } else {
        Ok(value.to_string())
    }
}

fn existing_dir(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("directory '{}' does not exist", value))
    }
}

fn existing_file(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!("file '{}' does not exist", value))
    }
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Start(args) => start_command(&args, UploadMode::Nrt),
        Commands::Recovery(args) => start_command(&args, UploadMode::Recovery),
        Commands::Stop(args) => stop_command(&args),
    }
}
