use anyhow::{Result, anyhow};
use diagnostics::*;
use pusher::{FileMarkerStore, WatermarkError, WatermarkStore};

use crate::cli::StopArgs;
use crate::common::{load_configuration, log_options};

/// Remove the deployment marker; the running pusher exits at its next cycle.
pub fn stop_command(args: &StopArgs) -> Result<()> {
    println!("Stopping deployment id: {}", args.deployment_id);
    let config = load_configuration(&args.config_file)?;
    let log_dir = pusher::first_existing_dir(&[config.log_file_location.as_path()]);
    diagnostics::init(log_options(&log_dir, &args.deployment_id, false));

    let watermarks = WatermarkStore::new(FileMarkerStore::new(&config.deployment_location));
    match watermarks.stop(&args.deployment_id) {
        Ok(()) => {
            info!("{id} is now going to be stopped on the pusher.", id: args.deployment_id.as_str());
            println!("Archival for deployment id {} will be stopped", args.deployment_id);
            Ok(())
        }
        Err(WatermarkError::NotRunning(id)) => Err(anyhow!(
            "Cannot stop. No archival started for deployment_id {}",
            id
        )),
        Err(WatermarkError::NoDeployments) => Err(anyhow!("No deployments being archived.")),
        Err(e) => Err(e.into()),
    }
}
