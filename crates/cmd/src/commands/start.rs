use anyhow::{Context, Result, anyhow};
use archive::{ArchiveClient, DeviceAuthorizer, TokenPair, TokenRefresher, UploadMode};
use diagnostics::*;
use pusher::{
    Configuration, Delivery, FileMarkerStore, PushSettings, Pusher, Scanner, TokenManager,
    TransferLog, WatermarkError, WatermarkPolicy, WatermarkStore,
};

use crate::cli::StartArgs;
use crate::common::{load_configuration, log_directory, log_options};

pub type FilePusher = Pusher<ArchiveClient, TokenRefresher, FileMarkerStore>;

/// `start` and `recovery`: register the deployment, authenticate, and push
/// until the deployment is stopped.
pub fn start_command(args: &StartArgs, mode: UploadMode) -> Result<()> {
    let config = load_configuration(&args.config_file)?;
    let log_dir = log_directory(&config, &args.data_directory);
    diagnostics::init(log_options(&log_dir, &args.deployment_id, args.trace));

    info!(
        "Current apds-pusher version: {version}",
        version: env!("CARGO_PKG_VERSION")
    );
    info!(
        "{mode} archival for {id}: production={production} dry_run={dry_run} recursive={recursive}",
        mode: mode.to_string(),
        id: args.deployment_id.as_str(),
        production: args.is_production(),
        dry_run: args.is_dry_run(),
        recursive: args.is_recursive()
    );

    let watermarks = WatermarkStore::new(FileMarkerStore::new(&config.deployment_location));
    match watermarks.start(&args.deployment_id) {
        Ok(_) => println!("Archival for deployment id {} started", args.deployment_id),
        Err(WatermarkError::AlreadyRunning(id)) => {
            return Err(anyhow!(
                "Cannot re-start. Archival is going on for deployment_id {}",
                id
            ));
        }
        Err(e) => return Err(e).context("Failed to register the deployment"),
    }

    let delivery = if args.is_dry_run() {
        info!("{id} is set to dry run", id: args.deployment_id.as_str());
        Delivery::DryRun
    } else {
        match authenticate(&config) {
            Ok(tokens) => Delivery::Upload {
                mode,
                tokens: TokenManager::new(refresher(&config)?, tokens),
            },
            Err(e) => {
                // Leave no marker behind so the operator can simply retry
                if let Err(stop_err) = watermarks.stop(&args.deployment_id) {
                    warn!("Could not release deployment marker: {err}", err: stop_err.to_string().as_str());
                }
                return Err(e);
            }
        }
    };

    let mut pusher = build_pusher(args, &config, delivery, watermarks, &log_dir)?;
    debug!(
        "Starting the pusher for {id} using data from {dir}",
        id: args.deployment_id.as_str(),
        dir: args.data_directory.display().to_string()
    );
    pusher.run();
    Ok(())
}

pub fn build_pusher(
    args: &StartArgs,
    config: &Configuration,
    delivery: Delivery<TokenRefresher>,
    watermarks: WatermarkStore<FileMarkerStore>,
    log_dir: &std::path::Path,
) -> Result<FilePusher> {
    let archive = ArchiveClient::new(&config.bodc_archive_url)
        .with_context(|| format!("Invalid archive URL {}", config.bodc_archive_url))?;

    let transfer_log = TransferLog::for_deployment(
        &[config.save_file_location.as_path(), args.data_directory.as_path()],
        &args.deployment_id,
    );
    info!("File Logger located at: {path}", path: transfer_log.path().display().to_string());

    let policy = if args.strict_watermark {
        WatermarkPolicy::Strict
    } else {
        WatermarkPolicy::Always
    };

    Ok(Pusher::new(
        archive,
        delivery,
        watermarks,
        Scanner::new(&args.data_directory, config.file_formats.clone(), args.is_recursive()),
        transfer_log,
        PushSettings {
            deployment_id: args.deployment_id.clone(),
            interval: config.interval(),
            policy,
            error_dir: log_dir.to_path_buf(),
        },
    ))
}

fn refresher(config: &Configuration) -> Result<TokenRefresher> {
    TokenRefresher::for_tenant(
        &config.auth0_tenant,
        config.client_id.clone(),
        config.client_secret.clone(),
    )
    .context("Failed to create token refresher")
}

/// Device-code handshake; the operator authorizes in a browser.
fn authenticate(config: &Configuration) -> Result<TokenPair> {
    let authorizer = DeviceAuthorizer::for_tenant(
        &config.auth0_tenant,
        config.client_id.clone(),
        config.client_secret.clone(),
        config.auth2_audience.clone(),
    )
    .context("Failed to create device authorizer")?;

    let grant = authorizer.request_code()?;
    println!("URL to authenticate: {}", grant.verification_uri);
    println!("User code: {}", grant.user_code);
    println!("Expires in: {} seconds", grant.expires_in.as_secs());

    let tokens = authorizer.await_tokens(&grant)?;
    debug!("Auth setup complete");
    Ok(tokens)
}
