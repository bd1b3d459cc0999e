use std::process::ExitCode;

use tracing::{error, info};

use hangar::{Config, Hangar};

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = hangar::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        hangar::logging::init_console_only(&config.logging.level);
    }

    info!("Hangar - multi-tenant file hosting");

    let hangar = match Hangar::open(&config).await {
        Ok(hangar) => hangar,
        Err(e) => {
            error!(fatal = e.is_fatal(), "Failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        database = %config.database.path,
        local_path = %config.storage.local_path,
        max_file_size = config.storage.max_file_size,
        default_quota = config.storage.default_quota,
        base_url = %config.links.base_url,
        "Configuration loaded"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }

    info!("Shutting down");
    hangar.close().await;
    ExitCode::SUCCESS
}
