use std::path::Path;

use tracing::{info, warn};

use storehouse::{format_bytes, Config, WebServer};

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("storehouse: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let (mut config, load_error) = if Path::new(CONFIG_PATH).exists() {
        match Config::load(CONFIG_PATH) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    } else {
        (Config::default(), None)
    };
    config.apply_env_overrides()?;
    config.validate()?;

    // Initialize logging
    if let Err(e) = storehouse::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        storehouse::logging::init_console_only(&config.logging.level);
    }

    if let Some(e) = load_error {
        warn!(error = %e, "Failed to load {CONFIG_PATH}, using default configuration");
    }

    let server = WebServer::new(&config)?;

    info!("Storehouse - sandboxed file storage");
    info!(
        "Server configured on {}:{}",
        config.server.host, config.server.port
    );
    info!(
        "Storage root: {}",
        server.app_state().storage.root().path().display()
    );
    info!(
        "Upload quota: {} per {}s, max file size {}, max {} files per batch",
        config.limits.max_uploads_per_window,
        config.limits.window_secs,
        format_bytes(config.limits.max_file_size),
        config.limits.max_files_per_batch
    );
    if config.web.diagnostic_errors {
        warn!("Diagnostic errors enabled: internal error text is sent to clients");
    }

    server.run().await?;
    Ok(())
}
