use std::process::ExitCode;

use clap::Parser;
use fiefdom::auth;
use fiefdom::config::ServerConfig;
use fiefdom::server::GameLoop;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Refuse to serve logins on a broken KDF.
    if let Err(e) = auth::self_check() {
        error!("cryptography initialization failed: {e:#}");
        return ExitCode::from(1);
    }
    info!("cryptography initialized");

    let config = ServerConfig::parse();
    info!(
        port = config.port,
        tick_rate = config.tick_rate,
        db = %config.db_path,
        "configuration loaded"
    );

    let mut game_loop = GameLoop::new(config);

    let shutdown = game_loop.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("shutdown signal received, stopping the server");
        shutdown.stop();
    }) {
        warn!("failed to install signal handler: {e}");
    }

    match game_loop.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("server terminated with an error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
