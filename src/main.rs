mod cli;
use cli::{USAGE, parse_cli_mode, run};

use slot_blocker::storage::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();

    let options = match parse_cli_mode() {
        Ok(options) => options,
        Err(err) => {
            eprintln!("Error: {}", err);
            println!("{}", USAGE);
            return Ok(());
        }
    };

    let config = match Config::load_or_create() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            tracing::error!("Failed to load config: {}", e);
            return Ok(());
        }
    };

    if let Err(e) = run(options, config).await {
        tracing::error!("Command failed: {:#}", e);
        return Err(e);
    }

    Ok(())
}

fn setup_logging() {
    let log_dir = Config::config_dir();

    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, "slot-blocker.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .init();

    std::mem::forget(_guard);

    tracing::info!("slot-blocker started");
}
