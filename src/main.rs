use anyhow::{Context, Result};
use env_logger::Env;
use log::{info, warn};
use std::sync::Arc;

use taqvim::{api_server, sweeper, Clock, Config, LogDispatcher, Services, Store, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        // A missing .env file is the normal case
        if !e.not_found() {
            eprintln!("Failed to read .env: {}", e);
        }
    }

    // Initialize logging with custom format
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use chrono::Local;
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    info!("Starting taqvim v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load().context("Failed to load configuration")?;
    config.apply_env_overrides();

    let store = match config.storage.resolved_state_dir() {
        Some(dir) => {
            info!("Persisting state under {}", dir.display());
            Store::open(&dir).context("Failed to open state directory")?
        }
        None => {
            warn!("Persistence disabled, state is kept in memory only");
            Store::in_memory()
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let services = Arc::new(Services::new(
        &config,
        Arc::new(store),
        Arc::clone(&clock),
        Arc::new(LogDispatcher),
    ));
    let sweeper = sweeper::spawn(
        services.drafts.clone(),
        clock,
        config.drafts.sweep_interval(),
    );

    let result = tokio::select! {
        result = api_server::start_api_server(&config, services) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    };

    sweeper.abort();
    result
}
