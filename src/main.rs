mod app;
mod config;
mod db;
mod domain;
mod error;
mod infrastructure;
mod notify;
mod platform;
mod policy;
mod tasks;
#[cfg(test)]
mod testing;

use anyhow::Result;
use infrastructure::{directories, logging, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config()?;
    let paths = directories::ensure_directories(&config.directories)?;
    logging::init_tracing(&config.logging, &paths)?;

    let shutdown = shutdown::Shutdown::new();
    shutdown::install_signal_handlers(&shutdown);

    let app = app::PolicyEngineApp::initialize(config, paths, shutdown).await?;
    app.run().await
}
