mod bot;
mod circuit;
mod config;
mod journal;
mod ledger;

use anyhow::{bail, Result};
use bot::Bot;
use config::AppConfig;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load config
    let config = AppConfig::load("config.toml")?;
    info!(
        universe = config.universe.len(),
        paper = config.broker.use_paper,
        "Loaded configuration"
    );

    let mode = std::env::args().nth(1).unwrap_or_else(|| "run".to_string());
    let mut bot = Bot::new(config).await?;
    match mode.as_str() {
        // Scheduled trading cycles.
        "run" => bot.run().await?,
        // Weekend hypothesis exploration, one shot.
        "explore" => bot.run_exploration().await?,
        other => bail!("unknown mode '{}'; expected run|explore", other),
    }

    Ok(())
}
