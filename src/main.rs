//! Armory Client
//!
//! Loads the weapon table (remote, cached, or built-in) and runs a short
//! cloud-save session against an in-memory backend.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use armory::{
    cloud::{store::STORE_FILE_NAME, CloudSession, FileStore, MemoryRemote, PlayerProfile},
    config::{ConfigLoader, ConfigSource, FileSource, HttpSource},
    ClientSettings, VERSION,
};

/// Sheet read from the data directory when no URL is configured.
const BUNDLED_SHEET: &str = "weapons.csv";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Armory Client v{}", VERSION);

    let settings = ClientSettings::from_env();
    info!("Data directory: {}", settings.data_dir.display());

    load_weapons(&settings).await?;
    demo_session(&settings).await?;

    Ok(())
}

/// Start the config loader and print the active table.
async fn load_weapons(settings: &ClientSettings) -> anyhow::Result<()> {
    let source: Arc<dyn ConfigSource> = match &settings.config_url {
        Some(url) => Arc::new(
            HttpSource::new(url.clone(), settings.loader.fetch_timeout)
                .context("Failed to build HTTP client")?,
        ),
        None => Arc::new(FileSource::new(settings.data_dir.join(BUNDLED_SHEET))),
    };
    info!("Config source: {} ({})", source.describe(), settings.loader.format);

    let loader = ConfigLoader::new(settings.loader.clone(), source);
    if let Some(Err(e)) = loader.start().await {
        warn!("Config load failed, continuing with {:?} table: {}", loader.origin(), e);
    }

    info!("=== Weapons ({:?}) ===", loader.origin());
    for weapon in loader.all_weapons().values() {
        info!("{}", weapon);
    }
    Ok(())
}

/// Sign in, save a value, read it back, submit a score.
async fn demo_session(settings: &ClientSettings) -> anyhow::Result<()> {
    info!("=== Cloud Session ===");

    let store = FileStore::open_or_empty(settings.data_dir.join(STORE_FILE_NAME))
        .context("Failed to open local store")?;
    let remote = Arc::new(MemoryRemote::new(PlayerProfile {
        id: 1,
        name: "Player".into(),
        level: 1,
    }));
    let session = CloudSession::new(settings.cloud.clone(), remote, Arc::new(store));

    session.initialize().await.context("Cloud session failed to start")?;
    if !session.is_authorized() {
        session.authorize().await.context("Authorization failed")?;
    }
    info!("Player {} ({}), level {}", session.player_name(), session.player_id(), session.player_level());

    let outcome = session.save("coins", "100", None).await;
    info!("Save: {:?}", outcome);
    info!("Loaded coins = {}", session.load("coins").await);

    if let Err(e) = session.submit_score("global", 100).await {
        warn!("Score not submitted: {}", e);
    }

    if !session.outbox().is_empty() {
        warn!("{} write(s) still pending", session.outbox().len());
    }
    Ok(())
}
