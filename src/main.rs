//! ALCHEMY-ARB — cross-city tier-conversion arbitrage for alchemy ingredients
//!
//! Entry point. Loads configuration, initialises structured logging, opens
//! and seeds the store, wires the engine, feed, scheduler and API, then runs
//! until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use alchemy_arb::cache::QuoteCache;
use alchemy_arb::catalog::Catalog;
use alchemy_arb::config;
use alchemy_arb::dashboard::{self, routes::ApiContext};
use alchemy_arb::engine::{
    CachedResolver, MarketIngestor, OpportunityEngine, OpportunityQueries, Scheduler,
};
use alchemy_arb::market::{AlbionDataClient, MarketFeed};
use alchemy_arb::publisher::Publisher;
use alchemy_arb::storage::{PriceStore, SqliteStore};

const BANNER: &str = r#"
    _    _      _                            _         _
   / \  | | ___| |__   ___ _ __ ___  _   _  / \   _ __| |__
  / _ \ | |/ __| '_ \ / _ \ '_ ` _ \| | | |/ _ \ | '__| '_ \
 / ___ \| | (__| | | |  __/ | | | | | |_| / ___ \| |  | |_) |
/_/   \_\_|\___|_| |_|\___|_| |_| |_|\__, /_/   \_\_|  |_.__/
                                     |___/
  Cross-city tier-conversion arbitrage
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        service = %cfg.service.name,
        database = %cfg.storage.database_url,
        interval_minutes = cfg.engine.interval_minutes,
        rollover_time = %cfg.scheduler.rollover_time,
        feed_enabled = cfg.feed.enabled,
        "ALCHEMY-ARB starting up"
    );

    // -- Store & reference data ------------------------------------------
    let sqlite = SqliteStore::connect(&cfg.storage.database_url, cfg.storage.max_connections)
        .await
        .context("Failed to open price store")?;
    sqlite
        .seed(&Catalog::seeded())
        .await
        .context("Failed to seed reference data")?;
    let catalog = Arc::new(sqlite.load_catalog().await.context("Failed to load catalog")?);
    info!(
        items = catalog.items().len(),
        cities = catalog.cities().len(),
        "Catalog loaded"
    );
    let store: Arc<dyn PriceStore> = Arc::new(sqlite);

    // -- Components --------------------------------------------------------
    let cache = Arc::new(QuoteCache::new());
    let resolver = Arc::new(CachedResolver::new(
        store.clone(),
        cache.clone(),
        cfg.cache.quote_ttl(),
    ));
    let publisher = Publisher::default();
    let engine = Arc::new(OpportunityEngine::new(
        store.clone(),
        cache.clone(),
        resolver.clone(),
        publisher.clone(),
        cfg.cache.opportunities_ttl(),
    ));
    let ingestor = Arc::new(MarketIngestor::new(
        store.clone(),
        cache.clone(),
        catalog.clone(),
        cfg.cache.quote_ttl(),
    ));
    let queries = Arc::new(OpportunityQueries::new(
        store.clone(),
        cache.clone(),
        resolver,
        catalog.clone(),
        cfg.cache.weekly_averages_ttl(),
    ));

    // -- Scheduler ---------------------------------------------------------
    let mut scheduler = Scheduler::new(
        engine,
        store.clone(),
        cfg.engine.interval(),
        cfg.scheduler.rollover_at()?,
    );
    if cfg.feed.enabled {
        let feed: Arc<dyn MarketFeed> = Arc::new(AlbionDataClient::new(
            &cfg.feed.base_url,
            catalog.clone(),
            Duration::from_millis(cfg.feed.request_delay_ms),
        )?);
        info!(feed = feed.name(), base_url = %cfg.feed.base_url, "Market feed enabled");
        scheduler = scheduler.with_feed(feed, ingestor, cfg.feed.poll_interval());
    } else {
        warn!("Market feed disabled; quotes only change through external ingestion");
    }
    let handles = scheduler.spawn();

    // -- API ---------------------------------------------------------------
    if cfg.dashboard.enabled {
        let state = Arc::new(ApiContext {
            queries,
            publisher,
        });
        dashboard::spawn_dashboard(state, cfg.dashboard.port).await?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received.");

    for handle in handles {
        handle.abort();
    }
    info!(service = %cfg.service.name, "ALCHEMY-ARB shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("alchemy_arb=info"));

    let json_logging = std::env::var("ALCHEMY_ARB_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
