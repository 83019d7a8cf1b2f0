//! Timers driving the engine, the daily history rollover and the feed poll.
//!
//! Each timer is an independent task. Engine runs are spawned per tick so a
//! slow run never delays the cadence; the engine's own guard turns an
//! overlapping tick into a skip. A failure in one timer never affects the
//! others.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::ingestor::MarketIngestor;
use super::scanner::OpportunityEngine;
use crate::market::MarketFeed;
use crate::storage::PriceStore;
use crate::types::{ArbError, IngestReport, RunOutcome};

/// Time from `now` until the next occurrence of `at` (UTC).
///
/// When `now` is exactly `at`, the next occurrence is a day later.
pub fn duration_until_next(now: DateTime<Utc>, at: NaiveTime) -> Duration {
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(at));
    let next = if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// One engine attempt with failures logged. Returns the outcome on success.
pub async fn run_engine_once(engine: &OpportunityEngine) -> Option<RunOutcome> {
    match engine.run().await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!(error = %e, "Opportunity scan failed, previous set kept");
            None
        }
    }
}

/// Snapshot current quotes into history.
pub async fn rollover_once(store: &dyn PriceStore) -> Result<u64, ArbError> {
    let written = store.rollover_history(Utc::now()).await?;
    info!(written, "Daily price history rollover complete");
    Ok(written)
}

/// Fetch one batch from `feed` and ingest it.
pub async fn poll_feed_once(
    feed: &dyn MarketFeed,
    ingestor: &MarketIngestor,
) -> Result<IngestReport, ArbError> {
    let orders = feed.fetch_orders().await?;
    ingestor.ingest(&orders).await
}

pub struct Scheduler {
    engine: Arc<OpportunityEngine>,
    store: Arc<dyn PriceStore>,
    engine_interval: Duration,
    rollover_at: NaiveTime,
    feed: Option<(Arc<dyn MarketFeed>, Arc<MarketIngestor>, Duration)>,
}

impl Scheduler {
    pub fn new(
        engine: Arc<OpportunityEngine>,
        store: Arc<dyn PriceStore>,
        engine_interval: Duration,
        rollover_at: NaiveTime,
    ) -> Self {
        Self {
            engine,
            store,
            engine_interval,
            rollover_at,
            feed: None,
        }
    }

    /// Also poll `feed` every `interval` and ingest the result.
    pub fn with_feed(
        mut self,
        feed: Arc<dyn MarketFeed>,
        ingestor: Arc<MarketIngestor>,
        interval: Duration,
    ) -> Self {
        self.feed = Some((feed, ingestor, interval));
        self
    }

    /// Start every timer. Abort the returned handles to stop them.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        info!(
            engine_interval_secs = self.engine_interval.as_secs(),
            rollover_at = %self.rollover_at,
            feed = %self.feed.as_ref().map(|(f, _, _)| f.name().to_string()).unwrap_or_default(),
            "Scheduler starting"
        );

        let mut handles = vec![
            tokio::spawn(engine_loop(self.engine, self.engine_interval)),
            tokio::spawn(rollover_loop(self.store, self.rollover_at)),
        ];
        if let Some((feed, ingestor, interval)) = self.feed {
            handles.push(tokio::spawn(feed_loop(feed, ingestor, interval)));
        }
        handles
    }
}

async fn engine_loop(engine: Arc<OpportunityEngine>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let engine = engine.clone();
        tokio::spawn(async move {
            run_engine_once(&engine).await;
        });
    }
}

async fn rollover_loop(store: Arc<dyn PriceStore>, at: NaiveTime) {
    loop {
        let wait = duration_until_next(Utc::now(), at);
        info!(wait_secs = wait.as_secs(), "Next price history rollover scheduled");
        tokio::time::sleep(wait).await;
        if let Err(e) = rollover_once(store.as_ref()).await {
            error!(error = %e, "Price history rollover failed");
        }
    }
}

async fn feed_loop(feed: Arc<dyn MarketFeed>, ingestor: Arc<MarketIngestor>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if let Err(e) = poll_feed_once(feed.as_ref(), &ingestor).await {
            error!(feed = feed.name(), error = %e, "Market feed poll failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
