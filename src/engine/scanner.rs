//! Opportunity engine: periodic full-catalog arbitrage scan.
//!
//! One run resolves every (item, city) price, enumerates every family ×
//! ordered city pair × conversion path, atomically replaces the stored
//! opportunity set, refreshes the cache and publishes the new set.
//!
//! At most one run executes at a time per engine. A trigger that finds a
//! run in flight is skipped, never queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ingestor::now_millis;
use super::pricing::{self, ConversionPath};
use super::resolver::{PriceBook, QuoteResolver};
use crate::cache::QuoteCache;
use crate::catalog::Catalog;
use crate::publisher::Publisher;
use crate::storage::PriceStore;
use crate::types::{ArbError, Opportunity, OpportunitySnapshot, RunOutcome};

/// Enumerate every tradeable opportunity in `book`.
///
/// Order is deterministic: family key, buy city, sell city, then path.
/// A path is skipped when the source tier, target tier, cost or sell price
/// is missing. Unprofitable results are kept.
pub fn enumerate(catalog: &Catalog, book: &PriceBook, computed_at: DateTime<Utc>) -> Vec<Opportunity> {
    let mut found = Vec::new();
    for family in catalog.families() {
        for buy in catalog.cities() {
            for sell in catalog.cities() {
                if buy.id == sell.id {
                    continue;
                }
                for path in ConversionPath::ALL {
                    let (Some(source), Some(target)) =
                        (family.get(path.source_tier()), family.get(path.target_tier()))
                    else {
                        continue;
                    };
                    let cost = book.ask_min(source.id, buy.id);
                    let unit_sell = book.bid_max(target.id, sell.id);
                    if let Some(eval) = pricing::evaluate_tradeable(path, cost, unit_sell) {
                        found.push(eval.into_opportunity(
                            source.id,
                            target.id,
                            buy.id,
                            sell.id,
                            computed_at,
                        ));
                    }
                }
            }
        }
    }
    found
}

/// Holds the engine's run flag; clears it when dropped.
pub struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct OpportunityEngine {
    store: Arc<dyn PriceStore>,
    cache: Arc<QuoteCache>,
    resolver: Arc<dyn QuoteResolver>,
    publisher: Publisher,
    opportunities_ttl: Duration,
    running: AtomicBool,
}

impl OpportunityEngine {
    pub fn new(
        store: Arc<dyn PriceStore>,
        cache: Arc<QuoteCache>,
        resolver: Arc<dyn QuoteResolver>,
        publisher: Publisher,
        opportunities_ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            resolver,
            publisher,
            opportunities_ttl,
            running: AtomicBool::new(false),
        }
    }

    /// Claim the run flag, or `None` if a run is already in flight.
    pub fn try_begin_run(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard {
                flag: &self.running,
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Execute one scheduled run.
    ///
    /// On error the previous opportunity set stays in place and the guard is
    /// released before returning.
    pub async fn run(&self) -> Result<RunOutcome, ArbError> {
        self.run_at(now_millis()).await
    }

    /// Run with an explicit timestamp. Same inputs and timestamp produce the
    /// same set.
    pub async fn run_at(&self, computed_at: DateTime<Utc>) -> Result<RunOutcome, ArbError> {
        let Some(_guard) = self.try_begin_run() else {
            warn!("Opportunity scan already in progress, skipping this trigger");
            return Ok(RunOutcome::Skipped);
        };
        self.run_guarded(computed_at).await
    }

    async fn run_guarded(&self, computed_at: DateTime<Utc>) -> Result<RunOutcome, ArbError> {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        info!(run_id = %run_id, "Opportunity scan started");

        let purged = self.cache.purge_expired().await;
        debug!(run_id = %run_id, purged, "Quote cache purged");

        let opportunities = self.scan(computed_at).await?;
        self.store.replace_opportunities(&opportunities).await?;
        self.cache
            .put_opportunities(opportunities.clone(), self.opportunities_ttl)
            .await;

        let count = opportunities.len();
        let profitable = opportunities.iter().filter(|o| o.is_profitable()).count();
        self.publisher.publish(OpportunitySnapshot {
            run_id: run_id.clone(),
            computed_at,
            opportunities,
        });

        info!(
            run_id = %run_id,
            candidates = count,
            profitable,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Opportunity scan completed"
        );
        Ok(RunOutcome::Completed {
            run_id,
            opportunities: count,
        })
    }

    /// Compute the full candidate set without writing anything.
    pub async fn scan(&self, computed_at: DateTime<Utc>) -> Result<Vec<Opportunity>, ArbError> {
        let catalog = Catalog::new(self.store.items().await?, self.store.cities().await?);
        let book = PriceBook::resolve(self.resolver.as_ref(), &catalog).await?;
        debug!(quotes = book.len(), "Price book resolved");
        Ok(enumerate(&catalog, &book, computed_at))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{seed_cities, seed_items};
    use crate::engine::resolver::CachedResolver;
    use crate::storage::{MockPriceStore, SqliteStore};
    use crate::types::{Item, Quote, Tier, DEFAULT_QUALITY};
    use rust_decimal_macros::dec;

    const TTL: Duration = Duration::from_secs(120);

    fn quote(item_id: i64, city_id: i64, ask: i64, bid: i64) -> Quote {
        Quote {
            item_id,
            city_id,
            quality: DEFAULT_QUALITY,
            ask_min: ask,
            ask_max: ask,
            bid_max: bid,
            updated_at: now_millis(),
        }
    }

    /// A catalog holding only the PANTHER family (ids 1..=3 = T3, T5, T7).
    fn panther_catalog() -> Catalog {
        let items: Vec<Item> = seed_items().into_iter().filter(|i| i.family == "PANTHER").collect();
        Catalog::new(items, seed_cities())
    }

    fn id(catalog: &Catalog, tier: Tier) -> i64 {
        catalog.family("PANTHER").unwrap().get(tier).unwrap().id
    }

    async fn engine_with(quotes: &[Quote]) -> (Arc<SqliteStore>, OpportunityEngine, Publisher) {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        store.seed(&Catalog::seeded()).await.unwrap();
        for q in quotes {
            store.upsert_quote(q).await.unwrap();
        }
        let cache = Arc::new(QuoteCache::new());
        let resolver = Arc::new(CachedResolver::new(
            store.clone(),
            cache.clone(),
            Duration::from_secs(300),
        ));
        let publisher = Publisher::new(4);
        let engine = OpportunityEngine::new(store.clone(), cache, resolver, publisher.clone(), TTL);
        (store, engine, publisher)
    }

    #[test]
    fn test_enumerate_five_to_three() {
        let catalog = panther_catalog();
        let (t3, t5) = (id(&catalog, Tier::T3), id(&catalog, Tier::T5));
        let book = PriceBook::from_quotes([quote(t5, 1, 150, 0), quote(t3, 2, 0, 100)]);

        let found = enumerate(&catalog, &book, now_millis());
        assert_eq!(found.len(), 1);
        let opp = &found[0];
        assert_eq!((opp.buy_city_id, opp.sell_city_id), (1, 2));
        assert_eq!(opp.quantity_multiplier, 2);
        assert_eq!(opp.net_profit, dec!(42));
        assert_eq!(opp.profit_margin, dec!(28));
    }

    #[test]
    fn test_missing_source_ask_skips_path() {
        let catalog = panther_catalog();
        let (t3, t5, t7) = (
            id(&catalog, Tier::T3),
            id(&catalog, Tier::T5),
            id(&catalog, Tier::T7),
        );
        let book = PriceBook::from_quotes([
            quote(t7, 1, 0, 500),
            quote(t5, 2, 0, 200),
            quote(t3, 2, 0, 100),
        ]);
        assert!(enumerate(&catalog, &book, now_millis()).is_empty());
    }

    #[test]
    fn test_same_city_never_paired() {
        let catalog = panther_catalog();
        let (t3, t5) = (id(&catalog, Tier::T3), id(&catalog, Tier::T5));
        let book = PriceBook::from_quotes([quote(t5, 1, 150, 0), quote(t3, 1, 0, 100)]);
        assert!(enumerate(&catalog, &book, now_millis()).is_empty());
    }

    #[test]
    fn test_unprofitable_kept() {
        let catalog = panther_catalog();
        let (t3, t7) = (id(&catalog, Tier::T3), id(&catalog, Tier::T7));
        let book = PriceBook::from_quotes([quote(t7, 3, 1000, 0), quote(t3, 4, 0, 100)]);
        let found = enumerate(&catalog, &book, now_millis());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].quantity_multiplier, 4);
        assert!(!found[0].is_profitable());
    }

    #[test]
    fn test_family_missing_tier_skips_dependent_paths() {
        let items: Vec<Item> = seed_items()
            .into_iter()
            .filter(|i| i.family == "PANTHER" && i.tier != Tier::T5)
            .collect();
        let catalog = Catalog::new(items, seed_cities());
        let book = PriceBook::from_quotes([quote(1, 1, 0, 100), quote(3, 2, 400, 0)]);
        let found = enumerate(&catalog, &book, now_millis());
        // Only T7 -> 4x T3 is possible.
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].quantity_multiplier, 4);
        assert_eq!((found[0].buy_city_id, found[0].sell_city_id), (2, 1));
    }

    #[tokio::test]
    async fn test_run_replaces_caches_and_publishes() {
        let (store, engine, publisher) = engine_with(&[quote(2, 1, 150, 0), quote(1, 2, 0, 100)]).await;
        let mut rx = publisher.subscribe();

        let outcome = engine.run().await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { opportunities: 1, .. }));
        assert!(!engine.is_running());

        let stored = store.opportunities().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].net_profit, dec!(42));

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.opportunities, stored);
        assert_eq!(engine.cache.get_opportunities().await, Some(stored));
    }

    #[tokio::test]
    async fn test_run_is_idempotent_for_fixed_inputs() {
        let (store, engine, _) = engine_with(&[
            quote(2, 1, 150, 0),
            quote(1, 2, 0, 100),
            quote(3, 4, 320, 0),
            quote(2, 5, 0, 180),
        ])
        .await;
        let at = now_millis();

        engine.run_at(at).await.unwrap();
        let first = store.opportunities().await.unwrap();
        engine.run_at(at).await.unwrap();
        let second = store.opportunities().await.unwrap();
        // 5->3 from city 1 to 2, 7->5 from 4 to 5, 7->3 from 4 to 2.
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_skipped() {
        let (store, engine, publisher) = engine_with(&[quote(2, 1, 150, 0), quote(1, 2, 0, 100)]).await;
        let mut rx = publisher.subscribe();

        let guard = engine.try_begin_run().unwrap();
        assert!(engine.try_begin_run().is_none());
        assert_eq!(engine.run().await.unwrap(), RunOutcome::Skipped);
        assert!(store.opportunities().await.unwrap().is_empty());
        assert!(rx.try_recv().is_err());

        drop(guard);
        assert!(matches!(engine.run().await.unwrap(), RunOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_store_outage_releases_guard() {
        let mut store = MockPriceStore::new();
        store
            .expect_items()
            .returning(|| Err(ArbError::Store(sqlx::Error::PoolTimedOut)));
        store.expect_replace_opportunities().never();
        let store: Arc<dyn PriceStore> = Arc::new(store);
        let cache = Arc::new(QuoteCache::new());
        let resolver = Arc::new(CachedResolver::new(store.clone(), cache.clone(), TTL));
        let engine = OpportunityEngine::new(store, cache, resolver, Publisher::default(), TTL);

        let err = engine.run().await.unwrap_err();
        assert!(err.is_store());
        assert!(!engine.is_running());
        assert!(engine.try_begin_run().is_some());
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_previous_set() {
        let mut store = MockPriceStore::new();
        store.expect_items().returning(|| Ok(seed_items()));
        store.expect_cities().returning(|| Ok(seed_cities()));
        store
            .expect_quotes()
            .returning(|| Ok(vec![quote(2, 1, 150, 0), quote(1, 2, 0, 100)]));
        store
            .expect_replace_opportunities()
            .times(1)
            .returning(|_| Err(ArbError::Store(sqlx::Error::RowNotFound)));
        let store: Arc<dyn PriceStore> = Arc::new(store);
        let cache = Arc::new(QuoteCache::new());
        let resolver = Arc::new(CachedResolver::new(store.clone(), cache.clone(), TTL));
        let publisher = Publisher::new(4);
        let mut rx = publisher.subscribe();
        let engine = OpportunityEngine::new(store, cache.clone(), resolver, publisher, TTL);

        assert!(engine.run().await.is_err());
        assert!(cache.get_opportunities().await.is_none());
        assert!(rx.try_recv().is_err());
    }
}
