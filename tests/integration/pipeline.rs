//! Feed → ingestion → engine → queries, wired the way `main` wires them.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};

use alchemy_arb::cache::QuoteCache;
use alchemy_arb::catalog::Catalog;
use alchemy_arb::engine::scheduler::{poll_feed_once, rollover_once};
use alchemy_arb::engine::{
    CachedResolver, MarketIngestor, OpportunityEngine, OpportunityQueries,
};
use alchemy_arb::market::albion::{rows_to_orders, AlbionPriceRow};
use alchemy_arb::publisher::Publisher;
use alchemy_arb::storage::{PriceStore, SqliteStore};
use alchemy_arb::types::{OpportunityFilter, RunOutcome, SimulationResult};

use crate::mock_feed::{ask, bid, MockFeed};

const PANTHER_T3: &str = "T3_ALCHEMY_RARE_PANTHER";
const PANTHER_T5: &str = "T5_ALCHEMY_RARE_PANTHER";
const PANTHER_T7: &str = "T7_ALCHEMY_RARE_PANTHER";
const BRIDGEWATCH: &str = "2004";
const MARTLOCK: &str = "4002";

struct Harness {
    store: Arc<SqliteStore>,
    cache: Arc<QuoteCache>,
    ingestor: MarketIngestor,
    engine: OpportunityEngine,
    queries: OpportunityQueries,
    publisher: Publisher,
}

async fn harness() -> Harness {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    store.seed(&Catalog::seeded()).await.unwrap();
    let catalog = Arc::new(store.load_catalog().await.unwrap());

    let cache = Arc::new(QuoteCache::new());
    let quote_ttl = Duration::from_secs(300);
    let resolver = Arc::new(CachedResolver::new(store.clone(), cache.clone(), quote_ttl));
    let publisher = Publisher::new(8);

    let ingestor = MarketIngestor::new(store.clone(), cache.clone(), catalog.clone(), quote_ttl);
    let engine = OpportunityEngine::new(
        store.clone(),
        cache.clone(),
        resolver.clone(),
        publisher.clone(),
        Duration::from_secs(120),
    );
    let queries = OpportunityQueries::new(
        store.clone(),
        cache.clone(),
        resolver,
        catalog,
        Duration::from_secs(3600),
    );

    Harness {
        store,
        cache,
        ingestor,
        engine,
        queries,
        publisher,
    }
}

/// T5 Panther offered at 150 in Bridgewatch, T3 Panther bid at 100 in Martlock.
fn five_to_three_batch() -> Vec<alchemy_arb::types::RawOrder> {
    vec![
        ask(PANTHER_T5, BRIDGEWATCH, 160),
        ask(PANTHER_T5, BRIDGEWATCH, 150),
        bid(PANTHER_T3, MARTLOCK, 90),
        bid(PANTHER_T3, MARTLOCK, 100),
        ask("T4_BAG", BRIDGEWATCH, 999),
    ]
}

#[tokio::test]
async fn test_feed_to_published_opportunity() {
    let h = harness().await;
    let feed = MockFeed::new();
    feed.push_batch(five_to_three_batch());
    let mut rx = h.publisher.subscribe();

    let report = poll_feed_once(&feed, &h.ingestor).await.unwrap();
    assert_eq!(report.records_seen, 5);
    assert_eq!(report.records_discarded, 1);
    assert_eq!(report.groups_written, 2);

    let outcome = h.engine.run().await.unwrap();
    let RunOutcome::Completed { run_id, opportunities } = outcome else {
        panic!("run was skipped");
    };
    assert_eq!(opportunities, 1);

    let snapshot = rx.recv().await.unwrap();
    assert_eq!(snapshot.run_id, run_id);
    let opp = &snapshot.opportunities[0];
    assert_eq!((opp.buy_price, opp.sell_price), (150, 100));
    assert_eq!(opp.net_profit, dec!(42));
    assert_eq!(opp.profit_margin, dec!(28));

    let top = h.queries.top_opportunities(10).await.unwrap();
    assert_eq!(top, snapshot.opportunities);
    let stored = h.store.opportunities().await.unwrap();
    assert_eq!(stored, snapshot.opportunities);
}

#[tokio::test]
async fn test_newer_quotes_change_next_run() {
    let h = harness().await;
    h.ingestor.ingest(&five_to_three_batch()).await.unwrap();
    h.engine.run().await.unwrap();

    // The T3 bid collapses; the opportunity turns into a loss but is kept.
    h.ingestor.ingest(&[bid(PANTHER_T3, MARTLOCK, 50)]).await.unwrap();
    h.engine.run().await.unwrap();

    let stored = h.store.opportunities().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].net_profit, dec!(-54));
    assert!(h
        .queries
        .filtered_opportunities(&OpportunityFilter {
            min_profit: Some(dec!(0)),
            ..Default::default()
        })
        .await
        .unwrap()
        .is_empty());
}

fn price_row(item: &str, city: &str, sell: i64, buy: i64) -> AlbionPriceRow {
    AlbionPriceRow {
        item_id: item.to_string(),
        city: city.to_string(),
        quality: 1,
        sell_price_min: sell,
        sell_price_max: sell,
        buy_price_max: buy,
    }
}

#[tokio::test]
async fn test_emptied_market_clears_quote_and_route() {
    let h = harness().await;
    let catalog = Catalog::seeded();

    let first = vec![
        price_row(PANTHER_T5, "Bridgewatch", 150, 0),
        price_row(PANTHER_T3, "Martlock", 0, 100),
    ];
    h.ingestor.ingest(&rows_to_orders(&first, &catalog)).await.unwrap();
    let RunOutcome::Completed { opportunities, .. } = h.engine.run().await.unwrap() else {
        panic!("run was skipped");
    };
    assert_eq!(opportunities, 1);

    // Every offer for T5 in Bridgewatch is gone.
    let second = vec![price_row(PANTHER_T5, "Bridgewatch", 0, 0)];
    let report = h.ingestor.ingest(&rows_to_orders(&second, &catalog)).await.unwrap();
    assert_eq!(report.groups_written, 1);

    let quote = h.store.quote(2, 1).await.unwrap().unwrap();
    assert_eq!((quote.ask_min, quote.bid_max), (0, 0));

    h.engine.run().await.unwrap();
    assert!(h.store.opportunities().await.unwrap().is_empty());
    assert!(h.queries.top_opportunities(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_t7_ask_emits_nothing_from_t7() {
    let h = harness().await;
    h.ingestor
        .ingest(&[
            bid(PANTHER_T7, BRIDGEWATCH, 900),
            bid(PANTHER_T5, MARTLOCK, 400),
            bid(PANTHER_T3, MARTLOCK, 200),
        ])
        .await
        .unwrap();
    h.engine.run().await.unwrap();

    assert!(h.store.opportunities().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_overlapping_runs_publish_once() {
    let h = harness().await;
    h.ingestor.ingest(&five_to_three_batch()).await.unwrap();
    let mut rx = h.publisher.subscribe();

    let (a, b) = tokio::join!(h.engine.run(), h.engine.run());
    let outcomes = [a.unwrap(), b.unwrap()];
    let skipped = outcomes.iter().filter(|o| **o == RunOutcome::Skipped).count();
    assert_eq!(skipped, 1);

    assert!(rx.recv().await.is_ok());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_feed_failure_leaves_state_untouched() {
    let h = harness().await;
    let feed = MockFeed::new();
    feed.set_error(Some("503 Service Unavailable"));

    assert_err!(poll_feed_once(&feed, &h.ingestor).await);
    assert!(h.store.quotes().await.unwrap().is_empty());
    assert_eq!(h.cache.quote_count().await, 0);
    assert_eq!(feed.fetch_count(), 1);
}

#[tokio::test]
async fn test_rollover_feeds_weekly_averages() {
    let h = harness().await;
    h.ingestor.ingest(&five_to_three_batch()).await.unwrap();
    let written = assert_ok!(rollover_once(h.store.as_ref()).await);
    assert_eq!(written, 2);

    let weekly = h.queries.weekly_averages().await.unwrap();
    let t5_bridgewatch = weekly
        .iter()
        .find(|w| w.item_name == "Fine Shadow Claws" && w.city_name == "Bridgewatch")
        .unwrap();
    // One ingest point plus one rollover point, both at ask 150.
    assert_eq!(t5_bridgewatch.samples, 2);
    assert_eq!(t5_bridgewatch.weekly_avg_sell, Some(150.0));
    assert_eq!(t5_bridgewatch.weekly_avg_buy, None);
}

#[tokio::test]
async fn test_manual_simulation_over_ingested_quotes() {
    let h = harness().await;
    h.ingestor.ingest(&five_to_three_batch()).await.unwrap();

    let result = h
        .queries
        .manual_simulate("Bridgewatch", "Martlock", None)
        .await
        .unwrap();
    let SimulationResult::Grouped(groups) = result else {
        panic!("expected grouped result");
    };
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].family, "PANTHER");
    assert_eq!(groups[0].scenarios[0].net_profit, dec!(42));

    // Reverse direction has no quotes on either leg.
    let reverse = h
        .queries
        .manual_simulate("Martlock", "Bridgewatch", Some("PANTHER"))
        .await
        .unwrap();
    assert_eq!(reverse.scenario_count(), 0);
}
