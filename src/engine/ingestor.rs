//! Market ingestion: reduce a batch of raw orders into quotes.
//!
//! Orders are grouped by (item code, location code). Each group becomes one
//! quote upsert, one history point and one cache refresh, in that order.
//! A group whose city or item cannot be resolved is dropped with a warning;
//! the rest of the batch continues. A store failure aborts the batch.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::cache::QuoteCache;
use crate::catalog::Catalog;
use crate::storage::PriceStore;
use crate::types::{
    ArbError, HistoryKind, IngestReport, OrderSide, PriceHistoryPoint, Quote, RawOrder,
    DEFAULT_QUALITY,
};

/// Best prices for one group. Zero means the side had no orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BestPrices {
    pub ask_min: i64,
    pub ask_max: i64,
    pub bid_max: i64,
}

impl BestPrices {
    fn add(&mut self, order: &RawOrder) {
        let price = order.unit_price;
        if price <= 0 {
            return;
        }
        match order.side {
            OrderSide::Ask => {
                if self.ask_min == 0 || price < self.ask_min {
                    self.ask_min = price;
                }
                self.ask_max = self.ask_max.max(price);
            }
            OrderSide::Bid => self.bid_max = self.bid_max.max(price),
        }
    }

    pub fn to_quote(self, item_id: i64, city_id: i64, updated_at: DateTime<Utc>) -> Quote {
        Quote {
            item_id,
            city_id,
            quality: DEFAULT_QUALITY,
            ask_min: self.ask_min,
            ask_max: self.ask_max,
            bid_max: self.bid_max,
            updated_at,
        }
    }
}

/// Group orders by (item code, location code) and reduce each group.
///
/// A record with a non-positive price still opens its group, which then
/// reduces to zeros on the sides it did not fill.
pub fn reduce_orders<'a>(
    orders: impl IntoIterator<Item = &'a RawOrder>,
) -> BTreeMap<(&'a str, &'a str), BestPrices> {
    let mut groups: BTreeMap<(&str, &str), BestPrices> = BTreeMap::new();
    for order in orders {
        groups
            .entry((order.item_id.as_str(), order.location_id.as_str()))
            .or_default()
            .add(order);
    }
    groups
}

pub struct MarketIngestor {
    store: Arc<dyn PriceStore>,
    cache: Arc<QuoteCache>,
    catalog: Arc<Catalog>,
    monitored: HashSet<String>,
    quote_ttl: Duration,
}

impl MarketIngestor {
    /// Ingestor monitoring every item in `catalog`.
    pub fn new(
        store: Arc<dyn PriceStore>,
        cache: Arc<QuoteCache>,
        catalog: Arc<Catalog>,
        quote_ttl: Duration,
    ) -> Self {
        let monitored = catalog.items().iter().map(|i| i.code.clone()).collect();
        Self {
            store,
            cache,
            catalog,
            monitored,
            quote_ttl,
        }
    }

    /// Override the monitored item codes.
    pub fn with_monitored(mut self, codes: impl IntoIterator<Item = String>) -> Self {
        self.monitored = codes.into_iter().collect();
        self
    }

    pub async fn ingest(&self, orders: &[RawOrder]) -> Result<IngestReport, ArbError> {
        let mut report = IngestReport {
            records_seen: orders.len(),
            ..Default::default()
        };

        let kept = orders.iter().filter(|o| self.monitored.contains(&o.item_id));
        let groups = reduce_orders(kept);
        report.records_discarded = orders
            .iter()
            .filter(|o| !self.monitored.contains(&o.item_id))
            .count();

        let now = now_millis();
        for ((item_code, location), prices) in groups {
            let Some(city) = self.catalog.city_by_code(location) else {
                warn!(location, item = item_code, "Unknown city location, dropping group");
                report.groups_unknown_city += 1;
                continue;
            };
            let Some(item) = self.catalog.item_by_code(item_code) else {
                warn!(item = item_code, city = %city.name, "Item not in store, dropping group");
                report.groups_unknown_item += 1;
                continue;
            };

            let quote = prices.to_quote(item.id, city.id, now);
            self.store.upsert_quote(&quote).await?;
            self.store
                .append_history(&PriceHistoryPoint::from_quote(&quote, HistoryKind::Ingest, now))
                .await?;
            debug!(item = %item.code, city = %city.name, ask = quote.ask_min, bid = quote.bid_max, "Quote updated");
            self.cache.put_quote(quote, self.quote_ttl).await;
            report.groups_written += 1;
        }

        info!(
            seen = report.records_seen,
            discarded = report.records_discarded,
            written = report.groups_written,
            unknown_city = report.groups_unknown_city,
            unknown_item = report.groups_unknown_item,
            "Market batch ingested"
        );
        Ok(report)
    }
}

/// Current time truncated to the millisecond precision the store keeps.
pub(crate) fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
