//! Albion Online Data Project REST client.
//!
//! API docs: https://www.albion-online-data.com/
//!
//! `GET /stats/prices/{item}?locations=...&qualities=1` returns one row per
//! city with the current cheapest and dearest sell offer and the best buy
//! request. Each row becomes at most two ask records and one bid record,
//! addressed by the city's feed location code.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::MarketFeed;
use crate::catalog::Catalog;
use crate::types::{ArbError, OrderSide, RawOrder, DEFAULT_QUALITY};

pub const DEFAULT_BASE_URL: &str = "https://www.albion-online-data.com/api/v2";

const FEED_NAME: &str = "albion-data";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// One row of `/stats/prices`. Zero means no standing order.
#[derive(Debug, Clone, Deserialize)]
pub struct AlbionPriceRow {
    pub item_id: String,
    pub city: String,
    #[serde(default)]
    pub quality: i64,
    #[serde(default)]
    pub sell_price_min: i64,
    #[serde(default)]
    pub sell_price_max: i64,
    #[serde(default)]
    pub buy_price_max: i64,
}

/// Convert price rows into raw orders the standard reducer understands.
///
/// Rows for unknown cities or non-default quality are skipped. A row with no
/// standing orders on either side becomes a single zero-price bid, so the
/// stored quote for that (item, city) is cleared rather than left stale.
pub fn rows_to_orders(rows: &[AlbionPriceRow], catalog: &Catalog) -> Vec<RawOrder> {
    let mut orders = Vec::new();
    for row in rows {
        let before = orders.len();
        if row.quality != DEFAULT_QUALITY {
            continue;
        }
        let Some(city) = catalog.city_by_name(&row.city) else {
            debug!(city = %row.city, item = %row.item_id, "Skipping row for untracked city");
            continue;
        };
        if row.sell_price_min > 0 {
            orders.push(RawOrder::new(&row.item_id, &city.code, OrderSide::Ask, row.sell_price_min));
        }
        if row.sell_price_max > row.sell_price_min && row.sell_price_min > 0 {
            orders.push(RawOrder::new(&row.item_id, &city.code, OrderSide::Ask, row.sell_price_max));
        }
        if row.buy_price_max > 0 {
            orders.push(RawOrder::new(&row.item_id, &city.code, OrderSide::Bid, row.buy_price_max));
        }
        if orders.len() == before {
            orders.push(RawOrder::new(&row.item_id, &city.code, OrderSide::Bid, 0));
        }
    }
    orders
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AlbionDataClient {
    http: Client,
    base_url: String,
    catalog: Arc<Catalog>,
    request_delay: Duration,
}

impl AlbionDataClient {
    pub fn new(base_url: &str, catalog: Arc<Catalog>, request_delay: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("alchemy-arb/0.1.0 (market-data-poller)")
            .build()
            .context("Failed to build HTTP client for Albion Data")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            catalog,
            request_delay,
        })
    }

    /// Request URL for one item across every catalog city.
    fn prices_url(&self, item_code: &str) -> String {
        let locations: Vec<&str> = self.catalog.cities().iter().map(|c| c.name.as_str()).collect();
        format!(
            "{}/stats/prices/{}?locations={}&qualities={}",
            self.base_url,
            urlencoding::encode(item_code),
            urlencoding::encode(&locations.join(",")),
            DEFAULT_QUALITY,
        )
    }

    async fn fetch_item(&self, item_code: &str) -> Result<Vec<AlbionPriceRow>> {
        let url = self.prices_url(item_code);
        debug!(url = %url, "Fetching Albion Data prices");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Albion Data request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Albion Data error {status}: {body}");
        }

        resp.json()
            .await
            .context("Failed to parse Albion Data prices response")
    }
}

#[async_trait]
impl MarketFeed for AlbionDataClient {
    /// Poll every catalog item in turn, spaced by the request delay.
    ///
    /// A failing item is logged and skipped; the batch fails only when every
    /// request failed.
    async fn fetch_orders(&self) -> Result<Vec<RawOrder>, ArbError> {
        let items = self.catalog.items();
        let mut orders = Vec::new();
        let mut failures = 0usize;
        let mut last_error = String::new();

        for (i, item) in items.iter().enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
            match self.fetch_item(&item.code).await {
                Ok(rows) => {
                    debug!(item = %item.code, rows = rows.len(), "Albion Data prices fetched");
                    orders.extend(rows_to_orders(&rows, &self.catalog));
                }
                Err(e) => {
                    warn!(item = %item.code, error = %e, "Albion Data fetch failed, skipping item");
                    failures += 1;
                    last_error = e.to_string();
                }
            }
        }

        if !items.is_empty() && failures == items.len() {
            return Err(ArbError::Feed {
                feed: FEED_NAME.to_string(),
                message: last_error,
            });
        }

        info!(items = items.len(), failures, orders = orders.len(), "Albion Data poll complete");
        Ok(orders)
    }

    fn name(&self) -> &str {
        FEED_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {"item_id":"T5_ALCHEMY_RARE_PANTHER","city":"Thetford","quality":1,
         "sell_price_min":110,"sell_price_min_date":"2025-01-01T00:00:00",
         "sell_price_max":130,"buy_price_min":50,"buy_price_max":95},
        {"item_id":"T5_ALCHEMY_RARE_PANTHER","city":"Fort Sterling","quality":1,
         "sell_price_min":0,"sell_price_max":0,"buy_price_max":70},
        {"item_id":"T5_ALCHEMY_RARE_PANTHER","city":"Black Market","quality":1,
         "sell_price_min":0,"sell_price_max":0,"buy_price_max":900},
        {"item_id":"T5_ALCHEMY_RARE_PANTHER","city":"Thetford","quality":2,
         "sell_price_min":999,"sell_price_max":999,"buy_price_max":999}
    ]"#;

    #[test]
    fn test_parse_price_rows() {
        let rows: Vec<AlbionPriceRow> = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].sell_price_min, 110);
        assert_eq!(rows[1].city, "Fort Sterling");
    }

    #[test]
    fn test_rows_to_orders() {
        let catalog = Catalog::seeded();
        let rows: Vec<AlbionPriceRow> = serde_json::from_str(SAMPLE).unwrap();
        let orders = rows_to_orders(&rows, &catalog);

        // Thetford: two asks and one bid; Fort Sterling: one bid only.
        assert_eq!(orders.len(), 4);
        assert!(orders.iter().all(|o| o.location_id == "0007" || o.location_id == "3005"));
        let fort_sterling: Vec<_> = orders.iter().filter(|o| o.location_id == "3005").collect();
        assert_eq!(fort_sterling.len(), 1);
        assert_eq!(fort_sterling[0].side, OrderSide::Bid);
        assert_eq!(fort_sterling[0].unit_price, 70);
    }

    #[test]
    fn test_rows_reduce_to_expected_quote() {
        let catalog = Catalog::seeded();
        let rows: Vec<AlbionPriceRow> = serde_json::from_str(SAMPLE).unwrap();
        let orders = rows_to_orders(&rows, &catalog);
        let groups = crate::engine::ingestor::reduce_orders(&orders);
        let thetford = groups[&("T5_ALCHEMY_RARE_PANTHER", "0007")];
        assert_eq!((thetford.ask_min, thetford.ask_max, thetford.bid_max), (110, 130, 95));
    }

    #[test]
    fn test_empty_market_row_clears_quote() {
        let catalog = Catalog::seeded();
        let rows = vec![AlbionPriceRow {
            item_id: "T5_ALCHEMY_RARE_PANTHER".to_string(),
            city: "Thetford".to_string(),
            quality: 1,
            sell_price_min: 0,
            sell_price_max: 0,
            buy_price_max: 0,
        }];
        let orders = rows_to_orders(&rows, &catalog);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].unit_price, 0);

        let groups = crate::engine::ingestor::reduce_orders(&orders);
        let thetford = groups[&("T5_ALCHEMY_RARE_PANTHER", "0007")];
        assert_eq!((thetford.ask_min, thetford.ask_max, thetford.bid_max), (0, 0, 0));
    }

    #[test]
    fn test_prices_url() {
        let client = AlbionDataClient::new(
            "https://example.test/api/v2/",
            Arc::new(Catalog::seeded()),
            Duration::ZERO,
        )
        .unwrap();
        let url = client.prices_url("T5_ALCHEMY_RARE_PANTHER");
        assert!(url.starts_with("https://example.test/api/v2/stats/prices/T5_ALCHEMY_RARE_PANTHER?"));
        assert!(url.contains("locations=Bridgewatch%2CMartlock%2CThetford%2CFort%20Sterling"));
        assert!(url.ends_with("&qualities=1"));
        assert_eq!(client.name(), "albion-data");
    }
}
