//! Read side consumed by the HTTP layer.
//!
//! Readers only ever see the last fully committed opportunity set, either
//! from the cache or from the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use super::resolver::QuoteResolver;
use super::simulator;
use crate::cache::QuoteCache;
use crate::catalog::Catalog;
use crate::storage::PriceStore;
use crate::types::{
    ArbError, City, Item, Opportunity, OpportunityFilter, Quote, SimulationResult, WeeklyAverage,
};

/// Trailing window for weekly averages.
const WEEKLY_WINDOW_DAYS: i64 = 7;

pub struct OpportunityQueries {
    store: Arc<dyn PriceStore>,
    cache: Arc<QuoteCache>,
    resolver: Arc<dyn QuoteResolver>,
    catalog: Arc<Catalog>,
    weekly_ttl: Duration,
}

impl OpportunityQueries {
    pub fn new(
        store: Arc<dyn PriceStore>,
        cache: Arc<QuoteCache>,
        resolver: Arc<dyn QuoteResolver>,
        catalog: Arc<Catalog>,
        weekly_ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            resolver,
            catalog,
            weekly_ttl,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn items(&self) -> &[Item] {
        self.catalog.items()
    }

    pub fn cities(&self) -> &[City] {
        self.catalog.cities()
    }

    /// Highest net profit first. Served from the cached set when live.
    pub async fn top_opportunities(&self, limit: u32) -> Result<Vec<Opportunity>, ArbError> {
        if let Some(mut cached) = self.cache.get_opportunities().await {
            debug!(cached = cached.len(), limit, "Top opportunities from cache");
            cached.sort_by(|a, b| b.net_profit.cmp(&a.net_profit));
            cached.truncate(limit as usize);
            return Ok(cached);
        }
        self.store.top_opportunities(limit).await
    }

    /// Rows matching `filter`, highest net profit first. Served from the
    /// cached set when live.
    pub async fn filtered_opportunities(
        &self,
        filter: &OpportunityFilter,
    ) -> Result<Vec<Opportunity>, ArbError> {
        if let Some(cached) = self.cache.get_opportunities().await {
            let mut rows: Vec<Opportunity> =
                cached.into_iter().filter(|opp| filter.matches(opp)).collect();
            debug!(matched = rows.len(), "Filtered opportunities from cache");
            rows.sort_by(|a, b| b.net_profit.cmp(&a.net_profit));
            rows.truncate(filter.effective_limit() as usize);
            return Ok(rows);
        }
        self.store.filtered_opportunities(filter).await
    }

    /// Trailing seven-day means per (item, city), cached for `weekly_ttl`.
    pub async fn weekly_averages(&self) -> Result<Vec<WeeklyAverage>, ArbError> {
        if let Some(cached) = self.cache.get_weekly_averages().await {
            return Ok(cached);
        }
        let averages = self
            .store
            .weekly_averages(Utc::now() - chrono::Duration::days(WEEKLY_WINDOW_DAYS))
            .await?;
        self.cache
            .put_weekly_averages(averages.clone(), self.weekly_ttl)
            .await;
        Ok(averages)
    }

    pub async fn manual_simulate(
        &self,
        buy_city: &str,
        sell_city: &str,
        family: Option<&str>,
    ) -> Result<SimulationResult, ArbError> {
        simulator::manual_simulate(&self.catalog, self.resolver.as_ref(), buy_city, sell_city, family)
            .await
    }

    /// Current quote by item code and city code or name.
    pub async fn quote(&self, item_code: &str, city: &str) -> Result<Option<Quote>, ArbError> {
        let item = self
            .catalog
            .item_by_code(item_code)
            .ok_or_else(|| ArbError::UnknownItem(item_code.to_string()))?;
        let city = self
            .catalog
            .city_by_code(city)
            .or_else(|| self.catalog.city_by_name(city))
            .ok_or_else(|| ArbError::UnknownCity(city.to_string()))?;
        self.resolver.resolve(item.id, city.id).await
    }

    /// Every stored quote.
    pub async fn quotes(&self) -> Result<Vec<Quote>, ArbError> {
        self.store.quotes().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
