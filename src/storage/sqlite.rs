//! SQLite-backed `PriceStore` over a shared `sqlx` connection pool.
//!
//! Money values that must stay exact (`Decimal`) are stored as TEXT and
//! cast to REAL only for ordering and threshold comparisons. Timestamps are
//! stored as Unix milliseconds.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, info};

use super::{schema, PriceStore};
use crate::catalog::Catalog;
use crate::types::{
    ArbError, City, HistoryKind, Item, Opportunity, OpportunityFilter, PriceHistoryPoint, Quote,
    Tier, WeeklyAverage, DEFAULT_QUALITY,
};

/// Rows per multi-row INSERT (11 binds each, well under SQLite's variable limit).
const INSERT_CHUNK: usize = 80;

const OPPORTUNITY_COLUMNS: &str = "source_item_id, target_item_id, buy_city_id, sell_city_id, \
     buy_price, sell_price, quantity_multiplier, gross_profit, net_profit, profit_margin, computed_at";

const QUOTE_COLUMNS: &str = "item_id, city_id, quality, ask_min, ask_max, bid_max, updated_at";

const HISTORY_COLUMNS: &str = "item_id, city_id, quality, ask_price, bid_price, kind, recorded_at";

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Pooled SQLite store. Cloning shares the pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and apply the schema.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, ArbError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        info!(url, max_connections, "Price store connected");
        Ok(store)
    }

    /// Private in-memory database on a single long-lived connection.
    pub async fn in_memory() -> Result<Self, ArbError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), ArbError> {
        for statement in schema::STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert the catalog's reference data. Existing rows are left untouched.
    pub async fn seed(&self, catalog: &Catalog) -> Result<(), ArbError> {
        let mut tx = self.pool.begin().await?;
        for item in catalog.items() {
            sqlx::query(
                "INSERT OR IGNORE INTO items (id, code, name, family, tier, rarity) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(item.id)
            .bind(&item.code)
            .bind(&item.name)
            .bind(&item.family)
            .bind(i64::from(item.tier.number()))
            .bind(&item.rarity)
            .execute(&mut *tx)
            .await?;
        }
        for city in catalog.cities() {
            sqlx::query("INSERT OR IGNORE INTO cities (id, name, code) VALUES (?, ?, ?)")
                .bind(city.id)
                .bind(&city.name)
                .bind(&city.code)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!(
            items = catalog.items().len(),
            cities = catalog.cities().len(),
            "Reference data seeded"
        );
        Ok(())
    }

    /// Load the reference data back as an in-memory catalog.
    pub async fn load_catalog(&self) -> Result<Catalog, ArbError> {
        Ok(Catalog::new(self.items().await?, self.cities().await?))
    }
}

#[async_trait]
impl PriceStore for SqliteStore {
    async fn items(&self) -> Result<Vec<Item>, ArbError> {
        let rows = sqlx::query("SELECT id, code, name, family, tier, rarity FROM items ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn cities(&self) -> Result<Vec<City>, ArbError> {
        let rows = sqlx::query("SELECT id, name, code FROM cities ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(city_from_row).collect()
    }

    async fn quote(&self, item_id: i64, city_id: i64) -> Result<Option<Quote>, ArbError> {
        let row = sqlx::query(&format!(
            "SELECT {QUOTE_COLUMNS} FROM quotes WHERE item_id = ? AND city_id = ? AND quality = ?"
        ))
        .bind(item_id)
        .bind(city_id)
        .bind(DEFAULT_QUALITY)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(quote_from_row).transpose()
    }

    async fn quotes(&self) -> Result<Vec<Quote>, ArbError> {
        let rows = sqlx::query(&format!(
            "SELECT {QUOTE_COLUMNS} FROM quotes ORDER BY item_id, city_id, quality"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(quote_from_row).collect()
    }

    async fn upsert_quote(&self, quote: &Quote) -> Result<(), ArbError> {
        sqlx::query(&format!(
            "INSERT INTO quotes ({QUOTE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (item_id, city_id, quality) DO UPDATE SET \
                 ask_min = excluded.ask_min, \
                 ask_max = excluded.ask_max, \
                 bid_max = excluded.bid_max, \
                 updated_at = excluded.updated_at"
        ))
        .bind(quote.item_id)
        .bind(quote.city_id)
        .bind(quote.quality)
        .bind(quote.ask_min)
        .bind(quote.ask_max)
        .bind(quote.bid_max)
        .bind(quote.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_history(&self, point: &PriceHistoryPoint) -> Result<(), ArbError> {
        sqlx::query(&format!(
            "INSERT INTO price_history ({HISTORY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(point.item_id)
        .bind(point.city_id)
        .bind(point.quality)
        .bind(point.ask_price)
        .bind(point.bid_price)
        .bind(point.kind.as_str())
        .bind(point.recorded_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn price_history(
        &self,
        item_id: i64,
        city_id: i64,
    ) -> Result<Vec<PriceHistoryPoint>, ArbError> {
        let rows = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM price_history \
             WHERE item_id = ? AND city_id = ? ORDER BY id"
        ))
        .bind(item_id)
        .bind(city_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(history_from_row).collect()
    }

    async fn rollover_history(&self, at: DateTime<Utc>) -> Result<u64, ArbError> {
        let result = sqlx::query(&format!(
            "INSERT INTO price_history ({HISTORY_COLUMNS}) \
             SELECT item_id, city_id, quality, ask_min, bid_max, ?, ? FROM quotes"
        ))
        .bind(HistoryKind::Rollover.as_str())
        .bind(at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn weekly_averages(&self, since: DateTime<Utc>) -> Result<Vec<WeeklyAverage>, ArbError> {
        let rows = sqlx::query(
            "SELECT ph.item_id, i.name AS item_name, ph.city_id, c.name AS city_name, \
                    c.code AS city_code, \
                    AVG(NULLIF(ph.bid_price, 0)) AS weekly_avg_buy, \
                    AVG(NULLIF(ph.ask_price, 0)) AS weekly_avg_sell, \
                    COUNT(*) AS samples \
             FROM price_history ph \
             JOIN items i ON i.id = ph.item_id \
             JOIN cities c ON c.id = ph.city_id \
             WHERE ph.recorded_at >= ? \
             GROUP BY ph.item_id, ph.city_id, i.name, c.name, c.code \
             ORDER BY ph.item_id, ph.city_id",
        )
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<WeeklyAverage, ArbError> {
                Ok(WeeklyAverage {
                    item_id: row.try_get("item_id")?,
                    item_name: row.try_get("item_name")?,
                    city_id: row.try_get("city_id")?,
                    city_name: row.try_get("city_name")?,
                    city_code: row.try_get("city_code")?,
                    weekly_avg_buy: row.try_get("weekly_avg_buy")?,
                    weekly_avg_sell: row.try_get("weekly_avg_sell")?,
                    samples: row.try_get("samples")?,
                })
            })
            .collect()
    }

    async fn replace_opportunities(&self, opportunities: &[Opportunity]) -> Result<(), ArbError> {
        // Dropping `tx` on any early return rolls the whole replacement back.
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM opportunities").execute(&mut *tx).await?;

        for chunk in opportunities.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("INSERT INTO opportunities ({OPPORTUNITY_COLUMNS}) "));
            qb.push_values(chunk, |mut b, opp| {
                b.push_bind(opp.source_item_id)
                    .push_bind(opp.target_item_id)
                    .push_bind(opp.buy_city_id)
                    .push_bind(opp.sell_city_id)
                    .push_bind(opp.buy_price)
                    .push_bind(opp.sell_price)
                    .push_bind(i64::from(opp.quantity_multiplier))
                    .push_bind(opp.gross_profit)
                    .push_bind(opp.net_profit.to_string())
                    .push_bind(opp.profit_margin.to_string())
                    .push_bind(opp.computed_at.timestamp_millis());
            });
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        debug!(count = opportunities.len(), "Opportunity table replaced");
        Ok(())
    }

    async fn opportunities(&self) -> Result<Vec<Opportunity>, ArbError> {
        let rows = sqlx::query(&format!(
            "SELECT {OPPORTUNITY_COLUMNS} FROM opportunities ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(opportunity_from_row).collect()
    }

    async fn top_opportunities(&self, limit: u32) -> Result<Vec<Opportunity>, ArbError> {
        let rows = sqlx::query(&format!(
            "SELECT {OPPORTUNITY_COLUMNS} FROM opportunities \
             ORDER BY CAST(net_profit AS REAL) DESC, id ASC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(opportunity_from_row).collect()
    }

    async fn filtered_opportunities(
        &self,
        filter: &OpportunityFilter,
    ) -> Result<Vec<Opportunity>, ArbError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {OPPORTUNITY_COLUMNS} FROM opportunities WHERE 1 = 1"
        ));
        if let Some(min) = filter.min_profit {
            qb.push(" AND CAST(net_profit AS REAL) >= ")
                .push_bind(min.to_f64().unwrap_or_default());
        }
        if let Some(min) = filter.min_margin {
            qb.push(" AND CAST(profit_margin AS REAL) >= ")
                .push_bind(min.to_f64().unwrap_or_default());
        }
        if let Some(item_id) = filter.source_item {
            qb.push(" AND source_item_id = ").push_bind(item_id);
        }
        qb.push(" ORDER BY CAST(net_profit AS REAL) DESC, id ASC LIMIT ")
            .push_bind(i64::from(filter.effective_limit()));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(opportunity_from_row).collect()
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn from_millis(ms: i64) -> Result<DateTime<Utc>, ArbError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| ArbError::Decode(format!("timestamp out of range: {ms}")))
}

fn decimal(row: &SqliteRow, column: &str) -> Result<Decimal, ArbError> {
    let text: String = row.try_get(column)?;
    Decimal::from_str(&text).map_err(|e| ArbError::Decode(format!("{column}={text}: {e}")))
}

fn item_from_row(row: &SqliteRow) -> Result<Item, ArbError> {
    let tier: i64 = row.try_get("tier")?;
    let tier = u8::try_from(tier)
        .map_err(|_| ArbError::Decode(format!("tier {tier}")))
        .and_then(Tier::try_from)?;
    Ok(Item {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        family: row.try_get("family")?,
        tier,
        rarity: row.try_get("rarity")?,
    })
}

fn city_from_row(row: &SqliteRow) -> Result<City, ArbError> {
    Ok(City {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        code: row.try_get("code")?,
    })
}

fn quote_from_row(row: &SqliteRow) -> Result<Quote, ArbError> {
    Ok(Quote {
        item_id: row.try_get("item_id")?,
        city_id: row.try_get("city_id")?,
        quality: row.try_get("quality")?,
        ask_min: row.try_get("ask_min")?,
        ask_max: row.try_get("ask_max")?,
        bid_max: row.try_get("bid_max")?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
    })
}

fn history_from_row(row: &SqliteRow) -> Result<PriceHistoryPoint, ArbError> {
    let kind: String = row.try_get("kind")?;
    Ok(PriceHistoryPoint {
        item_id: row.try_get("item_id")?,
        city_id: row.try_get("city_id")?,
        quality: row.try_get("quality")?,
        ask_price: row.try_get("ask_price")?,
        bid_price: row.try_get("bid_price")?,
        kind: kind.parse()?,
        recorded_at: from_millis(row.try_get("recorded_at")?)?,
    })
}

fn opportunity_from_row(row: &SqliteRow) -> Result<Opportunity, ArbError> {
    let multiplier: i64 = row.try_get("quantity_multiplier")?;
    Ok(Opportunity {
        source_item_id: row.try_get("source_item_id")?,
        target_item_id: row.try_get("target_item_id")?,
        buy_city_id: row.try_get("buy_city_id")?,
        sell_city_id: row.try_get("sell_city_id")?,
        buy_price: row.try_get("buy_price")?,
        sell_price: row.try_get("sell_price")?,
        quantity_multiplier: u32::try_from(multiplier)
            .map_err(|_| ArbError::Decode(format!("quantity_multiplier {multiplier}")))?,
        gross_profit: row.try_get("gross_profit")?,
        net_profit: decimal(row, "net_profit")?,
        profit_margin: decimal(row, "profit_margin")?,
        computed_at: from_millis(row.try_get("computed_at")?)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
