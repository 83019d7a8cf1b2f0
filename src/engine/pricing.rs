//! Conversion paths and the profit formula.
//!
//! A conversion consumes one unit of a higher-tier item and yields a fixed
//! number of lower-tier units of the same family. Revenue from selling the
//! output is taxed at `SALES_TAX_RATE`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::{Opportunity, Tier};

/// Fraction of gross revenue lost to sales tax.
pub const SALES_TAX_RATE: Decimal = dec!(0.04);

/// The three supported tier conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionPath {
    /// One T5 yields two T3.
    FiveToThree,
    /// One T7 yields two T5.
    SevenToFive,
    /// One T7 yields four T3.
    SevenToThree,
}

impl ConversionPath {
    /// Evaluation order for every family and city pair.
    pub const ALL: [ConversionPath; 3] = [
        ConversionPath::FiveToThree,
        ConversionPath::SevenToFive,
        ConversionPath::SevenToThree,
    ];

    pub fn source_tier(self) -> Tier {
        match self {
            ConversionPath::FiveToThree => Tier::T5,
            ConversionPath::SevenToFive | ConversionPath::SevenToThree => Tier::T7,
        }
    }

    pub fn target_tier(self) -> Tier {
        match self {
            ConversionPath::FiveToThree | ConversionPath::SevenToThree => Tier::T3,
            ConversionPath::SevenToFive => Tier::T5,
        }
    }

    /// Output units per input unit.
    pub fn multiplier(self) -> u32 {
        match self {
            ConversionPath::FiveToThree | ConversionPath::SevenToFive => 2,
            ConversionPath::SevenToThree => 4,
        }
    }

    /// Human-readable label, e.g. `T5_X → 2x T3_X`.
    pub fn label(self, source_code: &str, target_code: &str) -> String {
        format!("{source_code} → {}x {target_code}", self.multiplier())
    }
}

/// Profit figures for one conversion at given prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub path: ConversionPath,
    /// Unit cost of the source item.
    pub cost: i64,
    /// Unit bid for the target item.
    pub unit_sell: i64,
    /// `unit_sell × multiplier`
    pub gross_revenue: i64,
    /// `gross_revenue − cost`, before tax.
    pub gross_profit: i64,
    pub net_revenue: Decimal,
    pub net_profit: Decimal,
    /// Percentage of cost; zero when cost is not positive.
    pub profit_margin: Decimal,
}

impl Evaluation {
    pub fn into_opportunity(
        self,
        source_item_id: i64,
        target_item_id: i64,
        buy_city_id: i64,
        sell_city_id: i64,
        computed_at: DateTime<Utc>,
    ) -> Opportunity {
        Opportunity {
            source_item_id,
            target_item_id,
            buy_city_id,
            sell_city_id,
            buy_price: self.cost,
            sell_price: self.unit_sell,
            quantity_multiplier: self.path.multiplier(),
            gross_profit: self.gross_profit,
            net_profit: self.net_profit,
            profit_margin: self.profit_margin,
            computed_at,
        }
    }
}

/// Apply the profit formula to any prices.
///
/// `None` when the integer silver figures do not fit in an `i64`.
pub fn evaluate(path: ConversionPath, cost: i64, unit_sell: i64) -> Option<Evaluation> {
    let gross_revenue = unit_sell.checked_mul(i64::from(path.multiplier()))?;
    let gross_profit = gross_revenue.checked_sub(cost)?;
    let net_revenue = Decimal::from(gross_revenue) * (Decimal::ONE - SALES_TAX_RATE);
    let net_profit = net_revenue - Decimal::from(cost);
    let profit_margin = if cost > 0 {
        net_profit / Decimal::from(cost) * dec!(100)
    } else {
        Decimal::ZERO
    };

    Some(Evaluation {
        path,
        cost,
        unit_sell,
        gross_revenue,
        gross_profit,
        net_revenue,
        net_profit,
        profit_margin,
    })
}

/// Evaluate only when both legs are known (strictly positive).
///
/// Unprofitable results are still returned; missing prices and figures
/// out of range are skipped.
pub fn evaluate_tradeable(path: ConversionPath, cost: i64, unit_sell: i64) -> Option<Evaluation> {
    if cost <= 0 || unit_sell <= 0 {
        return None;
    }
    evaluate(path, cost, unit_sell)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
