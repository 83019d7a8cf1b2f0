//! On-demand simulation for one (buy city, sell city) pair.
//!
//! Applies the same per-path arithmetic as the periodic engine but reports
//! every path whose two quotes exist, including zero legs and losses.

use tracing::{debug, warn};

use super::pricing::{self, ConversionPath};
use super::resolver::QuoteResolver;
use crate::catalog::{Catalog, FamilyTiers};
use crate::types::{ArbError, City, FamilyScenarios, ManualScenario, SimulationResult};

/// Simulate every family, or only `family` when given.
///
/// Cities are matched by name, case-insensitively. An unknown family yields
/// an empty scenario list.
pub async fn manual_simulate(
    catalog: &Catalog,
    resolver: &dyn QuoteResolver,
    buy_city: &str,
    sell_city: &str,
    family: Option<&str>,
) -> Result<SimulationResult, ArbError> {
    let buy = catalog
        .city_by_name(buy_city)
        .ok_or_else(|| ArbError::UnknownCity(buy_city.to_string()))?;
    let sell = catalog
        .city_by_name(sell_city)
        .ok_or_else(|| ArbError::UnknownCity(sell_city.to_string()))?;

    let result = match family {
        Some(name) => {
            let scenarios = match catalog.family(name) {
                Some(tiers) => family_scenarios(resolver, &tiers, buy, sell).await?,
                None => Vec::new(),
            };
            SimulationResult::Scenarios(scenarios)
        }
        None => {
            let mut grouped = Vec::new();
            for tiers in catalog.families() {
                let scenarios = family_scenarios(resolver, &tiers, buy, sell).await?;
                if !scenarios.is_empty() {
                    grouped.push(FamilyScenarios {
                        family: tiers.family.clone(),
                        scenarios,
                    });
                }
            }
            SimulationResult::Grouped(grouped)
        }
    };

    debug!(
        buy = %buy.name,
        sell = %sell.name,
        scenarios = result.scenario_count(),
        "Manual simulation evaluated"
    );
    Ok(result)
}

async fn family_scenarios(
    resolver: &dyn QuoteResolver,
    tiers: &FamilyTiers,
    buy: &City,
    sell: &City,
) -> Result<Vec<ManualScenario>, ArbError> {
    let mut scenarios = Vec::new();
    for path in ConversionPath::ALL {
        let (Some(source), Some(target)) = (tiers.get(path.source_tier()), tiers.get(path.target_tier()))
        else {
            continue;
        };
        let (Some(buy_quote), Some(sell_quote)) = (
            resolver.resolve(source.id, buy.id).await?,
            resolver.resolve(target.id, sell.id).await?,
        ) else {
            continue;
        };

        let Some(eval) = pricing::evaluate(path, buy_quote.ask_min, sell_quote.bid_max) else {
            warn!(
                path = ?path,
                buy_price = buy_quote.ask_min,
                sell_price = sell_quote.bid_max,
                "Prices out of range, scenario skipped"
            );
            continue;
        };
        scenarios.push(ManualScenario {
            conversion: path.label(&source.code, &target.code),
            source_item: source.clone(),
            target_item: target.clone(),
            buy_city: buy.name.clone(),
            sell_city: sell.name.clone(),
            buy_price: eval.cost,
            buy_qty: 1,
            unit_sell_price: eval.unit_sell,
            sell_qty: path.multiplier(),
            total_sell_price: eval.gross_revenue,
            net_revenue: eval.net_revenue,
            net_profit: eval.net_profit,
            profit_margin: eval.profit_margin,
        });
    }
    Ok(scenarios)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
