//! Reference data: the monitored item catalog and the six trading cities.
//!
//! Seeded once into the store at startup. Family and tier are assigned here
//! as explicit attributes; nothing downstream derives them from item codes.

use std::collections::HashMap;

use crate::types::{City, Item, Opportunity, OpportunityView, Tier};

/// (family key, display name) for every monitored ingredient family.
pub const FAMILIES: [(&str, &str); 7] = [
    ("PANTHER", "Shadow Claws"),
    ("ENT", "Sylvian Root"),
    ("DIREBEAR", "Spirit Paws"),
    ("WEREWOLF", "Werewolf Fangs"),
    ("IMP", "Imp's Horn"),
    ("ELEMENTAL", "Runestone Tooth"),
    ("EAGLE", "Dawnfeather"),
];

/// (id, display name, feed location code).
pub const CITIES: [(i64, &str, &str); 6] = [
    (1, "Bridgewatch", "2004"),
    (2, "Martlock", "4002"),
    (3, "Thetford", "0007"),
    (4, "Fort Sterling", "3005"),
    (5, "Lymhurst", "1002"),
    (6, "Caerleon", "3003"),
];

const RARITY: &str = "RARE";

/// Feed code for a family/tier, e.g. `T5_ALCHEMY_RARE_PANTHER`.
pub fn item_code(family: &str, tier: Tier) -> String {
    format!("{tier}_ALCHEMY_{RARITY}_{family}")
}

/// All seed items, ids assigned family-major then tier ascending.
pub fn seed_items() -> Vec<Item> {
    let mut items = Vec::with_capacity(FAMILIES.len() * Tier::ALL.len());
    let mut id = 1;
    for (family, display) in FAMILIES {
        for tier in Tier::ALL {
            items.push(Item {
                id,
                code: item_code(family, tier),
                name: format!("{} {}", tier.prefix(), display),
                family: family.to_string(),
                tier,
                rarity: RARITY.to_string(),
            });
            id += 1;
        }
    }
    items
}

pub fn seed_cities() -> Vec<City> {
    CITIES
        .iter()
        .map(|&(id, name, code)| City {
            id,
            name: name.to_string(),
            code: code.to_string(),
        })
        .collect()
}

/// Tier members of one family. Any tier may be missing.
#[derive(Debug, Clone, Default)]
pub struct FamilyTiers {
    pub family: String,
    pub t3: Option<Item>,
    pub t5: Option<Item>,
    pub t7: Option<Item>,
}

impl FamilyTiers {
    pub fn get(&self, tier: Tier) -> Option<&Item> {
        match tier {
            Tier::T3 => self.t3.as_ref(),
            Tier::T5 => self.t5.as_ref(),
            Tier::T7 => self.t7.as_ref(),
        }
    }

    fn slot(&mut self, tier: Tier) -> &mut Option<Item> {
        match tier {
            Tier::T3 => &mut self.t3,
            Tier::T5 => &mut self.t5,
            Tier::T7 => &mut self.t7,
        }
    }
}

/// In-memory index over the immutable reference data.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Vec<Item>,
    cities: Vec<City>,
    items_by_code: HashMap<String, usize>,
    cities_by_code: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(items: Vec<Item>, cities: Vec<City>) -> Self {
        let items_by_code = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.code.clone(), i))
            .collect();
        let cities_by_code = cities
            .iter()
            .enumerate()
            .map(|(i, city)| (city.code.clone(), i))
            .collect();
        Self {
            items,
            cities,
            items_by_code,
            cities_by_code,
        }
    }

    /// Catalog over the built-in seed data.
    pub fn seeded() -> Self {
        Self::new(seed_items(), seed_cities())
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn cities(&self) -> &[City] {
        &self.cities
    }

    pub fn item_by_code(&self, code: &str) -> Option<&Item> {
        self.items_by_code.get(code).map(|&i| &self.items[i])
    }

    pub fn item_by_id(&self, id: i64) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn city_by_code(&self, code: &str) -> Option<&City> {
        self.cities_by_code.get(code).map(|&i| &self.cities[i])
    }

    pub fn city_by_id(&self, id: i64) -> Option<&City> {
        self.cities.iter().find(|city| city.id == id)
    }

    /// Attach item and city names. Ids missing from the catalog stay `None`.
    pub fn describe(&self, opportunity: Opportunity) -> OpportunityView {
        let source = self.item_by_id(opportunity.source_item_id);
        let target = self.item_by_id(opportunity.target_item_id);
        OpportunityView {
            source_item_name: source.map(|i| i.name.clone()),
            source_tier: source.map(|i| i.tier),
            target_item_name: target.map(|i| i.name.clone()),
            target_tier: target.map(|i| i.tier),
            buy_city_name: self.city_by_id(opportunity.buy_city_id).map(|c| c.name.clone()),
            sell_city_name: self.city_by_id(opportunity.sell_city_id).map(|c| c.name.clone()),
            opportunity,
        }
    }

    /// Case-insensitive lookup by display name.
    pub fn city_by_name(&self, name: &str) -> Option<&City> {
        let name = name.trim();
        self.cities.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Families sorted by key, each with its tier members.
    ///
    /// A second item for an already-filled tier is ignored (at most one item
    /// per tier within a family).
    pub fn families(&self) -> Vec<FamilyTiers> {
        let mut by_family: std::collections::BTreeMap<&str, FamilyTiers> = Default::default();
        for item in &self.items {
            let entry = by_family.entry(item.family.as_str()).or_insert_with(|| FamilyTiers {
                family: item.family.clone(),
                ..Default::default()
            });
            let slot = entry.slot(item.tier);
            if slot.is_none() {
                *slot = Some(item.clone());
            }
        }
        by_family.into_values().collect()
    }

    /// Tiers for a single family, matched case-insensitively.
    pub fn family(&self, family: &str) -> Option<FamilyTiers> {
        self.families()
            .into_iter()
            .find(|f| f.family.eq_ignore_ascii_case(family.trim()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_sizes() {
        assert_eq!(seed_items().len(), 21);
        assert_eq!(seed_cities().len(), 6);
    }

    #[test]
    fn test_item_codes_and_names() {
        let items = seed_items();
        let t5 = items.iter().find(|i| i.code == "T5_ALCHEMY_RARE_PANTHER").unwrap();
        assert_eq!(t5.family, "PANTHER");
        assert_eq!(t5.tier, Tier::T5);
        assert_eq!(t5.name, "Fine Shadow Claws");

        let t7 = items.iter().find(|i| i.code == "T7_ALCHEMY_RARE_ENT").unwrap();
        assert_eq!(t7.name, "Excellent Sylvian Root");
    }

    #[test]
    fn test_item_ids_unique() {
        let items = seed_items();
        let mut ids: Vec<_> = items.iter().map(|i| i.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), items.len());
    }

    #[test]
    fn test_city_lookup() {
        let catalog = Catalog::seeded();
        assert_eq!(catalog.city_by_code("0007").unwrap().name, "Thetford");
        assert_eq!(catalog.city_by_name("fort sterling").unwrap().id, 4);
        assert!(catalog.city_by_code("9999").is_none());
        assert!(catalog.city_by_name("Brecilien").is_none());
    }

    #[test]
    fn test_describe_opportunity() {
        let catalog = Catalog::seeded();
        let opp = Opportunity {
            source_item_id: 2,
            target_item_id: 1,
            buy_city_id: 1,
            sell_city_id: 99,
            buy_price: 150,
            sell_price: 100,
            quantity_multiplier: 2,
            gross_profit: 50,
            net_profit: rust_decimal::Decimal::from(42),
            profit_margin: rust_decimal::Decimal::from(28),
            computed_at: chrono::Utc::now(),
        };
        let view = catalog.describe(opp.clone());
        assert_eq!(view.source_item_name.as_deref(), Some("Fine Shadow Claws"));
        assert_eq!(view.source_tier, Some(Tier::T5));
        assert_eq!(view.target_tier, Some(Tier::T3));
        assert_eq!(view.buy_city_name.as_deref(), Some("Bridgewatch"));
        assert_eq!(view.sell_city_name, None);
        assert_eq!(view.opportunity, opp);
    }

    #[test]
    fn test_item_lookup() {
        let catalog = Catalog::seeded();
        let eagle = catalog.item_by_code("T3_ALCHEMY_RARE_EAGLE").unwrap();
        assert_eq!(catalog.item_by_id(eagle.id), Some(eagle));
        assert!(catalog.item_by_code("T4_BAG").is_none());
        assert_eq!(catalog.city_by_id(6).unwrap().name, "Caerleon");
        assert!(catalog.city_by_id(7).is_none());
    }

    #[test]
    fn test_families_complete() {
        let catalog = Catalog::seeded();
        let families = catalog.families();
        assert_eq!(families.len(), 7);
        for f in &families {
            assert!(f.t3.is_some() && f.t5.is_some() && f.t7.is_some(), "{}", f.family);
        }
        // sorted by key
        assert_eq!(families[0].family, "DIREBEAR");
    }

    #[test]
    fn test_family_with_missing_tier() {
        let items: Vec<Item> = seed_items()
            .into_iter()
            .filter(|i| !(i.family == "IMP" && i.tier == Tier::T5))
            .collect();
        let catalog = Catalog::new(items, seed_cities());
        let imp = catalog.family("imp").unwrap();
        assert!(imp.t3.is_some());
        assert!(imp.t5.is_none());
        assert!(imp.get(Tier::T7).is_some());
        assert!(catalog.family("DRAGON").is_none());
    }
}
