//! SQLite schema, applied idempotently on connect.

/// Statements executed in order by `SqliteStore::migrate`.
pub const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS items (
        id      INTEGER PRIMARY KEY,
        code    TEXT NOT NULL UNIQUE,
        name    TEXT NOT NULL,
        family  TEXT NOT NULL,
        tier    INTEGER NOT NULL CHECK (tier IN (3, 5, 7)),
        rarity  TEXT NOT NULL,
        UNIQUE (family, tier)
    )",
    "CREATE TABLE IF NOT EXISTS cities (
        id    INTEGER PRIMARY KEY,
        name  TEXT NOT NULL UNIQUE,
        code  TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS quotes (
        item_id     INTEGER NOT NULL REFERENCES items(id),
        city_id     INTEGER NOT NULL REFERENCES cities(id),
        quality     INTEGER NOT NULL DEFAULT 1,
        ask_min     INTEGER NOT NULL DEFAULT 0 CHECK (ask_min >= 0),
        ask_max     INTEGER NOT NULL DEFAULT 0 CHECK (ask_max >= 0),
        bid_max     INTEGER NOT NULL DEFAULT 0 CHECK (bid_max >= 0),
        updated_at  INTEGER NOT NULL,
        PRIMARY KEY (item_id, city_id, quality)
    )",
    "CREATE TABLE IF NOT EXISTS price_history (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        item_id      INTEGER NOT NULL REFERENCES items(id),
        city_id      INTEGER NOT NULL REFERENCES cities(id),
        quality      INTEGER NOT NULL DEFAULT 1,
        ask_price    INTEGER NOT NULL,
        bid_price    INTEGER NOT NULL,
        kind         TEXT NOT NULL,
        recorded_at  INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_price_history_recorded_at ON price_history(recorded_at)",
    "CREATE INDEX IF NOT EXISTS idx_price_history_item_city ON price_history(item_id, city_id)",
    "CREATE TABLE IF NOT EXISTS opportunities (
        id                   INTEGER PRIMARY KEY AUTOINCREMENT,
        source_item_id       INTEGER NOT NULL REFERENCES items(id),
        target_item_id       INTEGER NOT NULL REFERENCES items(id),
        buy_city_id          INTEGER NOT NULL REFERENCES cities(id),
        sell_city_id         INTEGER NOT NULL REFERENCES cities(id),
        buy_price            INTEGER NOT NULL,
        sell_price           INTEGER NOT NULL,
        quantity_multiplier  INTEGER NOT NULL CHECK (quantity_multiplier IN (2, 4)),
        gross_profit         INTEGER NOT NULL,
        net_profit           TEXT NOT NULL,
        profit_margin        TEXT NOT NULL,
        computed_at          INTEGER NOT NULL,
        CHECK (buy_city_id <> sell_city_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_opportunities_source ON opportunities(source_item_id)",
];
