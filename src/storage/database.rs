//! SQLite database for persistent storage

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::storage::{
    CatalogCard, CollectionEntry, CollectionItem, CollectionStats, CollectionStore, NewCatalogCard,
    StoreError,
};

const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cards (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL,
    name TEXT NOT NULL,
    set_code TEXT NOT NULL,
    variant TEXT NOT NULL,
    rarity TEXT NOT NULL,
    card_type TEXT NOT NULL,
    image_url TEXT,
    market_price_eur REAL NOT NULL DEFAULT 0,
    UNIQUE (code, variant)
);

CREATE TABLE IF NOT EXISTS user_collection (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    card_id TEXT NOT NULL REFERENCES cards(id),
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    is_foil INTEGER NOT NULL DEFAULT 0,
    scanned_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_user_collection_user
    ON user_collection (user_id, scanned_at);
";

const ITEM_COLUMNS: &str = "
    uc.id, uc.user_id, uc.card_id, uc.quantity, uc.is_foil, uc.scanned_at,
    c.id, c.code, c.name, c.set_code, c.variant, c.rarity, c.card_type, c.image_url, c.market_price_eur
";

/// Database connection wrapper
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create database at path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {:?}", path))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        info!("Opened collection database at {:?}", path);
        Ok(db)
    }

    /// Open a throwaway database in memory
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    pub fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.pragma_update(None, "foreign_keys", true)?;

        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .context("failed to read user_version pragma")?;
        if version > SCHEMA_VERSION {
            bail!(
                "database version ({}) is newer than supported schema ({})",
                version,
                SCHEMA_VERSION
            );
        }

        conn.execute_batch(SCHEMA)
            .context("failed to create collection schema")?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    fn query_items(&self, user_id: &str, limit: i64) -> Result<Vec<CollectionItem>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM user_collection uc
             JOIN cards c ON c.id = uc.card_id
             WHERE uc.user_id = ?1
             ORDER BY uc.scanned_at DESC, uc.rowid DESC
             LIMIT ?2",
            ITEM_COLUMNS
        ))?;
        let items = stmt
            .query_map(params![user_id, limit], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn get_entry(conn: &Connection, entry_id: &str) -> Result<Option<CollectionEntry>, StoreError> {
        let entry = conn
            .query_row(
                "SELECT id, user_id, card_id, quantity, is_foil, scanned_at
                 FROM user_collection WHERE id = ?1",
                params![entry_id],
                |row| row_to_entry(row, 0),
            )
            .optional()?;
        Ok(entry)
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    // Fixed width so that text ordering matches time ordering
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn row_to_entry(row: &Row, offset: usize) -> rusqlite::Result<CollectionEntry> {
    let scanned_at: String = row.get(offset + 5)?;
    Ok(CollectionEntry {
        id: row.get(offset)?,
        user_id: row.get(offset + 1)?,
        card_id: row.get(offset + 2)?,
        quantity: row.get(offset + 3)?,
        is_foil: row.get(offset + 4)?,
        scanned_at: parse_timestamp(&scanned_at, offset + 5)?,
    })
}

fn row_to_card(row: &Row, offset: usize) -> rusqlite::Result<CatalogCard> {
    Ok(CatalogCard {
        id: row.get(offset)?,
        code: row.get(offset + 1)?,
        name: row.get(offset + 2)?,
        set_code: row.get(offset + 3)?,
        variant: row.get(offset + 4)?,
        rarity: row.get(offset + 5)?,
        card_type: row.get(offset + 6)?,
        image_url: row.get(offset + 7)?,
        market_price_eur: row.get(offset + 8)?,
    })
}

fn row_to_item(row: &Row) -> rusqlite::Result<CollectionItem> {
    Ok(CollectionItem {
        entry: row_to_entry(row, 0)?,
        card: row_to_card(row, 6)?,
    })
}

impl CollectionStore for Database {
    fn find_catalog_card(&self, code: &str, variant: &str) -> Result<Option<CatalogCard>, StoreError> {
        let conn = self.conn.lock();
        let card = conn
            .query_row(
                "SELECT id, code, name, set_code, variant, rarity, card_type, image_url, market_price_eur
                 FROM cards WHERE code = ?1 AND variant = ?2",
                params![code, variant],
                |row| row_to_card(row, 0),
            )
            .optional()?;
        Ok(card)
    }

    fn create_catalog_card(&self, card: &NewCatalogCard) -> Result<CatalogCard, StoreError> {
        let id = Uuid::new_v4().to_string();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO cards (id, code, name, set_code, variant, rarity, card_type, image_url, market_price_eur)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                card.code,
                card.name,
                card.set_code,
                card.variant,
                card.rarity,
                card.card_type,
                card.image_url,
                card.market_price_eur,
            ],
        )?;
        debug!("Created catalog card {} ({}) as {}", card.code, card.variant, id);

        Ok(CatalogCard {
            id,
            code: card.code.clone(),
            name: card.name.clone(),
            set_code: card.set_code.clone(),
            variant: card.variant.clone(),
            rarity: card.rarity.clone(),
            card_type: card.card_type.clone(),
            image_url: card.image_url.clone(),
            market_price_eur: card.market_price_eur,
        })
    }

    fn upsert_catalog_cards(&self, cards: &[NewCatalogCard]) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO cards (id, code, name, set_code, variant, rarity, card_type, image_url, market_price_eur)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (code, variant) DO UPDATE SET
                    name = excluded.name,
                    set_code = excluded.set_code,
                    rarity = excluded.rarity,
                    card_type = excluded.card_type,
                    image_url = excluded.image_url,
                    market_price_eur = excluded.market_price_eur",
            )?;
            for card in cards {
                stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    card.code,
                    card.name,
                    card.set_code,
                    card.variant,
                    card.rarity,
                    card.card_type,
                    card.image_url,
                    card.market_price_eur,
                ])?;
            }
        }
        tx.commit()?;
        Ok(cards.len())
    }

    fn insert_collection_entry(
        &self,
        user_id: &str,
        card_id: &str,
        quantity: i64,
        is_foil: bool,
    ) -> Result<CollectionEntry, StoreError> {
        if quantity < 1 {
            return Err(StoreError::InvalidQuantity(quantity));
        }

        let entry = CollectionEntry {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            card_id: card_id.to_string(),
            quantity,
            is_foil,
            scanned_at: Utc::now(),
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO user_collection (id, user_id, card_id, quantity, is_foil, scanned_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.id,
                entry.user_id,
                entry.card_id,
                entry.quantity,
                entry.is_foil,
                format_timestamp(&entry.scanned_at),
            ],
        )?;
        Ok(entry)
    }

    fn list_collection(&self, user_id: &str) -> Result<Vec<CollectionItem>, StoreError> {
        self.query_items(user_id, -1)
    }

    fn recent_scans(&self, user_id: &str, limit: usize) -> Result<Vec<CollectionItem>, StoreError> {
        self.query_items(user_id, i64::try_from(limit).unwrap_or(i64::MAX))
    }

    fn update_quantity(&self, entry_id: &str, quantity: i64) -> Result<Option<CollectionEntry>, StoreError> {
        if quantity <= 0 {
            return if self.delete_entry(entry_id)? {
                Ok(None)
            } else {
                Err(StoreError::EntryNotFound(entry_id.to_string()))
            };
        }

        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE user_collection SET quantity = ?1 WHERE id = ?2",
            params![quantity, entry_id],
        )?;
        if changed == 0 {
            return Err(StoreError::EntryNotFound(entry_id.to_string()));
        }
        Self::get_entry(&conn, entry_id)
    }

    fn delete_entry(&self, entry_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM user_collection WHERE id = ?1", params![entry_id])?;
        Ok(changed > 0)
    }

    fn stats(&self, user_id: &str) -> Result<CollectionStats, StoreError> {
        let conn = self.conn.lock();
        let stats = conn.query_row(
            "SELECT COALESCE(SUM(quantity), 0), COUNT(DISTINCT card_id),
                    COALESCE(SUM(is_foil), 0), MAX(scanned_at)
             FROM user_collection WHERE user_id = ?1",
            params![user_id],
            |row| {
                let last_scan: Option<String> = row.get(3)?;
                Ok(CollectionStats {
                    total_cards: row.get(0)?,
                    unique_cards: row.get(1)?,
                    alt_arts: row.get(2)?,
                    last_scan: last_scan.map(|s| parse_timestamp(&s, 3)).transpose()?,
                })
            },
        )?;
        Ok(stats)
    }
}
