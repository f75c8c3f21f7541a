//! Storage Layer
//!
//! The collection store keeps the card catalog and each user's scanned
//! cards. The scanner talks to it through `CollectionStore`; the shipped
//! implementation is SQLite.

pub mod bridge;
pub mod catalog;
pub mod database;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

pub use bridge::{CatalogPolicy, PersistenceBridge};
pub use database::Database;

/// Catalog variant for regular printings
pub const VARIANT_NORMAL: &str = "Normal";
/// Catalog variant for alt-art printings
pub const VARIANT_PARALLEL: &str = "Parallel";

/// Catalog variant name for the alt-art flag
pub fn variant_for(is_alt_art: bool) -> &'static str {
    if is_alt_art {
        VARIANT_PARALLEL
    } else {
        VARIANT_NORMAL
    }
}

/// Collection store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("collection entry {0} not found")]
    EntryNotFound(String),
    #[error("invalid quantity {0}, must be at least 1")]
    InvalidQuantity(i64),
}

/// A card in the master catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogCard {
    pub id: String,
    pub code: String,
    pub name: String,
    pub set_code: String,
    pub variant: String,
    pub rarity: String,
    pub card_type: String,
    pub image_url: Option<String>,
    pub market_price_eur: f64,
}

/// Fields for creating or upserting a catalog card
#[derive(Debug, Clone, PartialEq)]
pub struct NewCatalogCard {
    pub code: String,
    pub name: String,
    pub set_code: String,
    pub variant: String,
    pub rarity: String,
    pub card_type: String,
    pub image_url: Option<String>,
    pub market_price_eur: f64,
}

impl NewCatalogCard {
    /// Minimal entry for a code that is not in the catalog yet
    pub fn placeholder(code: &str, variant: &str) -> Self {
        let set_code = code
            .split('-')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("UNKNOWN");
        Self {
            code: code.to_string(),
            name: format!("Card {}", code),
            set_code: set_code.to_string(),
            variant: variant.to_string(),
            rarity: "Unknown".to_string(),
            card_type: "Character".to_string(),
            image_url: None,
            market_price_eur: 0.0,
        }
    }
}

/// One row of a user's collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionEntry {
    pub id: String,
    pub user_id: String,
    pub card_id: String,
    pub quantity: i64,
    pub is_foil: bool,
    pub scanned_at: DateTime<Utc>,
}

/// A collection row joined with its catalog card
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionItem {
    pub entry: CollectionEntry,
    pub card: CatalogCard,
}

/// Aggregate numbers for a user's collection
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionStats {
    /// Sum of quantities
    pub total_cards: i64,
    /// Distinct catalog cards owned
    pub unique_cards: i64,
    /// Rows flagged foil/alt-art
    pub alt_arts: i64,
    /// Most recent scan
    pub last_scan: Option<DateTime<Utc>>,
}

/// The collection store the scanner writes to
pub trait CollectionStore: Send + Sync {
    /// Look up a catalog card by code and variant
    fn find_catalog_card(&self, code: &str, variant: &str) -> Result<Option<CatalogCard>, StoreError>;

    /// Add a card to the catalog
    fn create_catalog_card(&self, card: &NewCatalogCard) -> Result<CatalogCard, StoreError>;

    /// Insert or update catalog cards keyed by (code, variant)
    fn upsert_catalog_cards(&self, cards: &[NewCatalogCard]) -> Result<usize, StoreError>;

    /// Record a card in a user's collection
    fn insert_collection_entry(
        &self,
        user_id: &str,
        card_id: &str,
        quantity: i64,
        is_foil: bool,
    ) -> Result<CollectionEntry, StoreError>;

    /// A user's collection, newest first
    fn list_collection(&self, user_id: &str) -> Result<Vec<CollectionItem>, StoreError>;

    /// The `limit` most recent scans of a user
    fn recent_scans(&self, user_id: &str, limit: usize) -> Result<Vec<CollectionItem>, StoreError>;

    /// Set an entry's quantity. Zero or less removes the entry and returns `None`.
    fn update_quantity(&self, entry_id: &str, quantity: i64) -> Result<Option<CollectionEntry>, StoreError>;

    /// Remove an entry. Returns whether it existed.
    fn delete_entry(&self, entry_id: &str) -> Result<bool, StoreError>;

    /// Aggregate numbers for a user's collection
    fn stats(&self, user_id: &str) -> Result<CollectionStats, StoreError>;
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "cardscanner", "CardScanner")
        .ok_or_else(|| anyhow::anyhow!("Could not determine application directories"))
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = project_dirs()?.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;
    Ok(config_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_for() {
        assert_eq!(variant_for(false), "Normal");
        assert_eq!(variant_for(true), "Parallel");
    }

    #[test]
    fn test_placeholder_card() {
        let card = NewCatalogCard::placeholder("OP05-060", VARIANT_PARALLEL);
        assert_eq!(card.name, "Card OP05-060");
        assert_eq!(card.set_code, "OP05");
        assert_eq!(card.variant, "Parallel");
        assert_eq!(card.rarity, "Unknown");
        assert_eq!(card.card_type, "Character");

        assert_eq!(NewCatalogCard::placeholder("-001", VARIANT_NORMAL).set_code, "UNKNOWN");
    }
}
