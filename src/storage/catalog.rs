//! Catalog import
//!
//! Loads a card list export (`cards.json`) into the catalog. Only English
//! printings are kept and rows are deduplicated on (code, variant).

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::storage::{CollectionStore, NewCatalogCard, StoreError, VARIANT_NORMAL, VARIANT_PARALLEL};

const IMAGE_BASE_URL: &str = "https://en.onepiece-cardgame.com/images/cardlist/card/";
const IMPORT_BATCH_SIZE: usize = 100;

/// Catalog import failures
#[derive(Debug, Error)]
pub enum CatalogImportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid card list: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One card as it appears in the export
#[derive(Debug, Clone, Deserialize)]
pub struct RawCard {
    pub id: String,
    pub id_normal: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub set: String,
    #[serde(default)]
    pub rarity: String,
    #[serde(default)]
    pub language: String,
    #[serde(rename = "cmPrice", default)]
    pub cm_price: Option<serde_json::Value>,
    #[serde(rename = "cardType", default)]
    pub card_type: Option<String>,
}

impl RawCard {
    /// Printing variant derived from the name suffix and id
    pub fn variant(&self) -> &'static str {
        if self.name.contains("(V.2)") {
            "Parallel (V2)"
        } else if self.name.contains("(V.3)") {
            "Manga / Special (V3)"
        } else if self.id != self.id_normal || self.name.contains("(V.") {
            VARIANT_PARALLEL
        } else {
            VARIANT_NORMAL
        }
    }

    /// Official image URL for this printing
    pub fn image_url(&self) -> String {
        let suffix = if self.name.contains("(V.2)") {
            "_p1"
        } else if self.name.contains("(V.3)") {
            "_p2"
        } else if self.id != self.id_normal && self.id.ends_with("_p1") {
            "_p1"
        } else if self.id != self.id_normal && self.id.ends_with("_p2") {
            "_p2"
        } else {
            ""
        };
        format!("{}{}{}.png", IMAGE_BASE_URL, self.id_normal, suffix)
    }

    /// Market price in euros; missing or unparsable prices are 0
    pub fn price_eur(&self) -> f64 {
        match &self.cm_price {
            Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    fn into_catalog_card(self) -> NewCatalogCard {
        NewCatalogCard {
            variant: self.variant().to_string(),
            image_url: Some(self.image_url()),
            market_price_eur: self.price_eur(),
            code: self.id_normal,
            name: self.name,
            set_code: self.set,
            rarity: self.rarity,
            card_type: self.card_type.unwrap_or_default(),
        }
    }
}

/// Keep English cards and collapse duplicates, last one wins
pub fn prepare_rows(cards: Vec<RawCard>) -> Vec<NewCatalogCard> {
    let mut unique: BTreeMap<(String, String), NewCatalogCard> = BTreeMap::new();
    for card in cards.into_iter().filter(|c| c.language == "en") {
        let row = card.into_catalog_card();
        unique.insert((row.code.clone(), row.variant.clone()), row);
    }
    unique.into_values().collect()
}

/// Parse a card list export
pub fn parse_card_list(json: &str) -> Result<Vec<RawCard>, CatalogImportError> {
    Ok(serde_json::from_str(json)?)
}

/// Import a card list file into the catalog. Returns the number of rows written.
pub fn import_catalog(store: &dyn CollectionStore, path: &Path) -> Result<usize, CatalogImportError> {
    let json = std::fs::read_to_string(path).map_err(|source| CatalogImportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let raw = parse_card_list(&json)?;
    let total = raw.len();
    let rows = prepare_rows(raw);
    info!("{} cards in export, {} unique English printings", total, rows.len());

    let mut written = 0;
    for batch in rows.chunks(IMPORT_BATCH_SIZE) {
        match store.upsert_catalog_cards(batch) {
            Ok(n) => {
                written += n;
                info!("Imported {} / {}", written, rows.len());
            }
            Err(e) => {
                warn!("Batch of {} cards failed: {}", batch.len(), e);
                return Err(e.into());
            }
        }
    }
    Ok(written)
}
