//! Persistence bridge
//!
//! Turns a confirmed card code into exactly one add-to-collection write.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::storage::{variant_for, CollectionEntry, CollectionStore, NewCatalogCard, StoreError};
use crate::vision::card_code;

/// What to do with codes that have no catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogPolicy {
    /// Unknown codes are never added
    Strict,
    /// Unknown codes get a placeholder catalog entry
    #[default]
    Permissive,
}

/// Why a save did not go through
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("card {code} ({variant}) is not in the catalog")]
    CatalogMiss { code: String, variant: String },
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("collection store failed: {0}")]
    Store(#[from] StoreError),
}

/// Writes confirmed cards to the collection store
#[derive(Clone)]
pub struct PersistenceBridge {
    store: Arc<dyn CollectionStore>,
    policy: CatalogPolicy,
}

impl PersistenceBridge {
    /// Create a bridge over `store`
    pub fn new(store: Arc<dyn CollectionStore>, policy: CatalogPolicy) -> Self {
        Self { store, policy }
    }

    /// Add one copy of `full_code` to `user_id`'s collection
    pub fn add_to_collection(
        &self,
        user_id: &str,
        full_code: &str,
        is_alt_art: bool,
    ) -> Result<CollectionEntry, SaveError> {
        if user_id.trim().is_empty() {
            return Err(SaveError::Rejected("no user to save for".to_string()));
        }
        let canonical = card_code::parse_valid(full_code)
            .filter(|code| code.full_code() == full_code)
            .ok_or_else(|| SaveError::Rejected(format!("'{}' is not a card code", full_code)))?;

        let code = canonical.full_code();
        let variant = variant_for(is_alt_art);
        info!("Saving {} ({}) for user {}", code, variant, user_id);

        let card = match self.store.find_catalog_card(code, variant).map_err(log_store_error)? {
            Some(card) => card,
            None => match self.policy {
                CatalogPolicy::Strict => {
                    warn!("{} ({}) not in catalog, not saving", code, variant);
                    return Err(SaveError::CatalogMiss {
                        code: code.to_string(),
                        variant: variant.to_string(),
                    });
                }
                CatalogPolicy::Permissive => {
                    info!("{} ({}) not in catalog, creating placeholder", code, variant);
                    self.store
                        .create_catalog_card(&NewCatalogCard::placeholder(code, variant))
                        .map_err(log_store_error)?
                }
            },
        };

        let entry = self
            .store
            .insert_collection_entry(user_id, &card.id, 1, is_alt_art)
            .map_err(log_store_error)?;
        info!("Saved {} as collection entry {}", code, entry.id);
        Ok(entry)
    }
}

fn log_store_error(err: StoreError) -> StoreError {
    error!("Collection store error: {}", err);
    err
}
