//! Local Catalog
//!
//! Product catalog served by [`LocalStoreBackend`](crate::LocalStoreBackend).
//! Catalog files use the same product schema the bridge delivers to the
//! application, plus a `consumable` flag per entry:
//!
//! ```json
//! {
//!   "products": [
//!     { "productId": "coins.100", "type": "inapp", "title": "100 Coins",
//!       "price": "$0.99", "price_amount_micros": 990000,
//!       "price_currency_code": "USD", "consumable": true }
//!   ]
//! }
//! ```

use bridge_traits::{
    error::{BridgeError, Result},
    ProductDetails, ProductId,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// One purchasable item in the local catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub details: ProductDetails,
    /// Consumables can be bought again once consumed
    #[serde(default)]
    pub consumable: bool,
}

impl CatalogEntry {
    pub fn new(details: ProductDetails) -> Self {
        Self {
            details,
            consumable: false,
        }
    }

    pub fn consumable(mut self) -> Self {
        self.consumable = true;
        self
    }

    pub fn product_id(&self) -> &ProductId {
        &self.details.product_id
    }
}

/// Ordered set of catalog entries keyed by product id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    products: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, replacing any entry with the same product id.
    pub fn insert(&mut self, entry: CatalogEntry) {
        match self
            .products
            .iter_mut()
            .find(|existing| existing.product_id() == entry.product_id())
        {
            Some(existing) => *existing = entry,
            None => self.products.push(entry),
        }
    }

    pub fn get(&self, product_id: &ProductId) -> Option<&CatalogEntry> {
        self.products
            .iter()
            .find(|entry| entry.product_id() == product_id)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.products.iter()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: Catalog = serde_json::from_str(json)?;
        // Route through insert so duplicate ids collapse to the last entry
        let mut catalog = Catalog::new();
        for entry in raw.products {
            catalog.insert(entry);
        }
        Ok(catalog)
    }

    /// Loads a catalog file from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            BridgeError::OperationFailed(format!(
                "Failed to read catalog {}: {}",
                path.display(),
                e
            ))
        })?;
        let catalog = Self::from_json(&contents)?;
        debug!(products = catalog.len(), "Loaded local catalog");
        Ok(catalog)
    }
}

impl FromIterator<CatalogEntry> for Catalog {
    fn from_iter<I: IntoIterator<Item = CatalogEntry>>(iter: I) -> Self {
        let mut catalog = Catalog::new();
        for entry in iter {
            catalog.insert(entry);
        }
        catalog
    }
}

impl IntoIterator for Catalog {
    type Item = CatalogEntry;
    type IntoIter = std::vec::IntoIter<CatalogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.products.into_iter()
    }
}
