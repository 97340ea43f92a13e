//! # Versioned Payloads
//!
//! Catalog and restore results share one JSON schema, tagged with
//! `schema_version`, so hosts that receive them as strings (the C ABI, web
//! views, analytics) can parse them without knowing which platform produced
//! them:
//!
//! ```json
//! {"schema_version":1,"products":[...],"invalid_product_ids":["..."]}
//! {"schema_version":1,"product_ids":["..."],"purchases":[...]}
//! ```
//!
//! Failures never appear inside a payload; they travel next to it as a
//! diagnostic.

use bridge_traits::{ProductDetails, ProductId, Purchase};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current payload schema version.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported payload schema version {0} (expected {expected})", expected = SCHEMA_VERSION)]
    UnsupportedVersion(u32),
}

/// Products returned by a catalog query, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCatalog {
    pub schema_version: u32,
    pub products: Vec<ProductDetails>,
    /// Requested identifiers the store does not know
    #[serde(default)]
    pub invalid_product_ids: Vec<String>,
}

impl ProductCatalog {
    pub fn new(products: Vec<ProductDetails>, invalid_product_ids: Vec<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            products,
            invalid_product_ids,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Orders `found` by `requested`; requested ids missing from `found` are
    /// reported as invalid. Repeated ids appear once.
    pub fn in_request_order(requested: &[ProductId], found: Vec<ProductDetails>) -> Self {
        let mut products = Vec::with_capacity(requested.len());
        let mut invalid_product_ids = Vec::new();
        let mut seen: Vec<&ProductId> = Vec::with_capacity(requested.len());

        for id in requested {
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);

            match found.iter().find(|details| &details.product_id == id) {
                Some(details) => products.push(details.clone()),
                None => invalid_product_ids.push(id.to_string()),
            }
        }

        Self::new(products, invalid_product_ids)
    }

    pub fn get(&self, product_id: &str) -> Option<&ProductDetails> {
        self.products
            .iter()
            .find(|details| details.product_id.as_str() == product_id)
    }

    pub fn product_ids(&self) -> Vec<String> {
        self.products
            .iter()
            .map(|details| details.product_id.to_string())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.invalid_product_ids.is_empty()
    }

    pub fn to_json(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PayloadError> {
        let catalog: Self = serde_json::from_str(json)?;
        check_version(catalog.schema_version)?;
        Ok(catalog)
    }
}

/// Purchases returned by a restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoredPurchases {
    pub schema_version: u32,
    /// Restored identifiers, de-duplicated, in store order
    pub product_ids: Vec<String>,
    #[serde(default)]
    pub purchases: Vec<Purchase>,
}

impl RestoredPurchases {
    pub fn from_purchases(purchases: Vec<Purchase>) -> Self {
        let mut product_ids: Vec<String> = Vec::new();
        for id in purchases.iter().flat_map(|p| p.product_ids.iter()) {
            if !product_ids.iter().any(|known| known == id.as_str()) {
                product_ids.push(id.to_string());
            }
        }

        Self {
            schema_version: SCHEMA_VERSION,
            product_ids,
            purchases,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.product_ids.is_empty()
    }

    pub fn to_json(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PayloadError> {
        let restored: Self = serde_json::from_str(json)?;
        check_version(restored.schema_version)?;
        Ok(restored)
    }
}

fn check_version(version: u32) -> Result<(), PayloadError> {
    if version == SCHEMA_VERSION {
        Ok(())
    } else {
        Err(PayloadError::UnsupportedVersion(version))
    }
}
