//! Product Catalog Types
//!
//! Identifiers and metadata for purchasable items. Product metadata is owned by
//! the platform catalog; the bridge carries it without interpretation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum accepted identifier length in bytes.
pub const MAX_PRODUCT_ID_LEN: usize = 256;

/// Reason an identifier was rejected by [`ProductId::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductIdError {
    Empty,
    TooLong,
    InvalidCharacter,
}

impl fmt::Display for ProductIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "identifier is empty"),
            Self::TooLong => write!(
                f,
                "identifier exceeds {} bytes",
                MAX_PRODUCT_ID_LEN
            ),
            Self::InvalidCharacter => {
                write!(f, "identifier contains whitespace or control characters")
            }
        }
    }
}

impl std::error::Error for ProductIdError {}

/// Opaque catalog key (SKU) for a purchasable item.
///
/// Only structurally malformed identifiers are rejected; whether the catalog
/// knows the identifier is for the store to decide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(String);

impl ProductId {
    pub fn parse(value: impl Into<String>) -> Result<Self, ProductIdError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ProductIdError::Empty);
        }
        if value.len() > MAX_PRODUCT_ID_LEN {
            return Err(ProductIdError::TooLong);
        }
        if value
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(ProductIdError::InvalidCharacter);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProductId {
    type Error = ProductIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ProductId> for String {
    fn from(id: ProductId) -> Self {
        id.0
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Catalog category of a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductKind {
    /// One-time purchase (consumable or non-consumable)
    #[serde(rename = "inapp")]
    InApp,
    /// Auto-renewing subscription
    #[serde(rename = "subs")]
    Subscription,
}

/// Single pricing phase of a subscription offer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingPhase {
    pub billing_cycle_count: u32,
    /// ISO 8601 period, e.g. `P1M`
    pub billing_period: String,
    pub formatted_price: String,
    pub price_amount_micros: i64,
    pub price_currency_code: String,
    pub recurrence_mode: i32,
}

/// Subscription offer (base plan or promotional offer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionOffer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_id: Option<String>,
    pub base_plan_id: String,
    #[serde(default)]
    pub offer_tags: Vec<String>,
    pub offer_token: String,
    #[serde(default)]
    pub pricing_phases: Vec<PricingPhase>,
}

/// Platform-provided product metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    #[serde(rename = "productId")]
    pub product_id: ProductId,
    #[serde(rename = "type")]
    pub kind: ProductKind,
    pub title: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Localized, formatted one-time price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_amount_micros: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_currency_code: Option<String>,
    #[serde(
        default,
        rename = "subscriptionOffers",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub subscription_offers: Vec<SubscriptionOffer>,
}

impl ProductDetails {
    /// Minimal one-time product with a price.
    pub fn in_app(
        product_id: ProductId,
        title: impl Into<String>,
        price: impl Into<String>,
        price_amount_micros: i64,
        currency: impl Into<String>,
    ) -> Self {
        let title = title.into();
        Self {
            product_id,
            kind: ProductKind::InApp,
            name: title.clone(),
            title,
            description: String::new(),
            price: Some(price.into()),
            price_amount_micros: Some(price_amount_micros),
            price_currency_code: Some(currency.into()),
            subscription_offers: Vec::new(),
        }
    }
}
