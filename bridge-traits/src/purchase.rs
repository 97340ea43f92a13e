//! Purchase Records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::product::ProductId;

/// Platform purchase state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseState {
    /// Payment completed
    Purchased,
    /// Awaiting payment or parental approval
    Pending,
    /// Store did not report a state
    Unspecified,
}

/// Purchase record as reported by the store.
///
/// `original_json` and `signature` are carried verbatim for server-side
/// verification; the bridge never inspects them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub product_ids: Vec<ProductId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub purchase_token: String,
    pub purchase_time: DateTime<Utc>,
    pub state: PurchaseState,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_json: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

impl Purchase {
    pub fn new(product_id: ProductId, purchase_token: impl Into<String>) -> Self {
        Self {
            product_ids: vec![product_id],
            order_id: None,
            purchase_token: purchase_token.into(),
            purchase_time: Utc::now(),
            state: PurchaseState::Purchased,
            acknowledged: false,
            quantity: 1,
            original_json: None,
            signature: None,
        }
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_state(mut self, state: PurchaseState) -> Self {
        self.state = state;
        self
    }

    /// First product covered by this purchase.
    pub fn primary_product(&self) -> Option<&ProductId> {
        self.product_ids.first()
    }

    pub fn covers(&self, product_id: &ProductId) -> bool {
        self.product_ids.iter().any(|id| id == product_id)
    }

    pub fn is_purchased(&self) -> bool {
        self.state == PurchaseState::Purchased
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purchase_builder() {
        let id = ProductId::parse("sku.a").unwrap();
        let purchase = Purchase::new(id.clone(), "token-1")
            .with_order_id("GPA.1234")
            .with_state(PurchaseState::Pending);

        assert_eq!(purchase.primary_product(), Some(&id));
        assert!(purchase.covers(&id));
        assert!(!purchase.is_purchased());
        assert_eq!(purchase.order_id.as_deref(), Some("GPA.1234"));
    }

    #[test]
    fn test_quantity_defaults_to_one() {
        let json = r#"{
            "product_ids": ["sku.a"],
            "purchase_token": "t",
            "purchase_time": "2024-01-01T00:00:00Z",
            "state": "Purchased"
        }"#;
        let purchase: Purchase = serde_json::from_str(json).unwrap();
        assert_eq!(purchase.quantity, 1);
        assert!(!purchase.acknowledged);
    }
}
