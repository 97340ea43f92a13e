//! # Purchase Bridge
//!
//! Connects an application to a platform in-app purchase service (StoreKit,
//! Google Play Billing, or the local desktop store) behind the
//! `bridge_traits::PurchaseBackend` seam.
//!
//! ## Overview
//!
//! The application owns a [`PurchaseBridge`], registers its
//! [`PurchaseCallbacks`] with [`PurchaseBridge::initialize`] and then issues
//! catalog queries, purchases and restores. Each accepted request returns a
//! [`RequestTicket`] and produces exactly one terminal callback, delivered
//! from a single dispatcher task in completion order.
//!
//! Catalog and restore results use the versioned JSON schema in [`payload`].
//!
//! ## Usage
//!
//! ```no_run
//! use core_purchase::{NoopCallbacks, PurchaseBridge};
//! use core_runtime::config::BridgeConfig;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bridge = PurchaseBridge::new(BridgeConfig::builder().build()?)?;
//! bridge.initialize(Arc::new(NoopCallbacks))?.outcome().await?;
//!
//! if bridge.can_make_purchases() {
//!     let purchase = bridge.purchase_product("remove_ads")?.outcome().await?;
//!     bridge.acknowledge_purchase(purchase.purchase_token)?;
//! }
//!
//! bridge.destroy()?;
//! bridge.closed().await;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod callbacks;
mod dispatcher;
pub mod error;
pub mod payload;
pub mod request;
pub mod state;

pub use bridge::PurchaseBridge;
pub use callbacks::{
    FinalizeAction, FinalizeResult, NoopCallbacks, ProductQueryResult, PurchaseCallbacks,
    PurchaseResult, RestoreResult,
};
pub use error::{PurchaseError, Result};
pub use payload::{PayloadError, ProductCatalog, RestoredPurchases, SCHEMA_VERSION};
pub use request::{RequestId, RequestTicket};
pub use state::BridgeState;
