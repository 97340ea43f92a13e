//! # Purchase Bridge Traits
//!
//! Platform abstraction traits that must be implemented for each store.
//!
//! ## Overview
//!
//! This crate defines the contract between the purchase bridge and the
//! platform purchase SDKs it wraps. The store itself (payment sheets, receipt
//! handling, catalog hosting) stays inside the vendor SDK; the bridge only
//! sees the request/completion shape described by
//! [`PurchaseBackend`](backend::PurchaseBackend).
//!
//! ## Traits
//!
//! - [`PurchaseBackend`](backend::PurchaseBackend) - Connect, query catalog,
//!   purchase, restore, consume, acknowledge
//! - [`LoggerSink`](log::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation | Status |
//! |----------|----------------|--------|
//! | Desktop  | `bridge-desktop` (`LocalStoreBackend`) | ✅ |
//! | iOS      | native StoreKit glue via `bridge-ffi` | ✅ |
//! | Android  | native Billing glue via `bridge-ffi` | ✅ |
//!
//! ## Error Handling
//!
//! All backend calls return [`BridgeError`](error::BridgeError). Store
//! rejections carry a [`BillingResponse`](billing::BillingResponse) so the
//! bridge can distinguish user cancellation and connectivity loss from other
//! failures.
//!
//! ## Thread Safety
//!
//! Backends are `Send + Sync` and may complete requests on any thread.

pub mod backend;
pub mod billing;
pub mod error;
pub mod log;
pub mod product;
pub mod purchase;

pub use error::BridgeError;

pub use backend::{BackendEvent, BackendEvents, PurchaseBackend, StorePlatform};
pub use billing::BillingResponse;
pub use log::{LogEntry, LogLevel, LoggerSink};
pub use product::{ProductDetails, ProductId, ProductIdError, ProductKind};
pub use purchase::{Purchase, PurchaseState};
