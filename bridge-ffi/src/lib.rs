//! # Purchase Bridge C ABI
//!
//! `extern "C"` entry points and `#[repr(C)]` types that let native
//! applications drive a [`PurchaseBridge`](core_purchase::PurchaseBridge) and
//! let native StoreKit / Play Billing glue act as its store backend.
//!
//! # Symbol prefix
//!
//! - Functions: `iap_*` (application side), `iap_store_*` (store side)
//! - Types: `Iap*`
//!
//! # Ownership
//!
//! - [`IapStore`] handles come from [`iap_store_new`] and are released with
//!   [`iap_store_free`]. A bridge keeps its own reference to the store, so the
//!   native glue may free its handle at any time after creating the bridge.
//!   Bridges sharing a store each hold a separate connection on it.
//! - [`IapBridge`] handles come from [`iap_bridge_new`] and are released with
//!   [`iap_bridge_free`]. Each bridge owns a private Tokio runtime.
//! - Strings passed into callbacks are borrowed for the duration of the call.
//!
//! # Thread safety
//!
//! Bridge functions may be called from any thread. Callbacks and vtable
//! functions are invoked from the bridge's runtime threads, so `user_data`
//! and the vtable `context` must tolerate cross-thread use.

pub mod api;
pub mod callbacks;
pub mod store;
mod strings;

pub use api::{
    iap_acknowledge_purchase, iap_bridge_free, iap_bridge_new, iap_can_make_purchases,
    iap_consume_purchase, iap_destroy, iap_init, iap_init_logging, iap_purchase_product,
    iap_query_products, iap_restore_purchases, IapBridge,
};
pub use callbacks::{IapCallbacks, IapFinalizeKind};
pub use store::{
    iap_store_complete_connection, iap_store_complete_purchase, iap_store_complete_query,
    iap_store_complete_restore, iap_store_complete_simple, iap_store_debug_log,
    iap_store_disconnected, iap_store_free, iap_store_new, iap_store_purchases_updated,
    IapStore, IapStorePlatform, IapStoreVTable,
};

use core_purchase::{BridgeState, PurchaseError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;
use tracing::error;

/// Status returned by every fallible C entry point.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IapStatus {
    /// Request accepted; its outcome arrives through a callback
    Ok = 0,
    /// The bridge has not finished initializing
    NotInitialized = 1,
    /// The bridge was destroyed
    Destroyed = 2,
    /// NULL pointer, invalid UTF-8, malformed JSON, or an unknown request id
    InvalidArgument = 3,
    /// `iap_init` while already initializing or ready
    AlreadyInitialized = 4,
    /// Unexpected internal failure
    Internal = 5,
}

impl From<&PurchaseError> for IapStatus {
    fn from(err: &PurchaseError) -> Self {
        match err {
            PurchaseError::PreconditionViolation {
                state: BridgeState::Destroyed,
                ..
            } => IapStatus::Destroyed,
            PurchaseError::PreconditionViolation { .. } => IapStatus::NotInitialized,
            PurchaseError::AlreadyInitialized => IapStatus::AlreadyInitialized,
            PurchaseError::InvalidIdentifier { .. } => IapStatus::InvalidArgument,
            _ => IapStatus::Internal,
        }
    }
}

/// Argument marshalling failures at the C boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FfiError {
    #[error("{0} is NULL")]
    NullPointer(&'static str),

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),

    #[error("No pending request #{0}")]
    UnknownRequest(u64),

    #[error("Request #{0} expects a different completion")]
    CompletionMismatch(u64),
}

impl From<FfiError> for IapStatus {
    fn from(_: FfiError) -> Self {
        IapStatus::InvalidArgument
    }
}

pub type Result<T> = std::result::Result<T, FfiError>;

/// Runs an entry point body, turning a panic into [`IapStatus::Internal`].
///
/// Unwinding across an `extern "C"` boundary aborts the host process.
pub(crate) fn guard<F>(entry: &'static str, body: F) -> IapStatus
where
    F: FnOnce() -> IapStatus,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(status) => status,
        Err(_) => {
            error!(entry, "Panic caught at C boundary");
            IapStatus::Internal
        }
    }
}
