//! # Application Callbacks
//!
//! Every accepted request produces exactly one terminal notification through
//! the matching [`PurchaseCallbacks`] method. Notifications are invoked one
//! at a time from the bridge's dispatcher task, in completion order.

use bridge_traits::Purchase;

use crate::error::{PurchaseError, Result};
use crate::payload::{ProductCatalog, RestoredPurchases};
use crate::request::RequestId;

/// Application-facing notification slots.
///
/// All methods default to no-ops so applications implement only what they
/// use. Implementations run on the dispatcher task and should return quickly;
/// a panicking callback is logged and does not stop later notifications.
pub trait PurchaseCallbacks: Send + Sync {
    /// Store connection attempt finished.
    fn on_billing_setup(&self, _success: bool) {}

    /// Diagnostic message from the store SDK or the bridge.
    fn on_debug_log(&self, _message: &str) {}

    fn on_products_queried(&self, _result: &ProductQueryResult) {}

    /// Also receives settled purchases the store reported without a request
    /// (`request_id` is `None`). Pending ones are not reported.
    fn on_purchase_result(&self, _result: &PurchaseResult) {}

    fn on_restore_result(&self, _result: &RestoreResult) {}

    /// Consume or acknowledge finished.
    fn on_finalize_result(&self, _result: &FinalizeResult) {}
}

/// Callbacks that ignore every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl PurchaseCallbacks for NoopCallbacks {}

/// Terminal notification of a catalog query.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductQueryResult {
    pub request_id: RequestId,
    /// Identifiers exactly as the application passed them
    pub requested: Vec<String>,
    pub outcome: Result<ProductCatalog>,
}

impl ProductQueryResult {
    pub fn catalog(&self) -> Option<&ProductCatalog> {
        self.outcome.as_ref().ok()
    }

    pub fn diagnostic(&self) -> Option<String> {
        diagnostic(&self.outcome)
    }
}

/// Terminal notification of a purchase attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseResult {
    /// `None` for purchases the store reported outside of a request
    pub request_id: Option<RequestId>,
    /// Identifier exactly as the application passed it
    pub product_id: String,
    pub outcome: Result<Purchase>,
}

impl PurchaseResult {
    pub fn purchase(&self) -> Option<&Purchase> {
        self.outcome.as_ref().ok()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn is_user_cancelled(&self) -> bool {
        matches!(self.outcome, Err(PurchaseError::UserCancelled))
    }

    pub fn diagnostic(&self) -> Option<String> {
        diagnostic(&self.outcome)
    }
}

/// Terminal notification of a restore.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreResult {
    pub request_id: RequestId,
    pub outcome: Result<RestoredPurchases>,
}

impl RestoreResult {
    pub fn restored(&self) -> Option<&RestoredPurchases> {
        self.outcome.as_ref().ok()
    }

    pub fn diagnostic(&self) -> Option<String> {
        diagnostic(&self.outcome)
    }
}

/// Which finalization a [`FinalizeResult`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeAction {
    Consume,
    Acknowledge,
}

impl FinalizeAction {
    pub fn operation(self) -> &'static str {
        match self {
            FinalizeAction::Consume => "consume",
            FinalizeAction::Acknowledge => "acknowledge",
        }
    }
}

/// Terminal notification of a consume or acknowledge.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeResult {
    pub request_id: RequestId,
    pub action: FinalizeAction,
    pub purchase_token: String,
    pub outcome: Result<()>,
}

impl FinalizeResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn diagnostic(&self) -> Option<String> {
        diagnostic(&self.outcome)
    }
}

fn diagnostic<T>(outcome: &Result<T>) -> Option<String> {
    outcome.as_ref().err().map(ToString::to_string)
}
