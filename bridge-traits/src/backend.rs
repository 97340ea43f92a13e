//! Purchase Backend Abstraction
//!
//! The contract a platform purchase SDK wrapper (StoreKit, Google Play Billing,
//! a local development store) must satisfy to sit behind the purchase bridge.

use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

use crate::{
    error::Result,
    product::{ProductDetails, ProductId},
    purchase::Purchase,
};

/// Store family a backend talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorePlatform {
    /// Apple StoreKit
    AppStore,
    /// Google Play Billing
    GooglePlay,
    /// In-process development store
    Local,
}

impl fmt::Display for StorePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorePlatform::AppStore => write!(f, "AppStore"),
            StorePlatform::GooglePlay => write!(f, "GooglePlay"),
            StorePlatform::Local => write!(f, "Local"),
        }
    }
}

/// Unsolicited notifications raised by a backend outside of any request.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Diagnostic message from the platform SDK
    DebugLog(String),
    /// Connection to the store service was lost
    Disconnected,
    /// Purchases completed without a matching request (deferred approvals,
    /// pending purchases settling, purchases started from the store UI)
    PurchasesUpdated(Vec<Purchase>),
}

/// Sending half handed to a backend on connect.
///
/// Cheap to clone and usable from any thread; backends typically keep one on
/// their own callback thread.
#[derive(Debug, Clone)]
pub struct BackendEvents {
    sender: mpsc::UnboundedSender<BackendEvent>,
}

impl BackendEvents {
    /// Creates a connected sender/receiver pair.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BackendEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Emits an event. Returns `false` once the bridge stopped listening.
    pub fn emit(&self, event: BackendEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    pub fn debug_log(&self, message: impl Into<String>) -> bool {
        self.emit(BackendEvent::DebugLog(message.into()))
    }

    pub fn disconnected(&self) -> bool {
        self.emit(BackendEvent::Disconnected)
    }

    pub fn purchases_updated(&self, purchases: Vec<Purchase>) -> bool {
        self.emit(BackendEvent::PurchasesUpdated(purchases))
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Platform purchase backend trait
///
/// Every async method resolves exactly once. Implementations that wrap a
/// callback-style SDK bridge the SDK callback into the returned future; the
/// purchase bridge handles timeouts, so a backend may simply never resolve
/// when the SDK drops a request.
///
/// # Platform Support
///
/// - **iOS/macOS**: StoreKit (`SKProductsRequest`, `SKPaymentQueue`)
/// - **Android**: Google Play Billing (`BillingClient`)
/// - **Desktop**: `bridge-desktop::LocalStoreBackend`
///
/// # Example
///
/// ```ignore
/// use bridge_traits::backend::{BackendEvents, PurchaseBackend};
///
/// async fn warm_up(backend: &dyn PurchaseBackend) -> bridge_traits::error::Result<()> {
///     let (events, _rx) = BackendEvents::channel();
///     backend.connect(events).await?;
///     let ids = vec![bridge_traits::ProductId::parse("sku.coins").unwrap()];
///     let products = backend.query_products(&ids).await?;
///     println!("{} products", products.len());
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait PurchaseBackend: Send + Sync {
    /// Store family this backend talks to
    fn platform(&self) -> StorePlatform;

    /// Establish the connection to the store service.
    ///
    /// `events` stays valid for the lifetime of the connection and replaces
    /// any sender from a previous connection.
    async fn connect(&self, events: BackendEvents) -> Result<()>;

    /// Fetch catalog details for the given products.
    ///
    /// Identifiers unknown to the catalog are omitted from the result; order is
    /// not significant.
    async fn query_products(&self, product_ids: &[ProductId]) -> Result<Vec<ProductDetails>>;

    /// Run the platform purchase flow for one product.
    async fn purchase(&self, product_id: &ProductId) -> Result<Purchase>;

    /// Return purchases currently owned by the user.
    async fn restore_purchases(&self) -> Result<Vec<Purchase>>;

    /// Consume a consumable purchase so it can be bought again.
    async fn consume(&self, purchase_token: &str) -> Result<()>;

    /// Acknowledge a purchase.
    async fn acknowledge(&self, purchase_token: &str) -> Result<()>;

    /// Whether the store currently accepts purchase requests.
    ///
    /// Must answer from cached state without I/O.
    fn can_make_purchases(&self) -> bool;

    /// Close the store connection. Idempotent.
    async fn disconnect(&self);
}
