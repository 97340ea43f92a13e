//! # Purchase Event Bus
//!
//! Broadcasts purchase activity to any number of observers using
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The purchase bridge delivers each terminal outcome to exactly one
//! registered callback slot. Analytics, UI state stores and tests often want
//! to follow the same activity without owning that slot; they subscribe here
//! instead. Events are published after the callback has been invoked.
//!
//! ```text
//! ┌────────────┐  notify   ┌────────────┐  callback   ┌─────────────┐
//! │  Request   ├──────────>│ Dispatcher ├────────────>│ Application │
//! │   tasks    │           │            │             └─────────────┘
//! └────────────┘           │            │  emit       ┌─────────────┐
//!                          │            ├────────────>│  EventBus   ├──> subscribers
//!                          └────────────┘             └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, PurchaseEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(32);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(PurchaseEvent::BillingSetup { success: true }).ok();
//! assert_eq!(rx.recv().await.unwrap(), PurchaseEvent::BillingSetup { success: true });
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell behind and missed `n`
//!   events; it can keep receiving.
//! - **`RecvError::Closed`**: the bridge was dropped.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Purchase activity observed by the bridge.
///
/// Payloads carry identifiers and diagnostics only, never purchase tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PurchaseEvent {
    /// Store connection attempt resolved.
    BillingSetup { success: bool },
    /// Catalog query finished.
    ProductsQueried {
        request_id: Option<u64>,
        product_ids: Vec<String>,
        invalid_product_ids: Vec<String>,
    },
    /// Catalog query failed.
    ProductQueryFailed { request_id: Option<u64>, message: String },
    /// Purchase flow completed with a purchase record.
    PurchaseCompleted {
        /// `None` for purchases the store reported without a request.
        request_id: Option<u64>,
        product_id: String,
        pending: bool,
    },
    /// Purchase flow failed or was cancelled.
    PurchaseFailed {
        request_id: Option<u64>,
        product_id: String,
        message: String,
        user_cancelled: bool,
    },
    /// Restore finished.
    PurchasesRestored {
        request_id: Option<u64>,
        product_ids: Vec<String>,
    },
    /// Restore failed.
    RestoreFailed { request_id: Option<u64>, message: String },
    /// Consumable consumed.
    PurchaseConsumed { request_id: u64 },
    /// Purchase acknowledged.
    PurchaseAcknowledged { request_id: u64 },
    /// Consume or acknowledge failed.
    FinalizeFailed { request_id: u64, message: String },
    /// The store dropped its connection.
    BackendDisconnected,
    /// The bridge was destroyed.
    Destroyed,
}

impl PurchaseEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            PurchaseEvent::BillingSetup { success: true } => "Store connected",
            PurchaseEvent::BillingSetup { success: false } => "Store connection failed",
            PurchaseEvent::ProductsQueried { .. } => "Products queried",
            PurchaseEvent::ProductQueryFailed { .. } => "Product query failed",
            PurchaseEvent::PurchaseCompleted { .. } => "Purchase completed",
            PurchaseEvent::PurchaseFailed { .. } => "Purchase failed",
            PurchaseEvent::PurchasesRestored { .. } => "Purchases restored",
            PurchaseEvent::RestoreFailed { .. } => "Restore failed",
            PurchaseEvent::PurchaseConsumed { .. } => "Purchase consumed",
            PurchaseEvent::PurchaseAcknowledged { .. } => "Purchase acknowledged",
            PurchaseEvent::FinalizeFailed { .. } => "Purchase finalization failed",
            PurchaseEvent::BackendDisconnected => "Store disconnected",
            PurchaseEvent::Destroyed => "Bridge destroyed",
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            PurchaseEvent::BillingSetup { success: false }
            | PurchaseEvent::ProductQueryFailed { .. }
            | PurchaseEvent::RestoreFailed { .. }
            | PurchaseEvent::FinalizeFailed { .. } => EventSeverity::Error,
            PurchaseEvent::PurchaseFailed {
                user_cancelled: true,
                ..
            } => EventSeverity::Info,
            PurchaseEvent::PurchaseFailed { .. } => EventSeverity::Error,
            PurchaseEvent::BackendDisconnected => EventSeverity::Warning,
            PurchaseEvent::PurchaseCompleted { .. }
            | PurchaseEvent::PurchasesRestored { .. }
            | PurchaseEvent::BillingSetup { success: true } => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Central broadcast channel for purchase events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PurchaseEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// `capacity` is the number of events buffered per subscriber before it
    /// starts receiving `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: PurchaseEvent) -> Result<usize, SendError<PurchaseEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<PurchaseEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
