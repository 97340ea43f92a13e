//! # Notification Dispatcher
//!
//! Request tasks and the backend event listener complete on whatever thread
//! the store answered on. They never call application code directly: each
//! terminal outcome is queued here and a single task invokes the callbacks
//! one at a time, then publishes the matching [`PurchaseEvent`] and resolves
//! the request's ticket.
//!
//! The dispatcher runs until every [`Notifier`] is dropped. The bridge drops
//! its own on destroy, so the queue drains the `Cancelled` outcomes of
//! pending requests before the callback registration is released.

use bridge_traits::{LogEntry, LogLevel, LoggerSink, Purchase, PurchaseState};
use core_runtime::events::{EventBus, PurchaseEvent};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::callbacks::{
    FinalizeAction, FinalizeResult, ProductQueryResult, PurchaseCallbacks, PurchaseResult,
    RestoreResult,
};
use crate::error::{PurchaseError, Result};
use crate::payload::{ProductCatalog, RestoredPurchases};
use crate::request::RequestId;

/// Registration written by `initialize`, cleared when the dispatcher stops.
pub(crate) type CallbackSlot = Arc<RwLock<Option<Arc<dyn PurchaseCallbacks>>>>;

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

pub(crate) enum Notification {
    BillingSetup {
        outcome: Result<()>,
        reply: Reply<()>,
    },
    DebugLog(String),
    ProductsQueried {
        result: ProductQueryResult,
        reply: Reply<ProductCatalog>,
    },
    PurchaseCompleted {
        result: PurchaseResult,
        /// Absent for purchases the store reported without a request
        reply: Option<Reply<Purchase>>,
    },
    RestoreCompleted {
        result: RestoreResult,
        reply: Reply<RestoredPurchases>,
    },
    Finalized {
        result: FinalizeResult,
        reply: Reply<()>,
    },
    BackendDisconnected,
}

/// Sending half of the dispatcher queue.
#[derive(Clone)]
pub(crate) struct Notifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub(crate) fn notify(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            warn!("Dispatcher stopped; notification dropped");
        }
    }

    pub(crate) fn debug_log(&self, message: impl Into<String>) {
        self.notify(Notification::DebugLog(message.into()));
    }
}

pub(crate) struct Dispatcher {
    callbacks: CallbackSlot,
    event_bus: EventBus,
    logger_sink: Option<Arc<dyn LoggerSink>>,
}

impl Dispatcher {
    pub(crate) fn new(
        callbacks: CallbackSlot,
        event_bus: EventBus,
        logger_sink: Option<Arc<dyn LoggerSink>>,
    ) -> Self {
        Self {
            callbacks,
            event_bus,
            logger_sink,
        }
    }

    /// Starts the dispatcher task on `runtime`.
    pub(crate) fn spawn(self, runtime: &Handle) -> (Notifier, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = runtime.spawn(self.run(receiver));
        (Notifier { sender }, handle)
    }

    async fn run(self, mut receiver: mpsc::UnboundedReceiver<Notification>) {
        debug!("Dispatcher started");
        while let Some(notification) = receiver.recv().await {
            self.deliver(notification).await;
        }

        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let _ = self.event_bus.emit(PurchaseEvent::Destroyed);
        debug!("Dispatcher stopped, callbacks released");
    }

    async fn deliver(&self, notification: Notification) {
        match notification {
            Notification::BillingSetup { outcome, reply } => {
                let success = outcome.is_ok();
                self.invoke(|callbacks| callbacks.on_billing_setup(success));
                self.publish(PurchaseEvent::BillingSetup { success });
                let _ = reply.send(outcome);
            }
            Notification::DebugLog(message) => {
                self.invoke(|callbacks| callbacks.on_debug_log(&message));
                self.forward_to_sink(message).await;
            }
            Notification::ProductsQueried { result, reply } => {
                self.invoke(|callbacks| callbacks.on_products_queried(&result));
                self.publish(query_event(&result));
                let _ = reply.send(result.outcome);
            }
            Notification::PurchaseCompleted { result, reply } => {
                self.invoke(|callbacks| callbacks.on_purchase_result(&result));
                self.publish(purchase_event(&result));
                if let Some(reply) = reply {
                    let _ = reply.send(result.outcome);
                }
            }
            Notification::RestoreCompleted { result, reply } => {
                self.invoke(|callbacks| callbacks.on_restore_result(&result));
                self.publish(restore_event(&result));
                let _ = reply.send(result.outcome);
            }
            Notification::Finalized { result, reply } => {
                self.invoke(|callbacks| callbacks.on_finalize_result(&result));
                self.publish(finalize_event(&result));
                let _ = reply.send(result.outcome);
            }
            Notification::BackendDisconnected => {
                self.publish(PurchaseEvent::BackendDisconnected);
            }
        }
    }

    fn invoke(&self, f: impl FnOnce(&dyn PurchaseCallbacks)) {
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(callbacks) = callbacks else {
            debug!("No callbacks registered; notification skipped");
            return;
        };

        if catch_unwind(AssertUnwindSafe(|| f(callbacks.as_ref()))).is_err() {
            error!("Application callback panicked");
        }
    }

    fn publish(&self, event: PurchaseEvent) {
        // No subscribers is the common case
        let _ = self.event_bus.emit(event);
    }

    async fn forward_to_sink(&self, message: String) {
        let Some(sink) = &self.logger_sink else {
            return;
        };
        if LogLevel::Debug < sink.min_level() {
            return;
        }
        let entry = LogEntry::new(LogLevel::Debug, "store", message);
        if let Err(e) = sink.log(entry).await {
            warn!("Logger sink rejected store message: {}", e);
        }
    }
}

fn query_event(result: &ProductQueryResult) -> PurchaseEvent {
    let request_id = Some(result.request_id.value());
    match &result.outcome {
        Ok(catalog) => PurchaseEvent::ProductsQueried {
            request_id,
            product_ids: catalog.product_ids(),
            invalid_product_ids: catalog.invalid_product_ids.clone(),
        },
        Err(e) => PurchaseEvent::ProductQueryFailed {
            request_id,
            message: e.to_string(),
        },
    }
}

fn purchase_event(result: &PurchaseResult) -> PurchaseEvent {
    let request_id = result.request_id.map(RequestId::value);
    match &result.outcome {
        Ok(purchase) => PurchaseEvent::PurchaseCompleted {
            request_id,
            product_id: result.product_id.clone(),
            pending: purchase.state == PurchaseState::Pending,
        },
        Err(e) => PurchaseEvent::PurchaseFailed {
            request_id,
            product_id: result.product_id.clone(),
            message: e.to_string(),
            user_cancelled: matches!(e, PurchaseError::UserCancelled),
        },
    }
}

fn restore_event(result: &RestoreResult) -> PurchaseEvent {
    let request_id = Some(result.request_id.value());
    match &result.outcome {
        Ok(restored) => PurchaseEvent::PurchasesRestored {
            request_id,
            product_ids: restored.product_ids.clone(),
        },
        Err(e) => PurchaseEvent::RestoreFailed {
            request_id,
            message: e.to_string(),
        },
    }
}

fn finalize_event(result: &FinalizeResult) -> PurchaseEvent {
    let request_id = result.request_id.value();
    match (&result.outcome, result.action) {
        (Ok(()), FinalizeAction::Consume) => PurchaseEvent::PurchaseConsumed { request_id },
        (Ok(()), FinalizeAction::Acknowledge) => PurchaseEvent::PurchaseAcknowledged { request_id },
        (Err(e), _) => PurchaseEvent::FinalizeFailed {
            request_id,
            message: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestTicket;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl PurchaseCallbacks for Recorder {
        fn on_billing_setup(&self, success: bool) {
            self.calls.lock().unwrap().push(format!("setup:{}", success));
        }

        fn on_debug_log(&self, message: &str) {
            self.calls.lock().unwrap().push(format!("log:{}", message));
        }

        fn on_restore_result(&self, result: &RestoreResult) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("restore:{}", result.request_id));
        }

        fn on_finalize_result(&self, result: &FinalizeResult) {
            self.calls.lock().unwrap().push(format!(
                "{}:{}:{}",
                result.action.operation(),
                result.purchase_token,
                result.is_success()
            ));
        }
    }

    struct Panicker;

    impl PurchaseCallbacks for Panicker {
        fn on_debug_log(&self, _message: &str) {
            panic!("callback bug");
        }
    }

    fn slot(callbacks: Arc<dyn PurchaseCallbacks>) -> CallbackSlot {
        Arc::new(RwLock::new(Some(callbacks)))
    }

    #[tokio::test]
    async fn test_delivers_in_order_then_resolves_ticket() {
        let recorder = Arc::new(Recorder::default());
        let callbacks = slot(recorder.clone());
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();

        let (notifier, handle) =
            Dispatcher::new(callbacks.clone(), bus, None).spawn(&Handle::current());

        let (setup_ticket, setup_reply) = RequestTicket::<()>::new(RequestId::new(1));
        let (restore_ticket, restore_reply) =
            RequestTicket::<RestoredPurchases>::new(RequestId::new(2));

        notifier.notify(Notification::BillingSetup {
            outcome: Ok(()),
            reply: setup_reply,
        });
        notifier.debug_log("connected");
        notifier.notify(Notification::RestoreCompleted {
            result: RestoreResult {
                request_id: RequestId::new(2),
                outcome: Ok(RestoredPurchases::from_purchases(Vec::new())),
            },
            reply: restore_reply,
        });

        assert_eq!(setup_ticket.outcome().await, Ok(()));
        assert!(restore_ticket.outcome().await.unwrap().is_empty());
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["setup:true", "log:connected", "restore:#2"]
        );

        assert_eq!(
            events.recv().await.unwrap(),
            PurchaseEvent::BillingSetup { success: true }
        );

        drop(notifier);
        handle.await.unwrap();
        assert!(callbacks.read().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_stop_dispatch() {
        let (notifier, handle) = Dispatcher::new(slot(Arc::new(Panicker)), EventBus::new(4), None)
            .spawn(&Handle::current());

        notifier.debug_log("first");
        let (ticket, reply) = RequestTicket::<()>::new(RequestId::new(1));
        notifier.notify(Notification::Finalized {
            result: FinalizeResult {
                request_id: RequestId::new(1),
                action: FinalizeAction::Consume,
                purchase_token: "token".to_string(),
                outcome: Ok(()),
            },
            reply,
        });

        assert_eq!(ticket.outcome().await, Ok(()));
        drop(notifier);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_finalize_reaches_callback_and_bus() {
        let recorder = Arc::new(Recorder::default());
        let bus = EventBus::new(4);
        let mut events = bus.subscribe();
        let (notifier, handle) =
            Dispatcher::new(slot(recorder.clone()), bus, None).spawn(&Handle::current());

        let (ticket, reply) = RequestTicket::<()>::new(RequestId::new(7));
        notifier.notify(Notification::Finalized {
            result: FinalizeResult {
                request_id: RequestId::new(7),
                action: FinalizeAction::Acknowledge,
                purchase_token: "token-7".to_string(),
                outcome: Ok(()),
            },
            reply,
        });

        assert_eq!(ticket.outcome().await, Ok(()));
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["acknowledge:token-7:true"]);
        assert_eq!(
            events.recv().await.unwrap(),
            PurchaseEvent::PurchaseAcknowledged { request_id: 7 }
        );

        drop(notifier);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_destroyed_event_on_shutdown() {
        let bus = EventBus::new(4);
        let mut events = bus.subscribe();
        let (notifier, handle) =
            Dispatcher::new(Arc::new(RwLock::new(None)), bus, None).spawn(&Handle::current());

        drop(notifier);
        handle.await.unwrap();
        assert_eq!(events.recv().await.unwrap(), PurchaseEvent::Destroyed);
    }

    #[test]
    fn test_cancelled_purchase_event_flags_user() {
        let event = purchase_event(&PurchaseResult {
            request_id: None,
            product_id: "sku.a".to_string(),
            outcome: Err(PurchaseError::UserCancelled),
        });

        match event {
            PurchaseEvent::PurchaseFailed {
                request_id,
                user_cancelled,
                ..
            } => {
                assert_eq!(request_id, None);
                assert!(user_cancelled);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
