//! Shared fixtures for bridge integration tests.

#![allow(dead_code)]

use bridge_desktop::{CatalogEntry, LocalStoreBackend};
use bridge_traits::{ProductDetails, ProductId};
use core_purchase::{
    FinalizeResult, ProductQueryResult, PurchaseBridge, PurchaseCallbacks, PurchaseResult,
    RestoreResult,
};
use core_runtime::config::{BridgeConfig, Timeouts};
use core_runtime::events::{PurchaseEvent, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every notification in arrival order.
#[derive(Default)]
pub struct Recorder {
    pub setups: Mutex<Vec<bool>>,
    pub logs: Mutex<Vec<String>>,
    pub queries: Mutex<Vec<ProductQueryResult>>,
    pub purchases: Mutex<Vec<PurchaseResult>>,
    pub restores: Mutex<Vec<RestoreResult>>,
    pub finalizes: Mutex<Vec<FinalizeResult>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn setups(&self) -> Vec<bool> {
        self.setups.lock().unwrap().clone()
    }

    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<ProductQueryResult> {
        self.queries.lock().unwrap().clone()
    }

    pub fn purchases(&self) -> Vec<PurchaseResult> {
        self.purchases.lock().unwrap().clone()
    }

    pub fn restores(&self) -> Vec<RestoreResult> {
        self.restores.lock().unwrap().clone()
    }

    pub fn finalizes(&self) -> Vec<FinalizeResult> {
        self.finalizes.lock().unwrap().clone()
    }
}

impl PurchaseCallbacks for Recorder {
    fn on_billing_setup(&self, success: bool) {
        self.setups.lock().unwrap().push(success);
    }

    fn on_debug_log(&self, message: &str) {
        self.logs.lock().unwrap().push(message.to_string());
    }

    fn on_products_queried(&self, result: &ProductQueryResult) {
        self.queries.lock().unwrap().push(result.clone());
    }

    fn on_purchase_result(&self, result: &PurchaseResult) {
        self.purchases.lock().unwrap().push(result.clone());
    }

    fn on_restore_result(&self, result: &RestoreResult) {
        self.restores.lock().unwrap().push(result.clone());
    }

    fn on_finalize_result(&self, result: &FinalizeResult) {
        self.finalizes.lock().unwrap().push(result.clone());
    }
}

pub fn id(value: &str) -> ProductId {
    ProductId::parse(value).unwrap()
}

/// Store with two non-consumables (`sku.a`, `sku.b`) and one consumable
/// (`coins.100`).
pub fn store() -> Arc<LocalStoreBackend> {
    Arc::new(LocalStoreBackend::with_catalog(vec![
        CatalogEntry::new(ProductDetails::in_app(
            id("sku.a"),
            "Product A",
            "$0.99",
            990_000,
            "USD",
        )),
        CatalogEntry::new(ProductDetails::in_app(
            id("sku.b"),
            "Product B",
            "$1.99",
            1_990_000,
            "USD",
        )),
        CatalogEntry::new(ProductDetails::in_app(
            id("coins.100"),
            "100 Coins",
            "$4.99",
            4_990_000,
            "USD",
        ))
        .consumable(),
    ]))
}

pub fn bridge_for(store: &Arc<LocalStoreBackend>, timeouts: Timeouts) -> PurchaseBridge {
    let config = BridgeConfig::builder()
        .backend(store.clone())
        .timeouts(timeouts)
        .build()
        .unwrap();
    PurchaseBridge::new(config).unwrap()
}

/// Initialized bridge over [`store`] with generous timeouts.
pub async fn ready_bridge() -> (PurchaseBridge, Arc<LocalStoreBackend>, Arc<Recorder>) {
    let store = store();
    let bridge = bridge_for(&store, Timeouts::uniform(Duration::from_secs(10)));
    let recorder = Recorder::new();
    bridge
        .initialize(recorder.clone())
        .unwrap()
        .outcome()
        .await
        .unwrap();
    (bridge, store, recorder)
}

/// Waits for the first event matching `predicate`.
pub async fn wait_for_event(
    events: &mut Receiver<PurchaseEvent>,
    predicate: impl Fn(&PurchaseEvent) -> bool,
) -> PurchaseEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event bus closed: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
