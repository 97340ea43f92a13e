//! Local Store Backend
//!
//! An in-process purchase store for desktop builds, development and tests.
//! It behaves like a platform billing service: requests are handed to a
//! dedicated store thread (the way StoreKit and Play Billing deliver results
//! on their own threads) and answered through one-shot channels.
//!
//! The store also exposes knobs for reproducing store behaviour that is hard
//! to trigger against the real services: connection loss, parental controls,
//! injected failures, deferred approvals and requests the store never answers.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    BackendEvents, BillingResponse, ProductDetails, ProductId, Purchase, PurchaseBackend,
    PurchaseState, StorePlatform,
};
use std::any::Any;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::{Catalog, CatalogEntry};

const STORE_THREAD_NAME: &str = "local-store";

type Job = Box<dyn FnOnce(&mut StoreState) + Send>;

/// State owned by the store thread.
struct StoreState {
    catalog: Catalog,
    owned: Vec<Purchase>,
    events: Option<BackendEvents>,
    reachable: bool,
    latency: Duration,
    fail_next_purchase: Option<BillingResponse>,
    unresponsive: bool,
    /// Reply channels of requests the store decided never to answer
    parked: Vec<Box<dyn Any + Send>>,
    connected: Arc<AtomicBool>,
}

impl StoreState {
    fn log(&self, message: String) {
        debug!("{}", message);
        if let Some(events) = &self.events {
            events.debug_log(message);
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BridgeError::rejected(
                BillingResponse::ServiceDisconnected,
                "Local store is not connected",
            ))
        }
    }

    fn connect(&mut self, events: BackendEvents) -> Result<()> {
        if !self.reachable {
            return Err(BridgeError::NotAvailable(
                "Local store is unreachable".to_string(),
            ));
        }
        self.events = Some(events);
        self.connected.store(true, Ordering::SeqCst);
        self.log(format!(
            "Connected to local store ({} products)",
            self.catalog.len()
        ));
        Ok(())
    }

    fn drop_connection(&mut self, notify: bool) {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        if let Some(events) = self.events.take() {
            if notify && was_connected {
                events.disconnected();
            }
        }
    }

    fn query(&self, product_ids: &[ProductId]) -> Result<Vec<ProductDetails>> {
        self.ensure_connected()?;
        // Catalog order, not request order; the bridge restores request order
        let found: Vec<ProductDetails> = self
            .catalog
            .entries()
            .filter(|entry| product_ids.contains(entry.product_id()))
            .map(|entry| entry.details.clone())
            .collect();
        self.log(format!(
            "Query for {} ids matched {} products",
            product_ids.len(),
            found.len()
        ));
        Ok(found)
    }

    fn owns(&self, product_id: &ProductId) -> bool {
        self.owned.iter().any(|purchase| purchase.covers(product_id))
    }

    fn issue_purchase(&mut self, product_id: &ProductId, state: PurchaseState) -> Purchase {
        let mut purchase = Purchase::new(product_id.clone(), Uuid::new_v4().to_string())
            .with_order_id(format!("LOCAL.{}", Uuid::new_v4()))
            .with_state(state);
        purchase.original_json = serde_json::to_string(&serde_json::json!({
            "productId": product_id.as_str(),
            "orderId": purchase.order_id,
            "purchaseTime": purchase.purchase_time.timestamp_millis(),
        }))
        .ok();
        self.owned.push(purchase.clone());
        purchase
    }

    fn purchase(&mut self, product_id: &ProductId) -> Result<Purchase> {
        self.ensure_connected()?;

        if let Some(code) = self.fail_next_purchase.take() {
            self.log(format!("Injected failure for {}: {}", product_id, code));
            return Err(BridgeError::rejected(
                code,
                format!("Purchase of {} failed", product_id),
            ));
        }

        let entry = self.catalog.get(product_id).ok_or_else(|| {
            BridgeError::rejected(
                BillingResponse::ItemUnavailable,
                format!("{} is not in the catalog", product_id),
            )
        })?;

        // Consumables are also blocked until the previous purchase is consumed
        if self.owns(product_id) {
            let kind = if entry.consumable {
                "Unconsumed purchase"
            } else {
                "Item"
            };
            return Err(BridgeError::rejected(
                BillingResponse::ItemAlreadyOwned,
                format!("{} of {} is already owned", kind, product_id),
            ));
        }

        let purchase = self.issue_purchase(product_id, PurchaseState::Purchased);
        self.log(format!("Purchased {}", product_id));
        Ok(purchase)
    }

    fn restore(&self) -> Result<Vec<Purchase>> {
        self.ensure_connected()?;
        let restored: Vec<Purchase> = self
            .owned
            .iter()
            .filter(|purchase| purchase.is_purchased())
            .cloned()
            .collect();
        self.log(format!("Restored {} purchases", restored.len()));
        Ok(restored)
    }

    fn position_of(&self, purchase_token: &str) -> Result<usize> {
        self.owned
            .iter()
            .position(|purchase| purchase.purchase_token == purchase_token)
            .ok_or_else(|| {
                BridgeError::rejected(
                    BillingResponse::ItemNotOwned,
                    "No purchase matches the token",
                )
            })
    }

    fn consume(&mut self, purchase_token: &str) -> Result<()> {
        self.ensure_connected()?;
        let index = self.position_of(purchase_token)?;
        let purchase = self.owned.remove(index);
        self.log(format!(
            "Consumed purchase of {}",
            purchase
                .primary_product()
                .map(ProductId::as_str)
                .unwrap_or_default()
        ));
        Ok(())
    }

    fn acknowledge(&mut self, purchase_token: &str) -> Result<()> {
        self.ensure_connected()?;
        let index = self.position_of(purchase_token)?;
        if !self.owned[index].is_purchased() {
            return Err(BridgeError::rejected(
                BillingResponse::DeveloperError,
                "Pending purchases cannot be acknowledged",
            ));
        }
        self.owned[index].acknowledged = true;
        self.log("Acknowledged purchase".to_string());
        Ok(())
    }
}

fn run_store_thread(jobs: mpsc::Receiver<Job>, mut state: StoreState) {
    debug!("Local store thread started");
    while let Ok(job) = jobs.recv() {
        job(&mut state);
    }
    debug!(parked = state.parked.len(), "Local store thread stopped");
}

/// In-process [`PurchaseBackend`] backed by a [`Catalog`].
///
/// # Example
///
/// ```no_run
/// use bridge_desktop::{LocalStoreBackend, CatalogEntry};
/// use bridge_traits::{ProductDetails, ProductId};
///
/// let coins = ProductId::parse("coins.100").unwrap();
/// let store = LocalStoreBackend::with_catalog(vec![CatalogEntry::new(
///     ProductDetails::in_app(coins, "100 Coins", "$0.99", 990_000, "USD"),
/// )
/// .consumable()]);
/// ```
pub struct LocalStoreBackend {
    jobs: Option<Mutex<mpsc::Sender<Job>>>,
    connected: Arc<AtomicBool>,
    purchases_enabled: AtomicBool,
}

impl LocalStoreBackend {
    /// Creates a store with an empty catalog.
    pub fn new() -> Self {
        Self::with_catalog(Catalog::new())
    }

    /// Creates a store serving the given catalog.
    pub fn with_catalog(catalog: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let connected = Arc::new(AtomicBool::new(false));
        let state = StoreState {
            catalog: catalog.into_iter().collect(),
            owned: Vec::new(),
            events: None,
            reachable: true,
            latency: Duration::ZERO,
            fail_next_purchase: None,
            unresponsive: false,
            parked: Vec::new(),
            connected: Arc::clone(&connected),
        };

        let (sender, receiver) = mpsc::channel::<Job>();
        let jobs = match thread::Builder::new()
            .name(STORE_THREAD_NAME.to_string())
            .spawn(move || run_store_thread(receiver, state))
        {
            Ok(_) => Some(Mutex::new(sender)),
            Err(e) => {
                error!(error = %e, "Failed to start local store thread");
                None
            }
        };

        Self {
            jobs,
            connected,
            purchases_enabled: AtomicBool::new(true),
        }
    }

    /// Creates a store from a JSON catalog file.
    pub async fn from_catalog_file(path: impl AsRef<Path>) -> Result<Self> {
        let catalog = Catalog::load(path).await?;
        info!(products = catalog.len(), "Local store catalog loaded");
        Ok(Self::with_catalog(catalog))
    }

    /// Runs `f` on the store thread and waits for its answer.
    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut StoreState) -> Result<T> + Send + 'static,
    {
        let (reply, answer) = oneshot::channel::<Result<T>>();
        let job: Job = Box::new(move |state: &mut StoreState| {
            if state.unresponsive {
                state.parked.push(Box::new(reply));
                return;
            }
            if !state.latency.is_zero() {
                thread::sleep(state.latency);
            }
            let _ = reply.send(f(state));
        });

        self.submit(job)?;
        answer.await.map_err(|_| {
            BridgeError::OperationFailed("Local store dropped the request".to_string())
        })?
    }

    fn submit(&self, job: Job) -> Result<()> {
        let stopped =
            || BridgeError::NotAvailable("Local store thread is not running".to_string());
        let jobs = self.jobs.as_ref().ok_or_else(stopped)?;
        let sender = jobs.lock().map_err(|_| stopped())?;
        sender.send(job).map_err(|_| stopped())
    }

    /// Changes store state without waiting for the store thread.
    fn configure(&self, f: impl FnOnce(&mut StoreState) + Send + 'static) {
        if self.submit(Box::new(f)).is_err() {
            warn!("Local store thread is gone; configuration change dropped");
        }
    }

    /// Adds or replaces a catalog entry.
    pub fn add_product(&self, entry: CatalogEntry) {
        self.configure(move |state| state.catalog.insert(entry));
    }

    /// Toggles whether the store service can be reached.
    ///
    /// Making the store unreachable drops an existing connection and reports
    /// it through [`BackendEvents::disconnected`].
    pub fn set_reachable(&self, reachable: bool) {
        self.configure(move |state| {
            state.reachable = reachable;
            if !reachable {
                state.drop_connection(true);
            }
        });
    }

    /// Models device-level purchase restrictions such as parental controls.
    pub fn set_purchases_enabled(&self, enabled: bool) {
        self.purchases_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Delay applied to every request on the store thread.
    pub fn set_latency(&self, latency: Duration) {
        self.configure(move |state| state.latency = latency);
    }

    /// Fails the next purchase request with `code`.
    pub fn fail_next_purchase(&self, code: BillingResponse) {
        self.configure(move |state| state.fail_next_purchase = Some(code));
    }

    /// While set, requests are accepted but never answered.
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.configure(move |state| state.unresponsive = unresponsive);
    }

    /// Drops the connection as if the store service crashed.
    pub fn simulate_disconnect(&self) {
        self.configure(|state| state.drop_connection(true));
    }

    /// Completes a purchase outside of any request, the way deferred
    /// approvals arrive, and reports it through
    /// [`BackendEvents::purchases_updated`].
    pub async fn approve_deferred_purchase(&self, product_id: ProductId) -> Result<Purchase> {
        self.call(move |state| {
            if state.catalog.get(&product_id).is_none() {
                return Err(BridgeError::rejected(
                    BillingResponse::ItemUnavailable,
                    format!("{} is not in the catalog", product_id),
                ));
            }
            let purchase = state.issue_purchase(&product_id, PurchaseState::Purchased);
            state.log(format!("Deferred purchase of {} approved", product_id));
            if let Some(events) = &state.events {
                events.purchases_updated(vec![purchase.clone()]);
            }
            Ok(purchase)
        })
        .await
    }

    /// Snapshot of the purchases the store currently holds.
    pub async fn owned_purchases(&self) -> Result<Vec<Purchase>> {
        self.call(|state| Ok(state.owned.clone())).await
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Default for LocalStoreBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PurchaseBackend for LocalStoreBackend {
    fn platform(&self) -> StorePlatform {
        StorePlatform::Local
    }

    async fn connect(&self, events: BackendEvents) -> Result<()> {
        self.call(move |state| state.connect(events)).await
    }

    async fn query_products(&self, product_ids: &[ProductId]) -> Result<Vec<ProductDetails>> {
        let product_ids = product_ids.to_vec();
        self.call(move |state| state.query(&product_ids)).await
    }

    async fn purchase(&self, product_id: &ProductId) -> Result<Purchase> {
        if !self.purchases_enabled.load(Ordering::SeqCst) {
            return Err(BridgeError::rejected(
                BillingResponse::BillingUnavailable,
                "Purchases are disabled on this device",
            ));
        }
        let product_id = product_id.clone();
        self.call(move |state| state.purchase(&product_id)).await
    }

    async fn restore_purchases(&self) -> Result<Vec<Purchase>> {
        self.call(|state| state.restore()).await
    }

    async fn consume(&self, purchase_token: &str) -> Result<()> {
        let purchase_token = purchase_token.to_string();
        self.call(move |state| state.consume(&purchase_token)).await
    }

    async fn acknowledge(&self, purchase_token: &str) -> Result<()> {
        let purchase_token = purchase_token.to_string();
        self.call(move |state| state.acknowledge(&purchase_token)).await
    }

    fn can_make_purchases(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.purchases_enabled.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        let _ = self
            .call(|state| {
                state.drop_connection(false);
                Ok(())
            })
            .await;
    }
}
