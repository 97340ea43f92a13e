//! # Purchase Bridge
//!
//! Owns one store connection and turns application requests into backend
//! calls, guaranteeing exactly one terminal notification per accepted request.
//!
//! ## Overview
//!
//! Requests are accepted synchronously on the caller's thread: precondition
//! violations are returned immediately as `Err`, everything else yields a
//! [`RequestTicket`] and runs on a Tokio task guarded by a per-operation
//! timeout and the bridge's shutdown token. Completions are queued to the
//! dispatcher, which invokes the registered [`PurchaseCallbacks`] serially.
//!
//! ## Features
//!
//! - Explicit lifecycle ([`BridgeState`]) with re-initialization after a failed
//!   store connection
//! - Duplicate purchase protection per product identifier
//! - Automatic reconnection after the store drops its connection
//! - Delivery of purchases the store reports outside of any request
//! - Catalog cache populated from successful queries
//! - Purchase event broadcasting through [`EventBus`]

use bridge_traits::{
    BackendEvent, BackendEvents, ProductDetails, ProductId, ProductIdError, Purchase,
    PurchaseBackend, PurchaseState, StorePlatform,
};
use core_runtime::config::{BridgeConfig, Timeouts};
use core_runtime::events::{EventBus, PurchaseEvent, Receiver};
use core_runtime::logging::redact_token;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::callbacks::{
    FinalizeAction, FinalizeResult, ProductQueryResult, PurchaseCallbacks, PurchaseResult,
    RestoreResult,
};
use crate::dispatcher::{CallbackSlot, Dispatcher, Notification, Notifier};
use crate::error::{PurchaseError, Result};
use crate::payload::{ProductCatalog, RestoredPurchases};
use crate::request::{RequestId, RequestTicket};
use crate::state::BridgeState;

const OP_INITIALIZE: &str = "initialize";
const OP_QUERY: &str = "query products";
const OP_PURCHASE: &str = "purchase";
const OP_RESTORE: &str = "restore purchases";
const OP_DESTROY: &str = "destroy";

/// Work that may not run twice at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum InFlightKey {
    Purchase(ProductId),
    /// Consume or acknowledge of one purchase token
    Finalize(String),
}

impl InFlightKey {
    fn describe(&self) -> String {
        match self {
            InFlightKey::Purchase(id) => format!("purchase of {}", id),
            InFlightKey::Finalize(_) => "finalization of this purchase".to_string(),
        }
    }
}

/// Releases an [`InFlightKey`] when the request finishes.
struct InFlightGuard {
    inner: Arc<BridgeInner>,
    key: InFlightKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.inner.in_flight).remove(&self.key);
    }
}

struct BridgeInner {
    backend: Arc<dyn PurchaseBackend>,
    timeouts: Timeouts,
    runtime: Handle,
    state: RwLock<BridgeState>,
    callbacks: CallbackSlot,
    /// Taken on destroy; the dispatcher stops once every clone is gone
    notifier: Mutex<Option<Notifier>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    event_bus: EventBus,
    in_flight: Mutex<HashSet<InFlightKey>>,
    products: RwLock<HashMap<ProductId, ProductDetails>>,
    next_request_id: AtomicU64,
    connected: AtomicBool,
    /// Incremented per connection attempt so stale event listeners can be told apart
    connection: AtomicU64,
    reconnect: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
}

impl BridgeInner {
    fn state(&self) -> BridgeState {
        *read(&self.state)
    }

    fn next_id(&self) -> RequestId {
        RequestId::new(self.next_request_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Admits a query/purchase/restore/finalize request.
    fn accept(&self, operation: &'static str) -> Result<Notifier> {
        let state = *read(&self.state);
        if !state.accepts_requests() {
            debug!(operation, %state, "Request rejected");
            return Err(PurchaseError::precondition(operation, state));
        }
        lock(&self.notifier)
            .clone()
            .ok_or_else(|| PurchaseError::precondition(operation, BridgeState::Destroyed))
    }

    /// Claims `key` synchronously so back-to-back calls conflict deterministically.
    fn claim(self: &Arc<Self>, key: InFlightKey) -> Result<InFlightGuard> {
        let mut in_flight = lock(&self.in_flight);
        if !in_flight.insert(key.clone()) {
            warn!("{} already in progress", key.describe());
            return Err(PurchaseError::OperationInProgress(key.describe()));
        }
        Ok(InFlightGuard {
            inner: Arc::clone(self),
            key,
        })
    }

    async fn connect(self: &Arc<Self>, notifier: &Notifier) -> Result<()> {
        let (events, receiver) = BackendEvents::channel();
        let generation = self.connection.fetch_add(1, Ordering::SeqCst) + 1;
        self.spawn_listener(receiver, notifier.clone(), generation);

        let limit = self.timeouts.setup;
        match timeout(limit, self.backend.connect(events)).await {
            Ok(Ok(())) => {
                self.connected.store(true, Ordering::SeqCst);
                info!(platform = %self.backend.platform(), "Store connected");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Store connection failed");
                Err(PurchaseError::BackendUnavailable(e.to_string()))
            }
            Err(_) => {
                warn!(?limit, "Store connection timed out");
                Err(PurchaseError::BackendUnavailable(format!(
                    "store connection timed out after {:?}",
                    limit
                )))
            }
        }
    }

    fn spawn_listener(
        self: &Arc<Self>,
        mut receiver: mpsc::UnboundedReceiver<BackendEvent>,
        notifier: Notifier,
        generation: u64,
    ) {
        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = inner.shutdown.cancelled() => break,
                    event = receiver.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                inner.handle_backend_event(event, &notifier, generation);
            }
            trace!(generation, "Store event listener stopped");
        });
    }

    fn handle_backend_event(&self, event: BackendEvent, notifier: &Notifier, generation: u64) {
        match event {
            BackendEvent::DebugLog(message) => {
                trace!(%message, "Store log");
                notifier.debug_log(message);
            }
            BackendEvent::Disconnected => {
                let current = self.connection.load(Ordering::SeqCst) == generation;
                if current && self.connected.swap(false, Ordering::SeqCst) {
                    warn!("Store connection lost; reconnecting on next request");
                    notifier.notify(Notification::BackendDisconnected);
                }
            }
            BackendEvent::PurchasesUpdated(purchases) => {
                for purchase in purchases {
                    let product_id = purchase
                        .primary_product()
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    // Reported again once the store settles the payment
                    if purchase.state == PurchaseState::Pending {
                        debug!(%product_id, "Ignoring pending purchase update");
                        continue;
                    }
                    info!(%product_id, "Store reported a purchase outside of any request");
                    notifier.notify(Notification::PurchaseCompleted {
                        result: PurchaseResult {
                            request_id: None,
                            product_id,
                            outcome: Ok(purchase),
                        },
                        reply: None,
                    });
                }
            }
        }
    }

    fn finish_setup(&self, outcome: &Result<()>) {
        let mut state = write(&self.state);
        // Destroy may have won the race
        if *state == BridgeState::Initializing {
            *state = if outcome.is_ok() {
                BridgeState::Ready
            } else {
                BridgeState::Failed
            };
            let finished = *state;
            info!(state = %finished, "Store setup finished");
        }
    }

    /// Makes sure a live store connection exists before a request runs.
    async fn ensure_connected(self: &Arc<Self>, notifier: &Notifier) -> Result<()> {
        match self.state() {
            BridgeState::Ready => {}
            BridgeState::Failed => {
                return Err(PurchaseError::BackendUnavailable(
                    "store setup failed; initialize again to retry".to_string(),
                ))
            }
            BridgeState::Destroyed => return Err(PurchaseError::Cancelled),
            other => return Err(PurchaseError::precondition("reach the store", other)),
        }

        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let _reconnecting = self.reconnect.lock().await;
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        info!("Reconnecting to store");
        notifier.debug_log("Reconnecting to store");
        self.connect(notifier).await
    }

    /// Runs backend work under the connection check, `limit` and shutdown.
    async fn run<T, F>(
        self: &Arc<Self>,
        notifier: &Notifier,
        operation: &'static str,
        limit: Duration,
        work: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let guarded = async {
            self.ensure_connected(notifier).await?;
            work.await
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(PurchaseError::Cancelled),
            result = timeout(limit, guarded) => result.unwrap_or_else(|_| {
                warn!(operation, ?limit, "Store did not answer in time");
                Err(PurchaseError::Timeout { operation, after: limit })
            }),
        }
    }

    async fn query(self: &Arc<Self>, notifier: &Notifier, requested: &[String]) -> Result<ProductCatalog> {
        let ids = parse_ids(requested)?;
        if ids.is_empty() {
            return Ok(ProductCatalog::empty());
        }

        let mut unique: Vec<ProductId> = Vec::with_capacity(ids.len());
        for id in &ids {
            if !unique.contains(id) {
                unique.push(id.clone());
            }
        }

        let found = self
            .run(notifier, OP_QUERY, self.timeouts.query, async {
                self.backend
                    .query_products(&unique)
                    .await
                    .map_err(PurchaseError::from)
            })
            .await?;

        let catalog = ProductCatalog::in_request_order(&ids, found);
        let mut cache = write(&self.products);
        for details in &catalog.products {
            cache.insert(details.product_id.clone(), details.clone());
        }
        Ok(catalog)
    }
}

/// The purchase bridge.
///
/// One instance per store connection; instances share nothing. Dropping a
/// bridge that was not destroyed destroys it.
///
/// # Examples
///
/// ```no_run
/// use core_purchase::{PurchaseBridge, PurchaseCallbacks, PurchaseResult};
/// use core_runtime::config::BridgeConfig;
/// use std::sync::Arc;
///
/// struct Shop;
///
/// impl PurchaseCallbacks for Shop {
///     fn on_purchase_result(&self, result: &PurchaseResult) {
///         println!("{}: {:?}", result.product_id, result.diagnostic());
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bridge = PurchaseBridge::new(BridgeConfig::builder().build()?)?;
/// bridge.initialize(Arc::new(Shop))?.outcome().await?;
///
/// let catalog = bridge.query_products(["sku.a", "sku.b"])?.outcome().await?;
/// println!("{}", catalog.to_json()?);
///
/// bridge.purchase_product("sku.a")?;
/// # Ok(())
/// # }
/// ```
pub struct PurchaseBridge {
    inner: Arc<BridgeInner>,
}

impl PurchaseBridge {
    /// Creates a bridge on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// `PurchaseError::Config` when called outside a Tokio runtime; use
    /// [`with_runtime`](Self::with_runtime) there.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            PurchaseError::Config(
                "PurchaseBridge::new must be called within a Tokio runtime".to_string(),
            )
        })?;
        Ok(Self::with_runtime(config, runtime))
    }

    /// Creates a bridge whose tasks run on `runtime`.
    pub fn with_runtime(config: BridgeConfig, runtime: Handle) -> Self {
        let event_bus = EventBus::new(config.event_buffer_size);
        let callbacks: CallbackSlot = Arc::new(RwLock::new(None));
        let (notifier, dispatcher) = Dispatcher::new(
            Arc::clone(&callbacks),
            event_bus.clone(),
            config.logger_sink.clone(),
        )
        .spawn(&runtime);

        info!(platform = %config.backend.platform(), "Purchase bridge created");

        Self {
            inner: Arc::new(BridgeInner {
                backend: config.backend,
                timeouts: config.timeouts,
                runtime,
                state: RwLock::new(BridgeState::Uninitialized),
                callbacks,
                notifier: Mutex::new(Some(notifier)),
                dispatcher: Mutex::new(Some(dispatcher)),
                event_bus,
                in_flight: Mutex::new(HashSet::new()),
                products: RwLock::new(HashMap::new()),
                next_request_id: AtomicU64::new(1),
                connected: AtomicBool::new(false),
                connection: AtomicU64::new(0),
                reconnect: tokio::sync::Mutex::new(()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn state(&self) -> BridgeState {
        self.inner.state()
    }

    pub fn platform(&self) -> StorePlatform {
        self.inner.backend.platform()
    }

    /// Subscribes to purchase events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<PurchaseEvent> {
        self.inner.event_bus.subscribe()
    }

    /// Details of a product returned by an earlier successful query.
    pub fn cached_product(&self, product_id: &str) -> Option<ProductDetails> {
        let id = ProductId::parse(product_id).ok()?;
        read(&self.inner.products).get(&id).cloned()
    }

    /// Registers `callbacks` and connects to the store.
    ///
    /// `on_billing_setup` fires exactly once per call; the ticket resolves
    /// with `Ok(())` or `BackendUnavailable`.
    ///
    /// # Errors
    ///
    /// - `PurchaseError::AlreadyInitialized` while initializing or ready
    /// - `PurchaseError::PreconditionViolation` after destroy
    #[instrument(skip(self, callbacks))]
    pub fn initialize(&self, callbacks: Arc<dyn PurchaseCallbacks>) -> Result<RequestTicket<()>> {
        let notifier = {
            let mut state = write(&self.inner.state);
            match *state {
                current if current.can_initialize() => {}
                BridgeState::Destroyed => {
                    return Err(PurchaseError::precondition(
                        OP_INITIALIZE,
                        BridgeState::Destroyed,
                    ))
                }
                current => {
                    warn!(state = %current, "Initialize called twice");
                    return Err(PurchaseError::AlreadyInitialized);
                }
            }

            let notifier = lock(&self.inner.notifier).clone().ok_or_else(|| {
                PurchaseError::precondition(OP_INITIALIZE, BridgeState::Destroyed)
            })?;
            *write(&self.inner.callbacks) = Some(callbacks);
            *state = BridgeState::Initializing;
            notifier
        };

        let (ticket, reply) = RequestTicket::new(self.inner.next_id());
        info!(request_id = %ticket.id(), "Connecting to store");

        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = inner.shutdown.cancelled() => Err(PurchaseError::Cancelled),
                result = inner.connect(&notifier) => result,
            };
            inner.finish_setup(&outcome);
            notifier.notify(Notification::BillingSetup { outcome, reply });
        });

        Ok(ticket)
    }

    /// Queries catalog details for `product_ids`.
    ///
    /// The catalog lists found products in request order; identifiers the
    /// store does not know go to `invalid_product_ids`. A malformed identifier
    /// fails the whole query with `InvalidIdentifier`. An empty list completes
    /// with an empty catalog.
    pub fn query_products<I, S>(&self, product_ids: I) -> Result<RequestTicket<ProductCatalog>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let notifier = self.inner.accept(OP_QUERY)?;
        let requested: Vec<String> = product_ids.into_iter().map(Into::into).collect();

        let (ticket, reply) = RequestTicket::new(self.inner.next_id());
        let request_id = ticket.id();
        debug!(%request_id, count = requested.len(), "Querying products");

        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            let outcome = inner.query(&notifier, &requested).await;
            if let Err(e) = &outcome {
                warn!(%request_id, error = %e, "Product query failed");
            }
            notifier.notify(Notification::ProductsQueried {
                result: ProductQueryResult {
                    request_id,
                    requested,
                    outcome,
                },
                reply,
            });
        });

        Ok(ticket)
    }

    /// Starts the store purchase flow for `product_id`.
    ///
    /// A second purchase of the same product while the first is outstanding
    /// completes with `OperationInProgress`; the first is unaffected.
    pub fn purchase_product(&self, product_id: impl Into<String>) -> Result<RequestTicket<Purchase>> {
        let notifier = self.inner.accept(OP_PURCHASE)?;
        let raw = product_id.into();

        let (ticket, reply) = RequestTicket::new(self.inner.next_id());
        let request_id = ticket.id();
        info!(%request_id, product_id = %raw, "Purchase requested");

        let claim = parse_id(&raw).and_then(|id| {
            self.inner
                .claim(InFlightKey::Purchase(id.clone()))
                .map(|guard| (id, guard))
        });

        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            let outcome = match claim {
                Ok((id, _in_flight)) => {
                    inner
                        .run(&notifier, OP_PURCHASE, inner.timeouts.purchase, async {
                            inner.backend.purchase(&id).await.map_err(PurchaseError::from)
                        })
                        .await
                }
                Err(e) => Err(e),
            };

            match &outcome {
                Ok(purchase) => {
                    info!(%request_id, state = ?purchase.state, "Purchase completed")
                }
                Err(PurchaseError::UserCancelled) => {
                    info!(%request_id, "Purchase cancelled by the user")
                }
                Err(e) => warn!(%request_id, error = %e, "Purchase failed"),
            }

            notifier.notify(Notification::PurchaseCompleted {
                result: PurchaseResult {
                    request_id: Some(request_id),
                    product_id: raw,
                    outcome,
                },
                reply: Some(reply),
            });
        });

        Ok(ticket)
    }

    /// Asks the store for purchases the user already owns.
    pub fn restore_purchases(&self) -> Result<RequestTicket<RestoredPurchases>> {
        let notifier = self.inner.accept(OP_RESTORE)?;

        let (ticket, reply) = RequestTicket::new(self.inner.next_id());
        let request_id = ticket.id();
        info!(%request_id, "Restoring purchases");

        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            let outcome = inner
                .run(&notifier, OP_RESTORE, inner.timeouts.restore, async {
                    inner
                        .backend
                        .restore_purchases()
                        .await
                        .map_err(PurchaseError::from)
                })
                .await
                .map(RestoredPurchases::from_purchases);

            match &outcome {
                Ok(restored) => {
                    info!(%request_id, count = restored.product_ids.len(), "Purchases restored")
                }
                Err(e) => warn!(%request_id, error = %e, "Restore failed"),
            }

            notifier.notify(Notification::RestoreCompleted {
                result: RestoreResult {
                    request_id,
                    outcome,
                },
                reply,
            });
        });

        Ok(ticket)
    }

    /// Consumes a purchase so its product can be bought again.
    ///
    /// Completion is reported through `on_finalize_result`, the ticket and
    /// the event bus.
    pub fn consume_purchase(&self, purchase_token: impl Into<String>) -> Result<RequestTicket<()>> {
        self.finalize(FinalizeAction::Consume, purchase_token.into())
    }

    /// Acknowledges a purchase. Reported like [`consume_purchase`](Self::consume_purchase).
    pub fn acknowledge_purchase(
        &self,
        purchase_token: impl Into<String>,
    ) -> Result<RequestTicket<()>> {
        self.finalize(FinalizeAction::Acknowledge, purchase_token.into())
    }

    fn finalize(&self, action: FinalizeAction, purchase_token: String) -> Result<RequestTicket<()>> {
        let operation = action.operation();
        let notifier = self.inner.accept(operation)?;

        let (ticket, reply) = RequestTicket::new(self.inner.next_id());
        let request_id = ticket.id();
        debug!(
            %request_id,
            operation,
            purchase_token = %redact_token(&purchase_token),
            "Finalizing purchase"
        );

        let claim = if purchase_token.trim().is_empty() {
            Err(PurchaseError::InvalidIdentifier {
                id: purchase_token.clone(),
                reason: "purchase token is empty".to_string(),
            })
        } else {
            self.inner.claim(InFlightKey::Finalize(purchase_token.clone()))
        };

        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            let outcome = match claim {
                Ok(_in_flight) => {
                    inner
                        .run(&notifier, operation, inner.timeouts.finalize, async {
                            let result = match action {
                                FinalizeAction::Consume => inner.backend.consume(&purchase_token).await,
                                FinalizeAction::Acknowledge => {
                                    inner.backend.acknowledge(&purchase_token).await
                                }
                            };
                            result.map_err(PurchaseError::from)
                        })
                        .await
                }
                Err(e) => Err(e),
            };

            if let Err(e) = &outcome {
                warn!(%request_id, operation, error = %e, "Finalization failed");
            }

            notifier.notify(Notification::Finalized {
                result: FinalizeResult {
                    request_id,
                    action,
                    purchase_token,
                    outcome,
                },
                reply,
            });
        });

        Ok(ticket)
    }

    /// Whether the store currently accepts purchases.
    ///
    /// Answers from cached state only and never waits on the store.
    pub fn can_make_purchases(&self) -> bool {
        self.inner.state() == BridgeState::Ready
            && self.inner.connected.load(Ordering::SeqCst)
            && self.inner.backend.can_make_purchases()
    }

    /// Tears the bridge down.
    ///
    /// Every pending request completes with `Cancelled` through its callback,
    /// after which the callback registration is released. All later calls,
    /// including a second `destroy`, fail with `PreconditionViolation`.
    #[instrument(skip(self))]
    pub fn destroy(&self) -> Result<()> {
        // Cancel before publishing the state so in-flight work resolves as Cancelled
        self.inner.shutdown.cancel();

        let notifier = {
            let mut state = write(&self.inner.state);
            if *state == BridgeState::Destroyed {
                return Err(PurchaseError::precondition(
                    OP_DESTROY,
                    BridgeState::Destroyed,
                ));
            }
            *state = BridgeState::Destroyed;
            lock(&self.inner.notifier).take()
        };
        drop(notifier);

        self.inner.connected.store(false, Ordering::SeqCst);
        let backend = Arc::clone(&self.inner.backend);
        let limit = self.inner.timeouts.setup;
        self.inner.runtime.spawn(async move {
            if timeout(limit, backend.disconnect()).await.is_err() {
                warn!(?limit, "Store did not close its connection in time");
            }
        });

        info!("Purchase bridge destroyed");
        Ok(())
    }

    /// Waits until a destroyed bridge has delivered its last notification
    /// and released its callbacks. Returns immediately if already awaited.
    pub async fn closed(&self) {
        let dispatcher = lock(&self.inner.dispatcher).take();
        if let Some(dispatcher) = dispatcher {
            let _ = dispatcher.await;
        }
    }
}

impl Drop for PurchaseBridge {
    fn drop(&mut self) {
        if self.inner.state() != BridgeState::Destroyed {
            let _ = self.destroy();
        }
    }
}

impl fmt::Debug for PurchaseBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PurchaseBridge")
            .field("platform", &self.inner.backend.platform())
            .field("state", &self.inner.state())
            .finish()
    }
}

fn parse_id(raw: &str) -> Result<ProductId> {
    ProductId::parse(raw).map_err(|e: ProductIdError| PurchaseError::InvalidIdentifier {
        id: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_ids(raw: &[String]) -> Result<Vec<ProductId>> {
    raw.iter().map(|id| parse_id(id)).collect()
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
