//! # Native Store Glue
//!
//! Lets StoreKit or Play Billing code written in the host language act as a
//! [`PurchaseBackend`]. The glue fills an [`IapStoreVTable`]; each vtable
//! call carries a request id that the glue later answers through one of the
//! `iap_store_complete_*` functions, from any thread.
//!
//! Completions report a Google Play Billing response code (`0` for success)
//! plus a JSON payload on success or an optional message on failure. Payloads
//! use the serde shapes of [`ProductDetails`] and [`Purchase`].

use async_trait::async_trait;
use bridge_traits::{
    error::Result as BridgeResult, BackendEvents, BillingResponse, BridgeError, ProductDetails,
    ProductId, Purchase, PurchaseBackend, StorePlatform,
};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::ffi::{c_char, c_void};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::strings::{optional, required, to_c};
use crate::{guard, FfiError, IapStatus, Result};

/// Store family implemented by the native glue.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IapStorePlatform {
    AppStore = 0,
    GooglePlay = 1,
    Local = 2,
}

impl From<IapStorePlatform> for StorePlatform {
    fn from(platform: IapStorePlatform) -> Self {
        match platform {
            IapStorePlatform::AppStore => StorePlatform::AppStore,
            IapStorePlatform::GooglePlay => StorePlatform::GooglePlay,
            IapStorePlatform::Local => StorePlatform::Local,
        }
    }
}

/// Functions the native glue provides.
///
/// Every function except `end_connection` is required. String arguments are
/// borrowed for the duration of the call. `can_make_purchases` must answer
/// from cached state without blocking.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IapStoreVTable {
    pub context: *mut c_void,
    pub platform: IapStorePlatform,
    pub start_connection: Option<unsafe extern "C" fn(context: *mut c_void, request_id: u64)>,
    pub query_products: Option<
        unsafe extern "C" fn(
            context: *mut c_void,
            request_id: u64,
            product_ids: *const *const c_char,
            count: usize,
        ),
    >,
    pub launch_purchase: Option<
        unsafe extern "C" fn(context: *mut c_void, request_id: u64, product_id: *const c_char),
    >,
    pub restore_purchases: Option<unsafe extern "C" fn(context: *mut c_void, request_id: u64)>,
    pub consume: Option<
        unsafe extern "C" fn(context: *mut c_void, request_id: u64, purchase_token: *const c_char),
    >,
    pub acknowledge: Option<
        unsafe extern "C" fn(context: *mut c_void, request_id: u64, purchase_token: *const c_char),
    >,
    pub can_make_purchases: Option<unsafe extern "C" fn(context: *mut c_void) -> bool>,
    pub end_connection: Option<unsafe extern "C" fn(context: *mut c_void)>,
}

type ContextFn = unsafe extern "C" fn(*mut c_void, u64);
type StringFn = unsafe extern "C" fn(*mut c_void, u64, *const c_char);
type ArrayFn = unsafe extern "C" fn(*mut c_void, u64, *const *const c_char, usize);

/// Validated copy of an [`IapStoreVTable`].
#[derive(Clone, Copy)]
struct StoreFns {
    context: *mut c_void,
    platform: StorePlatform,
    start_connection: ContextFn,
    query_products: ArrayFn,
    launch_purchase: StringFn,
    restore_purchases: ContextFn,
    consume: StringFn,
    acknowledge: StringFn,
    can_make_purchases: unsafe extern "C" fn(*mut c_void) -> bool,
    end_connection: Option<unsafe extern "C" fn(*mut c_void)>,
}

impl StoreFns {
    fn from_vtable(vtable: &IapStoreVTable) -> Result<Self> {
        Ok(Self {
            context: vtable.context,
            platform: vtable.platform.into(),
            start_connection: vtable
                .start_connection
                .ok_or(FfiError::NullPointer("start_connection"))?,
            query_products: vtable
                .query_products
                .ok_or(FfiError::NullPointer("query_products"))?,
            launch_purchase: vtable
                .launch_purchase
                .ok_or(FfiError::NullPointer("launch_purchase"))?,
            restore_purchases: vtable
                .restore_purchases
                .ok_or(FfiError::NullPointer("restore_purchases"))?,
            consume: vtable.consume.ok_or(FfiError::NullPointer("consume"))?,
            acknowledge: vtable
                .acknowledge
                .ok_or(FfiError::NullPointer("acknowledge"))?,
            can_make_purchases: vtable
                .can_make_purchases
                .ok_or(FfiError::NullPointer("can_make_purchases"))?,
            end_connection: vtable.end_connection,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Connection,
    Query,
    Purchase,
    Restore,
    /// Consume or acknowledge
    Simple,
}

#[derive(Debug)]
enum Completion {
    Done,
    Products(Vec<ProductDetails>),
    Purchase(Purchase),
    Purchases(Vec<Purchase>),
}

struct Pending {
    connection: u64,
    kind: RequestKind,
    reply: oneshot::Sender<BridgeResult<Completion>>,
}

type PendingMap = Mutex<HashMap<u64, Pending>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Forgets a request when its future is dropped (timeout or shutdown).
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    request_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.request_id);
    }
}

/// State behind one store handle, shared by every bridge created over it.
///
/// Request ids are unique per store so completions route to the right
/// bridge without naming it.
struct StoreShared {
    fns: StoreFns,
    pending: PendingMap,
    next_request_id: AtomicU64,
    next_connection: AtomicU64,
    /// Event senders of connected bridges, keyed by connection
    connections: Mutex<HashMap<u64, BackendEvents>>,
}

// The native glue guarantees its context and functions are thread-safe.
unsafe impl Send for StoreShared {}
unsafe impl Sync for StoreShared {}

impl StoreShared {
    fn new(fns: StoreFns) -> Self {
        Self {
            fns,
            pending: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
            next_connection: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves a pending request of the expected kind.
    fn complete(
        &self,
        request_id: u64,
        kind: RequestKind,
        outcome: BridgeResult<Completion>,
    ) -> Result<()> {
        let mut pending = lock(&self.pending);
        match pending.remove(&request_id) {
            Some(entry) if entry.kind == kind => {
                drop(pending);
                if entry.reply.send(outcome).is_err() {
                    trace!(request_id, "Completion arrived after the request was abandoned");
                }
                Ok(())
            }
            Some(entry) => {
                pending.insert(request_id, entry);
                Err(FfiError::CompletionMismatch(request_id))
            }
            None => {
                warn!(request_id, ?kind, "Completion for unknown request");
                Err(FfiError::UnknownRequest(request_id))
            }
        }
    }

    /// Hands a store notification to every connected bridge.
    fn broadcast(&self, notify: impl Fn(&BackendEvents) -> bool) {
        let connections: Vec<BackendEvents> = lock(&self.connections).values().cloned().collect();
        if connections.is_empty() {
            trace!("Store notification with no connected bridge");
        }
        for events in &connections {
            notify(events);
        }
    }

    /// Drops one bridge's registration and fails its outstanding requests.
    ///
    /// Returns whether it was the last connected bridge.
    fn release(&self, connection: u64) -> bool {
        lock(&self.pending).retain(|_, entry| entry.connection != connection);
        let mut connections = lock(&self.connections);
        connections.remove(&connection).is_some() && connections.is_empty()
    }
}

/// One bridge's connection to the native store.
///
/// Outstanding requests and event delivery are scoped to the connection, so
/// bridges sharing a store handle never disturb each other.
pub(crate) struct ForeignBackend {
    shared: Arc<StoreShared>,
    connection: u64,
}

impl ForeignBackend {
    fn new(shared: Arc<StoreShared>) -> Self {
        let connection = shared.next_connection.fetch_add(1, Ordering::Relaxed);
        Self { shared, connection }
    }

    /// Registers a pending request, hands its id to `dispatch` and waits for
    /// the matching completion.
    async fn request<F>(&self, kind: RequestKind, dispatch: F) -> BridgeResult<Completion>
    where
        F: FnOnce(&StoreFns, u64),
    {
        let shared = &self.shared;
        let request_id = shared.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (reply, receiver) = oneshot::channel();
        lock(&shared.pending).insert(
            request_id,
            Pending {
                connection: self.connection,
                kind,
                reply,
            },
        );
        let _forget = PendingGuard {
            pending: &shared.pending,
            request_id,
        };

        debug!(
            request_id,
            connection = self.connection,
            ?kind,
            "Dispatching request to native store"
        );
        dispatch(&shared.fns, request_id);

        receiver.await.unwrap_or_else(|_| {
            Err(BridgeError::OperationFailed(
                "Native store dropped the request".to_string(),
            ))
        })
    }
}

impl Drop for ForeignBackend {
    fn drop(&mut self) {
        self.shared.release(self.connection);
    }
}

fn unexpected(completion: Completion) -> BridgeError {
    BridgeError::OperationFailed(format!("Unexpected completion: {:?}", completion))
}

#[async_trait]
impl PurchaseBackend for ForeignBackend {
    fn platform(&self) -> StorePlatform {
        self.shared.fns.platform
    }

    async fn connect(&self, events: BackendEvents) -> BridgeResult<()> {
        lock(&self.shared.connections).insert(self.connection, events);
        match self
            .request(RequestKind::Connection, |fns, id| unsafe {
                (fns.start_connection)(fns.context, id)
            })
            .await?
        {
            Completion::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn query_products(&self, product_ids: &[ProductId]) -> BridgeResult<Vec<ProductDetails>> {
        let ids: Vec<_> = product_ids.iter().map(|id| to_c(id.as_str())).collect();
        let completion = self
            .request(RequestKind::Query, |fns, id| {
                let ptrs: Vec<*const c_char> = ids.iter().map(|s| s.as_ptr()).collect();
                unsafe { (fns.query_products)(fns.context, id, ptrs.as_ptr(), ptrs.len()) }
            })
            .await?;
        match completion {
            Completion::Products(products) => Ok(products),
            other => Err(unexpected(other)),
        }
    }

    async fn purchase(&self, product_id: &ProductId) -> BridgeResult<Purchase> {
        let product_id = to_c(product_id.as_str());
        match self
            .request(RequestKind::Purchase, |fns, id| unsafe {
                (fns.launch_purchase)(fns.context, id, product_id.as_ptr())
            })
            .await?
        {
            Completion::Purchase(purchase) => Ok(purchase),
            other => Err(unexpected(other)),
        }
    }

    async fn restore_purchases(&self) -> BridgeResult<Vec<Purchase>> {
        match self
            .request(RequestKind::Restore, |fns, id| unsafe {
                (fns.restore_purchases)(fns.context, id)
            })
            .await?
        {
            Completion::Purchases(purchases) => Ok(purchases),
            other => Err(unexpected(other)),
        }
    }

    async fn consume(&self, purchase_token: &str) -> BridgeResult<()> {
        let token = to_c(purchase_token);
        match self
            .request(RequestKind::Simple, |fns, id| unsafe {
                (fns.consume)(fns.context, id, token.as_ptr())
            })
            .await?
        {
            Completion::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn acknowledge(&self, purchase_token: &str) -> BridgeResult<()> {
        let token = to_c(purchase_token);
        match self
            .request(RequestKind::Simple, |fns, id| unsafe {
                (fns.acknowledge)(fns.context, id, token.as_ptr())
            })
            .await?
        {
            Completion::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn can_make_purchases(&self) -> bool {
        let fns = &self.shared.fns;
        unsafe { (fns.can_make_purchases)(fns.context) }
    }

    async fn disconnect(&self) {
        // The native connection stays up while another bridge uses it
        if !self.shared.release(self.connection) {
            return;
        }
        if let Some(end_connection) = self.shared.fns.end_connection {
            debug!("Last bridge disconnected; ending store connection");
            unsafe { end_connection(self.shared.fns.context) }
        }
    }
}

/// Opaque store handle shared between the native glue and bridges.
pub struct IapStore {
    shared: Arc<StoreShared>,
}

impl IapStore {
    /// Opens a new connection for one bridge.
    pub(crate) fn connection(&self) -> Arc<ForeignBackend> {
        Arc::new(ForeignBackend::new(Arc::clone(&self.shared)))
    }
}

unsafe fn store_ref<'a>(store: *const IapStore) -> Result<&'a IapStore> {
    store.as_ref().ok_or(FfiError::NullPointer("store"))
}

/// Store answer decoded from a completion call.
///
/// Malformed input still yields an outcome so the waiting request resolves
/// with the store's answer; `malformed` keeps what the glue got wrong.
struct Answer<T> {
    outcome: BridgeResult<T>,
    malformed: Option<FfiError>,
}

impl<T> Answer<T> {
    fn valid(outcome: BridgeResult<T>) -> Self {
        Self {
            outcome,
            malformed: None,
        }
    }

    unsafe fn rejected(code: BillingResponse, message: *const c_char) -> Self {
        match optional(message, "message") {
            Ok(message) => Self::valid(Err(BridgeError::rejected(
                code,
                message.unwrap_or_else(|| code.to_string()),
            ))),
            Err(e) => Self {
                outcome: Err(BridgeError::rejected(code, code.to_string())),
                malformed: Some(e),
            },
        }
    }
}

/// Decodes a completion that carries no payload.
unsafe fn answer_done(response_code: i32, message: *const c_char) -> Answer<()> {
    let code = BillingResponse::from_code(response_code);
    if code.is_ok() {
        Answer::valid(Ok(()))
    } else {
        Answer::rejected(code, message)
    }
}

/// Decodes a completion whose success carries a JSON payload.
unsafe fn answer<T: DeserializeOwned>(
    response_code: i32,
    payload: *const c_char,
    message: *const c_char,
) -> Answer<T> {
    let code = BillingResponse::from_code(response_code);
    if !code.is_ok() {
        return Answer::rejected(code, message);
    }
    let payload = match required(payload, "payload") {
        Ok(payload) => payload,
        Err(e) => {
            return Answer {
                outcome: Err(BridgeError::OperationFailed(format!(
                    "Store reported success without a valid payload: {}",
                    e
                ))),
                malformed: Some(e),
            }
        }
    };
    match serde_json::from_str(&payload) {
        Ok(value) => Answer::valid(Ok(value)),
        Err(e) => Answer {
            malformed: Some(FfiError::InvalidJson(e.to_string())),
            outcome: Err(BridgeError::from(e)),
        },
    }
}

/// Completes a request, then reports malformed input to the caller.
unsafe fn finish<T>(
    store: *const IapStore,
    request_id: u64,
    kind: RequestKind,
    decoded: Answer<T>,
    wrap: fn(T) -> Completion,
) -> IapStatus {
    let store = match store_ref(store) {
        Ok(store) => store,
        Err(e) => return e.into(),
    };
    let Answer { outcome, malformed } = decoded;
    if let Some(e) = &malformed {
        warn!(request_id, ?kind, error = %e, "Malformed store completion");
    }
    match store.shared.complete(request_id, kind, outcome.map(wrap)) {
        Ok(()) => malformed.map_or(IapStatus::Ok, |e| e.into()),
        Err(e) => e.into(),
    }
}

/// Creates a store handle from a vtable.
///
/// Returns NULL when `vtable` is NULL or a required function is missing.
///
/// # Safety
/// `vtable` must be NULL or point to a valid [`IapStoreVTable`]. The table is
/// copied; the context must stay valid until every bridge using the store is
/// freed. Several bridges may share one store: each sees only its own
/// requests, and store notifications reach all of them.
#[no_mangle]
pub unsafe extern "C" fn iap_store_new(vtable: *const IapStoreVTable) -> *mut IapStore {
    let Some(vtable) = vtable.as_ref() else {
        return std::ptr::null_mut();
    };
    match StoreFns::from_vtable(vtable) {
        Ok(fns) => Box::into_raw(Box::new(IapStore {
            shared: Arc::new(StoreShared::new(fns)),
        })),
        Err(e) => {
            warn!(error = %e, "Rejected store vtable");
            std::ptr::null_mut()
        }
    }
}

/// Releases the native glue's store handle.
///
/// # Safety
/// `store` must be NULL or a handle from [`iap_store_new`] not yet freed.
#[no_mangle]
pub unsafe extern "C" fn iap_store_free(store: *mut IapStore) {
    if !store.is_null() {
        drop(Box::from_raw(store));
    }
}

/// Answers `start_connection`.
///
/// # Safety
/// `store` must be a live handle; `message` NULL or a C string.
#[no_mangle]
pub unsafe extern "C" fn iap_store_complete_connection(
    store: *const IapStore,
    request_id: u64,
    response_code: i32,
    message: *const c_char,
) -> IapStatus {
    guard("iap_store_complete_connection", || {
        let decoded = answer_done(response_code, message);
        finish(store, request_id, RequestKind::Connection, decoded, |()| {
            Completion::Done
        })
    })
}

/// Answers `query_products` with a JSON array of product details.
///
/// Identifiers the store does not know are simply left out. A success code
/// with a missing or malformed payload still completes the request, as a
/// failure, and returns `InvalidArgument`.
///
/// # Safety
/// `store` must be a live handle; strings NULL or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn iap_store_complete_query(
    store: *const IapStore,
    request_id: u64,
    response_code: i32,
    products_json: *const c_char,
    message: *const c_char,
) -> IapStatus {
    guard("iap_store_complete_query", || {
        let decoded = answer(response_code, products_json, message);
        finish(store, request_id, RequestKind::Query, decoded, Completion::Products)
    })
}

/// Answers `launch_purchase` with a JSON purchase record.
///
/// # Safety
/// `store` must be a live handle; strings NULL or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn iap_store_complete_purchase(
    store: *const IapStore,
    request_id: u64,
    response_code: i32,
    purchase_json: *const c_char,
    message: *const c_char,
) -> IapStatus {
    guard("iap_store_complete_purchase", || {
        let decoded = answer(response_code, purchase_json, message);
        finish(store, request_id, RequestKind::Purchase, decoded, Completion::Purchase)
    })
}

/// Answers `restore_purchases` with a JSON array of purchase records.
///
/// # Safety
/// `store` must be a live handle; strings NULL or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn iap_store_complete_restore(
    store: *const IapStore,
    request_id: u64,
    response_code: i32,
    purchases_json: *const c_char,
    message: *const c_char,
) -> IapStatus {
    guard("iap_store_complete_restore", || {
        let decoded = answer(response_code, purchases_json, message);
        finish(store, request_id, RequestKind::Restore, decoded, Completion::Purchases)
    })
}

/// Answers `consume` or `acknowledge`.
///
/// # Safety
/// `store` must be a live handle; `message` NULL or a C string.
#[no_mangle]
pub unsafe extern "C" fn iap_store_complete_simple(
    store: *const IapStore,
    request_id: u64,
    response_code: i32,
    message: *const c_char,
) -> IapStatus {
    guard("iap_store_complete_simple", || {
        let decoded = answer_done(response_code, message);
        finish(store, request_id, RequestKind::Simple, decoded, |()| {
            Completion::Done
        })
    })
}

/// Forwards a diagnostic line from the store SDK to every connected bridge.
///
/// Ignored while no bridge is connected.
///
/// # Safety
/// `store` must be a live handle; `message` a C string.
#[no_mangle]
pub unsafe extern "C" fn iap_store_debug_log(
    store: *const IapStore,
    message: *const c_char,
) -> IapStatus {
    guard("iap_store_debug_log", || {
        let store = match store_ref(store) {
            Ok(store) => store,
            Err(e) => return e.into(),
        };
        let message = match required(message, "message") {
            Ok(message) => message,
            Err(e) => return e.into(),
        };
        store.shared.broadcast(|events| events.debug_log(message.clone()));
        IapStatus::Ok
    })
}

/// Reports that the store service dropped its connection.
///
/// # Safety
/// `store` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn iap_store_disconnected(store: *const IapStore) -> IapStatus {
    guard("iap_store_disconnected", || {
        let store = match store_ref(store) {
            Ok(store) => store,
            Err(e) => return e.into(),
        };
        store.shared.broadcast(BackendEvents::disconnected);
        IapStatus::Ok
    })
}

/// Reports purchases that completed outside of any request (deferred
/// approvals, purchases started from the store UI) as a JSON array.
///
/// # Safety
/// `store` must be a live handle; `purchases_json` a C string.
#[no_mangle]
pub unsafe extern "C" fn iap_store_purchases_updated(
    store: *const IapStore,
    purchases_json: *const c_char,
) -> IapStatus {
    guard("iap_store_purchases_updated", || {
        let store = match store_ref(store) {
            Ok(store) => store,
            Err(e) => return e.into(),
        };
        let json = match required(purchases_json, "purchases_json") {
            Ok(json) => json,
            Err(e) => return e.into(),
        };
        let purchases: Vec<Purchase> = match serde_json::from_str(&json) {
            Ok(purchases) => purchases,
            Err(e) => return FfiError::InvalidJson(e.to_string()).into(),
        };
        store
            .shared
            .broadcast(|events| events.purchases_updated(purchases.clone()));
        IapStatus::Ok
    })
}
