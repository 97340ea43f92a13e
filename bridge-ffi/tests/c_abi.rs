//! Drives the C ABI end to end with `extern "C"` fakes standing in for the
//! native store glue and the application.

use bridge_ffi::*;
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

unsafe fn text(ptr: *const c_char) -> Option<String> {
    (!ptr.is_null()).then(|| CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

// ---------------------------------------------------------------------------
// Native store fake
// ---------------------------------------------------------------------------

struct FakeStore {
    handle: AtomicPtr<IapStore>,
    calls: Mutex<Vec<String>>,
    can_purchase: AtomicBool,
    /// Leave purchases open for the test to complete
    hold_purchases: AtomicBool,
    held: Mutex<Vec<u64>>,
}

impl FakeStore {
    fn new() -> Box<Self> {
        Box::new(Self {
            handle: AtomicPtr::new(std::ptr::null_mut()),
            calls: Mutex::new(Vec::new()),
            can_purchase: AtomicBool::new(true),
            hold_purchases: AtomicBool::new(false),
            held: Mutex::new(Vec::new()),
        })
    }

    fn handle(&self) -> *const IapStore {
        self.handle.load(Ordering::SeqCst)
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Waits for the next purchase request left open.
    fn next_held(&self) -> u64 {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(request_id) = self.held.lock().unwrap().pop() {
                return request_id;
            }
            assert!(Instant::now() < deadline, "no purchase reached the store");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

unsafe fn fake<'a>(context: *mut c_void) -> &'a FakeStore {
    &*(context as *const FakeStore)
}

fn purchase_json(product_id: &str, token: &str) -> CString {
    CString::new(format!(
        r#"{{"product_ids":["{}"],"purchase_token":"{}","purchase_time":"2024-01-01T00:00:00Z","state":"Purchased"}}"#,
        product_id, token
    ))
    .unwrap()
}

unsafe extern "C" fn start_connection(context: *mut c_void, request_id: u64) {
    let store = fake(context);
    store.record("connect");
    iap_store_complete_connection(store.handle(), request_id, 0, std::ptr::null());
}

unsafe extern "C" fn query_products(
    context: *mut c_void,
    request_id: u64,
    product_ids: *const *const c_char,
    count: usize,
) {
    let store = fake(context);
    let ids: Vec<String> = std::slice::from_raw_parts(product_ids, count)
        .iter()
        .filter_map(|id| text(*id))
        .collect();
    store.record(format!("query {}", ids.join(",")));

    // The catalog knows sku.a and sku.b, in reverse order
    let products: Vec<String> = ["sku.b", "sku.a"]
        .iter()
        .filter(|known| ids.iter().any(|id| id == *known))
        .map(|id| format!(r#"{{"productId":"{}","type":"inapp","title":"{}"}}"#, id, id))
        .collect();
    let json = CString::new(format!("[{}]", products.join(","))).unwrap();
    iap_store_complete_query(store.handle(), request_id, 0, json.as_ptr(), std::ptr::null());
}

unsafe extern "C" fn launch_purchase(context: *mut c_void, request_id: u64, product_id: *const c_char) {
    let store = fake(context);
    let product_id = text(product_id).unwrap();
    store.record(format!("purchase {}", product_id));

    if store.hold_purchases.load(Ordering::SeqCst) {
        store.held.lock().unwrap().push(request_id);
    } else if product_id == "sku.cancel" {
        let message = CString::new("Sheet dismissed").unwrap();
        iap_store_complete_purchase(store.handle(), request_id, 1, std::ptr::null(), message.as_ptr());
    } else {
        let json = purchase_json(&product_id, &format!("token-{}", request_id));
        iap_store_complete_purchase(store.handle(), request_id, 0, json.as_ptr(), std::ptr::null());
    }
}

unsafe extern "C" fn restore_purchases(context: *mut c_void, request_id: u64) {
    let store = fake(context);
    store.record("restore");
    let json = CString::new("[]").unwrap();
    iap_store_complete_restore(store.handle(), request_id, 0, json.as_ptr(), std::ptr::null());
}

unsafe extern "C" fn consume(context: *mut c_void, request_id: u64, token: *const c_char) {
    let store = fake(context);
    store.record(format!("consume {}", text(token).unwrap()));
    iap_store_complete_simple(store.handle(), request_id, 0, std::ptr::null());
}

unsafe extern "C" fn acknowledge(context: *mut c_void, request_id: u64, token: *const c_char) {
    let store = fake(context);
    store.record(format!("acknowledge {}", text(token).unwrap()));
    iap_store_complete_simple(store.handle(), request_id, 0, std::ptr::null());
}

unsafe extern "C" fn can_make_purchases(context: *mut c_void) -> bool {
    fake(context).can_purchase.load(Ordering::SeqCst)
}

unsafe extern "C" fn end_connection(context: *mut c_void) {
    fake(context).record("end");
}

fn vtable(store: &FakeStore) -> IapStoreVTable {
    IapStoreVTable {
        context: store as *const FakeStore as *mut c_void,
        platform: IapStorePlatform::AppStore,
        start_connection: Some(start_connection),
        query_products: Some(query_products),
        launch_purchase: Some(launch_purchase),
        restore_purchases: Some(restore_purchases),
        consume: Some(consume),
        acknowledge: Some(acknowledge),
        can_make_purchases: Some(can_make_purchases),
        end_connection: Some(end_connection),
    }
}

// ---------------------------------------------------------------------------
// Application fake
// ---------------------------------------------------------------------------

#[derive(Default)]
struct App {
    events: Mutex<Vec<String>>,
}

impl App {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Waits for an event with the given prefix and returns it.
    fn wait_for(&self, prefix: &str) -> String {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(event) = self.events().into_iter().find(|e| e.starts_with(prefix)) {
                return event;
            }
            assert!(Instant::now() < deadline, "no '{}' event in {:?}", prefix, self.events());
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

unsafe fn app<'a>(user_data: *mut c_void) -> &'a App {
    &*(user_data as *const App)
}

unsafe extern "C" fn on_billing_setup(user_data: *mut c_void, success: bool) {
    app(user_data).push(format!("setup {}", success));
}

unsafe extern "C" fn on_debug_log(user_data: *mut c_void, message: *const c_char) {
    app(user_data).push(format!("log {}", text(message).unwrap()));
}

unsafe extern "C" fn on_products_queried(user_data: *mut c_void, json: *const c_char, error: *const c_char) {
    let event = match (text(json), text(error)) {
        (Some(json), None) => format!("products {}", json),
        (None, Some(error)) => format!("products-error {}", error),
        other => format!("products-invalid {:?}", other),
    };
    app(user_data).push(event);
}

unsafe extern "C" fn on_purchase_result(
    user_data: *mut c_void,
    product_id: *const c_char,
    purchase_json: *const c_char,
    error: *const c_char,
) {
    let product_id = text(product_id).unwrap();
    let event = match (text(purchase_json), text(error)) {
        (Some(json), None) => format!("purchased {} {}", product_id, json),
        (None, Some(error)) => format!("purchase-error {} {}", product_id, error),
        other => format!("purchase-invalid {:?}", other),
    };
    app(user_data).push(event);
}

unsafe extern "C" fn on_restore_result(user_data: *mut c_void, json: *const c_char, error: *const c_char) {
    let event = match (text(json), text(error)) {
        (Some(json), None) => format!("restored {}", json),
        (None, Some(error)) => format!("restore-error {}", error),
        other => format!("restore-invalid {:?}", other),
    };
    app(user_data).push(event);
}

unsafe extern "C" fn on_finalize_result(
    user_data: *mut c_void,
    kind: IapFinalizeKind,
    purchase_token: *const c_char,
    error: *const c_char,
) {
    let kind = match kind {
        IapFinalizeKind::Consume => "consume",
        IapFinalizeKind::Acknowledge => "acknowledge",
    };
    let token = text(purchase_token).unwrap();
    let event = match text(error) {
        None => format!("finalized {} {}", kind, token),
        Some(error) => format!("finalize-error {} {} {}", kind, token, error),
    };
    app(user_data).push(event);
}

fn callbacks(app: &App) -> IapCallbacks {
    IapCallbacks {
        user_data: app as *const App as *mut c_void,
        on_billing_setup: Some(on_billing_setup),
        on_debug_log: Some(on_debug_log),
        on_products_queried: Some(on_products_queried),
        on_purchase_result: Some(on_purchase_result),
        on_restore_result: Some(on_restore_result),
        on_finalize_result: Some(on_finalize_result),
    }
}

fn open_store(store: &FakeStore) -> *mut IapStore {
    let table = vtable(store);
    let handle = unsafe { iap_store_new(&table) };
    assert!(!handle.is_null());
    store.handle.store(handle, Ordering::SeqCst);
    handle
}

/// Store handle plus a bridge over it.
fn setup(store: &FakeStore) -> (*mut IapStore, *mut IapBridge) {
    let handle = open_store(store);
    let bridge = unsafe { iap_bridge_new(handle) };
    assert!(!bridge.is_null());
    (handle, bridge)
}

/// Initializes `bridge` with `app` as its callback table.
fn init(bridge: *mut IapBridge, app: &App) {
    let table = callbacks(app);
    assert_eq!(unsafe { iap_init(bridge, &table) }, IapStatus::Ok);
    assert_eq!(app.wait_for("setup"), "setup true");
}

fn ready(store: &FakeStore, app: &App) -> (*mut IapStore, *mut IapBridge) {
    let (handle, bridge) = setup(store);
    init(bridge, app);
    (handle, bridge)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_query_returns_products_in_request_order() {
    let store = FakeStore::new();
    let app = App::default();
    let (handle, bridge) = ready(&store, &app);

    let a = CString::new("sku.a").unwrap();
    let b = CString::new("sku.b").unwrap();
    let ids = [a.as_ptr(), b.as_ptr()];
    assert_eq!(
        unsafe { iap_query_products(bridge, ids.as_ptr(), ids.len()) },
        IapStatus::Ok
    );

    let event = app.wait_for("products ");
    let json: serde_json::Value = serde_json::from_str(&event["products ".len()..]).unwrap();
    assert_eq!(json["schema_version"], 1);
    assert_eq!(json["products"][0]["productId"], "sku.a");
    assert_eq!(json["products"][1]["productId"], "sku.b");
    assert!(store.calls().contains(&"query sku.a,sku.b".to_string()));

    unsafe {
        iap_bridge_free(bridge);
        iap_store_free(handle);
    }
}

#[test]
fn test_purchase_and_finalize_round_trip() {
    let store = FakeStore::new();
    let app = App::default();
    let (handle, bridge) = ready(&store, &app);

    let id = CString::new("sku.a").unwrap();
    assert_eq!(unsafe { iap_purchase_product(bridge, id.as_ptr()) }, IapStatus::Ok);
    let event = app.wait_for("purchased sku.a");
    assert!(event.contains("\"purchase_token\""));

    let token = CString::new("token-2").unwrap();
    assert_eq!(unsafe { iap_acknowledge_purchase(bridge, token.as_ptr()) }, IapStatus::Ok);
    assert_eq!(app.wait_for("finalized"), "finalized acknowledge token-2");
    assert!(store.calls().contains(&"acknowledge token-2".to_string()));

    assert_eq!(unsafe { iap_consume_purchase(bridge, token.as_ptr()) }, IapStatus::Ok);
    assert_eq!(app.wait_for("finalized consume"), "finalized consume token-2");

    assert_eq!(unsafe { iap_restore_purchases(bridge) }, IapStatus::Ok);
    let event = app.wait_for("restored ");
    assert!(event.contains("\"schema_version\":1"));

    unsafe {
        iap_bridge_free(bridge);
        iap_store_free(handle);
    }
}

#[test]
fn test_user_cancel_reports_diagnostic() {
    let store = FakeStore::new();
    let app = App::default();
    let (handle, bridge) = ready(&store, &app);

    let id = CString::new("sku.cancel").unwrap();
    assert_eq!(unsafe { iap_purchase_product(bridge, id.as_ptr()) }, IapStatus::Ok);

    let event = app.wait_for("purchase-error sku.cancel");
    assert!(event.to_lowercase().contains("cancel"));

    unsafe {
        iap_bridge_free(bridge);
        iap_store_free(handle);
    }
}

#[test]
fn test_preconditions_and_arguments() {
    let store = FakeStore::new();
    let app = App::default();
    let (handle, bridge) = setup(&store);

    let id = CString::new("sku.a").unwrap();
    assert_eq!(
        unsafe { iap_purchase_product(bridge, id.as_ptr()) },
        IapStatus::NotInitialized
    );
    assert_eq!(
        unsafe { iap_purchase_product(bridge, std::ptr::null()) },
        IapStatus::InvalidArgument
    );
    assert_eq!(
        unsafe { iap_query_products(bridge, std::ptr::null(), 2) },
        IapStatus::InvalidArgument
    );

    let table = callbacks(&app);
    assert_eq!(unsafe { iap_init(bridge, &table) }, IapStatus::Ok);
    assert_eq!(
        unsafe { iap_init(bridge, &table) },
        IapStatus::AlreadyInitialized
    );
    app.wait_for("setup");

    assert_eq!(unsafe { iap_destroy(bridge) }, IapStatus::Ok);
    assert_eq!(unsafe { iap_restore_purchases(bridge) }, IapStatus::Destroyed);
    assert_eq!(unsafe { iap_destroy(bridge) }, IapStatus::Destroyed);
    assert!(!unsafe { iap_can_make_purchases(bridge) });

    unsafe {
        iap_bridge_free(bridge);
        iap_store_free(handle);
    }
    assert!(store.calls().contains(&"end".to_string()));
}

#[test]
fn test_can_make_purchases_reads_store_flag() {
    let store = FakeStore::new();
    let app = App::default();
    let (handle, bridge) = ready(&store, &app);

    assert!(unsafe { iap_can_make_purchases(bridge) });
    store.can_purchase.store(false, Ordering::SeqCst);
    assert!(!unsafe { iap_can_make_purchases(bridge) });

    unsafe {
        iap_bridge_free(bridge);
        iap_store_free(handle);
    }
}

#[test]
fn test_store_notifications_reach_application() {
    let store = FakeStore::new();
    let app = App::default();
    let (handle, bridge) = ready(&store, &app);

    let message = CString::new("StoreKit observer attached").unwrap();
    assert_eq!(unsafe { iap_store_debug_log(handle, message.as_ptr()) }, IapStatus::Ok);
    app.wait_for("log StoreKit observer attached");

    let json = CString::new(format!(
        "[{}]",
        purchase_json("sku.b", "deferred-1").to_str().unwrap()
    ))
    .unwrap();
    assert_eq!(
        unsafe { iap_store_purchases_updated(handle, json.as_ptr()) },
        IapStatus::Ok
    );
    app.wait_for("purchased sku.b");

    let garbage = CString::new("not json").unwrap();
    assert_eq!(
        unsafe { iap_store_purchases_updated(handle, garbage.as_ptr()) },
        IapStatus::InvalidArgument
    );

    unsafe {
        iap_bridge_free(bridge);
        iap_store_free(handle);
    }
}

#[test]
fn test_completion_for_unknown_request() {
    let store = FakeStore::new();
    let (handle, bridge) = setup(&store);

    assert_eq!(
        unsafe { iap_store_complete_simple(handle, 999, 0, std::ptr::null()) },
        IapStatus::InvalidArgument
    );
    assert_eq!(
        unsafe { iap_store_complete_simple(std::ptr::null(), 1, 0, std::ptr::null()) },
        IapStatus::InvalidArgument
    );

    unsafe {
        iap_bridge_free(bridge);
        iap_store_free(handle);
    }
}

#[test]
fn test_bridges_sharing_a_store_stay_independent() {
    let store = FakeStore::new();
    let first_app = App::default();
    let second_app = App::default();
    let handle = open_store(&store);
    let first = unsafe { iap_bridge_new(handle) };
    let second = unsafe { iap_bridge_new(handle) };
    init(first, &first_app);
    init(second, &second_app);

    let message = CString::new("observer attached").unwrap();
    assert_eq!(unsafe { iap_store_debug_log(handle, message.as_ptr()) }, IapStatus::Ok);
    first_app.wait_for("log observer attached");
    second_app.wait_for("log observer attached");

    store.hold_purchases.store(true, Ordering::SeqCst);
    let id = CString::new("sku.a").unwrap();
    assert_eq!(unsafe { iap_purchase_product(second, id.as_ptr()) }, IapStatus::Ok);
    let request_id = store.next_held();

    unsafe { iap_bridge_free(first) };
    assert!(!store.calls().contains(&"end".to_string()));

    let json = purchase_json("sku.a", "token-late");
    assert_eq!(
        unsafe { iap_store_complete_purchase(handle, request_id, 0, json.as_ptr(), std::ptr::null()) },
        IapStatus::Ok
    );
    let event = second_app.wait_for("purchase");
    assert!(event.starts_with("purchased sku.a"), "{}", event);

    unsafe {
        iap_bridge_free(second);
        iap_store_free(handle);
    }
    assert!(store.calls().contains(&"end".to_string()));
}

#[test]
fn test_malformed_completion_still_resolves_request() {
    let store = FakeStore::new();
    let app = App::default();
    let (handle, bridge) = ready(&store, &app);
    store.hold_purchases.store(true, Ordering::SeqCst);

    let id = CString::new("sku.a").unwrap();
    assert_eq!(unsafe { iap_purchase_product(bridge, id.as_ptr()) }, IapStatus::Ok);
    let request_id = store.next_held();
    assert_eq!(
        unsafe { iap_store_complete_purchase(handle, request_id, 0, std::ptr::null(), std::ptr::null()) },
        IapStatus::InvalidArgument
    );
    app.wait_for("purchase-error sku.a");

    // Answering again finds nothing left to complete
    assert_eq!(
        unsafe { iap_store_complete_purchase(handle, request_id, 6, std::ptr::null(), std::ptr::null()) },
        IapStatus::InvalidArgument
    );

    let id = CString::new("sku.b").unwrap();
    assert_eq!(unsafe { iap_purchase_product(bridge, id.as_ptr()) }, IapStatus::Ok);
    let request_id = store.next_held();
    let bad_message = [0xffu8, 0xfe, 0x00];
    assert_eq!(
        unsafe {
            iap_store_complete_purchase(
                handle,
                request_id,
                6,
                std::ptr::null(),
                bad_message.as_ptr() as *const c_char,
            )
        },
        IapStatus::InvalidArgument
    );
    let event = app.wait_for("purchase-error sku.b");
    assert!(event.contains("ERROR"), "{}", event);

    unsafe {
        iap_bridge_free(bridge);
        iap_store_free(handle);
    }
}
