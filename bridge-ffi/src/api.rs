//! Application-facing entry points.
//!
//! Request functions return [`IapStatus::Ok`] once the request is accepted;
//! the outcome arrives later through the matching [`IapCallbacks`] slot.
//! Precondition failures are reported only through the returned status.

use bridge_traits::PurchaseBackend;
use core_purchase::{BridgeState, PurchaseBridge};
use core_runtime::config::BridgeConfig;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use std::ffi::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tracing::{info, warn};

use crate::callbacks::{ForeignCallbacks, IapCallbacks};
use crate::store::{ForeignBackend, IapStore};
use crate::strings::{array, optional, required};
use crate::{guard, IapStatus};

/// Time `iap_bridge_free` waits for queued callbacks to drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const RUNTIME_THREADS: usize = 2;

/// Opaque bridge handle owning its own runtime.
pub struct IapBridge {
    // Dropped before the runtime it spawns onto
    bridge: PurchaseBridge,
    connection: Arc<ForeignBackend>,
    runtime: Runtime,
}

impl IapBridge {
    fn new(connection: Arc<ForeignBackend>) -> Result<Self, String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(RUNTIME_THREADS)
            .thread_name("iap-bridge")
            .enable_time()
            .build()
            .map_err(|e| format!("Failed to start runtime: {}", e))?;
        let config = BridgeConfig::builder()
            .backend(connection.clone())
            .build()
            .map_err(|e| e.to_string())?;
        let bridge = PurchaseBridge::with_runtime(config, runtime.handle().clone());
        Ok(Self {
            bridge,
            connection,
            runtime,
        })
    }

    fn shutdown(self) {
        if self.bridge.state() != BridgeState::Destroyed {
            let _ = self.bridge.destroy();
        }
        if Handle::try_current().is_ok() {
            // Blocking inside another runtime would panic
            warn!("Bridge freed from an async context; skipping graceful shutdown");
            let IapBridge {
                bridge, runtime, ..
            } = self;
            drop(bridge);
            runtime.shutdown_background();
            return;
        }
        self.runtime.block_on(async {
            if tokio::time::timeout(SHUTDOWN_GRACE, self.bridge.closed())
                .await
                .is_err()
            {
                warn!("Callbacks still queued at shutdown");
            }
            self.connection.disconnect().await;
        });
        info!("Bridge released");
    }
}

fn status<T>(result: core_purchase::Result<T>) -> IapStatus {
    match result {
        Ok(_) => IapStatus::Ok,
        Err(ref e) => {
            if !e.is_precondition() {
                warn!(error = %e, "Request rejected at the C boundary");
            }
            IapStatus::from(e)
        }
    }
}

unsafe fn bridge_ref<'a>(bridge: *const IapBridge) -> Option<&'a IapBridge> {
    bridge.as_ref()
}

/// Installs the process-wide `tracing` subscriber with compact output.
///
/// `filter` is an optional `EnvFilter` directive string such as
/// `"core_purchase=debug"`. Returns `InvalidArgument` when the filter is
/// malformed or a subscriber is already installed.
///
/// # Safety
/// `filter` must be NULL or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn iap_init_logging(filter: *const c_char) -> IapStatus {
    guard("iap_init_logging", || {
        let mut config = LoggingConfig::default().with_format(LogFormat::Compact);
        match optional(filter, "filter") {
            Ok(Some(filter)) => config = config.with_filter(filter),
            Ok(None) => {}
            Err(e) => return e.into(),
        }
        match init_logging(config) {
            Ok(()) => IapStatus::Ok,
            Err(_) => IapStatus::InvalidArgument,
        }
    })
}

/// Creates a bridge over a native store.
///
/// Each bridge gets its own connection on the store, so several bridges may
/// share one handle. Returns NULL when `store` is NULL or the runtime cannot
/// start.
///
/// # Safety
/// `store` must be NULL or a live handle from
/// [`iap_store_new`](crate::iap_store_new).
#[no_mangle]
pub unsafe extern "C" fn iap_bridge_new(store: *const IapStore) -> *mut IapBridge {
    let Some(store) = store.as_ref() else {
        return std::ptr::null_mut();
    };
    match catch_unwind(AssertUnwindSafe(|| IapBridge::new(store.connection()))) {
        Ok(Ok(bridge)) => Box::into_raw(Box::new(bridge)),
        Ok(Err(message)) => {
            warn!(error = %message, "Failed to create bridge");
            std::ptr::null_mut()
        }
        Err(_) => std::ptr::null_mut(),
    }
}

/// Registers callbacks and starts connecting to the store.
///
/// `on_billing_setup` reports the connection outcome. Allowed again after a
/// failed setup; the new table replaces the previous one.
///
/// # Safety
/// `bridge` must be a live handle and `callbacks` NULL or a valid table whose
/// functions and `user_data` stay valid until the bridge is freed.
#[no_mangle]
pub unsafe extern "C" fn iap_init(
    bridge: *const IapBridge,
    callbacks: *const IapCallbacks,
) -> IapStatus {
    guard("iap_init", || {
        let Some(bridge) = bridge_ref(bridge) else {
            return IapStatus::InvalidArgument;
        };
        let Some(table) = callbacks.as_ref() else {
            return IapStatus::InvalidArgument;
        };
        let callbacks = Arc::new(ForeignCallbacks::new(*table));
        status(bridge.bridge.initialize(callbacks))
    })
}

/// Queries catalog details for `count` product identifiers.
///
/// # Safety
/// `bridge` must be a live handle and `product_ids` point to `count` C
/// strings (it may be NULL when `count` is zero).
#[no_mangle]
pub unsafe extern "C" fn iap_query_products(
    bridge: *const IapBridge,
    product_ids: *const *const c_char,
    count: usize,
) -> IapStatus {
    guard("iap_query_products", || {
        let Some(bridge) = bridge_ref(bridge) else {
            return IapStatus::InvalidArgument;
        };
        match array(product_ids, count, "product_ids") {
            Ok(ids) => status(bridge.bridge.query_products(ids)),
            Err(e) => e.into(),
        }
    })
}

/// Starts the platform purchase flow for one product.
///
/// # Safety
/// `bridge` must be a live handle and `product_id` a C string.
#[no_mangle]
pub unsafe extern "C" fn iap_purchase_product(
    bridge: *const IapBridge,
    product_id: *const c_char,
) -> IapStatus {
    guard("iap_purchase_product", || {
        let Some(bridge) = bridge_ref(bridge) else {
            return IapStatus::InvalidArgument;
        };
        match required(product_id, "product_id") {
            Ok(id) => status(bridge.bridge.purchase_product(id)),
            Err(e) => e.into(),
        }
    })
}

/// Requests the purchases the user currently owns.
///
/// # Safety
/// `bridge` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn iap_restore_purchases(bridge: *const IapBridge) -> IapStatus {
    guard("iap_restore_purchases", || match bridge_ref(bridge) {
        Some(bridge) => status(bridge.bridge.restore_purchases()),
        None => IapStatus::InvalidArgument,
    })
}

/// Consumes a purchase so the product can be bought again.
///
/// The outcome arrives through `on_finalize_result`.
///
/// # Safety
/// `bridge` must be a live handle and `purchase_token` a C string.
#[no_mangle]
pub unsafe extern "C" fn iap_consume_purchase(
    bridge: *const IapBridge,
    purchase_token: *const c_char,
) -> IapStatus {
    guard("iap_consume_purchase", || {
        let Some(bridge) = bridge_ref(bridge) else {
            return IapStatus::InvalidArgument;
        };
        match required(purchase_token, "purchase_token") {
            Ok(token) => status(bridge.bridge.consume_purchase(token)),
            Err(e) => e.into(),
        }
    })
}

/// Acknowledges a purchase. The outcome arrives through `on_finalize_result`.
///
/// # Safety
/// `bridge` must be a live handle and `purchase_token` a C string.
#[no_mangle]
pub unsafe extern "C" fn iap_acknowledge_purchase(
    bridge: *const IapBridge,
    purchase_token: *const c_char,
) -> IapStatus {
    guard("iap_acknowledge_purchase", || {
        let Some(bridge) = bridge_ref(bridge) else {
            return IapStatus::InvalidArgument;
        };
        match required(purchase_token, "purchase_token") {
            Ok(token) => status(bridge.bridge.acknowledge_purchase(token)),
            Err(e) => e.into(),
        }
    })
}

/// Whether purchases can be made right now. Never blocks.
///
/// # Safety
/// `bridge` must be NULL or a live handle.
#[no_mangle]
pub unsafe extern "C" fn iap_can_make_purchases(bridge: *const IapBridge) -> bool {
    match bridge_ref(bridge) {
        Some(bridge) => {
            catch_unwind(AssertUnwindSafe(|| bridge.bridge.can_make_purchases())).unwrap_or(false)
        }
        None => false,
    }
}

/// Tears the bridge down. Outstanding requests are reported as cancelled
/// and the callback table is released; the handle must still be freed.
///
/// # Safety
/// `bridge` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn iap_destroy(bridge: *const IapBridge) -> IapStatus {
    guard("iap_destroy", || match bridge_ref(bridge) {
        Some(bridge) => status(bridge.bridge.destroy()),
        None => IapStatus::InvalidArgument,
    })
}

/// Frees a bridge, destroying it first if needed.
///
/// Waits briefly for queued callbacks, so it must not be called from inside
/// a callback.
///
/// # Safety
/// `bridge` must be NULL or a handle from [`iap_bridge_new`] not yet freed.
#[no_mangle]
pub unsafe extern "C" fn iap_bridge_free(bridge: *mut IapBridge) {
    if bridge.is_null() {
        return;
    }
    let bridge = Box::from_raw(bridge);
    let _ = catch_unwind(AssertUnwindSafe(|| bridge.shutdown()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_purchase::PurchaseError;

    #[test]
    fn test_null_handles() {
        unsafe {
            assert!(iap_bridge_new(std::ptr::null()).is_null());
            assert_eq!(iap_restore_purchases(std::ptr::null()), IapStatus::InvalidArgument);
            assert_eq!(
                iap_init(std::ptr::null(), std::ptr::null()),
                IapStatus::InvalidArgument
            );
            assert!(!iap_can_make_purchases(std::ptr::null()));
            iap_bridge_free(std::ptr::null_mut());
        }
    }

    #[test]
    fn test_status_logs_only_unexpected_errors() {
        assert_eq!(status::<()>(Ok(())), IapStatus::Ok);
        assert_eq!(
            status::<()>(Err(PurchaseError::AlreadyInitialized)),
            IapStatus::AlreadyInitialized
        );
    }
}
