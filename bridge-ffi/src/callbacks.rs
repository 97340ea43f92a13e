//! Application callback table.

use core_purchase::{
    FinalizeAction, FinalizeResult, ProductQueryResult, PurchaseCallbacks, PurchaseResult,
    RestoreResult,
};
use std::ffi::{c_char, c_void, CString};
use std::fmt::Display;
use tracing::warn;

use crate::strings::{ptr_or_null, to_c};

/// Finalization reported through `on_finalize_result`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IapFinalizeKind {
    Consume = 0,
    Acknowledge = 1,
}

impl From<FinalizeAction> for IapFinalizeKind {
    fn from(action: FinalizeAction) -> Self {
        match action {
            FinalizeAction::Consume => IapFinalizeKind::Consume,
            FinalizeAction::Acknowledge => IapFinalizeKind::Acknowledge,
        }
    }
}

/// Native notification slots, all optional.
///
/// Result callbacks receive a JSON payload on success and an error
/// description on failure; exactly one of the two pointers is non-NULL.
/// `user_data` is passed back unchanged as the first argument.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IapCallbacks {
    pub user_data: *mut c_void,
    pub on_billing_setup: Option<unsafe extern "C" fn(user_data: *mut c_void, success: bool)>,
    pub on_debug_log: Option<unsafe extern "C" fn(user_data: *mut c_void, message: *const c_char)>,
    /// `json` follows the versioned product catalog schema
    pub on_products_queried: Option<
        unsafe extern "C" fn(user_data: *mut c_void, json: *const c_char, error: *const c_char),
    >,
    /// `product_id` is always set; it is the identifier the application
    /// requested, or the store's identifier for unsolicited purchases
    pub on_purchase_result: Option<
        unsafe extern "C" fn(
            user_data: *mut c_void,
            product_id: *const c_char,
            purchase_json: *const c_char,
            error: *const c_char,
        ),
    >,
    /// `json` follows the versioned restored purchases schema
    pub on_restore_result: Option<
        unsafe extern "C" fn(user_data: *mut c_void, json: *const c_char, error: *const c_char),
    >,
    /// `error` is NULL when the consume or acknowledge succeeded
    pub on_finalize_result: Option<
        unsafe extern "C" fn(
            user_data: *mut c_void,
            kind: IapFinalizeKind,
            purchase_token: *const c_char,
            error: *const c_char,
        ),
    >,
}

impl IapCallbacks {
    /// Table with every slot empty.
    pub fn empty() -> Self {
        Self {
            user_data: std::ptr::null_mut(),
            on_billing_setup: None,
            on_debug_log: None,
            on_products_queried: None,
            on_purchase_result: None,
            on_restore_result: None,
            on_finalize_result: None,
        }
    }
}

/// [`IapCallbacks`] behind the [`PurchaseCallbacks`] seam.
pub(crate) struct ForeignCallbacks {
    table: IapCallbacks,
}

// The caller guarantees `user_data` may be used from the bridge's threads.
unsafe impl Send for ForeignCallbacks {}
unsafe impl Sync for ForeignCallbacks {}

impl ForeignCallbacks {
    pub(crate) fn new(table: IapCallbacks) -> Self {
        Self { table }
    }
}

/// Splits an outcome into the `(json, error)` callback pair.
fn encode<T, E: Display>(
    value: Option<&T>,
    diagnostic: Option<String>,
    to_json: impl FnOnce(&T) -> Result<String, E>,
) -> (Option<CString>, Option<CString>) {
    match (value, diagnostic) {
        (Some(value), _) => match to_json(value) {
            Ok(json) => (Some(to_c(&json)), None),
            Err(e) => {
                warn!(error = %e, "Failed to encode callback payload");
                (None, Some(to_c(&format!("Failed to encode payload: {}", e))))
            }
        },
        (None, diagnostic) => (
            None,
            Some(to_c(diagnostic.as_deref().unwrap_or("Unknown error"))),
        ),
    }
}

impl PurchaseCallbacks for ForeignCallbacks {
    fn on_billing_setup(&self, success: bool) {
        if let Some(callback) = self.table.on_billing_setup {
            unsafe { callback(self.table.user_data, success) }
        }
    }

    fn on_debug_log(&self, message: &str) {
        if let Some(callback) = self.table.on_debug_log {
            let message = to_c(message);
            unsafe { callback(self.table.user_data, message.as_ptr()) }
        }
    }

    fn on_products_queried(&self, result: &ProductQueryResult) {
        if let Some(callback) = self.table.on_products_queried {
            let (json, error) = encode(result.catalog(), result.diagnostic(), |c| c.to_json());
            unsafe { callback(self.table.user_data, ptr_or_null(&json), ptr_or_null(&error)) }
        }
    }

    fn on_purchase_result(&self, result: &PurchaseResult) {
        if let Some(callback) = self.table.on_purchase_result {
            let product_id = to_c(&result.product_id);
            let (json, error) =
                encode(result.purchase(), result.diagnostic(), |p| serde_json::to_string(p));
            unsafe {
                callback(
                    self.table.user_data,
                    product_id.as_ptr(),
                    ptr_or_null(&json),
                    ptr_or_null(&error),
                )
            }
        }
    }

    fn on_restore_result(&self, result: &RestoreResult) {
        if let Some(callback) = self.table.on_restore_result {
            let (json, error) = encode(result.restored(), result.diagnostic(), |r| r.to_json());
            unsafe { callback(self.table.user_data, ptr_or_null(&json), ptr_or_null(&error)) }
        }
    }

    fn on_finalize_result(&self, result: &FinalizeResult) {
        if let Some(callback) = self.table.on_finalize_result {
            let token = to_c(&result.purchase_token);
            let error = result.diagnostic().map(|message| to_c(&message));
            unsafe {
                callback(
                    self.table.user_data,
                    result.action.into(),
                    token.as_ptr(),
                    ptr_or_null(&error),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_purchase::{ProductCatalog, PurchaseError, RequestId};
    use std::ffi::CStr;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Seen {
        queries: Mutex<Vec<(Option<String>, Option<String>)>>,
        finalizes: Mutex<Vec<(IapFinalizeKind, Option<String>, Option<String>)>>,
    }

    unsafe fn read(ptr: *const c_char) -> Option<String> {
        (!ptr.is_null()).then(|| CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }

    unsafe extern "C" fn record_query(user_data: *mut c_void, json: *const c_char, error: *const c_char) {
        let seen = &*(user_data as *const Seen);
        seen.queries.lock().unwrap().push((read(json), read(error)));
    }

    unsafe extern "C" fn record_finalize(
        user_data: *mut c_void,
        kind: IapFinalizeKind,
        token: *const c_char,
        error: *const c_char,
    ) {
        let seen = &*(user_data as *const Seen);
        seen.finalizes
            .lock()
            .unwrap()
            .push((kind, read(token), read(error)));
    }

    fn query_result(outcome: core_purchase::Result<ProductCatalog>) -> ProductQueryResult {
        ProductQueryResult {
            request_id: RequestId::from(1),
            requested: vec!["sku.a".to_string()],
            outcome,
        }
    }

    #[test]
    fn test_query_success_passes_json_only() {
        let seen = Seen::default();
        let mut table = IapCallbacks::empty();
        table.user_data = &seen as *const Seen as *mut c_void;
        table.on_products_queried = Some(record_query);
        let callbacks = ForeignCallbacks::new(table);

        callbacks.on_products_queried(&query_result(Ok(ProductCatalog::empty())));
        callbacks.on_products_queried(&query_result(Err(PurchaseError::BackendUnavailable(
            "offline".to_string(),
        ))));

        let queries = seen.queries.lock().unwrap();
        let (json, error) = &queries[0];
        let json: serde_json::Value = serde_json::from_str(json.as_deref().unwrap()).unwrap();
        assert_eq!(json["schema_version"], 1);
        assert!(error.is_none());

        let (json, error) = &queries[1];
        assert!(json.is_none());
        assert!(error.as_deref().unwrap().contains("offline"));
    }

    #[test]
    fn test_finalize_reports_kind_token_and_error() {
        let seen = Seen::default();
        let mut table = IapCallbacks::empty();
        table.user_data = &seen as *const Seen as *mut c_void;
        table.on_finalize_result = Some(record_finalize);
        let callbacks = ForeignCallbacks::new(table);

        callbacks.on_finalize_result(&FinalizeResult {
            request_id: RequestId::from(3),
            action: FinalizeAction::Acknowledge,
            purchase_token: "token-1".to_string(),
            outcome: Ok(()),
        });
        callbacks.on_finalize_result(&FinalizeResult {
            request_id: RequestId::from(4),
            action: FinalizeAction::Consume,
            purchase_token: "token-2".to_string(),
            outcome: Err(PurchaseError::Cancelled),
        });

        let finalizes = seen.finalizes.lock().unwrap();
        assert_eq!(
            finalizes[0],
            (IapFinalizeKind::Acknowledge, Some("token-1".to_string()), None)
        );
        assert_eq!(finalizes[1].0, IapFinalizeKind::Consume);
        assert_eq!(finalizes[1].1.as_deref(), Some("token-2"));
        assert!(finalizes[1].2.is_some());
    }

    #[test]
    fn test_empty_table_ignores_notifications() {
        let callbacks = ForeignCallbacks::new(IapCallbacks::empty());
        callbacks.on_billing_setup(true);
        callbacks.on_debug_log("hello");
        callbacks.on_products_queried(&query_result(Ok(ProductCatalog::empty())));
    }
}
