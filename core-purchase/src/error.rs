use bridge_traits::{error::BridgeError, BillingResponse};
use std::time::Duration;
use thiserror::Error;

use crate::state::BridgeState;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PurchaseError {
    #[error("Cannot {operation} while the bridge is {state}")]
    PreconditionViolation {
        operation: &'static str,
        state: BridgeState,
    },

    #[error("Bridge is already initialized")]
    AlreadyInitialized,

    #[error("Store unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid product identifier {id:?}: {reason}")]
    InvalidIdentifier { id: String, reason: String },

    #[error("Operation already in progress: {0}")]
    OperationInProgress(String),

    #[error("Purchase cancelled by the user")]
    UserCancelled,

    #[error("Store rejected the request with {code}: {message}")]
    Rejected {
        code: BillingResponse,
        message: String,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Request cancelled: bridge destroyed")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PurchaseError {
    pub(crate) fn precondition(operation: &'static str, state: BridgeState) -> Self {
        PurchaseError::PreconditionViolation { operation, state }
    }

    /// Platform response code behind this error, when there is one.
    pub fn response_code(&self) -> Option<BillingResponse> {
        match self {
            PurchaseError::UserCancelled => Some(BillingResponse::UserCanceled),
            PurchaseError::Rejected { code, .. } => Some(*code),
            PurchaseError::BackendUnavailable(_) => Some(BillingResponse::ServiceUnavailable),
            _ => None,
        }
    }

    /// Errors returned synchronously instead of through a callback.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            PurchaseError::PreconditionViolation { .. } | PurchaseError::AlreadyInitialized
        )
    }
}

impl From<BridgeError> for PurchaseError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::NotAvailable(message) => PurchaseError::BackendUnavailable(message),
            BridgeError::Rejected {
                code: BillingResponse::UserCanceled,
                ..
            } => PurchaseError::UserCancelled,
            BridgeError::Rejected { code, message } if code.is_connectivity_failure() => {
                PurchaseError::BackendUnavailable(format!("{} ({})", message, code))
            }
            BridgeError::Rejected { code, message } => PurchaseError::Rejected { code, message },
            other => PurchaseError::Rejected {
                code: BillingResponse::Error,
                message: other.to_string(),
            },
        }
    }
}

impl From<core_runtime::Error> for PurchaseError {
    fn from(error: core_runtime::Error) -> Self {
        PurchaseError::Config(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PurchaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_cancel_is_distinguished() {
        let error: PurchaseError =
            BridgeError::rejected(BillingResponse::UserCanceled, "sheet dismissed").into();
        assert_eq!(error, PurchaseError::UserCancelled);
        assert_eq!(error.response_code(), Some(BillingResponse::UserCanceled));
    }

    #[test]
    fn test_connectivity_codes_map_to_unavailable() {
        let error: PurchaseError =
            BridgeError::rejected(BillingResponse::ServiceDisconnected, "gone").into();
        assert!(matches!(error, PurchaseError::BackendUnavailable(_)));
    }

    #[test]
    fn test_other_codes_are_rejections() {
        let error: PurchaseError =
            BridgeError::rejected(BillingResponse::ItemAlreadyOwned, "owned").into();
        assert_eq!(
            error,
            PurchaseError::Rejected {
                code: BillingResponse::ItemAlreadyOwned,
                message: "owned".to_string()
            }
        );

        let error: PurchaseError = BridgeError::OperationFailed("boom".to_string()).into();
        assert_eq!(error.response_code(), Some(BillingResponse::Error));
    }

    #[test]
    fn test_precondition_message() {
        let error = PurchaseError::precondition("purchase", BridgeState::Uninitialized);
        assert!(error.is_precondition());
        assert_eq!(
            error.to_string(),
            "Cannot purchase while the bridge is uninitialized"
        );
    }
}
