use thiserror::Error;

use crate::billing::BillingResponse;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Store rejected request ({code}): {message}")]
    Rejected {
        code: BillingResponse,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Shorthand for a platform rejection carrying a response code.
    pub fn rejected(code: BillingResponse, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Platform response code associated with this error, if any.
    pub fn response_code(&self) -> Option<BillingResponse> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            Self::NotAvailable(_) => Some(BillingResponse::ServiceUnavailable),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
