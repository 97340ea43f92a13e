//! Platform Response Codes
//!
//! Normalized result codes reported by platform purchase backends. Integer
//! values match Google Play Billing so Android glue can pass them through
//! unchanged; StoreKit glue maps `SKError` codes onto the closest variant.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Response code returned by the platform purchase backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingResponse {
    /// Requested feature is not supported by the store on this device
    FeatureNotSupported,
    /// Connection to the store service was lost
    ServiceDisconnected,
    /// Success
    Ok,
    /// User dismissed the purchase flow
    UserCanceled,
    /// Store service is unreachable
    ServiceUnavailable,
    /// Billing API version unsupported or purchases disabled for the account
    BillingUnavailable,
    /// Requested product is not available for purchase
    ItemUnavailable,
    /// Invalid arguments were supplied to the store API
    DeveloperError,
    /// Fatal error during the store API call
    Error,
    /// Non-consumable item is already owned
    ItemAlreadyOwned,
    /// Consume/acknowledge on an item that is not owned
    ItemNotOwned,
    /// Network connection failed while talking to the store
    NetworkError,
}

impl BillingResponse {
    /// Integer code as used by Google Play Billing.
    pub fn code(self) -> i32 {
        match self {
            Self::FeatureNotSupported => -2,
            Self::ServiceDisconnected => -1,
            Self::Ok => 0,
            Self::UserCanceled => 1,
            Self::ServiceUnavailable => 2,
            Self::BillingUnavailable => 3,
            Self::ItemUnavailable => 4,
            Self::DeveloperError => 5,
            Self::Error => 6,
            Self::ItemAlreadyOwned => 7,
            Self::ItemNotOwned => 8,
            Self::NetworkError => 12,
        }
    }

    /// Maps a raw integer code back to a response.
    ///
    /// Unknown codes collapse to [`BillingResponse::Error`].
    pub fn from_code(code: i32) -> Self {
        match code {
            -2 => Self::FeatureNotSupported,
            -1 => Self::ServiceDisconnected,
            0 => Self::Ok,
            1 => Self::UserCanceled,
            2 => Self::ServiceUnavailable,
            3 => Self::BillingUnavailable,
            4 => Self::ItemUnavailable,
            5 => Self::DeveloperError,
            7 => Self::ItemAlreadyOwned,
            8 => Self::ItemNotOwned,
            12 => Self::NetworkError,
            _ => Self::Error,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Whether the code indicates the store itself could not be reached.
    pub fn is_connectivity_failure(self) -> bool {
        matches!(
            self,
            Self::ServiceDisconnected
                | Self::ServiceUnavailable
                | Self::BillingUnavailable
                | Self::NetworkError
        )
    }
}

impl fmt::Display for BillingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FeatureNotSupported => "FEATURE_NOT_SUPPORTED",
            Self::ServiceDisconnected => "SERVICE_DISCONNECTED",
            Self::Ok => "OK",
            Self::UserCanceled => "USER_CANCELED",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::BillingUnavailable => "BILLING_UNAVAILABLE",
            Self::ItemUnavailable => "ITEM_UNAVAILABLE",
            Self::DeveloperError => "DEVELOPER_ERROR",
            Self::Error => "ERROR",
            Self::ItemAlreadyOwned => "ITEM_ALREADY_OWNED",
            Self::ItemNotOwned => "ITEM_NOT_OWNED",
            Self::NetworkError => "NETWORK_ERROR",
        };
        write!(f, "{} ({})", name, self.code())
    }
}
