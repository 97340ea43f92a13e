//! Runtime setup errors.

use thiserror::Error;

/// Failures while assembling the bridge runtime (configuration, logging).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A setting is out of range or could not be applied
    #[error("Configuration error: {0}")]
    Config(String),

    /// No implementation was supplied for a required capability
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
