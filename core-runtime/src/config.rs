//! # Bridge Configuration Module
//!
//! Provides configuration management for the purchase bridge.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `BridgeConfig` holding the purchase backend and the per-operation limits.
//! It enforces fail-fast validation so a bridge never starts without a store
//! to talk to.
//!
//! ## Required Dependencies
//!
//! - `PurchaseBackend` - the platform store wrapper
//!
//! When the `desktop-shims` feature is enabled, a `LocalStoreBackend` with an
//! empty catalog is injected if no backend is provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::BridgeConfig;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = BridgeConfig::builder()
//!     .backend(Arc::new(MyStoreKitBackend::new()))
//!     .purchase_timeout(Duration::from_secs(600))
//!     .build()
//!     .expect("Failed to build config");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{LoggerSink, PurchaseBackend};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound accepted for any per-operation timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

/// Per-operation deadlines.
///
/// A backend that never completes a request is cut off after these limits so
/// the request still produces its terminal notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Store connection during initialize/reconnect
    pub setup: Duration,
    pub query: Duration,
    /// Includes time the user spends in the payment sheet
    pub purchase: Duration,
    pub restore: Duration,
    /// Consume and acknowledge
    pub finalize: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            setup: Duration::from_secs(30),
            query: Duration::from_secs(30),
            purchase: Duration::from_secs(300),
            restore: Duration::from_secs(60),
            finalize: Duration::from_secs(30),
        }
    }
}

impl Timeouts {
    /// Same deadline for every operation. Mostly useful in tests.
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            setup: timeout,
            query: timeout,
            purchase: timeout,
            restore: timeout,
            finalize: timeout,
        }
    }

    fn validate(&self) -> Result<()> {
        let named = [
            ("setup", self.setup),
            ("query", self.query),
            ("purchase", self.purchase),
            ("restore", self.restore),
            ("finalize", self.finalize),
        ];

        for (name, value) in named {
            if value.is_zero() {
                return Err(Error::Config(format!(
                    "{} timeout must be greater than zero",
                    name
                )));
            }
            if value > MAX_TIMEOUT {
                return Err(Error::Config(format!(
                    "{} timeout exceeds maximum of {} seconds",
                    name,
                    MAX_TIMEOUT.as_secs()
                )));
            }
        }

        Ok(())
    }
}

/// Purchase bridge configuration.
///
/// Use [`BridgeConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct BridgeConfig {
    /// Platform purchase backend (required)
    pub backend: Arc<dyn PurchaseBackend>,

    pub timeouts: Timeouts,

    /// Buffer size of the purchase event bus
    pub event_buffer_size: usize,

    /// Optional host sink receiving the bridge's own diagnostics
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("backend", &self.backend.platform())
            .field("timeouts", &self.timeouts)
            .field("event_buffer_size", &self.event_buffer_size)
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .finish()
    }
}

impl BridgeConfig {
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        self.timeouts.validate()?;

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_backend() -> Result<Arc<dyn PurchaseBackend>> {
    Err(Error::CapabilityMissing {
        capability: "PurchaseBackend".to_string(),
        message: "A PurchaseBackend implementation is required. \
                 Desktop: enable the 'desktop-shims' feature to use LocalStoreBackend. \
                 iOS: inject the StoreKit glue through bridge-ffi. \
                 Android: inject the Play Billing glue through bridge-ffi."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_backend() -> Result<Arc<dyn PurchaseBackend>> {
    use bridge_desktop::LocalStoreBackend;

    let backend: Arc<dyn PurchaseBackend> = Arc::new(LocalStoreBackend::new());
    Ok(backend)
}

/// Builder for constructing [`BridgeConfig`] instances.
#[derive(Default)]
pub struct BridgeConfigBuilder {
    backend: Option<Arc<dyn PurchaseBackend>>,
    timeouts: Option<Timeouts>,
    event_buffer_size: Option<usize>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
}

impl BridgeConfigBuilder {
    /// Sets the platform purchase backend.
    pub fn backend(mut self, backend: Arc<dyn PurchaseBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Replaces all timeouts at once.
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    pub fn setup_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.get_or_insert_with(Timeouts::default).setup = timeout;
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.get_or_insert_with(Timeouts::default).query = timeout;
        self
    }

    pub fn purchase_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.get_or_insert_with(Timeouts::default).purchase = timeout;
        self
    }

    pub fn restore_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.get_or_insert_with(Timeouts::default).restore = timeout;
        self
    }

    pub fn finalize_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.get_or_insert_with(Timeouts::default).finalize = timeout;
        self
    }

    /// Default: [`DEFAULT_EVENT_BUFFER_SIZE`](crate::events::DEFAULT_EVENT_BUFFER_SIZE)
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - `Error::CapabilityMissing` when no backend is available
    /// - `Error::Config` when a limit is out of range
    pub fn build(self) -> Result<BridgeConfig> {
        let backend = match self.backend {
            Some(backend) => backend,
            None => provide_default_backend()?,
        };

        let config = BridgeConfig {
            backend,
            timeouts: self.timeouts.unwrap_or_default(),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
            logger_sink: self.logger_sink,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{
        error::Result as BridgeResult, BackendEvents, ProductDetails, ProductId, Purchase,
        StorePlatform,
    };
    use mockall::mock;

    mock! {
        Backend {}

        #[async_trait]
        impl PurchaseBackend for Backend {
            fn platform(&self) -> StorePlatform;
            async fn connect(&self, events: BackendEvents) -> BridgeResult<()>;
            async fn query_products(&self, product_ids: &[ProductId]) -> BridgeResult<Vec<ProductDetails>>;
            async fn purchase(&self, product_id: &ProductId) -> BridgeResult<Purchase>;
            async fn restore_purchases(&self) -> BridgeResult<Vec<Purchase>>;
            async fn consume(&self, purchase_token: &str) -> BridgeResult<()>;
            async fn acknowledge(&self, purchase_token: &str) -> BridgeResult<()>;
            fn can_make_purchases(&self) -> bool;
            async fn disconnect(&self);
        }
    }

    fn mock_backend() -> Arc<dyn PurchaseBackend> {
        let mut backend = MockBackend::new();
        backend
            .expect_platform()
            .return_const(StorePlatform::GooglePlay);
        Arc::new(backend)
    }

    #[test]
    fn test_build_with_backend_uses_defaults() {
        let config = BridgeConfig::builder()
            .backend(mock_backend())
            .build()
            .unwrap();

        assert_eq!(config.timeouts, Timeouts::default());
        assert_eq!(
            config.event_buffer_size,
            crate::events::DEFAULT_EVENT_BUFFER_SIZE
        );
        assert!(config.logger_sink.is_none());
    }

    #[test]
    fn test_individual_timeout_overrides() {
        let config = BridgeConfig::builder()
            .backend(mock_backend())
            .purchase_timeout(Duration::from_secs(600))
            .query_timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        assert_eq!(config.timeouts.purchase, Duration::from_secs(600));
        assert_eq!(config.timeouts.query, Duration::from_secs(5));
        assert_eq!(config.timeouts.restore, Timeouts::default().restore);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = BridgeConfig::builder()
            .backend(mock_backend())
            .restore_timeout(Duration::ZERO)
            .build();

        match result {
            Err(Error::Config(message)) => assert!(message.contains("restore")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_excessive_timeout_rejected() {
        let result = BridgeConfig::builder()
            .backend(mock_backend())
            .timeouts(Timeouts::uniform(MAX_TIMEOUT + Duration::from_secs(1)))
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_event_buffer_rejected() {
        let result = BridgeConfig::builder()
            .backend(mock_backend())
            .event_buffer_size(0)
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_backend() {
        let result = BridgeConfig::builder().build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "PurchaseBackend")
            }
            other => panic!("expected missing capability, got {:?}", other),
        }
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_desktop_default_backend() {
        let config = BridgeConfig::builder().build().unwrap();
        assert_eq!(config.backend.platform(), StorePlatform::Local);
    }

    #[test]
    fn test_debug_does_not_require_backend_debug() {
        let config = BridgeConfig::builder()
            .backend(mock_backend())
            .build()
            .unwrap();

        let rendered = format!("{:?}", config);
        assert!(rendered.contains("GooglePlay"));
    }
}
