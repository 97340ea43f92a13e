//! Workspace facade crate.
//!
//! Exposes feature flags that map to the individual workspace crates so host
//! applications can depend on `iap-workspace` alone:
//!
//! - `desktop-shims` (default): the purchase bridge with the local store
//!   backend injected when no backend is configured
//! - `ffi`: the C ABI for native StoreKit / Play Billing glue

#[cfg(feature = "desktop-shims")]
pub use core_purchase as purchase;

#[cfg(feature = "ffi")]
pub use bridge_ffi as ffi;
