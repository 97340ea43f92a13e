//! Desktop Purchase Backend
//!
//! Provides [`LocalStoreBackend`], an in-process store implementing
//! `bridge_traits::PurchaseBackend` for desktop builds, local development and
//! tests. Catalogs can be built in code or loaded from JSON files.

pub mod catalog;
pub mod store;

pub use catalog::{Catalog, CatalogEntry};
pub use store::LocalStoreBackend;
