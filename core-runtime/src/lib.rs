//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the purchase bridge:
//! - Logging and tracing infrastructure
//! - Bridge configuration
//! - Purchase event bus
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the bridge crates depend on.
//! It establishes the logging conventions, the configuration builder, and the
//! event broadcasting mechanism observers use to follow purchase activity.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
