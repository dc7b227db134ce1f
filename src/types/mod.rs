//! Core types for toolhub.
//!
//! This module provides foundational types used throughout the system:
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for the store, market, and coordinator

mod config;
mod errors;

pub use config::{Config, CoordinatorConfig, MarketConfig, ObservabilityConfig, StoreConfig};
pub use errors::{Error, Result};
