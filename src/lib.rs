//! # Toolhub - Tool Provider Registry & Marketplace Cache
//!
//! Rust implementation of the tool-provider management core providing:
//! - A persisted registry of MCP tool provider configurations
//! - A serialized lifecycle coordinator reconciling configuration with live connections
//! - A TTL-bound cache over the remote paginated marketplace listing
//!
//! ## Architecture
//!
//! Registry mutations flow through a single-consumer command queue so that two
//! conflicting lifecycle transitions for the same provider can never race:
//! ```text
//!   callers ──► ToolRegistry ──► ConfigStore (persist first)
//!                    │
//!                    └──► LifecycleCoordinator queue ──► worker ──► live connections
//!
//!   callers ──► MarketCache ──► (cold/expired) RemoteListingClient ──► full listing
//! ```
//!
//! The HTTP surface, the tool-provider wire protocol, and marketplace
//! authentication are collaborator concerns; this crate exposes domain
//! operations only.

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod coordinator;
pub mod market;
pub mod registry;
pub mod store;
pub mod types;

// Internal utilities
pub mod observability;

pub use types::{Config, Error, Result};
