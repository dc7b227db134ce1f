//! Configuration structures.
//!
//! Configuration is loaded from environment variables and config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Global toolhub configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// On-disk provider document configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Marketplace listing configuration.
    #[serde(default)]
    pub market: MarketConfig,

    /// Lifecycle coordinator configuration.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Logging configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// On-disk provider document configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the provider configuration document.
    pub document_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            document_path: PathBuf::from("data/mcp_server.json"),
        }
    }
}

/// Marketplace listing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Base URL of the paginated listing API.
    pub endpoint: String,

    /// How long a full listing stays servable from cache.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Page size used when materializing the full listing.
    pub fetch_page_size: u32,

    /// Safety cap on the number of pages fetched in one materialization.
    pub max_pages: u32,

    /// Per-request timeout for remote listing calls.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.soulter.top/astrbot/mcpservers".to_string(),
            cache_ttl: Duration::from_secs(300),
            fetch_page_size: 2000,
            max_pages: 1000,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Lifecycle coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Upper bound on a single connection establishment. A stuck init must
    /// not stall the worker past this window.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default filter directive applied when `RUST_LOG` is unset.
    pub log_level: String,

    /// Emit JSON log lines instead of compact text.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
