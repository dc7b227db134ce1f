//! Observability utilities.
//!
//! Tracing is initialized once per process from [`ObservabilityConfig`];
//! environment variables override the configured defaults so deployments can
//! retune logging without touching configuration files.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::types::ObservabilityConfig;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise from
/// `config.log_level`. Output is compact text unless JSON is requested,
/// either via `config.json_logs` or `TOOLHUB_LOG_FORMAT=json`. Later calls
/// are ignored, so embedding crates may call this unconditionally.
pub fn init_tracing(config: &ObservabilityConfig) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

        let json = match std::env::var("TOOLHUB_LOG_FORMAT") {
            Ok(value) => value.eq_ignore_ascii_case("json"),
            Err(_) => config.json_logs,
        };

        let registry = tracing_subscriber::registry().with(filter);
        let result = if json {
            registry.with(fmt::layer().json()).try_init()
        } else {
            registry.with(fmt::layer().compact()).try_init()
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_accepts_repeated_calls() {
        let config = ObservabilityConfig::default();
        init_tracing(&config);

        // A second call with different settings is a no-op, not a panic.
        let noisy = ObservabilityConfig {
            log_level: "debug".to_string(),
            json_logs: true,
        };
        init_tracing(&noisy);
    }
}
