//! Logging setup
//!
//! Installs a `tracing_subscriber` formatter. `RUST_LOG` wins when set;
//! otherwise the configured filter applies.

use tracing_subscriber::EnvFilter;

use crate::config::RuntimeConfig;

/// Install the global subscriber. Returns false if one was already set.
pub fn init(filter: &str) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

/// Install the global subscriber using the config's filter.
pub fn init_from_config(config: &RuntimeConfig) -> bool {
    init(&config.log_filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_from_config(&RuntimeConfig::testing());
        assert!(!init("debug"));
    }
}
