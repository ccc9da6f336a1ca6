//! Integration tests for logging initialisation.
//!
//! A global subscriber can only be installed once per process, so the whole
//! lifecycle is exercised in a single test.

use bridge_traits::time::LogLevel;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};

#[test]
fn test_logging_initializes_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_env_filter(false);

    init_logging(config.clone()).expect("first initialisation succeeds");
    tracing::info!(sheet = "Depot List", "logging initialised");

    let second = init_logging(config);
    assert!(second.is_err(), "a second global subscriber must be rejected");
}
