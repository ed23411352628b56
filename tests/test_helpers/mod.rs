use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Environment for tests against a real cluster.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub bootstrap_brokers: Vec<String>,
}

impl TestConfig {
    /// Reads `KAFKA_CONNECT`, a comma-separated list of brokers.
    pub fn from_env() -> Option<Self> {
        let connect = std::env::var("KAFKA_CONNECT").ok()?;
        let bootstrap_brokers = connect
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        (!bootstrap_brokers.is_empty()).then_some(Self { bootstrap_brokers })
    }
}

/// Returns the [`TestConfig`] or skips the calling test if no cluster is configured.
#[macro_export]
macro_rules! maybe_skip_kafka_integration {
    () => {
        match $crate::test_helpers::TestConfig::from_env() {
            Some(cfg) => cfg,
            None => {
                eprintln!("skipping Kafka integration test, set KAFKA_CONNECT to run it");
                return;
            }
        }
    };
}

static LOG_SETUP: Once = Once::new();

/// Logs to stderr if `RUST_LOG` is set.
pub fn maybe_start_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        LOG_SETUP.call_once(|| {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_test_writer()
                .init();
        });
    }
}
