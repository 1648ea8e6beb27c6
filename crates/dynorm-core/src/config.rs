//! Connector configuration.
//!
//! Connection settings are driven by environment variables. Region, endpoint
//! and retry count are carried for `DataStore` implementations that talk to a
//! remote store; the connector itself only uses the timeout and the
//! provisioning switch.

use std::env;
use std::time::Duration;

/// Default per-call timeout.
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Connector configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorConfig {
    /// Store region.
    pub region: String,
    /// Store endpoint override (`http://localhost:8000` for a local store).
    pub endpoint: Option<String>,
    /// Retries a network store client may attempt. The connector never retries.
    pub max_retries: u32,
    /// Upper bound for a single remote call.
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    /// Create missing tables in the background when a model is defined.
    pub auto_provision: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            region: "ap-southeast-1".to_owned(),
            endpoint: None,
            max_retries: 0,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            auto_provision: true,
        }
    }
}

impl ConnectorConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            region: env::var("DYNAMODB_REGION").unwrap_or(defaults.region),
            endpoint: env::var("DYNAMODB_ENDPOINT").ok().filter(|v| !v.is_empty()),
            max_retries: env_parse("DYNAMODB_MAX_RETRIES", defaults.max_retries),
            request_timeout: Duration::from_millis(env_parse(
                "DYNORM_REQUEST_TIMEOUT_MS",
                DEFAULT_REQUEST_TIMEOUT_MS,
            )),
            auto_provision: env_bool("DYNORM_AUTO_PROVISION", defaults.auto_provision),
        }
    }

    /// Same configuration with a different call timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Same configuration with background provisioning switched on or off.
    #[must_use]
    pub fn with_auto_provision(mut self, enabled: bool) -> Self {
        self.auto_provision = enabled;
        self
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key).map_or(default, |v| {
        matches!(v.as_str(), "1" | "true" | "yes" | "TRUE" | "YES")
    })
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
