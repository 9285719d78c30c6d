/// Config schema types (gateway connection, cron engine).
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NaiaConfig {
    pub gateway: GatewayConfig,
    pub cron: CronConfig,
}

/// Connection to the control-plane gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// WebSocket endpoint. No url means the agent runs without a gateway.
    pub url: Option<String>,

    /// Opaque token presented when connecting.
    pub token: Option<String>,

    /// Timeout for requests that do not pick their own.
    pub request_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            request_timeout_ms: 30_000,
        }
    }
}

/// Local cron engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CronConfig {
    pub enabled: bool,

    /// Job list location. Defaults to `<data_dir>/cron/jobs.json`; a leading
    /// `~/` is expanded to the home directory.
    pub store_path: Option<PathBuf>,

    pub tick_ms: u64,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store_path: None,
            tick_ms: 1000,
        }
    }
}

impl CronConfig {
    /// The store path with defaults and `~` applied.
    pub fn resolved_store_path(&self) -> PathBuf {
        match &self.store_path {
            Some(path) => crate::loader::expand_home(path),
            None => crate::loader::data_dir().join("cron").join("jobs.json"),
        }
    }
}
