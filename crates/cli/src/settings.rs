//! `circuit` configuration file: server settings plus the workflow
//! definition understood by `circuit_engine::WorkflowConfig`.
//!
//! ```toml
//! [server]
//! port = 8080
//! rate_limit = 120
//!
//! [actors]
//! alice = "manager"
//!
//! [[circuits]]
//! id = "contract"
//! title = "Contract approval"
//! ```

use std::path::Path;

use circuit_engine::WorkflowConfig;
use serde::{Deserialize, Serialize};

/// Default port when neither the file nor `--port` sets one.
pub(crate) const DEFAULT_PORT: u16 = 8080;

/// Default rate limit: 60 requests per minute per IP.
pub(crate) const DEFAULT_RATE_LIMIT: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Settings {
    #[serde(default)]
    pub(crate) server: ServerSettings,
    #[serde(flatten)]
    pub(crate) workflow: WorkflowConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ServerSettings {
    #[serde(default = "default_port")]
    pub(crate) port: u16,
    /// Requests per minute per client IP.
    #[serde(default = "default_rate_limit")]
    pub(crate) rate_limit: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            rate_limit: DEFAULT_RATE_LIMIT,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_rate_limit() -> u64 {
    DEFAULT_RATE_LIMIT
}

/// Read and parse a settings file from `path`.
///
/// Returns a human-readable error string on failure.
pub(crate) fn read_settings(path: &Path) -> Result<Settings, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;

    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}
