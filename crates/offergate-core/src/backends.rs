//! Provider backend configuration file.
//!
//! The set of active providers is config-driven: a JSON file maps provider
//! names to their retry/backoff/concurrency settings plus a free-form
//! `options` object the adapter factory interprets. Timeout and backoff
//! values in the file are integers in milliseconds.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::ConfigError;

/// Settings for one provider backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub retries: u32,
    pub timeout_ms: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    pub backoff_ms: u64,
    /// Adapter-specific options (endpoint URLs, page block sizes, …).
    #[serde(default)]
    pub options: serde_json::Value,
}

fn default_max_concurrent() -> usize {
    1
}

impl BackendConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// The full backends file, keyed by provider name. A `BTreeMap` keeps
/// startup registration order deterministic.
pub type BackendsFile = BTreeMap<String, BackendConfig>;

/// Load the backends configuration from a JSON file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed.
pub fn load_backends(path: &Path) -> Result<BackendsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::BackendsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let backends: BackendsFile =
        serde_json::from_str(&content).map_err(ConfigError::BackendsFileParse)?;

    Ok(backends)
}
