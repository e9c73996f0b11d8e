//! Provider registry and per-provider runtime configuration.
//!
//! The set of adapters to activate is config-driven: the backends file maps
//! provider names to retry/backoff/concurrency settings, and the registry
//! maps those names to adapter factories. Registration happens explicitly
//! from the composition root; the registry is frozen before the first query.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use offergate_cache::{Cache, CacheBackend};
use offergate_core::{BackendConfig, BackendsFile};

use crate::adapter::ProviderAdapter;
use crate::adapters;
use crate::error::ProviderError;

/// Everything an adapter factory may draw on.
pub struct FactoryContext<'a> {
    /// The backend's free-form `options` object from the config file.
    pub options: &'a serde_json::Value,
    /// A cache handle namespaced to this provider.
    pub cache: Arc<dyn Cache>,
}

pub type AdapterFactory =
    fn(&FactoryContext<'_>) -> Result<Arc<dyn ProviderAdapter>, ProviderError>;

/// Maps provider names to adapter factories.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, AdapterFactory>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Registry::default()
    }

    /// Registry with every shipped adapter registered.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Registry::new();
        registry.register(adapters::byteblitz::PROVIDER_NAME, adapters::byteblitz::factory);
        registry.register(adapters::netzpuls::PROVIDER_NAME, adapters::netzpuls::factory);
        registry.register(adapters::alpennet::PROVIDER_NAME, adapters::alpennet::factory);
        registry.register(adapters::wortweit::PROVIDER_NAME, adapters::wortweit::factory);
        registry.register(adapters::kabelwerk::PROVIDER_NAME, adapters::kabelwerk::factory);
        registry.register(adapters::stub::PROVIDER_NAME, adapters::stub::factory);
        registry
    }

    pub fn register(&mut self, name: &str, factory: AdapterFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    /// Instantiates the adapter registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnknownProvider`] for unregistered names, or
    /// whatever the factory reports (missing env vars, bad options).
    pub fn create(
        &self,
        name: &str,
        ctx: &FactoryContext<'_>,
    ) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))?;
        let adapter = factory(ctx)?;
        tracing::info!(provider = name, "created provider adapter");
        Ok(adapter)
    }
}

/// Runtime settings and HTTP client for one provider.
pub struct ProviderConfig {
    pub adapter: Arc<dyn ProviderAdapter>,
    pub client: reqwest::Client,
    /// Additional attempts after the first failure.
    pub retry_count: u32,
    /// Base wait between retries and after a 429.
    pub backoff: Duration,
    /// Bounds simultaneous outbound requests for this provider.
    pub semaphore: Semaphore,
}

impl ProviderConfig {
    /// Builds the provider's HTTP client with the configured timeout and a
    /// bounded redirect chain.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the client cannot be constructed.
    pub fn new(
        adapter: Arc<dyn ProviderAdapter>,
        retries: u32,
        timeout: Duration,
        max_concurrent: usize,
        backoff: Duration,
    ) -> Result<Self, ProviderError> {
        let provider = adapter.name();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(32))
            .user_agent(concat!("offergate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Http { provider, source: e })?;

        Ok(ProviderConfig {
            adapter,
            client,
            retry_count: retries,
            backoff,
            semaphore: Semaphore::new(max_concurrent.max(1)),
        })
    }

    /// Convenience constructor applying a [`BackendConfig`].
    ///
    /// # Errors
    ///
    /// See [`ProviderConfig::new`].
    pub fn from_backend(
        adapter: Arc<dyn ProviderAdapter>,
        cfg: &BackendConfig,
    ) -> Result<Self, ProviderError> {
        ProviderConfig::new(
            adapter,
            cfg.retries,
            cfg.timeout(),
            cfg.max_concurrent,
            cfg.backoff(),
        )
    }
}

/// Instantiates every enabled backend from the config file.
///
/// # Errors
///
/// Fails on unknown provider names, factory errors (missing env vars, bad
/// options) and HTTP client construction failures. Startup treats any of
/// these as fatal.
pub fn build_providers(
    registry: &Registry,
    backends: &BackendsFile,
    cache_backend: &CacheBackend,
) -> Result<Vec<Arc<ProviderConfig>>, ProviderError> {
    let mut providers = Vec::new();

    for (name, backend_cfg) in backends {
        if !backend_cfg.enabled {
            tracing::debug!(provider = %name, "provider disabled, skipping");
            continue;
        }

        let ctx = FactoryContext {
            options: &backend_cfg.options,
            cache: cache_backend.open(name),
        };
        let adapter = registry.create(name, &ctx)?;
        providers.push(Arc::new(ProviderConfig::from_backend(adapter, backend_cfg)?));
    }

    Ok(providers)
}

/// Reads a required environment variable.
///
/// # Errors
///
/// Returns [`ProviderError::MissingEnv`] when the variable is unset or empty.
pub(crate) fn require_env(var: &str) -> Result<String, ProviderError> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ProviderError::MissingEnv(var.to_string())),
    }
}

/// Reads a required string from a factory's options object.
pub(crate) fn option_str(
    options: &serde_json::Value,
    key: &str,
    provider: &str,
) -> Result<String, ProviderError> {
    options
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ProviderError::Options {
            provider: provider.to_string(),
            reason: format!("missing or non-string option \"{key}\""),
        })
}

/// Reads an optional unsigned integer from a factory's options object.
pub(crate) fn option_u64(
    options: &serde_json::Value,
    key: &str,
    provider: &str,
) -> Result<Option<u64>, ProviderError> {
    match options.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| ProviderError::Options {
                provider: provider.to_string(),
                reason: format!("option \"{key}\" must be an unsigned integer"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_provider_is_an_error() {
        let registry = Registry::builtin();
        let ctx = FactoryContext {
            options: &serde_json::Value::Null,
            cache: CacheBackend::Memory.open("test"),
        };
        let result = registry.create("NoSuchProvider", &ctx);
        assert!(matches!(result, Err(ProviderError::UnknownProvider(_))));
    }

    #[test]
    fn builtin_registry_knows_all_shipped_adapters() {
        let registry = Registry::builtin();
        for name in [
            "ByteBlitz",
            "NetzPuls",
            "AlpenNet",
            "WortWeit",
            "KabelWerk",
            "Static",
        ] {
            assert!(
                registry.factories.contains_key(name),
                "missing factory for {name}"
            );
        }
    }

    #[test]
    fn option_str_reports_missing_keys() {
        let options = serde_json::json!({ "url": "https://example.com" });
        assert_eq!(
            option_str(&options, "url", "Test").unwrap(),
            "https://example.com"
        );
        assert!(option_str(&options, "missing", "Test").is_err());
    }

    #[test]
    fn option_u64_distinguishes_absent_from_invalid() {
        let options = serde_json::json!({ "blockSize": 10, "url": "x" });
        assert_eq!(option_u64(&options, "blockSize", "Test").unwrap(), Some(10));
        assert_eq!(option_u64(&options, "absent", "Test").unwrap(), None);
        assert!(option_u64(&options, "url", "Test").is_err());
    }

    #[tokio::test]
    async fn disabled_backends_are_skipped() {
        let mut backends = BackendsFile::new();
        backends.insert(
            "Static".to_string(),
            serde_json::from_value(serde_json::json!({
                "enabled": false,
                "timeoutMs": 1000,
                "backoffMs": 100
            }))
            .unwrap(),
        );
        let providers =
            build_providers(&Registry::builtin(), &backends, &CacheBackend::Memory).unwrap();
        assert!(providers.is_empty());
    }

    #[tokio::test]
    async fn enabled_static_backend_is_built() {
        let mut backends = BackendsFile::new();
        backends.insert(
            "Static".to_string(),
            serde_json::from_value(serde_json::json!({
                "enabled": true,
                "retries": 1,
                "timeoutMs": 1000,
                "backoffMs": 100,
                "options": { "responses": [] }
            }))
            .unwrap(),
        );
        let providers =
            build_providers(&Registry::builtin(), &backends, &CacheBackend::Memory).unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].adapter.name(), "Static");
        assert_eq!(providers[0].retry_count, 1);
    }
}
