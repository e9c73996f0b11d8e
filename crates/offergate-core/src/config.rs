use crate::app_config::{AppConfig, CacheBackendKind};
use crate::ConfigError;

/// Load application configuration from environment variables already in the
/// process. Does NOT load `.env` files — the server binary loads its
/// environment file first, and tests manage the environment themselves.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup — no `set_var`/`remove_var` needed.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let bind_addr = parse_addr("OFFERGATE_BIND_ADDR", "0.0.0.0:8080")?;
    let log_level = or_default("OFFERGATE_LOG_LEVEL", "info");
    let backends_path = PathBuf::from(or_default(
        "OFFERGATE_BACKENDS_PATH",
        "./config/backends.json",
    ));

    let cache_backend = match or_default("OFFERGATE_CACHE_BACKEND", "memory").as_str() {
        "memory" => CacheBackendKind::Memory,
        "redis" => CacheBackendKind::Redis,
        other => {
            return Err(ConfigError::InvalidEnvVar {
                var: "OFFERGATE_CACHE_BACKEND".to_string(),
                reason: format!("expected \"memory\" or \"redis\", got \"{other}\""),
            })
        }
    };

    let redis_url = lookup("OFFERGATE_REDIS_URL").ok();
    if cache_backend == CacheBackendKind::Redis && redis_url.is_none() {
        return Err(ConfigError::MissingEnvVar("OFFERGATE_REDIS_URL".to_string()));
    }

    let response_buffer = parse_usize("OFFERGATE_RESPONSE_BUFFER", "10")?;
    let error_buffer = parse_usize("OFFERGATE_ERROR_BUFFER", "10")?;
    let query_deadline_secs = parse_u64("OFFERGATE_QUERY_DEADLINE_SECS", "60")?;

    if response_buffer == 0 || error_buffer == 0 {
        return Err(ConfigError::Validation(
            "channel buffers must be at least 1".to_string(),
        ));
    }

    Ok(AppConfig {
        bind_addr,
        log_level,
        backends_path,
        cache_backend,
        redis_url,
        response_buffer,
        error_buffer,
        query_deadline_secs,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::env::VarError;

    use super::*;

    fn lookup_from_map<'a>(
        map: &'a HashMap<&'a str, &'a str>,
    ) -> impl Fn(&str) -> Result<String, VarError> + 'a {
        move |key| {
            map.get(key)
                .map(|v| (*v).to_string())
                .ok_or(VarError::NotPresent)
        }
    }

    #[test]
    fn defaults_apply_with_empty_environment() {
        let map: HashMap<&str, &str> = HashMap::new();
        let cfg = build_app_config(lookup_from_map(&map)).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.cache_backend, CacheBackendKind::Memory);
        assert!(cfg.redis_url.is_none());
        assert_eq!(cfg.response_buffer, 10);
        assert_eq!(cfg.error_buffer, 10);
        assert_eq!(cfg.query_deadline_secs, 60);
    }

    #[test]
    fn invalid_bind_addr_is_rejected() {
        let mut map = HashMap::new();
        map.insert("OFFERGATE_BIND_ADDR", "not-a-socket-addr");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "OFFERGATE_BIND_ADDR"),
            "expected InvalidEnvVar(OFFERGATE_BIND_ADDR), got: {result:?}"
        );
    }

    #[test]
    fn redis_backend_requires_redis_url() {
        let mut map = HashMap::new();
        map.insert("OFFERGATE_CACHE_BACKEND", "redis");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(ref v)) if v == "OFFERGATE_REDIS_URL"),
            "expected MissingEnvVar(OFFERGATE_REDIS_URL), got: {result:?}"
        );
    }

    #[test]
    fn redis_backend_with_url_is_accepted() {
        let mut map = HashMap::new();
        map.insert("OFFERGATE_CACHE_BACKEND", "redis");
        map.insert("OFFERGATE_REDIS_URL", "redis://127.0.0.1:6379");
        let cfg = build_app_config(lookup_from_map(&map)).unwrap();
        assert_eq!(cfg.cache_backend, CacheBackendKind::Redis);
        assert_eq!(cfg.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
    }

    #[test]
    fn unknown_cache_backend_is_rejected() {
        let mut map = HashMap::new();
        map.insert("OFFERGATE_CACHE_BACKEND", "memcached");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "OFFERGATE_CACHE_BACKEND"),
            "expected InvalidEnvVar(OFFERGATE_CACHE_BACKEND), got: {result:?}"
        );
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let mut map = HashMap::new();
        map.insert("OFFERGATE_RESPONSE_BUFFER", "0");
        let result = build_app_config(lookup_from_map(&map));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn buffer_overrides_are_honored() {
        let mut map = HashMap::new();
        map.insert("OFFERGATE_RESPONSE_BUFFER", "32");
        map.insert("OFFERGATE_QUERY_DEADLINE_SECS", "120");
        let cfg = build_app_config(lookup_from_map(&map)).unwrap();
        assert_eq!(cfg.response_buffer, 32);
        assert_eq!(cfg.query_deadline_secs, 120);
    }
}
