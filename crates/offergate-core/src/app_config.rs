use std::net::SocketAddr;
use std::path::PathBuf;

/// Which cache backend the process runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    /// In-process map. Default for local development and tests.
    Memory,
    /// Shared Redis instance, required when running more than one replica.
    Redis,
}

impl std::fmt::Display for CacheBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackendKind::Memory => write!(f, "memory"),
            CacheBackendKind::Redis => write!(f, "redis"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub backends_path: PathBuf,
    pub cache_backend: CacheBackendKind,
    pub redis_url: Option<String>,
    pub response_buffer: usize,
    pub error_buffer: usize,
    pub query_deadline_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("backends_path", &self.backends_path)
            .field("cache_backend", &self.cache_backend)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[redacted]"))
            .field("response_buffer", &self.response_buffer)
            .field("error_buffer", &self.error_buffer)
            .field("query_deadline_secs", &self.query_deadline_secs)
            .finish()
    }
}
