mod api;
mod middleware;
mod queue;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use offergate_cache::CacheBackend;
use offergate_core::{load_app_config_from_env, load_backends, CacheBackendKind, VersionInfo};
use offergate_providers::{build_providers, Registry, RequestCoordinator};

use crate::api::AppState;
use crate::queue::QueueService;

#[derive(Debug, Parser)]
#[command(name = "offergate", about = "Internet product aggregation gateway")]
struct Args {
    /// Path to the backends configuration file; overrides OFFERGATE_BACKENDS_PATH.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the environment file loaded before reading configuration.
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Enable debug logging regardless of OFFERGATE_LOG_LEVEL.
    #[arg(long)]
    debug: bool,

    /// Emit logs as JSON instead of human-readable text.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    dotenvy::from_path(&args.env_file).ok();

    let config = load_app_config_from_env().context("loading configuration from environment")?;

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };
    if args.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let backends_path = args.config.unwrap_or_else(|| config.backends_path.clone());
    let backends = load_backends(&backends_path)
        .with_context(|| format!("loading backends file {}", backends_path.display()))?;

    let cache_backend = match config.cache_backend {
        CacheBackendKind::Memory => CacheBackend::Memory,
        CacheBackendKind::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .context("redis backend selected but OFFERGATE_REDIS_URL is unset")?;
            CacheBackend::redis(url)
                .await
                .context("connecting to redis")?
        }
    };

    let registry = Registry::builtin();
    let providers = build_providers(&registry, &backends, &cache_backend)
        .context("building provider adapters")?;
    if providers.is_empty() {
        tracing::warn!("no providers enabled; every query will return an empty result");
    }

    let queue_service = Arc::new(QueueService::new(
        cache_backend.open("main"),
        cache_backend.open("queue"),
        Arc::new(RequestCoordinator::new(providers)),
        config.response_buffer,
        config.error_buffer,
        Duration::from_secs(config.query_deadline_secs),
    ));

    let state = AppState {
        queue_service,
        version: Arc::new(VersionInfo::from_build_env()),
    };
    let app = api::build_app(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "starting server");
    axum::serve(listener, app).await.context("serving HTTP")?;
    Ok(())
}
