//! Core domain model and configuration for the offergate gateway.
//!
//! Everything that the other crates agree on lives here: the canonical
//! internet product schema with its validation rules, the query address,
//! unit conversion constants, and the environment/file based configuration.

mod address;
mod app_config;
mod backends;
mod config;
pub mod product;
pub mod units;
mod version;

pub use address::{Address, CountryCode};
pub use app_config::{AppConfig, CacheBackendKind};
pub use backends::{load_backends, BackendConfig, BackendsFile};
pub use config::load_app_config_from_env;
pub use product::{
    canonicalize, validate_constraints, validate_required, AbsoluteDiscount, ConnectionType,
    InternetProduct, PercentageDiscount, Pricing, ProductInfo, SubsequentCost, ValidationError,
};
pub use version::VersionInfo;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read backends file {path}: {source}")]
    BackendsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse backends file: {0}")]
    BackendsFileParse(#[source] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}
