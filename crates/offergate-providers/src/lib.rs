//! Provider adapters and the fan-out request coordinator.
//!
//! One crate covers the three pieces that turn a single query into a merged
//! product stream: the [`adapter`] contract each upstream implements, the
//! [`registry`] that instantiates adapters from configuration, and the
//! [`coordinator`] that owns all outbound I/O — retries, backoff,
//! per-provider concurrency limits and follow-up scheduling.

pub mod adapter;
pub mod adapters;
mod coordinator;
mod error;
mod registry;

pub use adapter::{
    AdapterRequest, ParsedResponse, PreparedRequest, ProviderAdapter, ProviderResponse,
};
pub use coordinator::RequestCoordinator;
pub use error::ProviderError;
pub use registry::{
    build_providers, AdapterFactory, FactoryContext, ProviderConfig, Registry,
};
