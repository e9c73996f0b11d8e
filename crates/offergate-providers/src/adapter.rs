//! The provider adapter contract.
//!
//! An adapter encapsulates one upstream's wire protocol behind a two-phase
//! interface: [`ProviderAdapter::prepare_request`] turns a query into
//! outbound HTTP requests (and possibly instantly-known products), and
//! [`ProviderAdapter::parse_response`] turns each HTTP response into
//! products and/or follow-up requests. The coordinator owns all actual I/O,
//! retries and concurrency limits; adapters stay protocol-only.
//!
//! ## Error semantics
//!
//! Row-level failures (one malformed offer among many) belong in
//! [`ParsedResponse::errors`]: the coordinator reports them on the error
//! channel, keeps the sibling products, and drops the follow-up requests of
//! that parse. Returning `Err` from either phase means the whole payload
//! was unusable — nothing is kept. An unserviceable query (unsupported
//! country, missing house number) is not an error: return an empty
//! [`ParsedResponse`].

use std::sync::Arc;

use async_trait::async_trait;

use offergate_core::{Address, InternetProduct};

use crate::error::ProviderError;

/// The information a query provides to the adapters.
#[derive(Debug, Clone)]
pub struct AdapterRequest {
    pub address: Address,
}

/// An outbound HTTP request an adapter wants the coordinator to execute.
pub struct PreparedRequest {
    pub request: reqwest::Request,
    /// Opaque context carried back into `parse_response` (page numbers,
    /// upstream product ids, …).
    pub metadata: Option<serde_json::Value>,
    /// Which adapter parses the response. `None` means the adapter that
    /// produced this request.
    pub callback: Option<Arc<dyn ProviderAdapter>>,
}

impl PreparedRequest {
    #[must_use]
    pub fn new(request: reqwest::Request) -> Self {
        PreparedRequest {
            request,
            metadata: None,
            callback: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl std::fmt::Debug for PreparedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedRequest")
            .field("method", self.request.method())
            .field("url", self.request.url())
            .field("metadata", &self.metadata)
            .field("callback", &self.callback.as_ref().map(|a| a.name()))
            .finish()
    }
}

/// A provider's HTTP response together with the context that produced it.
pub struct ProviderResponse {
    /// The original query, for adapters that need the address again in
    /// follow-up requests.
    pub initial: AdapterRequest,
    /// The URL the response came from, kept for endpoint routing.
    pub url: reqwest::Url,
    /// Metadata of the [`PreparedRequest`] that produced this response.
    pub metadata: Option<serde_json::Value>,
    pub http: reqwest::Response,
}

/// What an adapter extracted from a query or an upstream response.
#[derive(Default)]
pub struct ParsedResponse {
    pub products: Vec<InternetProduct>,
    pub requests: Vec<PreparedRequest>,
    /// Row-level failures; see the module docs for their exact semantics.
    pub errors: Vec<ProviderError>,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Canonical provider name; also used as the `provider` field of every
    /// product this adapter emits.
    fn name(&self) -> &'static str;

    /// Converts a query into immediately-known products and/or outbound
    /// requests. Must not block beyond cache lookups — the HTTP handler
    /// answers while this fan-out is still being prepared.
    async fn prepare_request(
        &self,
        request: &AdapterRequest,
    ) -> Result<ParsedResponse, ProviderError>;

    /// Parses one upstream response into products and follow-up requests.
    /// Called once per request emitted by `prepare_request` or by an
    /// earlier `parse_response` (multi-stage protocols).
    async fn parse_response(
        &self,
        response: ProviderResponse,
    ) -> Result<ParsedResponse, ProviderError>;
}
