//! Static adapter serving configured products.
//!
//! Used by the local-development config and the integration tests: the
//! `responses` option holds canonical products verbatim, and an optional
//! `delayMs` simulates upstream latency so cursor-queue behavior (202
//! before the first product, incremental polling) can be exercised without
//! a real provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use offergate_core::InternetProduct;

use crate::adapter::{AdapterRequest, ParsedResponse, ProviderAdapter, ProviderResponse};
use crate::error::ProviderError;
use crate::registry::{option_u64, FactoryContext};

pub const PROVIDER_NAME: &str = "Static";

/// Creates the adapter from config options (`responses`, optional `delayMs`).
///
/// # Errors
///
/// Fails when `responses` is missing or does not deserialize into products.
pub fn factory(ctx: &FactoryContext<'_>) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
    let responses = ctx
        .options
        .get("responses")
        .ok_or_else(|| ProviderError::Options {
            provider: PROVIDER_NAME.to_string(),
            reason: "missing option \"responses\"".to_string(),
        })?;
    let products: Vec<InternetProduct> =
        serde_json::from_value(responses.clone()).map_err(|e| ProviderError::Json {
            provider: PROVIDER_NAME,
            context: "responses option".to_string(),
            source: e,
        })?;
    let delay_ms = option_u64(ctx.options, "delayMs", PROVIDER_NAME)?.unwrap_or(0);

    Ok(Arc::new(StaticAdapter::new(
        products,
        Duration::from_millis(delay_ms),
    )))
}

pub struct StaticAdapter {
    products: Vec<InternetProduct>,
    delay: Duration,
}

impl StaticAdapter {
    #[must_use]
    pub fn new(products: Vec<InternetProduct>, delay: Duration) -> Self {
        StaticAdapter { products, delay }
    }
}

#[async_trait]
impl ProviderAdapter for StaticAdapter {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn prepare_request(
        &self,
        _request: &AdapterRequest,
    ) -> Result<ParsedResponse, ProviderError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(ParsedResponse {
            products: self.products.clone(),
            ..ParsedResponse::default()
        })
    }

    async fn parse_response(
        &self,
        _response: ProviderResponse,
    ) -> Result<ParsedResponse, ProviderError> {
        // The static adapter never emits requests, so there is nothing to parse.
        Ok(ParsedResponse::default())
    }
}
