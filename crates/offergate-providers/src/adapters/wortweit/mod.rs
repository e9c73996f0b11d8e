//! WortWeit adapter: URL-paginated JSON whose payload is a free-text offer.
//!
//! Each page carries exactly one offer as a German marketing paragraph that
//! the [`parser`] decomposes into structured facts. Pages are fetched in
//! blocks: `prepare_request` seeds pages `0..block_size` concurrently, and
//! every non-final page answers with a follow-up for `page + block_size`,
//! so the block keeps sliding until the upstream flags the last page.

mod parser;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

pub use parser::{DescriptionParser, OfferFacts, ParseError, UnitValue};

use offergate_core::units::{CENTS_PER_EURO, MB_PER_GB};
use offergate_core::{InternetProduct, Pricing, ProductInfo};

use crate::adapter::{AdapterRequest, ParsedResponse, PreparedRequest, ProviderAdapter, ProviderResponse};
use crate::error::ProviderError;
use crate::registry::{option_str, option_u64, require_env, FactoryContext};

pub const PROVIDER_NAME: &str = "WortWeit";

/// Creates the adapter from config options (`url`, `blockSize`) and
/// `WORTWEIT_API_KEY`.
///
/// # Errors
///
/// Fails when either option or the API key env var is missing.
pub fn factory(ctx: &FactoryContext<'_>) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
    let url = option_str(ctx.options, "url", PROVIDER_NAME)?;
    let block_size =
        option_u64(ctx.options, "blockSize", PROVIDER_NAME)?.ok_or_else(|| {
            ProviderError::Options {
                provider: PROVIDER_NAME.to_string(),
                reason: "missing option \"blockSize\"".to_string(),
            }
        })?;
    let api_key = require_env("WORTWEIT_API_KEY")?;
    Ok(Arc::new(WortWeitAdapter::new(url, api_key, block_size)))
}

pub struct WortWeitAdapter {
    url: String,
    api_key: String,
    block_size: u64,
    parser: DescriptionParser,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    product: String,
    description: String,
    last: bool,
    valid: bool,
}

impl WortWeitAdapter {
    #[must_use]
    pub fn new(url: String, api_key: String, block_size: u64) -> Self {
        WortWeitAdapter {
            url,
            api_key,
            block_size: block_size.max(1),
            parser: DescriptionParser::new(),
        }
    }

    fn page_request(
        &self,
        address: &offergate_core::Address,
        page: u64,
    ) -> Result<PreparedRequest, ProviderError> {
        let mut url = reqwest::Url::parse(&self.url).map_err(|e| ProviderError::Options {
            provider: PROVIDER_NAME.to_string(),
            reason: format!("invalid url: {e}"),
        })?;
        url.query_pairs_mut()
            .append_pair("apiKey", &self.api_key)
            .append_pair("page", &page.to_string());

        let body = format!(
            "{};{};{};{}",
            address.street, address.house_number, address.city, address.postal_code
        );

        let mut request = reqwest::Request::new(reqwest::Method::POST, url);
        request.headers_mut().insert(
            reqwest::header::ACCEPT,
            "application/json".parse().expect("static header"),
        );
        *request.body_mut() = Some(body.into());

        Ok(PreparedRequest::new(request).with_metadata(serde_json::json!(page)))
    }

    fn facts_to_product(
        &self,
        product_name: &str,
        facts: &OfferFacts,
    ) -> Result<InternetProduct, ProviderError> {
        let normalization_error = |reason: String| ProviderError::Normalization {
            provider: PROVIDER_NAME,
            id: product_name.to_string(),
            reason,
        };

        let speed_fact = facts
            .speed
            .as_ref()
            .ok_or_else(|| normalization_error("description names no speed".to_string()))?;
        let speed = match speed_fact.unit.as_str() {
            "Mbit/s" => speed_fact.value,
            "Gbit/s" => speed_fact.value * MB_PER_GB,
            other => return Err(normalization_error(format!("unknown speed unit: {other}"))),
        };

        let price_in_euro = facts
            .price_in_euro
            .ok_or_else(|| normalization_error("description names no price".to_string()))?;
        let connection_type = facts
            .connection_type
            .ok_or_else(|| normalization_error("description names no connection type".to_string()))?;

        let unthrottled_capacity_mb = facts
            .unthrottled_capacity
            .as_ref()
            .map(|capacity| match capacity.unit.to_uppercase().as_str() {
                "MB" => Ok(capacity.value),
                "GB" => Ok(capacity.value * MB_PER_GB),
                other => Err(normalization_error(format!(
                    "unknown capacity unit: {other}"
                ))),
            })
            .transpose()?;

        let min_contract_duration_in_months = facts
            .min_contract_duration
            .as_ref()
            .map(|duration| match duration.unit.to_uppercase().as_str() {
                "MONAT" | "MONATE" => Ok(duration.value),
                "JAHRE" | "JAHREN" => Ok(duration.value * 12),
                other => Err(normalization_error(format!(
                    "unknown contract duration unit: {other}"
                ))),
            })
            .transpose()?;

        Ok(InternetProduct {
            id: product_name.to_string(),
            provider: PROVIDER_NAME.to_string(),
            name: product_name.to_string(),
            description: String::new(),
            date_offered: None,
            product_info: ProductInfo {
                speed,
                connection_type,
                tv: facts.tv_channels.clone(),
                unthrottled_capacity_mb,
            },
            pricing: Pricing {
                monthly_cost_in_cent: price_in_euro * CENTS_PER_EURO,
                min_contract_duration_in_months,
                min_age_in_years: facts.min_age,
                max_age_in_years: facts.max_age,
                min_order_value_in_cent: facts
                    .min_order_value_in_euro
                    .map(|v| v * CENTS_PER_EURO),
                installation_service_included: facts.installation_included,
                subsequent_costs: facts.subsequent_cost.clone(),
                absolute_discount: facts.absolute_discount.clone(),
                percentage_discount: facts.percentage_discount.clone(),
                ..Pricing::default()
            },
        })
    }
}

#[async_trait]
impl ProviderAdapter for WortWeitAdapter {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn prepare_request(
        &self,
        request: &AdapterRequest,
    ) -> Result<ParsedResponse, ProviderError> {
        let address = &request.address;
        if address.house_number.is_empty() {
            tracing::debug!(provider = PROVIDER_NAME, "no house number, skipping query");
            return Ok(ParsedResponse::default());
        }

        let mut parsed = ParsedResponse::default();
        for page in 0..self.block_size {
            parsed.requests.push(self.page_request(address, page)?);
        }
        Ok(parsed)
    }

    async fn parse_response(
        &self,
        response: ProviderResponse,
    ) -> Result<ParsedResponse, ProviderError> {
        let status = response.http.status();
        if status != reqwest::StatusCode::OK {
            return Err(ProviderError::UnexpectedStatus {
                provider: PROVIDER_NAME,
                status: status.as_u16(),
            });
        }

        let body = response.http.text().await.map_err(|e| ProviderError::Http {
            provider: PROVIDER_NAME,
            source: e,
        })?;
        let page: PageResponse = serde_json::from_str(&body).map_err(|e| ProviderError::Json {
            provider: PROVIDER_NAME,
            context: "offer page".to_string(),
            source: e,
        })?;

        let mut parsed = ParsedResponse::default();
        if !page.valid {
            return Ok(parsed);
        }

        let facts = self
            .parser
            .parse(&page.description)
            .map_err(|e| ProviderError::Description {
                provider: PROVIDER_NAME,
                source: e,
            })?;
        parsed
            .products
            .push(self.facts_to_product(&page.product, &facts)?);

        if !page.last {
            let previous_page = response
                .metadata
                .as_ref()
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(|| ProviderError::Normalization {
                    provider: PROVIDER_NAME,
                    id: page.product.clone(),
                    reason: "page response is missing its page-number metadata".to_string(),
                })?;
            parsed.requests.push(
                self.page_request(&response.initial.address, previous_page + self.block_size)?,
            );
        }

        Ok(parsed)
    }
}
