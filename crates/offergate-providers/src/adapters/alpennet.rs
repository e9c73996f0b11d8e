//! AlpenNet adapter: two-stage listing→detail JSON protocol.
//!
//! The first call lists available product ids for an address; each id then
//! needs its own detail call. Details are address-independent for the
//! typical query window, so parsed details are cached for a few minutes and
//! cache hits skip the detail round-trip entirely. The upstream uses HTTP
//! basic auth and German JSON field names, and only serves Germany.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use offergate_cache::{Cache, CacheExt, Ttl};
use offergate_core::units::MB_PER_GB;
use offergate_core::{
    AbsoluteDiscount, Address, ConnectionType, CountryCode, InternetProduct, Pricing, ProductInfo,
};

use crate::adapter::{AdapterRequest, ParsedResponse, PreparedRequest, ProviderAdapter, ProviderResponse};
use crate::error::ProviderError;
use crate::registry::{option_str, option_u64, require_env, FactoryContext};

pub const PROVIDER_NAME: &str = "AlpenNet";

const LISTING_PATH: &str = "/api/external/available-products";
const DETAILS_PATH: &str = "/api/external/product-details/";
const DEFAULT_CACHE_MINUTES: u64 = 5;

/// Creates the adapter from config options (`url`, optional
/// `cacheDurationMinutes`) and the `ALPENNET_USERNAME` / `ALPENNET_PASSWORD`
/// env vars. The factory's cache handle stores parsed product details.
///
/// # Errors
///
/// Fails when the url option or either env var is missing.
pub fn factory(ctx: &FactoryContext<'_>) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
    let url = option_str(ctx.options, "url", PROVIDER_NAME)?;
    let cache_minutes = option_u64(ctx.options, "cacheDurationMinutes", PROVIDER_NAME)?
        .unwrap_or(DEFAULT_CACHE_MINUTES);
    let username = require_env("ALPENNET_USERNAME")?;
    let password = require_env("ALPENNET_PASSWORD")?;
    Ok(Arc::new(AlpenNetAdapter::new(
        url,
        username,
        password,
        Arc::clone(&ctx.cache),
        Duration::from_secs(cache_minutes * 60),
    )))
}

pub struct AlpenNetAdapter {
    url: String,
    username: String,
    password: String,
    cache: Arc<dyn Cache>,
    cache_duration: Duration,
}

#[derive(Debug, Serialize)]
struct UpstreamAddress {
    strasse: String,
    hausnummer: String,
    postleitzahl: String,
    stadt: String,
    land: String,
}

#[derive(Debug, Serialize)]
struct ListingRequest {
    address: UpstreamAddress,
}

#[derive(Debug, Deserialize)]
struct ListingResponse {
    #[serde(rename = "availableProducts")]
    available_products: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    #[serde(rename = "alpenNetProduct")]
    product: UpstreamProduct,
}

#[derive(Debug, Deserialize)]
struct UpstreamProduct {
    #[serde(rename = "providerName")]
    provider_name: String,
    #[serde(rename = "productInfo")]
    product_info: UpstreamProductInfo,
    #[serde(rename = "pricingDetails")]
    pricing_details: UpstreamPricingDetails,
    #[serde(default)]
    discount: i32,
}

#[derive(Debug, Deserialize)]
struct UpstreamProductInfo {
    speed: i32,
    #[serde(rename = "contractDurationInMonths", default)]
    contract_duration_in_months: i32,
    #[serde(rename = "connectionType")]
    connection_type: String,
    #[serde(default)]
    tv: String,
    #[serde(rename = "limitFrom", default)]
    limit_from: i32,
    #[serde(rename = "maxAge", default)]
    max_age: i32,
}

#[derive(Debug, Deserialize)]
struct UpstreamPricingDetails {
    #[serde(rename = "monthlyCostInCent")]
    monthly_cost_in_cent: i32,
    #[serde(rename = "installationService", default)]
    installation_service: bool,
}

impl AlpenNetAdapter {
    #[must_use]
    pub fn new(
        url: String,
        username: String,
        password: String,
        cache: Arc<dyn Cache>,
        cache_duration: Duration,
    ) -> Self {
        AlpenNetAdapter {
            url,
            username,
            password,
            cache,
            cache_duration,
        }
    }

    fn upstream_address(address: &Address) -> UpstreamAddress {
        UpstreamAddress {
            strasse: address.street.clone(),
            hausnummer: address.house_number.clone(),
            postleitzahl: address.postal_code.clone(),
            stadt: address.city.clone(),
            land: address.country_code.to_string(),
        }
    }

    fn api_request(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<reqwest::Request, ProviderError> {
        let url = reqwest::Url::parse(&format!("{}{path}", self.url)).map_err(|e| {
            ProviderError::Options {
                provider: PROVIDER_NAME.to_string(),
                reason: format!("invalid url: {e}"),
            }
        })?;
        let body = serde_json::to_vec(body).map_err(|e| ProviderError::Json {
            provider: PROVIDER_NAME,
            context: "request body".to_string(),
            source: e,
        })?;

        let mut request = reqwest::Request::new(reqwest::Method::POST, url);
        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.username, self.password));
        let headers = request.headers_mut();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Basic {credentials}")
                .parse()
                .map_err(|_| ProviderError::Options {
                    provider: PROVIDER_NAME.to_string(),
                    reason: "credentials contain invalid header characters".to_string(),
                })?,
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            "application/json".parse().expect("static header"),
        );
        *request.body_mut() = Some(body.into());
        Ok(request)
    }

    fn product_from_details(
        &self,
        id: &str,
        details: &UpstreamProduct,
    ) -> Result<InternetProduct, ProviderError> {
        let connection_type =
            ConnectionType::from_value(&details.product_info.connection_type.to_uppercase())
                .map_err(|e| ProviderError::Normalization {
                    provider: PROVIDER_NAME,
                    id: id.to_string(),
                    reason: e.to_string(),
                })?;

        let info = &details.product_info;
        let pricing = Pricing {
            monthly_cost_in_cent: details.pricing_details.monthly_cost_in_cent,
            contract_duration_in_months: (info.contract_duration_in_months > 0)
                .then_some(info.contract_duration_in_months),
            max_age_in_years: (info.max_age > 0).then_some(info.max_age),
            installation_service_included: details.pricing_details.installation_service,
            absolute_discount: (details.discount != 0).then_some(AbsoluteDiscount {
                value_in_cent: details.discount,
                min_order_value_in_cent: None,
            }),
            ..Pricing::default()
        };

        Ok(InternetProduct {
            id: id.to_string(),
            provider: PROVIDER_NAME.to_string(),
            name: details.provider_name.clone(),
            description: String::new(),
            date_offered: None,
            product_info: ProductInfo {
                speed: info.speed,
                connection_type,
                tv: (!info.tv.is_empty()).then(|| info.tv.clone()),
                unthrottled_capacity_mb: (info.limit_from > 0)
                    .then(|| info.limit_from * MB_PER_GB),
            },
            pricing,
        })
    }

    async fn parse_listing(
        &self,
        address: &Address,
        body: &str,
    ) -> Result<ParsedResponse, ProviderError> {
        let listing: ListingResponse =
            serde_json::from_str(body).map_err(|e| ProviderError::Json {
                provider: PROVIDER_NAME,
                context: "available products listing".to_string(),
                source: e,
            })?;

        let mut parsed = ParsedResponse::default();
        for id in listing.available_products {
            match self.cache.get_json::<InternetProduct>(&id).await {
                Ok(Some(product)) => {
                    tracing::debug!(provider = PROVIDER_NAME, product = %id, "detail cache hit");
                    parsed.products.push(product);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(provider = PROVIDER_NAME, product = %id, error = %e, "detail cache read failed");
                }
            }

            let details_request = self.api_request(
                &format!("{DETAILS_PATH}{id}"),
                &ListingRequest {
                    address: Self::upstream_address(address),
                },
            )?;
            parsed.requests.push(
                PreparedRequest::new(details_request)
                    .with_metadata(serde_json::Value::String(id)),
            );
        }

        Ok(parsed)
    }

    async fn parse_details(
        &self,
        id: &str,
        body: &str,
    ) -> Result<ParsedResponse, ProviderError> {
        let details: DetailsResponse =
            serde_json::from_str(body).map_err(|e| ProviderError::Json {
                provider: PROVIDER_NAME,
                context: format!("product details for {id}"),
                source: e,
            })?;

        let product = self.product_from_details(id, &details.product)?;

        if let Err(e) = self
            .cache
            .set_json(id, &product, Ttl::Expires(self.cache_duration))
            .await
        {
            tracing::warn!(provider = PROVIDER_NAME, product = %id, error = %e, "detail cache write failed");
        }

        Ok(ParsedResponse {
            products: vec![product],
            ..ParsedResponse::default()
        })
    }
}

#[async_trait]
impl ProviderAdapter for AlpenNetAdapter {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn prepare_request(
        &self,
        request: &AdapterRequest,
    ) -> Result<ParsedResponse, ProviderError> {
        let address = &request.address;
        if address.country_code != CountryCode::De {
            tracing::debug!(provider = PROVIDER_NAME, country = %address.country_code, "only Germany is served");
            return Ok(ParsedResponse::default());
        }
        if address.house_number.is_empty() {
            tracing::debug!(provider = PROVIDER_NAME, "no house number, skipping query");
            return Ok(ParsedResponse::default());
        }

        let listing_request = self.api_request(
            LISTING_PATH,
            &ListingRequest {
                address: Self::upstream_address(address),
            },
        )?;

        Ok(ParsedResponse {
            requests: vec![PreparedRequest::new(listing_request)],
            ..ParsedResponse::default()
        })
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

        let path = response.url.path().to_string();
        let body = response
            .http
            .text()
            .await
            .map_err(|e| ProviderError::Http {
                provider: PROVIDER_NAME,
                source: e,
            })?;

        if path.ends_with(LISTING_PATH) {
            self.parse_listing(&response.initial.address, &body).await
        } else if path.contains(DETAILS_PATH) {
            let id = response
                .metadata
                .as_ref()
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| ProviderError::Normalization {
                    provider: PROVIDER_NAME,
                    id: String::new(),
                    reason: "detail response is missing its product id metadata".to_string(),
                })?
                .to_string();
            self.parse_details(&id, &body).await
        } else {
            tracing::warn!(provider = PROVIDER_NAME, %path, "response from unknown endpoint");
            Ok(ParsedResponse::default())
        }
    }
}
