//! NetzPuls adapter: HMAC-signed JSON request/response.
//!
//! Every request body is signed with `HMAC-SHA256(secret, "{timestamp}:{body}")`
//! and sent with `X-Client-Id` / `X-Timestamp` / `X-Signature` headers; the
//! upstream rejects requests whose timestamp drifts too far, so the
//! signature is computed at preparation time, not at send time.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use offergate_core::units::MB_PER_GB;
use offergate_core::{ConnectionType, InternetProduct, Pricing, ProductInfo};

use crate::adapter::{AdapterRequest, ParsedResponse, PreparedRequest, ProviderAdapter, ProviderResponse};
use crate::error::ProviderError;
use crate::registry::{option_str, require_env, FactoryContext};

pub const PROVIDER_NAME: &str = "NetzPuls";

type HmacSha256 = Hmac<Sha256>;

/// Creates the adapter from config options (`url`) and the
/// `NETZPULS_CLIENT_ID` / `NETZPULS_SIGNATURE_SECRET` env vars.
///
/// # Errors
///
/// Fails when the url option or either env var is missing.
pub fn factory(ctx: &FactoryContext<'_>) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
    let url = option_str(ctx.options, "url", PROVIDER_NAME)?;
    let client_id = require_env("NETZPULS_CLIENT_ID")?;
    let secret = require_env("NETZPULS_SIGNATURE_SECRET")?;
    Ok(Arc::new(NetzPulsAdapter::new(url, client_id, secret)))
}

pub struct NetzPulsAdapter {
    url: String,
    client_id: String,
    signature_secret: String,
}

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    street: &'a str,
    plz: &'a str,
    #[serde(rename = "houseNumber")]
    house_number: i32,
    city: &'a str,
    #[serde(rename = "wantsFiber")]
    wants_fiber: bool,
}

#[derive(Debug, Deserialize)]
struct Offer {
    #[serde(rename = "providerName")]
    provider_name: String,
    #[serde(rename = "productInfo")]
    product_info: OfferProductInfo,
    #[serde(rename = "pricingDetails")]
    pricing_details: OfferPricingDetails,
}

#[derive(Debug, Deserialize)]
struct OfferProductInfo {
    speed: i32,
    #[serde(rename = "contractDurationInMonths")]
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
struct OfferPricingDetails {
    #[serde(rename = "monthlyCostInCent")]
    monthly_cost_in_cent: i32,
    #[serde(rename = "installationService")]
    installation_service: String,
}

impl NetzPulsAdapter {
    #[must_use]
    pub fn new(url: String, client_id: String, signature_secret: String) -> Self {
        NetzPulsAdapter {
            url,
            client_id,
            signature_secret,
        }
    }

    /// Lowercase-hex HMAC-SHA256 over `"{timestamp}:{body}"`.
    fn sign(&self, timestamp: i64, body: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.signature_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(format!("{timestamp}:{body}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn offer_to_product(&self, offer: &Offer) -> Result<InternetProduct, ProviderError> {
        let connection_type =
            ConnectionType::from_value(&offer.product_info.connection_type.to_uppercase())
                .map_err(|e| ProviderError::Normalization {
                    provider: PROVIDER_NAME,
                    id: offer.provider_name.clone(),
                    reason: e.to_string(),
                })?;

        let installation_service_included = match offer.pricing_details.installation_service.as_str()
        {
            "yes" => true,
            "no" => false,
            other => {
                return Err(ProviderError::Normalization {
                    provider: PROVIDER_NAME,
                    id: offer.provider_name.clone(),
                    reason: format!("unknown installation service value: {other}"),
                })
            }
        };

        let unthrottled_capacity_mb =
            (offer.product_info.limit_from > 0).then(|| offer.product_info.limit_from * MB_PER_GB);

        Ok(InternetProduct {
            id: offer.provider_name.clone(),
            provider: PROVIDER_NAME.to_string(),
            name: offer.provider_name.clone(),
            description: String::new(),
            date_offered: None,
            product_info: ProductInfo {
                speed: offer.product_info.speed,
                connection_type,
                tv: (!offer.product_info.tv.is_empty()).then(|| offer.product_info.tv.clone()),
                unthrottled_capacity_mb,
            },
            pricing: Pricing {
                monthly_cost_in_cent: offer.pricing_details.monthly_cost_in_cent,
                contract_duration_in_months: Some(offer.product_info.contract_duration_in_months),
                max_age_in_years: Some(offer.product_info.max_age),
                installation_service_included,
                ..Pricing::default()
            },
        })
    }
}

#[async_trait]
impl ProviderAdapter for NetzPulsAdapter {
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

        // The upstream schema types the house number as an integer.
        let house_number: i32 =
            address
                .house_number
                .parse()
                .map_err(|_| ProviderError::Normalization {
                    provider: PROVIDER_NAME,
                    id: String::new(),
                    reason: format!("non-numeric house number: {}", address.house_number),
                })?;

        let body = serde_json::to_string(&QueryBody {
            street: &address.street,
            plz: &address.postal_code,
            house_number,
            city: &address.city,
            wants_fiber: false,
        })
        .map_err(|e| ProviderError::Json {
            provider: PROVIDER_NAME,
            context: "query body".to_string(),
            source: e,
        })?;

        let timestamp = Utc::now().timestamp();
        let signature = self.sign(timestamp, &body);

        let url = reqwest::Url::parse(&self.url).map_err(|e| ProviderError::Options {
            provider: PROVIDER_NAME.to_string(),
            reason: format!("invalid url: {e}"),
        })?;
        let mut http_request = reqwest::Request::new(reqwest::Method::POST, url);
        let headers = http_request.headers_mut();
        headers.insert(reqwest::header::CONTENT_TYPE, "application/json".parse().expect("static header"));
        headers.insert(
            "X-Client-Id",
            self.client_id.parse().map_err(|_| ProviderError::Options {
                provider: PROVIDER_NAME.to_string(),
                reason: "client id contains invalid header characters".to_string(),
            })?,
        );
        headers.insert(
            "X-Timestamp",
            timestamp.to_string().parse().expect("numeric header"),
        );
        headers.insert("X-Signature", signature.parse().expect("hex header"));
        *http_request.body_mut() = Some(body.into());

        Ok(ParsedResponse {
            requests: vec![PreparedRequest::new(http_request)],
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

        let body = response.http.text().await.map_err(|e| ProviderError::Http {
            provider: PROVIDER_NAME,
            source: e,
        })?;
        let offers: Vec<Offer> =
            serde_json::from_str(&body).map_err(|e| ProviderError::Json {
                provider: PROVIDER_NAME,
                context: "offer list".to_string(),
                source: e,
            })?;

        let mut parsed = ParsedResponse::default();
        for offer in &offers {
            match self.offer_to_product(offer) {
                Ok(product) => parsed.products.push(product),
                Err(e) => {
                    tracing::debug!(provider = PROVIDER_NAME, error = %e, "skipping malformed offer");
                    parsed.errors.push(e);
                }
            }
        }

        Ok(parsed)
    }
}
