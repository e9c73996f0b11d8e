//! ByteBlitz adapter: URL-query request, CSV response.
//!
//! The upstream answers a keyed GET with a CSV document, one offer per row.
//! Rows arrive with exact duplicates (observed on every live query), so the
//! adapter deduplicates before conversion. The `providerName` column packs
//! `"name,description"` into one field when a description exists.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use offergate_core::units::MB_PER_GB;
use offergate_core::{
    AbsoluteDiscount, ConnectionType, InternetProduct, PercentageDiscount, Pricing, ProductInfo,
    SubsequentCost,
};

use crate::adapter::{AdapterRequest, ParsedResponse, PreparedRequest, ProviderAdapter, ProviderResponse};
use crate::error::ProviderError;
use crate::registry::{option_str, require_env, FactoryContext};

pub const PROVIDER_NAME: &str = "ByteBlitz";

/// Creates the adapter from config options (`url`) and `BYTEBLITZ_API_KEY`.
///
/// # Errors
///
/// Fails when the url option or the API key env var is missing.
pub fn factory(ctx: &FactoryContext<'_>) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
    let url = option_str(ctx.options, "url", PROVIDER_NAME)?;
    let api_key = require_env("BYTEBLITZ_API_KEY")?;
    Ok(Arc::new(ByteBlitzAdapter::new(url, api_key)))
}

pub struct ByteBlitzAdapter {
    url: String,
    api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
struct OfferRow {
    #[serde(rename = "productId")]
    id: String,
    #[serde(rename = "providerName")]
    provider_name: String,
    speed: i32,
    #[serde(rename = "monthlyCostInCent")]
    monthly_cost_in_cent: i32,
    #[serde(rename = "afterTwoYearsMonthlyCost")]
    after_two_years_monthly_cost_in_cent: i32,
    #[serde(rename = "durationInMonths")]
    duration_in_months: i32,
    #[serde(rename = "connectionType")]
    connection_type: String,
    #[serde(rename = "installationService")]
    installation_service: String,
    tv: String,
    #[serde(rename = "limitFrom")]
    limit_from: i32,
    #[serde(rename = "maxAge")]
    max_age: i32,
    #[serde(rename = "voucherType")]
    voucher_type: String,
    #[serde(rename = "voucherValue")]
    voucher_value: i32,
}

impl ByteBlitzAdapter {
    #[must_use]
    pub fn new(url: String, api_key: String) -> Self {
        ByteBlitzAdapter { url, api_key }
    }

    fn row_to_product(&self, row: &OfferRow) -> Result<InternetProduct, ProviderError> {
        let connection_type = ConnectionType::from_value(&row.connection_type.to_uppercase())
            .map_err(|e| ProviderError::Normalization {
                provider: PROVIDER_NAME,
                id: row.id.clone(),
                reason: e.to_string(),
            })?;

        let installation_service_included = match row.installation_service.as_str() {
            "true" => true,
            "false" => false,
            other => {
                return Err(ProviderError::Normalization {
                    provider: PROVIDER_NAME,
                    id: row.id.clone(),
                    reason: format!("unknown installation service value: {other}"),
                })
            }
        };

        let unthrottled_capacity_mb =
            (row.limit_from != 0).then(|| row.limit_from * MB_PER_GB);

        let mut pricing = Pricing {
            monthly_cost_in_cent: row.monthly_cost_in_cent,
            contract_duration_in_months: Some(row.duration_in_months),
            max_age_in_years: Some(row.max_age),
            installation_service_included,
            subsequent_costs: Some(SubsequentCost {
                monthly_cost_in_cent: row.after_two_years_monthly_cost_in_cent,
                start_month: 25,
            }),
            ..Pricing::default()
        };

        match row.voucher_type.as_str() {
            "absolute" => {
                if row.voucher_value != 0 {
                    pricing.absolute_discount = Some(AbsoluteDiscount {
                        value_in_cent: row.voucher_value,
                        min_order_value_in_cent: None,
                    });
                }
            }
            "percentage" => {
                if row.voucher_value != 0 {
                    pricing.percentage_discount = Some(PercentageDiscount {
                        percentage: row.voucher_value,
                        duration_in_months: None,
                        max_discount_in_cent: None,
                    });
                }
            }
            "" => {}
            other => {
                return Err(ProviderError::Normalization {
                    provider: PROVIDER_NAME,
                    id: row.id.clone(),
                    reason: format!("unknown voucher type: {other}"),
                })
            }
        }

        // "name,description" packed into one column.
        let (name, description) = match row.provider_name.split_once(',') {
            Some((name, description)) => (name.to_string(), description.to_string()),
            None => (row.provider_name.clone(), String::new()),
        };

        Ok(InternetProduct {
            id: row.id.clone(),
            provider: PROVIDER_NAME.to_string(),
            name,
            description,
            date_offered: None,
            product_info: ProductInfo {
                speed: row.speed,
                connection_type,
                tv: (!row.tv.is_empty()).then(|| row.tv.clone()),
                unthrottled_capacity_mb,
            },
            pricing,
        })
    }
}

#[async_trait]
impl ProviderAdapter for ByteBlitzAdapter {
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

        let mut url =
            reqwest::Url::parse(&self.url).map_err(|e| ProviderError::Options {
                provider: PROVIDER_NAME.to_string(),
                reason: format!("invalid url: {e}"),
            })?;
        url.query_pairs_mut()
            .append_pair("street", &address.street)
            .append_pair("houseNumber", &address.house_number)
            .append_pair("city", &address.city)
            .append_pair("plz", &address.postal_code);

        let mut http_request = reqwest::Request::new(reqwest::Method::GET, url);
        http_request.headers_mut().insert(
            "X-Api-Key",
            self.api_key.parse().map_err(|_| ProviderError::Options {
                provider: PROVIDER_NAME.to_string(),
                reason: "api key contains invalid header characters".to_string(),
            })?,
        );

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

        let mut reader = csv::Reader::from_reader(body.as_bytes());
        let rows = reader
            .deserialize::<OfferRow>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProviderError::Csv {
                provider: PROVIDER_NAME,
                source: e,
            })?;

        let mut seen = HashSet::new();
        let mut parsed = ParsedResponse::default();
        for row in rows {
            if !seen.insert(row.clone()) {
                continue;
            }
            match self.row_to_product(&row) {
                Ok(product) => parsed.products.push(product),
                Err(e) => {
                    tracing::debug!(provider = PROVIDER_NAME, row = %row.id, error = %e, "skipping malformed row");
                    parsed.errors.push(e);
                }
            }
        }

        Ok(parsed)
    }
}
