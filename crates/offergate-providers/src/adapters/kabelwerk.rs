//! KabelWerk adapter: SOAP/XML envelope with per-connection-type fan-out.
//!
//! The upstream's single operation answers offers for one connection type
//! per call, so preparation emits four requests (DSL, CABLE, FIBER,
//! MOBILE). Installation service is requested unconditionally; the
//! upstream prices it identically either way, and the flag travels in the
//! request metadata so the parser can stamp it onto the offers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use offergate_core::{
    AbsoluteDiscount, Address, ConnectionType, InternetProduct, PercentageDiscount, Pricing,
    ProductInfo, SubsequentCost,
};

use crate::adapter::{AdapterRequest, ParsedResponse, PreparedRequest, ProviderAdapter, ProviderResponse};
use crate::error::ProviderError;
use crate::registry::{option_str, require_env, FactoryContext};

pub const PROVIDER_NAME: &str = "KabelWerk";

const CONNECTION_TYPES: [ConnectionType; 4] = [
    ConnectionType::Dsl,
    ConnectionType::Cable,
    ConnectionType::Fiber,
    ConnectionType::Mobile,
];

/// Creates the adapter from config options (`soapEndpoint`, `soapAction`,
/// `soapGs`, `soapEnv`) and `KABELWERK_API_KEY`.
///
/// # Errors
///
/// Fails when any option or the API key env var is missing.
pub fn factory(ctx: &FactoryContext<'_>) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
    let endpoint = option_str(ctx.options, "soapEndpoint", PROVIDER_NAME)?;
    let action = option_str(ctx.options, "soapAction", PROVIDER_NAME)?;
    let gs_namespace = option_str(ctx.options, "soapGs", PROVIDER_NAME)?;
    let envelope_namespace = option_str(ctx.options, "soapEnv", PROVIDER_NAME)?;
    let api_key = require_env("KABELWERK_API_KEY")?;
    Ok(Arc::new(KabelWerkAdapter::new(
        api_key,
        endpoint,
        action,
        gs_namespace,
        envelope_namespace,
    )))
}

pub struct KabelWerkAdapter {
    api_key: String,
    endpoint: String,
    action: String,
    gs_namespace: String,
    envelope_namespace: String,
}

// Request envelope, element names as required by the upstream WSDL.

#[derive(Debug, Serialize)]
#[serde(rename = "soapenv:Envelope")]
struct RequestEnvelope<'a> {
    #[serde(rename = "@xmlns:soapenv")]
    envelope_namespace: &'a str,
    #[serde(rename = "@xmlns:gs")]
    gs_namespace: &'a str,
    #[serde(rename = "soapenv:Body")]
    body: RequestBody<'a>,
}

#[derive(Debug, Serialize)]
struct RequestBody<'a> {
    #[serde(rename = "gs:legacyGetInternetOffers")]
    get_internet_offers: GetInternetOffers<'a>,
}

#[derive(Debug, Serialize)]
struct GetInternetOffers<'a> {
    #[serde(rename = "gs:input")]
    input: OfferInput<'a>,
}

#[derive(Debug, Serialize)]
struct OfferInput<'a> {
    #[serde(rename = "gs:installation")]
    installation: bool,
    #[serde(rename = "gs:connectionEnum")]
    connection: &'a str,
    #[serde(rename = "gs:address")]
    address: SoapAddress<'a>,
}

#[derive(Debug, Serialize)]
struct SoapAddress<'a> {
    #[serde(rename = "gs:street")]
    street: &'a str,
    #[serde(rename = "gs:houseNumber")]
    house_number: &'a str,
    #[serde(rename = "gs:city")]
    city: &'a str,
    #[serde(rename = "gs:plz")]
    plz: &'a str,
    #[serde(rename = "gs:countryCode")]
    country_code: &'a str,
}

// Response envelope. Aliases cover the namespace prefixes observed from
// the upstream's SOAP stack.

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(rename = "Body", alias = "SOAP-ENV:Body", alias = "soapenv:Body")]
    body: ResponseBody,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(rename = "Output", alias = "ns2:Output")]
    output: Output,
}

#[derive(Debug, Deserialize)]
struct Output {
    #[serde(rename = "products", default)]
    products: Vec<SoapProduct>,
}

#[derive(Debug, Deserialize)]
struct SoapProduct {
    #[serde(rename = "productId")]
    product_id: i64,
    #[serde(rename = "providerName")]
    provider_name: String,
    #[serde(rename = "productInfo")]
    product_info: Option<SoapProductInfo>,
}

#[derive(Debug, Deserialize)]
struct SoapProductInfo {
    speed: i32,
    #[serde(rename = "monthlyCostInCent")]
    monthly_cost_in_cent: i32,
    #[serde(rename = "monthlyCostInCentFrom25thMonth")]
    monthly_cost_in_cent_from_25th_month: i32,
    #[serde(default)]
    voucher: Option<SoapVoucher>,
    #[serde(rename = "contractDurationInMonths")]
    contract_duration_in_months: i32,
    #[serde(rename = "connectionType")]
    connection_type: String,
}

#[derive(Debug, Deserialize)]
struct SoapVoucher {
    #[serde(rename = "percentageVoucher", default)]
    percentage: Option<PercentageVoucher>,
    #[serde(rename = "absoluteVoucher", default)]
    absolute: Option<AbsoluteVoucher>,
}

#[derive(Debug, Deserialize)]
struct PercentageVoucher {
    #[serde(default)]
    percentage: i32,
    #[serde(rename = "maxDiscountInCent", default)]
    max_discount_in_cent: i32,
}

#[derive(Debug, Deserialize)]
struct AbsoluteVoucher {
    #[serde(rename = "discountInCent", default)]
    discount_in_cent: i32,
    #[serde(rename = "minOrderValueInCent", default)]
    min_order_value_in_cent: i32,
}

impl KabelWerkAdapter {
    #[must_use]
    pub fn new(
        api_key: String,
        endpoint: String,
        action: String,
        gs_namespace: String,
        envelope_namespace: String,
    ) -> Self {
        KabelWerkAdapter {
            api_key,
            endpoint,
            action,
            gs_namespace,
            envelope_namespace,
        }
    }

    fn soap_request(
        &self,
        address: &Address,
        connection_type: ConnectionType,
        installation: bool,
    ) -> Result<reqwest::Request, ProviderError> {
        let envelope = RequestEnvelope {
            envelope_namespace: &self.envelope_namespace,
            gs_namespace: &self.gs_namespace,
            body: RequestBody {
                get_internet_offers: GetInternetOffers {
                    input: OfferInput {
                        installation,
                        connection: connection_type.as_str(),
                        address: SoapAddress {
                            street: &address.street,
                            house_number: &address.house_number,
                            city: &address.city,
                            plz: &address.postal_code,
                            country_code: address.country_code.as_str(),
                        },
                    },
                },
            },
        };

        let xml = quick_xml::se::to_string(&envelope).map_err(|e| ProviderError::XmlEncode {
            provider: PROVIDER_NAME,
            source: e,
        })?;

        let url = reqwest::Url::parse(&self.endpoint).map_err(|e| ProviderError::Options {
            provider: PROVIDER_NAME.to_string(),
            reason: format!("invalid soapEndpoint: {e}"),
        })?;
        let mut request = reqwest::Request::new(reqwest::Method::POST, url);
        let headers = request.headers_mut();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            "text/xml;charset=UTF-8".parse().expect("static header"),
        );
        headers.insert(
            "SOAPAction",
            self.action.parse().map_err(|_| ProviderError::Options {
                provider: PROVIDER_NAME.to_string(),
                reason: "soapAction contains invalid header characters".to_string(),
            })?,
        );
        headers.insert(
            reqwest::header::ACCEPT,
            "text/xml".parse().expect("static header"),
        );
        headers.insert(
            "X-Api-Key",
            self.api_key.parse().map_err(|_| ProviderError::Options {
                provider: PROVIDER_NAME.to_string(),
                reason: "api key contains invalid header characters".to_string(),
            })?,
        );
        *request.body_mut() = Some(xml.into());
        Ok(request)
    }

    fn soap_product_to_product(
        product: &SoapProduct,
        installation: bool,
    ) -> Result<InternetProduct, ProviderError> {
        let info = product
            .product_info
            .as_ref()
            .ok_or_else(|| ProviderError::Normalization {
                provider: PROVIDER_NAME,
                id: product.product_id.to_string(),
                reason: "product info element is missing".to_string(),
            })?;

        let connection_type =
            ConnectionType::from_value(&info.connection_type).map_err(|e| {
                ProviderError::Normalization {
                    provider: PROVIDER_NAME,
                    id: product.product_id.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let mut pricing = Pricing {
            monthly_cost_in_cent: info.monthly_cost_in_cent,
            contract_duration_in_months: Some(info.contract_duration_in_months),
            installation_service_included: installation,
            subsequent_costs: Some(SubsequentCost {
                monthly_cost_in_cent: info.monthly_cost_in_cent_from_25th_month,
                start_month: 25,
            }),
            ..Pricing::default()
        };

        if let Some(voucher) = &info.voucher {
            if let Some(absolute) = &voucher.absolute {
                if absolute.discount_in_cent != 0 || absolute.min_order_value_in_cent != 0 {
                    pricing.absolute_discount = Some(AbsoluteDiscount {
                        value_in_cent: absolute.discount_in_cent,
                        min_order_value_in_cent: Some(absolute.min_order_value_in_cent),
                    });
                }
            }
            if let Some(percentage) = &voucher.percentage {
                if percentage.percentage != 0 {
                    pricing.percentage_discount = Some(PercentageDiscount {
                        percentage: percentage.percentage,
                        duration_in_months: None,
                        max_discount_in_cent: Some(percentage.max_discount_in_cent),
                    });
                }
            }
        }

        Ok(InternetProduct {
            id: format!(
                "{PROVIDER_NAME}-{}.{}",
                product.product_id,
                u8::from(installation)
            ),
            provider: PROVIDER_NAME.to_string(),
            name: product.provider_name.clone(),
            description: String::new(),
            date_offered: None,
            product_info: ProductInfo {
                speed: info.speed,
                connection_type,
                tv: None,
                unthrottled_capacity_mb: None,
            },
            pricing,
        })
    }
}

#[async_trait]
impl ProviderAdapter for KabelWerkAdapter {
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
        for connection_type in CONNECTION_TYPES {
            let soap_request = self.soap_request(address, connection_type, true)?;
            parsed.requests.push(
                PreparedRequest::new(soap_request)
                    .with_metadata(serde_json::json!({ "installation": true })),
            );
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

        let installation = response
            .metadata
            .as_ref()
            .and_then(|m| m.get("installation"))
            .and_then(serde_json::Value::as_bool)
            .ok_or_else(|| ProviderError::Normalization {
                provider: PROVIDER_NAME,
                id: String::new(),
                reason: "response is missing its installation metadata".to_string(),
            })?;

        let body = response.http.text().await.map_err(|e| ProviderError::Http {
            provider: PROVIDER_NAME,
            source: e,
        })?;
        let envelope: ResponseEnvelope =
            quick_xml::de::from_str(&body).map_err(|e| ProviderError::Xml {
                provider: PROVIDER_NAME,
                source: e,
            })?;

        let mut parsed = ParsedResponse::default();
        for product in &envelope.body.output.products {
            match Self::soap_product_to_product(product, installation) {
                Ok(product) => parsed.products.push(product),
                Err(e) => {
                    tracing::warn!(provider = PROVIDER_NAME, error = %e, "skipping malformed product");
                    parsed.errors.push(e);
                }
            }
        }

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offergate_core::CountryCode;

    fn adapter() -> KabelWerkAdapter {
        KabelWerkAdapter::new(
            "test-key".to_string(),
            "https://kabelwerk.example.com/soap".to_string(),
            "urn:getInternetOffers".to_string(),
            "http://kabelwerk.example.com/gs".to_string(),
            "http://schemas.xmlsoap.org/soap/envelope/".to_string(),
        )
    }

    fn address() -> Address {
        Address {
            street: "Marienplatz".to_string(),
            house_number: "1".to_string(),
            city: "München".to_string(),
            postal_code: "80331".to_string(),
            country_code: CountryCode::De,
        }
    }

    #[tokio::test]
    async fn prepare_fans_out_one_request_per_connection_type() {
        let parsed = adapter()
            .prepare_request(&AdapterRequest { address: address() })
            .await
            .unwrap();
        assert_eq!(parsed.requests.len(), 4);
        for prepared in &parsed.requests {
            assert_eq!(prepared.request.headers()["SOAPAction"], "urn:getInternetOffers");
            assert_eq!(prepared.request.headers()["X-Api-Key"], "test-key");
            assert_eq!(
                prepared.metadata,
                Some(serde_json::json!({ "installation": true }))
            );
        }
        let bodies: Vec<String> = parsed
            .requests
            .iter()
            .map(|p| {
                String::from_utf8(p.request.body().and_then(|b| b.as_bytes()).unwrap().to_vec())
                    .unwrap()
            })
            .collect();
        assert!(bodies[0].contains("<gs:connectionEnum>DSL</gs:connectionEnum>"));
        assert!(bodies[2].contains("<gs:connectionEnum>FIBER</gs:connectionEnum>"));
    }

    #[test]
    fn request_envelope_carries_namespaces_and_address() {
        let request = adapter()
            .soap_request(&address(), ConnectionType::Dsl, true)
            .unwrap();
        let body =
            String::from_utf8(request.body().and_then(|b| b.as_bytes()).unwrap().to_vec()).unwrap();
        assert!(body.contains("xmlns:soapenv=\"http://schemas.xmlsoap.org/soap/envelope/\""));
        assert!(body.contains("<gs:street>Marienplatz</gs:street>"), "{body}");
        assert!(body.contains("<gs:plz>80331</gs:plz>"), "{body}");
        assert!(body.contains("<gs:countryCode>DE</gs:countryCode>"), "{body}");
    }

    const RESPONSE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
  <SOAP-ENV:Body>
    <ns2:Output xmlns:ns2="http://kabelwerk.example.com/gs">
      <products>
        <productId>17</productId>
        <providerName>Kabel Komfort</providerName>
        <productInfo>
          <speed>500</speed>
          <monthlyCostInCent>3499</monthlyCostInCent>
          <monthlyCostInCentFrom25thMonth>3999</monthlyCostInCentFrom25thMonth>
          <voucher>
            <percentageVoucher>
              <percentage>10</percentage>
              <maxDiscountInCent>1500</maxDiscountInCent>
            </percentageVoucher>
          </voucher>
          <contractDurationInMonths>24</contractDurationInMonths>
          <connectionType>CABLE</connectionType>
        </productInfo>
      </products>
    </ns2:Output>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;

    #[test]
    fn response_envelope_deserializes_with_namespace_prefixes() {
        let envelope: ResponseEnvelope = quick_xml::de::from_str(RESPONSE_XML).unwrap();
        assert_eq!(envelope.body.output.products.len(), 1);
        let product = &envelope.body.output.products[0];
        assert_eq!(product.product_id, 17);
        assert_eq!(product.provider_name, "Kabel Komfort");
        let info = product.product_info.as_ref().unwrap();
        assert_eq!(info.speed, 500);
        assert_eq!(info.connection_type, "CABLE");
    }

    #[test]
    fn soap_product_maps_to_canonical_product() {
        let envelope: ResponseEnvelope = quick_xml::de::from_str(RESPONSE_XML).unwrap();
        let product = KabelWerkAdapter::soap_product_to_product(
            &envelope.body.output.products[0],
            true,
        )
        .unwrap();
        assert_eq!(product.id, "KabelWerk-17.1");
        assert_eq!(product.name, "Kabel Komfort");
        assert!(product.pricing.installation_service_included);
        assert_eq!(
            product.pricing.subsequent_costs,
            Some(SubsequentCost {
                monthly_cost_in_cent: 3999,
                start_month: 25
            })
        );
        assert_eq!(
            product.pricing.percentage_discount,
            Some(PercentageDiscount {
                percentage: 10,
                duration_in_months: None,
                max_discount_in_cent: Some(1500),
            })
        );
    }

    #[test]
    fn missing_product_info_is_a_row_error() {
        let product = SoapProduct {
            product_id: 9,
            provider_name: "Kabel Leer".to_string(),
            product_info: None,
        };
        let result = KabelWerkAdapter::soap_product_to_product(&product, false);
        assert!(matches!(result, Err(ProviderError::Normalization { .. })));
    }

    #[test]
    fn absolute_voucher_with_min_order_value_maps_through() {
        let xml = r#"
<Envelope>
  <Body>
    <Output>
      <products>
        <productId>3</productId>
        <providerName>Kabel Start</providerName>
        <productInfo>
          <speed>100</speed>
          <monthlyCostInCent>1999</monthlyCostInCent>
          <monthlyCostInCentFrom25thMonth>2399</monthlyCostInCentFrom25thMonth>
          <voucher>
            <absoluteVoucher>
              <discountInCent>2500</discountInCent>
              <minOrderValueInCent>5000</minOrderValueInCent>
            </absoluteVoucher>
          </voucher>
          <contractDurationInMonths>12</contractDurationInMonths>
          <connectionType>DSL</connectionType>
        </productInfo>
      </products>
    </Output>
  </Body>
</Envelope>"#;
        let envelope: ResponseEnvelope = quick_xml::de::from_str(xml).unwrap();
        let product = KabelWerkAdapter::soap_product_to_product(
            &envelope.body.output.products[0],
            false,
        )
        .unwrap();
        assert_eq!(product.id, "KabelWerk-3.0");
        assert_eq!(
            product.pricing.absolute_discount,
            Some(AbsoluteDiscount {
                value_in_cent: 2500,
                min_order_value_in_cent: Some(5000),
            })
        );
    }
}
