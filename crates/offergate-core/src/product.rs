//! Canonical internet product schema and its validation rules.
//!
//! Every provider adapter normalizes its upstream payload into
//! [`InternetProduct`]. The coordinator runs [`canonicalize`],
//! [`validate_required`] and [`validate_constraints`] over each product
//! before it reaches the output stream, so downstream consumers never see
//! a product that violates the documented invariants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Physical connection technology of an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionType {
    Dsl,
    Cable,
    Fiber,
    Mobile,
}

impl ConnectionType {
    /// Parses an upstream connection-type string (case-sensitive, upper case).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownConnectionType`] for any value
    /// outside the four recognized technologies.
    pub fn from_value(value: &str) -> Result<Self, ValidationError> {
        match value {
            "DSL" => Ok(ConnectionType::Dsl),
            "CABLE" => Ok(ConnectionType::Cable),
            "FIBER" => Ok(ConnectionType::Fiber),
            "MOBILE" => Ok(ConnectionType::Mobile),
            other => Err(ValidationError::UnknownConnectionType(other.to_string())),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionType::Dsl => "DSL",
            ConnectionType::Cable => "CABLE",
            ConnectionType::Fiber => "FIBER",
            ConnectionType::Mobile => "MOBILE",
        }
    }
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recurring price that replaces the base price from `start_month` on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsequentCost {
    pub monthly_cost_in_cent: i32,
    pub start_month: i32,
}

/// One-time discount in cents, optionally gated on a minimum order value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsoluteDiscount {
    pub value_in_cent: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_order_value_in_cent: Option<i32>,
}

/// Percentage discount on the monthly bill, optionally time- and cap-bounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentageDiscount {
    pub percentage: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_in_months: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_discount_in_cent: Option<i32>,
}

/// Technical characteristics of an offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInfo {
    /// Download speed in Mbit/s.
    pub speed: i32,
    pub connection_type: ConnectionType,
    /// Included TV package, when the offer bundles one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tv: Option<String>,
    /// Monthly unthrottled volume in MB; `None` means no throttling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unthrottled_capacity_mb: Option<i32>,
}

/// Pricing details of an offer. All monetary values are in euro cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    pub monthly_cost_in_cent: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_duration_in_months: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_contract_duration_in_months: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_age_in_years: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_in_years: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_order_value_in_cent: Option<i32>,
    #[serde(default)]
    pub installation_service_included: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsequent_costs: Option<SubsequentCost>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute_discount: Option<AbsoluteDiscount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage_discount: Option<PercentageDiscount>,
}

impl Default for Pricing {
    fn default() -> Self {
        Pricing {
            monthly_cost_in_cent: 0,
            contract_duration_in_months: None,
            min_contract_duration_in_months: None,
            min_age_in_years: None,
            max_age_in_years: None,
            min_order_value_in_cent: None,
            installation_service_included: false,
            subsequent_costs: None,
            absolute_discount: None,
            percentage_discount: None,
        }
    }
}

/// A normalized internet offer as produced by every provider adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternetProduct {
    /// Provider-scoped identifier; unique within `provider`.
    pub id: String,
    /// Canonical provider name, set by the adapter that produced the offer.
    pub provider: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// When the offer was observed. Adapters usually leave this unset and
    /// the coordinator stamps processing time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_offered: Option<DateTime<Utc>>,
    pub product_info: ProductInfo,
    pub pricing: Pricing,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unknown connection type: {0}")]
    UnknownConnectionType(String),

    #[error("constraint violation on {field}: {reason}")]
    Constraint { field: &'static str, reason: String },
}

/// Trims surrounding whitespace from the identity fields.
#[must_use]
pub fn canonicalize(mut product: InternetProduct) -> InternetProduct {
    product.id = product.id.trim().to_string();
    product.provider = product.provider.trim().to_string();
    product.name = product.name.trim().to_string();
    product.description = product.description.trim().to_string();
    product
}

/// Checks that every required field carries a value.
///
/// # Errors
///
/// Returns [`ValidationError::MissingField`] naming the first empty field.
pub fn validate_required(product: &InternetProduct) -> Result<(), ValidationError> {
    if product.id.is_empty() {
        return Err(ValidationError::MissingField("id"));
    }
    if product.provider.is_empty() {
        return Err(ValidationError::MissingField("provider"));
    }
    if product.name.is_empty() {
        return Err(ValidationError::MissingField("name"));
    }
    if product.date_offered.is_none() {
        return Err(ValidationError::MissingField("dateOffered"));
    }
    Ok(())
}

/// Checks numeric constraints: positive speed, non-negative prices and
/// non-negative optional fields.
///
/// # Errors
///
/// Returns [`ValidationError::Constraint`] naming the offending field.
pub fn validate_constraints(product: &InternetProduct) -> Result<(), ValidationError> {
    if product.product_info.speed <= 0 {
        return Err(ValidationError::Constraint {
            field: "speed",
            reason: format!("must be positive, got {}", product.product_info.speed),
        });
    }
    if product.pricing.monthly_cost_in_cent < 0 {
        return Err(ValidationError::Constraint {
            field: "monthlyCostInCent",
            reason: format!(
                "must be non-negative, got {}",
                product.pricing.monthly_cost_in_cent
            ),
        });
    }

    let non_negative: [(&'static str, Option<i32>); 6] = [
        ("contractDurationInMonths", product.pricing.contract_duration_in_months),
        (
            "minContractDurationInMonths",
            product.pricing.min_contract_duration_in_months,
        ),
        ("minAgeInYears", product.pricing.min_age_in_years),
        ("maxAgeInYears", product.pricing.max_age_in_years),
        ("minOrderValueInCent", product.pricing.min_order_value_in_cent),
        (
            "unthrottledCapacityMb",
            product.product_info.unthrottled_capacity_mb,
        ),
    ];
    for (field, value) in non_negative {
        if let Some(v) = value {
            if v < 0 {
                return Err(ValidationError::Constraint {
                    field,
                    reason: format!("must be non-negative, got {v}"),
                });
            }
        }
    }

    if let Some(sub) = &product.pricing.subsequent_costs {
        if sub.monthly_cost_in_cent < 0 {
            return Err(ValidationError::Constraint {
                field: "subsequentCosts.monthlyCostInCent",
                reason: format!("must be non-negative, got {}", sub.monthly_cost_in_cent),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_product() -> InternetProduct {
        InternetProduct {
            id: "offer-1".to_string(),
            provider: "ByteBlitz".to_string(),
            name: "Blitz 100".to_string(),
            description: String::new(),
            date_offered: Some(Utc::now()),
            product_info: ProductInfo {
                speed: 100,
                connection_type: ConnectionType::Fiber,
                tv: None,
                unthrottled_capacity_mb: None,
            },
            pricing: Pricing {
                monthly_cost_in_cent: 2999,
                ..Pricing::default()
            },
        }
    }

    #[test]
    fn connection_type_from_value_accepts_all_four() {
        for (raw, expected) in [
            ("DSL", ConnectionType::Dsl),
            ("CABLE", ConnectionType::Cable),
            ("FIBER", ConnectionType::Fiber),
            ("MOBILE", ConnectionType::Mobile),
        ] {
            assert_eq!(ConnectionType::from_value(raw).unwrap(), expected);
        }
    }

    #[test]
    fn connection_type_from_value_rejects_unknown() {
        let err = ConnectionType::from_value("CARRIER_PIGEON").unwrap_err();
        assert!(matches!(err, ValidationError::UnknownConnectionType(_)));
    }

    #[test]
    fn valid_product_passes_both_checks() {
        let product = sample_product();
        validate_required(&product).expect("required fields present");
        validate_constraints(&product).expect("constraints satisfied");
    }

    #[test]
    fn empty_id_fails_required_check() {
        let mut product = sample_product();
        product.id = String::new();
        assert_eq!(
            validate_required(&product),
            Err(ValidationError::MissingField("id"))
        );
    }

    #[test]
    fn unset_date_offered_fails_required_check() {
        let mut product = sample_product();
        product.date_offered = None;
        assert_eq!(
            validate_required(&product),
            Err(ValidationError::MissingField("dateOffered"))
        );
    }

    #[test]
    fn negative_speed_fails_constraint_check() {
        let mut product = sample_product();
        product.product_info.speed = -1;
        let err = validate_constraints(&product).unwrap_err();
        assert!(matches!(err, ValidationError::Constraint { field: "speed", .. }));
    }

    #[test]
    fn zero_speed_fails_constraint_check() {
        let mut product = sample_product();
        product.product_info.speed = 0;
        assert!(validate_constraints(&product).is_err());
    }

    #[test]
    fn negative_optional_field_fails_constraint_check() {
        let mut product = sample_product();
        product.pricing.max_age_in_years = Some(-5);
        let err = validate_constraints(&product).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Constraint {
                field: "maxAgeInYears",
                ..
            }
        ));
    }

    #[test]
    fn canonicalize_trims_identity_fields() {
        let mut product = sample_product();
        product.id = "  offer-1 ".to_string();
        product.name = "\tBlitz 100\n".to_string();
        let product = canonicalize(product);
        assert_eq!(product.id, "offer-1");
        assert_eq!(product.name, "Blitz 100");
    }

    #[test]
    fn product_round_trips_through_json() {
        let product = sample_product();
        let json = serde_json::to_string(&product).unwrap();
        let back: InternetProduct = serde_json::from_str(&json).unwrap();
        assert_eq!(back, product);
    }

    #[test]
    fn product_serializes_camel_case_wire_names() {
        let product = sample_product();
        let json = serde_json::to_value(&product).unwrap();
        assert!(json.get("productInfo").is_some());
        assert_eq!(json["pricing"]["monthlyCostInCent"], 2999);
        assert_eq!(json["productInfo"]["connectionType"], "FIBER");
    }
}
