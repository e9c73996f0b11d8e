use serde::{Deserialize, Serialize};

/// Country of the queried address.
///
/// The gateway only serves the DACH region; everything else is rejected at
/// the HTTP boundary. Individual providers may narrow this further (one
/// upstream only covers Germany) and respond to other countries with an
/// empty result rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountryCode {
    #[serde(rename = "DE")]
    De,
    #[serde(rename = "AT")]
    At,
    #[serde(rename = "CH")]
    Ch,
}

impl CountryCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CountryCode::De => "DE",
            CountryCode::At => "AT",
            CountryCode::Ch => "CH",
        }
    }
}

impl std::fmt::Display for CountryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CountryCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DE" => Ok(CountryCode::De),
            "AT" => Ok(CountryCode::At),
            "CH" => Ok(CountryCode::Ch),
            other => Err(format!("unsupported country code: {other}")),
        }
    }
}

/// Street address a query is run for.
///
/// All fields are free-form text. `house_number` may be empty — several
/// providers decline such queries and simply return nothing for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub house_number: String,
    pub city: String,
    pub postal_code: String,
    pub country_code: CountryCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_code_round_trips_through_serde() {
        let json = serde_json::to_string(&CountryCode::De).unwrap();
        assert_eq!(json, "\"DE\"");
        let back: CountryCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CountryCode::De);
    }

    #[test]
    fn country_code_rejects_unknown_values() {
        let result = serde_json::from_str::<CountryCode>("\"US\"");
        assert!(result.is_err(), "US must not deserialize");
    }

    #[test]
    fn address_serializes_camel_case() {
        let address = Address {
            street: "Marienplatz".to_string(),
            house_number: "1".to_string(),
            city: "München".to_string(),
            postal_code: "80331".to_string(),
            country_code: CountryCode::De,
        };
        let json = serde_json::to_value(&address).unwrap();
        assert_eq!(json["houseNumber"], "1");
        assert_eq!(json["postalCode"], "80331");
        assert_eq!(json["countryCode"], "DE");
    }
}
