//! Parser for WortWeit's free-text offer descriptions.
//!
//! The upstream describes each offer as a sequence of German marketing
//! sentences. The parser is a greedy multi-pattern matcher: a fixed rule
//! set of regexes, each paired with a handler that extracts structured
//! data. Every pattern may match at most once; matched spans are excised
//! from the text, and whatever survives all rules must be whitespace —
//! an unrecognized sentence is an error, never silently ignored, so new
//! upstream sentence shapes surface immediately instead of dropping data.
//!
//! Patterns are compiled case-insensitively and literal spaces are widened
//! to `\s+`, since the upstream is sloppy about whitespace. Unit-bearing
//! values (speed, capacity, contract duration) are captured as
//! `(value, unit)` pairs and normalized by the adapter.

use regex::{Captures, Regex};
use thiserror::Error;

use offergate_core::units::CENTS_PER_EURO;
use offergate_core::{AbsoluteDiscount, ConnectionType, PercentageDiscount, SubsequentCost};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("pattern matched more than once: {pattern}")]
    MultipleMatches { pattern: String },

    #[error("description has unmatched residue: {residue:?}")]
    UnmatchedResidue { residue: String },

    #[error("could not parse {field}: {reason}")]
    Number { field: &'static str, reason: String },

    #[error("unknown connection type in description: {0}")]
    ConnectionType(String),
}

/// A numeric value together with its literal unit text, e.g. `(250, "Mbit/s")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitValue {
    pub value: i32,
    pub unit: String,
}

/// Structured facts extracted from one description.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OfferFacts {
    pub price_in_euro: Option<i32>,
    pub connection_type: Option<ConnectionType>,
    pub speed: Option<UnitValue>,
    pub min_contract_duration: Option<UnitValue>,
    pub percentage_discount: Option<PercentageDiscount>,
    pub absolute_discount: Option<AbsoluteDiscount>,
    pub subsequent_cost: Option<SubsequentCost>,
    pub unthrottled_capacity: Option<UnitValue>,
    pub tv_channels: Option<String>,
    pub max_age: Option<i32>,
    pub min_age: Option<i32>,
    pub min_order_value_in_euro: Option<i32>,
    pub installation_included: bool,
}

type Handler = fn(&Captures<'_>, &mut OfferFacts) -> Result<(), ParseError>;

pub struct DescriptionParser {
    rules: Vec<(Regex, Handler)>,
}

impl Default for DescriptionParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptionParser {
    #[must_use]
    pub fn new() -> Self {
        let raw_rules: Vec<(&str, Handler)> = vec![
            (
                r"Für nur (\d+)€ im Monat erhalten Sie eine ([a-zA-Z]+)-Verbindung mit einer Geschwindigkeit von (\d+) ([a-zA-Z/]+)\.",
                handle_price_type_and_speed,
            ),
            (
                r"Bitte beachten Sie, dass die Mindestvertragslaufzeit (\d+) ([a-zA-Z]+) beträgt\.",
                handle_min_contract_duration,
            ),
            (
                r"Mit diesem Angebot erhalten Sie einen Rabatt von (\d+)% auf Ihre monatliche Rechnung bis zum (\d+)\. Monat\.\s*(Der maximale Rabatt beträgt (\d+)€\.)?",
                handle_percentage_discount,
            ),
            (
                r"Ab dem (\d+)\. Monat beträgt der monatliche Preis (\d+)€\.",
                handle_subsequent_cost,
            ),
            (
                r"Ab (\d+)([a-zA-Z]+) pro Monat wird die Geschwindigkeit gedrosselt\.",
                handle_unthrottled_capacity,
            ),
            (r"Zögern Sie nicht und schlagen Sie jetzt zu!", handle_no_op),
            (
                r"Dieses einzigartige Angebot ist der perfekte Match für Sie\.",
                handle_no_op,
            ),
            (
                r"Zusätzlich sind folgende Fernsehsender enthalten ([\w\+]+)\.",
                handle_tv_channels,
            ),
            (
                r"Dieses Angebot ist nur für Personen unter (\d+) Jahren verfügbar\.",
                handle_max_age,
            ),
            (
                r"Dieses Angebot ist nur für Personen über (\d+) Jahren verfügbar\.",
                handle_min_age,
            ),
            (
                r"Mit diesem Angebot erhalten Sie einen einmaligen Rabatt von (\d+)€ auf Ihre monatliche Rechnung\.",
                handle_absolute_discount,
            ),
            (r"Der Mindestbestellwert beträgt (\d+)€\.", handle_min_order_value),
            (
                r"Unsere Techniker kümmern sich um die Installation\.",
                handle_installation,
            ),
        ];

        let rules = raw_rules
            .into_iter()
            .map(|(pattern, handler)| {
                let widened = format!("(?i){}", pattern.replace(' ', r"\s+"));
                let regex = Regex::new(&widened).expect("rule patterns are statically valid");
                (regex, handler)
            })
            .collect();

        DescriptionParser { rules }
    }

    /// Decomposes a description into [`OfferFacts`].
    ///
    /// # Errors
    ///
    /// - [`ParseError::MultipleMatches`] when any pattern matches twice.
    /// - [`ParseError::UnmatchedResidue`] when unrecognized text remains.
    /// - Handler errors for malformed numeric captures.
    pub fn parse(&self, description: &str) -> Result<OfferFacts, ParseError> {
        let mut facts = OfferFacts::default();
        let mut remaining = description.to_string();

        for (regex, handler) in &self.rules {
            let mut matches = regex.find_iter(&remaining);
            let Some(found) = matches.next() else {
                continue;
            };
            if matches.next().is_some() {
                return Err(ParseError::MultipleMatches {
                    pattern: regex.as_str().to_string(),
                });
            }

            let range = found.range();
            let captures = regex
                .captures(&remaining[range.clone()])
                .expect("find already proved a match");
            handler(&captures, &mut facts)?;

            remaining.replace_range(range, "");
        }

        if !remaining.trim().is_empty() {
            return Err(ParseError::UnmatchedResidue {
                residue: remaining.trim().to_string(),
            });
        }

        Ok(facts)
    }
}

fn capture_i32(captures: &Captures<'_>, index: usize, field: &'static str) -> Result<i32, ParseError> {
    let raw = captures
        .get(index)
        .ok_or_else(|| ParseError::Number {
            field,
            reason: format!("capture group {index} is missing"),
        })?
        .as_str();
    raw.parse::<i32>().map_err(|e| ParseError::Number {
        field,
        reason: format!("{raw:?}: {e}"),
    })
}

fn capture_unit_value(
    captures: &Captures<'_>,
    value_index: usize,
    unit_index: usize,
    field: &'static str,
) -> Result<UnitValue, ParseError> {
    Ok(UnitValue {
        value: capture_i32(captures, value_index, field)?,
        unit: captures
            .get(unit_index)
            .ok_or_else(|| ParseError::Number {
                field,
                reason: format!("unit capture group {unit_index} is missing"),
            })?
            .as_str()
            .to_string(),
    })
}

fn handle_no_op(_: &Captures<'_>, _: &mut OfferFacts) -> Result<(), ParseError> {
    Ok(())
}

fn handle_price_type_and_speed(
    captures: &Captures<'_>,
    facts: &mut OfferFacts,
) -> Result<(), ParseError> {
    facts.price_in_euro = Some(capture_i32(captures, 1, "price")?);
    let raw_type = captures
        .get(2)
        .ok_or_else(|| ParseError::Number {
            field: "connection type",
            reason: "capture group 2 is missing".to_string(),
        })?
        .as_str();
    facts.connection_type = Some(
        ConnectionType::from_value(&raw_type.to_uppercase())
            .map_err(|_| ParseError::ConnectionType(raw_type.to_string()))?,
    );
    facts.speed = Some(capture_unit_value(captures, 3, 4, "speed")?);
    Ok(())
}

fn handle_min_contract_duration(
    captures: &Captures<'_>,
    facts: &mut OfferFacts,
) -> Result<(), ParseError> {
    facts.min_contract_duration = Some(capture_unit_value(
        captures,
        1,
        2,
        "minimal contract duration",
    )?);
    Ok(())
}

fn handle_percentage_discount(
    captures: &Captures<'_>,
    facts: &mut OfferFacts,
) -> Result<(), ParseError> {
    let percentage = capture_i32(captures, 1, "percentage discount")?;
    let duration = capture_i32(captures, 2, "percentage discount duration")?;
    let max_discount_in_cent = match captures.get(4) {
        Some(_) => Some(capture_i32(captures, 4, "max discount")? * CENTS_PER_EURO),
        None => None,
    };
    facts.percentage_discount = Some(PercentageDiscount {
        percentage,
        duration_in_months: Some(duration),
        max_discount_in_cent,
    });
    Ok(())
}

fn handle_subsequent_cost(
    captures: &Captures<'_>,
    facts: &mut OfferFacts,
) -> Result<(), ParseError> {
    let start_month = capture_i32(captures, 1, "subsequent cost start month")?;
    let monthly_cost = capture_i32(captures, 2, "subsequent cost")?;
    facts.subsequent_cost = Some(SubsequentCost {
        monthly_cost_in_cent: monthly_cost * CENTS_PER_EURO,
        start_month,
    });
    Ok(())
}

fn handle_unthrottled_capacity(
    captures: &Captures<'_>,
    facts: &mut OfferFacts,
) -> Result<(), ParseError> {
    facts.unthrottled_capacity = Some(capture_unit_value(
        captures,
        1,
        2,
        "unthrottled capacity",
    )?);
    Ok(())
}

fn handle_tv_channels(captures: &Captures<'_>, facts: &mut OfferFacts) -> Result<(), ParseError> {
    facts.tv_channels = captures.get(1).map(|m| m.as_str().to_string());
    Ok(())
}

fn handle_max_age(captures: &Captures<'_>, facts: &mut OfferFacts) -> Result<(), ParseError> {
    facts.max_age = Some(capture_i32(captures, 1, "max age")?);
    Ok(())
}

fn handle_min_age(captures: &Captures<'_>, facts: &mut OfferFacts) -> Result<(), ParseError> {
    facts.min_age = Some(capture_i32(captures, 1, "min age")?);
    Ok(())
}

fn handle_absolute_discount(
    captures: &Captures<'_>,
    facts: &mut OfferFacts,
) -> Result<(), ParseError> {
    facts.absolute_discount = Some(AbsoluteDiscount {
        value_in_cent: capture_i32(captures, 1, "one-time discount")? * CENTS_PER_EURO,
        min_order_value_in_cent: None,
    });
    Ok(())
}

fn handle_min_order_value(
    captures: &Captures<'_>,
    facts: &mut OfferFacts,
) -> Result<(), ParseError> {
    facts.min_order_value_in_euro = Some(capture_i32(captures, 1, "min order value")?);
    Ok(())
}

fn handle_installation(_: &Captures<'_>, facts: &mut OfferFacts) -> Result<(), ParseError> {
    facts.installation_included = true;
    Ok(())
}
