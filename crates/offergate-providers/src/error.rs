use offergate_core::ValidationError;
use thiserror::Error;

use crate::adapters::wortweit::ParseError;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error from {provider}: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected HTTP status {status} from {provider}")]
    UnexpectedStatus { provider: &'static str, status: u16 },

    #[error("rate limited by {provider} after {attempts} attempts")]
    RateLimited {
        provider: &'static str,
        attempts: u32,
    },

    #[error("JSON deserialization error from {provider} ({context}): {source}")]
    Json {
        provider: &'static str,
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("CSV deserialization error from {provider}: {source}")]
    Csv {
        provider: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("XML deserialization error from {provider}: {source}")]
    Xml {
        provider: &'static str,
        #[source]
        source: quick_xml::DeError,
    },

    #[error("XML serialization error for {provider}: {source}")]
    XmlEncode {
        provider: &'static str,
        #[source]
        source: quick_xml::SeError,
    },

    #[error("offer description from {provider} could not be parsed: {source}")]
    Description {
        provider: &'static str,
        #[source]
        source: ParseError,
    },

    #[error("invalid offer from {provider} ({id}): {reason}")]
    Normalization {
        provider: &'static str,
        id: String,
        reason: String,
    },

    #[error("invalid product from {provider}: {source}")]
    Validation {
        provider: String,
        #[source]
        source: ValidationError,
    },

    #[error("request for {provider} cannot be retried (streaming body)")]
    RequestNotCloneable { provider: &'static str },

    #[error("environment variable {0} is required and cannot be empty")]
    MissingEnv(String),

    #[error("invalid options for provider {provider}: {reason}")]
    Options {
        provider: String,
        reason: String,
    },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}
