//! Adapter implementations for the configured upstream providers.
//!
//! Each module speaks one wire protocol: CSV over a keyed GET, HMAC-signed
//! JSON, a two-stage listing→detail JSON API, a paginated free-text offer
//! DSL, and a SOAP/XML service. The `stub` adapter serves configured
//! products for local development and tests.

pub mod alpennet;
pub mod byteblitz;
pub mod kabelwerk;
pub mod netzpuls;
pub mod stub;
pub mod wortweit;
