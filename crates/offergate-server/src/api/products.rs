//! Handlers for the internet-products endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;

use offergate_core::{Address, CountryCode};

use crate::api::{ApiError, AppState};
use crate::middleware::RequestId;
use crate::queue::{ContinueOutcome, ShareOutcome, SharedFetchOutcome};

/// Seconds a client should wait before polling a work-in-progress cursor again.
const RETRY_AFTER_SECS: &str = "3";

/// Wire-level address body. Every field arrives as free-form text so that
/// an unsupported country fails in [`validate_address`] and renders through
/// the [`ApiError`] envelope like every other field error, instead of dying
/// inside the `Json` extractor. Missing fields default to empty and fall
/// into the same validation path.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AddressPayload {
    #[serde(default)]
    street: String,
    #[serde(default)]
    house_number: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    postal_code: String,
    #[serde(default)]
    country_code: String,
}

/// `POST /internet-products` — validates the address and hands it to the
/// queue service. Always answers with a cursor; provider failures surface
/// later through the error log, never through this endpoint.
pub(super) async fn initiate_query(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(payload): Json<AddressPayload>,
) -> Response {
    let address = match validate_address(payload) {
        Ok(address) => address,
        Err(message) => {
            return ApiError::new(req_id.0, "validation_error", message).into_response();
        }
    };

    let cursor = state.queue_service.initiate_query(address);
    (StatusCode::OK, Json(cursor)).into_response()
}

/// Field-level validation at the HTTP boundary: all free-form fields must
/// be non-empty and the country must be one of the served codes.
fn validate_address(payload: AddressPayload) -> Result<Address, String> {
    for (field, value) in [
        ("street", &payload.street),
        ("houseNumber", &payload.house_number),
        ("city", &payload.city),
        ("postalCode", &payload.postal_code),
    ] {
        if value.trim().is_empty() {
            return Err(format!("address field must not be empty: {field}"));
        }
    }

    let country_code: CountryCode = payload.country_code.parse()?;

    Ok(Address {
        street: payload.street,
        house_number: payload.house_number,
        city: payload.city,
        postal_code: payload.postal_code,
        country_code,
    })
}

#[derive(Debug, Deserialize)]
pub(super) struct ContinueParams {
    cursor: String,
}

/// `GET /internet-products/continue?cursor=<uuid>`.
pub(super) async fn continue_query(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(params): Query<ContinueParams>,
) -> Response {
    match state.queue_service.continue_query(&params.cursor).await {
        Ok(ContinueOutcome::Ready(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(ContinueOutcome::Pending) => {
            let mut response = StatusCode::ACCEPTED.into_response();
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from_static(RETRY_AFTER_SECS));
            response
        }
        Ok(ContinueOutcome::NotFound) => {
            ApiError::new(req_id.0, "not_found", "products not found").into_response()
        }
        Ok(ContinueOutcome::BadCursor) => {
            ApiError::new(req_id.0, "bad_request", "invalid cursor").into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "queue store failed during continue");
            ApiError::new(req_id.0, "internal_error", "cache unavailable").into_response()
        }
    }
}

/// `POST /internet-products/share/{cursor}` — idempotent.
pub(super) async fn share(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(cursor): Path<String>,
) -> Response {
    match state.queue_service.share(&cursor).await {
        Ok(ShareOutcome::Ok) => StatusCode::OK.into_response(),
        Ok(ShareOutcome::BadCursor) => {
            ApiError::new(req_id.0, "bad_request", "invalid cursor").into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "snapshot store failed during share");
            ApiError::new(req_id.0, "internal_error", "cache unavailable").into_response()
        }
    }
}

/// `GET /internet-products/share/{cursor}`.
pub(super) async fn get_shared(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(cursor): Path<String>,
) -> Response {
    match state.queue_service.get_shared(&cursor).await {
        Ok(SharedFetchOutcome::Found(snapshot)) => {
            (StatusCode::OK, Json(snapshot)).into_response()
        }
        Ok(SharedFetchOutcome::NotFound) => {
            ApiError::new(req_id.0, "not_found", "products not found").into_response()
        }
        Ok(SharedFetchOutcome::BadCursor) => {
            ApiError::new(req_id.0, "bad_request", "invalid cursor").into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "snapshot store failed during fetch");
            ApiError::new(req_id.0, "internal_error", "cache unavailable").into_response()
        }
    }
}
