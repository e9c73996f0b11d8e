mod products;
mod system;

use std::sync::Arc;

use axum::{
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use offergate_core::VersionInfo;

use crate::middleware::request_id;
use crate::queue::QueueService;

#[derive(Clone)]
pub struct AppState {
    pub queue_service: Arc<QueueService>,
    pub version: Arc<VersionInfo>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "bad_request" => StatusCode::BAD_REQUEST,
            "validation_error" => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ]);

    Router::new()
        .route("/internet-products", post(products::initiate_query))
        .route(
            "/internet-products/continue",
            get(products::continue_query),
        )
        .route(
            "/internet-products/share/{cursor}",
            post(products::share).get(products::get_shared),
        )
        .route("/health", get(system::health))
        .route("/version", get(system::version))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;
    use uuid::Uuid;

    use offergate_core::{ConnectionType, InternetProduct, Pricing, ProductInfo};
    use offergate_providers::adapters::stub::StaticAdapter;
    use offergate_providers::{ProviderAdapter, ProviderConfig, RequestCoordinator};

    use crate::queue::RESPONSE_VERSION;

    fn product(id: &str) -> InternetProduct {
        InternetProduct {
            id: id.to_string(),
            provider: "Static".to_string(),
            name: format!("Static {id}"),
            description: String::new(),
            date_offered: None,
            product_info: ProductInfo {
                speed: 50,
                connection_type: ConnectionType::Dsl,
                tv: None,
                unthrottled_capacity_mb: None,
            },
            pricing: Pricing {
                monthly_cost_in_cent: 999,
                ..Pricing::default()
            },
        }
    }

    fn test_app(products: Vec<InternetProduct>, delay: Duration) -> Router {
        let adapter: Arc<dyn ProviderAdapter> = Arc::new(StaticAdapter::new(products, delay));
        let provider = Arc::new(
            ProviderConfig::new(
                adapter,
                0,
                Duration::from_secs(1),
                1,
                Duration::from_millis(10),
            )
            .expect("client construction"),
        );
        let queue_service = Arc::new(QueueService::new(
            Arc::new(offergate_cache::MemoryCache::new("main-test")),
            Arc::new(offergate_cache::MemoryCache::new("queue-test")),
            Arc::new(RequestCoordinator::new(vec![provider])),
            10,
            10,
            Duration::from_secs(60),
        ));
        build_app(AppState {
            queue_service,
            version: Arc::new(VersionInfo::from_build_env()),
        })
    }

    fn valid_address() -> serde_json::Value {
        serde_json::json!({
            "street": "Marienplatz",
            "houseNumber": "1",
            "city": "München",
            "postalCode": "80331",
            "countryCode": "DE"
        })
    }

    fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn initiate_returns_a_cursor() {
        let app = test_app(vec![product("s-1")], Duration::ZERO);
        let response = app
            .oneshot(post_json("/internet-products", &valid_address()))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["version"], RESPONSE_VERSION);
        assert!(Uuid::parse_str(json["nextCursor"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn initiate_rejects_empty_street() {
        let app = test_app(vec![], Duration::ZERO);
        let mut address = valid_address();
        address["street"] = serde_json::json!("  ");
        let response = app
            .oneshot(post_json("/internet-products", &address))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "validation_error");
    }

    #[tokio::test]
    async fn initiate_rejects_unsupported_country() {
        let app = test_app(vec![], Duration::ZERO);
        let mut address = valid_address();
        address["countryCode"] = serde_json::json!("US");
        let response = app
            .oneshot(post_json("/internet-products", &address))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "validation_error");
        assert!(
            json["error"]["message"].as_str().unwrap().contains("US"),
            "message names the rejected code: {json}"
        );
        assert!(json["meta"]["request_id"].is_string(), "envelope meta present: {json}");
    }

    #[tokio::test]
    async fn initiate_rejects_missing_country() {
        let app = test_app(vec![], Duration::ZERO);
        let mut address = valid_address();
        address.as_object_mut().unwrap().remove("countryCode");
        let response = app
            .oneshot(post_json("/internet-products", &address))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "validation_error");
    }

    #[tokio::test]
    async fn continue_with_malformed_cursor_is_bad_request() {
        let app = test_app(vec![], Duration::ZERO);
        let response = app
            .oneshot(get_request("/internet-products/continue?cursor=not-a-uuid"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn continue_with_unknown_cursor_is_not_found() {
        let app = test_app(vec![], Duration::ZERO);
        let response = app
            .oneshot(get_request(&format!(
                "/internet-products/continue?cursor={}",
                Uuid::new_v4()
            )))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn continue_right_after_initiate_is_accepted_with_retry_hint() {
        // A slow provider keeps the root cursor in WIP state.
        let app = test_app(vec![product("s-1")], Duration::from_secs(2));
        let response = app
            .clone()
            .oneshot(post_json("/internet-products", &valid_address()))
            .await
            .expect("response");
        let cursor = body_json(response).await["nextCursor"]
            .as_str()
            .unwrap()
            .to_string();

        // Give the background task a moment to write the WIP root.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let response = app
            .oneshot(get_request(&format!(
                "/internet-products/continue?cursor={cursor}"
            )))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()["Retry-After"], "3");
    }

    #[tokio::test]
    async fn polling_eventually_returns_all_products_and_an_empty_cursor() {
        let app = test_app(vec![product("s-1"), product("s-2")], Duration::ZERO);
        let response = app
            .clone()
            .oneshot(post_json("/internet-products", &valid_address()))
            .await
            .expect("response");
        let mut cursor = body_json(response).await["nextCursor"]
            .as_str()
            .unwrap()
            .to_string();

        let mut products = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            assert!(
                tokio::time::Instant::now() < deadline,
                "query did not finish in time"
            );
            let response = app
                .clone()
                .oneshot(get_request(&format!(
                    "/internet-products/continue?cursor={cursor}"
                )))
                .await
                .expect("response");
            match response.status() {
                StatusCode::ACCEPTED => {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                StatusCode::OK => {
                    let json = body_json(response).await;
                    products.extend(
                        json["products"]
                            .as_array()
                            .unwrap()
                            .iter()
                            .map(|p| p["id"].as_str().unwrap().to_string()),
                    );
                    let next = json["nextCursor"].as_str().unwrap();
                    if next.is_empty() {
                        break;
                    }
                    cursor = next.to_string();
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                other => panic!("unexpected status {other}"),
            }
        }
        assert_eq!(products, ["s-1", "s-2"]);
    }

    #[tokio::test]
    async fn share_flow_round_trips_the_snapshot() {
        let app = test_app(vec![product("s-1")], Duration::ZERO);
        let response = app
            .clone()
            .oneshot(post_json("/internet-products", &valid_address()))
            .await
            .expect("response");
        let cursor = body_json(response).await["nextCursor"]
            .as_str()
            .unwrap()
            .to_string();

        // Share immediately: reserves a placeholder, so the shared fetch
        // stays 404 until the producer finishes.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(format!("/internet-products/share/{cursor}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let response = app
                .clone()
                .oneshot(get_request(&format!("/internet-products/share/{cursor}")))
                .await
                .expect("response");
            match response.status() {
                StatusCode::NOT_FOUND => {
                    assert!(
                        tokio::time::Instant::now() < deadline,
                        "snapshot never appeared"
                    );
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                StatusCode::OK => {
                    let json = body_json(response).await;
                    assert_eq!(json["version"], RESPONSE_VERSION);
                    assert_eq!(json["products"].as_array().unwrap().len(), 1);
                    assert_eq!(json["address"]["postalCode"], "80331");
                    break;
                }
                other => panic!("unexpected status {other}"),
            }
        }
    }

    #[tokio::test]
    async fn share_with_malformed_cursor_is_bad_request() {
        let app = test_app(vec![], Duration::ZERO);
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/internet-products/share/not-a-uuid")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let app = test_app(vec![], Duration::ZERO);
        let response = app
            .oneshot(get_request("/health"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn version_reports_build_information() {
        let app = test_app(vec![], Duration::ZERO);
        let response = app
            .oneshot(get_request("/version"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert!(json.get("buildDate").is_some());
        assert!(json.get("commitHash").is_some());
    }

    #[tokio::test]
    async fn responses_echo_the_request_id() {
        let app = test_app(vec![], Duration::ZERO);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.headers()["x-request-id"], "req-42");
    }
}
