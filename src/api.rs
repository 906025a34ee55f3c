//! HTTP readout of the books.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::registry::BookRegistry;
use crate::service::{BookSnapshot, LevelView, OrderBookService};

pub const SERVICE_NAME: &str = "orderbook-service";

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Envelope for every `/orderbook` response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: now(),
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn unknown_symbol(symbol: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("unknown symbol {symbol}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SymbolQuery {
    pub symbol: Option<String>,
}

/// Build the router. Every `/orderbook` route takes an optional
/// `?symbol=` and falls back to the registry's default symbol.
pub fn router(registry: Arc<BookRegistry>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/orderbook/snapshot", get(snapshot))
        .route("/orderbook/bids/top", get(top_bids))
        .route("/orderbook/asks/top", get(top_asks))
        .route("/orderbook/bid/top", get(best_bid))
        .route("/orderbook/ask/top", get(best_ask))
        .with_state(registry)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "healthy",
        service: SERVICE_NAME,
        timestamp: now(),
    })
}

fn with_book<T>(
    registry: &BookRegistry,
    query: &SymbolQuery,
    f: impl FnOnce(&OrderBookService) -> T,
) -> ApiResult<T> {
    let symbol = query.symbol.as_deref().unwrap_or(registry.default_symbol());
    let book = registry
        .get(symbol)
        .ok_or_else(|| ApiError::unknown_symbol(symbol))?;
    debug!(symbol, "serving book query");
    let data = f(&*book.lock());
    Ok(Json(ApiResponse::success(data)))
}

async fn snapshot(
    State(registry): State<Arc<BookRegistry>>,
    Query(query): Query<SymbolQuery>,
) -> ApiResult<BookSnapshot> {
    with_book(&registry, &query, OrderBookService::snapshot)
}

async fn top_bids(
    State(registry): State<Arc<BookRegistry>>,
    Query(query): Query<SymbolQuery>,
) -> ApiResult<Vec<LevelView>> {
    with_book(&registry, &query, |svc| {
        svc.top_bids().iter().map(LevelView::from).collect()
    })
}

async fn top_asks(
    State(registry): State<Arc<BookRegistry>>,
    Query(query): Query<SymbolQuery>,
) -> ApiResult<Vec<LevelView>> {
    with_book(&registry, &query, |svc| {
        svc.top_asks().iter().map(LevelView::from).collect()
    })
}

async fn best_bid(
    State(registry): State<Arc<BookRegistry>>,
    Query(query): Query<SymbolQuery>,
) -> ApiResult<Option<LevelView>> {
    with_book(&registry, &query, |svc| svc.best_bid().as_ref().map(LevelView::from))
}

async fn best_ask(
    State(registry): State<Arc<BookRegistry>>,
    Query(query): Query<SymbolQuery>,
) -> ApiResult<Option<LevelView>> {
    with_book(&registry, &query, |svc| svc.best_ask().as_ref().map(LevelView::from))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use rust_decimal_macros::dec;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::config::ServiceConfig;
    use crate::ws::events::{BookKind, BookLevel, BookUpdate};

    fn registry() -> Arc<BookRegistry> {
        let reg = BookRegistry::new(ServiceConfig::default(), &["ETH/USD".to_string()]);
        reg.apply(
            BookKind::Snapshot,
            &BookUpdate {
                symbol: Some("ETH/USD".into()),
                bids: vec![
                    BookLevel { price: dec!(100), qty: dec!(2) },
                    BookLevel { price: dec!(99), qty: dec!(5) },
                ],
                asks: vec![BookLevel { price: dec!(101), qty: dec!(3) }],
                ..Default::default()
            },
        );
        Arc::new(reg)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_reports_service() {
        let (status, body) = get_json(router(registry()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], SERVICE_NAME);
    }

    #[tokio::test]
    async fn snapshot_is_wrapped_in_envelope() {
        let (status, body) = get_json(router(registry()), "/orderbook/snapshot").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["timestamp"].is_string());
        assert!(body.get("error").is_none());
        assert_eq!(body["data"]["symbol"], "ETH/USD");
        assert_eq!(body["data"]["bids"][0]["price"], "100");
        assert_eq!(body["data"]["bids"][1]["price"], "99");
    }

    #[tokio::test]
    async fn top_of_book_routes() {
        let app = router(registry());
        let (_, bid) = get_json(app.clone(), "/orderbook/bid/top").await;
        assert_eq!(bid["data"], serde_json::json!({"price": "100", "quantity": "2"}));

        let (_, ask) = get_json(app.clone(), "/orderbook/ask/top?symbol=ETH/USD").await;
        assert_eq!(ask["data"]["price"], "101");

        let (_, asks) = get_json(app, "/orderbook/asks/top").await;
        assert_eq!(asks["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_side_gives_null_data() {
        let reg = Arc::new(BookRegistry::new(ServiceConfig::default(), &["BTC/USD".to_string()]));
        let (status, body) = get_json(router(reg), "/orderbook/bid/top").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn unknown_symbol_is_not_found() {
        let (status, body) =
            get_json(router(registry()), "/orderbook/bids/top?symbol=DOGE%2FUSD").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "unknown symbol DOGE/USD");
    }
}
