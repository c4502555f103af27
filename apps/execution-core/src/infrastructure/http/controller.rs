//! HTTP Controller (Driver Adapter)
//!
//! Axum-based REST API that delegates to application use cases. Mutating
//! endpoints honour an `Idempotency-Key` header through the idempotency
//! guard: a retried request with the same key and body replays the first
//! response instead of running again.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
};
use serde::de::DeserializeOwned;

use crate::application::ports::PanicRequest;
use crate::application::use_cases::ExecuteOrderCommand;
use crate::domain::order_execution::{OrderIntentRepository, OrderPurpose};
use crate::domain::shared::{ClientOrderId, TradeId, UserId};
use crate::domain::supervision::{HaltReason, SystemGuardState};
use crate::domain::trade_lifecycle::ExitReason;
use crate::infrastructure::config::Container;

use super::error::ApiError;
use super::request::{OperatorRequest, PanicCommand, SubmitOrderRequest};
use super::response::{
    ClearResponse, ExitResponse, HealthResponse, OrderDetailResponse, ReconcileResponse,
    SubmitOrderResponse,
};

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the client's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Wired components.
    pub container: Arc<Container>,
    /// Application version.
    pub version: String,
}

impl AppState {
    /// State over a container, reporting this crate's version.
    #[must_use]
    pub fn new(container: Arc<Container>) -> Self {
        Self {
            container,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Create the HTTP router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/guard", get(guard_state))
        .route("/api/v1/orders", post(submit_order))
        .route("/api/v1/orders/{id}", get(get_order))
        .route("/api/v1/trades/{id}/exit", post(exit_trade))
        .route("/api/v1/panic", post(panic))
        .route("/api/v1/safe-mode/clear", post(clear_safe_mode))
        .route("/api/v1/emergency/clear", post(clear_emergency))
        .route("/api/v1/reconcile", post(reconcile))
        .with_state(state)
}

fn caller(headers: &HeaderMap) -> Result<UserId, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(UserId::new)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {USER_ID_HEADER} header")))
}

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Parse an optional JSON body; an empty body is the default value.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid body: {e}")))
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
    })
}

/// Safe mode, emergency mode and last reconciliation.
async fn guard_state(State(state): State<AppState>) -> Result<Json<SystemGuardState>, ApiError> {
    Ok(Json(state.container.guard.snapshot().await?))
}

/// Order entry.
async fn submit_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SubmitOrderRequest>,
) -> Result<Json<SubmitOrderResponse>, ApiError> {
    let user_id = caller(&headers)?;
    let key = idempotency_key(&headers);
    let command = request.into_command(user_id.clone(), state.container.config.execution.mode);

    let response = state
        .container
        .idempotency
        .execute(&user_id, key.as_deref(), &command, || {
            place_order(&state.container, command.clone())
        })
        .await?;
    Ok(Json(response))
}

/// Run the engine and, for a filled entry carrying a protective stop, open
/// the trade and put its stop in place.
async fn place_order(
    container: &Container,
    command: ExecuteOrderCommand,
) -> Result<SubmitOrderResponse, ApiError> {
    let protective_stop = command.protective_stop;
    let is_entry = command.purpose == OrderPurpose::Entry;

    let report = container.engine.execute(command).await?;

    let trade_id = match protective_stop {
        Some(stop) if is_entry && report.is_filled() => {
            let entry = container
                .engine
                .get(&report.client_order_id)
                .await?
                .ok_or_else(|| {
                    ApiError::Internal(format!("filled entry {} vanished", report.client_order_id))
                })?;
            let trade = container.lifecycle.open_from_fill(&entry, stop).await?;
            Some(trade.id().clone())
        }
        _ => None,
    };

    Ok(SubmitOrderResponse {
        order: report,
        trade_id,
    })
}

/// One of the caller's orders with its transition history.
async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<OrderDetailResponse>, ApiError> {
    let user_id = caller(&headers)?;
    let id = ClientOrderId::new(id);

    let order = state
        .container
        .orders
        .find(&id)
        .await?
        .filter(|o| o.user_id() == &user_id)
        .ok_or_else(|| ApiError::NotFound(format!("order not found: {id}")))?;
    let history = state.container.orders.history(&id).await?;

    Ok(Json(OrderDetailResponse { order, history }))
}

/// Queue a manual exit for one of the caller's trades.
async fn exit_trade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ExitResponse>, ApiError> {
    let user_id = caller(&headers)?;
    let key = idempotency_key(&headers);
    let trade_id = TradeId::new(id);
    let container = &state.container;

    let response = container
        .idempotency
        .execute(&user_id, key.as_deref(), &trade_id, || async {
            let trade = container.lifecycle.get(&trade_id).await?;
            if trade.user_id() != &user_id {
                return Err(ApiError::NotFound(format!("trade not found: {trade_id}")));
            }
            let report = container.exits.enqueue(&trade_id, ExitReason::Manual).await?;
            Ok(ExitResponse::from(report))
        })
        .await?;
    Ok(Json(response))
}

/// Operator emergency panic.
async fn panic(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<crate::application::use_cases::PanicReport>, ApiError> {
    let user_id = caller(&headers)?;
    let key = idempotency_key(&headers);
    let command: PanicCommand = optional_body(&body)?;
    let container = &state.container;

    let report = container
        .idempotency
        .execute(&user_id, key.as_deref(), &command, || async {
            let request = PanicRequest {
                reason: HaltReason::Manual,
                detail: command
                    .detail
                    .clone()
                    .unwrap_or_else(|| format!("operator panic by {user_id}")),
                requested_at: container.clock.now(),
            };
            Ok::<_, ApiError>(container.panic.execute(request).await?)
        })
        .await?;
    Ok(Json(report))
}

/// Lift safe mode.
async fn clear_safe_mode(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ClearResponse>, ApiError> {
    let user_id = caller(&headers)?;
    let request: OperatorRequest = optional_body(&body)?;
    let operator = request.operator.unwrap_or_else(|| user_id.to_string());

    let cleared = state.container.guard.clear_safe_mode(&operator).await?;
    Ok(Json(ClearResponse { cleared }))
}

/// Lift emergency mode.
async fn clear_emergency(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ClearResponse>, ApiError> {
    let user_id = caller(&headers)?;
    let request: OperatorRequest = optional_body(&body)?;
    let operator = request.operator.unwrap_or_else(|| user_id.to_string());

    let cleared = state.container.guard.clear_emergency(&operator).await?;
    Ok(Json(ClearResponse { cleared }))
}

/// Run reconciliation now.
async fn reconcile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ReconcileResponse>, ApiError> {
    caller(&headers)?;
    let report = state.container.reconcile.execute().await?;
    Ok(Json(ReconcileResponse {
        clean: report.is_clean(),
        report,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::infrastructure::clock::ManualClock;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        let (container, _rx) = Container::builder(Config::default())
            .clock(Arc::new(ManualClock::default()))
            .build();
        create_router(AppState::new(Arc::new(container)))
    }

    #[tokio::test]
    async fn health_check_returns_ok() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_user_header_is_bad_request() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/reconcile")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/orders/nope")
                    .header(USER_ID_HEADER, "u-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn empty_body_is_default() {
        let parsed: OperatorRequest = optional_body(&Bytes::from_static(b"  ")).unwrap();
        assert!(parsed.operator.is_none());
        assert!(optional_body::<OperatorRequest>(&Bytes::from_static(b"{")).is_err());
    }
}
