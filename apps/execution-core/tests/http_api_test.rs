//! HTTP API tests: requests go through the router with `oneshot`, no socket.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use common::{Harness, aapl, harness, quote_around};
use execution_core::infrastructure::http::{
    AppState, IDEMPOTENCY_KEY_HEADER, USER_ID_HEADER, create_router,
};
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use tower::ServiceExt;

fn app(h: &Harness) -> Router {
    create_router(AppState::new(Arc::clone(&h.container)))
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<&str>,
    key: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header(USER_ID_HEADER, user);
    }
    if let Some(key) = key {
        request = request.header(IDEMPOTENCY_KEY_HEADER, key);
    }
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn paper_entry(quantity: &str) -> Value {
    json!({
        "symbol": "AAPL",
        "side": "BUY",
        "quantity": quantity,
        "protective_stop": "95",
        "mode": "PAPER",
    })
}

/// Submit a paper entry for alice and return the response body.
async fn submit_entry(app: &Router, key: &str) -> Value {
    let (status, body) = call(
        app,
        "POST",
        "/api/v1/orders",
        Some("alice"),
        Some(key),
        Some(paper_entry("10")),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

#[tokio::test]
async fn filled_entry_opens_trade_and_replays_by_key() {
    let h = harness();
    quote_around(&h, &aapl(), dec!(100));
    let app = app(&h);

    let first = submit_entry(&app, "entry-1").await;
    assert_eq!(first["order"]["status"], "filled");
    assert!(first["trade_id"].is_string());

    let replay = submit_entry(&app, "entry-1").await;
    assert_eq!(replay, first);
    assert_eq!(h.container.trades.all().len(), 1);

    let (status, _) = call(
        &app,
        "POST",
        "/api/v1/orders",
        Some("alice"),
        Some("entry-1"),
        Some(paper_entry("11")),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn orders_are_visible_only_to_their_owner() {
    let h = harness();
    quote_around(&h, &aapl(), dec!(100));
    let app = app(&h);
    let submitted = submit_entry(&app, "entry-2").await;
    let order_id = submitted["order"]["client_order_id"].as_str().unwrap();
    let uri = format!("/api/v1/orders/{order_id}");

    let (status, body) = call(&app, "GET", &uri, Some("alice"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], "filled");
    assert!(!body["history"].as_array().unwrap().is_empty());

    let (status, _) = call(&app, "GET", &uri, Some("bob"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn manual_exit_closes_the_callers_trade() {
    let h = harness();
    quote_around(&h, &aapl(), dec!(100));
    let app = app(&h);
    let submitted = submit_entry(&app, "entry-3").await;
    let trade_id = submitted["trade_id"].as_str().unwrap();
    let uri = format!("/api/v1/trades/{trade_id}/exit");

    let (status, _) = call(&app, "POST", &uri, Some("bob"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    quote_around(&h, &aapl(), dec!(102));
    let (status, body) = call(&app, "POST", &uri, Some("alice"), Some("exit-1"), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["created"], true);
    assert!(body["outcome"].as_str().unwrap().starts_with("filled at"));

    let trade = h
        .container
        .lifecycle
        .get(&execution_core::TradeId::new(trade_id))
        .await
        .unwrap();
    assert_eq!(trade.realized_pnl(), Some(dec!(20)));
}

#[tokio::test]
async fn panic_then_operator_clears_emergency() {
    let h = harness();
    let app = app(&h);

    let (status, report) = call(
        &app,
        "POST",
        "/api/v1/panic",
        Some("ops"),
        Some("panic-1"),
        Some(json!({ "detail": "drill" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["already_active"], false);

    let (_, guard) = call(&app, "GET", "/api/v1/guard", None, None, None).await;
    assert_eq!(guard["emergency"]["detail"], "drill");

    // Replayed by key rather than reported as already active.
    let (_, replay) = call(
        &app,
        "POST",
        "/api/v1/panic",
        Some("ops"),
        Some("panic-1"),
        Some(json!({ "detail": "drill" })),
    )
    .await;
    assert_eq!(replay, report);

    let (status, cleared) = call(&app, "POST", "/api/v1/emergency/clear", Some("ops"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["cleared"], true);

    let (_, guard) = call(&app, "GET", "/api/v1/guard", None, None, None).await;
    assert!(guard["emergency"].is_null());

    let (_, cleared) = call(
        &app,
        "POST",
        "/api/v1/emergency/clear",
        Some("ops"),
        None,
        Some(json!({ "operator": "night-shift" })),
    )
    .await;
    assert_eq!(cleared["cleared"], false);
}

#[tokio::test]
async fn safe_mode_clear_reports_whether_anything_changed() {
    let h = harness();
    let app = app(&h);

    let (_, cleared) = call(&app, "POST", "/api/v1/safe-mode/clear", Some("ops"), None, None).await;
    assert_eq!(cleared["cleared"], false);

    h.container
        .guard
        .enter_safe_mode(execution_core::domain::supervision::HaltReason::Manual, "drill")
        .await
        .unwrap();
    let (_, cleared) = call(&app, "POST", "/api/v1/safe-mode/clear", Some("ops"), None, None).await;
    assert_eq!(cleared["cleared"], true);
}

#[tokio::test]
async fn reconcile_endpoint_reports_clean_state() {
    let h = harness();
    let app = app(&h);

    let (status, body) = call(&app, "POST", "/api/v1/reconcile", Some("ops"), None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["clean"], true);
    assert_eq!(body["report"]["users_checked"], 0);
}
