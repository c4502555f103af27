//! Panic, reconciliation, loss supervision and idempotent command handling
//! against the wired container.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{aapl, alice, entry, harness_with, msft, open_paper_long, quote_around, test_config};
use execution_core::application::ports::{
    BrokerPort, Clock, CredentialStore, PanicRequest, PlaceOrderRequest,
};
use execution_core::application::services::IdempotencyError;
use execution_core::application::use_cases::MismatchKind;
use execution_core::config::Config;
use execution_core::domain::order_execution::{OrderSide, OrderStatus, TradingMode};
use execution_core::domain::shared::ClientOrderId;
use execution_core::domain::supervision::HaltReason;
use execution_core::domain::trade_lifecycle::{ExitReason, PositionState};
use rust_decimal_macros::dec;

fn live_config() -> Config {
    let mut config = test_config();
    config.accounts.live_users = vec!["alice".to_string()];
    config
}

fn panic_request(h: &common::Harness) -> PanicRequest {
    PanicRequest {
        reason: HaltReason::Manual,
        detail: "operator drill".to_string(),
        requested_at: h.container.clock.now(),
    }
}

#[tokio::test]
async fn panic_cancels_orders_flattens_and_revokes() {
    let h = harness_with(live_config());
    let trade = open_paper_long(&h, alice(), aapl(), dec!(100), dec!(10), dec!(95)).await;

    // A resting stop far below the market.
    h.broker
        .place_order(
            &alice(),
            PlaceOrderRequest::stop(
                ClientOrderId::new("resting-1"),
                msft(),
                OrderSide::Sell,
                dec!(5),
                dec!(50),
            ),
        )
        .await
        .unwrap();

    let report = h.container.panic.execute(panic_request(&h)).await.unwrap();

    assert!(!report.already_active);
    assert_eq!(report.users, 1);
    assert_eq!(report.orders_cancelled, 1);
    assert_eq!(report.exits_queued, 1);
    assert_eq!(report.exits_filled, 1);
    assert_eq!(report.credentials_revoked, 1);
    assert!(report.errors.is_empty(), "{:?}", report.errors);

    let closed = h.container.lifecycle.get(trade.id()).await.unwrap();
    assert_eq!(closed.state(), PositionState::Closed);
    assert_eq!(closed.exit_reason(), Some(ExitReason::Panic));
    assert!(h.container.credentials.active_users().await.unwrap().is_empty());
    assert!(h.broker.open_orders(&alice()).await.unwrap().is_empty());

    let guard = h.container.guard.snapshot().await.unwrap();
    assert_eq!(guard.emergency.map(|halt| halt.reason), Some(HaltReason::Manual));
}

#[tokio::test]
async fn second_panic_reports_already_active() {
    let h = harness_with(live_config());

    let first = h.container.panic.execute(panic_request(&h)).await.unwrap();
    let second = h.container.panic.execute(panic_request(&h)).await.unwrap();

    assert!(!first.already_active);
    assert!(second.already_active);
    assert_eq!(second.credentials_revoked, 0);
    assert_eq!(h.container.audit.events_with_action("executed").len(), 1);
}

#[tokio::test]
async fn entries_are_refused_during_emergency() {
    let h = harness_with(test_config());
    h.container.panic.execute(panic_request(&h)).await.unwrap();
    quote_around(&h, &aapl(), dec!(100));

    let report = h
        .container
        .engine
        .execute(entry(alice(), aapl(), dec!(1), dec!(95), TradingMode::Paper))
        .await
        .unwrap();

    assert_eq!(report.status, OrderStatus::Rejected);
    assert!(
        report
            .rejection_reason
            .as_deref()
            .is_some_and(|r| r.starts_with("EMERGENCY_HALT"))
    );

    // Cleared by an operator, entries flow again.
    assert!(h.container.guard.clear_emergency("ops").await.unwrap());
    let report = h
        .container
        .engine
        .execute(entry(alice(), aapl(), dec!(1), dec!(95), TradingMode::Paper))
        .await
        .unwrap();
    assert!(report.is_filled());
}

#[tokio::test]
async fn ghost_order_engages_safe_mode() {
    let h = harness_with(live_config());
    h.broker
        .place_order(
            &alice(),
            PlaceOrderRequest::stop(
                ClientOrderId::new("manual-at-broker"),
                aapl(),
                OrderSide::Sell,
                dec!(3),
                dec!(40),
            ),
        )
        .await
        .unwrap();

    let report = h.container.reconcile.execute().await.unwrap();
    assert_eq!(report.users_checked, 1);
    assert_eq!(report.count(MismatchKind::Ghost), 1);
    assert!(!report.is_clean());
    assert!(report.safe_mode_engaged);

    let guard = h.container.guard.snapshot().await.unwrap();
    let halt = guard.safe_mode.expect("safe mode engaged");
    assert_eq!(halt.reason, HaltReason::ReconciliationMismatch);
    assert!(guard.last_mismatch_reason.is_some());

    // The ghost is tracked now and is not reported again.
    let again = h.container.reconcile.execute().await.unwrap();
    assert_eq!(again.count(MismatchKind::Ghost), 0);
}

#[tokio::test]
async fn clean_reconciliation_records_timestamp() {
    let h = harness_with(live_config());

    let report = h.container.reconcile.execute().await.unwrap();

    assert!(report.is_clean());
    assert!(!report.safe_mode_engaged);
    let guard = h.container.guard.snapshot().await.unwrap();
    assert!(guard.safe_mode.is_none());
    assert!(guard.last_reconciled_at.is_some());
}

#[tokio::test]
async fn losing_streak_halts_entries() {
    let mut config = test_config();
    config.supervisor.max_consecutive_losses = 2;
    let h = harness_with(config);

    for symbol in [aapl(), msft()] {
        let trade = open_paper_long(&h, alice(), symbol.clone(), dec!(100), dec!(10), dec!(95)).await;
        quote_around(&h, &symbol, dec!(97));
        h.container
            .exits
            .enqueue(trade.id(), ExitReason::Manual)
            .await
            .unwrap();
    }

    let guard = h.container.guard.snapshot().await.unwrap();
    let halt = guard.safe_mode.expect("streak halts entries");
    assert_eq!(halt.reason, HaltReason::ConsecutiveLosses);
    assert_eq!(h.container.audit.events_with_action("limit_breached").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_commands_run_once() {
    let h = harness_with(test_config());
    let idempotency = Arc::clone(&h.container.idempotency);
    let runs = Arc::new(AtomicUsize::new(0));

    let calls = (0..4).map(|_| {
        let idempotency = Arc::clone(&idempotency);
        let runs = Arc::clone(&runs);
        tokio::spawn(async move {
            idempotency
                .execute(&alice(), Some("panic-1"), "flatten everything", || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, String>(42_u32)
                })
                .await
        })
    });
    let results = futures::future::join_all(calls).await;

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    let mut completed = 0;
    for result in results {
        match result.unwrap() {
            Ok(value) => {
                assert_eq!(value, 42);
                completed += 1;
            }
            Err(IdempotencyError::InProgress { .. }) => {}
            Err(e) => panic!("unexpected idempotency error: {e}"),
        }
    }
    assert!(completed >= 1);

    // Once finished, a retry replays the stored response.
    let replayed = idempotency
        .execute(&alice(), Some("panic-1"), "flatten everything", || async {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(0_u32)
        })
        .await
        .unwrap();
    assert_eq!(replayed, 42);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let mismatch = idempotency
        .execute(&alice(), Some("panic-1"), "something else", || async {
            Ok::<_, String>(0_u32)
        })
        .await;
    assert!(matches!(mismatch, Err(IdempotencyError::PayloadMismatch { .. })));
}
