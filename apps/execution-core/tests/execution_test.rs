//! Execution engine integration tests: risk gate, paper fills, live polling
//! and client-key deduplication, all through the wired container.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{aapl, alice, bob, entry, harness, harness_with, open_paper_long, quote_around, test_config};
use execution_core::domain::order_execution::{OrderIntentRepository, OrderStatus, TradingMode};
use execution_core::domain::shared::{ClientOrderId, Symbol};
use execution_core::domain::supervision::HaltReason;
use execution_core::domain::trade_lifecycle::{ExitReason, PositionState, StopAck};
use execution_core::infrastructure::broker::ScriptStep;
use execution_core::application::use_cases::AttemptReport;
use rust_decimal_macros::dec;

fn live_harness() -> common::Harness {
    let mut config = test_config();
    config.accounts.live_users = vec!["alice".to_string()];
    harness_with(config)
}

#[tokio::test]
async fn paper_entry_fills_at_mid_and_opens_protected_trade() {
    let h = harness();

    let trade = open_paper_long(&h, alice(), aapl(), dec!(100), dec!(10), dec!(95)).await;

    assert_eq!(trade.entry_price(), dec!(100));
    assert_eq!(trade.quantity(), dec!(10));
    assert_eq!(trade.state(), PositionState::Open);
    assert_eq!(trade.stop_ack(), StopAck::Acknowledged);
    assert_eq!(trade.open_risk(), dec!(50));
    // Paper trades never touch the broker.
    assert!(h.broker.placed_orders().is_empty());
}

#[tokio::test]
async fn portfolio_heat_over_ceiling_rejects_entry() {
    let mut config = test_config();
    config.risk.portfolio_heat_ceiling = dec!(0.03);
    let h = harness_with(config);

    // Open risk 2,000 on 100,000 equity.
    let msft = Symbol::new("MSFT");
    open_paper_long(&h, alice(), msft, dec!(100), dec!(100), dec!(80)).await;

    // New risk 1,500 would take heat to 3.5%.
    let nvda = Symbol::new("NVDA");
    quote_around(&h, &nvda, dec!(50));
    let report = h
        .container
        .engine
        .execute(entry(alice(), nvda.clone(), dec!(100), dec!(35.01), TradingMode::Paper))
        .await
        .unwrap();
    assert_eq!(report.status, OrderStatus::Rejected);
    assert!(
        report
            .rejection_reason
            .as_deref()
            .is_some_and(|r| r.starts_with("PORTFOLIO_HEAT")),
        "unexpected reason {:?}",
        report.rejection_reason
    );

    // New risk 1,000 lands exactly on the ceiling and passes.
    let report = h
        .container
        .engine
        .execute(entry(alice(), nvda, dec!(100), dec!(40.01), TradingMode::Paper))
        .await
        .unwrap();
    assert!(report.is_filled());
}

#[tokio::test]
async fn live_order_status_never_moves_backwards() {
    let h = live_harness();
    quote_around(&h, &aapl(), dec!(100));
    h.broker.script_next_order(vec![
        ScriptStep::partial(dec!(40), dec!(100.01)),
        // A stale report after the partial fill.
        ScriptStep::status(OrderStatus::Acked),
        ScriptStep::filled(dec!(100.02)),
    ]);

    let command = entry(alice(), aapl(), dec!(100), dec!(95), TradingMode::Live)
        .with_client_order_id(ClientOrderId::new("co-mono"));
    let report = h.container.engine.execute(command).await.unwrap();

    assert_eq!(report.status, OrderStatus::Filled);
    assert_eq!(report.filled_qty, dec!(100));
    assert_eq!(report.avg_price, Some(dec!(100.02)));

    let history = h
        .container
        .orders
        .history(&ClientOrderId::new("co-mono"))
        .await
        .unwrap();
    let states: Vec<String> = history.iter().map(|r| r.to_state.clone()).collect();
    assert_eq!(
        states,
        vec![
            OrderStatus::Sent.to_string(),
            OrderStatus::Acked.to_string(),
            OrderStatus::PartiallyFilled.to_string(),
            OrderStatus::Filled.to_string(),
        ]
    );
}

#[tokio::test]
async fn resubmitted_client_key_returns_stored_projection() {
    let h = live_harness();
    quote_around(&h, &aapl(), dec!(100));
    let command = entry(alice(), aapl(), dec!(5), dec!(95), TradingMode::Live)
        .with_client_order_id(ClientOrderId::new("co-dup"));

    let first = h.container.engine.execute(command.clone()).await.unwrap();
    let second = h.container.engine.execute(command).await.unwrap();

    assert!(first.is_filled());
    assert_eq!(first, second);
    assert_eq!(h.broker.placed_orders().len(), 1);
}

#[tokio::test]
async fn live_entry_without_credentials_is_rejected() {
    let h = live_harness();
    quote_around(&h, &aapl(), dec!(100));

    let report = h
        .container
        .engine
        .execute(entry(bob(), aapl(), dec!(5), dec!(95), TradingMode::Live))
        .await
        .unwrap();

    assert_eq!(report.status, OrderStatus::Rejected);
    assert!(
        report
            .rejection_reason
            .as_deref()
            .is_some_and(|r| r.starts_with("CREDENTIALS_REVOKED"))
    );
    assert!(h.broker.placed_orders().is_empty());
}

#[tokio::test]
async fn broker_rejection_is_recorded_on_the_intent() {
    let h = live_harness();
    quote_around(&h, &aapl(), dec!(100));
    h.broker.fail_next(
        "place_order",
        execution_core::application::ports::BrokerError::Rejected {
            reason: "insufficient buying power".to_string(),
        },
    );

    let report = h
        .container
        .engine
        .execute(entry(alice(), aapl(), dec!(5), dec!(95), TradingMode::Live))
        .await
        .unwrap();

    assert_eq!(report.status, OrderStatus::Rejected);
    assert!(
        report
            .rejection_reason
            .as_deref()
            .is_some_and(|r| r.contains("insufficient buying power"))
    );
}

#[tokio::test]
async fn safe_mode_blocks_entries_but_not_exits() {
    let h = harness();
    let trade = open_paper_long(&h, alice(), aapl(), dec!(100), dec!(10), dec!(95)).await;

    h.container
        .guard
        .enter_safe_mode(HaltReason::Manual, "maintenance")
        .await
        .unwrap();

    let report = h
        .container
        .engine
        .execute(entry(alice(), Symbol::new("MSFT"), dec!(1), dec!(90), TradingMode::Paper))
        .await
        .unwrap();
    assert_eq!(report.status, OrderStatus::Rejected);
    assert!(
        report
            .rejection_reason
            .as_deref()
            .is_some_and(|r| r.starts_with("SAFE_MODE"))
    );

    let exit = h
        .container
        .exits
        .enqueue(trade.id(), ExitReason::Manual)
        .await
        .unwrap();
    assert!(matches!(exit.attempt, Some(AttemptReport::Filled { .. })));

    let closed = h.container.lifecycle.get(trade.id()).await.unwrap();
    assert_eq!(closed.state(), PositionState::Closed);
}

#[tokio::test]
async fn paper_entry_without_quote_is_rejected() {
    let h = harness();

    let report = h
        .container
        .engine
        .execute(entry(alice(), aapl(), dec!(5), dec!(95), TradingMode::Paper))
        .await
        .unwrap();

    assert_eq!(report.status, OrderStatus::Rejected);
    assert!(report.rejection_reason.is_some());
}
