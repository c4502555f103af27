//! Protective stop enforcement, paper stop hits and exit retries, driven
//! through the wired container with a manual clock.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    Harness, aapl, alice, entry, harness_customized, harness_with, open_paper_long, quote_around,
    test_config,
};
use execution_core::application::ports::{BrokerError, BrokerPort, Clock, PanicRequest};
use execution_core::application::use_cases::AttemptReport;
use execution_core::config::Config;
use execution_core::domain::exit_retry::{EnqueueOutcome, ExitRetryRepository, ExitRetryRequest};
use execution_core::domain::order_execution::{OrderSide, OrderStatus, TradingMode};
use execution_core::domain::shared::{ExitRetryId, RepositoryError, TradeId};
use execution_core::domain::supervision::{FailureMode, HaltReason};
use execution_core::domain::trade_lifecycle::{
    ExitReason, PositionState, StopAck, Trade, TradeRepository,
};
use execution_core::infrastructure::broker::ScriptStep;
use execution_core::infrastructure::persistence::InMemoryExitRetryRepository;
use rust_decimal_macros::dec;

fn live_config() -> Config {
    let mut config = test_config();
    config.accounts.live_users = vec!["alice".to_string()];
    config
}

/// Live long whose protective stop the broker refuses to take.
async fn open_unprotected_live_long(h: &Harness) -> Trade {
    quote_around(h, &aapl(), dec!(100));
    let report = h
        .container
        .engine
        .execute(entry(alice(), aapl(), dec!(10), dec!(95), TradingMode::Live))
        .await
        .unwrap();
    assert!(report.is_filled());
    let intent = h
        .container
        .engine
        .get(&report.client_order_id)
        .await
        .unwrap()
        .unwrap();

    h.broker.fail_next(
        "place_order",
        BrokerError::Transient {
            operation: "place_order",
            message: "gateway timeout".to_string(),
        },
    );
    h.container
        .lifecycle
        .open_from_fill(&intent, dec!(95))
        .await
        .unwrap()
}

#[tokio::test]
async fn missing_stop_flattens_and_enters_safe_mode() {
    let h = harness_with(live_config());
    let trade = open_unprotected_live_long(&h).await;
    assert_eq!(trade.state(), PositionState::Opening);
    assert_eq!(trade.stop_ack(), StopAck::Failed);

    // Inside the acknowledgement window nothing happens.
    let summary = h.container.stops.sweep().await.unwrap();
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.escalated, 0);

    h.clock.advance(chrono::Duration::seconds(31));
    let summary = h.container.stops.sweep().await.unwrap();
    assert_eq!(summary.escalated, 1);
    assert_eq!(summary.flattened, 1);

    let guard = h.container.guard.snapshot().await.unwrap();
    let halt = guard.safe_mode.expect("safe mode engaged");
    assert_eq!(halt.reason, HaltReason::StopLossFailure);

    // The flatten is the exit; the trade stays in error for review.
    let flattened = h.container.lifecycle.get(trade.id()).await.unwrap();
    assert_eq!(flattened.state(), PositionState::Error);
    assert_eq!(flattened.exit_reason(), Some(ExitReason::StopProtectionFailure));
    // Filled at the bid, 99.99, against a 100.01 entry.
    assert_eq!(flattened.exit_price(), Some(dec!(99.99)));
    assert_eq!(flattened.realized_pnl(), Some(dec!(-0.20)));
    assert!(!flattened.holds_position());
    let note = flattened
        .notes()
        .iter()
        .find(|n| n.kind == "flatten_attempt")
        .expect("flatten recorded");
    assert_eq!(note.message, format!("flatten flatten-{} filled at 99.99", trade.id()));

    assert!(h.container.exits.list().await.unwrap().is_empty());
    let sells: Vec<_> = h
        .broker
        .placed_orders()
        .into_iter()
        .filter(|(_, order)| order.side == OrderSide::Sell)
        .collect();
    assert_eq!(sells.len(), 1);

    assert_eq!(h.container.audit.events_with_action("stop_failure").len(), 1);

    // Nothing left to enforce.
    let summary = h.container.stops.sweep().await.unwrap();
    assert_eq!(summary.checked, 0);
}

#[tokio::test]
async fn failed_flatten_is_handed_to_exit_retry() {
    let h = harness_with(live_config());
    let trade = open_unprotected_live_long(&h).await;

    h.clock.advance(chrono::Duration::seconds(31));
    h.broker.fail_next(
        "place_order",
        BrokerError::Transient {
            operation: "place_order",
            message: "gateway timeout".to_string(),
        },
    );
    let summary = h.container.stops.sweep().await.unwrap();
    assert_eq!(summary.escalated, 1);
    assert_eq!(summary.flattened, 0);
    assert_eq!(summary.queued_for_exit, 1);

    let requests = h.container.exits.list().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].reason(), ExitReason::StopProtectionFailure);
    assert!(requests[0].is_resolved());

    let closed = h.container.lifecycle.get(trade.id()).await.unwrap();
    assert_eq!(closed.state(), PositionState::Closed);
    assert_eq!(closed.realized_pnl(), Some(dec!(-0.20)));
    assert!(closed.notes().iter().any(|n| n.kind == "flatten_attempt"
        && n.message == format!("flatten flatten-{} not confirmed", trade.id())));

    let guard = h.container.guard.snapshot().await.unwrap();
    assert!(guard.safe_mode.is_some());
}

#[tokio::test]
async fn working_flatten_is_cancelled_before_the_exit_sells() {
    let h = harness_with(live_config());
    let trade = open_unprotected_live_long(&h).await;

    // The flatten is accepted but never fills within the poll budget.
    h.broker
        .script_next_order(vec![ScriptStep::status(OrderStatus::Acked)]);
    h.clock.advance(chrono::Duration::seconds(31));
    let summary = h.container.stops.sweep().await.unwrap();
    assert_eq!(summary.queued_for_exit, 1);

    let sells: Vec<_> = h
        .broker
        .placed_orders()
        .into_iter()
        .filter(|(_, order)| order.side == OrderSide::Sell)
        .map(|(_, order)| order.client_order_id.to_string())
        .collect();
    assert_eq!(
        sells,
        vec![format!("flatten-{}", trade.id()), format!("exit-{}-1", trade.id())]
    );
    // Only the exit is live at the broker; the flatten was cancelled first.
    assert!(h.broker.open_orders(&alice()).await.unwrap().is_empty());

    let closed = h.container.lifecycle.get(trade.id()).await.unwrap();
    assert_eq!(closed.state(), PositionState::Closed);
    assert_eq!(closed.realized_pnl(), Some(dec!(-0.20)));
}

#[tokio::test]
async fn panic_leaves_a_flattened_trade_alone() {
    let h = harness_with(live_config());
    let trade = open_unprotected_live_long(&h).await;
    h.clock.advance(chrono::Duration::seconds(31));
    h.container.stops.sweep().await.unwrap();

    let report = h
        .container
        .panic
        .execute(PanicRequest {
            reason: HaltReason::Manual,
            detail: "drill after flatten".to_string(),
            requested_at: h.clock.now(),
        })
        .await
        .unwrap();

    assert_eq!(report.exits_queued, 0);
    assert!(h.container.exits.list().await.unwrap().is_empty());
    let still = h.container.lifecycle.get(trade.id()).await.unwrap();
    assert_eq!(still.state(), PositionState::Error);
}

#[tokio::test]
async fn panic_failure_mode_requests_a_panic() {
    let mut config = live_config();
    config.stops.failure_mode = FailureMode::Panic;
    let mut h = harness_with(config);
    open_unprotected_live_long(&h).await;

    h.clock.advance(chrono::Duration::seconds(31));
    let summary = h.container.stops.sweep().await.unwrap();
    assert_eq!(summary.escalated, 1);

    let request = h.escalations.try_recv().expect("panic requested");
    assert_eq!(request.reason, HaltReason::StopLossFailure);
    let guard = h.container.guard.snapshot().await.unwrap();
    assert!(guard.safe_mode.is_none());
}

#[tokio::test]
async fn working_live_stop_is_confirmed_on_sweep() {
    let h = harness_with(live_config());
    quote_around(&h, &aapl(), dec!(100));
    let trade = common::open_trade(&h, entry(alice(), aapl(), dec!(10), dec!(95), TradingMode::Live)).await;
    assert_eq!(trade.state(), PositionState::Opening);
    assert_eq!(trade.stop_ack(), StopAck::Pending);
    assert!(trade.stop_order_id().is_some());

    let summary = h.container.stops.sweep().await.unwrap();
    assert_eq!(summary.confirmed, 1);
    assert_eq!(summary.escalated, 0);

    let open = h.container.lifecycle.get(trade.id()).await.unwrap();
    assert_eq!(open.state(), PositionState::Open);
    assert_eq!(open.stop_ack(), StopAck::Acknowledged);

    // Well past the timeout an acknowledged trade is left alone.
    h.clock.advance(chrono::Duration::seconds(120));
    let summary = h.container.stops.sweep().await.unwrap();
    assert_eq!(summary.checked, 0);
}

#[tokio::test]
async fn paper_stop_hit_closes_trade() {
    let h = harness_with(test_config());
    let trade = open_paper_long(&h, alice(), aapl(), dec!(100), dec!(10), dec!(95)).await;

    let hits = h.container.lifecycle.on_price(&aapl(), dec!(96)).await.unwrap();
    assert!(hits.is_empty());

    quote_around(&h, &aapl(), dec!(94.50));
    let hits = h.container.lifecycle.on_price(&aapl(), dec!(94.50)).await.unwrap();
    assert_eq!(hits, vec![trade.id().clone()]);

    let queued = h.container.exits.on_stop_hits(&hits).await;
    assert_eq!(queued, 1);

    let closed = h.container.lifecycle.get(trade.id()).await.unwrap();
    assert_eq!(closed.state(), PositionState::Closed);
    assert_eq!(closed.exit_reason(), Some(ExitReason::StopLoss));
    assert_eq!(closed.realized_pnl(), Some(dec!(-55.00)));
}

#[tokio::test]
async fn trailing_stop_ratchets_up_only() {
    let mut config = test_config();
    config.stops.trailing_enabled = true;
    let h = harness_with(config);
    let trade = open_paper_long(&h, alice(), aapl(), dec!(100), dec!(10), dec!(95)).await;

    h.container.lifecycle.on_price(&aapl(), dec!(110)).await.unwrap();
    let trailed = h.container.lifecycle.get(trade.id()).await.unwrap();
    assert_eq!(trailed.current_stop(), dec!(105));
    assert_eq!(trailed.highest_price(), dec!(110));

    // A pullback above the stop leaves it where it is.
    h.container.lifecycle.on_price(&aapl(), dec!(107)).await.unwrap();
    let held = h.container.lifecycle.get(trade.id()).await.unwrap();
    assert_eq!(held.current_stop(), dec!(105));
    assert_eq!(held.state(), PositionState::Open);
}

#[tokio::test]
async fn exhausted_exit_is_dead_lettered_exactly_once() {
    let mut config = test_config();
    config.exit_retry.max_attempts = 3;
    config.exit_retry.base_backoff_ms = 1_000;
    config.exit_retry.max_backoff_ms = 4_000;
    let mut h = harness_with(config);
    let trade = open_paper_long(&h, alice(), aapl(), dec!(100), dec!(10), dec!(95)).await;
    h.broker.clear_quote(&aapl());

    let report = h
        .container
        .exits
        .enqueue(trade.id(), ExitReason::Manual)
        .await
        .unwrap();
    assert!(matches!(report.attempt, Some(AttemptReport::RetryScheduled { .. })));

    let mut dead_lettered = 0;
    for _ in 0..5 {
        h.clock.advance(chrono::Duration::seconds(5));
        let summary = h.container.exits.sweep().await.unwrap();
        dead_lettered += summary.dead_lettered;
    }
    assert_eq!(dead_lettered, 1);

    let requests = h.container.exits.list().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].is_dead_lettered());
    assert_eq!(requests[0].attempts(), 3);

    assert_eq!(h.container.audit.events_with_action("dead_letter").len(), 1);
    let escalation = h.escalations.try_recv().expect("dead letter escalated");
    assert_eq!(escalation.reason, HaltReason::ExitDeadLetter);
    assert!(h.escalations.try_recv().is_err());

    // The trade stays frozen in closing for an operator.
    let stuck = h.container.lifecycle.get(trade.id()).await.unwrap();
    assert_eq!(stuck.state(), PositionState::Closing);
}

/// Exit request store where another writer always lands first on the
/// dead-letter write.
struct DeadLetterOvertaken(InMemoryExitRetryRepository);

#[async_trait]
impl ExitRetryRepository for DeadLetterOvertaken {
    async fn insert_if_absent(
        &self,
        request: &ExitRetryRequest,
    ) -> Result<EnqueueOutcome, RepositoryError> {
        self.0.insert_if_absent(request).await
    }

    async fn save(
        &self,
        request: &ExitRetryRequest,
        expected_version: u64,
    ) -> Result<(), RepositoryError> {
        if request.is_dead_lettered() {
            return Err(RepositoryError::StaleState {
                entity: "exit_retry_request",
                id: request.id().to_string(),
                expected: format!("version {expected_version}"),
                actual: format!("version {}", expected_version + 1),
            });
        }
        self.0.save(request, expected_version).await
    }

    async fn find(&self, id: &ExitRetryId) -> Result<Option<ExitRetryRequest>, RepositoryError> {
        self.0.find(id).await
    }

    async fn find_unresolved_for_trade(
        &self,
        trade_id: &TradeId,
    ) -> Result<Option<ExitRetryRequest>, RepositoryError> {
        self.0.find_unresolved_for_trade(trade_id).await
    }

    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<ExitRetryRequest>, RepositoryError> {
        self.0.find_due(now).await
    }

    async fn list(&self) -> Result<Vec<ExitRetryRequest>, RepositoryError> {
        self.0.list().await
    }
}

#[tokio::test]
async fn unsaved_dead_letter_is_not_escalated() {
    let mut config = test_config();
    config.exit_retry.max_attempts = 1;
    let mut h = harness_customized(config, |builder| {
        builder.exit_requests(Arc::new(DeadLetterOvertaken(InMemoryExitRetryRepository::new())))
    });
    let trade = open_paper_long(&h, alice(), aapl(), dec!(100), dec!(10), dec!(95)).await;
    h.broker.clear_quote(&aapl());

    let report = h
        .container
        .exits
        .enqueue(trade.id(), ExitReason::Manual)
        .await
        .unwrap();

    assert_eq!(report.attempt, Some(AttemptReport::Skipped));
    assert!(report.request.is_pending());
    assert!(h.container.audit.events_with_action("dead_letter").is_empty());
    assert!(h.escalations.try_recv().is_err());
}

#[tokio::test]
async fn concurrent_finalize_closes_once() {
    let h = harness_with(test_config());
    let trade = open_paper_long(&h, alice(), aapl(), dec!(100), dec!(10), dec!(95)).await;
    h.container
        .lifecycle
        .begin_exit(trade.id(), ExitReason::Manual)
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        h.container
            .lifecycle
            .finalize(trade.id(), dec!(104), ExitReason::Manual),
        h.container
            .lifecycle
            .finalize(trade.id(), dec!(104), ExitReason::Manual),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert!(first.newly_closed ^ second.newly_closed);
    assert_eq!(first.realized_pnl, dec!(40));
    assert_eq!(second.realized_pnl, dec!(40));

    let history = h.container.trades.history(trade.id()).await.unwrap();
    let closes = history
        .iter()
        .filter(|r| r.to_state == PositionState::Closed.to_string())
        .count();
    assert_eq!(closes, 1);
}
