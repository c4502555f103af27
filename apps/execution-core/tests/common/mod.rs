//! Shared fixtures for the integration tests: a fully wired container over
//! a paper broker and a manual clock.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use execution_core::application::ports::PanicRequest;
use execution_core::application::use_cases::ExecuteOrderCommand;
use execution_core::config::Config;
use execution_core::domain::order_execution::{
    CostModelConfig, OrderPurpose, OrderSide, TradingMode,
};
use execution_core::domain::shared::{Symbol, UserId};
use execution_core::domain::trade_lifecycle::Trade;
use execution_core::infrastructure::broker::PaperBroker;
use execution_core::infrastructure::clock::ManualClock;
use execution_core::infrastructure::config::{Container, ContainerBuilder};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

/// Wired system plus handles on its test doubles.
pub struct Harness {
    pub container: Arc<Container>,
    pub broker: Arc<PaperBroker>,
    pub clock: Arc<ManualClock>,
    pub escalations: mpsc::Receiver<PanicRequest>,
}

/// Config whose paper fills land exactly on the mid, so P&L and heat
/// figures in tests are round numbers.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.cost_model = CostModelConfig {
        spread_capture: Decimal::ZERO,
        slippage_bps: Decimal::ZERO,
        ..CostModelConfig::default()
    };
    config.execution.poll_interval_ms = 100;
    config
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: Config) -> Harness {
    harness_customized(config, |builder| builder)
}

/// Harness whose container builder gets extra overrides on top of the
/// paper broker and manual clock.
pub fn harness_customized(
    config: Config,
    customize: impl FnOnce(ContainerBuilder) -> ContainerBuilder,
) -> Harness {
    let clock = Arc::new(ManualClock::default());
    let broker = Arc::new(PaperBroker::with_clock(clock.clone()));
    let builder = Container::builder(config)
        .clock(clock.clone())
        .broker(broker.clone());
    let (container, escalations) = customize(builder).build();
    Harness {
        container: Arc::new(container),
        broker,
        clock,
        escalations,
    }
}

pub fn alice() -> UserId {
    UserId::new("alice")
}

pub fn bob() -> UserId {
    UserId::new("bob")
}

pub fn aapl() -> Symbol {
    Symbol::new("AAPL")
}

pub fn msft() -> Symbol {
    Symbol::new("MSFT")
}

/// Quote `symbol` one cent either side of `mid`.
pub fn quote_around(h: &Harness, symbol: &Symbol, mid: Decimal) {
    h.broker.set_quote(symbol, mid - dec!(0.01), mid + dec!(0.01));
}

/// Market buy entry with a protective stop.
pub fn entry(
    user: UserId,
    symbol: Symbol,
    quantity: Decimal,
    stop: Decimal,
    mode: TradingMode,
) -> ExecuteOrderCommand {
    ExecuteOrderCommand::market(user, symbol, OrderSide::Buy, quantity, OrderPurpose::Entry, mode)
        .with_protective_stop(stop)
}

/// Fill an entry through the engine and open its trade.
pub async fn open_trade(h: &Harness, command: ExecuteOrderCommand) -> Trade {
    let stop = command.protective_stop.expect("entry carries a stop");
    let report = h.container.engine.execute(command).await.unwrap();
    assert!(report.is_filled(), "entry did not fill: {report:?}");
    let intent = h
        .container
        .engine
        .get(&report.client_order_id)
        .await
        .unwrap()
        .expect("filled entry is stored");
    h.container.lifecycle.open_from_fill(&intent, stop).await.unwrap()
}

/// Paper long on `symbol` at `mid` with the given stop.
pub async fn open_paper_long(
    h: &Harness,
    user: UserId,
    symbol: Symbol,
    mid: Decimal,
    quantity: Decimal,
    stop: Decimal,
) -> Trade {
    quote_around(h, &symbol, mid);
    open_trade(h, entry(user, symbol, quantity, stop, TradingMode::Paper)).await
}
