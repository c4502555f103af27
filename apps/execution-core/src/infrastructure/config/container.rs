//! Dependency Injection Container
//!
//! Builds every adapter and use case from a [`Config`] and wires them
//! together. The broker, clock and exit request store can be swapped
//! through the builder; all other adapters are the in-memory
//! implementations.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::ports::{BrokerPort, Clock, PanicRequest};
use crate::application::services::{CooldownTracker, IdempotencyGuard, Scheduler, SystemGuardService};
use crate::application::use_cases::{
    CircuitBreakerUseCase, EnforceStopsUseCase, EvaluateRiskUseCase, ExecuteOrderUseCase,
    ExitRetryCoordinator, PanicUseCase, ReconcileUseCase, TradeLifecycleUseCase,
};
use crate::config::Config;
use crate::domain::exit_retry::ExitRetryRepository;
use crate::domain::order_execution::CostModel;
use crate::domain::risk_management::RiskGate;
use crate::domain::shared::UserId;
use crate::infrastructure::account::{
    InMemoryCapitalStore, InMemoryCorrelationTable, InMemoryCredentialStore,
};
use crate::infrastructure::broker::PaperBroker;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::notify::{BroadcastNotifier, ChannelEscalation, InMemoryAuditLog};
use crate::infrastructure::persistence::{
    InMemoryExitRetryRepository, InMemoryIdempotencyRepository, InMemoryLossCounterRepository,
    InMemoryOrderIntentRepository, InMemorySystemGuardRepository, InMemoryTradeRepository,
};

/// Pending panic requests before further ones are dropped.
const ESCALATION_CAPACITY: usize = 8;

/// Messages buffered per notification subscriber.
const NOTIFICATION_CAPACITY: usize = 1024;

/// Builder for [`Container`].
pub struct ContainerBuilder {
    config: Config,
    broker: Option<Arc<dyn BrokerPort>>,
    clock: Option<Arc<dyn Clock>>,
    exit_requests: Option<Arc<dyn ExitRetryRepository>>,
}

impl ContainerBuilder {
    /// Use this broker instead of a fresh paper broker.
    #[must_use]
    pub fn broker(mut self, broker: Arc<dyn BrokerPort>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Use this clock instead of wall time.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Store exit retry requests here instead of in memory.
    #[must_use]
    pub fn exit_requests(mut self, requests: Arc<dyn ExitRetryRepository>) -> Self {
        self.exit_requests = Some(requests);
        self
    }

    /// Wire everything. Returns the container and the receiving end of the
    /// escalation channel, which the scheduler consumes.
    pub fn build(self) -> (Container, mpsc::Receiver<PanicRequest>) {
        let config = self.config;
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let broker: Arc<dyn BrokerPort> = match self.broker {
            Some(broker) => broker,
            None => Arc::new(PaperBroker::with_clock(Arc::clone(&clock))),
        };

        // Adapters
        let orders = Arc::new(InMemoryOrderIntentRepository::new());
        let trades = Arc::new(InMemoryTradeRepository::new());
        let exit_requests: Arc<dyn ExitRetryRepository> = match self.exit_requests {
            Some(requests) => requests,
            None => Arc::new(InMemoryExitRetryRepository::new()),
        };
        let idempotency_repo = Arc::new(InMemoryIdempotencyRepository::new());
        let guard_repo = Arc::new(InMemorySystemGuardRepository::new());
        let loss_repo = Arc::new(InMemoryLossCounterRepository::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let notifier = Arc::new(BroadcastNotifier::new(NOTIFICATION_CAPACITY));
        let (escalation, escalations) = ChannelEscalation::channel(ESCALATION_CAPACITY);
        let escalation = Arc::new(escalation);
        let capital = Arc::new(InMemoryCapitalStore::new(config.accounts.default_capital));
        let credentials = Arc::new(InMemoryCredentialStore::new());
        for user in &config.accounts.live_users {
            credentials.activate(UserId::new(user.as_str()));
        }
        let correlations = Arc::new(InMemoryCorrelationTable::new());
        let cooldowns = Arc::new(CooldownTracker::new());

        // Services
        let guard = Arc::new(SystemGuardService::new(
            guard_repo.clone(),
            notifier.clone(),
            audit.clone(),
            Arc::clone(&clock),
        ));
        let idempotency = Arc::new(IdempotencyGuard::new(
            idempotency_repo,
            audit.clone(),
            Arc::clone(&clock),
        ));

        // Use cases
        let breaker = Arc::new(CircuitBreakerUseCase::new(
            loss_repo.clone(),
            capital.clone(),
            Arc::clone(&guard),
            audit.clone(),
            Arc::clone(&clock),
            config.loss_limits(),
        ));
        let risk = Arc::new(EvaluateRiskUseCase::new(
            RiskGate::new(config.risk.limits()),
            guard_repo,
            loss_repo,
            trades.clone(),
            capital.clone(),
            correlations.clone(),
            Arc::clone(&cooldowns),
            Arc::clone(&broker),
            Arc::clone(&clock),
        ));
        let engine = Arc::new(ExecuteOrderUseCase::new(
            risk,
            orders.clone(),
            Arc::clone(&broker),
            credentials.clone(),
            notifier.clone(),
            escalation.clone(),
            Arc::clone(&clock),
            CostModel::new(config.cost_model),
            config.execution.policy(),
        ));
        let lifecycle = Arc::new(TradeLifecycleUseCase::new(
            trades.clone(),
            orders.clone(),
            Arc::clone(&broker),
            Arc::clone(&breaker),
            cooldowns,
            notifier.clone(),
            audit.clone(),
            Arc::clone(&clock),
            config.stops.trailing_enabled,
        ));
        let exits = Arc::new(ExitRetryCoordinator::new(
            exit_requests,
            Arc::clone(&lifecycle),
            Arc::clone(&engine),
            orders.clone(),
            Arc::clone(&broker),
            notifier.clone(),
            audit.clone(),
            escalation.clone(),
            Arc::clone(&clock),
            config.exit_retry.backoff(),
            config.exit_retry.concurrency,
        ));
        let stops = Arc::new(EnforceStopsUseCase::new(
            trades.clone(),
            Arc::clone(&lifecycle),
            Arc::clone(&engine),
            Arc::clone(&exits),
            Arc::clone(&guard),
            escalation,
            notifier.clone(),
            audit.clone(),
            Arc::clone(&clock),
            config.stops.policy(),
        ));
        let reconcile = Arc::new(ReconcileUseCase::new(
            credentials.clone(),
            Arc::clone(&broker),
            orders.clone(),
            trades.clone(),
            Arc::clone(&guard),
            notifier.clone(),
            audit.clone(),
            Arc::clone(&clock),
            config.reconciliation.policy(),
        ));
        let panic = Arc::new(PanicUseCase::new(
            Arc::clone(&guard),
            Arc::clone(&broker),
            credentials.clone(),
            trades.clone(),
            Arc::clone(&exits),
            notifier.clone(),
            audit.clone(),
            Arc::clone(&clock),
        ));

        info!(
            mode = ?config.execution.mode,
            live_users = config.accounts.live_users.len(),
            failure_mode = %config.stops.failure_mode,
            "Container wired"
        );

        let container = Container {
            config,
            clock,
            broker,
            orders,
            trades,
            audit,
            notifier,
            capital,
            credentials,
            correlations,
            guard,
            idempotency,
            breaker,
            engine,
            lifecycle,
            exits,
            stops,
            reconcile,
            panic,
        };
        (container, escalations)
    }
}

/// Every wired component.
pub struct Container {
    /// Loaded configuration.
    pub config: Config,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Broker port.
    pub broker: Arc<dyn BrokerPort>,
    /// Order intents.
    pub orders: Arc<InMemoryOrderIntentRepository>,
    /// Trades.
    pub trades: Arc<InMemoryTradeRepository>,
    /// Audit log.
    pub audit: Arc<InMemoryAuditLog>,
    /// Notification fan-out.
    pub notifier: Arc<BroadcastNotifier>,
    /// Capital per user.
    pub capital: Arc<InMemoryCapitalStore>,
    /// Live credentials.
    pub credentials: Arc<InMemoryCredentialStore>,
    /// Symbol correlations.
    pub correlations: Arc<InMemoryCorrelationTable>,
    /// Safe mode and emergency flags.
    pub guard: Arc<SystemGuardService>,
    /// Deduplication of external commands.
    pub idempotency: Arc<IdempotencyGuard>,
    /// Loss supervisor.
    pub breaker: Arc<CircuitBreakerUseCase>,
    /// Execution engine.
    pub engine: Arc<ExecuteOrderUseCase>,
    /// Trade lifecycle.
    pub lifecycle: Arc<TradeLifecycleUseCase>,
    /// Exit retry coordinator.
    pub exits: Arc<ExitRetryCoordinator>,
    /// Stop enforcement.
    pub stops: Arc<EnforceStopsUseCase>,
    /// Reconciliation.
    pub reconcile: Arc<ReconcileUseCase>,
    /// Emergency panic.
    pub panic: Arc<PanicUseCase>,
}

impl Container {
    /// Start building from a configuration.
    #[must_use]
    pub fn builder(config: Config) -> ContainerBuilder {
        ContainerBuilder {
            config,
            broker: None,
            clock: None,
            exit_requests: None,
        }
    }

    /// Wire with defaults: fresh paper broker, wall clock.
    pub fn from_config(config: Config) -> (Self, mpsc::Receiver<PanicRequest>) {
        Self::builder(config).build()
    }

    /// Scheduler over this container's use cases.
    #[must_use]
    pub fn scheduler(&self, shutdown: CancellationToken) -> Scheduler {
        Scheduler::new(
            Arc::clone(&self.reconcile),
            Arc::clone(&self.stops),
            Arc::clone(&self.exits),
            Arc::clone(&self.breaker),
            Arc::clone(&self.panic),
            Arc::clone(&self.clock),
            self.config.scheduler(),
            shutdown,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::CredentialStore;
    use crate::infrastructure::clock::ManualClock;

    #[tokio::test]
    async fn live_users_get_credentials() {
        let mut config = Config::default();
        config.accounts.live_users = vec!["alice".to_string()];

        let (container, _rx) = Container::builder(config)
            .clock(Arc::new(ManualClock::default()))
            .build();

        let users = container.credentials.active_users().await.unwrap();
        assert_eq!(users, vec![UserId::new("alice")]);
        let state = container.guard.snapshot().await.unwrap();
        assert!(state.safe_mode.is_none());
    }
}
