//! Background Scheduler
//!
//! Runs the periodic sweeps on independent tokio tasks so a slow broker
//! poll in one sweep never delays another:
//!
//! - reconciliation (first run at startup)
//! - stop-loss enforcement
//! - exit retry
//! - supervisor evaluation, with the daily reset on UTC date rollover
//!
//! A further task consumes panic requests from the escalation channel.
//! Everything stops when the shared `CancellationToken` is cancelled.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::ports::{Clock, PanicRequest};
use crate::application::use_cases::{
    CircuitBreakerUseCase, EnforceStopsUseCase, ExitRetryCoordinator, PanicUseCase,
    ReconcileUseCase,
};

/// Sweep periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Reconciliation period.
    pub reconciliation_interval: Duration,
    /// Stop enforcement period.
    pub stop_sweep_interval: Duration,
    /// Exit retry period.
    pub exit_sweep_interval: Duration,
    /// Supervisor evaluation period.
    pub supervisor_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconciliation_interval: Duration::from_secs(60),
            stop_sweep_interval: Duration::from_secs(5),
            exit_sweep_interval: Duration::from_secs(5),
            supervisor_interval: Duration::from_secs(30),
        }
    }
}

/// Owner of the background tasks.
pub struct Scheduler {
    reconcile: Arc<ReconcileUseCase>,
    stops: Arc<EnforceStopsUseCase>,
    exits: Arc<ExitRetryCoordinator>,
    breaker: Arc<CircuitBreakerUseCase>,
    panic: Arc<PanicUseCase>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Create the scheduler.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reconcile: Arc<ReconcileUseCase>,
        stops: Arc<EnforceStopsUseCase>,
        exits: Arc<ExitRetryCoordinator>,
        breaker: Arc<CircuitBreakerUseCase>,
        panic: Arc<PanicUseCase>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reconcile,
            stops,
            exits,
            breaker,
            panic,
            clock,
            config,
            shutdown,
        }
    }

    /// Spawn every task. Returns their handles for shutdown.
    pub fn start(&self, escalations: mpsc::Receiver<PanicRequest>) -> Vec<JoinHandle<()>> {
        info!(
            reconciliation_secs = self.config.reconciliation_interval.as_secs(),
            stop_sweep_secs = self.config.stop_sweep_interval.as_secs(),
            exit_sweep_secs = self.config.exit_sweep_interval.as_secs(),
            supervisor_secs = self.config.supervisor_interval.as_secs(),
            "Starting scheduler"
        );

        let reconcile = Arc::clone(&self.reconcile);
        let stops = Arc::clone(&self.stops);
        let exits = Arc::clone(&self.exits);

        vec![
            spawn_periodic(
                "reconciliation",
                self.config.reconciliation_interval,
                self.shutdown.clone(),
                move || {
                    let reconcile = Arc::clone(&reconcile);
                    async move {
                        match reconcile.execute().await {
                            Ok(report) if !report.errors.is_empty() => {
                                warn!(errors = ?report.errors, "Reconciliation had per-user failures");
                            }
                            Ok(_) => {}
                            Err(e) => error!(error = %e, "Reconciliation run failed"),
                        }
                    }
                },
            ),
            spawn_periodic(
                "stop_enforcement",
                self.config.stop_sweep_interval,
                self.shutdown.clone(),
                move || {
                    let stops = Arc::clone(&stops);
                    async move {
                        if let Err(e) = stops.sweep().await {
                            error!(error = %e, "Stop enforcement sweep failed");
                        }
                    }
                },
            ),
            spawn_periodic(
                "exit_retry",
                self.config.exit_sweep_interval,
                self.shutdown.clone(),
                move || {
                    let exits = Arc::clone(&exits);
                    async move {
                        if let Err(e) = exits.sweep().await {
                            error!(error = %e, "Exit retry sweep failed");
                        }
                    }
                },
            ),
            self.spawn_supervisor(),
            self.spawn_escalations(escalations),
        ]
    }

    fn spawn_supervisor(&self) -> JoinHandle<()> {
        let breaker = Arc::clone(&self.breaker);
        let clock = Arc::clone(&self.clock);
        let shutdown = self.shutdown.clone();
        let period = self.config.supervisor_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_day: NaiveDate = clock.now().date_naive();

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let today = clock.now().date_naive();
                        if today != last_day {
                            match breaker.daily_reset().await {
                                Ok(summary) => {
                                    info!(users = summary.users, halt_lifted = summary.halt_lifted, %today, "Daily reset ran");
                                    last_day = today;
                                }
                                Err(e) => error!(error = %e, "Daily reset failed, will retry"),
                            }
                        }
                        match breaker.evaluate().await {
                            Ok(breaches) if !breaches.is_empty() => {
                                warn!(breaches = breaches.len(), "Supervisor found loss limit breaches");
                            }
                            Ok(_) => {}
                            Err(e) => error!(error = %e, "Supervisor evaluation failed"),
                        }
                    }
                    () = shutdown.cancelled() => {
                        info!("Supervisor shutting down");
                        break;
                    }
                }
            }
        })
    }

    fn spawn_escalations(&self, mut escalations: mpsc::Receiver<PanicRequest>) -> JoinHandle<()> {
        let panic = Arc::clone(&self.panic);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    request = escalations.recv() => {
                        let Some(request) = request else {
                            info!("Escalation channel closed");
                            break;
                        };
                        warn!(reason = %request.reason, detail = %request.detail, "Panic escalation received");
                        match panic.execute(request).await {
                            Ok(report) if report.already_active => {
                                debug!("Emergency already active, escalation recorded only");
                            }
                            Ok(_) => {}
                            Err(e) => error!(error = %e, "Escalated panic failed"),
                        }
                    }
                    () = shutdown.cancelled() => {
                        info!("Escalation consumer shutting down");
                        break;
                    }
                }
            }
        })
    }
}

/// Run `tick` every `period` until cancelled. The first tick fires at once.
fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    debug!(task = name, "Scheduled tick");
                    tick().await;
                }
                () = shutdown.cancelled() => {
                    info!(task = name, "Scheduled task shutting down");
                    break;
                }
            }
        }
    })
}
