//! Shutdown coordination for the server.
//!
//! # States
//! ```text
//! Running → ShutdownRequested → Draining → Drained → Terminated
//!                                       ↘ Forced  ↗
//! ```
//!
//! The drain is a race between the engine's completion and the grace
//! period timer. Whichever resolves first wins; on timeout the engine is
//! force-stopped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::ServerConfig;
use crate::health::{HealthReporter, HealthStatus};
use crate::lifecycle::drain::{DrainCompletion, DrainController};
use crate::lifecycle::signals::ShutdownSignal;
use crate::observability::metrics;

/// Position of the server in its shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShutdownRequested,
    Draining,
    Drained,
    Forced,
    Terminated,
}

/// How the drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// All in-flight work finished within the grace period.
    Drained,
    /// The engine was force-stopped.
    Forced { abandoned: u64 },
}

impl ShutdownOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ShutdownOutcome::Drained => "drained",
            ShutdownOutcome::Forced { .. } => "forced",
        }
    }
}

/// Summary returned once the sequence reaches `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub outcome: ShutdownOutcome,
    /// Time from the shutdown signal to termination.
    pub elapsed: Duration,
}

/// Sequences health, graceful stop and forced stop after a shutdown signal.
pub struct ShutdownOrchestrator<D> {
    health: Arc<HealthReporter>,
    drain: D,
    service_names: Vec<String>,
    grace_period: Duration,
    force_stop_timeout: Duration,
    state: watch::Sender<ShutdownState>,
}

impl<D: DrainController> ShutdownOrchestrator<D> {
    pub fn new(health: Arc<HealthReporter>, drain: D) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            health,
            drain,
            service_names: Vec::new(),
            grace_period: Duration::from_secs(5),
            force_stop_timeout: Duration::from_secs(2),
            state,
        }
    }

    pub fn from_config(health: Arc<HealthReporter>, drain: D, config: &ServerConfig) -> Self {
        Self::new(health, drain)
            .with_service_names(config.health.service_names.clone())
            .with_grace_period(config.shutdown.grace_period())
            .with_force_stop_timeout(config.shutdown.force_stop_timeout())
    }

    pub fn with_service_names(mut self, names: Vec<String>) -> Self {
        self.service_names = names;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_force_stop_timeout(mut self, timeout: Duration) -> Self {
        self.force_stop_timeout = timeout;
        self
    }

    /// Observe state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// Wait for `trigger`, then run the shutdown sequence to completion.
    ///
    /// Consumes the orchestrator, so only one signal is ever acted upon.
    pub async fn run<F>(self, trigger: F) -> ShutdownReport
    where
        F: Future<Output = ShutdownSignal>,
    {
        let signal = trigger.await;
        let started = Instant::now();
        tracing::info!(signal = %signal, "Shutting down gracefully");

        // Health is already NOT_SERVING by the time any subscriber sees
        // ShutdownRequested.
        for name in &self.service_names {
            self.health.set_status(name, HealthStatus::NotServing);
        }
        self.health.shutdown();
        self.transition(ShutdownState::ShutdownRequested);

        let outcome = match self.drain.begin_graceful_stop() {
            Ok(completion) => {
                self.transition(ShutdownState::Draining);
                self.race(completion).await
            }
            Err(e) => {
                self.transition(ShutdownState::Draining);
                tracing::error!(error = %e, "Failed to begin graceful stop, forcing stop");
                self.force(None).await
            }
        };

        self.transition(match outcome {
            ShutdownOutcome::Drained => ShutdownState::Drained,
            ShutdownOutcome::Forced { .. } => ShutdownState::Forced,
        });

        let elapsed = started.elapsed();
        metrics::record_shutdown(&outcome, elapsed);
        self.transition(ShutdownState::Terminated);
        tracing::info!(
            outcome = outcome.label(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Server successfully stopped"
        );

        ShutdownReport { outcome, elapsed }
    }

    async fn race(&self, mut completion: DrainCompletion) -> ShutdownOutcome {
        let finished = tokio::select! {
            result = &mut completion => Some(result),
            _ = tokio::time::sleep(self.grace_period) => None,
        };

        match finished {
            Some(Ok(())) => {
                tracing::info!("Graceful stop completed");
                ShutdownOutcome::Drained
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "Drain failed, forcing stop");
                self.force(None).await
            }
            None => {
                tracing::warn!(
                    grace_period_ms = self.grace_period.as_millis() as u64,
                    "Graceful stop timed out, forcing stop"
                );
                self.force(Some(completion)).await
            }
        }
    }

    async fn force(&self, completion: Option<DrainCompletion>) -> ShutdownOutcome {
        let report = self.drain.force_stop();
        if report.abandoned > 0 {
            tracing::warn!(abandoned = report.abandoned, "Abandoned in-flight connections");
        }

        if let Some(completion) = completion {
            match tokio::time::timeout(self.force_stop_timeout, completion).await {
                Ok(Ok(())) => tracing::debug!("Serving engine released its resources"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Serving engine ended during forced stop"),
                Err(_) => tracing::error!(
                    timeout_ms = self.force_stop_timeout.as_millis() as u64,
                    "Serving engine did not acknowledge forced stop"
                ),
            }
        }

        ShutdownOutcome::Forced {
            abandoned: report.abandoned,
        }
    }

    fn transition(&self, next: ShutdownState) {
        let previous = self.state.send_replace(next);
        tracing::debug!(from = ?previous, to = ?next, "Shutdown state transition");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::drain::{drain_channel, DrainError, DrainNotifier, DrainReceiver, ForceStopReport};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    const SERVICE: &str = "grpc.health.v1.echo";

    /// Scripted engine recording every call the orchestrator makes.
    struct MockEngine {
        health: Arc<HealthReporter>,
        notifier: Arc<DrainNotifier>,
        receiver: DrainReceiver,
        fail_begin: bool,
        ack_force: bool,
        abandoned: u64,
        begin_calls: AtomicUsize,
        force_calls: AtomicUsize,
        status_at_begin: Mutex<Option<Option<HealthStatus>>>,
        force_at: Mutex<Option<Instant>>,
    }

    impl MockEngine {
        fn new(health: Arc<HealthReporter>) -> Self {
            let (notifier, receiver) = drain_channel();
            Self {
                health,
                notifier: Arc::new(notifier),
                receiver,
                fail_begin: false,
                ack_force: true,
                abandoned: 3,
                begin_calls: AtomicUsize::new(0),
                force_calls: AtomicUsize::new(0),
                status_at_begin: Mutex::new(None),
                force_at: Mutex::new(None),
            }
        }
    }

    impl DrainController for Arc<MockEngine> {
        fn begin_graceful_stop(&self) -> Result<DrainCompletion, DrainError> {
            self.begin_calls.fetch_add(1, Ordering::SeqCst);
            *self.status_at_begin.lock().unwrap() = Some(self.health.status(SERVICE));
            if self.fail_begin {
                return Err(DrainError::AlreadyStopping);
            }
            Ok(self.receiver.completion())
        }

        fn force_stop(&self) -> ForceStopReport {
            self.force_calls.fetch_add(1, Ordering::SeqCst);
            *self.force_at.lock().unwrap() = Some(Instant::now());
            if self.receiver.is_drained() {
                return ForceStopReport::default();
            }
            if self.ack_force {
                self.notifier.notify();
            }
            ForceStopReport {
                abandoned: self.abandoned,
            }
        }
    }

    fn serving_health() -> Arc<HealthReporter> {
        let health = Arc::new(HealthReporter::new());
        health.set_status(SERVICE, HealthStatus::Serving);
        health
    }

    fn orchestrator(
        health: &Arc<HealthReporter>,
        engine: &Arc<MockEngine>,
    ) -> ShutdownOrchestrator<Arc<MockEngine>> {
        ShutdownOrchestrator::new(Arc::clone(health), Arc::clone(engine))
            .with_service_names(vec![SERVICE.to_string()])
            .with_grace_period(Duration::from_secs(5))
            .with_force_stop_timeout(Duration::from_secs(1))
    }

    fn assert_about(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(5),
            "expected about {:?}, got {:?}",
            expected,
            actual
        );
    }

    fn notify_after(engine: &Arc<MockEngine>, delay: Duration) {
        let notifier = Arc::clone(&engine.notifier);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            notifier.notify();
        });
    }

    #[tokio::test(start_paused = true)]
    async fn drains_before_grace_period() {
        let health = serving_health();
        let engine = Arc::new(MockEngine::new(Arc::clone(&health)));
        let orchestrator = orchestrator(&health, &engine);
        let state = orchestrator.subscribe_state();

        notify_after(&engine, Duration::from_secs(1));
        let report = orchestrator.run(async { ShutdownSignal::manual() }).await;

        assert_eq!(report.outcome, ShutdownOutcome::Drained);
        assert_about(report.elapsed, Duration::from_secs(1));
        assert_eq!(engine.begin_calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.force_calls.load(Ordering::SeqCst), 0);
        assert_eq!(*state.borrow(), ShutdownState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn forces_stop_when_grace_period_elapses() {
        let health = serving_health();
        let engine = Arc::new(MockEngine::new(Arc::clone(&health)));
        let orchestrator = orchestrator(&health, &engine);

        let started = Instant::now();
        let report = orchestrator.run(async { ShutdownSignal::manual() }).await;

        assert_eq!(report.outcome, ShutdownOutcome::Forced { abandoned: 3 });
        assert_eq!(engine.force_calls.load(Ordering::SeqCst), 1);
        let forced_at = engine.force_at.lock().unwrap().unwrap();
        assert!(forced_at - started >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn unacknowledged_force_stop_is_bounded() {
        let health = serving_health();
        let mut engine = MockEngine::new(Arc::clone(&health));
        engine.ack_force = false;
        let engine = Arc::new(engine);

        let report = orchestrator(&health, &engine)
            .run(async { ShutdownSignal::manual() })
            .await;

        assert!(matches!(report.outcome, ShutdownOutcome::Forced { .. }));
        assert_about(report.elapsed, Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn health_flips_before_graceful_stop_begins() {
        let health = serving_health();
        let engine = Arc::new(MockEngine::new(Arc::clone(&health)));
        notify_after(&engine, Duration::from_millis(10));

        orchestrator(&health, &engine)
            .run(async { ShutdownSignal::manual() })
            .await;

        assert_eq!(
            *engine.status_at_begin.lock().unwrap(),
            Some(Some(HealthStatus::NotServing))
        );
        assert_eq!(health.status(SERVICE), Some(HealthStatus::NotServing));
        assert_eq!(health.overall(), HealthStatus::NotServing);
    }

    #[tokio::test(start_paused = true)]
    async fn health_reports_not_serving_while_draining() {
        let health = serving_health();
        let engine = Arc::new(MockEngine::new(Arc::clone(&health)));
        let orchestrator = orchestrator(&health, &engine);
        let mut state = orchestrator.subscribe_state();

        let run = tokio::spawn(orchestrator.run(async { ShutdownSignal::manual() }));

        state
            .wait_for(|s| *s == ShutdownState::Draining)
            .await
            .unwrap();
        assert_eq!(health.status(SERVICE), Some(HealthStatus::NotServing));
        assert!(!engine.receiver.is_drained());

        engine.notifier.notify();
        let report = run.await.unwrap();
        assert_eq!(report.outcome, ShutdownOutcome::Drained);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn health_is_not_serving_once_shutdown_is_requested() {
        let health = serving_health();
        let engine = Arc::new(MockEngine::new(Arc::clone(&health)));
        let orchestrator = orchestrator(&health, &engine);
        let mut state = orchestrator.subscribe_state();

        let observer = tokio::spawn({
            let health = Arc::clone(&health);
            async move {
                state
                    .wait_for(|s| *s != ShutdownState::Running)
                    .await
                    .unwrap();
                (health.status(SERVICE), health.overall())
            }
        });

        let run = tokio::spawn(orchestrator.run(async { ShutdownSignal::manual() }));

        let (service, overall) = observer.await.unwrap();
        assert_eq!(service, Some(HealthStatus::NotServing));
        assert_eq!(overall, HealthStatus::NotServing);

        engine.notifier.notify();
        assert_eq!(run.await.unwrap().outcome, ShutdownOutcome::Drained);
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_signal_is_consumed() {
        let health = serving_health();
        let engine = Arc::new(MockEngine::new(Arc::clone(&health)));
        notify_after(&engine, Duration::from_millis(100));

        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(ShutdownSignal::manual()).unwrap();
        tokio::spawn({
            let tx = tx.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let _ = tx.send(ShutdownSignal::manual());
            }
        });

        let report = orchestrator(&health, &engine)
            .run(async { rx.recv().await.unwrap_or_else(ShutdownSignal::manual) })
            .await;

        assert_eq!(report.outcome, ShutdownOutcome::Drained);
        assert_eq!(engine.begin_calls.load(Ordering::SeqCst), 1);
        // The second request was never taken off the channel.
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_graceful_stop_degrades_to_force() {
        let health = serving_health();
        let mut engine = MockEngine::new(Arc::clone(&health));
        engine.fail_begin = true;
        let engine = Arc::new(engine);

        let orchestrator = orchestrator(&health, &engine);
        let state = orchestrator.subscribe_state();
        let report = orchestrator.run(async { ShutdownSignal::manual() }).await;

        assert_eq!(report.outcome, ShutdownOutcome::Forced { abandoned: 3 });
        assert_about(report.elapsed, Duration::ZERO);
        assert_eq!(engine.force_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*state.borrow(), ShutdownState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn engine_vanishing_mid_drain_forces_stop() {
        let health = serving_health();
        let (notifier, receiver) = drain_channel();
        let mut engine = MockEngine::new(Arc::clone(&health));
        engine.receiver = receiver;
        let engine = Arc::new(engine);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(notifier);
        });

        let report = orchestrator(&health, &engine)
            .run(async { ShutdownSignal::manual() })
            .await;

        assert!(matches!(report.outcome, ShutdownOutcome::Forced { .. }));
        assert_about(report.elapsed, Duration::from_millis(50));
        assert_eq!(engine.force_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn state_starts_running() {
        let health = serving_health();
        let engine = Arc::new(MockEngine::new(Arc::clone(&health)));
        let orchestrator = orchestrator(&health, &engine);
        assert_eq!(orchestrator.state(), ShutdownState::Running);
        assert_eq!(health.status(SERVICE), Some(HealthStatus::Serving));
    }
}
