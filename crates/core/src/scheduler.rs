//! Self-rescheduling cycle loop.
//!
//! Runs a cycle, sleeps for whatever is left of the interval, and repeats.
//! A slow cycle delays the next one instead of overlapping it.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ScannerConfig;
use crate::metrics::MetricsCollector;
use crate::monitor::{LoanMonitor, ShutdownSignal};

/// Drives a [`LoanMonitor`] on a fixed cadence.
pub struct MonitorScheduler {
    monitor: Arc<LoanMonitor>,
    interval: Duration,
    health_check_interval: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl MonitorScheduler {
    pub fn new(monitor: Arc<LoanMonitor>, interval: Duration) -> Self {
        Self {
            monitor,
            interval,
            health_check_interval: Duration::from_secs(60),
            metrics: None,
        }
    }

    pub fn from_config(monitor: Arc<LoanMonitor>, config: &ScannerConfig) -> Self {
        Self::new(monitor, config.monitoring_interval())
            .with_health_check_interval(config.health_check_interval())
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// Run periodic self-checks against `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spawn the cycle loop (and the self-check loop, if metrics are set).
    pub fn start(self) -> SchedulerHandle {
        let (shutdown, signal) = ShutdownSignal::channel();

        info!(
            interval_secs = self.interval.as_secs_f64(),
            health_check_secs = self.health_check_interval.as_secs_f64(),
            "Starting monitor scheduler"
        );

        let cycle_task = tokio::spawn(run_cycles(self.monitor, self.interval, signal.clone()));
        let health_task = self.metrics.map(|metrics| {
            tokio::spawn(run_health_checks(
                metrics,
                self.health_check_interval,
                signal,
            ))
        });

        SchedulerHandle {
            shutdown,
            cycle_task,
            health_task,
        }
    }
}

async fn run_cycles(monitor: Arc<LoanMonitor>, interval: Duration, mut signal: ShutdownSignal) {
    loop {
        if signal.is_triggered() {
            break;
        }

        let started = Instant::now();
        if let Err(e) = monitor.run_cycle(&signal).await {
            warn!(error = %e, "Monitoring cycle skipped");
        }

        let elapsed = started.elapsed();
        let remaining = match interval.checked_sub(elapsed) {
            Some(remaining) => remaining,
            None => {
                warn!(
                    elapsed_ms = elapsed.as_millis(),
                    interval_ms = interval.as_millis(),
                    "Monitoring cycle overran its interval, starting next cycle immediately"
                );
                Duration::ZERO
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(remaining) => {}
            _ = signal.triggered() => break,
        }
    }

    info!("Monitor cycle loop stopped");
}

async fn run_health_checks(
    metrics: Arc<MetricsCollector>,
    interval: Duration,
    mut signal: ShutdownSignal,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = chrono::Utc::now().timestamp().max(0) as u64;
                metrics.check_health(now);
            }
            _ = signal.triggered() => break,
        }
    }
}

/// Handle to a running [`MonitorScheduler`].
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    cycle_task: JoinHandle<()>,
    health_task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Request shutdown and wait for the in-flight cycle to drain.
    pub async fn stop(self) {
        info!("Stopping monitor scheduler");
        let _ = self.shutdown.send(true);

        if let Err(e) = self.cycle_task.await {
            warn!(error = %e, "Cycle loop ended abnormally");
        }
        if let Some(task) = self.health_task {
            if let Err(e) = task.await {
                warn!(error = %e, "Health check loop ended abnormally");
            }
        }
        info!("Monitor scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use alloy::primitives::U256;
    use loan_monitor_chain::PriceSnapshot;

    /// Cycles here run on the wall clock, so the quote must be current.
    fn live_oracle() -> FakeOracle {
        let now = chrono::Utc::now().timestamp() as u64;
        FakeOracle::with(Ok(PriceSnapshot::new(U256::from(1_000_000u64), now)))
    }

    #[tokio::test]
    async fn test_scheduler_runs_repeated_cycles_until_stopped() {
        let harness = Harness::new(
            live_oracle(),
            FakeLoans::default().with("A", loan(200, 100_000_000)),
            FakeRegistry::of(&["A"]),
            FakeExecutor::default(),
        );

        let handle = MonitorScheduler::new(harness.monitor.clone(), Duration::from_millis(20))
            .with_metrics(harness.metrics.clone())
            .with_health_check_interval(Duration::from_millis(10))
            .start();

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.stop().await;

        let cycles = harness.metrics.snapshot().total_cycles;
        assert!(cycles >= 2, "expected repeated cycles, got {cycles}");

        // Nothing runs after stop
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(harness.metrics.snapshot().total_cycles, cycles);
    }

    #[tokio::test]
    async fn test_slow_cycles_never_overlap() {
        // Each cycle takes ~40ms against a 5ms interval
        let harness = Harness::new(
            live_oracle(),
            FakeLoans::default().with("B", loan(200, 150_000_000)),
            FakeRegistry::of(&["B"]),
            FakeExecutor::default().with_delay(Duration::from_millis(40)),
        );

        let handle =
            MonitorScheduler::new(harness.monitor.clone(), Duration::from_millis(5)).start();
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.stop().await;

        // An overlapping cycle would be rejected with CycleInProgress and
        // never recorded, so every recorded cycle ran its borrower.
        let cycles = harness.metrics.snapshot().total_cycles as usize;
        let submitted = harness.executor.actions().len();
        assert!(cycles >= 2);
        assert!(submitted + 1 >= cycles && submitted <= cycles);
        assert_eq!(harness.monitor.phase(), crate::monitor::CyclePhase::Idle);
    }

    #[tokio::test]
    async fn test_stop_drains_in_flight_cycle() {
        let harness = Harness::new(
            live_oracle(),
            FakeLoans::default().with("B", loan(200, 150_000_000)),
            FakeRegistry::of(&["B"]),
            FakeExecutor::default().with_delay(Duration::from_millis(80)),
        );

        let handle =
            MonitorScheduler::new(harness.monitor.clone(), Duration::from_secs(60)).start();
        // Stop while the first cycle waits on the executor
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop().await;

        let m = harness.metrics.snapshot();
        assert_eq!(m.total_cycles, 1);
        assert_eq!(m.total_warnings_issued, 1);
    }
}
