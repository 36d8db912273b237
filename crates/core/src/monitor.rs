//! Monitoring cycle orchestration.
//!
//! One cycle:
//! 1. Fetch a single price snapshot and reject it if stale
//! 2. Fetch the active borrower list
//! 3. Evaluate borrowers sequentially against that one snapshot, warning or
//!    liquidating as needed; a failure only affects its own borrower
//! 4. Aggregate a [`CycleReport`] and hand it to the observability sink

use alloy::primitives::{B256, U256};
use loan_monitor_chain::{
    ActionExecutor, ActionKind, BorrowerId, BorrowerRegistry, Loan, LoanAction, LoanRepository,
    PriceOracle, PriceSnapshot,
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::config::BotConfig;
use crate::economics::EconomicsAnalyzer;
use crate::error::MonitorError;
use crate::health::{HealthEvaluator, HealthResult};
use crate::metrics::ObservabilitySink;
use crate::u256_math::{to_decimal, QUOTE_DECIMALS};
use crate::warning::{WarningClassifier, WarningState};

/// Where the monitor is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    FetchingPrice,
    IteratingBorrowers,
    Reporting,
}

/// Why a cycle ended before evaluating any borrower.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    StalePrice { age_secs: u64, max_age_secs: u64 },
    PriceUnavailable(String),
    RegistryUnavailable(String),
}

impl From<&MonitorError> for AbortReason {
    fn from(e: &MonitorError) -> Self {
        match e {
            MonitorError::StalePrice {
                age_secs,
                max_age_secs,
            } => Self::StalePrice {
                age_secs: *age_secs,
                max_age_secs: *max_age_secs,
            },
            MonitorError::Registry(source) => Self::RegistryUnavailable(source.to_string()),
            other => Self::PriceUnavailable(other.to_string()),
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StalePrice {
                age_secs,
                max_age_secs,
            } => write!(f, "stale price ({age_secs}s old, max {max_age_secs}s)"),
            Self::PriceUnavailable(e) => write!(f, "price unavailable: {e}"),
            Self::RegistryUnavailable(e) => write!(f, "registry unavailable: {e}"),
        }
    }
}

/// Cycle-scoped state shared by every borrower evaluation.
#[derive(Debug, Clone, Copy)]
pub struct CycleContext {
    pub cycle_id: u64,
    /// The one price snapshot every borrower in this cycle is judged against
    pub price: PriceSnapshot,
    /// Unix seconds, captured once at cycle start
    pub now: u64,
    pub started: Instant,
}

/// Result of processing one borrower.
#[derive(Debug, Clone, PartialEq)]
pub struct BorrowerOutcome {
    pub borrower: BorrowerId,
    /// False when a fetch, evaluation or executor call failed
    pub success: bool,
    pub healthy: bool,
    /// `None` when the loan could not be evaluated
    pub health_factor: Option<f64>,
    pub warning_state: Option<WarningState>,
    pub warning_issued: bool,
    pub liquidated: bool,
    pub reward: Option<U256>,
    pub tx_hash: Option<B256>,
    pub skipped_unprofitable: bool,
    pub error: Option<String>,
}

impl BorrowerOutcome {
    fn evaluated(borrower: &BorrowerId, health: &HealthResult) -> Self {
        Self {
            borrower: borrower.clone(),
            success: true,
            healthy: health.is_healthy,
            health_factor: Some(health.health_factor),
            warning_state: None,
            warning_issued: false,
            liquidated: false,
            reward: None,
            tx_hash: None,
            skipped_unprofitable: false,
            error: None,
        }
    }

    /// Absent loan or no debt.
    fn no_debt(borrower: &BorrowerId) -> Self {
        Self {
            borrower: borrower.clone(),
            success: true,
            healthy: true,
            health_factor: Some(f64::INFINITY),
            warning_state: Some(WarningState::Healthy),
            warning_issued: false,
            liquidated: false,
            reward: None,
            tx_hash: None,
            skipped_unprofitable: false,
            error: None,
        }
    }

    fn failed(borrower: &BorrowerId, error: &MonitorError) -> Self {
        Self {
            borrower: borrower.clone(),
            success: false,
            healthy: false,
            health_factor: None,
            warning_state: None,
            warning_issued: false,
            liquidated: false,
            reward: None,
            tx_hash: None,
            skipped_unprofitable: false,
            error: Some(error.to_string()),
        }
    }

    fn with_error(mut self, error: &MonitorError) -> Self {
        self.success = false;
        self.error = Some(error.to_string());
        self
    }
}

/// Aggregate of one monitoring cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle_id: u64,
    pub borrowers_checked: usize,
    pub warnings_issued: usize,
    pub liquidations_executed: usize,
    pub skipped_unprofitable: usize,
    pub errors: usize,
    pub elapsed: Duration,
    pub aborted: Option<AbortReason>,
    /// Shutdown stopped borrower iteration early
    pub interrupted: bool,
    pub outcomes: Vec<BorrowerOutcome>,
}

impl CycleReport {
    pub fn empty(cycle_id: u64) -> Self {
        Self {
            cycle_id,
            borrowers_checked: 0,
            warnings_issued: 0,
            liquidations_executed: 0,
            skipped_unprofitable: 0,
            errors: 0,
            elapsed: Duration::ZERO,
            aborted: None,
            interrupted: false,
            outcomes: Vec::new(),
        }
    }

    /// Zero-count report for a cycle that never reached its borrowers.
    pub fn aborted(cycle_id: u64, reason: AbortReason, elapsed: Duration) -> Self {
        Self {
            elapsed,
            aborted: Some(reason),
            ..Self::empty(cycle_id)
        }
    }

    fn from_outcomes(
        cycle_id: u64,
        outcomes: Vec<BorrowerOutcome>,
        elapsed: Duration,
        interrupted: bool,
    ) -> Self {
        let count = |f: fn(&BorrowerOutcome) -> bool| outcomes.iter().filter(|o| f(o)).count();
        Self {
            cycle_id,
            borrowers_checked: outcomes.len(),
            warnings_issued: count(|o| o.warning_issued),
            liquidations_executed: count(|o| o.liquidated),
            skipped_unprofitable: count(|o| o.skipped_unprofitable),
            errors: count(|o| !o.success),
            elapsed,
            aborted: None,
            interrupted,
            outcomes,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }
}

/// Cooperative shutdown flag, checked between borrowers.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Create a signal and the sender that triggers it.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self::channel().1
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is requested. Pends forever if the sender is gone.
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Collaborators the monitor reads from and acts through.
pub struct MonitorCollaborators {
    pub oracle: Arc<dyn PriceOracle>,
    pub loans: Arc<dyn LoanRepository>,
    pub registry: Arc<dyn BorrowerRegistry>,
    pub executor: Arc<dyn ActionExecutor>,
    pub sink: Arc<dyn ObservabilitySink>,
}

/// Resets the phase to `Idle` when a cycle ends, however it ends.
struct PhaseGuard<'a> {
    phase: &'a Mutex<CyclePhase>,
}

impl PhaseGuard<'_> {
    fn set(&self, next: CyclePhase) {
        *self.phase.lock() = next;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.phase.lock() = CyclePhase::Idle;
    }
}

/// The loan risk decision engine.
pub struct LoanMonitor {
    oracle: Arc<dyn PriceOracle>,
    loans: Arc<dyn LoanRepository>,
    registry: Arc<dyn BorrowerRegistry>,
    executor: Arc<dyn ActionExecutor>,
    sink: Arc<dyn ObservabilitySink>,
    health: HealthEvaluator,
    warnings: WarningClassifier,
    economics: EconomicsAnalyzer,
    collateral_asset: String,
    phase: Mutex<CyclePhase>,
    next_cycle_id: AtomicU64,
}

impl LoanMonitor {
    pub fn new(config: &BotConfig, collaborators: MonitorCollaborators) -> Self {
        Self {
            oracle: collaborators.oracle,
            loans: collaborators.loans,
            registry: collaborators.registry,
            executor: collaborators.executor,
            sink: collaborators.sink,
            health: HealthEvaluator::new(config.health.clone()),
            warnings: WarningClassifier::new(
                config.warnings.clone(),
                config.health.liquidation_threshold,
            ),
            economics: EconomicsAnalyzer::new(&config.liquidation),
            collateral_asset: config.network.collateral_asset.clone(),
            phase: Mutex::new(CyclePhase::Idle),
            next_cycle_id: AtomicU64::new(1),
        }
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.lock()
    }

    /// Run one cycle at the current wall-clock time.
    pub async fn run_cycle(&self, shutdown: &ShutdownSignal) -> Result<CycleReport, MonitorError> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.run_cycle_at(now, shutdown).await
    }

    /// Run one cycle, judging every borrower at `now` (unix seconds).
    ///
    /// Only fails with [`MonitorError::CycleInProgress`]. Price and registry
    /// failures produce an aborted report instead.
    #[instrument(skip(self, shutdown), fields(cycle_id = tracing::field::Empty))]
    pub async fn run_cycle_at(
        &self,
        now: u64,
        shutdown: &ShutdownSignal,
    ) -> Result<CycleReport, MonitorError> {
        let guard = self.begin_cycle()?;
        let cycle_id = self.next_cycle_id.fetch_add(1, Ordering::Relaxed);
        tracing::Span::current().record("cycle_id", cycle_id);
        let started = Instant::now();

        let price = match self.fetch_price(now).await {
            Ok(price) => price,
            Err(e) => return Ok(self.abort(&guard, cycle_id, &e, started)),
        };

        let borrowers = match self.registry.active_borrowers().await {
            Ok(borrowers) => borrowers,
            Err(source) => {
                let e = MonitorError::Registry(source);
                return Ok(self.abort(&guard, cycle_id, &e, started));
            }
        };

        info!(
            borrowers = borrowers.len(),
            price = %price.price,
            price_age_secs = price.age_secs(now),
            "Monitoring loans"
        );

        guard.set(CyclePhase::IteratingBorrowers);
        let ctx = CycleContext {
            cycle_id,
            price,
            now,
            started,
        };

        let mut outcomes = Vec::with_capacity(borrowers.len());
        let mut interrupted = false;
        for borrower in &borrowers {
            if shutdown.is_triggered() {
                interrupted = true;
                info!(
                    processed = outcomes.len(),
                    remaining = borrowers.len() - outcomes.len(),
                    "Shutdown requested, stopping borrower iteration"
                );
                break;
            }

            let outcome = match self.process_borrower(&ctx, borrower).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(borrower = %borrower, error = %e, "Failed to monitor loan");
                    BorrowerOutcome::failed(borrower, &e)
                }
            };
            outcomes.push(outcome);
        }

        guard.set(CyclePhase::Reporting);
        let report =
            CycleReport::from_outcomes(cycle_id, outcomes, ctx.started.elapsed(), interrupted);
        self.sink.record_cycle(&report);

        info!(
            borrowers = report.borrowers_checked,
            warnings = report.warnings_issued,
            liquidations = report.liquidations_executed,
            skipped_unprofitable = report.skipped_unprofitable,
            errors = report.errors,
            interrupted = report.interrupted,
            elapsed_ms = report.elapsed.as_millis(),
            "Monitoring cycle completed"
        );

        Ok(report)
    }

    fn begin_cycle(&self) -> Result<PhaseGuard<'_>, MonitorError> {
        let mut phase = self.phase.lock();
        if *phase != CyclePhase::Idle {
            warn!(phase = ?*phase, "Cycle requested while another is running");
            return Err(MonitorError::CycleInProgress);
        }
        *phase = CyclePhase::FetchingPrice;
        Ok(PhaseGuard { phase: &self.phase })
    }

    async fn fetch_price(&self, now: u64) -> Result<PriceSnapshot, MonitorError> {
        let price = self
            .oracle
            .get_price(&self.collateral_asset)
            .await
            .map_err(MonitorError::PriceUnavailable)?;
        self.health.check_price(&price, now)?;
        Ok(price)
    }

    fn abort(
        &self,
        guard: &PhaseGuard<'_>,
        cycle_id: u64,
        e: &MonitorError,
        started: Instant,
    ) -> CycleReport {
        error!(error = %e, "Monitoring cycle aborted, no borrowers processed");
        guard.set(CyclePhase::Reporting);
        let report = CycleReport::aborted(cycle_id, AbortReason::from(e), started.elapsed());
        self.sink.record_cycle(&report);
        report
    }

    #[instrument(skip(self, ctx), fields(borrower = %borrower))]
    async fn process_borrower(
        &self,
        ctx: &CycleContext,
        borrower: &BorrowerId,
    ) -> Result<BorrowerOutcome, MonitorError> {
        let loan = self
            .loans
            .get_loan(borrower)
            .await
            .map_err(|source| MonitorError::LoanFetch {
                borrower: borrower.clone(),
                source,
            })?;

        let loan = match loan {
            Some(loan) if !loan.total_debt().is_zero() => loan,
            _ => {
                debug!("No outstanding debt");
                return Ok(BorrowerOutcome::no_debt(borrower));
            }
        };

        let health = self.health.evaluate(&loan, &ctx.price, ctx.now)?;
        self.sink.record_health_factor(borrower, health.health_factor);

        if health.needs_liquidation {
            Ok(self.handle_liquidation(borrower, &health).await)
        } else {
            Ok(self.handle_warning(ctx, borrower, &loan, &health).await)
        }
    }

    async fn handle_liquidation(
        &self,
        borrower: &BorrowerId,
        health: &HealthResult,
    ) -> BorrowerOutcome {
        let mut outcome = BorrowerOutcome::evaluated(borrower, health);
        outcome.warning_state = Some(WarningState::Liquidatable);

        let economics = self.economics.analyze(health);
        if !self.economics.should_liquidate(&economics) {
            warn!(
                health_factor = health.health_factor,
                reward = to_decimal(economics.liquidator_reward, QUOTE_DECIMALS),
                gas_cost = to_decimal(economics.gas_cost, QUOTE_DECIMALS),
                profit = %economics.profit,
                "Liquidation not profitable, skipping"
            );
            outcome.skipped_unprofitable = true;
            return outcome;
        }

        warn!(
            health_factor = health.health_factor,
            collateral_value = to_decimal(economics.collateral_value, QUOTE_DECIMALS),
            reward = to_decimal(economics.liquidator_reward, QUOTE_DECIMALS),
            profit = %economics.profit,
            "Executing liquidation"
        );

        let action = LoanAction::Liquidate {
            borrower: borrower.clone(),
        };
        match self.executor.submit(&action).await {
            Ok(receipt) => {
                self.sink
                    .record_liquidation(true, receipt.reward, economics.gas_cost);
                info!(tx_hash = %receipt.tx_hash, reward = %receipt.reward, "Liquidation confirmed");
                outcome.liquidated = true;
                outcome.reward = Some(receipt.reward);
                outcome.tx_hash = Some(receipt.tx_hash);
                outcome
            }
            Err(source) => {
                self.sink
                    .record_liquidation(false, U256::ZERO, economics.gas_cost);
                let e = MonitorError::Executor {
                    action: ActionKind::Liquidation,
                    borrower: borrower.clone(),
                    source,
                };
                error!(error = %e, "Liquidation failed");
                outcome.with_error(&e)
            }
        }
    }

    async fn handle_warning(
        &self,
        ctx: &CycleContext,
        borrower: &BorrowerId,
        loan: &Loan,
        health: &HealthResult,
    ) -> BorrowerOutcome {
        let mut outcome = BorrowerOutcome::evaluated(borrower, health);
        let state = self.warnings.classify(health, loan, ctx.now);
        outcome.warning_state = Some(state);

        if !self.warnings.should_issue(state, loan, ctx.now) {
            debug!(
                health_factor = health.health_factor,
                warning_state = %state,
                warnings_issued = loan.warnings_issued,
                "Loan evaluated, no action"
            );
            return outcome;
        }

        warn!(
            health_factor = health.health_factor,
            warning_state = %state,
            warnings_issued = loan.warnings_issued,
            "Issuing warning"
        );

        let action = LoanAction::IssueWarning {
            borrower: borrower.clone(),
        };
        match self.executor.submit(&action).await {
            Ok(receipt) => {
                if let Some(number) = state.warning_number() {
                    self.sink.record_warning(number);
                }
                outcome.warning_issued = true;
                outcome.tx_hash = Some(receipt.tx_hash);
                outcome
            }
            Err(source) => {
                let e = MonitorError::Executor {
                    action: ActionKind::Warning,
                    borrower: borrower.clone(),
                    source,
                };
                error!(error = %e, "Warning issuance failed");
                outcome.with_error(&e)
            }
        }
    }
}
