//! In-memory collaborators for engine tests.

use alloy::primitives::{B256, U256};
use async_trait::async_trait;
use loan_monitor_chain::{
    ActionExecutor, ActionReceipt, BorrowerId, BorrowerRegistry, ExecutorError, LedgerError,
    Loan, LoanAction, LoanRepository, PriceOracle, PriceSnapshot,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::BotConfig;
use crate::metrics::MetricsCollector;
use crate::monitor::{LoanMonitor, MonitorCollaborators};
use crate::u256_math::pow10;

pub const NOW: u64 = 1_700_000_000;

/// Loan with `collateral_tokens` whole tokens and `debt` quote units.
pub fn loan(collateral_tokens: u64, debt: u64) -> Loan {
    Loan {
        collateral_amount: U256::from(collateral_tokens) * pow10(18),
        outstanding_debt: U256::from(debt),
        last_payment_time: NOW,
        ..Default::default()
    }
}

pub struct FakeOracle {
    pub price: Mutex<Result<PriceSnapshot, String>>,
    pub calls: AtomicUsize,
}

impl FakeOracle {
    pub fn fresh(price: u64) -> Self {
        Self::with(Ok(PriceSnapshot::new(U256::from(price), NOW - 60)))
    }

    pub fn with(price: Result<PriceSnapshot, String>) -> Self {
        Self {
            price: Mutex::new(price),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PriceOracle for FakeOracle {
    async fn get_price(&self, _asset: &str) -> Result<PriceSnapshot, LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.price.lock().clone().map_err(LedgerError::Transient)
    }
}

#[derive(Default)]
pub struct FakeLoans {
    pub loans: HashMap<BorrowerId, Loan>,
    pub failing: HashSet<BorrowerId>,
    pub calls: AtomicUsize,
}

impl FakeLoans {
    pub fn with(mut self, id: &str, loan: Loan) -> Self {
        self.loans.insert(id.into(), loan);
        self
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.into());
        self
    }
}

#[async_trait]
impl LoanRepository for FakeLoans {
    async fn get_loan(&self, borrower: &BorrowerId) -> Result<Option<Loan>, LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(borrower) {
            return Err(LedgerError::Transient("node unreachable".into()));
        }
        Ok(self.loans.get(borrower).cloned())
    }
}

pub struct FakeRegistry(pub Result<Vec<BorrowerId>, String>);

impl FakeRegistry {
    pub fn of(ids: &[&str]) -> Self {
        Self(Ok(ids.iter().map(|id| BorrowerId::from(*id)).collect()))
    }
}

#[async_trait]
impl BorrowerRegistry for FakeRegistry {
    async fn active_borrowers(&self) -> Result<Vec<BorrowerId>, LedgerError> {
        self.0.clone().map_err(LedgerError::Transient)
    }
}

#[derive(Default)]
pub struct FakeExecutor {
    pub submitted: Mutex<Vec<LoanAction>>,
    pub failing: HashSet<BorrowerId>,
    pub reward: U256,
    pub delay: Duration,
}

impl FakeExecutor {
    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn actions(&self) -> Vec<LoanAction> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl ActionExecutor for FakeExecutor {
    async fn submit(&self, action: &LoanAction) -> Result<ActionReceipt, ExecutorError> {
        self.submitted.lock().push(action.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(action.borrower()) {
            return Err(ExecutorError::ConfirmationTimeout {
                hash: B256::repeat_byte(0xee),
                attempts: 20,
            });
        }
        Ok(ActionReceipt {
            action: action.clone(),
            tx_hash: B256::repeat_byte(0x01),
            reward: self.reward,
            attempts: 1,
        })
    }
}

/// A monitor wired to fakes, with handles kept for assertions.
pub struct Harness {
    pub monitor: Arc<LoanMonitor>,
    pub oracle: Arc<FakeOracle>,
    pub loans: Arc<FakeLoans>,
    pub executor: Arc<FakeExecutor>,
    pub metrics: Arc<MetricsCollector>,
}

impl Harness {
    pub fn new(
        oracle: FakeOracle,
        loans: FakeLoans,
        registry: FakeRegistry,
        executor: FakeExecutor,
    ) -> Self {
        let oracle = Arc::new(oracle);
        let loans = Arc::new(loans);
        let executor = Arc::new(executor);
        let metrics = Arc::new(MetricsCollector::started_at(NOW));

        let monitor = LoanMonitor::new(
            &BotConfig::default(),
            MonitorCollaborators {
                oracle: oracle.clone(),
                loans: loans.clone(),
                registry: Arc::new(registry),
                executor: executor.clone(),
                sink: metrics.clone(),
            },
        );

        Self {
            monitor: Arc::new(monitor),
            oracle,
            loans,
            executor,
            metrics,
        }
    }
}
