//! Borrower registry interface and an in-memory implementation.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::LedgerError;
use crate::ledger::LoanRepository;
use crate::types::BorrowerId;

/// Source of the borrowers to evaluate each cycle.
#[async_trait]
pub trait BorrowerRegistry: Send + Sync {
    /// Borrowers with nonzero outstanding debt, in a stable order.
    async fn active_borrowers(&self) -> Result<Vec<BorrowerId>, LedgerError>;
}

/// Operator-seeded borrower list.
///
/// Keeps insertion order and ignores duplicates. Without a filter every entry
/// is reported as active with no ledger reads, which suits a list already
/// known to carry debt. [`with_debt_filter`] drops repaid loans, at the price
/// of reading each indebted loan twice per cycle (here and in the monitor).
///
/// [`with_debt_filter`]: StaticBorrowerRegistry::with_debt_filter
pub struct StaticBorrowerRegistry {
    borrowers: RwLock<Vec<BorrowerId>>,
    debt_filter: Option<Arc<dyn LoanRepository>>,
}

impl Default for StaticBorrowerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticBorrowerRegistry {
    pub fn new() -> Self {
        Self {
            borrowers: RwLock::new(Vec::new()),
            debt_filter: None,
        }
    }

    /// Create a registry seeded with `borrowers`.
    pub fn with_borrowers(borrowers: impl IntoIterator<Item = BorrowerId>) -> Self {
        let registry = Self::new();
        for borrower in borrowers {
            registry.add(borrower);
        }
        registry
    }

    /// Only report borrowers whose loan in `loans` still carries debt.
    pub fn with_debt_filter(mut self, loans: Arc<dyn LoanRepository>) -> Self {
        self.debt_filter = Some(loans);
        self
    }

    /// Add a borrower. Returns false if already present.
    pub fn add(&self, borrower: BorrowerId) -> bool {
        let mut borrowers = self.borrowers.write();
        if borrowers.contains(&borrower) {
            return false;
        }
        debug!(borrower = %borrower, "Borrower added to registry");
        borrowers.push(borrower);
        true
    }

    /// Remove a borrower (e.g. after liquidation). Returns false if absent.
    pub fn remove(&self, borrower: &BorrowerId) -> bool {
        let mut borrowers = self.borrowers.write();
        let before = borrowers.len();
        borrowers.retain(|b| b != borrower);
        before != borrowers.len()
    }

    pub fn contains(&self, borrower: &BorrowerId) -> bool {
        self.borrowers.read().contains(borrower)
    }

    pub fn len(&self) -> usize {
        self.borrowers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.borrowers.read().is_empty()
    }

    /// All registered borrowers, active or not.
    pub fn borrowers(&self) -> Vec<BorrowerId> {
        self.borrowers.read().clone()
    }
}

#[async_trait]
impl BorrowerRegistry for StaticBorrowerRegistry {
    async fn active_borrowers(&self) -> Result<Vec<BorrowerId>, LedgerError> {
        let Some(loans) = &self.debt_filter else {
            return Ok(self.borrowers());
        };

        let mut active = Vec::new();
        for borrower in self.borrowers() {
            match loans.get_loan(&borrower).await {
                Ok(Some(loan)) if loan.has_outstanding_debt() => active.push(borrower),
                Ok(_) => {}
                Err(e) => {
                    // Keep it: the monitor will retry the read and record the failure
                    warn!(borrower = %borrower, error = %e, "Loan lookup failed while filtering registry");
                    active.push(borrower);
                }
            }
        }

        Ok(active)
    }
}
