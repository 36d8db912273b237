//! Read-side collaborator interfaces: price oracle and loan storage.
//!
//! Error modes for both traits:
//! - [`LedgerError::NotFound`]: the asset or record does not exist
//! - [`LedgerError::Transient`]: network/node failure, worth retrying next cycle
//! - [`LedgerError::Malformed`]: the source answered with undecodable data
//!
//! Stale data is returned as-is together with its timestamp; deciding
//! whether a quote is too old belongs to the caller.

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::types::{BorrowerId, Loan, PriceSnapshot};

/// Source of collateral prices.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Latest price for `asset`, in quote units per whole collateral token.
    async fn get_price(&self, asset: &str) -> Result<PriceSnapshot, LedgerError>;
}

/// Source of loan snapshots.
#[async_trait]
pub trait LoanRepository: Send + Sync {
    /// Current loan of `borrower`, or `None` if the borrower has no loan.
    async fn get_loan(&self, borrower: &BorrowerId) -> Result<Option<Loan>, LedgerError>;
}
