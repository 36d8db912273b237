//! Engine error type.

use loan_monitor_chain::{ActionKind, BorrowerId, ExecutorError, LedgerError};
use thiserror::Error;

/// Failures surfaced by the decision engine and the cycle orchestrator.
///
/// Only `StalePrice`, `PriceUnavailable` and `Registry` abort a cycle. The
/// per-borrower variants are caught and recorded in the cycle report.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("price is stale: {age_secs}s old, max {max_age_secs}s")]
    StalePrice { age_secs: u64, max_age_secs: u64 },

    #[error("price unavailable: {0}")]
    PriceUnavailable(#[source] LedgerError),

    #[error("borrower registry unavailable: {0}")]
    Registry(#[source] LedgerError),

    #[error("failed to fetch loan for {borrower}: {source}")]
    LoanFetch {
        borrower: BorrowerId,
        #[source]
        source: LedgerError,
    },

    #[error("{action} for {borrower} failed: {source}")]
    Executor {
        action: ActionKind,
        borrower: BorrowerId,
        #[source]
        source: ExecutorError,
    },

    #[error("a monitoring cycle is already in progress")]
    CycleInProgress,

    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_error_names_action_and_borrower() {
        let err = MonitorError::Executor {
            action: ActionKind::Liquidation,
            borrower: "GABC".into(),
            source: ExecutorError::SimulationRejected("HostError".into()),
        };
        assert_eq!(
            err.to_string(),
            "liquidation for GABC failed: simulation rejected: HostError"
        );
    }

    #[test]
    fn test_stale_price_message() {
        let err = MonitorError::StalePrice {
            age_secs: 90_000,
            max_age_secs: 86_400,
        };
        assert_eq!(err.to_string(), "price is stale: 90000s old, max 86400s");
    }
}
