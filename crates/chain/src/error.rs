//! Error taxonomy for ledger reads and transaction execution.

use alloy::primitives::B256;
use thiserror::Error;

/// Failure reading ledger state (loans, prices, borrower sets).
///
/// A stale price is not an error here: oracles return the quote
/// with its publish timestamp and the health evaluator decides whether it is
/// still usable.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The requested record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Network or node failure; retrying later may succeed
    #[error("transient ledger failure: {0}")]
    Transient(String),

    /// The source answered with data that could not be decoded
    #[error("malformed ledger response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Transient(e.to_string())
        }
    }
}

/// Failure building, submitting or confirming a transaction.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The ledger rejected the call during simulation
    #[error("simulation rejected: {0}")]
    SimulationRejected(String),

    /// The node refused the signed envelope
    #[error("submission failed: {0}")]
    Submission(String),

    /// The transaction was included but failed
    #[error("transaction {hash} failed on ledger: {reason}")]
    Reverted { hash: B256, reason: String },

    /// Confirmation polling gave up
    #[error("transaction {hash} not confirmed after {attempts} attempts")]
    ConfirmationTimeout { hash: B256, attempts: u32 },

    /// RPC or signer endpoint unreachable or returned garbage
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ExecutorError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_error_messages() {
        assert_eq!(
            LedgerError::Transient("timeout".into()).to_string(),
            "transient ledger failure: timeout"
        );
        assert_eq!(LedgerError::NotFound("GABC".into()).to_string(), "not found: GABC");
    }

    #[test]
    fn test_timeout_message_names_hash_and_attempts() {
        let err = ExecutorError::ConfirmationTimeout {
            hash: B256::repeat_byte(0xab),
            attempts: 20,
        };
        let msg = err.to_string();
        assert!(msg.contains("0xabab"));
        assert!(msg.contains("20 attempts"));
    }
}
