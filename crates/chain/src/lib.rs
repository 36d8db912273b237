//! Loan monitor ledger interaction layer.
//!
//! This crate provides:
//! - Domain types shared by every crate (loans, prices, actions)
//! - Collaborator interfaces for price, loan and borrower reads
//! - A Soroban JSON-RPC client for submission and status polling
//! - Transaction execution with bounded confirmation polling
//! - An in-memory borrower registry

mod error;
mod executor;
mod ledger;
mod registry;
mod soroban;
mod types;

pub use error::{ExecutorError, LedgerError};
pub use executor::{ActionExecutor, ConfirmationPolicy, EnvelopeSigner, TransactionExecutor};
pub use ledger::{LoanRepository, PriceOracle};
pub use registry::{BorrowerRegistry, StaticBorrowerRegistry};
pub use soroban::{LedgerRpc, SorobanRpcClient};
pub use types::{
    ActionKind, ActionReceipt, BorrowerId, Loan, LoanAction, PriceSnapshot, SignedEnvelope,
    TransactionStatus,
};
