//! HTTP clients for the services around the loan monitor.
//!
//! This crate provides clients for:
//! - Loan indexer: collateral prices, loan snapshots and active borrowers
//! - Signing service: build, simulate and sign lending pool calls

mod indexer;
mod signer;

pub use indexer::IndexerClient;
pub use signer::{RemoteSigner, RemoteSignerBuilder};
