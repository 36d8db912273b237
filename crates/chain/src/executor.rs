//! Transaction execution for warnings and liquidations.
//!
//! Both actions share one pipeline: sign (build + simulate + sign), submit,
//! then poll for confirmation with a bounded number of attempts.

use alloy::primitives::{B256, U256};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::ExecutorError;
use crate::soroban::LedgerRpc;
use crate::types::{ActionKind, ActionReceipt, LoanAction, SignedEnvelope, TransactionStatus};

/// Executes loan actions on the ledger.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Submit `action` and wait until it is confirmed or definitely failed.
    async fn submit(&self, action: &LoanAction) -> Result<ActionReceipt, ExecutorError>;
}

/// Builds, simulates and signs an action into a submittable envelope.
///
/// Simulation rejection must surface as [`ExecutorError::SimulationRejected`].
#[async_trait]
pub trait EnvelopeSigner: Send + Sync {
    async fn sign(&self, action: &LoanAction) -> Result<SignedEnvelope, ExecutorError>;
}

/// Bounds for confirmation polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    /// Delay between status polls
    pub poll_interval: Duration,
    /// Maximum status polls before giving up
    pub max_attempts: u32,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_attempts: 20,
        }
    }
}

impl ConfirmationPolicy {
    /// Longest time a confirmation can take before timing out.
    pub fn worst_case(&self) -> Duration {
        self.poll_interval * self.max_attempts.saturating_sub(1)
    }
}

/// [`ActionExecutor`] backed by a signer and a ledger RPC node.
pub struct TransactionExecutor {
    signer: Arc<dyn EnvelopeSigner>,
    rpc: Arc<dyn LedgerRpc>,
    policy: ConfirmationPolicy,
    /// Serializes submissions from the shared signing account
    submit_lock: Mutex<()>,
}

impl TransactionExecutor {
    pub fn new(
        signer: Arc<dyn EnvelopeSigner>,
        rpc: Arc<dyn LedgerRpc>,
        policy: ConfirmationPolicy,
    ) -> Self {
        Self {
            signer,
            rpc,
            policy,
            submit_lock: Mutex::new(()),
        }
    }

    /// Poll until the transaction resolves. Returns the attempts used.
    async fn await_confirmation(&self, hash: B256) -> Result<u32, ExecutorError> {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.rpc.get_transaction(hash).await {
                Ok(TransactionStatus::Success) => return Ok(attempt),
                Ok(TransactionStatus::Failed(reason)) => {
                    return Err(ExecutorError::Reverted { hash, reason });
                }
                Ok(TransactionStatus::Pending) => {
                    debug!(tx_hash = %hash, attempt, "Transaction not yet confirmed");
                }
                Err(e) => {
                    // A failed poll spends an attempt but does not fail the action
                    warn!(tx_hash = %hash, attempt, error = %e, "Status poll failed");
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.policy.poll_interval).await;
            }
        }

        Err(ExecutorError::ConfirmationTimeout {
            hash,
            attempts: max_attempts,
        })
    }
}

#[async_trait]
impl ActionExecutor for TransactionExecutor {
    #[instrument(skip(self), fields(action = %action.kind(), borrower = %action.borrower()))]
    async fn submit(&self, action: &LoanAction) -> Result<ActionReceipt, ExecutorError> {
        let _guard = self.submit_lock.lock().await;
        let start = Instant::now();

        let envelope = self.signer.sign(action).await?;
        let sign_elapsed = start.elapsed();

        let tx_hash = self.rpc.send_transaction(&envelope.envelope_xdr).await?;
        info!(
            tx_hash = %tx_hash,
            method = action.contract_method(),
            sign_ms = sign_elapsed.as_millis(),
            "Transaction submitted, waiting for confirmation"
        );

        let attempts = self.await_confirmation(tx_hash).await?;

        let reward = match action.kind() {
            ActionKind::Liquidation => envelope.expected_reward.unwrap_or(U256::ZERO),
            ActionKind::Warning => U256::ZERO,
        };

        info!(
            tx_hash = %tx_hash,
            attempts,
            total_ms = start.elapsed().as_millis(),
            "Transaction confirmed"
        );

        Ok(ActionReceipt {
            action: action.clone(),
            tx_hash,
            reward,
            attempts,
        })
    }
}
