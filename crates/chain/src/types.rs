//! Ledger data types shared by every layer of the monitor.

use alloy::primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger account identifier of a borrower.
///
/// Kept as an opaque string (e.g. a Stellar `G...` strkey); the engine only
/// needs equality, ordering and display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BorrowerId(String);

impl BorrowerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BorrowerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BorrowerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BorrowerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Read-only snapshot of a loan as stored by the lending pool.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Loan {
    /// Collateral held, in the collateral token's smallest unit (18 decimals)
    pub collateral_amount: U256,
    /// Principal still owed, in quote units (6 decimals)
    pub outstanding_debt: U256,
    /// Accrued penalties, in quote units (6 decimals)
    pub penalties: U256,
    /// Unix seconds of the last repayment
    pub last_payment_time: u64,
    /// Warnings already issued on-chain (0..=3)
    pub warnings_issued: u32,
    /// Unix seconds of the last on-chain warning
    pub last_warning_time: u64,
}

impl Loan {
    /// Outstanding debt plus penalties.
    pub fn total_debt(&self) -> U256 {
        self.outstanding_debt.saturating_add(self.penalties)
    }

    /// Whether the borrower still owes principal.
    pub fn has_outstanding_debt(&self) -> bool {
        !self.outstanding_debt.is_zero()
    }
}

/// Collateral price quote taken once per monitoring cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSnapshot {
    /// Quote units (6 decimals) per whole collateral token
    pub price: U256,
    /// Unix seconds at which the oracle published the price
    pub timestamp: u64,
}

impl PriceSnapshot {
    pub fn new(price: U256, timestamp: u64) -> Self {
        Self { price, timestamp }
    }

    /// Age of the quote in seconds. Quotes from the future have age zero.
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }

    /// Check if the quote is older than `max_age_secs`.
    pub fn is_stale(&self, max_age_secs: u64, now: u64) -> bool {
        self.age_secs(now) > max_age_secs
    }
}

/// Kind of on-chain action the monitor can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Warning,
    Liquidation,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Liquidation => f.write_str("liquidation"),
        }
    }
}

/// A side-effecting lending pool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method")]
pub enum LoanAction {
    /// `check_and_issue_warning(borrower)`
    #[serde(rename = "check_and_issue_warning")]
    IssueWarning { borrower: BorrowerId },
    /// `liquidate_loan(liquidator, borrower)`; the liquidator is the signer
    #[serde(rename = "liquidate_loan")]
    Liquidate { borrower: BorrowerId },
}

impl LoanAction {
    pub fn borrower(&self) -> &BorrowerId {
        match self {
            Self::IssueWarning { borrower } | Self::Liquidate { borrower } => borrower,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::IssueWarning { .. } => ActionKind::Warning,
            Self::Liquidate { .. } => ActionKind::Liquidation,
        }
    }

    /// Lending pool contract method invoked by this action.
    pub fn contract_method(&self) -> &'static str {
        match self {
            Self::IssueWarning { .. } => "check_and_issue_warning",
            Self::Liquidate { .. } => "liquidate_loan",
        }
    }
}

/// Confirmed outcome of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReceipt {
    pub action: LoanAction,
    pub tx_hash: B256,
    /// Liquidator reward reported by simulation (zero for warnings or when unknown)
    pub reward: U256,
    /// Status polls it took to observe confirmation
    pub attempts: u32,
}

/// Ledger status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Not yet visible in a closed ledger
    Pending,
    Success,
    /// Included but failed; carries the ledger's result detail
    Failed(String),
}

/// A built, simulated and signed transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    /// Base64 transaction envelope XDR
    pub envelope_xdr: String,
    /// Reward the simulation says the liquidator receives, when known
    pub expected_reward: Option<U256>,
}
