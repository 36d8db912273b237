//! Graduated warning classification.
//!
//! The state is recomputed from scratch each cycle. Only the loan's
//! `warnings_issued` and `last_warning_time` persist on the ledger, so a
//! loan can move back toward `Healthy` after a repayment.

use loan_monitor_chain::Loan;
use std::fmt;

use crate::config::WarningConfig;
use crate::health::HealthResult;

/// Severity classification of a loan, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WarningState {
    Healthy,
    Warning1,
    Warning2,
    /// Final warning before liquidation
    Warning3,
    Liquidatable,
}

impl WarningState {
    /// Ordinal of the warning this state corresponds to, if any.
    pub fn warning_number(&self) -> Option<u32> {
        match self {
            Self::Warning1 => Some(1),
            Self::Warning2 => Some(2),
            Self::Warning3 => Some(3),
            Self::Healthy | Self::Liquidatable => None,
        }
    }
}

impl fmt::Display for WarningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Healthy => "HEALTHY",
            Self::Warning1 => "WARNING_1",
            Self::Warning2 => "WARNING_2",
            Self::Warning3 => "WARNING_3",
            Self::Liquidatable => "LIQUIDATABLE",
        };
        f.write_str(s)
    }
}

/// Classifies loans into [`WarningState`]s and gates warning issuance.
#[derive(Debug, Clone)]
pub struct WarningClassifier {
    config: WarningConfig,
    liquidation_threshold: f64,
}

impl WarningClassifier {
    pub fn new(config: WarningConfig, liquidation_threshold: f64) -> Self {
        Self {
            config,
            liquidation_threshold,
        }
    }

    /// Most severe state whose condition holds.
    pub fn classify(&self, health: &HealthResult, loan: &Loan, now: u64) -> WarningState {
        let hf = health.health_factor;
        let interval = self.config.warning_interval_secs;
        let since_payment = now.saturating_sub(loan.last_payment_time);

        if hf <= self.liquidation_threshold {
            return WarningState::Liquidatable;
        }

        if hf <= self.config.warning3_threshold {
            return WarningState::Warning3;
        }

        if hf <= self.config.warning2_threshold
            || (loan.warnings_issued >= 1 && since_payment >= interval.saturating_mul(2))
        {
            return WarningState::Warning2;
        }

        if hf <= self.config.warning1_threshold || since_payment >= interval {
            return WarningState::Warning1;
        }

        WarningState::Healthy
    }

    /// Whether a warning for `state` should be issued now.
    ///
    /// Each warning number fires at most once, in order, and warnings after
    /// the first wait a full interval since the previous one.
    pub fn should_issue(&self, state: WarningState, loan: &Loan, now: u64) -> bool {
        if loan.warnings_issued >= self.config.max_warnings {
            return false;
        }

        let interval_elapsed =
            now.saturating_sub(loan.last_warning_time) >= self.config.warning_interval_secs;

        match state {
            WarningState::Warning1 => loan.warnings_issued == 0,
            WarningState::Warning2 => loan.warnings_issued == 1 && interval_elapsed,
            WarningState::Warning3 => loan.warnings_issued == 2 && interval_elapsed,
            WarningState::Healthy | WarningState::Liquidatable => false,
        }
    }
}
