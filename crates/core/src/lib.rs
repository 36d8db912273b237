//! Loan monitoring core logic.
//!
//! This crate provides the decision engine of the loan monitor:
//! - Health factor evaluation against a single price snapshot
//! - Escalating warning classification and issuance rules
//! - Liquidation profitability analysis
//! - Monitoring cycle orchestration and scheduling
//! - In-process metrics and self health checks
//!
//! Ledger access and transaction submission live behind the traits in
//! `loan_monitor_chain`.

pub mod config;
mod economics;
mod error;
mod health;
mod metrics;
mod monitor;
mod scheduler;
pub mod u256_math;
mod warning;

#[cfg(test)]
mod testing;

pub use config::{
    BotConfig, ConfirmationConfig, HealthConfig, LiquidationConfig, NetworkConfig, ScannerConfig,
    WarningConfig,
};
pub use economics::{EconomicsAnalyzer, LiquidationEconomics};
pub use error::MonitorError;
pub use health::{HealthEvaluator, HealthResult};
pub use metrics::{HealthAlert, LiquidationMetrics, MetricsCollector, ObservabilitySink};
pub use monitor::{
    AbortReason, BorrowerOutcome, CycleContext, CyclePhase, CycleReport, LoanMonitor,
    MonitorCollaborators, ShutdownSignal,
};
pub use scheduler::{MonitorScheduler, SchedulerHandle};
pub use warning::{WarningClassifier, WarningState};
