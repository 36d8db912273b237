//! Cumulative monitor metrics and self-checks.

use alloy::primitives::{I256, U256};
use dashmap::DashMap;
use loan_monitor_chain::BorrowerId;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{error, warn};

use crate::monitor::CycleReport;
use crate::u256_math::signed_diff;

/// Receives cycle results. Fire-and-forget: decision logic never reads back.
pub trait ObservabilitySink: Send + Sync {
    fn record_cycle(&self, report: &CycleReport);

    /// `warning_number` is the ordinal of the warning just issued (1..=3).
    fn record_warning(&self, warning_number: u32);

    /// Gas is charged whether or not the liquidation succeeded.
    fn record_liquidation(&self, success: bool, reward: U256, gas_cost: U256);

    fn record_health_factor(&self, borrower: &BorrowerId, health_factor: f64);
}

/// Liquidation success rate below which the self-check alerts.
const MIN_SUCCESS_RATE: f64 = 0.95;

/// Gap between cycles after which the monitor counts as stalled.
const STALL_THRESHOLD: Duration = Duration::from_secs(60);

/// Cumulative counters since process start.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationMetrics {
    pub total_cycles: u64,
    /// Cycles ended early by a stale or missing price or registry failure
    pub aborted_cycles: u64,
    pub borrowers_checked: u64,
    /// Mean wall time per borrower check (ms)
    pub average_check_time_ms: f64,
    total_processing_ms: f64,

    pub total_warnings_issued: u64,
    pub warning1_count: u64,
    pub warning2_count: u64,
    pub warning3_count: u64,

    pub total_liquidations: u64,
    pub successful_liquidations: u64,
    pub failed_liquidations: u64,
    pub skipped_unprofitable: u64,

    pub total_rewards_earned: U256,
    pub total_gas_spent: U256,
    /// Rewards minus gas over successful liquidations
    pub total_profit: I256,
    pub average_reward_per_liquidation: U256,

    pub lowest_health_factor: f64,
    pub lowest_health_borrower: Option<BorrowerId>,

    /// Unix seconds of the last recorded cycle (0 = never)
    pub last_cycle_time: u64,
    pub cycles_per_hour: f64,
}

impl Default for LiquidationMetrics {
    fn default() -> Self {
        Self {
            total_cycles: 0,
            aborted_cycles: 0,
            borrowers_checked: 0,
            average_check_time_ms: 0.0,
            total_processing_ms: 0.0,
            total_warnings_issued: 0,
            warning1_count: 0,
            warning2_count: 0,
            warning3_count: 0,
            total_liquidations: 0,
            successful_liquidations: 0,
            failed_liquidations: 0,
            skipped_unprofitable: 0,
            total_rewards_earned: U256::ZERO,
            total_gas_spent: U256::ZERO,
            total_profit: I256::ZERO,
            average_reward_per_liquidation: U256::ZERO,
            lowest_health_factor: f64::INFINITY,
            lowest_health_borrower: None,
            last_cycle_time: 0,
            cycles_per_hour: 0.0,
        }
    }
}

impl LiquidationMetrics {
    /// Share of attempted liquidations that succeeded, if any were attempted.
    pub fn success_rate(&self) -> Option<f64> {
        (self.total_liquidations > 0)
            .then(|| self.successful_liquidations as f64 / self.total_liquidations as f64)
    }

    /// Mean profit per successful liquidation, if any succeeded.
    pub fn average_profit(&self) -> Option<I256> {
        if self.successful_liquidations == 0 {
            return None;
        }
        let successes = signed_diff(U256::from(self.successful_liquidations), U256::ZERO);
        Some(self.total_profit / successes)
    }
}

/// Problems detected by [`MetricsCollector::check_health`].
#[derive(Debug, Clone, PartialEq)]
pub enum HealthAlert {
    /// No cycle completed recently
    Stalled { secs_since_last_cycle: u64 },
    /// Too many liquidations are failing
    LowSuccessRate { rate: f64 },
    /// Liquidations lose money on average
    LosingMoney { average_profit: I256 },
}

/// In-process [`ObservabilitySink`] keeping cumulative metrics.
pub struct MetricsCollector {
    metrics: Mutex<LiquidationMetrics>,
    /// Latest health factor per borrower
    health_factors: DashMap<BorrowerId, f64>,
    started_at: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::started_at(unix_now())
    }

    /// Create a collector whose uptime starts at `started_at` (unix seconds).
    pub fn started_at(started_at: u64) -> Self {
        Self {
            metrics: Mutex::new(LiquidationMetrics::default()),
            health_factors: DashMap::new(),
            started_at,
        }
    }

    /// Copy of the current counters.
    pub fn snapshot(&self) -> LiquidationMetrics {
        self.metrics.lock().clone()
    }

    /// Latest health factor recorded for `borrower`.
    pub fn health_factor(&self, borrower: &BorrowerId) -> Option<f64> {
        self.health_factors.get(borrower).map(|hf| *hf)
    }

    /// Mean of the latest finite health factors across borrowers.
    pub fn average_health_factor(&self) -> Option<f64> {
        let (sum, count) = self
            .health_factors
            .iter()
            .map(|entry| *entry.value())
            .filter(|hf| hf.is_finite())
            .fold((0.0, 0u64), |(sum, count), hf| (sum + hf, count + 1));
        (count > 0).then(|| sum / count as f64)
    }

    pub(crate) fn record_cycle_at(&self, report: &CycleReport, now: u64) {
        let mut m = self.metrics.lock();
        m.total_cycles += 1;
        if report.is_aborted() {
            m.aborted_cycles += 1;
        }
        m.last_cycle_time = now;

        let checked = report.borrowers_checked as u64;
        if checked > 0 {
            m.borrowers_checked += checked;
            m.total_processing_ms += report.elapsed.as_secs_f64() * 1000.0;
            m.average_check_time_ms = m.total_processing_ms / m.borrowers_checked as f64;
        }
        m.skipped_unprofitable += report.skipped_unprofitable as u64;

        let hours_running = now.saturating_sub(self.started_at) as f64 / 3600.0;
        if hours_running > 0.0 {
            m.cycles_per_hour = m.total_cycles as f64 / hours_running;
        }
    }

    /// Run the self-checks at `now` (unix seconds), logging each alert.
    pub fn check_health(&self, now: u64) -> Vec<HealthAlert> {
        let m = self.snapshot();
        let mut alerts = Vec::new();

        let last_activity = if m.total_cycles == 0 {
            self.started_at
        } else {
            m.last_cycle_time
        };
        let secs_since_last_cycle = now.saturating_sub(last_activity);
        if secs_since_last_cycle > STALL_THRESHOLD.as_secs() {
            warn!(secs_since_last_cycle, "Monitor has not completed a cycle recently");
            alerts.push(HealthAlert::Stalled {
                secs_since_last_cycle,
            });
        }

        if let Some(rate) = m.success_rate() {
            if rate < MIN_SUCCESS_RATE {
                warn!(
                    success_rate = %format!("{:.1}%", rate * 100.0),
                    successful = m.successful_liquidations,
                    total = m.total_liquidations,
                    "Liquidation success rate low"
                );
                alerts.push(HealthAlert::LowSuccessRate { rate });
            }
        }

        if let Some(average_profit) = m.average_profit() {
            if average_profit.is_negative() {
                error!(average_profit = %average_profit, "Monitor is losing money on liquidations");
                alerts.push(HealthAlert::LosingMoney { average_profit });
            }
        }

        alerts
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservabilitySink for MetricsCollector {
    fn record_cycle(&self, report: &CycleReport) {
        self.record_cycle_at(report, unix_now());
    }

    fn record_warning(&self, warning_number: u32) {
        let mut m = self.metrics.lock();
        m.total_warnings_issued += 1;
        match warning_number {
            1 => m.warning1_count += 1,
            2 => m.warning2_count += 1,
            3 => m.warning3_count += 1,
            _ => {}
        }
    }

    fn record_liquidation(&self, success: bool, reward: U256, gas_cost: U256) {
        let mut m = self.metrics.lock();
        m.total_liquidations += 1;
        m.total_gas_spent = m.total_gas_spent.saturating_add(gas_cost);

        if success {
            m.successful_liquidations += 1;
            m.total_rewards_earned = m.total_rewards_earned.saturating_add(reward);
            m.total_profit = m.total_profit.saturating_add(signed_diff(reward, gas_cost));
            m.average_reward_per_liquidation =
                m.total_rewards_earned / U256::from(m.successful_liquidations);
        } else {
            m.failed_liquidations += 1;
        }
    }

    fn record_health_factor(&self, borrower: &BorrowerId, health_factor: f64) {
        self.health_factors.insert(borrower.clone(), health_factor);

        let mut m = self.metrics.lock();
        if health_factor < m.lowest_health_factor {
            m.lowest_health_factor = health_factor;
            m.lowest_health_borrower = Some(borrower.clone());
        }
    }
}

fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::AbortReason;

    const START: u64 = 1_700_000_000;

    fn report(checked: usize, elapsed_ms: u64) -> CycleReport {
        CycleReport {
            borrowers_checked: checked,
            elapsed: Duration::from_millis(elapsed_ms),
            ..CycleReport::empty(1)
        }
    }

    #[test]
    fn test_cycle_counters() {
        let collector = MetricsCollector::started_at(START);
        collector.record_cycle_at(&report(4, 400), START + 1800);
        collector.record_cycle_at(&report(6, 600), START + 3600);

        let m = collector.snapshot();
        assert_eq!(m.total_cycles, 2);
        assert_eq!(m.borrowers_checked, 10);
        assert!((m.average_check_time_ms - 100.0).abs() < 1e-9);
        assert_eq!(m.last_cycle_time, START + 3600);
        assert!((m.cycles_per_hour - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_aborted_cycle_counted() {
        let collector = MetricsCollector::started_at(START);
        let aborted = CycleReport::aborted(
            1,
            AbortReason::StalePrice {
                age_secs: 90_000,
                max_age_secs: 86_400,
            },
            Duration::from_millis(3),
        );
        collector.record_cycle_at(&aborted, START + 10);

        let m = collector.snapshot();
        assert_eq!(m.total_cycles, 1);
        assert_eq!(m.aborted_cycles, 1);
        assert_eq!(m.borrowers_checked, 0);
        assert_eq!(m.average_check_time_ms, 0.0);
    }

    #[test]
    fn test_warning_counts_by_number() {
        let collector = MetricsCollector::started_at(START);
        collector.record_warning(1);
        collector.record_warning(1);
        collector.record_warning(2);
        collector.record_warning(3);

        let m = collector.snapshot();
        assert_eq!(m.total_warnings_issued, 4);
        assert_eq!(m.warning1_count, 2);
        assert_eq!(m.warning2_count, 1);
        assert_eq!(m.warning3_count, 1);
    }

    #[test]
    fn test_liquidation_financials() {
        let collector = MetricsCollector::started_at(START);
        let gas = U256::from(5_000_000u64);
        collector.record_liquidation(true, U256::from(20_000_000u64), gas);
        collector.record_liquidation(true, U256::from(10_000_000u64), gas);
        collector.record_liquidation(false, U256::ZERO, gas);

        let m = collector.snapshot();
        assert_eq!(m.total_liquidations, 3);
        assert_eq!(m.successful_liquidations, 2);
        assert_eq!(m.failed_liquidations, 1);
        assert_eq!(m.total_rewards_earned, U256::from(30_000_000u64));
        assert_eq!(m.total_gas_spent, U256::from(15_000_000u64));
        assert_eq!(m.total_profit, I256::try_from(20_000_000i64).unwrap());
        assert_eq!(m.average_reward_per_liquidation, U256::from(15_000_000u64));
        assert_eq!(m.average_profit(), Some(I256::try_from(10_000_000i64).unwrap()));
    }

    #[test]
    fn test_lowest_health_factor_tracked() {
        let collector = MetricsCollector::started_at(START);
        collector.record_health_factor(&"A".into(), 2.0);
        collector.record_health_factor(&"B".into(), 1.2);
        collector.record_health_factor(&"C".into(), f64::INFINITY);
        collector.record_health_factor(&"A".into(), 1.8);

        let m = collector.snapshot();
        assert_eq!(m.lowest_health_factor, 1.2);
        assert_eq!(m.lowest_health_borrower, Some(BorrowerId::from("B")));
        assert_eq!(collector.health_factor(&"A".into()), Some(1.8));
        assert!((collector.average_health_factor().unwrap() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_check_health_clean() {
        let collector = MetricsCollector::started_at(START);
        collector.record_cycle_at(&report(1, 10), START + 100);
        collector.record_liquidation(true, U256::from(20u64), U256::from(5u64));
        assert!(collector.check_health(START + 130).is_empty());
    }

    #[test]
    fn test_check_health_detects_stall() {
        let collector = MetricsCollector::started_at(START);
        // Never ran: measured from start
        assert!(collector.check_health(START + 30).is_empty());
        assert_eq!(
            collector.check_health(START + 61),
            vec![HealthAlert::Stalled {
                secs_since_last_cycle: 61
            }]
        );

        collector.record_cycle_at(&report(1, 10), START + 100);
        assert!(collector.check_health(START + 160).is_empty());
        assert_eq!(collector.check_health(START + 161).len(), 1);
    }

    #[test]
    fn test_check_health_low_success_and_losses() {
        let collector = MetricsCollector::started_at(START);
        collector.record_cycle_at(&report(1, 10), START);
        // One success at a loss, one failure
        collector.record_liquidation(true, U256::from(1u64), U256::from(5u64));
        collector.record_liquidation(false, U256::ZERO, U256::from(5u64));

        let alerts = collector.check_health(START + 1);
        assert_eq!(alerts.len(), 2);
        assert!(matches!(alerts[0], HealthAlert::LowSuccessRate { rate } if (rate - 0.5).abs() < 1e-9));
        assert_eq!(
            alerts[1],
            HealthAlert::LosingMoney {
                average_profit: I256::try_from(-4i64).unwrap()
            }
        );
    }
}
