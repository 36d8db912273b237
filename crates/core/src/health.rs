//! Health factor evaluation.
//!
//! Turns a loan snapshot and the cycle's price snapshot into a health
//! classification. Pure: no I/O, no clock reads.

use alloy::primitives::U256;
use loan_monitor_chain::{Loan, PriceSnapshot};

use crate::config::HealthConfig;
use crate::error::MonitorError;
use crate::u256_math::{bps_to_f64, collateral_value, ratio_bps};

/// Health classification of one loan at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthResult {
    /// Collateral value in quote units
    pub collateral_value: U256,
    /// Outstanding debt plus penalties, in quote units
    pub total_debt: U256,
    /// Collateral value over total debt; `f64::INFINITY` for zero or dust debt
    pub health_factor: f64,
    pub is_healthy: bool,
    pub needs_warning: bool,
    pub needs_liquidation: bool,
}

/// Computes [`HealthResult`]s against configured thresholds.
#[derive(Debug, Clone)]
pub struct HealthEvaluator {
    config: HealthConfig,
    min_debt: U256,
}

impl HealthEvaluator {
    pub fn new(config: HealthConfig) -> Self {
        let min_debt = U256::from(config.min_debt);
        Self { config, min_debt }
    }

    /// Fail if `price` is older than the staleness window at `now`.
    pub fn check_price(&self, price: &PriceSnapshot, now: u64) -> Result<(), MonitorError> {
        let max_age_secs = self.config.price_staleness_secs;
        if price.is_stale(max_age_secs, now) {
            return Err(MonitorError::StalePrice {
                age_secs: price.age_secs(now),
                max_age_secs,
            });
        }
        Ok(())
    }

    /// Evaluate `loan` against `price` at `now`.
    pub fn evaluate(
        &self,
        loan: &Loan,
        price: &PriceSnapshot,
        now: u64,
    ) -> Result<HealthResult, MonitorError> {
        self.check_price(price, now)?;

        let collateral_value = collateral_value(
            loan.collateral_amount,
            price.price,
            self.config.collateral_decimals,
        );
        let total_debt = loan.total_debt();

        // Zero debt and dust are both exempt from risk action
        let health_factor = if total_debt < self.min_debt {
            f64::INFINITY
        } else {
            match ratio_bps(collateral_value, total_debt) {
                Some(bps) => bps_to_f64(bps),
                None => f64::INFINITY,
            }
        };

        Ok(self.classify(collateral_value, total_debt, health_factor))
    }

    fn classify(&self, collateral_value: U256, total_debt: U256, health_factor: f64) -> HealthResult {
        let is_healthy = health_factor >= self.config.healthy_threshold;
        let needs_liquidation = !is_healthy && health_factor <= self.config.liquidation_threshold;
        HealthResult {
            collateral_value,
            total_debt,
            health_factor,
            is_healthy,
            needs_warning: !is_healthy && !needs_liquidation,
            needs_liquidation,
        }
    }
}
