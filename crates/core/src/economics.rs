//! Liquidation profitability analysis.

use alloy::primitives::{I256, U256};

use crate::config::LiquidationConfig;
use crate::health::HealthResult;
use crate::u256_math::{percent_of, signed_diff};

/// Profit breakdown of liquidating one loan. Amounts in quote units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationEconomics {
    pub collateral_value: U256,
    /// Share of collateral value paid to the liquidator
    pub liquidator_reward: U256,
    /// Flat transaction cost estimate
    pub gas_cost: U256,
    /// Reward minus gas; negative when the call would lose money
    pub profit: I256,
    pub is_profitable: bool,
}

/// Computes [`LiquidationEconomics`] from a health result.
#[derive(Debug, Clone)]
pub struct EconomicsAnalyzer {
    reward_percent: u64,
    gas_cost: U256,
    min_profit: I256,
}

impl EconomicsAnalyzer {
    pub fn new(config: &LiquidationConfig) -> Self {
        Self {
            reward_percent: config.reward_percent,
            gas_cost: U256::from(config.gas_cost_estimate),
            min_profit: signed_diff(U256::from(config.min_profit), U256::ZERO),
        }
    }

    pub fn analyze(&self, health: &HealthResult) -> LiquidationEconomics {
        let liquidator_reward = percent_of(health.collateral_value, self.reward_percent);
        let profit = signed_diff(liquidator_reward, self.gas_cost);

        LiquidationEconomics {
            collateral_value: health.collateral_value,
            liquidator_reward,
            gas_cost: self.gas_cost,
            profit,
            is_profitable: profit.is_positive(),
        }
    }

    /// Whether the profit clears the configured minimum.
    ///
    /// Stricter than `is_profitable`: a small positive profit may still be skipped.
    pub fn should_liquidate(&self, economics: &LiquidationEconomics) -> bool {
        economics.profit >= self.min_profit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health_with_value(collateral_value: u64) -> HealthResult {
        HealthResult {
            collateral_value: U256::from(collateral_value),
            total_debt: U256::from(182_000_000u64),
            health_factor: 1.0,
            is_healthy: false,
            needs_warning: false,
            needs_liquidation: true,
        }
    }

    fn i256(v: i64) -> I256 {
        I256::try_from(v).unwrap()
    }

    #[test]
    fn test_profitable_liquidation_reward_and_profit() {
        let analyzer = EconomicsAnalyzer::new(&LiquidationConfig::default());
        let e = analyzer.analyze(&health_with_value(200_000_000));

        assert_eq!(e.collateral_value, U256::from(200_000_000u64));
        assert_eq!(e.liquidator_reward, U256::from(20_000_000u64));
        assert_eq!(e.gas_cost, U256::from(5_000_000u64));
        assert_eq!(e.profit, i256(15_000_000));
        assert!(e.is_profitable);
        assert!(analyzer.should_liquidate(&e));
    }

    #[test]
    fn test_loss_is_negative_profit() {
        let analyzer = EconomicsAnalyzer::new(&LiquidationConfig::default());
        // 10% of 30 = 3 < 5 gas
        let e = analyzer.analyze(&health_with_value(30_000_000));
        assert_eq!(e.profit, i256(-2_000_000));
        assert!(!e.is_profitable);
        assert!(!analyzer.should_liquidate(&e));
    }

    #[test]
    fn test_small_profit_below_minimum_is_skipped() {
        let analyzer = EconomicsAnalyzer::new(&LiquidationConfig::default());
        // 10% of 55 = 5.5; profit 0.5 < 1.0 minimum
        let e = analyzer.analyze(&health_with_value(55_000_000));
        assert_eq!(e.profit, i256(500_000));
        assert!(e.is_profitable);
        assert!(!analyzer.should_liquidate(&e));

        // Exactly the minimum passes
        let e = analyzer.analyze(&health_with_value(60_000_000));
        assert_eq!(e.profit, i256(1_000_000));
        assert!(analyzer.should_liquidate(&e));
    }

    #[test]
    fn test_break_even_is_not_profitable() {
        let analyzer = EconomicsAnalyzer::new(&LiquidationConfig {
            min_profit: 0,
            ..Default::default()
        });
        let e = analyzer.analyze(&health_with_value(50_000_000));
        assert_eq!(e.profit, I256::ZERO);
        assert!(!e.is_profitable);
        // A zero floor still lets break-even through
        assert!(analyzer.should_liquidate(&e));
    }

    #[test]
    fn test_custom_gas_cost() {
        let analyzer = EconomicsAnalyzer::new(&LiquidationConfig {
            gas_cost_estimate: 25_000_000,
            ..Default::default()
        });
        let e = analyzer.analyze(&health_with_value(200_000_000));
        assert_eq!(e.profit, i256(-5_000_000));
        assert_eq!(e.gas_cost, U256::from(25_000_000u64));
    }
}
