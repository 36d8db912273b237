//! Configuration management with profile support.
//!
//! Provides centralized configuration for all monitor parameters with
//! support for different profiles (default, testing, production) and
//! TOML files.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::MonitorError;
use crate::u256_math::MAX_COLLATERAL_DECIMALS;

/// Main configuration structure containing all monitor parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Cycle scheduling
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Health factor thresholds and price staleness
    #[serde(default)]
    pub health: HealthConfig,

    /// Graduated warning thresholds and timing
    #[serde(default)]
    pub warnings: WarningConfig,

    /// Liquidation economics
    #[serde(default)]
    pub liquidation: LiquidationConfig,

    /// Transaction confirmation polling
    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    /// Endpoints and contract identifiers
    #[serde(default)]
    pub network: NetworkConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Cycle scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Delay between the start of consecutive cycles (seconds)
    #[serde(default = "default_monitoring_interval")]
    pub monitoring_interval_secs: u64,

    /// Metrics self-check interval (seconds)
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,
}

fn default_monitoring_interval() -> u64 {
    15
}
fn default_health_check_interval() -> u64 {
    60
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            monitoring_interval_secs: default_monitoring_interval(),
            health_check_interval_secs: default_health_check_interval(),
        }
    }
}

impl ScannerConfig {
    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring_interval_secs)
    }
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }
}

/// Health factor classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// HF at or above which a loan is healthy
    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: f64,

    /// HF at or below which a loan must be liquidated
    #[serde(default = "default_liquidation_threshold")]
    pub liquidation_threshold: f64,

    /// Debt below this (quote units) is dust and never acted on
    #[serde(default = "default_min_debt")]
    pub min_debt: u64,

    /// Maximum price age (seconds)
    #[serde(default = "default_price_staleness")]
    pub price_staleness_secs: u64,

    /// Collateral token decimals
    #[serde(default = "default_collateral_decimals")]
    pub collateral_decimals: u8,
}

fn default_healthy_threshold() -> f64 {
    1.5
}
fn default_liquidation_threshold() -> f64 {
    1.1
}
fn default_min_debt() -> u64 {
    1_000_000
}
fn default_price_staleness() -> u64 {
    86_400
}
fn default_collateral_decimals() -> u8 {
    18
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            healthy_threshold: default_healthy_threshold(),
            liquidation_threshold: default_liquidation_threshold(),
            min_debt: default_min_debt(),
            price_staleness_secs: default_price_staleness(),
            collateral_decimals: default_collateral_decimals(),
        }
    }
}

/// Graduated warning thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningConfig {
    #[serde(default = "default_warning1_threshold")]
    pub warning1_threshold: f64,

    #[serde(default = "default_warning2_threshold")]
    pub warning2_threshold: f64,

    #[serde(default = "default_warning3_threshold")]
    pub warning3_threshold: f64,

    /// Minimum time between warnings, and the missed-payment window (seconds)
    #[serde(default = "default_warning_interval")]
    pub warning_interval_secs: u64,

    /// Hard cap on warnings per loan
    #[serde(default = "default_max_warnings")]
    pub max_warnings: u32,
}

fn default_warning1_threshold() -> f64 {
    1.5
}
fn default_warning2_threshold() -> f64 {
    1.2
}
fn default_warning3_threshold() -> f64 {
    1.1
}
fn default_warning_interval() -> u64 {
    14 * 24 * 60 * 60
}
fn default_max_warnings() -> u32 {
    3
}

impl Default for WarningConfig {
    fn default() -> Self {
        Self {
            warning1_threshold: default_warning1_threshold(),
            warning2_threshold: default_warning2_threshold(),
            warning3_threshold: default_warning3_threshold(),
            warning_interval_secs: default_warning_interval(),
            max_warnings: default_max_warnings(),
        }
    }
}

/// Liquidation economics. Amounts are in quote units (6 decimals).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationConfig {
    /// Share of collateral value paid to the liquidator
    #[serde(default = "default_reward_percent")]
    pub reward_percent: u64,

    /// Flat transaction cost estimate
    #[serde(default = "default_gas_cost_estimate")]
    pub gas_cost_estimate: u64,

    /// Minimum profit to execute
    #[serde(default = "default_min_profit")]
    pub min_profit: u64,
}

fn default_reward_percent() -> u64 {
    10
}
fn default_gas_cost_estimate() -> u64 {
    5_000_000
}
fn default_min_profit() -> u64 {
    1_000_000
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            reward_percent: default_reward_percent(),
            gas_cost_estimate: default_gas_cost_estimate(),
            min_profit: default_min_profit(),
        }
    }
}

/// Transaction confirmation polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_poll_interval() -> u64 {
    1_000
}
fn default_max_attempts() -> u32 {
    20
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl ConfirmationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Endpoints and contract identifiers. Values may reference `${VAR}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    #[serde(default = "default_indexer_url")]
    pub indexer_url: String,

    #[serde(default = "default_signer_url")]
    pub signer_url: String,

    /// Lending pool contract id
    #[serde(default)]
    pub lending_pool_contract: String,

    /// Collateral asset id passed to the price oracle
    #[serde(default = "default_collateral_asset")]
    pub collateral_asset: String,

    #[serde(default = "default_network_passphrase")]
    pub network_passphrase: String,
}

fn default_rpc_url() -> String {
    "https://soroban-testnet.stellar.org:443".to_string()
}
fn default_indexer_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_signer_url() -> String {
    "http://localhost:9000".to_string()
}
fn default_collateral_asset() -> String {
    "stRWA".to_string()
}
fn default_network_passphrase() -> String {
    "Test SDF Network ; September 2015".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            indexer_url: default_indexer_url(),
            signer_url: default_signer_url(),
            lending_pool_contract: String::new(),
            collateral_asset: default_collateral_asset(),
            network_passphrase: default_network_passphrase(),
        }
    }
}

impl NetworkConfig {
    /// Expand environment variables in all string fields.
    pub fn expand_env_vars(&mut self) {
        self.rpc_url = expand_env(&self.rpc_url);
        self.indexer_url = expand_env(&self.indexer_url);
        self.signer_url = expand_env(&self.signer_url);
        self.lending_pool_contract = expand_env(&self.lending_pool_contract);
        self.collateral_asset = expand_env(&self.collateral_asset);
        self.network_passphrase = expand_env(&self.network_passphrase);
    }
}

/// Expand ${VAR_NAME} patterns with environment variable values.
/// Unset variables are left as-is.
fn expand_env(s: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return s.to_string();
    };
    let mut result = s.to_string();

    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }

    result
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            scanner: ScannerConfig::default(),
            health: HealthConfig::default(),
            warnings: WarningConfig::default(),
            liquidation: LiquidationConfig::default(),
            confirmation: ConfirmationConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        let mut config: Self =
            toml::from_str(&content).with_context(|| format!("failed to parse {path}"))?;
        config.network.expand_env_vars();
        Ok(config)
    }

    /// Create a testing profile: fast cycles, dust allowed, no profit floor.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            scanner: ScannerConfig {
                monitoring_interval_secs: 5,
                health_check_interval_secs: 30,
            },
            health: HealthConfig {
                min_debt: 1,
                ..Default::default()
            },
            warnings: WarningConfig::default(),
            liquidation: LiquidationConfig {
                reward_percent: 10,
                gas_cost_estimate: 100_000,
                min_profit: 0,
            },
            confirmation: ConfirmationConfig {
                poll_interval_ms: 500,
                max_attempts: 40,
            },
            network: NetworkConfig::default(),
        }
    }

    /// Create a production profile with conservative settings.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            scanner: ScannerConfig::default(),
            health: HealthConfig {
                min_debt: 10_000_000, // 10 quote units
                ..Default::default()
            },
            warnings: WarningConfig::default(),
            liquidation: LiquidationConfig {
                reward_percent: 10,
                gas_cost_estimate: 5_000_000,
                min_profit: 5_000_000,
            },
            confirmation: ConfirmationConfig::default(),
            network: NetworkConfig {
                rpc_url: "https://soroban-mainnet.stellar.org:443".to_string(),
                network_passphrase: "Public Global Stellar Network ; September 2015".to_string(),
                ..Default::default()
            },
        }
    }

    /// Get profile from environment variable BOT_PROFILE, or default.
    /// Supported values: testing, production, or a path to a `.toml` file.
    pub fn from_env() -> anyhow::Result<Self> {
        let profile = std::env::var("BOT_PROFILE").unwrap_or_else(|_| "default".to_string());
        if profile.ends_with(".toml") {
            return Self::from_file(&profile);
        }
        Ok(match profile.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "production" | "prod" => Self::production(),
            _ => Self::default(),
        })
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), MonitorError> {
        let h = &self.health;
        let w = &self.warnings;

        if h.liquidation_threshold >= h.healthy_threshold {
            return Err(MonitorError::Config(format!(
                "liquidation_threshold {} must be below healthy_threshold {}",
                h.liquidation_threshold, h.healthy_threshold
            )));
        }
        if !(w.warning3_threshold <= w.warning2_threshold
            && w.warning2_threshold <= w.warning1_threshold)
        {
            return Err(MonitorError::Config(format!(
                "warning thresholds must not decrease from warning3 to warning1 ({} / {} / {})",
                w.warning3_threshold, w.warning2_threshold, w.warning1_threshold
            )));
        }
        if self.scanner.monitoring_interval_secs == 0
            || self.scanner.health_check_interval_secs == 0
            || w.warning_interval_secs == 0
            || self.confirmation.poll_interval_ms == 0
        {
            return Err(MonitorError::Config("intervals must be nonzero".to_string()));
        }
        if w.max_warnings == 0 {
            return Err(MonitorError::Config("max_warnings must be at least 1".to_string()));
        }
        if h.collateral_decimals > MAX_COLLATERAL_DECIMALS {
            return Err(MonitorError::Config(format!(
                "collateral_decimals {} exceeds {}",
                h.collateral_decimals, MAX_COLLATERAL_DECIMALS
            )));
        }
        if self.liquidation.reward_percent > 100 {
            return Err(MonitorError::Config(format!(
                "reward_percent {} exceeds 100",
                self.liquidation.reward_percent
            )));
        }
        if self.confirmation.max_attempts == 0 {
            return Err(MonitorError::Config("max_attempts must be at least 1".to_string()));
        }

        if w.warning3_threshold <= h.liquidation_threshold {
            warn!(
                warning3 = w.warning3_threshold,
                liquidation = h.liquidation_threshold,
                "warning3_threshold does not exceed liquidation_threshold; WARNING_3 is unreachable"
            );
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!(profile = %self.profile, "Monitor configuration loaded");
        info!(
            monitoring_interval_secs = self.scanner.monitoring_interval_secs,
            health_check_interval_secs = self.scanner.health_check_interval_secs,
            "Scheduling"
        );
        info!(
            healthy = self.health.healthy_threshold,
            liquidation = self.health.liquidation_threshold,
            min_debt = self.health.min_debt,
            price_staleness_secs = self.health.price_staleness_secs,
            "Health thresholds"
        );
        info!(
            warning1 = self.warnings.warning1_threshold,
            warning2 = self.warnings.warning2_threshold,
            warning3 = self.warnings.warning3_threshold,
            interval_secs = self.warnings.warning_interval_secs,
            max_warnings = self.warnings.max_warnings,
            "Warning thresholds"
        );
        info!(
            reward_percent = self.liquidation.reward_percent,
            gas_cost_estimate = self.liquidation.gas_cost_estimate,
            min_profit = self.liquidation.min_profit,
            "Liquidation parameters"
        );
        info!(
            rpc_url = %self.network.rpc_url,
            indexer_url = %self.network.indexer_url,
            lending_pool = %self.network.lending_pool_contract,
            asset = %self.network.collateral_asset,
            "Network"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BotConfig::default();
        assert_eq!(config.scanner.monitoring_interval_secs, 15);
        assert_eq!(config.health.healthy_threshold, 1.5);
        assert_eq!(config.health.liquidation_threshold, 1.1);
        assert_eq!(config.health.price_staleness_secs, 86_400);
        assert_eq!(config.warnings.warning_interval_secs, 1_209_600);
        assert_eq!(config.liquidation.reward_percent, 10);
        assert_eq!(config.confirmation.max_attempts, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_testing_profile() {
        let config = BotConfig::testing();
        assert_eq!(config.profile, "testing");
        assert_eq!(config.liquidation.min_profit, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_production_profile() {
        let config = BotConfig::production();
        assert_eq!(config.profile, "production");
        assert!(config.liquidation.min_profit >= 1_000_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = BotConfig::default();
        config.health.liquidation_threshold = 1.6;
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));

        let mut config = BotConfig::default();
        config.warnings.warning2_threshold = 1.6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = BotConfig::default();
        config.scanner.monitoring_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.warnings.max_warnings = 0;
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.confirmation.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.liquidation.reward_percent = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_decimals() {
        let mut config = BotConfig::default();
        config.health.collateral_decimals = 38;
        assert!(config.validate().is_ok());

        config.health.collateral_decimals = 39;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("collateral_decimals 39"));

        // 10^78 no longer fits in U256
        config.health.collateral_decimals = 78;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: BotConfig = toml::from_str(
            r#"
            profile = "custom"
            [warnings]
            warning3_threshold = 1.15
            "#,
        )
        .unwrap();
        assert_eq!(parsed.profile, "custom");
        assert_eq!(parsed.warnings.warning3_threshold, 1.15);
        assert_eq!(parsed.warnings.warning2_threshold, 1.2);
        assert_eq!(parsed.health.min_debt, 1_000_000);
    }

    #[test]
    fn test_serialization() {
        let config = BotConfig::testing();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("profile = \"testing\""));

        let parsed: BotConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.profile, "testing");
        assert_eq!(parsed.confirmation.max_attempts, 40);
    }

    #[test]
    fn test_expand_env() {
        // Use unique var name to avoid conflicts with parallel tests
        std::env::set_var("LOAN_MONITOR_TEST_VAR", "test_value");
        assert_eq!(expand_env("${LOAN_MONITOR_TEST_VAR}"), "test_value");
        assert_eq!(
            expand_env("prefix_${LOAN_MONITOR_TEST_VAR}_suffix"),
            "prefix_test_value_suffix"
        );
        assert_eq!(expand_env("no_vars"), "no_vars");
        assert_eq!(expand_env("${LOAN_MONITOR_UNSET_VAR}"), "${LOAN_MONITOR_UNSET_VAR}");
        std::env::remove_var("LOAN_MONITOR_TEST_VAR");
    }
}
