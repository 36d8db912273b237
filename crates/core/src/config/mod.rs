//! Runtime configuration for the loan monitor.
//!
//! Profiles (default, testing, production) or a TOML file selected through
//! `BOT_PROFILE`.

mod bot;

pub use bot::{
    BotConfig, ConfirmationConfig, HealthConfig, LiquidationConfig, NetworkConfig, ScannerConfig,
    WarningConfig,
};
