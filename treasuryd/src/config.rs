//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use treasury_domain::{DEFAULT_EPOCH_DURATION, DEFAULT_PRE_INFORM_MARGIN};

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Terms of the treasury the daemon bootstraps
    pub treasury: TreasuryConfig,

    /// Harvest keeper configuration
    pub keeper: KeeperConfig,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Treasury terms configuration.
#[derive(Debug, Clone)]
pub struct TreasuryConfig {
    /// Epoch length in seconds
    pub epoch_duration_secs: u64,
    /// First epoch start (Unix seconds); daemon start time when unset
    pub epoch_start: Option<u64>,
    /// Performance fee in percent (20 = 20%)
    pub fee_percent: Decimal,
    /// Pre-inform window closes this many seconds before the boundary
    pub pre_inform_margin_secs: u64,
}

/// Harvest keeper configuration.
#[derive(Debug, Clone)]
pub struct KeeperConfig {
    /// Whether the keeper runs
    pub enabled: bool,
    /// Seconds between upkeep checks
    pub interval_secs: u64,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let api = Self::load_api_config()?;
        let treasury = Self::load_treasury_config()?;
        let keeper = Self::load_keeper_config()?;

        Ok(Self { api, treasury, keeper, environment })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            treasury: TreasuryConfig::default(),
            keeper: KeeperConfig { enabled: false, interval_secs: 1 },
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("TREASURY_ENV").unwrap_or_else(|_| "development".to_string());
        Environment::from_str(&env_str)
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let host = env::var("TREASURY_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port_str = env::var("TREASURY_API_PORT").unwrap_or_else(|_| "8080".to_string());

        let port = port_str
            .parse::<u16>()
            .map_err(|_| DaemonError::Config(format!("Invalid TREASURY_API_PORT: {}", port_str)))?;

        Ok(ApiConfig { host, port })
    }

    fn load_treasury_config() -> DaemonResult<TreasuryConfig> {
        let defaults = TreasuryConfig::default();

        let epoch_duration_secs =
            Self::load_u64_env("TREASURY_EPOCH_DURATION_SECS", defaults.epoch_duration_secs)?;
        let pre_inform_margin_secs =
            Self::load_u64_env("TREASURY_PRE_INFORM_MARGIN_SECS", defaults.pre_inform_margin_secs)?;
        let epoch_start = match env::var("TREASURY_EPOCH_START") {
            Ok(val) => Some(val.parse::<u64>().map_err(|_| {
                DaemonError::Config(format!("Invalid TREASURY_EPOCH_START value: {}", val))
            })?),
            Err(_) => None,
        };
        let fee_percent = Self::load_decimal_env("TREASURY_FEE_PERCENT", defaults.fee_percent)?;

        if epoch_duration_secs == 0 {
            return Err(DaemonError::Config("TREASURY_EPOCH_DURATION_SECS must be positive".into()));
        }
        if pre_inform_margin_secs >= epoch_duration_secs {
            return Err(DaemonError::Config(format!(
                "TREASURY_PRE_INFORM_MARGIN_SECS ({}) must be shorter than the epoch ({})",
                pre_inform_margin_secs, epoch_duration_secs
            )));
        }
        if fee_percent < Decimal::ZERO || fee_percent > Decimal::ONE_HUNDRED {
            return Err(DaemonError::Config(format!(
                "TREASURY_FEE_PERCENT must be within 0..=100: {}",
                fee_percent
            )));
        }

        Ok(TreasuryConfig { epoch_duration_secs, epoch_start, fee_percent, pre_inform_margin_secs })
    }

    fn load_keeper_config() -> DaemonResult<KeeperConfig> {
        let defaults = KeeperConfig::default();
        let enabled = match env::var("TREASURY_KEEPER_ENABLED") {
            Ok(val) => val.parse::<bool>().map_err(|_| {
                DaemonError::Config(format!("Invalid TREASURY_KEEPER_ENABLED value: {}", val))
            })?,
            Err(_) => defaults.enabled,
        };
        let interval_secs =
            Self::load_u64_env("TREASURY_KEEPER_INTERVAL_SECS", defaults.interval_secs)?;
        if interval_secs == 0 {
            return Err(DaemonError::Config("TREASURY_KEEPER_INTERVAL_SECS must be positive".into()));
        }

        Ok(KeeperConfig { enabled, interval_secs })
    }

    fn load_decimal_env(key: &str, default: Decimal) -> DaemonResult<Decimal> {
        match env::var(key) {
            Ok(val) => Decimal::from_str(&val)
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_u64_env(key: &str, default: u64) -> DaemonResult<u64> {
        match env::var(key) {
            Ok(val) => val
                .parse::<u64>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig { host: "0.0.0.0".to_string(), port: 8080 },
            treasury: TreasuryConfig::default(),
            keeper: KeeperConfig::default(),
            environment: Environment::Development,
        }
    }
}

impl Default for TreasuryConfig {
    fn default() -> Self {
        Self {
            epoch_duration_secs: DEFAULT_EPOCH_DURATION,
            epoch_start: None,
            fee_percent: Decimal::new(20, 0), // 20%
            pre_inform_margin_secs: DEFAULT_PRE_INFORM_MARGIN,
        }
    }
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
        }
    }
}

impl FromStr for Environment {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid TREASURY_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
