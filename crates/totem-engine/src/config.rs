//! # Engine Configuration
//!
//! Kiosk identity, weight policy, redemption cost, hardware timing and the
//! database location.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TOTEM_MIN_WEIGHT_KG=3.4                                            │
//! │     TOTEM_CLOSE_TIMEOUT_SECS=120                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/totem/totem.toml (Linux)                                 │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     3.4 kg minimum, 1 credit per 3.4 kg, 1 credit per bottle           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # totem.toml
//! [kiosk]
//! id = "totem-praca-central"
//! drawer_id = "drawer-1"
//!
//! [policy]
//! min_weight_kg = 3.4
//! credit_increment_kg = 3.4
//!
//! [redemption]
//! cost_credits = 1
//!
//! [hardware]
//! close_timeout_secs = 90
//! close_poll_interval_ms = 250
//! call_timeout_secs = 10
//! max_retries = 3
//!
//! [database]
//! path = "/var/lib/totem/totem.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::drawer::DrawerTimeouts;
use crate::error::{EngineError, EngineResult};
use totem_core::{Weight, WeightPolicy, DEFAULT_DRAWER_ID, DEFAULT_REDEMPTION_COST};

// =============================================================================
// Sections
// =============================================================================

/// Which kiosk and drawer this process drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KioskSettings {
    #[serde(default = "default_kiosk_id")]
    pub id: String,

    #[serde(default = "default_drawer_id")]
    pub drawer_id: String,
}

fn default_kiosk_id() -> String {
    "totem-01".to_string()
}

fn default_drawer_id() -> String {
    DEFAULT_DRAWER_ID.to_string()
}

impl Default for KioskSettings {
    fn default() -> Self {
        KioskSettings {
            id: default_kiosk_id(),
            drawer_id: default_drawer_id(),
        }
    }
}

/// Weight policy thresholds, in kilograms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Deposits lighter than this are rejected.
    #[serde(default = "default_weight_kg")]
    pub min_weight_kg: f64,

    /// One credit per whole increment.
    #[serde(default = "default_weight_kg")]
    pub credit_increment_kg: f64,
}

fn default_weight_kg() -> f64 {
    3.4
}

impl Default for PolicySettings {
    fn default() -> Self {
        PolicySettings {
            min_weight_kg: default_weight_kg(),
            credit_increment_kg: default_weight_kg(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedemptionSettings {
    /// Credits per bottle of new oil.
    #[serde(default = "default_cost_credits")]
    pub cost_credits: i64,
}

fn default_cost_credits() -> i64 {
    DEFAULT_REDEMPTION_COST
}

impl Default for RedemptionSettings {
    fn default() -> Self {
        RedemptionSettings {
            cost_credits: default_cost_credits(),
        }
    }
}

/// Hardware timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareSettings {
    /// How long the user has to close the drawer.
    #[serde(default = "default_close_timeout")]
    pub close_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub close_poll_interval_ms: u64,

    /// Bound on each lock/unlock/read call.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Retries of a transient fault after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_close_timeout() -> u64 {
    90
}
fn default_poll_interval() -> u64 {
    250
}
fn default_call_timeout() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    100
}
fn default_max_backoff() -> u64 {
    1000
}

impl Default for HardwareSettings {
    fn default() -> Self {
        HardwareSettings {
            close_timeout_secs: default_close_timeout(),
            close_poll_interval_ms: default_poll_interval(),
            call_timeout_secs: default_call_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Engine Config
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub kiosk: KioskSettings,

    #[serde(default)]
    pub policy: PolicySettings,

    #[serde(default)]
    pub redemption: RedemptionSettings,

    #[serde(default)]
    pub hardware: HardwareSettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (totem.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration as pretty TOML.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::Config("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.kiosk.drawer_id.trim().is_empty() {
            return Err(EngineError::Config("kiosk.drawer_id must not be empty".into()));
        }

        // Both thresholds must survive conversion to whole grams
        self.policy()?;

        if self.redemption.cost_credits <= 0 {
            return Err(EngineError::Config(
                "redemption.cost_credits must be greater than 0".into(),
            ));
        }

        let hw = &self.hardware;
        if hw.close_timeout_secs < 1 {
            return Err(EngineError::Config(
                "hardware.close_timeout_secs must be at least 1".into(),
            ));
        }
        if hw.close_poll_interval_ms == 0 || hw.call_timeout_secs == 0 {
            return Err(EngineError::Config(
                "hardware poll interval and call timeout must be greater than 0".into(),
            ));
        }
        if hw.max_retries < 1 {
            return Err(EngineError::Config(
                "hardware.max_retries must be at least 1".into(),
            ));
        }
        if hw.initial_backoff_ms > hw.max_backoff_ms {
            return Err(EngineError::Config(
                "hardware.initial_backoff_ms must not exceed max_backoff_ms".into(),
            ));
        }

        Ok(())
    }

    /// Applies `TOTEM_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("TOTEM_KIOSK_ID") {
            debug!(kiosk_id = %id, "Overriding kiosk id from environment");
            self.kiosk.id = id;
        }

        if let Some(id) = lookup("TOTEM_DRAWER_ID") {
            self.kiosk.drawer_id = id;
        }

        if let Some(value) = lookup("TOTEM_MIN_WEIGHT_KG") {
            match value.parse::<f64>() {
                Ok(kg) => self.policy.min_weight_kg = kg,
                Err(_) => warn!(value = %value, "Ignoring unparsable TOTEM_MIN_WEIGHT_KG"),
            }
        }

        if let Some(value) = lookup("TOTEM_CREDIT_INCREMENT_KG") {
            match value.parse::<f64>() {
                Ok(kg) => self.policy.credit_increment_kg = kg,
                Err(_) => warn!(value = %value, "Ignoring unparsable TOTEM_CREDIT_INCREMENT_KG"),
            }
        }

        if let Some(value) = lookup("TOTEM_REDEMPTION_COST") {
            if let Ok(cost) = value.parse::<i64>() {
                self.redemption.cost_credits = cost;
            }
        }

        if let Some(value) = lookup("TOTEM_CLOSE_TIMEOUT_SECS") {
            if let Ok(secs) = value.parse::<u64>() {
                debug!(secs, "Overriding close timeout from environment");
                self.hardware.close_timeout_secs = secs;
            }
        }

        if let Some(value) = lookup("TOTEM_HW_MAX_RETRIES") {
            if let Ok(retries) = value.parse::<u32>() {
                self.hardware.max_retries = retries;
            }
        }

        if let Some(path) = lookup("TOTEM_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "totem", "totem")
            .map(|dirs| dirs.config_dir().join("totem.toml"))
    }

    // =========================================================================
    // Derived Values
    // =========================================================================

    /// The weight policy described by `[policy]`.
    pub fn policy(&self) -> EngineResult<WeightPolicy> {
        let min_weight = Weight::from_kg(self.policy.min_weight_kg)
            .map_err(|e| EngineError::Config(format!("policy.min_weight_kg: {}", e)))?;
        let increment = Weight::from_kg(self.policy.credit_increment_kg)
            .map_err(|e| EngineError::Config(format!("policy.credit_increment_kg: {}", e)))?;

        WeightPolicy::new(min_weight, increment)
            .map_err(|e| EngineError::Config(format!("policy: {}", e)))
    }

    /// Drawer timing described by `[hardware]`.
    pub fn drawer_timeouts(&self) -> DrawerTimeouts {
        let hw = &self.hardware;
        DrawerTimeouts {
            close_timeout: Duration::from_secs(hw.close_timeout_secs),
            poll_interval: Duration::from_millis(hw.close_poll_interval_ms),
            call_timeout: Duration::from_secs(hw.call_timeout_secs),
            max_retries: hw.max_retries,
            initial_backoff: Duration::from_millis(hw.initial_backoff_ms),
            max_backoff: Duration::from_millis(hw.max_backoff_ms),
        }
    }

    /// SQLite file: configured path, else the platform data dir, else `./totem.db`.
    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.database.path {
            return path.clone();
        }

        directories::ProjectDirs::from("org", "totem", "totem")
            .map(|dirs| dirs.data_dir().join("totem.db"))
            .unwrap_or_else(|| PathBuf::from("./totem.db"))
    }
}
