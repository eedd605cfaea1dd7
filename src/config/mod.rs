use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::ledger::LedgerError;

pub const MAX_REWARD_PERCENTAGE: u32 = 100;
pub const DEFAULT_MIN_FOLLOWING_DURATION_SECS: u64 = 4 * 7 * 24 * 60 * 60; // 4 weeks

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] LedgerError),
}

/// Reward parameters. Read-only once the ledger is built; nothing in the
/// ledger pays rewards yet.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "RawRewardConfig")]
pub struct RewardConfig {
    percentage: u8,
    min_following_duration_secs: u64,
}

/// Wire form of [`RewardConfig`]; only reaches the ledger through
/// `RewardConfig::new`.
#[derive(Deserialize)]
struct RawRewardConfig {
    percentage: u32,
    min_following_duration_secs: u64,
}

impl TryFrom<RawRewardConfig> for RewardConfig {
    type Error = LedgerError;

    fn try_from(raw: RawRewardConfig) -> Result<Self, Self::Error> {
        RewardConfig::new(
            raw.percentage,
            Duration::from_secs(raw.min_following_duration_secs),
        )
    }
}

impl RewardConfig {
    pub fn new(percentage: u32, min_following_duration: Duration) -> Result<Self, LedgerError> {
        if percentage > MAX_REWARD_PERCENTAGE {
            return Err(LedgerError::InvalidPercentage { percentage });
        }
        Ok(Self {
            percentage: percentage as u8,
            min_following_duration_secs: min_following_duration.as_secs(),
        })
    }

    pub fn with_percentage(percentage: u32) -> Result<Self, LedgerError> {
        Self::new(
            percentage,
            Duration::from_secs(DEFAULT_MIN_FOLLOWING_DURATION_SECS),
        )
    }

    pub fn reward_percentage(&self) -> u8 {
        self.percentage
    }

    pub fn following_time_for_reward(&self) -> Duration {
        Duration::from_secs(self.min_following_duration_secs)
    }
}

/// Construction parameters of a ledger instance, as loaded from JSON.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerConfig {
    pub admin: Address,
    pub reward_percentage: u32,
    #[serde(default = "default_min_following_duration_secs")]
    pub min_following_duration_secs: u64,
}

fn default_min_following_duration_secs() -> u64 {
    DEFAULT_MIN_FOLLOWING_DURATION_SECS
}

impl LedgerConfig {
    pub fn new(admin: Address, reward_percentage: u32) -> Self {
        Self {
            admin,
            reward_percentage,
            min_following_duration_secs: DEFAULT_MIN_FOLLOWING_DURATION_SECS,
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: LedgerConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<RewardConfig, LedgerError> {
        RewardConfig::new(
            self.reward_percentage,
            Duration::from_secs(self.min_following_duration_secs),
        )
    }
}
