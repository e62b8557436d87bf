use serde::Serialize;
use spinledger_execution::{RtpBand, RtpBandError};
use spinledger_types::casino::{
    max_spin_payout, DEFAULT_BET, DEFAULT_INITIAL_RTP, DEFAULT_MAX_RTP, DEFAULT_MIN_RTP,
};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error as ThisError;

const DEFAULT_STARTING_BALANCE: u64 = 0;
const DEFAULT_WORKERS: usize = 64;
const DEFAULT_BACKLOG: usize = 256;
const DEFAULT_WEIGHT_CACHE_TTL_SECS: u64 = 60 * 60;
const DEFAULT_WEIGHT_CACHE_CAPACITY: usize = 100_000;
pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const MAX_HISTORY_LIMIT: usize = 100;
const DEFAULT_SPIN_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_DATABASE_PATH: &str = "spinledger.db";

#[derive(Debug, ThisError, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be > 0 (got {value})")]
    NotPositive { field: &'static str, value: u64 },
    #[error("bet {bet} can pay out more than a balance can hold")]
    BetTooLarge { bet: u64 },
    #[error(transparent)]
    RtpBand(#[from] RtpBandError),
}

/// Where balances, transactions, stats, and game records live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "backend")]
pub enum StorageConfig {
    Sqlite { path: PathBuf },
    Postgres { url: String },
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: PathBuf::from(DEFAULT_DATABASE_PATH),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ServiceConfig {
    pub bet: u64,
    pub min_rtp: f64,
    pub max_rtp: f64,
    pub initial_rtp: f64,
    /// Credited as a bonus on first registration (0 disables).
    pub starting_balance: u64,
    pub workers: usize,
    pub backlog: usize,
    pub weight_cache_ttl_secs: u64,
    pub weight_cache_capacity: usize,
    pub history_limit: usize,
    pub spin_timeout_ms: Option<u64>,
    pub deterministic_seed: Option<u64>,
    #[serde(skip)]
    pub storage: StorageConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bet: DEFAULT_BET,
            min_rtp: DEFAULT_MIN_RTP,
            max_rtp: DEFAULT_MAX_RTP,
            initial_rtp: DEFAULT_INITIAL_RTP,
            starting_balance: DEFAULT_STARTING_BALANCE,
            workers: DEFAULT_WORKERS,
            backlog: DEFAULT_BACKLOG,
            weight_cache_ttl_secs: DEFAULT_WEIGHT_CACHE_TTL_SECS,
            weight_cache_capacity: DEFAULT_WEIGHT_CACHE_CAPACITY,
            history_limit: DEFAULT_HISTORY_LIMIT,
            spin_timeout_ms: Some(DEFAULT_SPIN_TIMEOUT_MS),
            deterministic_seed: None,
            storage: StorageConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// In-memory configuration used by tests and local experiments.
    pub fn in_memory() -> Self {
        Self {
            storage: StorageConfig::Memory,
            ..Self::default()
        }
    }

    pub fn rtp_band(&self) -> RtpBand {
        RtpBand {
            min: self.min_rtp,
            max: self.max_rtp,
            initial: self.initial_rtp,
        }
    }

    pub fn weight_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.weight_cache_ttl_secs)
    }

    pub fn spin_timeout(&self) -> Option<Duration> {
        self.spin_timeout_ms.map(Duration::from_millis)
    }

    pub fn worker_capacity(&self) -> usize {
        self.workers.max(1)
    }

    pub fn history_capacity(&self) -> usize {
        self.history_limit.clamp(1, MAX_HISTORY_LIMIT)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bet == 0 {
            return Err(ConfigError::NotPositive {
                field: "bet",
                value: 0,
            });
        }
        // Balances are stored as signed 64-bit integers.
        let fits = max_spin_payout(self.bet)
            .and_then(|payout| payout.checked_add(self.bet))
            .is_some_and(|worst| i64::try_from(worst).is_ok());
        if !fits {
            return Err(ConfigError::BetTooLarge { bet: self.bet });
        }
        if self.workers == 0 {
            return Err(ConfigError::NotPositive {
                field: "workers",
                value: 0,
            });
        }
        if self.weight_cache_capacity == 0 {
            return Err(ConfigError::NotPositive {
                field: "weight_cache_capacity",
                value: 0,
            });
        }
        if self.spin_timeout_ms == Some(0) {
            return Err(ConfigError::NotPositive {
                field: "spin_timeout_ms",
                value: 0,
            });
        }
        self.rtp_band().validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ServiceConfig::default();
        config.validate().expect("defaults are valid");
        assert_eq!(config.bet, 50);
        assert_eq!(config.rtp_band(), RtpBand::default());
        assert_eq!(config.history_capacity(), 10);
        assert_eq!(config.worker_capacity(), 64);
    }

    #[test]
    fn test_rejects_zero_bet() {
        let config = ServiceConfig {
            bet: 0,
            ..ServiceConfig::in_memory()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bet"), "unexpected error: {err}");
    }

    #[test]
    fn test_rejects_bet_whose_top_payout_overflows_balance() {
        let config = ServiceConfig {
            bet: 1 << 60,
            ..ServiceConfig::in_memory()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::BetTooLarge { bet: 1 << 60 })
        );

        // Largest payout still fits in i64, so the bet is accepted.
        let config = ServiceConfig {
            bet: 1 << 40,
            ..ServiceConfig::in_memory()
        };
        config.validate().expect("large but representable bet");
    }

    #[test]
    fn test_rejects_inverted_band() {
        let config = ServiceConfig {
            min_rtp: 99.0,
            max_rtp: 90.0,
            ..ServiceConfig::in_memory()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RtpBand(RtpBandError::Inverted { .. }))
        ));
    }

    #[test]
    fn test_history_capacity_clamps() {
        let config = ServiceConfig {
            history_limit: 1_000,
            ..ServiceConfig::in_memory()
        };
        assert_eq!(config.history_capacity(), MAX_HISTORY_LIMIT);
    }
}
