use spinledger_types::casino::PlayerStats;
use std::sync::Arc;
use tracing::warn;

use crate::error::StorageError;
use crate::storage::{now_ms, Storage, StatsDelta};

/// Per-player slot aggregates.
pub struct StatsStore {
    storage: Arc<Storage>,
    initial_rtp: f64,
}

impl StatsStore {
    pub fn new(storage: Arc<Storage>, initial_rtp: f64) -> Self {
        Self {
            storage,
            initial_rtp,
        }
    }

    /// Folds one spin (free spins included) into the player's aggregates and returns them.
    pub fn record_spin(&self, user: &str, bet: u64, payout: u64) -> Result<PlayerStats, StorageError> {
        self.storage.record_spin(StatsDelta {
            user,
            bet,
            payout,
            initial_rtp: self.initial_rtp,
            now_ms: now_ms(),
        })
    }

    pub fn get(&self, user: &str) -> Result<Option<PlayerStats>, StorageError> {
        self.storage.stats(user)
    }

    /// Stored stats, or empty stats at the initial RTP when missing or unreadable.
    pub fn get_or_default(&self, user: &str) -> PlayerStats {
        match self.storage.stats(user) {
            Ok(Some(stats)) => stats,
            Ok(None) => PlayerStats::empty(user, self.initial_rtp),
            Err(err) => {
                warn!(user, ?err, "failed to read stats; using defaults");
                PlayerStats::empty(user, self.initial_rtp)
            }
        }
    }
}
