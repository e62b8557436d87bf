use spinledger_types::casino::{AuditPayload, GameRecord, SpinResult, SLOTS_GAME_TYPE};
use std::sync::Arc;

use crate::error::StorageError;
use crate::storage::{now_ms, NewGameRecord, Storage};

/// Audit trail of played spins.
pub struct GameRecords {
    storage: Arc<Storage>,
}

impl GameRecords {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Persists a spin with its grid, win lines, and free-spin rounds. Returns the record id.
    pub fn save_spin(&self, user: &str, result: &SpinResult, rtp: f64) -> Result<i64, StorageError> {
        let payload = AuditPayload::from_spin(result, rtp);
        self.storage.insert_game_record(NewGameRecord {
            user,
            game_type: SLOTS_GAME_TYPE,
            bet_amount: result.bet,
            result_amount: result.total_payout,
            payload_json: serde_json::to_string(&payload)?,
            rtp_at_time: rtp,
            now_ms: now_ms(),
        })
    }

    pub fn recent(&self, user: &str, limit: usize) -> Result<Vec<GameRecord>, StorageError> {
        self.storage.recent_games(user, limit)
    }
}
