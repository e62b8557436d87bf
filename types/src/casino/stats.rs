use serde::{Deserialize, Serialize};

/// Return-to-player percentage, or `initial_rtp` before anything was wagered.
pub fn compute_rtp(total_won: u64, total_wagered: u64, initial_rtp: f64) -> f64 {
    if total_wagered == 0 {
        return initial_rtp;
    }
    total_won as f64 / total_wagered as f64 * 100.0
}

/// Per-player slot aggregates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub user_id: String,
    pub total_spins: u64,
    pub total_wagered: u64,
    pub total_won: u64,
    pub biggest_win: u64,
    pub current_rtp: f64,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl PlayerStats {
    /// Empty aggregates for a player who has never spun.
    pub fn empty(user_id: impl Into<String>, initial_rtp: f64) -> Self {
        Self {
            user_id: user_id.into(),
            total_spins: 0,
            total_wagered: 0,
            total_won: 0,
            biggest_win: 0,
            current_rtp: initial_rtp,
            created_at_ms: 0,
            updated_at_ms: 0,
        }
    }
}
