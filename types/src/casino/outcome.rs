use serde::{Deserialize, Serialize};

use super::{Grid, SymbolId};

/// Game type recorded for slot spins.
pub const SLOTS_GAME_TYPE: &str = "slots";

/// A paying run on one payline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinLine {
    pub line_index: usize,
    pub symbol: SymbolId,
    pub run_length: usize,
    pub payout: u64,
}

/// Evaluation of a single grid: the paid spin or one free spin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub grid: Grid,
    pub win_lines: Vec<WinLine>,
    pub bonus_count: usize,
    pub bonus_credit: u64,
    pub free_spins_awarded: u32,
}

impl RoundOutcome {
    pub fn line_payout(&self) -> u64 {
        self.win_lines
            .iter()
            .fold(0u64, |total, line| total.saturating_add(line.payout))
    }

    /// Line wins plus scatter credit.
    pub fn payout(&self) -> u64 {
        self.line_payout().saturating_add(self.bonus_credit)
    }
}

/// Result of one wagering event, free spins included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinResult {
    pub bet: u64,
    pub grid: Grid,
    pub win_lines: Vec<WinLine>,
    pub bonus_count: usize,
    pub bonus_credit: u64,
    pub free_spins_awarded: u32,
    /// Free spins actually played; may be shorter than `free_spins_awarded` when one failed.
    pub free_spin_rounds: Vec<RoundOutcome>,
    pub total_payout: u64,
    pub is_win: bool,
    /// Balance observed after the payout was credited.
    pub balance_after: u64,
}

/// JSON document persisted with each game record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditPayload {
    pub grid: Grid,
    pub wins: Vec<WinLine>,
    pub bonus_count: usize,
    pub bonus_credit: u64,
    #[serde(default)]
    pub free_spin_rounds: Vec<RoundOutcome>,
    pub rtp: f64,
}

impl AuditPayload {
    pub fn from_spin(result: &SpinResult, rtp: f64) -> Self {
        Self {
            grid: result.grid,
            wins: result.win_lines.clone(),
            bonus_count: result.bonus_count,
            bonus_credit: result.bonus_credit,
            free_spin_rounds: result.free_spin_rounds.clone(),
            rtp,
        }
    }
}

/// Persisted audit record of a spin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: i64,
    pub user_id: String,
    pub game_type: String,
    pub bet_amount: u64,
    pub result_amount: u64,
    pub payload: AuditPayload,
    pub rtp_at_time: f64,
    pub created_at_ms: u64,
}
