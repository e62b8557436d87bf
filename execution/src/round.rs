//! Single-grid evaluation and the free-spin chain.

use spinledger_types::casino::{Grid, RoundOutcome, WeightVector};
use tracing::{debug, warn};

use crate::grid::{GenerationError, GridSource};
use crate::paylines::evaluate_paylines;
use crate::scatter::evaluate_scatter;

/// Evaluates paylines and scatter for one grid.
pub fn evaluate_round(grid: Grid, bet: u64) -> RoundOutcome {
    let win_lines = evaluate_paylines(&grid, bet);
    let scatter = evaluate_scatter(&grid);
    RoundOutcome {
        grid,
        win_lines,
        bonus_count: scatter.bonus_count,
        bonus_credit: scatter.bonus_credit,
        free_spins_awarded: scatter.free_spins,
    }
}

/// Outcome of the paid round plus every free spin it triggered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpinPlay {
    pub base: RoundOutcome,
    pub free_spin_rounds: Vec<RoundOutcome>,
    /// Set when a free spin failed to generate; remaining free spins were skipped.
    pub free_spin_error: Option<GenerationError>,
}

impl SpinPlay {
    pub fn total_payout(&self) -> u64 {
        self.free_spin_rounds
            .iter()
            .fold(self.base.payout(), |total, round| {
                total.saturating_add(round.payout())
            })
    }
}

/// Plays the paid round and any free spins it awards, all at the same weights and bet.
///
/// A failure on the paid round is returned as an error. A failure during free spins ends the
/// chain and keeps what was already won. Free spins awarded by a free spin are not played.
pub fn play_spin(
    source: &dyn GridSource,
    weights: &WeightVector,
    bet: u64,
) -> Result<SpinPlay, GenerationError> {
    let base = evaluate_round(source.generate(weights)?, bet);
    let mut free_spin_rounds = Vec::with_capacity(base.free_spins_awarded as usize);
    let mut free_spin_error = None;

    for spin in 0..base.free_spins_awarded {
        let grid = match source.generate(weights) {
            Ok(grid) => grid,
            Err(err) => {
                warn!(spin, ?err, "free spin generation failed; ending free spins");
                free_spin_error = Some(err);
                break;
            }
        };
        let mut round = evaluate_round(grid, bet);
        if round.free_spins_awarded > 0 {
            debug!(
                spin,
                discarded = round.free_spins_awarded,
                "discarding free spins won during a free spin"
            );
            round.free_spins_awarded = 0;
        }
        free_spin_rounds.push(round);
    }

    Ok(SpinPlay {
        base,
        free_spin_rounds,
        free_spin_error,
    })
}
