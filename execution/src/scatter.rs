//! Bonus (scatter) evaluation.

use spinledger_types::casino::{Grid, SymbolId, BONUS_TABLE};

/// Scatter payout for one grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScatterAward {
    pub bonus_count: usize,
    pub bonus_credit: u64,
    pub free_spins: u32,
}

/// Bonus credit and free spins for `bonus_count` bonus symbols.
///
/// Counts above the largest table entry pay that entry.
pub fn scatter_award(bonus_count: usize) -> ScatterAward {
    let entry = BONUS_TABLE
        .iter()
        .rev()
        .find(|(count, _, _)| bonus_count >= *count);
    match entry {
        Some((_, bonus_credit, free_spins)) => ScatterAward {
            bonus_count,
            bonus_credit: *bonus_credit,
            free_spins: *free_spins,
        },
        None => ScatterAward {
            bonus_count,
            ..ScatterAward::default()
        },
    }
}

/// Counts bonus symbols anywhere on the grid.
pub fn evaluate_scatter(grid: &Grid) -> ScatterAward {
    scatter_award(grid.count(SymbolId::Bonus))
}
