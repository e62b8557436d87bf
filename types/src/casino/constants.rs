use super::SymbolId;

/// Number of reels (columns) on the slot grid.
pub const REELS: usize = 5;

/// Number of visible rows per reel.
pub const ROWS: usize = 6;

/// Shortest run along a payline that pays.
pub const MIN_RUN_LENGTH: usize = 3;

/// Default wager per spin.
pub const DEFAULT_BET: u64 = 50;

/// Default return-to-player band, in percent.
pub const DEFAULT_MIN_RTP: f64 = 94.0;
pub const DEFAULT_MAX_RTP: f64 = 98.0;
/// Reported RTP for a player who has not wagered yet.
pub const DEFAULT_INITIAL_RTP: f64 = 96.0;

/// Adjusted symbol weights are clamped to `[MIN_SYMBOL_WEIGHT, MAX_SYMBOL_WEIGHT]`.
pub const MIN_SYMBOL_WEIGHT: u32 = 1;
pub const MAX_SYMBOL_WEIGHT: u32 = 1_000;

/// Fixed paylines. Entry `i` of a line is the row read on reel `i`.
pub const PAYLINES: [[usize; REELS]; 20] = [
    // Straight rows.
    [0, 0, 0, 0, 0],
    [1, 1, 1, 1, 1],
    [2, 2, 2, 2, 2],
    [3, 3, 3, 3, 3],
    [4, 4, 4, 4, 4],
    [5, 5, 5, 5, 5],
    // V shapes.
    [0, 1, 2, 1, 0],
    [1, 2, 3, 2, 1],
    [2, 3, 4, 3, 2],
    [3, 4, 5, 4, 3],
    // Inverted V shapes.
    [5, 4, 3, 4, 5],
    [4, 3, 2, 3, 4],
    [3, 2, 1, 2, 3],
    [2, 1, 0, 1, 2],
    // Zigzags.
    [0, 1, 0, 1, 0],
    [5, 4, 5, 4, 5],
    [1, 0, 1, 0, 1],
    [4, 5, 4, 5, 4],
    // Wide diagonals.
    [0, 2, 4, 2, 0],
    [5, 3, 1, 3, 5],
];

/// Base line multipliers keyed by run length.
pub const RUN_MULTIPLIERS: [(usize, u64); 3] = [(3, 2), (4, 5), (5, 20)];

/// Five-of-a-kind overrides for premium symbols.
pub const PREMIUM_FIVE_MULTIPLIERS: [(SymbolId, u64); 2] =
    [(SymbolId::Seven, 50), (SymbolId::Diamond, 30)];

/// Bonus symbol table: `(count, bonus_credit, free_spins)`.
pub const BONUS_TABLE: [(usize, u64, u32); 3] = [(3, 100, 1), (4, 200, 2), (5, 500, 3)];

/// Multiplier for a payline run, or `None` when the run does not pay.
pub fn line_multiplier(symbol: SymbolId, run_length: usize) -> Option<u64> {
    if run_length == REELS {
        if let Some((_, multiplier)) = PREMIUM_FIVE_MULTIPLIERS
            .iter()
            .find(|(premium, _)| *premium == symbol)
        {
            return Some(*multiplier);
        }
    }
    RUN_MULTIPLIERS
        .iter()
        .find(|(length, _)| *length == run_length)
        .map(|(_, multiplier)| *multiplier)
}

/// Largest total payout one wager of `bet` can produce: every payline paying the top
/// multiplier plus the top scatter credit, on the paid round and each free spin.
/// `None` when that amount does not fit in a `u64`.
pub fn max_spin_payout(bet: u64) -> Option<u64> {
    let top_multiplier = RUN_MULTIPLIERS
        .iter()
        .map(|(_, multiplier)| *multiplier)
        .chain(PREMIUM_FIVE_MULTIPLIERS.iter().map(|(_, multiplier)| *multiplier))
        .max()?;
    let (_, top_credit, top_free_spins) = BONUS_TABLE
        .iter()
        .copied()
        .max_by_key(|(count, _, _)| *count)?;
    let rounds = u64::from(top_free_spins).checked_add(1)?;
    bet.checked_mul(top_multiplier)?
        .checked_mul(PAYLINES.len() as u64)?
        .checked_add(top_credit)?
        .checked_mul(rounds)
}
