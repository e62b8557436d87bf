//! Payline evaluation with wild substitution.

use spinledger_types::casino::{
    line_multiplier, Grid, SymbolId, WinLine, MIN_RUN_LENGTH, PAYLINES, REELS,
};

/// Leading run along a line, starting at reel 0.
///
/// Wild extends any run; the first non-wild symbol fixes the line symbol and the run stops at
/// a bonus or a different symbol. A run of wilds alone is reported as [`SymbolId::Wild`].
pub fn leading_run(symbols: &[SymbolId; REELS]) -> (SymbolId, usize) {
    let mut line_symbol = None;
    let mut length = 0;
    for symbol in symbols {
        match *symbol {
            SymbolId::Bonus => break,
            SymbolId::Wild => length += 1,
            symbol => match line_symbol {
                None => {
                    line_symbol = Some(symbol);
                    length += 1;
                }
                Some(current) if current == symbol => length += 1,
                Some(_) => break,
            },
        }
    }
    (line_symbol.unwrap_or(SymbolId::Wild), length)
}

/// Every paying payline on `grid`; lines pay independently.
pub fn evaluate_paylines(grid: &Grid, bet: u64) -> Vec<WinLine> {
    PAYLINES
        .iter()
        .enumerate()
        .filter_map(|(line_index, line)| {
            let (symbol, run_length) = leading_run(&grid.line(line));
            if run_length < MIN_RUN_LENGTH {
                return None;
            }
            let multiplier = line_multiplier(symbol, run_length)?;
            Some(WinLine {
                line_index,
                symbol,
                run_length,
                payout: bet.saturating_mul(multiplier),
            })
        })
        .collect()
}
