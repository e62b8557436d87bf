use serde::{Deserialize, Serialize};
use std::fmt;

use super::{SymbolId, REELS, ROWS};

/// Visible slot window, addressed as `cells[reel][row]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grid {
    cells: [[SymbolId; ROWS]; REELS],
}

impl Grid {
    pub const fn new(cells: [[SymbolId; ROWS]; REELS]) -> Self {
        Self { cells }
    }

    /// Grid with every cell set to `symbol`.
    pub const fn filled(symbol: SymbolId) -> Self {
        Self {
            cells: [[symbol; ROWS]; REELS],
        }
    }

    pub fn get(&self, reel: usize, row: usize) -> SymbolId {
        self.cells[reel][row]
    }

    pub fn set(&mut self, reel: usize, row: usize, symbol: SymbolId) {
        self.cells[reel][row] = symbol;
    }

    /// Occurrences of `symbol` anywhere on the grid.
    pub fn count(&self, symbol: SymbolId) -> usize {
        self.cells
            .iter()
            .flat_map(|reel| reel.iter())
            .filter(|cell| **cell == symbol)
            .count()
    }

    /// Symbols read along `line`, one row index per reel.
    pub fn line(&self, line: &[usize; REELS]) -> [SymbolId; REELS] {
        let mut symbols = [SymbolId::Cherry; REELS];
        for (reel, row) in line.iter().enumerate() {
            symbols[reel] = self.cells[reel][*row];
        }
        symbols
    }

    /// Symbols of one visible row, left to right.
    pub fn row(&self, row: usize) -> [SymbolId; REELS] {
        let mut symbols = [SymbolId::Cherry; REELS];
        for (reel, cells) in self.cells.iter().enumerate() {
            symbols[reel] = cells[row];
        }
        symbols
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..ROWS {
            let symbols = self.row(row);
            for (reel, symbol) in symbols.iter().enumerate() {
                if reel > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{symbol}")?;
            }
            if row + 1 < ROWS {
                f.write_str("\n")?;
            }
        }
        Ok(())
    }
}
