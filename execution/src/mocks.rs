//! Scripted grid sources and grid builders for tests.

use spinledger_types::casino::{Grid, SymbolId, WeightVector, PAYLINES, REELS, ROWS};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::grid::{GenerationError, GridSource};

/// Filler symbol per reel. No two adjacent reels share a symbol, so no payline reaches length 2.
const FILLER: [SymbolId; REELS] = [
    SymbolId::Cherry,
    SymbolId::Lemon,
    SymbolId::Orange,
    SymbolId::Grape,
    SymbolId::Watermelon,
];

/// Grid with no paying line and no bonus symbols.
pub fn losing_grid() -> Grid {
    let mut grid = Grid::filled(SymbolId::Cherry);
    for (reel, symbol) in FILLER.iter().enumerate() {
        for row in 0..ROWS {
            grid.set(reel, row, *symbol);
        }
    }
    grid
}

/// Losing grid with `symbol` on the first `run_length` reels of payline `line_index`.
pub fn grid_with_run(line_index: usize, symbol: SymbolId, run_length: usize) -> Grid {
    let mut grid = losing_grid();
    let line = &PAYLINES[line_index];
    for (reel, row) in line.iter().enumerate().take(run_length.min(REELS)) {
        grid.set(reel, *row, symbol);
    }
    grid
}

/// Places `count` bonus symbols along the bottom rows, reel by reel.
pub fn with_bonus(mut grid: Grid, count: usize) -> Grid {
    let cells = (0..ROWS)
        .rev()
        .flat_map(|row| (0..REELS).map(move |reel| (reel, row)))
        .take(count);
    for (reel, row) in cells {
        grid.set(reel, row, SymbolId::Bonus);
    }
    grid
}

/// Replays a fixed sequence of generation results, then fails.
pub struct ScriptedGrids {
    script: Mutex<VecDeque<Result<Grid, GenerationError>>>,
    calls: AtomicUsize,
}

impl ScriptedGrids {
    pub fn new(script: Vec<Result<Grid, GenerationError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn from_grids(grids: Vec<Grid>) -> Self {
        Self::new(grids.into_iter().map(Ok).collect())
    }

    /// Number of grids requested so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl GridSource for ScriptedGrids {
    fn generate(&self, _weights: &WeightVector) -> Result<Grid, GenerationError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut script = self
            .script
            .lock()
            .map_err(|_| GenerationError::Unavailable("script lock poisoned".to_string()))?;
        script
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Unavailable("script exhausted".to_string())))
    }
}

/// Records the weights each spin was generated with, always returning the same grid.
pub struct RecordingGrids {
    grid: Grid,
    seen: Mutex<Vec<WeightVector>>,
}

impl RecordingGrids {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<WeightVector> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

impl GridSource for RecordingGrids {
    fn generate(&self, weights: &WeightVector) -> Result<Grid, GenerationError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(*weights);
        }
        Ok(self.grid)
    }
}
