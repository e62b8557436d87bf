//! Weighted grid generation.

use rand::distributions::{Distribution, WeightedError, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use spinledger_types::casino::{Grid, SymbolId, WeightVector, REELS, ROWS};
use std::sync::{Mutex, PoisonError};
use thiserror::Error as ThisError;

#[derive(Clone, Debug, ThisError, PartialEq, Eq)]
pub enum GenerationError {
    #[error("symbol weights sum to zero")]
    ZeroTotalWeight,
    #[error("invalid symbol weights: {0}")]
    InvalidWeights(String),
    #[error("grid source unavailable: {0}")]
    Unavailable(String),
}

impl From<WeightedError> for GenerationError {
    fn from(err: WeightedError) -> Self {
        match err {
            WeightedError::AllWeightsZero => GenerationError::ZeroTotalWeight,
            other => GenerationError::InvalidWeights(other.to_string()),
        }
    }
}

/// Cumulative-weight sampler over the symbol table, built once per weight vector.
#[derive(Clone, Debug)]
pub struct SymbolSampler {
    index: WeightedIndex<u32>,
}

impl SymbolSampler {
    pub fn new(weights: &WeightVector) -> Result<Self, GenerationError> {
        if weights.total() == 0 {
            return Err(GenerationError::ZeroTotalWeight);
        }
        let index = WeightedIndex::new(weights.as_slice())?;
        Ok(Self { index })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> SymbolId {
        // WeightedIndex only yields indices of the symbol table it was built from.
        SymbolId::ALL[self.index.sample(rng)]
    }
}

/// Fills every cell with an independent weighted draw.
pub fn generate_grid<R: Rng + ?Sized>(
    weights: &WeightVector,
    rng: &mut R,
) -> Result<Grid, GenerationError> {
    let sampler = SymbolSampler::new(weights)?;
    let mut grid = Grid::filled(SymbolId::Cherry);
    for reel in 0..REELS {
        for row in 0..ROWS {
            grid.set(reel, row, sampler.sample(rng));
        }
    }
    Ok(grid)
}

/// Source of spin grids. Production uses [`RandomGrids`]; tests script exact grids.
pub trait GridSource: Send + Sync {
    fn generate(&self, weights: &WeightVector) -> Result<Grid, GenerationError>;
}

/// Grid source backed by a ChaCha20 stream.
pub struct RandomGrids {
    rng: Mutex<ChaCha20Rng>,
}

impl RandomGrids {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::from_entropy()),
        }
    }

    /// Reproducible sequence of grids for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)),
        }
    }
}

impl GridSource for RandomGrids {
    fn generate(&self, weights: &WeightVector) -> Result<Grid, GenerationError> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        generate_grid(weights, &mut *rng)
    }
}
