//! Per-player return-to-player control.
//!
//! Each player spins with their own weight vector. After every spin the vector is rebuilt from
//! the baseline according to where the player's observed RTP sits relative to the target band:
//! above the band the premium symbols get rarer, below it they get more common. Adjustments
//! never compound across spins, so the cache is disposable and a restart resets everyone to
//! baseline odds.

use spinledger_types::casino::{
    SymbolId, WeightVector, DEFAULT_INITIAL_RTP, DEFAULT_MAX_RTP, DEFAULT_MIN_RTP,
};
use std::time::{Duration, Instant};
use thiserror::Error as ThisError;
use tracing::debug;

use crate::weight_cache::TtlCache;

pub const DEFAULT_WEIGHT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_WEIGHT_CACHE_CAPACITY: usize = 100_000;

#[derive(Debug, ThisError, PartialEq)]
pub enum RtpBandError {
    #[error("rtp values must be finite and non-negative (min={min}, max={max}, initial={initial})")]
    NotFinite { min: f64, max: f64, initial: f64 },
    #[error("min_rtp must not exceed max_rtp (min={min}, max={max})")]
    Inverted { min: f64, max: f64 },
}

/// Target RTP band, in percent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RtpBand {
    pub min: f64,
    pub max: f64,
    /// Reported for players who have not wagered.
    pub initial: f64,
}

impl Default for RtpBand {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_RTP,
            max: DEFAULT_MAX_RTP,
            initial: DEFAULT_INITIAL_RTP,
        }
    }
}

impl RtpBand {
    pub fn validate(&self) -> Result<(), RtpBandError> {
        let values = [self.min, self.max, self.initial];
        if values.iter().any(|value| !value.is_finite() || *value < 0.0) {
            return Err(RtpBandError::NotFinite {
                min: self.min,
                max: self.max,
                initial: self.initial,
            });
        }
        if self.min > self.max {
            return Err(RtpBandError::Inverted {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// Weights for a player whose observed RTP is `observed`, or `None` when the baseline applies.
pub fn adjusted_weights(observed: f64, band: &RtpBand) -> Option<WeightVector> {
    let mut weights = WeightVector::baseline();
    if observed > band.max {
        weights.shift(SymbolId::Seven, -1, 1);
        weights.shift(SymbolId::Diamond, -2, 3);
        weights.shift(SymbolId::Wild, -1, 1);
        weights.shift(SymbolId::Cherry, 3, 1);
        weights.shift(SymbolId::Lemon, 2, 1);
        Some(weights)
    } else if observed < band.min {
        weights.shift(SymbolId::Seven, 1, 1);
        weights.shift(SymbolId::Diamond, 2, 1);
        weights.shift(SymbolId::Wild, 1, 1);
        weights.shift(SymbolId::Watermelon, 2, 1);
        weights.shift(SymbolId::Cherry, -5, 15);
        Some(weights)
    } else {
        None
    }
}

/// Per-player weight vectors, derived from the baseline and each player's latest RTP.
pub struct RtpManager {
    band: RtpBand,
    cache: TtlCache<String, WeightVector>,
}

impl RtpManager {
    pub fn new(band: RtpBand, cache_ttl: Duration, cache_capacity: usize) -> Self {
        Self {
            band,
            cache: TtlCache::new(cache_ttl, cache_capacity),
        }
    }

    /// Current weights for `user`; a copy of the baseline when nothing is cached.
    pub fn get_weights(&self, user: &str) -> WeightVector {
        self.cache.get(user).unwrap_or_else(WeightVector::baseline)
    }

    /// Rebuilds `user`'s weights from the baseline for the given observed RTP.
    pub fn adjust_weights(&self, user: &str, observed_rtp: f64) -> WeightVector {
        match adjusted_weights(observed_rtp, &self.band) {
            Some(weights) => {
                debug!(user, observed_rtp, "adjusted symbol weights");
                self.cache.insert(user.to_string(), weights);
                weights
            }
            None => {
                self.cache.remove(user);
                WeightVector::baseline()
            }
        }
    }

    pub fn cached_players(&self) -> usize {
        self.cache.len()
    }

    /// Drops expired weight vectors, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired(Instant::now())
    }
}

impl Default for RtpManager {
    fn default() -> Self {
        Self::new(
            RtpBand::default(),
            DEFAULT_WEIGHT_CACHE_TTL,
            DEFAULT_WEIGHT_CACHE_CAPACITY,
        )
    }
}
