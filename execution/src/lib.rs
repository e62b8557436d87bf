//! Spinledger slot engine.
//!
//! This crate turns a per-player weight vector into spin outcomes: weighted grid generation,
//! payline and scatter evaluation, the free-spin chain, and the closed-loop RTP controller that
//! picks each player's weights. It does not touch balances; the service debits and credits
//! around [`play_spin`].
//!
//! ## Randomness
//! Grids come from a [`GridSource`]. [`RandomGrids`] draws from a ChaCha20 stream (seedable for
//! reproducible runs); tests script exact grids with the `mocks` feature.
//!
//! ```rust
//! use spinledger_execution::{play_spin, RandomGrids, RtpManager};
//!
//! let manager = RtpManager::default();
//! let source = RandomGrids::seeded(7);
//! let weights = manager.get_weights("alice");
//! let play = play_spin(&source, &weights, 50).expect("baseline weights are valid");
//! assert_eq!(play.free_spin_rounds.len(), play.base.free_spins_awarded as usize);
//! ```

pub mod grid;
pub mod paylines;
pub mod round;
pub mod rtp;
pub mod scatter;
pub mod weight_cache;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use grid::{generate_grid, GenerationError, GridSource, RandomGrids, SymbolSampler};
pub use paylines::{evaluate_paylines, leading_run};
pub use round::{evaluate_round, play_spin, SpinPlay};
pub use rtp::{
    adjusted_weights, RtpBand, RtpBandError, RtpManager, DEFAULT_WEIGHT_CACHE_CAPACITY,
    DEFAULT_WEIGHT_CACHE_TTL,
};
pub use scatter::{evaluate_scatter, scatter_award, ScatterAward};
pub use weight_cache::TtlCache;
