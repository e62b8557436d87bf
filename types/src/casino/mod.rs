//! Slot machine domain types.
//!
//! Defines the symbol table, grid, paytables, spin outcomes, and per-player statistics shared
//! by the engine and the service.

mod constants;
mod grid;
mod outcome;
mod stats;
mod symbol;

pub use constants::*;
pub use grid::*;
pub use outcome::*;
pub use stats::*;
pub use symbol::*;

#[cfg(test)]
mod tests;
