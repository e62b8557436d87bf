use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{MAX_SYMBOL_WEIGHT, MIN_SYMBOL_WEIGHT};

/// Number of distinct reel symbols.
pub const SYMBOL_COUNT: usize = 9;

/// Reel symbol identifier. The discriminant indexes [`BASE_SYMBOLS`] and [`WeightVector`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SymbolId {
    Cherry = 0,
    Lemon = 1,
    Orange = 2,
    Grape = 3,
    Watermelon = 4,
    Diamond = 5,
    Seven = 6,
    /// Substitutes for any non-bonus symbol on a payline.
    Wild = 7,
    /// Counted anywhere on the grid; never part of a payline run.
    Bonus = 8,
}

impl SymbolId {
    pub const ALL: [SymbolId; SYMBOL_COUNT] = [
        SymbolId::Cherry,
        SymbolId::Lemon,
        SymbolId::Orange,
        SymbolId::Grape,
        SymbolId::Watermelon,
        SymbolId::Diamond,
        SymbolId::Seven,
        SymbolId::Wild,
        SymbolId::Bonus,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn spec(self) -> SymbolSpec {
        BASE_SYMBOLS[self as usize]
    }

    pub const fn label(self) -> &'static str {
        self.spec().label
    }

    pub const fn name(self) -> &'static str {
        match self {
            SymbolId::Cherry => "cherry",
            SymbolId::Lemon => "lemon",
            SymbolId::Orange => "orange",
            SymbolId::Grape => "grape",
            SymbolId::Watermelon => "watermelon",
            SymbolId::Diamond => "diamond",
            SymbolId::Seven => "seven",
            SymbolId::Wild => "wild",
            SymbolId::Bonus => "bonus",
        }
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SymbolId {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|symbol| symbol.name() == lowered || symbol.label() == value)
            .ok_or_else(|| format!("unknown symbol: {value}"))
    }
}

/// Static description of a reel symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SymbolSpec {
    pub id: SymbolId,
    pub label: &'static str,
    /// Baseline sampling weight.
    pub weight: u32,
    /// Relative value, used for display ordering only.
    pub value: u32,
}

/// Baseline symbol table, in [`SymbolId`] order.
pub const BASE_SYMBOLS: [SymbolSpec; SYMBOL_COUNT] = [
    SymbolSpec { id: SymbolId::Cherry, label: "🍒", weight: 25, value: 1 },
    SymbolSpec { id: SymbolId::Lemon, label: "🍋", weight: 20, value: 1 },
    SymbolSpec { id: SymbolId::Orange, label: "🍊", weight: 18, value: 1 },
    SymbolSpec { id: SymbolId::Grape, label: "🍇", weight: 15, value: 2 },
    SymbolSpec { id: SymbolId::Watermelon, label: "🍉", weight: 10, value: 3 },
    SymbolSpec { id: SymbolId::Diamond, label: "💎", weight: 7, value: 5 },
    SymbolSpec { id: SymbolId::Seven, label: "7️⃣", weight: 3, value: 10 },
    SymbolSpec { id: SymbolId::Wild, label: "⭐", weight: 1, value: 0 },
    SymbolSpec { id: SymbolId::Bonus, label: "🎰", weight: 1, value: 0 },
];

/// Per-symbol sampling weights.
///
/// Copies are cheap; the baseline is a `const` table and is never mutated in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeightVector([u32; SYMBOL_COUNT]);

impl WeightVector {
    pub const fn new(weights: [u32; SYMBOL_COUNT]) -> Self {
        Self(weights)
    }

    /// Weights from [`BASE_SYMBOLS`].
    pub const fn baseline() -> Self {
        let mut weights = [0u32; SYMBOL_COUNT];
        let mut i = 0;
        while i < SYMBOL_COUNT {
            weights[i] = BASE_SYMBOLS[i].weight;
            i += 1;
        }
        Self(weights)
    }

    pub fn get(&self, symbol: SymbolId) -> u32 {
        self.0[symbol.index()]
    }

    pub fn set(&mut self, symbol: SymbolId, weight: u32) {
        self.0[symbol.index()] = weight;
    }

    /// Adds `delta` to a weight, keeping the result within `[floor, MAX_SYMBOL_WEIGHT]`.
    pub fn shift(&mut self, symbol: SymbolId, delta: i64, floor: u32) {
        let floor = floor.max(MIN_SYMBOL_WEIGHT);
        let next = (i64::from(self.get(symbol)) + delta)
            .clamp(i64::from(floor), i64::from(MAX_SYMBOL_WEIGHT));
        // In range by the clamp above.
        self.set(symbol, next as u32);
    }

    pub fn total(&self) -> u64 {
        self.0.iter().map(|weight| u64::from(*weight)).sum()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, u32)> + '_ {
        SymbolId::ALL.iter().map(|symbol| (*symbol, self.get(*symbol)))
    }
}

impl Default for WeightVector {
    fn default() -> Self {
        Self::baseline()
    }
}
