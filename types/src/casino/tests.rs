use super::*;
use proptest::prelude::*;

#[test]
fn test_baseline_matches_symbol_table() {
    let baseline = WeightVector::baseline();
    for spec in BASE_SYMBOLS.iter() {
        assert_eq!(baseline.get(spec.id), spec.weight, "weight for {:?}", spec.id);
        assert_eq!(spec.id.spec(), *spec);
    }
    assert_eq!(baseline.total(), 100);
}

#[test]
fn test_symbol_index_matches_table_order() {
    for (position, symbol) in SymbolId::ALL.into_iter().enumerate() {
        assert_eq!(symbol.index(), position);
    }
}

#[test]
fn test_symbol_parses_name_and_label() {
    assert_eq!("Seven".parse::<SymbolId>(), Ok(SymbolId::Seven));
    assert_eq!("💎".parse::<SymbolId>(), Ok(SymbolId::Diamond));
    assert!("banana".parse::<SymbolId>().is_err());
}

#[test]
fn test_line_multiplier_table() {
    assert_eq!(line_multiplier(SymbolId::Cherry, 2), None);
    assert_eq!(line_multiplier(SymbolId::Cherry, 3), Some(2));
    assert_eq!(line_multiplier(SymbolId::Cherry, 4), Some(5));
    assert_eq!(line_multiplier(SymbolId::Cherry, 5), Some(20));
    assert_eq!(line_multiplier(SymbolId::Seven, 4), Some(5));
    assert_eq!(line_multiplier(SymbolId::Seven, 5), Some(50));
    assert_eq!(line_multiplier(SymbolId::Diamond, 5), Some(30));
    assert_eq!(line_multiplier(SymbolId::Wild, 5), Some(20));
}

#[test]
fn test_paylines_stay_on_grid() {
    for (index, line) in PAYLINES.iter().enumerate() {
        for row in line {
            assert!(*row < ROWS, "payline {index} leaves the grid");
        }
    }
    let mut unique = PAYLINES.to_vec();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), PAYLINES.len(), "duplicate payline");
}

#[test]
fn test_weight_shift_respects_floor() {
    let mut weights = WeightVector::baseline();
    weights.shift(SymbolId::Diamond, -10, 3);
    assert_eq!(weights.get(SymbolId::Diamond), 3);
    weights.shift(SymbolId::Wild, -1, 1);
    assert_eq!(weights.get(SymbolId::Wild), 1);
    weights.shift(SymbolId::Cherry, 5_000, 1);
    assert_eq!(weights.get(SymbolId::Cherry), MAX_SYMBOL_WEIGHT);
}

#[test]
fn test_grid_count_and_line() {
    let mut grid = Grid::filled(SymbolId::Lemon);
    grid.set(0, 0, SymbolId::Bonus);
    grid.set(4, 5, SymbolId::Bonus);
    assert_eq!(grid.count(SymbolId::Bonus), 2);
    assert_eq!(grid.count(SymbolId::Lemon), REELS * ROWS - 2);

    let line = grid.line(&PAYLINES[0]);
    assert_eq!(line[0], SymbolId::Bonus);
    assert_eq!(line[1], SymbolId::Lemon);
}

#[test]
fn test_grid_display_renders_rows() {
    let grid = Grid::filled(SymbolId::Cherry);
    let rendered = grid.to_string();
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines.len(), ROWS);
    assert_eq!(lines[0], ["🍒"; REELS].join(" "));
}

#[test]
fn test_grid_json_roundtrip() {
    let mut grid = Grid::filled(SymbolId::Orange);
    grid.set(2, 3, SymbolId::Wild);
    let json = serde_json::to_string(&grid).expect("serialize grid");
    let decoded: Grid = serde_json::from_str(&json).expect("deserialize grid");
    assert_eq!(grid, decoded);
}

#[test]
fn test_compute_rtp() {
    assert_eq!(compute_rtp(0, 0, DEFAULT_INITIAL_RTP), DEFAULT_INITIAL_RTP);
    assert_eq!(compute_rtp(50, 100, DEFAULT_INITIAL_RTP), 50.0);
    assert_eq!(compute_rtp(300, 100, DEFAULT_INITIAL_RTP), 300.0);
}

#[test]
fn test_round_outcome_payout_includes_bonus() {
    let outcome = RoundOutcome {
        grid: Grid::filled(SymbolId::Cherry),
        win_lines: vec![
            WinLine { line_index: 0, symbol: SymbolId::Cherry, run_length: 5, payout: 1_000 },
            WinLine { line_index: 1, symbol: SymbolId::Cherry, run_length: 3, payout: 100 },
        ],
        bonus_count: 3,
        bonus_credit: 100,
        free_spins_awarded: 1,
    };
    assert_eq!(outcome.line_payout(), 1_100);
    assert_eq!(outcome.payout(), 1_200);
}

#[test]
fn test_line_payout_saturates() {
    let line = WinLine { line_index: 0, symbol: SymbolId::Seven, run_length: 5, payout: u64::MAX / 2 + 1 };
    let outcome = RoundOutcome {
        grid: Grid::filled(SymbolId::Seven),
        win_lines: vec![line, line, line],
        bonus_count: 0,
        bonus_credit: 10,
        free_spins_awarded: 0,
    };
    assert_eq!(outcome.line_payout(), u64::MAX);
    assert_eq!(outcome.payout(), u64::MAX);
}

#[test]
fn test_max_spin_payout_bounds() {
    // (50 * 50 * 20 + 500) * 4 rounds
    assert_eq!(max_spin_payout(50), Some(202_000));
    assert_eq!(max_spin_payout(0), Some(2_000));
    assert_eq!(max_spin_payout(1 << 60), None);
}

proptest! {
    #[test]
    fn prop_shift_stays_in_range(delta in -5_000i64..5_000, floor in 0u32..50, index in 0usize..SYMBOL_COUNT) {
        let symbol = SymbolId::ALL[index];
        let mut weights = WeightVector::baseline();
        weights.shift(symbol, delta, floor);
        let weight = weights.get(symbol);
        prop_assert!(weight >= floor.max(MIN_SYMBOL_WEIGHT));
        prop_assert!(weight <= MAX_SYMBOL_WEIGHT);
    }
}
