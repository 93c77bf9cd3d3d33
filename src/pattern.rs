// src/pattern.rs
// Scoring algorithms: given a grid, the drawn balls and the index sets a ticket
// has already been credited for, decide whether a rule is won or nearly won.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::defs::{Number, QUINA_COLUMNS};
use crate::prize::PrizeKind;

/// Sorted grid positions.
pub type IndexSet = Vec<usize>;

/// Winning index sets already credited to a ticket, per pattern kind.
pub type UsedPatterns = BTreeMap<PrizeKind, Vec<IndexSet>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternResult {
    pub satisfied: bool,
    /// Exactly one required number is missing
    pub near: bool,
    /// Positions that made up the win, when satisfied
    pub indices: Option<IndexSet>,
}

impl PatternResult {
    pub fn unsatisfiable() -> Self {
        Self::default()
    }

    fn won(indices: IndexSet) -> Self {
        Self { satisfied: true, near: false, indices: Some(indices) }
    }

    fn near(near: bool) -> Self {
        Self { satisfied: false, near, indices: None }
    }
}

fn missing_count(grid: &[Number], indices: &[usize], drawn: &HashSet<Number>) -> usize {
    indices.iter().filter(|&&i| !drawn.contains(&grid[i])).count()
}

fn was_used(used: &UsedPatterns, kind: PrizeKind, indices: &[usize]) -> bool {
    used.get(&kind)
        .is_some_and(|sets| sets.iter().any(|set| set.as_slice() == indices))
}

/// Whole card. A ticket can be credited for cheia only once.
pub fn check_cheia(grid: &[Number], drawn: &HashSet<Number>, used: &UsedPatterns) -> PatternResult {
    if grid.is_empty() || used.get(&PrizeKind::Cheia).is_some_and(|sets| !sets.is_empty()) {
        return PatternResult::unsatisfiable();
    }
    let missing = grid.iter().filter(|n| !drawn.contains(n)).count();
    match missing {
        0 => PatternResult::won((0..grid.len()).collect()),
        1 => PatternResult::near(true),
        _ => PatternResult::near(false),
    }
}

/// Custom shape over explicit grid positions. An empty pattern, or one that
/// points outside the grid, can never be won.
pub fn check_forma(grid: &[Number], drawn: &HashSet<Number>, pattern: &[usize]) -> PatternResult {
    if pattern.is_empty() || pattern.iter().any(|&i| i >= grid.len()) {
        return PatternResult::unsatisfiable();
    }
    let mut indices = pattern.to_vec();
    indices.sort_unstable();
    indices.dedup();

    match missing_count(grid, &indices, drawn) {
        0 => PatternResult::won(indices),
        1 => PatternResult::near(true),
        _ => PatternResult::near(false),
    }
}

/// Candidate lines for a quina, in credit order: rows, then (5x5 only)
/// columns, then the two diagonals.
pub fn quina_lines(grid_len: usize) -> Vec<IndexSet> {
    let rows = grid_len / QUINA_COLUMNS;
    let mut lines: Vec<IndexSet> = (0..rows)
        .map(|r| (r * QUINA_COLUMNS..(r + 1) * QUINA_COLUMNS).collect())
        .collect();

    if rows == QUINA_COLUMNS && grid_len == QUINA_COLUMNS * QUINA_COLUMNS {
        for c in 0..QUINA_COLUMNS {
            lines.push((0..rows).map(|r| r * QUINA_COLUMNS + c).collect());
        }
        lines.push((0..QUINA_COLUMNS).map(|i| i * (QUINA_COLUMNS + 1)).collect());
        lines.push((1..=QUINA_COLUMNS).map(|i| i * (QUINA_COLUMNS - 1)).collect());
    }
    lines
}

/// Any line. The first complete line not already credited wins; lines already
/// credited are ignored entirely.
pub fn check_quina(grid: &[Number], drawn: &HashSet<Number>, used: &UsedPatterns) -> PatternResult {
    let mut near = false;
    for line in quina_lines(grid.len()) {
        if was_used(used, PrizeKind::Quina, &line) {
            continue;
        }
        match missing_count(grid, &line, drawn) {
            0 => return PatternResult::won(line),
            1 => near = true,
            _ => {}
        }
    }
    PatternResult::near(near)
}

pub fn evaluate(
    kind: PrizeKind,
    grid: &[Number],
    drawn: &HashSet<Number>,
    pattern: &[usize],
    used: &UsedPatterns,
) -> PatternResult {
    match kind {
        PrizeKind::Cheia => check_cheia(grid, drawn, used),
        PrizeKind::Forma => check_forma(grid, drawn, pattern),
        PrizeKind::Quina => check_quina(grid, drawn, used),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_5x5() -> Vec<Number> {
        (1..=25).collect()
    }

    fn drawn(numbers: &[Number]) -> HashSet<Number> {
        numbers.iter().copied().collect()
    }

    #[test]
    fn test_cheia_win_and_near() {
        let grid = vec![1, 10, 12, 15];
        let used = UsedPatterns::new();
        let r = check_cheia(&grid, &drawn(&[1, 10, 12]), &used);
        assert!(!r.satisfied && r.near);
        let r = check_cheia(&grid, &drawn(&[1, 10, 12, 15]), &used);
        assert!(r.satisfied);
        assert_eq!(r.indices, Some(vec![0, 1, 2, 3]));
    }

    #[test]
    fn test_cheia_only_once() {
        let grid = vec![1, 2];
        let mut used = UsedPatterns::new();
        used.insert(PrizeKind::Cheia, vec![vec![0, 1]]);
        assert_eq!(check_cheia(&grid, &drawn(&[1, 2]), &used), PatternResult::unsatisfiable());
    }

    #[test]
    fn test_forma_empty_pattern_never_wins() {
        let grid = grid_5x5();
        let all: Vec<Number> = (1..=75).collect();
        let r = check_forma(&grid, &drawn(&all), &[]);
        assert_eq!(r, PatternResult::unsatisfiable());
    }

    #[test]
    fn test_forma_out_of_range_index_never_wins() {
        let grid = vec![1, 2, 3];
        let r = check_forma(&grid, &drawn(&[1, 2, 3]), &[0, 7]);
        assert!(!r.satisfied && !r.near);
    }

    #[test]
    fn test_forma_corners() {
        let grid = grid_5x5();
        let corners = [0, 4, 20, 24];
        let r = check_forma(&grid, &drawn(&[1, 5, 21]), &corners);
        assert!(r.near && !r.satisfied);
        let r = check_forma(&grid, &drawn(&[1, 5, 21, 25]), &[24, 0, 20, 4]);
        assert!(r.satisfied);
        assert_eq!(r.indices, Some(vec![0, 4, 20, 24]));
    }

    #[test]
    fn test_quina_lines_for_15_and_25() {
        let lines = quina_lines(15);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], vec![10, 11, 12, 13, 14]);

        let lines = quina_lines(25);
        assert_eq!(lines.len(), 12);
        assert_eq!(lines[5], vec![0, 5, 10, 15, 20]);
        assert_eq!(lines[10], vec![0, 6, 12, 18, 24]);
        assert_eq!(lines[11], vec![4, 8, 12, 16, 20]);
    }

    #[test]
    fn test_quina_row_before_column() {
        let grid = grid_5x5();
        // row 0 and column 0 both complete
        let r = check_quina(&grid, &drawn(&[1, 2, 3, 4, 5, 6, 11, 16, 21]), &UsedPatterns::new());
        assert_eq!(r.indices, Some(vec![0, 1, 2, 3, 4]));
    }

    #[test]
    fn test_quina_skips_used_line() {
        let grid = grid_5x5();
        let mut used = UsedPatterns::new();
        used.insert(PrizeKind::Quina, vec![vec![0, 1, 2, 3, 4]]);
        let r = check_quina(&grid, &drawn(&[1, 2, 3, 4, 5, 6, 11, 16, 21]), &used);
        assert_eq!(r.indices, Some(vec![0, 5, 10, 15, 20]));

        let r = check_quina(&grid, &drawn(&[1, 2, 3, 4, 5]), &used);
        assert!(!r.satisfied);
    }

    #[test]
    fn test_quina_diagonal_and_near() {
        let grid = grid_5x5();
        let r = check_quina(&grid, &drawn(&[5, 9, 13, 17]), &UsedPatterns::new());
        assert!(r.near && !r.satisfied);
        let r = check_quina(&grid, &drawn(&[5, 9, 13, 17, 21]), &UsedPatterns::new());
        assert_eq!(r.indices, Some(vec![4, 8, 12, 16, 20]));
    }

    #[test]
    fn test_quina_no_columns_on_15_grid() {
        let grid: Vec<Number> = (1..=15).collect();
        let r = check_quina(&grid, &drawn(&[1, 6, 11]), &UsedPatterns::new());
        assert!(!r.satisfied && !r.near);
    }
}
