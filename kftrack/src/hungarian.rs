//! Kuhn-Munkres assignment on rectangular cost matrices
//!
//! Costs are finite non-negative f32; entries at or above [`SENTINEL_COST`]
//! are forbidden pairs. Rectangular inputs are padded to square with the
//! sentinel so the solver always sees a well-formed problem, and padded or
//! sentinel assignments are reported as unassigned.

use ndarray::ArrayView2;
use pathfinding::prelude::{kuhn_munkres_min, Matrix};

/// Cost standing in for "forbidden": strictly above any gated-in pair cost.
pub const SENTINEL_COST: f32 = 1.0e6;

/// Fixed-point scale applied before the integer solver.
const COST_SCALE: f32 = 1000.0;

/// Result of one assignment solve.
#[derive(Debug, Clone)]
pub struct AssignmentResult {
    /// Accepted (row, column) pairs, ordered by row.
    pub assignments: Vec<(usize, usize)>,
    /// Rows with no accepted column.
    pub unassigned_rows: Vec<usize>,
    /// Columns with no accepted row.
    pub unassigned_cols: Vec<usize>,
    /// Sum of the accepted pair costs.
    pub total_cost: f32,
}

/// Assignment solver over gated cost matrices.
pub struct HungarianSolver;

impl HungarianSolver {
    /// Solve the minimum-cost assignment for `cost`.
    ///
    /// Every row is either matched to exactly one column or reported
    /// unassigned; no column is used twice. Pairs whose cost reaches the
    /// sentinel are never accepted.
    pub fn solve(cost: ArrayView2<f32>) -> AssignmentResult {
        let rows = cost.nrows();
        let cols = cost.ncols();

        if rows == 0 || cols == 0 {
            return AssignmentResult {
                assignments: Vec::new(),
                unassigned_rows: (0..rows).collect(),
                unassigned_cols: (0..cols).collect(),
                total_cost: 0.0,
            };
        }

        let sentinel = (SENTINEL_COST * COST_SCALE) as i64;
        let size = rows.max(cols);
        let mut weights = Matrix::new(size, size, sentinel);
        for ((i, j), &c) in cost.indexed_iter() {
            let clamped = c.clamp(0.0, SENTINEL_COST);
            weights[(i, j)] = (clamped * COST_SCALE) as i64;
        }

        let (_, raw) = kuhn_munkres_min(&weights);

        let mut assignments = Vec::new();
        let mut unassigned_rows = Vec::new();
        let mut col_taken = vec![false; cols];
        let mut total_cost = 0.0;
        for (row, &col) in raw.iter().enumerate().take(rows) {
            if col < cols && weights[(row, col)] < sentinel {
                total_cost += cost[(row, col)];
                col_taken[col] = true;
                assignments.push((row, col));
            } else {
                unassigned_rows.push(row);
            }
        }
        let unassigned_cols = (0..cols).filter(|&j| !col_taken[j]).collect();

        AssignmentResult {
            assignments,
            unassigned_rows,
            unassigned_cols,
            total_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use rand::prelude::*;

    /// Minimum accepted cost over every permutation of the padded square
    /// problem, mirroring the solver's sentinel semantics exactly.
    fn brute_force_min(cost: &Array2<f32>) -> f32 {
        let size = cost.nrows().max(cost.ncols());
        let padded = Array2::from_shape_fn((size, size), |(i, j)| {
            if i < cost.nrows() && j < cost.ncols() {
                cost[(i, j)].min(SENTINEL_COST)
            } else {
                SENTINEL_COST
            }
        });

        fn recurse(padded: &Array2<f32>, row: usize, used: &mut Vec<bool>) -> f32 {
            if row == padded.nrows() {
                return 0.0;
            }
            let mut best = f32::INFINITY;
            for col in 0..padded.ncols() {
                if !used[col] {
                    used[col] = true;
                    let total = padded[(row, col)] + recurse(padded, row + 1, used);
                    used[col] = false;
                    best = best.min(total);
                }
            }
            best
        }

        let best_total = recurse(&padded, 0, &mut vec![false; size]);
        // Real pair costs are tiny next to the sentinel, so the sentinel
        // count of the optimum is determined by the total alone.
        let sentinels = (best_total / SENTINEL_COST).round();
        best_total - sentinels * SENTINEL_COST
    }

    #[test]
    fn diagonal_preference() {
        let cost = array![[1.0, 5.0], [5.0, 1.0]];
        let result = HungarianSolver::solve(cost.view());
        assert_eq!(result.assignments, vec![(0, 0), (1, 1)]);
        assert_abs_diff_eq!(result.total_cost, 2.0);
    }

    #[test]
    fn anti_diagonal_preference() {
        let cost = array![[5.0, 1.0], [1.0, 5.0]];
        let result = HungarianSolver::solve(cost.view());
        assert_eq!(result.assignments, vec![(0, 1), (1, 0)]);
        assert_abs_diff_eq!(result.total_cost, 2.0);
    }

    #[test]
    fn rectangular_more_rows() {
        let cost = array![[1.0, 9.0], [2.0, 1.0], [9.0, 9.0]];
        let result = HungarianSolver::solve(cost.view());
        assert_eq!(result.assignments.len(), 2);
        assert_eq!(result.unassigned_rows.len(), 1);
        assert!(result.unassigned_cols.is_empty());
    }

    #[test]
    fn rectangular_more_cols() {
        let cost = array![[7.0, 2.0, 4.0]];
        let result = HungarianSolver::solve(cost.view());
        assert_eq!(result.assignments, vec![(0, 1)]);
        assert_eq!(result.unassigned_cols, vec![0, 2]);
    }

    #[test]
    fn sentinel_rows_stay_unassigned() {
        let cost = array![
            [1.0, SENTINEL_COST],
            [SENTINEL_COST, SENTINEL_COST],
        ];
        let result = HungarianSolver::solve(cost.view());
        assert_eq!(result.assignments, vec![(0, 0)]);
        assert_eq!(result.unassigned_rows, vec![1]);
        assert_eq!(result.unassigned_cols, vec![1]);
    }

    #[test]
    fn empty_matrix() {
        let cost = Array2::<f32>::zeros((0, 3));
        let result = HungarianSolver::solve(cost.view());
        assert!(result.assignments.is_empty());
        assert_eq!(result.unassigned_cols, vec![0, 1, 2]);
    }

    #[test]
    fn matches_brute_force_up_to_five() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let rows = rng.gen_range(1..=5);
            let cols = rng.gen_range(1..=5);
            // Integer-valued costs keep the fixed-point scaling exact
            let cost = Array2::from_shape_fn((rows, cols), |_| rng.gen_range(0..50) as f32);

            let result = HungarianSolver::solve(cost.view());
            let expected = brute_force_min(&cost);
            assert_abs_diff_eq!(result.total_cost, expected, epsilon = 1e-3);
        }
    }
}
