//! Constraint matrix analyser: Markowitz-style elimination on the
//! (possibly rectangular) constraint matrix itself, used once at
//! preprocessing time to find redundant rows and an initial lower-triangular
//! sub-basis, rather than per-pivot as [`crate::tableau::lu`] does on the
//! square basis.

use crate::{E, I};

/// Result of analysing the constraint matrix: which rows are linearly
/// dependent on the others (and so can be dropped without changing the
/// feasible region), and which columns form a lower-triangular independent
/// set suitable for seeding the initial LP basis.
#[derive(Debug, Clone, Default)]
pub struct MatrixAnalysis {
    pub redundant_rows: Vec<I>,
    pub independent_columns: Vec<I>,
}

const ZERO_TOLERANCE: E = 1e-13;

/// Dense row-major working copy of the constraint matrix, consumed by a
/// single Gaussian-elimination sweep that never needs ETA updates (it runs
/// once, at preprocessing time, not per pivot).
pub struct MatrixAnalyser {
    rows: I,
    cols: I,
    work: Vec<E>,
}

impl MatrixAnalyser {
    /// Builds an analyser from row-major dense data (`rows * cols` entries);
    /// callers typically materialise this from the sparse constraint matrix
    /// once at preprocessing time.
    pub fn from_dense(rows: I, cols: I, work: Vec<E>) -> Self {
        assert_eq!(work.len(), rows * cols);
        Self { rows, cols, work }
    }

    fn get(&self, r: I, c: I) -> E {
        self.work[r * self.cols + c]
    }

    fn set(&mut self, r: I, c: I, v: E) {
        self.work[r * self.cols + c] = v;
    }

    /// Runs the elimination sweep: at each step, picks the Markowitz-minimal
    /// pivot among the remaining active rows/columns (no magnitude threshold
    /// is applied here, since this pass only needs *a* valid triangular
    /// sub-basis, not a numerically robust one for repeated solves), zeroes
    /// out the column below it, and records row/column membership. Rows for
    /// which no pivot can be found (all-zero after prior elimination) are
    /// reported as redundant.
    pub fn analyse(mut self) -> MatrixAnalysis {
        let mut row_used = vec![false; self.rows];
        let mut col_used = vec![false; self.cols];
        let mut independent_columns = Vec::new();
        let steps = self.rows.min(self.cols);

        for _ in 0..steps {
            let mut best: Option<(I, I, I, E)> = None; // (row, col, cost, magnitude)

            for r in 0..self.rows {
                if row_used[r] {
                    continue;
                }
                let row_nnz = (0..self.cols)
                    .filter(|&c| !col_used[c] && self.get(r, c).abs() > ZERO_TOLERANCE)
                    .count();
                if row_nnz == 0 {
                    continue;
                }
                for c in 0..self.cols {
                    if col_used[c] {
                        continue;
                    }
                    let val = self.get(r, c);
                    if val.abs() <= ZERO_TOLERANCE {
                        continue;
                    }
                    let col_nnz = (0..self.rows)
                        .filter(|&rr| !row_used[rr] && self.get(rr, c).abs() > ZERO_TOLERANCE)
                        .count();
                    let cost = (row_nnz - 1) * (col_nnz - 1);
                    let better = match &best {
                        None => true,
                        Some((_, _, best_cost, best_mag)) => {
                            cost < *best_cost || (cost == *best_cost && val.abs() > *best_mag)
                        }
                    };
                    if better {
                        best = Some((r, c, cost, val.abs()));
                    }
                }
            }

            let Some((pivot_row, pivot_col, _, _)) = best else {
                break;
            };

            let pivot_val = self.get(pivot_row, pivot_col);
            for r in 0..self.rows {
                if r == pivot_row || row_used[r] {
                    continue;
                }
                let factor = self.get(r, pivot_col);
                if factor.abs() <= ZERO_TOLERANCE {
                    continue;
                }
                let m = factor / pivot_val;
                for c in 0..self.cols {
                    if col_used[c] {
                        continue;
                    }
                    let updated = self.get(r, c) - m * self.get(pivot_row, c);
                    self.set(r, c, updated);
                }
            }

            row_used[pivot_row] = true;
            col_used[pivot_col] = true;
            independent_columns.push(pivot_col);
        }

        let redundant_rows: Vec<I> = (0..self.rows).filter(|&r| !row_used[r]).collect();

        MatrixAnalysis {
            redundant_rows,
            independent_columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_rank_square_matrix_has_no_redundant_rows() {
        // Identity 3x3.
        let mut data = vec![0.0; 9];
        for i in 0..3 {
            data[i * 3 + i] = 1.0;
        }
        let analyser = MatrixAnalyser::from_dense(3, 3, data);
        let analysis = analyser.analyse();
        assert!(analysis.redundant_rows.is_empty());
        assert_eq!(analysis.independent_columns.len(), 3);
    }

    #[test]
    fn test_duplicate_row_is_flagged_redundant() {
        // Row 1 = 0.5 * Row 0; the larger-magnitude row wins the Markowitz
        // tie-break and is kept, leaving the other flagged redundant.
        let data = vec![2.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let analyser = MatrixAnalyser::from_dense(3, 3, data);
        let analysis = analyser.analyse();
        assert_eq!(analysis.redundant_rows, vec![1]);
    }
}
