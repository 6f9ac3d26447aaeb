//! Row bound tightener: for each constraint row, derives implied
//! upper/lower bounds on each participating variable from the current
//! bounds on the others, and proposes the results as tightenings.

use crate::equation::Tightening;
use crate::{E, I};

const INFINITY: E = E::INFINITY;

/// One constraint row in the form `sum_i coeff_i * x_i = rhs`, as either the
/// raw constraint-matrix row or a row pulled from the (explicit or
/// ETA-applied implicit) basis inverse.
#[derive(Debug, Clone)]
pub struct BoundTighteningRow {
    pub addends: Vec<(I, E)>,
    pub rhs: E,
}

/// Sweeps a set of rows against the current bounds, proposing tightenings
/// until a full pass makes no further progress (the saturation flag).
#[derive(Debug, Default)]
pub struct RowBoundTightener {
    rounds_run: usize,
}

impl RowBoundTightener {
    pub fn new() -> Self {
        Self { rounds_run: 0 }
    }

    pub fn rounds_run(&self) -> usize {
        self.rounds_run
    }

    /// Computes the implied bound on `target` from row `row`, given the
    /// current bounds of every other participating variable, per the
    /// standard interval-arithmetic row-tightening rule:
    /// `coeff_target * x_target = rhs - sum_{i != target} coeff_i * x_i`.
    /// Returns `(implied_lb, implied_ub)`, either of which may be infinite
    /// if the row does not constrain that side.
    fn implied_bound(
        row: &BoundTighteningRow,
        target: I,
        target_coeff: E,
        lower_bound: impl Fn(I) -> E,
        upper_bound: impl Fn(I) -> E,
    ) -> (E, E) {
        let mut residual_lb = row.rhs;
        let mut residual_ub = row.rhs;
        for &(i, coeff) in &row.addends {
            if i == target {
                continue;
            }
            if coeff >= 0.0 {
                residual_lb -= coeff * upper_bound(i);
                residual_ub -= coeff * lower_bound(i);
            } else {
                residual_lb -= coeff * lower_bound(i);
                residual_ub -= coeff * upper_bound(i);
            }
        }

        if target_coeff > 0.0 {
            (residual_lb / target_coeff, residual_ub / target_coeff)
        } else if target_coeff < 0.0 {
            (residual_ub / target_coeff, residual_lb / target_coeff)
        } else {
            (-INFINITY, INFINITY)
        }
    }

    /// Sweeps `rows` repeatedly (bounded by `max_rounds`) until a full pass
    /// proposes no new tightening, collecting every tightening proposed
    /// along the way.
    pub fn sweep(
        &mut self,
        rows: &[BoundTighteningRow],
        lower_bound: impl Fn(I) -> E,
        upper_bound: impl Fn(I) -> E,
        max_rounds: usize,
    ) -> Vec<Tightening> {
        let mut proposed = Vec::new();
        let mut current_lb: std::collections::HashMap<I, E> = std::collections::HashMap::new();
        let mut current_ub: std::collections::HashMap<I, E> = std::collections::HashMap::new();

        let lb = |i: I| *current_lb.get(&i).unwrap_or(&lower_bound(i));
        let ub = |i: I| *current_ub.get(&i).unwrap_or(&upper_bound(i));

        for _round in 0..max_rounds {
            self.rounds_run += 1;
            let mut progressed = false;

            for row in rows {
                for &(target, coeff) in &row.addends {
                    if coeff == 0.0 {
                        continue;
                    }
                    let (implied_lb, implied_ub) =
                        Self::implied_bound(row, target, coeff, &lb, &ub);

                    if implied_lb.is_finite() && implied_lb > lb(target) + 1e-9 {
                        current_lb.insert(target, implied_lb);
                        proposed.push(Tightening::lb(target, implied_lb));
                        progressed = true;
                    }
                    if implied_ub.is_finite() && implied_ub < ub(target) - 1e-9 {
                        current_ub.insert(target, implied_ub);
                        proposed.push(Tightening::ub(target, implied_ub));
                        progressed = true;
                    }
                }
            }

            if !progressed {
                break;
            }
        }

        proposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_row_tightens_unbounded_variable() {
        // x0 + x1 = 5, x1 in [0, 2] => x0 in [3, 5].
        let row = BoundTighteningRow {
            addends: vec![(0, 1.0), (1, 1.0)],
            rhs: 5.0,
        };
        let mut tightener = RowBoundTightener::new();
        let tightenings = tightener.sweep(
            &[row],
            |i| if i == 1 { 0.0 } else { -INFINITY },
            |i| if i == 1 { 2.0 } else { INFINITY },
            5,
        );
        let lb = tightenings
            .iter()
            .find(|t| t.variable == 0 && t.is_lower())
            .expect("expected a lower-bound tightening on x0");
        assert!((lb.value - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_saturates_without_further_progress() {
        let row = BoundTighteningRow {
            addends: vec![(0, 1.0), (1, -1.0)],
            rhs: 0.0,
        };
        let mut tightener = RowBoundTightener::new();
        let _ = tightener.sweep(&[row], |_| 0.0, |_| 10.0, 3);
        assert!(tightener.rounds_run() <= 3);
    }
}
