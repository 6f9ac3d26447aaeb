//! Tableau: revised-simplex state over a sparse LU-factorised basis.
//!
//! Ties together the constraint matrix, basis bookkeeping, the LU
//! factorisation ([`lu`]), the projected steepest-edge pricing rule
//! ([`pricing`]), the cost-function manager ([`cost`]), the row bound
//! tightener ([`row_bound_tightener`]), and the constraint matrix analyser
//! ([`matrix_analyser`], used once at preprocessing time rather than per
//! pivot).

pub mod cost;
pub mod eta;
pub mod lu;
pub mod matrix_analyser;
pub mod permutation;
pub mod pricing;
pub mod row_bound_tightener;

use faer::sparse::{SparseColMat, Triplet};

use crate::bound::BoundManager;
use crate::error::EngineError;
use crate::{E, I};

use cost::CostFunctionManager;
use eta::EtaMatrix;
use lu::LuFactors;
use pricing::SteepestEdgePricer;
use row_bound_tightener::{BoundTighteningRow, RowBoundTightener};

/// Whether the current basic assignment is known exact (computed by a fresh
/// back-solve) or only incrementally maintained since the last such solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentStatus {
    JustComputed,
    Updated,
}

/// Result of one [`Tableau::perform_simplex_step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimplexStepOutcome {
    /// A pivot was performed; the caller should call again.
    Pivoted,
    /// No improving pivot exists: a real local optimum (when optimising) or
    /// feasibility has been reached (when minimising infeasibility).
    OptimalOrFeasible,
    /// No improving pivot exists and the point is not feasible: an
    /// infeasibility proof.
    Infeasible,
}

const PIVOT_ACCEPT_THRESHOLD: E = 1e-9;
const PIVOT_STABILITY_THRESHOLD: E = 1e-6;
const MAX_PRICING_TRIES: usize = 64;
const LU_PIVOT_SCALE_THRESHOLD: E = 0.1;
const DEFAULT_ETA_REFACTOR_THRESHOLD: usize = 100;

/// Owns the constraint matrix, the current basic/non-basic partition, the
/// LU-factorised basis, per-variable bounds, and the cost/pricing
/// machinery that together drive one revised-simplex search.
pub struct Tableau {
    m: I,
    n: I,
    matrix: SparseColMat<I, E>,
    rhs: Vec<E>,
    /// `basis[row]` is the variable index basic in that row.
    basis: Vec<I>,
    /// `basic_row[variable]` is `Some(row)` iff `variable` is currently basic.
    basic_row: Vec<Option<I>>,
    non_basic: Vec<I>,
    /// Parallel to `non_basic`: whether that variable currently sits at its
    /// upper bound (`false` means lower bound).
    non_basic_at_upper: Vec<bool>,
    assignment: Vec<E>,
    assignment_status: AssignmentStatus,
    bounds: BoundManager,
    lu: LuFactors,
    cost: CostFunctionManager,
    pricer: SteepestEdgePricer,
    row_bound_tightener: RowBoundTightener,
    optimizing: bool,
}

impl Tableau {
    /// Builds a tableau from a dense `m x n` constraint matrix (given as
    /// triplets), a right-hand side, an initial basis (one variable index
    /// per row), and a bound manager already sized for `n` variables.
    pub fn new(
        m: I,
        n: I,
        triplets: Vec<Triplet<I, I, E>>,
        rhs: Vec<E>,
        basis: Vec<I>,
        bounds: BoundManager,
    ) -> Result<Self, EngineError> {
        let matrix = SparseColMat::try_new_from_triplets(m, n, &triplets)
            .map_err(|e| EngineError::MalformedBasis(format!("{e:?}")))?;

        let mut basic_row = vec![None; n];
        for (row, &var) in basis.iter().enumerate() {
            basic_row[var] = Some(row);
        }
        let non_basic: Vec<I> = (0..n).filter(|v| basic_row[*v].is_none()).collect();
        let non_basic_at_upper = vec![false; non_basic.len()];

        let basis_matrix = Self::extract_basis_matrix(&matrix, &basis, m);
        let lu = LuFactors::factorize(
            basis_matrix.as_ref(),
            LU_PIVOT_SCALE_THRESHOLD,
            DEFAULT_ETA_REFACTOR_THRESHOLD,
        )?;

        let num_non_basic = non_basic.len();
        let mut tableau = Self {
            m,
            n,
            matrix,
            rhs,
            basis,
            basic_row,
            non_basic,
            non_basic_at_upper,
            assignment: vec![0.0; n],
            assignment_status: AssignmentStatus::Updated,
            bounds,
            lu,
            cost: CostFunctionManager::new(num_non_basic),
            pricer: SteepestEdgePricer::new(num_non_basic),
            row_bound_tightener: RowBoundTightener::new(),
            optimizing: false,
        };
        tableau.compute_assignment();
        Ok(tableau)
    }

    fn extract_basis_matrix(matrix: &SparseColMat<I, E>, basis: &[I], m: I) -> SparseColMat<I, E> {
        let col_ptr = matrix.symbolic().col_ptr();
        let row_idx = matrix.symbolic().row_idx();
        let values = matrix.val();
        let mut triplets = Vec::new();
        for (basis_col, &var) in basis.iter().enumerate() {
            for idx in col_ptr[var]..col_ptr[var + 1] {
                triplets.push(Triplet::new(row_idx[idx], basis_col, values[idx]));
            }
        }
        SparseColMat::try_new_from_triplets(m, m, &triplets).expect("basis triplets are well-formed")
    }

    fn dense_column(&self, variable: I) -> Vec<E> {
        let col_ptr = self.matrix.symbolic().col_ptr();
        let row_idx = self.matrix.symbolic().row_idx();
        let values = self.matrix.val();
        let mut col = vec![0.0; self.m];
        for idx in col_ptr[variable]..col_ptr[variable + 1] {
            col[row_idx[idx]] = values[idx];
        }
        col
    }

    pub fn num_rows(&self) -> I {
        self.m
    }

    pub fn num_columns(&self) -> I {
        self.n
    }

    /// `basis()[row]` is the variable currently basic in that row; used by
    /// the engine to name the basic variable behind an infeasibility when
    /// recording a proof leaf.
    pub fn basis(&self) -> &[I] {
        &self.basis
    }

    pub fn bounds(&self) -> &BoundManager {
        &self.bounds
    }

    pub fn bounds_mut(&mut self) -> &mut BoundManager {
        &mut self.bounds
    }

    pub fn value_of(&self, variable: I) -> E {
        self.assignment[variable]
    }

    pub fn assignment_status(&self) -> AssignmentStatus {
        self.assignment_status
    }

    /// Switches between feasibility-seeking (minimise the core infeasibility
    /// cost) and user-objective minimisation; invalidates the cached cost
    /// row, since the two modes use different cost functions.
    pub fn toggle_optimization(&mut self, optimizing: bool) {
        self.optimizing = optimizing;
        self.cost.invalidate();
    }

    /// Back-solves for the exact basic assignment: `x_B = B^{-1} (b - N x_N)`.
    pub fn compute_assignment(&mut self) {
        let mut adjusted_rhs = self.rhs.clone();
        for (pos, &var) in self.non_basic.iter().enumerate() {
            let value = if self.non_basic_at_upper[pos] {
                self.bounds.upper_bound(var)
            } else {
                self.bounds.lower_bound(var)
            };
            self.assignment[var] = value;
            if value == 0.0 {
                continue;
            }
            let col = self.dense_column(var);
            for (row, coeff) in col.into_iter().enumerate() {
                adjusted_rhs[row] -= coeff * value;
            }
        }

        let x_b = self.lu.forward_transform(&adjusted_rhs);
        for (row, &var) in self.basis.iter().enumerate() {
            self.assignment[var] = x_b[row];
        }
        self.assignment_status = AssignmentStatus::JustComputed;
    }

    /// Computes the core infeasibility cost: for each basic variable out of
    /// its bounds, the signed distance to the nearest bound, projected back
    /// onto the non-basic reduced-cost row via a backward transformation.
    pub fn compute_core_cost_function(&mut self) {
        let mut cost_by_row = vec![0.0; self.m];
        for (row, &var) in self.basis.iter().enumerate() {
            let value = self.assignment[var];
            let lb = self.bounds.lower_bound(var);
            let ub = self.bounds.upper_bound(var);
            if value < lb - PIVOT_ACCEPT_THRESHOLD {
                cost_by_row[row] = value - lb;
            } else if value > ub + PIVOT_ACCEPT_THRESHOLD {
                cost_by_row[row] = value - ub;
            }
        }

        let y = self.lu.backward_transform(&cost_by_row);
        let reduced_costs: Vec<E> = self
            .non_basic
            .iter()
            .map(|&var| {
                let col = self.dense_column(var);
                col.iter().zip(y.iter()).map(|(a, b)| a * b).sum::<E>()
            })
            .collect();
        self.cost.compute_core_cost(reduced_costs);
    }

    /// Sets the cost row directly from a user-supplied linear expression
    /// over the structural variables (used for direct objective
    /// minimisation and by the SoI local search's phase objective).
    pub fn compute_given_cost_function(&mut self, addends: Vec<(I, E)>) {
        let mut by_non_basic_pos = Vec::new();
        for (var, coeff) in addends {
            if let Some(pos) = self.non_basic.iter().position(|&v| v == var) {
                by_non_basic_pos.push((pos, coeff));
            }
        }
        self.cost.compute_given_cost(by_non_basic_pos, self.non_basic.len());
    }

    /// Collects non-basic variables whose reduced cost indicates an
    /// improving direction from their current bound.
    pub fn get_entry_candidates(&self) -> Vec<(I, E)> {
        self.non_basic
            .iter()
            .enumerate()
            .filter_map(|(pos, _)| {
                let reduced_cost = self.cost.row()[pos];
                let at_upper = self.non_basic_at_upper[pos];
                let improving = if at_upper {
                    reduced_cost > PIVOT_ACCEPT_THRESHOLD
                } else {
                    reduced_cost < -PIVOT_ACCEPT_THRESHOLD
                };
                improving.then_some((pos, reduced_cost))
            })
            .collect()
    }

    /// Computes the change column `alpha = B^{-1} A_q` for the non-basic
    /// position `entering_pos`.
    pub fn change_column(&self, entering_pos: I) -> Vec<E> {
        let var = self.non_basic[entering_pos];
        let col = self.dense_column(var);
        self.lu.forward_transform(&col)
    }

    /// Ratio test: given the entering variable's direction (`+1` increasing
    /// from its lower bound, `-1` decreasing from its upper bound) and its
    /// change column, finds the tightest limiting basic variable. Returns
    /// `None` for a fake pivot (the entering variable hits its own opposite
    /// bound before any basic variable hits one of its bounds).
    pub fn pick_leaving_variable(
        &self,
        entering_pos: I,
        direction: E,
        alpha: &[E],
    ) -> (Option<I>, E) {
        let entering_var = self.non_basic[entering_pos];
        let own_span = {
            let lb = self.bounds.lower_bound(entering_var);
            let ub = self.bounds.upper_bound(entering_var);
            (ub - lb).max(0.0)
        };

        let mut best_row: Option<I> = None;
        let mut best_t = own_span;

        for (row, &coeff) in alpha.iter().enumerate() {
            if coeff.abs() <= PIVOT_ACCEPT_THRESHOLD {
                continue;
            }
            let basic_var = self.basis[row];
            let value = self.assignment[basic_var];
            let lb = self.bounds.lower_bound(basic_var);
            let ub = self.bounds.upper_bound(basic_var);

            let decreasing = (direction > 0.0) == (coeff > 0.0);
            let t = if decreasing {
                ((value - lb) / coeff.abs()).max(0.0)
            } else {
                ((ub - value) / coeff.abs()).max(0.0)
            };

            if t < best_t - 1e-12 {
                best_t = t;
                best_row = Some(row);
            }
        }

        (best_row, best_t)
    }

    /// Performs the pivot chosen by [`Self::pick_leaving_variable`]: updates
    /// the assignment, the basis/non-basic partition, and composes the
    /// corresponding ETA matrix onto the LU factorisation.
    pub fn perform_pivot(
        &mut self,
        entering_pos: I,
        leaving_row: Option<I>,
        direction: E,
        alpha: &[E],
        step: E,
    ) {
        let entering_var = self.non_basic[entering_pos];

        for (row, &coeff) in alpha.iter().enumerate() {
            let var = self.basis[row];
            self.assignment[var] -= direction * step * coeff;
        }
        self.assignment[entering_var] += direction * step;

        match leaving_row {
            None => {
                // Fake pivot: entering variable moves to its opposite bound,
                // no basis change.
                self.non_basic_at_upper[entering_pos] = !self.non_basic_at_upper[entering_pos];
            }
            Some(row) => {
                let pivot = alpha[row];
                let leaving_var = self.basis[row];

                let leaving_at_upper = {
                    let ub = self.bounds.upper_bound(leaving_var);
                    (self.assignment[leaving_var] - ub).abs() < 1e-7
                };

                self.basic_row[entering_var] = Some(row);
                self.basic_row[leaving_var] = None;
                self.basis[row] = entering_var;
                self.non_basic[entering_pos] = leaving_var;
                self.non_basic_at_upper[entering_pos] = leaving_at_upper;

                let mut eta_column = vec![0.0; self.m];
                for (i, &a_i) in alpha.iter().enumerate() {
                    eta_column[i] = if i == row { 1.0 / pivot } else { -a_i / pivot };
                }
                self.lu.push_eta(EtaMatrix::new(row, eta_column));
                self.pricer.update_after_pivot(entering_pos, alpha, pivot);
            }
        }

        self.cost.mark_updated();
        self.assignment_status = AssignmentStatus::Updated;

        if self.lu.needs_refactorization() {
            if let Ok(fresh) = LuFactors::factorize(
                Self::extract_basis_matrix(&self.matrix, &self.basis, self.m).as_ref(),
                self.lu.pivot_scale_threshold(),
                self.lu.eta_refactor_threshold(),
            ) {
                self.lu = fresh;
                self.compute_assignment();
            }
        }
    }

    /// Attempts one pivot towards reducing infeasibility (or optimising the
    /// cost, if [`Self::toggle_optimization`] enabled it).
    pub fn perform_simplex_step(&mut self) -> Result<SimplexStepOutcome, EngineError> {
        if self.cost.is_invalid() {
            if self.optimizing {
                // The caller is expected to have already primed the cost
                // via `compute_given_cost_function` for the user objective;
                // an invalid cost while optimising simply means nothing has
                // been set yet, which we treat as "no improving direction".
            } else {
                self.compute_core_cost_function();
            }
        }

        let candidates = self.get_entry_candidates();
        if candidates.is_empty() {
            return Ok(if self.is_feasible() {
                SimplexStepOutcome::OptimalOrFeasible
            } else {
                SimplexStepOutcome::Infeasible
            });
        }

        let ranked = self.pricer.rank(&candidates);
        let mut best_fallback: Option<(I, E, E, Vec<E>, Option<I>, E)> = None;

        for &entering_pos in ranked.iter().take(MAX_PRICING_TRIES) {
            let at_upper = self.non_basic_at_upper[entering_pos];
            let direction = if at_upper { -1.0 } else { 1.0 };
            let alpha = self.change_column(entering_pos);
            let (leaving_row, step) = self.pick_leaving_variable(entering_pos, direction, &alpha);

            let pivot_magnitude = leaving_row.map(|r| alpha[r].abs()).unwrap_or(E::INFINITY);

            if leaving_row.is_none() || pivot_magnitude >= PIVOT_STABILITY_THRESHOLD {
                if pivot_magnitude >= PIVOT_ACCEPT_THRESHOLD {
                    self.perform_pivot(entering_pos, leaving_row, direction, &alpha, step);
                    return Ok(SimplexStepOutcome::Pivoted);
                }
            }

            let better = match &best_fallback {
                None => true,
                Some((_, _, _, _, _, best_mag)) => pivot_magnitude > *best_mag,
            };
            if better {
                best_fallback = Some((entering_pos, direction, step, alpha, leaving_row, pivot_magnitude));
            }
        }

        if self.assignment_status != AssignmentStatus::JustComputed {
            self.compute_assignment();
            return Ok(SimplexStepOutcome::Pivoted);
        }
        if !self.cost.is_just_computed() {
            self.cost.invalidate();
            return Ok(SimplexStepOutcome::Pivoted);
        }

        if let Some((entering_pos, direction, step, alpha, leaving_row, _)) = best_fallback {
            self.perform_pivot(entering_pos, leaving_row, direction, &alpha, step);
            return Ok(SimplexStepOutcome::Pivoted);
        }

        Ok(if self.is_feasible() {
            SimplexStepOutcome::OptimalOrFeasible
        } else {
            SimplexStepOutcome::Infeasible
        })
    }

    /// Forces a fresh LU factorisation from the current basis and a fresh
    /// back-solve, discarding any accumulated ETA updates. Used by the engine
    /// to recover from a `MalformedBasis` error rather than abandoning the
    /// subproblem.
    pub fn restore_precision(&mut self) -> Result<(), EngineError> {
        let fresh = LuFactors::factorize(
            Self::extract_basis_matrix(&self.matrix, &self.basis, self.m).as_ref(),
            self.lu.pivot_scale_threshold(),
            self.lu.eta_refactor_threshold(),
        )?;
        self.lu = fresh;
        self.compute_assignment();
        self.cost.invalidate();
        Ok(())
    }

    pub fn is_feasible(&self) -> bool {
        self.basis.iter().all(|&var| {
            let value = self.assignment[var];
            value >= self.bounds.lower_bound(var) - PIVOT_ACCEPT_THRESHOLD
                && value <= self.bounds.upper_bound(var) + PIVOT_ACCEPT_THRESHOLD
        })
    }

    /// Largest absolute `|A_row . assignment - rhs_row|` over every row,
    /// against a caller-supplied assignment rather than `self.assignment`.
    /// Used to guard assignments produced by a process that does not go
    /// through the simplex basis (e.g. SoI local search's direct
    /// variable-value repairs) before they are reported as a witness.
    pub fn max_row_residual(&self, assignment: &[E]) -> E {
        let col_ptr = self.matrix.symbolic().col_ptr();
        let row_idx = self.matrix.symbolic().row_idx();
        let values = self.matrix.val();
        let mut residual = self.rhs.clone();
        for var in 0..self.n {
            let value = assignment[var];
            if value == 0.0 {
                continue;
            }
            for idx in col_ptr[var]..col_ptr[var + 1] {
                residual[row_idx[idx]] -= values[idx] * value;
            }
        }
        residual.iter().fold(0.0, |acc, &r| acc.max(r.abs()))
    }

    /// Runs the row bound tightener over the current basis inverse applied
    /// to each row of the (reduced) constraint matrix.
    pub fn tighten_rows(&mut self, max_rounds: usize) -> Vec<crate::equation::Tightening> {
        let rows: Vec<BoundTighteningRow> = (0..self.m)
            .map(|row| {
                let mut addends = Vec::new();
                for &var in &self.non_basic {
                    let col = self.dense_column(var);
                    if col[row].abs() > 1e-13 {
                        addends.push((var, col[row]));
                    }
                }
                addends.push((self.basis[row], 1.0));
                BoundTighteningRow {
                    addends,
                    rhs: self.rhs[row],
                }
            })
            .collect();

        self.row_bound_tightener.sweep(
            &rows,
            |v| self.bounds.lower_bound(v),
            |v| self.bounds.upper_bound(v),
            max_rounds,
        )
    }
}
