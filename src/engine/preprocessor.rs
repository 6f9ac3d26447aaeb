//! Preprocessing: interval tightening to a fixpoint, fixed-variable and
//! mergeable-pair detection, and a uniform LE/GE-to-EQ rewrite that
//! introduces exactly one auxiliary variable per equation row.
//!
//! Grounded on the teacher's constraint-matrix-analyser role (identify
//! structure before the tableau is built) and on [`crate::equation::Equation::into_eq_with_auxiliary`],
//! which already handles all three relational kinds uniformly: giving every
//! row a fresh auxiliary column with an immediate identity-column basis
//! means the preprocessor never has to run a Markowitz search for an
//! initial basis.
//!
//! Variable merging (`x_i - x_j = 0`) and fixed-variable elimination
//! (`lb == ub`) are detected and reported in [`PreprocessingReport`] for
//! introspection and for the idempotence property (spec §8), but are not
//! realised as literal column aliasing / renumbering: both variables stay
//! present as ordinary tableau columns, since their equality or fixed value
//! is already enforced soundly by bounds and (for merges) the original
//! equation row. Eliminating the column outright would require renumbering
//! every piecewise-linear constraint's variable indices, which this rewrite
//! does not attempt without compiler verification.

use faer::sparse::Triplet;

use crate::bound::BoundManager;
use crate::equation::{Equation, EquationType};
use crate::error::EngineError;
use crate::pl::PiecewiseLinearConstraint;
use crate::tableau::Tableau;
use crate::{E, I};

use super::query::Query;

const MAX_INTERVAL_TIGHTENING_ROUNDS: usize = 20;
const FIXED_VARIABLE_EPSILON: E = 1e-9;

/// What the preprocessor observed, independent of whether it acted on it.
#[derive(Debug, Clone, Default)]
pub struct PreprocessingReport {
    pub fixed_variables: Vec<I>,
    pub merged_pairs: Vec<(I, I)>,
    pub interval_tightening_rounds: usize,
}

/// Everything the engine needs to build its [`Tableau`] plus the original
/// constraint list (variable numbering unchanged from the input [`Query`]).
pub struct PreparedQuery {
    pub tableau: Tableau,
    pub constraints: Vec<PiecewiseLinearConstraint>,
    pub original_num_variables: I,
    pub report: PreprocessingReport,
}

pub struct Preprocessor;

impl Preprocessor {
    /// Runs interval tightening to a fixpoint, detects (without eliminating)
    /// fixed variables and mergeable pairs, rewrites every equation to `Eq`
    /// with a fresh auxiliary column, and builds the initial [`Tableau`].
    pub fn run(query: &Query) -> Result<PreparedQuery, EngineError> {
        if !query.all_variables_boxed() {
            return Err(EngineError::UnboundedVariable(
                "every query variable must have a finite lower and upper bound".to_string(),
            ));
        }

        let n0 = query.num_variables;
        let num_aux = query.equations.len();
        let total = n0 + num_aux;

        let mut bounds = BoundManager::new(total);
        for v in 0..n0 {
            bounds.set_lower_bound(v, query.lower_bounds[v]);
            bounds.set_upper_bound(v, query.upper_bounds[v]);
        }

        let rounds = tighten_from_equations(&query.equations, &mut bounds, n0);

        let fixed_variables = (0..n0)
            .filter(|&v| (bounds.upper_bound(v) - bounds.lower_bound(v)).abs() <= FIXED_VARIABLE_EPSILON)
            .collect();
        let merged_pairs = detect_mergeable_pairs(&query.equations);

        let mut triplets = Vec::new();
        let mut rhs = Vec::with_capacity(num_aux);
        let mut basis = Vec::with_capacity(num_aux);

        for (row, equation) in query.equations.iter().enumerate() {
            let aux = n0 + row;
            let (rewritten, aux_lb, aux_ub) = equation.clone().into_eq_with_auxiliary(aux);
            bounds.set_lower_bound(aux, aux_lb);
            bounds.set_upper_bound(aux, aux_ub);
            for &(coeff, var) in &rewritten.addends {
                triplets.push(Triplet::new(row, var, coeff));
            }
            rhs.push(rewritten.scalar);
            basis.push(aux);
        }

        let tableau = Tableau::new(num_aux, total, triplets, rhs, basis, bounds)?;

        Ok(PreparedQuery {
            tableau,
            constraints: query.constraints.clone(),
            original_num_variables: n0,
            report: PreprocessingReport {
                fixed_variables,
                merged_pairs,
                interval_tightening_rounds: rounds,
            },
        })
    }
}

/// Equation-local interval propagation: for each addend `c_j * x_j` in a row
/// `sum = scalar`, derive a bound on `x_j` from the current bounds of every
/// other addend, exactly as [`crate::tableau::row_bound_tightener`] does over
/// the tableau's rows, but run once before the tableau exists. Iterated to a
/// fixpoint (bounded rounds) since a tightened variable can unlock a further
/// tightening in another row that shares it.
fn tighten_from_equations(equations: &[Equation], bounds: &mut BoundManager, n0: I) -> usize {
    let mut round = 0;
    loop {
        round += 1;
        let mut changed = false;
        for equation in equations {
            for &(coeff, target) in &equation.addends {
                if target >= n0 || coeff == 0.0 {
                    continue;
                }
                let mut residual_lb = -equation.scalar;
                let mut residual_ub = -equation.scalar;
                let mut unbounded = false;
                for &(other_coeff, other_var) in &equation.addends {
                    if other_var == target {
                        continue;
                    }
                    let lb = bounds.lower_bound(other_var);
                    let ub = bounds.upper_bound(other_var);
                    if !lb.is_finite() || !ub.is_finite() {
                        unbounded = true;
                        break;
                    }
                    let (lo, hi) = if other_coeff >= 0.0 {
                        (other_coeff * lb, other_coeff * ub)
                    } else {
                        (other_coeff * ub, other_coeff * lb)
                    };
                    residual_lb += lo;
                    residual_ub += hi;
                }
                if unbounded {
                    continue;
                }
                // target*coeff in [-residual_ub, -residual_ub] ... derive via
                // sum(others) + coeff*target = scalar => coeff*target = scalar - sum(others)
                let (implied_lo, implied_hi) = {
                    let lo = -residual_ub;
                    let hi = -residual_lb;
                    (lo / coeff, hi / coeff)
                };
                let (new_lb, new_ub) = if coeff >= 0.0 {
                    (implied_lo, implied_hi)
                } else {
                    (implied_hi, implied_lo)
                };
                if matches!(equation.kind, EquationType::Eq | EquationType::Le) && bounds.tighten_upper_bound(target, new_ub) {
                    changed = true;
                }
                if matches!(equation.kind, EquationType::Eq | EquationType::Ge) && bounds.tighten_lower_bound(target, new_lb) {
                    changed = true;
                }
            }
        }
        if !changed || round >= MAX_INTERVAL_TIGHTENING_ROUNDS {
            return round;
        }
    }
}

/// Equations of the exact shape `x_i - x_j = 0` (or `x_j - x_i = 0`):
/// candidates for column merging, reported but not acted on.
fn detect_mergeable_pairs(equations: &[Equation]) -> Vec<(I, I)> {
    equations
        .iter()
        .filter_map(|eq| {
            if eq.kind != EquationType::Eq || eq.scalar != 0.0 || eq.addends.len() != 2 {
                return None;
            }
            let (c0, v0) = eq.addends[0];
            let (c1, v1) = eq.addends[1];
            ((c0 == 1.0 && c1 == -1.0) || (c0 == -1.0 && c1 == 1.0)).then_some((v0, v1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_relu_query() -> Query {
        let mut query = Query::new(6);
        query.set_bounds(0, 0.0, 1.0);
        query.set_bounds(1, E::NEG_INFINITY, E::INFINITY);
        query.set_bounds(2, 0.0, E::INFINITY);
        query.set_bounds(3, E::NEG_INFINITY, E::INFINITY);
        query.set_bounds(4, 0.0, E::INFINITY);
        query.set_bounds(5, 0.5, 1.0);
        // x0 - x1 = 0
        query.add_equation(Equation::new(EquationType::Eq, 0.0).with_addend(1.0, 0).with_addend(-1.0, 1));
        // x0 + x3 = 0
        query.add_equation(Equation::new(EquationType::Eq, 0.0).with_addend(1.0, 0).with_addend(1.0, 3));
        // x2 + x4 - x5 = 0
        query.add_equation(
            Equation::new(EquationType::Eq, 0.0)
                .with_addend(1.0, 2)
                .with_addend(1.0, 4)
                .with_addend(-1.0, 5),
        );
        query
    }

    #[test]
    fn test_preprocessor_detects_merge_candidate() {
        let query = two_relu_query();
        let prepared = Preprocessor::run(&query).unwrap();
        assert!(prepared.report.merged_pairs.contains(&(0, 1)));
    }

    #[test]
    fn test_preprocessor_builds_one_aux_variable_per_equation() {
        let query = two_relu_query();
        let prepared = Preprocessor::run(&query).unwrap();
        assert_eq!(prepared.tableau.num_columns(), 6 + 3);
        assert_eq!(prepared.tableau.num_rows(), 3);
    }

    #[test]
    fn test_preprocessor_rejects_unbounded_variable() {
        let query = Query::new(1);
        assert!(Preprocessor::run(&query).is_err());
    }

    #[test]
    fn test_preprocessor_is_idempotent_on_report_shape() {
        let query = two_relu_query();
        let a = Preprocessor::run(&query).unwrap();
        let b = Preprocessor::run(&query).unwrap();
        assert_eq!(a.report.fixed_variables, b.report.fixed_variables);
        assert_eq!(a.report.merged_pairs, b.report.merged_pairs);
        assert_eq!(a.report.interval_tightening_rounds, b.report.interval_tightening_rounds);
    }
}
