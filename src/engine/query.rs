//! Input/output data types at the solver's external boundary: a [`Query`]
//! describes one verification problem, a [`Solution`] reports a witness once
//! the engine reaches `Sat`.

use std::collections::HashMap;

use crate::equation::Equation;
use crate::nlr::LayerGraph;
use crate::pl::PiecewiseLinearConstraint;
use crate::{E, I};

/// One verification problem: `num_variables` numeric variables, each boxed
/// by `[lower_bounds[i], upper_bounds[i]]`, an ordered list of linear
/// equations, an unordered set of piecewise-linear constraint descriptors,
/// and an optional layer graph for the network-level reasoner.
#[derive(Debug, Clone)]
pub struct Query {
    pub num_variables: I,
    pub lower_bounds: Vec<E>,
    pub upper_bounds: Vec<E>,
    pub equations: Vec<Equation>,
    pub constraints: Vec<PiecewiseLinearConstraint>,
    pub layer_graph: Option<LayerGraph>,
    pub input_variables: Option<Vec<I>>,
    pub output_variables: Option<Vec<I>>,
    /// A known-SAT witness used only to cross-check that tightenings never
    /// exclude it; not consumed by the solve itself.
    pub debugging_solution: Option<HashMap<I, E>>,
}

impl Query {
    pub fn new(num_variables: I) -> Self {
        Self {
            num_variables,
            lower_bounds: vec![E::NEG_INFINITY; num_variables],
            upper_bounds: vec![E::INFINITY; num_variables],
            equations: Vec::new(),
            constraints: Vec::new(),
            layer_graph: None,
            input_variables: None,
            output_variables: None,
            debugging_solution: None,
        }
    }

    pub fn set_bounds(&mut self, variable: I, lb: E, ub: E) {
        self.lower_bounds[variable] = lb;
        self.upper_bounds[variable] = ub;
    }

    pub fn add_equation(&mut self, equation: Equation) {
        self.equations.push(equation);
    }

    pub fn add_constraint(&mut self, constraint: PiecewiseLinearConstraint) {
        self.constraints.push(constraint);
    }

    /// Every declared network-input variable has a finite lower and upper
    /// bound; the engine rejects a query that fails this
    /// ([`crate::EngineError::UnboundedVariable`]). Intermediate and output
    /// variables may start unbounded and be tightened during solving, so
    /// only `input_variables` (when present) is checked.
    pub fn all_variables_boxed(&self) -> bool {
        let Some(inputs) = &self.input_variables else {
            return true;
        };
        inputs
            .iter()
            .all(|&v| self.lower_bounds[v].is_finite() && self.upper_bounds[v].is_finite())
    }

    /// Checks `self.debugging_solution`, if present, against every equation
    /// and constraint; used by tests and by callers validating their own
    /// encoding rather than by the solve loop itself.
    pub fn debugging_solution_is_consistent(&self) -> bool {
        let Some(witness) = &self.debugging_solution else {
            return true;
        };
        let mut assignment = vec![0.0; self.num_variables];
        for (&var, &value) in witness {
            assignment[var] = value;
        }
        self.equations.iter().all(|eq| eq.residual(&assignment).abs() <= 1e-6)
            && self.constraints.iter().all(|c| {
                use crate::pl::PiecewiseLinear;
                c.satisfied(&assignment)
            })
    }
}

/// A satisfying assignment, indexed by the query's original (pre-preprocessing)
/// variable numbering.
#[derive(Debug, Clone)]
pub struct Solution {
    pub values: Vec<E>,
}

impl Solution {
    pub fn value_of(&self, variable: I) -> E {
        self.values[variable]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation::EquationType;

    #[test]
    fn test_fresh_query_has_unbounded_variables() {
        let query = Query::new(2);
        assert!(!query.all_variables_boxed());
    }

    #[test]
    fn test_bounded_query_passes_boxed_check() {
        let mut query = Query::new(2);
        query.set_bounds(0, 0.0, 1.0);
        query.set_bounds(1, -1.0, 1.0);
        assert!(query.all_variables_boxed());
    }

    #[test]
    fn test_debugging_solution_checked_against_equations() {
        let mut query = Query::new(2);
        query.set_bounds(0, 0.0, 1.0);
        query.set_bounds(1, 0.0, 1.0);
        query.add_equation(
            Equation::new(EquationType::Eq, 0.0)
                .with_addend(1.0, 0)
                .with_addend(-1.0, 1),
        );
        query.debugging_solution = Some(HashMap::from([(0, 0.5), (1, 0.5)]));
        assert!(query.debugging_solution_is_consistent());
        query.debugging_solution = Some(HashMap::from([(0, 0.5), (1, 0.9)]));
        assert!(!query.debugging_solution_is_consistent());
    }
}
