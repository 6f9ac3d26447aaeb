//! Max(f, inputs): f = max(inputs).

use crate::equation::{Equation, EquationType, Tightening};
use crate::pl::{Fix, PiecewiseLinear, PiecewiseLinearCaseSplit, SATISFACTION_TOLERANCE};
use crate::{E, I};

#[derive(Debug, Clone)]
pub struct MaxConstraint {
    pub f: I,
    pub inputs: Vec<I>,
    lb: Vec<E>,
    ub: Vec<E>,
}

impl MaxConstraint {
    pub fn new(f: I, inputs: Vec<I>) -> Self {
        let n = inputs.len();
        Self {
            f,
            inputs,
            lb: vec![E::NEG_INFINITY; n],
            ub: vec![E::INFINITY; n],
        }
    }

    /// The index of the unique input whose lower bound dominates every
    /// other input's upper bound, if one exists.
    fn fixed_argmax(&self) -> Option<I> {
        (0..self.inputs.len()).find(|&i| {
            (0..self.inputs.len()).all(|j| j == i || self.lb[i] >= self.ub[j])
        })
    }
}

impl PiecewiseLinear for MaxConstraint {
    fn participating_variables(&self) -> Vec<I> {
        let mut vars = vec![self.f];
        vars.extend(self.inputs.iter().copied());
        vars
    }

    fn phase_fixed(&self) -> bool {
        self.fixed_argmax().is_some()
    }

    fn get_valid_case_split(&self) -> Option<PiecewiseLinearCaseSplit> {
        let i_star = self.fixed_argmax()?;
        Some(self.case_split_for(i_star))
    }

    fn get_case_splits(&self) -> Vec<PiecewiseLinearCaseSplit> {
        (0..self.inputs.len()).map(|i| self.case_split_for(i)).collect()
    }

    fn satisfied(&self, assignment: &[E]) -> bool {
        let f = assignment[self.f];
        let max_input = self
            .inputs
            .iter()
            .map(|&i| assignment[i])
            .fold(E::NEG_INFINITY, E::max);
        (f - max_input).abs() <= SATISFACTION_TOLERANCE
    }

    fn get_possible_fixes(&self, assignment: &[E]) -> Vec<Fix> {
        let max_input = self
            .inputs
            .iter()
            .map(|&i| assignment[i])
            .fold(E::NEG_INFINITY, E::max);
        vec![Fix {
            variable: self.f,
            value: max_input,
        }]
    }

    fn get_entailed_tightenings(&self) -> Vec<Tightening> {
        let max_lb = self.lb.iter().cloned().fold(E::NEG_INFINITY, E::max);
        let max_ub = self.ub.iter().cloned().fold(E::NEG_INFINITY, E::max);
        vec![Tightening::lb(self.f, max_lb), Tightening::ub(self.f, max_ub)]
    }

    fn notify_lower_bound(&mut self, variable: I, bound: E) {
        if let Some(pos) = self.inputs.iter().position(|&v| v == variable) {
            self.lb[pos] = self.lb[pos].max(bound);
        }
    }

    fn notify_upper_bound(&mut self, variable: I, bound: E) {
        if let Some(pos) = self.inputs.iter().position(|&v| v == variable) {
            self.ub[pos] = self.ub[pos].min(bound);
        }
    }

    fn notify_variable_value(&mut self, _variable: I, _value: E) {}
}

impl MaxConstraint {
    /// Branch fixing `i_star` as the argmax: `f = inputs[i_star]`, plus the
    /// disambiguating `inputs[i_star] >= other` inequalities (recorded as
    /// equations for `satisfied`/proof purposes only, since the tableau has
    /// no row for them). To give the branch real, monotone bound-level
    /// progress (the tableau never sees the equation itself), the winner's
    /// current interval is also pushed onto `f` and capped onto every other
    /// input's upper bound directly, mirroring how ReLU's `b >= 0` tightening
    /// alone is what eventually collapses `f` onto `b` via entailed
    /// tightenings.
    fn case_split_for(&self, i_star: I) -> PiecewiseLinearCaseSplit {
        let input = self.inputs[i_star];
        let mut split = PiecewiseLinearCaseSplit::new()
            .with_equation(
                Equation::new(EquationType::Eq, 0.0)
                    .with_addend(1.0, self.f)
                    .with_addend(-1.0, input),
            )
            .with_tightening(Tightening::lb(self.f, self.lb[i_star]))
            .with_tightening(Tightening::ub(self.f, self.ub[i_star]));
        for (j, &other) in self.inputs.iter().enumerate() {
            if j != i_star {
                split.equations.push(
                    Equation::new(EquationType::Ge, 0.0)
                        .with_addend(1.0, input)
                        .with_addend(-1.0, other),
                );
                if self.ub[i_star].is_finite() {
                    split.tightenings.push(Tightening::ub(other, self.ub[i_star]));
                }
            }
        }
        split
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_when_one_input_dominates() {
        let mut max = MaxConstraint::new(0, vec![1, 2, 3]);
        max.notify_lower_bound(1, 10.0);
        max.notify_upper_bound(2, 5.0);
        max.notify_upper_bound(3, 5.0);
        assert!(max.phase_fixed());
    }

    #[test]
    fn test_satisfied_matches_max_of_inputs() {
        let max = MaxConstraint::new(0, vec![1, 2, 3]);
        assert!(max.satisfied(&[5.0, 1.0, 5.0, 2.0]));
        assert!(!max.satisfied(&[4.0, 1.0, 5.0, 2.0]));
    }

    #[test]
    fn test_case_splits_count_matches_input_count() {
        let max = MaxConstraint::new(0, vec![1, 2, 3]);
        assert_eq!(max.get_case_splits().len(), 3);
    }
}
