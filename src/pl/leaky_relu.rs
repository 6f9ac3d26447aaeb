//! LeakyReLU(b, f, alpha): slope 1 on positives, slope alpha in (0, 1) on
//! negatives.

use crate::equation::{Equation, EquationType, Tightening};
use crate::pl::{Fix, PiecewiseLinear, PiecewiseLinearCaseSplit, SATISFACTION_TOLERANCE};
use crate::{E, I};

#[derive(Debug, Clone)]
pub struct LeakyReluConstraint {
    pub b: I,
    pub f: I,
    pub alpha: E,
    lb_b: E,
    ub_b: E,
}

impl LeakyReluConstraint {
    pub fn new(b: I, f: I, alpha: E) -> Self {
        Self {
            b,
            f,
            alpha,
            lb_b: E::NEG_INFINITY,
            ub_b: E::INFINITY,
        }
    }

    fn apply(&self, b: E) -> E {
        if b >= 0.0 { b } else { self.alpha * b }
    }
}

impl PiecewiseLinear for LeakyReluConstraint {
    fn participating_variables(&self) -> Vec<I> {
        vec![self.b, self.f]
    }

    fn phase_fixed(&self) -> bool {
        self.lb_b >= 0.0 || self.ub_b <= 0.0
    }

    fn get_valid_case_split(&self) -> Option<PiecewiseLinearCaseSplit> {
        if self.lb_b >= 0.0 {
            Some(
                PiecewiseLinearCaseSplit::new()
                    .with_tightening(Tightening::lb(self.b, 0.0))
                    .with_equation(
                        Equation::new(EquationType::Eq, 0.0)
                            .with_addend(1.0, self.f)
                            .with_addend(-1.0, self.b),
                    ),
            )
        } else if self.ub_b <= 0.0 {
            Some(
                PiecewiseLinearCaseSplit::new()
                    .with_tightening(Tightening::ub(self.b, 0.0))
                    .with_equation(
                        Equation::new(EquationType::Eq, 0.0)
                            .with_addend(1.0, self.f)
                            .with_addend(-self.alpha, self.b),
                    ),
            )
        } else {
            None
        }
    }

    fn get_case_splits(&self) -> Vec<PiecewiseLinearCaseSplit> {
        if self.phase_fixed() {
            return self.get_valid_case_split().into_iter().collect();
        }
        vec![
            PiecewiseLinearCaseSplit::new()
                .with_tightening(Tightening::lb(self.b, 0.0))
                .with_equation(
                    Equation::new(EquationType::Eq, 0.0)
                        .with_addend(1.0, self.f)
                        .with_addend(-1.0, self.b),
                ),
            PiecewiseLinearCaseSplit::new()
                .with_tightening(Tightening::ub(self.b, 0.0))
                .with_equation(
                    Equation::new(EquationType::Eq, 0.0)
                        .with_addend(1.0, self.f)
                        .with_addend(-self.alpha, self.b),
                ),
        ]
    }

    fn satisfied(&self, assignment: &[E]) -> bool {
        (assignment[self.f] - self.apply(assignment[self.b])).abs() <= SATISFACTION_TOLERANCE
    }

    fn get_possible_fixes(&self, assignment: &[E]) -> Vec<Fix> {
        vec![Fix {
            variable: self.f,
            value: self.apply(assignment[self.b]),
        }]
    }

    fn get_entailed_tightenings(&self) -> Vec<Tightening> {
        let mut out = Vec::new();
        if self.lb_b >= 0.0 {
            out.push(Tightening::lb(self.f, self.lb_b));
        } else if self.alpha > 0.0 {
            out.push(Tightening::lb(self.f, self.alpha * self.lb_b));
        }
        out
    }

    fn notify_lower_bound(&mut self, variable: I, bound: E) {
        if variable == self.b {
            self.lb_b = self.lb_b.max(bound);
        }
    }

    fn notify_upper_bound(&mut self, variable: I, bound: E) {
        if variable == self.b {
            self.ub_b = self.ub_b.min(bound);
        }
    }

    fn notify_variable_value(&mut self, _variable: I, _value: E) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_satisfied_applies_slope_alpha_on_negatives() {
        let relu = LeakyReluConstraint::new(0, 1, 0.1);
        assert!(relu.satisfied(&[-10.0, -1.0]));
        assert!(!relu.satisfied(&[-10.0, -5.0]));
        assert!(relu.satisfied(&[4.0, 4.0]));
    }
}
