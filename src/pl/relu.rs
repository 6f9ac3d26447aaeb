//! ReLU(b, f): f = max(b, 0).

use crate::equation::{Equation, EquationType, Tightening};
use crate::pl::{Fix, PiecewiseLinear, PiecewiseLinearCaseSplit, SATISFACTION_TOLERANCE};
use crate::{E, I};

#[derive(Debug, Clone)]
pub struct ReluConstraint {
    pub b: I,
    pub f: I,
    lb_b: E,
    ub_b: E,
    lb_f: E,
    ub_f: E,
}

impl ReluConstraint {
    pub fn new(b: I, f: I) -> Self {
        Self {
            b,
            f,
            lb_b: E::NEG_INFINITY,
            ub_b: E::INFINITY,
            lb_f: 0.0,
            ub_f: E::INFINITY,
        }
    }

    fn active_fixed(&self) -> bool {
        self.lb_b >= 0.0
    }

    fn inactive_fixed(&self) -> bool {
        self.ub_b <= 0.0
    }
}

impl PiecewiseLinear for ReluConstraint {
    fn participating_variables(&self) -> Vec<I> {
        vec![self.b, self.f]
    }

    fn phase_fixed(&self) -> bool {
        self.active_fixed() || self.inactive_fixed()
    }

    fn get_valid_case_split(&self) -> Option<PiecewiseLinearCaseSplit> {
        if self.active_fixed() {
            Some(
                PiecewiseLinearCaseSplit::new()
                    .with_tightening(Tightening::lb(self.b, 0.0))
                    .with_equation(
                        Equation::new(EquationType::Eq, 0.0)
                            .with_addend(1.0, self.f)
                            .with_addend(-1.0, self.b),
                    ),
            )
        } else if self.inactive_fixed() {
            Some(
                PiecewiseLinearCaseSplit::new()
                    .with_tightening(Tightening::ub(self.b, 0.0))
                    .with_tightening(Tightening::ub(self.f, 0.0)),
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
                .with_tightening(Tightening::ub(self.f, 0.0)),
        ]
    }

    fn satisfied(&self, assignment: &[E]) -> bool {
        let b = assignment[self.b];
        let f = assignment[self.f];
        (f - b.max(0.0)).abs() <= SATISFACTION_TOLERANCE
    }

    fn get_possible_fixes(&self, assignment: &[E]) -> Vec<Fix> {
        let b = assignment[self.b];
        let f = assignment[self.f];
        let mut fixes = vec![Fix {
            variable: self.f,
            value: b.max(0.0),
        }];
        if f >= 0.0 {
            fixes.push(Fix {
                variable: self.b,
                value: f,
            });
        }
        fixes
    }

    fn get_entailed_tightenings(&self) -> Vec<Tightening> {
        let mut out = vec![Tightening::lb(self.f, 0.0), Tightening::lb(self.f, self.lb_b.max(0.0))];
        if self.active_fixed() {
            out.push(Tightening::ub(self.f, self.ub_b));
        }
        if self.inactive_fixed() {
            out.push(Tightening::ub(self.f, 0.0));
        }
        out
    }

    fn notify_lower_bound(&mut self, variable: I, bound: E) {
        if variable == self.b {
            self.lb_b = self.lb_b.max(bound);
        } else if variable == self.f {
            self.lb_f = self.lb_f.max(bound);
        }
    }

    fn notify_upper_bound(&mut self, variable: I, bound: E) {
        if variable == self.b {
            self.ub_b = self.ub_b.min(bound);
        } else if variable == self.f {
            self.ub_f = self.ub_f.min(bound);
        }
    }

    fn notify_variable_value(&mut self, _variable: I, _value: E) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_phase_fixed_when_lower_bound_nonnegative() {
        let mut relu = ReluConstraint::new(0, 1);
        relu.notify_lower_bound(0, 0.5);
        assert!(relu.phase_fixed());
        assert!(relu.active_fixed());
    }

    #[test]
    fn test_satisfied_checks_max_relation() {
        let relu = ReluConstraint::new(0, 1);
        assert!(relu.satisfied(&[3.0, 3.0]));
        assert!(relu.satisfied(&[-2.0, 0.0]));
        assert!(!relu.satisfied(&[-2.0, 1.0]));
    }

    #[test]
    fn test_possible_fixes_moves_f_to_max_b_zero() {
        let relu = ReluConstraint::new(0, 1);
        let fixes = relu.get_possible_fixes(&[2.0, 5.0]);
        assert!(fixes.contains(&Fix { variable: 1, value: 2.0 }));
    }

    #[test]
    fn test_unfixed_has_two_case_splits() {
        let relu = ReluConstraint::new(0, 1);
        assert_eq!(relu.get_case_splits().len(), 2);
    }
}
