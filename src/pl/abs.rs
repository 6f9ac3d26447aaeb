//! AbsoluteValue(b, f): f = |b|.

use crate::equation::{Equation, EquationType, Tightening};
use crate::pl::{Fix, PiecewiseLinear, PiecewiseLinearCaseSplit, SATISFACTION_TOLERANCE};
use crate::{E, I};

#[derive(Debug, Clone)]
pub struct AbsoluteValueConstraint {
    pub b: I,
    pub f: I,
    lb_b: E,
    ub_b: E,
}

impl AbsoluteValueConstraint {
    pub fn new(b: I, f: I) -> Self {
        Self {
            b,
            f,
            lb_b: E::NEG_INFINITY,
            ub_b: E::INFINITY,
        }
    }
}

impl PiecewiseLinear for AbsoluteValueConstraint {
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
                            .with_addend(1.0, self.b),
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
                        .with_addend(1.0, self.b),
                ),
        ]
    }

    fn satisfied(&self, assignment: &[E]) -> bool {
        (assignment[self.f] - assignment[self.b].abs()).abs() <= SATISFACTION_TOLERANCE
    }

    fn get_possible_fixes(&self, assignment: &[E]) -> Vec<Fix> {
        vec![Fix {
            variable: self.f,
            value: assignment[self.b].abs(),
        }]
    }

    fn get_entailed_tightenings(&self) -> Vec<Tightening> {
        vec![Tightening::lb(self.f, 0.0), Tightening::lb(self.f, self.lb_b.max(-self.ub_b).max(0.0))]
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
