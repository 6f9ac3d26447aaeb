//! Round(b, f): f = round(b) (round-half-up). Phase-fixed when the current
//! interval on `b` lies entirely within one rounding cell `[n-0.5, n+0.5)`;
//! otherwise branches as a finite disjunction over the integers the
//! interval can round to.

use crate::equation::{Equation, EquationType, Tightening};
use crate::pl::{Fix, PiecewiseLinear, PiecewiseLinearCaseSplit, SATISFACTION_TOLERANCE};
use crate::{E, I};

#[derive(Debug, Clone)]
pub struct RoundConstraint {
    pub b: I,
    pub f: I,
    lb_b: E,
    ub_b: E,
}

fn round_half_up(x: E) -> E {
    (x + 0.5).floor()
}

impl RoundConstraint {
    pub fn new(b: I, f: I) -> Self {
        Self {
            b,
            f,
            lb_b: E::NEG_INFINITY,
            ub_b: E::INFINITY,
        }
    }

    fn candidate_integers(&self) -> Vec<E> {
        if !self.lb_b.is_finite() || !self.ub_b.is_finite() {
            return Vec::new();
        }
        let lo = round_half_up(self.lb_b) as i64;
        let hi = round_half_up(self.ub_b) as i64;
        (lo..=hi).map(|n| n as E).collect()
    }

    fn case_split_for(&self, n: E) -> PiecewiseLinearCaseSplit {
        PiecewiseLinearCaseSplit::new()
            .with_tightening(Tightening::lb(self.b, n - 0.5))
            .with_tightening(Tightening::ub(self.b, n + 0.5))
            .with_equation(
                Equation::new(EquationType::Eq, n)
                    .with_addend(1.0, self.f),
            )
    }
}

impl PiecewiseLinear for RoundConstraint {
    fn participating_variables(&self) -> Vec<I> {
        vec![self.b, self.f]
    }

    fn phase_fixed(&self) -> bool {
        self.candidate_integers().len() == 1
    }

    fn get_valid_case_split(&self) -> Option<PiecewiseLinearCaseSplit> {
        let candidates = self.candidate_integers();
        (candidates.len() == 1).then(|| self.case_split_for(candidates[0]))
    }

    fn get_case_splits(&self) -> Vec<PiecewiseLinearCaseSplit> {
        self.candidate_integers()
            .into_iter()
            .map(|n| self.case_split_for(n))
            .collect()
    }

    fn satisfied(&self, assignment: &[E]) -> bool {
        (assignment[self.f] - round_half_up(assignment[self.b])).abs() <= SATISFACTION_TOLERANCE
    }

    fn get_possible_fixes(&self, assignment: &[E]) -> Vec<Fix> {
        vec![Fix {
            variable: self.f,
            value: round_half_up(assignment[self.b]),
        }]
    }

    fn get_entailed_tightenings(&self) -> Vec<Tightening> {
        let candidates = self.candidate_integers();
        match (candidates.first(), candidates.last()) {
            (Some(&lo), Some(&hi)) => vec![Tightening::lb(self.f, lo), Tightening::ub(self.f, hi)],
            _ => Vec::new(),
        }
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
    fn test_phase_fixed_when_interval_within_one_cell() {
        let mut round = RoundConstraint::new(0, 1);
        round.notify_lower_bound(0, 1.2);
        round.notify_upper_bound(0, 1.4);
        assert!(round.phase_fixed());
        assert_eq!(round.candidate_integers(), vec![1.0]);
    }

    #[test]
    fn test_satisfied_uses_round_half_up() {
        let round = RoundConstraint::new(0, 1);
        assert!(round.satisfied(&[1.5, 2.0]));
        assert!(round.satisfied(&[1.49, 1.0]));
    }
}
