//! Disjunction: a finite list of case splits `s_1 \/ ... \/ s_k`. The generic
//! vehicle for arbitrary finite-case reasoning (e.g. input-interval
//! bisection produces a 2-element disjunction).

use std::collections::HashMap;

use crate::equation::{Tightening, TighteningKind};
use crate::pl::{Fix, PiecewiseLinear, PiecewiseLinearCaseSplit, SATISFACTION_TOLERANCE};
use crate::{E, I};

#[derive(Debug, Clone)]
pub struct DisjunctionConstraint {
    pub variables: Vec<I>,
    cases: Vec<PiecewiseLinearCaseSplit>,
    lb: HashMap<I, E>,
    ub: HashMap<I, E>,
}

impl DisjunctionConstraint {
    pub fn new(variables: Vec<I>, cases: Vec<PiecewiseLinearCaseSplit>) -> Self {
        let lb = variables.iter().map(|&v| (v, E::NEG_INFINITY)).collect();
        let ub = variables.iter().map(|&v| (v, E::INFINITY)).collect();
        Self { variables, cases, lb, ub }
    }

    /// Whether `case`'s tightenings are still compatible with the current
    /// lb/ub map (a case ruled out by bound propagation can never become the
    /// branch taken, so it is excluded from both phase-fixing and
    /// branching).
    fn case_is_alive(&self, case: &PiecewiseLinearCaseSplit) -> bool {
        case.tightenings.iter().all(|t| match t.kind {
            TighteningKind::Lb => self.ub.get(&t.variable).copied().unwrap_or(E::INFINITY) >= t.value - SATISFACTION_TOLERANCE,
            TighteningKind::Ub => self.lb.get(&t.variable).copied().unwrap_or(E::NEG_INFINITY) <= t.value + SATISFACTION_TOLERANCE,
        })
    }

    fn alive_cases(&self) -> Vec<&PiecewiseLinearCaseSplit> {
        self.cases.iter().filter(|c| self.case_is_alive(c)).collect()
    }

    /// Whether `assignment` already lies inside `case`: every tightening
    /// holds as a bound on the current value, and every equation's residual
    /// vanishes.
    fn case_holds(case: &PiecewiseLinearCaseSplit, assignment: &[E]) -> bool {
        case.tightenings.iter().all(|t| match t.kind {
            TighteningKind::Lb => assignment[t.variable] >= t.value - SATISFACTION_TOLERANCE,
            TighteningKind::Ub => assignment[t.variable] <= t.value + SATISFACTION_TOLERANCE,
        }) && case.equations.iter().all(|eq| eq.residual(assignment).abs() <= SATISFACTION_TOLERANCE)
    }
}

impl PiecewiseLinear for DisjunctionConstraint {
    fn participating_variables(&self) -> Vec<I> {
        self.variables.clone()
    }

    fn phase_fixed(&self) -> bool {
        self.alive_cases().len() == 1
    }

    fn get_valid_case_split(&self) -> Option<PiecewiseLinearCaseSplit> {
        let alive = self.alive_cases();
        (alive.len() == 1).then(|| alive[0].clone())
    }

    fn get_case_splits(&self) -> Vec<PiecewiseLinearCaseSplit> {
        let alive = self.alive_cases();
        if alive.is_empty() {
            // Bounds have (incorrectly, or not yet propagated) ruled out
            // every case; fall back to the full list so the search core
            // still has something to branch on rather than silently
            // dropping the constraint.
            self.cases.clone()
        } else {
            alive.into_iter().cloned().collect()
        }
    }

    /// True only once the current assignment actually lies inside one of the
    /// surviving cases; a disjunction with several still-alive cases is
    /// "violated" in the sense that the search core must commit to one
    /// before this constraint can be considered resolved.
    fn satisfied(&self, assignment: &[E]) -> bool {
        self.alive_cases().iter().any(|case| Self::case_holds(case, assignment))
    }

    /// For the alive case whose tightenings already hold against
    /// `assignment` (the branch the current point is already inside, by
    /// bound), propose reassigning one side of each still-violated
    /// two-addend equation to satisfy it directly — the same move ReLU's own
    /// `f = b` equation resolves via. Cases with more than two addends, or
    /// where no alive case's tightenings hold yet, have no generic
    /// single-variable fix; the search core branches on those instead.
    fn get_possible_fixes(&self, assignment: &[E]) -> Vec<Fix> {
        let Some(case) = self
            .alive_cases()
            .into_iter()
            .find(|case| case.tightenings.iter().all(|t| match t.kind {
                TighteningKind::Lb => assignment[t.variable] >= t.value - SATISFACTION_TOLERANCE,
                TighteningKind::Ub => assignment[t.variable] <= t.value + SATISFACTION_TOLERANCE,
            }))
        else {
            return Vec::new();
        };

        case.equations
            .iter()
            .filter(|eq| eq.residual(assignment).abs() > SATISFACTION_TOLERANCE)
            .filter_map(|eq| {
                let [(c0, v0), (c1, v1)] = eq.addends.as_slice() else {
                    return None;
                };
                if *c0 == 0.0 {
                    return None;
                }
                let value = (eq.scalar - c1 * assignment[*v1]) / c0;
                Some(Fix { variable: *v0, value })
            })
            .collect()
    }

    fn get_entailed_tightenings(&self) -> Vec<Tightening> {
        Vec::new()
    }

    fn notify_lower_bound(&mut self, variable: I, bound: E) {
        if let Some(slot) = self.lb.get_mut(&variable) {
            *slot = slot.max(bound);
        }
    }

    fn notify_upper_bound(&mut self, variable: I, bound: E) {
        if let Some(slot) = self.ub.get_mut(&variable) {
            *slot = slot.min(bound);
        }
    }

    fn notify_variable_value(&mut self, _variable: I, _value: E) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation::Tightening;

    #[test]
    fn test_single_case_disjunction_is_phase_fixed() {
        let d = DisjunctionConstraint::new(vec![0], vec![PiecewiseLinearCaseSplit::new()]);
        assert!(d.phase_fixed());
    }

    #[test]
    fn test_case_splits_returned_directly() {
        let cases = vec![PiecewiseLinearCaseSplit::new(), PiecewiseLinearCaseSplit::new()];
        let d = DisjunctionConstraint::new(vec![0], cases.clone());
        assert_eq!(d.get_case_splits().len(), cases.len());
    }

    #[test]
    fn test_unsatisfied_until_assignment_matches_a_live_case() {
        let cases = vec![
            PiecewiseLinearCaseSplit::new().with_tightening(Tightening::lb(0, 0.0)),
            PiecewiseLinearCaseSplit::new().with_tightening(Tightening::ub(0, 0.0)),
        ];
        let d = DisjunctionConstraint::new(vec![0], cases);
        assert!(!d.satisfied(&[-5.0]));
        assert!(d.satisfied(&[5.0]));
    }

    #[test]
    fn test_bound_propagation_rules_out_a_case_and_fixes_the_phase() {
        let cases = vec![
            PiecewiseLinearCaseSplit::new().with_tightening(Tightening::lb(0, 0.0)),
            PiecewiseLinearCaseSplit::new().with_tightening(Tightening::ub(0, 0.0)),
        ];
        let mut d = DisjunctionConstraint::new(vec![0], cases);
        assert!(!d.phase_fixed());
        d.notify_lower_bound(0, 1.0);
        assert!(d.phase_fixed());
        assert!(d.get_valid_case_split().is_some());
    }
}
