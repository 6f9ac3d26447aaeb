//! Sum-of-Infeasibilities (SoI) local search: a cheap pre-split attempt to
//! repair all violated piecewise-linear constraints by locally reassigning
//! their output variables, before falling back to case-split branching.
//!
//! Moves are accepted greedily when they reduce total violation and,
//! following a Metropolis-style schedule, sometimes accepted even when they
//! increase it — this lets the search escape local minima where every
//! single-constraint fix increases some other constraint's violation.

use faer::rand::{Rng, SeedableRng, rngs::StdRng};

use crate::pl::{PiecewiseLinear, PiecewiseLinearConstraint};
use crate::stats::Statistics;
use crate::{E, I};

const INITIAL_TEMPERATURE: E = 1.0;
const COOLING_RATE: E = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoiOutcome {
    /// Every constraint is satisfied; `assignment` was updated in place.
    Repaired,
    /// `max_steps` elapsed with at least one constraint still violated.
    GaveUp,
}

pub struct SoiLocalSearch {
    max_steps: usize,
    rng: StdRng,
}

impl SoiLocalSearch {
    pub fn new(max_steps: usize, seed: u64) -> Self {
        Self {
            max_steps,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Sum of each violated constraint's residual (`get_possible_fixes`'
    /// target value minus its current value, in magnitude).
    fn total_violation(constraints: &[PiecewiseLinearConstraint], assignment: &[E]) -> E {
        constraints
            .iter()
            .flat_map(|c| c.get_possible_fixes(assignment))
            .map(|fix| (assignment[fix.variable] - fix.value).abs())
            .sum()
    }

    pub fn run(
        &mut self,
        constraints: &[PiecewiseLinearConstraint],
        assignment: &mut [E],
        stats: &mut Statistics,
    ) -> SoiOutcome {
        let mut temperature = INITIAL_TEMPERATURE;
        for _ in 0..self.max_steps {
            let violated: Vec<&PiecewiseLinearConstraint> = constraints
                .iter()
                .filter(|c| !c.satisfied(assignment))
                .collect();
            if violated.is_empty() {
                return SoiOutcome::Repaired;
            }

            let pick = self.rng.gen_range(0..violated.len());
            let Some(fix) = violated[pick].get_possible_fixes(assignment).into_iter().next() else {
                continue;
            };

            let before = Self::total_violation(constraints, assignment);
            let previous_value = assignment[fix.variable];
            assignment[fix.variable] = fix.value;
            let after = Self::total_violation(constraints, assignment);
            stats.soi_local_search_steps += 1;

            let delta = after - before;
            let accept = delta <= 0.0 || self.rng.gen_range(0.0..1.0) < (-delta / temperature).exp();
            if !accept {
                assignment[fix.variable] = previous_value;
            }
            temperature *= COOLING_RATE;
        }

        if constraints.iter().all(|c| c.satisfied(assignment)) {
            SoiOutcome::Repaired
        } else {
            SoiOutcome::GaveUp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pl::relu::ReluConstraint;

    #[test]
    fn test_soi_repairs_single_violated_relu() {
        let constraints = vec![PiecewiseLinearConstraint::Relu(ReluConstraint::new(0, 1))];
        let mut assignment = vec![3.0, 0.0];
        let mut stats = Statistics::new();
        let mut search = SoiLocalSearch::new(50, 7);
        let outcome = search.run(&constraints, &mut assignment, &mut stats);
        assert_eq!(outcome, SoiOutcome::Repaired);
        assert_eq!(assignment[1], 3.0);
    }

    #[test]
    fn test_soi_leaves_already_satisfied_assignment_untouched() {
        let constraints = vec![PiecewiseLinearConstraint::Relu(ReluConstraint::new(0, 1))];
        let mut assignment = vec![3.0, 3.0];
        let mut stats = Statistics::new();
        let mut search = SoiLocalSearch::new(10, 1);
        assert_eq!(
            search.run(&constraints, &mut assignment, &mut stats),
            SoiOutcome::Repaired
        );
        assert_eq!(assignment, vec![3.0, 3.0]);
    }
}
