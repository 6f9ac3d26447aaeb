//! Branching heuristics: given the set of currently-violated piecewise-linear
//! constraints, pick which one to split on next.
//!
//! Each heuristic scores violated constraints by a different proxy for "how
//! much does fixing this one narrow the remaining search"; [`Heuristics`]
//! dispatches to whichever [`DivideStrategy`] the engine is configured with,
//! including `Auto`'s BaBSR-then-PseudoImpact schedule.

use std::collections::HashMap;

use crate::bound::BoundManager;
use crate::pl::{PiecewiseLinear, PiecewiseLinearConstraint};
use crate::{DivideStrategy, E, I};

/// Number of branching decisions `Auto` spends on BaBSR before switching to
/// the learned PseudoImpact scores, which need a few observations to be
/// more informative than a static proxy.
const AUTO_WARMUP_DECISIONS: usize = 10;

const PSEUDO_IMPACT_DECAY: E = 0.9;

pub struct Heuristics {
    strategy: DivideStrategy,
    decisions_made: usize,
    pseudo_impact: HashMap<I, E>,
}

impl Heuristics {
    pub fn new(strategy: DivideStrategy) -> Self {
        Self {
            strategy,
            decisions_made: 0,
            pseudo_impact: HashMap::new(),
        }
    }

    /// Picks one of `violated` (indices into `constraints`) to split on.
    /// Returns `None` only when `violated` is empty.
    pub fn choose(
        &mut self,
        violated: &[I],
        constraints: &[PiecewiseLinearConstraint],
        assignment: &[E],
        bounds: &BoundManager,
    ) -> Option<I> {
        if violated.is_empty() {
            return None;
        }
        self.decisions_made += 1;
        let strategy = match self.strategy {
            DivideStrategy::Auto if self.decisions_made <= AUTO_WARMUP_DECISIONS => {
                DivideStrategy::BaBSR
            }
            DivideStrategy::Auto => DivideStrategy::PseudoImpact,
            other => other,
        };

        let chosen = match strategy {
            DivideStrategy::Polarity => self.best_by(violated, constraints, bounds, polarity_score),
            DivideStrategy::BaBSR => self.best_by(violated, constraints, bounds, babsr_score),
            DivideStrategy::EarliestReLU => violated
                .iter()
                .copied()
                .min_by_key(|&i| representative_variable(&constraints[i]))
                .unwrap(),
            DivideStrategy::LargestInterval => {
                self.best_by(violated, constraints, bounds, interval_width_score)
            }
            DivideStrategy::PseudoImpact => *violated
                .iter()
                .max_by(|&&a, &&b| {
                    self.pseudo_impact_or_default(a, constraints, bounds)
                        .partial_cmp(&self.pseudo_impact_or_default(b, constraints, bounds))
                        .unwrap()
                })
                .unwrap(),
            DivideStrategy::Auto => unreachable!("resolved above"),
        };
        Some(chosen)
    }

    /// Feeds back how much splitting on `constraint_index` narrowed the
    /// search (e.g. the sum of bound-interval shrinkage it produced), updated
    /// as an exponential moving average consumed by `PseudoImpact`.
    pub fn record_impact(&mut self, constraint_index: I, observed_impact: E) {
        let entry = self.pseudo_impact.entry(constraint_index).or_insert(0.0);
        *entry = PSEUDO_IMPACT_DECAY * *entry + (1.0 - PSEUDO_IMPACT_DECAY) * observed_impact;
    }

    fn pseudo_impact_or_default(
        &self,
        index: I,
        constraints: &[PiecewiseLinearConstraint],
        bounds: &BoundManager,
    ) -> E {
        self.pseudo_impact
            .get(&index)
            .copied()
            .unwrap_or_else(|| babsr_score(&constraints[index], bounds))
    }

    fn best_by(
        &self,
        violated: &[I],
        constraints: &[PiecewiseLinearConstraint],
        bounds: &BoundManager,
        score: impl Fn(&PiecewiseLinearConstraint, &BoundManager) -> E,
    ) -> I {
        *violated
            .iter()
            .max_by(|&&a, &&b| {
                score(&constraints[a], bounds)
                    .partial_cmp(&score(&constraints[b], bounds))
                    .unwrap()
            })
            .unwrap()
    }
}

fn representative_variable(constraint: &PiecewiseLinearConstraint) -> I {
    constraint.participating_variables()[0]
}

fn bound_interval(constraint: &PiecewiseLinearConstraint, bounds: &BoundManager) -> (E, E) {
    let variable = representative_variable(constraint);
    (bounds.lower_bound(variable), bounds.upper_bound(variable))
}

/// Prefers the constraint whose representative variable's interval straddles
/// zero most evenly — the phase with the least a-priori bias.
fn polarity_score(constraint: &PiecewiseLinearConstraint, bounds: &BoundManager) -> E {
    let (lb, ub) = bound_interval(constraint, bounds);
    -(lb + ub).abs()
}

/// Proxy for the BaBSR relaxation-gap score: the product of the negative and
/// positive parts of the representative variable's interval, maximised when
/// the interval straddles zero widely in both directions.
fn babsr_score(constraint: &PiecewiseLinearConstraint, bounds: &BoundManager) -> E {
    let (lb, ub) = bound_interval(constraint, bounds);
    (-lb).max(0.0) * ub.max(0.0)
}

fn interval_width_score(constraint: &PiecewiseLinearConstraint, bounds: &BoundManager) -> E {
    let (lb, ub) = bound_interval(constraint, bounds);
    if lb.is_finite() && ub.is_finite() { ub - lb } else { E::INFINITY }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pl::relu::ReluConstraint;

    fn bounds_with(entries: &[(I, E, E)]) -> BoundManager {
        let n = entries.iter().map(|&(v, _, _)| v).max().unwrap() + 1;
        let mut bounds = BoundManager::new(n);
        for &(v, lb, ub) in entries {
            bounds.set_lower_bound(v, lb);
            bounds.set_upper_bound(v, ub);
        }
        bounds
    }

    #[test]
    fn test_largest_interval_prefers_widest_ambiguous_relu() {
        let constraints = vec![
            PiecewiseLinearConstraint::Relu(ReluConstraint::new(0, 1)),
            PiecewiseLinearConstraint::Relu(ReluConstraint::new(2, 3)),
        ];
        let bounds = bounds_with(&[(0, -1.0, 1.0), (2, -10.0, 10.0)]);
        let mut heuristics = Heuristics::new(DivideStrategy::LargestInterval);
        let chosen = heuristics.choose(&[0, 1], &constraints, &[0.0; 4], &bounds);
        assert_eq!(chosen, Some(1));
    }

    #[test]
    fn test_pseudo_impact_prefers_higher_recorded_impact() {
        let constraints = vec![
            PiecewiseLinearConstraint::Relu(ReluConstraint::new(0, 1)),
            PiecewiseLinearConstraint::Relu(ReluConstraint::new(2, 3)),
        ];
        let bounds = bounds_with(&[(0, -1.0, 1.0), (2, -1.0, 1.0)]);
        let mut heuristics = Heuristics::new(DivideStrategy::PseudoImpact);
        heuristics.record_impact(1, 5.0);
        let chosen = heuristics.choose(&[0, 1], &constraints, &[0.0; 4], &bounds);
        assert_eq!(chosen, Some(1));
    }
}
