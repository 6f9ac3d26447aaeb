//! Projected steepest-edge pricing: weights candidate entering variables by
//! an estimate of the norm of their edge direction projected onto the
//! feasible space, rather than by raw reduced cost alone.
//!
//! Reference weights `gamma[j]` are maintained incrementally across pivots
//! (the standard Forrest-Goldfarb update) and periodically reset to `1.0`
//! plus the squared change-column norm whenever a reset is forced (e.g.
//! after a re-factorisation, when the incremental update's assumptions about
//! the previous basis no longer hold).

use crate::{E, I};

/// Per-non-basic-variable reference weights for the projected steepest-edge
/// rule, indexed by the variable's position in the non-basic candidate list.
#[derive(Debug, Clone)]
pub struct SteepestEdgePricer {
    gamma: Vec<E>,
}

impl SteepestEdgePricer {
    pub fn new(num_non_basic: I) -> Self {
        Self {
            gamma: vec![1.0; num_non_basic],
        }
    }

    pub fn reset(&mut self, num_non_basic: I) {
        self.gamma = vec![1.0; num_non_basic];
    }

    pub fn gamma(&self, j: I) -> E {
        self.gamma[j]
    }

    /// Ranks `candidates` (non-basic positions paired with reduced cost) by
    /// `reduced_cost^2 / gamma[j]`, descending — the projected steepest-edge
    /// figure of merit — and returns them in that order.
    pub fn rank(&self, candidates: &[(I, E)]) -> Vec<I> {
        let mut scored: Vec<(I, E)> = candidates
            .iter()
            .map(|&(j, reduced_cost)| {
                let score = (reduced_cost * reduced_cost) / self.gamma[j].max(1e-12);
                (j, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(j, _)| j).collect()
    }

    /// Updates reference weights after a pivot in which `entering` left the
    /// non-basic set with change column `alpha` (indexed over non-basic
    /// positions) and pivot element `alpha_q`.
    pub fn update_after_pivot(&mut self, entering: I, alpha: &[E], alpha_q: E) {
        if alpha_q.abs() <= 1e-12 {
            return;
        }
        let gamma_q = self.gamma[entering];
        for (j, &a_j) in alpha.iter().enumerate() {
            if j == entering {
                continue;
            }
            let ratio = a_j / alpha_q;
            self.gamma[j] = (self.gamma[j] - 2.0 * ratio * a_j * gamma_q.sqrt() / alpha_q.abs().max(1e-12))
                .max(ratio * ratio * gamma_q)
                .max(1.0);
        }
        self.gamma[entering] = (gamma_q / (alpha_q * alpha_q)).max(1e-12);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_prefers_larger_reduced_cost_with_equal_gamma() {
        let pricer = SteepestEdgePricer::new(3);
        let ranked = pricer.rank(&[(0, 1.0), (1, 5.0), (2, -2.0)]);
        assert_eq!(ranked, vec![1, 2, 0]);
    }

    #[test]
    fn test_rank_penalises_large_gamma() {
        let mut pricer = SteepestEdgePricer::new(2);
        pricer.gamma = vec![1.0, 100.0];
        let ranked = pricer.rank(&[(0, 2.0), (1, 2.0)]);
        assert_eq!(ranked, vec![0, 1]);
    }

    #[test]
    fn test_reset_restores_unit_weights() {
        let mut pricer = SteepestEdgePricer::new(2);
        pricer.gamma = vec![5.0, 9.0];
        pricer.reset(2);
        assert_eq!(pricer.gamma(0), 1.0);
        assert_eq!(pricer.gamma(1), 1.0);
    }
}
