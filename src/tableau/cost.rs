//! Cost-function manager: tracks the revised-simplex objective row and
//! whether it is safe to trust, separating the core infeasibility-minimising
//! cost from a user-supplied linear objective.

use crate::{E, I};

/// Freshness of the cached cost row, mirroring the basic assignment's own
/// JUST_COMPUTED/UPDATED split (`costFunctionJustComputed` /
/// `costFunctionInvalid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostStatus {
    /// No cost row has been computed since the last change that could have
    /// invalidated it; a fresh `compute_*` call is required before pricing.
    Invalid,
    /// The cost row was computed from scratch this iteration.
    JustComputed,
    /// The cost row was computed previously and has only been updated
    /// incrementally since; still trustworthy but degrades over time.
    Updated,
}

/// Owns the current cost row (one entry per non-basic variable) and its
/// freshness status.
#[derive(Debug, Clone)]
pub struct CostFunctionManager {
    row: Vec<E>,
    status: CostStatus,
}

impl CostFunctionManager {
    pub fn new(num_non_basic: I) -> Self {
        Self {
            row: vec![0.0; num_non_basic],
            status: CostStatus::Invalid,
        }
    }

    pub fn status(&self) -> CostStatus {
        self.status
    }

    pub fn is_invalid(&self) -> bool {
        self.status == CostStatus::Invalid
    }

    pub fn is_just_computed(&self) -> bool {
        self.status == CostStatus::JustComputed
    }

    pub fn row(&self) -> &[E] {
        &self.row
    }

    pub fn invalidate(&mut self) {
        self.status = CostStatus::Invalid;
    }

    /// Computes the core infeasibility cost: the sum, over basic variables
    /// currently out of bounds, of the signed distance to the nearest
    /// violated bound, expressed in terms of the non-basic reduced costs
    /// `reduced_costs` supplied by the caller (already projected through the
    /// current basis inverse).
    pub fn compute_core_cost(&mut self, reduced_costs: Vec<E>) {
        self.row = reduced_costs;
        self.status = CostStatus::JustComputed;
    }

    /// Sets the cost row from a user-supplied linear expression (addends
    /// over non-basic variables), used both by direct objective
    /// minimisation and by the SoI local search's phase objective.
    pub fn compute_given_cost(&mut self, addends: Vec<(I, E)>, num_non_basic: I) {
        let mut row = vec![0.0; num_non_basic];
        for (j, coeff) in addends {
            row[j] += coeff;
        }
        self.row = row;
        self.status = CostStatus::JustComputed;
    }

    /// Marks the row as incrementally updated (still usable, but no longer
    /// guaranteed exact) after a pivot changes non-basic membership without
    /// a full recomputation.
    pub fn mark_updated(&mut self) {
        if self.status != CostStatus::Invalid {
            self.status = CostStatus::Updated;
        }
    }

    /// Refreshes a single entry in place without recomputing the whole row,
    /// used when only a handful of reduced costs are known to have drifted.
    pub fn refresh_entry(&mut self, j: I, value: E) {
        if j < self.row.len() {
            self.row[j] = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cost_function_is_invalid() {
        let cost = CostFunctionManager::new(4);
        assert!(cost.is_invalid());
    }

    #[test]
    fn test_compute_core_cost_marks_just_computed() {
        let mut cost = CostFunctionManager::new(3);
        cost.compute_core_cost(vec![1.0, -2.0, 0.5]);
        assert!(cost.is_just_computed());
        assert_eq!(cost.row(), &[1.0, -2.0, 0.5]);
    }

    #[test]
    fn test_mark_updated_does_not_resurrect_invalid() {
        let mut cost = CostFunctionManager::new(2);
        cost.mark_updated();
        assert!(cost.is_invalid());
        cost.compute_given_cost(vec![(0, 3.0)], 2);
        cost.mark_updated();
        assert_eq!(cost.status(), CostStatus::Updated);
    }
}
