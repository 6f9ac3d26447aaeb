//! Authoritative per-variable bound storage.
//!
//! [`BoundManager`] is the single writer of variable bounds (per the
//! concurrency/resource model's "single writer" rule): the tableau,
//! every piecewise-linear constraint, and the NLR all read bounds from
//! it and write proposed [`Tightening`]s into its queue, which is flushed
//! in one pass to avoid cascading cost recomputation in the tableau. A
//! context stack supports the split stack's push/pop discipline: pushing
//! snapshots the current bounds, popping restores them exactly.

use crate::equation::{Tightening, TighteningKind};
use crate::{E, I};

#[derive(Debug, Clone)]
struct ContextFrame {
    lb: Vec<E>,
    ub: Vec<E>,
}

/// Authoritative (lb, ub) store for every variable, with a queue of pending
/// tightenings and a context stack used by the search core's split stack.
#[derive(Debug, Clone)]
pub struct BoundManager {
    lb: Vec<E>,
    ub: Vec<E>,
    inconsistent: Vec<bool>,
    queue: Vec<Tightening>,
    context: Vec<ContextFrame>,
}

impl BoundManager {
    pub fn new(n: I) -> Self {
        Self {
            lb: vec![E::NEG_INFINITY; n],
            ub: vec![E::INFINITY; n],
            inconsistent: vec![false; n],
            queue: Vec::new(),
            context: Vec::new(),
        }
    }

    pub fn num_variables(&self) -> I {
        self.lb.len()
    }

    pub fn lower_bound(&self, variable: I) -> E {
        self.lb[variable]
    }

    pub fn upper_bound(&self, variable: I) -> E {
        self.ub[variable]
    }

    pub fn set_lower_bound(&mut self, variable: I, value: E) {
        self.lb[variable] = value;
        self.inconsistent[variable] = self.lb[variable] > self.ub[variable];
    }

    pub fn set_upper_bound(&mut self, variable: I, value: E) {
        self.ub[variable] = value;
        self.inconsistent[variable] = self.lb[variable] > self.ub[variable];
    }

    /// Tightens `lb[variable]` to `value` only if it strictly improves on the
    /// current bound (monotonicity: within a subproblem lb never decreases).
    pub fn tighten_lower_bound(&mut self, variable: I, value: E) -> bool {
        if value > self.lb[variable] {
            self.set_lower_bound(variable, value);
            true
        } else {
            false
        }
    }

    /// Tightens `ub[variable]` to `value` only if it strictly improves on the
    /// current bound.
    pub fn tighten_upper_bound(&mut self, variable: I, value: E) -> bool {
        if value < self.ub[variable] {
            self.set_upper_bound(variable, value);
            true
        } else {
            false
        }
    }

    /// Whether `lb[variable] > ub[variable]` for any variable: the search
    /// core surfaces this as `InfeasibleQuery`.
    pub fn is_consistent(&self) -> bool {
        !self.inconsistent.iter().any(|v| *v)
    }

    pub fn first_inconsistent_variable(&self) -> Option<I> {
        self.inconsistent.iter().position(|v| *v)
    }

    /// Queues a tightening for later flushing; does not mutate bounds yet.
    pub fn enqueue(&mut self, tightening: Tightening) {
        self.queue.push(tightening);
    }

    pub fn enqueue_all(&mut self, tightenings: impl IntoIterator<Item = Tightening>) {
        self.queue.extend(tightenings);
    }

    /// Flushes the queue into the authoritative bounds in insertion order,
    /// applying only tightenings that are strictly stronger than the current
    /// bound, and returns the variables that actually changed.
    pub fn flush(&mut self) -> Vec<I> {
        let mut changed = Vec::new();
        for t in self.queue.drain(..) {
            let did_change = match t.kind {
                TighteningKind::Lb => {
                    if t.value > self.lb[t.variable] {
                        self.lb[t.variable] = t.value;
                        self.inconsistent[t.variable] = self.lb[t.variable] > self.ub[t.variable];
                        true
                    } else {
                        false
                    }
                }
                TighteningKind::Ub => {
                    if t.value < self.ub[t.variable] {
                        self.ub[t.variable] = t.value;
                        self.inconsistent[t.variable] = self.lb[t.variable] > self.ub[t.variable];
                        true
                    } else {
                        false
                    }
                }
            };
            if did_change {
                changed.push(t.variable);
            }
        }
        changed
    }

    /// Snapshots the current bounds onto the context stack. Called when the
    /// search core pushes a new split-stack entry.
    pub fn push(&mut self) {
        self.context.push(ContextFrame {
            lb: self.lb.clone(),
            ub: self.ub.clone(),
        });
    }

    /// Restores bounds to the most recent [`BoundManager::push`] exactly,
    /// discarding that frame. Called on `popSplit`.
    pub fn pop(&mut self) {
        let frame = self.context.pop().expect("pop without matching push");
        self.lb = frame.lb;
        self.ub = frame.ub;
        self.inconsistent = self
            .lb
            .iter()
            .zip(self.ub.iter())
            .map(|(l, u)| l > u)
            .collect();
    }

    pub fn context_depth(&self) -> usize {
        self.context.len()
    }

    /// Appends a new variable with the given bounds, returning its index.
    /// Used when a case-split equation is realised as a new tableau row: the
    /// row's auxiliary variable needs bounds like any other. Any context
    /// frame pushed before this call has a shorter `lb`/`ub`, so popping back
    /// past this point removes the variable automatically (the whole vector
    /// is replaced, not merged).
    pub fn add_variable(&mut self, lb: E, ub: E) -> I {
        self.lb.push(lb);
        self.ub.push(ub);
        self.inconsistent.push(lb > ub);
        self.lb.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tighten_only_improves() {
        let mut bm = BoundManager::new(1);
        bm.set_lower_bound(0, 0.0);
        assert!(!bm.tighten_lower_bound(0, -1.0));
        assert_eq!(bm.lower_bound(0), 0.0);
        assert!(bm.tighten_lower_bound(0, 0.5));
        assert_eq!(bm.lower_bound(0), 0.5);
    }

    #[test]
    fn test_push_pop_restores_exactly() {
        let mut bm = BoundManager::new(2);
        bm.set_lower_bound(0, -1.0);
        bm.set_upper_bound(0, 1.0);
        bm.push();
        bm.set_lower_bound(0, 0.5);
        assert_eq!(bm.lower_bound(0), 0.5);
        bm.pop();
        assert_eq!(bm.lower_bound(0), -1.0);
        assert_eq!(bm.context_depth(), 0);
    }

    #[test]
    fn test_inconsistent_flagged_on_crossing_bounds() {
        let mut bm = BoundManager::new(1);
        bm.set_lower_bound(0, 0.0);
        bm.set_upper_bound(0, 1.0);
        assert!(bm.is_consistent());
        bm.set_lower_bound(0, 2.0);
        assert!(!bm.is_consistent());
        assert_eq!(bm.first_inconsistent_variable(), Some(0));
    }

    #[test]
    fn test_flush_applies_in_insertion_order_keeping_strongest() {
        let mut bm = BoundManager::new(1);
        bm.enqueue(Tightening::lb(0, 0.1));
        bm.enqueue(Tightening::lb(0, 0.05));
        bm.enqueue(Tightening::lb(0, 0.2));
        let changed = bm.flush();
        assert_eq!(changed, vec![0, 0]);
        assert_eq!(bm.lower_bound(0), 0.2);
    }
}
