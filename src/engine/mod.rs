//! The solver façade: ties the [`tableau::Tableau`](crate::tableau::Tableau),
//! the [`search`](crate::search) core, and the [`nlr`](crate::nlr) bound
//! propagation pipeline into one outer loop that takes a [`Query`] to a
//! terminal [`crate::Status`].
//!
//! Grounded on the teacher's split between a thin per-module public surface
//! (`query`, `preprocessor`, `proof`, `milp`) and a single owning struct that
//! wires them together each outer-loop iteration; the loop body itself is
//! patterned after [`crate::tableau::Tableau::perform_simplex_step`]'s own
//! "try, fall back, report terminal state" shape, one level up.

pub mod milp;
pub mod preprocessor;
pub mod proof;
pub mod query;

pub use query::{Query, Solution};

use macros::{explicit_options, use_option};

use crate::bound::BoundManager;
use crate::callback::Callback;
use crate::equation::Equation;
use crate::error::EngineError;
use crate::nlr::deep_poly::DeepPolyPropagator;
use crate::nlr::LayerGraph;
use crate::pl::{Fix, PiecewiseLinear, PiecewiseLinearCaseSplit, PiecewiseLinearConstraint};
use crate::search::{SearchCore, SplitStack};
use crate::stats::Statistics;
use crate::tableau::{SimplexStepOutcome, Tableau};
use crate::terminators::Terminator;
use crate::{E, I, LpSolverType, Status, SymbolicBoundTighteningType};

use preprocessor::Preprocessor;
use proof::{Contradiction, LemmaRecord, ProofDocument, ProofNode};

const BOUND_TIGHTENING_EPSILON: E = 1e-9;

/// One level of the proof tree under construction, kept in lock-step with
/// [`SplitStack`]'s own frames: every branch commit pushes a frame here,
/// every leaf contradiction is appended to the innermost frame's children,
/// and popping an exhausted frame folds its children into its parent's.
struct ProofBuilderFrame {
    constraint_index: I,
    children: Vec<ProofNode>,
}

/// Decision procedure over one [`Query`]: owns the [`Tableau`], the working
/// piecewise-linear constraint set, the [`SplitStack`], and the network-level
/// reasoner, and drives them to a terminal [`Status`] in [`Engine::solve`].
#[explicit_options(name = EngineOptions)]
#[use_option(
    name = "lp_solver_type",
    type_ = LpSolverType,
    default = "Native",
    description = "Selects between the native simplex engine and a caller-supplied external MILP back-end"
)]
#[use_option(
    name = "symbolic_bound_tightening_type",
    type_ = SymbolicBoundTighteningType,
    default = "DeepPoly",
    description = "Strength of network-level bound propagation run between subproblems"
)]
#[use_option(
    name = "max_bound_tightening_rounds",
    type_ = usize,
    default = "50",
    description = "Bound on the number of constraint-notify / valid-split / NLR rounds run to a fixpoint before each simplex call"
)]
#[use_option(
    name = "max_outer_iterations",
    type_ = usize,
    default = "10000000",
    description = "Safety bound on the number of outer-loop iterations before reporting Error instead of looping forever"
)]
pub struct Engine {
    tableau: Tableau,
    /// Pristine, never-mutated copies of the query's constraints; the
    /// working `constraints` vector is rebuilt from these every iteration so
    /// a backtrack can never leave a stale, over-tightened bound cache
    /// behind (the `PiecewiseLinear::notify_*` methods only ever narrow).
    constraint_templates: Vec<PiecewiseLinearConstraint>,
    constraints: Vec<PiecewiseLinearConstraint>,
    valid_split_recorded: Vec<bool>,
    last_depth: usize,
    split_stack: SplitStack,
    search: SearchCore,
    layer_graph: Option<LayerGraph>,
    deep_poly: DeepPolyPropagator,
    original_num_variables: I,
    stats: Statistics,
    proof_stack: Vec<ProofBuilderFrame>,
    /// Equations implied by valid splits recorded before any branch is on
    /// the stack; kept only for proof/debugging introspection, since
    /// `satisfied()` already re-derives the same fact from bounds.
    root_equations: Vec<Equation>,
    /// The last satisfying assignment found, in the (preprocessed) tableau's
    /// own variable numbering; `None` until `check_satisfaction_and_branch`
    /// or the SoI repair path first reports `Sat`.
    last_solution: Option<Vec<E>>,
    /// Root of the proof tree accumulated across a run that ended `Unsat`;
    /// folded in from `proof_stack` as the root frame itself is exhausted.
    final_proof_root: Option<ProofNode>,
}

impl Engine {
    /// Runs preprocessing and builds the initial tableau; fails only if the
    /// query itself is malformed (an unboxed input variable, or a
    /// degenerate initial basis).
    pub fn new(query: Query, options: &crate::EngineOptions) -> Result<Self, EngineError> {
        let internal: EngineInternalOptions = options.into();
        if internal.lp_solver_type == LpSolverType::ExternalMilp {
            return Err(EngineError::FeatureNotSupported(
                "external MILP back-end requires a caller-supplied MilpBackend; none is wired in this build".to_string(),
            ));
        }

        let prepared = Preprocessor::run(&query)?;
        let n = prepared.constraints.len();
        let search = SearchCore::new(options);
        let deep_poly = DeepPolyPropagator::new(options);
        let layer_graph = if internal.symbolic_bound_tightening_type == SymbolicBoundTighteningType::None {
            None
        } else {
            query.layer_graph
        };

        Ok(Self {
            options: internal,
            tableau: prepared.tableau,
            constraint_templates: prepared.constraints.clone(),
            constraints: prepared.constraints,
            valid_split_recorded: vec![false; n],
            last_depth: 0,
            split_stack: SplitStack::new(),
            search,
            layer_graph,
            deep_poly,
            original_num_variables: prepared.original_num_variables,
            stats: Statistics::new(),
            proof_stack: Vec::new(),
            root_equations: Vec::new(),
            last_solution: None,
            final_proof_root: None,
        })
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// Drives the outer loop to a terminal status, calling `callback` once
    /// per iteration and checking `terminator` for cooperative cancellation.
    pub fn solve(&mut self, callback: &mut dyn Callback, terminator: &mut dyn Terminator) -> Status {
        terminator.initialize();
        self.tableau.toggle_optimization(false);

        for _ in 0..self.options.max_outer_iterations {
            if let Some(status) = terminator.terminate() {
                self.stats.stop_clock();
                return status;
            }

            if let Err(e) = self.tighten_to_fixpoint() {
                match self.handle_infeasibility(e) {
                    Ok(None) => continue,
                    Ok(Some(status)) => {
                        self.stats.stop_clock();
                        return status;
                    }
                    Err(status) => {
                        self.stats.stop_clock();
                        return status;
                    }
                }
            }

            match self.run_simplex_to_convergence() {
                Ok(SimplexStepOutcome::OptimalOrFeasible) => match self.check_satisfaction_and_branch() {
                    Ok(None) => {}
                    Ok(Some(status)) => {
                        self.stats.stop_clock();
                        return status;
                    }
                    Err(status) => {
                        self.stats.stop_clock();
                        return status;
                    }
                },
                Ok(SimplexStepOutcome::Infeasible) => {
                    match self.handle_infeasibility(EngineError::InfeasibleQuery(
                        "no feasible basic assignment under the current bounds".to_string(),
                    )) {
                        Ok(None) => {}
                        Ok(Some(status)) => {
                            self.stats.stop_clock();
                            return status;
                        }
                        Err(status) => {
                            self.stats.stop_clock();
                            return status;
                        }
                    }
                }
                Ok(SimplexStepOutcome::Pivoted) => unreachable!("run_simplex_to_convergence never returns Pivoted"),
                Err(e) if e.is_recoverable() => match self.recover_from(e) {
                    Ok(()) => {}
                    Err(status) => {
                        self.stats.stop_clock();
                        return status;
                    }
                },
                Err(_) => {
                    self.stats.stop_clock();
                    return Status::Error;
                }
            }

            callback.call(&self.stats);
        }

        self.stats.stop_clock();
        Status::Error
    }

    /// Repeatedly pivots until the tableau reports a terminal per-step
    /// outcome (optimal/feasible or infeasible), propagating any
    /// irrecoverable pivot error without masking it as a loop iteration.
    fn run_simplex_to_convergence(&mut self) -> Result<SimplexStepOutcome, EngineError> {
        loop {
            match self.tableau.perform_simplex_step()? {
                SimplexStepOutcome::Pivoted => self.stats.stable_pivots += 1,
                other => return Ok(other),
            }
        }
    }

    /// Attempts the recoverable-error response named by [`EngineError::is_recoverable`]
    /// for every variant except `InfeasibleQuery`, which the caller routes
    /// through [`Self::handle_infeasibility`] instead since it needs to fold
    /// into the same backtracking path as a tableau-reported infeasibility.
    fn recover_from(&mut self, error: EngineError) -> Result<(), Status> {
        match error {
            EngineError::MalformedBasis(_) => {
                self.tableau.restore_precision().map_err(|_| Status::Error)?;
                self.stats.restorations += 1;
                Ok(())
            }
            EngineError::VariableOutOfBoundDuringOptimisation(_) => {
                self.tableau.toggle_optimization(false);
                Ok(())
            }
            EngineError::InfeasibleQuery(_) => unreachable!("routed through handle_infeasibility"),
            _ => Err(Status::Error),
        }
    }

    /// Routes an infeasibility (whether from inconsistent bounds after a
    /// flush or from the tableau itself) through backtracking. `Ok(None)`
    /// means the caller should re-enter the outer loop from the top (a new
    /// branch is now committed); `Ok(Some(status))` is a terminal result.
    fn handle_infeasibility(&mut self, error: EngineError) -> Result<Option<Status>, Status> {
        if !error.is_recoverable() {
            return Err(Status::Error);
        }
        Ok(self.backtrack())
    }

    /// Flushes pending tightenings, re-derives every constraint's bound
    /// cache from scratch, applies every now-valid case split, and runs
    /// network-level propagation, repeating until nothing changes (or the
    /// round budget is exhausted).
    fn tighten_to_fixpoint(&mut self) -> Result<(), EngineError> {
        for _ in 0..self.options.max_bound_tightening_rounds {
            self.resync_constraints();
            self.apply_valid_splits();

            // Each constraint's own entailed tightenings (e.g. ReLU's
            // f >= 0, or the narrower bound once a phase is fixed) are
            // queued alongside the valid-split tightenings, so a bound
            // derivable from a single constraint in isolation never has to
            // wait on the (optional) network-level reasoner to surface it.
            for constraint in &self.constraints {
                self.tableau.bounds_mut().enqueue_all(constraint.get_entailed_tightenings());
            }

            if let Some(graph) = self.layer_graph.as_mut() {
                sync_graph_bounds_from(graph, self.tableau.bounds());
                self.deep_poly.propagate_until_fixpoint(graph, BOUND_TIGHTENING_EPSILON);
                self.tableau.bounds_mut().enqueue_all(graph.tightenings_as_bound_updates());
            }

            let changed = self.tableau.bounds_mut().flush();
            if !self.tableau.bounds().is_consistent() {
                let variable = self.tableau.bounds().first_inconsistent_variable().unwrap_or(0);
                return Err(EngineError::InfeasibleQuery(format!(
                    "variable {variable}'s lower bound exceeds its upper bound after tightening"
                )));
            }
            if changed.is_empty() {
                return Ok(());
            }
            self.stats.bound_tightening_rounds += 1;
        }
        Ok(())
    }

    /// Rebuilds `self.constraints` from the pristine templates and replays
    /// every participating variable's current bound, so a widened bound
    /// from a backtrack is never shadowed by a stale, monotonically-tighter
    /// cached value left over from the abandoned branch.
    fn resync_constraints(&mut self) {
        self.constraints = self.constraint_templates.clone();
        let bounds = &self.tableau.bounds();
        for constraint in &mut self.constraints {
            for variable in constraint.participating_variables() {
                constraint.notify_lower_bound(variable, bounds.lower_bound(variable));
                constraint.notify_upper_bound(variable, bounds.upper_bound(variable));
            }
        }
    }

    /// Enqueues the tightenings (and records the equations, for
    /// introspection) of every constraint whose phase the current bounds
    /// have already fixed, skipping constraints already applied at this
    /// split-stack depth.
    fn apply_valid_splits(&mut self) {
        let depth = self.split_stack.depth();
        if depth != self.last_depth {
            self.valid_split_recorded.iter_mut().for_each(|applied| *applied = false);
            self.last_depth = depth;
        }

        for index in 0..self.constraints.len() {
            if self.valid_split_recorded[index] || !self.constraints[index].phase_fixed() {
                continue;
            }
            let Some(split) = self.constraints[index].get_valid_case_split() else {
                continue;
            };
            self.tableau.bounds_mut().enqueue_all(split.tightenings.clone());
            if !split.equations.is_empty() {
                if self.split_stack.is_empty() {
                    self.root_equations.extend(split.equations.clone());
                } else {
                    self.split_stack.record_implied_valid_split(split);
                }
            }
            self.valid_split_recorded[index] = true;
        }
    }

    /// Builds the full tableau assignment, checks it against every
    /// piecewise-linear constraint, and either reports `Sat`, repairs it via
    /// SoI local search, or commits a new branch. `Ok(None)` means the outer
    /// loop should continue from the top.
    fn check_satisfaction_and_branch(&mut self) -> Result<Option<Status>, Status> {
        let assignment: Vec<E> = (0..self.tableau.num_columns()).map(|v| self.tableau.value_of(v)).collect();

        let violated: Vec<I> = self
            .constraints
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.satisfied(&assignment))
            .map(|(i, _)| i)
            .collect();

        if violated.is_empty() {
            return Ok(Some(Status::Sat)).map(|s| {
                // Stash the witness for `Self::extract_solution`'s caller.
                self.last_solution = Some(assignment.clone());
                s
            });
        }

        if self.search.use_soi_local_search() {
            let mut repaired = assignment.clone();
            let mut local_search = self.search.new_soi_local_search();
            let outcome = local_search.run(&self.constraints, &mut repaired, &mut self.stats);
            // A repair reassigns piecewise-linear output variables directly,
            // bypassing the simplex basis; accept it as a witness only if
            // every linear equation (tableau row) still holds, since
            // `PiecewiseLinear::satisfied` alone says nothing about rows the
            // repaired variable also participates in.
            if outcome == crate::search::SoiOutcome::Repaired && self.tableau.max_row_residual(&repaired) <= BOUND_TIGHTENING_EPSILON.sqrt() {
                self.last_solution = Some(repaired);
                return Ok(Some(Status::Sat));
            }
        }

        self.commit_branch(&violated, &assignment)
    }

    /// Chooses a constraint to branch on via the search core's heuristics
    /// and pushes its first case split, in lock-step with the bound
    /// manager's context stack and the proof tree under construction.
    fn commit_branch(&mut self, violated: &[I], assignment: &[E]) -> Result<Option<Status>, Status> {
        let Some(chosen) = self
            .search
            .heuristics()
            .choose(violated, &self.constraints, assignment, self.tableau.bounds())
        else {
            unreachable!("commit_branch is only called with a non-empty violated list");
        };

        let mut splits = self.constraints[chosen].get_case_splits();
        if splits.is_empty() {
            // A violated constraint that offers no case split at all (e.g. a
            // relaxation-only relation) cannot be repaired by branching;
            // treat the subtree as exhausted.
            return Ok(self.backtrack());
        }
        let first = splits.remove(0);

        self.tableau.bounds_mut().push();
        self.split_stack.push(first.clone(), splits);
        self.proof_stack.push(ProofBuilderFrame {
            constraint_index: chosen,
            children: Vec::new(),
        });
        self.tableau.bounds_mut().enqueue_all(first.tightenings);
        self.stats.splits_performed += 1;
        self.stats.record_split_stack_depth(self.split_stack.depth());

        Ok(None)
    }

    /// Pops the split stack until an untried alternative is found (pushing
    /// it back in lock-step with the bound manager) or the stack empties,
    /// folding each exhausted frame's collected children into a
    /// [`ProofNode::branch`] as it goes. Returns `Some(Status::Unsat)` only
    /// once the root frame itself is exhausted.
    fn backtrack(&mut self) -> Option<Status> {
        loop {
            if self.split_stack.is_empty() {
                return Some(Status::Unsat);
            }

            if let Some(frame) = self.proof_stack.last_mut() {
                frame.children.push(ProofNode::leaf(self.current_contradiction()));
            }

            let alternative = self.split_stack.pop();
            self.tableau.bounds_mut().pop();
            self.stats.splits_popped += 1;

            match alternative {
                Some((next, remaining)) => {
                    self.tableau.bounds_mut().push();
                    self.split_stack.push(next.clone(), remaining);
                    self.tableau.bounds_mut().enqueue_all(next.tightenings);
                    return None;
                }
                None => {
                    if let Some(frame) = self.proof_stack.pop() {
                        let node = ProofNode::branch(
                            LemmaRecord {
                                constraint_index: frame.constraint_index,
                                description: format!("case split on constraint {}", frame.constraint_index),
                            },
                            frame.children,
                        );
                        if let Some(parent) = self.proof_stack.last_mut() {
                            parent.children.push(node);
                        } else {
                            self.final_proof_root = Some(node);
                        }
                    }
                    // Frame exhausted with no alternative; keep popping.
                }
            }
        }
    }

    /// A best-effort contradiction for the proof tree: the first basic
    /// variable currently out of its bounds, or (if the tableau itself is
    /// feasible but the bounds went inconsistent) the first inconsistent
    /// variable. Not a verified Farkas certificate — see [`proof`]'s module
    /// doc on the scope of proof production.
    fn current_contradiction(&self) -> Contradiction {
        if let Some(variable) = self.tableau.bounds().first_inconsistent_variable() {
            return Contradiction::BoundCrossing { variable, explanation: Vec::new() };
        }
        for (row, &variable) in self.tableau.basis().iter().enumerate() {
            let value = self.tableau.value_of(variable);
            let lb = self.tableau.bounds().lower_bound(variable);
            let ub = self.tableau.bounds().upper_bound(variable);
            if value < lb - 1e-9 || value > ub + 1e-9 {
                return Contradiction::BoundCrossing { variable, explanation: vec![(1.0, row)] };
            }
        }
        Contradiction::BoundCrossing { variable: 0, explanation: Vec::new() }
    }

    /// Builds a [`ProofDocument`] from the tree accumulated across the run
    /// that ended in `Unsat`; `None` if the run never reached an exhausted
    /// root (e.g. it ended in `Sat`, `Timeout`, or `Error`).
    pub fn proof(&self, ground_lower_bounds: Vec<E>, ground_upper_bounds: Vec<E>, matrix_triplets: Vec<(I, I, E)>) -> Option<ProofDocument> {
        self.final_proof_root.clone().map(|root| ProofDocument {
            ground_lower_bounds,
            ground_upper_bounds,
            matrix_triplets,
            root,
        })
    }

    /// Maps the last SAT witness found back to the query's original
    /// variable numbering (auxiliary columns introduced by preprocessing
    /// are dropped).
    pub fn solution(&self) -> Option<Solution> {
        self.last_solution.as_ref().map(|assignment| Solution {
            values: assignment[..self.original_num_variables].to_vec(),
        })
    }
}

/// Copies the current authoritative bounds for every tableau-backed neuron
/// into the layer graph, ahead of a propagation sweep.
fn sync_graph_bounds_from(graph: &mut LayerGraph, bounds: &BoundManager) {
    for layer in &mut graph.layers {
        for neuron in 0..layer.size {
            if let Some(variable) = layer.tableau_variable[neuron] {
                layer.lb[neuron] = bounds.lower_bound(variable);
                layer.ub[neuron] = bounds.upper_bound(variable);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::NoOpCallback;
    use crate::equation::EquationType;
    use crate::pl::relu::ReluConstraint;
    use crate::terminators::TimeOutTerminator;

    fn relu_query() -> Query {
        // b in [-1, 1], f = relu(b); plus a single equation pinning b = 0.7
        // so the phase is forced active and the only feasible point has
        // f = b = 0.7.
        let mut query = Query::new(2);
        query.set_bounds(0, -1.0, 1.0);
        query.set_bounds(1, 0.0, 1.0);
        query.add_equation(Equation::new(EquationType::Eq, 0.7).with_addend(1.0, 0));
        query.add_constraint(PiecewiseLinearConstraint::Relu(ReluConstraint::new(0, 1)));
        query
    }

    #[test]
    fn test_engine_solves_forced_active_relu_to_sat() {
        let options = crate::EngineOptions::new();
        let mut engine = Engine::new(relu_query(), &options).unwrap();
        let mut callback = NoOpCallback::new(&options);
        let mut terminator = TimeOutTerminator::new(10);
        let status = engine.solve(&mut callback, &mut terminator);
        assert_eq!(status, Status::Sat);
        let solution = engine.solution().unwrap();
        assert!((solution.value_of(0) - 0.7).abs() < 1e-4);
        assert!((solution.value_of(1) - 0.7).abs() < 1e-4);
    }

    #[test]
    fn test_engine_reports_unsat_for_contradictory_bounds() {
        let mut query = Query::new(1);
        query.set_bounds(0, 1.0, 0.0); // lb > ub, inconsistent from the start
        let options = crate::EngineOptions::new();
        let mut engine = Engine::new(query, &options).unwrap();
        let mut callback = NoOpCallback::new(&options);
        let mut terminator = TimeOutTerminator::new(10);
        let status = engine.solve(&mut callback, &mut terminator);
        assert_eq!(status, Status::Unsat);
    }

    #[test]
    fn test_engine_branches_on_unconstrained_relu_and_reaches_sat() {
        // No equation pinning b: both phases are feasible, so the engine
        // must branch (or repair via SoI) to reach a witness.
        let mut query = Query::new(2);
        query.set_bounds(0, -1.0, 1.0);
        query.set_bounds(1, 0.0, 1.0);
        query.add_constraint(PiecewiseLinearConstraint::Relu(ReluConstraint::new(0, 1)));
        let options = crate::EngineOptions::new();
        let mut engine = Engine::new(query, &options).unwrap();
        let mut callback = NoOpCallback::new(&options);
        let mut terminator = TimeOutTerminator::new(10);
        let status = engine.solve(&mut callback, &mut terminator);
        assert_eq!(status, Status::Sat);
    }
}
