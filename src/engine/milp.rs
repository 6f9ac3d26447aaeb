//! External MILP back-end contract. The native engine is the only solver
//! implemented by this crate; `LP_SOLVER_TYPE = EXTERNAL_MILP` requires a
//! caller-supplied [`MilpBackend`] implementation, matching the interface
//! named in the external-interfaces design. No concrete solver-backed
//! implementation ships here.

use std::collections::HashMap;

use crate::{E, I};

/// Status a MILP solve can terminate in, mirroring [`crate::Status`]'s
/// narrower surface for a single relaxation or encoding solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MilpStatus {
    Optimal,
    Infeasible,
    Timeout,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MilpError {
    BackendUnavailable(String),
    ModelBuildFailed(String),
    Unsupported(String),
}

/// Operations the native engine requires from an external MILP solver: model
/// construction, incremental bound updates, and solution/iteration-count
/// extraction. Implemented by a caller; this crate only defines the seam.
pub trait MilpBackend {
    /// Adds a real-valued variable named `name`, boxed by `[lb, ub]`;
    /// returns a backend-assigned handle.
    fn add_variable(&mut self, name: &str, lb: E, ub: E) -> Result<I, MilpError>;

    /// Adds a linear constraint `sum(coefficient * variable) <= / = / >= rhs`.
    fn add_linear_constraint(&mut self, addends: &[(E, I)], relation: MilpRelation, rhs: E) -> Result<(), MilpError>;

    /// Adds an indicator constraint: `indicator == active_value` implies the
    /// linear constraint holds (used to encode one piecewise-linear phase).
    fn add_indicator_constraint(
        &mut self,
        indicator: I,
        active_value: E,
        addends: &[(E, I)],
        relation: MilpRelation,
        rhs: E,
    ) -> Result<(), MilpError>;

    fn set_objective(&mut self, addends: &[(E, I)], minimize: bool) -> Result<(), MilpError>;

    fn set_time_limit(&mut self, seconds: f64) -> Result<(), MilpError>;

    fn solve(&mut self) -> Result<MilpStatus, MilpError>;

    fn extract_solution(&self) -> Result<HashMap<String, E>, MilpError>;

    fn iteration_count(&self) -> usize;

    /// Incrementally tightens an already-built model's variable bound
    /// without rebuilding it from scratch.
    fn update_bound(&mut self, variable: I, lb: Option<E>, ub: Option<E>) -> Result<(), MilpError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MilpRelation {
    Le,
    Eq,
    Ge,
}
