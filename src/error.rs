//! Error model for the engine. [`EngineError`] tags the seven error kinds
//! named in the design; [`problemo::Problem`] is the ambient propagation type
//! at API boundaries that need to compose errors raised by more than one
//! subsystem (LU factorisation, bound manager, NLR, search core).

use derive_more::{Display, Error};

/// Tagged error kinds. The first three are recoverable by the outer loop
/// (`MalformedBasis` by precision restoration, `InfeasibleQuery` by popping
/// the split stack, `VariableOutOfBoundDuringOptimisation` by suspending the
/// objective); the rest are fatal.
#[derive(Debug, Display, Error, Clone, PartialEq)]
pub enum EngineError {
    #[display("basis malformed: {_0}")]
    MalformedBasis(#[error(not(source))] String),

    #[display("query is infeasible: {_0}")]
    InfeasibleQuery(#[error(not(source))] String),

    #[display("variable out of bounds during optimisation: {_0}")]
    VariableOutOfBoundDuringOptimisation(#[error(not(source))] String),

    #[display("feature not supported: {_0}")]
    FeatureNotSupported(#[error(not(source))] String),

    #[display("variable has no finite bound: {_0}")]
    UnboundedVariable(#[error(not(source))] String),

    #[display("network-level reasoner unavailable: {_0}")]
    NetworkLevelReasonerUnavailable(#[error(not(source))] String),

    #[display("unknown error: {_0}")]
    UnknownError(#[error(not(source))] String),
}

impl EngineError {
    /// Whether the main loop should attempt local recovery (restoration /
    /// split-pop / objective-suspension) rather than terminating with
    /// [`crate::Status::Error`].
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::MalformedBasis(_)
                | EngineError::InfeasibleQuery(_)
                | EngineError::VariableOutOfBoundDuringOptimisation(_)
        )
    }
}
