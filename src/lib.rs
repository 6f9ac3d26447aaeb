//! Decision procedure for SAT/UNSAT verification queries over piecewise-linear
//! feed-forward networks augmented with linear constraints.
//!
//! The crate is organised around three coupled subsystems wired together by
//! [`engine`]: a revised-simplex LP engine over a sparse LU-factorised basis
//! ([`tableau`]), a DPLL(T)-style search core ([`search`]) that branches on
//! piecewise-linear activations ([`pl`]), and a network-level bound-tightening
//! pipeline ([`nlr`]) that runs DeepPoly-style symbolic propagation between
//! subproblems.

use std::any::Any;
use std::str::FromStr;

use dyn_clone::DynClone;
use macros::build_options;

pub mod bound;
pub mod callback;
pub mod engine;
pub mod equation;
pub mod error;
pub mod linalg;
pub mod nlr;
pub mod pl;
pub mod search;
pub mod stats;
pub mod tableau;
pub mod terminators;

pub use error::EngineError;

/// Floating point element type used throughout the numeric core.
pub type E = f64;
/// Index type used for variables, rows, and matrix indices.
pub type I = usize;

/// Marker trait for values that can be stored in the dynamic option registry.
pub trait OptionTrait: Any + Sync + Send + DynClone {}
impl OptionTrait for &'static str {}
impl OptionTrait for String {}
impl OptionTrait for bool {}
impl OptionTrait for usize {}
impl OptionTrait for u8 {}
impl OptionTrait for u16 {}
impl OptionTrait for u32 {}
impl OptionTrait for u64 {}
impl OptionTrait for i8 {}
impl OptionTrait for i16 {}
impl OptionTrait for i32 {}
impl OptionTrait for i64 {}
impl OptionTrait for f32 {}
impl OptionTrait for f64 {}

impl Clone for Box<dyn OptionTrait> {
    fn clone(&self) -> Self {
        dyn_clone::clone_box(&**self)
    }
}

/// Selects between the native revised-simplex engine and the external MILP back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LpSolverType {
    #[default]
    Native,
    ExternalMilp,
}
impl OptionTrait for LpSolverType {}
impl FromStr for LpSolverType {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Native" => Ok(Self::Native),
            "ExternalMilp" => Ok(Self::ExternalMilp),
            _ => Err("invalid LpSolverType"),
        }
    }
}

/// Selects the strength of symbolic bound propagation run by the NLR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymbolicBoundTighteningType {
    None,
    Interval,
    #[default]
    DeepPoly,
}
impl OptionTrait for SymbolicBoundTighteningType {}
impl FromStr for SymbolicBoundTighteningType {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(Self::None),
            "Interval" => Ok(Self::Interval),
            "DeepPoly" => Ok(Self::DeepPoly),
            _ => Err("invalid SymbolicBoundTighteningType"),
        }
    }
}

/// Selects how the external MILP back-end (when selected) sources its bound tightening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MilpBoundTighteningType {
    #[default]
    None,
    LpRelaxation,
    LpRelaxationIncremental,
    MilpEncoding,
    MilpEncodingIncremental,
    IterativePropagation,
    BackwardAnalysisOnce,
    BackwardAnalysisConverge,
}
impl OptionTrait for MilpBoundTighteningType {}
impl FromStr for MilpBoundTighteningType {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(Self::None),
            "LpRelaxation" => Ok(Self::LpRelaxation),
            "LpRelaxationIncremental" => Ok(Self::LpRelaxationIncremental),
            "MilpEncoding" => Ok(Self::MilpEncoding),
            "MilpEncodingIncremental" => Ok(Self::MilpEncodingIncremental),
            "IterativePropagation" => Ok(Self::IterativePropagation),
            "BackwardAnalysisOnce" => Ok(Self::BackwardAnalysisOnce),
            "BackwardAnalysisConverge" => Ok(Self::BackwardAnalysisConverge),
            _ => Err("invalid MilpBoundTighteningType"),
        }
    }
}

/// Selects the heuristic used by the search core to pick the next branching candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DivideStrategy {
    #[default]
    Auto,
    PseudoImpact,
    BaBSR,
    Polarity,
    EarliestReLU,
    LargestInterval,
}
impl OptionTrait for DivideStrategy {}
impl FromStr for DivideStrategy {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Auto" => Ok(Self::Auto),
            "PseudoImpact" => Ok(Self::PseudoImpact),
            "BaBSR" => Ok(Self::BaBSR),
            "Polarity" => Ok(Self::Polarity),
            "EarliestReLU" => Ok(Self::EarliestReLU),
            "LargestInterval" => Ok(Self::LargestInterval),
            _ => Err("invalid DivideStrategy"),
        }
    }
}

/// Tangent-point policy used by DeepPoly's envelopes for monotone nonlinear
/// activations (Sigmoid, Exponential). Exposed as configuration rather than
/// hardcoded, per the open question in the design notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TangentPointPolicy {
    #[default]
    Midpoint,
    ShiftedMidpoint,
}
impl OptionTrait for TangentPointPolicy {}
impl FromStr for TangentPointPolicy {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Midpoint" => Ok(Self::Midpoint),
            "ShiftedMidpoint" => Ok(Self::ShiftedMidpoint),
            _ => Err("invalid TangentPointPolicy"),
        }
    }
}

build_options!(name = EngineOptions, registry_name = OPTION_REGISTRY);

// `build_options!` always emits a struct literally named `Options` regardless
// of its `name` argument; alias it to the name used throughout the rest of
// the crate and its docs.
pub type EngineOptions = Options;

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

/// Final status of a solver run, surfaced by the engine's outer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The outer loop has not yet reached a terminal state.
    InProgress,
    /// A satisfying assignment was found.
    Sat,
    /// The split stack was exhausted without finding a satisfying assignment.
    Unsat,
    /// The configured time limit elapsed before a terminal state was reached.
    Timeout,
    /// A cooperative cancellation request was observed.
    QuitRequested,
    /// A fatal, unrecoverable error terminated the loop.
    Error,
}
