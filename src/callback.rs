use macros::build_option_enum;

use crate::stats::Statistics;

/// Hook invoked once per outer-loop iteration for logging, monitoring, or
/// early stopping.
pub trait Callback {
    /// Creates a new callback from solver options.
    fn new(options: &crate::EngineOptions) -> Self
    where
        Self: Sized;

    /// Called at the end of each outer-loop iteration with the running statistics.
    fn call(&mut self, stats: &Statistics);
}

/// A callback that does nothing. Use when no per-iteration output is needed.
pub struct NoOpCallback {}

impl Callback for NoOpCallback {
    fn new(_options: &crate::EngineOptions) -> Self {
        Self {}
    }

    fn call(&mut self, _stats: &Statistics) {
        // Do nothing
    }
}

/// Prints the running pivot/split/restoration statistics to stdout each iteration.
pub struct ConvergenceOutput {}

impl Callback for ConvergenceOutput {
    fn new(_options: &crate::EngineOptions) -> Self {
        Self {}
    }

    fn call(&mut self, stats: &Statistics) {
        println!("{}", stats);
    }
}

build_option_enum!(
    trait_ = Callback,
    name = "Callbacks",
    variants = (NoOpCallback, ConvergenceOutput),
    new_arguments = (&crate::EngineOptions,),
    doc_header = "An enum representing different per-iteration callbacks for the solver. Each variant corresponds to a specific callback strategy."
);
