//! Divan benchmarks over this crate's own query-solving path, in place of
//! the teacher's netlib-dataset loaders (not applicable here: there is no
//! netlib-format bound-tightened-network corpus).

use pwla_verify::callback::{Callback, NoOpCallback};
use pwla_verify::engine::preprocessor::Preprocessor;
use pwla_verify::engine::query::Query;
use pwla_verify::engine::Engine;
use pwla_verify::equation::{Equation, EquationType};
use pwla_verify::pl::relu::ReluConstraint;
use pwla_verify::pl::PiecewiseLinearConstraint;
use pwla_verify::terminators::TimeOutTerminator;
use pwla_verify::EngineOptions;

fn main() {
    divan::main();
}

/// A chain of `n` ReLU layers, each one variable wide: `x0` is a free input
/// in `[-1, 1]`, and every subsequent pair `(b_i, f_i)` is wired to the
/// previous layer's output by `b_i - f_{i-1} = 0` with `f_i = relu(b_i)`.
/// Deterministic and dependency-free, unlike the teacher's netlib/mtx
/// loaders, since no corpus of this kind ships with this crate.
fn relu_chain_query(n: usize) -> Query {
    let num_variables = 2 * n + 1;
    let mut query = Query::new(num_variables);
    query.set_bounds(0, -1.0, 1.0);
    for i in 0..n {
        let b = 2 * i + 1;
        let f = 2 * i + 2;
        let prev = 2 * i;
        query.add_equation(Equation::new(EquationType::Eq, 0.0).with_addend(1.0, b).with_addend(-1.0, prev));
        query.set_bounds(f, 0.0, f64::INFINITY);
        query.add_constraint(PiecewiseLinearConstraint::Relu(ReluConstraint::new(b, f)));
    }
    query
}

#[divan::bench(args = [4, 16, 64])]
fn preprocess_relu_chain(n: usize) {
    let query = relu_chain_query(n);
    Preprocessor::run(&query).expect("relu chain query preprocesses cleanly");
}

#[divan::bench(args = [4, 16, 64])]
fn solve_relu_chain_to_sat(n: usize) {
    let query = relu_chain_query(n);
    let options = EngineOptions::new();
    let mut engine = Engine::new(query, &options).expect("engine construction succeeds");
    let mut callback = NoOpCallback::new(&options);
    let mut terminator = TimeOutTerminator::new(30);
    engine.solve(&mut callback, &mut terminator);
}

/// Dense tridiagonal-style LP feasibility region (`x_i - x_{i+1} <= 1`,
/// `x_{i+1} - x_i <= 1` for consecutive pairs, every variable in `[0, 10]`)
/// sized by `n`, exercised purely to stress the LU factorisation and
/// simplex-pivot path independent of any piecewise-linear constraint.
fn banded_lp_query(n: usize) -> Query {
    let mut query = Query::new(n);
    for v in 0..n {
        query.set_bounds(v, 0.0, 10.0);
    }
    for i in 0..n - 1 {
        query.add_equation(Equation::new(EquationType::Le, 1.0).with_addend(1.0, i).with_addend(-1.0, i + 1));
        query.add_equation(Equation::new(EquationType::Le, 1.0).with_addend(1.0, i + 1).with_addend(-1.0, i));
    }
    query
}

#[divan::bench(args = [8, 32, 128])]
fn preprocess_and_factorize_banded_lp(n: usize) {
    let query = banded_lp_query(n);
    Preprocessor::run(&query).expect("banded LP preprocesses cleanly");
}
