//! End-to-end scenarios driving the public `Query` / `Engine` surface (and,
//! for the LP-objective and incremental-solving cases, the lower-level
//! `Preprocessor` / `Tableau` surface directly, since `Engine` always solves
//! for feasibility and has no push/pop API of its own).

use pwla_verify::callback::{Callback, NoOpCallback};
use pwla_verify::engine::preprocessor::Preprocessor;
use pwla_verify::engine::query::Query;
use pwla_verify::equation::{Equation, EquationType, Tightening};
use pwla_verify::pl::disjunction::DisjunctionConstraint;
use pwla_verify::pl::relu::ReluConstraint;
use pwla_verify::pl::max::MaxConstraint;
use pwla_verify::pl::{PiecewiseLinearCaseSplit, PiecewiseLinearConstraint};
use pwla_verify::tableau::{SimplexStepOutcome, Tableau};
use pwla_verify::terminators::TimeOutTerminator;
use pwla_verify::{EngineOptions, Status};

fn run_to_convergence(tableau: &mut Tableau) -> SimplexStepOutcome {
    loop {
        match tableau.perform_simplex_step().expect("no malformed-basis error in a well-formed tableau") {
            SimplexStepOutcome::Pivoted => continue,
            other => return other,
        }
    }
}

fn solve(query: Query) -> (Status, pwla_verify::engine::Engine) {
    let options = EngineOptions::new();
    let mut engine = pwla_verify::engine::Engine::new(query, &options).unwrap();
    let mut callback = NoOpCallback::new(&options);
    let mut terminator = TimeOutTerminator::new(10);
    let status = engine.solve(&mut callback, &mut terminator);
    (status, engine)
}

/// n=6 variables, bounds lb(x0)=0, ub(x0)=1, lb(x5)=0.5, ub(x5)=1; equations
/// x0 - x1 = 0, x0 + x3 = 0, x2 + x4 - x5 = 0; constraints ReLU(x1, x2) and
/// ReLU(x3, x4).
fn two_relu_query(lb_x5: f64) -> Query {
    let mut query = Query::new(6);
    query.set_bounds(0, 0.0, 1.0);
    query.set_bounds(2, 0.0, f64::INFINITY);
    query.set_bounds(4, 0.0, f64::INFINITY);
    query.set_bounds(5, lb_x5, 1.0);
    query.add_equation(Equation::new(EquationType::Eq, 0.0).with_addend(1.0, 0).with_addend(-1.0, 1));
    query.add_equation(Equation::new(EquationType::Eq, 0.0).with_addend(1.0, 0).with_addend(1.0, 3));
    query.add_equation(
        Equation::new(EquationType::Eq, 0.0)
            .with_addend(1.0, 2)
            .with_addend(1.0, 4)
            .with_addend(-1.0, 5),
    );
    query.add_constraint(PiecewiseLinearConstraint::Relu(ReluConstraint::new(1, 2)));
    query.add_constraint(PiecewiseLinearConstraint::Relu(ReluConstraint::new(3, 4)));
    query
}

#[test]
fn scenario1_two_relu_network_is_sat_with_a_consistent_witness() {
    let (status, engine) = solve(two_relu_query(0.5));
    assert_eq!(status, Status::Sat);

    let solution = engine.solution().unwrap();
    let x0 = solution.value_of(0);
    let x1 = solution.value_of(1);
    let x2 = solution.value_of(2);
    let x3 = solution.value_of(3);
    let x4 = solution.value_of(4);
    let x5 = solution.value_of(5);

    assert!((x0 - x1).abs() < 1e-4);
    assert!((x0 + x3).abs() < 1e-4);
    assert!((x5 - (x2 + x4)).abs() < 1e-4);
    assert!(x0 >= -1e-6 && x0 <= 1.0 + 1e-6);
    assert!(x5 >= 0.5 - 1e-6 && x5 <= 1.0 + 1e-6);
    assert!((x2 - x1.max(0.0)).abs() < 1e-4);
    assert!((x4 - x3.max(0.0)).abs() < 1e-4);
}

#[test]
fn scenario2_two_relu_network_is_unsat_once_x5_lower_bound_exceeds_its_reachable_max() {
    // x0 in [0,1] forces x1 = x0 in [0,1] and x3 = -x0 in [-1,0], so
    // x2 = relu(x1) <= 1 and x4 = relu(x3) = 0; x5 = x2 + x4 can never reach 2.
    let (status, _) = solve(two_relu_query(2.0));
    assert_eq!(status, Status::Unsat);
}

/// 9 variables with auxiliary bounds; equations x0 - x1 + x6 = 0,
/// x0 + x3 + x7 = 0, x2 + x4 - x5 + x8 = 0, with aux vars x6=x7=x8=0;
/// constraints Max(x5, {x0, x2, x3}), Max(x3, {x0, x4}); additional bounds
/// lb(x0)=-inf, ub(x0)=0, lb(x1)=0.5, lb(x5)=0.5, ub(x5)=1.
#[test]
fn scenario3_max_infeasible() {
    let mut query = Query::new(9);
    query.set_bounds(0, f64::NEG_INFINITY, 0.0);
    query.set_bounds(1, 0.5, f64::INFINITY);
    query.set_bounds(5, 0.5, 1.0);
    query.set_bounds(6, 0.0, 0.0);
    query.set_bounds(7, 0.0, 0.0);
    query.set_bounds(8, 0.0, 0.0);
    query.add_equation(
        Equation::new(EquationType::Eq, 0.0)
            .with_addend(1.0, 0)
            .with_addend(-1.0, 1)
            .with_addend(1.0, 6),
    );
    query.add_equation(
        Equation::new(EquationType::Eq, 0.0)
            .with_addend(1.0, 0)
            .with_addend(1.0, 3)
            .with_addend(1.0, 7),
    );
    query.add_equation(
        Equation::new(EquationType::Eq, 0.0)
            .with_addend(1.0, 2)
            .with_addend(1.0, 4)
            .with_addend(-1.0, 5)
            .with_addend(1.0, 8),
    );
    query.add_constraint(PiecewiseLinearConstraint::Max(MaxConstraint::new(5, vec![0, 2, 3])));
    query.add_constraint(PiecewiseLinearConstraint::Max(MaxConstraint::new(3, vec![0, 4])));

    let (status, _) = solve(query);
    assert_eq!(status, Status::Unsat);
}

fn relu_as_disjunction(b: usize, f: usize) -> DisjunctionConstraint {
    let cases = vec![
        PiecewiseLinearCaseSplit::new()
            .with_tightening(Tightening::lb(b, 0.0))
            .with_equation(Equation::new(EquationType::Eq, 0.0).with_addend(1.0, f).with_addend(-1.0, b)),
        PiecewiseLinearCaseSplit::new()
            .with_tightening(Tightening::ub(b, 0.0))
            .with_tightening(Tightening::ub(f, 0.0)),
    ];
    DisjunctionConstraint::new(vec![b, f], cases)
}

/// Same linear structure as scenario 1 but the two ReLUs are encoded as
/// Disjunction constraints, each with two case splits (active-phase vs.
/// inactive-phase as a bound+equation pair). Expected: SAT, satisfying the
/// same ReLU-style equalities as scenario 1.
#[test]
fn scenario4_disjunction_encoding_of_the_same_network_is_sat() {
    let mut query = Query::new(6);
    query.set_bounds(0, 0.0, 1.0);
    query.set_bounds(2, 0.0, f64::INFINITY);
    query.set_bounds(4, 0.0, f64::INFINITY);
    query.set_bounds(5, 0.5, 1.0);
    query.add_equation(Equation::new(EquationType::Eq, 0.0).with_addend(1.0, 0).with_addend(-1.0, 1));
    query.add_equation(Equation::new(EquationType::Eq, 0.0).with_addend(1.0, 0).with_addend(1.0, 3));
    query.add_equation(
        Equation::new(EquationType::Eq, 0.0)
            .with_addend(1.0, 2)
            .with_addend(1.0, 4)
            .with_addend(-1.0, 5),
    );
    query.add_constraint(PiecewiseLinearConstraint::Disjunction(relu_as_disjunction(1, 2)));
    query.add_constraint(PiecewiseLinearConstraint::Disjunction(relu_as_disjunction(3, 4)));

    let (status, engine) = solve(query);
    assert_eq!(status, Status::Sat);

    let solution = engine.solution().unwrap();
    let x0 = solution.value_of(0);
    let x1 = solution.value_of(1);
    let x2 = solution.value_of(2);
    let x3 = solution.value_of(3);
    let x4 = solution.value_of(4);
    let x5 = solution.value_of(5);

    assert!((x0 - x1).abs() < 1e-4);
    assert!((x0 + x3).abs() < 1e-4);
    assert!((x5 - (x2 + x4)).abs() < 1e-4);
    assert!((x2 - x1.max(0.0)).abs() < 1e-4);
    assert!((x4 - x3.max(0.0)).abs() < 1e-4);
}

/// 4 variables each in [0,1]; x0 + x1 <= 0.5, x1 + x2 + x3 >= 0.5,
/// x1 - x2 >= 0, x1 - x3 >= 0. Minimising three different linear objectives
/// built directly over the preprocessed `Tableau`, since `Engine` only ever
/// solves for feasibility.
fn lp_query() -> Query {
    let mut query = Query::new(4);
    for v in 0..4 {
        query.set_bounds(v, 0.0, 1.0);
    }
    query.add_equation(Equation::new(EquationType::Le, 0.5).with_addend(1.0, 0).with_addend(1.0, 1));
    query.add_equation(
        Equation::new(EquationType::Ge, 0.5)
            .with_addend(1.0, 1)
            .with_addend(1.0, 2)
            .with_addend(1.0, 3),
    );
    query.add_equation(Equation::new(EquationType::Ge, 0.0).with_addend(1.0, 1).with_addend(-1.0, 2));
    query.add_equation(Equation::new(EquationType::Ge, 0.0).with_addend(1.0, 1).with_addend(-1.0, 3));
    query
}

/// Runs the feasibility phase to a vertex, then repeatedly re-primes the
/// given-cost row (its entries are indexed by a non-basic *position* that a
/// pivot can reassign to a different variable, so the row is recomputed from
/// the structural `addends` before every step rather than trusted across
/// pivots) and minimises to optimality.
fn minimize(tableau: &mut Tableau, addends: &[(usize, f64)]) -> f64 {
    tableau.toggle_optimization(false);
    assert_eq!(run_to_convergence(tableau), SimplexStepOutcome::OptimalOrFeasible);

    tableau.toggle_optimization(true);
    loop {
        tableau.compute_given_cost_function(addends.to_vec());
        match tableau.perform_simplex_step().unwrap() {
            SimplexStepOutcome::Pivoted => continue,
            SimplexStepOutcome::OptimalOrFeasible => break,
            SimplexStepOutcome::Infeasible => panic!("optimisation phase lost feasibility"),
        }
    }
    addends.iter().map(|&(v, c)| c * tableau.value_of(v)).sum()
}

#[test]
fn scenario5_lp_optimisation_over_three_objectives() {
    let prepared = Preprocessor::run(&lp_query()).unwrap();
    let mut tableau = prepared.tableau;
    let optimum = minimize(&mut tableau, &[(0, 1.0), (1, -1.0)]);
    assert!((optimum - (-0.5)).abs() < 1e-4, "x0 - x1 should minimise to -0.5, got {optimum}");

    let prepared = Preprocessor::run(&lp_query()).unwrap();
    let mut tableau = prepared.tableau;
    let optimum = minimize(&mut tableau, &[(0, -2.0), (1, 1.0), (3, 2.0)]);
    assert!((optimum - (-0.25)).abs() < 1e-4, "-2x0 + x1 + 2x3 should minimise to -0.25, got {optimum}");

    let prepared = Preprocessor::run(&lp_query()).unwrap();
    let mut tableau = prepared.tableau;
    // -2*x1 + x2 - 5: the tableau has no constant-term slot, so the -5 shift
    // is applied after reading the linear part back out.
    let linear_optimum = minimize(&mut tableau, &[(1, -2.0), (2, 1.0)]);
    assert!((linear_optimum - 5.0 - (-6.0)).abs() < 1e-4, "-2x1 + x2 - 5 should minimise to -6, got {}", linear_optimum - 5.0);
}

/// n=3, equations x0 + x1 = 0 and x1 + x2 = 0, bound -1 <= x1 <= 1: base
/// query is SAT. Adding x2 >= 2 yields UNSAT; backtracking and instead
/// adding x2 >= 0 yields SAT again. Driven directly via `BoundManager`'s
/// push/pop, since `Engine` has no incremental add-bound-and-resolve API.
#[test]
fn scenario6_incremental_solving_push_pop_restores_state_exactly() {
    let mut query = Query::new(3);
    query.set_bounds(1, -1.0, 1.0);
    query.add_equation(Equation::new(EquationType::Eq, 0.0).with_addend(1.0, 0).with_addend(1.0, 1));
    query.add_equation(Equation::new(EquationType::Eq, 0.0).with_addend(1.0, 1).with_addend(1.0, 2));

    let prepared = Preprocessor::run(&query).unwrap();
    let mut tableau = prepared.tableau;

    assert_eq!(run_to_convergence(&mut tableau), SimplexStepOutcome::OptimalOrFeasible);
    assert!(tableau.is_feasible());

    let lb_before = tableau.bounds().lower_bound(2);
    let ub_before = tableau.bounds().upper_bound(2);

    tableau.bounds_mut().push();
    tableau.bounds_mut().set_lower_bound(2, 2.0);
    tableau.toggle_optimization(false);
    tableau.compute_assignment();
    assert_eq!(run_to_convergence(&mut tableau), SimplexStepOutcome::Infeasible);

    tableau.bounds_mut().pop();
    tableau.toggle_optimization(false);
    tableau.compute_assignment();
    assert_eq!(tableau.bounds().lower_bound(2), lb_before);
    assert_eq!(tableau.bounds().upper_bound(2), ub_before);
    assert_eq!(run_to_convergence(&mut tableau), SimplexStepOutcome::OptimalOrFeasible);
    assert!(tableau.is_feasible());

    tableau.bounds_mut().push();
    tableau.bounds_mut().set_lower_bound(2, 0.0);
    tableau.toggle_optimization(false);
    tableau.compute_assignment();
    assert_eq!(run_to_convergence(&mut tableau), SimplexStepOutcome::OptimalOrFeasible);
    assert!(tableau.is_feasible());
}
