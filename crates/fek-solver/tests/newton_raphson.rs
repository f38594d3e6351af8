//! Newton-Raphson on springs, trusses and heat conduction.

mod common;

use approx::assert_relative_eq;
use common::{
    heat_triangle, single_spring, spring_chain, tip_displacement, two_bar_truss, BrokenSpringLaw,
    SofteningSpringLaw, TRUSS_A, TRUSS_E,
};
use fek_model::variables::{
    DISPLACEMENT_X, DISPLACEMENT_Y, POINT_LOAD_X, REACTION_FLUX, REACTION_X, REACTION_Y, TEMPERATURE,
};
use fek_model::{EntityKind, KernelError, ModelPart};
use fek_solver::{
    AndCriteria, ConvergenceCriteria, DirichletPolicy, DisplacementCriteria, NativeBackend, NewtonRaphsonSettings,
    NewtonRaphsonStrategy, OrCriteria, ResidualCriteria, StaticScheme,
};
use std::sync::Arc;

fn residual() -> Box<dyn ConvergenceCriteria> {
    Box::new(ResidualCriteria::new(1e-10, 1e-14).expect("Failed to create residual criterion"))
}

fn displacement() -> Box<dyn ConvergenceCriteria> {
    Box::new(DisplacementCriteria::new(1e-8, 1e-14).expect("Failed to create displacement criterion"))
}

fn strategy(
    criteria: Box<dyn ConvergenceCriteria>,
    settings: NewtonRaphsonSettings,
) -> NewtonRaphsonStrategy<StaticScheme> {
    NewtonRaphsonStrategy::new(StaticScheme::new(), Box::new(NativeBackend), criteria, settings)
        .expect("Failed to create strategy")
}

fn softening(stiffness: f64, load: f64) -> ModelPart {
    single_spring(Some(Arc::new(SofteningSpringLaw { stiffness })), stiffness, load)
}

#[test]
fn linear_spring_converges_in_one_iteration_on_the_residual() {
    let mut mp = single_spring(None, 100.0, 5.0);
    let mut nr = strategy(residual(), NewtonRaphsonSettings::default());

    let report = nr.solve(&mut mp).expect("Failed to solve");
    assert!(report.converged);
    assert_eq!(report.iterations, 1, "A linear problem is solved by the first update");
    // u = P / k
    assert_relative_eq!(tip_displacement(&mp), 0.05, epsilon = 1e-12);
}

#[test]
fn displacement_criterion_needs_a_second_iteration() {
    let mut mp = single_spring(None, 100.0, 5.0);
    let mut nr = strategy(displacement(), NewtonRaphsonSettings::default());

    let report = nr.solve(&mut mp).expect("Failed to solve");
    assert!(report.converged);
    // The first increment is the whole solution, so |Dx| / |u| = 1.
    assert_eq!(report.iterations, 2);
    assert_relative_eq!(tip_displacement(&mp), 0.05, epsilon = 1e-12);
}

#[test]
fn composite_criteria() {
    let mut mp = single_spring(None, 100.0, 5.0);
    let mut and = strategy(
        Box::new(AndCriteria::new(residual(), displacement())),
        NewtonRaphsonSettings::default(),
    );
    assert_eq!(and.solve(&mut mp).expect("Failed to solve").iterations, 2);

    let mut mp = single_spring(None, 100.0, 5.0);
    let mut or = strategy(
        Box::new(OrCriteria::new(residual(), displacement())),
        NewtonRaphsonSettings::default(),
    );
    assert_eq!(or.solve(&mut mp).expect("Failed to solve").iterations, 1);
}

#[test]
fn softening_spring_below_the_limit_load() {
    // k e exp(-e) = 0.2 has the root e = 0.259171...
    let mut mp = softening(1.0, 0.2);
    let mut nr = strategy(residual(), NewtonRaphsonSettings::default());

    let report = nr.solve(&mut mp).expect("Failed to solve");
    assert!(report.converged);
    assert!(report.iterations > 1 && report.iterations <= 6, "got {} iterations", report.iterations);
    let u = tip_displacement(&mp);
    assert_relative_eq!(u, 0.259_171_101_819, epsilon = 1e-8);
    assert_relative_eq!(u * (-u).exp(), 0.2, epsilon = 1e-10);
}

#[test]
fn modified_newton_converges_more_slowly() {
    let settings = NewtonRaphsonSettings {
        max_iteration: 60,
        keep_system_constant_during_iterations: true,
        ..Default::default()
    };
    let mut mp = softening(1.0, 0.2);
    let mut modified = strategy(residual(), settings);
    let slow = modified.solve(&mut mp).expect("Failed to solve");
    assert!(slow.converged);
    assert_relative_eq!(tip_displacement(&mp), 0.259_171_101_819, epsilon = 1e-8);

    let mut mp = softening(1.0, 0.2);
    let mut full = strategy(residual(), NewtonRaphsonSettings::default());
    let fast = full.solve(&mut mp).expect("Failed to solve");
    assert!(
        slow.iterations > 2 * fast.iterations,
        "modified Newton took {} iterations, full Newton {}",
        slow.iterations,
        fast.iterations
    );
}

#[test]
fn load_beyond_the_limit_point_does_not_converge() {
    // The spring carries at most 1/e = 0.368.
    let mut mp = softening(1.0, 0.4);
    let mut nr = strategy(residual(), NewtonRaphsonSettings::default());
    match nr.solve(&mut mp) {
        Ok(report) => {
            assert!(!report.converged);
            assert_eq!(report.iterations, 10);
        }
        Err(err) => assert!(err.is_retryable(), "unexpected error {:?}", err),
    }

    let settings = NewtonRaphsonSettings {
        fail_on_max_iterations: true,
        ..Default::default()
    };
    let mut mp = softening(1.0, 0.4);
    let mut nr = strategy(residual(), settings);
    let err = nr.solve(&mut mp).expect_err("Overloaded spring must fail");
    assert!(err.is_retryable(), "unexpected error {:?}", err);
}

#[test]
fn constitutive_failure_names_the_element() {
    let mut mp = single_spring(Some(Arc::new(BrokenSpringLaw)), 1.0, 1.0);
    let mut nr = strategy(residual(), NewtonRaphsonSettings::default());
    let err = nr.solve(&mut mp).expect_err("Broken law must fail");
    assert!(matches!(
        err,
        KernelError::ConstitutiveLaw {
            entity: EntityKind::Element,
            id: 1,
            ..
        }
    ));
    assert!(!err.is_retryable());
}

#[test]
fn load_steps_accumulate_on_a_spring_chain() {
    let mut mp = spring_chain(4, 10.0, 1.0);
    let mut nr = strategy(residual(), NewtonRaphsonSettings::default());

    nr.solve(&mut mp).expect("Failed to solve step 1");
    assert_relative_eq!(mp.node(5).unwrap().value(&DISPLACEMENT_X).unwrap(), 0.4, epsilon = 1e-12);

    // Doubling the load doubles the response of a linear chain.
    mp.node_mut(5).unwrap().set_value(&POINT_LOAD_X, 2.0).unwrap();
    let report = nr.solve(&mut mp).expect("Failed to solve step 2");
    assert!(report.converged);
    for id in 2..=5 {
        let expected = 0.2 * (id - 1) as f64;
        assert_relative_eq!(mp.node(id).unwrap().value(&DISPLACEMENT_X).unwrap(), expected, epsilon = 1e-12);
    }
}

#[test]
fn two_bar_truss_with_reactions() {
    let py = -10.0;
    let mut mp = two_bar_truss(0.0, py);
    let settings = NewtonRaphsonSettings {
        compute_reactions: true,
        builder_type: DirichletPolicy::Block,
        ..Default::default()
    };
    let mut nr = strategy(residual(), settings);
    let report = nr.solve(&mut mp).expect("Failed to solve");
    assert!(report.converged);

    // Both bars at 45 degrees: vertical stiffness 2 (EA/L) sin^2 = EA / sqrt(2).
    let apex = mp.node(3).unwrap();
    let expected_uy = py * 2f64.sqrt() / (TRUSS_E * TRUSS_A);
    assert_relative_eq!(apex.value(&DISPLACEMENT_Y).unwrap(), expected_uy, epsilon = 1e-12);
    assert_relative_eq!(apex.value(&DISPLACEMENT_X).unwrap(), 0.0, epsilon = 1e-12);

    // Each support takes half of the load, and the horizontal thrusts cancel.
    let left = mp.node(1).unwrap();
    let right = mp.node(2).unwrap();
    assert_relative_eq!(left.value(&REACTION_Y).unwrap(), -py / 2.0, epsilon = 1e-9);
    assert_relative_eq!(right.value(&REACTION_Y).unwrap(), -py / 2.0, epsilon = 1e-9);
    assert_relative_eq!(
        left.value(&REACTION_X).unwrap() + right.value(&REACTION_X).unwrap(),
        0.0,
        epsilon = 1e-9
    );
}

#[test]
fn steady_heat_flux_and_reaction() {
    let q = 4.0;
    let mut mp = heat_triangle(2.0, None, 0.0, 0.0, q, 1);
    let settings = NewtonRaphsonSettings {
        compute_reactions: true,
        ..Default::default()
    };
    let mut nr = strategy(residual(), settings);
    nr.solve(&mut mp).expect("Failed to solve");

    // Free block of K is the identity for k = 2 on the unit triangle.
    assert_relative_eq!(mp.node(2).unwrap().value(&TEMPERATURE).unwrap(), 0.0, epsilon = 1e-12);
    assert_relative_eq!(mp.node(3).unwrap().value(&TEMPERATURE).unwrap(), q, epsilon = 1e-12);
    assert_relative_eq!(mp.node(1).unwrap().value(&REACTION_FLUX).unwrap(), -q, epsilon = 1e-12);
}

#[test]
fn move_mesh_follows_the_displacement() {
    let settings = NewtonRaphsonSettings {
        move_mesh_flag: true,
        ..Default::default()
    };
    let mut mp = single_spring(None, 100.0, 5.0);
    let mut nr = strategy(residual(), settings);
    nr.solve(&mut mp).expect("Failed to solve");

    let tip = mp.node(2).unwrap();
    assert_relative_eq!(tip.coordinates[0], 1.05, epsilon = 1e-12);
    assert_eq!(tip.initial_coordinates[0], 1.0);
}

#[test]
fn reformed_dof_set_picks_up_new_fixities() {
    let settings = NewtonRaphsonSettings {
        reform_dofs_at_each_step: true,
        ..Default::default()
    };
    let mut mp = spring_chain(2, 1.0, 1.0);
    let mut nr = strategy(residual(), settings);
    nr.solve(&mut mp).expect("Failed to solve step 1");
    assert_eq!(nr.builder_and_solver().free_dof_count(), 0, "cleared after the step");
    assert_relative_eq!(mp.node(3).unwrap().value(&DISPLACEMENT_X).unwrap(), 2.0, epsilon = 1e-12);

    // Clamp the middle node at zero: the tip spring alone carries the load.
    let middle = mp.node_mut(2).unwrap();
    middle.set_value(&DISPLACEMENT_X, 0.0).unwrap();
    middle.fix(&DISPLACEMENT_X).unwrap();
    nr.solve(&mut mp).expect("Failed to solve step 2");
    assert_eq!(mp.node(2).unwrap().value(&DISPLACEMENT_X).unwrap(), 0.0);
    assert_relative_eq!(mp.node(3).unwrap().value(&DISPLACEMENT_X).unwrap(), 1.0, epsilon = 1e-12);
}

#[test]
fn settings_from_json_drive_the_strategy() {
    let settings = NewtonRaphsonSettings::from_json(
        r#"{
            "name": "newton_raphson_strategy",
            "max_iteration": 3,
            "compute_reactions": true,
            "builder_type": "block"
        }"#,
    )
    .expect("Failed to parse settings");
    let mut mp = single_spring(None, 50.0, 2.0);
    let mut nr = strategy(residual(), settings);
    nr.solve(&mut mp).expect("Failed to solve");
    assert_eq!(nr.builder_and_solver().policy(), DirichletPolicy::Block);
    assert_relative_eq!(mp.node(1).unwrap().value(&REACTION_X).unwrap(), -2.0, epsilon = 1e-12);
}
