//! Global assembly: DOF numbering, sparsity, Dirichlet policies, reactions
//! and error reporting.

mod common;

use approx::assert_relative_eq;
use common::{heat_triangle, spring_chain};
use fek_model::variables::{DISPLACEMENT_X, REACTION_X, TEMPERATURE};
use fek_model::{
    Element, Entity, EntityContext, EntityKind, Geometry, GeometryFamily, KernelError, ModelPart, Properties,
    Result, Variable,
};
use fek_model::properties::STIFFNESS;
use fek_solver::{
    BuilderAndSolver, DirichletPolicy, GlobalSystem, LaplacianElement, NativeBackend, Scheme, SpringElement,
    StaticScheme,
};
use nalgebra::{DMatrix, DVector};
use std::collections::BTreeMap;

fn set_up(mp: &mut ModelPart, policy: DirichletPolicy) -> (BuilderAndSolver, GlobalSystem) {
    let scheme = StaticScheme::new();
    let mut builder = BuilderAndSolver::new(policy, Box::new(NativeBackend));
    let mut system = GlobalSystem::empty();
    builder.set_up_dof_set(&scheme, mp).expect("Failed to collect DOFs");
    builder.set_up_system(mp).expect("Failed to number equations");
    builder
        .resize_and_initialize_vectors(&scheme, &mut system, mp)
        .expect("Failed to size the system");
    (builder, system)
}

#[test]
fn spring_chain_matches_hand_assembly() {
    // Three springs k = 2 in series, node 1 fixed, P = 5 at node 4.
    let mut mp = spring_chain(3, 2.0, 5.0);
    let (builder, mut system) = set_up(&mut mp, DirichletPolicy::Elimination);

    assert_eq!(builder.free_dof_count(), 3);
    assert_eq!(builder.total_dof_count(), 4);
    assert_eq!(builder.equation_system_size(), 3);
    // Free DOFs come first in node id order, the fixed one last.
    assert_eq!(mp.node(2).unwrap().equation_id(&DISPLACEMENT_X).unwrap(), 0);
    assert_eq!(mp.node(4).unwrap().equation_id(&DISPLACEMENT_X).unwrap(), 2);
    assert_eq!(mp.node(1).unwrap().equation_id(&DISPLACEMENT_X).unwrap(), 3);

    // Tridiagonal pattern: 3 diagonal + 4 off-diagonal entries.
    assert_eq!(system.a.nnz(), 7);

    let scheme = StaticScheme::new();
    builder.build(&scheme, &mp, &mut system).expect("Failed to build");
    let expected = DMatrix::from_row_slice(3, 3, &[4.0, -2.0, 0.0, -2.0, 4.0, -2.0, 0.0, -2.0, 2.0]);
    assert_relative_eq!(system.dense_lhs(), expected, epsilon = 1e-12);
    assert_relative_eq!(system.b, DVector::from_vec(vec![0.0, 0.0, 5.0]), epsilon = 1e-12);

    builder.system_solve(&mut system).expect("Failed to solve");
    // Springs in series: u_i = i * P / k.
    assert_relative_eq!(system.dx, DVector::from_vec(vec![2.5, 5.0, 7.5]), epsilon = 1e-10);
}

#[test]
fn equation_numbering_is_repeatable() {
    let mut mp = spring_chain(6, 1.0, 1.0);
    let ids = |mp: &ModelPart| -> Vec<usize> {
        mp.nodes()
            .iter()
            .map(|n| n.equation_id(&DISPLACEMENT_X).unwrap())
            .collect()
    };

    let (first, _) = set_up(&mut mp, DirichletPolicy::Elimination);
    let before = ids(&mp);
    let (second, _) = set_up(&mut mp, DirichletPolicy::Elimination);
    assert_eq!(ids(&mp), before);
    assert_eq!(first.free_dof_count(), second.free_dof_count());

    // A fresh model built the same way numbers identically.
    let mut again = spring_chain(6, 1.0, 1.0);
    set_up(&mut again, DirichletPolicy::Elimination);
    assert_eq!(ids(&again), before);
}

/// Four free nodes; spring 1 joins nodes 1-2 (k = 2), spring 2 joins
/// nodes 3-4 (k = 5). Either spring can be left out.
fn two_separate_springs(first: bool, second: bool) -> ModelPart {
    let mut mp = ModelPart::new("Pairs", 1);
    mp.add_nodal_solution_step_variable(&DISPLACEMENT_X);
    let nodes: Vec<_> = [0.0, 1.0, 3.0, 4.5]
        .iter()
        .enumerate()
        .map(|(i, &x)| mp.create_node(i + 1, x, 0.0, 0.0).unwrap())
        .collect();
    mp.add_dof(&DISPLACEMENT_X);
    for (id, u) in [(1, 0.1), (2, 0.3), (3, -0.2), (4, 0.5)] {
        mp.node_mut(id).unwrap().set_value(&DISPLACEMENT_X, u).unwrap();
    }
    for (id, k, pair, wanted) in [(1, 2.0, [nodes[0], nodes[1]], first), (2, 5.0, [nodes[2], nodes[3]], second)] {
        if !wanted {
            continue;
        }
        let properties = mp.add_properties(Properties::new(id).with(STIFFNESS, k));
        let geometry = Geometry::new(GeometryFamily::Line2, pair.to_vec()).unwrap();
        mp.add_element(Box::new(SpringElement::new(id, geometry, properties, &DISPLACEMENT_X).unwrap()))
            .unwrap();
    }
    mp
}

/// Assembled `A` and `b` keyed by node id instead of equation id.
fn assembled_by_node(mp: &mut ModelPart) -> (BTreeMap<(usize, usize), f64>, BTreeMap<usize, f64>) {
    let (builder, mut system) = set_up(mp, DirichletPolicy::Elimination);
    builder.build(&StaticScheme::new(), mp, &mut system).unwrap();
    let dense = system.dense_lhs();
    let numbered: Vec<(usize, usize)> = mp
        .nodes()
        .iter()
        .filter_map(|n| n.equation_id(&DISPLACEMENT_X).ok().map(|eq| (n.id, eq)))
        .collect();

    let mut a = BTreeMap::new();
    let mut b = BTreeMap::new();
    for &(row_node, i) in &numbered {
        b.insert(row_node, system.b[i]);
        for &(col_node, j) in &numbered {
            a.insert((row_node, col_node), dense[(i, j)]);
        }
    }
    (a, b)
}

#[test]
fn assembly_is_additive_over_disjoint_entities() {
    let (a_both, b_both) = assembled_by_node(&mut two_separate_springs(true, true));
    let (a_first, b_first) = assembled_by_node(&mut two_separate_springs(true, false));
    let (a_second, b_second) = assembled_by_node(&mut two_separate_springs(false, true));

    assert_eq!(b_both.len(), 4);
    for (key, &value) in &a_both {
        let sum = a_first.get(key).copied().unwrap_or(0.0) + a_second.get(key).copied().unwrap_or(0.0);
        assert_relative_eq!(value, sum, epsilon = 1e-14);
    }
    for (node, &value) in &b_both {
        let sum = b_first.get(node).copied().unwrap_or(0.0) + b_second.get(node).copied().unwrap_or(0.0);
        assert_relative_eq!(value, sum, epsilon = 1e-14);
    }
    // Spring 1 pulls node 1 with k (u2 - u1) = 0.4.
    assert_relative_eq!(b_both[&1], 0.4, epsilon = 1e-14);
    assert_relative_eq!(a_both[&(3, 4)], -5.0, epsilon = 1e-14);
}

#[test]
fn lhs_only_build_matches_the_full_build_and_leaves_b_alone() {
    let mut mp = spring_chain(4, 3.0, 2.0);
    let (builder, mut full) = set_up(&mut mp, DirichletPolicy::Block);
    let scheme = StaticScheme::new();
    builder.build(&scheme, &mp, &mut full).expect("Failed to build");

    let mut lhs_only = full.clone();
    lhs_only.a.values_mut().fill(-1.0);
    lhs_only.b.fill(7.0);
    builder
        .build_lhs(&scheme, &mp, &mut lhs_only)
        .expect("Failed to build the LHS");
    assert_eq!(lhs_only.a.values(), full.a.values());
    assert!(lhs_only.b.iter().all(|&v| v == 7.0));
}

#[test]
fn check_rejects_bad_entities_before_any_build() {
    let mut mp = heat_triangle(1.0, None, 0.0, 0.0, 1.0, 1);
    StaticScheme::new().check(&mp).expect("A valid model must pass the check");

    let index = mp.create_node(4, 1.0, 1.0, 0.0).unwrap();
    mp.node_mut(4).unwrap().add_dof(&TEMPERATURE);
    let properties = mp.properties(1).unwrap();
    let nodes = vec![mp.node_index(2).unwrap(), mp.node_index(3).unwrap(), index];
    let geometry = Geometry::new(GeometryFamily::Triangle3, nodes).unwrap();
    mp.add_element(Box::new(LaplacianElement::new(2, geometry, properties).unwrap()))
        .unwrap();
    let err = StaticScheme::new().check(&mp).expect_err("Inverted element must fail the check");
    assert!(matches!(
        err,
        KernelError::Geometry {
            entity: EntityKind::Element,
            id: 2,
            ..
        }
    ));

    let mut mp = spring_chain(2, 1.0, 1.0);
    let nodes = vec![mp.node_index(2).unwrap(), mp.node_index(3).unwrap()];
    let geometry = Geometry::new(GeometryFamily::Line2, nodes).unwrap();
    let bare = std::sync::Arc::new(Properties::new(9));
    mp.add_element(Box::new(SpringElement::new(5, geometry, bare, &DISPLACEMENT_X).unwrap()))
        .unwrap();
    let err = StaticScheme::new().check(&mp).expect_err("Spring without stiffness must fail the check");
    assert!(matches!(err, KernelError::ConstitutiveLaw { id: 5, .. }));
}

#[test]
fn block_policy_keeps_fixed_rows_as_identity() {
    let mut mp = spring_chain(3, 2.0, 5.0);
    let (builder, mut system) = set_up(&mut mp, DirichletPolicy::Block);
    assert_eq!(builder.equation_system_size(), 4);

    let scheme = StaticScheme::new();
    builder.build(&scheme, &mp, &mut system).expect("Failed to build");
    // Before Dirichlet the fixed DOF couples to node 2.
    assert_relative_eq!(system.dense_lhs()[(3, 0)], -2.0, epsilon = 1e-12);

    builder.apply_dirichlet_conditions(&mut system);
    let once = system.clone();
    builder.apply_dirichlet_conditions(&mut system);
    assert_eq!(system.a.values(), once.a.values(), "Dirichlet application must be idempotent");
    assert_eq!(system.b, once.b);

    let dense = system.dense_lhs();
    assert_eq!(dense[(3, 3)], 1.0);
    assert_eq!(dense[(3, 0)], 0.0);
    assert_eq!(dense[(0, 3)], 0.0);
    assert_eq!(system.b[3], 0.0);

    builder.system_solve(&mut system).expect("Failed to solve");
    assert_relative_eq!(system.dx, DVector::from_vec(vec![2.5, 5.0, 7.5, 0.0]), epsilon = 1e-10);
}

#[test]
fn block_and_elimination_give_the_same_free_solution() {
    let scheme = StaticScheme::new();
    let mut solutions = Vec::new();
    for policy in [DirichletPolicy::Elimination, DirichletPolicy::Block] {
        let mut mp = heat_triangle(3.0, None, 10.0, 10.0, 6.0, 1);
        let (builder, mut system) = set_up(&mut mp, policy);
        builder
            .build_and_solve(&scheme, &mp, &mut system)
            .expect("Failed to build and solve");
        solutions.push(system.dx.rows(0, builder.free_dof_count()).into_owned());
    }
    assert_relative_eq!(solutions[0], solutions[1], epsilon = 1e-12);
}

#[test]
fn reactions_balance_the_applied_load() {
    let mut mp = spring_chain(3, 2.0, 5.0);
    let (builder, mut system) = set_up(&mut mp, DirichletPolicy::Elimination);
    let scheme = StaticScheme::new();
    builder
        .build_and_solve(&scheme, &mp, &mut system)
        .expect("Failed to build and solve");
    for (id, dx) in [(2, system.dx[0]), (3, system.dx[1]), (4, system.dx[2])] {
        *mp.node_mut(id).unwrap().value_mut(&DISPLACEMENT_X).unwrap() += dx;
    }

    builder
        .calculate_reactions(&scheme, &mut mp)
        .expect("Failed to compute reactions");
    // The support carries the full tip load in the opposite direction.
    assert_relative_eq!(mp.node(1).unwrap().value(&REACTION_X).unwrap(), -5.0, epsilon = 1e-10);
}

#[test]
fn assembly_does_not_depend_on_thread_count() {
    let build_with = |threads: usize| {
        let mut mp = spring_chain(200, 3.0, 1.0);
        for (i, node) in mp.nodes_mut().iter_mut().enumerate() {
            if !node.is_fixed(&DISPLACEMENT_X) {
                node.set_value(&DISPLACEMENT_X, (i as f64 * 0.37).sin()).unwrap();
            }
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .expect("Failed to build thread pool");
        pool.install(|| {
            let (builder, mut system) = set_up(&mut mp, DirichletPolicy::Elimination);
            builder
                .build(&StaticScheme::new(), &mp, &mut system)
                .expect("Failed to build");
            system
        })
    };

    let serial = build_with(1);
    let parallel = build_with(4);
    assert_eq!(serial.a.values(), parallel.a.values(), "A must be bitwise identical");
    assert_eq!(serial.b, parallel.b, "b must be bitwise identical");
}

#[test]
fn inverted_element_aborts_the_build_without_touching_the_system() {
    let mut mp = heat_triangle(1.0, None, 0.0, 0.0, 1.0, 1);
    let index = mp.create_node(4, 1.0, 1.0, 0.0).unwrap();
    mp.node_mut(4).unwrap().add_dof(&TEMPERATURE);
    let properties = mp.properties(1).unwrap();
    // (1,0) -> (0,1) -> (1,1) is clockwise.
    let nodes = vec![mp.node_index(2).unwrap(), mp.node_index(3).unwrap(), index];
    let geometry = Geometry::new(GeometryFamily::Triangle3, nodes).unwrap();
    mp.add_element(Box::new(LaplacianElement::new(2, geometry, properties).unwrap()))
        .unwrap();

    let (builder, mut system) = set_up(&mut mp, DirichletPolicy::Elimination);
    system.a.values_mut().fill(7.0);
    system.b.fill(7.0);

    let err = builder
        .build(&StaticScheme::new(), &mp, &mut system)
        .expect_err("Inverted element must fail the build");
    assert!(matches!(
        err,
        KernelError::Geometry {
            entity: EntityKind::Element,
            id: 2,
            ..
        }
    ));
    assert!(system.a.values().iter().all(|&v| v == 7.0), "A must be untouched");
    assert!(system.b.iter().all(|&v| v == 7.0), "b must be untouched");
}

/// Reports two DOFs but returns a 1x1 local system.
#[derive(Debug)]
struct MisSizedElement {
    geometry: Geometry,
    properties: Properties,
}

static MIS_SIZED_DOFS: [&Variable; 1] = [&DISPLACEMENT_X];

impl Entity for MisSizedElement {
    fn id(&self) -> usize {
        99
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Element
    }

    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn dof_variables(&self) -> &[&'static Variable] {
        &MIS_SIZED_DOFS
    }

    fn calculate_local_system(
        &self,
        _ctx: &EntityContext,
        lhs: &mut DMatrix<f64>,
        rhs: &mut DVector<f64>,
    ) -> Result<()> {
        *lhs = DMatrix::identity(1, 1);
        *rhs = DVector::zeros(1);
        Ok(())
    }
}

impl Element for MisSizedElement {}

#[test]
fn mis_sized_local_system_is_rejected() {
    let mut mp = spring_chain(2, 1.0, 1.0);
    let nodes = vec![mp.node_index(2).unwrap(), mp.node_index(3).unwrap()];
    mp.add_element(Box::new(MisSizedElement {
        geometry: Geometry::new(GeometryFamily::Line2, nodes).unwrap(),
        properties: Properties::new(0),
    }))
    .unwrap();

    let (builder, mut system) = set_up(&mut mp, DirichletPolicy::Elimination);
    let err = builder
        .build(&StaticScheme::new(), &mp, &mut system)
        .expect_err("Mis-sized local system must be rejected");
    assert_eq!(
        err,
        KernelError::InconsistentLocalSystem {
            entity: EntityKind::Element,
            id: 99,
            ids: 2,
            rows: 1,
            cols: 1,
        }
    );
}

#[test]
fn building_before_resizing_is_a_configuration_error() {
    let mut mp = spring_chain(2, 1.0, 1.0);
    let scheme = StaticScheme::new();
    let mut builder = BuilderAndSolver::new(DirichletPolicy::Elimination, Box::new(NativeBackend));
    builder.set_up_dof_set(&scheme, &mp).unwrap();
    builder.set_up_system(&mut mp).unwrap();

    let mut system = GlobalSystem::empty();
    let err = builder.build(&scheme, &mp, &mut system).unwrap_err();
    assert!(matches!(err, KernelError::Configuration(_)));
}
