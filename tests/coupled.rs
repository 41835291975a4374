use approx::*;
use std::sync::Arc;
use sweep::mesh::{CoreMesh, CoreMeshBuilder};
use sweep::quadrature::types::QuadratureType;
use sweep::quadrature::AngularQuadrature;
use sweep::solver::{EigenOptions, EigenSolver};
use sweep::sweeper::{
    create_sweeper, CouplingOptions, PlaneSweeper2D3D, Sweeper, SweeperKind, SweeperOptions,
    TransportSweeper,
};
use sweep::types::{BoundaryType, Normal, Position, Surface};
use sweep::xs_mesh::{Material, MaterialLib, ScatteringMatrix};

fn options(coupling: CouplingOptions) -> SweeperOptions {
    let mut options = SweeperOptions::default();
    options
        .set_kind(SweeperKind::TwoDThreeD)
        .set_quadrature(QuadratureType::LevelSymmetric { order: 4 })
        .set_ray_spacing(0.05)
        .set_n_inner(10)
        .set_coupling(coupling);
    options
}

fn lib() -> Arc<MaterialLib> {
    let fuel = Material::new(
        vec![0.5],
        vec![0.6],
        vec![0.0],
        vec![1.0],
        ScatteringMatrix::new(1, vec![0.5]).unwrap(),
    )
    .unwrap();
    Arc::new(MaterialLib::new(vec![fuel]).unwrap())
}

fn solve(coupling: CouplingOptions) -> EigenSolver<Sweeper> {
    let mut b = CoreMeshBuilder::new(&[1.26, 1.26], &[1.26, 1.26], &[1.5, 1.5]);
    b.set_subdivisions(2)
        .fill(0)
        .set_all_boundaries(BoundaryType::Reflect);
    let mesh = Arc::new(b.create_mesh().unwrap());
    let sweeper = create_sweeper(&options(coupling), mesh, lib()).unwrap();
    let mut eigen = EigenOptions::default();
    eigen
        .set_k_tolerance(1e-9)
        .set_flux_tolerance(1e-8)
        .set_max_outer(40);
    let mut solver = EigenSolver::new(sweeper, eigen).unwrap();
    let result = solver.solve().unwrap();
    assert_abs_diff_eq!(result.k, 1.2, epsilon = 1e-5);
    solver
}

fn composite(solver: &EigenSolver<Sweeper>) -> &PlaneSweeper2D3D {
    match solver.sweeper() {
        Sweeper::TwoDThreeD(s) => s,
        _ => panic!("expected a 2D3D sweeper"),
    }
}

#[test]
fn test_homogeneous_core_reaches_k_infinity() {
    let solver = solve(CouplingOptions::default());
    let s = composite(&solver);
    // One residual vector per outer iteration, one entry per group
    assert_eq!(s.sn_resid().len(), s.n_outer());
    assert!(s.sn_resid().iter().all(|r| r.len() == 1));
    assert!(s.sn_resid().last().unwrap()[0] < 1e-6);

    let mut pin_flux = vec![0.0; s.n_pin()];
    s.pin_flux_1g(0, &mut pin_flux);
    for phi in &pin_flux {
        assert_relative_eq!(*phi, pin_flux[0], max_relative = 1e-6);
    }
}

#[test]
fn test_homogeneous_corrections_are_identity() {
    let solver = solve(CouplingOptions::default());
    let s = composite(&solver);
    let corrections = s.corrections().read().unwrap();
    let quad = AngularQuadrature::new(QuadratureType::LevelSymmetric { order: 4 }).unwrap();
    for pin in 0..s.n_pin() {
        for iang in 0..quad.ndir() {
            assert_relative_eq!(corrections.beta(pin, iang, 0), 1.0, max_relative = 1e-6);
        }
    }
}

#[test]
fn test_moc_cadence_with_projection() {
    let coupling = CouplingOptions {
        moc_modulo: 3,
        n_inactive_moc: 2,
        do_snproject: true,
        expose_sn: true,
        ..Default::default()
    };
    let solver = solve(coupling);
    let s = composite(&solver);
    let mut sn = vec![0.0; s.n_pin()];
    let mut moc = vec![0.0; s.n_pin()];
    s.sn().pin_flux_1g(0, &mut sn);
    s.moc().pin_flux_1g(0, &mut moc);
    for (a, b) in sn.iter().zip(&moc) {
        assert_relative_eq!(*a, *b, max_relative = 1e-10);
    }
}

/// Pins with a fuel cell in the middle of a 3x3 moderator subdivision
fn lattice(hz: &[f64], top: BoundaryType) -> (Arc<CoreMesh>, Arc<MaterialLib>) {
    let mut b = CoreMeshBuilder::new(&[1.26, 1.26], &[1.26, 1.26], hz);
    b.set_subdivisions(3)
        .fill(1)
        .set_all_boundaries(BoundaryType::Reflect)
        .set_boundary(Surface::Top, top);
    let pin = [1, 1, 1, 1, 0, 1, 1, 1, 1];
    for z in 0..hz.len() {
        for y in 0..2 {
            for x in 0..2 {
                b.set_pin_materials(Position::new(x, y, z), &pin);
            }
        }
    }
    let fuel = Material::new(
        vec![0.4],
        vec![0.6],
        vec![0.0],
        vec![1.0],
        ScatteringMatrix::new(1, vec![0.3]).unwrap(),
    )
    .unwrap();
    let moderator = Material::new(
        vec![0.01],
        vec![0.0],
        vec![0.0],
        vec![0.0],
        ScatteringMatrix::new(1, vec![1.5]).unwrap(),
    )
    .unwrap();
    (
        Arc::new(b.create_mesh().unwrap()),
        Arc::new(MaterialLib::new(vec![fuel, moderator]).unwrap()),
    )
}

fn solve_lattice(
    options: &SweeperOptions,
    hz: &[f64],
    top: BoundaryType,
    max_outer: usize,
) -> EigenSolver<Sweeper> {
    let (mesh, lib) = lattice(hz, top);
    let sweeper = create_sweeper(options, mesh, lib).unwrap();
    let mut eigen = EigenOptions::default();
    eigen
        .set_k_tolerance(1e-9)
        .set_flux_tolerance(1e-8)
        .set_max_outer(max_outer);
    let mut solver = EigenSolver::new(sweeper, eigen).unwrap();
    solver.solve().unwrap();
    solver
}

fn kind_options(kind: SweeperKind, coupling: CouplingOptions) -> SweeperOptions {
    let mut options = options(coupling);
    options.set_kind(kind);
    options
}

#[test]
fn test_single_plane_lattice_follows_moc() {
    let hz = [2.0];
    let coupled = solve_lattice(
        &options(CouplingOptions::default()),
        &hz,
        BoundaryType::Reflect,
        100,
    );
    let moc = solve_lattice(
        &kind_options(SweeperKind::Moc, CouplingOptions::default()),
        &hz,
        BoundaryType::Reflect,
        100,
    );
    assert_abs_diff_eq!(coupled.k(), moc.k(), epsilon = 1e-6);
}

#[test]
fn test_lattice_corrections_steer_sn() {
    let hz = [1.0, 1.0];
    let coupled = solve_lattice(
        &options(CouplingOptions::default()),
        &hz,
        BoundaryType::Vacuum,
        100,
    );
    let sn = solve_lattice(
        &kind_options(SweeperKind::Sn, CouplingOptions::default()),
        &hz,
        BoundaryType::Vacuum,
        100,
    );
    assert!((coupled.k() - sn.k()).abs() > 1e-3 * sn.k());

    let s = composite(&coupled);
    let corrections = s.corrections().read().unwrap();
    let n_angle = corrections.n_angle();
    let max_deviation = (0..s.n_pin())
        .flat_map(|pin| (0..n_angle).map(move |iang| (pin, iang)))
        .map(|(pin, iang)| {
            let alpha = corrections.alpha(pin, iang, 0, Normal::X);
            let beta = corrections.beta(pin, iang, 0);
            (alpha - 1.0).abs().max((beta - 1.0).abs())
        })
        .fold(0.0, f64::max);
    assert!(max_deviation > 1e-3);
}

#[test]
fn test_transverse_leakage_lowers_k() {
    let hz = [1.0, 1.0];
    let with_tl = solve_lattice(
        &options(CouplingOptions::default()),
        &hz,
        BoundaryType::Vacuum,
        40,
    );
    let without_tl = solve_lattice(
        &options(CouplingOptions {
            do_tl: false,
            ..Default::default()
        }),
        &hz,
        BoundaryType::Vacuum,
        40,
    );
    assert!(without_tl.k() > with_tl.k() + 0.05);
}

#[test]
fn test_pin_flux_follows_expose_sn() {
    let hz = [1.0, 1.0];
    for expose_sn in [false, true] {
        let coupling = CouplingOptions {
            expose_sn,
            ..Default::default()
        };
        let solver = solve_lattice(&options(coupling), &hz, BoundaryType::Vacuum, 100);
        let s = composite(&solver);
        let n_pin = s.n_pin();
        let mut exposed = vec![0.0; n_pin];
        let mut sn = vec![0.0; n_pin];
        let mut moc = vec![0.0; n_pin];
        s.pin_flux_1g(0, &mut exposed);
        s.sn().pin_flux_1g(0, &mut sn);
        s.moc().pin_flux_1g(0, &mut moc);
        assert_eq!(exposed, if expose_sn { sn.clone() } else { moc.clone() });

        let max_difference = sn
            .iter()
            .zip(&moc)
            .map(|(a, b)| ((a - b) / b).abs())
            .fold(0.0, f64::max);
        assert!(max_difference > 1e-6);
    }
}
