use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use sweep::mesh::CoreMeshBuilder;
use sweep::quadrature::types::QuadratureType;
use sweep::sweeper::{
    create_sweeper, BoundaryUpdate, SweeperKind, SweeperOptions, TransportSweeper,
};
use sweep::types::BoundaryType;
use sweep::xs_mesh::{Material, MaterialLib, ScatteringMatrix};

pub fn sweep_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");
    group.sample_size(20);

    let fuel = Material::new(
        vec![0.08, 0.9],
        vec![0.01, 1.2],
        vec![0.0, 0.0],
        vec![1.0, 0.0],
        ScatteringMatrix::new(2, vec![0.5, 0.0, 0.02, 1.1]).unwrap(),
    )
    .unwrap();
    let lib = Arc::new(MaterialLib::new(vec![fuel]).unwrap());

    for n in [4, 8] {
        let mut b = CoreMeshBuilder::new(&vec![1.26; n], &vec![1.26; n], &vec![2.0; 4]);
        b.set_subdivisions(2)
            .fill(0)
            .set_all_boundaries(BoundaryType::Reflect);
        let mesh = Arc::new(b.create_mesh().unwrap());

        for (kind, quadrature) in [
            (SweeperKind::Sn, QuadratureType::LevelSymmetric { order: 8 }),
            (
                SweeperKind::Moc,
                QuadratureType::ChebyshevGauss {
                    n_azimuthal: 4,
                    n_polar: 2,
                },
            ),
            (SweeperKind::TwoDThreeD, QuadratureType::LevelSymmetric { order: 4 }),
        ] {
            for update in [BoundaryUpdate::GaussSeidel, BoundaryUpdate::Jacobi] {
                let mut options = SweeperOptions::default();
                options
                    .set_kind(kind)
                    .set_quadrature(quadrature)
                    .set_n_inner(1)
                    .set_boundary_update(update);
                let mut sweeper = create_sweeper(&options, mesh.clone(), lib.clone()).unwrap();
                let source = sweeper.create_source();
                sweeper.assign_source(source).unwrap();
                sweeper.initialize();
                let mut fs = vec![0.0; sweeper.n_reg()];
                sweeper.calc_fission_source(1.0, &mut fs);

                group.bench_function(
                    format!("{kind:?} {update:?} sweep on {n}x{n}x4 pins"),
                    |b| {
                        b.iter(|| {
                            sweeper.store_old_flux();
                            for g in 0..2 {
                                sweeper.update_source(g, &fs).unwrap();
                                sweeper.sweep(g).unwrap();
                            }
                            black_box(sweeper.flux().group(1)[0])
                        })
                    },
                );
            }
        }
    }
    group.finish();
}

criterion_group!(benches, sweep_benchmark);
criterion_main!(benches);
