//! Discrete ordinates sweeper on the pin mesh
use crate::boundary::BoundaryCondition;
use crate::coarse_data::{self, SharedCoarseData};
use crate::correction::{self as correction_data, SharedCorrectionData};
use crate::flux::ScalarFlux;
use crate::mesh::CoreMesh;
use crate::quadrature::{Angle, AngularQuadrature};
use crate::source::{FlatSource, Source};
use crate::sweeper::{
    check_group, check_source_shape, pin_residual, BoundaryUpdate, TransportSweeper,
};
use crate::types::{Normal, Position, Result, SweepError, HPI, RFPI};
use crate::xs_mesh::{MaterialLib, XsMesh};
use itertools::Either;
use log::debug;
use rayon::prelude::*;
use std::sync::{Arc, RwLockReadGuard};

/// Geometry of one cell as seen by one direction
#[derive(Debug, Clone, Copy)]
pub struct SnCell {
    /// Pin index
    pub index: usize,
    /// Direction index in the quadrature
    pub angle: usize,
    /// `|cos| / h` along each axis
    pub t: [f64; 3],
}

/// A cell update for a fixed group
pub trait CellKernel {
    /// Update a cell.
    ///
    /// `psi` holds the incoming face flux along x, y and z and is
    /// overwritten with the outgoing face flux. `q` is the angular source and
    /// `xstr` the transport cross section. Returns the cell-average angular
    /// flux. Axes with `t == 0` leave their face flux untouched.
    fn evaluate(&self, cell: &SnCell, psi: &mut [f64; 3], q: f64, xstr: f64) -> f64;
}

/// A differencing scheme for the Sn cell update
pub trait CellWorker {
    /// The update used while sweeping one group
    type Kernel<'a>: CellKernel + Sync
    where
        Self: 'a;

    /// Prepare the update for a group
    fn kernel(&self, group: usize) -> Result<Self::Kernel<'_>>;
}

/// Plain diamond differencing
#[derive(Debug, Clone, Copy, Default)]
pub struct DiamondDifference;

impl CellKernel for DiamondDifference {
    fn evaluate(&self, cell: &SnCell, psi: &mut [f64; 3], q: f64, xstr: f64) -> f64 {
        let [tx, ty, tz] = cell.t;
        let psi_bar = (q + 2.0 * (tx * psi[0] + ty * psi[1] + tz * psi[2]))
            / (xstr + 2.0 * tx + 2.0 * ty + 2.0 * tz);
        for (p, t) in psi.iter_mut().zip(cell.t) {
            if t > 0.0 {
                *p = 2.0 * psi_bar - *p;
            }
        }
        psi_bar
    }
}

impl CellWorker for DiamondDifference {
    type Kernel<'a> = DiamondDifference;

    fn kernel(&self, _group: usize) -> Result<DiamondDifference> {
        Ok(DiamondDifference)
    }
}

/// Diamond differencing with the radial closures and the collision term
/// corrected by factors taken from a finer transport solution.
///
/// With all factors equal to one this is [`DiamondDifference`].
#[derive(Debug, Clone)]
pub struct CorrectedDiamondDifference {
    corrections: SharedCorrectionData,
}

impl CorrectedDiamondDifference {
    /// Create from a handle to the correction factors
    pub fn new(corrections: SharedCorrectionData) -> Self {
        Self { corrections }
    }
}

/// [`CorrectedDiamondDifference`] for one group, holding the factors locked
pub struct CorrectedKernel<'a> {
    group: usize,
    data: RwLockReadGuard<'a, correction_data::CorrectionData>,
}

impl CellKernel for CorrectedKernel<'_> {
    fn evaluate(&self, cell: &SnCell, psi: &mut [f64; 3], q: f64, xstr: f64) -> f64 {
        let [tx, ty, tz] = cell.t;
        let ax = self.data.alpha(cell.index, cell.angle, self.group, Normal::X);
        let ay = self.data.alpha(cell.index, cell.angle, self.group, Normal::Y);
        let b = self.data.beta(cell.index, cell.angle, self.group);

        let psi_bar = (q + 2.0 * (tx * psi[0] + ty * psi[1] + tz * psi[2]))
            / (b * xstr + 2.0 * tx / ax + 2.0 * ty / ay + 2.0 * tz);

        if tx > 0.0 {
            psi[0] = 2.0 * psi_bar / ax - psi[0];
        }
        if ty > 0.0 {
            psi[1] = 2.0 * psi_bar / ay - psi[1];
        }
        if tz > 0.0 {
            psi[2] = 2.0 * psi_bar - psi[2];
        }
        psi_bar
    }
}

impl CellWorker for CorrectedDiamondDifference {
    type Kernel<'a> = CorrectedKernel<'a>;

    fn kernel(&self, group: usize) -> Result<CorrectedKernel<'_>> {
        Ok(CorrectedKernel {
            group,
            data: correction_data::read(&self.corrections)?,
        })
    }
}

/// Result of sweeping one direction
struct AngleSweep {
    /// Cell-average angular flux times the direction weight
    flux: Vec<f64>,
    /// Outgoing face flux along x, y and z
    faces: [Vec<f64>; 3],
    /// Partial currents: (coarse surface, along positive axis, value)
    currents: Vec<(usize, bool, f64)>,
}

/// Cell indices along an axis in the order a direction visits them
fn ordered(n: usize, cosine: f64) -> impl Iterator<Item = usize> + Clone {
    if cosine >= 0.0 {
        Either::Left(0..n)
    } else {
        Either::Right((0..n).rev())
    }
}

/// Sweep one direction across the whole mesh
#[allow(clippy::too_many_arguments)]
fn sweep_angle<K: CellKernel>(
    mesh: &CoreMesh,
    kernel: &K,
    iang: usize,
    angle: &Angle,
    incoming: [&[f64]; 3],
    q: &[f64],
    xstr: &[f64],
    tally: bool,
) -> AngleSweep {
    let (nx, ny, nz) = (mesh.nx(), mesh.ny(), mesh.nz());
    let (hx, hy, hz) = (mesh.hx(), mesh.hy(), mesh.hz());
    let (ax, ay, az) = (angle.ox.abs(), angle.oy.abs(), angle.oz.abs());
    let cosines = [ax, ay, az];
    let wgt = angle.weight * HPI;

    let mut psi_x = incoming[0].to_vec();
    let mut psi_y = incoming[1].to_vec();
    let mut psi_z = incoming[2].to_vec();
    let mut flux = vec![0.0; mesh.n_pin()];
    let mut currents = vec![];

    let downwind = Normal::ALL.map(|n| angle.downwind_surface(n));
    let upwind = Normal::ALL.map(|n| angle.upwind_surface(n));
    let positive = [angle.ox >= 0.0, angle.oy >= 0.0, angle.oz >= 0.0];
    let first = [
        if positive[0] { 0 } else { nx - 1 },
        if positive[1] { 0 } else { ny - 1 },
        if positive[2] { 0 } else { nz - 1 },
    ];

    for iz in ordered(nz, angle.oz) {
        let tz = az / hz[iz];
        for iy in ordered(ny, angle.oy) {
            let ty = ay / hy[iy];
            for ix in ordered(nx, angle.ox) {
                let tx = ax / hx[ix];
                let index = mesh.pin_index(Position::new(ix, iy, iz));
                let ix_face = ny * iz + iy;
                let iy_face = nx * iz + ix;
                let iz_face = nx * iy + ix;
                let mut psi = [psi_x[ix_face], psi_y[iy_face], psi_z[iz_face]];

                if tally {
                    // Domain faces: record what comes in
                    let cell_position = [ix, iy, iz];
                    for n in 0..3 {
                        if cell_position[n] == first[n] {
                            currents.push((
                                mesh.coarse_surf(index, upwind[n]),
                                positive[n],
                                wgt * cosines[n] * psi[n],
                            ));
                        }
                    }
                }

                let cell = SnCell {
                    index,
                    angle: iang,
                    t: [tx, ty, tz],
                };
                let psi_bar = kernel.evaluate(&cell, &mut psi, q[index], xstr[index]);
                flux[index] += wgt * psi_bar;

                if tally {
                    for n in 0..3 {
                        currents.push((
                            mesh.coarse_surf(index, downwind[n]),
                            positive[n],
                            wgt * cosines[n] * psi[n],
                        ));
                    }
                }

                psi_x[ix_face] = psi[0];
                psi_y[iy_face] = psi[1];
                psi_z[iz_face] = psi[2];
            }
        }
    }

    AngleSweep {
        flux,
        faces: [psi_x, psi_y, psi_z],
        currents,
    }
}

/// Sweep every direction once, returning the new group flux and the currents
#[allow(clippy::too_many_arguments)]
fn sweep_directions<K: CellKernel + Sync>(
    mesh: &CoreMesh,
    quad: &AngularQuadrature,
    kernel: &K,
    boundary_update: BoundaryUpdate,
    bc_in: &mut BoundaryCondition,
    bc_out: &mut BoundaryCondition,
    group: usize,
    q: &[f64],
    xstr: &[f64],
    tally: bool,
) -> (Vec<f64>, Vec<(usize, bool, f64)>) {
    let mut flux_1g = vec![0.0; mesh.n_pin()];
    let mut currents = vec![];

    let mut merge = |iang: usize, result: AngleSweep, bc_out: &mut BoundaryCondition| {
        for (phi, contribution) in flux_1g.iter_mut().zip(&result.flux) {
            *phi += contribution;
        }
        for (normal, face) in Normal::ALL.iter().zip(&result.faces) {
            bc_out.set_face(0, iang, *normal, face);
        }
        currents.extend(result.currents);
    };

    match boundary_update {
        BoundaryUpdate::Jacobi => {
            let bc = &*bc_in;
            let results = quad
                .angles()
                .par_iter()
                .enumerate()
                .map(|(iang, angle)| {
                    let incoming = Normal::ALL.map(|n| bc.face(group, iang, n));
                    sweep_angle(mesh, kernel, iang, angle, incoming, q, xstr, tally)
                })
                .collect::<Vec<_>>();
            for (iang, result) in results.into_iter().enumerate() {
                merge(iang, result, bc_out);
            }
            bc_in.update(group, bc_out);
        }
        BoundaryUpdate::GaussSeidel => {
            for (iang, angle) in quad.angles().iter().enumerate() {
                let incoming = Normal::ALL.map(|n| bc_in.face(group, iang, n));
                let result = sweep_angle(mesh, kernel, iang, angle, incoming, q, xstr, tally);
                merge(iang, result, bc_out);
                bc_in.update_angle(group, iang, bc_out);
            }
        }
    }
    (flux_1g, currents)
}

/// Discrete ordinates sweeper on the pin mesh, generic over the cell update
#[derive(Debug)]
pub struct SnSweeper<W: CellWorker> {
    mesh: Arc<CoreMesh>,
    lib: Arc<MaterialLib>,
    xs: XsMesh,
    quad: AngularQuadrature,
    worker: W,
    n_inner: usize,
    boundary_update: BoundaryUpdate,
    flux: ScalarFlux,
    flux_old: ScalarFlux,
    vol: Vec<f64>,
    bc_in: BoundaryCondition,
    bc_out: BoundaryCondition,
    source: Option<FlatSource>,
    coarse_data: Option<SharedCoarseData>,
    xstr: Vec<f64>,
    q: Vec<f64>,
}

impl<W: CellWorker> SnSweeper<W> {
    /// Create a sweeper with homogenized pin cross sections
    pub fn new(
        mesh: Arc<CoreMesh>,
        lib: Arc<MaterialLib>,
        quad: AngularQuadrature,
        worker: W,
        n_inner: usize,
        boundary_update: BoundaryUpdate,
    ) -> Result<Self> {
        let xs = XsMesh::homogenized(&mesh, &lib)?;
        let n_group = lib.n_group();
        let n_pin = mesh.n_pin();
        let face_sizes = [
            mesh.ny() * mesh.nz(),
            mesh.nx() * mesh.nz(),
            mesh.nx() * mesh.ny(),
        ];
        let bc_in = BoundaryCondition::new(
            n_group,
            &quad,
            quad.ndir(),
            face_sizes,
            mesh.boundaries(),
        );
        let bc_out = bc_in.single_group();
        Ok(Self {
            vol: mesh.pin_volumes(),
            xs,
            quad,
            worker,
            n_inner,
            boundary_update,
            flux: ScalarFlux::new(n_pin, n_group, 0.0),
            flux_old: ScalarFlux::new(n_pin, n_group, 0.0),
            bc_in,
            bc_out,
            source: None,
            coarse_data: None,
            xstr: vec![0.0; n_pin],
            q: vec![0.0; n_pin],
            mesh,
            lib,
        })
    }

    /// The angular quadrature
    pub fn quadrature(&self) -> &AngularQuadrature {
        &self.quad
    }

    /// The boundary condition store
    pub fn boundary_condition(&self) -> &BoundaryCondition {
        &self.bc_in
    }

    /// Re-homogenize the pin cross sections with a fine-region flux
    pub fn update_homogenized(&mut self, fine_flux: &ScalarFlux) -> Result<()> {
        self.xs.update_homogenized(&self.mesh, &self.lib, fine_flux)
    }

    /// The bound source
    pub fn source(&self) -> Option<&FlatSource> {
        self.source.as_ref()
    }
}

impl<W: CellWorker> TransportSweeper for SnSweeper<W> {
    fn n_reg(&self) -> usize {
        self.mesh.n_pin()
    }

    fn n_group(&self) -> usize {
        self.lib.n_group()
    }

    fn n_pin(&self) -> usize {
        self.mesh.n_pin()
    }

    fn volumes(&self) -> &[f64] {
        &self.vol
    }

    fn xs_mesh(&self) -> &XsMesh {
        &self.xs
    }

    fn initialize(&mut self) {
        self.flux.fill(1.0);
        self.flux_old.fill(1.0);
        self.bc_in.initialize(RFPI);
    }

    fn sweep(&mut self, group: usize) -> Result<()> {
        check_group(group, self.n_group())?;
        if self.source.is_none() {
            return Err(SweepError::MissingSource("sweep"));
        }
        self.xs.xstr_1g(group, &mut self.xstr);

        let kernel = self.worker.kernel(group)?;
        for inner in 0..self.n_inner {
            let tally = inner + 1 == self.n_inner && self.coarse_data.is_some();
            if let Some(source) = &self.source {
                source.self_scatter(&self.xs, group, self.flux.group(group), &mut self.q);
            }
            let (flux_1g, currents) = sweep_directions(
                &self.mesh,
                &self.quad,
                &kernel,
                self.boundary_update,
                &mut self.bc_in,
                &mut self.bc_out,
                group,
                &self.q,
                &self.xstr,
                tally,
            );
            self.flux.group_mut(group).copy_from_slice(&flux_1g);

            if let (true, Some(data)) = (tally, &self.coarse_data) {
                let mut data = coarse_data::write(data)?;
                data.zero_data(group);
                for (surf, positive, value) in currents {
                    data.add(surf, group, positive, value);
                }
                data.set_has_radial(true);
                data.set_has_axial(true);
            }
        }
        debug!(
            "Sn group {group}: {} inner iterations, mean flux {:.6e}",
            self.n_inner,
            self.flux.group(group).iter().sum::<f64>() / self.n_reg() as f64
        );
        Ok(())
    }

    fn store_old_flux(&mut self) {
        self.flux_old.clone_from(&self.flux);
    }

    fn flux(&self) -> &ScalarFlux {
        &self.flux
    }

    fn old_flux(&self) -> &ScalarFlux {
        &self.flux_old
    }

    fn create_source(&self) -> Source {
        Source::Flat(FlatSource::new(self.n_reg(), self.n_group()))
    }

    fn assign_source(&mut self, source: Source) -> Result<()> {
        check_source_shape(&source, self.n_reg(), self.n_group())?;
        match source {
            Source::Flat(s) => {
                self.source = Some(s);
                Ok(())
            }
            other => Err(SweepError::SourceKind(format!(
                "the Sn sweeper needs a flat source, got a {} source",
                other.kind()
            ))),
        }
    }

    fn update_source(&mut self, group: usize, fs: &[f64]) -> Result<()> {
        check_group(group, self.n_group())?;
        let source = self
            .source
            .as_mut()
            .ok_or(SweepError::MissingSource("update_source"))?;
        source.fission(&self.xs, fs, group);
        source.in_scatter(&self.xs, &self.flux, group);
        Ok(())
    }

    fn set_coarse_data(&mut self, coarse_data: Option<SharedCoarseData>) {
        self.coarse_data = coarse_data;
    }

    fn pin_flux_1g(&self, group: usize, out: &mut [f64]) {
        out.copy_from_slice(self.flux.group(group));
    }

    fn set_pin_flux_1g(&mut self, group: usize, pin_flux: &[f64]) -> f64 {
        let residual = pin_residual(pin_flux, self.flux.group(group));
        self.flux.group_mut(group).copy_from_slice(pin_flux);
        residual
    }
}
