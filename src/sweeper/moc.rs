//! Method of characteristics sweeper on the fine mesh of every plane
pub mod rays;

use crate::boundary::BoundaryCondition;
use crate::coarse_data::{self, SharedCoarseData};
use crate::flux::ScalarFlux;
use crate::mesh::CoreMesh;
use crate::quadrature::{Angle, AngularQuadrature};
use crate::source::{FlatSource, Source};
use crate::sweeper::{
    check_group, check_source_shape, pin_residual, BoundaryUpdate, TransportSweeper,
};
use crate::types::{Normal, Position, Result, SweepError, HPI, RFPI};
use crate::xs_mesh::{MaterialLib, XsMesh};
use log::debug;
use rayon::prelude::*;
use std::sync::Arc;

pub use rays::{AngleRays, RayData};

/// Optical thickness below which the attenuation uses a series expansion
const SMALL_TAU: f64 = 1e-3;

/// `1 - exp(-tau)`
fn attenuation(tau: f64) -> f64 {
    if tau > SMALL_TAU {
        -(-tau).exp_m1()
    } else {
        tau * (1.0 - tau * (0.5 - tau * (1.0 / 6.0 - tau / 24.0)))
    }
}

/// Angular flux of a MoC sweep condensed onto the pin mesh, per direction of
/// the upper hemisphere
#[derive(Debug, Clone, PartialEq)]
pub struct CoarseAngularTally {
    n_angle: usize,
    n_pin: usize,
    n_surf: usize,
    psi: Vec<f64>,
    sigma_psi: Vec<f64>,
    /// Width-weighted angular flux and summed width per surface
    surface: Vec<[f64; 2]>,
}

impl CoarseAngularTally {
    /// Create an empty tally
    pub fn new(n_angle: usize, n_pin: usize, n_surf: usize) -> Self {
        Self {
            n_angle,
            n_pin,
            n_surf,
            psi: vec![0.0; n_angle * n_pin],
            sigma_psi: vec![0.0; n_angle * n_pin],
            surface: vec![[0.0; 2]; n_angle * n_surf],
        }
    }

    /// Clear every entry
    pub fn reset(&mut self) {
        self.psi.iter_mut().for_each(|v| *v = 0.0);
        self.sigma_psi.iter_mut().for_each(|v| *v = 0.0);
        self.surface.iter_mut().for_each(|v| *v = [0.0; 2]);
    }

    /// Number of directions
    pub fn n_angle(&self) -> usize {
        self.n_angle
    }

    /// Pin-averaged angular flux
    pub fn psi(&self, angle: usize, pin: usize) -> f64 {
        self.psi[angle * self.n_pin + pin]
    }

    /// Pin-averaged angular collision rate
    pub fn sigma_psi(&self, angle: usize, pin: usize) -> f64 {
        self.sigma_psi[angle * self.n_pin + pin]
    }

    /// Face-averaged angular flux on a surface, if any ray crossed it
    pub fn surface_psi(&self, angle: usize, surf: usize) -> Option<f64> {
        let [sum, weight] = self.surface[angle * self.n_surf + surf];
        if weight > 0.0 {
            Some(sum / weight)
        } else {
            None
        }
    }

    /// Set the pin averages of a direction
    pub fn set_pin(&mut self, angle: usize, pin: usize, psi: f64, sigma_psi: f64) {
        self.psi[angle * self.n_pin + pin] = psi;
        self.sigma_psi[angle * self.n_pin + pin] = sigma_psi;
    }

    /// Overwrite the face average on a surface
    pub fn set_surface_psi(&mut self, angle: usize, surf: usize, psi: f64) {
        self.surface[angle * self.n_surf + surf] = [psi, 1.0];
    }

    /// Add the flux of a ray crossing a surface
    pub fn add_surface(&mut self, angle: usize, surf: usize, psi: f64, width: f64) {
        let entry = &mut self.surface[angle * self.n_surf + surf];
        entry[0] += width * psi;
        entry[1] += width;
    }
}

/// Incoming flux of a direction on the x and the y faces of a plane
fn incoming(bc: &BoundaryCondition, group: usize, iang: usize) -> [&[f64]; 2] {
    [bc.face(group, iang, Normal::X), bc.face(group, iang, Normal::Y)]
}

/// Result of tracing every ray of one direction through a plane
#[derive(Debug)]
struct AngleTrace {
    /// Width-weighted change of angular flux per region of the plane
    acc: Vec<f64>,
    /// Width-weighted outgoing flux on the x faces and the y faces
    out: [Vec<f64>; 2],
    /// Coarse surface, angular flux and ray width of every crossing
    crossings: Vec<(usize, f64, f64)>,
}

/// Inputs shared by every direction of a plane sweep
struct PlaneSweep<'a> {
    mesh: &'a CoreMesh,
    quad: &'a AngularQuadrature,
    rays: &'a RayData,
    areas: &'a [f64],
    q: &'a [f64],
    xstr: &'a [f64],
    group: usize,
    plane: usize,
    tally: bool,
}

impl PlaneSweep<'_> {
    fn trace(&self, iang: usize, angle: &Angle, incoming: [&[f64]; 2]) -> AngleTrace {
        let mesh = self.mesh;
        let offset = self.plane * mesh.n_fine_plane();
        let angle_rays = self.rays.angle(iang);
        let mut trace = AngleTrace {
            acc: vec![0.0; mesh.n_fine_plane()],
            out: [vec![0.0; mesh.nfy()], vec![0.0; mesh.nfx()]],
            crossings: vec![],
        };
        for ray in &angle_rays.rays {
            let (normal, position) = ray.entry;
            let mut psi = incoming[normal.index()][position];
            let mut crossings = ray.crossings.iter().peekable();
            for (iseg, segment) in ray.segments.iter().enumerate() {
                while let Some(c) = crossings.next_if(|c| c.segment == iseg) {
                    if self.tally {
                        trace.crossings.push((self.surface(c), psi, ray.width));
                    }
                }
                let ireg = offset + segment.region;
                let sigma = self.xstr[ireg];
                let tau = sigma * segment.length * angle.rsintheta;
                let dpsi = (psi - self.q[ireg] / sigma) * attenuation(tau);
                psi -= dpsi;
                trace.acc[segment.region] += ray.width * dpsi;
            }
            if self.tally {
                for c in crossings {
                    trace.crossings.push((self.surface(c), psi, ray.width));
                }
            }
            let (normal, position) = ray.exit;
            trace.out[normal.index()][position] += ray.width * psi;
        }
        trace
    }

    fn surface(&self, crossing: &rays::Crossing) -> usize {
        let (px, py) = crossing.pin;
        let pin = self.mesh.pin_index(Position::new(px, py, self.plane));
        self.mesh.coarse_surf(pin, crossing.surface)
    }

    /// Fold the trace of one direction into the scalar flux, the outgoing
    /// boundary flux and the tally
    fn merge(
        &self,
        iang: usize,
        trace: AngleTrace,
        flux_1g: &mut [f64],
        bc_out: &mut BoundaryCondition,
        tally: &mut CoarseAngularTally,
    ) {
        let mesh = self.mesh;
        let angle = self.quad.get(iang);
        let offset = self.plane * mesh.n_fine_plane();
        let sin_theta = 1.0 / angle.rsintheta;
        let wgt = 2.0 * angle.weight * HPI;

        let psi_bar = trace
            .acc
            .iter()
            .enumerate()
            .map(|(r, acc)| {
                let sigma = self.xstr[offset + r];
                (self.q[offset + r] + sin_theta * acc / self.areas[r]) / sigma
            })
            .collect::<Vec<_>>();
        for (phi, psi) in flux_1g[offset..offset + psi_bar.len()]
            .iter_mut()
            .zip(&psi_bar)
        {
            *phi += wgt * psi;
        }

        let exit_width = &self.rays.angle(iang).exit_width;
        for (normal, (out, width)) in [Normal::X, Normal::Y]
            .into_iter()
            .zip(trace.out.iter().zip(exit_width))
        {
            let face = out
                .iter()
                .zip(width)
                .map(|(o, w)| if *w > 0.0 { o / w } else { 0.0 })
                .collect::<Vec<_>>();
            bc_out.set_face(0, iang, normal, &face);
        }

        if self.tally {
            for py in 0..mesh.ny() {
                for px in 0..mesh.nx() {
                    let pin = mesh.pin_index(Position::new(px, py, self.plane));
                    let (mut area, mut psi, mut sigma_psi) = (0.0, 0.0, 0.0);
                    for ireg in mesh.pin_fine_regions(pin) {
                        let a = self.areas[ireg - offset];
                        area += a;
                        psi += a * psi_bar[ireg - offset];
                        sigma_psi += a * self.xstr[ireg] * psi_bar[ireg - offset];
                    }
                    tally.set_pin(iang, pin, psi / area, sigma_psi / area);
                }
            }
            for (surf, psi, width) in trace.crossings {
                tally.add_surface(iang, surf, psi, width);
            }
        }
    }

    /// Sweep every direction of the upper hemisphere through the plane
    fn run(
        &self,
        boundary_update: BoundaryUpdate,
        bc_in: &mut BoundaryCondition,
        bc_out: &mut BoundaryCondition,
        flux_1g: &mut [f64],
        tally: &mut CoarseAngularTally,
    ) {
        let angles = self.quad.upper_hemisphere();
        match boundary_update {
            BoundaryUpdate::Jacobi => {
                let bc = &*bc_in;
                let traces = angles
                    .par_iter()
                    .enumerate()
                    .map(|(iang, angle)| self.trace(iang, angle, incoming(bc, self.group, iang)))
                    .collect::<Vec<_>>();
                for (iang, trace) in traces.into_iter().enumerate() {
                    self.merge(iang, trace, flux_1g, bc_out, tally);
                }
                bc_in.update(self.group, bc_out);
            }
            BoundaryUpdate::GaussSeidel => {
                for (iang, angle) in angles.iter().enumerate() {
                    let trace = self.trace(iang, angle, incoming(bc_in, self.group, iang));
                    self.merge(iang, trace, flux_1g, bc_out, tally);
                    bc_in.update_angle(self.group, iang, bc_out);
                }
            }
        }
    }
}

/// Method of characteristics sweeper.
///
/// Every plane is solved as a 2-D problem on the fine regions, with the
/// directions of the upper hemisphere standing for their mirror images
/// below the plane.
#[derive(Debug)]
pub struct MocSweeper {
    mesh: Arc<CoreMesh>,
    lib: Arc<MaterialLib>,
    xs: XsMesh,
    quad: AngularQuadrature,
    rays: RayData,
    areas: Vec<f64>,
    n_inner: usize,
    boundary_update: BoundaryUpdate,
    flux: ScalarFlux,
    flux_old: ScalarFlux,
    vol: Vec<f64>,
    bc_in: Vec<BoundaryCondition>,
    bc_out: BoundaryCondition,
    source: Option<FlatSource>,
    coarse_data: Option<SharedCoarseData>,
    angular_tally: bool,
    tally: CoarseAngularTally,
    xstr: Vec<f64>,
    q: Vec<f64>,
}

impl MocSweeper {
    /// Create a sweeper and trace its rays
    pub fn new(
        mesh: Arc<CoreMesh>,
        lib: Arc<MaterialLib>,
        quad: AngularQuadrature,
        ray_spacing: f64,
        n_inner: usize,
        boundary_update: BoundaryUpdate,
    ) -> Result<Self> {
        let xs = XsMesh::new(&mesh, &lib)?;
        let rays = RayData::new(&mesh, quad.upper_hemisphere(), ray_spacing)?;
        let n_group = lib.n_group();
        let n_fine = mesh.n_fine();
        let n_upper = quad.upper_hemisphere().len();
        let bc_in = (0..mesh.nz())
            .map(|_| {
                BoundaryCondition::new(
                    n_group,
                    &quad,
                    n_upper,
                    [mesh.nfy(), mesh.nfx(), 0],
                    mesh.boundaries(),
                )
            })
            .collect::<Vec<_>>();
        let bc_out = bc_in[0].single_group();
        Ok(Self {
            areas: (0..mesh.n_fine_plane()).map(|r| mesh.fine_area(r)).collect(),
            vol: mesh.fine_volumes(),
            tally: CoarseAngularTally::new(n_upper, mesh.n_pin(), mesh.n_surf()),
            xs,
            quad,
            rays,
            n_inner,
            boundary_update,
            flux: ScalarFlux::new(n_fine, n_group, 0.0),
            flux_old: ScalarFlux::new(n_fine, n_group, 0.0),
            bc_in,
            bc_out,
            source: None,
            coarse_data: None,
            angular_tally: false,
            xstr: vec![0.0; n_fine],
            q: vec![0.0; n_fine],
            mesh,
            lib,
        })
    }

    /// The angular quadrature
    pub fn quadrature(&self) -> &AngularQuadrature {
        &self.quad
    }

    /// The traced rays
    pub fn rays(&self) -> &RayData {
        &self.rays
    }

    /// Keep the coarse angular tally of the last inner iteration of every sweep
    pub fn enable_angular_tally(&mut self, enable: bool) {
        self.angular_tally = enable;
    }

    /// The coarse angular tally of the last sweep, if enabled
    pub fn angular_tally(&self) -> Option<&CoarseAngularTally> {
        self.angular_tally.then_some(&self.tally)
    }

    /// Add a contribution per fine region to the current group source
    pub fn add_to_source(&mut self, values: &[f64]) -> Result<()> {
        let source = self
            .source
            .as_mut()
            .ok_or(SweepError::MissingSource("add_to_source"))?;
        source.add_1g(values);
        Ok(())
    }

    /// The bound source
    pub fn source(&self) -> Option<&FlatSource> {
        self.source.as_ref()
    }

    /// Radial partial currents of the last tally into the coarse data
    fn store_currents(&self, data: &SharedCoarseData, group: usize) -> Result<()> {
        let mut data = coarse_data::write(data)?;
        data.zero_radial(group);
        for (iang, angle) in self.quad.upper_hemisphere().iter().enumerate() {
            let wgt = 2.0 * angle.weight * HPI;
            for surf in 0..data.n_surf() {
                let normal = data.normal(surf);
                if normal == Normal::Z {
                    continue;
                }
                if let Some(psi) = self.tally.surface_psi(iang, surf) {
                    let cosine = angle.cosine(normal);
                    data.add(surf, group, cosine > 0.0, wgt * cosine.abs() * psi);
                }
            }
        }
        data.set_has_radial(true);
        Ok(())
    }
}

impl TransportSweeper for MocSweeper {
    fn n_reg(&self) -> usize {
        self.mesh.n_fine()
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
        for bc in self.bc_in.iter_mut() {
            bc.initialize(RFPI);
        }
    }

    fn sweep(&mut self, group: usize) -> Result<()> {
        check_group(group, self.n_group())?;
        let source = self
            .source
            .as_ref()
            .ok_or(SweepError::MissingSource("sweep"))?;
        self.xs.xstr_1g(group, &mut self.xstr);

        for inner in 0..self.n_inner {
            let tally =
                inner + 1 == self.n_inner && (self.coarse_data.is_some() || self.angular_tally);
            if tally {
                self.tally.reset();
            }
            source.self_scatter(&self.xs, group, self.flux.group(group), &mut self.q);
            let mut flux_1g = vec![0.0; self.mesh.n_fine()];
            for (plane, bc_in) in self.bc_in.iter_mut().enumerate() {
                let plane_sweep = PlaneSweep {
                    mesh: &self.mesh,
                    quad: &self.quad,
                    rays: &self.rays,
                    areas: &self.areas,
                    q: &self.q,
                    xstr: &self.xstr,
                    group,
                    plane,
                    tally,
                };
                plane_sweep.run(
                    self.boundary_update,
                    bc_in,
                    &mut self.bc_out,
                    &mut flux_1g,
                    &mut self.tally,
                );
            }
            self.flux.group_mut(group).copy_from_slice(&flux_1g);

            if let (true, Some(data)) = (tally, &self.coarse_data) {
                self.store_currents(data, group)?;
            }
        }
        debug!(
            "MoC group {group}: {} inner iterations, mean flux {:.6e}",
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
                "the MoC sweeper needs a flat source, got a {} source",
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
        let flux = self.flux.group(group);
        for (pin, v) in out.iter_mut().enumerate() {
            let (volume, sum) = self
                .mesh
                .pin_fine_regions(pin)
                .fold((0.0, 0.0), |(vol, sum), r| {
                    (vol + self.vol[r], sum + self.vol[r] * flux[r])
                });
            *v = sum / volume;
        }
    }

    fn set_pin_flux_1g(&mut self, group: usize, pin_flux: &[f64]) -> f64 {
        let mut old = vec![0.0; self.n_pin()];
        self.pin_flux_1g(group, &mut old);
        let residual = pin_residual(pin_flux, &old);
        let flux = self.flux.group_mut(group);
        for (pin, (new, old)) in pin_flux.iter().zip(&old).enumerate() {
            for r in self.mesh.pin_fine_regions(pin) {
                if *old > 0.0 {
                    flux[r] *= new / old;
                } else {
                    flux[r] = *new;
                }
            }
        }
        residual
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::coarse_data::CoarseData;
    use crate::mesh::CoreMeshBuilder;
    use crate::quadrature::types::QuadratureType;
    use crate::types::{BoundaryType, FPI};
    use crate::xs_mesh::{Material, ScatteringMatrix};
    use approx::*;

    fn absorber(boundary: BoundaryType) -> (Arc<CoreMesh>, Arc<MaterialLib>) {
        let mut b = CoreMeshBuilder::new(&[1.26, 1.26], &[1.26, 1.0], &[1.0, 2.0]);
        b.set_subdivisions(2).fill(0).set_all_boundaries(boundary);
        let m = Material::new(
            vec![1.5],
            vec![0.0],
            vec![0.0],
            vec![0.0],
            ScatteringMatrix::zeros(1),
        )
        .unwrap();
        (
            Arc::new(b.create_mesh().unwrap()),
            Arc::new(MaterialLib::new(vec![m]).unwrap()),
        )
    }

    fn sweeper(boundary: BoundaryType, update: BoundaryUpdate) -> MocSweeper {
        let (mesh, lib) = absorber(boundary);
        let quad = AngularQuadrature::new(QuadratureType::ChebyshevGauss {
            n_azimuthal: 2,
            n_polar: 2,
        })
        .unwrap();
        let mut moc = MocSweeper::new(mesh.clone(), lib, quad, 0.05, 40, update).unwrap();
        let mut source = moc.create_source();
        source
            .primary_mut()
            .set_external(0, &vec![3.0; mesh.n_fine()])
            .unwrap();
        moc.assign_source(source).unwrap();
        moc.initialize();
        moc.update_source(0, &vec![0.0; mesh.n_fine()]).unwrap();
        moc
    }

    #[test]
    fn test_attenuation_branches_agree() {
        for tau in [1e-6, 5e-4, 1e-3] {
            assert_relative_eq!(attenuation(tau), 1.0 - (-tau).exp(), max_relative = 1e-10);
        }
        assert_relative_eq!(attenuation(2.0), 1.0 - (-2.0_f64).exp());
    }

    #[test]
    fn test_infinite_medium() {
        for update in [BoundaryUpdate::GaussSeidel, BoundaryUpdate::Jacobi] {
            let mut moc = sweeper(BoundaryType::Reflect, update);
            let data = CoarseData::for_mesh(&moc.mesh, 1).into_shared();
            moc.set_coarse_data(Some(data.clone()));
            moc.enable_angular_tally(true);
            moc.sweep(0).unwrap();
            for phi in moc.flux().group(0) {
                assert_relative_eq!(*phi, 2.0, max_relative = 1e-10);
            }

            let data = data.read().unwrap();
            assert!(data.has_radial() && !data.has_axial());
            for surf in 0..data.n_surf() {
                assert_abs_diff_eq!(data.net_current(surf, 0), 0.0, epsilon = 1e-10);
            }
            let tally = moc.angular_tally().unwrap();
            let psi = 2.0 / FPI;
            for iang in 0..tally.n_angle() {
                for pin in 0..moc.n_pin() {
                    assert_relative_eq!(tally.psi(iang, pin), psi, max_relative = 1e-10);
                    assert_relative_eq!(
                        tally.sigma_psi(iang, pin),
                        1.5 * psi,
                        max_relative = 1e-10
                    );
                }
            }
        }
    }

    #[test]
    fn test_vacuum_flux_below_infinite_medium() {
        let mut moc = sweeper(BoundaryType::Vacuum, BoundaryUpdate::GaussSeidel);
        moc.sweep(0).unwrap();
        let mut pin_flux = vec![0.0; moc.n_pin()];
        moc.pin_flux_1g(0, &mut pin_flux);
        for phi in pin_flux {
            assert!(phi > 0.0 && phi < 2.0);
        }
    }

    #[test]
    fn test_set_pin_flux_scales_fine_flux() {
        let mut moc = sweeper(BoundaryType::Vacuum, BoundaryUpdate::GaussSeidel);
        moc.sweep(0).unwrap();
        let before = moc.flux().group(0).to_vec();
        let mut pin_flux = vec![0.0; moc.n_pin()];
        moc.pin_flux_1g(0, &mut pin_flux);
        let doubled = pin_flux.iter().map(|v| 2.0 * v).collect::<Vec<_>>();
        let residual = moc.set_pin_flux_1g(0, &doubled);
        assert_relative_eq!(residual, pin_residual(&doubled, &pin_flux));
        for (a, b) in moc.flux().group(0).iter().zip(&before) {
            assert_relative_eq!(*a, 2.0 * b, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_angular_tally_disabled_by_default() {
        let mut moc = sweeper(BoundaryType::Reflect, BoundaryUpdate::GaussSeidel);
        moc.sweep(0).unwrap();
        assert!(moc.angular_tally().is_none());
        assert!(matches!(
            moc.assign_source(Source::Flat(FlatSource::new(3, 1))),
            Err(SweepError::SourceShape { .. })
        ));
    }
}
