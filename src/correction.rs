//! Correction factors for coarse-mesh Sn from a fine MoC solution
use crate::mesh::CoreMesh;
use crate::quadrature::AngularQuadrature;
use crate::sweeper::moc::CoarseAngularTally;
use crate::types::{Normal, Result, SweepError};
use log::warn;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Smallest denominator for which a correction ratio is formed
const MIN_DENOMINATOR: f64 = 1e-30;

/// Correction factors per coarse cell, direction and group.
///
/// `alpha` modifies the diamond-difference closure along x and y, `beta`
/// the collision term. The identity (all ones) gives plain diamond
/// differencing.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionData {
    n_cell: usize,
    n_angle: usize,
    n_group: usize,
    alpha: Vec<[f64; 2]>,
    beta: Vec<f64>,
}

/// Handle to correction factors shared by their producer and consumer
pub type SharedCorrectionData = Arc<RwLock<CorrectionData>>;

impl CorrectionData {
    /// Create identity factors
    pub fn new(n_cell: usize, n_angle: usize, n_group: usize) -> Self {
        let n = n_cell * n_angle * n_group;
        Self {
            n_cell,
            n_angle,
            n_group,
            alpha: vec![[1.0; 2]; n],
            beta: vec![1.0; n],
        }
    }

    /// Reset every factor to one
    pub fn reset(&mut self) {
        self.alpha.iter_mut().for_each(|a| *a = [1.0; 2]);
        self.beta.iter_mut().for_each(|b| *b = 1.0);
    }

    /// Number of cells
    pub fn n_cell(&self) -> usize {
        self.n_cell
    }

    /// Number of directions
    pub fn n_angle(&self) -> usize {
        self.n_angle
    }

    /// Number of groups
    pub fn n_group(&self) -> usize {
        self.n_group
    }

    fn index(&self, cell: usize, angle: usize, group: usize) -> usize {
        (group * self.n_angle + angle) * self.n_cell + cell
    }

    /// Closure factor along an axis; always one along z
    pub fn alpha(&self, cell: usize, angle: usize, group: usize, normal: Normal) -> f64 {
        match normal {
            Normal::X => self.alpha[self.index(cell, angle, group)][0],
            Normal::Y => self.alpha[self.index(cell, angle, group)][1],
            Normal::Z => 1.0,
        }
    }

    /// Collision factor
    pub fn beta(&self, cell: usize, angle: usize, group: usize) -> f64 {
        self.beta[self.index(cell, angle, group)]
    }

    /// Set the factors of a cell, direction and group
    pub fn set(&mut self, cell: usize, angle: usize, group: usize, alpha: [f64; 2], beta: f64) {
        let i = self.index(cell, angle, group);
        self.alpha[i] = alpha;
        self.beta[i] = beta;
    }

    /// Recompute the factors of a group from the angular tallies of a MoC sweep.
    ///
    /// MoC only covers the upper hemisphere; a direction below the x-y plane
    /// takes the factors of its mirror image through that plane. `xstr_hom`
    /// holds the homogenized transport cross section of every pin.
    pub fn update_group(
        &mut self,
        group: usize,
        quad: &AngularQuadrature,
        mesh: &CoreMesh,
        tally: &CoarseAngularTally,
        xstr_hom: &[f64],
    ) {
        let n_upper = 4 * quad.ndir_oct();
        let mut n_fallback = 0;
        for (iang, angle) in quad.iter().enumerate() {
            let iang_moc = if iang < n_upper {
                iang
            } else {
                quad.reflect(iang, Normal::Z)
            };
            for pin in 0..self.n_cell {
                let psi = tally.psi(iang_moc, pin);
                let mut alpha = [1.0; 2];
                for (a, normal) in alpha.iter_mut().zip([Normal::X, Normal::Y]) {
                    let psi_in = tally.surface_psi(
                        iang_moc,
                        mesh.coarse_surf(pin, angle.upwind_surface(normal)),
                    );
                    let psi_out = tally.surface_psi(
                        iang_moc,
                        mesh.coarse_surf(pin, angle.downwind_surface(normal)),
                    );
                    *a = match (psi_in, psi_out) {
                        (Some(psi_in), Some(psi_out)) => {
                            closure_ratio(2.0 * psi, psi_in + psi_out, &mut n_fallback)
                        }
                        _ => {
                            n_fallback += 1;
                            1.0
                        }
                    };
                }
                let beta = closure_ratio(
                    tally.sigma_psi(iang_moc, pin),
                    xstr_hom[pin] * psi,
                    &mut n_fallback,
                );
                self.set(pin, iang, group, alpha, beta);
            }
        }
        if n_fallback > 0 {
            warn!("group {group}: {n_fallback} correction factors fell back to one");
        }
    }
}

/// `numerator / denominator`, or one when the ratio is not a usable factor
fn closure_ratio(numerator: f64, denominator: f64, n_fallback: &mut usize) -> f64 {
    if denominator.abs() > MIN_DENOMINATOR {
        let ratio = numerator / denominator;
        if ratio.is_finite() && ratio > 0.0 {
            return ratio;
        }
    }
    *n_fallback += 1;
    1.0
}

/// Acquire the read lock of shared correction data
pub(crate) fn read(data: &SharedCorrectionData) -> Result<RwLockReadGuard<'_, CorrectionData>> {
    data.read()
        .map_err(|_| SweepError::PoisonedLock("correction data"))
}

/// Acquire the write lock of shared correction data
pub(crate) fn write(data: &SharedCorrectionData) -> Result<RwLockWriteGuard<'_, CorrectionData>> {
    data.write()
        .map_err(|_| SweepError::PoisonedLock("correction data"))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::CoreMeshBuilder;
    use crate::quadrature::types::QuadratureType;
    use crate::types::{Position, Surface};
    use approx::*;
    use rand::prelude::*;

    fn setup() -> (CoreMesh, AngularQuadrature) {
        let mut b = CoreMeshBuilder::new(&[1.0, 1.2], &[0.8, 1.0], &[1.0]);
        b.fill(0);
        (
            b.create_mesh().unwrap(),
            AngularQuadrature::new(QuadratureType::LevelSymmetric { order: 4 }).unwrap(),
        )
    }

    /// A tally whose face fluxes and collision rates agree with the diamond
    /// difference closure of the pin averages
    fn consistent_tally(
        mesh: &CoreMesh,
        quad: &AngularQuadrature,
        xstr: &[f64],
        rng: &mut StdRng,
    ) -> CoarseAngularTally {
        let n_upper = 4 * quad.ndir_oct();
        let mut tally = CoarseAngularTally::new(n_upper, mesh.n_pin(), mesh.n_surf());
        for (iang, angle) in quad.upper_hemisphere().iter().enumerate() {
            // Walk the pins in sweep order so every face is set once by its upwind pin
            let xs: Vec<usize> = if angle.ox >= 0.0 {
                (0..mesh.nx()).collect()
            } else {
                (0..mesh.nx()).rev().collect()
            };
            let ys: Vec<usize> = if angle.oy >= 0.0 {
                (0..mesh.ny()).collect()
            } else {
                (0..mesh.ny()).rev().collect()
            };
            let face = |tally: &mut CoarseAngularTally, pin: usize, s: Surface, v: f64| {
                tally.set_surface_psi(iang, mesh.coarse_surf(pin, s), v);
            };
            for y in &ys {
                for x in &xs {
                    let pin = mesh.pin_index(Position::new(*x, *y, 0));
                    let psi = 1.0 + rng.gen::<f64>();
                    tally.set_pin(iang, pin, psi, xstr[pin] * psi);
                    for normal in [Normal::X, Normal::Y] {
                        let upwind = angle.upwind_surface(normal);
                        let surf = mesh.coarse_surf(pin, upwind);
                        let psi_in = match tally.surface_psi(iang, surf) {
                            Some(v) => v,
                            None => {
                                let v = psi * rng.gen_range(0.5..1.5);
                                face(&mut tally, pin, upwind, v);
                                v
                            }
                        };
                        face(&mut tally, pin, upwind.opposite(), 2.0 * psi - psi_in);
                    }
                }
            }
        }
        tally
    }

    #[test]
    fn test_consistent_tallies_give_identity() {
        let (mesh, quad) = setup();
        let mut rng = StdRng::seed_from_u64(42);
        let xstr = (0..mesh.n_pin())
            .map(|_| 0.5 + rng.gen::<f64>())
            .collect::<Vec<_>>();
        let tally = consistent_tally(&mesh, &quad, &xstr, &mut rng);
        let mut data = CorrectionData::new(mesh.n_pin(), quad.ndir(), 2);
        data.update_group(1, &quad, &mesh, &tally, &xstr);
        for pin in 0..mesh.n_pin() {
            for iang in 0..quad.ndir() {
                for normal in Normal::ALL {
                    assert_relative_eq!(
                        data.alpha(pin, iang, 1, normal),
                        1.0,
                        max_relative = 1e-12
                    );
                }
                assert_relative_eq!(data.beta(pin, iang, 1), 1.0, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn test_degenerate_tallies_fall_back_to_identity() {
        let (mesh, quad) = setup();
        let n_upper = 4 * quad.ndir_oct();
        let mut tally = CoarseAngularTally::new(n_upper, mesh.n_pin(), mesh.n_surf());
        tally.set_pin(0, 0, 0.0, 0.0);
        tally.set_pin(0, 1, 1.0, -2.0);
        let mut data = CorrectionData::new(mesh.n_pin(), quad.ndir(), 1);
        data.update_group(0, &quad, &mesh, &tally, &[1.0; 4]);
        assert_eq!(data, CorrectionData::new(mesh.n_pin(), quad.ndir(), 1));
    }

    #[test]
    fn test_lower_hemisphere_uses_mirror() {
        let (mesh, quad) = setup();
        let n_upper = 4 * quad.ndir_oct();
        let mut tally = CoarseAngularTally::new(n_upper, mesh.n_pin(), mesh.n_surf());
        tally.set_pin(2, 3, 2.0, 3.0);
        let mut data = CorrectionData::new(mesh.n_pin(), quad.ndir(), 1);
        data.update_group(0, &quad, &mesh, &tally, &[1.0; 4]);
        let lower = quad.reflect(2, Normal::Z);
        assert_relative_eq!(data.beta(3, 2, 0), 1.5);
        assert_relative_eq!(data.beta(3, lower, 0), 1.5);
    }
}
