//! Coupled sweeper: 3-D Sn on the pin mesh corrected by 2-D MoC on every plane
use crate::coarse_data::{self, CoarseData, SharedCoarseData};
use crate::correction::{self, CorrectionData, SharedCorrectionData};
use crate::flux::ScalarFlux;
use crate::mesh::CoreMesh;
use crate::quadrature::AngularQuadrature;
use crate::source::{FlatSource, Source, Source2D3D};
use crate::sweeper::moc::MocSweeper;
use crate::sweeper::sn::{CorrectedDiamondDifference, SnSweeper};
use crate::sweeper::{
    check_group, check_source_shape, pin_residual, CouplingOptions, SweeperOptions,
    TransportSweeper,
};
use crate::types::{Result, Surface, SweepError};
use crate::xs_mesh::{MaterialLib, XsMesh};
use log::{debug, info, warn};
use std::sync::{Arc, RwLock};

/// The 2D3D sweeper.
///
/// On every group sweep the MoC sweeper (when due) solves each plane with
/// the axial leakage from the last Sn solution, its angular flux is
/// condensed into correction factors, and the corrected Sn sweeper then
/// solves the full 3-D problem on the pin mesh.
#[derive(Debug)]
pub struct PlaneSweeper2D3D {
    mesh: Arc<CoreMesh>,
    moc: MocSweeper,
    sn: SnSweeper<CorrectedDiamondDifference>,
    corrections: SharedCorrectionData,
    coarse_data: SharedCoarseData,
    coupling: CouplingOptions,
    n_outer: usize,
    sn_resid: Vec<Vec<f64>>,
}

impl PlaneSweeper2D3D {
    /// Create both sweepers and wire them to shared coarse data and correction factors
    pub fn new(
        mesh: Arc<CoreMesh>,
        lib: Arc<MaterialLib>,
        quad: AngularQuadrature,
        options: &SweeperOptions,
    ) -> Result<Self> {
        let coupling = options.coupling.clone();
        if coupling.moc_modulo == 0 {
            return Err(SweepError::InvalidOption {
                option: "moc_modulo".to_string(),
                value: "0".to_string(),
                reason: "MoC must run at least every n-th outer iteration".to_string(),
            });
        }
        let n_group = lib.n_group();
        let corrections = Arc::new(RwLock::new(CorrectionData::new(
            mesh.n_pin(),
            quad.ndir(),
            n_group,
        )));
        let mut moc = MocSweeper::new(
            mesh.clone(),
            lib.clone(),
            quad.clone(),
            options.ray_spacing,
            options.n_inner,
            options.boundary_update,
        )?;
        moc.enable_angular_tally(true);
        let mut sn = SnSweeper::new(
            mesh.clone(),
            lib,
            quad,
            CorrectedDiamondDifference::new(corrections.clone()),
            options.n_inner,
            options.boundary_update,
        )?;
        let coarse_data = CoarseData::for_mesh(&mesh, n_group).into_shared();
        moc.set_coarse_data(Some(coarse_data.clone()));
        sn.set_coarse_data(Some(coarse_data.clone()));
        info!(
            "2D3D sweeper: MoC every {} outer iterations after {} inactive, transverse leakage {}",
            coupling.moc_modulo, coupling.n_inactive_moc, coupling.do_tl
        );
        Ok(Self {
            mesh,
            moc,
            sn,
            corrections,
            coarse_data,
            coupling,
            n_outer: 0,
            sn_resid: vec![],
        })
    }

    /// The MoC sweeper
    pub fn moc(&self) -> &MocSweeper {
        &self.moc
    }

    /// The corrected Sn sweeper
    pub fn sn(&self) -> &SnSweeper<CorrectedDiamondDifference> {
        &self.sn
    }

    /// The correction factors
    pub fn corrections(&self) -> &SharedCorrectionData {
        &self.corrections
    }

    /// The coarse data both sweepers tally into
    pub fn coarse_data(&self) -> &SharedCoarseData {
        &self.coarse_data
    }

    /// Coupling options
    pub fn coupling(&self) -> &CouplingOptions {
        &self.coupling
    }

    /// Number of outer iterations started so far
    pub fn n_outer(&self) -> usize {
        self.n_outer
    }

    /// Residual between the Sn and the MoC pin flux, per outer iteration and group
    pub fn sn_resid(&self) -> &[Vec<f64>] {
        &self.sn_resid
    }

    /// Subtract the axial leakage of the last Sn sweep from the MoC source
    fn apply_transverse_leakage(&mut self, group: usize) -> Result<()> {
        let mesh = &self.mesh;
        let leakage = {
            let data = coarse_data::read(&self.coarse_data)?;
            if !data.has_axial() {
                return Ok(());
            }
            (0..mesh.n_pin())
                .map(|pin| {
                    let hz = mesh.hz()[mesh.pin_position(pin).z];
                    let top = data.net_current(mesh.coarse_surf(pin, Surface::Top), group);
                    let bottom = data.net_current(mesh.coarse_surf(pin, Surface::Bottom), group);
                    (top - bottom) / hz
                })
                .collect::<Vec<_>>()
        };
        let fine = (0..mesh.n_fine())
            .map(|r| -leakage[mesh.pin_of_fine(r)])
            .collect::<Vec<_>>();
        self.moc.add_to_source(&fine)
    }

    /// Refresh the correction factors of a group from the last MoC sweep
    fn update_corrections(&mut self, group: usize) -> Result<()> {
        self.sn.update_homogenized(self.moc.flux())?;
        let mut xstr = vec![0.0; self.mesh.n_pin()];
        self.sn.xs_mesh().xstr_1g(group, &mut xstr);
        if let Some(tally) = self.moc.angular_tally() {
            correction::write(&self.corrections)?.update_group(
                group,
                self.sn.quadrature(),
                &self.mesh,
                tally,
                &xstr,
            );
        }
        Ok(())
    }
}

impl TransportSweeper for PlaneSweeper2D3D {
    fn n_reg(&self) -> usize {
        self.moc.n_reg()
    }

    fn n_group(&self) -> usize {
        self.moc.n_group()
    }

    fn n_pin(&self) -> usize {
        self.mesh.n_pin()
    }

    fn volumes(&self) -> &[f64] {
        self.moc.volumes()
    }

    fn xs_mesh(&self) -> &XsMesh {
        self.moc.xs_mesh()
    }

    fn initialize(&mut self) {
        self.moc.initialize();
        self.sn.initialize();
        match correction::write(&self.corrections) {
            Ok(mut corrections) => corrections.reset(),
            Err(e) => warn!("2D3D sweeper: correction factors not reset: {e}"),
        }
        match coarse_data::write(&self.coarse_data) {
            Ok(mut data) => {
                data.set_has_radial(false);
                data.set_has_axial(false);
            }
            Err(e) => warn!("2D3D sweeper: coarse data not reset: {e}"),
        }
        self.n_outer = 0;
        self.sn_resid.clear();
    }

    fn sweep(&mut self, group: usize) -> Result<()> {
        check_group(group, self.n_group())?;
        let i_outer = self.n_outer.saturating_sub(1);
        let moc_due = self.coupling.moc_due(i_outer);
        if moc_due {
            if self.coupling.do_tl {
                self.apply_transverse_leakage(group)?;
            }
            self.moc.sweep(group)?;
            self.update_corrections(group)?;
        }
        self.sn.sweep(group)?;

        let mut sn_pin = vec![0.0; self.n_pin()];
        self.sn.pin_flux_1g(group, &mut sn_pin);
        let residual = if self.coupling.do_snproject || !moc_due {
            self.moc.set_pin_flux_1g(group, &sn_pin)
        } else {
            let mut moc_pin = vec![0.0; self.n_pin()];
            self.moc.pin_flux_1g(group, &mut moc_pin);
            pin_residual(&sn_pin, &moc_pin)
        };
        if let Some(resid) = self.sn_resid.last_mut() {
            resid[group] = residual;
        }
        debug!("2D3D outer {i_outer} group {group}: MoC {moc_due}, Sn-MoC residual {residual:.6e}");
        Ok(())
    }

    fn store_old_flux(&mut self) {
        self.moc.store_old_flux();
        self.sn.store_old_flux();
        self.n_outer += 1;
        self.sn_resid.push(vec![0.0; self.n_group()]);
    }

    fn flux(&self) -> &ScalarFlux {
        self.moc.flux()
    }

    fn old_flux(&self) -> &ScalarFlux {
        self.moc.old_flux()
    }

    fn create_source(&self) -> Source {
        Source::Coupled(Source2D3D::new(
            FlatSource::new(self.moc.n_reg(), self.n_group()),
            FlatSource::new(self.sn.n_reg(), self.n_group()),
        ))
    }

    fn assign_source(&mut self, source: Source) -> Result<()> {
        check_source_shape(&source, self.n_reg(), self.n_group())?;
        match source {
            Source::Coupled(s) => {
                let (moc, sn) = s.into_parts();
                let (moc, sn) = (Source::Flat(moc), Source::Flat(sn));
                // Both parts are checked before either sweeper is rebound
                check_source_shape(&sn, self.sn.n_reg(), self.sn.n_group())?;
                self.moc.assign_source(moc)?;
                self.sn.assign_source(sn)
            }
            other => Err(SweepError::SourceKind(format!(
                "the 2D3D sweeper needs a 2D3D source, got a {} source",
                other.kind()
            ))),
        }
    }

    fn update_source(&mut self, group: usize, fs: &[f64]) -> Result<()> {
        self.moc.update_source(group, fs)?;
        let vol = self.moc.volumes();
        let fs_pin = (0..self.n_pin())
            .map(|pin| {
                let (v, sum) = self
                    .mesh
                    .pin_fine_regions(pin)
                    .fold((0.0, 0.0), |(v, sum), r| (v + vol[r], sum + vol[r] * fs[r]));
                sum / v
            })
            .collect::<Vec<_>>();
        self.sn.update_source(group, &fs_pin)
    }

    /// Share tallies with external coarse data; `None` gives the sweeper
    /// private coarse data again
    fn set_coarse_data(&mut self, coarse_data: Option<SharedCoarseData>) {
        self.coarse_data = coarse_data.unwrap_or_else(|| {
            CoarseData::for_mesh(&self.mesh, self.moc.n_group()).into_shared()
        });
        self.moc.set_coarse_data(Some(self.coarse_data.clone()));
        self.sn.set_coarse_data(Some(self.coarse_data.clone()));
    }

    fn pin_flux_1g(&self, group: usize, out: &mut [f64]) {
        if self.coupling.expose_sn {
            self.sn.pin_flux_1g(group, out)
        } else {
            self.moc.pin_flux_1g(group, out)
        }
    }

    /// Set both pin fluxes; the residual is always that of the MoC flux
    fn set_pin_flux_1g(&mut self, group: usize, pin_flux: &[f64]) -> f64 {
        self.sn.set_pin_flux_1g(group, pin_flux);
        self.moc.set_pin_flux_1g(group, pin_flux)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::CoreMeshBuilder;
    use crate::quadrature::types::QuadratureType;
    use crate::sweeper::SweeperKind;
    use crate::types::BoundaryType;
    use crate::xs_mesh::{Material, ScatteringMatrix};
    use approx::*;

    fn sweeper(coupling: CouplingOptions) -> PlaneSweeper2D3D {
        let mut b = CoreMeshBuilder::new(&[1.26, 1.26], &[1.26, 1.26], &[2.0, 2.0]);
        b.set_subdivisions(2)
            .fill(0)
            .set_all_boundaries(BoundaryType::Reflect);
        let m = Material::new(
            vec![1.0],
            vec![0.0],
            vec![0.0],
            vec![0.0],
            ScatteringMatrix::zeros(1),
        )
        .unwrap();
        let mut options = SweeperOptions::default();
        options
            .set_kind(SweeperKind::TwoDThreeD)
            .set_quadrature(QuadratureType::LevelSymmetric { order: 4 })
            .set_n_inner(30)
            .set_coupling(coupling);
        let mesh = Arc::new(b.create_mesh().unwrap());
        let quad = AngularQuadrature::new(options.quadrature).unwrap();
        PlaneSweeper2D3D::new(
            mesh,
            Arc::new(MaterialLib::new(vec![m]).unwrap()),
            quad,
            &options,
        )
        .unwrap()
    }

    fn fixed_source(s: &mut PlaneSweeper2D3D) {
        let mut source = s.create_source();
        if let Source::Coupled(coupled) = &mut source {
            let (n_fine, n_pin) = (s.moc.n_reg(), s.sn.n_reg());
            coupled
                .moc_source_mut()
                .set_external(0, &vec![2.0; n_fine])
                .unwrap();
            coupled
                .sn_source_mut()
                .set_external(0, &vec![2.0; n_pin])
                .unwrap();
        }
        s.assign_source(source).unwrap();
        s.initialize();
    }

    #[test]
    fn test_infinite_medium_agrees() {
        let mut s = sweeper(CouplingOptions::default());
        fixed_source(&mut s);
        // The second MoC pass sees the leakage of the first, unconverged Sn
        // sweep; the error shrinks on every further pass
        for _ in 0..4 {
            s.store_old_flux();
            s.update_source(0, &vec![0.0; s.n_reg()]).unwrap();
            s.sweep(0).unwrap();
        }
        for phi in s.flux().group(0) {
            assert_relative_eq!(*phi, 2.0, max_relative = 1e-8);
        }
        for phi in s.sn.flux().group(0) {
            assert_relative_eq!(*phi, 2.0, max_relative = 1e-8);
        }
        assert_eq!(s.sn_resid().len(), 4);
        assert!(s.sn_resid()[3][0] < 1e-8);
    }

    #[test]
    fn test_skipped_moc_projects_sn_flux() {
        let coupling = CouplingOptions {
            moc_modulo: 2,
            ..Default::default()
        };
        let mut s = sweeper(coupling);
        fixed_source(&mut s);
        s.store_old_flux();
        s.update_source(0, &vec![0.0; s.n_reg()]).unwrap();
        s.sweep(0).unwrap();
        s.store_old_flux();
        s.update_source(0, &vec![0.0; s.n_reg()]).unwrap();
        s.sweep(0).unwrap();
        let mut sn = vec![0.0; s.n_pin()];
        let mut moc = vec![0.0; s.n_pin()];
        s.sn.pin_flux_1g(0, &mut sn);
        s.moc.pin_flux_1g(0, &mut moc);
        for (a, b) in sn.iter().zip(&moc) {
            assert_relative_eq!(*a, *b, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_zero_modulo_rejected() {
        let mut b = CoreMeshBuilder::new(&[1.0], &[1.0], &[1.0]);
        b.fill(0);
        let m = Material::new(
            vec![1.0],
            vec![0.0],
            vec![0.0],
            vec![0.0],
            ScatteringMatrix::zeros(1),
        )
        .unwrap();
        let mut options = SweeperOptions::default();
        options.coupling.moc_modulo = 0;
        let quad = AngularQuadrature::new(options.quadrature).unwrap();
        assert!(matches!(
            PlaneSweeper2D3D::new(
                Arc::new(b.create_mesh().unwrap()),
                Arc::new(MaterialLib::new(vec![m]).unwrap()),
                quad,
                &options,
            ),
            Err(SweepError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_bad_sn_part_leaves_sources_unbound() {
        let mut s = sweeper(CouplingOptions::default());
        let source = Source::Coupled(Source2D3D::new(
            FlatSource::new(s.moc.n_reg(), 1),
            FlatSource::new(s.sn.n_reg() + 3, 1),
        ));
        assert!(matches!(
            s.assign_source(source),
            Err(SweepError::SourceShape { .. })
        ));
        assert!(s.moc.source().is_none());
        assert!(s.sn.source().is_none());
    }

    #[test]
    fn test_bad_sn_part_keeps_previous_sources() {
        let mut s = sweeper(CouplingOptions::default());
        fixed_source(&mut s);
        let (moc_before, sn_before) = (s.moc.source().cloned(), s.sn.source().cloned());
        let mut bad = Source2D3D::new(
            FlatSource::new(s.moc.n_reg(), 1),
            FlatSource::new(s.sn.n_reg() + 3, 1),
        );
        bad.moc_source_mut()
            .set_external(0, &vec![5.0; s.moc.n_reg()])
            .unwrap();
        assert!(s.assign_source(Source::Coupled(bad)).is_err());
        assert!(moc_before.is_some());
        assert_eq!(s.moc.source().cloned(), moc_before);
        assert_eq!(s.sn.source().cloned(), sn_before);
    }

    #[test]
    fn test_set_pin_flux_reports_moc_residual() {
        let coupling = CouplingOptions {
            expose_sn: true,
            ..Default::default()
        };
        let mut s = sweeper(coupling);
        fixed_source(&mut s);
        let n_pin = s.n_pin();
        s.sn.set_pin_flux_1g(0, &vec![3.0; n_pin]);
        // The MoC flux is still 1 everywhere after initialization
        let residual = s.set_pin_flux_1g(0, &vec![1.0; n_pin]);
        assert_abs_diff_eq!(residual, 0.0, epsilon = 1e-14);

        let mut pin_flux = vec![0.0; n_pin];
        s.pin_flux_1g(0, &mut pin_flux);
        for phi in &pin_flux {
            assert_relative_eq!(*phi, 1.0);
        }
    }

    #[test]
    fn test_initialize_survives_poisoned_corrections() {
        let mut s = sweeper(CouplingOptions::default());
        fixed_source(&mut s);
        let corrections = s.corrections().clone();
        let _ = std::thread::spawn(move || {
            let _guard = corrections.write().unwrap();
            panic!("writer failed");
        })
        .join();
        assert!(s.corrections().is_poisoned());

        s.store_old_flux();
        s.initialize();
        assert_eq!(s.n_outer(), 0);
        assert!(s.sn_resid().is_empty());
        assert!(!s.coarse_data().read().unwrap().has_axial());
    }

    #[test]
    fn test_flat_source_rejected() {
        let mut s = sweeper(CouplingOptions::default());
        let source = Source::Flat(FlatSource::new(s.n_reg(), 1));
        assert!(matches!(
            s.assign_source(source),
            Err(SweepError::SourceKind(_))
        ));
    }
}
