//! Transport sweepers
pub mod moc;
pub mod plane_2d3d;
pub mod sn;

use crate::coarse_data::SharedCoarseData;
use crate::flux::ScalarFlux;
use crate::mesh::CoreMesh;
use crate::quadrature::types::QuadratureType;
use crate::quadrature::AngularQuadrature;
use crate::source::Source;
use crate::types::{Result, SweepError};
use crate::xs_mesh::{MaterialLib, XsMesh};
use log::info;
use std::str::FromStr;
use std::sync::Arc;

pub use moc::MocSweeper;
pub use plane_2d3d::PlaneSweeper2D3D;
pub use sn::{CorrectedDiamondDifference, DiamondDifference, SnSweeper};

/// When the incoming boundary flux is refreshed during a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryUpdate {
    /// After every direction; directions are swept one after another
    #[default]
    GaussSeidel,
    /// After all directions; directions are swept in parallel
    Jacobi,
}

impl FromStr for BoundaryUpdate {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gs" | "gauss-seidel" | "gauss_seidel" => Ok(BoundaryUpdate::GaussSeidel),
            "jacobi" => Ok(BoundaryUpdate::Jacobi),
            _ => Err(SweepError::InvalidOption {
                option: "boundary_update".to_string(),
                value: s.to_string(),
                reason: "expected `gs` or `jacobi`".to_string(),
            }),
        }
    }
}

/// The kind of sweeper to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweeperKind {
    /// 3-D discrete ordinates on the pin mesh
    #[default]
    Sn,
    /// 2-D method of characteristics on the fine mesh of every plane
    Moc,
    /// MoC-corrected 3-D Sn
    TwoDThreeD,
}

impl FromStr for SweeperKind {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sn" => Ok(SweeperKind::Sn),
            "moc" => Ok(SweeperKind::Moc),
            "2d3d" => Ok(SweeperKind::TwoDThreeD),
            _ => Err(SweepError::InvalidOption {
                option: "sweeper".to_string(),
                value: s.to_string(),
                reason: "failed to detect a valid sweeper type".to_string(),
            }),
        }
    }
}

/// Coupling options of the 2D3D sweeper
#[derive(Debug, Clone, PartialEq)]
pub struct CouplingOptions {
    /// Run MoC on every `moc_modulo`-th outer iteration after the inactive window
    pub moc_modulo: usize,
    /// Outer iterations at the start of the solve on which MoC always runs
    pub n_inactive_moc: usize,
    /// Apply axial transverse leakage from Sn to the MoC source
    pub do_tl: bool,
    /// Project the Sn pin flux onto the MoC flux after every Sn sweep
    pub do_snproject: bool,
    /// Report the Sn pin flux instead of the MoC pin flux
    pub expose_sn: bool,
}

impl Default for CouplingOptions {
    fn default() -> Self {
        Self {
            moc_modulo: 1,
            n_inactive_moc: 0,
            do_tl: true,
            do_snproject: false,
            expose_sn: false,
        }
    }
}

impl CouplingOptions {
    /// Does MoC run on the given outer iteration?
    ///
    /// A zero `moc_modulo` means MoC only runs in the inactive window.
    pub fn moc_due(&self, i_outer: usize) -> bool {
        i_outer < self.n_inactive_moc
            || (i_outer - self.n_inactive_moc).checked_rem(self.moc_modulo) == Some(0)
    }
}

/// Options for building a sweeper
#[derive(Debug, Clone, PartialEq)]
pub struct SweeperOptions {
    /// Kind of sweeper
    pub kind: SweeperKind,
    /// Angular quadrature
    pub quadrature: QuadratureType,
    /// Inner iterations per group sweep
    pub n_inner: usize,
    /// Boundary update mode
    pub boundary_update: BoundaryUpdate,
    /// Perpendicular distance between MoC rays
    pub ray_spacing: f64,
    /// 2D3D coupling
    pub coupling: CouplingOptions,
}

impl Default for SweeperOptions {
    fn default() -> Self {
        Self {
            kind: SweeperKind::Sn,
            quadrature: QuadratureType::default(),
            n_inner: 5,
            boundary_update: BoundaryUpdate::GaussSeidel,
            ray_spacing: 0.05,
            coupling: CouplingOptions::default(),
        }
    }
}

impl SweeperOptions {
    /// Set the kind of sweeper
    pub fn set_kind(&mut self, kind: SweeperKind) -> &mut Self {
        self.kind = kind;
        self
    }
    /// Set the quadrature
    pub fn set_quadrature(&mut self, quadrature: QuadratureType) -> &mut Self {
        self.quadrature = quadrature;
        self
    }
    /// Set the number of inner iterations
    pub fn set_n_inner(&mut self, n_inner: usize) -> &mut Self {
        self.n_inner = n_inner;
        self
    }
    /// Set the boundary update mode
    pub fn set_boundary_update(&mut self, boundary_update: BoundaryUpdate) -> &mut Self {
        self.boundary_update = boundary_update;
        self
    }
    /// Set the ray spacing
    pub fn set_ray_spacing(&mut self, ray_spacing: f64) -> &mut Self {
        self.ray_spacing = ray_spacing;
        self
    }
    /// Set the coupling options
    pub fn set_coupling(&mut self, coupling: CouplingOptions) -> &mut Self {
        self.coupling = coupling;
        self
    }
}

/// Operations shared by every sweeper
pub trait TransportSweeper {
    /// Number of flux regions
    fn n_reg(&self) -> usize;
    /// Number of energy groups
    fn n_group(&self) -> usize;
    /// Number of pins of the underlying mesh
    fn n_pin(&self) -> usize;
    /// Volumes of the flux regions
    fn volumes(&self) -> &[f64];
    /// Cross sections of the flux regions
    fn xs_mesh(&self) -> &XsMesh;

    /// Set a flat initial guess for the flux and the boundary conditions
    fn initialize(&mut self);

    /// Solve one group with the bound source
    fn sweep(&mut self, group: usize) -> Result<()>;

    /// Copy the flux into the old flux
    fn store_old_flux(&mut self);

    /// Current scalar flux
    fn flux(&self) -> &ScalarFlux;

    /// Scalar flux at the last call to [`TransportSweeper::store_old_flux`]
    fn old_flux(&self) -> &ScalarFlux;

    /// Create a source matching the regions and groups of the sweeper
    fn create_source(&self) -> Source;

    /// Bind a source to the sweeper
    fn assign_source(&mut self, source: Source) -> Result<()>;

    /// Rebuild the group source from a fission source and the in-scatter
    /// from other groups. `fs` is the fission source per region over k.
    fn update_source(&mut self, group: usize, fs: &[f64]) -> Result<()>;

    /// Tally partial currents into the given coarse data, or stop tallying
    fn set_coarse_data(&mut self, coarse_data: Option<SharedCoarseData>);

    /// Fission source per region, divided by `k`
    fn calc_fission_source(&self, k: f64, out: &mut [f64]) {
        let flux = self.flux();
        out.iter_mut().for_each(|v| *v = 0.0);
        for xsr in self.xs_mesh() {
            for ireg in &xsr.regions {
                out[*ireg] = xsr
                    .xsnf
                    .iter()
                    .enumerate()
                    .map(|(g, nf)| nf * flux.get(*ireg, g))
                    .sum::<f64>()
                    / k;
            }
        }
    }

    /// Volume-integrated fission rate of the current or old flux
    fn total_fission(&self, old: bool) -> f64 {
        let flux = if old { self.old_flux() } else { self.flux() };
        let vol = self.volumes();
        self.xs_mesh()
            .iter()
            .map(|xsr| {
                xsr.regions
                    .iter()
                    .map(|ireg| {
                        vol[*ireg]
                            * xsr
                                .xsnf
                                .iter()
                                .enumerate()
                                .map(|(g, nf)| nf * flux.get(*ireg, g))
                                .sum::<f64>()
                    })
                    .sum::<f64>()
            })
            .sum()
    }

    /// Volume-averaged flux of every pin in one group
    fn pin_flux_1g(&self, group: usize, out: &mut [f64]);

    /// Impose pin-averaged flux in one group, returning the residual between
    /// the imposed and the previous pin flux
    fn set_pin_flux_1g(&mut self, group: usize, pin_flux: &[f64]) -> f64;
}

/// Residual between two pin flux fields: the L2 norm of the difference over
/// the number of pins
pub fn pin_residual(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
        / a.len() as f64
}

/// Check the shape of a source against a sweeper
pub(crate) fn check_source_shape(source: &Source, n_reg: usize, n_group: usize) -> Result<()> {
    if source.n_reg() != n_reg || source.n_group() != n_group {
        Err(SweepError::SourceShape {
            found_regions: source.n_reg(),
            found_groups: source.n_group(),
            expected_regions: n_reg,
            expected_groups: n_group,
        })
    } else {
        Ok(())
    }
}

/// Check a group index against a sweeper
pub(crate) fn check_group(group: usize, n_group: usize) -> Result<()> {
    if group < n_group {
        Ok(())
    } else {
        Err(SweepError::GroupOutOfRange { group, n_group })
    }
}

/// One of the available sweepers
#[derive(Debug)]
pub enum Sweeper {
    /// Discrete ordinates with diamond differencing
    Sn(SnSweeper<DiamondDifference>),
    /// Method of characteristics
    Moc(MocSweeper),
    /// 2D3D
    TwoDThreeD(Box<PlaneSweeper2D3D>),
}

macro_rules! delegate {
    ($self:ident, $s:ident => $e:expr) => {
        match $self {
            Sweeper::Sn($s) => $e,
            Sweeper::Moc($s) => $e,
            Sweeper::TwoDThreeD($s) => $e,
        }
    };
}

impl TransportSweeper for Sweeper {
    fn n_reg(&self) -> usize {
        delegate!(self, s => s.n_reg())
    }
    fn n_group(&self) -> usize {
        delegate!(self, s => s.n_group())
    }
    fn n_pin(&self) -> usize {
        delegate!(self, s => s.n_pin())
    }
    fn volumes(&self) -> &[f64] {
        delegate!(self, s => s.volumes())
    }
    fn xs_mesh(&self) -> &XsMesh {
        delegate!(self, s => s.xs_mesh())
    }
    fn initialize(&mut self) {
        delegate!(self, s => s.initialize())
    }
    fn sweep(&mut self, group: usize) -> Result<()> {
        delegate!(self, s => s.sweep(group))
    }
    fn store_old_flux(&mut self) {
        delegate!(self, s => s.store_old_flux())
    }
    fn flux(&self) -> &ScalarFlux {
        delegate!(self, s => s.flux())
    }
    fn old_flux(&self) -> &ScalarFlux {
        delegate!(self, s => s.old_flux())
    }
    fn create_source(&self) -> Source {
        delegate!(self, s => s.create_source())
    }
    fn assign_source(&mut self, source: Source) -> Result<()> {
        delegate!(self, s => s.assign_source(source))
    }
    fn update_source(&mut self, group: usize, fs: &[f64]) -> Result<()> {
        delegate!(self, s => s.update_source(group, fs))
    }
    fn set_coarse_data(&mut self, coarse_data: Option<SharedCoarseData>) {
        delegate!(self, s => s.set_coarse_data(coarse_data))
    }
    fn calc_fission_source(&self, k: f64, out: &mut [f64]) {
        delegate!(self, s => s.calc_fission_source(k, out))
    }
    fn total_fission(&self, old: bool) -> f64 {
        delegate!(self, s => s.total_fission(old))
    }
    fn pin_flux_1g(&self, group: usize, out: &mut [f64]) {
        delegate!(self, s => s.pin_flux_1g(group, out))
    }
    fn set_pin_flux_1g(&mut self, group: usize, pin_flux: &[f64]) -> f64 {
        delegate!(self, s => s.set_pin_flux_1g(group, pin_flux))
    }
}

/// Build the sweeper selected by the options
pub fn create_sweeper(
    options: &SweeperOptions,
    mesh: Arc<CoreMesh>,
    lib: Arc<MaterialLib>,
) -> Result<Sweeper> {
    let quad = AngularQuadrature::new(options.quadrature)?;
    info!(
        "creating {:?} sweeper with {} directions on {} pins",
        options.kind,
        quad.ndir(),
        mesh.n_pin()
    );
    Ok(match options.kind {
        SweeperKind::Sn => Sweeper::Sn(SnSweeper::new(
            mesh,
            lib,
            quad,
            DiamondDifference,
            options.n_inner,
            options.boundary_update,
        )?),
        SweeperKind::Moc => Sweeper::Moc(MocSweeper::new(
            mesh,
            lib,
            quad,
            options.ray_spacing,
            options.n_inner,
            options.boundary_update,
        )?),
        SweeperKind::TwoDThreeD => {
            Sweeper::TwoDThreeD(Box::new(PlaneSweeper2D3D::new(mesh, lib, quad, options)?))
        }
    })
}
