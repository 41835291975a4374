//! Materials and macroscopic cross sections mapped onto mesh regions
use crate::flux::ScalarFlux;
use crate::mesh::CoreMesh;
use crate::types::{Result, SweepError};
use log::debug;

/// Group-to-group scattering cross sections
#[derive(Debug, Clone, PartialEq)]
pub struct ScatteringMatrix {
    n_group: usize,
    /// `data[to * n_group + from]`
    data: Vec<f64>,
}

impl ScatteringMatrix {
    /// Create from a dense matrix stored row by row, rows being the destination group
    pub fn new(n_group: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != n_group * n_group {
            return Err(SweepError::InvalidCrossSections(format!(
                "scattering matrix has {} entries, expected {}",
                data.len(),
                n_group * n_group
            )));
        }
        Ok(Self { n_group, data })
    }

    /// A matrix with no scattering
    pub fn zeros(n_group: usize) -> Self {
        Self {
            n_group,
            data: vec![0.0; n_group * n_group],
        }
    }

    /// Number of groups
    pub fn n_group(&self) -> usize {
        self.n_group
    }

    /// Cross sections for scattering into a group, indexed by source group
    pub fn to(&self, group: usize) -> &[f64] {
        &self.data[group * self.n_group..(group + 1) * self.n_group]
    }

    /// Scattering from one group to another
    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.data[to * self.n_group + from]
    }

    /// Total scattering out of a group, including within-group scattering
    pub fn out(&self, group: usize) -> f64 {
        (0..self.n_group).map(|to| self.get(group, to)).sum()
    }

    /// Within-group scattering
    pub fn self_scatter(&self, group: usize) -> f64 {
        self.get(group, group)
    }
}

/// Macroscopic cross sections of one material
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    xsab: Vec<f64>,
    xsnf: Vec<f64>,
    xskf: Vec<f64>,
    xsch: Vec<f64>,
    xstr: Vec<f64>,
    scat: ScatteringMatrix,
}

impl Material {
    /// Create a material.
    ///
    /// The transport cross section is the absorption plus total out-scatter.
    pub fn new(
        xsab: Vec<f64>,
        xsnf: Vec<f64>,
        xskf: Vec<f64>,
        xsch: Vec<f64>,
        scat: ScatteringMatrix,
    ) -> Result<Self> {
        let n_group = xsab.len();
        if n_group == 0 {
            return Err(SweepError::InvalidCrossSections(
                "a material needs at least one group".to_string(),
            ));
        }
        for (name, xs) in [("nu-fission", &xsnf), ("kappa-fission", &xskf), ("chi", &xsch)] {
            if xs.len() != n_group {
                return Err(SweepError::InvalidCrossSections(format!(
                    "{name} has {} groups, absorption has {n_group}",
                    xs.len()
                )));
            }
        }
        if scat.n_group() != n_group {
            return Err(SweepError::InvalidCrossSections(format!(
                "scattering matrix has {} groups, absorption has {n_group}",
                scat.n_group()
            )));
        }
        let xstr = (0..n_group)
            .map(|g| xsab[g] + scat.out(g))
            .collect::<Vec<_>>();
        if let Some(g) = xstr.iter().position(|x| !(x.is_finite() && *x > 0.0)) {
            return Err(SweepError::InvalidCrossSections(format!(
                "transport cross section in group {g} is {}",
                xstr[g]
            )));
        }
        Ok(Self {
            xsab,
            xsnf,
            xskf,
            xsch,
            xstr,
            scat,
        })
    }

    /// Number of groups
    pub fn n_group(&self) -> usize {
        self.xsab.len()
    }
    /// Absorption
    pub fn xsab(&self) -> &[f64] {
        &self.xsab
    }
    /// ν-fission
    pub fn xsnf(&self) -> &[f64] {
        &self.xsnf
    }
    /// κ-fission
    pub fn xskf(&self) -> &[f64] {
        &self.xskf
    }
    /// Fission spectrum
    pub fn xsch(&self) -> &[f64] {
        &self.xsch
    }
    /// Transport cross section
    pub fn xstr(&self) -> &[f64] {
        &self.xstr
    }
    /// Scattering matrix
    pub fn scat(&self) -> &ScatteringMatrix {
        &self.scat
    }
}

/// The materials referenced by a mesh
#[derive(Debug, Clone)]
pub struct MaterialLib {
    n_group: usize,
    materials: Vec<Material>,
}

impl MaterialLib {
    /// Create a library; all materials must share a group structure
    pub fn new(materials: Vec<Material>) -> Result<Self> {
        let n_group = materials
            .first()
            .map(|m| m.n_group())
            .ok_or_else(|| SweepError::InvalidCrossSections("empty material library".to_string()))?;
        if let Some(i) = materials.iter().position(|m| m.n_group() != n_group) {
            return Err(SweepError::InvalidCrossSections(format!(
                "material {i} has {} groups, material 0 has {n_group}",
                materials[i].n_group()
            )));
        }
        Ok(Self { n_group, materials })
    }

    /// Number of groups
    pub fn n_group(&self) -> usize {
        self.n_group
    }

    /// Number of materials
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Is the library empty?
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Get a material
    pub fn get(&self, id: usize) -> Option<&Material> {
        self.materials.get(id)
    }

    /// Check that every material id of a mesh exists in the library
    pub fn check_mesh(&self, mesh: &CoreMesh) -> Result<()> {
        match mesh.materials().iter().find(|m| **m >= self.len()) {
            Some(m) => Err(SweepError::InvalidCrossSections(format!(
                "mesh uses material {m}, library holds {}",
                self.len()
            ))),
            None => Ok(()),
        }
    }
}

/// Cross sections shared by a set of mesh regions
#[derive(Debug, Clone, PartialEq)]
pub struct XsMeshRegion {
    /// Regions carrying these cross sections
    pub regions: Vec<usize>,
    /// Transport
    pub xstr: Vec<f64>,
    /// ν-fission
    pub xsnf: Vec<f64>,
    /// κ-fission
    pub xskf: Vec<f64>,
    /// Fission spectrum
    pub xsch: Vec<f64>,
    /// Scattering
    pub scat: ScatteringMatrix,
}

impl XsMeshRegion {
    fn from_material(regions: Vec<usize>, m: &Material) -> Self {
        Self {
            regions,
            xstr: m.xstr.clone(),
            xsnf: m.xsnf.clone(),
            xskf: m.xskf.clone(),
            xsch: m.xsch.clone(),
            scat: m.scat.clone(),
        }
    }
}

/// Cross sections for every region of a sweeper's mesh
#[derive(Debug, Clone, PartialEq)]
pub struct XsMesh {
    n_group: usize,
    n_reg: usize,
    regions: Vec<XsMeshRegion>,
}

impl XsMesh {
    /// Cross sections of the fine regions, one entry per material in use
    pub fn new(mesh: &CoreMesh, lib: &MaterialLib) -> Result<Self> {
        lib.check_mesh(mesh)?;
        let mut by_material = vec![vec![]; lib.len()];
        for (ireg, m) in mesh.materials().iter().enumerate() {
            by_material[*m].push(ireg);
        }
        let regions = by_material
            .into_iter()
            .enumerate()
            .filter(|(_, regions)| !regions.is_empty())
            .filter_map(|(id, regions)| {
                lib.get(id)
                    .map(|m| XsMeshRegion::from_material(regions, m))
            })
            .collect();
        Ok(Self {
            n_group: lib.n_group(),
            n_reg: mesh.n_fine(),
            regions,
        })
    }

    /// Cross sections of the pins, homogenized with volume weights
    pub fn homogenized(mesh: &CoreMesh, lib: &MaterialLib) -> Result<Self> {
        lib.check_mesh(mesh)?;
        let regions = (0..mesh.n_pin())
            .map(|pin| homogenize_pin(mesh, lib, pin, None))
            .collect();
        Ok(Self {
            n_group: lib.n_group(),
            n_reg: mesh.n_pin(),
            regions,
        })
    }

    /// Re-homogenize the pin cross sections with fine-region flux weights.
    ///
    /// Pins without flux in a group fall back to volume weights for that group.
    pub fn update_homogenized(
        &mut self,
        mesh: &CoreMesh,
        lib: &MaterialLib,
        fine_flux: &ScalarFlux,
    ) -> Result<()> {
        if self.n_reg != mesh.n_pin() || fine_flux.n_reg() != mesh.n_fine() {
            return Err(SweepError::InvalidMesh(format!(
                "cannot homogenize {} fine regions onto {} pins with {} regions",
                fine_flux.n_reg(),
                mesh.n_pin(),
                self.n_reg
            )));
        }
        for (pin, region) in self.regions.iter_mut().enumerate() {
            *region = homogenize_pin(mesh, lib, pin, Some(fine_flux));
        }
        debug!("updated homogenized cross sections on {} pins", self.n_reg);
        Ok(())
    }

    /// Number of groups
    pub fn n_group(&self) -> usize {
        self.n_group
    }

    /// Number of regions covered
    pub fn n_reg(&self) -> usize {
        self.n_reg
    }

    /// Iterate over the cross section regions
    pub fn iter(&self) -> std::slice::Iter<'_, XsMeshRegion> {
        self.regions.iter()
    }

    /// Transport cross section of every region in one group
    pub fn xstr_1g(&self, group: usize, out: &mut [f64]) {
        for xsr in &self.regions {
            for ireg in &xsr.regions {
                out[*ireg] = xsr.xstr[group];
            }
        }
    }
}

impl<'a> IntoIterator for &'a XsMesh {
    type Item = &'a XsMeshRegion;
    type IntoIter = std::slice::Iter<'a, XsMeshRegion>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

/// Weighted average of fine-region cross sections over a pin.
///
/// With no flux, or no flux in a group, the weights are the fine volumes.
/// Fission spectra are weighted by the fission source, scattering by the
/// flux of the source group.
fn homogenize_pin(
    mesh: &CoreMesh,
    lib: &MaterialLib,
    pin: usize,
    flux: Option<&ScalarFlux>,
) -> XsMeshRegion {
    let n_group = lib.n_group();
    let fine = mesh
        .pin_fine_regions(pin)
        .filter_map(|r| lib.get(mesh.material(r)).map(|m| (r, mesh.fine_volume(r), m)))
        .collect::<Vec<_>>();

    // Per-group weights, volume fallback for flux-free groups
    let weights = (0..n_group)
        .map(|g| {
            let flux_weights = flux.map(|phi| {
                fine.iter()
                    .map(|(r, v, _)| v * phi.get(*r, g))
                    .collect::<Vec<_>>()
            });
            match flux_weights {
                Some(w) if w.iter().sum::<f64>() > 0.0 => w,
                _ => fine.iter().map(|(_, v, _)| *v).collect(),
            }
        })
        .collect::<Vec<_>>();
    let average = |g: usize, value: &dyn Fn(&Material) -> f64| {
        let w = &weights[g];
        let total = w.iter().sum::<f64>();
        if total > 0.0 {
            fine.iter()
                .zip(w)
                .map(|((_, _, m), w)| w * value(m))
                .sum::<f64>()
                / total
        } else {
            0.0
        }
    };

    let xstr = (0..n_group).map(|g| average(g, &|m| m.xstr[g])).collect();
    let xsnf = (0..n_group).map(|g| average(g, &|m| m.xsnf[g])).collect();
    let xskf = (0..n_group).map(|g| average(g, &|m| m.xskf[g])).collect();

    let mut scat = vec![0.0; n_group * n_group];
    for to in 0..n_group {
        for from in 0..n_group {
            scat[to * n_group + from] = average(from, &|m| m.scat.get(from, to));
        }
    }

    let fission_source = fine
        .iter()
        .enumerate()
        .map(|(i, (_, _, m))| (0..n_group).map(|g| weights[g][i] * m.xsnf[g]).sum::<f64>())
        .collect::<Vec<_>>();
    let fs_sum = fission_source.iter().sum::<f64>();
    let volume = fine.iter().map(|(_, v, _)| v).sum::<f64>();
    let xsch = (0..n_group)
        .map(|g| {
            if fs_sum > 0.0 {
                fine.iter()
                    .zip(&fission_source)
                    .map(|((_, _, m), fs)| fs * m.xsch[g])
                    .sum::<f64>()
                    / fs_sum
            } else {
                fine.iter().map(|(_, v, m)| v * m.xsch[g]).sum::<f64>() / volume
            }
        })
        .collect();

    XsMeshRegion {
        regions: vec![pin],
        xstr,
        xsnf,
        xskf,
        xsch,
        scat: ScatteringMatrix {
            n_group,
            data: scat,
        },
    }
}
