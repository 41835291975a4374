//! Neutron sources
use crate::flux::ScalarFlux;
use crate::types::{Result, SweepError, RFPI};
use crate::xs_mesh::XsMesh;

/// Isotropic source, flat over each region.
///
/// Holds the source of the group currently being solved together with an
/// optional external source for every group.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatSource {
    n_reg: usize,
    n_group: usize,
    q: Vec<f64>,
    external: Vec<f64>,
}

impl FlatSource {
    /// Create an empty source
    pub fn new(n_reg: usize, n_group: usize) -> Self {
        Self {
            n_reg,
            n_group,
            q: vec![0.0; n_reg],
            external: vec![0.0; n_reg * n_group],
        }
    }

    /// Number of regions
    pub fn n_reg(&self) -> usize {
        self.n_reg
    }

    /// Number of groups
    pub fn n_group(&self) -> usize {
        self.n_group
    }

    /// Set the fixed external source of a group
    pub fn set_external(&mut self, group: usize, values: &[f64]) -> Result<()> {
        if group >= self.n_group {
            return Err(SweepError::GroupOutOfRange {
                group,
                n_group: self.n_group,
            });
        }
        if values.len() != self.n_reg {
            return Err(SweepError::SourceShape {
                found_regions: values.len(),
                found_groups: 1,
                expected_regions: self.n_reg,
                expected_groups: 1,
            });
        }
        self.external[group * self.n_reg..(group + 1) * self.n_reg].copy_from_slice(values);
        Ok(())
    }

    /// Reset the group source to the external source plus the fission source.
    ///
    /// `fs` is the fission source per region, already scaled by 1/k; it is
    /// spread over the group with the fission spectrum.
    pub fn fission(&mut self, xs: &XsMesh, fs: &[f64], group: usize) {
        self.q.copy_from_slice(&self.external[group * self.n_reg..(group + 1) * self.n_reg]);
        for xsr in xs {
            let chi = xsr.xsch[group];
            for ireg in &xsr.regions {
                self.q[*ireg] += chi * fs[*ireg];
            }
        }
    }

    /// Add scattering into the group from every other group
    pub fn in_scatter(&mut self, xs: &XsMesh, flux: &ScalarFlux, group: usize) {
        for xsr in xs {
            let row = xsr.scat.to(group);
            for ireg in &xsr.regions {
                self.q[*ireg] += row
                    .iter()
                    .enumerate()
                    .filter(|(from, _)| *from != group)
                    .map(|(from, s)| s * flux.get(*ireg, from))
                    .sum::<f64>();
            }
        }
    }

    /// Angular source for a sweep: the group source plus within-group
    /// scattering of `flux_1g`, per unit solid angle
    pub fn self_scatter(&self, xs: &XsMesh, group: usize, flux_1g: &[f64], out: &mut [f64]) {
        for xsr in xs {
            let sigma = xsr.scat.self_scatter(group);
            for ireg in &xsr.regions {
                out[*ireg] = (self.q[*ireg] + sigma * flux_1g[*ireg]) * RFPI;
            }
        }
    }

    /// Add an arbitrary contribution to the group source
    pub fn add_1g(&mut self, values: &[f64]) {
        for (q, v) in self.q.iter_mut().zip(values) {
            *q += v;
        }
    }

    /// The group source
    pub fn values(&self) -> &[f64] {
        &self.q
    }
}

/// Sources for the fine MoC regions and the coarse Sn pins of a 2D3D sweeper
#[derive(Debug, Clone, PartialEq)]
pub struct Source2D3D {
    moc: FlatSource,
    sn: FlatSource,
}

impl Source2D3D {
    /// Create from the two component sources
    pub fn new(moc: FlatSource, sn: FlatSource) -> Self {
        Self { moc, sn }
    }
    /// The embedded Sn source
    pub fn sn_source(&self) -> &FlatSource {
        &self.sn
    }
    /// The embedded Sn source, mutably
    pub fn sn_source_mut(&mut self) -> &mut FlatSource {
        &mut self.sn
    }
    /// The MoC source
    pub fn moc_source(&self) -> &FlatSource {
        &self.moc
    }
    /// The MoC source, mutably
    pub fn moc_source_mut(&mut self) -> &mut FlatSource {
        &mut self.moc
    }
    /// Split into the MoC and Sn sources
    pub fn into_parts(self) -> (FlatSource, FlatSource) {
        (self.moc, self.sn)
    }
}

/// A source bound to a sweeper
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// Flat source on the sweeper's own regions
    Flat(FlatSource),
    /// Composite source of a 2D3D sweeper
    Coupled(Source2D3D),
}

impl Source {
    /// Number of regions, fine regions for a composite source
    pub fn n_reg(&self) -> usize {
        match self {
            Source::Flat(s) => s.n_reg(),
            Source::Coupled(s) => s.moc.n_reg(),
        }
    }

    /// Number of groups
    pub fn n_group(&self) -> usize {
        match self {
            Source::Flat(s) => s.n_group(),
            Source::Coupled(s) => s.moc.n_group(),
        }
    }

    /// Name of the variant, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Source::Flat(_) => "flat",
            Source::Coupled(_) => "2D3D",
        }
    }

    /// The source to which external sources on the sweeper regions are added
    pub fn primary_mut(&mut self) -> &mut FlatSource {
        match self {
            Source::Flat(s) => s,
            Source::Coupled(s) => &mut s.moc,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::CoreMeshBuilder;
    use crate::xs_mesh::{Material, MaterialLib, ScatteringMatrix};
    use approx::*;

    fn xs() -> XsMesh {
        let m = Material::new(
            vec![0.1, 0.2],
            vec![0.0, 0.3],
            vec![0.0, 0.3],
            vec![0.9, 0.1],
            ScatteringMatrix::new(2, vec![0.4, 0.05, 0.3, 0.8]).unwrap(),
        )
        .unwrap();
        let lib = MaterialLib::new(vec![m]).unwrap();
        let mut b = CoreMeshBuilder::new(&[1.0, 1.0], &[1.0], &[1.0]);
        b.fill(0);
        XsMesh::new(&b.create_mesh().unwrap(), &lib).unwrap()
    }

    #[test]
    fn test_fission_resets_group_source() {
        let xs = xs();
        let mut q = FlatSource::new(2, 2);
        q.set_external(1, &[1.0, 2.0]).unwrap();
        q.add_1g(&[100.0, 100.0]);
        q.fission(&xs, &[2.0, 4.0], 1);
        assert_relative_eq!(q.values()[0], 1.0 + 0.1 * 2.0);
        assert_relative_eq!(q.values()[1], 2.0 + 0.1 * 4.0);
    }

    #[test]
    fn test_scattering() {
        let xs = xs();
        let mut flux = ScalarFlux::new(2, 2, 0.0);
        flux.group_mut(0).copy_from_slice(&[1.0, 2.0]);
        flux.group_mut(1).copy_from_slice(&[3.0, 4.0]);
        let mut q = FlatSource::new(2, 2);
        q.fission(&xs, &[0.0, 0.0], 1);
        q.in_scatter(&xs, &flux, 1);
        // Only the 0 -> 1 transfer counts as in-scatter
        assert_relative_eq!(q.values()[1], 0.3 * 2.0);

        let mut out = [0.0; 2];
        q.self_scatter(&xs, 1, flux.group(1), &mut out);
        assert_relative_eq!(out[0], (0.3 + 0.8 * 3.0) * RFPI);
    }

    #[test]
    fn test_external_shape_is_checked() {
        let mut q = FlatSource::new(2, 1);
        assert!(matches!(
            q.set_external(0, &[1.0]),
            Err(SweepError::SourceShape { .. })
        ));
        assert!(matches!(
            q.set_external(1, &[1.0, 1.0]),
            Err(SweepError::GroupOutOfRange { .. })
        ));
    }
}
