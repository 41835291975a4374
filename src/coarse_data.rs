//! Partial currents on the coarse mesh
use crate::mesh::CoreMesh;
use crate::types::{Normal, Result, Surface, SweepError};
use std::sync::{Arc, RwLock};

/// Partial currents per coarse surface and group.
///
/// Entry `[0]` is the current flowing along the positive axis of the
/// surface normal, entry `[1]` the current along the negative axis.
#[derive(Debug, Clone, PartialEq)]
pub struct CoarseData {
    n_surf: usize,
    n_group: usize,
    partial_current: Vec<[f64; 2]>,
    normals: Vec<Normal>,
    has_radial: bool,
    has_axial: bool,
}

/// Handle to coarse data shared between a consumer and the sweepers filling it
pub type SharedCoarseData = Arc<RwLock<CoarseData>>;

impl CoarseData {
    /// Create coarse data for surfaces with the given normals
    pub fn new(normals: Vec<Normal>, n_group: usize) -> Self {
        let n_surf = normals.len();
        Self {
            n_surf,
            n_group,
            partial_current: vec![[0.0; 2]; n_surf * n_group],
            normals,
            has_radial: false,
            has_axial: false,
        }
    }

    /// Create coarse data for every coarse surface of a mesh
    pub fn for_mesh(mesh: &CoreMesh, n_group: usize) -> Self {
        let mut normals = vec![Normal::Z; mesh.n_surf()];
        for pin in 0..mesh.n_pin() {
            for surface in Surface::ALL {
                normals[mesh.coarse_surf(pin, surface)] = surface.normal();
            }
        }
        Self::new(normals, n_group)
    }

    /// Wrap in a shareable handle
    pub fn into_shared(self) -> SharedCoarseData {
        Arc::new(RwLock::new(self))
    }

    /// Number of surfaces
    pub fn n_surf(&self) -> usize {
        self.n_surf
    }

    /// Number of groups
    pub fn n_group(&self) -> usize {
        self.n_group
    }

    /// Normal of a surface
    pub fn normal(&self, surf: usize) -> Normal {
        self.normals[surf]
    }

    /// Zero every current of a group
    pub fn zero_data(&mut self, group: usize) {
        self.partial_current[group * self.n_surf..(group + 1) * self.n_surf]
            .iter_mut()
            .for_each(|c| *c = [0.0; 2]);
        self.has_radial = false;
        self.has_axial = false;
    }

    /// Zero the currents of a group on surfaces with a radial normal
    pub fn zero_radial(&mut self, group: usize) {
        let normals = &self.normals;
        self.partial_current[group * self.n_surf..(group + 1) * self.n_surf]
            .iter_mut()
            .zip(normals)
            .filter(|(_, n)| **n != Normal::Z)
            .for_each(|(c, _)| *c = [0.0; 2]);
        self.has_radial = false;
    }

    /// Add to the partial current through a surface.
    ///
    /// `positive` selects the current flowing along the positive axis.
    pub fn add(&mut self, surf: usize, group: usize, positive: bool, value: f64) {
        let c = &mut self.partial_current[group * self.n_surf + surf];
        c[usize::from(!positive)] += value;
    }

    /// Partial currents through a surface
    pub fn partial_current(&self, surf: usize, group: usize) -> [f64; 2] {
        self.partial_current[group * self.n_surf + surf]
    }

    /// Net current through a surface, positive along the axis
    pub fn net_current(&self, surf: usize, group: usize) -> f64 {
        let c = self.partial_current(surf, group);
        c[0] - c[1]
    }

    /// Mark the radial currents as valid
    pub fn set_has_radial(&mut self, value: bool) {
        self.has_radial = value;
    }

    /// Mark the axial currents as valid
    pub fn set_has_axial(&mut self, value: bool) {
        self.has_axial = value;
    }

    /// Do the radial currents hold a tally?
    pub fn has_radial(&self) -> bool {
        self.has_radial
    }

    /// Do the axial currents hold a tally?
    pub fn has_axial(&self) -> bool {
        self.has_axial
    }
}

/// Acquire the write lock of shared coarse data
pub(crate) fn write(
    data: &SharedCoarseData,
) -> Result<std::sync::RwLockWriteGuard<'_, CoarseData>> {
    data.write()
        .map_err(|_| SweepError::PoisonedLock("coarse data"))
}

/// Acquire the read lock of shared coarse data
pub(crate) fn read(data: &SharedCoarseData) -> Result<std::sync::RwLockReadGuard<'_, CoarseData>> {
    data.read().map_err(|_| SweepError::PoisonedLock("coarse data"))
}
