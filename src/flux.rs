//! Scalar flux storage
use std::ops::{Index, IndexMut};

/// Scalar flux over regions and energy groups, stored group by group
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarFlux {
    n_reg: usize,
    n_group: usize,
    data: Vec<f64>,
}

impl ScalarFlux {
    /// Create a flux field filled with a value
    pub fn new(n_reg: usize, n_group: usize, value: f64) -> Self {
        Self {
            n_reg,
            n_group,
            data: vec![value; n_reg * n_group],
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

    /// Flux of one group
    pub fn group(&self, group: usize) -> &[f64] {
        &self.data[group * self.n_reg..(group + 1) * self.n_reg]
    }

    /// Mutable flux of one group
    pub fn group_mut(&mut self, group: usize) -> &mut [f64] {
        &mut self.data[group * self.n_reg..(group + 1) * self.n_reg]
    }

    /// Flux of one region and group
    pub fn get(&self, reg: usize, group: usize) -> f64 {
        self.data[group * self.n_reg + reg]
    }

    /// Set the flux of one region and group
    pub fn set(&mut self, reg: usize, group: usize, value: f64) {
        self.data[group * self.n_reg + reg] = value;
    }

    /// Set every value
    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// All values, group by group
    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

impl Index<(usize, usize)> for ScalarFlux {
    type Output = f64;

    fn index(&self, (reg, group): (usize, usize)) -> &f64 {
        &self.data[group * self.n_reg + reg]
    }
}

impl IndexMut<(usize, usize)> for ScalarFlux {
    fn index_mut(&mut self, (reg, group): (usize, usize)) -> &mut f64 {
        &mut self.data[group * self.n_reg + reg]
    }
}
