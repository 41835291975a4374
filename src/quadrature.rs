//! Angular quadrature
pub mod angle;
pub mod chebyshev_gauss;
pub mod level_symmetric;
pub mod types;

pub use angle::Angle;

use crate::types::{Normal, HPI};
use self::types::{QuadratureError, QuadratureType};

/// An ordered set of directions covering the unit sphere.
///
/// Directions are stored octant by octant, in the order 1 (+,+,+), 2 (-,+,+),
/// 3 (-,-,+), 4 (+,-,+) and then 5 to 8, the same with negative `oz`. Every
/// octant holds the same number of directions, in the same order, so a
/// direction's mirror images differ only in octant.
#[derive(Debug, Clone, PartialEq)]
pub struct AngularQuadrature {
    quadrature_type: QuadratureType,
    angles: Vec<Angle>,
    ndir_oct: usize,
}

impl AngularQuadrature {
    /// Create a quadrature
    pub fn new(quadrature_type: QuadratureType) -> Result<Self, QuadratureError> {
        let first = match quadrature_type {
            QuadratureType::LevelSymmetric { order } => level_symmetric::first_octant(order)?,
            QuadratureType::ChebyshevGauss {
                n_azimuthal,
                n_polar,
            } => chebyshev_gauss::first_octant(n_azimuthal, n_polar)?,
        };
        Self::from_first_octant(quadrature_type, &first)
    }

    /// Create a quadrature by expanding the directions of the first octant
    pub fn from_first_octant(
        quadrature_type: QuadratureType,
        first: &[Angle],
    ) -> Result<Self, QuadratureError> {
        if first.is_empty() {
            return Err(QuadratureError::Invalid(
                "the first octant holds no directions".to_string(),
            ));
        }
        if let Some(a) = first.iter().find(|a| a.octant() != 1) {
            return Err(QuadratureError::Invalid(format!(
                "direction {a} is not in the first octant"
            )));
        }
        let angles = (1..=8)
            .flat_map(|octant| first.iter().map(move |a| a.to_octant(octant)))
            .collect();
        Ok(Self {
            quadrature_type,
            angles,
            ndir_oct: first.len(),
        })
    }

    /// The definition the quadrature was built from
    pub fn quadrature_type(&self) -> QuadratureType {
        self.quadrature_type
    }

    /// Number of directions
    pub fn ndir(&self) -> usize {
        self.angles.len()
    }

    /// Number of directions per octant
    pub fn ndir_oct(&self) -> usize {
        self.ndir_oct
    }

    /// Get a direction
    pub fn get(&self, iang: usize) -> &Angle {
        &self.angles[iang]
    }

    /// All directions
    pub fn angles(&self) -> &[Angle] {
        &self.angles
    }

    /// Iterate over the directions
    pub fn iter(&self) -> std::slice::Iter<'_, Angle> {
        self.angles.iter()
    }

    /// Octant (numbered from 1) of a direction index
    pub fn octant_of(&self, iang: usize) -> usize {
        iang / self.ndir_oct + 1
    }

    /// Index of the mirror image of a direction through a plane of the given normal
    pub fn reflect(&self, iang: usize, normal: Normal) -> usize {
        let octant = self.octant_of(iang);
        let offset = iang % self.ndir_oct;
        let upper = (octant - 1) % 4 + 1;
        let lower = octant > 4;
        let reflected = match normal {
            Normal::X => {
                let o = match upper {
                    1 => 2,
                    2 => 1,
                    3 => 4,
                    _ => 3,
                };
                if lower {
                    o + 4
                } else {
                    o
                }
            }
            Normal::Y => {
                let o = match upper {
                    1 => 4,
                    2 => 3,
                    3 => 2,
                    _ => 1,
                };
                if lower {
                    o + 4
                } else {
                    o
                }
            }
            Normal::Z => {
                if lower {
                    upper
                } else {
                    upper + 4
                }
            }
        };
        (reflected - 1) * self.ndir_oct + offset
    }

    /// The directions with non-negative `oz`, i.e. the first four octants
    pub fn upper_hemisphere(&self) -> &[Angle] {
        &self.angles[..4 * self.ndir_oct]
    }

    /// Sum of the weights scaled to solid angle; 4π for a complete set
    pub fn total_weight(&self) -> f64 {
        self.angles.iter().map(|a| a.weight).sum::<f64>() * HPI
    }
}

impl<'a> IntoIterator for &'a AngularQuadrature {
    type Item = &'a Angle;
    type IntoIter = std::slice::Iter<'a, Angle>;

    fn into_iter(self) -> Self::IntoIter {
        self.angles.iter()
    }
}

impl std::fmt::Display for AngularQuadrature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{:?}, {} directions", self.quadrature_type, self.ndir())?;
        for (i, a) in self.angles.iter().enumerate() {
            writeln!(f, "{i:4} {a}")?;
        }
        Ok(())
    }
}
