//! Type definitions.

/// Quadrature error
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum QuadratureError {
    /// Rule not found
    #[error("no level-symmetric set of order {0} is available")]
    RuleNotFound(usize),
    /// Malformed set of directions or weights
    #[error("invalid quadrature: {0}")]
    Invalid(String),
}

/// Definition of an angular quadrature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuadratureType {
    /// Level-symmetric set of the given (even) order
    LevelSymmetric {
        /// The order N of the S_N set
        order: usize,
    },
    /// Product of a Chebyshev azimuthal set and a Gauss-Legendre polar set
    ChebyshevGauss {
        /// Number of azimuthal angles per octant
        n_azimuthal: usize,
        /// Number of polar angles per octant
        n_polar: usize,
    },
}

impl Default for QuadratureType {
    fn default() -> Self {
        QuadratureType::LevelSymmetric { order: 4 }
    }
}
