//! Common types, constants and errors
use crate::quadrature::types::QuadratureError;

/// π
pub const PI: f64 = std::f64::consts::PI;
/// π/2, the solid angle carried by a unit of quadrature weight
pub const HPI: f64 = 0.5 * PI;
/// 4π
pub const FPI: f64 = 4.0 * PI;
/// 1/(4π)
pub const RFPI: f64 = 1.0 / FPI;

/// Axis normal to a family of faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Normal {
    /// Faces of constant x
    X,
    /// Faces of constant y
    Y,
    /// Faces of constant z
    Z,
}

impl Normal {
    /// All normals in index order
    pub const ALL: [Normal; 3] = [Normal::X, Normal::Y, Normal::Z];

    /// Position of the normal in `[X, Y, Z]`
    pub fn index(self) -> usize {
        match self {
            Normal::X => 0,
            Normal::Y => 1,
            Normal::Z => 2,
        }
    }
}

/// A face of a cell or of the whole domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    /// +x
    East,
    /// +y
    North,
    /// -x
    West,
    /// -y
    South,
    /// +z
    Top,
    /// -z
    Bottom,
}

impl Surface {
    /// All surfaces in index order
    pub const ALL: [Surface; 6] = [
        Surface::East,
        Surface::North,
        Surface::West,
        Surface::South,
        Surface::Top,
        Surface::Bottom,
    ];

    /// Position of the surface in [`Surface::ALL`]
    pub fn index(self) -> usize {
        match self {
            Surface::East => 0,
            Surface::North => 1,
            Surface::West => 2,
            Surface::South => 3,
            Surface::Top => 4,
            Surface::Bottom => 5,
        }
    }

    /// The axis normal to the surface
    pub fn normal(self) -> Normal {
        match self {
            Surface::East | Surface::West => Normal::X,
            Surface::North | Surface::South => Normal::Y,
            Surface::Top | Surface::Bottom => Normal::Z,
        }
    }

    /// The surface on the other side of the cell
    pub fn opposite(self) -> Surface {
        match self {
            Surface::East => Surface::West,
            Surface::West => Surface::East,
            Surface::North => Surface::South,
            Surface::South => Surface::North,
            Surface::Top => Surface::Bottom,
            Surface::Bottom => Surface::Top,
        }
    }

    /// Does the outward normal of the surface point along the positive axis?
    pub fn is_positive(self) -> bool {
        matches!(self, Surface::East | Surface::North | Surface::Top)
    }
}

/// Location of a coarse cell in the pin mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    /// Column
    pub x: usize,
    /// Row
    pub y: usize,
    /// Plane
    pub z: usize,
}

impl Position {
    /// Create a position
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }
}

/// Treatment of the angular flux entering the domain through a face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryType {
    /// Nothing comes in
    #[default]
    Vacuum,
    /// Outgoing flux comes back in along the mirrored direction
    Reflect,
}

/// Errors raised by the sweep engine
#[derive(thiserror::Error, Debug)]
pub enum SweepError {
    /// An option carried a value that cannot be used
    #[error("invalid value `{value}` for option `{option}`: {reason}")]
    InvalidOption {
        /// Option name
        option: String,
        /// Offending value
        value: String,
        /// What is wrong with it
        reason: String,
    },
    /// An option that nothing recognises
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    /// A sweeper was asked to do something that needs a bound source
    #[error("no source has been assigned to the sweeper before `{0}`")]
    MissingSource(&'static str),
    /// A source was built for a different mesh
    #[error(
        "source shape ({found_regions} regions, {found_groups} groups) does not match \
         the sweeper ({expected_regions} regions, {expected_groups} groups)"
    )]
    SourceShape {
        /// Regions in the source
        found_regions: usize,
        /// Groups in the source
        found_groups: usize,
        /// Regions in the sweeper
        expected_regions: usize,
        /// Groups in the sweeper
        expected_groups: usize,
    },
    /// A source of the wrong variant was handed to a sweeper
    #[error("source kind mismatch: {0}")]
    SourceKind(String),
    /// Energy group index out of range
    #[error("group {group} is out of range for {n_group} groups")]
    GroupOutOfRange {
        /// Requested group
        group: usize,
        /// Number of groups
        n_group: usize,
    },
    /// The mesh description is inconsistent
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),
    /// The material data is inconsistent
    #[error("invalid cross sections: {0}")]
    InvalidCrossSections(String),
    /// Quadrature construction failed
    #[error(transparent)]
    Quadrature(#[from] QuadratureError),
    /// A mode that exists in the interface but has no implementation
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    /// Another thread panicked while holding shared coupling data
    #[error("the shared {0} lock was poisoned")]
    PoisonedLock(&'static str),
}

/// Result type of the sweep engine
pub type Result<T> = std::result::Result<T, SweepError>;
