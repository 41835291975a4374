//! Discrete directions.
use crate::types::{Normal, Surface, PI};
use approx::{AbsDiffEq, RelativeEq, UlpsEq};

/// Number of ULPs within which two angles are considered equal
const ANGLE_ULPS: u32 = 4;

/// A single direction of an angular quadrature.
#[derive(Debug, Clone, Copy)]
pub struct Angle {
    /// x-component of the direction
    pub ox: f64,
    /// y-component of the direction
    pub oy: f64,
    /// z-component of the direction
    pub oz: f64,
    /// Azimuthal angle in [0, 2π)
    pub alpha: f64,
    /// Polar angle, measured from the z axis
    pub theta: f64,
    /// Quadrature weight
    pub weight: f64,
    /// Reciprocal of the sine of the polar angle. Converts a length projected
    /// onto the x-y plane into a true path length. Infinite for directions
    /// along the z axis.
    pub rsintheta: f64,
}

impl Angle {
    /// Construct from direction cosines. The cosines are normalised.
    pub fn from_direction(ox: f64, oy: f64, oz: f64, weight: f64) -> Self {
        let norm = (ox * ox + oy * oy + oz * oz).sqrt();
        Self::from_unit(ox / norm, oy / norm, oz / norm, weight)
    }

    /// Construct from cosines that are already normalised
    fn from_unit(ox: f64, oy: f64, oz: f64, weight: f64) -> Self {
        let sintheta = (ox * ox + oy * oy).sqrt();
        let mut alpha = oy.atan2(ox);
        if alpha < 0.0 {
            alpha += 2.0 * PI;
        }
        Self {
            ox,
            oy,
            oz,
            alpha,
            theta: oz.clamp(-1.0, 1.0).acos(),
            weight,
            rsintheta: reciprocal_sine(sintheta),
        }
    }

    /// Construct from the azimuthal and polar angles
    pub fn from_angles(alpha: f64, theta: f64, weight: f64) -> Self {
        let sintheta = theta.sin();
        Self {
            ox: sintheta * alpha.cos(),
            oy: sintheta * alpha.sin(),
            oz: theta.cos(),
            alpha,
            theta,
            weight,
            rsintheta: reciprocal_sine(sintheta),
        }
    }

    /// Direction cosine along an axis
    pub fn cosine(&self, normal: Normal) -> f64 {
        match normal {
            Normal::X => self.ox,
            Normal::Y => self.oy,
            Normal::Z => self.oz,
        }
    }

    /// Octant of the direction, numbered from 1.
    ///
    /// Zero cosines count as positive.
    pub fn octant(&self) -> usize {
        let upper = match (self.ox >= 0.0, self.oy >= 0.0) {
            (true, true) => 1,
            (false, true) => 2,
            (false, false) => 3,
            (true, false) => 4,
        };
        if self.oz >= 0.0 {
            upper
        } else {
            upper + 4
        }
    }

    /// Copy of the angle moved into the given octant (numbered from 1)
    pub fn to_octant(&self, octant: usize) -> Angle {
        debug_assert!((1..=8).contains(&octant));
        let (sx, sy) = match (octant - 1) % 4 {
            0 => (1.0, 1.0),
            1 => (-1.0, 1.0),
            2 => (-1.0, -1.0),
            _ => (1.0, -1.0),
        };
        let sz = if octant > 4 { -1.0 } else { 1.0 };
        Angle::from_unit(
            sx * self.ox.abs(),
            sy * self.oy.abs(),
            sz * self.oz.abs(),
            self.weight,
        )
    }

    /// Mirror image of the angle through a plane of the given normal
    pub fn reflect(&self, normal: Normal) -> Angle {
        match normal {
            Normal::X => Angle::from_unit(-self.ox, self.oy, self.oz, self.weight),
            Normal::Y => Angle::from_unit(self.ox, -self.oy, self.oz, self.weight),
            Normal::Z => Angle::from_unit(self.ox, self.oy, -self.oz, self.weight),
        }
    }

    /// The face, along the given axis, through which the direction enters a cell.
    ///
    /// A zero cosine maps to the same face as a positive one, so that this
    /// agrees with the ascending traversal order used for such directions.
    pub fn upwind_surface(&self, normal: Normal) -> Surface {
        match normal {
            Normal::X => {
                if self.ox >= 0.0 {
                    Surface::West
                } else {
                    Surface::East
                }
            }
            Normal::Y => {
                if self.oy >= 0.0 {
                    Surface::South
                } else {
                    Surface::North
                }
            }
            Normal::Z => {
                if self.oz >= 0.0 {
                    Surface::Bottom
                } else {
                    Surface::Top
                }
            }
        }
    }

    /// The face, along the given axis, through which the direction leaves a cell
    pub fn downwind_surface(&self, normal: Normal) -> Surface {
        self.upwind_surface(normal).opposite()
    }

    /// Does the direction have no component in the x-y plane?
    pub fn is_axial(&self) -> bool {
        !self.rsintheta.is_finite()
    }
}

fn reciprocal_sine(sintheta: f64) -> f64 {
    if sintheta > f64::EPSILON {
        1.0 / sintheta
    } else {
        f64::INFINITY
    }
}

impl std::fmt::Display for Angle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.8}, {:.8}, {:.8}) alpha: {:.6} deg, theta: {:.6} deg, weight: {:.8}",
            self.ox,
            self.oy,
            self.oz,
            self.alpha.to_degrees(),
            self.theta.to_degrees(),
            self.weight
        )
    }
}

impl AbsDiffEq for Angle {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::EPSILON
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.ox.abs_diff_eq(&other.ox, epsilon)
            && self.oy.abs_diff_eq(&other.oy, epsilon)
            && self.oz.abs_diff_eq(&other.oz, epsilon)
            && self.alpha.abs_diff_eq(&other.alpha, epsilon)
            && self.theta.abs_diff_eq(&other.theta, epsilon)
            && self.weight.abs_diff_eq(&other.weight, epsilon)
            && self.rsintheta.abs_diff_eq(&other.rsintheta, epsilon)
    }
}

impl RelativeEq for Angle {
    fn default_max_relative() -> f64 {
        f64::EPSILON
    }

    fn relative_eq(&self, other: &Self, epsilon: f64, max_relative: f64) -> bool {
        self.ox.relative_eq(&other.ox, epsilon, max_relative)
            && self.oy.relative_eq(&other.oy, epsilon, max_relative)
            && self.oz.relative_eq(&other.oz, epsilon, max_relative)
            && self.alpha.relative_eq(&other.alpha, epsilon, max_relative)
            && self.theta.relative_eq(&other.theta, epsilon, max_relative)
            && self.weight.relative_eq(&other.weight, epsilon, max_relative)
            && self
                .rsintheta
                .relative_eq(&other.rsintheta, epsilon, max_relative)
    }
}

impl UlpsEq for Angle {
    fn default_max_ulps() -> u32 {
        ANGLE_ULPS
    }

    fn ulps_eq(&self, other: &Self, epsilon: f64, max_ulps: u32) -> bool {
        self.ox.ulps_eq(&other.ox, epsilon, max_ulps)
            && self.oy.ulps_eq(&other.oy, epsilon, max_ulps)
            && self.oz.ulps_eq(&other.oz, epsilon, max_ulps)
            && self.alpha.ulps_eq(&other.alpha, epsilon, max_ulps)
            && self.theta.ulps_eq(&other.theta, epsilon, max_ulps)
            && self.weight.ulps_eq(&other.weight, epsilon, max_ulps)
            && self.rsintheta.ulps_eq(&other.rsintheta, epsilon, max_ulps)
    }
}

impl PartialEq for Angle {
    fn eq(&self, other: &Self) -> bool {
        self.ulps_eq(other, f64::EPSILON, ANGLE_ULPS)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::{assert_relative_eq, assert_ulps_eq};

    #[test]
    fn test_cosines_match_angles() {
        let a = Angle::from_angles(0.3, 1.1, 0.25);
        let b = Angle::from_direction(a.ox, a.oy, a.oz, 0.25);
        assert_relative_eq!(a, b, epsilon = 1e-14, max_relative = 1e-12);
        assert_relative_eq!(
            a.ox * a.ox + a.oy * a.oy + a.oz * a.oz,
            1.0,
            epsilon = 1e-15
        );
    }

    #[test]
    fn test_direction_is_normalised() {
        let a = Angle::from_direction(1.0, 2.0, 2.0, 1.0);
        assert_ulps_eq!(a.ox, 1.0 / 3.0, max_ulps = 4);
        assert_ulps_eq!(a.oz, 2.0 / 3.0, max_ulps = 4);
    }

    #[test]
    fn test_octants_round_trip() {
        let a = Angle::from_direction(0.2, 0.5, 0.7, 0.1);
        for octant in 1..=8 {
            let b = a.to_octant(octant);
            assert_eq!(b.octant(), octant);
            assert_eq!(b.to_octant(1), a);
        }
    }

    #[test]
    fn test_reflection_flips_one_component() {
        let a = Angle::from_direction(0.2, -0.5, 0.7, 0.1);
        let r = a.reflect(Normal::Y);
        assert_ulps_eq!(r.oy, -a.oy);
        assert_ulps_eq!(r.ox, a.ox);
        assert_eq!(r.reflect(Normal::Y), a);
    }

    #[test]
    fn test_upwind_surface() {
        let a = Angle::from_direction(-0.2, 0.5, 0.7, 0.1);
        assert_eq!(a.upwind_surface(Normal::X), Surface::East);
        assert_eq!(a.upwind_surface(Normal::Y), Surface::South);
        assert_eq!(a.upwind_surface(Normal::Z), Surface::Bottom);
        assert_eq!(a.downwind_surface(Normal::X), Surface::West);
    }

    #[test]
    fn test_zero_cosine_maps_to_lower_face() {
        let a = Angle::from_direction(0.0, 0.6, 0.8, 1.0);
        assert_eq!(a.upwind_surface(Normal::X), Surface::West);
        assert_eq!(a.octant(), 1);
    }

    #[test]
    fn test_axial_direction() {
        let a = Angle::from_direction(0.0, 0.0, 1.0, 1.0);
        assert!(a.is_axial());
        let b = Angle::from_direction(0.1, 0.0, 1.0, 1.0);
        assert!(!b.is_axial());
    }

    #[test]
    fn test_equality_is_approximate() {
        let a = Angle::from_angles(0.7, 0.9, 0.5);
        let mut b = a;
        b.ox = f64::from_bits(a.ox.to_bits() + 1);
        assert_eq!(a, b);
        b.ox += 1e-8;
        assert_ne!(a, b);
    }
}
