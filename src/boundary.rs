//! Angular flux on the faces of the domain
use crate::quadrature::AngularQuadrature;
use crate::types::{BoundaryType, Normal};

/// Angular flux on the domain faces, per group, direction and face normal.
///
/// For each direction only the faces the direction enters through are
/// stored: along each axis this is the upwind face of the domain. The same
/// layout holds outgoing flux when used as the downwind buffer of a sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryCondition {
    n_group: usize,
    n_angle: usize,
    face_sizes: [usize; 3],
    offsets: [usize; 3],
    stride: usize,
    /// Mirror direction of every direction, per normal
    reflection: Vec<[usize; 3]>,
    /// Boundary type of the face each direction leaves through, per normal
    downwind: Vec<[BoundaryType; 3]>,
    /// Boundary type of the face each direction enters through, per normal
    upwind: Vec<[BoundaryType; 3]>,
    data: Vec<f64>,
}

impl BoundaryCondition {
    /// Create a store for the first `n_angle` directions of a quadrature.
    ///
    /// `face_sizes` holds the number of values on an x-, y- and z-normal face
    /// of the domain. `boundary` is indexed by [`crate::types::Surface::index`].
    pub fn new(
        n_group: usize,
        quad: &AngularQuadrature,
        n_angle: usize,
        face_sizes: [usize; 3],
        boundary: [BoundaryType; 6],
    ) -> Self {
        let offsets = [0, face_sizes[0], face_sizes[0] + face_sizes[1]];
        let stride = face_sizes.iter().sum::<usize>();
        let angles = &quad.angles()[..n_angle];
        let reflection = (0..n_angle)
            .map(|a| Normal::ALL.map(|n| quad.reflect(a, n)))
            .collect();
        let downwind = angles
            .iter()
            .map(|a| Normal::ALL.map(|n| boundary[a.downwind_surface(n).index()]))
            .collect();
        let upwind = angles
            .iter()
            .map(|a| Normal::ALL.map(|n| boundary[a.upwind_surface(n).index()]))
            .collect();
        Self {
            n_group,
            n_angle,
            face_sizes,
            offsets,
            stride,
            reflection,
            downwind,
            upwind,
            data: vec![0.0; n_group * n_angle * stride],
        }
    }

    /// A single-group store with the same layout
    pub fn single_group(&self) -> Self {
        Self {
            n_group: 1,
            n_angle: self.n_angle,
            face_sizes: self.face_sizes,
            offsets: self.offsets,
            stride: self.stride,
            reflection: self.reflection.clone(),
            downwind: self.downwind.clone(),
            upwind: self.upwind.clone(),
            data: vec![0.0; self.n_angle * self.stride],
        }
    }

    /// Number of groups
    pub fn n_group(&self) -> usize {
        self.n_group
    }

    /// Number of directions
    pub fn n_angle(&self) -> usize {
        self.n_angle
    }

    /// Number of values on a face of the given normal
    pub fn face_size(&self, normal: Normal) -> usize {
        self.face_sizes[normal.index()]
    }

    fn range(&self, group: usize, angle: usize, normal: Normal) -> std::ops::Range<usize> {
        let start = (group * self.n_angle + angle) * self.stride + self.offsets[normal.index()];
        start..start + self.face_sizes[normal.index()]
    }

    /// Face flux for a group, direction and normal
    pub fn face(&self, group: usize, angle: usize, normal: Normal) -> &[f64] {
        &self.data[self.range(group, angle, normal)]
    }

    /// Mutable face flux for a group, direction and normal
    pub fn face_mut(&mut self, group: usize, angle: usize, normal: Normal) -> &mut [f64] {
        let range = self.range(group, angle, normal);
        &mut self.data[range]
    }

    /// Overwrite the face flux for a group, direction and normal
    pub fn set_face(&mut self, group: usize, angle: usize, normal: Normal, values: &[f64]) {
        self.face_mut(group, angle, normal).copy_from_slice(values);
    }

    /// Set the incoming flux on every reflective face; vacuum faces are zero
    pub fn initialize(&mut self, value: f64) {
        for group in 0..self.n_group {
            for angle in 0..self.n_angle {
                for normal in Normal::ALL {
                    let v = match self.upwind[angle][normal.index()] {
                        BoundaryType::Reflect => value,
                        BoundaryType::Vacuum => 0.0,
                    };
                    self.face_mut(group, angle, normal).fill(v);
                }
            }
        }
    }

    /// Hand the outgoing flux of one direction on to the directions it feeds.
    ///
    /// `out` is a single-group store holding the outgoing flux of `angle`.
    /// Across a reflective face the mirror direction receives it; across a
    /// vacuum face it is discarded and the mirror direction gets nothing.
    pub fn update_angle(&mut self, group: usize, angle: usize, out: &BoundaryCondition) {
        for normal in Normal::ALL {
            if self.face_size(normal) == 0 {
                continue;
            }
            let target = self.reflection[angle][normal.index()];
            match self.downwind[angle][normal.index()] {
                BoundaryType::Reflect => {
                    let range = self.range(group, target, normal);
                    self.data[range].copy_from_slice(out.face(0, angle, normal));
                }
                BoundaryType::Vacuum => self.face_mut(group, target, normal).fill(0.0),
            }
        }
    }

    /// Hand the outgoing flux of every direction on; see [`Self::update_angle`]
    pub fn update(&mut self, group: usize, out: &BoundaryCondition) {
        for angle in 0..self.n_angle {
            self.update_angle(group, angle, out);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::quadrature::types::QuadratureType;
    use crate::types::Surface;

    fn quad() -> AngularQuadrature {
        AngularQuadrature::new(QuadratureType::LevelSymmetric { order: 4 }).unwrap()
    }

    #[test]
    fn test_vacuum_faces_stay_empty() {
        let q = quad();
        let mut boundary = [BoundaryType::Vacuum; 6];
        boundary[Surface::West.index()] = BoundaryType::Reflect;
        let mut bc = BoundaryCondition::new(2, &q, q.ndir(), [2, 3, 6], boundary);
        bc.initialize(1.0);
        for (a, angle) in q.iter().enumerate() {
            let expected = if angle.ox > 0.0 { 1.0 } else { 0.0 };
            assert_eq!(bc.face(1, a, Normal::X), &[expected; 2]);
            assert_eq!(bc.face(1, a, Normal::Z), &[0.0; 6]);
        }
    }

    #[test]
    fn test_reflection_feeds_mirror_direction() {
        let q = quad();
        let mut bc =
            BoundaryCondition::new(1, &q, q.ndir(), [1, 2, 3], [BoundaryType::Reflect; 6]);
        let mut out = bc.single_group();
        out.set_face(0, 0, Normal::Y, &[3.0, 4.0]);
        bc.update_angle(0, 0, &out);
        assert_eq!(bc.face(0, q.reflect(0, Normal::Y), Normal::Y), &[3.0, 4.0]);
        assert_eq!(bc.face(0, 0, Normal::Y), &[0.0, 0.0]);
    }

    #[test]
    fn test_vacuum_discards_outgoing_flux() {
        let q = quad();
        let mut bc = BoundaryCondition::new(1, &q, q.ndir(), [1, 1, 1], [BoundaryType::Vacuum; 6]);
        let target = q.reflect(3, Normal::X);
        bc.set_face(0, target, Normal::X, &[9.0]);
        let mut out = bc.single_group();
        out.set_face(0, 3, Normal::X, &[5.0]);
        bc.update(0, &out);
        assert_eq!(bc.face(0, target, Normal::X), &[0.0]);
    }
}
