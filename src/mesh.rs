//! Orthogonal pin mesh
use crate::types::{BoundaryType, Position, Result, Surface, SweepError};

/// A 3-D orthogonal mesh of pins with a fine 2-D subdivision of every pin.
///
/// Pins (coarse cells) are numbered lexicographically with x fastest, then y,
/// then z. Each pin is split into `n_sub × n_sub` equal fine regions, which
/// are numbered per plane on the fine grid, again x fastest.
#[derive(Debug, Clone)]
pub struct CoreMesh {
    hx: Vec<f64>,
    hy: Vec<f64>,
    hz: Vec<f64>,
    fine_x: Vec<f64>,
    fine_y: Vec<f64>,
    n_sub: usize,
    materials: Vec<usize>,
    boundary: [BoundaryType; 6],
}

impl CoreMesh {
    /// Number of pin columns
    pub fn nx(&self) -> usize {
        self.hx.len()
    }
    /// Number of pin rows
    pub fn ny(&self) -> usize {
        self.hy.len()
    }
    /// Number of planes
    pub fn nz(&self) -> usize {
        self.hz.len()
    }
    /// Number of pins
    pub fn n_pin(&self) -> usize {
        self.nx() * self.ny() * self.nz()
    }
    /// Pin column widths
    pub fn hx(&self) -> &[f64] {
        &self.hx
    }
    /// Pin row widths
    pub fn hy(&self) -> &[f64] {
        &self.hy
    }
    /// Plane heights
    pub fn hz(&self) -> &[f64] {
        &self.hz
    }
    /// Fine regions per pin along each radial axis
    pub fn n_sub(&self) -> usize {
        self.n_sub
    }
    /// Fine columns per plane
    pub fn nfx(&self) -> usize {
        self.nx() * self.n_sub
    }
    /// Fine rows per plane
    pub fn nfy(&self) -> usize {
        self.ny() * self.n_sub
    }
    /// Fine regions per plane
    pub fn n_fine_plane(&self) -> usize {
        self.nfx() * self.nfy()
    }
    /// Fine regions in the mesh
    pub fn n_fine(&self) -> usize {
        self.n_fine_plane() * self.nz()
    }
    /// Total width of the domain along x
    pub fn width(&self) -> f64 {
        self.fine_x[self.nfx()]
    }
    /// Total width of the domain along y
    pub fn height(&self) -> f64 {
        self.fine_y[self.nfy()]
    }
    /// Boundary condition on a face of the domain
    pub fn boundary(&self, surface: Surface) -> BoundaryType {
        self.boundary[surface.index()]
    }
    /// Boundary conditions on all faces, indexed by [`Surface::index`]
    pub fn boundaries(&self) -> [BoundaryType; 6] {
        self.boundary
    }

    /// Index of the pin at a position
    pub fn pin_index(&self, position: Position) -> usize {
        (position.z * self.ny() + position.y) * self.nx() + position.x
    }

    /// Position of a pin
    pub fn pin_position(&self, pin: usize) -> Position {
        let nxy = self.nx() * self.ny();
        Position::new(pin % self.nx(), (pin % nxy) / self.nx(), pin / nxy)
    }

    /// Volume of a pin
    pub fn pin_volume(&self, pin: usize) -> f64 {
        let p = self.pin_position(pin);
        self.hx[p.x] * self.hy[p.y] * self.hz[p.z]
    }

    /// Volumes of all pins
    pub fn pin_volumes(&self) -> Vec<f64> {
        (0..self.n_pin()).map(|p| self.pin_volume(p)).collect()
    }

    /// Fine x edges of a plane, `nfx + 1` values starting at 0
    pub fn fine_x_edges(&self) -> &[f64] {
        &self.fine_x
    }

    /// Fine y edges of a plane, `nfy + 1` values starting at 0
    pub fn fine_y_edges(&self) -> &[f64] {
        &self.fine_y
    }

    /// Index of a fine region from its fine column, fine row and plane
    pub fn fine_index(&self, fx: usize, fy: usize, z: usize) -> usize {
        z * self.n_fine_plane() + fy * self.nfx() + fx
    }

    /// Area of a fine region of any plane, from its index within the plane
    pub fn fine_area(&self, ifine_plane: usize) -> f64 {
        let fx = ifine_plane % self.nfx();
        let fy = ifine_plane / self.nfx();
        (self.fine_x[fx + 1] - self.fine_x[fx]) * (self.fine_y[fy + 1] - self.fine_y[fy])
    }

    /// Volume of a fine region
    pub fn fine_volume(&self, ifine: usize) -> f64 {
        let z = ifine / self.n_fine_plane();
        self.fine_area(ifine % self.n_fine_plane()) * self.hz[z]
    }

    /// Volumes of all fine regions
    pub fn fine_volumes(&self) -> Vec<f64> {
        (0..self.n_fine()).map(|i| self.fine_volume(i)).collect()
    }

    /// Material of a fine region
    pub fn material(&self, ifine: usize) -> usize {
        self.materials[ifine]
    }

    /// Materials of all fine regions
    pub fn materials(&self) -> &[usize] {
        &self.materials
    }

    /// The pin containing a fine region
    pub fn pin_of_fine(&self, ifine: usize) -> usize {
        let z = ifine / self.n_fine_plane();
        let local = ifine % self.n_fine_plane();
        let fx = local % self.nfx();
        let fy = local / self.nfx();
        self.pin_index(Position::new(fx / self.n_sub, fy / self.n_sub, z))
    }

    /// The fine regions inside a pin
    pub fn pin_fine_regions(&self, pin: usize) -> impl Iterator<Item = usize> + '_ {
        let p = self.pin_position(pin);
        let n_sub = self.n_sub;
        (0..n_sub).flat_map(move |sy| {
            (0..n_sub).map(move |sx| {
                self.fine_index(p.x * n_sub + sx, p.y * n_sub + sy, p.z)
            })
        })
    }

    /// Number of radial coarse surfaces in one plane
    fn n_surf_radial(&self) -> usize {
        (self.nx() + 1) * self.ny() + self.nx() * (self.ny() + 1)
    }

    /// Number of coarse surfaces
    pub fn n_surf(&self) -> usize {
        self.nz() * self.n_surf_radial() + (self.nz() + 1) * self.nx() * self.ny()
    }

    /// Index of a face of a pin in the coarse surface numbering.
    ///
    /// Radial surfaces come first, plane by plane: the x-normal faces row by
    /// row, then the y-normal faces. The axial surfaces follow, lowest first.
    /// Neighbouring pins share the index of their common face.
    pub fn coarse_surf(&self, pin: usize, surface: Surface) -> usize {
        let p = self.pin_position(pin);
        let (nx, ny) = (self.nx(), self.ny());
        let plane = p.z * self.n_surf_radial();
        let x_face = |x: usize| plane + p.y * (nx + 1) + x;
        let y_face = |y: usize| plane + ny * (nx + 1) + y * nx + p.x;
        let z_face = |z: usize| self.nz() * self.n_surf_radial() + z * nx * ny + p.y * nx + p.x;
        match surface {
            Surface::West => x_face(p.x),
            Surface::East => x_face(p.x + 1),
            Surface::South => y_face(p.y),
            Surface::North => y_face(p.y + 1),
            Surface::Bottom => z_face(p.z),
            Surface::Top => z_face(p.z + 1),
        }
    }
}

/// Builder for a [`CoreMesh`]
#[derive(Debug, Clone)]
pub struct CoreMeshBuilder {
    hx: Vec<f64>,
    hy: Vec<f64>,
    hz: Vec<f64>,
    n_sub: usize,
    fill: Option<usize>,
    pin_materials: Vec<Option<Vec<usize>>>,
    boundary: [BoundaryType; 6],
}

impl CoreMeshBuilder {
    /// Create a builder from the pin column widths, row widths and plane heights
    pub fn new(hx: &[f64], hy: &[f64], hz: &[f64]) -> Self {
        Self {
            hx: hx.to_vec(),
            hy: hy.to_vec(),
            hz: hz.to_vec(),
            n_sub: 1,
            fill: None,
            pin_materials: vec![None; hx.len() * hy.len() * hz.len()],
            boundary: [BoundaryType::Vacuum; 6],
        }
    }

    /// Set the number of fine regions per pin along each radial axis
    pub fn set_subdivisions(&mut self, n_sub: usize) -> &mut Self {
        self.n_sub = n_sub;
        self
    }

    /// Set the material of every pin without an explicit assignment
    pub fn fill(&mut self, material: usize) -> &mut Self {
        self.fill = Some(material);
        self
    }

    /// Set the materials of a pin.
    ///
    /// Either one material for the whole pin or one per fine region, row by
    /// row with x fastest.
    pub fn set_pin_materials(&mut self, position: Position, materials: &[usize]) -> &mut Self {
        let (nx, ny) = (self.hx.len(), self.hy.len());
        let pin = (position.z * ny + position.y) * nx + position.x;
        if let Some(entry) = self.pin_materials.get_mut(pin) {
            *entry = Some(materials.to_vec());
        }
        self
    }

    /// Set the boundary condition on a face of the domain
    pub fn set_boundary(&mut self, surface: Surface, boundary: BoundaryType) -> &mut Self {
        self.boundary[surface.index()] = boundary;
        self
    }

    /// Set the same boundary condition on every face of the domain
    pub fn set_all_boundaries(&mut self, boundary: BoundaryType) -> &mut Self {
        self.boundary = [boundary; 6];
        self
    }

    /// Create the mesh
    pub fn create_mesh(self) -> Result<CoreMesh> {
        for (name, widths) in [("x", &self.hx), ("y", &self.hy), ("z", &self.hz)] {
            if widths.is_empty() {
                return Err(SweepError::InvalidMesh(format!(
                    "no pins along the {name} axis"
                )));
            }
            if let Some(w) = widths.iter().find(|w| !(w.is_finite() && **w > 0.0)) {
                return Err(SweepError::InvalidMesh(format!(
                    "pin width {w} along the {name} axis is not positive"
                )));
            }
        }
        if self.n_sub == 0 {
            return Err(SweepError::InvalidMesh(
                "pins need at least one fine region".to_string(),
            ));
        }
        let (nx, ny) = (self.hx.len(), self.hy.len());
        let n_sub = self.n_sub;
        let nfx = nx * n_sub;
        let nfy = ny * n_sub;

        let mut materials = vec![0; nfx * nfy * self.hz.len()];
        for (pin, assigned) in self.pin_materials.iter().enumerate() {
            let (x, y, z) = (pin % nx, (pin / nx) % ny, pin / (nx * ny));
            let pin_materials = match (assigned, self.fill) {
                (Some(m), _) if m.len() == 1 => vec![m[0]; n_sub * n_sub],
                (Some(m), _) if m.len() == n_sub * n_sub => m.clone(),
                (Some(m), _) => {
                    return Err(SweepError::InvalidMesh(format!(
                        "pin ({x}, {y}, {z}) has {} materials, expected 1 or {}",
                        m.len(),
                        n_sub * n_sub
                    )))
                }
                (None, Some(fill)) => vec![fill; n_sub * n_sub],
                (None, None) => {
                    return Err(SweepError::InvalidMesh(format!(
                        "pin ({x}, {y}, {z}) has no material"
                    )))
                }
            };
            for sy in 0..n_sub {
                for sx in 0..n_sub {
                    let fx = x * n_sub + sx;
                    let fy = y * n_sub + sy;
                    materials[z * nfx * nfy + fy * nfx + fx] = pin_materials[sy * n_sub + sx];
                }
            }
        }

        let fine_edges = |widths: &[f64]| {
            let mut edges = Vec::with_capacity(widths.len() * n_sub + 1);
            edges.push(0.0);
            let mut start = 0.0;
            for w in widths {
                for i in 1..=n_sub {
                    edges.push(start + w * i as f64 / n_sub as f64);
                }
                start += w;
            }
            edges
        };

        Ok(CoreMesh {
            fine_x: fine_edges(&self.hx),
            fine_y: fine_edges(&self.hy),
            hx: self.hx,
            hy: self.hy,
            hz: self.hz,
            n_sub,
            materials,
            boundary: self.boundary,
        })
    }
}
