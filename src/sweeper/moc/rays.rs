//! Characteristic rays across the fine radial grid
use crate::mesh::CoreMesh;
use crate::quadrature::Angle;
use crate::types::{Normal, Result, Surface, SweepError};
use log::debug;

/// Distances closer than this count as a simultaneous crossing of an x and a y edge
const CORNER_TOLERANCE: f64 = 1e-12;

/// Part of a ray inside one fine region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Fine region within the plane
    pub region: usize,
    /// Length projected onto the plane
    pub length: f64,
}

/// Passage of a ray through a face of a pin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    /// Number of segments traversed before the crossing
    pub segment: usize,
    /// Column and row of a pin owning the face
    pub pin: (usize, usize),
    /// The face of that pin
    pub surface: Surface,
}

/// A point on the boundary of the plane: the normal of the face and the
/// fine row (x faces) or fine column (y faces) along it
pub type FacePosition = (Normal, usize);

/// A single ray
#[derive(Debug, Clone, PartialEq)]
pub struct Ray {
    /// Perpendicular width the ray represents
    pub width: f64,
    /// Where the ray enters the plane
    pub entry: FacePosition,
    /// Where the ray leaves the plane
    pub exit: FacePosition,
    /// Segments in the order they are traversed
    pub segments: Vec<Segment>,
    /// Pin faces crossed, including the entry and exit faces
    pub crossings: Vec<Crossing>,
}

/// The rays of one direction
#[derive(Debug, Clone, PartialEq)]
pub struct AngleRays {
    /// Rays, those entering through the y face first
    pub rays: Vec<Ray>,
    /// Summed width of the rays leaving through each x face row and y face column
    pub exit_width: [Vec<f64>; 2],
    /// Regions no ray passes through
    pub missed: Vec<usize>,
}

/// Rays for every direction of the upper hemisphere
#[derive(Debug, Clone, PartialEq)]
pub struct RayData {
    spacing: f64,
    angles: Vec<AngleRays>,
}

impl RayData {
    /// Lay out and trace the rays of every direction.
    ///
    /// Segment lengths are scaled per region and direction so the traced
    /// area matches the true area of the region.
    pub fn new(mesh: &CoreMesh, angles: &[Angle], spacing: f64) -> Result<Self> {
        if !(spacing.is_finite() && spacing > 0.0) {
            return Err(SweepError::InvalidOption {
                option: "ray_spacing".to_string(),
                value: spacing.to_string(),
                reason: "ray spacing must be positive".to_string(),
            });
        }
        let areas = (0..mesh.n_fine_plane())
            .map(|r| mesh.fine_area(r))
            .collect::<Vec<_>>();
        let angles = angles
            .iter()
            .map(|angle| trace_angle(mesh, angle, spacing, &areas))
            .collect::<Vec<_>>();
        debug!(
            "traced {} rays for {} directions",
            angles.iter().map(|a| a.rays.len()).sum::<usize>(),
            angles.len()
        );
        Ok(Self { spacing, angles })
    }

    /// Perpendicular ray spacing
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    /// Rays of one direction
    pub fn angle(&self, iang: usize) -> &AngleRays {
        &self.angles[iang]
    }

    /// Number of directions
    pub fn n_angle(&self) -> usize {
        self.angles.len()
    }
}

/// Index of the interval of `edges` containing `x`
fn locate(edges: &[f64], x: f64) -> usize {
    edges
        .partition_point(|e| *e <= x)
        .saturating_sub(1)
        .min(edges.len() - 2)
}

fn trace_angle(mesh: &CoreMesh, angle: &Angle, spacing: f64, areas: &[f64]) -> AngleRays {
    let (nfx, nfy) = (mesh.nfx(), mesh.nfy());
    let mut angle_rays = AngleRays {
        rays: vec![],
        exit_width: [vec![0.0; nfy], vec![0.0; nfx]],
        missed: vec![],
    };
    if angle.is_axial() {
        angle_rays.missed = (0..mesh.n_fine_plane()).collect();
        return angle_rays;
    }
    let cx = angle.ox * angle.rsintheta;
    let cy = angle.oy * angle.rsintheta;
    let (width, height) = (mesh.width(), mesh.height());
    let xe = mesh.fine_x_edges();
    let ye = mesh.fine_y_edges();

    // Rays through the upwind y face
    if cy != 0.0 {
        let n = ((width * cy.abs() / spacing).ceil() as usize).max(1);
        let y0 = if cy > 0.0 { 0.0 } else { height };
        let fy = if cy > 0.0 { 0 } else { nfy - 1 };
        for i in 0..n {
            let x0 = (i as f64 + 0.5) * width / n as f64;
            let fx = locate(xe, x0);
            angle_rays.rays.push(trace_ray(
                mesh,
                (x0, y0),
                (cx, cy),
                (fx, fy),
                (Normal::Y, fx),
                width / n as f64 * cy.abs(),
            ));
        }
    }
    // Rays through the upwind x face
    if cx != 0.0 {
        let n = ((height * cx.abs() / spacing).ceil() as usize).max(1);
        let x0 = if cx > 0.0 { 0.0 } else { width };
        let fx = if cx > 0.0 { 0 } else { nfx - 1 };
        for j in 0..n {
            let y0 = (j as f64 + 0.5) * height / n as f64;
            let fy = locate(ye, y0);
            angle_rays.rays.push(trace_ray(
                mesh,
                (x0, y0),
                (cx, cy),
                (fx, fy),
                (Normal::X, fy),
                height / n as f64 * cx.abs(),
            ));
        }
    }

    // Volume correction
    let mut traced = vec![0.0; areas.len()];
    for ray in &angle_rays.rays {
        for s in &ray.segments {
            traced[s.region] += ray.width * s.length;
        }
        let (normal, position) = ray.exit;
        angle_rays.exit_width[normal.index()][position] += ray.width;
    }
    let factor = traced
        .iter()
        .zip(areas)
        .map(|(t, a)| if *t > 0.0 { a / t } else { 0.0 })
        .collect::<Vec<_>>();
    for ray in angle_rays.rays.iter_mut() {
        for s in ray.segments.iter_mut() {
            s.length *= factor[s.region];
        }
    }
    angle_rays.missed = traced
        .iter()
        .enumerate()
        .filter(|(_, t)| **t <= 0.0)
        .map(|(r, _)| r)
        .collect();
    angle_rays
}

/// Follow a ray from its entry point until it leaves the plane
fn trace_ray(
    mesh: &CoreMesh,
    start: (f64, f64),
    direction: (f64, f64),
    cell: (usize, usize),
    entry: FacePosition,
    width: f64,
) -> Ray {
    let (nfx, nfy, n_sub) = (mesh.nfx(), mesh.nfy(), mesh.n_sub());
    let xe = mesh.fine_x_edges();
    let ye = mesh.fine_y_edges();
    let (cx, cy) = direction;
    let (mut x, mut y) = start;
    let (mut fx, mut fy) = cell;

    let entry_surface = match entry.0 {
        Normal::X if cx > 0.0 => Surface::West,
        Normal::X => Surface::East,
        _ if cy > 0.0 => Surface::South,
        _ => Surface::North,
    };
    let mut segments = vec![];
    let mut crossings = vec![Crossing {
        segment: 0,
        pin: (fx / n_sub, fy / n_sub),
        surface: entry_surface,
    }];

    let exit = loop {
        let dist_x = if cx > 0.0 {
            (xe[fx + 1] - x) / cx
        } else if cx < 0.0 {
            (xe[fx] - x) / cx
        } else {
            f64::INFINITY
        };
        let dist_y = if cy > 0.0 {
            (ye[fy + 1] - y) / cy
        } else if cy < 0.0 {
            (ye[fy] - y) / cy
        } else {
            f64::INFINITY
        };
        let cross_x = dist_x <= dist_y + CORNER_TOLERANCE;
        let d = dist_x.min(dist_y).max(0.0);
        segments.push(Segment {
            region: fy * nfx + fx,
            length: d,
        });
        x += cx * d;
        y += cy * d;

        if cross_x {
            let (edge, surface) = if cx > 0.0 {
                (fx + 1, Surface::East)
            } else {
                (fx, Surface::West)
            };
            if edge % n_sub == 0 {
                crossings.push(Crossing {
                    segment: segments.len(),
                    pin: (fx / n_sub, fy / n_sub),
                    surface,
                });
            }
            x = xe[edge];
            if cx > 0.0 && fx + 1 < nfx {
                fx += 1;
            } else if cx < 0.0 && fx > 0 {
                fx -= 1;
            } else {
                break (Normal::X, fy);
            }
        } else {
            let (edge, surface) = if cy > 0.0 {
                (fy + 1, Surface::North)
            } else {
                (fy, Surface::South)
            };
            if edge % n_sub == 0 {
                crossings.push(Crossing {
                    segment: segments.len(),
                    pin: (fx / n_sub, fy / n_sub),
                    surface,
                });
            }
            y = ye[edge];
            if cy > 0.0 && fy + 1 < nfy {
                fy += 1;
            } else if cy < 0.0 && fy > 0 {
                fy -= 1;
            } else {
                break (Normal::Y, fx);
            }
        }
    };

    Ray {
        width,
        entry,
        exit,
        segments,
        crossings,
    }
}
