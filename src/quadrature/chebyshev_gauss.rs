//! Chebyshev azimuthal × Gauss-Legendre polar product sets.
use crate::quadrature::angle::Angle;
use crate::quadrature::types::QuadratureError;
use crate::types::{HPI, PI};

const NEWTON_TOLERANCE: f64 = 1e-15;
const NEWTON_MAX_ITERATIONS: usize = 100;

/// Positive nodes and weights of the Gauss-Legendre rule with `2 * n` points on [-1, 1].
///
/// Nodes are returned in decreasing order.
pub fn gauss_legendre_half(n: usize) -> Result<(Vec<f64>, Vec<f64>), QuadratureError> {
    let npoints = 2 * n;
    let mut nodes = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    for i in 0..n {
        // Chebyshev initial guess for the (i+1)-th largest root
        let mut x = (PI * (i as f64 + 0.75) / (npoints as f64 + 0.5)).cos();
        let mut converged = false;
        for _ in 0..NEWTON_MAX_ITERATIONS {
            let (p, dp) = legendre(npoints, x);
            let dx = p / dp;
            x -= dx;
            if dx.abs() < NEWTON_TOLERANCE {
                converged = true;
                break;
            }
        }
        if !converged {
            return Err(QuadratureError::Invalid(format!(
                "Newton iteration for Gauss-Legendre node {i} of {npoints} did not converge"
            )));
        }
        let (_, dp) = legendre(npoints, x);
        nodes.push(x);
        weights.push(2.0 / ((1.0 - x * x) * dp * dp));
    }
    Ok((nodes, weights))
}

/// Legendre polynomial of degree `n` and its derivative at `x`
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let kf = k as f64;
        let p2 = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        p0 = p1;
        p1 = p2;
    }
    let dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, dp)
}

/// The directions of the first octant of a Chebyshev-Gauss product set.
///
/// Azimuths are equally spaced cell centres on (0, π/2); polar cosines are the
/// positive Gauss-Legendre nodes. Weights sum to one over the octant.
pub fn first_octant(n_azimuthal: usize, n_polar: usize) -> Result<Vec<Angle>, QuadratureError> {
    if n_azimuthal == 0 || n_polar == 0 {
        return Err(QuadratureError::Invalid(format!(
            "Chebyshev-Gauss set needs at least one azimuthal and one polar angle, \
             got {n_azimuthal} × {n_polar}"
        )));
    }
    let (mu, polar_weights) = gauss_legendre_half(n_polar)?;

    let mut angles = Vec::with_capacity(n_azimuthal * n_polar);
    for i in 0..n_azimuthal {
        let alpha = (i as f64 + 0.5) * HPI / n_azimuthal as f64;
        for (m, w) in mu.iter().zip(&polar_weights) {
            // Gauss weights on the half interval sum to one
            angles.push(Angle::from_angles(alpha, m.acos(), w / n_azimuthal as f64));
        }
    }
    Ok(angles)
}
