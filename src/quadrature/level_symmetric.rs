//! Level-symmetric direction sets.
use crate::quadrature::angle::Angle;
use crate::quadrature::types::QuadratureError;
use std::collections::HashMap;

/// Direction cosine levels and point weights of a level-symmetric set.
///
/// `mu` holds the N/2 cosine levels. Each entry of `weights` assigns a weight to
/// every direction whose level indices (counted from 1) are a permutation of
/// the given triple.
struct LevelSymmetricDefinition {
    mu: &'static [f64],
    weights: &'static [([usize; 3], f64)],
}

lazy_static! {
    static ref LEVEL_SYMMETRIC_DEFINITIONS: HashMap<usize, LevelSymmetricDefinition> = {
        let mut m = HashMap::new();
        m.insert(
            2,
            LevelSymmetricDefinition {
                mu: &[0.5773502691896257],
                weights: &[([1, 1, 1], 1.0)],
            },
        );
        m.insert(
            4,
            LevelSymmetricDefinition {
                mu: &[0.3500212, 0.8688903],
                weights: &[([1, 1, 2], 1.0 / 3.0)],
            },
        );
        m.insert(
            6,
            LevelSymmetricDefinition {
                mu: &[0.2666355, 0.6815076, 0.9261808],
                weights: &[([1, 1, 3], 0.1761263), ([1, 2, 2], 0.1572071)],
            },
        );
        m.insert(
            8,
            LevelSymmetricDefinition {
                mu: &[0.2182179, 0.5773503, 0.7867958, 0.9511897],
                weights: &[
                    ([1, 1, 4], 0.1209877),
                    ([1, 2, 3], 0.0907407),
                    ([2, 2, 2], 0.0925926),
                ],
            },
        );
        m
    };
}

/// Orders for which a level-symmetric set is available
pub fn available_orders() -> Vec<usize> {
    let mut orders = LEVEL_SYMMETRIC_DEFINITIONS
        .keys()
        .copied()
        .collect::<Vec<_>>();
    orders.sort_unstable();
    orders
}

/// The directions of the first octant of a level-symmetric set.
///
/// Directions are renormalised to unit length and the weights rescaled to sum
/// to one over the octant.
pub fn first_octant(order: usize) -> Result<Vec<Angle>, QuadratureError> {
    let definition = LEVEL_SYMMETRIC_DEFINITIONS
        .get(&order)
        .ok_or(QuadratureError::RuleNotFound(order))?;
    let n = order / 2;

    let mut angles = vec![];
    for i in 1..=n {
        for j in 1..=(n + 1 - i) {
            let k = n + 2 - i - j;
            let weight = point_weight(definition, [i, j, k]).ok_or_else(|| {
                QuadratureError::Invalid(format!(
                    "S{order} has no weight for level indices ({i}, {j}, {k})"
                ))
            })?;
            angles.push(Angle::from_direction(
                definition.mu[i - 1],
                definition.mu[j - 1],
                definition.mu[k - 1],
                weight,
            ));
        }
    }

    let total = angles.iter().map(|a| a.weight).sum::<f64>();
    if total <= 0.0 {
        return Err(QuadratureError::Invalid(format!(
            "S{order} weights sum to {total}"
        )));
    }
    for a in angles.iter_mut() {
        a.weight /= total;
    }
    Ok(angles)
}

fn point_weight(definition: &LevelSymmetricDefinition, levels: [usize; 3]) -> Option<f64> {
    let mut sorted = levels;
    sorted.sort_unstable();
    definition
        .weights
        .iter()
        .find(|(class, _)| *class == sorted)
        .map(|(_, w)| *w)
}
