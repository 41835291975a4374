//! Key/value run configuration
use crate::quadrature::types::QuadratureType;
use crate::solver::EigenOptions;
use crate::sweeper::SweeperOptions;
use crate::types::{Result, SweepError};
use log::debug;
use std::str::FromStr;

/// Sweeper and solver options of a run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Options {
    /// Sweeper options
    pub sweeper: SweeperOptions,
    /// Power iteration options
    pub eigen: EigenOptions,
}

fn invalid(option: &str, value: &str, reason: &str) -> SweepError {
    SweepError::InvalidOption {
        option: option.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_value<T: FromStr>(option: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| invalid(option, value, "failed to parse value"))
}

fn parse_positive_int(option: &str, value: &str) -> Result<usize> {
    let v = parse_value::<i64>(option, value)?;
    if v <= 0 {
        return Err(invalid(option, value, "must be a positive integer"));
    }
    Ok(v as usize)
}

fn parse_non_negative_int(option: &str, value: &str) -> Result<usize> {
    let v = parse_value::<i64>(option, value)?;
    if v < 0 {
        return Err(invalid(option, value, "must not be negative"));
    }
    Ok(v as usize)
}

fn parse_positive_float(option: &str, value: &str) -> Result<f64> {
    let v = parse_value::<f64>(option, value)?;
    if !(v.is_finite() && v > 0.0) {
        return Err(invalid(option, value, "must be positive"));
    }
    Ok(v)
}

fn parse_bool(option: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(option, value, "expected true or false")),
    }
}

/// Quadrature keys are collected first since the family and its parameters
/// may come in any order
#[derive(Debug)]
struct QuadratureKeys {
    family: Option<String>,
    order: Option<usize>,
    n_azimuthal: Option<usize>,
    n_polar: Option<usize>,
}

impl QuadratureKeys {
    fn resolve(self) -> Result<QuadratureType> {
        let family = self.family.unwrap_or_else(|| {
            if self.n_azimuthal.is_some() || self.n_polar.is_some() {
                "cg".to_string()
            } else {
                "ls".to_string()
            }
        });
        match family.as_str() {
            "ls" | "level-symmetric" | "level_symmetric" => Ok(QuadratureType::LevelSymmetric {
                order: self.order.unwrap_or(4),
            }),
            "cg" | "chebyshev-gauss" | "chebyshev_gauss" => Ok(QuadratureType::ChebyshevGauss {
                n_azimuthal: self.n_azimuthal.unwrap_or(4),
                n_polar: self.n_polar.unwrap_or(2),
            }),
            _ => Err(invalid("quadrature", &family, "expected `ls` or `cg`")),
        }
    }
}

impl Options {
    /// Parse `key = value` lines. Blank lines and text after `#` are ignored.
    pub fn parse(input: &str) -> Result<Self> {
        let mut pairs = vec![];
        for (iline, line) in input.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                invalid(&format!("line {}", iline + 1), line, "expected `key = value`")
            })?;
            pairs.push((key.trim(), value.trim()));
        }
        Self::from_pairs(pairs)
    }

    /// Build options from key/value pairs; later keys override earlier ones
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut options = Options::default();
        let mut quadrature = QuadratureKeys {
            family: None,
            order: None,
            n_azimuthal: None,
            n_polar: None,
        };
        for (key, value) in pairs {
            debug!("option {key} = {value}");
            let sweeper = &mut options.sweeper;
            let eigen = &mut options.eigen;
            match key {
                "sweeper" => sweeper.kind = value.parse()?,
                "n_inner" => sweeper.n_inner = parse_non_negative_int(key, value)?,
                "quadrature" => quadrature.family = Some(value.to_lowercase()),
                "quadrature.order" => quadrature.order = Some(parse_positive_int(key, value)?),
                "quadrature.n_azimuthal" => {
                    quadrature.n_azimuthal = Some(parse_positive_int(key, value)?)
                }
                "quadrature.n_polar" => quadrature.n_polar = Some(parse_positive_int(key, value)?),
                "boundary_update" => sweeper.boundary_update = value.parse()?,
                "ray_spacing" => sweeper.ray_spacing = parse_positive_float(key, value)?,
                "moc_modulo" => sweeper.coupling.moc_modulo = parse_positive_int(key, value)?,
                "n_inactive_moc" => {
                    sweeper.coupling.n_inactive_moc = parse_non_negative_int(key, value)?
                }
                "tl" => sweeper.coupling.do_tl = parse_bool(key, value)?,
                "sn_project" => sweeper.coupling.do_snproject = parse_bool(key, value)?,
                "expose_sn" => sweeper.coupling.expose_sn = parse_bool(key, value)?,
                "k_tol" => eigen.k_tolerance = parse_positive_float(key, value)?,
                "psi_tol" => eigen.flux_tolerance = parse_positive_float(key, value)?,
                "max_outer" => eigen.max_outer = parse_non_negative_int(key, value)?,
                "k0" => eigen.initial_k = parse_positive_float(key, value)?,
                _ => return Err(SweepError::UnknownOption(key.to_string())),
            }
        }
        options.sweeper.quadrature = quadrature.resolve()?;
        Ok(options)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sweeper::{BoundaryUpdate, SweeperKind};
    use approx::*;

    #[test]
    fn test_parse() {
        let options = Options::parse(
            "# 2D3D run
             sweeper = 2d3d
             n_inner = 3
             quadrature = cg   # product set
             quadrature.n_polar = 3
             boundary_update = jacobi
             moc_modulo = 2
             tl = false
             expose_sn = yes
             k_tol = 1e-7
             max_outer = 20",
        )
        .unwrap();
        assert_eq!(options.sweeper.kind, SweeperKind::TwoDThreeD);
        assert_eq!(options.sweeper.n_inner, 3);
        assert_eq!(
            options.sweeper.quadrature,
            QuadratureType::ChebyshevGauss {
                n_azimuthal: 4,
                n_polar: 3
            }
        );
        assert_eq!(options.sweeper.boundary_update, BoundaryUpdate::Jacobi);
        assert_eq!(options.sweeper.coupling.moc_modulo, 2);
        assert!(!options.sweeper.coupling.do_tl);
        assert!(options.sweeper.coupling.expose_sn);
        assert_relative_eq!(options.eigen.k_tolerance, 1e-7);
        assert_eq!(options.eigen.max_outer, 20);
    }

    #[test]
    fn test_defaults() {
        let options = Options::parse("").unwrap();
        assert_eq!(options, Options::default());
        let options = Options::from_pairs([("quadrature.order", "8")]).unwrap();
        assert_eq!(
            options.sweeper.quadrature,
            QuadratureType::LevelSymmetric { order: 8 }
        );
    }

    #[test]
    fn test_invalid_options() {
        for (key, value) in [
            ("n_inner", "-1"),
            ("moc_modulo", "0"),
            ("k_tol", "0"),
            ("psi_tol", "-1e-5"),
            ("ray_spacing", "0.0"),
            ("tl", "maybe"),
            ("sweeper", "diffusion"),
            ("quadrature", "gauss"),
        ] {
            assert!(
                matches!(
                    Options::from_pairs([(key, value)]),
                    Err(SweepError::InvalidOption { .. })
                ),
                "{key} = {value}"
            );
        }
        assert!(matches!(
            Options::parse("n_outer = 5"),
            Err(SweepError::UnknownOption(_))
        ));
        assert!(matches!(
            Options::parse("n_inner 5"),
            Err(SweepError::InvalidOption { .. })
        ));
    }
}
