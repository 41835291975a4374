//! Transport sweep engine
//!
//! Deterministic neutron transport kernels for orthogonal pin meshes:
//! discrete-ordinates (Sn) and method-of-characteristics (MoC) sweepers, a
//! 2D3D sweeper that corrects a coarse 3-D Sn solution with per-plane 2-D MoC
//! results, and a power iteration driver for the k-eigenvalue problem.
#![cfg_attr(feature = "strict", deny(warnings))]
#![warn(missing_docs)]

#[macro_use]
extern crate lazy_static;

pub mod boundary;
pub mod coarse_data;
pub mod correction;
pub mod flux;
pub mod mesh;
pub mod options;
pub mod quadrature;
pub mod solver;
pub mod source;
pub mod sweeper;
pub mod types;
pub mod xs_mesh;
