#![warn(clippy::all, clippy::cargo, clippy::nursery, clippy::pedantic)]
#![warn(missing_docs)]

//! Small-angle X-ray scattering intensity profiles for biomolecular
//! structures: distance histograms, the Debye transform, excluded-volume
//! handling on a voxel grid, and fitting against experimental curves.

pub mod axis;
pub mod body;
pub mod compact;
pub mod composite;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod exv;
pub mod fitter;
pub mod form_factor;
pub mod grid;
pub mod grid_manager;
pub mod histogram;
pub mod manager;
pub mod minimizer;
pub mod mt_manager;
pub mod partial_manager;
pub mod pool;
pub mod simple_manager;
pub mod sinc;
pub mod state;
pub mod structure;
pub mod symmetry_manager;

pub use error::{Error, Result};
