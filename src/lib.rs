//! Regional carbon-sink budgets from gridded fluxes
//!
//! Re-exports the two library crates and, with the `python` feature, builds
//! the `sinkflux._lib` extension module.

pub use sinkflux_analysis;
pub use sinkflux_core;

#[cfg(feature = "python")]
mod python;
