//! Statistical and temporal analysis of regional carbon-sink series
//!
//! Builds on the typed series of [`sinkflux_core`] to provide window trends,
//! spectra, zero-phase filters and feedback regressions.

pub mod config;
pub mod feedback;
pub mod filter;
pub mod regression;
pub mod seasonal;
pub mod spectral;
pub mod trend;

#[cfg(feature = "python")]
pub mod python;
