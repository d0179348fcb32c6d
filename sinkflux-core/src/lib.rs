pub mod aggregate;
pub mod calendar;
pub mod ensemble;
pub mod errors;
pub mod grid;
pub mod regional;
pub mod resample;
pub mod spatial;
pub mod timeseries;

#[cfg(feature = "python")]
pub mod python;
