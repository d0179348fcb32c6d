//! Latitude-band regions used for regional carbon budgets
//!
//! The globe is partitioned at a threshold latitude $\phi_t$ (23° by default)
//! into three non-overlapping bands:
//!
//! - South: $\phi < -\phi_t$
//! - Tropical: $-\phi_t \le \phi \le \phi_t$
//! - North: $\phi > \phi_t$
//!
//! Every latitude falls in exactly one band, so band totals always add up to
//! the global ([`Region::Earth`]) total.
//!
//! # Examples
//!
//! ```rust
//! use sinkflux_core::spatial::{LatitudeBands, Region};
//!
//! let bands = LatitudeBands::new(23.0).unwrap();
//! assert_eq!(bands.classify(-45.0), Region::South);
//! assert_eq!(bands.classify(23.0), Region::Tropical);
//! assert_eq!(bands.classify(60.0), Region::North);
//! ```

use crate::errors::{SinkfluxError, SinkfluxResult};
use crate::timeseries::FloatValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default latitude separating the tropics from the extratropics
pub const DEFAULT_THRESHOLD_LATITUDE: FloatValue = 23.0;

/// Regions reported for every carbon sink
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Region {
    /// The whole globe
    Earth = 0,
    /// South of the threshold latitude
    South = 1,
    /// Between the negative and positive threshold latitude (inclusive)
    Tropical = 2,
    /// North of the threshold latitude
    North = 3,
}

impl Region {
    pub const ALL: [Region; 4] = [Region::Earth, Region::South, Region::Tropical, Region::North];

    /// The three bands that partition [`Region::Earth`]
    pub const BANDS: [Region; 3] = [Region::South, Region::Tropical, Region::North];

    pub fn name(&self) -> &'static str {
        match self {
            Region::Earth => "Earth",
            Region::South => "South",
            Region::Tropical => "Tropical",
            Region::North => "North",
        }
    }
}

impl From<Region> for usize {
    fn from(r: Region) -> usize {
        r as usize
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Carbon reservoir exchanging with the atmosphere
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sink {
    Land,
    Ocean,
}

impl Sink {
    pub const ALL: [Sink; 2] = [Sink::Land, Sink::Ocean];

    pub fn name(&self) -> &'static str {
        match self {
            Sink::Land => "Land",
            Sink::Ocean => "Ocean",
        }
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Column label combining a region and a sink, e.g. `"Tropical_Land"`
pub fn column_name(region: Region, sink: Sink) -> String {
    format!("{}_{}", region.name(), sink.name())
}

/// Partition of the globe into South, Tropical and North bands
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatitudeBands {
    threshold: FloatValue,
}

impl LatitudeBands {
    /// Create bands split at `±threshold` degrees
    pub fn new(threshold: FloatValue) -> SinkfluxResult<Self> {
        if !threshold.is_finite() || !(0.0..90.0).contains(&threshold) {
            return Err(SinkfluxError::Configuration(format!(
                "threshold latitude must be within [0, 90), got {}",
                threshold
            )));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> FloatValue {
        self.threshold
    }

    /// Band containing `latitude`
    pub fn classify(&self, latitude: FloatValue) -> Region {
        if latitude < -self.threshold {
            Region::South
        } else if latitude > self.threshold {
            Region::North
        } else {
            Region::Tropical
        }
    }
}

impl Default for LatitudeBands {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD_LATITUDE,
        }
    }
}
