//! TOML configuration of every tunable constant
//!
//! Missing tables and keys fall back to their defaults, so a document only
//! needs to name the values it overrides:
//!
//! ```toml
//! [aggregation]
//! threshold_latitude = 30.0
//! calendar = "LeapAware"
//!
//! [feedback]
//! emission_rate = 1.5
//! ```

use crate::feedback::FeedbackConstants;
use crate::filter::FilterParameters;
use crate::spectral::WelchParameters;
use serde::{Deserialize, Serialize};
use sinkflux_core::aggregate::AggregationParameters;
use sinkflux_core::errors::{SinkfluxError, SinkfluxResult};
use sinkflux_core::grid::GridParameters;
use sinkflux_core::resample::ResampleParameters;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkfluxConfig {
    pub grid: GridParameters,
    pub aggregation: AggregationParameters,
    pub resample: ResampleParameters,
    pub welch: WelchParameters,
    pub filter: FilterParameters,
    pub feedback: FeedbackConstants,
}

impl SinkfluxConfig {
    pub fn from_toml_str(document: &str) -> SinkfluxResult<Self> {
        toml::from_str(document).map_err(|e| SinkfluxError::Configuration(e.to_string()))
    }

    pub fn to_toml_string(&self) -> SinkfluxResult<String> {
        toml::to_string(self).map_err(|e| SinkfluxError::Configuration(e.to_string()))
    }
}
