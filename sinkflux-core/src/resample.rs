//! Temporal roll-up of regional series
//!
//! Regional totals are masses per step, so coarser series are built by
//! summing the rows that fall into each bucket. Area-weighted means (e.g.
//! temperature) are rolled up with [`ResampleMethod::Mean`] instead. Buckets
//! are labelled by a year:
//!
//! - [`Granularity::Year`]: the calendar year
//! - [`Granularity::Decade`]: the year floored to a multiple of ten
//! - [`Granularity::Whole`]: the first year of the series

use crate::aggregate::Reaggregate;
use crate::errors::{SinkfluxError, SinkfluxResult};
use crate::regional::{RegionalSeries, RegionalStatistic, N_REGIONS};
use crate::timeseries::{FloatValue, Resolution, TimeIndexed, TimeKey};
use log::{debug, warn};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Target bucket size of a resampling
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    Year,
    Decade,
    Whole,
}

impl Granularity {
    fn resolution(&self) -> Resolution {
        match self {
            Granularity::Year => Resolution::Yearly,
            Granularity::Decade => Resolution::Decadal,
            Granularity::Whole => Resolution::Whole,
        }
    }

    fn label(&self, key: TimeKey, first_year: i32) -> i32 {
        match self {
            Granularity::Year => key.year(),
            Granularity::Decade => key.year().div_euclid(10) * 10,
            Granularity::Whole => first_year,
        }
    }
}

/// Treatment of decades that are only partly covered by the data
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecadePolicy {
    /// Keep partial first/last decades, labelled by their floor year
    #[default]
    IncludePartial,
    /// Drop decades without a sample for every step of all ten years
    CompleteOnly,
}

/// How the rows of a bucket are combined
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResampleMethod {
    #[default]
    Sum,
    /// Mean of the rows present in the bucket
    Mean,
}

/// Parameters for temporal resampling
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleParameters {
    /// default: IncludePartial
    pub decade_policy: DecadePolicy,
    /// default: Sum
    pub method: ResampleMethod,
}

/// Rolls regional series up into yearly, decadal or whole-period sums or means
#[derive(Default)]
pub struct TemporalResampler<'a> {
    parameters: ResampleParameters,
    reaggregation: Option<&'a dyn Reaggregate>,
}

impl<'a> TemporalResampler<'a> {
    pub fn new(parameters: ResampleParameters) -> Self {
        Self {
            parameters,
            reaggregation: None,
        }
    }

    /// Attach the aggregation that produced the series, enabling [`resplit`](Self::resplit)
    pub fn with_reaggregation(mut self, reaggregation: &'a dyn Reaggregate) -> Self {
        self.reaggregation = Some(reaggregation);
        self
    }

    pub fn parameters(&self) -> &ResampleParameters {
        &self.parameters
    }

    /// Combine the rows of `series` into buckets of `granularity`
    pub fn resample(
        &self,
        series: &RegionalSeries,
        granularity: Granularity,
    ) -> SinkfluxResult<RegionalSeries> {
        let steps_per_year = match (series.resolution(), granularity) {
            (Resolution::Monthly, _) => 12,
            (Resolution::Yearly, Granularity::Decade | Granularity::Whole) => 1,
            (resolution, granularity) => {
                return Err(SinkfluxError::Configuration(format!(
                    "cannot resample a {:?} series to {:?}",
                    resolution, granularity
                )))
            }
        };

        let time = series.time();
        let Some(first_key) = series.first_key() else {
            return Err(SinkfluxError::insufficient("resampling", 1, 0));
        };
        let first_year = first_key.year();

        // Rows are time-ordered, so each bucket is a contiguous run of rows
        let mut buckets: Vec<(i32, usize, usize)> = Vec::new();
        for (row, key) in time.iter().enumerate() {
            let label = granularity.label(*key, first_year);
            match buckets.last_mut() {
                Some((last, _, end)) if *last == label => *end = row + 1,
                _ => buckets.push((label, row, row + 1)),
            }
        }

        if granularity == Granularity::Decade {
            let expected = 10 * steps_per_year;
            buckets.retain(|(label, start, end)| {
                let complete = end - start == expected;
                if complete {
                    return true;
                }
                match self.parameters.decade_policy {
                    DecadePolicy::IncludePartial => {
                        warn!(
                            "Decade {} is partial ({} of {} steps)",
                            label,
                            end - start,
                            expected
                        );
                        true
                    }
                    DecadePolicy::CompleteOnly => false,
                }
            });
            if buckets.is_empty() {
                return Err(SinkfluxError::insufficient(
                    "complete decades",
                    10 * steps_per_year,
                    time.len(),
                ));
            }
        }

        let method = self.parameters.method;
        if method == ResampleMethod::Sum && series.statistic() == RegionalStatistic::AreaMean {
            warn!("Summing area-weighted means over time; ResampleMethod::Mean is usually wanted");
        }
        debug!(
            "Resampling {} rows into {} {:?} buckets by {:?}",
            time.len(),
            buckets.len(),
            granularity,
            method
        );

        let mut totals = BTreeMap::new();
        for sink in series.sinks() {
            let values = series.totals(sink)?;
            let mut combined = Array2::<FloatValue>::zeros((buckets.len(), N_REGIONS));
            for (bucket, (_, start, end)) in buckets.iter().enumerate() {
                let mut target = combined.row_mut(bucket);
                for row in *start..*end {
                    target += &values.index_axis(Axis(0), row);
                }
                if method == ResampleMethod::Mean {
                    target /= (end - start) as FloatValue;
                }
            }
            totals.insert(sink, combined);
        }

        let labels = buckets
            .iter()
            .map(|(label, _, _)| TimeKey::Year(*label))
            .collect();
        Ok(RegionalSeries::new(
            granularity.resolution(),
            labels,
            series.threshold_latitude(),
            totals,
        )?
        .with_statistic(series.statistic()))
    }

    /// Re-split the bands at a new threshold, going back to the gridded field
    ///
    /// The result is resampled to `granularity` when one is given.
    pub fn resplit(
        &self,
        threshold_latitude: FloatValue,
        granularity: Option<Granularity>,
    ) -> SinkfluxResult<RegionalSeries> {
        let Some(reaggregation) = self.reaggregation else {
            return Err(SinkfluxError::Configuration(
                "re-splitting requires the originating spatial aggregation".to_string(),
            ));
        };
        let series = reaggregation.reaggregate(threshold_latitude)?;
        match granularity {
            Some(granularity) => self.resample(&series, granularity),
            None => Ok(series),
        }
    }
}
