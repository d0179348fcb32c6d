//! Regional carbon budgets indexed by time
//!
//! A [`RegionalSeries`] holds, for each [`Sink`], an `(n, 4)` table of totals
//! whose columns follow [`Region`] (Earth, South, Tropical, North). Values are
//! masses per time step (GtC by default), so rows are additive over time.
//!
//! A series may instead hold area-weighted means of a state variable such as
//! temperature (see [`RegionalStatistic::AreaMean`]). Those are neither
//! additive over time nor across the bands.

use crate::errors::{SinkfluxError, SinkfluxResult};
use crate::spatial::{column_name, Region, Sink};
use crate::timeseries::{validate_time_axis, FloatValue, Resolution, TimeIndexed, TimeKey, Timeseries};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const N_REGIONS: usize = 4;

/// What the values of a [`RegionalSeries`] represent
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionalStatistic {
    /// Integrated mass per time step; the bands sum to Earth
    #[default]
    Total,
    /// Mean weighted by the area of the contributing cells
    AreaMean,
}

/// Global and latitude-banded totals for one or more sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RegionalRecord")]
pub struct RegionalSeries {
    resolution: Resolution,
    time: Vec<TimeKey>,
    threshold_latitude: FloatValue,
    statistic: RegionalStatistic,
    totals: BTreeMap<Sink, Array2<FloatValue>>,
}

#[derive(Deserialize)]
struct RegionalRecord {
    resolution: Resolution,
    time: Vec<TimeKey>,
    threshold_latitude: FloatValue,
    #[serde(default)]
    statistic: RegionalStatistic,
    totals: BTreeMap<Sink, Array2<FloatValue>>,
}

impl TryFrom<RegionalRecord> for RegionalSeries {
    type Error = SinkfluxError;

    fn try_from(record: RegionalRecord) -> SinkfluxResult<Self> {
        Ok(RegionalSeries::new(
            record.resolution,
            record.time,
            record.threshold_latitude,
            record.totals,
        )?
        .with_statistic(record.statistic))
    }
}

impl RegionalSeries {
    pub fn new(
        resolution: Resolution,
        time: Vec<TimeKey>,
        threshold_latitude: FloatValue,
        totals: BTreeMap<Sink, Array2<FloatValue>>,
    ) -> SinkfluxResult<Self> {
        validate_time_axis(&time)?;
        let monthly_keys = time.first().is_some_and(|key| key.is_monthly());
        if monthly_keys != (resolution == Resolution::Monthly) {
            return Err(SinkfluxError::Configuration(format!(
                "{:?} resolution does not match {} time keys",
                resolution,
                if monthly_keys { "monthly" } else { "yearly" }
            )));
        }
        if totals.is_empty() {
            return Err(SinkfluxError::Configuration(
                "a regional series needs at least one sink".to_string(),
            ));
        }
        for (sink, values) in totals.iter() {
            if values.dim() != (time.len(), N_REGIONS) {
                return Err(SinkfluxError::Configuration(format!(
                    "{} totals have shape {:?}, expected ({}, {})",
                    sink,
                    values.dim(),
                    time.len(),
                    N_REGIONS
                )));
            }
        }
        Ok(Self {
            resolution,
            time,
            threshold_latitude,
            statistic: RegionalStatistic::Total,
            totals,
        })
    }

    /// Mark what the values represent; [`new`](Self::new) assumes totals
    pub fn with_statistic(mut self, statistic: RegionalStatistic) -> Self {
        self.statistic = statistic;
        self
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn statistic(&self) -> RegionalStatistic {
        self.statistic
    }

    /// Latitude separating the bands, in degrees
    pub fn threshold_latitude(&self) -> FloatValue {
        self.threshold_latitude
    }

    pub fn sinks(&self) -> impl Iterator<Item = Sink> + '_ {
        self.totals.keys().copied()
    }

    pub fn has_sink(&self, sink: Sink) -> bool {
        self.totals.contains_key(&sink)
    }

    /// The `(n, 4)` table of totals for `sink`
    pub fn totals(&self, sink: Sink) -> SinkfluxResult<ArrayView2<'_, FloatValue>> {
        self.totals
            .get(&sink)
            .map(|values| values.view())
            .ok_or_else(|| {
                SinkfluxError::Configuration(format!("series has no {} totals", sink))
            })
    }

    /// Totals of one region over time
    pub fn region(&self, region: Region, sink: Sink) -> SinkfluxResult<ArrayView1<'_, FloatValue>> {
        let index: usize = region.into();
        Ok(self.totals(sink)?.index_axis_move(Axis(1), index))
    }

    /// Single column as a named [`Timeseries`], e.g. `"North_Ocean"`
    pub fn column(&self, region: Region, sink: Sink) -> SinkfluxResult<Timeseries> {
        let values = self.region(region, sink)?.to_owned();
        Timeseries::new(&column_name(region, sink), self.time.clone(), values)
    }

    pub fn value(&self, key: TimeKey, region: Region, sink: Sink) -> Option<FloatValue> {
        let row = self.position(key)?;
        let index: usize = region.into();
        self.totals.get(&sink).map(|values| values[[row, index]])
    }

    /// Largest absolute difference between the Earth total and the sum of the bands
    pub fn partition_residual(&self) -> FloatValue {
        let mut residual: FloatValue = 0.0;
        for values in self.totals.values() {
            for row in values.rows() {
                let bands: FloatValue = Region::BANDS
                    .iter()
                    .map(|region| row[usize::from(*region)])
                    .sum();
                let difference = (row[usize::from(Region::Earth)] - bands).abs();
                if difference.is_nan() {
                    return FloatValue::NAN;
                }
                residual = residual.max(difference);
            }
        }
        residual
    }

    /// Verify that South + Tropical + North equals Earth within `tolerance`
    ///
    /// Only totals partition; area means are rejected.
    pub fn check_partition(&self, tolerance: FloatValue) -> SinkfluxResult<()> {
        if self.statistic != RegionalStatistic::Total {
            return Err(SinkfluxError::Configuration(
                "area-weighted means do not partition across bands".to_string(),
            ));
        }
        let residual = self.partition_residual();
        if residual.is_nan() || residual > tolerance {
            return Err(SinkfluxError::NumericDomain(format!(
                "regional totals differ from the global total by {}",
                residual
            )));
        }
        Ok(())
    }
}

impl TimeIndexed for RegionalSeries {
    fn time(&self) -> &[TimeKey] {
        &self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn example() -> RegionalSeries {
        let mut totals = BTreeMap::new();
        totals.insert(Sink::Land, array![[6.0, 1.0, 2.0, 3.0], [3.0, 1.0, 1.0, 1.0]]);
        totals.insert(Sink::Ocean, array![[4.0, 2.0, 1.0, 1.0], [0.0, -1.0, 0.5, 0.5]]);
        RegionalSeries::new(
            Resolution::Yearly,
            vec![TimeKey::Year(2000), TimeKey::Year(2001)],
            23.0,
            totals,
        )
        .unwrap()
    }

    #[test]
    fn column_access() {
        let series = example();
        let north_land = series.column(Region::North, Sink::Land).unwrap();
        assert_eq!(north_land.name(), "North_Land");
        assert_eq!(north_land.to_vec(), vec![3.0, 1.0]);
        assert_eq!(
            series.value(TimeKey::Year(2001), Region::South, Sink::Ocean),
            Some(-1.0)
        );
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn partition_holds() {
        let series = example();
        assert_eq!(series.partition_residual(), 0.0);
        assert!(series.check_partition(1e-12).is_ok());
    }

    #[test]
    fn broken_partition_detected() {
        let mut totals = BTreeMap::new();
        totals.insert(Sink::Land, array![[10.0, 1.0, 2.0, 3.0]]);
        let series =
            RegionalSeries::new(Resolution::Yearly, vec![TimeKey::Year(2000)], 23.0, totals)
                .unwrap();
        assert!(matches!(
            series.check_partition(1.0),
            Err(SinkfluxError::NumericDomain(_))
        ));
    }

    #[test]
    fn missing_sink() {
        let mut totals = BTreeMap::new();
        totals.insert(Sink::Land, array![[0.0, 0.0, 0.0, 0.0]]);
        let series =
            RegionalSeries::new(Resolution::Yearly, vec![TimeKey::Year(2000)], 23.0, totals)
                .unwrap();
        assert!(series.column(Region::Earth, Sink::Ocean).is_err());
    }

    #[test]
    fn shape_mismatch_rejected() {
        let mut totals = BTreeMap::new();
        totals.insert(Sink::Land, array![[0.0, 0.0, 0.0]]);
        let result =
            RegionalSeries::new(Resolution::Yearly, vec![TimeKey::Year(2000)], 23.0, totals);
        assert!(matches!(result, Err(SinkfluxError::Configuration(_))));
    }

    #[test]
    fn resolution_must_match_key_kind() {
        let mut totals = BTreeMap::new();
        totals.insert(Sink::Land, array![[0.0, 0.0, 0.0, 0.0]]);
        let result = RegionalSeries::new(
            Resolution::Monthly,
            vec![TimeKey::Year(2000)],
            23.0,
            totals.clone(),
        );
        assert!(matches!(result, Err(SinkfluxError::Configuration(_))));

        let result = RegionalSeries::new(
            Resolution::Decadal,
            vec![TimeKey::month(2000, 1).unwrap()],
            23.0,
            totals.clone(),
        );
        assert!(matches!(result, Err(SinkfluxError::Configuration(_))));

        for resolution in [Resolution::Yearly, Resolution::Decadal, Resolution::Whole] {
            assert!(
                RegionalSeries::new(resolution, vec![TimeKey::Year(2000)], 23.0, totals.clone())
                    .is_ok()
            );
        }
    }

    #[test]
    fn deserialisation_is_validated() {
        let mut json: serde_json::Value = serde_json::to_value(example()).unwrap();
        json["resolution"] = serde_json::json!("Monthly");
        assert!(serde_json::from_value::<RegionalSeries>(json).is_err());
    }

    #[test]
    fn area_means_do_not_partition() {
        let series = example().with_statistic(RegionalStatistic::AreaMean);
        assert_eq!(series.statistic(), RegionalStatistic::AreaMean);
        assert!(matches!(
            series.check_partition(1e-12),
            Err(SinkfluxError::Configuration(_))
        ));

        let json = serde_json::to_string(&series).unwrap();
        let restored: RegionalSeries = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.statistic(), RegionalStatistic::AreaMean);
    }

    #[test]
    fn serialization() {
        let series = example();
        let json = serde_json::to_string(&series).unwrap();
        let restored: RegionalSeries = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, series);
    }
}
