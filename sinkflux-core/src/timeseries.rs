//! Typed time-series containers
//!
//! Aggregated carbon-flux data is always indexed by a calendar [`TimeKey`]
//! (a month or a year). The [`TimeIndexed`] trait is the common contract for
//! anything that is addressed by time; [`Timeseries`] is the single-column
//! implementation consumed by the analysis routines.
//!
//! # Examples
//!
//! ```rust
//! use sinkflux_core::timeseries::{TimeIndexed, TimeKey, Timeseries};
//!
//! let co2 = Timeseries::yearly("CO2", 1959, vec![315.98, 316.91, 317.64]).unwrap();
//! assert_eq!(co2.len(), 3);
//! assert_eq!(co2.get(TimeKey::Year(1960)), Some(316.91));
//! ```

use crate::errors::{SinkfluxError, SinkfluxResult};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub type FloatValue = f64;

/// Calendar key of a single sample
///
/// Keys of different kinds are never mixed within one series.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "KeyRecord")]
pub enum TimeKey {
    /// A whole calendar year (also used to label decades and whole periods)
    Year(i32),
    /// A calendar month, `month` in `1..=12`
    Month { year: i32, month: u32 },
}

impl TimeKey {
    /// Create a monthly key, validating the month number
    pub fn month(year: i32, month: u32) -> SinkfluxResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(SinkfluxError::Configuration(format!(
                "month must be in 1..=12, got {}",
                month
            )));
        }
        Ok(TimeKey::Month { year, month })
    }

    pub fn year(&self) -> i32 {
        match self {
            TimeKey::Year(year) => *year,
            TimeKey::Month { year, .. } => *year,
        }
    }

    /// Calendar month of a monthly key
    pub fn calendar_month(&self) -> Option<u32> {
        match self {
            TimeKey::Year(_) => None,
            TimeKey::Month { month, .. } => Some(*month),
        }
    }

    pub fn is_monthly(&self) -> bool {
        matches!(self, TimeKey::Month { .. })
    }

    /// Position on a continuous time axis in years
    ///
    /// Months are placed at `year + (month - 1) / 12`.
    pub fn decimal_year(&self) -> FloatValue {
        match self {
            TimeKey::Year(year) => *year as FloatValue,
            TimeKey::Month { year, month } => {
                *year as FloatValue + (*month as FloatValue - 1.0) / 12.0
            }
        }
    }

    /// The key immediately following this one at the same resolution
    pub fn next(&self) -> Self {
        match self {
            TimeKey::Year(year) => TimeKey::Year(year + 1),
            TimeKey::Month { year, month: 12 } => TimeKey::Month {
                year: year + 1,
                month: 1,
            },
            TimeKey::Month { year, month } => TimeKey::Month {
                year: *year,
                month: month + 1,
            },
        }
    }

    /// All keys from `start` to `end` inclusive, stepping by [`next`](Self::next)
    ///
    /// Both bounds must be of the same kind.
    pub fn range_inclusive(start: TimeKey, end: TimeKey) -> SinkfluxResult<Vec<TimeKey>> {
        if start.is_monthly() != end.is_monthly() {
            return Err(SinkfluxError::Configuration(format!(
                "cannot build a time range from {} to {}",
                start, end
            )));
        }
        let mut keys = Vec::new();
        let mut current = start;
        while current <= end {
            keys.push(current);
            current = current.next();
        }
        Ok(keys)
    }

    fn sort_key(&self) -> (i32, u32) {
        match self {
            TimeKey::Year(year) => (*year, 0),
            TimeKey::Month { year, month } => (*year, *month),
        }
    }
}

/// Unchecked wire form of [`TimeKey`]
#[derive(Deserialize)]
enum KeyRecord {
    Year(i32),
    Month { year: i32, month: u32 },
}

impl TryFrom<KeyRecord> for TimeKey {
    type Error = SinkfluxError;

    fn try_from(record: KeyRecord) -> SinkfluxResult<Self> {
        match record {
            KeyRecord::Year(year) => Ok(TimeKey::Year(year)),
            KeyRecord::Month { year, month } => TimeKey::month(year, month),
        }
    }
}

impl PartialOrd for TimeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Display for TimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeKey::Year(year) => write!(f, "{}", year),
            TimeKey::Month { year, month } => write!(f, "{}-{:02}", year, month),
        }
    }
}

/// Sampling interval of a series
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    Monthly,
    Yearly,
    /// Ten-year buckets labelled by their floor year
    Decadal,
    /// A single row covering the whole period, labelled by its first year
    Whole,
}

/// Check that a time axis is non-empty, of a single key kind and strictly increasing
///
/// Monthly keys must also carry a month in `1..=12`.
pub fn validate_time_axis(time: &[TimeKey]) -> SinkfluxResult<()> {
    let Some(first) = time.first() else {
        return Err(SinkfluxError::Configuration(
            "time axis must not be empty".to_string(),
        ));
    };
    if let Some(key) = time
        .iter()
        .find(|key| key.calendar_month().is_some_and(|month| !(1..=12).contains(&month)))
    {
        return Err(SinkfluxError::Configuration(format!(
            "month must be in 1..=12, got {:?}",
            key
        )));
    }
    for pair in time.windows(2) {
        if pair[0].is_monthly() != first.is_monthly() || pair[1].is_monthly() != first.is_monthly()
        {
            return Err(SinkfluxError::Configuration(
                "time axis mixes monthly and yearly keys".to_string(),
            ));
        }
        if pair[1] <= pair[0] {
            return Err(SinkfluxError::Configuration(format!(
                "time axis must be strictly increasing ({} followed by {})",
                pair[0], pair[1]
            )));
        }
    }
    Ok(())
}

/// Anything that is indexable by time
pub trait TimeIndexed {
    /// Time keys in ascending order
    fn time(&self) -> &[TimeKey];

    fn len(&self) -> usize {
        self.time().len()
    }

    fn is_empty(&self) -> bool {
        self.time().is_empty()
    }

    /// Index of `key` on the time axis
    fn position(&self, key: TimeKey) -> Option<usize> {
        self.time().binary_search(&key).ok()
    }

    fn first_key(&self) -> Option<TimeKey> {
        self.time().first().copied()
    }

    fn last_key(&self) -> Option<TimeKey> {
        self.time().last().copied()
    }
}

/// A named, single-variable time series
///
/// Immutable once built: transformations return a new series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SeriesRecord")]
pub struct Timeseries {
    name: String,
    time: Vec<TimeKey>,
    values: Array1<FloatValue>,
}

#[derive(Deserialize)]
struct SeriesRecord {
    name: String,
    time: Vec<TimeKey>,
    values: Array1<FloatValue>,
}

impl TryFrom<SeriesRecord> for Timeseries {
    type Error = SinkfluxError;

    fn try_from(record: SeriesRecord) -> SinkfluxResult<Self> {
        Timeseries::new(&record.name, record.time, record.values)
    }
}

impl Timeseries {
    pub fn new(name: &str, time: Vec<TimeKey>, values: Array1<FloatValue>) -> SinkfluxResult<Self> {
        validate_time_axis(&time)?;
        if time.len() != values.len() {
            return Err(SinkfluxError::Configuration(format!(
                "timeseries '{}' has {} time keys but {} values",
                name,
                time.len(),
                values.len()
            )));
        }
        Ok(Self {
            name: name.to_string(),
            time,
            values,
        })
    }

    pub fn from_values(
        name: &str,
        time: Vec<TimeKey>,
        values: Vec<FloatValue>,
    ) -> SinkfluxResult<Self> {
        Self::new(name, time, Array1::from_vec(values))
    }

    /// Consecutive yearly series starting at `first_year`
    pub fn yearly(name: &str, first_year: i32, values: Vec<FloatValue>) -> SinkfluxResult<Self> {
        let time = (0..values.len() as i32)
            .map(|offset| TimeKey::Year(first_year + offset))
            .collect();
        Self::from_values(name, time, values)
    }

    /// Consecutive monthly series starting at January of `first_year`
    pub fn monthly(name: &str, first_year: i32, values: Vec<FloatValue>) -> SinkfluxResult<Self> {
        let mut time = Vec::with_capacity(values.len());
        let mut key = TimeKey::Month {
            year: first_year,
            month: 1,
        };
        for _ in 0..values.len() {
            time.push(key);
            key = key.next();
        }
        Self::from_values(name, time, values)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> ArrayView1<'_, FloatValue> {
        self.values.view()
    }

    pub fn to_vec(&self) -> Vec<FloatValue> {
        self.values.to_vec()
    }

    pub fn resolution(&self) -> Resolution {
        if self.time.first().is_some_and(|key| key.is_monthly()) {
            Resolution::Monthly
        } else {
            Resolution::Yearly
        }
    }

    /// Value at `key`, if present
    pub fn get(&self, key: TimeKey) -> Option<FloatValue> {
        self.position(key).map(|index| self.values[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = (TimeKey, FloatValue)> + '_ {
        self.time.iter().copied().zip(self.values.iter().copied())
    }

    /// A new series sharing this time axis but holding different values
    pub fn with_values(&self, values: Array1<FloatValue>) -> SinkfluxResult<Self> {
        Self::new(&self.name, self.time.clone(), values)
    }

    pub fn renamed(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }

    /// Samples whose keys fall within `[start, end]`
    pub fn between(&self, start: TimeKey, end: TimeKey) -> SinkfluxResult<Self> {
        let (time, values): (Vec<_>, Vec<_>) = self
            .iter()
            .filter(|(key, _)| *key >= start && *key <= end)
            .unzip();
        if time.is_empty() {
            return Err(SinkfluxError::DataAlignment(format!(
                "'{}' has no samples between {} and {}",
                self.name, start, end
            )));
        }
        Self::from_values(&self.name, time, values)
    }
}

impl TimeIndexed for Timeseries {
    fn time(&self) -> &[TimeKey] {
        &self.time
    }
}

/// Several series restricted to their common time keys
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSeries {
    pub time: Vec<TimeKey>,
    pub columns: Vec<Array1<FloatValue>>,
}

/// Align series on the intersection of their time keys (an inner join)
///
/// The order of the returned columns matches the order of `series`.
pub fn inner_join(series: &[&Timeseries]) -> SinkfluxResult<AlignedSeries> {
    let Some(first) = series.first() else {
        return Err(SinkfluxError::DataAlignment(
            "no series to align".to_string(),
        ));
    };

    let mut time = Vec::new();
    let mut rows: Vec<Vec<usize>> = Vec::new();
    for key in first.time() {
        let positions: Option<Vec<usize>> = series.iter().map(|s| s.position(*key)).collect();
        if let Some(positions) = positions {
            time.push(*key);
            rows.push(positions);
        }
    }

    if time.is_empty() {
        let names: Vec<&str> = series.iter().map(|s| s.name()).collect();
        return Err(SinkfluxError::DataAlignment(format!(
            "series [{}] share no time keys",
            names.join(", ")
        )));
    }

    let columns = series
        .iter()
        .enumerate()
        .map(|(column, s)| {
            rows.iter()
                .map(|positions| s.values[positions[column]])
                .collect::<Array1<FloatValue>>()
        })
        .collect();

    Ok(AlignedSeries { time, columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn month_keys_order_and_step() {
        let dec = TimeKey::month(1999, 12).unwrap();
        let jan = dec.next();
        assert_eq!(jan, TimeKey::Month { year: 2000, month: 1 });
        assert!(dec < jan);
        assert_eq!(jan.to_string(), "2000-01");
    }

    #[test]
    fn invalid_month() {
        assert!(matches!(
            TimeKey::month(2000, 13),
            Err(SinkfluxError::Configuration(_))
        ));
    }

    #[test]
    fn out_of_range_month_rejected_on_the_axis() {
        for month in [0, 13] {
            let result = Timeseries::from_values(
                "x",
                vec![
                    TimeKey::Month {
                        year: 2000,
                        month: 11,
                    },
                    TimeKey::Month { year: 2000, month },
                ],
                vec![1.0, 2.0],
            );
            assert!(matches!(result, Err(SinkfluxError::Configuration(_))));
        }
    }

    #[test]
    fn deserialised_keys_are_validated() {
        let key: TimeKey = serde_json::from_str(r#"{"Month":{"year":2000,"month":7}}"#).unwrap();
        assert_eq!(key, TimeKey::month(2000, 7).unwrap());
        assert!(serde_json::from_str::<TimeKey>(r#"{"Month":{"year":2000,"month":0}}"#).is_err());
        assert!(serde_json::from_str::<TimeKey>(r#"{"Year":1990}"#).is_ok());

        let document = r#"{"name":"x","time":[{"Month":{"year":2000,"month":13}}],
            "values":{"v":1,"dim":[1],"data":[1.0]}}"#;
        assert!(serde_json::from_str::<Timeseries>(document).is_err());

        let unsorted = r#"{"name":"x","time":[{"Year":2001},{"Year":2000}],
            "values":{"v":1,"dim":[2],"data":[1.0,2.0]}}"#;
        assert!(serde_json::from_str::<Timeseries>(unsorted).is_err());

        let series = Timeseries::yearly("x", 2000, vec![1.0, 2.0]).unwrap();
        let document = serde_json::to_string(&series).unwrap();
        assert_eq!(serde_json::from_str::<Timeseries>(&document).unwrap(), series);
    }

    #[test]
    fn decimal_year_of_month() {
        let key = TimeKey::month(2000, 7).unwrap();
        assert!((key.decimal_year() - 2000.5).abs() < 1e-12);
        assert_eq!(TimeKey::Year(1990).decimal_year(), 1990.0);
    }

    #[test]
    fn range_spans_year_boundary() {
        let keys = TimeKey::range_inclusive(
            TimeKey::month(2000, 11).unwrap(),
            TimeKey::month(2001, 2).unwrap(),
        )
        .unwrap();
        assert_eq!(keys.len(), 4);
        assert_eq!(keys[3], TimeKey::Month { year: 2001, month: 2 });
    }

    #[test]
    fn unsorted_axis_rejected() {
        let result = Timeseries::from_values(
            "test",
            vec![TimeKey::Year(2001), TimeKey::Year(2000)],
            vec![1.0, 2.0],
        );
        assert!(matches!(result, Err(SinkfluxError::Configuration(_))));
    }

    #[test]
    fn length_mismatch_rejected() {
        let result = Timeseries::new("test", vec![TimeKey::Year(2000)], array![1.0, 2.0]);
        assert!(result.is_err());
    }

    #[test]
    fn lookup_by_key() {
        let ts = Timeseries::yearly("CO2", 2000, vec![370.0, 372.0, 374.0]).unwrap();
        assert_eq!(ts.get(TimeKey::Year(2001)), Some(372.0));
        assert_eq!(ts.get(TimeKey::Year(1999)), None);
        assert_eq!(ts.resolution(), Resolution::Yearly);
    }

    #[test]
    fn join_keeps_common_keys() {
        let a = Timeseries::yearly("a", 2000, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Timeseries::yearly("b", 2002, vec![30.0, 40.0, 50.0]).unwrap();

        let aligned = inner_join(&[&a, &b]).unwrap();
        assert_eq!(aligned.time, vec![TimeKey::Year(2002), TimeKey::Year(2003)]);
        assert_eq!(aligned.columns[0], array![3.0, 4.0]);
        assert_eq!(aligned.columns[1], array![30.0, 40.0]);
    }

    #[test]
    fn join_without_overlap_fails() {
        let a = Timeseries::yearly("a", 1960, vec![1.0, 2.0]).unwrap();
        let b = Timeseries::yearly("b", 2000, vec![1.0, 2.0]).unwrap();
        assert!(matches!(
            inner_join(&[&a, &b]),
            Err(SinkfluxError::DataAlignment(_))
        ));
    }

    #[test]
    fn between_is_inclusive() {
        let ts = Timeseries::monthly("x", 2000, (0..24).map(|v| v as f64).collect()).unwrap();
        let sub = ts
            .between(
                TimeKey::month(2000, 12).unwrap(),
                TimeKey::month(2001, 2).unwrap(),
            )
            .unwrap();
        assert_eq!(sub.to_vec(), vec![11.0, 12.0, 13.0]);
    }
}
