//! Trend and window statistics of a single series
//!
//! The cascading window trend fits a line to every run of `window + 1`
//! consecutive samples,
//!
//! $$ y_{i..i+w} \approx a_i + b_i \, x_{i..i+w}, \quad i = 0, \dots, N - w - 1 $$
//!
//! giving exactly $N - w$ slopes $b_i$. The independent variable $x$ is either
//! the time axis (in decimal years) or a second series such as atmospheric
//! CO2, aligned on common time keys.

use crate::regression::linregress;
use log::debug;
use ndarray::{s, Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use sinkflux_core::errors::{SinkfluxError, SinkfluxResult};
use sinkflux_core::timeseries::{inner_join, FloatValue, TimeIndexed, TimeKey, Timeseries};

/// Independent variable of a trend regression
#[derive(Debug, Clone, Copy)]
pub enum Independent<'a> {
    /// Elapsed time in decimal years
    Time,
    /// Another series (e.g. CO2 concentration), joined on time keys
    Series(&'a Timeseries),
}

/// Regression of one window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendRow {
    /// Time key of the first sample in the window
    pub start: TimeKey,
    /// Independent-variable value at the first sample
    pub label: FloatValue,
    pub slope: FloatValue,
    /// Pearson correlation within the window
    pub correlation: FloatValue,
}

/// Slopes of successive windows, ordered by window start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSeries {
    name: String,
    window: usize,
    rows: Vec<TrendRow>,
}

impl TrendSeries {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn rows(&self) -> &[TrendRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn labels(&self) -> Array1<FloatValue> {
        self.rows.iter().map(|row| row.label).collect()
    }

    pub fn slopes(&self) -> Array1<FloatValue> {
        self.rows.iter().map(|row| row.slope).collect()
    }

    pub fn correlations(&self) -> Array1<FloatValue> {
        self.rows.iter().map(|row| row.correlation).collect()
    }

    /// Slopes keyed by the time key of each window start
    pub fn to_timeseries(&self) -> SinkfluxResult<Timeseries> {
        let time = self.rows.iter().map(|row| row.start).collect();
        Timeseries::new(&self.name, time, self.slopes())
    }
}

/// Linear trend over every window of `window + 1` consecutive samples
///
/// Returns `N - window` rows for an `N`-sample input (after alignment with
/// the independent series, if any).
pub fn cascading_window_trend(
    series: &Timeseries,
    window: usize,
    independent: Independent<'_>,
) -> SinkfluxResult<TrendSeries> {
    if window == 0 {
        return Err(SinkfluxError::Configuration(
            "the trend window must span at least one step".to_string(),
        ));
    }

    let (time, x, y) = match independent {
        Independent::Time => (
            series.time().to_vec(),
            series.time().iter().map(|key| key.decimal_year()).collect::<Array1<_>>(),
            series.values().to_owned(),
        ),
        Independent::Series(other) => {
            let mut aligned = inner_join(&[series, other])?;
            let x = aligned.columns.pop().unwrap_or_default();
            let y = aligned.columns.pop().unwrap_or_default();
            (aligned.time, x, y)
        }
    };

    let n = y.len();
    if window >= n {
        return Err(SinkfluxError::insufficient(
            "cascading window trend",
            window + 1,
            n,
        ));
    }

    let rows = (0..n - window)
        .map(|i| {
            let fit = linregress(x.slice(s![i..=i + window]), y.slice(s![i..=i + window]))?;
            Ok(TrendRow {
                start: time[i],
                label: x[i],
                slope: fit.slope,
                correlation: fit.r_value,
            })
        })
        .collect::<SinkfluxResult<Vec<_>>>()?;
    debug!(
        "Computed {} window trends of width {} for '{}'",
        rows.len(),
        window,
        series.name()
    );

    Ok(TrendSeries {
        name: series.name().to_string(),
        window,
        rows,
    })
}

/// Trailing mean over `window` samples, keyed by the last sample of each window
pub fn rolling_mean(series: &Timeseries, window: usize) -> SinkfluxResult<Timeseries> {
    if window == 0 {
        return Err(SinkfluxError::Configuration(
            "the rolling window must hold at least one sample".to_string(),
        ));
    }
    if window > series.len() {
        return Err(SinkfluxError::insufficient("rolling mean", window, series.len()));
    }

    let values = series.values();
    let means: Vec<FloatValue> = values
        .windows(window)
        .into_iter()
        .map(|chunk| chunk.sum() / window as FloatValue)
        .collect();
    let time = series.time()[window - 1..].to_vec();
    Timeseries::from_values(series.name(), time, means)
}

/// Sample autocorrelation for lags `0..N`
///
/// Uses the biased estimator
/// $r(h) = \sum_i (x_i - \bar{x})(x_{i+h} - \bar{x}) / \sum_i (x_i - \bar{x})^2$.
pub fn autocorrelation(series: &Timeseries) -> SinkfluxResult<Array1<FloatValue>> {
    autocorrelation_of(series.values())
}

fn autocorrelation_of(values: ArrayView1<'_, FloatValue>) -> SinkfluxResult<Array1<FloatValue>> {
    let n = values.len();
    let mean = values.sum() / n as FloatValue;
    let centred = values.mapv(|v| v - mean);
    let denominator = centred.dot(&centred);
    if denominator == 0.0 || !denominator.is_finite() {
        return Err(SinkfluxError::NumericDomain(
            "autocorrelation of a constant series is undefined".to_string(),
        ));
    }
    Ok((0..n)
        .map(|lag| centred.slice(s![..n - lag]).dot(&centred.slice(s![lag..])) / denominator)
        .collect())
}
