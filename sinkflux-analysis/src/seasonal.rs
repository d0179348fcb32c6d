//! Removal of the mean seasonal cycle from monthly series

use ndarray::Array1;
use sinkflux_core::errors::{SinkfluxError, SinkfluxResult};
use sinkflux_core::timeseries::{FloatValue, Timeseries};

/// Mean value of each calendar month, indexed `0..12` for January..December
///
/// Months without any observation are `None`.
pub fn mean_seasonal_cycle(series: &Timeseries) -> SinkfluxResult<[Option<FloatValue>; 12]> {
    let mut sums = [0.0; 12];
    let mut counts = [0usize; 12];
    for (key, value) in series.iter() {
        let Some(month) = key.calendar_month() else {
            return Err(SinkfluxError::Configuration(format!(
                "'{}' is not monthly, so it has no seasonal cycle",
                series.name()
            )));
        };
        let index = month_index(month)?;
        sums[index] += value;
        counts[index] += 1;
    }

    let mut cycle = [None; 12];
    for (index, entry) in cycle.iter_mut().enumerate() {
        if counts[index] > 0 {
            *entry = Some(sums[index] / counts[index] as FloatValue);
        }
    }
    Ok(cycle)
}

/// Residual after subtracting the mean of each calendar month
///
/// The result has the same time keys as `series`. A calendar month observed
/// only once has a residual of zero.
pub fn deseasonalise(series: &Timeseries) -> SinkfluxResult<Timeseries> {
    let cycle = mean_seasonal_cycle(series)?;
    let residual: Array1<FloatValue> = series
        .iter()
        .map(|(key, value)| {
            let mean = key
                .calendar_month()
                .and_then(|month| month_index(month).ok())
                .and_then(|index| cycle[index]);
            value - mean.unwrap_or(value)
        })
        .collect();
    series.with_values(residual)
}

fn month_index(month: u32) -> SinkfluxResult<usize> {
    match month {
        1..=12 => Ok(month as usize - 1),
        _ => Err(SinkfluxError::Configuration(format!(
            "month must be in 1..=12, got {}",
            month
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use sinkflux_core::timeseries::TimeIndexed;

    #[test]
    fn constant_series_has_zero_residual() {
        let series = Timeseries::monthly("flat", 2000, vec![3.5; 36]).unwrap();
        let residual = deseasonalise(&series).unwrap();
        assert!(residual.values().iter().all(|v| *v == 0.0));
        assert_eq!(residual.len(), 36);
    }

    #[test]
    fn pure_seasonal_signal_is_removed() {
        let values = (0..48)
            .map(|i| 10.0 + (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin())
            .collect();
        let series = Timeseries::monthly("seasonal", 1990, values).unwrap();
        let residual = deseasonalise(&series).unwrap();
        for value in residual.values() {
            assert_abs_diff_eq!(*value, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn trend_survives() {
        let values: Vec<f64> = (0..24).map(|i| i as f64).collect();
        let series = Timeseries::monthly("trend", 2000, values).unwrap();
        let residual = deseasonalise(&series).unwrap();
        // Each month appears twice, 12 apart: residuals are -6 then +6
        assert_abs_diff_eq!(residual.values()[0], -6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(residual.values()[23], 6.0, epsilon = 1e-12);
        assert_eq!(residual.time(), series.time());
    }

    #[test]
    fn single_observation_months() {
        let series = Timeseries::monthly("short", 2000, vec![1.0, 5.0, 9.0]).unwrap();
        let residual = deseasonalise(&series).unwrap();
        assert_eq!(residual.to_vec(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn month_index_bounds() {
        assert_eq!(month_index(1).unwrap(), 0);
        assert_eq!(month_index(12).unwrap(), 11);
        assert!(matches!(
            month_index(0),
            Err(SinkfluxError::Configuration(_))
        ));
        assert!(matches!(
            month_index(13),
            Err(SinkfluxError::Configuration(_))
        ));
    }

    #[test]
    fn yearly_series_rejected() {
        let series = Timeseries::yearly("annual", 2000, vec![1.0, 2.0]).unwrap();
        assert!(matches!(
            deseasonalise(&series),
            Err(SinkfluxError::Configuration(_))
        ));
    }
}
