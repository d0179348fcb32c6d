//! Behavioural tests for the analysis routines.
//!
//! These tests verify properties of the filters, trends, spectra and
//! feedback fits on synthetic signals:
//! - Butterworth filters pass their band and attenuate everything else
//! - Window and spectral estimates recover known periods and counts
//! - Feedback fits recover the coefficients used to build the uptake
//! - Results survive a JSON round trip

use approx::assert_relative_eq;
use sinkflux_analysis::feedback::{
    airborne_fraction, EnsembleFeedback, FeedbackParameters, FeedbackRegressor,
};
use sinkflux_analysis::filter::{BandpassFilter, FilterKind, FilterParameters};
use sinkflux_analysis::seasonal::deseasonalise;
use sinkflux_analysis::spectral::{SpectralAnalyzer, WelchParameters};
use sinkflux_analysis::trend::{cascading_window_trend, Independent, TrendSeries};
use sinkflux_core::errors::SinkfluxError;
use sinkflux_core::timeseries::{TimeIndexed, TimeKey, Timeseries};
use std::collections::BTreeMap;
use std::f64::consts::PI;

const MONTHS_PER_YEAR: f64 = 12.0;

/// Unit-amplitude sine with `frequency` cycles per year sampled monthly
fn monthly_sine(frequency: f64, n: usize) -> Timeseries {
    let values = (0..n)
        .map(|i| (2.0 * PI * frequency * i as f64 / MONTHS_PER_YEAR).sin())
        .collect();
    Timeseries::monthly("sine", 1960, values).unwrap()
}

/// Ratio of peak amplitudes away from the ends of the series
fn amplitude_ratio(filtered: &Timeseries, original: &Timeseries) -> f64 {
    let n = original.len();
    let middle = n / 4..3 * n / 4;
    let peak = |series: &Timeseries| {
        series.values().as_slice().unwrap()[middle.clone()]
            .iter()
            .fold(0.0f64, |acc, v| acc.max(v.abs()))
    };
    peak(filtered) / peak(original)
}

mod bandpass {
    use super::*;

    #[test]
    fn test_lowpass_keeps_slow_and_removes_fast_signals() {
        let filter = BandpassFilter::default();
        for (frequency, passes) in [(0.1, true), (2.0, false)] {
            let series = monthly_sine(frequency, 600);
            let filtered = filter
                .bandpass(&series, &[0.5], MONTHS_PER_YEAR, FilterKind::Low)
                .unwrap();
            assert_eq!(filtered.time(), series.time());
            let ratio = amplitude_ratio(&filtered, &series);
            if passes {
                assert!((0.9..=1.1).contains(&ratio), "ratio {} at {}", ratio, frequency);
            } else {
                assert!(ratio < 0.1, "ratio {} at {}", ratio, frequency);
            }
        }
    }

    #[test]
    fn test_highpass_keeps_fast_and_removes_slow_signals() {
        let filter = BandpassFilter::default();
        for (frequency, passes) in [(3.0, true), (0.1, false)] {
            let series = monthly_sine(frequency, 600);
            let filtered = filter
                .bandpass(&series, &[1.0], MONTHS_PER_YEAR, FilterKind::High)
                .unwrap();
            let ratio = amplitude_ratio(&filtered, &series);
            if passes {
                assert!((0.9..=1.1).contains(&ratio), "ratio {} at {}", ratio, frequency);
            } else {
                assert!(ratio < 0.1, "ratio {} at {}", ratio, frequency);
            }
        }
    }

    #[test]
    fn test_band_keeps_in_band_signal() {
        let filter = BandpassFilter::default();
        let inside = monthly_sine(1.0, 600);
        let filtered = filter
            .bandpass(&inside, &[0.5, 2.0], MONTHS_PER_YEAR, FilterKind::Band)
            .unwrap();
        let ratio = amplitude_ratio(&filtered, &inside);
        assert!((0.9..=1.1).contains(&ratio), "in-band ratio {}", ratio);

        let outside = monthly_sine(5.0, 600);
        let filtered = filter
            .bandpass(&outside, &[0.5, 2.0], MONTHS_PER_YEAR, FilterKind::Band)
            .unwrap();
        let ratio = amplitude_ratio(&filtered, &outside);
        assert!(ratio < 0.1, "out-of-band ratio {}", ratio);
    }

    #[test]
    fn test_band_needs_ascending_pair() {
        let series = monthly_sine(1.0, 120);
        let filter = BandpassFilter::default();
        for cutoff in [vec![1.0], vec![2.0, 0.5], vec![0.5, 6.0]] {
            assert!(matches!(
                filter.bandpass(&series, &cutoff, MONTHS_PER_YEAR, FilterKind::Band),
                Err(SinkfluxError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_deseasonalising_first_removes_annual_cycle() {
        let series = monthly_sine(1.0, 480);
        let plain = BandpassFilter::default()
            .bandpass(&series, &[0.5, 2.0], MONTHS_PER_YEAR, FilterKind::Band)
            .unwrap();
        assert!(amplitude_ratio(&plain, &series) > 0.9);

        let filter = BandpassFilter::from_parameters(FilterParameters {
            deseasonalise_first: true,
            ..Default::default()
        });
        let filtered = filter
            .bandpass(&series, &[0.5, 2.0], MONTHS_PER_YEAR, FilterKind::Band)
            .unwrap();
        assert_eq!(filtered.time(), series.time());
        assert!(amplitude_ratio(&filtered, &series) < 0.1);
    }
}

mod trends {
    use super::*;

    #[test]
    fn test_window_row_count() {
        for n in [5usize, 12, 60] {
            let series =
                Timeseries::yearly("sink", 1959, (0..n).map(|i| (i as f64).sqrt()).collect())
                    .unwrap();
            for window in 1..n {
                let trend = cascading_window_trend(&series, window, Independent::Time).unwrap();
                assert_eq!(trend.len(), n - window);
            }
            assert!(matches!(
                cascading_window_trend(&series, n, Independent::Time),
                Err(SinkfluxError::InsufficientData { .. })
            ));
        }
    }

    #[test]
    fn test_constant_monthly_signal_deseasonalises_to_zero() {
        let series = Timeseries::monthly("flat", 1990, vec![-2.25; 120]).unwrap();
        let residual = deseasonalise(&series).unwrap();
        assert!(residual.values().iter().all(|v| *v == 0.0));
    }
}

mod spectra {
    use super::*;

    #[test]
    fn test_decadal_signal_in_yearly_data() {
        let values = (0..200)
            .map(|i| (2.0 * PI * i as f64 / 10.0).cos())
            .collect();
        let series = Timeseries::yearly("decadal", 1800, values).unwrap();
        let analyzer = SpectralAnalyzer::from_parameters(WelchParameters {
            segment_length: Some(100),
            ..Default::default()
        });
        let spectrum = analyzer.power_spectral_density(&series, 1.0).unwrap();
        assert_relative_eq!(spectrum.dominant_period().unwrap(), 10.0, epsilon = 1e-9);
    }
}

mod feedback {
    use super::*;

    #[test]
    fn test_synthetic_uptake_recovers_coefficients() {
        let n = 50;
        let co2 =
            Timeseries::yearly("CO2", 1970, (0..n).map(|i| 325.0 + 1.8 * i as f64).collect())
                .unwrap();
        let temperature = Timeseries::yearly(
            "T",
            1970,
            (0..n)
                .map(|i| 0.018 * i as f64 + 0.15 * (0.9 * i as f64).cos())
                .collect(),
        )
        .unwrap();
        let uptake = co2
            .with_values(&co2.values().mapv(|c| 0.5 * c) + &temperature.values().mapv(|t| 0.5 * t))
            .unwrap();

        let regressor = FeedbackRegressor::default();
        let land = regressor.fit_feedback(&uptake, &co2, &temperature).unwrap();
        assert_relative_eq!(land.beta, 0.5 / 2.12, epsilon = 1e-8);
        assert_relative_eq!(land.gamma, 0.5, epsilon = 1e-8);

        // A sink this strong takes up more than is emitted
        let total = land + land;
        let fraction = airborne_fraction(&total, 2.0).unwrap();
        assert!(fraction < 0.0);
    }
}

mod serialization {
    use super::*;

    #[test]
    fn test_trend_series_json_round_trip() {
        let series = Timeseries::monthly(
            "uptake",
            1980,
            (0..48).map(|i| 0.1 * i as f64 + (i as f64).sin()).collect(),
        )
        .unwrap();
        let trend = cascading_window_trend(&series, 12, Independent::Time).unwrap();

        let document = serde_json::to_string(&trend).unwrap();
        let restored: TrendSeries = serde_json::from_str(&document).unwrap();
        assert_eq!(restored.name(), trend.name());
        assert_eq!(restored.window(), 12);
        assert_eq!(restored.len(), trend.len());
        assert_eq!(restored.rows()[0].start, TimeKey::month(1980, 1).unwrap());
        for (restored, original) in restored.rows().iter().zip(trend.rows()) {
            assert_eq!(restored.start, original.start);
            assert_relative_eq!(restored.slope, original.slope, max_relative = 1e-14);
            assert_relative_eq!(
                restored.correlation,
                original.correlation,
                max_relative = 1e-14
            );
        }
    }

    #[test]
    fn test_trend_rows_reject_invalid_months() {
        let document = r#"{"name":"x","window":1,"rows":[
            {"start":{"Month":{"year":2000,"month":13}},"label":0.0,"slope":1.0,"correlation":1.0}
        ]}"#;
        assert!(serde_json::from_str::<TrendSeries>(document).is_err());
    }

    #[test]
    fn test_ensemble_feedback_json_round_trip() {
        let n = 40;
        let co2 =
            Timeseries::yearly("CO2", 1980, (0..n).map(|i| 338.0 + 2.0 * i as f64).collect())
                .unwrap();
        let temperature = Timeseries::yearly(
            "T",
            1980,
            (0..n).map(|i| 0.02 * i as f64 + 0.1 * (1.3 * i as f64).sin()).collect(),
        )
        .unwrap();
        let mut uptake = BTreeMap::new();
        for (model, scale) in [("model-a", 0.4), ("model-b", 0.6)] {
            let values = &co2.values().mapv(|c| scale * c) - &temperature.values().mapv(|t| t);
            uptake.insert(model.to_string(), co2.with_values(values).unwrap());
        }
        let ensemble = FeedbackRegressor::default()
            .fit_ensemble(&uptake, &co2, &temperature)
            .unwrap();

        let document = serde_json::to_string(&ensemble).unwrap();
        let restored: EnsembleFeedback = serde_json::from_str(&document).unwrap();
        assert_eq!(
            restored.models.keys().collect::<Vec<_>>(),
            vec!["model-a", "model-b"]
        );
        let close = |a: &FeedbackParameters, b: &FeedbackParameters| {
            assert_relative_eq!(a.beta, b.beta, max_relative = 1e-14);
            assert_relative_eq!(a.gamma, b.gamma, max_relative = 1e-14);
            assert_relative_eq!(a.u_gamma, b.u_gamma, max_relative = 1e-14);
        };
        close(&restored.mean, &ensemble.mean);
        for (model, parameters) in ensemble.models.iter() {
            close(&restored.models[model], parameters);
        }
    }
}
