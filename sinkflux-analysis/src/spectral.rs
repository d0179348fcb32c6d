//! Power spectral density by Welch's method
//!
//! The series is cut into overlapping segments of length $L$. Each segment
//! has its mean removed and is tapered by a periodic Hann window $w$. The
//! one-sided periodograms
//!
//! $$ P_k = \frac{c_k}{f_s \sum_j w_j^2} \left| \sum_j w_j x_j e^{-2\pi i jk/L} \right|^2 $$
//!
//! are averaged over segments, with $c_k = 2$ for bins that have a mirrored
//! negative frequency and $c_k = 1$ otherwise. The zero-frequency bin is not
//! reported since its period is infinite.

use log::debug;
use ndarray::Array1;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use sinkflux_core::errors::{SinkfluxError, SinkfluxResult};
use sinkflux_core::timeseries::{FloatValue, TimeIndexed, Timeseries};
use std::f64::consts::PI;

const DEFAULT_SEGMENT_LENGTH: usize = 256;

/// Parameters for Welch's method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WelchParameters {
    /// Samples per segment
    /// default: min(256, series length)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_length: Option<usize>,
    /// Samples shared by consecutive segments
    /// default: half the segment length
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlap: Option<usize>,
    /// Shortest series accepted
    /// default: 4
    pub min_segment_length: usize,
}

impl Default for WelchParameters {
    fn default() -> Self {
        Self {
            segment_length: None,
            overlap: None,
            min_segment_length: 4,
        }
    }
}

/// Spectral power indexed by frequency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumSeries {
    /// Cycles per unit time of the sampling rate
    pub frequency: Array1<FloatValue>,
    /// `1 / frequency`
    pub period: Array1<FloatValue>,
    /// Power spectral density (squared units per frequency unit)
    pub power: Array1<FloatValue>,
}

impl SpectrumSeries {
    pub fn len(&self) -> usize {
        self.frequency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequency.is_empty()
    }

    /// Period with the largest power
    pub fn dominant_period(&self) -> Option<FloatValue> {
        self.power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, _)| self.period[index])
    }
}

/// Estimates power spectra of series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectralAnalyzer {
    parameters: WelchParameters,
}

impl SpectralAnalyzer {
    pub fn from_parameters(parameters: WelchParameters) -> Self {
        Self { parameters }
    }

    pub fn parameters(&self) -> &WelchParameters {
        &self.parameters
    }

    /// Welch estimate of the power spectral density of `series`
    ///
    /// `sampling_rate` is in samples per unit time (1 for yearly data when
    /// periods are wanted in years, 12 for monthly data).
    pub fn power_spectral_density(
        &self,
        series: &Timeseries,
        sampling_rate: FloatValue,
    ) -> SinkfluxResult<SpectrumSeries> {
        if !(sampling_rate > 0.0 && sampling_rate.is_finite()) {
            return Err(SinkfluxError::Configuration(format!(
                "sampling rate must be positive, got {}",
                sampling_rate
            )));
        }
        let n = series.len();
        let minimum = self.parameters.min_segment_length.max(2);
        if n < minimum {
            return Err(SinkfluxError::insufficient(
                "power spectral density",
                minimum,
                n,
            ));
        }

        let segment_length = self
            .parameters
            .segment_length
            .unwrap_or(DEFAULT_SEGMENT_LENGTH.min(n));
        if segment_length < minimum || segment_length > n {
            return Err(SinkfluxError::insufficient(
                "power spectral density segment",
                segment_length.max(minimum),
                n,
            ));
        }
        let overlap = self.parameters.overlap.unwrap_or(segment_length / 2);
        if overlap >= segment_length {
            return Err(SinkfluxError::Configuration(format!(
                "segment overlap ({}) must be smaller than the segment length ({})",
                overlap, segment_length
            )));
        }

        let step = segment_length - overlap;
        let n_segments = (n - overlap) / step;
        let window = periodic_hann(segment_length);
        let scale = 1.0 / (sampling_rate * window.iter().map(|w| w * w).sum::<FloatValue>());
        let n_bins = segment_length / 2 + 1;
        debug!(
            "Welch estimate with {} segments of {} samples ({} overlap)",
            n_segments, segment_length, overlap
        );

        let mut planner = FftPlanner::<FloatValue>::new();
        let fft = planner.plan_fft_forward(segment_length);
        let values = series.values();
        let mut power = vec![0.0; n_bins];
        let mut buffer = vec![Complex::new(0.0, 0.0); segment_length];
        for segment in 0..n_segments {
            let start = segment * step;
            let samples = values.slice(ndarray::s![start..start + segment_length]);
            let mean = samples.sum() / segment_length as FloatValue;
            for ((slot, sample), w) in buffer.iter_mut().zip(samples.iter()).zip(window.iter()) {
                *slot = Complex::new((sample - mean) * w, 0.0);
            }
            fft.process(&mut buffer);
            for (bin, total) in power.iter_mut().enumerate() {
                *total += buffer[bin].norm_sqr() * scale;
            }
        }

        let last_doubled = if segment_length % 2 == 0 {
            n_bins - 1
        } else {
            n_bins
        };
        let frequency: Array1<FloatValue> = (1..n_bins)
            .map(|bin| bin as FloatValue * sampling_rate / segment_length as FloatValue)
            .collect();
        let power: Array1<FloatValue> = (1..n_bins)
            .map(|bin| {
                let doubling = if bin < last_doubled { 2.0 } else { 1.0 };
                doubling * power[bin] / n_segments as FloatValue
            })
            .collect();
        let period = frequency.mapv(|f| 1.0 / f);

        Ok(SpectrumSeries {
            frequency,
            period,
            power,
        })
    }
}

/// Hann window of length `n` for spectral estimation (periodic form)
fn periodic_hann(n: usize) -> Vec<FloatValue> {
    (0..n)
        .map(|k| 0.5 - 0.5 * (2.0 * PI * k as FloatValue / n as FloatValue).cos())
        .collect()
}
