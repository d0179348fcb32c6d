//! Zero-phase Butterworth filtering
//!
//! The analog Butterworth prototype of order $N$ has poles
//!
//! $$ p_m = -e^{i \pi m / 2N}, \quad m = -N+1, -N+3, \dots, N-1 $$
//!
//! on the left half of the unit circle. The prototype is moved to the
//! requested cutoff (low, high or band) and mapped to the z-plane with the
//! bilinear transform, pre-warping the cutoffs so the digital filter has its
//! -3 dB points exactly at the requested frequencies. Filtering runs forwards
//! then backwards ([`filtfilt`]) so the output has no phase lag.

use crate::seasonal::deseasonalise;
use log::debug;
use nalgebra::{DMatrix, DVector};
use ndarray::Array1;
use num::complex::Complex64;
use serde::{Deserialize, Serialize};
use sinkflux_core::errors::{SinkfluxError, SinkfluxResult};
use sinkflux_core::timeseries::{FloatValue, Timeseries};
use std::f64::consts::PI;

/// Sampling rate of the normalised digital frequency axis (Nyquist = 1)
const DIGITAL_FS: FloatValue = 2.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterKind {
    Low,
    High,
    Band,
}

/// Parameters for Butterworth filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParameters {
    /// Order of the analog prototype
    /// default: 5
    pub order: usize,
    /// Remove the mean seasonal cycle before filtering (monthly series only)
    /// default: false
    pub deseasonalise_first: bool,
}

impl Default for FilterParameters {
    fn default() -> Self {
        Self {
            order: 5,
            deseasonalise_first: false,
        }
    }
}

/// Digital filter coefficients, `a[0] == 1`
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFunction {
    pub b: Vec<FloatValue>,
    pub a: Vec<FloatValue>,
}

/// Zeros, poles and gain of a filter
struct Zpk {
    zeros: Vec<Complex64>,
    poles: Vec<Complex64>,
    gain: FloatValue,
}

/// Design a digital Butterworth filter
///
/// `cutoff` holds frequencies normalised by the Nyquist frequency, strictly
/// between 0 and 1: one value for low/high-pass, an ascending pair for
/// band-pass.
pub fn butterworth(
    order: usize,
    cutoff: &[FloatValue],
    kind: FilterKind,
) -> SinkfluxResult<TransferFunction> {
    if order == 0 {
        return Err(SinkfluxError::Configuration(
            "filter order must be at least 1".to_string(),
        ));
    }
    validate_cutoff(cutoff, kind)?;

    let prototype = prototype(order);
    let warped: Vec<FloatValue> = cutoff
        .iter()
        .map(|wn| 2.0 * DIGITAL_FS * (PI * wn / DIGITAL_FS).tan())
        .collect();
    let analog = match kind {
        FilterKind::Low => lowpass(prototype, warped[0]),
        FilterKind::High => highpass(prototype, warped[0]),
        FilterKind::Band => {
            let centre = (warped[0] * warped[1]).sqrt();
            bandpass_transform(prototype, centre, warped[1] - warped[0])
        }
    };
    let digital = bilinear(analog, DIGITAL_FS);

    let b: Vec<FloatValue> = poly(&digital.zeros)
        .iter()
        .map(|c| c.re * digital.gain)
        .collect();
    let a: Vec<FloatValue> = poly(&digital.poles).iter().map(|c| c.re).collect();
    Ok(TransferFunction { b, a })
}

fn validate_cutoff(cutoff: &[FloatValue], kind: FilterKind) -> SinkfluxResult<()> {
    let expected = if kind == FilterKind::Band { 2 } else { 1 };
    if cutoff.len() != expected {
        return Err(SinkfluxError::Configuration(format!(
            "a {:?} filter needs {} cutoff frequencies, got {}",
            kind,
            expected,
            cutoff.len()
        )));
    }
    if cutoff.iter().any(|wn| !(*wn > 0.0 && *wn < 1.0)) {
        return Err(SinkfluxError::Configuration(format!(
            "cutoff frequencies must lie strictly between 0 and the Nyquist frequency, got {:?}",
            cutoff
        )));
    }
    if kind == FilterKind::Band && cutoff[0] >= cutoff[1] {
        return Err(SinkfluxError::Configuration(format!(
            "band cutoffs must be ascending, got {:?}",
            cutoff
        )));
    }
    Ok(())
}

fn prototype(order: usize) -> Zpk {
    let n = order as i64;
    let poles = (0..order as i64)
        .map(|i| {
            let m = -n + 1 + 2 * i;
            -Complex64::from_polar(1.0, PI * m as FloatValue / (2.0 * n as FloatValue))
        })
        .collect();
    Zpk {
        zeros: Vec::new(),
        poles,
        gain: 1.0,
    }
}

fn relative_degree(zpk: &Zpk) -> usize {
    zpk.poles.len() - zpk.zeros.len()
}

fn lowpass(zpk: Zpk, wo: FloatValue) -> Zpk {
    let degree = relative_degree(&zpk);
    Zpk {
        zeros: zpk.zeros.iter().map(|&z| z * wo).collect(),
        poles: zpk.poles.iter().map(|&p| p * wo).collect(),
        gain: zpk.gain * wo.powi(degree as i32),
    }
}

fn highpass(zpk: Zpk, wo: FloatValue) -> Zpk {
    let degree = relative_degree(&zpk);
    let wo = Complex64::new(wo, 0.0);
    let numerator: Complex64 = zpk.zeros.iter().map(|&z| -z).product();
    let denominator: Complex64 = zpk.poles.iter().map(|&p| -p).product();
    let mut zeros: Vec<Complex64> = zpk.zeros.iter().map(|&z| wo / z).collect();
    zeros.extend(std::iter::repeat(Complex64::new(0.0, 0.0)).take(degree));
    Zpk {
        zeros,
        poles: zpk.poles.iter().map(|&p| wo / p).collect(),
        gain: zpk.gain * (numerator / denominator).re,
    }
}

fn bandpass_transform(zpk: Zpk, wo: FloatValue, bandwidth: FloatValue) -> Zpk {
    let degree = relative_degree(&zpk);
    let split = |roots: &[Complex64]| -> Vec<Complex64> {
        let scaled: Vec<Complex64> = roots.iter().map(|&r| r * (bandwidth / 2.0)).collect();
        let upper = scaled.iter().map(|&r| r + (r * r - wo * wo).sqrt());
        let lower = scaled.iter().map(|&r| r - (r * r - wo * wo).sqrt());
        upper.chain(lower).collect()
    };
    let mut zeros = split(&zpk.zeros);
    zeros.extend(std::iter::repeat(Complex64::new(0.0, 0.0)).take(degree));
    Zpk {
        zeros,
        poles: split(&zpk.poles),
        gain: zpk.gain * bandwidth.powi(degree as i32),
    }
}

fn bilinear(zpk: Zpk, fs: FloatValue) -> Zpk {
    let degree = relative_degree(&zpk);
    let fs2 = Complex64::new(2.0 * fs, 0.0);
    let numerator: Complex64 = zpk.zeros.iter().map(|&z| fs2 - z).product();
    let denominator: Complex64 = zpk.poles.iter().map(|&p| fs2 - p).product();
    let mut zeros: Vec<Complex64> = zpk.zeros.iter().map(|&z| (fs2 + z) / (fs2 - z)).collect();
    zeros.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(degree));
    Zpk {
        zeros,
        poles: zpk.poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect(),
        gain: zpk.gain * (numerator / denominator).re,
    }
}

/// Polynomial coefficients (highest power first) with the given roots
fn poly(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coefficients = vec![Complex64::new(1.0, 0.0)];
    for &root in roots {
        let mut next = coefficients.clone();
        next.push(Complex64::new(0.0, 0.0));
        for (j, &c) in coefficients.iter().enumerate() {
            next[j + 1] -= root * c;
        }
        coefficients = next;
    }
    coefficients
}

impl TransferFunction {
    fn normalised(&self) -> SinkfluxResult<(Vec<FloatValue>, Vec<FloatValue>)> {
        let a0 = self.a.first().copied().unwrap_or(0.0);
        if a0 == 0.0 || self.b.is_empty() {
            return Err(SinkfluxError::NumericDomain(
                "filter denominator must have a non-zero leading coefficient".to_string(),
            ));
        }
        let n = self.a.len().max(self.b.len());
        let mut b: Vec<FloatValue> = self.b.iter().map(|v| v / a0).collect();
        let mut a: Vec<FloatValue> = self.a.iter().map(|v| v / a0).collect();
        b.resize(n, 0.0);
        a.resize(n, 0.0);
        Ok((b, a))
    }

    /// Direct form II transposed filtering of `x` from the initial state `zi`
    pub fn lfilter(&self, x: &[FloatValue], zi: &[FloatValue]) -> SinkfluxResult<Vec<FloatValue>> {
        let (b, a) = self.normalised()?;
        let order = b.len() - 1;
        if zi.len() != order {
            return Err(SinkfluxError::Configuration(format!(
                "initial state has {} values, expected {}",
                zi.len(),
                order
            )));
        }
        let mut state = zi.to_vec();
        let mut y = Vec::with_capacity(x.len());
        for &sample in x {
            let output = b[0] * sample + state.first().copied().unwrap_or(0.0);
            for i in 0..order {
                let carried = if i + 1 < order { state[i + 1] } else { 0.0 };
                state[i] = b[i + 1] * sample - a[i + 1] * output + carried;
            }
            y.push(output);
        }
        Ok(y)
    }

    /// Initial state for a step response in steady state
    pub fn lfilter_zi(&self) -> SinkfluxResult<Vec<FloatValue>> {
        let (b, a) = self.normalised()?;
        let m = b.len() - 1;
        if m == 0 {
            return Ok(Vec::new());
        }
        // I - companion(a)^T
        let matrix = DMatrix::from_fn(m, m, |i, j| {
            let identity = if i == j { 1.0 } else { 0.0 };
            let companion_t = if j == 0 {
                -a[i + 1]
            } else if i + 1 == j {
                1.0
            } else {
                0.0
            };
            identity - companion_t
        });
        let rhs = DVector::from_fn(m, |i, _| b[i + 1] - a[i + 1] * b[0]);
        matrix
            .lu()
            .solve(&rhs)
            .map(|zi| zi.iter().copied().collect())
            .ok_or_else(|| {
                SinkfluxError::NumericDomain("filter has no steady state".to_string())
            })
    }

    /// Forward-backward filtering with odd extension at both ends
    pub fn filtfilt(&self, x: &[FloatValue]) -> SinkfluxResult<Vec<FloatValue>> {
        let padlen = 3 * self.a.len().max(self.b.len());
        if x.len() <= padlen {
            return Err(SinkfluxError::insufficient(
                "zero-phase filtering",
                padlen + 1,
                x.len(),
            ));
        }
        let extended = odd_extension(x, padlen);
        let zi = self.lfilter_zi()?;

        let scaled = |scale: FloatValue| zi.iter().map(|z| z * scale).collect::<Vec<_>>();
        let mut forward = self.lfilter(&extended, &scaled(extended[0]))?;
        forward.reverse();
        let mut backward = self.lfilter(&forward, &scaled(forward[0]))?;
        backward.reverse();

        Ok(backward[padlen..backward.len() - padlen].to_vec())
    }
}

fn odd_extension(x: &[FloatValue], padlen: usize) -> Vec<FloatValue> {
    let n = x.len();
    let first = x[0];
    let last = x[n - 1];
    let mut extended = Vec::with_capacity(n + 2 * padlen);
    extended.extend((1..=padlen).rev().map(|i| 2.0 * first - x[i]));
    extended.extend_from_slice(x);
    extended.extend((1..=padlen).map(|i| 2.0 * last - x[n - 1 - i]));
    extended
}

/// Applies Butterworth filters to series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandpassFilter {
    parameters: FilterParameters,
}

impl BandpassFilter {
    pub fn from_parameters(parameters: FilterParameters) -> Self {
        Self { parameters }
    }

    pub fn parameters(&self) -> &FilterParameters {
        &self.parameters
    }

    /// Zero-phase low, high or band-pass filtering of `series`
    ///
    /// `cutoff` is in cycles per unit time and `sampling_rate` in samples per
    /// unit time; cutoffs are normalised by the Nyquist frequency
    /// `sampling_rate / 2`. The result keeps the time keys of `series`.
    pub fn bandpass(
        &self,
        series: &Timeseries,
        cutoff: &[FloatValue],
        sampling_rate: FloatValue,
        kind: FilterKind,
    ) -> SinkfluxResult<Timeseries> {
        if !(sampling_rate > 0.0 && sampling_rate.is_finite()) {
            return Err(SinkfluxError::Configuration(format!(
                "sampling rate must be positive, got {}",
                sampling_rate
            )));
        }
        let nyquist = sampling_rate / 2.0;
        let normalised: Vec<FloatValue> = cutoff.iter().map(|c| c / nyquist).collect();
        let filter = butterworth(self.parameters.order, &normalised, kind)?;

        let input = if self.parameters.deseasonalise_first {
            deseasonalise(series)?
        } else {
            series.clone()
        };
        debug!(
            "Applying order {} {:?} filter at {:?} to '{}'",
            self.parameters.order,
            kind,
            cutoff,
            series.name()
        );
        let filtered = filter.filtfilt(&input.to_vec())?;
        input.with_values(Array1::from_vec(filtered))
    }
}
