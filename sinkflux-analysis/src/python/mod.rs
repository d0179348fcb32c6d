//! Python bindings for the analysis routines
//!
//! Series cross the boundary as `sinkflux.core.Timeseries` objects. Results
//! that are not series come back as dictionaries of numpy arrays or floats.

use crate::feedback::{self, FeedbackConstants, FeedbackParameters, FeedbackRegressor};
use crate::filter::{BandpassFilter, FilterKind, FilterParameters};
use crate::seasonal;
use crate::spectral::{SpectralAnalyzer, WelchParameters};
use crate::trend::{self, Independent};
use numpy::ToPyArray;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use pyo3::{pymodule, Bound, PyResult};
use sinkflux_core::python::{key_to_python, parameters_from_python, PyTimeseries};
use sinkflux_core::timeseries::FloatValue;

fn parse_kind(kind: &str) -> PyResult<FilterKind> {
    match kind.to_lowercase().as_str() {
        "low" => Ok(FilterKind::Low),
        "high" => Ok(FilterKind::High),
        "band" => Ok(FilterKind::Band),
        _ => Err(PyValueError::new_err(format!("Unknown filter kind: {}", kind))),
    }
}

fn feedback_from_python(parameters: &Bound<'_, PyAny>) -> PyResult<FeedbackParameters> {
    pythonize::depythonize::<FeedbackParameters>(parameters)
        .map_err(|e| PyValueError::new_err(format!("{}", e)))
}

fn feedback_to_python<'py>(
    py: Python<'py>,
    parameters: &FeedbackParameters,
) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("beta", parameters.beta)?;
    dict.set_item("gamma", parameters.gamma)?;
    dict.set_item("u_gamma", parameters.u_gamma)?;
    Ok(dict)
}

/// Slope and correlation of every window of `window + 1` samples
///
/// Regresses against time unless `independent` is given.
#[pyfunction]
#[pyo3(signature = (series, window, independent=None))]
pub fn cascading_window_trend<'py>(
    py: Python<'py>,
    series: &PyTimeseries,
    window: usize,
    independent: Option<PyTimeseries>,
) -> PyResult<Bound<'py, PyDict>> {
    let independent = match &independent {
        Some(other) => Independent::Series(&other.0),
        None => Independent::Time,
    };
    let trend = trend::cascading_window_trend(&series.0, window, independent)?;

    let dict = PyDict::new(py);
    let start: Vec<_> = trend.rows().iter().map(|row| key_to_python(row.start)).collect();
    dict.set_item("start", start)?;
    dict.set_item("label", trend.labels().to_pyarray(py))?;
    dict.set_item("slope", trend.slopes().to_pyarray(py))?;
    dict.set_item("correlation", trend.correlations().to_pyarray(py))?;
    Ok(dict)
}

#[pyfunction]
pub fn deseasonalise(series: &PyTimeseries) -> PyResult<PyTimeseries> {
    Ok(PyTimeseries(seasonal::deseasonalise(&series.0)?))
}

#[pyfunction]
pub fn rolling_mean(series: &PyTimeseries, window: usize) -> PyResult<PyTimeseries> {
    Ok(PyTimeseries(trend::rolling_mean(&series.0, window)?))
}

/// Welch power spectral density as `{"frequency", "period", "power"}`
#[pyfunction]
#[pyo3(signature = (series, sampling_rate=1.0, parameters=None))]
pub fn power_spectral_density<'py>(
    py: Python<'py>,
    series: &PyTimeseries,
    sampling_rate: FloatValue,
    parameters: Option<Bound<'py, PyAny>>,
) -> PyResult<Bound<'py, PyDict>> {
    let analyzer =
        SpectralAnalyzer::from_parameters(parameters_from_python::<WelchParameters>(parameters)?);
    let spectrum = analyzer.power_spectral_density(&series.0, sampling_rate)?;

    let dict = PyDict::new(py);
    dict.set_item("frequency", spectrum.frequency.to_pyarray(py))?;
    dict.set_item("period", spectrum.period.to_pyarray(py))?;
    dict.set_item("power", spectrum.power.to_pyarray(py))?;
    Ok(dict)
}

/// Zero-phase Butterworth filter; `kind` is "low", "high" or "band"
#[pyfunction]
#[pyo3(signature = (series, cutoff, sampling_rate=1.0, kind="band", parameters=None))]
pub fn bandpass(
    series: &PyTimeseries,
    cutoff: Vec<FloatValue>,
    sampling_rate: FloatValue,
    kind: &str,
    parameters: Option<Bound<'_, PyAny>>,
) -> PyResult<PyTimeseries> {
    let filter =
        BandpassFilter::from_parameters(parameters_from_python::<FilterParameters>(parameters)?);
    let filtered = filter.bandpass(&series.0, &cutoff, sampling_rate, parse_kind(kind)?)?;
    Ok(PyTimeseries(filtered))
}

/// Fit `uptake ~ co2 + temperature` and return `{"beta", "gamma", "u_gamma"}`
#[pyfunction]
#[pyo3(signature = (uptake, co2, temperature, constants=None))]
pub fn fit_feedback<'py>(
    py: Python<'py>,
    uptake: &PyTimeseries,
    co2: &PyTimeseries,
    temperature: &PyTimeseries,
    constants: Option<Bound<'py, PyAny>>,
) -> PyResult<Bound<'py, PyDict>> {
    let regressor =
        FeedbackRegressor::from_parameters(parameters_from_python::<FeedbackConstants>(constants)?);
    let parameters = regressor.fit_feedback(&uptake.0, &co2.0, &temperature.0)?;
    feedback_to_python(py, &parameters)
}

#[pyfunction]
#[pyo3(signature = (parameters, emission_rate=2.0))]
pub fn airborne_fraction(
    parameters: Bound<'_, PyAny>,
    emission_rate: FloatValue,
) -> PyResult<FloatValue> {
    Ok(feedback::airborne_fraction(
        &feedback_from_python(&parameters)?,
        emission_rate,
    )?)
}

#[pyfunction]
#[pyo3(signature = (parameters, emission_rate=2.0))]
pub fn landborne_fraction(
    parameters: Bound<'_, PyAny>,
    emission_rate: FloatValue,
) -> PyResult<FloatValue> {
    Ok(feedback::landborne_fraction(
        &feedback_from_python(&parameters)?,
        emission_rate,
    )?)
}

#[pyfunction]
#[pyo3(signature = (parameters, emission_rate=2.0))]
pub fn oceanborne_fraction(
    parameters: Bound<'_, PyAny>,
    emission_rate: FloatValue,
) -> PyResult<FloatValue> {
    Ok(feedback::oceanborne_fraction(
        &feedback_from_python(&parameters)?,
        emission_rate,
    )?)
}

#[pymodule]
pub fn analysis(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(cascading_window_trend, m)?)?;
    m.add_function(wrap_pyfunction!(deseasonalise, m)?)?;
    m.add_function(wrap_pyfunction!(rolling_mean, m)?)?;
    m.add_function(wrap_pyfunction!(power_spectral_density, m)?)?;
    m.add_function(wrap_pyfunction!(bandpass, m)?)?;
    m.add_function(wrap_pyfunction!(fit_feedback, m)?)?;
    m.add_function(wrap_pyfunction!(airborne_fraction, m)?)?;
    m.add_function(wrap_pyfunction!(landborne_fraction, m)?)?;
    m.add_function(wrap_pyfunction!(oceanborne_fraction, m)?)?;
    Ok(())
}
