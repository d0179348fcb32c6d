//! Python bindings for the aggregation engine
//!
//! Arrays cross the boundary as numpy arrays and time keys as `(year, month)`
//! tuples, with `month = None` for yearly keys. Parameter structs are passed
//! as dictionaries; missing entries take their default values.

use crate::aggregate::{AggregationParameters, GriddedField, SinkVariables, SpatialAggregator};
use crate::ensemble;
use crate::errors::SinkfluxError;
use crate::grid::{GridGeometry, GridParameters};
use crate::resample::{Granularity, ResampleParameters, TemporalResampler};
use crate::spatial::{Region, Sink};
use crate::timeseries::{FloatValue, TimeKey};
use numpy::{PyArray2, PyReadonlyArray1, PyReadonlyArray3, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::{pymodule, Bound, PyResult};
use serde::de::DeserializeOwned;

pub mod regional;
pub mod timeseries;

pub use regional::PyRegionalSeries;
pub use timeseries::PyTimeseries;

pub type PyTimeKey = (i32, Option<u32>);

impl From<SinkfluxError> for PyErr {
    fn from(err: SinkfluxError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

pub fn key_from_python(key: PyTimeKey) -> PyResult<TimeKey> {
    match key {
        (year, Some(month)) => Ok(TimeKey::month(year, month)?),
        (year, None) => Ok(TimeKey::Year(year)),
    }
}

pub fn key_to_python(key: TimeKey) -> PyTimeKey {
    (key.year(), key.calendar_month())
}

pub fn parse_sink(name: &str) -> PyResult<Sink> {
    match name.to_lowercase().as_str() {
        "land" => Ok(Sink::Land),
        "ocean" => Ok(Sink::Ocean),
        _ => Err(PyValueError::new_err(format!("Unknown sink: {}", name))),
    }
}

pub fn parse_region(name: &str) -> PyResult<Region> {
    match name.to_lowercase().as_str() {
        "earth" => Ok(Region::Earth),
        "south" => Ok(Region::South),
        "tropical" => Ok(Region::Tropical),
        "north" => Ok(Region::North),
        _ => Err(PyValueError::new_err(format!("Unknown region: {}", name))),
    }
}

/// Deserialize a parameter struct from an optional dictionary
pub fn parameters_from_python<T: DeserializeOwned + Default>(
    parameters: Option<Bound<'_, PyAny>>,
) -> PyResult<T> {
    match parameters {
        Some(parameters) => pythonize::depythonize::<T>(&parameters)
            .map_err(|e| PyValueError::new_err(format!("{}", e))),
        None => Ok(T::default()),
    }
}

/// Area of a single lat/lon box in square metres
#[pyfunction]
#[pyo3(signature = (min_lat, max_lat, min_lon, max_lon, parameters=None))]
pub fn cell_area(
    min_lat: FloatValue,
    max_lat: FloatValue,
    min_lon: FloatValue,
    max_lon: FloatValue,
    parameters: Option<Bound<'_, PyAny>>,
) -> PyResult<FloatValue> {
    let geometry = GridGeometry::from_parameters(parameters_from_python::<GridParameters>(parameters)?);
    Ok(geometry.cell_area(min_lat, max_lat, min_lon, max_lon))
}

/// Cell areas of a grid given its cell-centre coordinates
#[pyfunction]
#[pyo3(signature = (latitudes, longitudes, parameters=None))]
pub fn grid_areas<'py>(
    py: Python<'py>,
    latitudes: PyReadonlyArray1<'py, FloatValue>,
    longitudes: PyReadonlyArray1<'py, FloatValue>,
    parameters: Option<Bound<'py, PyAny>>,
) -> PyResult<Bound<'py, PyArray2<FloatValue>>> {
    let geometry = GridGeometry::from_parameters(parameters_from_python::<GridParameters>(parameters)?);
    let latitudes = latitudes.as_array().to_vec();
    let longitudes = longitudes.as_array().to_vec();
    let cells = geometry.grid_areas(&latitudes, &longitudes)?;
    Ok(cells.areas().to_pyarray(py))
}

/// Integrate gridded land and/or ocean fluxes into regional totals
///
/// Cell areas are computed from the coordinates, so both axes need at least
/// two points.
#[pyfunction]
#[pyo3(signature = (time, latitudes, longitudes, land=None, ocean=None, start=None, end=None, parameters=None, grid_parameters=None))]
#[allow(clippy::too_many_arguments)]
pub fn integrate_regional<'py>(
    time: Vec<PyTimeKey>,
    latitudes: PyReadonlyArray1<'py, FloatValue>,
    longitudes: PyReadonlyArray1<'py, FloatValue>,
    land: Option<PyReadonlyArray3<'py, FloatValue>>,
    ocean: Option<PyReadonlyArray3<'py, FloatValue>>,
    start: Option<PyTimeKey>,
    end: Option<PyTimeKey>,
    parameters: Option<Bound<'py, PyAny>>,
    grid_parameters: Option<Bound<'py, PyAny>>,
) -> PyResult<PyRegionalSeries> {
    let time = time
        .into_iter()
        .map(key_from_python)
        .collect::<PyResult<Vec<_>>>()?;
    let latitudes = latitudes.as_array().to_vec();
    let longitudes = longitudes.as_array().to_vec();

    let geometry =
        GridGeometry::from_parameters(parameters_from_python::<GridParameters>(grid_parameters)?);
    let areas = geometry.grid_areas(&latitudes, &longitudes)?;

    let mut field = GriddedField::new(time, latitudes, longitudes)?;
    let variables = match (land, ocean) {
        (Some(land), Some(ocean)) => {
            field = field
                .with_variable("land", land.as_array().to_owned())?
                .with_variable("ocean", ocean.as_array().to_owned())?;
            SinkVariables::land_and_ocean("land", "ocean")
        }
        (Some(land), None) => {
            field = field.with_variable("land", land.as_array().to_owned())?;
            SinkVariables::land_only("land")
        }
        (None, Some(ocean)) => {
            field = field.with_variable("ocean", ocean.as_array().to_owned())?;
            SinkVariables::ocean_only("ocean")
        }
        (None, None) => {
            return Err(PyValueError::new_err(
                "at least one of land or ocean fluxes is required",
            ))
        }
    };

    let range = match (start, end) {
        (Some(start), Some(end)) => Some((key_from_python(start)?, key_from_python(end)?)),
        (None, None) => None,
        _ => {
            return Err(PyValueError::new_err(
                "start and end must be given together",
            ))
        }
    };

    let aggregator =
        SpatialAggregator::from_parameters(parameters_from_python::<AggregationParameters>(parameters)?);
    let series = aggregator.integrate_regional(&field, &areas, &variables, range)?;
    Ok(PyRegionalSeries(series))
}

/// Sum a regional series into "year", "decade" or "whole" buckets
#[pyfunction]
#[pyo3(signature = (series, granularity, parameters=None))]
pub fn resample(
    series: &PyRegionalSeries,
    granularity: &str,
    parameters: Option<Bound<'_, PyAny>>,
) -> PyResult<PyRegionalSeries> {
    let granularity = match granularity.to_lowercase().as_str() {
        "year" => Granularity::Year,
        "decade" => Granularity::Decade,
        "whole" => Granularity::Whole,
        other => {
            return Err(PyValueError::new_err(format!(
                "Unknown granularity: {}",
                other
            )))
        }
    };
    let resampler = TemporalResampler::new(parameters_from_python::<ResampleParameters>(parameters)?);
    Ok(PyRegionalSeries(resampler.resample(&series.0, granularity)?))
}

/// Ensemble mean and population standard deviation of several models
#[pyfunction]
pub fn ensemble_statistics(
    members: Vec<PyRegionalSeries>,
) -> PyResult<(PyRegionalSeries, PyRegionalSeries)> {
    let members: Vec<_> = members.into_iter().map(|member| member.0).collect();
    let statistics = ensemble::ensemble_statistics(&members)?;
    Ok((
        PyRegionalSeries(statistics.mean),
        PyRegionalSeries(statistics.std),
    ))
}

#[pymodule]
pub fn core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyRegionalSeries>()?;
    m.add_class::<PyTimeseries>()?;
    m.add_function(wrap_pyfunction!(cell_area, m)?)?;
    m.add_function(wrap_pyfunction!(grid_areas, m)?)?;
    m.add_function(wrap_pyfunction!(integrate_regional, m)?)?;
    m.add_function(wrap_pyfunction!(resample, m)?)?;
    m.add_function(wrap_pyfunction!(ensemble_statistics, m)?)?;
    Ok(())
}
