//! Python wrapper for regional series

use crate::python::{key_to_python, parse_region, parse_sink, PyTimeKey, PyTimeseries};
use crate::regional::RegionalSeries;
use crate::timeseries::{FloatValue, TimeIndexed};
use numpy::{PyArray1, PyArray2, ToPyArray};
use pyo3::prelude::*;

/// Global and latitude-banded totals per sink
///
/// Columns of `totals(sink)` are ordered Earth, South, Tropical, North.
#[pyclass(name = "RegionalSeries", module = "sinkflux.core")]
#[derive(Debug, Clone)]
pub struct PyRegionalSeries(pub RegionalSeries);

#[pymethods]
impl PyRegionalSeries {
    /// Time keys as `(year, month)` tuples; `month` is None for yearly keys
    fn time(&self) -> Vec<PyTimeKey> {
        self.0.time().iter().map(|key| key_to_python(*key)).collect()
    }

    #[getter]
    fn resolution(&self) -> String {
        format!("{:?}", self.0.resolution())
    }

    /// "Total" or "AreaMean"
    #[getter]
    fn statistic(&self) -> String {
        format!("{:?}", self.0.statistic())
    }

    #[getter]
    fn threshold_latitude(&self) -> FloatValue {
        self.0.threshold_latitude()
    }

    fn sinks(&self) -> Vec<String> {
        self.0.sinks().map(|sink| sink.name().to_string()).collect()
    }

    /// The `(n, 4)` array of totals for `sink` ("land" or "ocean")
    fn totals<'py>(&self, py: Python<'py>, sink: &str) -> PyResult<Bound<'py, PyArray2<FloatValue>>> {
        let sink = parse_sink(sink)?;
        Ok(self.0.totals(sink)?.to_pyarray(py))
    }

    /// Totals of a single region, e.g. `column("tropical", "land")`
    fn column<'py>(
        &self,
        py: Python<'py>,
        region: &str,
        sink: &str,
    ) -> PyResult<Bound<'py, PyArray1<FloatValue>>> {
        let values = self.0.region(parse_region(region)?, parse_sink(sink)?)?;
        Ok(values.to_pyarray(py))
    }

    /// A single region as a named `Timeseries`
    fn series(&self, region: &str, sink: &str) -> PyResult<PyTimeseries> {
        Ok(PyTimeseries(
            self.0.column(parse_region(region)?, parse_sink(sink)?)?,
        ))
    }

    fn check_partition(&self, tolerance: FloatValue) -> PyResult<()> {
        Ok(self.0.check_partition(tolerance)?)
    }

    fn __len__(&self) -> usize {
        self.0.len()
    }

    fn __repr__(&self) -> String {
        format!(
            "<RegionalSeries {:?} n={} threshold={}>",
            self.0.resolution(),
            self.0.len(),
            self.0.threshold_latitude()
        )
    }
}
