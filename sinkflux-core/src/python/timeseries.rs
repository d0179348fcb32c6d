use crate::python::{key_from_python, key_to_python, PyTimeKey};
use crate::timeseries::{FloatValue, TimeIndexed, Timeseries};
use numpy::{PyArray1, PyReadonlyArray1, ToPyArray};
use pyo3::prelude::*;

/// A named series of values indexed by `(year, month)` keys
#[pyclass(name = "Timeseries", module = "sinkflux.core")]
#[derive(Debug, Clone)]
pub struct PyTimeseries(pub Timeseries);

#[pymethods]
impl PyTimeseries {
    #[new]
    fn new(name: &str, time: Vec<PyTimeKey>, values: PyReadonlyArray1<'_, FloatValue>) -> PyResult<Self> {
        let time = time
            .into_iter()
            .map(key_from_python)
            .collect::<PyResult<Vec<_>>>()?;
        Ok(Self(Timeseries::new(
            name,
            time,
            values.as_array().to_owned(),
        )?))
    }

    #[getter]
    fn name(&self) -> String {
        self.0.name().to_string()
    }

    fn time(&self) -> Vec<PyTimeKey> {
        self.0.time().iter().map(|key| key_to_python(*key)).collect()
    }

    fn values<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<FloatValue>> {
        self.0.values().to_pyarray(py)
    }

    fn between(&self, start: PyTimeKey, end: PyTimeKey) -> PyResult<Self> {
        Ok(Self(
            self.0.between(key_from_python(start)?, key_from_python(end)?)?,
        ))
    }

    fn __len__(&self) -> usize {
        self.0.len()
    }

    fn __repr__(&self) -> String {
        format!(
            "<Timeseries '{}' {:?} n={}>",
            self.0.name(),
            self.0.resolution(),
            self.0.len()
        )
    }
}
