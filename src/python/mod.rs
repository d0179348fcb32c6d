use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::wrap_pymodule;
use sinkflux_analysis::python::analysis;
use sinkflux_core::python::core;
use std::ffi::CString;

#[pymodule]
#[pyo3(name = "_lib")]
fn sinkflux(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_wrapped(wrap_pymodule!(core))?;
    m.add_wrapped(wrap_pymodule!(analysis))?;

    set_path(m, "sinkflux._lib.core", "core")?;
    set_path(m, "sinkflux._lib.analysis", "analysis")?;

    Ok(())
}

/// Register a submodule in `sys.modules` so `import sinkflux._lib.core` works
fn set_path(m: &Bound<'_, PyModule>, path: &str, module: &str) -> PyResult<()> {
    let code = CString::new(format!(
        "\
import sys
sys.modules['{path}'] = {module}
    "
    ))
    .map_err(|e| PyValueError::new_err(e.to_string()))?;
    m.py().run(code.as_c_str(), None, Some(&m.dict()))
}
