//! PyO3 bindings for Python integration

use crate::error::PipelineError;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

mod audio_bindings;
mod codec_bindings;
mod spectrum_bindings;

pub(crate) fn to_py_err(err: PipelineError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Python module definition
#[pymodule]
fn spectral_stream(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<spectrum_bindings::PySpectralAnalyzer>()?;
    m.add_class::<spectrum_bindings::PyWindowType>()?;
    m.add_class::<audio_bindings::PyAudioDeviceInfo>()?;

    m.add_function(wrap_pyfunction!(codec_bindings::split_channels, m)?)?;
    m.add_function(wrap_pyfunction!(codec_bindings::merge_channels, m)?)?;
    m.add_function(wrap_pyfunction!(audio_bindings::list_input_devices, m)?)?;
    m.add_function(wrap_pyfunction!(audio_bindings::list_output_devices, m)?)?;

    Ok(())
}
