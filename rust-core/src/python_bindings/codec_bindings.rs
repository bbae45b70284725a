//! Python bindings for channel (de)interleaving

use super::to_py_err;
use crate::pipeline::codec;
use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

/// Split an interleaved frame into per-channel arrays
#[pyfunction]
pub fn split_channels<'py>(
    py: Python<'py>,
    frame: PyReadonlyArray1<f64>,
    channels: usize,
) -> PyResult<Vec<&'py PyArray1<f64>>> {
    let samples = frame
        .as_slice()
        .map_err(|e| PyValueError::new_err(e.to_string()))?;

    let split = codec::split(samples, channels).map_err(to_py_err)?;
    Ok(split.into_iter().map(|s| PyArray1::from_vec(py, s)).collect())
}

/// Interleave equal-length per-channel arrays into one frame
#[pyfunction]
pub fn merge_channels<'py>(
    py: Python<'py>,
    sequences: Vec<PyReadonlyArray1<f64>>,
) -> PyResult<&'py PyArray1<f64>> {
    let sequences: Vec<Vec<f64>> = sequences
        .iter()
        .map(|s| s.as_array().to_vec())
        .collect();

    let merged = codec::merge(&sequences).map_err(to_py_err)?;
    Ok(PyArray1::from_vec(py, merged))
}
