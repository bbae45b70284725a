//! Python bindings for the spectral analyzer

use super::to_py_err;
use crate::config::{AnalysisMode, AnalyzerSettings};
use crate::spectrum::{SpectralAnalyzer, WindowType};
use num_complex::Complex64;
use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

/// Window type enum exposed to Python
#[pyclass(name = "WindowType")]
#[derive(Clone)]
pub enum PyWindowType {
    Hann,
    Hamming,
    Blackman,
    Rectangular,
}

impl From<PyWindowType> for WindowType {
    fn from(py_win: PyWindowType) -> Self {
        match py_win {
            PyWindowType::Hann => WindowType::Hann,
            PyWindowType::Hamming => WindowType::Hamming,
            PyWindowType::Blackman => WindowType::Blackman,
            PyWindowType::Rectangular => WindowType::Rectangular,
        }
    }
}

/// Sliding-window spectral analyzer exposed to Python
#[pyclass(name = "SpectralAnalyzer")]
pub struct PySpectralAnalyzer {
    analyzer: SpectralAnalyzer,
}

#[pymethods]
impl PySpectralAnalyzer {
    /// Create a new analyzer
    ///
    /// Args:
    ///     blocksize: Samples per channel in one analysis pass
    ///     channels: Interleaved channel count
    ///     overlap: Retained context samples (windowed mode only)
    ///     window_type: Window applied in windowed mode
    ///     windowed: Use the windowed, zero-padded real FFT pass
    #[new]
    #[pyo3(signature = (blocksize=4096, channels=1, overlap=0, window_type=PyWindowType::Rectangular, windowed=false))]
    fn new(
        blocksize: usize,
        channels: usize,
        overlap: usize,
        window_type: PyWindowType,
        windowed: bool,
    ) -> PyResult<Self> {
        let settings = AnalyzerSettings {
            blocksize,
            overlap,
            window: window_type.into(),
            mode: if windowed {
                AnalysisMode::Windowed
            } else {
                AnalysisMode::Simple
            },
        };

        Ok(Self {
            analyzer: SpectralAnalyzer::new(settings, channels).map_err(to_py_err)?,
        })
    }

    /// Feed one interleaved frame
    ///
    /// Returns:
    ///     Interleaved complex spectra when the frame completes a block, else None
    fn push<'py>(
        &mut self,
        py: Python<'py>,
        frame: PyReadonlyArray1<f64>,
    ) -> PyResult<Option<&'py PyArray1<Complex64>>> {
        let samples = frame
            .as_slice()
            .map_err(|e| PyValueError::new_err(e.to_string()))?;

        let spectra = self.analyzer.push(samples).map_err(to_py_err)?;
        Ok(spectra.map(|s| PyArray1::from_vec(py, s)))
    }

    /// Samples received since the last analysis pass
    fn accumulated(&self) -> usize {
        self.analyzer.accumulated()
    }

    /// Interleaved sample count that triggers a pass
    fn threshold(&self) -> usize {
        self.analyzer.threshold()
    }

    fn bin_frequency_hz(&self, bin: usize, sample_rate: u32) -> f64 {
        self.analyzer.bin_frequency_hz(bin, sample_rate)
    }
}
