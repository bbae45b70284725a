//! Python bindings for audio device discovery

use crate::audio::device::{list_devices, AudioDeviceInfo, Direction};
use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;

/// Audio device information exposed to Python
#[pyclass(name = "AudioDeviceInfo")]
#[derive(Clone)]
pub struct PyAudioDeviceInfo {
    #[pyo3(get)]
    pub name: String,
    #[pyo3(get)]
    pub sample_rate: u32,
    #[pyo3(get)]
    pub channels: u16,
}

impl From<AudioDeviceInfo> for PyAudioDeviceInfo {
    fn from(info: AudioDeviceInfo) -> Self {
        Self {
            name: info.name,
            sample_rate: info.sample_rate,
            channels: info.channels,
        }
    }
}

fn devices(direction: Direction) -> PyResult<Vec<PyAudioDeviceInfo>> {
    list_devices(direction)
        .map(|devices| devices.into_iter().map(Into::into).collect())
        .map_err(|e| PyRuntimeError::new_err(e.to_string()))
}

/// List available input devices
#[pyfunction]
pub fn list_input_devices() -> PyResult<Vec<PyAudioDeviceInfo>> {
    devices(Direction::Capture)
}

/// List available output devices
#[pyfunction]
pub fn list_output_devices() -> PyResult<Vec<PyAudioDeviceInfo>> {
    devices(Direction::Playback)
}
