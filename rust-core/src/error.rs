//! Error types for the streaming pipeline
//!
//! Centralized error handling using thiserror.

use crate::audio::device::DeviceError;
use thiserror::Error;

/// Main error type for pipeline stages and their building blocks
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Frame of {len} samples cannot be split across {channels} channels")]
    ChannelMismatch { len: usize, channels: usize },

    #[error("Unsupported sample width: {0} bytes (expected 1, 2 or 4)")]
    UnsupportedSampleWidth(u16),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("FFT error: {0}")]
    Transform(String),

    #[error("Container error: {0}")]
    Container(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stage '{stage}' failed: {reason}")]
    StageFailed { stage: String, reason: String },

    #[error("Stage '{0}' panicked")]
    StagePanicked(String),

    #[error("Stage '{0}' was already started")]
    AlreadyStarted(String),
}

/// Result type alias for the pipeline
pub type Result<T> = std::result::Result<T, PipelineError>;
