//! Spectral Stream - concurrent audio streaming and spectral analysis
//!
//! Frames flow from a source (memory block, PCM container or audio device)
//! through broadcasts into a sliding-window FFT analyzer, each stage on its
//! own cancellable worker thread. Optional Python bindings behind the
//! `python` feature.

// Suppress PyO3 non-local impl warnings (harmless macro-generated code)
#![allow(non_local_definitions)]

pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod spectrum;

#[cfg(feature = "python")]
pub mod python_bindings;

pub use config::{AnalysisMode, AnalyzerSettings, PipelineConfig};
pub use error::{PipelineError, Result};
pub use pipeline::{AudioManager, Broadcast, ChannelCodec, Intake, SampleFrame, SpectralFrame};
pub use spectrum::{SpectralAnalyzer, WindowType};
