//! Spectral analysis with FFT

pub mod analyzer;
pub mod fft;
pub mod windows;

pub use analyzer::{AnalyzerStage, SpectralAnalyzer};
pub use fft::{ComplexFftEngine, RealFftEngine};
pub use windows::{generate_window, WindowType};
