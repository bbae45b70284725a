//! Configuration for pipeline stages
//!
//! Tuning constants live in nested modules; the deserializable
//! [`PipelineConfig`] carries everything a caller may override.

use crate::error::{PipelineError, Result};
use crate::spectrum::windows::WindowType;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Stage scheduling
pub mod worker {
    /// How long a stage waits on an empty intake before re-checking its stop flag
    pub const POLL_INTERVAL_MS: u64 = 10;
}

/// Spectral analysis defaults
pub mod analysis {
    /// Samples per channel in one analysis pass
    pub const DEFAULT_BLOCKSIZE: usize = 4096;

    /// Retained context for the windowed-overlap variant
    pub const DEFAULT_OVERLAP: usize = 1024;
}

/// Frame source defaults
pub mod source {
    /// Frames (samples per channel) read per chunk
    pub const DEFAULT_CHUNK_FRAMES: usize = 1024;
}

/// Device bridging
pub mod device {
    /// Seconds of audio the capture/playback ring can hold
    pub const RING_SECONDS: usize = 2;

    /// Maximum time a device read waits for a full chunk (milliseconds)
    pub const READ_TIMEOUT_MS: u64 = 50;
}

/// Which analysis pass the analyzer runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Complex FFT of the whole buffer, zero frequency centered
    Simple,
    /// Windowed sub-block, zero-padded to twice its length, real-input FFT
    Windowed,
}

/// Spectral analyzer settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    pub blocksize: usize,
    pub overlap: usize,
    pub window: WindowType,
    pub mode: AnalysisMode,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            blocksize: analysis::DEFAULT_BLOCKSIZE,
            overlap: 0,
            window: WindowType::Rectangular,
            mode: AnalysisMode::Simple,
        }
    }
}

impl AnalyzerSettings {
    /// Windowed-overlap preset with the default overlap
    pub fn windowed(blocksize: usize, window: WindowType) -> Self {
        Self {
            blocksize,
            overlap: analysis::DEFAULT_OVERLAP,
            window,
            mode: AnalysisMode::Windowed,
        }
    }

    /// Center frequency of output bin `bin` for a given sample rate
    ///
    /// Simple mode output is centered, so bin `blocksize / 2` is 0 Hz.
    /// Windowed mode bins are spaced by the doubled transform length.
    pub fn bin_frequency_hz(&self, bin: usize, sample_rate: u32) -> f64 {
        let blocksize = self.blocksize as f64;
        let rate = sample_rate as f64;
        match self.mode {
            AnalysisMode::Simple => (bin as f64 - (blocksize / 2.0).floor()) * rate / blocksize,
            AnalysisMode::Windowed => bin as f64 * rate / (2.0 * blocksize),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.blocksize == 0 {
            return Err(PipelineError::Config("blocksize must be > 0".to_string()));
        }
        if self.mode == AnalysisMode::Simple {
            if self.overlap != 0 {
                return Err(PipelineError::Config(format!(
                    "simple analysis takes no overlap, got {}",
                    self.overlap
                )));
            }
            if self.window != WindowType::Rectangular {
                return Err(PipelineError::Config(format!(
                    "simple analysis takes no window, got {:?}",
                    self.window
                )));
            }
        }
        Ok(())
    }
}

/// Frame source and stage scheduling settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Frames per chunk for file, block and device sources
    pub chunk_frames: usize,
    pub poll_interval_ms: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            chunk_frames: source::DEFAULT_CHUNK_FRAMES,
            poll_interval_ms: worker::POLL_INTERVAL_MS,
        }
    }
}

impl SourceSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_frames == 0 {
            return Err(PipelineError::Config("chunk_frames must be > 0".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(PipelineError::Config(
                "poll_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Whole-pipeline configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub analyzer: AnalyzerSettings,
    pub source: SourceSettings,
}

impl PipelineConfig {
    /// Parse a TOML document; omitted fields take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.analyzer.validate()?;
        self.source.validate()
    }
}
