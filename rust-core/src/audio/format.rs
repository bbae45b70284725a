//! PCM format description
//!
//! Samples travel through the pipeline as `f64` in the native integer scale
//! of their container width: unsigned 8-bit samples keep their 0..=255
//! values, signed widths keep their signed range.

use crate::error::{PipelineError, Result};

/// Byte width of one PCM sample and its numeric representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleWidth {
    /// 1 byte, unsigned 8-bit
    U8,
    /// 2 bytes, signed 16-bit
    I16,
    /// 4 bytes, signed 32-bit
    I32,
}

impl SampleWidth {
    /// Map a container's byte width to a sample representation
    pub fn from_bytes(bytes: u16) -> Result<Self> {
        match bytes {
            1 => Ok(SampleWidth::U8),
            2 => Ok(SampleWidth::I16),
            4 => Ok(SampleWidth::I32),
            other => Err(PipelineError::UnsupportedSampleWidth(other)),
        }
    }

    pub fn bytes(self) -> u16 {
        match self {
            SampleWidth::U8 => 1,
            SampleWidth::I16 => 2,
            SampleWidth::I32 => 4,
        }
    }

    pub fn bits(self) -> u16 {
        self.bytes() * 8
    }

    /// Decode little-endian raw PCM bytes
    pub fn decode(self, raw: &[u8]) -> Result<Vec<f64>> {
        let width = self.bytes() as usize;
        if raw.len() % width != 0 {
            return Err(PipelineError::Config(format!(
                "{} bytes is not a whole number of {}-byte samples",
                raw.len(),
                width
            )));
        }

        let samples = raw
            .chunks_exact(width)
            .map(|b| match self {
                SampleWidth::U8 => b[0] as f64,
                SampleWidth::I16 => i16::from_le_bytes([b[0], b[1]]) as f64,
                SampleWidth::I32 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            })
            .collect();
        Ok(samples)
    }

    /// Clamp and round a sample into this width's range
    pub fn quantize(self, value: f64) -> f64 {
        let (min, max) = self.range();
        value.round().clamp(min, max)
    }

    /// Smallest and largest representable sample value
    pub fn range(self) -> (f64, f64) {
        match self {
            SampleWidth::U8 => (u8::MIN as f64, u8::MAX as f64),
            SampleWidth::I16 => (i16::MIN as f64, i16::MAX as f64),
            SampleWidth::I32 => (i32::MIN as f64, i32::MAX as f64),
        }
    }
}

/// Sample rate, channel layout and sample width of a PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub width: SampleWidth,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, channels: u16, width: SampleWidth) -> Result<Self> {
        if sample_rate == 0 {
            return Err(PipelineError::Config("sample rate must be > 0".to_string()));
        }
        if channels == 0 {
            return Err(PipelineError::Config("channel count must be > 0".to_string()));
        }
        Ok(Self {
            sample_rate,
            channels,
            width,
        })
    }

    /// Interleaved sample count for `frames` frames
    pub fn samples_for(&self, frames: usize) -> usize {
        frames * self.channels as usize
    }
}
