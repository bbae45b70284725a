//! Finite frame sources
//!
//! Both sources broadcast fixed-size chunks of interleaved samples and finish
//! on their own once the input is exhausted.

use crate::audio::format::{PcmFormat, SampleWidth};
use crate::audio::wav::WavReader;
use crate::error::{PipelineError, Result};
use crate::pipeline::broadcast::Broadcast;
use crate::pipeline::worker::{Flow, Stage};
use crate::pipeline::SampleFrame;
use std::path::Path;
use std::sync::Arc;

/// Broadcasts an in-memory sample block chunk by chunk
pub struct BlockSource {
    samples: Vec<f64>,
    chunk_size: usize,
    position: usize,
    output: Broadcast<SampleFrame>,
}

impl BlockSource {
    /// `chunk_size` counts interleaved samples, not frames
    pub fn new(samples: Vec<f64>, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(PipelineError::Config("chunk size must be > 0".to_string()));
        }
        Ok(Self {
            samples,
            chunk_size,
            position: 0,
            output: Broadcast::new(),
        })
    }

    /// Decode a raw little-endian PCM block
    pub fn from_pcm_bytes(raw: &[u8], width: SampleWidth, chunk_size: usize) -> Result<Self> {
        Self::new(width.decode(raw)?, chunk_size)
    }

    pub fn output(&self) -> Broadcast<SampleFrame> {
        self.output.clone()
    }

    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl Stage for BlockSource {
    fn name(&self) -> &str {
        "block-source"
    }

    fn step(&mut self) -> Result<Flow> {
        if self.position >= self.samples.len() {
            return Ok(Flow::Finished);
        }

        let end = (self.position + self.chunk_size).min(self.samples.len());
        let chunk: SampleFrame = Arc::from(&self.samples[self.position..end]);
        self.position = end;
        self.output.publish(chunk);
        Ok(Flow::Continue)
    }
}

/// Broadcasts a PCM container chunk by chunk
pub struct FileSource {
    reader: WavReader,
    chunk_frames: usize,
    output: Broadcast<SampleFrame>,
}

impl FileSource {
    /// Open the container; failures surface here, before any stage runs
    pub fn open(path: &Path, chunk_frames: usize) -> Result<Self> {
        if chunk_frames == 0 {
            return Err(PipelineError::Config("chunk_frames must be > 0".to_string()));
        }
        Ok(Self {
            reader: WavReader::open(path)?,
            chunk_frames,
            output: Broadcast::new(),
        })
    }

    pub fn format(&self) -> PcmFormat {
        self.reader.format()
    }

    pub fn output(&self) -> Broadcast<SampleFrame> {
        self.output.clone()
    }
}

impl Stage for FileSource {
    fn name(&self) -> &str {
        "file-source"
    }

    fn step(&mut self) -> Result<Flow> {
        match self.reader.read_chunk(self.chunk_frames)? {
            Some(chunk) => {
                self.output.publish(Arc::from(chunk));
                Ok(Flow::Continue)
            }
            None => Ok(Flow::Finished),
        }
    }
}
