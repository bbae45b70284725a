//! Sliding-window spectral analyzer
//!
//! Incoming interleaved frames are split per channel and appended to
//! fixed-capacity [`ChannelBuffer`]s. Once `blocksize * channels` samples have
//! arrived since the last pass, every channel is transformed and the
//! re-interleaved spectra are returned.
//!
//! The arrival counter is zeroed after each pass, not reduced by the
//! threshold. Samples past the threshold in the triggering frame do not count
//! toward the next pass.

use crate::audio::buffer::ChannelBuffer;
use crate::config::{AnalysisMode, AnalyzerSettings};
use crate::error::Result;
use crate::pipeline::broadcast::{Broadcast, Inbox};
use crate::pipeline::codec::ChannelCodec;
use crate::pipeline::worker::{Flow, Stage};
use crate::pipeline::{SampleFrame, SpectralFrame};
use crate::spectrum::fft::{ComplexFftEngine, RealFftEngine};
use crate::spectrum::windows::generate_window;
use crossbeam_channel::Sender;
use num_complex::Complex64;
use std::sync::Arc;
use std::time::Duration;

enum Transform {
    /// Centered complex FFT over the whole buffer
    Simple(ComplexFftEngine),
    /// Real FFT over the zero-padded, windowed sub-block
    Windowed(RealFftEngine),
}

/// Per-channel sliding-window FFT state machine
pub struct SpectralAnalyzer {
    settings: AnalyzerSettings,
    codec: ChannelCodec,
    buffers: Vec<ChannelBuffer>,
    accumulated: usize,
    window: Vec<f64>,
    /// Extracted sub-window, reused across passes
    block: Vec<f64>,
    /// `2 * blocksize` transform input; the upper half stays zero
    padded: Vec<f64>,
    transform: Transform,
}

impl SpectralAnalyzer {
    pub fn new(settings: AnalyzerSettings, channels: usize) -> Result<Self> {
        settings.validate()?;
        let codec = ChannelCodec::new(channels)?;

        let blocksize = settings.blocksize;
        let (capacity, transform, padded) = match settings.mode {
            AnalysisMode::Simple => (
                blocksize,
                Transform::Simple(ComplexFftEngine::new(blocksize)),
                Vec::new(),
            ),
            AnalysisMode::Windowed => (
                blocksize + settings.overlap,
                Transform::Windowed(RealFftEngine::new(2 * blocksize)),
                vec![0.0; 2 * blocksize],
            ),
        };

        Ok(Self {
            buffers: (0..channels).map(|_| ChannelBuffer::new(capacity)).collect(),
            accumulated: 0,
            window: generate_window(settings.window, blocksize),
            block: vec![0.0; blocksize],
            padded,
            transform,
            codec,
            settings,
        })
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    pub fn channels(&self) -> usize {
        self.codec.channels()
    }

    /// Samples received since the last analysis pass
    pub fn accumulated(&self) -> usize {
        self.accumulated
    }

    /// Interleaved sample count that triggers a pass
    pub fn threshold(&self) -> usize {
        self.settings.blocksize * self.codec.channels()
    }

    pub fn buffer(&self, channel: usize) -> Option<&ChannelBuffer> {
        self.buffers.get(channel)
    }

    /// Transform input of the most recent windowed pass
    ///
    /// Empty in simple mode.
    pub fn padded_input(&self) -> &[f64] {
        &self.padded
    }

    /// Feed one interleaved frame
    ///
    /// Returns the interleaved spectra (`blocksize` bins per channel) when the
    /// frame completes a block.
    pub fn push(&mut self, frame: &[f64]) -> Result<Option<Vec<Complex64>>> {
        let split = self.codec.split(frame)?;
        for (buffer, samples) in self.buffers.iter_mut().zip(&split) {
            buffer.extend(samples);
        }

        self.accumulated += frame.len();
        if self.accumulated < self.threshold() {
            return Ok(None);
        }

        let mut spectra = Vec::with_capacity(self.buffers.len());
        for channel in 0..self.buffers.len() {
            spectra.push(self.analyze_channel(channel)?);
        }
        self.accumulated = 0;

        self.codec.merge(&spectra).map(Some)
    }

    fn analyze_channel(&mut self, channel: usize) -> Result<Vec<Complex64>> {
        let blocksize = self.settings.blocksize;
        let buffer = &self.buffers[channel];

        match &mut self.transform {
            Transform::Simple(fft) => {
                buffer.copy_window(0, &mut self.block);
                Ok(fft.process_centered(&self.block).to_vec())
            }
            Transform::Windowed(fft) => {
                buffer.copy_window(self.settings.overlap / 2, &mut self.block);

                let (head, tail) = self.padded.split_at_mut(blocksize);
                for ((slot, &x), &w) in head.iter_mut().zip(&self.block).zip(&self.window) {
                    *slot = x * w;
                }
                tail.fill(0.0);

                let spectrum = fft.process(&self.padded)?;
                Ok(spectrum[..blocksize].to_vec())
            }
        }
    }

    /// Center frequency of output bin `bin` for a given sample rate
    pub fn bin_frequency_hz(&self, bin: usize, sample_rate: u32) -> f64 {
        self.settings.bin_frequency_hz(bin, sample_rate)
    }
}

/// Pipeline stage that drains an inbox into a [`SpectralAnalyzer`]
pub struct AnalyzerStage {
    analyzer: SpectralAnalyzer,
    inbox: Inbox<SampleFrame>,
    output: Broadcast<SpectralFrame>,
    poll_interval: Duration,
}

impl AnalyzerStage {
    pub fn new(analyzer: SpectralAnalyzer, poll_interval: Duration) -> Self {
        Self {
            analyzer,
            inbox: Inbox::new(),
            output: Broadcast::new(),
            poll_interval,
        }
    }

    /// Intake to register with an upstream sample broadcast
    pub fn intake(&self) -> Sender<SampleFrame> {
        self.inbox.intake()
    }

    /// Broadcast carrying spectral frames
    pub fn output(&self) -> Broadcast<SpectralFrame> {
        self.output.clone()
    }
}

impl Stage for AnalyzerStage {
    fn name(&self) -> &str {
        "spectral-analyzer"
    }

    fn step(&mut self) -> Result<Flow> {
        let Some(frame) = self.inbox.poll(self.poll_interval) else {
            return Ok(Flow::Continue);
        };

        if let Some(spectra) = self.analyzer.push(&frame)? {
            self.output.publish(Arc::from(spectra));
        }
        Ok(Flow::Continue)
    }
}
