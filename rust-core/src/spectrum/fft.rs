//! Forward FFT engines
//!
//! [`ComplexFftEngine`] transforms a real block through a full complex FFT.
//! [`RealFftEngine`] uses realfft and returns the one-sided spectrum.
//! Both keep their buffers between calls, so the analysis loop does not
//! allocate per pass.

use crate::error::{PipelineError, Result};
use num_complex::Complex64;
use realfft::{RealFftPlanner, RealToComplex};
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Full complex FFT of real input
pub struct ComplexFftEngine {
    fft_size: usize,
    fft: Arc<dyn Fft<f64>>,
    buffer: Vec<Complex64>,
    scratch: Vec<Complex64>,
}

impl ComplexFftEngine {
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch = vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            fft_size,
            fft,
            buffer: vec![Complex64::new(0.0, 0.0); fft_size],
            scratch,
        }
    }

    /// Transform `signal` (zero-padded or truncated to the FFT size)
    pub fn process(&mut self, signal: &[f64]) -> &[Complex64] {
        let copy_len = signal.len().min(self.fft_size);
        for (slot, &x) in self.buffer.iter_mut().zip(&signal[..copy_len]) {
            *slot = Complex64::new(x, 0.0);
        }
        self.buffer[copy_len..].fill(Complex64::new(0.0, 0.0));

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);
        &self.buffer
    }

    /// Transform, then swap halves so the zero-frequency bin sits at `n / 2`
    pub fn process_centered(&mut self, signal: &[f64]) -> &[Complex64] {
        self.process(signal);
        let half = self.fft_size / 2;
        self.buffer.rotate_right(half);
        &self.buffer
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
}

/// FFT engine for real-valued signals
pub struct RealFftEngine {
    fft_size: usize,
    r2c: Arc<dyn RealToComplex<f64>>,

    /// Reusable input buffer; realfft clobbers it during processing
    input_buffer: Vec<f64>,

    /// Reusable output buffer (one-sided complex spectrum)
    output_buffer: Vec<Complex64>,
}

impl RealFftEngine {
    pub fn new(fft_size: usize) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(fft_size);

        let input_buffer = r2c.make_input_vec();
        let output_buffer = r2c.make_output_vec();

        Self {
            fft_size,
            r2c,
            input_buffer,
            output_buffer,
        }
    }

    /// Transform `signal`, zero-padded to the FFT size
    ///
    /// Returns `fft_size / 2 + 1` bins.
    pub fn process(&mut self, signal: &[f64]) -> Result<&[Complex64]> {
        let copy_len = signal.len().min(self.fft_size);
        self.input_buffer[..copy_len].copy_from_slice(&signal[..copy_len]);
        self.input_buffer[copy_len..].fill(0.0);

        self.r2c
            .process(&mut self.input_buffer, &mut self.output_buffer)
            .map_err(|e| PipelineError::Transform(e.to_string()))?;

        Ok(&self.output_buffer)
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of frequency bins (fft_size/2 + 1 for real FFT)
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }
}

/// Naive DFT, used to cross-check the engines in tests
#[cfg(test)]
pub(crate) fn naive_dft(signal: &[f64]) -> Vec<Complex64> {
    use std::f64::consts::PI;

    let n = signal.len();
    (0..n)
        .map(|k| {
            signal
                .iter()
                .enumerate()
                .map(|(t, &x)| {
                    let angle = -2.0 * PI * (k * t) as f64 / n as f64;
                    Complex64::new(x * angle.cos(), x * angle.sin())
                })
                .sum()
        })
        .collect()
}
