//! PCM container access over hound
//!
//! Only integer PCM of 1, 2 or 4 bytes per sample is supported. hound stores
//! 8-bit samples unsigned on disk but hands them out signed, so 8-bit values
//! are shifted by 128 on the way in and out to keep the unsigned scale.

use crate::audio::format::{PcmFormat, SampleWidth};
use crate::error::{PipelineError, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

const U8_OFFSET: i32 = 128;

/// Chunked reader for a PCM container
pub struct WavReader {
    reader: hound::WavReader<std::io::BufReader<File>>,
    format: PcmFormat,
}

impl WavReader {
    /// Open a container and read its header
    pub fn open(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        if spec.sample_format != hound::SampleFormat::Int {
            return Err(PipelineError::Config(format!(
                "{}: floating point containers are not supported",
                path.display()
            )));
        }
        if spec.bits_per_sample % 8 != 0 {
            return Err(PipelineError::UnsupportedSampleWidth(spec.bits_per_sample));
        }

        let width = SampleWidth::from_bytes(spec.bits_per_sample / 8)?;
        let format = PcmFormat::new(spec.sample_rate, spec.channels, width)?;

        log::info!(
            "Opened {}: {} Hz, {} channel(s), {} bytes/sample",
            path.display(),
            format.sample_rate,
            format.channels,
            width.bytes()
        );

        Ok(Self { reader, format })
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Total frames in the container
    pub fn duration_frames(&self) -> u32 {
        self.reader.duration()
    }

    /// Read up to `frames` interleaved frames; `None` at end of stream
    pub fn read_chunk(&mut self, frames: usize) -> Result<Option<Vec<f64>>> {
        let wanted = self.format.samples_for(frames);
        let width = self.format.width;

        let mut chunk = Vec::with_capacity(wanted);
        for sample in self.reader.samples::<i32>().take(wanted) {
            let raw = sample?;
            chunk.push(match width {
                SampleWidth::U8 => (raw + U8_OFFSET) as f64,
                SampleWidth::I16 | SampleWidth::I32 => raw as f64,
            });
        }

        if chunk.is_empty() {
            Ok(None)
        } else {
            Ok(Some(chunk))
        }
    }
}

/// Accumulates captured samples and writes them as a container on finish
///
/// The file is created up front so an unwritable path fails before capture
/// starts.
pub struct WavRecorder {
    path: PathBuf,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    width: SampleWidth,
    pending: Vec<f64>,
}

impl WavRecorder {
    pub fn create(path: &Path, format: PcmFormat) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: format.width.bits(),
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            width: format.width,
            pending: Vec::new(),
        })
    }

    pub fn push(&mut self, samples: &[f64]) {
        self.pending.extend_from_slice(samples);
    }

    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    /// Write everything accumulated so far and close the file
    ///
    /// Returns the number of samples written; a second call writes nothing.
    pub fn finish(&mut self) -> Result<usize> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(0);
        };

        for &value in &self.pending {
            let value = self.width.quantize(value);
            match self.width {
                SampleWidth::U8 => writer.write_sample((value as i32 - U8_OFFSET) as i8)?,
                SampleWidth::I16 => writer.write_sample(value as i16)?,
                SampleWidth::I32 => writer.write_sample(value as i32)?,
            }
        }
        writer.finalize()?;

        let written = self.pending.len();
        self.pending.clear();
        log::info!("Recorded {} samples to {}", written, self.path.display());
        Ok(written)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Unique path under the system temp dir
    pub(crate) fn temp_wav(label: &str) -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "spectral-stream-{}-{}-{}.wav",
            label,
            std::process::id(),
            n
        ))
    }

    pub(crate) fn write_wav(path: &Path, format: PcmFormat, samples: &[f64]) {
        let mut recorder = WavRecorder::create(path, format).unwrap();
        recorder.push(samples);
        recorder.finish().unwrap();
    }

    #[test]
    fn test_header_and_chunks() {
        let path = temp_wav("header");
        let format = PcmFormat::new(22050, 2, SampleWidth::I16).unwrap();
        let samples: Vec<f64> = (0..10).map(|n| (n * 100 - 300) as f64).collect();
        write_wav(&path, format, &samples);

        let mut reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.format(), format);
        assert_eq!(reader.duration_frames(), 5);

        assert_eq!(reader.read_chunk(2).unwrap().unwrap(), samples[0..4].to_vec());
        assert_eq!(reader.read_chunk(2).unwrap().unwrap(), samples[4..8].to_vec());
        assert_eq!(reader.read_chunk(2).unwrap().unwrap(), samples[8..10].to_vec());
        assert!(reader.read_chunk(2).unwrap().is_none());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_unsigned_8bit_keeps_scale() {
        let path = temp_wav("u8");
        let format = PcmFormat::new(11025, 1, SampleWidth::U8).unwrap();
        write_wav(&path, format, &[0.0, 128.0, 255.0, 300.0]);

        let mut reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.format().width, SampleWidth::U8);
        assert_eq!(reader.read_chunk(8).unwrap().unwrap(), vec![0.0, 128.0, 255.0, 255.0]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_finish_twice_writes_once() {
        let path = temp_wav("twice");
        let format = PcmFormat::new(8000, 1, SampleWidth::I32).unwrap();
        let mut recorder = WavRecorder::create(&path, format).unwrap();
        recorder.push(&[1.0, -2.0, 3.0]);
        assert_eq!(recorder.pending_samples(), 3);

        assert_eq!(recorder.finish().unwrap(), 3);
        assert_eq!(recorder.finish().unwrap(), 0);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_container_error() {
        let result = WavReader::open(Path::new("/nonexistent/spectral-stream.wav"));
        assert!(matches!(result, Err(PipelineError::Container(_))));
    }
}
