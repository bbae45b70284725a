//! Audio device streams using cpal
//!
//! The realtime cpal callback and the pipeline stage are bridged by a
//! [`DeviceRingBuffer`]. Only the ring end ([`DeviceStream`]) moves onto the
//! stage thread; the platform stream itself ([`DeviceGuard`]) stays with the
//! caller, since cpal streams are not `Send` on every platform.

use super::buffer::{DeviceRingBuffer, RingConsumer, RingLevel, RingProducer};
use super::format::{PcmFormat, SampleWidth};
use crate::config::device::{READ_TIMEOUT_MS, RING_SECONDS};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, SizedSample, Stream, StreamConfig};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No audio {0} device found")]
    NoDevice(Direction),

    #[error("Failed to get device name: {0}")]
    DeviceName(String),

    #[error("Failed to enumerate devices: {0}")]
    Enumerate(String),

    #[error("Failed to build stream: {0}")]
    BuildStream(String),

    #[error("Failed to play stream: {0}")]
    PlayStream(String),

    #[error("Device stream timed out writing {0} samples")]
    WriteTimeout(usize),

    #[error("A {0} stream does not support {1}")]
    Unsupported(Direction, &'static str),
}

/// Which way samples flow through a device stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Capture,
    Playback,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Capture => write!(f, "input"),
            Direction::Playback => write!(f, "output"),
        }
    }
}

/// Stage-side end of an open device stream
pub trait DeviceStream: Send {
    fn direction(&self) -> Direction;

    /// Read one chunk of `frames` interleaved frames
    ///
    /// Returns an empty vector if the device produced nothing within its read
    /// timeout, so the calling loop can re-check its stop flag.
    fn read(&mut self, frames: usize) -> Result<Vec<f64>, DeviceError>;

    /// Write interleaved samples
    fn write(&mut self, samples: &[f64]) -> Result<(), DeviceError>;

    fn close(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Caller-side handle that keeps the platform stream alive
pub trait DeviceGuard {
    fn pause(&self) -> Result<(), DeviceError>;

    /// Samples written but not yet handed to the platform output
    fn queued_samples(&self) -> usize {
        0
    }
}

/// Both halves of a freshly opened device
pub struct OpenedDevice {
    pub stream: Box<dyn DeviceStream>,
    pub guard: Box<dyn DeviceGuard>,
}

/// Opens device streams for a given format
pub trait DeviceBackend {
    fn open(&self, direction: Direction, format: PcmFormat) -> Result<OpenedDevice, DeviceError>;
}

/// Sample types a device stream can carry, one per [`SampleWidth`]
pub trait PcmSample: SizedSample + Send + 'static {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl PcmSample for u8 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        SampleWidth::U8.quantize(value) as u8
    }
}

impl PcmSample for i16 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        SampleWidth::I16.quantize(value) as i16
    }
}

impl PcmSample for i32 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        SampleWidth::I32.quantize(value) as i32
    }
}

/// Audio device information
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Ring-reading end of a capture stream
pub struct CaptureStream {
    consumer: RingConsumer,
    channels: usize,
    timeout: Duration,
}

impl DeviceStream for CaptureStream {
    fn direction(&self) -> Direction {
        Direction::Capture
    }

    fn read(&mut self, frames: usize) -> Result<Vec<f64>, DeviceError> {
        let mut chunk = vec![0.0; frames * self.channels];
        let n = self.consumer.read_exact_timeout(&mut chunk, self.timeout);
        chunk.truncate(n);
        Ok(chunk)
    }

    fn write(&mut self, _samples: &[f64]) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported(Direction::Capture, "write"))
    }
}

/// Ring-writing end of a playback stream
pub struct PlaybackStream {
    producer: RingProducer,
    timeout: Duration,
}

impl DeviceStream for PlaybackStream {
    fn direction(&self) -> Direction {
        Direction::Playback
    }

    fn read(&mut self, _frames: usize) -> Result<Vec<f64>, DeviceError> {
        Err(DeviceError::Unsupported(Direction::Playback, "read"))
    }

    fn write(&mut self, samples: &[f64]) -> Result<(), DeviceError> {
        let written = self.producer.write_all(samples, self.timeout);
        if written < samples.len() {
            return Err(DeviceError::WriteTimeout(samples.len() - written));
        }
        Ok(())
    }
}

/// Keeps a cpal stream alive on the caller's thread
pub struct CpalGuard {
    stream: Stream,
    info: AudioDeviceInfo,
    /// Set for playback only
    playback_level: Option<RingLevel>,
}

impl CpalGuard {
    pub fn device_info(&self) -> &AudioDeviceInfo {
        &self.info
    }
}

impl DeviceGuard for CpalGuard {
    fn pause(&self) -> Result<(), DeviceError> {
        self.stream
            .pause()
            .map_err(|e| DeviceError::PlayStream(e.to_string()))
    }

    fn queued_samples(&self) -> usize {
        self.playback_level.as_ref().map_or(0, RingLevel::get)
    }
}

/// Default-device backend over cpal
#[derive(Debug, Clone, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }

    fn default_device(direction: Direction) -> Result<Device, DeviceError> {
        let host = cpal::default_host();
        let device = match direction {
            Direction::Capture => host.default_input_device(),
            Direction::Playback => host.default_output_device(),
        };
        device.ok_or(DeviceError::NoDevice(direction))
    }
}

impl DeviceBackend for CpalBackend {
    fn open(&self, direction: Direction, format: PcmFormat) -> Result<OpenedDevice, DeviceError> {
        let device = Self::default_device(direction)?;
        let name = device
            .name()
            .map_err(|e| DeviceError::DeviceName(e.to_string()))?;

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let capacity = format.samples_for(format.sample_rate as usize * RING_SECONDS);
        let ring = DeviceRingBuffer::new(capacity);
        let level = ring.level();
        let (producer, consumer) = ring.split();
        let timeout = Duration::from_millis(READ_TIMEOUT_MS);

        let (stream, stage_end): (Stream, Box<dyn DeviceStream>) = match direction {
            Direction::Capture => {
                let stream = match format.width {
                    SampleWidth::U8 => build_capture::<u8>(&device, &config, producer)?,
                    SampleWidth::I16 => build_capture::<i16>(&device, &config, producer)?,
                    SampleWidth::I32 => build_capture::<i32>(&device, &config, producer)?,
                };
                let capture = CaptureStream {
                    consumer,
                    channels: format.channels as usize,
                    timeout,
                };
                (stream, Box::new(capture))
            }
            Direction::Playback => {
                let stream = match format.width {
                    SampleWidth::U8 => build_playback::<u8>(&device, &config, consumer)?,
                    SampleWidth::I16 => build_playback::<i16>(&device, &config, consumer)?,
                    SampleWidth::I32 => build_playback::<i32>(&device, &config, consumer)?,
                };
                // Playback drains at device rate; allow a full ring to empty
                let playback = PlaybackStream {
                    producer,
                    timeout: Duration::from_secs(RING_SECONDS as u64),
                };
                (stream, Box::new(playback))
            }
        };

        stream
            .play()
            .map_err(|e| DeviceError::PlayStream(e.to_string()))?;

        log::info!(
            "Opened {} device '{}': {} Hz, {} channel(s), {} bytes/sample",
            direction,
            name,
            format.sample_rate,
            format.channels,
            format.width.bytes()
        );

        let guard = CpalGuard {
            stream,
            info: AudioDeviceInfo {
                name,
                sample_rate: format.sample_rate,
                channels: format.channels,
            },
            playback_level: (direction == Direction::Playback).then_some(level),
        };

        Ok(OpenedDevice {
            stream: stage_end,
            guard: Box::new(guard),
        })
    }
}

fn build_capture<T: PcmSample>(
    device: &Device,
    config: &StreamConfig,
    mut producer: RingProducer,
) -> Result<Stream, DeviceError> {
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f64> = data.iter().map(|&s| s.to_f64()).collect();
                // Samples that do not fit are dropped; the stage is behind
                producer.write(&samples);
            },
            move |err| {
                log::warn!("Audio input error: {}", err);
            },
            None,
        )
        .map_err(|e| DeviceError::BuildStream(e.to_string()))
}

fn build_playback<T: PcmSample>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: RingConsumer,
) -> Result<Stream, DeviceError> {
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut samples = vec![0.0; data.len()];
                let read = consumer.read(&mut samples);

                for (out, &sample) in data.iter_mut().zip(&samples[..read]) {
                    *out = T::from_f64(sample);
                }
                // Underrun: pad with silence
                for out in data[read..].iter_mut() {
                    *out = T::EQUILIBRIUM;
                }
            },
            move |err| {
                log::warn!("Audio output error: {}", err);
            },
            None,
        )
        .map_err(|e| DeviceError::BuildStream(e.to_string()))
}

/// List available devices in one direction
pub fn list_devices(direction: Direction) -> Result<Vec<AudioDeviceInfo>, DeviceError> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let candidates: Vec<Device> = match direction {
        Direction::Capture => host.input_devices().map(|d| d.collect()),
        Direction::Playback => host.output_devices().map(|d| d.collect()),
    }
    .map_err(|e| DeviceError::Enumerate(e.to_string()))?;

    for device in candidates {
        let Ok(name) = device.name() else { continue };
        let config = match direction {
            Direction::Capture => device.default_input_config(),
            Direction::Playback => device.default_output_config(),
        };
        if let Ok(config) = config {
            devices.push(AudioDeviceInfo {
                name,
                sample_rate: config.sample_rate().0,
                channels: config.channels(),
            });
        }
    }

    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices() {
        // Just ensure it doesn't crash on hosts without audio hardware
        let _ = list_devices(Direction::Capture);
        let _ = list_devices(Direction::Playback);
    }

    #[test]
    fn test_sample_conversions_clamp() {
        assert_eq!(u8::from_f64(300.0), 255);
        assert_eq!(i16::from_f64(-40_000.0), i16::MIN);
        assert_eq!(i32::from_f64(12.4), 12);
        assert_eq!(200u8.to_f64(), 200.0);
    }

    #[test]
    fn test_capture_stream_reads_whole_chunks() {
        let (mut producer, consumer) = DeviceRingBuffer::new(64).split();
        let mut capture = CaptureStream {
            consumer,
            channels: 2,
            timeout: Duration::from_millis(5),
        };

        producer.write(&[1.0, 2.0, 3.0]);
        assert!(capture.read(2).unwrap().is_empty());

        producer.write(&[4.0]);
        assert_eq!(capture.read(2).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert!(capture.write(&[0.0]).is_err());
    }

    #[test]
    fn test_playback_stream_reports_stall() {
        let (producer, _consumer) = DeviceRingBuffer::new(4).split();
        let mut playback = PlaybackStream {
            producer,
            timeout: Duration::from_millis(5),
        };

        assert!(playback.write(&[1.0, 2.0]).is_ok());
        assert!(matches!(
            playback.write(&[0.0; 16]),
            Err(DeviceError::WriteTimeout(_))
        ));
        assert!(playback.read(1).is_err());
    }
}
