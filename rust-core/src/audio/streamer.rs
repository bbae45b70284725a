//! Device streamer stage
//!
//! Capture reads chunks from an input device and broadcasts them, optionally
//! keeping them for a container write on stop. Playback drains its inbox into
//! an output device and re-broadcasts each written chunk.

use crate::audio::device::{DeviceStream, Direction};
use crate::audio::wav::WavRecorder;
use crate::error::{PipelineError, Result};
use crate::pipeline::broadcast::{Broadcast, Inbox};
use crate::pipeline::worker::{Flow, Stage};
use crate::pipeline::SampleFrame;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::time::Duration;

enum Mode {
    Capture {
        chunk_frames: usize,
        recorder: Option<WavRecorder>,
    },
    Playback {
        inbox: Inbox<SampleFrame>,
        poll_interval: Duration,
    },
}

/// Moves chunks between a device stream and the pipeline
pub struct DeviceStreamer {
    device: Box<dyn DeviceStream>,
    mode: Mode,
    output: Broadcast<SampleFrame>,
}

impl DeviceStreamer {
    pub fn capture(
        device: Box<dyn DeviceStream>,
        chunk_frames: usize,
        recorder: Option<WavRecorder>,
    ) -> Result<Self> {
        if device.direction() != Direction::Capture {
            return Err(PipelineError::Config(
                "capture streamer needs an input device".to_string(),
            ));
        }
        if chunk_frames == 0 {
            return Err(PipelineError::Config("chunk_frames must be > 0".to_string()));
        }
        Ok(Self {
            device,
            mode: Mode::Capture {
                chunk_frames,
                recorder,
            },
            output: Broadcast::new(),
        })
    }

    pub fn playback(device: Box<dyn DeviceStream>, poll_interval: Duration) -> Result<Self> {
        if device.direction() != Direction::Playback {
            return Err(PipelineError::Config(
                "playback streamer needs an output device".to_string(),
            ));
        }
        Ok(Self {
            device,
            mode: Mode::Playback {
                inbox: Inbox::new(),
                poll_interval,
            },
            output: Broadcast::new(),
        })
    }

    pub fn direction(&self) -> Direction {
        self.device.direction()
    }

    /// Intake for frames to play; `None` for a capture streamer
    pub fn intake(&self) -> Option<Sender<SampleFrame>> {
        match &self.mode {
            Mode::Playback { inbox, .. } => Some(inbox.intake()),
            Mode::Capture { .. } => None,
        }
    }

    /// Broadcast of captured or played chunks
    pub fn output(&self) -> Broadcast<SampleFrame> {
        self.output.clone()
    }
}

impl Stage for DeviceStreamer {
    fn name(&self) -> &str {
        match self.mode {
            Mode::Capture { .. } => "capture-streamer",
            Mode::Playback { .. } => "playback-streamer",
        }
    }

    fn step(&mut self) -> Result<Flow> {
        match &mut self.mode {
            Mode::Capture {
                chunk_frames,
                recorder,
            } => {
                let chunk = self.device.read(*chunk_frames)?;
                if chunk.is_empty() {
                    return Ok(Flow::Continue);
                }
                if let Some(recorder) = recorder {
                    recorder.push(&chunk);
                }
                self.output.publish(Arc::from(chunk));
            }
            Mode::Playback {
                inbox,
                poll_interval,
            } => {
                if let Some(frame) = inbox.poll(*poll_interval) {
                    self.device.write(&frame)?;
                    self.output.publish(frame);
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn on_stop(&mut self) -> Result<()> {
        let flushed = match &mut self.mode {
            Mode::Capture {
                recorder: Some(recorder),
                ..
            } => recorder.finish().map(|_| ()),
            _ => Ok(()),
        };
        // Close the device even if the flush failed
        self.device.close()?;
        flushed
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::device::DeviceError;
    use crate::audio::format::{PcmFormat, SampleWidth};
    use crate::audio::wav::tests::temp_wav;
    use crate::audio::wav::WavReader;
    use crate::pipeline::broadcast::Intake;
    use crate::pipeline::worker::CancellableWorker;
    use crossbeam_channel::unbounded;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory device: capture replays queued chunks, playback records writes
    pub(crate) struct MockDevice {
        pub direction: Direction,
        pub to_read: Arc<Mutex<VecDeque<Vec<f64>>>>,
        pub written: Arc<Mutex<Vec<Vec<f64>>>>,
        pub closed: Arc<AtomicBool>,
    }

    impl MockDevice {
        pub(crate) fn new(direction: Direction) -> Self {
            Self {
                direction,
                to_read: Arc::new(Mutex::new(VecDeque::new())),
                written: Arc::new(Mutex::new(Vec::new())),
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl DeviceStream for MockDevice {
        fn direction(&self) -> Direction {
            self.direction
        }

        fn read(&mut self, _frames: usize) -> std::result::Result<Vec<f64>, DeviceError> {
            let next = self.to_read.lock().unwrap().pop_front();
            match next {
                Some(chunk) => Ok(chunk),
                None => {
                    std::thread::sleep(Duration::from_millis(1));
                    Ok(Vec::new())
                }
            }
        }

        fn write(&mut self, samples: &[f64]) -> std::result::Result<(), DeviceError> {
            self.written.lock().unwrap().push(samples.to_vec());
            Ok(())
        }

        fn close(&mut self) -> std::result::Result<(), DeviceError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_playback_writes_and_republishes() {
        let device = MockDevice::new(Direction::Playback);
        let written = Arc::clone(&device.written);
        let closed = Arc::clone(&device.closed);

        let streamer = DeviceStreamer::playback(Box::new(device), Duration::from_millis(2)).unwrap();
        let intake = streamer.intake().unwrap();
        let (tx, rx) = unbounded::<SampleFrame>();
        streamer.output().subscribe(tx);

        let mut worker = CancellableWorker::new(streamer);
        worker.start().unwrap();

        intake.put(Arc::from(vec![1.0, 2.0]));
        intake.put(Arc::from(vec![3.0]));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().to_vec(), vec![1.0, 2.0]);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().to_vec(), vec![3.0]);

        worker.join_after_stop().unwrap();
        assert_eq!(*written.lock().unwrap(), vec![vec![1.0, 2.0], vec![3.0]]);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_capture_publishes_and_records() {
        let device = MockDevice::new(Direction::Capture);
        device
            .to_read
            .lock()
            .unwrap()
            .extend([vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]);

        let path = temp_wav("capture");
        let format = PcmFormat::new(8000, 1, SampleWidth::I16).unwrap();
        let recorder = WavRecorder::create(&path, format).unwrap();

        let streamer = DeviceStreamer::capture(Box::new(device), 2, Some(recorder)).unwrap();
        assert!(streamer.intake().is_none());
        let (tx, rx) = unbounded::<SampleFrame>();
        streamer.output().subscribe(tx);

        let mut worker = CancellableWorker::new(streamer);
        worker.start().unwrap();
        for _ in 0..3 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        worker.join_after_stop().unwrap();

        let mut reader = WavReader::open(&path).unwrap();
        assert_eq!(
            reader.read_chunk(16).unwrap().unwrap(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_direction_mismatch_rejected() {
        let device = MockDevice::new(Direction::Capture);
        assert!(DeviceStreamer::playback(Box::new(device), Duration::from_millis(1)).is_err());

        let device = MockDevice::new(Direction::Playback);
        assert!(DeviceStreamer::capture(Box::new(device), 4, None).is_err());
    }
}
