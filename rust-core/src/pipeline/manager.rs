//! Wires sources, device streamers and the analyzer into one pipeline
//!
//! ```text
//! play:   source ──> [playback streamer] ──> waveform ──> analyzer ──> spectrum
//! record: capture streamer ──────────────> waveform ──> analyzer ──> spectrum
//! ```
//!
//! The `waveform` and `spectrum` broadcasts belong to the manager and survive
//! reconfiguration, so sinks subscribe once.

use crate::audio::device::{DeviceBackend, DeviceGuard, Direction};
use crate::audio::format::PcmFormat;
use crate::audio::source::{BlockSource, FileSource};
use crate::audio::streamer::DeviceStreamer;
use crate::audio::wav::WavRecorder;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::broadcast::Broadcast;
use crate::pipeline::worker::{CancellableWorker, WorkerState};
use crate::pipeline::{SampleFrame, SpectralFrame};
use crate::spectrum::analyzer::{AnalyzerStage, SpectralAnalyzer};
use crossbeam_channel::Sender;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Owns the stages of one pipeline run
pub struct AudioManager {
    config: PipelineConfig,
    backend: Option<Box<dyn DeviceBackend>>,

    source: Option<CancellableWorker>,
    streamer: Option<CancellableWorker>,
    analyzer: Option<CancellableWorker>,
    /// Keeps the platform stream alive; released after the streamer joins
    guard: Option<Box<dyn DeviceGuard>>,
    /// Stage inboxes, watched to tell when queued frames have been consumed
    inboxes: Vec<Sender<SampleFrame>>,

    waveform: Broadcast<SampleFrame>,
    spectrum: Broadcast<SpectralFrame>,
    format: Option<PcmFormat>,
    started: bool,
}

impl AudioManager {
    /// With no backend the manager runs headless: sources feed the analyzer
    /// directly and recording is unavailable.
    pub fn new(config: PipelineConfig, backend: Option<Box<dyn DeviceBackend>>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend,
            source: None,
            streamer: None,
            analyzer: None,
            guard: None,
            inboxes: Vec::new(),
            waveform: Broadcast::new(),
            spectrum: Broadcast::new(),
            format: None,
            started: false,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Time-domain frames feeding the analyzer
    pub fn waveform(&self) -> Broadcast<SampleFrame> {
        self.waveform.clone()
    }

    /// Spectral frames produced by the analyzer
    pub fn spectrum(&self) -> Broadcast<SpectralFrame> {
        self.spectrum.clone()
    }

    /// Format of the configured run, if any
    pub fn format(&self) -> Option<PcmFormat> {
        self.format
    }

    /// Play a PCM container; format comes from its header
    pub fn set_play_file(&mut self, path: &Path) -> Result<()> {
        self.ensure_idle()?;
        let source = FileSource::open(path, self.config.source.chunk_frames)?;
        let format = source.format();
        let output = source.output();
        self.configure_playback(CancellableWorker::new(source), output, format)
    }

    /// Play an in-memory block of interleaved samples
    pub fn set_play_block(&mut self, samples: Vec<f64>, format: PcmFormat) -> Result<()> {
        self.ensure_idle()?;
        let channels = format.channels as usize;
        if channels == 0 || samples.len() % channels != 0 {
            return Err(PipelineError::ChannelMismatch {
                len: samples.len(),
                channels,
            });
        }
        let chunk = format.samples_for(self.config.source.chunk_frames);
        let source = BlockSource::new(samples, chunk)?;
        let output = source.output();
        self.configure_playback(CancellableWorker::new(source), output, format)
    }

    /// Capture from the input device, writing a container on stop if `path` is given
    pub fn set_record(&mut self, format: PcmFormat, path: Option<PathBuf>) -> Result<()> {
        self.ensure_idle()?;
        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| PipelineError::Config("recording needs an audio device".to_string()))?;

        let recorder = path
            .as_deref()
            .map(|p| WavRecorder::create(p, format))
            .transpose()?;
        let opened = backend.open(Direction::Capture, format)?;
        let streamer =
            DeviceStreamer::capture(opened.stream, self.config.source.chunk_frames, recorder)?;

        let analyzer = self.build_analyzer(format)?;
        self.wire_feed(&streamer.output(), &analyzer);

        self.streamer = Some(CancellableWorker::new(streamer));
        self.analyzer = Some(CancellableWorker::new(analyzer));
        self.guard = Some(opened.guard);
        self.format = Some(format);
        Ok(())
    }

    fn configure_playback(
        &mut self,
        source: CancellableWorker,
        source_output: Broadcast<SampleFrame>,
        format: PcmFormat,
    ) -> Result<()> {
        let analyzer = self.build_analyzer(format)?;

        let (streamer, guard) = match &self.backend {
            Some(backend) => {
                let opened = backend.open(Direction::Playback, format)?;
                let streamer =
                    DeviceStreamer::playback(opened.stream, self.config.source.poll_interval())?;
                (Some(streamer), Some(opened.guard))
            }
            None => (None, None),
        };

        match &streamer {
            Some(streamer) => {
                if let Some(intake) = streamer.intake() {
                    self.inboxes.push(intake.clone());
                    source_output.subscribe(intake);
                }
                self.wire_feed(&streamer.output(), &analyzer);
            }
            None => self.wire_feed(&source_output, &analyzer),
        }

        self.source = Some(source);
        self.streamer = streamer.map(CancellableWorker::new);
        self.analyzer = Some(CancellableWorker::new(analyzer));
        self.guard = guard;
        self.format = Some(format);
        Ok(())
    }

    fn build_analyzer(&self, format: PcmFormat) -> Result<AnalyzerStage> {
        let analyzer = SpectralAnalyzer::new(self.config.analyzer.clone(), format.channels as usize)?;
        Ok(AnalyzerStage::new(analyzer, self.config.source.poll_interval()))
    }

    /// Route `feed` to the analyzer and the waveform broadcast, and the
    /// analyzer's output to the spectrum broadcast
    fn wire_feed(&mut self, feed: &Broadcast<SampleFrame>, analyzer: &AnalyzerStage) {
        let intake = analyzer.intake();
        self.inboxes.push(intake.clone());
        feed.subscribe(intake);
        feed.subscribe(self.waveform.clone());
        analyzer.output().subscribe(self.spectrum.clone());
    }

    /// Drop any previous, never-started configuration
    fn ensure_idle(&mut self) -> Result<()> {
        if self.started {
            return Err(PipelineError::Config(
                "cannot reconfigure a running pipeline".to_string(),
            ));
        }
        self.source = None;
        self.streamer = None;
        self.analyzer = None;
        self.guard = None;
        self.inboxes.clear();
        self.format = None;
        Ok(())
    }

    /// Start streamer, source, then analyzer
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(PipelineError::AlreadyStarted("pipeline".to_string()));
        }
        if self.analyzer.is_none() {
            return Err(PipelineError::Config("nothing to start".to_string()));
        }

        // Set first so a partial start is still torn down by stop()
        self.started = true;
        for worker in [&mut self.streamer, &mut self.source, &mut self.analyzer]
            .into_iter()
            .flatten()
        {
            worker.start()?;
        }
        log::info!("Pipeline started");
        Ok(())
    }

    /// Join source, streamer and analyzer in that order
    ///
    /// Frames still queued are discarded. Returns the first stage fault.
    pub fn stop(&mut self) -> Result<()> {
        let mut outcome = Ok(());
        for worker in [&mut self.source, &mut self.streamer, &mut self.analyzer]
            .into_iter()
            .flatten()
        {
            let result = worker.join_after_stop();
            if outcome.is_ok() {
                outcome = result;
            }
        }

        if let Some(guard) = self.guard.take() {
            if let Err(e) = guard.pause() {
                log::warn!("Failed to pause audio device: {}", e);
            }
        }

        // Stopped workers cannot be restarted; a new run needs set_* again
        self.source = None;
        self.streamer = None;
        self.analyzer = None;
        self.inboxes.clear();
        if self.started {
            log::info!("Pipeline stopped");
        }
        self.started = false;
        outcome
    }

    /// True while any configured stage is running
    pub fn is_running(&self) -> bool {
        [&self.source, &self.streamer, &self.analyzer]
            .into_iter()
            .flatten()
            .any(|w| w.is_running())
    }

    /// True once a finite source has run out of input
    pub fn source_finished(&self) -> bool {
        self.source
            .as_ref()
            .map_or(false, |w| w.state() == WorkerState::Stopped)
    }

    /// Frames waiting in stage inboxes
    pub fn pending_frames(&self) -> usize {
        self.inboxes.iter().map(|tx| tx.len()).sum()
    }

    /// Samples handed to the output device but not yet played
    pub fn queued_playback_samples(&self) -> usize {
        self.guard.as_ref().map_or(0, |g| g.queued_samples())
    }

    /// Wait until the source has finished, every inbox is empty and the
    /// output device has played what it was given
    ///
    /// Returns false on timeout.
    pub fn wait_until_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.source_finished()
                && self.pending_frames() == 0
                && self.queued_playback_samples() == 0
            {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(self.config.source.poll_interval());
        }
    }
}

impl Drop for AudioManager {
    fn drop(&mut self) {
        if self.started {
            if let Err(e) = self.stop() {
                log::warn!("Pipeline stopped with error: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::{DeviceError, OpenedDevice};
    use crate::audio::format::SampleWidth;
    use crate::audio::streamer::tests::MockDevice;
    use crate::audio::wav::tests::temp_wav;
    use crate::audio::wav::WavReader;
    use crate::config::AnalyzerSettings;
    use crossbeam_channel::{unbounded, Receiver};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct MockGuard {
        paused: Arc<AtomicBool>,
        queued: Arc<AtomicUsize>,
    }

    impl DeviceGuard for MockGuard {
        fn pause(&self) -> std::result::Result<(), DeviceError> {
            self.paused.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn queued_samples(&self) -> usize {
            self.queued.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct MockBackend {
        to_read: Arc<Mutex<VecDeque<Vec<f64>>>>,
        written: Arc<Mutex<Vec<Vec<f64>>>>,
        paused: Arc<AtomicBool>,
        queued: Arc<AtomicUsize>,
    }

    impl DeviceBackend for MockBackend {
        fn open(
            &self,
            direction: Direction,
            _format: PcmFormat,
        ) -> std::result::Result<OpenedDevice, DeviceError> {
            let mut device = MockDevice::new(direction);
            device.to_read = Arc::clone(&self.to_read);
            device.written = Arc::clone(&self.written);
            Ok(OpenedDevice {
                stream: Box::new(device),
                guard: Box::new(MockGuard {
                    paused: Arc::clone(&self.paused),
                    queued: Arc::clone(&self.queued),
                }),
            })
        }
    }

    fn small_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.analyzer = AnalyzerSettings {
            blocksize: 4,
            ..AnalyzerSettings::default()
        };
        config.source.chunk_frames = 2;
        config.source.poll_interval_ms = 2;
        config
    }

    fn collect<T>(rx: &Receiver<T>, n: usize) -> Vec<T> {
        (0..n)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect()
    }

    fn mono() -> PcmFormat {
        PcmFormat::new(8000, 1, SampleWidth::I16).unwrap()
    }

    #[test]
    fn test_headless_block_playback() {
        let mut manager = AudioManager::new(small_config(), None).unwrap();
        let (wave_tx, wave_rx) = unbounded::<SampleFrame>();
        let (spec_tx, spec_rx) = unbounded::<SpectralFrame>();
        manager.waveform().subscribe(wave_tx);
        manager.spectrum().subscribe(spec_tx);

        let samples: Vec<f64> = (1..=8).map(|n| n as f64).collect();
        manager.set_play_block(samples, mono()).unwrap();
        manager.start().unwrap();
        assert!(manager.wait_until_drained(Duration::from_secs(5)));

        let chunks = collect(&wave_rx, 4);
        assert!(chunks.iter().all(|c| c.len() == 2));
        let spectra = collect(&spec_rx, 2);
        assert!(spectra.iter().all(|s| s.len() == 4));

        // Centered DC bin of [5, 6, 7, 8]
        assert!((spectra[1][2].re - 26.0).abs() < 1e-9);

        manager.stop().unwrap();
        assert!(!manager.is_running());
    }

    #[test]
    fn test_playback_through_device() {
        let backend = MockBackend::default();
        let written = Arc::clone(&backend.written);
        let paused = Arc::clone(&backend.paused);

        let mut manager = AudioManager::new(small_config(), Some(Box::new(backend))).unwrap();
        let (spec_tx, spec_rx) = unbounded::<SpectralFrame>();
        manager.spectrum().subscribe(spec_tx);

        manager.set_play_block(vec![1.0; 8], mono()).unwrap();
        manager.start().unwrap();
        assert!(manager.is_running());

        collect(&spec_rx, 2);
        assert!(manager.wait_until_drained(Duration::from_secs(5)));
        manager.stop().unwrap();

        assert_eq!(written.lock().unwrap().len(), 4);
        assert!(paused.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drain_waits_for_device_backlog() {
        let backend = MockBackend::default();
        let queued = Arc::clone(&backend.queued);
        let paused = Arc::clone(&backend.paused);
        queued.store(6, Ordering::SeqCst);

        let mut manager = AudioManager::new(small_config(), Some(Box::new(backend))).unwrap();
        let (spec_tx, spec_rx) = unbounded::<SpectralFrame>();
        manager.spectrum().subscribe(spec_tx);

        manager.set_play_block(vec![1.0; 8], mono()).unwrap();
        manager.start().unwrap();
        collect(&spec_rx, 2);

        // Inboxes are empty but the device still holds samples
        assert!(!manager.wait_until_drained(Duration::from_millis(50)));
        assert_eq!(manager.queued_playback_samples(), 6);
        assert!(!paused.load(Ordering::SeqCst));

        queued.store(0, Ordering::SeqCst);
        assert!(manager.wait_until_drained(Duration::from_secs(5)));
        manager.stop().unwrap();
        assert!(paused.load(Ordering::SeqCst));
    }

    #[test]
    fn test_record_to_container() {
        let backend = MockBackend::default();
        backend
            .to_read
            .lock()
            .unwrap()
            .extend([vec![1.0, 2.0], vec![3.0, 4.0]]);

        let mut manager = AudioManager::new(small_config(), Some(Box::new(backend))).unwrap();
        let (spec_tx, spec_rx) = unbounded::<SpectralFrame>();
        manager.spectrum().subscribe(spec_tx);

        let path = temp_wav("record");
        manager.set_record(mono(), Some(path.clone())).unwrap();
        manager.start().unwrap();

        let spectra = collect(&spec_rx, 1);
        assert!((spectra[0][2].re - 10.0).abs() < 1e-9);
        manager.stop().unwrap();

        let mut reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.read_chunk(8).unwrap().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_record_needs_backend() {
        let mut manager = AudioManager::new(small_config(), None).unwrap();
        assert!(matches!(
            manager.set_record(mono(), None),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_lifecycle_errors() {
        let mut manager = AudioManager::new(small_config(), None).unwrap();
        assert!(matches!(manager.start(), Err(PipelineError::Config(_))));

        manager.set_play_block(vec![0.0; 64], mono()).unwrap();
        manager.start().unwrap();
        assert!(matches!(
            manager.set_play_block(vec![0.0; 4], mono()),
            Err(PipelineError::Config(_))
        ));
        assert!(matches!(manager.start(), Err(PipelineError::AlreadyStarted(_))));
        manager.stop().unwrap();

        // Reconfigurable once stopped
        manager.set_play_block(vec![0.0; 4], mono()).unwrap();
    }

    #[test]
    fn test_ragged_block_rejected_before_start() {
        let mut manager = AudioManager::new(small_config(), None).unwrap();
        let stereo = PcmFormat::new(8000, 2, SampleWidth::I16).unwrap();

        assert!(matches!(
            manager.set_play_block(vec![1.0; 5], stereo),
            Err(PipelineError::ChannelMismatch { len: 5, channels: 2 })
        ));
        assert!(manager.format().is_none());
        assert!(matches!(manager.start(), Err(PipelineError::Config(_))));

        manager.set_play_block(vec![1.0; 6], stereo).unwrap();
        manager.start().unwrap();
        assert!(manager.wait_until_drained(Duration::from_secs(5)));
        manager.stop().unwrap();
    }

    #[test]
    fn test_missing_file_surfaces_before_start() {
        let mut manager = AudioManager::new(small_config(), None).unwrap();
        assert!(manager
            .set_play_file(Path::new("/nonexistent/play.wav"))
            .is_err());
        assert!(!manager.is_running());
    }
}
