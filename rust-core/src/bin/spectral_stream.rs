use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use crossbeam_channel::{unbounded, Receiver};
use spectral_stream::audio::device::{list_devices, CpalBackend, DeviceBackend, Direction};
use spectral_stream::audio::format::{PcmFormat, SampleWidth};
use spectral_stream::pipeline::codec;
use spectral_stream::{AnalysisMode, AudioManager, PipelineConfig, SpectralFrame, WindowType};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "spectral-stream", about = "Streaming multi-channel spectral analysis")]
struct Cli {
    #[command(flatten)]
    analysis: AnalysisArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct AnalysisArgs {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Samples per channel in one analysis pass
    #[arg(long, global = true)]
    blocksize: Option<usize>,

    /// Retained context samples (windowed mode)
    #[arg(long, global = true)]
    overlap: Option<usize>,

    /// Window function (hann, hamming, blackman, rectangular)
    #[arg(long, global = true)]
    window: Option<WindowType>,

    /// Analysis pass
    #[arg(long, global = true, value_enum)]
    mode: Option<ModeArg>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a WAV file without audio output
    Analyze { input: PathBuf },

    /// Play a WAV file through the default output device while analyzing
    Play { input: PathBuf },

    /// Record from the default input device while analyzing
    Record {
        output: PathBuf,

        /// Recording length
        #[arg(long, default_value_t = 5.0)]
        seconds: f64,

        /// Sample rate in Hz
        #[arg(long, default_value_t = 11025)]
        rate: u32,

        #[arg(long, default_value_t = 1)]
        channels: u16,

        /// Bytes per sample (1, 2 or 4)
        #[arg(long, default_value_t = 2)]
        width: u16,
    },

    /// List audio devices and exit
    Devices,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Simple,
    Windowed,
}

impl From<ModeArg> for AnalysisMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Simple => AnalysisMode::Simple,
            ModeArg::Windowed => AnalysisMode::Windowed,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.analysis)?;

    match cli.command {
        Command::Analyze { input } => {
            let mut manager = AudioManager::new(config, None)?;
            manager
                .set_play_file(&input)
                .with_context(|| format!("Failed to open {}", input.display()))?;
            run_to_end(&mut manager)
        }
        Command::Play { input } => {
            let backend: Box<dyn DeviceBackend> = Box::new(CpalBackend::new());
            let mut manager = AudioManager::new(config, Some(backend))?;
            manager
                .set_play_file(&input)
                .with_context(|| format!("Failed to play {}", input.display()))?;
            run_to_end(&mut manager)
        }
        Command::Record {
            output,
            seconds,
            rate,
            channels,
            width,
        } => {
            if seconds.is_nan() || seconds <= 0.0 {
                bail!("--seconds must be positive");
            }
            let format = PcmFormat::new(rate, channels, SampleWidth::from_bytes(width)?)?;
            let backend: Box<dyn DeviceBackend> = Box::new(CpalBackend::new());
            let mut manager = AudioManager::new(config, Some(backend))?;
            manager
                .set_record(format, Some(output.clone()))
                .context("Failed to open input device")?;
            record_for(&mut manager, Duration::from_secs_f64(seconds))?;
            println!("Wrote {}", output.display());
            Ok(())
        }
        Command::Devices => {
            for (label, direction) in [("Input", Direction::Capture), ("Output", Direction::Playback)] {
                println!("{} devices:", label);
                for device in list_devices(direction)? {
                    println!(
                        "  {} ({} Hz, {} channel(s))",
                        device.name, device.sample_rate, device.channels
                    );
                }
            }
            Ok(())
        }
    }
}

/// Config file first, then command-line overrides
fn load_config(args: &AnalysisArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let analyzer = &mut config.analyzer;
    if let Some(blocksize) = args.blocksize {
        analyzer.blocksize = blocksize;
    }
    if let Some(mode) = args.mode {
        analyzer.mode = mode.into();
    }
    if let Some(window) = args.window {
        analyzer.window = window;
    }
    if let Some(overlap) = args.overlap {
        analyzer.overlap = overlap;
    }

    config.validate().context("Invalid analysis settings")?;
    Ok(config)
}

/// Run until the source is exhausted and every queued frame is analyzed
fn run_to_end(manager: &mut AudioManager) -> Result<()> {
    let printer = SpectrumPrinter::subscribe(manager)?;
    manager.start()?;

    // A faulted stage stops running before it drains
    while manager.is_running() && !manager.wait_until_drained(Duration::from_millis(100)) {
        printer.drain();
    }
    let outcome = manager.stop();
    printer.drain();
    outcome?;
    Ok(())
}

fn record_for(manager: &mut AudioManager, length: Duration) -> Result<()> {
    let printer = SpectrumPrinter::subscribe(manager)?;
    manager.start()?;

    let deadline = Instant::now() + length;
    while Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(100));
        printer.drain();
    }
    let outcome = manager.stop();
    printer.drain();
    outcome?;
    Ok(())
}

/// Textual spectrum sink: per-channel peak bins, one line per spectral frame
struct SpectrumPrinter {
    rx: Receiver<SpectralFrame>,
    format: PcmFormat,
    config: PipelineConfig,
}

impl SpectrumPrinter {
    fn subscribe(manager: &AudioManager) -> Result<Self> {
        let format = manager.format().context("No pipeline configured")?;
        let (tx, rx) = unbounded();
        manager.spectrum().subscribe(tx);
        Ok(Self {
            rx,
            format,
            config: manager.config().clone(),
        })
    }

    fn drain(&self) {
        for frame in self.rx.try_iter() {
            self.print(&frame);
        }
    }

    fn print(&self, frame: &SpectralFrame) {
        let Ok(channels) = codec::split(&frame[..], self.format.channels as usize) else {
            return;
        };
        let settings = &self.config.analyzer;

        let peaks: Vec<String> = channels
            .iter()
            .enumerate()
            .filter_map(|(ch, spectrum)| {
                let (bin, peak) = spectrum
                    .iter()
                    .map(|c| c.norm())
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.total_cmp(b))?;
                let hz = settings.bin_frequency_hz(bin, self.format.sample_rate);
                Some(format!("ch{}: bin {} ({:.1} Hz) |X|={:.3e}", ch, bin, hz, peak))
            })
            .collect();

        println!("{}", peaks.join("  "));
    }
}
