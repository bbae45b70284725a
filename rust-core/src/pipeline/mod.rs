//! Stage plumbing: cancellable workers, broadcasts, channel codec and the
//! manager that wires stages together

pub mod broadcast;
pub mod codec;
pub mod manager;
pub mod worker;

use num_complex::Complex64;
use std::sync::Arc;

/// Immutable block of interleaved samples shared between subscribers
pub type Frame<T> = Arc<[T]>;

/// Time-domain samples in the native integer scale of their PCM width
pub type SampleFrame = Frame<f64>;

/// Interleaved per-channel spectra
pub type SpectralFrame = Frame<Complex64>;

pub use broadcast::{Broadcast, Inbox, Intake};
pub use codec::ChannelCodec;
pub use manager::AudioManager;
pub use worker::{CancellableWorker, Flow, Stage, WorkerState};
