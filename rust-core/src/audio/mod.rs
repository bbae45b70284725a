//! Audio formats, containers, devices and frame sources

pub mod buffer;
pub mod device;
pub mod format;
pub mod source;
pub mod streamer;
pub mod wav;

pub use buffer::{ChannelBuffer, DeviceRingBuffer};
pub use device::{CpalBackend, DeviceBackend, DeviceStream, Direction};
pub use format::{PcmFormat, SampleWidth};
pub use source::{BlockSource, FileSource};
pub use streamer::DeviceStreamer;
pub use wav::{WavReader, WavRecorder};
