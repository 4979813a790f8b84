//! Looping microphone capture and circular buffer bookkeeping

pub mod buffer;
pub mod driver;

pub use buffer::{trim_len, CaptureBuffer, CaptureState, ClipBuffer};
pub use driver::{CaptureHandle, CpalMicrophone, MemoryMicrophone, MicrophoneDriver, MEMORY_DEVICE};
