//! Custom error types for word-spectra

use thiserror::Error;

/// Main error type for the word-spectra system
#[derive(Error, Debug)]
pub enum WordSpectraError {
    #[error("DSP error: {0}")]
    Dsp(#[from] DspError),

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transform and spectrum errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DspError {
    /// Buffer lengths do not agree with each other
    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Transform length {0} is too short (need an even length of at least 4)")]
    InvalidLength(usize),

    #[error("Filter error: {0}")]
    Filter(String),
}

/// Profile persistence errors
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Profile stream ended unexpectedly while reading {0}")]
    Truncated(&'static str),

    #[error("Invalid length for {what}: {value}")]
    InvalidLength { what: &'static str, value: i64 },

    #[error("Profile label is not valid UTF-8")]
    InvalidLabel,

    #[error("Preference key not found: {0}")]
    MissingKey(String),

    #[error("Failed to decode stored profile: {0}")]
    Encoding(String),

    #[error("Profile index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Spectrum error: {0}")]
    Spectrum(#[from] DspError),
}

/// Capture buffer and microphone driver errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No audio input device available")]
    NoInputDevice,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to get device configuration: {0}")]
    DeviceConfig(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),

    #[error("Stream playback error: {0}")]
    StreamPlay(String),

    #[error("Device {0} is not capturing")]
    NotCapturing(String),

    #[error("Position {position} outside buffer of size {size}")]
    InvalidPosition { position: usize, size: usize },

    #[error("Capture window holds {expected} samples, got {actual}")]
    WindowMismatch { expected: usize, actual: usize },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: String, value: String },
}

pub type Result<T> = std::result::Result<T, WordSpectraError>;
