//! Configuration structures for word-spectra

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub filter: FilterConfig,
    pub fft: FftConfig,
    pub detection: DetectionConfig,
    pub profiles: ProfileConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values the pipeline relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let window = self.capture.window_len();
        if window < 4 || !window.is_power_of_two() {
            return Err(ConfigError::InvalidValue {
                field: "capture.sample_rate * capture.capture_secs".to_string(),
                value: window.to_string(),
            });
        }

        if self.detection.band_width == 0 {
            return Err(ConfigError::InvalidValue {
                field: "detection.band_width".to_string(),
                value: "0".to_string(),
            });
        }

        if self.fft.table_cache_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fft.table_cache_capacity".to_string(),
                value: "0".to_string(),
            });
        }

        let nyquist = self.capture.sample_rate as f32 / 2.0;
        if self.filter.enable_filtering {
            for (field, cutoff) in [
                ("filter.high_pass_cutoff", self.filter.high_pass_cutoff),
                ("filter.low_pass_cutoff", self.filter.low_pass_cutoff),
            ] {
                if cutoff >= nyquist {
                    return Err(ConfigError::InvalidValue {
                        field: field.to_string(),
                        value: cutoff.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Microphone capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Input device name (None = default device)
    pub device: Option<String>,
    /// Capture sample rate (Hz). `sample_rate * capture_secs` must be a power of two.
    pub sample_rate: u32,
    /// Length of the looping capture window (seconds)
    pub capture_secs: u32,
    /// Delay between ticks in the CLI loop (milliseconds)
    pub poll_interval_ms: u64,
}

impl CaptureConfig {
    /// Number of samples in the capture window
    pub fn window_len(&self) -> usize {
        self.sample_rate as usize * self.capture_secs as usize
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: 8192,
            capture_secs: 1,
            poll_interval_ms: 20,
        }
    }
}

/// Signal conditioning applied to each fetched capture
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Enable high-pass/low-pass filtering
    pub enable_filtering: bool,
    /// High-pass filter cutoff frequency (Hz)
    pub high_pass_cutoff: f32,
    /// Low-pass filter cutoff frequency (Hz)
    pub low_pass_cutoff: f32,
    /// Zero captures whose peak spectral magnitude stays under `gate_threshold`
    pub enable_gate: bool,
    pub gate_threshold: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enable_filtering: false,
            high_pass_cutoff: 300.0,
            low_pass_cutoff: 3400.0,
            enable_gate: false,
            gate_threshold: 0.2,
        }
    }
}

/// Fourier engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FftConfig {
    /// Number of transform tables kept in the shared cache
    pub table_cache_capacity: usize,
}

impl Default for FftConfig {
    fn default() -> Self {
        Self {
            table_cache_capacity: crate::dsp::fft::DEFAULT_TABLE_CACHE_CAPACITY,
        }
    }
}

/// Word matching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Number of spectrum bins averaged per band
    pub band_width: usize,
    /// How ticks are turned into detections
    pub mode: DetectionMode,
    /// Labels never considered by the matcher
    pub ignore: Vec<String>,
    /// Normalize the live wave and recorded words before computing spectra
    pub normalize_wave: bool,
    pub normalize_mode: NormalizeMode,
    /// Subtract the noise profile spectrum from recorded words
    pub remove_spectrum_noise: bool,
    /// Rank profiles by their minimum score over this trailing window
    pub score_window_ms: Option<u64>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            band_width: 60,
            mode: DetectionMode::Continuous,
            ignore: Vec::new(),
            normalize_wave: false,
            normalize_mode: NormalizeMode::Symmetric,
            remove_spectrum_noise: false,
            score_window_ms: None,
        }
    }
}

/// Tick strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// Match the live spectrum on every tick with fresh data
    Continuous,
    /// Only record word profiles while a word is held
    PushToTalk,
}

impl std::fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionMode::Continuous => write!(f, "continuous"),
            DetectionMode::PushToTalk => write!(f, "push_to_talk"),
        }
    }
}

/// How negative samples are scaled by wave normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizeMode {
    /// Negatives divided by the largest negative magnitude
    Symmetric,
    /// Negatives divided by the largest positive value
    Legacy,
}

/// Profile persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Bulk profile file
    pub path: PathBuf,
    /// Key prefix used with a preference store
    pub prefs_key: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("profiles.bin"),
            prefs_key: "word_profiles".to_string(),
        }
    }
}

/// Detection output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormat,
    /// Output file path (None = console only)
    pub output_path: Option<PathBuf>,
    /// Prefix lines with the time since listening started
    pub enable_timestamps: bool,
    /// Enable console output
    pub enable_console: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            output_path: None,
            enable_timestamps: true,
            enable_console: true,
        }
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// One JSON object per line
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(ConfigError::InvalidValue {
                field: "output.format".to_string(),
                value: s.to_string(),
            }),
        }
    }
}
