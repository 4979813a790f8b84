//! Word Spectra
//!
//! Keyword spotting by spectral template matching. A looping microphone
//! capture is turned into a live spectrum on every tick and compared, band by
//! band, against the spectra of previously recorded word profiles. The closest
//! profile wins and a detection event fires whenever the winner changes.
//!
//! # Architecture
//!
//! The system is organized into the following modules:
//!
//! - `dsp`: Real FFT with a shared table cache, spectra, noise subtraction,
//!   normalization and capture conditioning filters
//! - `profile`: Word profiles, the binary profile format and preference storage
//! - `detect`: Banded matcher, detection events and per-tick strategies
//! - `capture`: Microphone drivers and circular capture buffers
//! - `pipeline`: The poll-driven `WordDetector`
//! - `output`: Output formatting and writing
//! - `config`: Configuration structures
//! - `error`: Error types
//!
//! # Example
//!
//! ```no_run
//! use word_spectra::{Config, CpalMicrophone, WordDetector};
//!
//! let config = Config::default();
//! let mut detector = WordDetector::new(config, CpalMicrophone::new()).unwrap();
//! detector.load_profiles(std::path::Path::new("profiles.bin"));
//! let events = detector.subscribe();
//!
//! detector.start().unwrap();
//! loop {
//!     detector.tick().unwrap();
//!     while let Ok(event) = events.try_recv() {
//!         println!("{:?}", event);
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(20));
//! }
//! ```

pub mod capture;
pub mod config;
pub mod detect;
pub mod dsp;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod profile;

// Re-exports for convenience
pub use capture::{CaptureBuffer, CpalMicrophone, MemoryMicrophone, MicrophoneDriver};
pub use config::{
    CaptureConfig, Config, DetectionConfig, DetectionMode, FilterConfig, NormalizeMode,
    OutputConfig, OutputFormat,
};
pub use detect::{DetectionEvent, MatchedWord, TickOutcome, WordMatcher};
pub use dsp::{FourierTransform, Spectrum, SpectrumExtractor, TableCache};
pub use error::{CaptureError, ConfigError, DspError, ProfileError, Result, WordSpectraError};
pub use output::OutputWriter;
pub use pipeline::WordDetector;
pub use profile::{ProfileSet, Score, WordProfile, NOISE_LABEL};
