//! Signal processing: Fourier engine, spectra and capture conditioning

pub mod fft;
pub mod filter;
pub mod spectrum;

pub use fft::{FourierTransform, TableCache, TableLease, TransformTables};
pub use filter::{AmplitudeGate, SignalConditioner};
pub use spectrum::{
    normalize_wave, subtract_noise_from_spectrum, subtract_noise_from_wave, Spectrum,
    SpectrumExtractor,
};
