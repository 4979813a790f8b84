//! Spectrum extraction, noise-floor subtraction and wave normalization

use tracing::trace;

use crate::config::NormalizeMode;
use crate::dsp::fft::{FourierTransform, TableCache};
use crate::error::DspError;

/// One-sided spectrum in natural frequency order.
///
/// Bin 0 packs DC (real) and Fs/2 (imaginary).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrum {
    pub real: Vec<f32>,
    pub imag: Vec<f32>,
}

impl Spectrum {
    /// Zeroed spectrum with `bins` bins
    pub fn zeroed(bins: usize) -> Self {
        Self {
            real: vec![0.0; bins],
            imag: vec![0.0; bins],
        }
    }

    /// Number of bins (half the source wave length)
    pub fn len(&self) -> usize {
        self.real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.real.is_empty()
    }

    /// Largest absolute value of the real part above bin 0
    pub fn peak_magnitude(&self) -> f32 {
        self.real
            .iter()
            .skip(1)
            .fold(0.0f32, |peak, v| peak.max(v.abs()))
    }

    fn resize(&mut self, bins: usize) {
        self.real.resize(bins, 0.0);
        self.imag.resize(bins, 0.0);
    }
}

/// Turns sample buffers into spectra via the Fourier engine
pub struct SpectrumExtractor {
    fft: FourierTransform,
}

impl Default for SpectrumExtractor {
    fn default() -> Self {
        Self::new(FourierTransform::default())
    }
}

impl SpectrumExtractor {
    pub fn new(fft: FourierTransform) -> Self {
        Self { fft }
    }

    /// Extractor backed by an existing table cache
    pub fn with_cache(cache: TableCache) -> Self {
        Self::new(FourierTransform::new(cache))
    }

    pub fn fft(&mut self) -> &mut FourierTransform {
        &mut self.fft
    }

    /// Compute a freshly allocated spectrum of `wave`
    pub fn compute_spectrum(&mut self, wave: &[f32]) -> Result<Spectrum, DspError> {
        let mut spectrum = Spectrum::zeroed(wave.len() / 2);
        self.compute_spectrum_into(wave, &mut spectrum)?;
        Ok(spectrum)
    }

    /// Compute the spectrum of `wave` into `spectrum`, resizing it when needed
    pub fn compute_spectrum_into(
        &mut self,
        wave: &[f32],
        spectrum: &mut Spectrum,
    ) -> Result<(), DspError> {
        spectrum.resize(wave.len() / 2);
        self.fft.forward(wave, &mut spectrum.real, &mut spectrum.imag)?;
        trace!("Computed spectrum with {} bins", spectrum.len());
        Ok(())
    }
}

/// Replace each bin with `max(0, |spectrum| - |noise|)`
pub fn subtract_noise_from_spectrum(noise: &[f32], spectrum: &mut [f32]) -> Result<(), DspError> {
    check_equal("noise spectrum", spectrum.len(), noise.len())?;

    for (value, noise) in spectrum.iter_mut().zip(noise) {
        *value = (value.abs() - noise.abs()).max(0.0);
    }
    Ok(())
}

/// Pull each sample toward zero by the noise magnitude without crossing zero
pub fn subtract_noise_from_wave(noise: &[f32], samples: &mut [f32]) -> Result<(), DspError> {
    check_equal("noise wave", samples.len(), noise.len())?;

    for (sample, noise) in samples.iter_mut().zip(noise) {
        let reduced = (sample.abs() - noise.abs()).max(0.0);
        *sample = reduced.copysign(*sample);
    }
    Ok(())
}

/// Scale positive and negative samples by their own extremes.
///
/// With [`NormalizeMode::Legacy`] negative samples are divided by the positive
/// maximum instead, which is what earlier recordings were normalized with.
pub fn normalize_wave(samples: &mut [f32], mode: NormalizeMode) {
    let mut max = 0.0f32;
    let mut min = 0.0f32;
    for &value in samples.iter() {
        if value > 0.0 {
            max = max.max(value);
        } else {
            min = min.max(-value);
        }
    }

    let negative_divisor = match mode {
        NormalizeMode::Symmetric => min,
        NormalizeMode::Legacy => max,
    };

    for value in samples.iter_mut() {
        if *value > 0.0 {
            if max != 0.0 {
                *value /= max;
            }
        } else if min != 0.0 && negative_divisor != 0.0 {
            *value /= negative_divisor;
        }
    }
}

fn check_equal(what: &'static str, expected: usize, actual: usize) -> Result<(), DspError> {
    if expected != actual {
        return Err(DspError::DimensionMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| {
                amplitude
                    * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
            })
            .collect()
    }

    #[test]
    fn test_compute_spectrum_peak_bin() {
        let mut extractor = SpectrumExtractor::default();
        let wave = tone(100.0, 1024, 1024, 0.5);
        let spectrum = extractor.compute_spectrum(&wave).unwrap();

        assert_eq!(spectrum.len(), 512);
        let peak = (1..spectrum.len())
            .max_by(|&a, &b| spectrum.imag[a].abs().total_cmp(&spectrum.imag[b].abs()))
            .unwrap();
        assert_eq!(peak, 100);
    }

    #[test]
    fn test_compute_spectrum_into_resizes() {
        let mut extractor = SpectrumExtractor::default();
        let mut spectrum = Spectrum::zeroed(4);
        extractor
            .compute_spectrum_into(&[1.0; 32], &mut spectrum)
            .unwrap();
        assert_eq!(spectrum.real.len(), 16);
        assert_eq!(spectrum.imag.len(), 16);
        assert!((spectrum.real[0] - 32.0).abs() < 1e-4);
    }

    #[test]
    fn test_subtract_noise_from_spectrum() {
        let noise = [0.5, -1.0, 0.0, 3.0];
        let mut spectrum = [2.0, 0.5, -4.0, -1.0];
        subtract_noise_from_spectrum(&noise, &mut spectrum).unwrap();
        assert_eq!(spectrum, [1.5, 0.0, 4.0, 0.0]);
    }

    #[test]
    fn test_subtract_zero_noise_is_magnitude() {
        let mut spectrum = [-2.0, 0.25, -0.0, 7.0];
        subtract_noise_from_spectrum(&[0.0; 4], &mut spectrum).unwrap();
        assert_eq!(spectrum, [2.0, 0.25, 0.0, 7.0]);
    }

    #[test]
    fn test_subtract_noise_length_mismatch() {
        let mut spectrum = [1.0, 2.0];
        let err = subtract_noise_from_spectrum(&[0.0; 3], &mut spectrum).unwrap_err();
        assert!(matches!(err, DspError::DimensionMismatch { expected: 2, actual: 3, .. }));
        assert_eq!(spectrum, [1.0, 2.0]);
    }

    #[test]
    fn test_subtract_noise_from_wave_keeps_sign() {
        let noise = [0.1, -0.1, 0.5, 0.5];
        let mut samples = [0.4, -0.4, 0.2, -0.2];
        subtract_noise_from_wave(&noise, &mut samples).unwrap();

        assert!((samples[0] - 0.3).abs() < 1e-6);
        assert!((samples[1] + 0.3).abs() < 1e-6);
        assert_eq!(samples[2], 0.0);
        assert_eq!(samples[3], 0.0);
    }

    #[test]
    fn test_normalize_wave_symmetric() {
        let mut samples = [0.25, -0.5, 0.5, -0.25, 0.0];
        normalize_wave(&mut samples, NormalizeMode::Symmetric);
        assert_eq!(samples, [0.5, -1.0, 1.0, -0.5, 0.0]);
    }

    #[test]
    fn test_normalize_wave_legacy_uses_positive_max() {
        let mut samples = [0.25, -0.5, 0.5, -0.25];
        normalize_wave(&mut samples, NormalizeMode::Legacy);
        assert_eq!(samples, [0.5, -1.0, 1.0, -0.5]);

        let mut samples = [0.25, -1.0];
        normalize_wave(&mut samples, NormalizeMode::Legacy);
        assert_eq!(samples, [1.0, -4.0]);
    }

    #[test]
    fn test_normalize_silence_unchanged() {
        let mut samples = [0.0; 8];
        normalize_wave(&mut samples, NormalizeMode::Symmetric);
        assert_eq!(samples, [0.0; 8]);
    }
}
