//! Capture conditioning - band-limiting filters and the amplitude gate

use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type, Q_BUTTERWORTH_F32};
use tracing::debug;

use crate::config::FilterConfig;
use crate::dsp::spectrum::Spectrum;
use crate::error::DspError;

/// High-pass/low-pass filter chain applied to fetched captures
pub struct SignalConditioner {
    high_pass_filter: Option<DirectForm1<f32>>,
    low_pass_filter: Option<DirectForm1<f32>>,
}

impl SignalConditioner {
    pub fn new(config: &FilterConfig, sample_rate: u32) -> Result<Self, DspError> {
        let mut conditioner = Self {
            high_pass_filter: None,
            low_pass_filter: None,
        };

        if !config.enable_filtering {
            return Ok(conditioner);
        }

        // Drop rumble below the voice band
        if config.high_pass_cutoff > 0.0 {
            let coeffs = Coefficients::<f32>::from_params(
                Type::HighPass,
                sample_rate.hz(),
                config.high_pass_cutoff.hz(),
                Q_BUTTERWORTH_F32,
            )
            .map_err(|e| DspError::Filter(format!("High-pass filter error: {:?}", e)))?;

            conditioner.high_pass_filter = Some(DirectForm1::<f32>::new(coeffs));
            debug!("High-pass filter: {} Hz", config.high_pass_cutoff);
        }

        if config.low_pass_cutoff > 0.0 {
            let coeffs = Coefficients::<f32>::from_params(
                Type::LowPass,
                sample_rate.hz(),
                config.low_pass_cutoff.hz(),
                Q_BUTTERWORTH_F32,
            )
            .map_err(|e| DspError::Filter(format!("Low-pass filter error: {:?}", e)))?;

            conditioner.low_pass_filter = Some(DirectForm1::<f32>::new(coeffs));
            debug!("Low-pass filter: {} Hz", config.low_pass_cutoff);
        }

        Ok(conditioner)
    }

    /// Whether any filter is configured
    pub fn is_active(&self) -> bool {
        self.high_pass_filter.is_some() || self.low_pass_filter.is_some()
    }

    /// Filter `samples` in place
    pub fn process(&mut self, samples: &mut [f32]) {
        if let Some(ref mut filter) = self.high_pass_filter {
            for sample in samples.iter_mut() {
                *sample = filter.run(*sample);
            }
        }

        if let Some(ref mut filter) = self.low_pass_filter {
            for sample in samples.iter_mut() {
                *sample = filter.run(*sample);
            }
        }
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        if let Some(ref mut filter) = self.high_pass_filter {
            filter.reset_state();
        }
        if let Some(ref mut filter) = self.low_pass_filter {
            filter.reset_state();
        }
    }
}

/// Silences captures whose spectrum never rises above a threshold
#[derive(Debug, Clone, Copy)]
pub struct AmplitudeGate {
    threshold: f32,
}

impl AmplitudeGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// True when the spectrum's peak magnitude exceeds the threshold
    pub fn is_open(&self, spectrum: &Spectrum) -> bool {
        spectrum.peak_magnitude() > self.threshold
    }
}
