//! A labelled word recording and its spectrum

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::dsp::spectrum::{Spectrum, SpectrumExtractor};
use crate::error::DspError;

/// Minimum spacing between two entries of a [`ScoreHistory`]
const HISTORY_INTERVAL: Duration = Duration::from_millis(100);

/// Result of the last matching pass for a profile
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Score {
    /// No spectrum, or a spectrum of the wrong length
    #[default]
    Unranked,
    /// Banded spectral distance to the live capture (lower is closer)
    Ranked(f32),
}

impl Score {
    /// Numeric form, `-1.0` when unranked
    pub fn value(&self) -> f32 {
        match self {
            Score::Unranked => -1.0,
            Score::Ranked(score) => *score,
        }
    }

    pub fn ranked(&self) -> Option<f32> {
        match self {
            Score::Unranked => None,
            Score::Ranked(score) => Some(*score),
        }
    }
}

/// Recent scores of one profile, sampled at most every 100 ms
#[derive(Debug, Clone)]
pub struct ScoreHistory {
    window: Duration,
    entries: VecDeque<(Instant, f32)>,
}

impl ScoreHistory {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: VecDeque::new(),
        }
    }

    pub fn record(&mut self, score: f32, now: Instant) {
        let due = self
            .entries
            .back()
            .map_or(true, |(at, _)| now.duration_since(*at) >= HISTORY_INTERVAL);
        if due {
            self.entries.push_back((now, score));
        }
    }

    /// Lowest score recorded within the window ending at `now`
    pub fn min_score(&mut self, now: Instant) -> Option<f32> {
        while let Some((at, _)) = self.entries.front() {
            if now.duration_since(*at) > self.window {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        self.entries
            .iter()
            .map(|(_, score)| *score)
            .reduce(f32::min)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A labelled word: its trimmed waveform and the derived spectrum
#[derive(Debug, Clone)]
pub struct WordProfile {
    /// Unique, case-sensitive key within a profile set
    pub label: String,
    pub channels: u16,
    pub sample_rate: u32,
    wave: Option<Vec<f32>>,
    spectrum: Option<Spectrum>,
    score: Score,
    history: Option<ScoreHistory>,
}

impl WordProfile {
    /// Profile with a label and no recording yet
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            channels: 1,
            sample_rate: 0,
            wave: None,
            spectrum: None,
            score: Score::Unranked,
            history: None,
        }
    }

    /// Profile built from a recording
    pub fn with_wave(
        label: impl Into<String>,
        wave: Vec<f32>,
        channels: u16,
        sample_rate: u32,
        extractor: &mut SpectrumExtractor,
    ) -> Result<Self, DspError> {
        let mut profile = Self::new(label);
        profile.channels = channels;
        profile.sample_rate = sample_rate;
        profile.set_wave(wave, extractor)?;
        Ok(profile)
    }

    /// Replace the recording and recompute its spectrum.
    ///
    /// An empty wave clears the spectrum. On error the previous wave and
    /// spectrum are kept.
    pub fn set_wave(
        &mut self,
        wave: Vec<f32>,
        extractor: &mut SpectrumExtractor,
    ) -> Result<(), DspError> {
        let spectrum = if wave.is_empty() {
            None
        } else {
            Some(extractor.compute_spectrum(&wave)?)
        };
        self.wave = Some(wave);
        self.spectrum = spectrum;
        Ok(())
    }

    /// Store a wave without computing its spectrum (the profile stays unranked)
    pub(crate) fn set_wave_unprocessed(&mut self, wave: Vec<f32>) {
        self.wave = Some(wave);
        self.spectrum = None;
    }

    /// Recompute the spectrum from the stored wave
    pub fn recompute_spectrum(&mut self, extractor: &mut SpectrumExtractor) -> Result<(), DspError> {
        self.spectrum = match self.wave.as_deref() {
            Some(wave) if !wave.is_empty() => Some(extractor.compute_spectrum(wave)?),
            _ => None,
        };
        Ok(())
    }

    pub fn wave(&self) -> Option<&[f32]> {
        self.wave.as_deref()
    }

    pub fn spectrum(&self) -> Option<&Spectrum> {
        self.spectrum.as_ref()
    }

    pub fn spectrum_mut(&mut self) -> Option<&mut Spectrum> {
        self.spectrum.as_mut()
    }

    pub fn has_spectrum(&self) -> bool {
        self.spectrum.is_some()
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub(crate) fn set_score(&mut self, score: Score) {
        self.score = score;
    }

    /// Rank this profile by its minimum score over `window`
    pub fn enable_score_history(&mut self, window: Duration) {
        self.history = Some(ScoreHistory::new(window));
    }

    pub fn has_score_history(&self) -> bool {
        self.history.is_some()
    }

    pub(crate) fn history_mut(&mut self) -> Option<&mut ScoreHistory> {
        self.history.as_mut()
    }

    #[cfg(test)]
    pub(crate) fn set_spectrum(&mut self, spectrum: Spectrum) {
        self.spectrum = Some(spectrum);
    }
}
