//! Banded spectral matching of the live capture against word profiles

use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, trace};

use crate::config::DetectionConfig;
use crate::detect::events::{DetectionEvent, MatchedWord};
use crate::dsp::spectrum::Spectrum;
use crate::error::ConfigError;
use crate::profile::store::ProfileSet;
use crate::profile::word::Score;

/// Distance between two spectra over contiguous bands of `band_width` bins.
///
/// Each band contributes the absolute difference of its mean magnitudes. The
/// mean always divides by `band_width`, including for a shorter final band.
/// Bin 0 holds the packed DC/Nyquist pair and never contributes, so a
/// constant offset in the capture does not move the score.
pub fn band_score(live: &[f32], profile: &[f32], band_width: usize) -> f32 {
    let width = band_width as f32;
    let band_mean = |band: &[f32], skip: usize| {
        band.iter().skip(skip).map(|v| v.abs()).sum::<f32>() / width
    };

    live.chunks(band_width)
        .zip(profile.chunks(band_width))
        .enumerate()
        .map(|(band, (live_band, profile_band))| {
            let skip = usize::from(band == 0);
            (band_mean(live_band, skip) - band_mean(profile_band, skip)).abs()
        })
        .sum()
}

/// Result of one matching pass
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub best: MatchedWord,
    /// Previously reported best, set only when the best index changed
    pub previous: Option<MatchedWord>,
    pub changed: bool,
}

impl Detection {
    /// Transition event, if the best match changed
    pub fn event(&self) -> Option<DetectionEvent> {
        self.changed.then(|| DetectionEvent::WordDetected {
            previous: self.previous.clone(),
            current: self.best.clone(),
        })
    }
}

/// Picks the profile closest to the live spectrum
pub struct WordMatcher {
    band_width: usize,
    ignored: HashSet<String>,
    closest_index: usize,
    closest: Option<MatchedWord>,
}

impl WordMatcher {
    pub fn new(band_width: usize) -> Result<Self, ConfigError> {
        if band_width == 0 {
            return Err(ConfigError::InvalidValue {
                field: "detection.band_width".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            band_width,
            ignored: HashSet::new(),
            closest_index: 0,
            closest: None,
        })
    }

    pub fn from_config(config: &DetectionConfig) -> Result<Self, ConfigError> {
        let mut matcher = Self::new(config.band_width)?;
        matcher.set_ignored(config.ignore.iter().cloned());
        Ok(matcher)
    }

    pub fn band_width(&self) -> usize {
        self.band_width
    }

    /// Never consider profiles with this label
    pub fn ignore(&mut self, label: impl Into<String>) {
        self.ignored.insert(label.into());
    }

    pub fn set_ignored<I: IntoIterator<Item = String>>(&mut self, labels: I) {
        self.ignored = labels.into_iter().collect();
    }

    pub fn is_ignored(&self, label: &str) -> bool {
        self.ignored.contains(label)
    }

    /// Index of the last reported best match (0 before any transition)
    pub fn closest_index(&self) -> usize {
        self.closest_index
    }

    pub fn closest(&self) -> Option<&MatchedWord> {
        self.closest.as_ref()
    }

    /// Forget the last reported best match
    pub fn reset(&mut self) {
        self.closest_index = 0;
        self.closest = None;
    }

    pub fn detect_best_match(
        &mut self,
        live: &Spectrum,
        profiles: &mut ProfileSet,
    ) -> Option<Detection> {
        self.detect_best_match_at(live, profiles, Instant::now())
    }

    /// Score every profile against `live` and report the lowest score.
    ///
    /// Profiles keep their latest score. Ties go to the earliest profile.
    pub fn detect_best_match_at(
        &mut self,
        live: &Spectrum,
        profiles: &mut ProfileSet,
        now: Instant,
    ) -> Option<Detection> {
        let bins = live.len();
        let mut best: Option<(usize, f32)> = None;

        for (index, profile) in profiles.iter_mut().enumerate() {
            if self.ignored.contains(&profile.label) {
                continue;
            }

            let score = profile
                .spectrum()
                .filter(|spectrum| bins > 0 && spectrum.len() == bins)
                .map(|spectrum| band_score(&live.real, &spectrum.real, self.band_width));
            let Some(score) = score else {
                profile.set_score(Score::Unranked);
                continue;
            };
            profile.set_score(Score::Ranked(score));

            let rank = match profile.history_mut() {
                Some(history) => {
                    history.record(score, now);
                    history.min_score(now).unwrap_or(score)
                }
                None => score,
            };
            trace!("Profile {} '{}' score {} (rank {})", index, profile.label, score, rank);

            if best.map_or(true, |(_, best_rank)| rank < best_rank) {
                best = Some((index, rank));
            }
        }

        let (index, score) = best?;
        let label = profiles.get(index).map(|p| p.label.clone()).unwrap_or_default();
        let best = MatchedWord {
            index,
            label,
            score,
        };

        let changed = index != self.closest_index;
        let previous = if changed {
            debug!("Best match changed from {} to {} '{}'", self.closest_index, index, best.label);
            let previous = self.closest.replace(best.clone());
            self.closest_index = index;
            previous
        } else {
            None
        };

        Some(Detection {
            best,
            previous,
            changed,
        })
    }
}
