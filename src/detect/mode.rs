//! Per-tick detection strategies

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::capture::buffer::CaptureBuffer;
use crate::config::{Config, DetectionConfig, DetectionMode, NormalizeMode};
use crate::detect::matcher::{Detection, WordMatcher};
use crate::dsp::spectrum::{normalize_wave, Spectrum, SpectrumExtractor};
use crate::error::Result;
use crate::profile::store::ProfileSet;

/// Everything a strategy may touch during one tick
pub struct TickContext<'a> {
    pub now: Instant,
    /// Driver write head seen this tick
    pub position: usize,
    /// Whether new samples arrived since the previous tick
    pub fresh: bool,
    pub live: &'a Spectrum,
    pub capture: &'a mut CaptureBuffer,
    pub profiles: &'a mut ProfileSet,
    pub matcher: &'a mut WordMatcher,
    pub extractor: &'a mut SpectrumExtractor,
}

/// What happened during a tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Nothing to report
    Idle,
    /// The matcher ran
    Matched(Detection),
    /// A word is being recorded into profile `index`
    Holding { index: usize },
    /// A recording finished and replaced a profile
    Recorded(RecordedWord),
}

/// A finished push-to-talk recording
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWord {
    pub index: usize,
    pub label: String,
    /// Samples captured between press and release
    pub samples: usize,
    /// Ended by the hold limit rather than a release
    pub timed_out: bool,
}

/// Post-processing applied to recorded words
#[derive(Debug, Clone, Copy)]
pub struct RecordOptions {
    /// Normalize recordings other than the noise profile
    pub normalize_wave: bool,
    pub normalize_mode: NormalizeMode,
    /// Subtract the noise spectrum after recording
    pub remove_spectrum_noise: bool,
}

impl From<&DetectionConfig> for RecordOptions {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            normalize_wave: config.normalize_wave,
            normalize_mode: config.normalize_mode,
            remove_spectrum_noise: config.remove_spectrum_noise,
        }
    }
}

/// Behaviour run once per pipeline tick
pub trait DetectionStrategy {
    fn name(&self) -> &'static str;

    fn on_tick(&mut self, ctx: &mut TickContext<'_>) -> Result<TickOutcome>;

    /// Begin recording into profile `index` from write head `position`.
    /// Returns false when the strategy does not record or is already holding.
    fn press(&mut self, _index: usize, _position: usize, _now: Instant) -> bool {
        false
    }

    /// Finish a recording started by [`press`](Self::press)
    fn release(&mut self, _ctx: &mut TickContext<'_>) -> Result<Option<RecordedWord>> {
        Ok(None)
    }
}

/// Strategy selected by the configuration
pub fn strategy_for(config: &Config) -> Box<dyn DetectionStrategy> {
    match config.detection.mode {
        DetectionMode::Continuous => Box::new(ContinuousDetection),
        DetectionMode::PushToTalk => Box::new(PushToTalk::from_config(config)),
    }
}

/// Match the live spectrum whenever fresh samples arrive
#[derive(Debug, Default)]
pub struct ContinuousDetection;

impl DetectionStrategy for ContinuousDetection {
    fn name(&self) -> &'static str {
        "continuous"
    }

    fn on_tick(&mut self, ctx: &mut TickContext<'_>) -> Result<TickOutcome> {
        if !ctx.fresh {
            return Ok(TickOutcome::Idle);
        }

        Ok(ctx
            .matcher
            .detect_best_match_at(ctx.live, ctx.profiles, ctx.now)
            .map_or(TickOutcome::Idle, TickOutcome::Matched))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hold {
    Idle,
    Holding {
        index: usize,
        start: usize,
        deadline: Instant,
    },
}

/// Record word profiles while a word is held; no matching
#[derive(Debug)]
pub struct PushToTalk {
    hold: Hold,
    hold_limit: Duration,
    options: RecordOptions,
}

impl PushToTalk {
    /// `hold_limit` ends a recording that was never released
    pub fn new(hold_limit: Duration, options: RecordOptions) -> Self {
        Self {
            hold: Hold::Idle,
            hold_limit,
            options,
        }
    }

    /// Hold limit equal to the capture window
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_secs(u64::from(config.capture.capture_secs)),
            RecordOptions::from(&config.detection),
        )
    }

    pub fn is_holding(&self) -> bool {
        matches!(self.hold, Hold::Holding { .. })
    }

    pub fn holding_index(&self) -> Option<usize> {
        match self.hold {
            Hold::Holding { index, .. } => Some(index),
            Hold::Idle => None,
        }
    }

    fn finish(&mut self, ctx: &mut TickContext<'_>, timed_out: bool) -> Result<Option<RecordedWord>> {
        let Hold::Holding { index, start, .. } = std::mem::replace(&mut self.hold, Hold::Idle)
        else {
            return Ok(None);
        };

        let current = ctx.position;
        let samples = ctx.capture.trim_len(start, current)?;
        let mut wave = ctx.capture.extract_trim(start, current)?;
        ctx.capture.clear();

        if self.options.normalize_wave && index != 0 {
            normalize_wave(&mut wave, self.options.normalize_mode);
        }
        ctx.profiles.replace_wave(index, wave, ctx.extractor)?;

        if self.options.remove_spectrum_noise {
            if index == 0 {
                ctx.profiles.subtract_noise_from_all();
            } else {
                ctx.profiles.subtract_noise_from(index)?;
            }
        }

        let label = ctx
            .profiles
            .get(index)
            .map(|p| p.label.clone())
            .unwrap_or_default();
        if timed_out {
            warn!("Recording of '{}' hit the {:?} hold limit", label, self.hold_limit);
        }
        info!("Recorded '{}': {} samples", label, samples);

        Ok(Some(RecordedWord {
            index,
            label,
            samples,
            timed_out,
        }))
    }
}

impl DetectionStrategy for PushToTalk {
    fn name(&self) -> &'static str {
        "push_to_talk"
    }

    fn on_tick(&mut self, ctx: &mut TickContext<'_>) -> Result<TickOutcome> {
        let hold = self.hold;
        match hold {
            Hold::Holding { deadline, .. } if ctx.now >= deadline => Ok(self
                .finish(ctx, true)?
                .map_or(TickOutcome::Idle, TickOutcome::Recorded)),
            Hold::Holding { index, .. } => Ok(TickOutcome::Holding { index }),
            Hold::Idle => Ok(TickOutcome::Idle),
        }
    }

    fn press(&mut self, index: usize, position: usize, now: Instant) -> bool {
        if self.is_holding() {
            return false;
        }

        debug!("Recording into profile {} from position {}", index, position);
        self.hold = Hold::Holding {
            index,
            start: position,
            deadline: now + self.hold_limit,
        };
        true
    }

    fn release(&mut self, ctx: &mut TickContext<'_>) -> Result<Option<RecordedWord>> {
        self.finish(ctx, false)
    }
}
