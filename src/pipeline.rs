//! Poll-driven word detection pipeline

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{debug, error, info, warn};

use crate::capture::buffer::{CaptureBuffer, CaptureState};
use crate::capture::driver::{CaptureHandle, MicrophoneDriver};
use crate::config::Config;
use crate::detect::events::{DetectionEvent, EventBus};
use crate::detect::matcher::WordMatcher;
use crate::detect::mode::{strategy_for, DetectionStrategy, RecordedWord, TickContext, TickOutcome};
use crate::dsp::fft::TableCache;
use crate::dsp::filter::{AmplitudeGate, SignalConditioner};
use crate::dsp::spectrum::{normalize_wave, Spectrum, SpectrumExtractor};
use crate::error::Result;
use crate::profile::prefs::{load_profiles_prefs, save_profiles_prefs, PreferenceStore};
use crate::profile::store::ProfileSet;

/// Captures from a microphone, computes live spectra and matches them
/// against word profiles once per [`tick`](WordDetector::tick)
pub struct WordDetector<D: MicrophoneDriver> {
    config: Config,
    driver: D,
    handle: Option<CaptureHandle>,
    capture: CaptureBuffer,
    conditioner: SignalConditioner,
    gate: Option<AmplitudeGate>,
    extractor: SpectrumExtractor,
    live_wave: Vec<f32>,
    live: Spectrum,
    matcher: WordMatcher,
    profiles: ProfileSet,
    strategy: Box<dyn DetectionStrategy>,
    events: EventBus,
}

impl<D: MicrophoneDriver> WordDetector<D> {
    pub fn new(config: Config, driver: D) -> Result<Self> {
        config.validate()?;

        let window = config.capture.window_len();
        let conditioner = SignalConditioner::new(&config.filter, config.capture.sample_rate)?;
        let gate = config
            .filter
            .enable_gate
            .then(|| AmplitudeGate::new(config.filter.gate_threshold));
        let extractor =
            SpectrumExtractor::with_cache(TableCache::new(config.fft.table_cache_capacity));
        let matcher = WordMatcher::from_config(&config.detection)?;
        let strategy = strategy_for(&config);

        info!(
            "Word detector: {} samples @ {} Hz, band width {}, mode {}",
            window, config.capture.sample_rate, config.detection.band_width, config.detection.mode
        );

        let mut detector = Self {
            config,
            driver,
            handle: None,
            capture: CaptureBuffer::new(window),
            conditioner,
            gate,
            extractor,
            live_wave: Vec::with_capacity(window),
            live: Spectrum::zeroed(window / 2),
            matcher,
            profiles: ProfileSet::with_noise(),
            strategy,
            events: EventBus::new(),
        };
        detector.sync_score_history();
        Ok(detector)
    }

    /// Replace the tick strategy
    pub fn set_strategy(&mut self, strategy: Box<dyn DetectionStrategy>) {
        debug!("Switching strategy to {}", strategy.name());
        self.strategy = strategy;
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Start looping capture on the configured device
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let device = self.config.capture.device.clone().unwrap_or_default();
        let handle = self.driver.start_capture(
            &device,
            true,
            self.config.capture.capture_secs,
            self.config.capture.sample_rate,
        )?;

        let position = self.driver.write_position(&handle.device);
        self.capture.arm(position)?;
        self.conditioner.reset();
        info!("Capture started on '{}'", handle.device);
        self.handle = Some(handle);
        Ok(())
    }

    /// Stop capturing
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.driver.stop_capture(&handle.device);
            self.capture.disarm();
            info!("Capture stopped on '{}'", handle.device);
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn subscribe(&mut self) -> Receiver<DetectionEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    pub fn profiles_mut(&mut self) -> &mut ProfileSet {
        &mut self.profiles
    }

    pub fn matcher(&self) -> &WordMatcher {
        &self.matcher
    }

    pub fn matcher_mut(&mut self) -> &mut WordMatcher {
        &mut self.matcher
    }

    pub fn extractor_mut(&mut self) -> &mut SpectrumExtractor {
        &mut self.extractor
    }

    /// Spectrum of the most recent capture
    pub fn live_spectrum(&self) -> &Spectrum {
        &self.live
    }

    /// Poll the driver and run one strategy step
    pub fn tick(&mut self) -> Result<TickOutcome> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Result<TickOutcome> {
        if self.handle.is_none() {
            return Ok(TickOutcome::Idle);
        }
        // Profiles pushed through profiles_mut() since the last tick
        self.sync_score_history();

        let (position, fresh) = self.refresh()?;
        if fresh {
            self.capture.rotate_into(position, &mut self.live_wave)?;
            if self.config.detection.normalize_wave {
                normalize_wave(&mut self.live_wave, self.config.detection.normalize_mode);
            }
            self.extractor
                .compute_spectrum_into(&self.live_wave, &mut self.live)?;

            if self.events.has_subscribers() {
                self.events.publish(DetectionEvent::SpectrumChanged {
                    spectrum: Arc::new(self.live.clone()),
                });
            }
        }

        let mut ctx = TickContext {
            now,
            position,
            fresh,
            live: &self.live,
            capture: &mut self.capture,
            profiles: &mut self.profiles,
            matcher: &mut self.matcher,
            extractor: &mut self.extractor,
        };
        let outcome = self.strategy.on_tick(&mut ctx)?;

        match &outcome {
            TickOutcome::Matched(detection) => {
                if let Some(event) = detection.event() {
                    self.events.publish(event);
                }
            }
            TickOutcome::Recorded(word) => {
                self.stamp_recording(word.index);
                self.clear_driver()?;
            }
            TickOutcome::Idle | TickOutcome::Holding { .. } => {}
        }
        Ok(outcome)
    }

    /// Begin recording the word at `index` from the current write head
    pub fn press_to_record(&mut self, index: usize) -> bool {
        let Some(handle) = &self.handle else {
            warn!("Cannot record while capture is stopped");
            return false;
        };
        if index >= self.profiles.len() {
            warn!("No profile at index {}", index);
            return false;
        }

        let position = self.driver.write_position(&handle.device);
        self.strategy.press(index, position, Instant::now())
    }

    /// Finish the recording started by [`press_to_record`](Self::press_to_record)
    pub fn release_record(&mut self) -> Result<Option<RecordedWord>> {
        if self.handle.is_none() {
            return Ok(None);
        }

        let (position, _) = self.refresh()?;
        let mut ctx = TickContext {
            now: Instant::now(),
            position,
            fresh: false,
            live: &self.live,
            capture: &mut self.capture,
            profiles: &mut self.profiles,
            matcher: &mut self.matcher,
            extractor: &mut self.extractor,
        };
        let recorded = self.strategy.release(&mut ctx)?;
        if let Some(word) = &recorded {
            self.stamp_recording(word.index);
            self.clear_driver()?;
        }
        Ok(recorded)
    }

    /// Replace the profiles with a bulk file. Failures are logged and keep
    /// the current profiles.
    pub fn load_profiles(&mut self, path: &Path) -> bool {
        match self.profiles.load_file(path, &mut self.extractor) {
            Ok(_) => {
                self.after_load();
                true
            }
            Err(e) => {
                error!("Failed to load profiles from {}: {}", path.display(), e);
                false
            }
        }
    }

    pub fn save_profiles(&self, path: &Path) -> bool {
        match self.profiles.save_file(path) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to save profiles to {}: {}", path.display(), e);
                false
            }
        }
    }

    pub fn load_profiles_prefs<S: PreferenceStore + ?Sized>(&mut self, store: &S, key: &str) -> bool {
        match load_profiles_prefs(store, key, &mut self.extractor) {
            Ok(set) => {
                self.profiles = set;
                self.after_load();
                true
            }
            Err(e) => {
                error!("Failed to load profiles from preference key '{}': {}", key, e);
                false
            }
        }
    }

    pub fn save_profiles_prefs<S: PreferenceStore + ?Sized>(&self, store: &mut S, key: &str) -> bool {
        match save_profiles_prefs(store, key, &self.profiles) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to save profiles under preference key '{}': {}", key, e);
                false
            }
        }
    }

    /// Poll the write head and fetch, filter and gate new samples
    fn refresh(&mut self) -> Result<(usize, bool)> {
        let Some(handle) = &self.handle else {
            return Ok((0, false));
        };

        let position = self.driver.write_position(&handle.device);
        if self.capture.state() == CaptureState::Idle {
            self.capture.arm(position)?;
        }
        if !self.capture.poll(position)? {
            return Ok((position, false));
        }

        self.driver
            .read_samples(handle, 0, self.capture.samples_mut())?;
        if self.conditioner.is_active() {
            // The whole window is re-read, so filter it from a clean state
            self.conditioner.reset();
            self.conditioner.process(self.capture.samples_mut());
        }

        if let Some(gate) = self.gate {
            let spectrum = self.extractor.compute_spectrum(self.capture.samples())?;
            if !gate.is_open(&spectrum) {
                debug!("Gate closed, peak {:.3}", spectrum.peak_magnitude());
                self.capture.samples_mut().fill(0.0);
            }
        }

        Ok((position, true))
    }

    /// Stored spectra are recomputed from raw waves, so noise has to be
    /// subtracted again after every load
    fn after_load(&mut self) {
        self.matcher.reset();
        self.sync_score_history();
        if self.config.detection.remove_spectrum_noise {
            self.profiles.subtract_noise_from_all();
        }
    }

    fn score_window(&self) -> Option<Duration> {
        self.config.detection.score_window_ms.map(Duration::from_millis)
    }

    /// Give every profile a score history when a window is configured
    fn sync_score_history(&mut self) {
        let Some(window) = self.score_window() else {
            return;
        };
        for profile in self.profiles.iter_mut() {
            if !profile.has_score_history() {
                profile.enable_score_history(window);
            }
        }
    }

    fn stamp_recording(&mut self, index: usize) {
        let sample_rate = self.config.capture.sample_rate;
        let window = self.score_window();
        if let Some(profile) = self.profiles.get_mut(index) {
            profile.channels = 1;
            profile.sample_rate = sample_rate;
            // Scores of the previous recording no longer apply
            if let Some(window) = window {
                profile.enable_score_history(window);
            }
        }
    }

    fn clear_driver(&mut self) -> Result<()> {
        if let Some(handle) = &self.handle {
            self.driver.clear_samples(handle)?;
        }
        Ok(())
    }
}

impl<D: MicrophoneDriver> Drop for WordDetector<D> {
    fn drop(&mut self) {
        self.stop();
    }
}
