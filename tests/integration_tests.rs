//! Integration tests for word-spectra

use std::f32::consts::PI;
use std::time::{Duration, Instant};

use word_spectra::capture::trim_len;
use word_spectra::detect::{band_score, ContinuousDetection, TickOutcome};
use word_spectra::dsp::subtract_noise_from_spectrum;
use word_spectra::profile::{load_profiles_prefs, save_profiles_prefs, MemoryPreferences};
use word_spectra::{
    Config, DetectionEvent, DetectionMode, FourierTransform, MemoryMicrophone, ProfileSet,
    SpectrumExtractor, WordDetector, WordMatcher, WordProfile, NOISE_LABEL,
};

const SAMPLE_RATE: u32 = 2048;
const WINDOW: usize = 2048;

/// Generate a pure tone
fn generate_tone(frequency: f32, amplitude: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * PI * frequency * t).sin()
        })
        .collect()
}

/// Generate near-silence
fn generate_silence(len: usize) -> Vec<f32> {
    generate_tone(100.0, 0.001, len)
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.capture.sample_rate = SAMPLE_RATE;
    config.capture.capture_secs = 1;
    config
}

/// Noise and Go profiles recorded at the test rate
fn noise_and_go(extractor: &mut SpectrumExtractor) -> ProfileSet {
    let mut set = ProfileSet::new();
    set.push(
        WordProfile::with_wave(NOISE_LABEL, generate_silence(WINDOW), 1, SAMPLE_RATE, extractor)
            .unwrap(),
    );
    set.push(
        WordProfile::with_wave("Go", generate_tone(440.0, 0.5, WINDOW), 1, SAMPLE_RATE, extractor)
            .unwrap(),
    );
    set
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("word-spectra-{}-{}", std::process::id(), name))
}

#[test]
fn test_constant_signal_has_full_length_dc() {
    let mut fft = FourierTransform::default();
    let samples = vec![0.25; 64];
    let mut real = vec![0.0; 32];
    let mut imag = vec![0.0; 32];
    fft.forward(&samples, &mut real, &mut imag).unwrap();

    assert!((real[0] - 16.0).abs() < 1e-4, "DC = {}", real[0]);
    assert!(real[1..].iter().all(|v| v.abs() < 1e-4));
}

#[test]
fn test_circular_trim_arithmetic() {
    assert_eq!(trim_len(8, 6, 2), 4);
    assert_eq!(trim_len(8, 2, 6), 4);
    assert_eq!(trim_len(8, 3, 3), 0);
}

#[test]
fn test_matcher_selects_noise_then_go() {
    let mut extractor = SpectrumExtractor::default();
    let mut profiles = noise_and_go(&mut extractor);
    let mut matcher = WordMatcher::new(60).unwrap();

    let silent = extractor.compute_spectrum(&vec![0.0; WINDOW]).unwrap();
    let detection = matcher.detect_best_match(&silent, &mut profiles).unwrap();
    assert_eq!(detection.best.index, 0);
    assert!(!detection.changed, "index 0 is the starting best");
    assert!(detection.event().is_none());

    let tone = extractor
        .compute_spectrum(&generate_tone(440.0, 0.4, WINDOW))
        .unwrap();
    let detection = matcher.detect_best_match(&tone, &mut profiles).unwrap();
    assert_eq!(detection.best.label, "Go");
    assert!(detection.changed);

    let detection = matcher.detect_best_match(&tone, &mut profiles).unwrap();
    assert!(!detection.changed);
    assert!(detection.event().is_none());
    assert_eq!(matcher.closest_index(), 1);
}

#[test]
fn test_constant_offset_does_not_change_score() {
    let mut extractor = SpectrumExtractor::default();
    let profiles = noise_and_go(&mut extractor);
    let go = profiles.get(1).unwrap().spectrum().unwrap();

    let biased: Vec<f32> = generate_tone(440.0, 0.5, WINDOW)
        .into_iter()
        .map(|s| s + 0.05)
        .collect();
    let live = extractor.compute_spectrum(&biased).unwrap();
    assert!(live.real[0] > 100.0);

    let score = band_score(&live.real, &go.real, 60);
    assert!(score < 1e-3, "score = {}", score);

    let mut matcher = WordMatcher::new(60).unwrap();
    let mut profiles = profiles;
    let detection = matcher.detect_best_match(&live, &mut profiles).unwrap();
    assert_eq!(detection.best.label, "Go");
}

#[test]
fn test_gate_ignores_offset_and_opens_on_tone() {
    let mut config = test_config();
    config.filter.enable_gate = true;
    config.filter.gate_threshold = 0.2;
    let mut detector = WordDetector::new(config, MemoryMicrophone::new()).unwrap();
    detector.start().unwrap();

    // Biased near-silence: a large DC bin and nothing above it
    let offset: Vec<f32> = generate_tone(440.0, 0.0001, WINDOW + 256)
        .into_iter()
        .map(|s| s + 0.05)
        .collect();
    detector.driver().push(&offset);
    detector.tick().unwrap();
    let live = detector.live_spectrum();
    assert!(live.real.iter().chain(&live.imag).all(|&v| v == 0.0));

    detector.driver().push(&generate_tone(440.0, 0.5, WINDOW + 256));
    detector.tick().unwrap();
    assert!(detector.live_spectrum().peak_magnitude() > 1.0);
}

#[test]
fn test_detector_reports_only_changes() {
    let mut detector = WordDetector::new(test_config(), MemoryMicrophone::new()).unwrap();
    {
        let mut extractor = SpectrumExtractor::default();
        *detector.profiles_mut() = noise_and_go(&mut extractor);
    }
    let events = detector.subscribe();
    detector.start().unwrap();

    // Replay a full window of tone, then a full window of silence
    let tone = generate_tone(440.0, 0.5, WINDOW);
    let silence = vec![0.0; WINDOW];
    for chunk in tone.chunks(256).chain(silence.chunks(256)) {
        detector.driver().push(chunk);
        detector.tick().unwrap();
    }
    // No new samples: nothing is matched
    assert_eq!(detector.tick().unwrap(), TickOutcome::Idle);

    let words: Vec<_> = events
        .try_iter()
        .filter_map(|event| match event {
            DetectionEvent::WordDetected { previous, current } => Some((previous, current)),
            DetectionEvent::SpectrumChanged { .. } => None,
        })
        .collect();

    assert!(words.len() >= 2, "expected Go then Noise, got {:?}", words);
    for pair in words.windows(2) {
        assert_ne!(pair[0].1.index, pair[1].1.index);
    }
    let (previous, last) = words.last().unwrap();
    assert_eq!(last.label, NOISE_LABEL);
    assert_eq!(previous.as_ref().map(|p| p.label.as_str()), Some("Go"));
    assert!(words.iter().any(|(_, word)| word.label == "Go"));
}

#[test]
fn test_profile_file_round_trip() {
    let mut extractor = SpectrumExtractor::default();
    let set = noise_and_go(&mut extractor);
    let path = temp_path("round-trip.bin");
    set.save_file(&path).unwrap();

    let mut loaded = ProfileSet::new();
    assert_eq!(loaded.load_file(&path, &mut extractor).unwrap(), 2);
    for (original, restored) in set.iter().zip(loaded.iter()) {
        assert_eq!(original.label, restored.label);
        assert_eq!(original.sample_rate, restored.sample_rate);
        assert_eq!(original.wave(), restored.wave());
        let expected = extractor.compute_spectrum(original.wave().unwrap()).unwrap();
        assert_eq!(restored.spectrum(), Some(&expected));
    }

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_preferences_round_trip() {
    let mut extractor = SpectrumExtractor::default();
    let set = noise_and_go(&mut extractor);
    let mut prefs = MemoryPreferences::new();
    save_profiles_prefs(&mut prefs, "words", &set).unwrap();

    let loaded = load_profiles_prefs(&prefs, "words", &mut extractor).unwrap();
    assert_eq!(loaded.labels(), vec![NOISE_LABEL, "Go"]);
    assert_eq!(loaded.get(1).unwrap().wave(), set.get(1).unwrap().wave());
    assert!(load_profiles_prefs(&prefs, "other", &mut extractor).is_err());
}

#[test]
fn test_loaded_profiles_have_noise_removed() {
    let mut extractor = SpectrumExtractor::default();
    let set = noise_and_go(&mut extractor);
    let path = temp_path("noise.bin");
    set.save_file(&path).unwrap();

    let mut config = test_config();
    config.detection.remove_spectrum_noise = true;
    let mut detector = WordDetector::new(config, MemoryMicrophone::new()).unwrap();
    assert!(detector.load_profiles(&path));

    let noise = set.get(0).unwrap().spectrum().unwrap();
    let mut expected = set.get(1).unwrap().spectrum().unwrap().real.clone();
    subtract_noise_from_spectrum(&noise.real, &mut expected).unwrap();

    let go = detector.profiles().get(1).unwrap().spectrum().unwrap();
    assert_eq!(go.real, expected);
    assert!(go.real.iter().all(|&v| v >= 0.0));
    // The noise profile itself is untouched
    assert_eq!(detector.profiles().get(0).unwrap().spectrum(), Some(noise));

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_push_to_talk_records_word() {
    let mut config = test_config();
    config.detection.mode = DetectionMode::PushToTalk;
    let mut detector = WordDetector::new(config, MemoryMicrophone::new()).unwrap();
    let index = detector.profiles_mut().push(WordProfile::new("Go"));
    detector.start().unwrap();

    detector.driver().push(&generate_silence(300));
    assert!(detector.press_to_record(index));

    let word = generate_tone(440.0, 0.5, 512);
    detector.driver().push(&word);
    assert_eq!(detector.tick().unwrap(), TickOutcome::Holding { index });

    let recorded = detector.release_record().unwrap().unwrap();
    assert_eq!(recorded.label, "Go");
    assert_eq!(recorded.samples, 512);
    assert!(!recorded.timed_out);

    let profile = detector.profiles().get(index).unwrap();
    let wave = profile.wave().unwrap();
    assert_eq!(wave.len(), WINDOW);
    assert_eq!(&wave[..512], word.as_slice());
    assert!(wave[512..].iter().all(|&s| s == 0.0));
    assert!(profile.has_spectrum());
    assert_eq!(profile.sample_rate, SAMPLE_RATE);

    // Nothing left to release
    assert!(detector.release_record().unwrap().is_none());
}

#[test]
fn test_push_to_talk_times_out() {
    let mut config = test_config();
    config.detection.mode = DetectionMode::PushToTalk;
    let mut detector = WordDetector::new(config, MemoryMicrophone::new()).unwrap();
    let index = detector.profiles_mut().push(WordProfile::new("Stop"));
    detector.start().unwrap();

    assert!(detector.press_to_record(index));
    detector.driver().push(&generate_tone(220.0, 0.3, 1024));

    let later = Instant::now() + Duration::from_secs(2);
    match detector.tick_at(later).unwrap() {
        TickOutcome::Recorded(word) => {
            assert!(word.timed_out);
            assert_eq!(word.samples, 1024);
        }
        other => panic!("expected a timed out recording, got {:?}", other),
    }

    // Continue matching with the new profile
    detector.set_strategy(Box::new(ContinuousDetection));
    assert_eq!(detector.strategy_name(), "continuous");
}
