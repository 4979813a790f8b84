//! Word Spectra CLI Application

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use word_spectra::dsp::normalize_wave;
use word_spectra::{
    Config, CpalMicrophone, DetectionEvent, DetectionMode, MemoryMicrophone, MicrophoneDriver,
    OutputFormat, OutputWriter, ProfileSet, SpectrumExtractor, TableCache, TickOutcome,
    WordDetector, WordProfile,
};

/// Spectral keyword spotting
#[derive(Parser)]
#[command(name = "word-spectra")]
#[command(about = "Detect recorded words in live microphone audio", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List available audio input devices
    Devices,

    /// Detect words from the microphone until Ctrl+C
    Listen {
        /// Audio input device name (uses default if not specified)
        #[arg(short, long)]
        device: Option<String>,

        /// Profile file
        #[arg(short, long)]
        profiles: Option<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Disable console output
        #[arg(long)]
        no_console: bool,
    },

    /// Record a word profile from a WAV file or the microphone
    Record {
        /// Profile label
        #[arg(short, long)]
        label: Option<String>,

        /// WAV file to take the word from (records from the microphone if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Profile file
        #[arg(short, long)]
        profiles: Option<PathBuf>,

        /// Record the background-noise profile
        #[arg(long)]
        noise: bool,

        /// Microphone recording length in seconds (at most the capture window)
        #[arg(short, long)]
        seconds: Option<f32>,

        /// Audio input device name
        #[arg(short = 'D', long)]
        device: Option<String>,
    },

    /// Replay a WAV file through the detector and print word transitions
    Detect {
        /// Input WAV file path
        input: PathBuf,

        /// Profile file
        #[arg(short, long)]
        profiles: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Inspect or edit a profile file
    Profiles {
        /// Profile file
        #[arg(short, long)]
        profiles: Option<PathBuf>,

        #[command(subcommand)]
        action: Option<ProfileAction>,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List stored profiles
    List,
    /// Remove the profile at INDEX
    Remove { index: usize },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging - quiet by default, use -v for more
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    // Load configuration
    let mut config = if let Some(ref config_path) = cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Devices => list_devices(),
        Commands::Listen {
            device,
            profiles,
            output,
            format,
            no_console,
        } => {
            // Apply CLI overrides
            if let Some(device) = device {
                config.capture.device = Some(device);
            }
            if let Some(profiles) = profiles {
                config.profiles.path = profiles;
            }
            if let Some(output) = output {
                config.output.output_path = Some(output);
            }
            config.output.format = parse_format(&format)?;
            config.output.enable_console = !no_console;
            config.detection.mode = DetectionMode::Continuous;

            run_listen(config)
        }
        Commands::Record {
            label,
            input,
            profiles,
            noise,
            seconds,
            device,
        } => {
            if let Some(profiles) = profiles {
                config.profiles.path = profiles;
            }
            if let Some(device) = device {
                config.capture.device = Some(device);
            }
            let label = match (label, noise) {
                (Some(label), _) => label,
                (None, true) => word_spectra::NOISE_LABEL.to_string(),
                (None, false) => bail!("--label is required unless --noise is given"),
            };

            match input {
                Some(input) => record_from_wav(config, &label, noise, &input),
                None => record_live(config, &label, noise, seconds),
            }
        }
        Commands::Detect {
            input,
            profiles,
            format,
        } => {
            if let Some(profiles) = profiles {
                config.profiles.path = profiles;
            }
            config.output.format = parse_format(&format)?;
            config.detection.mode = DetectionMode::Continuous;
            // Replay always runs on the in-memory microphone
            config.capture.device = None;
            detect_file(config, &input)
        }
        Commands::Profiles { profiles, action } => {
            if let Some(profiles) = profiles {
                config.profiles.path = profiles;
            }
            match action.unwrap_or(ProfileAction::List) {
                ProfileAction::List => list_profiles(&config),
                ProfileAction::Remove { index } => remove_profile(&config, index),
            }
        }
    }
}

fn parse_format(format: &str) -> Result<OutputFormat> {
    format
        .parse::<OutputFormat>()
        .with_context(|| format!("Unknown output format '{}'", format))
}

/// Statistics for a listening session
struct ListenStats {
    ticks: u64,
    detections: u64,
    errors: u64,
    start_time: Instant,
}

impl ListenStats {
    fn new() -> Self {
        Self {
            ticks: 0,
            detections: 0,
            errors: 0,
            start_time: Instant::now(),
        }
    }

    fn log_summary(&self) {
        let duration = self.start_time.elapsed();
        info!(
            "Session complete: {} ticks, {} detections, {} errors, duration: {:.1}s",
            self.ticks,
            self.detections,
            self.errors,
            duration.as_secs_f32()
        );
    }
}

/// Write every pending word transition
fn drain_events(
    events: &crossbeam_channel::Receiver<DetectionEvent>,
    output: &mut OutputWriter,
    offset_ms: i64,
    stats: &mut ListenStats,
) {
    while let Ok(event) = events.try_recv() {
        if let DetectionEvent::WordDetected { .. } = event {
            stats.detections += 1;
            if let Err(e) = output.write(&event, offset_ms) {
                error!("Failed to write output: {}", e);
            }
        }
    }
}

fn install_ctrlc() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;
    Ok(running)
}

/// Load the configured profile file, or start with only a noise profile
fn load_or_new_profiles(config: &Config, extractor: &mut SpectrumExtractor) -> Result<ProfileSet> {
    let path = &config.profiles.path;
    let mut set = ProfileSet::with_noise();
    if path.exists() {
        set.load_file(path, extractor)
            .with_context(|| format!("Failed to load profiles from {}", path.display()))?;
    } else {
        info!("{} does not exist yet, starting with a noise profile", path.display());
    }
    Ok(set)
}

/// Run live detection on the microphone
fn run_listen(config: Config) -> Result<()> {
    info!("Starting live detection");
    let running = install_ctrlc()?;

    let mut output =
        OutputWriter::new(config.output.clone()).context("Failed to create output writer")?;
    let poll_interval = Duration::from_millis(config.capture.poll_interval_ms);
    let profiles_path = config.profiles.path.clone();

    let mut detector = WordDetector::new(config, CpalMicrophone::new())
        .context("Failed to create word detector")?;
    if !detector.load_profiles(&profiles_path) {
        bail!("No usable profiles in {}", profiles_path.display());
    }
    info!("Matching against: {}", detector.profiles().labels().join(", "));

    let events = detector.subscribe();
    detector.start().context("Failed to start capture")?;
    println!("Listening... Press Ctrl+C to stop");

    let mut stats = ListenStats::new();
    while running.load(Ordering::SeqCst) {
        stats.ticks += 1;
        if let Err(e) = detector.tick() {
            stats.errors += 1;
            warn!("Tick failed: {}", e);
        }

        let offset_ms = stats.start_time.elapsed().as_millis() as i64;
        drain_events(&events, &mut output, offset_ms, &mut stats);
        std::thread::sleep(poll_interval);
    }

    detector.stop();
    output.flush()?;
    stats.log_summary();
    Ok(())
}

/// List available audio input devices
fn list_devices() -> Result<()> {
    let microphone = CpalMicrophone::new();
    let devices = microphone.devices()?;

    if devices.is_empty() {
        println!("No audio input devices found");
    } else {
        println!("Available audio input devices:");
        for (i, name) in devices.iter().enumerate() {
            println!("  {}. {}", i + 1, name);
        }
    }

    Ok(())
}

/// Read a WAV file as mono samples
fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file {}", path.display()))?;

    let spec = reader.spec();
    info!(
        "WAV format: {} channels, {} Hz, {} bits",
        spec.channels, spec.sample_rate, spec.bits_per_sample
    );

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().filter_map(|s| s.ok()).collect(),
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f32 / max_val)
                .collect()
        }
    };

    // Convert to mono if stereo
    let channels = spec.channels as usize;
    let mono = if channels > 1 {
        samples
            .chunks(channels)
            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        samples
    };

    Ok((mono, spec.sample_rate))
}

/// Truncate or zero-pad to exactly `len` samples
fn fit_window(mut samples: Vec<f32>, len: usize) -> Vec<f32> {
    if samples.len() > len {
        warn!("Input has {} samples, keeping the first {}", samples.len(), len);
    }
    samples.resize(len, 0.0);
    samples
}

/// Add or replace a profile from a WAV file
fn record_from_wav(config: Config, label: &str, noise: bool, input: &Path) -> Result<()> {
    let (samples, sample_rate) = read_wav(input)?;
    if sample_rate != config.capture.sample_rate {
        warn!(
            "{} is {} Hz but capture runs at {} Hz; spectra will not line up",
            input.display(),
            sample_rate,
            config.capture.sample_rate
        );
    }

    let mut extractor =
        SpectrumExtractor::with_cache(TableCache::new(config.fft.table_cache_capacity));
    let mut set = load_or_new_profiles(&config, &mut extractor)?;

    let mut wave = fit_window(samples, config.capture.window_len());
    if config.detection.normalize_wave && !noise {
        normalize_wave(&mut wave, config.detection.normalize_mode);
    }

    let index = if noise {
        if set.is_empty() {
            set.push(WordProfile::new(label));
        }
        0
    } else {
        match set.find_by_label(label) {
            Some((index, _)) => index,
            None => set.push(WordProfile::new(label)),
        }
    };

    set.replace_wave(index, wave, &mut extractor)
        .with_context(|| format!("Failed to compute spectrum for '{}'", label))?;
    if let Some(profile) = set.get_mut(index) {
        profile.sample_rate = sample_rate;
        profile.channels = 1;
    }

    set.save_file(&config.profiles.path)
        .with_context(|| format!("Failed to save {}", config.profiles.path.display()))?;
    println!("Stored '{}' as profile {} in {}", label, index, config.profiles.path.display());
    Ok(())
}

/// Record a profile from the microphone with push-to-talk
fn record_live(mut config: Config, label: &str, noise: bool, seconds: Option<f32>) -> Result<()> {
    let running = install_ctrlc()?;
    config.detection.mode = DetectionMode::PushToTalk;
    let window_secs = config.capture.capture_secs as f32;
    let hold = Duration::from_secs_f32(seconds.unwrap_or(window_secs).min(window_secs).max(0.1));
    let poll_interval = Duration::from_millis(config.capture.poll_interval_ms);
    let profiles_path = config.profiles.path.clone();

    let mut detector = WordDetector::new(config, CpalMicrophone::new())
        .context("Failed to create word detector")?;
    if profiles_path.exists() && !detector.load_profiles(&profiles_path) {
        bail!("Refusing to overwrite unreadable {}", profiles_path.display());
    }

    let index = if noise {
        0
    } else {
        match detector.profiles().find_by_label(label) {
            Some((index, _)) => index,
            None => detector.profiles_mut().push(WordProfile::new(label)),
        }
    };

    detector.start().context("Failed to start capture")?;
    // Let the device deliver its first buffer
    std::thread::sleep(poll_interval);
    detector.tick()?;

    if !detector.press_to_record(index) {
        bail!("Could not start recording profile {}", index);
    }
    println!("Recording '{}' for {:.1}s... Press Ctrl+C to stop early", label, hold.as_secs_f32());

    let started = Instant::now();
    let mut recorded = None;
    while running.load(Ordering::SeqCst) && started.elapsed() < hold {
        if let TickOutcome::Recorded(word) = detector.tick()? {
            recorded = Some(word);
            break;
        }
        std::thread::sleep(poll_interval);
    }

    let recorded = match recorded {
        Some(word) => word,
        None => detector
            .release_record()?
            .context("Recording was not in progress")?,
    };
    detector.stop();
    debug!("Recorded {:?}", recorded);

    if !detector.save_profiles(&profiles_path) {
        bail!("Failed to save {}", profiles_path.display());
    }
    println!(
        "Stored '{}' ({} samples) as profile {} in {}",
        recorded.label,
        recorded.samples,
        recorded.index,
        profiles_path.display()
    );
    Ok(())
}

/// Replay a WAV file through an in-memory microphone
fn detect_file(config: Config, input: &Path) -> Result<()> {
    let (samples, sample_rate) = read_wav(input)?;
    if sample_rate != config.capture.sample_rate {
        warn!(
            "{} is {} Hz but capture runs at {} Hz",
            input.display(),
            sample_rate,
            config.capture.sample_rate
        );
    }

    let mut output =
        OutputWriter::new(config.output.clone()).context("Failed to create output writer")?;
    let chunk_len = ((config.capture.sample_rate as u64 * config.capture.poll_interval_ms) / 1000)
        .max(1) as usize;
    let profiles_path = config.profiles.path.clone();

    let mut detector = WordDetector::new(config, MemoryMicrophone::new())
        .context("Failed to create word detector")?;
    if !detector.load_profiles(&profiles_path) {
        bail!("No usable profiles in {}", profiles_path.display());
    }

    let events = detector.subscribe();
    detector.start()?;

    let mut stats = ListenStats::new();
    for (i, chunk) in samples.chunks(chunk_len).enumerate() {
        detector.driver().push(chunk);
        stats.ticks += 1;
        if let Err(e) = detector.tick() {
            stats.errors += 1;
            warn!("Tick failed: {}", e);
        }

        let offset_ms = (i * chunk_len) as i64 * 1000 / sample_rate.max(1) as i64;
        drain_events(&events, &mut output, offset_ms, &mut stats);
    }

    detector.stop();
    output.flush()?;
    stats.log_summary();
    Ok(())
}

fn list_profiles(config: &Config) -> Result<()> {
    let mut extractor = SpectrumExtractor::default();
    let set = load_or_new_profiles(config, &mut extractor)?;

    println!("Profiles in {}:", config.profiles.path.display());
    for (i, profile) in set.iter().enumerate() {
        let samples = profile.wave().map_or(0, <[f32]>::len);
        let status = if profile.has_spectrum() { "" } else { " (unranked)" };
        println!(
            "  {}. {} - {} samples @ {} Hz{}",
            i, profile.label, samples, profile.sample_rate, status
        );
    }
    Ok(())
}

fn remove_profile(config: &Config, index: usize) -> Result<()> {
    let mut extractor = SpectrumExtractor::default();
    let mut set = load_or_new_profiles(config, &mut extractor)?;
    if index == 0 {
        warn!("Removing the noise profile; the next profile becomes the noise reference");
    }

    let removed = set.remove(index)?;
    set.save_file(&config.profiles.path)?;
    println!("Removed '{}'", removed.label);
    Ok(())
}
