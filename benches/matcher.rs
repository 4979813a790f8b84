//! Benchmarks for banded word matching

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use word_spectra::detect::band_score;
use word_spectra::{ProfileSet, SpectrumExtractor, WordMatcher, WordProfile};

const SAMPLE_RATE: u32 = 8192;

fn generate_tone(frequency: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            0.5 * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

fn profiles(count: usize, extractor: &mut SpectrumExtractor) -> ProfileSet {
    let mut set = ProfileSet::new();
    for i in 0..count {
        let wave = generate_tone(200.0 + 50.0 * i as f32, SAMPLE_RATE as usize);
        let profile =
            WordProfile::with_wave(format!("word{}", i), wave, 1, SAMPLE_RATE, extractor).unwrap();
        set.push(profile);
    }
    set
}

fn bench_band_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("band_score");

    let mut extractor = SpectrumExtractor::default();
    let live = extractor
        .compute_spectrum(&generate_tone(440.0, SAMPLE_RATE as usize))
        .unwrap();
    let profile = extractor
        .compute_spectrum(&generate_tone(450.0, SAMPLE_RATE as usize))
        .unwrap();

    for band_width in [1usize, 60, 512] {
        group.bench_with_input(
            BenchmarkId::new("4096_bins", band_width),
            &band_width,
            |b, &band_width| b.iter(|| black_box(band_score(&live.real, &profile.real, band_width))),
        );
    }

    group.finish();
}

fn bench_detect_best_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_best_match");

    let mut extractor = SpectrumExtractor::default();
    let live = extractor
        .compute_spectrum(&generate_tone(440.0, SAMPLE_RATE as usize))
        .unwrap();

    for count in [2usize, 8, 32] {
        let mut set = profiles(count, &mut extractor);
        let mut matcher = WordMatcher::new(60).unwrap();

        group.bench_function(BenchmarkId::new("profiles", count), |b| {
            b.iter(|| black_box(matcher.detect_best_match(&live, &mut set)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_band_score, bench_detect_best_match);
criterion_main!(benches);
