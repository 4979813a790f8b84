//! Real-input radix-2 FFT with cached transform tables
//!
//! The transform packs `N` real samples into `N/2` complex values, runs an
//! in-place decimation-in-time butterfly pass, then separates the even/odd
//! spectra ("unzip") to obtain the half spectrum of the real input.
//!
//! Output bin 0 carries two real values: the DC component in its real part
//! and the Fs/2 (Nyquist) component in its imaginary part. Callers that need
//! the Nyquist value must unpack it from `imag[0]`.
//!
//! Scaling follows the textbook DFT: the forward pass is unnormalised (a
//! constant signal of amplitude `a` yields `a * N` in the DC bin) and the
//! inverse halves the data at the unzip step and at every butterfly stage.

use parking_lot::Mutex;
use std::f32::consts::PI;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::DspError;

/// Number of transform tables kept by a default cache
pub const DEFAULT_TABLE_CACHE_CAPACITY: usize = 10;

/// Bit-reversal permutation and twiddle table for one transform length
#[derive(Debug)]
pub struct TransformTables {
    len: usize,
    points: usize,
    bit_reversed: Vec<usize>,
    sin_table: Vec<f32>,
}

impl TransformTables {
    /// Build the tables for a real transform of `len` samples
    pub fn new(len: usize) -> Result<Self, DspError> {
        check_length(len)?;

        let points = len / 2;
        let mut bit_reversed = vec![0usize; points];
        let mut sin_table = vec![0.0f32; len];

        for (i, slot) in bit_reversed.iter_mut().enumerate() {
            let mut temp = 0;
            let mut mask = points / 2;
            while mask > 0 {
                temp = (temp >> 1) + if i & mask != 0 { points } else { 0 };
                mask >>= 1;
            }
            *slot = temp;
        }

        for (i, &br) in bit_reversed.iter().enumerate() {
            let angle = 2.0 * PI * i as f32 / (2 * points) as f32;
            sin_table[br] = -angle.sin();
            sin_table[br + 1] = -angle.cos();
        }

        Ok(Self {
            len,
            points,
            bit_reversed,
            sin_table,
        })
    }

    /// Number of real samples the tables were built for
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of complex points (`len / 2`)
    pub fn points(&self) -> usize {
        self.points
    }

    pub fn bit_reversed(&self) -> &[usize] {
        &self.bit_reversed
    }

    pub fn sin_table(&self) -> &[f32] {
        &self.sin_table
    }
}

fn check_length(len: usize) -> Result<(), DspError> {
    if len < 4 || !len.is_power_of_two() {
        return Err(DspError::InvalidLength(len));
    }
    Ok(())
}

struct CacheSlot {
    tables: Arc<TransformTables>,
    leases: usize,
}

struct TablePool {
    capacity: usize,
    slots: Vec<CacheSlot>,
}

/// Bounded, reference-counted pool of transform tables keyed by length.
///
/// Cloning the cache yields another handle on the same pool.
#[derive(Clone)]
pub struct TableCache {
    inner: Arc<Mutex<TablePool>>,
}

impl TableCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TablePool {
                capacity,
                slots: Vec::with_capacity(capacity),
            })),
        }
    }

    /// Lease the tables for `len`, building them on first use.
    ///
    /// When every slot holds another length the tables are built uncached and
    /// discarded once the lease is dropped.
    pub fn checkout(&self, len: usize) -> Result<TableLease, DspError> {
        let mut pool = self.inner.lock();

        if let Some(slot) = pool.slots.iter_mut().find(|s| s.tables.len() == len) {
            slot.leases += 1;
            return Ok(TableLease {
                tables: Arc::clone(&slot.tables),
                cache: Some(self.clone()),
            });
        }

        let tables = Arc::new(TransformTables::new(len)?);

        if pool.slots.len() < pool.capacity {
            debug!("Caching transform tables for length {}", len);
            pool.slots.push(CacheSlot {
                tables: Arc::clone(&tables),
                leases: 1,
            });
            Ok(TableLease {
                tables,
                cache: Some(self.clone()),
            })
        } else {
            debug!(
                "Transform table cache full ({} entries), using uncached tables for length {}",
                pool.capacity, len
            );
            Ok(TableLease {
                tables,
                cache: None,
            })
        }
    }

    fn release(&self, tables: &Arc<TransformTables>) {
        let mut pool = self.inner.lock();
        if let Some(slot) = pool
            .slots
            .iter_mut()
            .find(|s| Arc::ptr_eq(&s.tables, tables))
        {
            slot.leases = slot.leases.saturating_sub(1);
        }
    }

    /// Drop every cached table that has no outstanding lease.
    /// Returns the number of evicted entries.
    pub fn release_unused(&self) -> usize {
        let mut pool = self.inner.lock();
        let before = pool.slots.len();
        pool.slots.retain(|s| s.leases > 0);
        let evicted = before - pool.slots.len();
        if evicted > 0 {
            debug!("Released {} unused transform tables", evicted);
        }
        evicted
    }

    /// Lengths currently held by the pool
    pub fn cached_lengths(&self) -> Vec<usize> {
        self.inner.lock().slots.iter().map(|s| s.tables.len()).collect()
    }

    /// Outstanding leases for `len` (0 when not cached)
    pub fn lease_count(&self, len: usize) -> usize {
        self.inner
            .lock()
            .slots
            .iter()
            .find(|s| s.tables.len() == len)
            .map_or(0, |s| s.leases)
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }
}

impl Default for TableCache {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_CACHE_CAPACITY)
    }
}

/// Checked-out transform tables; returns its reference to the pool on drop
pub struct TableLease {
    tables: Arc<TransformTables>,
    cache: Option<TableCache>,
}

impl TableLease {
    /// Whether these tables live in the pool
    pub fn is_pooled(&self) -> bool {
        self.cache.is_some()
    }
}

impl Deref for TableLease {
    type Target = TransformTables;

    fn deref(&self) -> &TransformTables {
        &self.tables
    }
}

impl Drop for TableLease {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.take() {
            cache.release(&self.tables);
        }
    }
}

/// Forward and inverse real FFT sharing a table cache
pub struct FourierTransform {
    cache: TableCache,
    work: Vec<f32>,
}

impl Default for FourierTransform {
    fn default() -> Self {
        Self::new(TableCache::default())
    }
}

impl FourierTransform {
    pub fn new(cache: TableCache) -> Self {
        Self {
            cache,
            work: Vec::new(),
        }
    }

    pub fn cache(&self) -> &TableCache {
        &self.cache
    }

    /// Half-spectrum of `samples` in natural frequency order.
    ///
    /// `real` and `imag` must both hold `samples.len() / 2` bins. Bin 0 holds
    /// DC in `real[0]` and the Nyquist value in `imag[0]`.
    pub fn forward(
        &mut self,
        samples: &[f32],
        real: &mut [f32],
        imag: &mut [f32],
    ) -> Result<(), DspError> {
        let len = samples.len();
        check_length(len)?;
        check_half("forward real output", len, real.len())?;
        check_half("forward imaginary output", len, imag.len())?;

        let tables = self.cache.checkout(len)?;

        self.work.clear();
        self.work.extend_from_slice(samples);
        real_fft_in_place(&mut self.work, &tables);

        let br = tables.bit_reversed();
        for i in 1..tables.points() {
            real[i] = self.work[br[i]];
            imag[i] = self.work[br[i] + 1];
        }
        real[0] = self.work[0];
        imag[0] = self.work[1];

        trace!("Forward FFT of {} samples", len);
        Ok(())
    }

    /// Reconstruct `out.len()` samples from a half spectrum produced by
    /// [`FourierTransform::forward`].
    pub fn inverse(&mut self, real: &[f32], imag: &[f32], out: &mut [f32]) -> Result<(), DspError> {
        let len = out.len();
        check_length(len)?;
        check_half("inverse real input", len, real.len())?;
        check_half("inverse imaginary input", len, imag.len())?;

        let tables = self.cache.checkout(len)?;

        self.work.clear();
        self.work.resize(len, 0.0);
        for (i, (&re, &im)) in real.iter().zip(imag).enumerate() {
            self.work[2 * i] = re;
            self.work[2 * i + 1] = im;
        }
        inverse_real_fft_in_place(&mut self.work, &tables);

        let br = tables.bit_reversed();
        for i in 0..tables.points() {
            out[2 * i] = self.work[br[i]];
            out[2 * i + 1] = self.work[br[i] + 1];
        }

        trace!("Inverse FFT of {} samples", len);
        Ok(())
    }
}

fn check_half(what: &'static str, len: usize, actual: usize) -> Result<(), DspError> {
    if actual != len / 2 {
        return Err(DspError::DimensionMismatch {
            what,
            expected: len / 2,
            actual,
        });
    }
    Ok(())
}

/// In-place forward transform. Output is left in bit-reversed order.
fn real_fft_in_place(buffer: &mut [f32], tables: &TransformTables) {
    let points = tables.points;
    let sin_table = &tables.sin_table;
    let bit_reversed = &tables.bit_reversed;
    let end = points * 2;

    //  Butterfly:
    //     Ain-----Aout
    //         \ /
    //         / \
    //     Bin-----Bout
    let mut butterflies = points / 2;
    while butterflies > 0 {
        let mut a = 0;
        let mut b = butterflies * 2;
        let mut twiddle = 0;

        while a < end {
            let sin = sin_table[twiddle];
            let cos = sin_table[twiddle + 1];
            let group_end = b;
            while a < group_end {
                let v1 = buffer[b] * cos + buffer[b + 1] * sin;
                let v2 = buffer[b] * sin - buffer[b + 1] * cos;
                buffer[b] = buffer[a] + v1;
                buffer[a] = buffer[b] - 2.0 * v1;
                buffer[b + 1] = buffer[a + 1] - v2;
                buffer[a + 1] = buffer[b + 1] + 2.0 * v2;
                a += 2;
                b += 2;
            }
            a = b;
            b += butterflies * 2;
            twiddle += 2;
        }
        butterflies >>= 1;
    }

    // Separate the spectra of the even and odd samples
    let mut br1 = 1;
    let mut br2 = points - 1;
    while br1 < br2 {
        let a = bit_reversed[br1];
        let b = bit_reversed[br2];
        let sin = sin_table[a];
        let cos = sin_table[a + 1];

        let hr_minus = buffer[a] - buffer[b];
        let hr_plus = hr_minus + buffer[b] * 2.0;
        let hi_minus = buffer[a + 1] - buffer[b + 1];
        let hi_plus = hi_minus + buffer[b + 1] * 2.0;
        let v1 = sin * hr_minus - cos * hi_plus;
        let v2 = cos * hr_minus + sin * hi_plus;

        buffer[a] = (hr_plus + v1) * 0.5;
        buffer[b] = buffer[a] - v1;
        buffer[a + 1] = (hi_minus + v2) * 0.5;
        buffer[b + 1] = buffer[a + 1] - hi_minus;

        br1 += 1;
        br2 -= 1;
    }

    // Centre bin only needs a conjugate
    let centre = bit_reversed[br1] + 1;
    buffer[centre] = -buffer[centre];

    // DC and Fs/2 are both real; pack Fs/2 into the imaginary slot of bin 0
    let nyquist = buffer[0] - buffer[1];
    buffer[0] += buffer[1];
    buffer[1] = nyquist;
}

/// In-place inverse transform. Input is in natural order, output is left in
/// bit-reversed order.
fn inverse_real_fft_in_place(buffer: &mut [f32], tables: &TransformTables) {
    let points = tables.points;
    let sin_table = &tables.sin_table;
    let bit_reversed = &tables.bit_reversed;
    let end = points * 2;

    // Recombine into the packed complex spectrum of a real sequence
    let mut a = 2;
    let mut b = points * 2 - 2;
    let mut br1 = 1;
    while a < b {
        let sin = sin_table[bit_reversed[br1]];
        let cos = sin_table[bit_reversed[br1] + 1];

        let hr_minus = buffer[a] - buffer[b];
        let hr_plus = hr_minus + buffer[b] * 2.0;
        let hi_minus = buffer[a + 1] - buffer[b + 1];
        let hi_plus = hi_minus + buffer[b + 1] * 2.0;
        let v1 = sin * hr_minus + cos * hi_plus;
        let v2 = cos * hr_minus - sin * hi_plus;

        buffer[a] = (hr_plus + v1) * 0.5;
        buffer[b] = buffer[a] - v1;
        buffer[a + 1] = (hi_minus - v2) * 0.5;
        buffer[b + 1] = buffer[a + 1] - hi_minus;

        a += 2;
        b -= 2;
        br1 += 1;
    }
    buffer[a + 1] = -buffer[a + 1];

    // buffer[0] holds DC, buffer[1] holds Fs/2
    let v1 = 0.5 * (buffer[0] + buffer[1]);
    let v2 = 0.5 * (buffer[0] - buffer[1]);
    buffer[0] = v1;
    buffer[1] = v2;

    let mut butterflies = points / 2;
    while butterflies > 0 {
        let mut a = 0;
        let mut b = butterflies * 2;
        let mut twiddle = 0;

        while a < end {
            let sin = sin_table[twiddle];
            let cos = sin_table[twiddle + 1];
            twiddle += 2;
            let group_end = b;
            while a < group_end {
                let v1 = buffer[b] * cos - buffer[b + 1] * sin;
                let v2 = buffer[b] * sin + buffer[b + 1] * cos;
                buffer[b] = (buffer[a] + v1) * 0.5;
                buffer[a] = buffer[b] - v1;
                buffer[b + 1] = (buffer[a + 1] + v2) * 0.5;
                buffer[a + 1] = buffer[b + 1] - v2;
                a += 2;
                b += 2;
            }
            a = b;
            b += butterflies * 2;
        }
        butterflies >>= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(len: usize, seed: u32) -> Vec<f32> {
        let mut x = seed;
        (0..len)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                (x as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect()
    }

    fn forward(fft: &mut FourierTransform, samples: &[f32]) -> (Vec<f32>, Vec<f32>) {
        let mut real = vec![0.0; samples.len() / 2];
        let mut imag = vec![0.0; samples.len() / 2];
        fft.forward(samples, &mut real, &mut imag).unwrap();
        (real, imag)
    }

    #[test]
    fn test_bit_reversal_table() {
        let tables = TransformTables::new(8).unwrap();
        assert_eq!(tables.points(), 4);
        assert_eq!(tables.bit_reversed(), &[0, 4, 2, 6]);
        assert_eq!(tables.sin_table().len(), 8);
        // i = 0 twiddle sits at index 0: -sin(0), -cos(0)
        assert_eq!(tables.sin_table()[0], 0.0);
        assert_eq!(tables.sin_table()[1], -1.0);
    }

    #[test]
    fn test_rejects_bad_lengths() {
        assert_eq!(TransformTables::new(2).unwrap_err(), DspError::InvalidLength(2));
        assert_eq!(TransformTables::new(12).unwrap_err(), DspError::InvalidLength(12));

        let mut fft = FourierTransform::default();
        let samples = vec![0.0; 16];
        let mut real = vec![0.0; 8];
        let mut imag = vec![0.0; 7];
        let err = fft.forward(&samples, &mut real, &mut imag).unwrap_err();
        assert!(matches!(err, DspError::DimensionMismatch { expected: 8, actual: 7, .. }));
    }

    #[test]
    fn test_constant_signal_dc_bin() {
        let mut fft = FourierTransform::default();
        let samples = vec![0.5; 16];
        let (real, imag) = forward(&mut fft, &samples);

        assert!((real[0] - 8.0).abs() < 1e-5, "DC bin = {}", real[0]);
        assert!(imag[0].abs() < 1e-5, "Nyquist bin = {}", imag[0]);
        for i in 1..8 {
            assert!(real[i].abs() < 1e-5 && imag[i].abs() < 1e-5, "bin {} not zero", i);
        }
    }

    #[test]
    fn test_nyquist_packed_into_bin_zero() {
        let mut fft = FourierTransform::default();
        let samples: Vec<f32> = (0..16).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let (real, imag) = forward(&mut fft, &samples);

        assert!(real[0].abs() < 1e-5);
        assert!((imag[0] - 16.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_and_sine_bins() {
        let n = 64;
        let k = 5;
        let mut fft = FourierTransform::default();

        let cosine: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * k as f32 * i as f32 / n as f32).cos())
            .collect();
        let (real, imag) = forward(&mut fft, &cosine);
        assert!((real[k] - 32.0).abs() < 1e-3, "cos bin = {}", real[k]);
        assert!(imag[k].abs() < 1e-3);

        let sine: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * k as f32 * i as f32 / n as f32).sin())
            .collect();
        let (real, imag) = forward(&mut fft, &sine);
        assert!(real[k].abs() < 1e-3);
        assert!((imag[k] + 32.0).abs() < 1e-3, "sin bin = {}", imag[k]);
    }

    #[test]
    fn test_inverse_round_trip() {
        let mut fft = FourierTransform::default();
        for (seed, len) in [(7u32, 4usize), (11, 8), (13, 64), (17, 1024)] {
            let samples = signal(len, seed);
            let (real, imag) = forward(&mut fft, &samples);
            let mut restored = vec![0.0; len];
            fft.inverse(&real, &imag, &mut restored).unwrap();

            for (a, b) in samples.iter().zip(&restored) {
                assert!((a - b).abs() < 1e-4, "len {}: {} vs {}", len, a, b);
            }
        }
    }

    #[test]
    fn test_cache_shares_tables() {
        let cache = TableCache::new(2);
        let first = cache.checkout(16).unwrap();
        let second = cache.checkout(16).unwrap();

        assert!(first.is_pooled());
        assert!(Arc::ptr_eq(&first.tables, &second.tables));
        assert_eq!(cache.lease_count(16), 2);

        drop(first);
        assert_eq!(cache.lease_count(16), 1);
        drop(second);
        assert_eq!(cache.lease_count(16), 0);
        assert_eq!(cache.cached_lengths(), vec![16]);
    }

    #[test]
    fn test_release_unused_keeps_leased_tables() {
        let cache = TableCache::new(4);
        let held = cache.checkout(32).unwrap();
        drop(cache.checkout(64).unwrap());

        assert_eq!(cache.release_unused(), 1);
        assert_eq!(cache.cached_lengths(), vec![32]);
        drop(held);
        assert_eq!(cache.release_unused(), 1);
        assert!(cache.cached_lengths().is_empty());
    }

    #[test]
    fn test_full_cache_falls_back_to_uncached_tables() {
        let cache = TableCache::new(1);
        let _held = cache.checkout(8).unwrap();
        let extra = cache.checkout(16).unwrap();

        assert!(!extra.is_pooled());
        assert_eq!(extra.len(), 16);
        assert_eq!(cache.cached_lengths(), vec![8]);
        drop(extra);
        assert_eq!(cache.lease_count(8), 1);
    }

    #[test]
    fn test_engine_switches_lengths() {
        let cache = TableCache::new(4);
        let mut fft = FourierTransform::new(cache.clone());
        forward(&mut fft, &signal(16, 3));
        forward(&mut fft, &signal(32, 5));
        forward(&mut fft, &signal(16, 9));

        let mut lengths = cache.cached_lengths();
        lengths.sort_unstable();
        assert_eq!(lengths, vec![16, 32]);
        assert_eq!(cache.lease_count(16), 0);
    }
}
