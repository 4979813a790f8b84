//! Ordered collection of word profiles with file persistence

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::dsp::spectrum::{subtract_noise_from_spectrum, SpectrumExtractor};
use crate::error::{DspError, ProfileError};
use crate::profile::codec;
use crate::profile::word::WordProfile;

/// Label conventionally given to the background-noise profile
pub const NOISE_LABEL: &str = "Noise";

/// Ordered word profiles. Index 0 is the background-noise profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileSet {
    profiles: Vec<WordProfile>,
}

impl ProfileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set containing only an empty noise profile
    pub fn with_noise() -> Self {
        let mut set = Self::new();
        set.push(WordProfile::new(NOISE_LABEL));
        set
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WordProfile> {
        self.profiles.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, WordProfile> {
        self.profiles.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&WordProfile> {
        self.profiles.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut WordProfile> {
        self.profiles.get_mut(index)
    }

    /// The background-noise profile, if any profile exists
    pub fn noise(&self) -> Option<&WordProfile> {
        self.profiles.first()
    }

    /// Append a profile and return its index
    pub fn push(&mut self, profile: WordProfile) -> usize {
        self.profiles.push(profile);
        self.profiles.len() - 1
    }

    pub fn insert(&mut self, index: usize, profile: WordProfile) -> Result<(), ProfileError> {
        if index > self.profiles.len() {
            return Err(ProfileError::IndexOutOfRange {
                index,
                len: self.profiles.len(),
            });
        }
        self.profiles.insert(index, profile);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<WordProfile, ProfileError> {
        self.check_index(index)?;
        Ok(self.profiles.remove(index))
    }

    pub fn clear(&mut self) {
        self.profiles.clear();
    }

    /// First profile with exactly this label
    pub fn find_by_label(&self, label: &str) -> Option<(usize, &WordProfile)> {
        self.profiles
            .iter()
            .enumerate()
            .find(|(_, profile)| profile.label == label)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.label.as_str()).collect()
    }

    /// Replace the recording of the profile at `index`
    pub fn replace_wave(
        &mut self,
        index: usize,
        wave: Vec<f32>,
        extractor: &mut SpectrumExtractor,
    ) -> Result<(), ProfileError> {
        self.check_index(index)?;
        self.profiles[index].set_wave(wave, extractor)?;
        Ok(())
    }

    /// Recompute every spectrum from the stored waves
    pub fn recompute_spectra(&mut self, extractor: &mut SpectrumExtractor) -> Result<(), DspError> {
        for profile in self.profiles.iter_mut() {
            profile.recompute_spectrum(extractor)?;
        }
        Ok(())
    }

    /// Subtract the noise spectrum from every other profile.
    ///
    /// Returns how many profiles were updated. Profiles without a spectrum,
    /// or whose length differs from the noise spectrum, are skipped.
    pub fn subtract_noise_from_all(&mut self) -> usize {
        let mut updated = 0;
        for index in 1..self.profiles.len() {
            match self.subtract_noise_from(index) {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    "Noise not removed from '{}': {}",
                    self.profiles[index].label, e
                ),
            }
        }
        debug!("Subtracted noise from {} profiles", updated);
        updated
    }

    /// Subtract the noise spectrum from the profile at `index`.
    ///
    /// Returns false when either spectrum is missing or `index` is the noise
    /// profile itself.
    pub fn subtract_noise_from(&mut self, index: usize) -> Result<bool, DspError> {
        if index == 0 || index >= self.profiles.len() {
            return Ok(false);
        }

        let (noise, rest) = self.profiles.split_at_mut(1);
        let Some(noise) = noise[0].spectrum() else {
            return Ok(false);
        };
        let Some(spectrum) = rest[index - 1].spectrum_mut() else {
            return Ok(false);
        };

        subtract_noise_from_spectrum(&noise.real, &mut spectrum.real)?;
        Ok(true)
    }

    /// Replace the set with the contents of a bulk profile file.
    ///
    /// The current profiles are kept if the file cannot be read or decoded.
    pub fn load_file(
        &mut self,
        path: &Path,
        extractor: &mut SpectrumExtractor,
    ) -> Result<usize, ProfileError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let loaded = codec::read_profile_set(&mut reader, extractor)?;

        info!("Loaded {} profiles from {}", loaded.len(), path.display());
        *self = loaded;
        Ok(self.len())
    }

    /// Write every profile to a bulk profile file, replacing its contents
    pub fn save_file(&self, path: &Path) -> Result<(), ProfileError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        codec::write_profile_set(&mut writer, self)?;
        writer.flush()?;

        info!("Saved {} profiles to {}", self.len(), path.display());
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), ProfileError> {
        if index >= self.profiles.len() {
            warn!("Profile index {} out of range", index);
            return Err(ProfileError::IndexOutOfRange {
                index,
                len: self.profiles.len(),
            });
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ProfileSet {
    type Item = &'a WordProfile;
    type IntoIter = std::slice::Iter<'a, WordProfile>;

    fn into_iter(self) -> Self::IntoIter {
        self.profiles.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_with(extractor: &mut SpectrumExtractor) -> ProfileSet {
        let mut set = ProfileSet::new();
        set.push(WordProfile::with_wave(NOISE_LABEL, vec![0.25; 16], 1, 8192, extractor).unwrap());
        set.push(WordProfile::with_wave("Go", vec![1.0; 16], 1, 8192, extractor).unwrap());
        set.push(WordProfile::new("Stop"));
        set
    }

    #[test]
    fn test_find_by_label_is_case_sensitive() {
        let set = ProfileSet::with_noise();
        assert_eq!(set.find_by_label("Noise").map(|(i, _)| i), Some(0));
        assert!(set.find_by_label("noise").is_none());
    }

    #[test]
    fn test_insert_and_remove() {
        let mut set = ProfileSet::with_noise();
        set.push(WordProfile::new("Left"));
        set.insert(1, WordProfile::new("Right")).unwrap();
        assert_eq!(set.labels(), vec!["Noise", "Right", "Left"]);

        let removed = set.remove(1).unwrap();
        assert_eq!(removed.label, "Right");
        assert!(matches!(
            set.remove(5),
            Err(ProfileError::IndexOutOfRange { index: 5, len: 2 })
        ));
        assert!(set.insert(4, WordProfile::new("Far")).is_err());
    }

    #[test]
    fn test_subtract_noise_from_all() {
        let mut extractor = SpectrumExtractor::default();
        let mut set = set_with(&mut extractor);

        // DC bins: noise 4.0, Go 16.0
        assert_eq!(set.subtract_noise_from_all(), 1);
        let go = set.get(1).unwrap().spectrum().unwrap();
        assert!((go.real[0] - 12.0).abs() < 1e-4);

        let noise = set.noise().unwrap().spectrum().unwrap();
        assert!((noise.real[0] - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_subtract_noise_skips_noise_and_missing() {
        let mut extractor = SpectrumExtractor::default();
        let mut set = set_with(&mut extractor);
        assert!(!set.subtract_noise_from(0).unwrap());
        assert!(!set.subtract_noise_from(2).unwrap());
        assert!(!set.subtract_noise_from(9).unwrap());
    }

    #[test]
    fn test_subtract_noise_from_all_skips_mismatched_lengths() {
        let mut extractor = SpectrumExtractor::default();
        let mut set = set_with(&mut extractor);
        set.insert(1, WordProfile::with_wave("Long", vec![1.0; 32], 1, 8192, &mut extractor).unwrap())
            .unwrap();
        set.push(WordProfile::with_wave("Jump", vec![0.5; 16], 1, 8192, &mut extractor).unwrap());

        // "Long" sits between the noise and the matching profiles
        assert_eq!(set.subtract_noise_from_all(), 2);
        let long = set.get(1).unwrap().spectrum().unwrap();
        assert!((long.real[0] - 32.0).abs() < 1e-4);
        let go = set.get(2).unwrap().spectrum().unwrap();
        assert!((go.real[0] - 12.0).abs() < 1e-4);
        let jump = set.get(4).unwrap().spectrum().unwrap();
        assert!((jump.real[0] - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_subtract_noise_length_mismatch() {
        let mut extractor = SpectrumExtractor::default();
        let mut set = set_with(&mut extractor);
        set.replace_wave(1, vec![1.0; 32], &mut extractor).unwrap();
        assert!(set.subtract_noise_from(1).is_err());
    }

    #[test]
    fn test_replace_wave_out_of_range() {
        let mut extractor = SpectrumExtractor::default();
        let mut set = ProfileSet::with_noise();
        assert!(set.replace_wave(3, vec![0.0; 16], &mut extractor).is_err());
    }

    #[test]
    fn test_save_and_load_file() {
        let mut extractor = SpectrumExtractor::default();
        let set = set_with(&mut extractor);
        let path = std::env::temp_dir().join(format!("word-spectra-store-{}.bin", std::process::id()));

        set.save_file(&path).unwrap();
        let mut loaded = ProfileSet::new();
        assert_eq!(loaded.load_file(&path, &mut extractor).unwrap(), 3);
        assert_eq!(loaded.labels(), vec!["Noise", "Go", "Stop"]);
        assert_eq!(loaded.get(1).unwrap().spectrum(), set.get(1).unwrap().spectrum());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_failed_load_keeps_profiles() {
        let mut extractor = SpectrumExtractor::default();
        let mut set = set_with(&mut extractor);
        let missing = std::env::temp_dir().join("word-spectra-missing/profiles.bin");

        assert!(set.load_file(&missing, &mut extractor).is_err());
        assert_eq!(set.len(), 3);
    }
}
