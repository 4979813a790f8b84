//! Little-endian binary encoding of word profiles.
//!
//! A record is the label (7-bit varint byte length followed by UTF-8 bytes),
//! then `i32` channels, `i32` sample rate, `i32` wave length and that many
//! `f32` samples. A profile set is an `i32` count followed by its records.
//! Spectra and scores are never stored; they are recomputed on load.

use std::io::{ErrorKind, Read, Write};

use tracing::warn;

use crate::dsp::spectrum::SpectrumExtractor;
use crate::error::ProfileError;
use crate::profile::store::ProfileSet;
use crate::profile::word::WordProfile;

/// Upper bound on a stored wave, guards against allocating for corrupt lengths
const MAX_WAVE_LEN: i64 = 1 << 26;

/// Upper bound on a stored label in bytes
const MAX_LABEL_LEN: u32 = 1 << 16;

/// Write one profile record
pub fn write_profile<W: Write>(writer: &mut W, profile: &WordProfile) -> Result<(), ProfileError> {
    write_string(writer, &profile.label)?;
    writer.write_all(&i32::from(profile.channels).to_le_bytes())?;
    writer.write_all(&sample_rate_field(profile.sample_rate)?.to_le_bytes())?;

    let wave = profile.wave().unwrap_or(&[]);
    let len = i32::try_from(wave.len()).map_err(|_| ProfileError::InvalidLength {
        what: "wave",
        value: wave.len() as i64,
    })?;
    writer.write_all(&len.to_le_bytes())?;
    for sample in wave {
        writer.write_all(&sample.to_le_bytes())?;
    }
    Ok(())
}

/// Read one profile record and compute its spectrum.
///
/// A wave the extractor rejects (e.g. a length that is not a power of two)
/// is kept but leaves the profile without a spectrum, so it is never ranked.
pub fn read_profile<R: Read>(
    reader: &mut R,
    extractor: &mut SpectrumExtractor,
) -> Result<WordProfile, ProfileError> {
    let label = read_string(reader)?;
    let channels = read_i32(reader, "channels")?;
    let sample_rate = read_i32(reader, "sample rate")?;
    let len = read_i32(reader, "wave length")? as i64;
    if !(0..=MAX_WAVE_LEN).contains(&len) {
        return Err(ProfileError::InvalidLength { what: "wave", value: len });
    }

    let mut wave = vec![0.0f32; len as usize];
    let mut bytes = [0u8; 4];
    for sample in wave.iter_mut() {
        read_exact(reader, &mut bytes, "wave samples")?;
        *sample = f32::from_le_bytes(bytes);
    }

    let mut profile = WordProfile::new(label);
    profile.channels = u16::try_from(channels).map_err(|_| ProfileError::InvalidLength {
        what: "channels",
        value: channels as i64,
    })?;
    profile.sample_rate = u32::try_from(sample_rate).map_err(|_| ProfileError::InvalidLength {
        what: "sample rate",
        value: sample_rate as i64,
    })?;

    profile.set_wave_unprocessed(wave);
    if let Err(e) = profile.recompute_spectrum(extractor) {
        warn!("Profile '{}' has no usable spectrum: {}", profile.label, e);
    }
    Ok(profile)
}

/// Write a count-prefixed sequence of records
pub fn write_profile_set<W: Write>(writer: &mut W, set: &ProfileSet) -> Result<(), ProfileError> {
    let count = i32::try_from(set.len()).map_err(|_| ProfileError::InvalidLength {
        what: "profile count",
        value: set.len() as i64,
    })?;
    writer.write_all(&count.to_le_bytes())?;
    for profile in set.iter() {
        write_profile(writer, profile)?;
    }
    Ok(())
}

/// Read a count-prefixed sequence of records
pub fn read_profile_set<R: Read>(
    reader: &mut R,
    extractor: &mut SpectrumExtractor,
) -> Result<ProfileSet, ProfileError> {
    let count = read_i32(reader, "profile count")?;
    if count < 0 {
        return Err(ProfileError::InvalidLength {
            what: "profile count",
            value: count as i64,
        });
    }

    let mut set = ProfileSet::new();
    for _ in 0..count {
        set.push(read_profile(reader, extractor)?);
    }
    Ok(set)
}

/// Encode a single record to bytes
pub fn encode_profile(profile: &WordProfile) -> Result<Vec<u8>, ProfileError> {
    let mut bytes = Vec::new();
    write_profile(&mut bytes, profile)?;
    Ok(bytes)
}

/// Decode a single record. Trailing bytes after the record are ignored.
pub fn decode_profile(
    bytes: &[u8],
    extractor: &mut SpectrumExtractor,
) -> Result<WordProfile, ProfileError> {
    let mut reader = bytes;
    read_profile(&mut reader, extractor)
}

fn sample_rate_field(sample_rate: u32) -> Result<i32, ProfileError> {
    i32::try_from(sample_rate).map_err(|_| ProfileError::InvalidLength {
        what: "sample rate",
        value: sample_rate as i64,
    })
}

fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<(), ProfileError> {
    let mut len = u32::try_from(value.len()).map_err(|_| ProfileError::InvalidLength {
        what: "label",
        value: value.len() as i64,
    })?;

    while len >= 0x80 {
        writer.write_all(&[(len as u8 & 0x7f) | 0x80])?;
        len >>= 7;
    }
    writer.write_all(&[len as u8])?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

fn read_string<R: Read>(reader: &mut R) -> Result<String, ProfileError> {
    let mut len: u32 = 0;
    let mut shift = 0;
    loop {
        let mut byte = [0u8; 1];
        read_exact(reader, &mut byte, "label length")?;
        len |= u32::from(byte[0] & 0x7f) << shift;
        if byte[0] & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 28 {
            return Err(ProfileError::Encoding("label length varint too long".to_string()));
        }
    }

    if len > MAX_LABEL_LEN {
        return Err(ProfileError::InvalidLength {
            what: "label",
            value: len as i64,
        });
    }

    let mut bytes = vec![0u8; len as usize];
    read_exact(reader, &mut bytes, "label")?;
    String::from_utf8(bytes).map_err(|_| ProfileError::InvalidLabel)
}

fn read_i32<R: Read>(reader: &mut R, what: &'static str) -> Result<i32, ProfileError> {
    let mut bytes = [0u8; 4];
    read_exact(reader, &mut bytes, what)?;
    Ok(i32::from_le_bytes(bytes))
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], what: &'static str) -> Result<(), ProfileError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => ProfileError::Truncated(what),
        _ => ProfileError::Io(e),
    })
}
