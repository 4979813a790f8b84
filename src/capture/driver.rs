//! Microphone drivers feeding looping capture clips

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleRate, Stream, StreamConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::capture::buffer::ClipBuffer;
use crate::error::CaptureError;

/// Name of the device exposed by [`MemoryMicrophone`]
pub const MEMORY_DEVICE: &str = "memory";

/// An active looping capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureHandle {
    pub device: String,
    /// Clip length in samples
    pub len: usize,
    pub sample_rate: u32,
}

/// Source of looping microphone captures.
///
/// An empty device name selects the default device.
pub trait MicrophoneDriver {
    fn devices(&self) -> Result<Vec<String>, CaptureError>;

    fn start_capture(
        &mut self,
        device: &str,
        looping: bool,
        duration_secs: u32,
        sample_rate: u32,
    ) -> Result<CaptureHandle, CaptureError>;

    fn stop_capture(&mut self, device: &str);

    fn is_capturing(&self, device: &str) -> bool;

    /// Index the device will write next, 0 when not capturing
    fn write_position(&self, device: &str) -> usize;

    /// Copy `out.len()` samples starting at `offset`
    fn read_samples(
        &self,
        handle: &CaptureHandle,
        offset: usize,
        out: &mut [f32],
    ) -> Result<(), CaptureError>;

    /// Zero the whole clip
    fn clear_samples(&mut self, handle: &CaptureHandle) -> Result<(), CaptureError>;
}

fn clip_len(duration_secs: u32, sample_rate: u32) -> Result<usize, CaptureError> {
    let len = duration_secs as usize * sample_rate as usize;
    if len == 0 {
        return Err(CaptureError::DeviceConfig(format!(
            "Empty capture clip ({} s at {} Hz)",
            duration_secs, sample_rate
        )));
    }
    Ok(len)
}

/// In-memory microphone fed by [`push`](MemoryMicrophone::push)
#[derive(Default)]
pub struct MemoryMicrophone {
    clip: Option<ClipBuffer>,
}

impl MemoryMicrophone {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed samples as if they had just been captured.
    ///
    /// Samples pushed while not capturing are dropped.
    pub fn push(&self, samples: &[f32]) -> usize {
        match &self.clip {
            Some(clip) => clip.write(samples),
            None => 0,
        }
    }

    /// Shared handle on the active clip
    pub fn clip(&self) -> Option<ClipBuffer> {
        self.clip.as_ref().map(ClipBuffer::clone_handle)
    }

    fn active_clip(&self, device: &str) -> Result<&ClipBuffer, CaptureError> {
        self.clip
            .as_ref()
            .ok_or_else(|| CaptureError::NotCapturing(device.to_string()))
    }
}

impl MicrophoneDriver for MemoryMicrophone {
    fn devices(&self) -> Result<Vec<String>, CaptureError> {
        Ok(vec![MEMORY_DEVICE.to_string()])
    }

    fn start_capture(
        &mut self,
        device: &str,
        looping: bool,
        duration_secs: u32,
        sample_rate: u32,
    ) -> Result<CaptureHandle, CaptureError> {
        if !device.is_empty() && device != MEMORY_DEVICE {
            return Err(CaptureError::DeviceNotFound(device.to_string()));
        }

        let len = clip_len(duration_secs, sample_rate)?;
        self.clip = Some(ClipBuffer::new(len, sample_rate, looping));
        debug!("Memory capture started: {} samples @ {} Hz", len, sample_rate);

        Ok(CaptureHandle {
            device: MEMORY_DEVICE.to_string(),
            len,
            sample_rate,
        })
    }

    fn stop_capture(&mut self, _device: &str) {
        self.clip = None;
    }

    fn is_capturing(&self, _device: &str) -> bool {
        self.clip.as_ref().map_or(false, |clip| !clip.is_finished())
    }

    fn write_position(&self, _device: &str) -> usize {
        self.clip.as_ref().map_or(0, ClipBuffer::position)
    }

    fn read_samples(
        &self,
        handle: &CaptureHandle,
        offset: usize,
        out: &mut [f32],
    ) -> Result<(), CaptureError> {
        self.active_clip(&handle.device)?.read_into(offset, out);
        Ok(())
    }

    fn clear_samples(&mut self, handle: &CaptureHandle) -> Result<(), CaptureError> {
        self.active_clip(&handle.device)?.clear();
        Ok(())
    }
}

/// One running cpal input stream and the clip it writes into
struct ActiveStream {
    _stream: Stream,
    clip: ClipBuffer,
    is_running: Arc<AtomicBool>,
}

/// Microphone backed by cpal input streams
pub struct CpalMicrophone {
    host: Host,
    streams: HashMap<String, ActiveStream>,
}

impl Default for CpalMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalMicrophone {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            streams: HashMap::new(),
        }
    }

    fn find_device(&self, name: &str) -> Result<Device, CaptureError> {
        if name.is_empty() {
            return self
                .host
                .default_input_device()
                .ok_or(CaptureError::NoInputDevice);
        }

        let devices = self
            .host
            .input_devices()
            .map_err(|e| CaptureError::DeviceConfig(e.to_string()))?;

        for device in devices {
            if let Ok(device_name) = device.name() {
                if device_name.contains(name) {
                    return Ok(device);
                }
            }
        }

        Err(CaptureError::DeviceNotFound(name.to_string()))
    }

    /// Pick a stream configuration, preferring mono at the requested rate
    fn stream_config(device: &Device, sample_rate: u32) -> Result<StreamConfig, CaptureError> {
        let supported_configs = device
            .supported_input_configs()
            .map_err(|e| CaptureError::DeviceConfig(e.to_string()))?;

        let target_rate = SampleRate(sample_rate);
        let mut best_config = None;
        for cfg in supported_configs {
            debug!(
                "Supported config: channels={}, sample_rate={:?}-{:?}",
                cfg.channels(),
                cfg.min_sample_rate(),
                cfg.max_sample_rate()
            );

            let supports_rate =
                cfg.min_sample_rate() <= target_rate && target_rate <= cfg.max_sample_rate();
            if supports_rate {
                let mono = cfg.channels() == 1;
                best_config = Some(cfg.with_sample_rate(target_rate));
                if mono {
                    break;
                }
            }
        }

        let supported_config = best_config.ok_or_else(|| {
            CaptureError::DeviceConfig(format!("No input configuration supports {} Hz", sample_rate))
        })?;
        Ok(supported_config.config())
    }
}

impl MicrophoneDriver for CpalMicrophone {
    fn devices(&self) -> Result<Vec<String>, CaptureError> {
        let devices = self
            .host
            .input_devices()
            .map_err(|e| CaptureError::DeviceConfig(e.to_string()))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn start_capture(
        &mut self,
        device_name: &str,
        looping: bool,
        duration_secs: u32,
        sample_rate: u32,
    ) -> Result<CaptureHandle, CaptureError> {
        self.stop_capture(device_name);

        let device = self.find_device(device_name)?;
        let resolved_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio input device: {}", resolved_name);

        let config = Self::stream_config(&device, sample_rate)?;
        let channels = config.channels as usize;
        info!(
            "Audio config: {} channels @ {} Hz",
            channels, config.sample_rate.0
        );

        let len = clip_len(duration_secs, sample_rate)?;
        let clip = ClipBuffer::new(len, sample_rate, looping);
        let writer = clip.clone_handle();
        let is_running = Arc::new(AtomicBool::new(true));
        let running = is_running.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        return;
                    }

                    if channels > 1 {
                        let mono: Vec<f32> = data
                            .chunks(channels)
                            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
                            .collect();
                        writer.write(&mono);
                    } else {
                        writer.write(data);
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| CaptureError::StreamBuild(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CaptureError::StreamPlay(e.to_string()))?;

        self.streams.insert(
            device_name.to_string(),
            ActiveStream {
                _stream: stream,
                clip,
                is_running,
            },
        );

        info!("Audio capture started");
        Ok(CaptureHandle {
            device: device_name.to_string(),
            len,
            sample_rate,
        })
    }

    fn stop_capture(&mut self, device: &str) {
        if let Some(active) = self.streams.remove(device) {
            active.is_running.store(false, Ordering::Relaxed);
            info!("Audio capture stopped");
        }
    }

    fn is_capturing(&self, device: &str) -> bool {
        self.streams.get(device).map_or(false, |active| {
            active.is_running.load(Ordering::Relaxed) && !active.clip.is_finished()
        })
    }

    fn write_position(&self, device: &str) -> usize {
        self.streams
            .get(device)
            .map_or(0, |active| active.clip.position())
    }

    fn read_samples(
        &self,
        handle: &CaptureHandle,
        offset: usize,
        out: &mut [f32],
    ) -> Result<(), CaptureError> {
        let active = self
            .streams
            .get(&handle.device)
            .ok_or_else(|| CaptureError::NotCapturing(handle.device.clone()))?;
        active.clip.read_into(offset, out);
        Ok(())
    }

    fn clear_samples(&mut self, handle: &CaptureHandle) -> Result<(), CaptureError> {
        let active = self
            .streams
            .get(&handle.device)
            .ok_or_else(|| CaptureError::NotCapturing(handle.device.clone()))?;
        active.clip.clear();
        Ok(())
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        let devices: Vec<String> = self.streams.keys().cloned().collect();
        for device in devices {
            self.stop_capture(&device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_microphone_lifecycle() {
        let mut mic = MemoryMicrophone::new();
        assert_eq!(mic.devices().unwrap(), vec![MEMORY_DEVICE.to_string()]);
        assert_eq!(mic.push(&[1.0]), 0);
        assert!(!mic.is_capturing(""));

        let handle = mic.start_capture("", true, 1, 8).unwrap();
        assert_eq!(handle.len, 8);
        assert!(mic.is_capturing(MEMORY_DEVICE));

        mic.push(&[1.0, 2.0, 3.0]);
        assert_eq!(mic.write_position(""), 3);

        let mut out = [0.0; 4];
        mic.read_samples(&handle, 1, &mut out).unwrap();
        assert_eq!(out, [2.0, 3.0, 0.0, 0.0]);

        mic.clear_samples(&handle).unwrap();
        mic.read_samples(&handle, 0, &mut out).unwrap();
        assert_eq!(out, [0.0; 4]);

        mic.stop_capture("");
        assert_eq!(mic.write_position(""), 0);
        assert!(mic.read_samples(&handle, 0, &mut out).is_err());
    }

    #[test]
    fn test_memory_microphone_unknown_device() {
        let mut mic = MemoryMicrophone::new();
        assert!(matches!(
            mic.start_capture("USB", true, 1, 8),
            Err(CaptureError::DeviceNotFound(_))
        ));
        assert!(mic.start_capture("memory", true, 0, 8).is_err());
    }

    #[test]
    fn test_cpal_microphone_lists_devices() {
        let mic = CpalMicrophone::new();
        // Just verify it doesn't panic - actual devices depend on system
        let _ = mic.devices();
    }
}
