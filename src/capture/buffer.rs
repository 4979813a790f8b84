//! Circular capture buffers.
//!
//! [`ClipBuffer`] is the looping clip a microphone driver writes into.
//! [`CaptureBuffer`] is the consumer's snapshot of it, tracking the write head
//! between polls and cutting recorded words out of the circle.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::CaptureError;

/// Samples between `start` and `current` going forward around a circle of `size`
pub fn trim_len(size: usize, start: usize, current: usize) -> usize {
    if current < start {
        size - start + current
    } else {
        current - start
    }
}

/// Thread-safe looping clip written by a capture source
pub struct ClipBuffer {
    inner: Arc<Mutex<Clip>>,
    sample_rate: u32,
}

struct Clip {
    data: Vec<f32>,
    position: usize,
    looping: bool,
    finished: bool,
}

impl ClipBuffer {
    /// Create a clip of `len` samples
    pub fn new(len: usize, sample_rate: u32, looping: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Clip {
                data: vec![0.0; len],
                position: 0,
                looping,
                finished: false,
            })),
            sample_rate,
        }
    }

    /// Write samples at the head, wrapping when looping.
    ///
    /// A non-looping clip stops accepting samples once full. Returns the
    /// number of samples written.
    pub fn write(&self, samples: &[f32]) -> usize {
        let mut clip = self.inner.lock();
        let capacity = clip.data.len();
        if capacity == 0 || clip.finished {
            return 0;
        }

        let mut written = 0;
        for &sample in samples {
            let position = clip.position;
            clip.data[position] = sample;
            written += 1;

            if position + 1 == capacity {
                if clip.looping {
                    clip.position = 0;
                } else {
                    // Head reports 0 once recording has ended
                    clip.position = 0;
                    clip.finished = true;
                    break;
                }
            } else {
                clip.position = position + 1;
            }
        }
        written
    }

    /// Index the next sample will be written to
    pub fn position(&self) -> usize {
        self.inner.lock().position
    }

    /// Copy `out.len()` samples starting at `offset`, wrapping around the end
    pub fn read_into(&self, offset: usize, out: &mut [f32]) {
        let clip = self.inner.lock();
        let capacity = clip.data.len();
        if capacity == 0 {
            out.fill(0.0);
            return;
        }
        for (i, sample) in out.iter_mut().enumerate() {
            *sample = clip.data[(offset + i) % capacity];
        }
    }

    /// Zero every sample without moving the head
    pub fn clear(&self) {
        self.inner.lock().data.fill(0.0);
    }

    /// Whether a non-looping clip has filled up
    pub fn is_finished(&self) -> bool {
        self.inner.lock().finished
    }

    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Clone the clip handle
    pub fn clone_handle(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            sample_rate: self.sample_rate,
        }
    }
}

/// Lifecycle of a [`CaptureBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Not tracking a capture
    Idle,
    /// Capture running, write head tracked
    Armed,
    /// Samples read out for a word, waiting to be cleared
    Draining,
}

/// Consumer-side snapshot of a looping capture
pub struct CaptureBuffer {
    data: Vec<f32>,
    last_position: usize,
    state: CaptureState,
}

impl CaptureBuffer {
    /// Create a zeroed buffer of `size` samples
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0.0; size],
            last_position: 0,
            state: CaptureState::Idle,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Start tracking a capture whose head is at `position`
    pub fn arm(&mut self, position: usize) -> Result<(), CaptureError> {
        self.check_position(position)?;
        self.last_position = position;
        self.state = CaptureState::Armed;
        debug!("Capture buffer armed at {}", position);
        Ok(())
    }

    /// Stop tracking the capture
    pub fn disarm(&mut self) {
        self.state = CaptureState::Idle;
    }

    /// Write head seen by the last poll
    pub fn write_position(&self) -> usize {
        self.last_position
    }

    /// Record the driver's head; true when it moved since the last poll
    pub fn poll(&mut self, position: usize) -> Result<bool, CaptureError> {
        self.check_position(position)?;
        let moved = position != self.last_position;
        self.last_position = position;
        if moved {
            trace!("Capture head moved to {}", position);
        }
        Ok(moved)
    }

    /// Copy a full-window snapshot from the driver
    pub fn load(&mut self, samples: &[f32]) -> Result<(), CaptureError> {
        if samples.len() != self.data.len() {
            return Err(CaptureError::WindowMismatch {
                expected: self.data.len(),
                actual: samples.len(),
            });
        }
        self.data.copy_from_slice(samples);
        Ok(())
    }

    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Length of the circular segment from `start` to `current`
    pub fn trim_len(&self, start: usize, current: usize) -> Result<usize, CaptureError> {
        self.check_position(start)?;
        self.check_position(current)?;
        Ok(trim_len(self.data.len(), start, current))
    }

    /// Copy the segment from `start` to `current` into a zero-padded window
    /// of the buffer's size
    pub fn extract_trim(&mut self, start: usize, current: usize) -> Result<Vec<f32>, CaptureError> {
        let len = self.trim_len(start, current)?;
        let size = self.data.len();

        let mut window = vec![0.0; size];
        for (i, sample) in window.iter_mut().take(len).enumerate() {
            *sample = self.data[(start + i) % size];
        }

        self.state = CaptureState::Draining;
        debug!("Extracted {} samples from {} to {}", len, start, current);
        Ok(window)
    }

    /// Zero the circular segment from `start` to `current`
    pub fn zero_segment(&mut self, start: usize, current: usize) -> Result<(), CaptureError> {
        let len = self.trim_len(start, current)?;
        let size = self.data.len();
        for i in 0..len {
            self.data[(start + i) % size] = 0.0;
        }
        Ok(())
    }

    /// Zero the whole buffer and finish any drain
    pub fn clear(&mut self) {
        self.data.fill(0.0);
        if self.state == CaptureState::Draining {
            self.state = CaptureState::Idle;
        }
    }

    /// Oldest-first copy of the buffer for a write head at `position`
    pub fn rotated(&self, position: usize) -> Result<Vec<f32>, CaptureError> {
        let mut out = Vec::with_capacity(self.data.len());
        self.rotate_into(position, &mut out)?;
        Ok(out)
    }

    /// Like [`rotated`](Self::rotated) but reuses `out`
    pub fn rotate_into(&self, position: usize, out: &mut Vec<f32>) -> Result<(), CaptureError> {
        self.check_position(position)?;
        out.clear();
        out.extend_from_slice(&self.data[position..]);
        out.extend_from_slice(&self.data[..position]);
        Ok(())
    }

    fn check_position(&self, position: usize) -> Result<(), CaptureError> {
        if position >= self.data.len() {
            return Err(CaptureError::InvalidPosition {
                position,
                size: self.data.len(),
            });
        }
        Ok(())
    }
}
