//! Common types for driftdj
//!
//! Fundamental audio types used throughout the pipeline: stereo buffer
//! handling, sample types, and the playback state machine.

use std::ops::{Index, IndexMut};

/// Sample rate of the generation service's PCM stream (48kHz). All
/// client-side processing runs at this rate; the output device is asked
/// for it and we accept nothing else for the stream itself.
pub const SAMPLE_RATE: u32 = 48000;

/// Audio sample type (32-bit float for processing, 16-bit in files and on the wire)
pub type Sample = f32;

/// Playback state of the streamed audio, owned by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    /// Waiting for the first audio of a run (initial buffering, reconnect,
    /// or post-underrun re-anchor)
    Loading,
    Playing,
    Paused,
}

impl PlaybackState {
    /// True while the stream is expected to deliver audio
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, PlaybackState::Loading | PlaybackState::Playing)
    }
}

/// A single stereo sample (left and right channels)
///
/// Uses `#[repr(C)]` to ensure predictable memory layout: [left, right].
/// This enables zero-copy conversion between `&[StereoSample]` and `&[f32]`
/// (interleaved format) using bytemuck, avoiding per-frame format conversions.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    /// Create a new stereo sample
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// Create a silent stereo sample
    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Create a mono sample (same value in both channels)
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Scale both channels by a factor
    #[inline]
    pub fn scale(&self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }

    /// Get the peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, factor: Sample) {
        self.left *= factor;
        self.right *= factor;
    }
}

/// A buffer of stereo samples
///
/// The primary audio buffer type for processing the streamed audio. Decoded
/// stream chunks, the effect chain, and the output callback all work on this.
#[derive(Debug, Clone)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a new buffer with the specified capacity (in stereo samples)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Create a buffer from interleaved samples [L, R, L, R, ...]
    pub fn from_interleaved(interleaved: &[Sample]) -> Self {
        assert!(interleaved.len() % 2 == 0, "Interleaved buffer must have even length");
        let samples = interleaved
            .chunks_exact(2)
            .map(|chunk| StereoSample::new(chunk[0], chunk[1]))
            .collect();
        Self { samples }
    }

    /// Decode interleaved PCM16 little-endian bytes [L, R, L, R, ...]
    ///
    /// This is the wire format of the generation service's audio chunks.
    /// A trailing partial frame is dropped.
    pub fn from_pcm16_interleaved(bytes: &[u8]) -> Self {
        let usable = bytes.len() - (bytes.len() % 4);
        let mut samples = Vec::with_capacity(usable / 4);
        for frame in bytes[..usable].chunks_exact(4) {
            let l = i16::from_le_bytes([frame[0], frame[1]]);
            let r = i16::from_le_bytes([frame[2], frame[3]]);
            samples.push(StereoSample::new(
                l as Sample / 32768.0,
                r as Sample / 32768.0,
            ));
        }
        Self { samples }
    }

    /// Create a buffer from an existing Vec of StereoSamples
    pub fn from_vec(samples: Vec<StereoSample>) -> Self {
        Self { samples }
    }

    /// Get the number of stereo samples in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the buffer in seconds at the canonical sample rate
    #[inline]
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / SAMPLE_RATE as f64
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Resize the buffer, filling with silence if growing
    pub fn resize(&mut self, new_len: usize) {
        self.samples.resize(new_len, StereoSample::silence());
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Panics if new_len > capacity. Use for pre-allocated buffers only.
    /// Fills any newly exposed elements with silence.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        let current_len = self.samples.len();
        if new_len > current_len {
            // Growing: fill new elements with silence (capacity already exists)
            debug_assert!(new_len <= self.samples.capacity(), "set_len_from_capacity called with len > capacity");
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            // Shrinking: just truncate (no dealloc)
            self.samples.truncate(new_len);
        }
    }

    /// Fill the buffer with silence
    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    /// Get a slice of the samples
    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    /// Get a mutable slice of the samples
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Get a zero-copy view of samples as interleaved f32 [L, R, L, R, ...]
    ///
    /// This is a zero-cost operation thanks to `#[repr(C)]` on StereoSample.
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Get a zero-copy mutable view of samples as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved_mut(&mut self) -> &mut [Sample] {
        bytemuck::cast_slice_mut(&mut self.samples)
    }

    /// Add another buffer to this one (summing samples)
    pub fn add_buffer(&mut self, other: &StereoBuffer) {
        assert_eq!(self.len(), other.len(), "Buffer lengths must match");
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            *dst += *src;
        }
    }

    /// Scale all samples by a factor
    pub fn scale(&mut self, factor: Sample) {
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }

    /// Copy from another buffer (real-time safe if pre-allocated)
    ///
    /// For RT safety, ensure `self` has sufficient capacity before calling.
    pub fn copy_from(&mut self, other: &StereoBuffer) {
        let len = other.samples.len();
        debug_assert!(
            len <= self.samples.capacity(),
            "copy_from: insufficient capacity ({} < {})",
            self.samples.capacity(),
            len
        );
        if self.samples.len() > len {
            self.samples.truncate(len);
        } else if self.samples.len() < len {
            self.samples.resize(len, StereoSample::silence());
        }
        self.samples[..len].copy_from_slice(&other.samples[..len]);
    }

    /// Push a sample to the buffer
    #[inline]
    pub fn push(&mut self, sample: StereoSample) {
        self.samples.push(sample);
    }

    /// Get an iterator over the samples
    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    /// Get a mutable iterator over the samples
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StereoSample> {
        self.samples.iter_mut()
    }

    /// Get the peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

impl Default for StereoBuffer {
    fn default() -> Self {
        Self { samples: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_sample_operations() {
        let a = StereoSample::new(1.0, 2.0);
        let b = StereoSample::new(0.5, 0.5);

        let sum = a + b;
        assert_eq!(sum.left, 1.5);
        assert_eq!(sum.right, 2.5);

        let scaled = a * 0.5;
        assert_eq!(scaled.left, 0.5);
        assert_eq!(scaled.right, 1.0);
    }

    #[test]
    fn test_stereo_buffer_from_interleaved() {
        let interleaved = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let buffer = StereoBuffer::from_interleaved(&interleaved);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer[0].left, 1.0);
        assert_eq!(buffer[0].right, 2.0);
        assert_eq!(buffer[2].left, 5.0);
        assert_eq!(buffer[2].right, 6.0);
    }

    #[test]
    fn test_pcm16_decode() {
        // Full-scale negative left, half-scale positive right
        let bytes = [0x00, 0x80, 0x00, 0x40];
        let buffer = StereoBuffer::from_pcm16_interleaved(&bytes);

        assert_eq!(buffer.len(), 1);
        assert!((buffer[0].left - (-1.0)).abs() < 1e-6);
        assert!((buffer[0].right - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_pcm16_decode_drops_partial_frame() {
        let bytes = [0, 0, 0, 0, 0, 0];
        let buffer = StereoBuffer::from_pcm16_interleaved(&bytes);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_duration() {
        let buffer = StereoBuffer::silence(SAMPLE_RATE as usize);
        assert!((buffer.duration_seconds() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_playback_state_active() {
        assert!(PlaybackState::Loading.is_active());
        assert!(PlaybackState::Playing.is_active());
        assert!(!PlaybackState::Paused.is_active());
        assert!(!PlaybackState::Stopped.is_active());
    }
}
