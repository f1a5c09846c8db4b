//! Recording taps
//!
//! Two independent taps, both finalized to 16-bit stereo WAV files with
//! timestamped names:
//!
//! - **Raw tap**: the stream exactly as received, accumulated from the
//!   wire-format PCM16 bytes before any client processing.
//! - **FX tap**: the processed signal after the effect chain, collected
//!   from a lock-free ring the audio thread feeds while the tap is
//!   armed.
//!
//! Both taps buffer in memory on the control thread; nothing here runs
//! on the audio thread.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::types::{StereoSample, SAMPLE_RATE};

fn wav_spec() -> hound::WavSpec {
    hound::WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn timestamped_path(dir: &Path, kind: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    dir.join(format!("driftdj-{}-{}.wav", kind, stamp))
}

#[inline]
fn f32_to_i16(v: f32) -> i16 {
    (v.clamp(-1.0, 1.0) * 32767.0) as i16
}

/// Tap for the unprocessed stream, fed wire-format PCM16 bytes
#[derive(Default)]
pub struct RawRecorder {
    active: bool,
    bytes: Vec<u8>,
}

impl RawRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.bytes.clear();
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Append a chunk of interleaved PCM16 little-endian bytes
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        if self.active {
            self.bytes.extend_from_slice(bytes);
        }
    }

    /// Stop and write the recording; None if nothing was captured
    pub fn finalize(&mut self, dir: &Path) -> Result<Option<PathBuf>> {
        self.active = false;
        if self.bytes.is_empty() {
            return Ok(None);
        }
        let path = timestamped_path(dir, "raw");
        let mut writer = hound::WavWriter::create(&path, wav_spec())
            .with_context(|| format!("Failed to create recording: {:?}", path))?;
        // Drop a trailing partial sample, if any
        let usable = self.bytes.len() - (self.bytes.len() % 2);
        for pair in self.bytes[..usable].chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .context("Failed to write raw sample")?;
        }
        writer.finalize().context("Failed to finalize raw WAV")?;
        self.bytes.clear();
        log::info!("Raw recording written to {:?}", path);
        Ok(Some(path))
    }

    pub fn discard(&mut self) {
        self.active = false;
        self.bytes.clear();
    }
}

/// Tap for the processed signal, drained from the audio thread's ring
#[derive(Default)]
pub struct FxRecorder {
    active: bool,
    frames: Vec<StereoSample>,
}

impl FxRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.frames.clear();
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Drain whatever the audio thread has produced since the last call
    pub fn drain(&mut self, consumer: &mut rtrb::Consumer<StereoSample>) {
        while let Ok(frame) = consumer.pop() {
            if self.active {
                self.frames.push(frame);
            }
        }
    }

    /// Stop and write the recording; None if nothing was captured
    pub fn finalize(&mut self, dir: &Path) -> Result<Option<PathBuf>> {
        self.active = false;
        if self.frames.is_empty() {
            return Ok(None);
        }
        let path = timestamped_path(dir, "fx");
        let mut writer = hound::WavWriter::create(&path, wav_spec())
            .with_context(|| format!("Failed to create recording: {:?}", path))?;
        for frame in &self.frames {
            writer
                .write_sample(f32_to_i16(frame.left))
                .context("Failed to write fx sample")?;
            writer
                .write_sample(f32_to_i16(frame.right))
                .context("Failed to write fx sample")?;
        }
        writer.finalize().context("Failed to finalize fx WAV")?;
        self.frames.clear();
        log::info!("FX recording written to {:?}", path);
        Ok(Some(path))
    }

    pub fn discard(&mut self) {
        self.active = false;
        self.frames.clear();
    }
}
