//! Silence-filler bed
//!
//! A looped background bed (vinyl crackle by default) that masks the
//! gaps the stream itself cannot cover: it fades in when the stabilizer
//! starts pulling the stream down and fades back out once fresh audio
//! is flowing again. The bed is mixed on its own gain, after the output
//! gain stage, so an outage fade that silences the stream leaves the
//! bed audible. The buffer is decoded on the control thread and shipped
//! to the engine whole; the audio thread only ever advances a read
//! position.

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

use super::gain::GainRamp;
use crate::types::{StereoBuffer, StereoSample, SAMPLE_RATE};

/// Fade applied when the bed starts
pub const FILLER_FADE_IN_SECONDS: f64 = 3.0;

/// Fade applied when the bed is released
pub const FILLER_FADE_OUT_SECONDS: f64 = 1.5;

pub struct Filler {
    sample_rate: u32,
    buffer: Option<Box<StereoBuffer>>,
    position: usize,
    looped: bool,
    /// Whether the stabilizer may start the bed on its own
    enabled: bool,
    volume: f32,
    playing: bool,
    gain: GainRamp,
}

impl Filler {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            buffer: None,
            position: 0,
            looped: true,
            enabled: false,
            volume: 0.25,
            playing: false,
            gain: GainRamp::new(0.0),
        }
    }

    /// Install a bed buffer; playback restarts from the top
    pub fn set_buffer(&mut self, buffer: Box<StereoBuffer>) {
        self.buffer = Some(buffer);
        self.position = 0;
    }

    pub fn configure(&mut self, enabled: bool, volume: f32, looped: bool, now: u64) {
        self.enabled = enabled;
        self.looped = looped;
        self.volume = volume.clamp(0.0, 1.0);
        if self.playing {
            // Retune a running bed to the new volume
            let ramp = (0.1 * self.sample_rate as f64) as u64;
            self.gain.ramp_to(self.volume, now, ramp);
        }
    }

    /// May the stabilizer start the bed automatically
    pub fn auto_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Start the bed from the top with a fade-in to the configured volume
    pub fn play(&mut self, fade_seconds: f64, now: u64) {
        if self.playing {
            return;
        }
        self.playing = true;
        self.position = 0;
        let ramp = (fade_seconds.max(0.0) * self.sample_rate as f64) as u64;
        self.gain.ramp_to(self.volume, now, ramp);
    }

    /// Fade the bed out and release it once the fade completes
    pub fn stop(&mut self, fade_seconds: f64, now: u64) {
        if !self.playing {
            return;
        }
        self.playing = false;
        let ramp = (fade_seconds.max(0.0) * self.sample_rate as f64) as u64;
        self.gain.ramp_to(0.0, now, ramp);
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Mix the bed into `out` on its own gain
    ///
    /// Runs after the output gain stage: the bed must stay audible while
    /// an outage fade holds the stream at the floor. Keeps feeding
    /// through a stop fade until the release completes.
    pub fn mix_into(&mut self, out: &mut StereoBuffer, now: u64) {
        let Some(buffer) = self.buffer.as_ref() else {
            return;
        };
        if buffer.is_empty() {
            return;
        }
        if !self.playing && !self.gain.is_ramping(now) && self.gain.value_at(now) <= 0.0 {
            return;
        }

        for (i, sample) in out.iter_mut().enumerate() {
            let gain = self.gain.value_at(now + i as u64);
            if self.position >= buffer.len() {
                if self.looped {
                    self.position = 0;
                } else {
                    break;
                }
            }
            let bed = buffer[self.position];
            self.position += 1;
            *sample += bed * gain;
        }
        self.gain.settle(now + out.len() as u64);
    }
}

/// Decode a WAV file into a stereo buffer for the bed
///
/// Accepts mono (duplicated to both channels) or stereo, 16-bit integer
/// or 32-bit float. The file must already be at the stream rate; beds
/// are shipped as assets, not arbitrary user audio.
pub fn decode_wav_bed(path: &Path) -> Result<StereoBuffer> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open filler bed: {:?}", path))?;
    let spec = reader.spec();

    if spec.sample_rate != SAMPLE_RATE {
        bail!(
            "Filler bed {:?} is {}Hz, expected {}Hz",
            path,
            spec.sample_rate,
            SAMPLE_RATE
        );
    }
    if spec.channels == 0 || spec.channels > 2 {
        bail!("Filler bed {:?} has {} channels", path, spec.channels);
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("Failed to read float samples")?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()
            .context("Failed to read integer samples")?
        }
    };

    let buffer = if spec.channels == 1 {
        StereoBuffer::from_vec(samples.iter().map(|&v| StereoSample::mono(v)).collect())
    } else {
        StereoBuffer::from_interleaved(&samples)
    };
    Ok(buffer)
}

/// Synthesize a vinyl-crackle bed when no file is configured
///
/// Low-level filtered noise with sparse random pops, deterministic from
/// a fixed seed so the bed is identical across runs.
pub fn synthesize_crackle(seconds: f32) -> StereoBuffer {
    let len = (seconds * SAMPLE_RATE as f32) as usize;
    let mut buffer = StereoBuffer::with_capacity(len);
    let mut rng = StdRng::seed_from_u64(0x6472_6966_7464_6a00);

    let mut lp_l = 0.0f32;
    let mut lp_r = 0.0f32;
    let mut pop = 0.0f32;
    for _ in 0..len {
        // Surface noise: heavily lowpassed white noise
        lp_l += 0.02 * (rng.gen_range(-0.15..0.15) - lp_l);
        lp_r += 0.02 * (rng.gen_range(-0.15..0.15) - lp_r);

        // Sparse pops with an exponential decay
        if rng.gen_bool(5.0e-5) {
            pop = rng.gen_range(-0.6..0.6);
        }
        pop *= 0.995;

        buffer.push(StereoSample::new(lp_l + pop, lp_r + pop));
    }
    buffer
}
