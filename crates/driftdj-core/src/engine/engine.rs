//! The audio engine
//!
//! Owned exclusively by the audio thread. Each callback drains the
//! command queue, renders scheduled chunks into the output buffer, runs
//! the stabilizer gain and effect chain, feeds the FX tap, applies the
//! master/output gains with the auto-volume sweep, then mixes the
//! filler bed on its own gain so an output fade never silences it.
//! Playback position is published through [`SharedClock`] so the
//! control thread can read time and buffer depth without locks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::effect::{EffectChain, SmoothedParam};
use crate::types::{PlaybackState, StereoBuffer, StereoSample};

use super::command::EngineCommand;
use super::filler::{Filler, FILLER_FADE_IN_SECONDS, FILLER_FADE_OUT_SECONDS};
use super::gain::GainRamp;
use super::scheduler::{ChunkScheduler, ChunkDecision, DIRECT_LEAD_SECONDS, STABILIZED_LEAD_SECONDS};
use super::stabilizer::Stabilizer;

/// Ramp applied to user volume changes, in seconds
const VOLUME_RAMP_SECONDS: f64 = 0.1;

/// Ramp applied to auto-volume enable/disable and level changes
const AUTO_VOLUME_RAMP_SECONDS: f32 = 0.5;

struct ClockInner {
    sample_rate: u32,
    samples: AtomicU64,
    watermark: AtomicU64,
    underruns: AtomicU64,
}

/// Lock-free playback clock published by the audio thread
///
/// All reads are relaxed; the values are monotonic counters where a
/// one-callback-stale read is harmless.
#[derive(Clone)]
pub struct SharedClock {
    inner: Arc<ClockInner>,
}

impl SharedClock {
    fn new(sample_rate: u32) -> Self {
        Self {
            inner: Arc::new(ClockInner {
                sample_rate,
                samples: AtomicU64::new(0),
                watermark: AtomicU64::new(0),
                underruns: AtomicU64::new(0),
            }),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    /// Samples rendered since the stream started
    pub fn samples(&self) -> u64 {
        self.inner.samples.load(Ordering::Relaxed)
    }

    /// Seconds rendered since the stream started
    pub fn seconds(&self) -> f64 {
        self.samples() as f64 / self.inner.sample_rate as f64
    }

    /// Seconds of scheduled audio remaining beyond the current position
    pub fn buffered_seconds(&self) -> f64 {
        let mark = self.inner.watermark.load(Ordering::Relaxed);
        let now = self.samples();
        mark.saturating_sub(now) as f64 / self.inner.sample_rate as f64
    }

    /// Total underruns observed since the stream started
    pub fn underruns(&self) -> u64 {
        self.inner.underruns.load(Ordering::Relaxed)
    }

    fn advance(&self, n: u64) {
        self.inner.samples.fetch_add(n, Ordering::Relaxed);
    }

    fn store_watermark(&self, samples: u64) {
        self.inner.watermark.store(samples, Ordering::Relaxed);
    }

    fn record_underrun(&self) {
        self.inner.underruns.fetch_add(1, Ordering::Relaxed);
    }
}

/// Slow sinusoidal sweep multiplied into the master volume
struct AutoVolume {
    enabled: bool,
    frequency_hz: f64,
    phase: f64,
    /// Half the sweep range, as a fraction of the user volume
    amplitude: SmoothedParam,
    /// Center of the sweep, as a fraction of the user volume
    offset: SmoothedParam,
}

impl AutoVolume {
    fn new(sample_rate: u32) -> Self {
        Self {
            enabled: false,
            frequency_hz: 0.0,
            phase: 0.0,
            amplitude: SmoothedParam::new(0.0, AUTO_VOLUME_RAMP_SECONDS, sample_rate),
            offset: SmoothedParam::new(1.0, AUTO_VOLUME_RAMP_SECONDS, sample_rate),
        }
    }

    fn configure(&mut self, enabled: bool, frequency_hz: f64, min_level_percent: f64) {
        self.enabled = enabled;
        self.frequency_hz = frequency_hz.max(0.0);
        if enabled {
            let min_frac = (min_level_percent / 100.0).clamp(0.0, 1.0) as f32;
            self.amplitude.set_target((1.0 - min_frac) * 0.5);
            self.offset.set_target((1.0 + min_frac) * 0.5);
        } else {
            self.amplitude.set_target(0.0);
            self.offset.set_target(1.0);
        }
    }

    /// Multiplier for one sample; advances the LFO
    #[inline]
    fn next(&mut self, sample_rate: u32) -> f32 {
        let lfo = self.phase.sin() as f32;
        self.phase += std::f64::consts::TAU * self.frequency_hz / sample_rate as f64;
        if self.phase >= std::f64::consts::TAU {
            self.phase -= std::f64::consts::TAU;
        }
        self.offset.next() + self.amplitude.next() * lfo
    }
}

/// A chunk placed on the sample clock
struct ScheduledChunk {
    start: u64,
    buffer: Box<StereoBuffer>,
}

pub struct AudioEngine {
    sample_rate: u32,
    clock: SharedClock,
    /// Audio-thread-authoritative mirror of the clock's sample counter
    now: u64,
    playback: PlaybackState,
    queue: VecDeque<ScheduledChunk>,
    scheduler: ChunkScheduler,
    stabilizer: Stabilizer,
    chain: EffectChain,
    filler: Filler,
    /// Whether the running bed was started by the stabilizer coupling
    filler_auto: bool,
    stabilizer_was_fading: bool,
    master_volume: GainRamp,
    output_gain: GainRamp,
    auto_volume: AutoVolume,
    fx_tap: Option<rtrb::Producer<StereoSample>>,
}

impl AudioEngine {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            clock: SharedClock::new(sample_rate),
            now: 0,
            playback: PlaybackState::Stopped,
            queue: VecDeque::new(),
            scheduler: ChunkScheduler::new(STABILIZED_LEAD_SECONDS),
            stabilizer: Stabilizer::new(sample_rate),
            chain: EffectChain::new(sample_rate),
            filler: Filler::new(sample_rate),
            filler_auto: false,
            stabilizer_was_fading: false,
            master_volume: GainRamp::new(1.0),
            output_gain: GainRamp::new(1.0),
            auto_volume: AutoVolume::new(sample_rate),
            fx_tap: None,
        }
    }

    pub fn shared_clock(&self) -> SharedClock {
        self.clock.clone()
    }

    /// Drain all pending commands; called at the top of each callback
    pub fn process_commands(&mut self, rx: &mut rtrb::Consumer<EngineCommand>) {
        while let Ok(command) = rx.pop() {
            self.handle_command(command);
        }
    }

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::SubmitChunk(buffer) => self.submit_chunk(buffer),
            EngineCommand::ResetWatermark => self.reset_watermark(),
            EngineCommand::SetPlaybackState(state) => {
                self.playback = state;
            }
            EngineCommand::SetMasterVolume { volume } => {
                let ramp = (VOLUME_RAMP_SECONDS * self.sample_rate as f64) as u64;
                self.master_volume.ramp_to(volume.clamp(0.0, 1.0), self.now, ramp);
            }
            EngineCommand::FadeOutput { target, seconds } => {
                let ramp = (seconds.max(0.0) * self.sample_rate as f64) as u64;
                self.output_gain.ramp_to(target, self.now, ramp);
            }
            EngineCommand::SetOutputGain { value } => {
                self.output_gain.set_now(value, self.now);
            }
            EngineCommand::SetStabilizerEnabled(enabled) => {
                self.stabilizer.set_enabled(enabled, self.now);
                self.scheduler.set_lead(if enabled {
                    STABILIZED_LEAD_SECONDS
                } else {
                    DIRECT_LEAD_SECONDS
                });
            }
            EngineCommand::SetEffects(settings) => {
                self.chain.apply(&settings);
            }
            EngineCommand::SetAutoVolume {
                enabled,
                frequency_hz,
                min_level_percent,
            } => {
                self.auto_volume.configure(enabled, frequency_hz, min_level_percent);
            }
            EngineCommand::SetFillerBuffer(buffer) => {
                self.filler.set_buffer(buffer);
            }
            EngineCommand::ConfigureFiller {
                enabled,
                volume,
                looped,
            } => {
                self.filler.configure(enabled, volume, looped, self.now);
            }
            EngineCommand::PlayFiller { fade_seconds } => {
                self.filler.play(fade_seconds, self.now);
                self.filler_auto = false;
            }
            EngineCommand::StopFiller { fade_seconds } => {
                self.filler.stop(fade_seconds, self.now);
                self.filler_auto = false;
            }
            EngineCommand::SetFxTap(tap) => {
                self.fx_tap = tap.map(|boxed| *boxed);
            }
            EngineCommand::ResetContext => {
                self.reset_watermark();
                self.chain.reset();
                self.filler.rewind();
            }
        }
    }

    fn submit_chunk(&mut self, buffer: Box<StereoBuffer>) {
        // Chunks arriving outside an active run are stale; drop them
        if !self.playback.is_active() {
            return;
        }
        let now_seconds = self.now as f64 / self.sample_rate as f64;
        let duration = buffer.len() as f64 / self.sample_rate as f64;
        let at = match self.scheduler.schedule(now_seconds, duration) {
            ChunkDecision::Anchor { at } | ChunkDecision::At { at } => at,
            ChunkDecision::Underrun => {
                // The watermark fell behind realtime; this chunk never
                // plays and the next one re-anchors
                self.clock.record_underrun();
                self.queue.clear();
                self.stabilizer.reset(self.now);
                return;
            }
        };
        let start = (at * self.sample_rate as f64) as u64;
        self.queue.push_back(ScheduledChunk { start, buffer });
    }

    fn reset_watermark(&mut self) {
        self.scheduler.reset();
        self.queue.clear();
        self.stabilizer.reset(self.now);
        self.clock.store_watermark(self.now);
    }

    /// Render one callback's worth of audio into `out`
    pub fn process(&mut self, out: &mut StereoBuffer) {
        let n = out.len();
        out.fill_silence();

        self.render_chunks(out);

        // Stabilizer consults the buffer level at a coarse interval and
        // fades the stream, not the filler bed
        let now_seconds = self.now as f64 / self.sample_rate as f64;
        if self.playback.is_active() {
            self.stabilizer
                .update(self.scheduler.buffered_ahead(now_seconds), self.now);
        }
        for (i, sample) in out.iter_mut().enumerate() {
            let g = self.stabilizer.gain_at(self.now + i as u64);
            *sample *= g;
        }

        // Stabilizer fade-out engages the bed; recovery (or leaving the
        // active states) releases it again
        let fading = self.playback.is_active() && self.stabilizer.is_fading_down();
        if fading && !self.stabilizer_was_fading {
            if self.filler.auto_enabled() && !self.filler.is_playing() {
                self.filler.play(FILLER_FADE_IN_SECONDS, self.now);
                self.filler_auto = true;
            }
        } else if !fading && self.stabilizer_was_fading && self.filler_auto {
            self.filler.stop(FILLER_FADE_OUT_SECONDS, self.now);
            self.filler_auto = false;
        }
        self.stabilizer_was_fading = fading;

        self.chain.process(out);

        // Post-effects tap: drop frames when the ring is full rather
        // than ever blocking
        if let Some(tap) = self.fx_tap.as_mut() {
            for sample in out.iter() {
                if tap.push(*sample).is_err() {
                    break;
                }
            }
        }

        for (i, sample) in out.iter_mut().enumerate() {
            let t = self.now + i as u64;
            let g = self.master_volume.value_at(t)
                * self.auto_volume.next(self.sample_rate)
                * self.output_gain.value_at(t);
            *sample *= g;
        }

        // The bed bypasses the output fade: it is exactly what should
        // keep playing while an outage holds the stream at the floor
        self.filler.mix_into(out, self.now);

        self.now += n as u64;
        self.master_volume.settle(self.now);
        self.output_gain.settle(self.now);
        self.clock.advance(n as u64);
        let mark_seconds = {
            let now_seconds = self.now as f64 / self.sample_rate as f64;
            now_seconds + self.scheduler.buffered_ahead(now_seconds)
        };
        self.clock
            .store_watermark((mark_seconds * self.sample_rate as f64) as u64);
    }

    /// Copy scheduled chunks overlapping this block into `out`
    fn render_chunks(&mut self, out: &mut StereoBuffer) {
        let block_start = self.now;
        let block_end = self.now + out.len() as u64;

        // Drop chunks that ended before this block
        while let Some(front) = self.queue.front() {
            if front.start + front.buffer.len() as u64 <= block_start {
                self.queue.pop_front();
            } else {
                break;
            }
        }

        for chunk in &self.queue {
            if chunk.start >= block_end {
                break;
            }
            let chunk_end = chunk.start + chunk.buffer.len() as u64;
            let copy_start = chunk.start.max(block_start);
            let copy_end = chunk_end.min(block_end);
            for t in copy_start..copy_end {
                let out_idx = (t - block_start) as usize;
                let chunk_idx = (t - chunk.start) as usize;
                out[out_idx] = chunk.buffer[chunk_idx];
            }
        }
    }
}
