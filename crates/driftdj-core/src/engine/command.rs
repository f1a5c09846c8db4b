//! Lock-free command queue for real-time engine control
//!
//! The control thread sends commands via a lock-free SPSC queue and the
//! audio thread drains them at the top of each callback. No mutex sits
//! between the two, so a slow control thread can never starve the
//! callback and a busy callback can never block the control thread.
//!
//! Large payloads (decoded chunks, the filler bed, effect settings) are
//! boxed so the enum itself stays pointer-sized and cache-friendly in
//! the ring buffer.

use crate::config::EffectSettings;
use crate::types::{PlaybackState, StereoBuffer, StereoSample};

/// Commands sent from the control thread to the audio thread
pub enum EngineCommand {
    // ─────────────────────────────────────────────────────────────
    // Stream
    // ─────────────────────────────────────────────────────────────
    /// Enqueue a decoded chunk for scheduling at the watermark
    ///
    /// Boxed: a chunk is ~2s of stereo f32 (hundreds of KB).
    SubmitChunk(Box<StereoBuffer>),
    /// Drop the watermark and all queued audio; the next chunk re-anchors
    ResetWatermark,
    /// Playback state as the orchestrator sees it
    ///
    /// Chunks submitted while inactive are dropped, and the stabilizer
    /// only engages the filler bed while active.
    SetPlaybackState(PlaybackState),

    // ─────────────────────────────────────────────────────────────
    // Gains
    // ─────────────────────────────────────────────────────────────
    /// Set the user master volume (short internal ramp)
    SetMasterVolume { volume: f32 },
    /// Fade the output gain, used for pause/resume fades
    FadeOutput { target: f32, seconds: f64 },
    /// Jump the output gain immediately (pre-loading mute)
    SetOutputGain { value: f32 },

    // ─────────────────────────────────────────────────────────────
    // Processing
    // ─────────────────────────────────────────────────────────────
    SetStabilizerEnabled(bool),
    /// Swap the resolved effect settings wholesale
    SetEffects(Box<EffectSettings>),
    SetAutoVolume {
        enabled: bool,
        frequency_hz: f64,
        min_level_percent: f64,
    },

    // ─────────────────────────────────────────────────────────────
    // Filler bed
    // ─────────────────────────────────────────────────────────────
    /// Install a decoded bed buffer
    SetFillerBuffer(Box<StereoBuffer>),
    ConfigureFiller {
        enabled: bool,
        volume: f32,
        looped: bool,
    },
    /// Start the bed with a fade-in, independent of the stabilizer
    PlayFiller { fade_seconds: f64 },
    /// Fade the bed out and release it
    StopFiller { fade_seconds: f64 },

    // ─────────────────────────────────────────────────────────────
    // Taps
    // ─────────────────────────────────────────────────────────────
    /// Arm or disarm the post-effects tap
    ///
    /// The audio thread pushes processed frames into the producer while
    /// armed; the control thread drains the matching consumer.
    SetFxTap(Option<Box<rtrb::Producer<StereoSample>>>),

    // ─────────────────────────────────────────────────────────────
    // Global
    // ─────────────────────────────────────────────────────────────
    /// Full audio reset: watermark, queue, effect state, filler position
    ResetContext,
}

/// Capacity of the command queue
///
/// Chunk submission is ~1 command every 2 seconds and settings swaps are
/// throttled upstream, but a reconnect can burst the full settings +
/// filler + state sequence at once. 1024 is far more headroom than that
/// needs while staying small.
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Create a new command channel (producer/consumer pair)
///
/// Producer side is owned by the control thread, consumer side by the
/// audio thread.
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_channel_roundtrip() {
        let (mut tx, mut rx) = command_channel();

        tx.push(EngineCommand::SetMasterVolume { volume: 0.8 }).unwrap();

        let cmd = rx.pop().unwrap();
        assert!(matches!(cmd, EngineCommand::SetMasterVolume { volume } if volume == 0.8));
    }

    #[test]
    fn test_command_channel_empty() {
        let (_tx, mut rx) = command_channel();
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_command_size() {
        // Keep EngineCommand small for cache efficiency in the ring
        // buffer; large payloads must be boxed.
        let size = std::mem::size_of::<EngineCommand>();
        assert!(size <= 40, "EngineCommand is {} bytes, expected <= 40", size);
    }
}
