//! CPAL audio backend implementation
//!
//! Single stereo output. The audio callback owns the engine, drains the
//! command queue, renders into a pre-allocated stereo buffer, and copies
//! the result into the device buffer.
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  Control Thread  │───push()───────────►│   Command Queue     │
//! │  (orchestrator)  │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!         │                                           │
//!         │ Relaxed atomics (clock)                   │ pop()
//!         ▼                                           ▼
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │   SharedClock    │◄────────────────────│  CPAL Audio Thread  │
//! │   (lock-free)    │     sync writes     │  (owns AudioEngine) │
//! └──────────────────┘                     └─────────────────────┘
//! ```

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::error::{AudioError, AudioResult};
use super::{DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE};
use crate::engine::{command_channel, AudioEngine, EngineCommand, SharedClock};
use crate::types::{StereoBuffer, SAMPLE_RATE};

/// Keeps the audio stream alive. Drop this to stop audio.
pub struct AudioHandle {
    _stream: Stream,
    sample_rate: u32,
    buffer_size: u32,
}

impl AudioHandle {
    /// Sample rate the stream actually runs at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Actual buffer size in frames (as negotiated with the device)
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Audio latency in milliseconds (one-way, output only)
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

/// Control-side handle for sending commands to the audio thread
pub struct CommandSender {
    producer: rtrb::Producer<EngineCommand>,
}

impl CommandSender {
    /// Wrap a raw command producer
    ///
    /// `start_audio_system` builds one of these for the live stream;
    /// headless setups pair a producer from `command_channel` with an
    /// engine they drive themselves.
    pub fn new(producer: rtrb::Producer<EngineCommand>) -> Self {
        Self { producer }
    }

    /// Send a command to the audio thread (non-blocking)
    ///
    /// Returns the command back if the queue is full. The queue is sized
    /// generously, so a full queue means the audio thread has stalled.
    pub fn send(&mut self, command: EngineCommand) -> Result<(), EngineCommand> {
        self.producer.push(command).map_err(|e| match e {
            rtrb::PushError::Full(cmd) => cmd,
        })
    }
}

/// Everything the control thread needs after the stream is up
pub struct AudioSystemResult {
    pub handle: AudioHandle,
    pub command_sender: CommandSender,
    /// Sample-counter clock published by the audio thread
    pub clock: SharedClock,
    pub sample_rate: u32,
    pub buffer_size: u32,
    pub latency_ms: f32,
}

/// Start the audio system on the default output device
pub fn start_audio_system() -> AudioResult<AudioSystemResult> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::NoDefaultDevice("No default output device".to_string()))?;

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let (supported_config, buffer_size) = get_output_config(&device)?;
    let sample_rate = supported_config.sample_rate().0;

    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    let latency_ms = (buffer_size as f32 / sample_rate as f32) * 1000.0;

    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        latency_ms
    );

    let engine = AudioEngine::new(sample_rate);
    let clock = engine.shared_clock();

    let (command_tx, command_rx) = command_channel();

    let callback_state = AudioCallbackState::new(engine, command_rx);
    let callback_state = Arc::new(std::sync::Mutex::new(callback_state));

    let stream = build_output_stream(&device, &stream_config, callback_state)?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    log::info!("Audio stream started");

    Ok(AudioSystemResult {
        handle: AudioHandle {
            _stream: stream,
            sample_rate,
            buffer_size,
        },
        command_sender: CommandSender {
            producer: command_tx,
        },
        clock,
        sample_rate,
        buffer_size,
        latency_ms,
    })
}

/// State for the audio callback; owned exclusively by the audio thread
struct AudioCallbackState {
    engine: AudioEngine,
    command_rx: rtrb::Consumer<EngineCommand>,
    /// Pre-allocated output buffer
    output_buffer: StereoBuffer,
}

impl AudioCallbackState {
    fn new(engine: AudioEngine, command_rx: rtrb::Consumer<EngineCommand>) -> Self {
        Self {
            engine,
            command_rx,
            output_buffer: StereoBuffer::silence(MAX_BUFFER_SIZE),
        }
    }

    /// Process one callback's worth of audio
    fn process(&mut self, n_frames: usize) {
        // Set working buffer length (RT-safe: no allocation)
        self.output_buffer.set_len_from_capacity(n_frames);

        // Drain commands from the control thread (lock-free)
        self.engine.process_commands(&mut self.command_rx);

        self.engine.process(&mut self.output_buffer);
    }
}

/// Pick the best output configuration for a device
///
/// Returns (SupportedStreamConfig, buffer_size_in_frames). Prefers f32
/// stereo at the stream's native 48kHz; falls back to whatever the
/// device offers.
fn get_output_config(device: &cpal::Device) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "No supported output configurations".to_string(),
        ));
    }

    let target_sample_rate = SAMPLE_RATE;

    let best_config = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= 2)
        .find(|c| {
            target_sample_rate >= c.min_sample_rate().0
                && target_sample_rate <= c.max_sample_rate().0
        })
        .or_else(|| supported_configs.iter().find(|c| c.channels() >= 2))
        .or_else(|| supported_configs.first())
        .ok_or_else(|| {
            AudioError::ConfigError("No suitable output configuration found".to_string())
        })?;

    let sample_rate = if target_sample_rate >= best_config.min_sample_rate().0
        && target_sample_rate <= best_config.max_sample_rate().0
    {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz (stream plays off-rate)",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    let stream_config = best_config.clone().with_sample_rate(sample_rate);
    let buffer_size = DEFAULT_BUFFER_SIZE.min(MAX_BUFFER_SIZE as u32);

    Ok((stream_config, buffer_size))
}

/// Build the output stream
fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    state: Arc<std::sync::Mutex<AudioCallbackState>>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let mut state = match state.lock() {
                    Ok(s) => s,
                    Err(_) => {
                        data.fill(0.0);
                        return;
                    }
                };
                let n_frames = data.len() / channels;

                state.process(n_frames);

                let samples = state.output_buffer.as_slice();
                for (i, frame) in data.chunks_mut(channels).enumerate() {
                    if i < samples.len() {
                        let sample = samples[i];
                        frame[0] = sample.left;
                        if channels > 1 {
                            frame[1] = sample.right;
                        }
                        // Fill additional channels with silence
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    } else {
                        for ch in frame.iter_mut() {
                            *ch = 0.0;
                        }
                    }
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None, // No timeout (blocking)
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}
