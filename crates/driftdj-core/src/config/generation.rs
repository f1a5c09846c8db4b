//! Generation/session tuning record and its resolution into effect settings
//!
//! `GenerationConfig` is a flat record of optional fields. Absent fields
//! fall back to the defaults record at application time; the config itself
//! is immutable per application and swapped wholesale on every change.
//!
//! `EffectSettings::resolve` turns `(config, defaults)` into a fully
//! populated, finite-checked settings record for the effect chain. Audio
//! parameters must never see NaN or infinity, so every numeric passes
//! through a finite-or-default repair here rather than at each stage.

use serde::{Deserialize, Serialize};

/// Parametric filter types supported by the EQ stage
///
/// `Allpass` doubles as the neutral state the stage parks in while the
/// EQ is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EqFilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Lowshelf,
    Highshelf,
    #[default]
    Peaking,
    Notch,
    Allpass,
}

impl EqFilterType {
    /// Whether the dB gain control is meaningful for this filter type
    pub fn uses_gain(&self) -> bool {
        matches!(
            self,
            EqFilterType::Peaking | EqFilterType::Lowshelf | EqFilterType::Highshelf
        )
    }
}

/// The full tuning record, UI-facing and preset-serialized
///
/// Fields group into (a) model-level generation parameters forwarded to
/// the remote session and (b) client effect parameters consumed locally.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationConfig {
    // Model-level parameters
    pub temperature: Option<f64>,
    pub top_k: Option<u32>,
    pub guidance: Option<f64>,
    pub seed: Option<i64>,
    pub bpm: Option<u32>,
    pub density: Option<f64>,
    pub brightness: Option<f64>,
    pub scale: Option<String>,
    pub mute_bass: Option<bool>,
    pub mute_drums: Option<bool>,
    pub only_bass_and_drums: Option<bool>,
    /// Model-side echo send, distinct from the client echo stage
    pub echo_mix: Option<f64>,
    /// Model-side reverb send, distinct from the client reverb stage
    pub reverb_mix: Option<f64>,

    // Distortion
    pub distortion_enabled: Option<bool>,
    pub distortion_amount: Option<f32>,

    // Chorus
    pub chorus_enabled: Option<bool>,
    pub chorus_rate: Option<f32>,
    pub chorus_depth: Option<f32>,
    pub chorus_delay: Option<f32>,
    pub chorus_feedback: Option<f32>,

    // Client echo
    pub echo_ui_enabled: Option<bool>,
    pub echo_ui_delay_time: Option<f32>,
    pub echo_ui_feedback: Option<f32>,
    pub echo_ui_mix: Option<f32>,

    // Client reverb (feedback delay tuned as a small-room tail)
    pub reverb_ui_enabled: Option<bool>,
    pub reverb_ui_delay_time: Option<f32>,
    pub reverb_ui_decay: Option<f32>,
    pub reverb_ui_mix: Option<f32>,

    // Flanger
    pub flanger_enabled: Option<bool>,
    pub flanger_rate: Option<f32>,
    pub flanger_depth: Option<f32>,
    pub flanger_delay: Option<f32>,
    pub flanger_feedback: Option<f32>,

    // EQ
    pub eq_enabled: Option<bool>,
    pub eq_type: Option<EqFilterType>,
    pub eq_frequency: Option<f32>,
    pub eq_q: Option<f32>,
    pub eq_gain: Option<f32>,

    // Compressor
    pub compressor_enabled: Option<bool>,
    pub compressor_threshold: Option<f32>,
    pub compressor_knee: Option<f32>,
    pub compressor_ratio: Option<f32>,
    pub compressor_attack: Option<f32>,
    pub compressor_release: Option<f32>,

    // Phaser
    pub phaser_enabled: Option<bool>,
    pub phaser_rate: Option<f32>,
    pub phaser_depth: Option<f32>,
    pub phaser_feedback: Option<f32>,
    pub phaser_stages: Option<f32>,
    pub phaser_base_frequency: Option<f32>,

    // Tremolo
    pub tremolo_enabled: Option<bool>,
    pub tremolo_rate: Option<f32>,
    pub tremolo_depth: Option<f32>,

    // Stereo phase shift (right channel), 0 = 0 deg .. 1 = 360 deg
    pub stereo_phase_shift_amount: Option<f32>,
}

impl GenerationConfig {
    /// The canonical defaults record
    ///
    /// Every client-effect field is populated; resolution falls back to
    /// these whenever the active config leaves a field unset or carries a
    /// non-finite value.
    pub fn defaults() -> Self {
        Self {
            temperature: Some(1.1),
            top_k: Some(40),
            guidance: Some(4.0),
            echo_mix: Some(0.0),
            reverb_mix: Some(0.0),
            distortion_enabled: Some(false),
            distortion_amount: Some(0.4),
            chorus_enabled: Some(false),
            chorus_rate: Some(1.5),
            chorus_depth: Some(0.3),
            chorus_delay: Some(0.025),
            chorus_feedback: Some(0.0),
            echo_ui_enabled: Some(false),
            echo_ui_delay_time: Some(0.25),
            echo_ui_feedback: Some(0.3),
            echo_ui_mix: Some(0.3),
            reverb_ui_enabled: Some(false),
            reverb_ui_delay_time: Some(0.05),
            reverb_ui_decay: Some(0.2),
            reverb_ui_mix: Some(0.25),
            flanger_enabled: Some(false),
            flanger_rate: Some(0.2),
            flanger_depth: Some(0.002),
            flanger_delay: Some(0.005),
            flanger_feedback: Some(0.5),
            eq_enabled: Some(false),
            eq_type: Some(EqFilterType::Peaking),
            eq_frequency: Some(800.0),
            eq_q: Some(1.0),
            eq_gain: Some(6.0),
            compressor_enabled: Some(false),
            compressor_threshold: Some(-24.0),
            compressor_knee: Some(30.0),
            compressor_ratio: Some(12.0),
            compressor_attack: Some(0.003),
            compressor_release: Some(0.25),
            phaser_enabled: Some(false),
            phaser_rate: Some(0.5),
            phaser_depth: Some(0.5),
            phaser_feedback: Some(0.3),
            phaser_stages: Some(4.0),
            phaser_base_frequency: Some(700.0),
            tremolo_enabled: Some(false),
            tremolo_rate: Some(5.0),
            tremolo_depth: Some(0.5),
            stereo_phase_shift_amount: Some(0.0),
            ..Default::default()
        }
    }

    /// The model-only subset sent to the remote session
    ///
    /// Client-effect fields are stripped; the service has no business
    /// seeing them.
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            temperature: self.temperature,
            top_k: self.top_k,
            guidance: self.guidance,
            seed: self.seed,
            bpm: self.bpm,
            density: self.density,
            brightness: self.brightness,
            scale: self.scale.clone(),
            mute_bass: self.mute_bass,
            mute_drums: self.mute_drums,
            only_bass_and_drums: self.only_bass_and_drums,
            echo_mix: self.echo_mix,
            reverb_mix: self.reverb_mix,
        }
    }
}

/// Model-level generation parameters, forwarded verbatim to the service
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelConfig {
    pub temperature: Option<f64>,
    pub top_k: Option<u32>,
    pub guidance: Option<f64>,
    pub seed: Option<i64>,
    pub bpm: Option<u32>,
    pub density: Option<f64>,
    pub brightness: Option<f64>,
    pub scale: Option<String>,
    pub mute_bass: Option<bool>,
    pub mute_drums: Option<bool>,
    pub only_bass_and_drums: Option<bool>,
    pub echo_mix: Option<f64>,
    pub reverb_mix: Option<f64>,
}

/// Replace an unset or non-finite value with the default
#[inline]
fn finite_or(value: Option<f32>, default: f32) -> f32 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => default,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionSettings {
    pub enabled: bool,
    pub amount: f32,
}

/// Settings for the LFO-modulated delay stages (chorus and flanger)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModDelaySettings {
    pub enabled: bool,
    /// LFO frequency in Hz
    pub rate: f32,
    /// LFO excursion applied to the delay time, in seconds
    pub lfo_amount: f32,
    /// Base delay time in seconds
    pub delay: f32,
    pub feedback: f32,
}

/// Settings for the plain feedback-delay stages (echo and reverb)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackDelaySettings {
    pub enabled: bool,
    pub delay_time: f32,
    pub feedback: f32,
    pub mix: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqSettings {
    pub enabled: bool,
    pub filter_type: EqFilterType,
    pub frequency: f32,
    pub q: f32,
    pub gain_db: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorSettings {
    pub enabled: bool,
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack: f32,
    pub release: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaserSettings {
    pub enabled: bool,
    pub rate: f32,
    /// LFO gain in Hz applied around the base frequency
    pub lfo_amount: f32,
    pub feedback: f32,
    /// Number of active allpass stages
    pub stages: usize,
    pub base_frequency: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TremoloSettings {
    pub enabled: bool,
    pub rate: f32,
    pub depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoPhaseSettings {
    /// Gain applied to the right channel: cos(amount * 2π)
    pub right_gain: f32,
}

/// Fully resolved, finite-checked settings for the whole chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectSettings {
    pub distortion: DistortionSettings,
    pub chorus: ModDelaySettings,
    pub echo: FeedbackDelaySettings,
    pub reverb: FeedbackDelaySettings,
    pub flanger: ModDelaySettings,
    pub eq: EqSettings,
    pub compressor: CompressorSettings,
    pub phaser: PhaserSettings,
    pub tremolo: TremoloSettings,
    pub stereo_phase: StereoPhaseSettings,
}

impl EffectSettings {
    /// Resolve `(config, defaults)` into concrete stage settings
    ///
    /// Field precedence is config value, else default, else a hardcoded
    /// fallback; every numeric is finite-or-default repaired. Enabling a
    /// stage whose primary intensity parameter sits at its no-op value
    /// snaps that parameter to the default so the toggle is audible.
    pub fn resolve(config: &GenerationConfig, defaults: &GenerationConfig) -> Self {
        let canonical = GenerationConfig::defaults();
        // Guard the defaults record itself; a corrupted defaults record
        // must not smuggle non-finite values past the repair.
        let d = |field: fn(&GenerationConfig) -> Option<f32>| -> f32 {
            finite_or(field(defaults), field(&canonical).unwrap_or(0.0))
        };

        // Distortion
        let distortion_enabled = config
            .distortion_enabled
            .or(defaults.distortion_enabled)
            .unwrap_or(false);
        let default_dist_amount = d(|c| c.distortion_amount);
        let mut distortion_amount = if distortion_enabled {
            finite_or(config.distortion_amount, default_dist_amount)
        } else {
            0.0
        };
        if distortion_enabled && distortion_amount == 0.0 {
            distortion_amount = default_dist_amount;
        }

        // Chorus
        let chorus_enabled = config.chorus_enabled.or(defaults.chorus_enabled).unwrap_or(false);
        let chorus = if chorus_enabled {
            let depth = finite_or(config.chorus_depth, d(|c| c.chorus_depth));
            ModDelaySettings {
                enabled: true,
                rate: finite_or(config.chorus_rate, d(|c| c.chorus_rate)),
                // Depth maps to a small delay-time excursion
                lfo_amount: finite_or(Some(depth * 0.005), 0.0),
                delay: finite_or(config.chorus_delay, d(|c| c.chorus_delay)),
                feedback: finite_or(config.chorus_feedback, d(|c| c.chorus_feedback)),
            }
        } else {
            ModDelaySettings {
                enabled: false,
                rate: d(|c| c.chorus_rate),
                lfo_amount: 0.0,
                delay: d(|c| c.chorus_delay),
                feedback: 0.0,
            }
        };

        // Echo
        let echo_enabled = config.echo_ui_enabled.or(defaults.echo_ui_enabled).unwrap_or(false);
        let default_echo_mix = d(|c| c.echo_ui_mix);
        let mut echo_mix = finite_or(config.echo_ui_mix, default_echo_mix);
        if echo_enabled && echo_mix == 0.0 {
            echo_mix = default_echo_mix;
        }
        let echo = if echo_enabled {
            FeedbackDelaySettings {
                enabled: true,
                delay_time: finite_or(config.echo_ui_delay_time, d(|c| c.echo_ui_delay_time)),
                feedback: finite_or(config.echo_ui_feedback, d(|c| c.echo_ui_feedback)),
                mix: echo_mix,
            }
        } else {
            FeedbackDelaySettings {
                enabled: false,
                delay_time: d(|c| c.echo_ui_delay_time),
                feedback: 0.0,
                mix: 0.0,
            }
        };

        // Reverb
        let reverb_enabled = config
            .reverb_ui_enabled
            .or(defaults.reverb_ui_enabled)
            .unwrap_or(false);
        let default_reverb_mix = d(|c| c.reverb_ui_mix);
        let mut reverb_mix = finite_or(config.reverb_ui_mix, default_reverb_mix);
        if reverb_enabled && reverb_mix == 0.0 {
            reverb_mix = default_reverb_mix;
        }
        let reverb = if reverb_enabled {
            FeedbackDelaySettings {
                enabled: true,
                delay_time: finite_or(config.reverb_ui_delay_time, d(|c| c.reverb_ui_delay_time)),
                feedback: finite_or(config.reverb_ui_decay, d(|c| c.reverb_ui_decay)),
                mix: reverb_mix,
            }
        } else {
            FeedbackDelaySettings {
                enabled: false,
                delay_time: d(|c| c.reverb_ui_delay_time),
                feedback: 0.0,
                mix: 0.0,
            }
        };

        // Flanger: depth is the LFO excursion in seconds directly
        let flanger_enabled = config.flanger_enabled.or(defaults.flanger_enabled).unwrap_or(false);
        let flanger = if flanger_enabled {
            ModDelaySettings {
                enabled: true,
                rate: finite_or(config.flanger_rate, d(|c| c.flanger_rate)),
                lfo_amount: finite_or(config.flanger_depth, d(|c| c.flanger_depth)),
                delay: finite_or(config.flanger_delay, d(|c| c.flanger_delay)),
                feedback: finite_or(config.flanger_feedback, d(|c| c.flanger_feedback)),
            }
        } else {
            ModDelaySettings {
                enabled: false,
                rate: d(|c| c.flanger_rate),
                lfo_amount: 0.0,
                delay: d(|c| c.flanger_delay),
                feedback: 0.0,
            }
        };

        // EQ
        let eq_enabled = config.eq_enabled.or(defaults.eq_enabled).unwrap_or(false);
        let eq = if eq_enabled {
            let filter_type = config
                .eq_type
                .or(defaults.eq_type)
                .unwrap_or(EqFilterType::Peaking);
            let gain_db = if filter_type.uses_gain() {
                finite_or(config.eq_gain, d(|c| c.eq_gain))
            } else {
                0.0
            };
            EqSettings {
                enabled: true,
                filter_type,
                frequency: finite_or(config.eq_frequency, d(|c| c.eq_frequency)),
                q: finite_or(config.eq_q, d(|c| c.eq_q)),
                gain_db,
            }
        } else {
            EqSettings {
                enabled: false,
                filter_type: EqFilterType::Allpass,
                frequency: d(|c| c.eq_frequency),
                q: d(|c| c.eq_q),
                gain_db: 0.0,
            }
        };

        // Compressor: parameters are resolved even when disabled so the
        // stage parks at defaults rather than whatever came last
        let compressor_enabled = config
            .compressor_enabled
            .or(defaults.compressor_enabled)
            .unwrap_or(false);
        let compressor = if compressor_enabled {
            CompressorSettings {
                enabled: true,
                threshold_db: finite_or(config.compressor_threshold, d(|c| c.compressor_threshold)),
                knee_db: finite_or(config.compressor_knee, d(|c| c.compressor_knee)),
                ratio: finite_or(config.compressor_ratio, d(|c| c.compressor_ratio)),
                attack: finite_or(config.compressor_attack, d(|c| c.compressor_attack)),
                release: finite_or(config.compressor_release, d(|c| c.compressor_release)),
            }
        } else {
            CompressorSettings {
                enabled: false,
                threshold_db: d(|c| c.compressor_threshold),
                knee_db: d(|c| c.compressor_knee),
                ratio: d(|c| c.compressor_ratio),
                attack: d(|c| c.compressor_attack),
                release: d(|c| c.compressor_release),
            }
        };

        // Phaser
        let phaser_enabled = config.phaser_enabled.or(defaults.phaser_enabled).unwrap_or(false);
        let base_frequency = finite_or(config.phaser_base_frequency, d(|c| c.phaser_base_frequency));
        let phaser = if phaser_enabled {
            let depth = finite_or(config.phaser_depth, d(|c| c.phaser_depth));
            let stages = finite_or(config.phaser_stages, d(|c| c.phaser_stages)).round();
            PhaserSettings {
                enabled: true,
                rate: finite_or(config.phaser_rate, d(|c| c.phaser_rate)),
                lfo_amount: finite_or(Some(depth * base_frequency * 0.7), 0.0),
                feedback: finite_or(config.phaser_feedback, d(|c| c.phaser_feedback)),
                stages: (stages.max(0.0) as usize).min(crate::effect::stages::MAX_PHASER_STAGES),
                base_frequency,
            }
        } else {
            PhaserSettings {
                enabled: false,
                rate: d(|c| c.phaser_rate),
                lfo_amount: 0.0,
                feedback: 0.0,
                stages: 0,
                base_frequency,
            }
        };

        // Tremolo
        let tremolo_enabled = config.tremolo_enabled.or(defaults.tremolo_enabled).unwrap_or(false);
        let tremolo = if tremolo_enabled {
            TremoloSettings {
                enabled: true,
                rate: finite_or(config.tremolo_rate, d(|c| c.tremolo_rate)),
                depth: finite_or(config.tremolo_depth, d(|c| c.tremolo_depth)),
            }
        } else {
            TremoloSettings {
                enabled: false,
                rate: d(|c| c.tremolo_rate),
                depth: 0.0,
            }
        };

        // Stereo phase shift: applied regardless of an enable flag; the
        // neutral amount 0 yields gain cos(0) = 1
        let amount = finite_or(
            config.stereo_phase_shift_amount,
            d(|c| c.stereo_phase_shift_amount),
        );
        let right_gain = (amount * 2.0 * std::f32::consts::PI).cos();
        let stereo_phase = StereoPhaseSettings {
            right_gain: if right_gain.is_finite() { right_gain } else { 1.0 },
        };

        Self {
            distortion: DistortionSettings {
                enabled: distortion_enabled,
                amount: distortion_amount,
            },
            chorus,
            echo,
            reverb,
            flanger,
            eq,
            compressor,
            phaser,
            tremolo,
            stereo_phase,
        }
    }
}
