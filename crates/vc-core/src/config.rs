use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Sample rate the model's feature extractor consumes.
pub const MODEL_INPUT_RATE: u32 = 16_000;
/// Samples per 10 ms at [`MODEL_INPUT_RATE`].
pub const MODEL_INPUT_ZC: usize = 160;
/// Thresholds at or below this level disable silence gating.
pub const GATE_DISABLED_DB: f32 = -60.0;

const MIN_SAMPLE_RATE: u32 = 8_000;
const MAX_SAMPLE_RATE: u32 = 192_000;
const MAX_CHANNELS: u16 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchMethod {
    Pm,
    Harvest,
    Crepe,
    Rmvpe,
    #[default]
    Fcpe,
}

impl PitchMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pm => "pm",
            Self::Harvest => "harvest",
            Self::Crepe => "crepe",
            Self::Rmvpe => "rmvpe",
            Self::Fcpe => "fcpe",
        }
    }
}

impl fmt::Display for PitchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PitchMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pm" => Ok(Self::Pm),
            "harvest" => Ok(Self::Harvest),
            "crepe" => Ok(Self::Crepe),
            "rmvpe" => Ok(Self::Rmvpe),
            "fcpe" => Ok(Self::Fcpe),
            other => Err(format!("unknown pitch method: '{other}'")),
        }
    }
}

/// What the engine emits each period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Run the voice model on every block.
    #[default]
    Convert,
    /// Bypass the model and monitor the (optionally denoised) input.
    Monitor,
}

/// Per-run stream configuration. Takes effect on the next `start()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub block_time: f32,
    pub crossfade_time: f32,
    pub extra_time: f32,
    pub threshold_db: f32,
    pub input_denoise: bool,
    pub output_denoise: bool,
    pub rms_mix_rate: f32,
    pub use_phase_vocoder: bool,
    pub model_sample_rate: u32,
    pub pitch_shift: i32,
    pub formant_shift: f32,
    pub pitch_method: PitchMethod,
    pub mode: ProcessingMode,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 40_000,
            channels: 1,
            block_time: 0.25,
            crossfade_time: 0.05,
            extra_time: 2.5,
            threshold_db: GATE_DISABLED_DB,
            input_denoise: false,
            output_denoise: false,
            rms_mix_rate: 0.0,
            use_phase_vocoder: false,
            model_sample_rate: 40_000,
            pitch_shift: 0,
            formant_shift: 0.0,
            pitch_method: PitchMethod::Fcpe,
            mode: ProcessingMode::Convert,
        }
    }
}

impl StreamConfig {
    /// Checks every field and computes the derived frame sizes.
    pub fn validate(&self) -> Result<FrameSizes, ConfigError> {
        check_rate("sample_rate", self.sample_rate)?;
        check_rate("model_sample_rate", self.model_sample_rate)?;
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(ConfigError::InvalidChannels(self.channels));
        }
        check_duration("block_time", self.block_time)?;
        check_duration("crossfade_time", self.crossfade_time)?;
        check_duration("extra_time", self.extra_time)?;
        if !self.rms_mix_rate.is_finite() || !(0.0..=1.0).contains(&self.rms_mix_rate) {
            return Err(ConfigError::InvalidRatio(self.rms_mix_rate));
        }
        if !self.threshold_db.is_finite() || self.threshold_db > 0.0 {
            return Err(ConfigError::InvalidThreshold(self.threshold_db));
        }
        if !self.formant_shift.is_finite() {
            return Err(ConfigError::InvalidFormant(self.formant_shift));
        }

        let sizes = FrameSizes::derive(self);
        if sizes.block_frame < sizes.zc {
            return Err(ConfigError::InvalidDuration {
                field: "block_time",
                value: self.block_time,
            });
        }
        if sizes.crossfade_frame < sizes.zc {
            return Err(ConfigError::InvalidDuration {
                field: "crossfade_time",
                value: self.crossfade_time,
            });
        }
        if sizes.extra_frame + sizes.crossfade_frame < 3 * sizes.zc {
            return Err(ConfigError::InvalidDuration {
                field: "extra_time",
                value: self.extra_time,
            });
        }
        Ok(sizes)
    }

    /// Parses a (possibly partial) JSON document and validates it.
    pub fn from_json_str(json: &str) -> Result<(Self, FrameSizes), ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let sizes = config.validate()?;
        Ok((config, sizes))
    }

    pub fn gate_enabled(&self) -> bool {
        self.threshold_db > GATE_DISABLED_DB
    }

    pub fn runtime_params(&self) -> RuntimeParams {
        RuntimeParams {
            pitch_shift: self.pitch_shift,
            formant_shift: self.formant_shift,
            threshold_db: self.threshold_db,
            rms_mix_rate: self.rms_mix_rate,
            input_denoise: self.input_denoise,
            output_denoise: self.output_denoise,
            pitch_method: self.pitch_method,
        }
    }
}

fn check_rate(field: &'static str, rate: u32) -> Result<(), ConfigError> {
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&rate) || rate % 100 != 0 {
        return Err(ConfigError::UnsupportedRate { field, rate });
    }
    Ok(())
}

fn check_duration(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::InvalidDuration { field, value });
    }
    Ok(())
}

/// Frame counts derived from a [`StreamConfig`]. Every device-rate count is a
/// multiple of `zc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameSizes {
    pub sample_rate: u32,
    pub model_sample_rate: u32,
    /// Device samples per 10 ms.
    pub zc: usize,
    pub block_frame: usize,
    pub block_frame_16k: usize,
    pub crossfade_frame: usize,
    pub sola_buffer_frame: usize,
    pub sola_search_frame: usize,
    pub extra_frame: usize,
    /// Left context the model consumes without re-emitting, in 10 ms frames.
    pub skip_head: usize,
    /// Span the model returns, in 10 ms frames.
    pub return_length: usize,
}

impl FrameSizes {
    pub fn derive(config: &StreamConfig) -> Self {
        let zc = (config.sample_rate / 100) as usize;
        let frames_of = |seconds: f32| -> usize {
            let units = (seconds as f64 * config.sample_rate as f64 / zc as f64).round();
            units.max(0.0) as usize * zc
        };
        let block_frame = frames_of(config.block_time);
        let crossfade_frame = frames_of(config.crossfade_time);
        let extra_frame = frames_of(config.extra_time);
        let sola_buffer_frame = crossfade_frame.min(4 * zc);
        let sola_search_frame = zc;
        let block_frame_16k = if zc == 0 {
            0
        } else {
            MODEL_INPUT_ZC * block_frame / zc
        };
        let (skip_head, return_length) = if zc == 0 {
            (0, 0)
        } else {
            (
                extra_frame / zc,
                (block_frame + sola_buffer_frame + sola_search_frame) / zc,
            )
        };
        Self {
            sample_rate: config.sample_rate,
            model_sample_rate: config.model_sample_rate,
            zc,
            block_frame,
            block_frame_16k,
            crossfade_frame,
            sola_buffer_frame,
            sola_search_frame,
            extra_frame,
            skip_head,
            return_length,
        }
    }

    /// Length of the device-rate histories (`input_wav`, its denoised mirror,
    /// `output_buffer`).
    pub fn history_len(&self) -> usize {
        self.extra_frame + self.crossfade_frame + self.sola_search_frame + self.block_frame
    }

    /// Length of the 16 kHz model-input history.
    pub fn history_len_16k(&self) -> usize {
        MODEL_INPUT_ZC * self.history_len() / self.zc.max(1)
    }

    /// Lookback kept by the silence gate.
    pub fn rms_lookback_len(&self) -> usize {
        4 * self.zc
    }

    /// Samples per 10 ms at the model's output rate.
    pub fn model_zc(&self) -> usize {
        (self.model_sample_rate / 100) as usize
    }

    /// Samples the model writes per call, at its own rate.
    pub fn model_output_len(&self) -> usize {
        self.return_length * self.model_zc()
    }

    /// Device-rate length of the synthesized window once resampled.
    pub fn infer_len(&self) -> usize {
        self.return_length * self.zc
    }

    pub fn block_period_secs(&self) -> f64 {
        self.block_frame as f64 / self.sample_rate.max(1) as f64
    }
}

/// Parameters that may change while the stream runs. Swapped in as a whole at
/// the top of a callback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeParams {
    pub pitch_shift: i32,
    pub formant_shift: f32,
    pub threshold_db: f32,
    pub rms_mix_rate: f32,
    pub input_denoise: bool,
    pub output_denoise: bool,
    pub pitch_method: PitchMethod,
}

impl Default for RuntimeParams {
    fn default() -> Self {
        StreamConfig::default().runtime_params()
    }
}

impl RuntimeParams {
    pub fn gate_enabled(&self) -> bool {
        self.threshold_db > GATE_DISABLED_DB
    }

    /// Applies one update. Out-of-range values are clamped into range.
    pub fn apply(&mut self, param: RuntimeParam) {
        match param {
            RuntimeParam::PitchShift(semitones) => self.pitch_shift = semitones,
            RuntimeParam::FormantShift(shift) if shift.is_finite() => self.formant_shift = shift,
            RuntimeParam::FormantShift(_) => {}
            RuntimeParam::Threshold(db) if db.is_finite() => self.threshold_db = db.min(0.0),
            RuntimeParam::Threshold(_) => {}
            RuntimeParam::RmsMixRate(rate) if rate.is_finite() => {
                self.rms_mix_rate = rate.clamp(0.0, 1.0)
            }
            RuntimeParam::RmsMixRate(_) => {}
            RuntimeParam::NoiseReduce { input, output } => {
                self.input_denoise = input;
                self.output_denoise = output;
            }
            RuntimeParam::PitchMethod(method) => self.pitch_method = method,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuntimeParam {
    PitchShift(i32),
    FormantShift(f32),
    Threshold(f32),
    RmsMixRate(f32),
    NoiseReduce { input: bool, output: bool },
    PitchMethod(PitchMethod),
}
