use thiserror::Error;

pub type Result<T> = std::result::Result<T, VcError>;

/// Error returned by collaborators (model, denoiser) and general plumbing.
#[derive(Debug, Error)]
pub enum VcError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("audio backend error: {0}")]
    Audio(String),
    #[error("inference engine error: {0}")]
    Inference(String),
    #[error("denoiser error: {0}")]
    Denoise(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid duration for {field}: {value}")]
    InvalidDuration { field: &'static str, value: f32 },
    #[error("unsupported {field}: {rate} Hz (must be 8000..=192000 and divisible by 100)")]
    UnsupportedRate { field: &'static str, rate: u32 },
    #[error("unsupported channel count: {0}")]
    InvalidChannels(u16),
    #[error("rms mix rate must be within [0, 1], got {0}")]
    InvalidRatio(f32),
    #[error("threshold must be a finite dB value <= 0, got {0}")]
    InvalidThreshold(f32),
    #[error("formant shift must be finite, got {0}")]
    InvalidFormant(f32),
    #[error("failed to parse stream config: {0}")]
    Parse(String),
}

/// Failure reported by an audio I/O port.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("device not found: '{0}'")]
    DeviceNotFound(String),
    #[error("unsupported stream config: {0}")]
    UnsupportedConfig(String),
    #[error("audio backend error: {0}")]
    Backend(String),
    #[error("port is not open")]
    NotOpen,
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("stream is already running")]
    AlreadyRunning,
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(#[source] PortError),
    #[error("convert mode requires a voice model")]
    ModelUnavailable,
    #[error("model renders at {model} Hz but config expects {configured} Hz")]
    ModelRateMismatch { configured: u32, model: u32 },
}

impl From<PortError> for StartError {
    fn from(err: PortError) -> Self {
        Self::DeviceUnavailable(err)
    }
}

/// Kinds of failure inside the audio callback. Carries no heap data so it can
/// be recorded from the realtime thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[repr(u8)]
pub enum RuntimeError {
    #[error("block size does not match the configured stream")]
    BlockSize = 1,
    #[error("model inference failed")]
    Model = 2,
    #[error("denoiser failed")]
    Denoise = 3,
    #[error("non-finite samples detected")]
    NonFinite = 4,
    #[error("callback panicked")]
    Panicked = 5,
}

impl RuntimeError {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::BlockSize),
            2 => Some(Self::Model),
            3 => Some(Self::Denoise),
            4 => Some(Self::NonFinite),
            5 => Some(Self::Panicked),
            _ => None,
        }
    }
}
