pub mod config;
pub mod error;
pub mod pipeline;

pub use config::{
    FrameSizes, PitchMethod, ProcessingMode, RuntimeParam, RuntimeParams, StreamConfig,
    GATE_DISABLED_DB, MODEL_INPUT_RATE, MODEL_INPUT_ZC,
};
pub use error::{ConfigError, PortError, Result, RuntimeError, StartError, VcError};
pub use pipeline::{Denoiser, InferRequest, VoiceModel};
