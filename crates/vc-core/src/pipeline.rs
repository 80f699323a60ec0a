use crate::{PitchMethod, Result};

/// One inference request, built by the engine every period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferRequest {
    /// New 16 kHz samples appended to the window since the previous call.
    pub block_frame_16k: usize,
    /// 10 ms frames of left context to consume without re-emitting.
    pub skip_head: usize,
    /// 10 ms frames to return, at the model's own rate.
    pub return_length: usize,
    pub pitch_method: PitchMethod,
    pub pitch_shift: i32,
    pub formant_shift: f32,
}

/// Voice-conversion model. Owned by the caller and shared with the engine,
/// which only ever calls [`VoiceModel::infer`].
pub trait VoiceModel: Send + Sync + 'static {
    /// Rate of the waveform written by [`VoiceModel::infer`].
    fn target_sample_rate(&self) -> u32;

    /// Synthesizes `request.return_length` 10 ms frames from the 16 kHz
    /// history `window` into `out`, whose length is
    /// `return_length * target_sample_rate / 100`.
    fn infer(&self, window: &[f32], request: &InferRequest, out: &mut [f32]) -> Result<()>;
}

/// Spectral denoiser. Stateless across calls; the engine passes overlapping
/// context explicitly.
pub trait Denoiser: Send + Sync + 'static {
    /// Denoises `signal` into `out` (same length), estimating the noise floor
    /// from `noise_reference`.
    fn denoise(&self, signal: &[f32], noise_reference: &[f32], out: &mut [f32]) -> Result<()>;
}
