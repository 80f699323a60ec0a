//! Realtime DSP building blocks: rolling buffers, resampling, short-time RMS
//! and crossfade windows. Nothing here allocates once constructed.

mod buffer;
mod phase_vocoder;
mod resample;
mod rms;
mod window;

pub use buffer::ShiftBuffer;
pub use phase_vocoder::PhaseVocoder;
pub use resample::{resample_hq_into, HqResampler};
pub use rms::{amplitude_to_db, compute_rms, frame_count, frame_rms_into, interpolate_frames_into};
pub use window::FadeWindows;
