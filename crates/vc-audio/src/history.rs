use vc_core::FrameSizes;
use vc_signal::ShiftBuffer;

/// Rolling sample histories for one running stream. Sized once from
/// [`FrameSizes`]; no buffer changes length afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameHistory {
    input_wav: ShiftBuffer<f32>,
    input_wav_denoise: ShiftBuffer<f32>,
    input_wav_res: ShiftBuffer<f32>,
    rms_buffer: ShiftBuffer<f32>,
    output_buffer: ShiftBuffer<f32>,
}

impl FrameHistory {
    pub fn new(sizes: &FrameSizes) -> Self {
        let len = sizes.history_len();
        Self {
            input_wav: ShiftBuffer::new(len),
            input_wav_denoise: ShiftBuffer::new(len),
            input_wav_res: ShiftBuffer::new(sizes.history_len_16k()),
            rms_buffer: ShiftBuffer::new(sizes.rms_lookback_len()),
            output_buffer: ShiftBuffer::new(len),
        }
    }

    /// Advances the device-rate input history by `advance` samples and writes
    /// `samples` over its tail. `samples` may be longer than `advance` when
    /// the newest part of the previous history is rewritten.
    pub fn shift_and_append(&mut self, samples: &[f32], advance: usize) {
        self.input_wav.push_overlapped(samples, advance);
    }

    /// Same as [`FrameHistory::shift_and_append`] for the 16 kHz history.
    pub fn shift_and_append_16k(&mut self, samples: &[f32], advance: usize) {
        self.input_wav_res.push_overlapped(samples, advance);
    }

    pub fn input_wav(&self) -> &[f32] {
        self.input_wav.as_slice()
    }

    pub fn input_wav_denoise(&self) -> &[f32] {
        self.input_wav_denoise.as_slice()
    }

    pub fn input_wav_res(&self) -> &[f32] {
        self.input_wav_res.as_slice()
    }

    pub fn rms_buffer(&self) -> &[f32] {
        self.rms_buffer.as_slice()
    }

    pub fn output_buffer(&self) -> &[f32] {
        self.output_buffer.as_slice()
    }

    pub(crate) fn input_wav_buf(&self) -> &ShiftBuffer<f32> {
        &self.input_wav
    }

    pub(crate) fn denoise_buf_mut(&mut self) -> &mut ShiftBuffer<f32> {
        &mut self.input_wav_denoise
    }

    pub(crate) fn rms_buf_mut(&mut self) -> &mut ShiftBuffer<f32> {
        &mut self.rms_buffer
    }

    pub(crate) fn output_buf_mut(&mut self) -> &mut ShiftBuffer<f32> {
        &mut self.output_buffer
    }

    /// Lengths of every buffer, in declaration order.
    pub fn lengths(&self) -> [usize; 5] {
        [
            self.input_wav.len(),
            self.input_wav_denoise.len(),
            self.input_wav_res.len(),
            self.rms_buffer.len(),
            self.output_buffer.len(),
        ]
    }

    /// Overwrites every buffer with `other`'s contents without reallocating.
    pub fn copy_from(&mut self, other: &Self) {
        self.input_wav.copy_from(&other.input_wav);
        self.input_wav_denoise.copy_from(&other.input_wav_denoise);
        self.input_wav_res.copy_from(&other.input_wav_res);
        self.rms_buffer.copy_from(&other.rms_buffer);
        self.output_buffer.copy_from(&other.output_buffer);
    }
}
