use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use vc_core::{
    Denoiser, FrameSizes, InferRequest, ProcessingMode, RuntimeError, RuntimeParams,
    StreamConfig, VoiceModel, MODEL_INPUT_RATE, MODEL_INPUT_ZC,
};
use vc_signal::HqResampler;

use crate::gate::NoiseGate;
use crate::history::FrameHistory;
use crate::loudness::LoudnessMatcher;
use crate::sola::{SolaAligner, SolaState};
use crate::stats::LevelMeter;

/// Collaborators handed to a processor at start.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub model: Option<Arc<dyn VoiceModel>>,
    pub denoiser: Option<Arc<dyn Denoiser>>,
}

/// Per-run state of the realtime callback. Everything is allocated in
/// [`BlockProcessor::new`]; [`BlockProcessor::process`] only reuses it.
pub struct BlockProcessor {
    sizes: FrameSizes,
    channels: usize,
    mode: ProcessingMode,
    params: RuntimeParams,
    params_rx: rtrb::Consumer<RuntimeParams>,
    model: Option<Arc<dyn VoiceModel>>,
    denoiser: Option<Arc<dyn Denoiser>>,

    history: FrameHistory,
    history_checkpoint: FrameHistory,
    sola: SolaState,
    sola_checkpoint: SolaState,

    gate: NoiseGate,
    loudness: LoudnessMatcher,
    aligner: SolaAligner,
    to_model: HqResampler,
    from_model: HqResampler,

    mono: Vec<f32>,
    resampled: Vec<f32>,
    model_out: Vec<f32>,
    infer_wav: Vec<f32>,
    denoised: Vec<f32>,
    meter: LevelMeter,
    last_sola_offset: usize,
}

impl BlockProcessor {
    pub fn new(
        config: &StreamConfig,
        sizes: FrameSizes,
        params: RuntimeParams,
        params_rx: rtrb::Consumer<RuntimeParams>,
        collaborators: Collaborators,
        use_phase_vocoder: bool,
    ) -> Self {
        let history = FrameHistory::new(&sizes);
        let dry_len = sizes.history_len() - sizes.extra_frame;
        let infer_capacity = sizes.infer_len().max(dry_len);
        let to_model = HqResampler::new(sizes.sample_rate, MODEL_INPUT_RATE);
        let longest_resample = sizes.block_frame + 4 * sizes.zc;

        Self {
            sizes,
            channels: config.channels as usize,
            mode: config.mode,
            params,
            params_rx,
            model: collaborators.model,
            denoiser: collaborators.denoiser,
            history_checkpoint: history.clone(),
            history,
            sola: SolaState::new(sizes.sola_buffer_frame),
            sola_checkpoint: SolaState::new(sizes.sola_buffer_frame),
            gate: NoiseGate::new(&sizes),
            loudness: LoudnessMatcher::new(&sizes, infer_capacity),
            aligner: SolaAligner::new(&sizes, use_phase_vocoder),
            resampled: vec![0.0; to_model.output_len(longest_resample)],
            to_model,
            from_model: HqResampler::new(sizes.model_sample_rate, sizes.sample_rate),
            mono: vec![0.0; sizes.block_frame],
            model_out: vec![0.0; sizes.model_output_len()],
            infer_wav: vec![0.0; infer_capacity],
            denoised: vec![0.0; infer_capacity.max(sizes.sola_buffer_frame + sizes.block_frame)],
            meter: LevelMeter::new(0.92),
            last_sola_offset: 0,
        }
    }

    pub fn sizes(&self) -> &FrameSizes {
        &self.sizes
    }

    pub fn params(&self) -> &RuntimeParams {
        &self.params
    }

    pub fn history(&self) -> &FrameHistory {
        &self.history
    }

    pub fn sola_state(&self) -> &SolaState {
        &self.sola
    }

    pub fn uses_phase_vocoder(&self) -> bool {
        self.aligner.uses_phase_vocoder()
    }

    pub fn last_sola_offset(&self) -> usize {
        self.last_sola_offset
    }

    pub fn meter(&self) -> &LevelMeter {
        &self.meter
    }

    /// Runs one period. On any failure, including a panic inside a
    /// collaborator, `output` is zeroed and history/SOLA state are restored
    /// to what they were before the call.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) -> Result<(), RuntimeError> {
        let expected = self.sizes.block_frame * self.channels;
        if input.len() != expected || output.len() != expected {
            output.fill(0.0);
            return Err(RuntimeError::BlockSize);
        }
        self.drain_params();
        self.history_checkpoint.copy_from(&self.history);
        self.sola_checkpoint.copy_from(&self.sola);

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run(input, output)))
            .unwrap_or(Err(RuntimeError::Panicked));
        if let Err(kind) = result {
            self.history.copy_from(&self.history_checkpoint);
            self.sola.copy_from(&self.sola_checkpoint);
            output.fill(0.0);
            return Err(kind);
        }
        Ok(())
    }

    /// Latest snapshot wins.
    fn drain_params(&mut self) {
        while let Ok(params) = self.params_rx.pop() {
            self.params = params;
        }
    }

    fn run(&mut self, input: &[f32], output: &mut [f32]) -> Result<(), RuntimeError> {
        let FrameSizes {
            zc,
            block_frame,
            block_frame_16k,
            sola_buffer_frame,
            sola_search_frame,
            extra_frame,
            ..
        } = self.sizes;
        let params = self.params;
        let convert = self.mode == ProcessingMode::Convert;
        let input_denoise = params.input_denoise && self.denoiser.is_some();

        downmix_into(input, self.channels, &mut self.mono);

        // Gate, then append to the device-rate history.
        let appended = if params.gate_enabled() {
            let span = self
                .gate
                .process(self.history.rms_buf_mut(), &self.mono, params.threshold_db);
            self.history.shift_and_append(span, block_frame);
            span.len()
        } else {
            self.history.shift_and_append(&self.mono, block_frame);
            block_frame
        };

        // Optional input denoise, then resample the new tail to 16 kHz with
        // one extra `zc` of left context whose output is discarded.
        let source_len = if input_denoise {
            self.denoise_input()?;
            block_frame + 2 * zc
        } else {
            appended + 2 * zc
        };
        let source = if input_denoise {
            self.history.input_wav_denoise()
        } else {
            self.history.input_wav()
        };
        let source = &source[source.len() - source_len..];
        let produced = self.to_model.process_into(source, &mut self.resampled);
        self.history
            .shift_and_append_16k(&self.resampled[MODEL_INPUT_ZC..produced], block_frame_16k);

        let dry_source = if input_denoise {
            self.history.input_wav_denoise()
        } else {
            self.history.input_wav()
        };
        let infer_len = if convert {
            let model = self.model.as_ref().ok_or(RuntimeError::Model)?;
            let request = InferRequest {
                block_frame_16k,
                skip_head: self.sizes.skip_head,
                return_length: self.sizes.return_length,
                pitch_method: params.pitch_method,
                pitch_shift: params.pitch_shift,
                formant_shift: params.formant_shift,
            };
            model
                .infer(self.history.input_wav_res(), &request, &mut self.model_out)
                .map_err(|_| RuntimeError::Model)?;
            ensure_finite(&self.model_out)?;
            let len = self.sizes.infer_len();
            if self.from_model.is_identity() {
                self.infer_wav[..len].copy_from_slice(&self.model_out);
            } else {
                self.from_model
                    .process_into(&self.model_out, &mut self.infer_wav[..len]);
            }
            len
        } else {
            let dry = &dry_source[extra_frame..];
            self.infer_wav[..dry.len()].copy_from_slice(dry);
            dry.len()
        };

        if convert && params.output_denoise {
            if let Some(denoiser) = self.denoiser.as_ref() {
                let infer = &self.infer_wav[..infer_len];
                let output_buffer = self.history.output_buf_mut();
                output_buffer.shift_and_append(&infer[infer_len - block_frame..]);
                denoiser
                    .denoise(infer, output_buffer.as_slice(), &mut self.denoised[..infer_len])
                    .map_err(|_| RuntimeError::Denoise)?;
                ensure_finite(&self.denoised[..infer_len])?;
                self.infer_wav[..infer_len].copy_from_slice(&self.denoised[..infer_len]);
            }
        }

        if convert && params.rms_mix_rate < 1.0 {
            let dry_source = if input_denoise {
                self.history.input_wav_denoise()
            } else {
                self.history.input_wav()
            };
            let dry = &dry_source[extra_frame..];
            self.loudness
                .apply(dry, &mut self.infer_wav[..infer_len], params.rms_mix_rate);
        }

        let infer = &mut self.infer_wav[..infer_len];
        let offset = self.aligner.find_offset(
            &infer[..sola_buffer_frame + sola_search_frame],
            self.sola.sola_buffer(),
        );
        let spliced = &mut infer[offset..];
        // The tail becomes the next callback's `sola_buffer`, so it is
        // checked together with the emitted block.
        ensure_finite(&spliced[..block_frame + sola_buffer_frame])?;
        self.aligner.splice(spliced, block_frame, &mut self.sola);
        let block = &spliced[..block_frame];

        upmix_into(block, self.channels, output);
        self.meter.push_block(block);
        self.last_sola_offset = offset;
        Ok(())
    }

    /// Denoises `sola_buffer_frame + block_frame` samples of fresh input,
    /// crossfades the head against the previous tail and appends one block
    /// to the denoised history.
    fn denoise_input(&mut self) -> Result<(), RuntimeError> {
        let Some(denoiser) = self.denoiser.as_ref() else {
            return Ok(());
        };
        let block_frame = self.sizes.block_frame;
        let n = self.sizes.sola_buffer_frame;
        let window_len = n + block_frame;
        let input_wav = self.history.input_wav_buf();
        let out = &mut self.denoised[..window_len];
        denoiser
            .denoise(input_wav.tail(window_len), input_wav.as_slice(), out)
            .map_err(|_| RuntimeError::Denoise)?;
        ensure_finite(out)?;
        self.aligner
            .fades()
            .crossfade(&mut out[..n], self.sola.nr_buffer());
        self.sola.nr_buffer_mut().copy_from_slice(&out[block_frame..]);
        self.history
            .denoise_buf_mut()
            .shift_and_append(&self.denoised[..block_frame]);
        Ok(())
    }
}

fn ensure_finite(samples: &[f32]) -> Result<(), RuntimeError> {
    if samples.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(RuntimeError::NonFinite)
    }
}

/// Channel average of an interleaved block.
fn downmix_into(data: &[f32], channels: usize, mono: &mut [f32]) {
    if channels <= 1 {
        mono.copy_from_slice(&data[..mono.len()]);
        return;
    }
    let scale = 1.0 / channels as f32;
    for (frame, out) in data.chunks_exact(channels).zip(mono.iter_mut()) {
        *out = frame.iter().sum::<f32>() * scale;
    }
}

fn upmix_into(mono: &[f32], channels: usize, out: &mut [f32]) {
    if channels <= 1 {
        out[..mono.len()].copy_from_slice(mono);
        return;
    }
    for (frame, &sample) in out.chunks_exact_mut(channels).zip(mono) {
        frame.fill(sample);
    }
}
