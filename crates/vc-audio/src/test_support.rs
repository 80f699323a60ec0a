//! Deterministic collaborators for engine tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use vc_core::{
    Denoiser, InferRequest, PortError, Result, StreamConfig, VcError, VoiceModel, MODEL_INPUT_RATE,
};
use vc_signal::{resample_hq_into, HqResampler};

use crate::port::{AudioIoPort, BlockCallback, PortConfig};

/// 48 kHz stream with short durations so tests reach steady state quickly.
pub fn small_config() -> StreamConfig {
    StreamConfig {
        sample_rate: 48_000,
        model_sample_rate: 48_000,
        block_time: 0.05,
        crossfade_time: 0.02,
        extra_time: 0.1,
        ..StreamConfig::default()
    }
}

pub fn sine(len: usize, freq: f32, rate: u32, amplitude: f32) -> Vec<f32> {
    (0..len)
        .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
        .collect()
}

/// Model that hands back its own input: the 16 kHz window is resampled to the
/// target rate and the requested span after `skip_head` is returned.
pub struct EchoModel {
    rate: u32,
    gain: f32,
    fail_on: Option<usize>,
    panic_on: Option<usize>,
    nan_on: Option<(usize, usize)>,
    calls: AtomicUsize,
}

impl EchoModel {
    pub fn new(rate: u32) -> Self {
        Self {
            rate,
            gain: 1.0,
            fail_on: None,
            panic_on: None,
            nan_on: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    /// Returns an error on the given zero-based call.
    pub fn failing_on(mut self, call: usize) -> Self {
        self.fail_on = Some(call);
        self
    }

    pub fn panicking_on(mut self, call: usize) -> Self {
        self.panic_on = Some(call);
        self
    }

    /// Writes a NaN at `index` of the output on the given call.
    pub fn nan_on(mut self, call: usize, index: usize) -> Self {
        self.nan_on = Some((call, index));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VoiceModel for EchoModel {
    fn target_sample_rate(&self) -> u32 {
        self.rate
    }

    fn infer(&self, window: &[f32], request: &InferRequest, out: &mut [f32]) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == Some(call) {
            return Err(VcError::Inference(format!("injected failure on call {call}")));
        }
        if self.panic_on == Some(call) {
            panic!("injected panic on call {call}");
        }
        let resampler = HqResampler::new(MODEL_INPUT_RATE, self.rate);
        let mut full = Vec::new();
        resample_hq_into(&resampler, window, &mut full);
        let start = request.skip_head * (self.rate / 100) as usize;
        let span = full
            .get(start..start + out.len())
            .ok_or_else(|| VcError::Inference("window too short".to_string()))?;
        for (o, &v) in out.iter_mut().zip(span) {
            *o = v * self.gain;
        }
        if let Some((_, index)) = self.nan_on.filter(|&(at, _)| at == call) {
            out[index] = f32::NAN;
        }
        Ok(())
    }
}

/// Denoiser that scales its input.
pub struct ScalingDenoiser {
    gain: f32,
    fail_on: Option<usize>,
    calls: AtomicUsize,
}

impl ScalingDenoiser {
    pub fn new(gain: f32) -> Self {
        Self {
            gain,
            fail_on: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns an error on the given zero-based call.
    pub fn failing_on(mut self, call: usize) -> Self {
        self.fail_on = Some(call);
        self
    }
}

impl Denoiser for ScalingDenoiser {
    fn denoise(&self, signal: &[f32], _noise_reference: &[f32], out: &mut [f32]) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == Some(call) {
            return Err(VcError::Denoise(format!("injected failure on call {call}")));
        }
        for (o, &v) in out.iter_mut().zip(signal) {
            *o = v * self.gain;
        }
        Ok(())
    }
}

#[derive(Default)]
struct ManualPortState {
    config: Option<PortConfig>,
    callback: Option<BlockCallback>,
    opens: usize,
    fail_open: Option<PortError>,
}

/// Port driven by the test: [`ManualPortHandle::drive`] plays the driver.
#[derive(Default)]
pub struct ManualPort {
    state: Arc<Mutex<ManualPortState>>,
}

#[derive(Clone)]
pub struct ManualPortHandle {
    state: Arc<Mutex<ManualPortState>>,
}

impl ManualPort {
    pub fn new() -> (Self, ManualPortHandle) {
        let port = Self::default();
        let handle = ManualPortHandle {
            state: Arc::clone(&port.state),
        };
        (port, handle)
    }
}

impl ManualPortHandle {
    /// Runs one callback, or returns `None` when nothing is registered.
    pub fn drive(&self, input: &[f32]) -> Option<Vec<f32>> {
        let mut state = self.state.lock();
        let callback = state.callback.as_mut()?;
        let mut output = vec![0.0_f32; input.len()];
        callback(input, &mut output);
        Some(output)
    }

    pub fn config(&self) -> Option<PortConfig> {
        self.state.lock().config
    }

    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    pub fn fail_next_open(&self, err: PortError) {
        self.state.lock().fail_open = Some(err);
    }
}

impl AudioIoPort for ManualPort {
    fn open(&mut self, config: &PortConfig) -> std::result::Result<(), PortError> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_open.take() {
            return Err(err);
        }
        state.config = Some(*config);
        state.opens += 1;
        Ok(())
    }

    fn register_callback(&mut self, callback: BlockCallback) -> std::result::Result<(), PortError> {
        let mut state = self.state.lock();
        if state.config.is_none() {
            return Err(PortError::NotOpen);
        }
        state.callback = Some(callback);
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.callback = None;
        state.config = None;
    }
}
