use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use vc_core::RuntimeError;

/// Counters written by the audio thread and polled by the control side.
#[derive(Debug, Default)]
pub struct EngineStats {
    callbacks: AtomicU64,
    overruns: AtomicU64,
    errors: AtomicU64,
    consecutive_errors: AtomicU64,
    last_error: AtomicU8,
    last_elapsed_us: AtomicU64,
    last_sola_offset: AtomicUsize,
    output_rms: AtomicU32,
    output_peak: AtomicU32,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatsSnapshot {
    pub callbacks: u64,
    pub overruns: u64,
    pub errors: u64,
    pub consecutive_errors: u64,
    pub last_error: Option<RuntimeError>,
    pub last_elapsed: Duration,
    pub last_sola_offset: usize,
    pub output_rms: f32,
    pub output_peak: f32,
}

impl EngineStats {
    pub fn reset(&self) {
        for counter in [
            &self.callbacks,
            &self.overruns,
            &self.errors,
            &self.consecutive_errors,
            &self.last_elapsed_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.last_error.store(0, Ordering::Relaxed);
        self.last_sola_offset.store(0, Ordering::Relaxed);
        self.output_rms.store(0.0_f32.to_bits(), Ordering::Relaxed);
        self.output_peak.store(0.0_f32.to_bits(), Ordering::Relaxed);
    }

    /// Returns the callback count including this one.
    pub(crate) fn record_callback(&self, elapsed: Duration, budget: Duration) -> (u64, bool) {
        let count = self.callbacks.fetch_add(1, Ordering::Relaxed) + 1;
        self.last_elapsed_us
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);
        let overrun = elapsed > budget;
        if overrun {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
        (count, overrun)
    }

    pub(crate) fn record_success(&self, sola_offset: usize, meter: &LevelMeter) {
        self.consecutive_errors.store(0, Ordering::Relaxed);
        self.last_sola_offset.store(sola_offset, Ordering::Relaxed);
        self.output_rms.store(meter.rms().to_bits(), Ordering::Relaxed);
        self.output_peak
            .store(meter.peak().to_bits(), Ordering::Relaxed);
    }

    /// Returns the total error count including this one.
    pub(crate) fn record_error(&self, kind: RuntimeError) -> u64 {
        self.last_error.store(kind.code(), Ordering::Relaxed);
        self.consecutive_errors.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            consecutive_errors: self.consecutive_errors.load(Ordering::Relaxed),
            last_error: RuntimeError::from_code(self.last_error.load(Ordering::Relaxed)),
            last_elapsed: Duration::from_micros(self.last_elapsed_us.load(Ordering::Relaxed)),
            last_sola_offset: self.last_sola_offset.load(Ordering::Relaxed),
            output_rms: f32::from_bits(self.output_rms.load(Ordering::Relaxed)),
            output_peak: f32::from_bits(self.output_peak.load(Ordering::Relaxed)),
        }
    }
}

/// Exponentially smoothed block RMS and peak.
#[derive(Debug, Clone)]
pub struct LevelMeter {
    smoothing: f32,
    rms: f32,
    peak: f32,
}

impl LevelMeter {
    pub fn new(smoothing: f32) -> Self {
        Self {
            smoothing: smoothing.clamp(0.0, 0.9999),
            rms: 0.0,
            peak: 0.0,
        }
    }

    pub fn push_block(&mut self, block: &[f32]) {
        if block.is_empty() {
            return;
        }
        let (sum, peak) = block.iter().fold((0.0_f32, 0.0_f32), |(sum, peak), s| {
            let x = s.abs();
            (sum + x * x, peak.max(x))
        });
        let rms_now = (sum / block.len() as f32).sqrt();
        self.rms = self.smoothing * self.rms + (1.0 - self.smoothing) * rms_now;
        self.peak = self.smoothing * self.peak + (1.0 - self.smoothing) * peak;
    }

    pub fn rms(&self) -> f32 {
        self.rms
    }

    pub fn peak(&self) -> f32 {
        self.peak
    }
}
