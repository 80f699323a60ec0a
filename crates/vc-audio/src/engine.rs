use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use vc_core::{
    ConfigError, Denoiser, FrameSizes, PortError, ProcessingMode, RuntimeParam, RuntimeParams,
    StartError, StreamConfig, VoiceModel,
};

use crate::port::{AudioIoPort, PortConfig};
use crate::processor::{BlockProcessor, Collaborators};
use crate::stats::{EngineStats, StatsSnapshot};

const PARAM_QUEUE_CAPACITY: usize = 32;
/// Repeated realtime warnings are logged once per this many occurrences.
const LOG_EVERY: u64 = 64;

/// State shared between the control side and the audio callback.
struct SharedState {
    running: AtomicBool,
    stopping: AtomicBool,
    processor: Mutex<Option<BlockProcessor>>,
    stats: EngineStats,
}

impl SharedState {
    fn on_block(&self, input: &[f32], output: &mut [f32]) {
        if self.stopping.load(Ordering::Acquire) {
            output.fill(0.0);
            return;
        }
        // Never wait here: the control side only holds the lock to install
        // or release the processor.
        let Some(mut slot) = self.processor.try_lock() else {
            output.fill(0.0);
            return;
        };
        let Some(processor) = slot.as_mut() else {
            output.fill(0.0);
            return;
        };

        let started = Instant::now();
        let result = processor.process(input, output);
        let elapsed = started.elapsed();
        let budget = Duration::from_secs_f64(processor.sizes().block_period_secs());
        let (count, overrun) = self.stats.record_callback(elapsed, budget);

        match result {
            Ok(()) => self
                .stats
                .record_success(processor.last_sola_offset(), processor.meter()),
            Err(kind) => {
                let errors = self.stats.record_error(kind);
                if errors == 1 || errors % LOG_EVERY == 0 {
                    log::warn!("callback {count} failed: {kind} (errors={errors})");
                }
            }
        }
        if overrun {
            let overruns = self.stats.snapshot().overruns;
            if overruns == 1 || overruns % LOG_EVERY == 0 {
                log::warn!(
                    "slow block: elapsed={:.2}ms budget={:.2}ms overruns={}",
                    elapsed.as_secs_f64() * 1000.0,
                    budget.as_secs_f64() * 1000.0,
                    overruns
                );
            }
        }
    }
}

/// Control-side end of the runtime parameter handoff.
struct ParamControl {
    params: RuntimeParams,
    producer: Option<rtrb::Producer<RuntimeParams>>,
}

/// Realtime voice-conversion stream.
///
/// `configure`, `start`, `stop` and `update_runtime_param` are called from a
/// control thread; the port drives [`StreamEngine::on_block`] from its audio
/// thread. Configuration changes take effect on the next `start`.
pub struct StreamEngine<P: AudioIoPort> {
    port: P,
    collaborators: Collaborators,
    phase_vocoder_supported: bool,
    phase_vocoder_active: bool,
    config: StreamConfig,
    sizes: FrameSizes,
    shared: Arc<SharedState>,
    control: Mutex<ParamControl>,
}

impl<P: AudioIoPort> StreamEngine<P> {
    pub fn new(port: P) -> Self {
        let config = StreamConfig::default();
        let sizes = FrameSizes::derive(&config);
        let params = config.runtime_params();
        Self {
            port,
            collaborators: Collaborators::default(),
            phase_vocoder_supported: true,
            phase_vocoder_active: false,
            config,
            sizes,
            shared: Arc::new(SharedState {
                running: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                processor: Mutex::new(None),
                stats: EngineStats::default(),
            }),
            control: Mutex::new(ParamControl {
                params,
                producer: None,
            }),
        }
    }

    pub fn with_model(mut self, model: Arc<dyn VoiceModel>) -> Self {
        self.collaborators.model = Some(model);
        self
    }

    pub fn with_denoiser(mut self, denoiser: Arc<dyn Denoiser>) -> Self {
        self.collaborators.denoiser = Some(denoiser);
        self
    }

    /// Declares whether the backend can run the phase-vocoder crossfade.
    /// When it cannot, the linear crossfade is used even if enabled in the
    /// config.
    pub fn with_phase_vocoder_support(mut self, supported: bool) -> Self {
        self.phase_vocoder_supported = supported;
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Sizes for the next (or current, if nothing was reconfigured) run.
    pub fn frame_sizes(&self) -> &FrameSizes {
        &self.sizes
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Validates `config` and stores it with its derived sizes for the next
    /// `start`. A running stream is not affected; on error nothing changes.
    pub fn configure(&mut self, config: StreamConfig) -> Result<(), ConfigError> {
        let sizes = config.validate()?;
        log::info!(
            "configured: rate={} model_rate={} ch={} block={} crossfade={} sola_buffer={} extra={} mode={:?}",
            sizes.sample_rate,
            sizes.model_sample_rate,
            config.channels,
            sizes.block_frame,
            sizes.crossfade_frame,
            sizes.sola_buffer_frame,
            sizes.extra_frame,
            config.mode
        );
        if self.is_running() {
            log::info!("stream is running; new configuration applies on restart");
        }
        self.config = config;
        self.sizes = sizes;
        Ok(())
    }

    /// Allocates all per-run state, opens the port and registers the
    /// callback. Runtime parameters are seeded from the stored config.
    pub fn start(&mut self) -> Result<(), StartError> {
        if self.is_running() {
            return Err(StartError::AlreadyRunning);
        }
        if self.config.mode == ProcessingMode::Convert {
            let model = self
                .collaborators
                .model
                .as_ref()
                .ok_or(StartError::ModelUnavailable)?;
            let model_rate = model.target_sample_rate();
            if model_rate != self.config.model_sample_rate {
                return Err(StartError::ModelRateMismatch {
                    configured: self.config.model_sample_rate,
                    model: model_rate,
                });
            }
        }

        let use_phase_vocoder = self.config.use_phase_vocoder && self.phase_vocoder_supported;
        if self.config.use_phase_vocoder && !use_phase_vocoder {
            log::info!("phase vocoder not supported by this backend; using linear crossfade");
        }
        let params = self.config.runtime_params();
        let (producer, consumer) = rtrb::RingBuffer::new(PARAM_QUEUE_CAPACITY);
        let processor = BlockProcessor::new(
            &self.config,
            self.sizes,
            params,
            consumer,
            self.collaborators.clone(),
            use_phase_vocoder,
        );
        *self.shared.processor.lock() = Some(processor);
        self.shared.stats.reset();
        self.shared.stopping.store(false, Ordering::Release);

        let port_config = PortConfig {
            sample_rate: self.sizes.sample_rate,
            channels: self.config.channels,
            block_frame: self.sizes.block_frame,
        };
        if let Err(err) = self.open_port(&port_config) {
            log::warn!("failed to open audio port: {err}");
            self.port.close();
            self.shared.processor.lock().take();
            return Err(err.into());
        }

        {
            let mut control = self.control.lock();
            control.params = params;
            control.producer = Some(producer);
        }
        self.phase_vocoder_active = use_phase_vocoder;
        self.shared.running.store(true, Ordering::Release);
        log::info!(
            "stream started: block={} ({:.1}ms) history={} history_16k={} phase_vocoder={}",
            self.sizes.block_frame,
            self.sizes.block_period_secs() * 1000.0,
            self.sizes.history_len(),
            self.sizes.history_len_16k(),
            use_phase_vocoder
        );
        Ok(())
    }

    fn open_port(&mut self, config: &PortConfig) -> Result<(), PortError> {
        self.port.open(config)?;
        let shared = Arc::clone(&self.shared);
        self.port
            .register_callback(Box::new(move |input: &[f32], output: &mut [f32]| {
                shared.on_block(input, output)
            }))
    }

    /// Halts the stream, waits for an in-flight callback and releases all
    /// per-run buffers. Safe to call at any time.
    pub fn stop(&mut self) {
        let was_running = self.shared.running.swap(false, Ordering::AcqRel);
        self.shared.stopping.store(true, Ordering::Release);
        self.phase_vocoder_active = false;
        if was_running {
            self.port.close();
        }
        // Blocks until a callback holding the slot returns.
        let released = self.shared.processor.lock().take();
        self.control.lock().producer = None;
        if was_running {
            let stats = self.shared.stats.snapshot();
            log::info!(
                "stream stopped: callbacks={} overruns={} errors={}",
                stats.callbacks,
                stats.overruns,
                stats.errors
            );
        }
        drop(released);
    }

    /// Applies one runtime parameter change. The full parameter snapshot is
    /// handed to the audio thread and takes effect at the top of the next
    /// callback. Returns `false` when no stream is running or the handoff
    /// queue is full; a later successful update carries every change.
    pub fn update_runtime_param(&self, param: RuntimeParam) -> bool {
        let mut control = self.control.lock();
        control.params.apply(param);
        let params = control.params;
        let Some(producer) = control.producer.as_mut() else {
            log::debug!("runtime parameter {param:?} ignored: stream not running");
            return false;
        };
        if producer.push(params).is_err() {
            log::warn!("runtime parameter queue full; deferring {param:?}");
            return false;
        }
        true
    }

    /// Parameters most recently handed to the stream.
    pub fn runtime_params(&self) -> RuntimeParams {
        self.control.lock().params
    }

    /// Realtime callback body: exactly one interleaved block in and out.
    /// Writes silence when stopped or on any internal failure.
    pub fn on_block(&self, input: &[f32], output: &mut [f32]) {
        self.shared.on_block(input, output);
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Whether the running stream crossfades with the phase vocoder. Fixed
    /// at `start`, so querying it never touches the audio thread's slot.
    pub fn phase_vocoder_active(&self) -> bool {
        self.phase_vocoder_active
    }
}

impl<P: AudioIoPort> Drop for StreamEngine<P> {
    fn drop(&mut self) {
        self.stop();
    }
}
