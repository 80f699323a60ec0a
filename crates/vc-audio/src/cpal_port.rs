use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{sync_channel, SyncSender},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use vc_core::PortError;

use crate::port::{AudioIoPort, BlockCallback, PortConfig};

/// Output ring capacity in blocks (one is pre-filled with silence).
const OUTPUT_RING_BLOCKS: usize = 4;

pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()?
        .map(|d| d.name().unwrap_or_else(|_| "unknown-input".to_string()))
        .collect();
    Ok(devices)
}

pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()?
        .map(|d| d.name().unwrap_or_else(|_| "unknown-output".to_string()))
        .collect();
    Ok(devices)
}

/// Duplex port over two cpal streams on the default host.
///
/// The input stream's callback regroups driver buffers into exact blocks,
/// runs the engine callback, and feeds the result to the output stream
/// through a lock-free ring.
pub struct CpalPort {
    input_device: Option<String>,
    output_device: Option<String>,
    opened: Option<PortConfig>,
    running: Arc<AtomicBool>,
    stream_thread: Option<thread::JoinHandle<()>>,
}

impl CpalPort {
    /// `None` (or a blank name) selects the host's default device.
    pub fn new(input_device: Option<String>, output_device: Option<String>) -> Self {
        Self {
            input_device,
            output_device,
            opened: None,
            running: Arc::new(AtomicBool::new(false)),
            stream_thread: None,
        }
    }
}

impl AudioIoPort for CpalPort {
    fn open(&mut self, config: &PortConfig) -> Result<(), PortError> {
        let host = cpal::default_host();
        let input = find_input_device(&host, self.input_device.as_deref())?;
        let output = find_output_device(&host, self.output_device.as_deref())?;
        let input_ranges = input
            .supported_input_configs()
            .map_err(|e| PortError::Backend(e.to_string()))?;
        check_support(input_ranges, config, "input")?;
        let output_ranges = output
            .supported_output_configs()
            .map_err(|e| PortError::Backend(e.to_string()))?;
        check_support(output_ranges, config, "output")?;

        log::info!(
            "input_device='{}' output_device='{}' rate={} ch={} block={}",
            input.name().unwrap_or_else(|_| "unknown-input".to_string()),
            output.name().unwrap_or_else(|_| "unknown-output".to_string()),
            config.sample_rate,
            config.channels,
            config.block_frame
        );
        self.opened = Some(*config);
        Ok(())
    }

    fn register_callback(&mut self, callback: BlockCallback) -> Result<(), PortError> {
        let config = self.opened.ok_or(PortError::NotOpen)?;
        if self.stream_thread.is_some() {
            return Err(PortError::Backend("streams already running".to_string()));
        }

        self.running.store(true, Ordering::Release);
        let (ready_tx, ready_rx) = sync_channel::<Result<(), PortError>>(1);
        let input_name = self.input_device.clone();
        let output_name = self.output_device.clone();
        let running = Arc::clone(&self.running);
        let handle = thread::Builder::new()
            .name("vc-audio-stream".to_string())
            .spawn(move || {
                run_streams(config, input_name, output_name, callback, running, ready_tx)
            })
            .map_err(|e| PortError::Backend(e.to_string()))?;
        self.stream_thread = Some(handle);

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                self.close();
                Err(err)
            }
            Err(_) => {
                self.close();
                Err(PortError::Backend(
                    "stream thread exited before starting".to_string(),
                ))
            }
        }
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.stream_thread.take() {
            if handle.join().is_err() {
                log::error!("audio stream thread panicked");
            }
        }
        self.opened = None;
    }
}

impl Drop for CpalPort {
    fn drop(&mut self) {
        self.close();
    }
}

/// Owns both cpal streams for their whole life; they are dropped, and their
/// callbacks joined by the backend, before this returns.
fn run_streams(
    config: PortConfig,
    input_name: Option<String>,
    output_name: Option<String>,
    callback: BlockCallback,
    running: Arc<AtomicBool>,
    ready: SyncSender<Result<(), PortError>>,
) {
    let (input_stream, output_stream) = match build_streams(
        &config,
        input_name.as_deref(),
        output_name.as_deref(),
        callback,
    ) {
        Ok(streams) => streams,
        Err(err) => {
            running.store(false, Ordering::Release);
            let _ = ready.send(Err(err));
            return;
        }
    };
    if let Err(err) = input_stream.play().and_then(|()| output_stream.play()) {
        running.store(false, Ordering::Release);
        let _ = ready.send(Err(PortError::Backend(err.to_string())));
        return;
    }
    let _ = ready.send(Ok(()));

    while running.load(Ordering::Acquire) {
        thread::sleep(Duration::from_millis(20));
    }

    drop(input_stream);
    drop(output_stream);
    log::debug!("audio streams closed");
}

fn build_streams(
    config: &PortConfig,
    input_name: Option<&str>,
    output_name: Option<&str>,
    callback: BlockCallback,
) -> Result<(cpal::Stream, cpal::Stream), PortError> {
    let host = cpal::default_host();
    let input_device = find_input_device(&host, input_name)?;
    let output_device = find_output_device(&host, output_name)?;
    let stream_config = cpal::StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let block_samples = config.block_samples();
    let (mut producer, consumer) = rtrb::RingBuffer::<f32>::new(block_samples * OUTPUT_RING_BLOCKS);
    // One block of silence covers the first input block's processing.
    for _ in 0..block_samples {
        let _ = producer.push(0.0);
    }

    let input_stream = input_device
        .build_input_stream(
            &stream_config,
            build_input_callback(block_samples, callback, producer),
            |err| log::error!("input stream error: {err}"),
            None,
        )
        .map_err(|e| PortError::UnsupportedConfig(e.to_string()))?;
    let output_stream = output_device
        .build_output_stream(
            &stream_config,
            build_output_callback(consumer),
            |err| log::error!("output stream error: {err}"),
            None,
        )
        .map_err(|e| PortError::UnsupportedConfig(e.to_string()))?;
    Ok((input_stream, output_stream))
}

fn find_input_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, PortError> {
    if let Some(name) = name.map(str::trim).filter(|s| !s.is_empty()) {
        let mut devices = host
            .input_devices()
            .map_err(|e| PortError::Backend(e.to_string()))?;
        return devices
            .find(|d| {
                d.name()
                    .map(|n| n.eq_ignore_ascii_case(name))
                    .unwrap_or(false)
            })
            .ok_or_else(|| PortError::DeviceNotFound(name.to_string()));
    }
    host.default_input_device()
        .ok_or_else(|| PortError::DeviceNotFound("default input".to_string()))
}

fn find_output_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, PortError> {
    if let Some(name) = name.map(str::trim).filter(|s| !s.is_empty()) {
        let mut devices = host
            .output_devices()
            .map_err(|e| PortError::Backend(e.to_string()))?;
        return devices
            .find(|d| {
                d.name()
                    .map(|n| n.eq_ignore_ascii_case(name))
                    .unwrap_or(false)
            })
            .ok_or_else(|| PortError::DeviceNotFound(name.to_string()));
    }
    host.default_output_device()
        .ok_or_else(|| PortError::DeviceNotFound("default output".to_string()))
}

fn check_support(
    mut ranges: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
    config: &PortConfig,
    direction: &str,
) -> Result<(), PortError> {
    let supported = ranges.any(|range| {
        range.channels() == config.channels
            && range.sample_format() == cpal::SampleFormat::F32
            && range.min_sample_rate().0 <= config.sample_rate
            && config.sample_rate <= range.max_sample_rate().0
    });
    if supported {
        Ok(())
    } else {
        Err(PortError::UnsupportedConfig(format!(
            "{direction} device has no f32 config with {} channels at {} Hz",
            config.channels, config.sample_rate
        )))
    }
}

fn build_input_callback(
    block_samples: usize,
    mut callback: BlockCallback,
    mut producer: rtrb::Producer<f32>,
) -> impl FnMut(&[f32], &cpal::InputCallbackInfo) + Send + 'static {
    let mut pending = Vec::with_capacity(block_samples);
    let mut processed = vec![0.0_f32; block_samples];
    let mut dropped = 0usize;
    move |data: &[f32], _: &cpal::InputCallbackInfo| {
        let mut rest = data;
        while !rest.is_empty() {
            let take = (block_samples - pending.len()).min(rest.len());
            pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if pending.len() < block_samples {
                break;
            }
            callback(&pending, &mut processed);
            pending.clear();
            if processed.iter().any(|&s| producer.push(s).is_err()) {
                dropped += 1;
                if dropped == 1 || dropped % 64 == 0 {
                    log::warn!("output ring full (dropped blocks={dropped})");
                }
            }
        }
    }
}

fn build_output_callback(
    mut consumer: rtrb::Consumer<f32>,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut underruns = 0usize;
    let mut last_sample = 0.0_f32;
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        let mut callback_underrun = false;
        for sample in data {
            if let Ok(v) = consumer.pop() {
                *sample = v;
                last_sample = v;
            } else {
                // Decay towards silence instead of stepping to zero.
                last_sample *= 0.995;
                if last_sample.abs() < 1.0e-5 {
                    last_sample = 0.0;
                }
                *sample = last_sample;
                callback_underrun = true;
            }
        }
        if callback_underrun {
            underruns += 1;
            if underruns % 64 == 0 {
                log::warn!("output underrun callbacks={underruns}");
            }
        }
    }
}
