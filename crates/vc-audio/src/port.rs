use vc_core::PortError;

/// Driver callback: one interleaved input block in, one interleaved output
/// block (same length) out.
pub type BlockCallback = Box<dyn FnMut(&[f32], &mut [f32]) + Send + 'static>;

/// Fixed duplex stream shape requested by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per callback (per channel).
    pub block_frame: usize,
}

impl PortConfig {
    /// Interleaved samples per callback.
    pub fn block_samples(&self) -> usize {
        self.block_frame * self.channels as usize
    }
}

/// Duplex audio device seam. The engine opens the port, registers its block
/// callback, and closes it on stop; `close` must not return while the
/// callback is still executing on the driver thread.
pub trait AudioIoPort: Send {
    fn open(&mut self, config: &PortConfig) -> Result<(), PortError>;

    fn register_callback(&mut self, callback: BlockCallback) -> Result<(), PortError>;

    fn close(&mut self);
}
