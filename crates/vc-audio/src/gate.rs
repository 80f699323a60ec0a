use vc_core::FrameSizes;
use vc_signal::{amplitude_to_db, frame_rms_into, frame_count, ShiftBuffer};

/// RMS silence gate.
///
/// Each block is analysed together with the previous `4·zc` raw samples using
/// `4·zc` frames at hop `zc`. The first two frames only see lookback and are
/// discarded; every remaining frame below the threshold zeroes the `zc`
/// samples centred on it. The gated span covers the block plus the last
/// `2·zc` samples already in history, which are rewritten.
#[derive(Debug, Clone)]
pub struct NoiseGate {
    zc: usize,
    joined: Vec<f32>,
    frames: Vec<f32>,
}

impl NoiseGate {
    pub fn new(sizes: &FrameSizes) -> Self {
        let joined_len = sizes.rms_lookback_len() + sizes.block_frame;
        Self {
            zc: sizes.zc,
            joined: vec![0.0; joined_len],
            frames: vec![0.0; frame_count(joined_len, 4 * sizes.zc, sizes.zc)],
        }
    }

    /// Length of the span returned by [`NoiseGate::process`].
    pub fn span_len(&self) -> usize {
        self.joined.len() - 2 * self.zc
    }

    /// Gates `block` and returns the span to write over the tail of the
    /// input history. `lookback` receives the newest `4·zc` raw samples.
    pub fn process(
        &mut self,
        lookback: &mut ShiftBuffer<f32>,
        block: &[f32],
        threshold_db: f32,
    ) -> &[f32] {
        let zc = self.zc;
        let lookback_len = lookback.len();
        self.joined[..lookback_len].copy_from_slice(lookback.as_slice());
        self.joined[lookback_len..].copy_from_slice(block);
        let frames = frame_rms_into(&self.joined, 4 * zc, zc, &mut self.frames);
        lookback.write_tail(&self.joined[self.joined.len() - lookback_len..]);

        let len = self.joined.len();
        for (i, &rms) in self.frames[..frames].iter().enumerate().skip(2) {
            if amplitude_to_db(rms) < threshold_db {
                let center = i * zc;
                let start = center - zc / 2;
                let end = (start + zc).min(len);
                if start < end {
                    self.joined[start..end].fill(0.0);
                }
            }
        }
        &self.joined[2 * zc..]
    }
}
