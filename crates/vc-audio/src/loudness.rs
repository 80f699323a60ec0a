use vc_core::FrameSizes;
use vc_signal::{frame_count, frame_rms_into, interpolate_frames_into};

/// Floor applied to the synthesized envelope before dividing by it.
const WET_RMS_FLOOR: f32 = 1.0e-3;

/// Rescales synthesized audio towards the dry input's loudness envelope.
#[derive(Debug, Clone)]
pub struct LoudnessMatcher {
    zc: usize,
    dry_frames: Vec<f32>,
    wet_frames: Vec<f32>,
    dry_env: Vec<f32>,
    wet_env: Vec<f32>,
}

impl LoudnessMatcher {
    /// `max_len` is the longest window passed to [`LoudnessMatcher::apply`].
    pub fn new(sizes: &FrameSizes, max_len: usize) -> Self {
        let frames = frame_count(max_len, 4 * sizes.zc, sizes.zc);
        Self {
            zc: sizes.zc,
            dry_frames: vec![0.0; frames],
            wet_frames: vec![0.0; frames],
            dry_env: vec![0.0; max_len],
            wet_env: vec![0.0; max_len],
        }
    }

    /// `wet *= (rms_dry / max(rms_wet, 1e-3)) ^ (1 - rms_mix_rate)`, using
    /// `4·zc`/`zc` frame envelopes interpolated to sample resolution. A rate
    /// of 1 or more leaves `wet` untouched.
    pub fn apply(&mut self, dry: &[f32], wet: &mut [f32], rms_mix_rate: f32) {
        if rms_mix_rate >= 1.0 {
            return;
        }
        let n = wet.len().min(dry.len()).min(self.dry_env.len());
        let frame = 4 * self.zc;

        let dry_count = frame_rms_into(&dry[..n], frame, self.zc, &mut self.dry_frames);
        interpolate_frames_into(&self.dry_frames[..dry_count], self.zc, &mut self.dry_env[..n]);
        let wet_count = frame_rms_into(&wet[..n], frame, self.zc, &mut self.wet_frames);
        interpolate_frames_into(&self.wet_frames[..wet_count], self.zc, &mut self.wet_env[..n]);

        let exponent = 1.0 - rms_mix_rate.max(0.0);
        for ((sample, &dry_rms), &wet_rms) in wet[..n]
            .iter_mut()
            .zip(&self.dry_env[..n])
            .zip(&self.wet_env[..n])
        {
            *sample *= (dry_rms / wet_rms.max(WET_RMS_FLOOR)).powf(exponent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vc_core::StreamConfig;
    use vc_signal::compute_rms;

    fn sizes() -> FrameSizes {
        StreamConfig {
            sample_rate: 48_000,
            model_sample_rate: 48_000,
            block_time: 0.05,
            crossfade_time: 0.02,
            extra_time: 0.1,
            ..StreamConfig::default()
        }
        .validate()
        .unwrap()
    }

    fn sine(len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * 200.0 * i as f32 / 48_000.0).sin())
            .collect()
    }

    #[test]
    fn full_match_copies_dry_loudness() {
        let sizes = sizes();
        let len = sizes.infer_len();
        let mut matcher = LoudnessMatcher::new(&sizes, len);
        let dry = sine(len, 0.5);
        let mut wet = sine(len, 0.1);
        matcher.apply(&dry, &mut wet, 0.0);

        let frame = 4 * sizes.zc;
        for start in (0..len - frame).step_by(sizes.zc) {
            let expected = compute_rms(&dry[start..start + frame]);
            let actual = compute_rms(&wet[start..start + frame]);
            assert!((actual - expected).abs() / expected < 0.02, "frame at {start}");
        }
    }

    #[test]
    fn rate_one_leaves_output_untouched() {
        let sizes = sizes();
        let len = sizes.infer_len();
        let mut matcher = LoudnessMatcher::new(&sizes, len);
        let dry = sine(len, 0.5);
        let original = sine(len, 0.1);
        let mut wet = original.clone();
        matcher.apply(&dry, &mut wet, 1.0);
        assert_eq!(wet, original);
    }

    #[test]
    fn silent_output_is_not_amplified_from_nothing() {
        let sizes = sizes();
        let len = sizes.infer_len();
        let mut matcher = LoudnessMatcher::new(&sizes, len);
        let dry = vec![0.0_f32; len];
        let mut wet = sine(len, 0.1);
        matcher.apply(&dry, &mut wet, 0.0);
        assert!(wet.iter().all(|&v| v == 0.0));
    }
}
