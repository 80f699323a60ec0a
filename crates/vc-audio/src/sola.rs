use vc_core::FrameSizes;
use vc_signal::{FadeWindows, PhaseVocoder};

const CORRELATION_EPSILON: f64 = 1.0e-8;

/// Tails carried from one callback to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct SolaState {
    /// Last `sola_buffer_frame` samples of the previous spliced window,
    /// before fading.
    sola_buffer: Vec<f32>,
    /// Tail of the previous denoised input window.
    nr_buffer: Vec<f32>,
}

impl SolaState {
    pub fn new(len: usize) -> Self {
        Self {
            sola_buffer: vec![0.0; len],
            nr_buffer: vec![0.0; len],
        }
    }

    pub fn sola_buffer(&self) -> &[f32] {
        &self.sola_buffer
    }

    pub fn nr_buffer(&self) -> &[f32] {
        &self.nr_buffer
    }

    pub(crate) fn nr_buffer_mut(&mut self) -> &mut [f32] {
        &mut self.nr_buffer
    }

    pub fn copy_from(&mut self, other: &Self) {
        self.sola_buffer.copy_from_slice(&other.sola_buffer);
        self.nr_buffer.copy_from_slice(&other.nr_buffer);
    }
}

/// Synchronized overlap-add stitcher.
#[derive(Debug)]
pub struct SolaAligner {
    buffer_frame: usize,
    search_frame: usize,
    fades: FadeWindows,
    vocoder: Option<PhaseVocoder>,
    blended: Vec<f32>,
}

impl SolaAligner {
    pub fn new(sizes: &FrameSizes, use_phase_vocoder: bool) -> Self {
        let fades = FadeWindows::new(sizes.sola_buffer_frame);
        let vocoder = use_phase_vocoder.then(|| PhaseVocoder::new(&fades));
        Self {
            buffer_frame: sizes.sola_buffer_frame,
            search_frame: sizes.sola_search_frame,
            fades,
            vocoder,
            blended: vec![0.0; sizes.sola_buffer_frame],
        }
    }

    pub fn fades(&self) -> &FadeWindows {
        &self.fades
    }

    pub fn uses_phase_vocoder(&self) -> bool {
        self.vocoder.is_some()
    }

    /// Offset in `[0, sola_search_frame)` whose `sola_buffer_frame` window of
    /// `region` best matches `previous_tail` under normalized
    /// cross-correlation. Ties keep the lowest offset; a silent
    /// `previous_tail` yields 0.
    pub fn find_offset(&self, region: &[f32], previous_tail: &[f32]) -> usize {
        let n = self.buffer_frame.min(previous_tail.len());
        if n == 0 || region.len() < n || previous_tail.iter().all(|&v| v == 0.0) {
            return 0;
        }
        let candidates = self.search_frame.min(region.len() - n + 1);

        let mut energy: f64 = region[..n].iter().map(|&v| v as f64 * v as f64).sum();
        let mut best_offset = 0;
        let mut best_score = f64::NEG_INFINITY;
        for k in 0..candidates {
            let window = &region[k..k + n];
            let dot: f64 = window
                .iter()
                .zip(previous_tail)
                .map(|(&a, &b)| a as f64 * b as f64)
                .sum();
            let score = dot / (energy.max(0.0) + CORRELATION_EPSILON).sqrt();
            if score > best_score {
                best_score = score;
                best_offset = k;
            }
            if k + n < region.len() {
                let entering = region[k + n] as f64;
                let leaving = region[k] as f64;
                energy += entering * entering - leaving * leaving;
            }
        }
        best_offset
    }

    /// Crossfades the head of `window` (already advanced by the SOLA offset)
    /// against the stored tail, then stores `window[block_frame..][..n]` as
    /// the next tail. `window` must hold at least `block_frame + n` samples.
    pub fn splice(&mut self, window: &mut [f32], block_frame: usize, state: &mut SolaState) {
        let n = self.buffer_frame;
        match self.vocoder.as_mut() {
            Some(vocoder) => {
                vocoder.blend(&state.sola_buffer, &window[..n], &mut self.blended);
                window[..n].copy_from_slice(&self.blended);
            }
            None => self.fades.crossfade(&mut window[..n], &state.sola_buffer),
        }
        state
            .sola_buffer
            .copy_from_slice(&window[block_frame..block_frame + n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vc_core::StreamConfig;

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

    fn noise(len: usize, seed: u32) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1 << 24) as f32 - 0.5
            })
            .collect()
    }

    #[test]
    fn silent_tail_defaults_to_zero_offset() {
        let sizes = sizes();
        let aligner = SolaAligner::new(&sizes, false);
        let region = noise(sizes.sola_buffer_frame + sizes.sola_search_frame, 7);
        let tail = vec![0.0; sizes.sola_buffer_frame];
        assert_eq!(aligner.find_offset(&region, &tail), 0);
    }

    #[test]
    fn finds_shifted_copy() {
        let sizes = sizes();
        let aligner = SolaAligner::new(&sizes, false);
        let region = noise(sizes.sola_buffer_frame + sizes.sola_search_frame, 11);
        let tail = region[137..137 + sizes.sola_buffer_frame].to_vec();
        assert_eq!(aligner.find_offset(&region, &tail), 137);
        // Same inputs, same answer.
        assert_eq!(aligner.find_offset(&region, &tail), 137);
    }

    #[test]
    fn ties_keep_lowest_offset() {
        let sizes = sizes();
        let aligner = SolaAligner::new(&sizes, false);
        let region = vec![0.25; sizes.sola_buffer_frame + sizes.sola_search_frame];
        let tail = vec![1.0; sizes.sola_buffer_frame];
        assert_eq!(aligner.find_offset(&region, &tail), 0);
    }

    #[test]
    fn offset_stays_inside_search_range() {
        let sizes = sizes();
        let aligner = SolaAligner::new(&sizes, false);
        for seed in 0..8 {
            let region = noise(sizes.sola_buffer_frame + sizes.sola_search_frame, seed);
            let tail = noise(sizes.sola_buffer_frame, seed + 100);
            assert!(aligner.find_offset(&region, &tail) < sizes.sola_search_frame);
        }
    }

    #[test]
    fn splice_crossfades_and_stores_tail() {
        let sizes = sizes();
        let n = sizes.sola_buffer_frame;
        let mut aligner = SolaAligner::new(&sizes, false);
        let mut state = SolaState::new(n);
        state.sola_buffer.fill(-1.0);
        let mut window = vec![1.0_f32; sizes.block_frame + n];
        window[sizes.block_frame..].fill(0.5);
        aligner.splice(&mut window, sizes.block_frame, &mut state);

        assert_eq!(window[0], -1.0);
        assert!((window[n - 1] - 1.0).abs() < 1e-6);
        assert!(state.sola_buffer().iter().all(|&v| v == 0.5));
    }

    #[test]
    fn phase_vocoder_splice_of_matching_signal_is_transparent() {
        let sizes = sizes();
        let n = sizes.sola_buffer_frame;
        let mut aligner = SolaAligner::new(&sizes, true);
        assert!(aligner.uses_phase_vocoder());
        let signal: Vec<f32> = (0..sizes.block_frame + n)
            .map(|i| 0.3 * (2.0 * std::f32::consts::PI * 200.0 * i as f32 / 48_000.0).sin())
            .collect();
        let mut state = SolaState::new(n);
        state.sola_buffer.copy_from_slice(&signal[..n]);
        let mut window = signal.clone();
        aligner.splice(&mut window, sizes.block_frame, &mut state);
        for (a, b) in window[..n].iter().zip(&signal[..n]) {
            assert!((a - b).abs() < 1e-4);
        }
    }
}
