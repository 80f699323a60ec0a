use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex32, Fft, FftPlanner};

use crate::window::FadeWindows;

/// 位相ボコーダによるクロスフェード。
///
/// 両区間を `sqrt(fade_out * fade_in)` の窓で解析し、振幅の和を保ったまま
/// 各ビンを折り返した位相差で進める。同じ入力ならそのまま通る。
/// バッファはすべて [`PhaseVocoder::new`] で確保する。
pub struct PhaseVocoder {
    len: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    fade_out_sq: Vec<f32>,
    fade_in_sq: Vec<f32>,
    spec_a: Vec<Complex32>,
    spec_b: Vec<Complex32>,
    scratch: Vec<Complex32>,
    magnitude: Vec<f64>,
    phase: Vec<f64>,
    omega: Vec<f64>,
}

impl PhaseVocoder {
    pub fn new(fades: &FadeWindows) -> Self {
        let len = fades.len();
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(len.max(1));
        let scratch = vec![Complex32::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        let bins = len / 2 + 1;

        let window = fades
            .fade_out()
            .iter()
            .zip(fades.fade_in())
            .map(|(fo, fi)| (fo * fi).max(0.0).sqrt())
            .collect();

        Self {
            len,
            fft,
            window,
            fade_out_sq: fades.fade_out().iter().map(|v| v * v).collect(),
            fade_in_sq: fades.fade_in().iter().map(|v| v * v).collect(),
            spec_a: vec![Complex32::new(0.0, 0.0); len.max(1)],
            spec_b: vec![Complex32::new(0.0, 0.0); len.max(1)],
            scratch,
            magnitude: vec![0.0; bins],
            phase: vec![0.0; bins],
            omega: vec![0.0; bins],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// `previous`（フェードアウト側）から `incoming`（フェードイン側）へ
    /// つないだ結果を `out` に書く。3 つとも [`PhaseVocoder::len`] の長さが必要。
    pub fn blend(&mut self, previous: &[f32], incoming: &[f32], out: &mut [f32]) {
        let n = self.len;
        if n == 0 {
            return;
        }
        debug_assert!(previous.len() == n && incoming.len() == n && out.len() == n);

        for i in 0..n {
            self.spec_a[i] = Complex32::new(previous[i] * self.window[i], 0.0);
            self.spec_b[i] = Complex32::new(incoming[i] * self.window[i], 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.spec_a, &mut self.scratch);
        self.fft
            .process_with_scratch(&mut self.spec_b, &mut self.scratch);

        let bins = n / 2 + 1;
        // 実信号なので DC（と偶数長ならナイキスト）以外は片側分を2倍する。
        let doubled_end = if n % 2 == 0 { bins - 1 } else { bins };
        for k in 0..bins {
            let a = self.spec_a[k];
            let b = self.spec_b[k];
            let mut mag = a.norm() as f64 + b.norm() as f64;
            if k >= 1 && k < doubled_end {
                mag *= 2.0;
            }
            let phia = a.arg() as f64;
            let delta = b.arg() as f64 - phia;
            let delta = delta - 2.0 * PI * (delta / (2.0 * PI) + 0.5).floor();
            self.magnitude[k] = mag;
            self.phase[k] = phia;
            self.omega[k] = 2.0 * PI * k as f64 + delta;
        }

        let inv_n = 1.0 / n as f64;
        for i in 0..n {
            let t = i as f64 * inv_n;
            let mut acc = 0.0_f64;
            for k in 0..bins {
                acc += self.magnitude[k] * (self.omega[k] * t + self.phase[k]).cos();
            }
            out[i] = previous[i] * self.fade_out_sq[i]
                + incoming[i] * self.fade_in_sq[i]
                + (acc * self.window[i] as f64 * inv_n) as f32;
        }
    }
}

impl std::fmt::Debug for PhaseVocoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseVocoder").field("len", &self.len).finish()
    }
}
