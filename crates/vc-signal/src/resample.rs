use std::f64::consts::PI;

use ndarray::Array2;

const LOWPASS_FILTER_WIDTH: f64 = 6.0;
const ROLLOFF: f64 = 0.99;

/// ハン窓付き sinc のポリフェーズリサンプラ（`torchaudio` 相当の係数）。
///
/// 呼び出しごとに状態を持たず、`input` の外側はゼロとみなす。
/// 呼び出し側は重なりのある窓を渡し、端の信用できない部分を捨てること。
/// 係数は [`HqResampler::new`] で一度だけ作り、処理中は確保しない。
#[derive(Debug, Clone)]
pub struct HqResampler {
    src_rate: u32,
    dst_rate: u32,
    orig: usize,
    new: usize,
    width: usize,
    kernels: Array2<f32>,
}

impl HqResampler {
    pub fn new(src_rate: u32, dst_rate: u32) -> Self {
        if src_rate == dst_rate || src_rate == 0 || dst_rate == 0 {
            return Self {
                src_rate,
                dst_rate,
                orig: 1,
                new: 1,
                width: 0,
                kernels: Array2::zeros((0, 0)),
            };
        }

        let g = gcd(src_rate, dst_rate);
        let orig = (src_rate / g) as usize;
        let new = (dst_rate / g) as usize;
        let base_freq = orig.min(new) as f64 * ROLLOFF;
        let width = (LOWPASS_FILTER_WIDTH * orig as f64 / base_freq).ceil() as usize;
        let kernel_len = 2 * width + orig;
        let scale = base_freq / orig as f64;

        let kernels = Array2::from_shape_fn((new, kernel_len), |(phase, j)| {
            let idx = (j as f64 - width as f64) / orig as f64;
            let t = ((-(phase as f64) / new as f64 + idx) * base_freq)
                .clamp(-LOWPASS_FILTER_WIDTH, LOWPASS_FILTER_WIDTH);
            let window = (t * PI / LOWPASS_FILTER_WIDTH / 2.0).cos().powi(2);
            let t = t * PI;
            let sinc = if t == 0.0 { 1.0 } else { t.sin() / t };
            (sinc * window * scale) as f32
        });

        log::debug!(
            "resampler {}Hz -> {}Hz: phases={} kernel_len={} width={}",
            src_rate,
            dst_rate,
            new,
            kernel_len,
            width
        );

        Self {
            src_rate,
            dst_rate,
            orig,
            new,
            width,
            kernels,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.kernels.is_empty()
    }

    pub fn src_rate(&self) -> u32 {
        self.src_rate
    }

    pub fn dst_rate(&self) -> u32 {
        self.dst_rate
    }

    /// `input_len` サンプルの入力から得られる出力サンプル数。
    pub fn output_len(&self, input_len: usize) -> usize {
        if self.is_identity() {
            return input_len;
        }
        (self.new * input_len).div_ceil(self.orig)
    }

    /// `input` をリサンプルして `out` の先頭に書き、書いた数を返す
    /// （`output_len(input.len())` と `out.len()` の小さい方）。
    pub fn process_into(&self, input: &[f32], out: &mut [f32]) -> usize {
        let n = self.output_len(input.len()).min(out.len());
        if self.is_identity() {
            out[..n].copy_from_slice(&input[..n]);
            return n;
        }

        let len = input.len() as isize;
        let kernel_len = self.kernels.ncols() as isize;
        for (o, slot) in out[..n].iter_mut().enumerate() {
            let frame = o / self.new;
            let phase = o % self.new;
            let start = (frame * self.orig) as isize - self.width as isize;
            let first = (-start).max(0);
            let last = kernel_len.min(len - start);
            if last <= first {
                *slot = 0.0;
                continue;
            }
            let kernel = self.kernels.row(phase);
            let src = &input[(start + first) as usize..(start + last) as usize];
            *slot = kernel
                .iter()
                .skip(first as usize)
                .zip(src)
                .map(|(k, x)| k * x)
                .sum();
        }
        n
    }
}

/// `out` を必要な長さにそろえてからリサンプルする。
///
/// `out` の容量を使い回すので、足りないときだけ確保する。
pub fn resample_hq_into(resampler: &HqResampler, input: &[f32], out: &mut Vec<f32>) {
    let n = resampler.output_len(input.len());
    out.clear();
    out.resize(n, 0.0);
    resampler.process_into(input, out);
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}
