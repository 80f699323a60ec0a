/// [`amplitude_to_db`] のパワー下限（-100 dB）。
const POWER_FLOOR: f32 = 1.0e-10;

/// 振幅を dB に変換する（`librosa.amplitude_to_db(ref=1.0)` 相当、`top_db` なし）。
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    10.0 * (amplitude * amplitude).max(POWER_FLOOR).log10()
}

/// 波形全体の RMS。空なら 0。
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&v| v as f64 * v as f64).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// `len` サンプルの信号に対する中心揃えフレームの数。
pub fn frame_count(len: usize, frame_length: usize, hop_length: usize) -> usize {
    if hop_length == 0 {
        return 0;
    }
    let pad = frame_length / 2;
    let padded = len + 2 * pad;
    if padded < frame_length {
        return 0;
    }
    1 + (padded - frame_length) / hop_length
}

/// 中心揃え・ゼロパディングの短時間RMS（`librosa.feature.rms` 相当）。
///
/// フレーム `f` は `signal[f * hop - frame_length / 2 ..][..frame_length]` を見る。
/// 範囲外はゼロ扱い。最大 `out.len()` フレームを書き込み、書いた数を返す。
pub fn frame_rms_into(
    signal: &[f32],
    frame_length: usize,
    hop_length: usize,
    out: &mut [f32],
) -> usize {
    let frames = frame_count(signal.len(), frame_length, hop_length).min(out.len());
    if frame_length == 0 {
        out[..frames].fill(0.0);
        return frames;
    }
    let pad = (frame_length / 2) as isize;
    let len = signal.len() as isize;
    for (f, slot) in out[..frames].iter_mut().enumerate() {
        let start = (f * hop_length) as isize - pad;
        let lo = start.max(0);
        let hi = (start + frame_length as isize).min(len);
        let sum_sq: f64 = if hi > lo {
            signal[lo as usize..hi as usize]
                .iter()
                .map(|&v| v as f64 * v as f64)
                .sum()
        } else {
            0.0
        };
        *slot = (sum_sq / frame_length as f64).sqrt() as f32;
    }
    frames
}

/// フレーム値を `hop_length` 間隔の線形補間でサンプル単位に広げる（`align_corners=True`）。
pub fn interpolate_frames_into(frames: &[f32], hop_length: usize, out: &mut [f32]) {
    if frames.is_empty() || hop_length == 0 {
        out.fill(0.0);
        return;
    }
    let last = frames.len() - 1;
    for (i, slot) in out.iter_mut().enumerate() {
        let left = (i / hop_length).min(last);
        let right = (left + 1).min(last);
        let frac = (i % hop_length) as f32 / hop_length as f32;
        *slot = frames[left] * (1.0 - frac) + frames[right] * frac;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_of_unit_and_silence() {
        assert!(amplitude_to_db(1.0).abs() < 1e-6);
        assert!((amplitude_to_db(0.1) + 20.0).abs() < 1e-4);
        assert!((amplitude_to_db(0.0) + 100.0).abs() < 1e-4);
    }

    #[test]
    fn frame_count_matches_centered_framing() {
        assert_eq!(frame_count(4_800, 1_920, 480), 11);
        assert_eq!(frame_count(0, 1_920, 480), 1);
    }

    #[test]
    fn frame_rms_of_constant_signal() {
        let x = vec![0.5_f32; 4_800];
        let mut out = vec![0.0_f32; 16];
        let n = frame_rms_into(&x, 1_920, 480, &mut out);
        assert_eq!(n, 11);
        // 信号の内側に収まるフレームは元のレベルそのもの。
        for v in &out[2..9] {
            assert_eq!(*v, 0.5);
        }
        // 端のフレームは半分がゼロパディング。
        assert!((out[0] - 0.5 * 0.5_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn interpolation_hits_frame_values_at_centers() {
        let frames = [0.0_f32, 1.0, 3.0];
        let mut out = vec![0.0_f32; 8];
        interpolate_frames_into(&frames, 4, &mut out);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[2], 0.5);
        assert_eq!(out[4], 1.0);
        assert_eq!(out[6], 2.0);
    }

    #[test]
    fn compute_rms_sine() {
        let x: Vec<f32> = (0..48_000)
            .map(|i| (2.0 * std::f32::consts::PI * 100.0 * i as f32 / 48_000.0).sin())
            .collect();
        assert!((compute_rms(&x) - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-3);
    }
}
