use std::f64::consts::FRAC_PI_2;

/// Raised-sine crossfade pair: `fade_in = sin(0.5π·t)²` over `t ∈ [0, 1]`,
/// `fade_out = 1 - fade_in`.
#[derive(Debug, Clone, PartialEq)]
pub struct FadeWindows {
    fade_in: Vec<f32>,
    fade_out: Vec<f32>,
}

impl FadeWindows {
    pub fn new(len: usize) -> Self {
        let denom = len.saturating_sub(1).max(1) as f64;
        let fade_in: Vec<f32> = (0..len)
            .map(|i| {
                let t = i as f64 / denom;
                (FRAC_PI_2 * t).sin().powi(2) as f32
            })
            .collect();
        let fade_out = fade_in.iter().map(|v| 1.0 - v).collect();
        Self { fade_in, fade_out }
    }

    pub fn len(&self) -> usize {
        self.fade_in.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fade_in.is_empty()
    }

    pub fn fade_in(&self) -> &[f32] {
        &self.fade_in
    }

    pub fn fade_out(&self) -> &[f32] {
        &self.fade_out
    }

    /// `incoming = incoming * fade_in + outgoing * fade_out` over the window.
    pub fn crossfade(&self, incoming: &mut [f32], outgoing: &[f32]) {
        for (((x, &prev), &fi), &fo) in incoming
            .iter_mut()
            .zip(outgoing)
            .zip(&self.fade_in)
            .zip(&self.fade_out)
        {
            *x = *x * fi + prev * fo;
        }
    }
}
