//! RBJ-cookbook biquad filters: coefficient computation plus a
//! Direct-Form-II-Transposed per-sample step.
//!
//! A filter exists per global master, per track (0..15), and per pad
//! (0..23); see [`crate::effects::FilterBank`]. Coefficient recomputation and
//! per-sample processing are deliberately separate so the control task can
//! own the former and the audio task the latter (§5's locking discipline:
//! the lock guards only the coefficient struct, never the DSP loop).

use serde::{Deserialize, Serialize};

use crate::config::SAMPLE_RATE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterType {
    #[default]
    None,
    LowPass,
    HighPass,
    BandPass,
    Notch,
    AllPass,
    Peaking,
    LowShelf,
    HighShelf,
    Resonant,
}

/// Normalized biquad coefficients (already divided by `a0`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl Coeffs {
    pub const IDENTITY: Coeffs = Coeffs { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 };
}

impl Default for Coeffs {
    fn default() -> Self {
        Coeffs::IDENTITY
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FilterParams {
    pub filter_type: FilterType,
    pub cutoff_hz: f32,
    pub q: f32,
    pub gain_db: f32,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self { filter_type: FilterType::None, cutoff_hz: 1000.0, q: 0.707, gain_db: 0.0 }
    }
}

impl FilterParams {
    /// RBJ audio cookbook formulas. `Resonant` is modeled as a high-Q
    /// low-pass. Bypassed (`type = None`) yields the identity response.
    pub fn compute_coeffs(&self) -> Coeffs {
        if self.filter_type == FilterType::None {
            return Coeffs::IDENTITY;
        }
        let fs = SAMPLE_RATE as f32;
        let cutoff = self.cutoff_hz.clamp(20.0, fs / 2.0 - 1.0);
        let q = self.q.max(0.01);
        let omega = 2.0 * std::f32::consts::PI * cutoff / fs;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);
        let a_amp = 10f32.powf(self.gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match self.filter_type {
            FilterType::None => unreachable!(),
            FilterType::LowPass | FilterType::Resonant => {
                let q = if self.filter_type == FilterType::Resonant { q.max(4.0) } else { q };
                let alpha = sin_omega / (2.0 * q);
                let b1 = 1.0 - cos_omega;
                let b0 = b1 / 2.0;
                let b2 = b0;
                let a0 = 1.0 + alpha;
                let a1 = -2.0 * cos_omega;
                let a2 = 1.0 - alpha;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::HighPass => {
                let b0 = (1.0 + cos_omega) / 2.0;
                let b1 = -(1.0 + cos_omega);
                let b2 = b0;
                let a0 = 1.0 + alpha;
                let a1 = -2.0 * cos_omega;
                let a2 = 1.0 - alpha;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::BandPass => {
                let b0 = alpha;
                let b1 = 0.0;
                let b2 = -alpha;
                let a0 = 1.0 + alpha;
                let a1 = -2.0 * cos_omega;
                let a2 = 1.0 - alpha;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::Notch => {
                let b0 = 1.0;
                let b1 = -2.0 * cos_omega;
                let b2 = 1.0;
                let a0 = 1.0 + alpha;
                let a1 = -2.0 * cos_omega;
                let a2 = 1.0 - alpha;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::AllPass => {
                let b0 = 1.0 - alpha;
                let b1 = -2.0 * cos_omega;
                let b2 = 1.0 + alpha;
                let a0 = 1.0 + alpha;
                let a1 = -2.0 * cos_omega;
                let a2 = 1.0 - alpha;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::Peaking => {
                let b0 = 1.0 + alpha * a_amp;
                let b1 = -2.0 * cos_omega;
                let b2 = 1.0 - alpha * a_amp;
                let a0 = 1.0 + alpha / a_amp;
                let a1 = -2.0 * cos_omega;
                let a2 = 1.0 - alpha / a_amp;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::LowShelf => {
                let two_sqrt_a_alpha = 2.0 * a_amp.sqrt() * alpha;
                let b0 = a_amp * ((a_amp + 1.0) - (a_amp - 1.0) * cos_omega + two_sqrt_a_alpha);
                let b1 = 2.0 * a_amp * ((a_amp - 1.0) - (a_amp + 1.0) * cos_omega);
                let b2 = a_amp * ((a_amp + 1.0) - (a_amp - 1.0) * cos_omega - two_sqrt_a_alpha);
                let a0 = (a_amp + 1.0) + (a_amp - 1.0) * cos_omega + two_sqrt_a_alpha;
                let a1 = -2.0 * ((a_amp - 1.0) + (a_amp + 1.0) * cos_omega);
                let a2 = (a_amp + 1.0) + (a_amp - 1.0) * cos_omega - two_sqrt_a_alpha;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::HighShelf => {
                let two_sqrt_a_alpha = 2.0 * a_amp.sqrt() * alpha;
                let b0 = a_amp * ((a_amp + 1.0) + (a_amp - 1.0) * cos_omega + two_sqrt_a_alpha);
                let b1 = -2.0 * a_amp * ((a_amp - 1.0) + (a_amp + 1.0) * cos_omega);
                let b2 = a_amp * ((a_amp + 1.0) + (a_amp - 1.0) * cos_omega - two_sqrt_a_alpha);
                let a0 = (a_amp + 1.0) - (a_amp - 1.0) * cos_omega + two_sqrt_a_alpha;
                let a1 = 2.0 * ((a_amp - 1.0) - (a_amp + 1.0) * cos_omega);
                let a2 = (a_amp + 1.0) - (a_amp - 1.0) * cos_omega - two_sqrt_a_alpha;
                (b0, b1, b2, a0, a1, a2)
            }
        };

        Coeffs { b0: b0 / a0, b1: b1 / a0, b2: b2 / a0, a1: a1 / a0, a2: a2 / a0 }
    }
}

/// Per-voice/track/pad Direct-Form-II-Transposed filter state. Owned
/// exclusively by the audio task; never touched by the control task.
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadState {
    x1: f32,
    x2: f32,
}

impl BiquadState {
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
    }

    /// One sample through the filter, clamped to 16-bit range.
    #[inline]
    pub fn process(&mut self, coeffs: &Coeffs, input: f32) -> f32 {
        let y = coeffs.b0 * input + self.x1;
        self.x1 = coeffs.b1 * input - coeffs.a1 * y + self.x2;
        self.x2 = coeffs.b2 * input - coeffs.a2 * y;
        y.clamp(i16::MIN as f32, i16::MAX as f32)
    }
}
