//! Coefficient calculator
//!
//! Pure functions mapping user-facing parameters (frequency, gain, quality,
//! slope) and the sample rate to biquad coefficient sets. Designs are computed
//! and stored in `f64`: a low cut at 20 Hz and 384 kHz puts the poles within
//! about 1e-7 of `z = 1`, which `f32` cannot resolve. The filter stages and the
//! response evaluator read the very same stored values.
//!
//! Callers must clamp parameters first (`ControlParameters::clamped`): a
//! frequency outside `(0, nyquist)` or a non-positive Q produces meaningless
//! coefficients.

use crate::domain::params::{ControlParameters, Slope};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

/// Maximum number of 2nd-order sections in a cut cascade
pub const MAX_SECTIONS: usize = 4;

/// Biquad filter coefficients
///
/// Normalized so that `a0 == 1.0`. Immutable once built; shared between the
/// left and right chains through an `Arc`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoeffs {
    /// Numerator coefficients
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    /// Denominator coefficients (a0 is normalized to 1.0)
    pub a1: f64,
    pub a2: f64,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::identity()
    }
}

impl BiquadCoeffs {
    /// Unity gain (no filtering)
    pub const fn identity() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    fn normalized(b: [f64; 3], a: [f64; 3]) -> Self {
        let a0 = a[0];
        Self {
            b0: b[0] / a0,
            b1: b[1] / a0,
            b2: b[2] / a0,
            a1: a[1] / a0,
            a2: a[2] / a0,
        }
    }

    /// Peaking (bell) filter
    ///
    /// `gain_db` is applied as the linear factor `10^(gain_db / 20)` at the
    /// center frequency; the design splits it symmetrically between numerator
    /// and denominator (`A = sqrt(gain)`).
    #[must_use]
    pub fn peaking(sample_rate: f64, freq: f32, gain_db: f32, q: f32) -> Self {
        let gain = 10.0_f64.powf(f64::from(gain_db) / 20.0);
        let a = gain.sqrt();
        let w0 = 2.0 * PI * f64::from(freq) / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * f64::from(q));

        Self::normalized(
            [1.0 + alpha * a, -2.0 * cos_w0, 1.0 - alpha * a],
            [1.0 + alpha / a, -2.0 * cos_w0, 1.0 - alpha / a],
        )
    }

    /// 2nd-order low-pass section with the given Q
    #[must_use]
    pub fn low_pass(sample_rate: f64, freq: f32, q: f64) -> Self {
        let w0 = 2.0 * PI * f64::from(freq) / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        let b = (1.0 - cos_w0) * 0.5;

        Self::normalized(
            [b, 1.0 - cos_w0, b],
            [1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha],
        )
    }

    /// 2nd-order high-pass section with the given Q
    #[must_use]
    pub fn high_pass(sample_rate: f64, freq: f32, q: f64) -> Self {
        let w0 = 2.0 * PI * f64::from(freq) / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        let b = (1.0 + cos_w0) * 0.5;

        Self::normalized(
            [b, -(1.0 + cos_w0), b],
            [1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha],
        )
    }

    /// Complex transfer function `H(e^{jw})` at `freq`
    pub fn response(&self, freq: f64, sample_rate: f64) -> Complex64 {
        let z1 = Complex64::from_polar(1.0, -2.0 * PI * freq / sample_rate);
        let z2 = z1 * z1;

        let num = self.b0 + z1 * self.b1 + z2 * self.b2;
        let den = 1.0 + z1 * self.a1 + z2 * self.a2;
        num / den
    }

    /// Linear magnitude `|H(e^{jw})|` at `freq`
    pub fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        self.response(freq, sample_rate).norm()
    }

    /// Both poles strictly inside the unit circle
    pub fn is_stable(&self) -> bool {
        let (a1, a2) = (self.a1, self.a2);
        a2.abs() < 1.0 && a1.abs() < 1.0 + a2
    }
}

/// Q of section `k` of an order-`order` Butterworth filter built from 2nd-order sections
///
/// Pole pair `k` sits at angle `pi * (2k + 1) / (2 * order)` from the negative
/// real axis, giving `Q_k = 1 / (2 cos(theta_k))`.
pub fn butterworth_q(order: usize, k: usize) -> f64 {
    let theta = PI * (2 * k + 1) as f64 / (2 * order) as f64;
    1.0 / (2.0 * theta.cos())
}

/// Coefficients for one cut cascade: `slope.sections()` analytic sections
#[derive(Debug, Clone, PartialEq)]
pub struct CutCoefficients {
    slope: Slope,
    sections: [Option<Arc<BiquadCoeffs>>; MAX_SECTIONS],
}

impl CutCoefficients {
    fn design(slope: Slope, section: impl Fn(f64) -> BiquadCoeffs) -> Self {
        let order = slope.order();
        let sections = std::array::from_fn(|k| {
            (k < slope.sections()).then(|| Arc::new(section(butterworth_q(order, k))))
        });
        Self { slope, sections }
    }

    /// Butterworth high-pass cascade of `slope.order()` total order
    pub fn low_cut(sample_rate: f64, freq: f32, slope: Slope) -> Self {
        Self::design(slope, |q| BiquadCoeffs::high_pass(sample_rate, freq, q))
    }

    /// Butterworth low-pass cascade of `slope.order()` total order
    pub fn high_cut(sample_rate: f64, freq: f32, slope: Slope) -> Self {
        Self::design(slope, |q| BiquadCoeffs::low_pass(sample_rate, freq, q))
    }

    pub fn slope(&self) -> Slope {
        self.slope
    }

    /// Section `k`, nearest the input first; `None` past the active count
    pub fn section(&self, k: usize) -> Option<&Arc<BiquadCoeffs>> {
        self.sections.get(k).and_then(Option::as_ref)
    }

    pub fn sections(&self) -> impl Iterator<Item = &Arc<BiquadCoeffs>> {
        self.sections.iter().flatten()
    }

    /// Combined magnitude of all sections
    pub fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        self.sections()
            .map(|s| s.magnitude(freq, sample_rate))
            .product()
    }
}

/// Peak coefficients for a clamped parameter snapshot
pub fn make_peak_filter(params: &ControlParameters, sample_rate: f64) -> Arc<BiquadCoeffs> {
    Arc::new(BiquadCoeffs::peaking(
        sample_rate,
        params.peak_freq,
        params.peak_gain_db,
        params.peak_quality,
    ))
}

pub fn make_low_cut_filter(params: &ControlParameters, sample_rate: f64) -> CutCoefficients {
    CutCoefficients::low_cut(sample_rate, params.low_cut_freq, params.low_cut_slope)
}

pub fn make_high_cut_filter(params: &ControlParameters, sample_rate: f64) -> CutCoefficients {
    CutCoefficients::high_cut(sample_rate, params.high_cut_freq, params.high_cut_slope)
}

/// Every coefficient of a channel chain, designed in one pass
#[derive(Debug, Clone, PartialEq)]
pub struct ChainCoefficients {
    pub peak: Arc<BiquadCoeffs>,
    pub low_cut: CutCoefficients,
    pub high_cut: CutCoefficients,
}

impl ChainCoefficients {
    pub fn design(params: &ControlParameters, sample_rate: f64) -> Self {
        Self {
            peak: make_peak_filter(params, sample_rate),
            low_cut: make_low_cut_filter(params, sample_rate),
            high_cut: make_high_cut_filter(params, sample_rate),
        }
    }
}

/// Convert linear gain to decibels with a -100 dB floor
#[inline]
pub fn gain_to_db(gain: f64) -> f64 {
    const FLOOR_DB: f64 = -100.0;
    if gain <= 0.0 {
        FLOOR_DB
    } else {
        (20.0 * gain.log10()).max(FLOOR_DB)
    }
}
