//! Filter stages and cut cascades
//!
//! A [`FilterStage`] is one biquad section running Direct Form I with `f64`
//! arithmetic and registers on `f32` samples. It holds its coefficients through a swappable `Arc` handle and
//! owns its delay registers privately. A [`CutCascade`] is a fixed array of
//! four stages of which only the leading `slope.sections()` are active.
//!
//! Everything here runs on the audio thread: no allocation, no locking, and
//! no dropping of coefficient handles. Replaced handles are handed to a
//! caller-supplied `retire` sink instead.

use crate::domain::coefficients::{BiquadCoeffs, CutCoefficients, MAX_SECTIONS};
use crate::domain::params::Slope;
use std::sync::Arc;

/// Single 2nd-order IIR section with bypass
///
/// Direct Form I keeps coefficient swaps click-free: the registers hold past
/// input/output samples, not coefficient-dependent internal state.
#[derive(Debug, Clone)]
pub struct FilterStage {
    coeffs: Arc<BiquadCoeffs>,
    bypassed: bool,
    // Previous input samples (x[n-1], x[n-2])
    x1: f64,
    x2: f64,
    // Previous output samples (y[n-1], y[n-2])
    y1: f64,
    y2: f64,
}

impl Default for FilterStage {
    fn default() -> Self {
        Self::new(Arc::new(BiquadCoeffs::identity()))
    }
}

impl FilterStage {
    pub fn new(coeffs: Arc<BiquadCoeffs>) -> Self {
        Self {
            coeffs,
            bypassed: false,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Process a single sample
    ///
    /// A bypassed stage returns `x` and leaves its registers untouched. A
    /// non-finite input is replaced by silence without advancing the
    /// registers; a non-finite result clears the registers and lets the input
    /// through, so a blown-up state cannot feed back forever.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        if self.bypassed {
            return x;
        }
        if !x.is_finite() {
            return 0.0;
        }

        let c = &*self.coeffs;
        let xd = f64::from(x);
        // y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
        let y = c.b0 * xd + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        let out = y as f32;

        if !out.is_finite() {
            self.reset();
            return x;
        }

        self.x2 = self.x1;
        self.x1 = xd;
        self.y2 = self.y1;
        self.y1 = y;

        out
    }

    /// Swap in new coefficients, returning the previous handle
    ///
    /// The returned handle must be passed back to the control thread rather
    /// than dropped on the audio thread.
    #[must_use = "retired coefficients must be sent back to the control thread"]
    pub fn set_coefficients(&mut self, coeffs: Arc<BiquadCoeffs>) -> Arc<BiquadCoeffs> {
        std::mem::replace(&mut self.coeffs, coeffs)
    }

    pub fn coefficients(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    pub fn coefficients_handle(&self) -> &Arc<BiquadCoeffs> {
        &self.coeffs
    }

    /// Toggle bypass
    ///
    /// Re-enabling a stage clears its registers: they were frozen while the
    /// stage was bypassed and no longer match the signal.
    pub fn set_bypassed(&mut self, bypassed: bool) {
        if self.bypassed && !bypassed {
            self.reset();
        }
        self.bypassed = bypassed;
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    /// Delay registers as `[x1, x2, y1, y2]`
    pub fn registers(&self) -> [f64; 4] {
        [self.x1, self.x2, self.y1, self.y2]
    }
}

/// Variable-order Butterworth cut built from four fixed stages
#[derive(Debug, Clone)]
pub struct CutCascade {
    stages: [FilterStage; MAX_SECTIONS],
    slope: Slope,
}

impl Default for CutCascade {
    fn default() -> Self {
        Self::new()
    }
}

impl CutCascade {
    /// Identity stages with the default 12 dB/oct slope
    pub fn new() -> Self {
        let mut cascade = Self {
            stages: std::array::from_fn(|_| FilterStage::default()),
            slope: Slope::default(),
        };
        cascade.set_slope(Slope::default());
        cascade
    }

    /// Activate the first `slope.sections()` stages and bypass the rest
    ///
    /// Stages past the active count are explicitly bypassed so that stale
    /// coefficients they still hold never reach the signal or the response.
    pub fn set_slope(&mut self, slope: Slope) {
        for (k, stage) in self.stages.iter_mut().enumerate() {
            stage.set_bypassed(k >= slope.sections());
        }
        self.slope = slope;
    }

    pub fn slope(&self) -> Slope {
        self.slope
    }

    /// Load the designed sections into the active prefix, then apply the slope
    pub fn apply_coefficients(
        &mut self,
        coeffs: &CutCoefficients,
        retire: &mut impl FnMut(Arc<BiquadCoeffs>),
    ) {
        for (stage, section) in self.stages.iter_mut().zip(coeffs.sections()) {
            retire(stage.set_coefficients(Arc::clone(section)));
        }
        self.set_slope(coeffs.slope());
    }

    /// Forward through stages 0..4, each honouring its own bypass flag
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        self.stages.iter_mut().fold(x, |acc, stage| stage.process(acc))
    }

    pub fn active_sections(&self) -> usize {
        self.stages.iter().filter(|s| !s.is_bypassed()).count()
    }

    pub fn stage(&self, index: usize) -> Option<&FilterStage> {
        self.stages.get(index)
    }

    pub fn stages(&self) -> &[FilterStage; MAX_SECTIONS] {
        &self.stages
    }

    pub fn reset(&mut self) {
        self.stages.iter_mut().for_each(FilterStage::reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;

    fn impulse(len: usize) -> Vec<f32> {
        let mut signal = vec![0.0; len];
        signal[0] = 1.0;
        signal
    }

    fn discard(_: Arc<BiquadCoeffs>) {}

    #[test]
    fn test_identity_stage_reproduces_impulse() {
        let mut stage = FilterStage::default();
        let output: Vec<f32> = impulse(16).into_iter().map(|x| stage.process(x)).collect();
        assert_eq!(output, impulse(16));
    }

    #[test]
    fn test_silence_in_silence_out() {
        let mut stage = FilterStage::new(Arc::new(BiquadCoeffs::peaking(SR, 1000.0, 12.0, 2.0)));
        for _ in 0..1024 {
            assert_eq!(stage.process(0.0), 0.0);
        }
        assert_eq!(stage.registers(), [0.0; 4]);
    }

    #[test]
    fn test_difference_equation() {
        let coeffs = BiquadCoeffs {
            b0: 0.5,
            b1: 0.25,
            b2: 0.125,
            a1: -0.5,
            a2: 0.25,
        };
        let mut stage = FilterStage::new(Arc::new(coeffs));

        assert_eq!(stage.process(1.0), 0.5);
        // 0.25 * 1 - (-0.5 * 0.5)
        assert_eq!(stage.process(0.0), 0.5);
        // 0.125 * 1 + 0.5 * 0.5 - 0.25 * 0.5
        assert_eq!(stage.process(0.0), 0.25);
    }

    #[test]
    fn test_bypass_freezes_registers() {
        let mut stage = FilterStage::new(Arc::new(BiquadCoeffs::low_pass(SR, 500.0, 0.707)));
        stage.process(1.0);
        let before = stage.registers();

        stage.set_bypassed(true);
        assert_eq!(stage.process(0.75), 0.75);
        assert_eq!(stage.registers(), before);
    }

    #[test]
    fn test_reenable_clears_registers() {
        let mut stage = FilterStage::new(Arc::new(BiquadCoeffs::low_pass(SR, 500.0, 0.707)));
        stage.process(1.0);
        stage.set_bypassed(true);
        stage.set_bypassed(false);
        assert_eq!(stage.registers(), [0.0; 4]);
    }

    #[test]
    fn test_set_coefficients_returns_previous_handle() {
        let first = Arc::new(BiquadCoeffs::identity());
        let second = Arc::new(BiquadCoeffs::peaking(SR, 1000.0, 6.0, 1.0));
        let mut stage = FilterStage::new(Arc::clone(&first));

        let retired = stage.set_coefficients(Arc::clone(&second));
        assert!(Arc::ptr_eq(&retired, &first));
        assert!(Arc::ptr_eq(stage.coefficients_handle(), &second));
    }

    #[test]
    fn test_non_finite_input_is_silenced() {
        let mut stage = FilterStage::new(Arc::new(BiquadCoeffs::peaking(SR, 1000.0, 6.0, 1.0)));
        stage.process(0.5);
        let before = stage.registers();

        assert_eq!(stage.process(f32::NAN), 0.0);
        assert_eq!(stage.process(f32::INFINITY), 0.0);
        assert_eq!(stage.registers(), before);
        assert!(stage.process(0.25).is_finite());
    }

    #[test]
    fn test_non_finite_output_resets_state() {
        let exploding = BiquadCoeffs {
            b0: f64::MAX,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        };
        let mut stage = FilterStage::new(Arc::new(exploding));
        assert_eq!(stage.process(4.0), 4.0);
        assert_eq!(stage.registers(), [0.0; 4]);
    }

    #[test]
    fn test_cascade_slope_controls_active_stages() {
        let mut cascade = CutCascade::new();
        assert_eq!(cascade.active_sections(), 1);

        for slope in Slope::ALL {
            cascade.set_slope(slope);
            assert_eq!(cascade.active_sections(), slope.sections());
            assert_eq!(cascade.slope(), slope);
        }
    }

    #[test]
    fn test_cascade_48_to_12_bypasses_extra_stages() {
        let mut cascade = CutCascade::new();
        cascade.apply_coefficients(&CutCoefficients::low_cut(SR, 200.0, Slope::Db48), &mut discard);
        assert_eq!(cascade.active_sections(), 4);

        cascade.apply_coefficients(&CutCoefficients::low_cut(SR, 200.0, Slope::Db12), &mut discard);
        assert_eq!(cascade.active_sections(), 1);
        for k in 1..MAX_SECTIONS {
            assert!(cascade.stage(k).unwrap().is_bypassed());
        }
    }

    #[test]
    fn test_apply_retires_one_handle_per_section() {
        let mut cascade = CutCascade::new();
        let mut retired = Vec::new();
        cascade.apply_coefficients(
            &CutCoefficients::high_cut(SR, 8000.0, Slope::Db36),
            &mut |handle| retired.push(handle),
        );
        assert_eq!(retired.len(), 3);
        assert!(retired.iter().all(|c| **c == BiquadCoeffs::identity()));
    }

    #[test]
    fn test_cascade_matches_sequential_sections() {
        let coeffs = CutCoefficients::low_cut(SR, 300.0, Slope::Db24);
        let mut cascade = CutCascade::new();
        cascade.apply_coefficients(&coeffs, &mut discard);

        let mut first = FilterStage::new(Arc::clone(coeffs.section(0).unwrap()));
        let mut second = FilterStage::new(Arc::clone(coeffs.section(1).unwrap()));

        for i in 0..256 {
            let x = ((i as f32) * 0.37).sin();
            let expected = second.process(first.process(x));
            assert_eq!(cascade.process(x), expected);
        }
    }

    #[test]
    fn test_low_cut_passes_tone_at_384khz() {
        const RATE: f64 = 384000.0;
        let mut cascade = CutCascade::new();
        cascade.apply_coefficients(&CutCoefficients::low_cut(RATE, 20.0, Slope::Db48), &mut discard);

        let output: Vec<f32> = (0..RATE as usize)
            .map(|i| {
                let x = (2.0 * std::f64::consts::PI * 1000.0 * i as f64 / RATE).sin() as f32;
                cascade.process(x)
            })
            .collect();

        // the second half holds exactly 500 periods of the tone
        let tail = &output[output.len() / 2..];
        let rms = (tail.iter().map(|&s| f64::from(s).powi(2)).sum::<f64>() / tail.len() as f64).sqrt();
        let gain_db = 20.0 * (rms * std::f64::consts::SQRT_2).log10();
        assert!(gain_db.abs() < 0.05, "gain {gain_db} dB");
    }

    #[test]
    fn test_cascade_reset() {
        let mut cascade = CutCascade::new();
        cascade.apply_coefficients(&CutCoefficients::low_cut(SR, 300.0, Slope::Db48), &mut discard);
        cascade.process(1.0);
        cascade.reset();
        assert!(cascade.stages().iter().all(|s| s.registers() == [0.0; 4]));
    }
}
