//! Frequency response evaluation for display
//!
//! A [`ResponseSnapshot`] is a plain-value copy of every stage's coefficients
//! and bypass flag. It is evaluated with the same stage order and bypass rules
//! as the audio path, but shares no state with it.

use crate::domain::audio::DEFAULT_SAMPLE_RATE;
use crate::domain::chain::ChannelChain;
use crate::domain::coefficients::{gain_to_db, BiquadCoeffs, CutCoefficients, MAX_SECTIONS};
use crate::domain::filter::{CutCascade, FilterStage};
use crate::domain::params::ranges;
use crate::domain::update::ChainUpdate;
use std::iter;

/// Lowest frequency on the response axis
pub const RESPONSE_MIN_FREQ: f64 = 20.0;
/// Highest frequency on the response axis
pub const RESPONSE_MAX_FREQ: f64 = 20000.0;

/// One stage as seen by the evaluator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageResponse {
    pub coeffs: BiquadCoeffs,
    pub bypassed: bool,
}

impl StageResponse {
    fn of(stage: &FilterStage) -> Self {
        Self {
            coeffs: *stage.coefficients(),
            bypassed: stage.is_bypassed(),
        }
    }

    /// Linear magnitude; a bypassed stage contributes unity
    pub fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        if self.bypassed {
            1.0
        } else {
            self.coeffs.magnitude(freq, sample_rate)
        }
    }
}

/// Coefficients and bypass flags of one channel chain at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSnapshot {
    low_cut: [StageResponse; MAX_SECTIONS],
    peak: StageResponse,
    high_cut: [StageResponse; MAX_SECTIONS],
    sample_rate: f64,
}

impl Default for ResponseSnapshot {
    /// Mirrors a freshly built chain
    fn default() -> Self {
        Self::capture(&ChannelChain::new(), DEFAULT_SAMPLE_RATE)
    }
}

impl ResponseSnapshot {
    /// Copy the stage state of `chain`
    pub fn capture(chain: &ChannelChain, sample_rate: f64) -> Self {
        let cut = |cascade: &CutCascade| -> [StageResponse; MAX_SECTIONS] {
            std::array::from_fn(|k| StageResponse::of(&cascade.stages()[k]))
        };
        Self {
            low_cut: cut(chain.low_cut()),
            peak: StageResponse::of(chain.peak()),
            high_cut: cut(chain.high_cut()),
            sample_rate,
        }
    }

    /// Apply an update exactly the way `ChannelChain::apply` does
    pub fn apply(&mut self, update: &ChainUpdate, sample_rate: f64) {
        self.sample_rate = sample_rate;
        if let Some(low_cut) = &update.low_cut {
            Self::apply_cut(&mut self.low_cut, low_cut);
        }
        if let Some(peak) = &update.peak {
            self.peak.coeffs = **peak;
        }
        if let Some(high_cut) = &update.high_cut {
            Self::apply_cut(&mut self.high_cut, high_cut);
        }
    }

    fn apply_cut(stages: &mut [StageResponse; MAX_SECTIONS], cut: &CutCoefficients) {
        for (stage, section) in stages.iter_mut().zip(cut.sections()) {
            stage.coeffs = **section;
        }
        let active = cut.slope().sections();
        for (k, stage) in stages.iter_mut().enumerate() {
            stage.bypassed = k >= active;
        }
    }

    /// Sample rate the coefficients were designed for
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Every stage in processing order: low cut, peak, high cut
    pub fn stages(&self) -> impl Iterator<Item = &StageResponse> {
        self.low_cut
            .iter()
            .chain(iter::once(&self.peak))
            .chain(self.high_cut.iter())
    }

    pub fn active_stages(&self) -> usize {
        self.stages().filter(|s| !s.bypassed).count()
    }

    /// Linear magnitude of the whole chain at `freq`
    pub fn magnitude_at(&self, freq: f64, sample_rate: f64) -> f64 {
        self.stages().map(|s| s.magnitude(freq, sample_rate)).product()
    }

    /// Chain magnitude in dB at `freq`, floored at -100 dB
    pub fn magnitude_db(&self, freq: f64) -> f64 {
        gain_to_db(self.magnitude_at(freq, self.sample_rate))
    }

    /// dB magnitude at `width` log-spaced frequencies from 20 Hz towards 20 kHz
    pub fn curve(&self, width: usize) -> Vec<f64> {
        self.curve_at(width, self.sample_rate)
    }

    /// [`curve`](Self::curve), interpreting the coefficients at `sample_rate`
    pub fn curve_at(&self, width: usize, sample_rate: f64) -> Vec<f64> {
        (0..width)
            .map(|i| gain_to_db(self.magnitude_at(bin_frequency(i, width), sample_rate)))
            .collect()
    }
}

/// Map a proportion in `[0, 1]` onto a logarithmic `[min, max]` range
pub fn map_to_log10(proportion: f64, min: f64, max: f64) -> f64 {
    min * (max / min).powf(proportion)
}

/// Inverse of [`map_to_log10`]
pub fn map_from_log10(value: f64, min: f64, max: f64) -> f64 {
    (value / min).ln() / (max / min).ln()
}

/// Frequency of bin `i` on a response curve `width` bins wide
pub fn bin_frequency(i: usize, width: usize) -> f64 {
    map_to_log10(i as f64 / width as f64, RESPONSE_MIN_FREQ, RESPONSE_MAX_FREQ)
}

/// Bin whose frequency is closest to `freq` on a logarithmic axis
pub fn nearest_bin(freq: f64, width: usize) -> usize {
    if width == 0 {
        return 0;
    }
    let position = map_from_log10(freq, RESPONSE_MIN_FREQ, RESPONSE_MAX_FREQ) * width as f64;
    (position.round().max(0.0) as usize).min(width - 1)
}

/// Map a dB value in the gain range onto a vertical pixel coordinate
///
/// -24 dB lands on `bottom`, +24 dB on `top`.
pub fn map_db_to_y(db: f64, bottom: f64, top: f64) -> f64 {
    let (min, max) = (f64::from(ranges::GAIN_MIN), f64::from(ranges::GAIN_MAX));
    bottom + (db - min) / (max - min) * (top - bottom)
}
