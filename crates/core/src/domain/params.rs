//! User-facing equalizer parameters
//!
//! `ControlParameters` is the immutable snapshot the control tick hands to the
//! coefficient calculator. `ParameterStore` is the host-exposed storage the
//! snapshot is read from: plain atomics written by automation or the UI, plus
//! a dirty flag consumed once per control tick.

use crate::domain::audio::{EqError, Result};
use crossbeam::utils::CachePadded;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Parameter constraints
///
/// Every snapshot is clamped to these ranges before it reaches the
/// coefficient calculator.
pub mod ranges {
    /// Frequency range of every band (Hz)
    pub const FREQ_MIN: f32 = 20.0;
    pub const FREQ_MAX: f32 = 20000.0;

    /// Cutoffs never get closer to Nyquist than this fraction of the sample rate
    pub const NYQUIST_GUARD: f64 = 0.49;

    /// Peak gain range (dB)
    pub const GAIN_MIN: f32 = -24.0;
    pub const GAIN_MAX: f32 = 24.0;

    /// Peak quality range
    pub const Q_MIN: f32 = 0.1;
    pub const Q_MAX: f32 = 10.0;
}

/// Roll-off of a cut filter
///
/// Each 12 dB/oct step adds one 2nd-order section to the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Slope {
    #[default]
    Db12,
    Db24,
    Db36,
    Db48,
}

impl Slope {
    pub const ALL: [Slope; 4] = [Slope::Db12, Slope::Db24, Slope::Db36, Slope::Db48];

    /// Number of active biquad sections (1..=4)
    pub fn sections(self) -> usize {
        self.index() + 1
    }

    /// Butterworth order of the whole cascade
    pub fn order(self) -> usize {
        self.sections() * 2
    }

    pub fn db_per_octave(self) -> u32 {
        self.sections() as u32 * 12
    }

    /// Position in the host's choice list
    pub fn index(self) -> usize {
        match self {
            Slope::Db12 => 0,
            Slope::Db24 => 1,
            Slope::Db36 => 2,
            Slope::Db48 => 3,
        }
    }

    /// Host choice index, clamped to the valid range
    pub fn from_index(index: i64) -> Self {
        Self::ALL[index.clamp(0, 3) as usize]
    }

    /// Strict conversion from a dB/oct value
    pub fn from_db_per_octave(db: u32) -> Result<Self> {
        match db {
            12 => Ok(Slope::Db12),
            24 => Ok(Slope::Db24),
            36 => Ok(Slope::Db36),
            48 => Ok(Slope::Db48),
            other => Err(EqError::InvalidParameter(format!(
                "slope must be 12, 24, 36 or 48 dB/oct, got {other}"
            ))),
        }
    }

    /// Lenient conversion: snaps any value to the closest valid slope
    pub fn nearest(db: f32) -> Self {
        if !db.is_finite() {
            return Slope::default();
        }
        Self::from_index(((db / 12.0).round() as i64) - 1)
    }
}

impl TryFrom<u32> for Slope {
    type Error = EqError;

    fn try_from(db: u32) -> Result<Self> {
        Self::from_db_per_octave(db)
    }
}

impl From<Slope> for u32 {
    fn from(slope: Slope) -> u32 {
        slope.db_per_octave()
    }
}

impl fmt::Display for Slope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} dB/Oct", self.db_per_octave())
    }
}

/// Point-in-time snapshot of every equalizer parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlParameters {
    pub peak_freq: f32,
    pub peak_gain_db: f32,
    pub peak_quality: f32,
    pub low_cut_freq: f32,
    pub high_cut_freq: f32,
    pub low_cut_slope: Slope,
    pub high_cut_slope: Slope,
}

impl Default for ControlParameters {
    fn default() -> Self {
        Self {
            peak_freq: ParameterId::PeakFreq.default_value(),
            peak_gain_db: ParameterId::PeakGain.default_value(),
            peak_quality: ParameterId::PeakQuality.default_value(),
            low_cut_freq: ParameterId::LowCutFreq.default_value(),
            high_cut_freq: ParameterId::HighCutFreq.default_value(),
            low_cut_slope: Slope::default(),
            high_cut_slope: Slope::default(),
        }
    }
}

impl ControlParameters {
    /// Clamp every field into the domain the calculator accepts at `sample_rate`
    ///
    /// Frequencies land in `[20, min(20000, 0.49 * fs)]`; non-finite values
    /// fall back to the parameter's default before clamping.
    #[must_use]
    pub fn clamped(&self, sample_rate: f64) -> Self {
        let freq_max = ((ranges::NYQUIST_GUARD * sample_rate) as f32)
            .min(ranges::FREQ_MAX)
            .max(ranges::FREQ_MIN);

        let clamp = |value: f32, id: ParameterId, min: f32, max: f32| {
            let value = if value.is_finite() { value } else { id.default_value() };
            value.clamp(min, max)
        };

        Self {
            peak_freq: clamp(self.peak_freq, ParameterId::PeakFreq, ranges::FREQ_MIN, freq_max),
            peak_gain_db: clamp(
                self.peak_gain_db,
                ParameterId::PeakGain,
                ranges::GAIN_MIN,
                ranges::GAIN_MAX,
            ),
            peak_quality: clamp(
                self.peak_quality,
                ParameterId::PeakQuality,
                ranges::Q_MIN,
                ranges::Q_MAX,
            ),
            low_cut_freq: clamp(self.low_cut_freq, ParameterId::LowCutFreq, ranges::FREQ_MIN, freq_max),
            high_cut_freq: clamp(
                self.high_cut_freq,
                ParameterId::HighCutFreq,
                ranges::FREQ_MIN,
                freq_max,
            ),
            low_cut_slope: self.low_cut_slope,
            high_cut_slope: self.high_cut_slope,
        }
    }

    /// Value of one parameter in host units; slopes as their choice index
    pub fn get(&self, id: ParameterId) -> f32 {
        match id {
            ParameterId::LowCutFreq => self.low_cut_freq,
            ParameterId::LowCutSlope => self.low_cut_slope.index() as f32,
            ParameterId::HighCutFreq => self.high_cut_freq,
            ParameterId::HighCutSlope => self.high_cut_slope.index() as f32,
            ParameterId::PeakFreq => self.peak_freq,
            ParameterId::PeakGain => self.peak_gain_db,
            ParameterId::PeakQuality => self.peak_quality,
        }
    }

    /// Whether the peak band differs from `other`
    pub fn peak_differs(&self, other: &Self) -> bool {
        self.peak_freq != other.peak_freq
            || self.peak_gain_db != other.peak_gain_db
            || self.peak_quality != other.peak_quality
    }

    pub fn low_cut_differs(&self, other: &Self) -> bool {
        self.low_cut_freq != other.low_cut_freq || self.low_cut_slope != other.low_cut_slope
    }

    pub fn high_cut_differs(&self, other: &Self) -> bool {
        self.high_cut_freq != other.high_cut_freq || self.high_cut_slope != other.high_cut_slope
    }
}

/// Host-visible parameter identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterId {
    LowCutFreq,
    LowCutSlope,
    HighCutFreq,
    HighCutSlope,
    PeakFreq,
    PeakGain,
    PeakQuality,
}

impl ParameterId {
    pub const COUNT: usize = 7;

    pub const ALL: [ParameterId; Self::COUNT] = [
        ParameterId::LowCutFreq,
        ParameterId::LowCutSlope,
        ParameterId::HighCutFreq,
        ParameterId::HighCutSlope,
        ParameterId::PeakFreq,
        ParameterId::PeakGain,
        ParameterId::PeakQuality,
    ];

    /// Display name used by the host's parameter layout
    pub fn name(self) -> &'static str {
        match self {
            ParameterId::LowCutFreq => "LowCut Freq",
            ParameterId::LowCutSlope => "LowCut Slope",
            ParameterId::HighCutFreq => "HighCut Freq",
            ParameterId::HighCutSlope => "HighCut Slope",
            ParameterId::PeakFreq => "Peak Freq",
            ParameterId::PeakGain => "Peak Gain",
            ParameterId::PeakQuality => "Peak Quality",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            ParameterId::LowCutFreq | ParameterId::HighCutFreq | ParameterId::PeakFreq => "Hz",
            ParameterId::LowCutSlope | ParameterId::HighCutSlope => "dB/Oct",
            ParameterId::PeakGain => "dB",
            ParameterId::PeakQuality => "",
        }
    }

    /// Human-readable value with its unit, e.g. `"750.0 Hz"` or `"24 dB/Oct"`
    pub fn format_value(self, value: f32) -> String {
        match self {
            ParameterId::LowCutSlope | ParameterId::HighCutSlope => {
                format!("{} {}", Slope::from_index(value.round() as i64).db_per_octave(), self.unit())
            }
            ParameterId::PeakQuality => format!("{value:.2}"),
            _ => format!("{value:.1} {}", self.unit()),
        }
    }

    /// Legal host range; slopes are choice indices
    pub fn range(self) -> (f32, f32) {
        match self {
            ParameterId::LowCutFreq | ParameterId::HighCutFreq | ParameterId::PeakFreq => {
                (ranges::FREQ_MIN, ranges::FREQ_MAX)
            }
            ParameterId::LowCutSlope | ParameterId::HighCutSlope => (0.0, 3.0),
            ParameterId::PeakGain => (ranges::GAIN_MIN, ranges::GAIN_MAX),
            ParameterId::PeakQuality => (ranges::Q_MIN, ranges::Q_MAX),
        }
    }

    pub fn default_value(self) -> f32 {
        match self {
            ParameterId::LowCutFreq => 20.0,
            ParameterId::HighCutFreq => 20000.0,
            ParameterId::PeakFreq => 750.0,
            ParameterId::PeakGain => 0.0,
            ParameterId::PeakQuality => 1.0,
            ParameterId::LowCutSlope | ParameterId::HighCutSlope => 0.0,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lock-free parameter storage shared between host and control tick
///
/// Values are stored as `f32` bits; slopes are stored as their choice index.
/// Any write raises the dirty flag, which the control tick clears exactly
/// once with `take_dirty`.
pub struct ParameterStore {
    values: [AtomicU32; ParameterId::COUNT],
    dirty: CachePadded<AtomicBool>,
}

impl ParameterStore {
    pub fn new(initial: ControlParameters) -> Self {
        let store = Self {
            values: std::array::from_fn(|_| AtomicU32::new(0)),
            dirty: CachePadded::new(AtomicBool::new(true)),
        };
        store.set_all(&initial);
        store
    }

    /// Write a raw host value, clamped to the parameter's range
    pub fn set(&self, id: ParameterId, value: f32) {
        let (min, max) = id.range();
        let value = if value.is_finite() { value.clamp(min, max) } else { id.default_value() };
        self.values[id.slot()].store(value.to_bits(), Ordering::Relaxed);
        self.dirty.store(true, Ordering::Release);
    }

    pub fn get(&self, id: ParameterId) -> f32 {
        f32::from_bits(self.values[id.slot()].load(Ordering::Relaxed))
    }

    pub fn set_all(&self, params: &ControlParameters) {
        for id in ParameterId::ALL {
            self.set(id, params.get(id));
        }
    }

    /// Read every parameter into an immutable snapshot
    pub fn snapshot(&self) -> ControlParameters {
        ControlParameters {
            peak_freq: self.get(ParameterId::PeakFreq),
            peak_gain_db: self.get(ParameterId::PeakGain),
            peak_quality: self.get(ParameterId::PeakQuality),
            low_cut_freq: self.get(ParameterId::LowCutFreq),
            high_cut_freq: self.get(ParameterId::HighCutFreq),
            low_cut_slope: Slope::from_index(self.get(ParameterId::LowCutSlope).round() as i64),
            high_cut_slope: Slope::from_index(self.get(ParameterId::HighCutSlope).round() as i64),
        }
    }

    /// Clear the dirty flag, returning whether it was set
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new(ControlParameters::default())
    }
}

impl fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterStore")
            .field("params", &self.snapshot())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
