//! Per-channel signal path and the stereo engine
//!
//! The order is fixed: low cut, peak, high cut. Both channels receive the same
//! shared coefficient handles while keeping their delay registers private.

use crate::domain::audio::{ChannelCount, EqError, ProcessSpec, Result};
use crate::domain::coefficients::BiquadCoeffs;
use crate::domain::filter::{CutCascade, FilterStage};
use crate::domain::update::ChainUpdate;
use std::sync::Arc;

/// Complete signal path for one channel
#[derive(Debug, Clone, Default)]
pub struct ChannelChain {
    low_cut: CutCascade,
    peak: FilterStage,
    high_cut: CutCascade,
}

impl ChannelChain {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let x = self.low_cut.process(x);
        let x = self.peak.process(x);
        self.high_cut.process(x)
    }

    pub fn process_buffer(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process(*sample);
        }
    }

    /// Swap in whichever bands the update carries
    pub fn apply(&mut self, update: &ChainUpdate, retire: &mut impl FnMut(Arc<BiquadCoeffs>)) {
        if let Some(low_cut) = &update.low_cut {
            self.low_cut.apply_coefficients(low_cut, retire);
        }
        if let Some(peak) = &update.peak {
            retire(self.peak.set_coefficients(Arc::clone(peak)));
        }
        if let Some(high_cut) = &update.high_cut {
            self.high_cut.apply_coefficients(high_cut, retire);
        }
    }

    pub fn low_cut(&self) -> &CutCascade {
        &self.low_cut
    }

    pub fn peak(&self) -> &FilterStage {
        &self.peak
    }

    pub fn high_cut(&self) -> &CutCascade {
        &self.high_cut
    }

    pub fn reset(&mut self) {
        self.low_cut.reset();
        self.peak.reset();
        self.high_cut.reset();
    }
}

/// Two channel chains driven with identical coefficients
#[derive(Debug, Clone, Default)]
pub struct StereoEngine {
    left: ChannelChain,
    right: ChannelChain,
    spec: Option<ProcessSpec>,
}

impl StereoEngine {
    /// Most handles a single update can retire (both chains, every stage)
    pub const MAX_RETIRED_PER_UPDATE: usize = 2 * (2 * crate::domain::coefficients::MAX_SECTIONS + 1);

    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the processing context and clear all delay registers
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> Result<ProcessSpec> {
        let spec = ProcessSpec::new(sample_rate, max_block_size)?;
        self.left.reset();
        self.right.reset();
        self.spec = Some(spec);
        Ok(spec)
    }

    pub fn spec(&self) -> Option<ProcessSpec> {
        self.spec
    }

    pub fn is_prepared(&self) -> bool {
        self.spec.is_some()
    }

    /// Apply one update to both chains
    pub fn apply(&mut self, update: &ChainUpdate, retire: &mut impl FnMut(Arc<BiquadCoeffs>)) {
        self.left.apply(update, retire);
        self.right.apply(update, retire);
    }

    /// Process up to two non-interleaved channels in place
    ///
    /// One channel runs through the left chain only.
    pub fn process_block(&mut self, channels: &mut [&mut [f32]], num_samples: usize) -> Result<()> {
        let layout = self.check_block(channels, num_samples)?;

        match (layout, channels) {
            (ChannelCount::Mono, [mono]) => self.left.process_buffer(&mut mono[..num_samples]),
            (ChannelCount::Stereo, [left, right]) => {
                self.left.process_buffer(&mut left[..num_samples]);
                self.right.process_buffer(&mut right[..num_samples]);
            }
            (_, other) => return Err(EqError::UnsupportedLayout(other.len())),
        }

        Ok(())
    }

    /// Validate a planar block against the prepared spec without touching it
    pub fn check_block(&self, channels: &[&mut [f32]], num_samples: usize) -> Result<ChannelCount> {
        let spec = self.spec.ok_or(EqError::NotPrepared)?;
        let layout = ChannelCount::from_count(channels.len())?;

        if num_samples > spec.max_block_size {
            return Err(EqError::BlockTooLarge {
                requested: num_samples,
                max: spec.max_block_size,
            });
        }
        if let Some(short) = channels.iter().find(|c| c.len() < num_samples) {
            return Err(EqError::BlockTooLarge {
                requested: num_samples,
                max: short.len(),
            });
        }
        Ok(layout)
    }

    /// Process an interleaved stereo buffer in place
    ///
    /// A trailing odd sample goes through the left chain.
    pub fn process_interleaved(&mut self, buffer: &mut [f32]) -> Result<()> {
        if self.spec.is_none() {
            return Err(EqError::NotPrepared);
        }

        let mut frames = buffer.chunks_exact_mut(2);
        for frame in &mut frames {
            frame[0] = self.left.process(frame[0]);
            frame[1] = self.right.process(frame[1]);
        }
        if let [last] = frames.into_remainder() {
            *last = self.left.process(*last);
        }
        Ok(())
    }

    pub fn left(&self) -> &ChannelChain {
        &self.left
    }

    pub fn right(&self) -> &ChannelChain {
        &self.right
    }

    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}
