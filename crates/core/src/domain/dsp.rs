//! Effect interface and the single-owner equalizer
//!
//! [`Equalizer`] bundles both halves of the update protocol for hosts that
//! drive parameters and audio from one place. Hosts with a dedicated audio
//! thread call [`Equalizer::split`] and move the [`EqProcessor`] over.

use crate::domain::audio::{ProcessSpec, Result};
use crate::domain::params::ControlParameters;
use crate::domain::update::{link, EqController, EqProcessor, DEFAULT_QUEUE_CAPACITY};

/// Core trait for all audio effects
///
/// All effects process audio in-place on f32 buffers normalized to [-1.0, 1.0].
pub trait Effect: Send + Sync {
    /// Process an interleaved buffer in-place
    ///
    /// # Requirements
    /// - No allocations in the hot path
    /// - Handle buffer of any size
    fn process(&mut self, buffer: &mut [f32]) -> Result<()>;

    /// Reset effect state to initial conditions
    fn reset(&mut self);

    /// Check if effect is bypassed (zero processing overhead when true)
    fn is_bypassed(&self) -> bool;

    /// Toggle bypass state
    fn set_bypass(&mut self, bypass: bool);

    /// Get effect name for debugging/display
    fn name(&self) -> &str;
}

// ============================================================================
// EQUALIZER
// ============================================================================

/// Low cut, peak and high cut applied to a stereo signal
#[derive(Debug)]
pub struct Equalizer {
    controller: EqController,
    processor: EqProcessor,
}

impl Default for Equalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Equalizer {
    pub fn new() -> Self {
        let (controller, processor) = link(DEFAULT_QUEUE_CAPACITY);
        Self {
            controller,
            processor,
        }
    }

    /// Fix sample rate and block size, then redesign every band for the new rate
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> Result<ProcessSpec> {
        let spec = self.processor.prepare(sample_rate, max_block_size)?;
        self.controller.refresh();
        Ok(spec)
    }

    /// Process up to two non-interleaved channels in place
    ///
    /// Retired coefficients are only released by the next
    /// `update_from_parameters`, so processing never frees or logs.
    pub fn process_block(&mut self, channels: &mut [&mut [f32]], num_samples: usize) -> Result<()> {
        self.controller.retry_backlog();
        self.processor.process_block(channels, num_samples)
    }

    /// Redesign the bands that changed; applied at the start of the next block
    pub fn update_from_parameters(&mut self, params: &ControlParameters) -> bool {
        self.controller.flush();
        self.controller.update_from_parameters(params)
    }

    /// dB response over `width` log-spaced bins, coefficients read at `sample_rate`
    pub fn response_curve(&self, width: usize, sample_rate: f64) -> Vec<f64> {
        self.controller.snapshot().curve_at(width, sample_rate)
    }

    pub fn controller(&self) -> &EqController {
        &self.controller
    }

    pub fn processor(&self) -> &EqProcessor {
        &self.processor
    }

    /// Separate the control half from the audio half
    pub fn split(self) -> (EqController, EqProcessor) {
        (self.controller, self.processor)
    }
}

impl Effect for Equalizer {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        self.controller.retry_backlog();
        self.processor.process(buffer)
    }

    fn reset(&mut self) {
        Effect::reset(&mut self.processor);
    }

    fn is_bypassed(&self) -> bool {
        EqProcessor::is_bypassed(&self.processor)
    }

    fn set_bypass(&mut self, bypass: bool) {
        EqProcessor::set_bypass(&mut self.processor, bypass);
    }

    fn name(&self) -> &str {
        self.processor.name()
    }
}

impl Effect for EqProcessor {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        self.process_interleaved(buffer)
    }

    fn reset(&mut self) {
        EqProcessor::reset(self);
    }

    fn is_bypassed(&self) -> bool {
        EqProcessor::is_bypassed(self)
    }

    fn set_bypass(&mut self, bypass: bool) {
        EqProcessor::set_bypass(self, bypass);
    }

    fn name(&self) -> &str {
        "Parametric EQ"
    }
}
