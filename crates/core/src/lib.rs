//! Filter-chain DSP engine of a three-band parametric equalizer
//!
//! Signal path per channel: low cut, peak, high cut. Coefficients are designed
//! on a control thread and handed to the audio thread through lock-free queues.

pub mod domain;

pub use domain::audio::Result;
pub use domain::*;
