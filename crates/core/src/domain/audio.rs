//! Audio processing context shared by every stage of the equalizer
//!
//! This module defines the error taxonomy of the engine and the small value
//! types describing how the host drives it (sample rate, block size, channel
//! layout). Nothing here depends on a concrete audio backend.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the equalizer engine
#[derive(Debug, Error, PartialEq)]
pub enum EqError {
    /// A parameter value was rejected before reaching the engine
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// `process_block` was called before `prepare`
    #[error("Engine used before prepare()")]
    NotPrepared,

    /// The host handed us a channel layout we do not process
    #[error("Unsupported channel layout: {0} channels")]
    UnsupportedLayout(usize),

    /// Block is larger than announced in `prepare`, or a channel slice is short
    #[error("Block of {requested} samples exceeds limit of {max}")]
    BlockTooLarge { requested: usize, max: usize },

    /// Invalid configuration handed to `prepare`
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, EqError>;

/// Sample rate assumed before the host calls `prepare`
pub const DEFAULT_SAMPLE_RATE: f64 = 48000.0;

/// Number of audio channels on a bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelCount {
    Mono,
    Stereo,
}

impl ChannelCount {
    pub fn count(&self) -> usize {
        match self {
            ChannelCount::Mono => 1,
            ChannelCount::Stereo => 2,
        }
    }

    pub fn from_count(count: usize) -> Result<Self> {
        match count {
            1 => Ok(ChannelCount::Mono),
            2 => Ok(ChannelCount::Stereo),
            n => Err(EqError::UnsupportedLayout(n)),
        }
    }

    /// Only symmetric mono or stereo buses are supported
    pub fn supports_layout(input: usize, output: usize) -> bool {
        input == output && Self::from_count(output).is_ok()
    }
}

/// Processing context fixed by `prepare`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub sample_rate: f64,
    pub max_block_size: usize,
}

impl ProcessSpec {
    pub fn new(sample_rate: f64, max_block_size: usize) -> Result<Self> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(EqError::InvalidConfiguration(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        if max_block_size == 0 {
            return Err(EqError::InvalidConfiguration(
                "max block size must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            sample_rate,
            max_block_size,
        })
    }

    /// Highest frequency the calculator may be handed for this rate
    pub fn nyquist(&self) -> f64 {
        self.sample_rate * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_count() {
        assert_eq!(ChannelCount::Mono.count(), 1);
        assert_eq!(ChannelCount::Stereo.count(), 2);
        assert_eq!(ChannelCount::from_count(2), Ok(ChannelCount::Stereo));
        assert_eq!(ChannelCount::from_count(6), Err(EqError::UnsupportedLayout(6)));
    }

    #[test]
    fn test_supported_layouts() {
        assert!(ChannelCount::supports_layout(1, 1));
        assert!(ChannelCount::supports_layout(2, 2));
        assert!(!ChannelCount::supports_layout(1, 2));
        assert!(!ChannelCount::supports_layout(0, 0));
        assert!(!ChannelCount::supports_layout(6, 6));
    }

    #[test]
    fn test_process_spec_validation() {
        let spec = ProcessSpec::new(48000.0, 512).unwrap();
        assert_eq!(spec.nyquist(), 24000.0);

        assert!(ProcessSpec::new(0.0, 512).is_err());
        assert!(ProcessSpec::new(f64::NAN, 512).is_err());
        assert!(ProcessSpec::new(44100.0, 0).is_err());
    }
}
