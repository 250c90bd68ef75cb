//! Domain entities and business rules

pub mod audio;
pub mod chain;
pub mod coefficients;
pub mod config;
pub mod dsp;
pub mod filter;
pub mod params;
pub mod response;
pub mod update;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{ChannelCount, EqError, ProcessSpec, DEFAULT_SAMPLE_RATE};
pub use chain::{ChannelChain, StereoEngine};
pub use coefficients::{
    butterworth_q, gain_to_db, make_high_cut_filter, make_low_cut_filter, make_peak_filter,
    BiquadCoeffs, ChainCoefficients, CutCoefficients, MAX_SECTIONS,
};
pub use config::{ConfigError, ConfigManager, EngineConfig, EqConfig, PresetManager};
pub use dsp::{Effect, Equalizer};
pub use filter::{CutCascade, FilterStage};
pub use params::{ControlParameters, ParameterId, ParameterStore, Slope};
pub use response::{
    bin_frequency, map_db_to_y, map_to_log10, nearest_bin, ResponseSnapshot, StageResponse,
};
pub use update::{link, ChainUpdate, EqController, EqProcessor, Retired, DEFAULT_QUEUE_CAPACITY};
