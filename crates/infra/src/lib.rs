//! Host-side plumbing around the equalizer engine
//!
//! - [`control`]: the control-rate thread that polls parameters and publishes
//!   coefficient updates and response frames
//! - [`measure`]: tone and impulse measurements driven through a real engine

pub mod control;
pub mod measure;

pub use control::{ControlError, ControlLoop, ControlLoopConfig, ResponseFrame};
pub use measure::{calc_peak, calc_rms, generate_sine_wave, impulse_response, measure_gain_db};
