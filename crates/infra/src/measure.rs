//! Tone and impulse measurements
//!
//! Drives test signals through a prepared [`Equalizer`] so the audio path can
//! be checked against the response evaluator.

use eqchain_core::domain::audio::{EqError, Result};
use eqchain_core::domain::coefficients::gain_to_db;
use eqchain_core::domain::dsp::{Effect, Equalizer};

/// Generate sine wave test signal
pub fn generate_sine_wave(freq: f64, sample_rate: f64, frames: usize) -> Vec<f32> {
    (0..frames)
        .map(|i| {
            let t = i as f64 / sample_rate;
            (2.0 * std::f64::consts::PI * freq * t).sin() as f32
        })
        .collect()
}

/// Calculate RMS level
pub fn calc_rms(buffer: &[f32]) -> f64 {
    if buffer.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = buffer.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum_sq / buffer.len() as f64).sqrt()
}

/// Calculate peak level
pub fn calc_peak(buffer: &[f32]) -> f32 {
    buffer.iter().map(|&s| s.abs()).fold(0.0f32, f32::max)
}

/// Run `left` (and silence on the right) through the equalizer block by block
fn run_left(eq: &mut Equalizer, left: &mut [f32]) -> Result<()> {
    let block = eq
        .processor()
        .engine()
        .spec()
        .ok_or(EqError::NotPrepared)?
        .max_block_size;
    let mut right = vec![0.0; block];

    for chunk in left.chunks_mut(block) {
        let n = chunk.len();
        right[..n].fill(0.0);
        eq.process_block(&mut [chunk, &mut right[..n]], n)?;
    }
    Ok(())
}

/// Measured gain of the left channel at `freq`, in dB
///
/// Plays one second of sine from a cleared state and compares RMS over whole
/// periods of the second half, after the filters have settled.
pub fn measure_gain_db(eq: &mut Equalizer, freq: f64) -> Result<f64> {
    let sample_rate = eq.controller().sample_rate().ok_or(EqError::NotPrepared)?;
    if !(freq > 0.0 && freq < sample_rate * 0.5) {
        return Err(EqError::InvalidParameter(format!(
            "measurement frequency {freq} Hz outside (0, {})",
            sample_rate * 0.5
        )));
    }

    let total = sample_rate as usize;
    let settle = total / 2;
    let period = sample_rate / freq;
    let window = (((total - settle) as f64 / period).floor().max(1.0) * period).round() as usize;
    let window = window.min(total - settle);

    let input = generate_sine_wave(freq, sample_rate, total);
    let mut output = input.clone();

    Effect::reset(eq);
    run_left(eq, &mut output)?;

    let range = settle..settle + window;
    Ok(gain_to_db(calc_rms(&output[range.clone()]) / calc_rms(&input[range])))
}

/// Left-channel response to a unit impulse from a cleared state
pub fn impulse_response(eq: &mut Equalizer, samples: usize) -> Result<Vec<f32>> {
    let mut signal = vec![0.0; samples];
    if let Some(first) = signal.first_mut() {
        *first = 1.0;
    }

    Effect::reset(eq);
    run_left(eq, &mut signal)?;
    Ok(signal)
}
