//! Shared fixtures for the integration tests

use eqchain_core::domain::update::EqProcessor;
use eqchain_core::Result;

pub const SAMPLE_RATE: f64 = 48000.0;
pub const BLOCK_SIZE: usize = 256;

pub fn generate_sine_wave(frequency: f64, sample_rate: f64, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| (2.0 * std::f64::consts::PI * frequency * i as f64 / sample_rate).sin() as f32)
        .collect()
}

pub fn generate_silence(num_samples: usize) -> Vec<f32> {
    vec![0.0; num_samples]
}

pub fn peak_level(buffer: &[f32]) -> f32 {
    buffer.iter().map(|s| s.abs()).fold(0.0, f32::max)
}

/// Push `left`/`right` through the processor in blocks of `BLOCK_SIZE`
pub fn process_stereo(
    processor: &mut EqProcessor,
    left: &mut [f32],
    right: &mut [f32],
) -> Result<()> {
    for (l, r) in left.chunks_mut(BLOCK_SIZE).zip(right.chunks_mut(BLOCK_SIZE)) {
        let n = l.len();
        processor.process_block(&mut [l, r], n)?;
    }
    Ok(())
}
