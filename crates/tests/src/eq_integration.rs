//! Integration tests for the equalizer engine
//!
//! These tests drive the complete pipeline: parameters in, coefficients across
//! threads, audio through both chains, and the response curve back out.

use eqchain_core::domain::config::EqConfig;
use eqchain_core::domain::dsp::{Effect, Equalizer};
use eqchain_core::domain::params::{ControlParameters, ParameterId, ParameterStore, Slope};
use eqchain_core::domain::response::{nearest_bin, ResponseSnapshot};
use eqchain_core::domain::update::{link, DEFAULT_QUEUE_CAPACITY};
use eqchain_core::EqError;
use eqchain_infra::control::{ControlLoop, ControlLoopConfig};
use eqchain_infra::measure::measure_gain_db;
use eqchain_tests::{
    generate_silence, generate_sine_wave, peak_level, process_stereo, BLOCK_SIZE, SAMPLE_RATE,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn scenario() -> ControlParameters {
    ControlParameters {
        peak_freq: 1000.0,
        peak_gain_db: 6.0,
        peak_quality: 1.0,
        low_cut_freq: 20.0,
        high_cut_freq: 20000.0,
        low_cut_slope: Slope::Db12,
        high_cut_slope: Slope::Db12,
    }
}

// ============================================================================
// PIPELINE TESTS
// ============================================================================

#[test]
fn test_peak_scenario_end_to_end() {
    let mut eq = Equalizer::new();
    eq.prepare(44100.0, 512).unwrap();
    assert!(eq.update_from_parameters(&scenario()));

    let curve = eq.response_curve(512, 44100.0);
    assert!((curve[nearest_bin(1000.0, 512)] - 6.0).abs() < 0.3);
    assert!(curve[0] > -3.5);
    assert!(curve[511] > -3.5);

    for freq in [100.0, 1000.0, 4000.0] {
        let measured = measure_gain_db(&mut eq, freq).unwrap();
        let computed = eq.controller().snapshot().magnitude_db(freq);
        assert!(
            (measured - computed).abs() < 0.2,
            "{freq} Hz: measured {measured}, computed {computed}"
        );
    }
}

#[test]
fn test_slope_change_bypasses_extra_sections() {
    let mut eq = Equalizer::new();
    eq.prepare(SAMPLE_RATE, 512).unwrap();

    let steep = ControlParameters {
        low_cut_freq: 1000.0,
        low_cut_slope: Slope::Db48,
        ..Default::default()
    };
    eq.update_from_parameters(&steep);
    let steep_gain = measure_gain_db(&mut eq, 250.0).unwrap();
    assert_eq!(eq.processor().engine().left().low_cut().active_sections(), 4);

    eq.update_from_parameters(&ControlParameters {
        low_cut_slope: Slope::Db12,
        ..steep
    });
    let gentle_gain = measure_gain_db(&mut eq, 250.0).unwrap();

    for chain in [eq.processor().engine().left(), eq.processor().engine().right()] {
        let low_cut = chain.low_cut();
        assert_eq!(low_cut.active_sections(), 1);
        assert!((1..4).all(|k| low_cut.stage(k).unwrap().is_bypassed()));
    }
    assert!(steep_gain < -80.0, "48 dB/oct gave {steep_gain}");
    assert!((gentle_gain + 24.0).abs() < 1.5, "12 dB/oct gave {gentle_gain}");
    assert!((eq.controller().snapshot().magnitude_db(250.0) - gentle_gain).abs() < 0.2);
}

#[test]
fn test_invalid_slope_never_changes_stage_count() {
    assert!(matches!(
        Slope::from_db_per_octave(18),
        Err(EqError::InvalidParameter(_))
    ));
    assert_eq!(Slope::from_index(7).sections(), 4);
    assert_eq!(Slope::from_index(-2).sections(), 1);
}

#[test]
fn test_out_of_range_parameters_are_clamped() {
    let mut eq = Equalizer::new();
    eq.prepare(32000.0, 512).unwrap();
    eq.update_from_parameters(&ControlParameters {
        peak_freq: f32::NAN,
        peak_gain_db: 60.0,
        high_cut_freq: 40000.0,
        ..Default::default()
    });

    let published = *eq.controller().published().unwrap();
    assert_eq!(published.peak_freq, 750.0);
    assert_eq!(published.peak_gain_db, 24.0);
    assert!(published.high_cut_freq < 15700.0);

    let mut left = generate_sine_wave(5000.0, 32000.0, 512);
    let mut right = generate_silence(512);
    eq.process_block(&mut [&mut left, &mut right], 512).unwrap();
    assert!(left.iter().all(|s| s.is_finite()));
}

#[test]
fn test_interleaved_effect_matches_planar_blocks() {
    let params = ControlParameters {
        peak_gain_db: -9.0,
        high_cut_freq: 4000.0,
        high_cut_slope: Slope::Db36,
        ..Default::default()
    };
    let left = generate_sine_wave(300.0, SAMPLE_RATE, 1024);
    let right = generate_sine_wave(6000.0, SAMPLE_RATE, 1024);

    let mut planar = Equalizer::new();
    planar.prepare(SAMPLE_RATE, 1024).unwrap();
    planar.update_from_parameters(&params);
    let (mut l, mut r) = (left.clone(), right.clone());
    planar.process_block(&mut [&mut l, &mut r], 1024).unwrap();

    let mut interleaved_eq = Equalizer::new();
    interleaved_eq.prepare(SAMPLE_RATE, 1024).unwrap();
    interleaved_eq.update_from_parameters(&params);
    let mut interleaved: Vec<f32> = left.iter().zip(&right).flat_map(|(&a, &b)| [a, b]).collect();
    Effect::process(&mut interleaved_eq, &mut interleaved).unwrap();

    let (even, odd): (Vec<_>, Vec<_>) = interleaved
        .chunks_exact(2)
        .map(|frame| (frame[0], frame[1]))
        .unzip();
    assert_eq!(even, l);
    assert_eq!(odd, r);
}

// ============================================================================
// CROSS-THREAD TESTS
// ============================================================================

#[test]
fn test_parameter_sweep_while_audio_runs() {
    let (mut controller, mut processor) = link(DEFAULT_QUEUE_CAPACITY);
    processor.prepare(SAMPLE_RATE, BLOCK_SIZE).unwrap();
    let store = ParameterStore::default();
    let running = Arc::new(AtomicBool::new(true));

    let audio_running = Arc::clone(&running);
    let audio = thread::spawn(move || {
        let tone = generate_sine_wave(440.0, SAMPLE_RATE, BLOCK_SIZE);
        let mut blocks = 0usize;
        while audio_running.load(Ordering::Acquire) {
            let mut left = tone.clone();
            let mut right = tone.clone();
            process_stereo(&mut processor, &mut left, &mut right).unwrap();
            assert!(left.iter().chain(&right).all(|s| s.is_finite()));
            blocks += 1;
        }
        (processor, blocks)
    });

    for step in 0..200u32 {
        store.set(ParameterId::PeakFreq, 100.0 + step as f32 * 50.0);
        store.set(ParameterId::PeakGain, (step % 48) as f32 - 24.0);
        store.set(ParameterId::PeakQuality, 0.5 + (step % 8) as f32);
        store.set(ParameterId::LowCutSlope, (step % 4) as f32);
        store.set(ParameterId::HighCutSlope, ((step + 2) % 4) as f32);
        store.set(ParameterId::HighCutFreq, 20000.0 - step as f32 * 40.0);
        controller.tick(&store);
        thread::sleep(Duration::from_micros(500));
    }

    running.store(false, Ordering::Release);
    let (mut processor, blocks) = audio.join().unwrap();
    assert!(blocks > 0);

    while controller.pending_updates() > 0 {
        controller.flush();
        processor.apply_pending();
    }
    controller.collect_retired();

    let engine = processor.engine();
    assert_eq!(
        ResponseSnapshot::capture(engine.left(), SAMPLE_RATE),
        *controller.snapshot()
    );
    assert_eq!(
        ResponseSnapshot::capture(engine.right(), SAMPLE_RATE),
        *controller.snapshot()
    );
    assert_eq!(controller.published().unwrap().peak_gain_db, (199 % 48) as f32 - 24.0);
}

#[test]
fn test_control_loop_drives_audio() {
    let (controller, mut processor) = link(DEFAULT_QUEUE_CAPACITY);
    processor.prepare(SAMPLE_RATE, BLOCK_SIZE).unwrap();
    let store = Arc::new(ParameterStore::default());

    let config = ControlLoopConfig {
        rate_hz: 200,
        response_width: 128,
        frame_capacity: 8,
    };
    let control = ControlLoop::spawn(controller, Arc::clone(&store), config).unwrap();

    store.set(ParameterId::PeakFreq, 1000.0);
    store.set(ParameterId::PeakGain, 12.0);
    store.set(ParameterId::PeakQuality, 2.0);

    let deadline = Instant::now() + Duration::from_secs(5);
    let frame = loop {
        assert!(Instant::now() < deadline, "no frame with the new gain");
        if let Ok(frame) = control.frames().recv_timeout(Duration::from_millis(100)) {
            if frame.params.peak_gain_db == 12.0 && frame.params.peak_freq == 1000.0 {
                break frame;
            }
        }
    };
    assert_eq!(frame.curve.len(), 128);
    assert!((frame.curve[nearest_bin(1000.0, 128)] - 12.0).abs() < 0.5);

    let mut left = generate_sine_wave(1000.0, SAMPLE_RATE, 4800);
    let mut right = left.clone();
    process_stereo(&mut processor, &mut left, &mut right).unwrap();
    let settled = peak_level(&left[2400..]);
    assert!(settled > 3.5 && settled < 4.5, "peak {settled}");

    let controller = control.stop().unwrap();
    assert_eq!(controller.published().unwrap().peak_gain_db, 12.0);
}

// ============================================================================
// CONFIGURATION TESTS
// ============================================================================

#[tokio::test]
async fn test_config_file_drives_engine() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");

    let mut config = EqConfig::default();
    config.engine.sample_rate = 44100;
    config.parameters = scenario();
    config.save_to_file(&path).await.unwrap();

    let loaded = EqConfig::load_from_file(&path).await.unwrap();
    let spec = loaded.engine.process_spec().unwrap();

    let mut eq = Equalizer::new();
    eq.prepare(spec.sample_rate, spec.max_block_size).unwrap();
    eq.update_from_parameters(&loaded.parameters);

    let width = loaded.engine.response_width as usize;
    let curve = eq.response_curve(width, spec.sample_rate);
    assert_eq!(curve.len(), width);
    assert!((curve[nearest_bin(1000.0, width)] - 6.0).abs() < 0.3);
}
