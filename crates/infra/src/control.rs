//! Control-rate loop
//!
//! Runs an [`EqController`] on its own thread. Every tick it polls the shared
//! [`ParameterStore`], publishes coefficient updates for the audio thread and,
//! when something changed, sends a [`ResponseFrame`] for display.

use crossbeam::channel::{bounded, select, tick, Receiver, Sender, TrySendError};
use eqchain_core::domain::config::EngineConfig;
use eqchain_core::domain::params::{ControlParameters, ParameterStore};
use eqchain_core::domain::update::EqController;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised when starting the control loop
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Failed to spawn control thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Invalid control loop configuration: {0}")]
    InvalidConfig(String),
}

/// Response of the chain after a published update
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    /// dB magnitude per log-spaced bin
    pub curve: Vec<f64>,
    /// Clamped parameters the curve was computed from
    pub params: ControlParameters,
    pub sample_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlLoopConfig {
    pub rate_hz: u32,
    pub response_width: usize,
    /// Frames buffered for the display before new ones are dropped
    pub frame_capacity: usize,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ControlLoopConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            rate_hz: config.control_rate_hz,
            response_width: config.response_width as usize,
            frame_capacity: 4,
        }
    }
}

/// Handle to a running control thread
///
/// Dropping the handle stops the thread and waits for it.
pub struct ControlLoop {
    shutdown: Option<Sender<()>>,
    frames: Receiver<ResponseFrame>,
    handle: Option<JoinHandle<EqController>>,
}

impl ControlLoop {
    pub fn spawn(
        controller: EqController,
        store: Arc<ParameterStore>,
        config: ControlLoopConfig,
    ) -> Result<Self, ControlError> {
        if config.rate_hz == 0 {
            return Err(ControlError::InvalidConfig("rate_hz must be non-zero".to_string()));
        }

        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (frame_tx, frame_rx) = bounded(config.frame_capacity.max(1));
        let period = Duration::from_secs_f64(1.0 / f64::from(config.rate_hz));

        let handle = thread::Builder::new()
            .name("eqchain-control".to_string())
            .spawn(move || run(controller, store, config, period, shutdown_rx, frame_tx))?;

        info!(rate_hz = config.rate_hz, "Control loop started");

        Ok(Self {
            shutdown: Some(shutdown_tx),
            frames: frame_rx,
            handle: Some(handle),
        })
    }

    /// Frames published so far, oldest first
    pub fn frames(&self) -> &Receiver<ResponseFrame> {
        &self.frames
    }

    /// Most recent frame, discarding older ones
    pub fn latest_frame(&self) -> Option<ResponseFrame> {
        self.frames.try_iter().last()
    }

    /// Stop the thread and take the controller back
    pub fn stop(mut self) -> Option<EqController> {
        self.shutdown_and_join()
    }

    fn shutdown_and_join(&mut self) -> Option<EqController> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.try_send(());
        }
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(controller) => Some(controller),
            Err(_) => {
                warn!("Control thread panicked");
                None
            }
        }
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

fn run(
    mut controller: EqController,
    store: Arc<ParameterStore>,
    config: ControlLoopConfig,
    period: Duration,
    shutdown: Receiver<()>,
    frames: Sender<ResponseFrame>,
) -> EqController {
    let ticker = tick(period);
    let mut dropped = 0u64;

    loop {
        select! {
            recv(shutdown) -> _ => break,
            recv(ticker) -> _ => {
                if controller.tick(&store) {
                    publish_frame(&controller, &config, &frames, &mut dropped);
                }
            }
        }
    }

    controller.collect_retired();
    info!(dropped, "Control loop stopped");
    controller
}

fn publish_frame(
    controller: &EqController,
    config: &ControlLoopConfig,
    frames: &Sender<ResponseFrame>,
    dropped: &mut u64,
) {
    let (Some(params), Some(sample_rate)) =
        (controller.published().copied(), controller.sample_rate())
    else {
        return;
    };

    let frame = ResponseFrame {
        curve: controller.response_curve(config.response_width),
        params,
        sample_rate,
    };
    match frames.try_send(frame) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            *dropped += 1;
            warn!(dropped = *dropped, "Display is not keeping up, dropping response frame");
        }
        Err(TrySendError::Disconnected(_)) => {
            debug!("Response frame receiver gone");
        }
    }
}
