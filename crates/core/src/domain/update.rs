//! Control-rate to audio-rate coefficient handoff
//!
//! The engine is split in two halves sharing an [`UpdateLink`]:
//!
//! - [`EqController`] lives on the control thread. It diffs parameter
//!   snapshots, designs coefficients for the bands that changed and publishes
//!   them as a [`ChainUpdate`]. It may allocate and log.
//! - [`EqProcessor`] lives on the audio thread. At the top of every block it
//!   swaps pending updates into both channel chains, then processes. It never
//!   allocates, locks, frees or logs.
//!
//! Two bounded lock-free queues connect them. `pending` carries fully built,
//! immutable coefficient sets to the audio thread. `retired` carries every
//! handle the audio thread lets go of back to the control thread, so the last
//! reference to a coefficient set is always dropped off the audio thread.

use crate::domain::audio::{EqError, ProcessSpec, Result};
use crate::domain::chain::StereoEngine;
use crate::domain::coefficients::{
    make_high_cut_filter, make_low_cut_filter, make_peak_filter, BiquadCoeffs, ChainCoefficients,
    CutCoefficients,
};
use crate::domain::params::{ControlParameters, ParameterStore};
use crate::domain::response::ResponseSnapshot;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Default depth of the pending queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// New coefficients for whichever bands changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainUpdate {
    pub peak: Option<Arc<BiquadCoeffs>>,
    pub low_cut: Option<CutCoefficients>,
    pub high_cut: Option<CutCoefficients>,
}

impl ChainUpdate {
    /// Update replacing every band
    pub fn full(coeffs: ChainCoefficients) -> Self {
        Self {
            peak: Some(coeffs.peak),
            low_cut: Some(coeffs.low_cut),
            high_cut: Some(coeffs.high_cut),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.peak.is_none() && self.low_cut.is_none() && self.high_cut.is_none()
    }

    /// Keep this update's bands, falling back to `older` for the bands it lacks
    #[must_use]
    pub fn merged_over(self, older: ChainUpdate) -> Self {
        Self {
            peak: self.peak.or(older.peak),
            low_cut: self.low_cut.or(older.low_cut),
            high_cut: self.high_cut.or(older.high_cut),
        }
    }

    fn bands(&self) -> Vec<&'static str> {
        [
            self.low_cut.as_ref().map(|_| "low_cut"),
            self.peak.as_ref().map(|_| "peak"),
            self.high_cut.as_ref().map(|_| "high_cut"),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Something the audio thread no longer references
#[derive(Debug)]
pub enum Retired {
    Coefficients(Arc<BiquadCoeffs>),
    Update(ChainUpdate),
}

/// Shared state between the controller and the processor
#[derive(Debug)]
pub struct UpdateLink {
    pending: ArrayQueue<ChainUpdate>,
    retired: ArrayQueue<Retired>,
    /// Sample rate bits published by `prepare`; zero until prepared
    sample_rate: AtomicU64,
}

impl UpdateLink {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        // room for every handle the queued updates can retire, plus the updates
        let retired_capacity = (capacity + 1) * (StereoEngine::MAX_RETIRED_PER_UPDATE + 1);
        Self {
            pending: ArrayQueue::new(capacity),
            retired: ArrayQueue::new(retired_capacity),
            sample_rate: AtomicU64::new(0),
        }
    }

    fn sample_rate(&self) -> Option<f64> {
        let bits = self.sample_rate.load(Ordering::Acquire);
        (bits != 0).then(|| f64::from_bits(bits))
    }

    fn retired_room(&self) -> usize {
        self.retired.capacity() - self.retired.len()
    }
}

/// Create a connected controller/processor pair
pub fn link(capacity: usize) -> (EqController, EqProcessor) {
    let link = Arc::new(UpdateLink::new(capacity));
    (
        EqController::new(Arc::clone(&link)),
        EqProcessor::new(link),
    )
}

#[derive(Debug, Clone, Copy)]
struct Published {
    params: ControlParameters,
    sample_rate: f64,
}

/// Control-thread half: parameter diffing, coefficient design, publication
#[derive(Debug)]
pub struct EqController {
    link: Arc<UpdateLink>,
    requested: ControlParameters,
    published: Option<Published>,
    backlog: Option<ChainUpdate>,
    snapshot: ResponseSnapshot,
}

impl EqController {
    fn new(link: Arc<UpdateLink>) -> Self {
        Self {
            link,
            requested: ControlParameters::default(),
            published: None,
            backlog: None,
            snapshot: ResponseSnapshot::default(),
        }
    }

    /// Sample rate last announced by the processor's `prepare`
    pub fn sample_rate(&self) -> Option<f64> {
        self.link.sample_rate()
    }

    /// Recompute and publish coefficients for every band that changed
    ///
    /// Returns `true` when an update was published. An unchanged snapshot is
    /// a no-op. Before the processor is prepared the parameters are only
    /// remembered; they are published by the first `tick` after `prepare`.
    pub fn update_from_parameters(&mut self, params: &ControlParameters) -> bool {
        self.collect_retired();
        self.requested = *params;

        let Some(sample_rate) = self.sample_rate() else {
            debug!("Processor not prepared yet, deferring coefficient update");
            return false;
        };
        let params = params.clamped(sample_rate);

        let (peak, low_cut, high_cut) = match self.published {
            Some(p) if p.sample_rate == sample_rate => (
                params.peak_differs(&p.params),
                params.low_cut_differs(&p.params),
                params.high_cut_differs(&p.params),
            ),
            _ => (true, true, true),
        };

        let update = ChainUpdate {
            peak: peak.then(|| make_peak_filter(&params, sample_rate)),
            low_cut: low_cut.then(|| make_low_cut_filter(&params, sample_rate)),
            high_cut: high_cut.then(|| make_high_cut_filter(&params, sample_rate)),
        };
        if update.is_empty() {
            return false;
        }

        debug!(
            bands = ?update.bands(),
            peak_freq = params.peak_freq,
            peak_gain_db = params.peak_gain_db,
            peak_quality = params.peak_quality,
            low_cut = %params.low_cut_slope,
            high_cut = %params.high_cut_slope,
            "Publishing coefficient update"
        );
        trace!(?update, "Designed coefficients");

        self.snapshot.apply(&update, sample_rate);
        self.published = Some(Published { params, sample_rate });
        self.publish(update);
        true
    }

    /// One control-rate tick
    ///
    /// Frees retired handles, retries any backlog, then consumes the store's
    /// dirty flag. A new sample rate from `prepare` forces a full recompute.
    pub fn tick(&mut self, store: &ParameterStore) -> bool {
        self.flush();

        if store.take_dirty() {
            let params = store.snapshot();
            return self.update_from_parameters(&params);
        }
        self.refresh()
    }

    /// Republish the last requested parameters if the sample rate moved
    pub fn refresh(&mut self) -> bool {
        let rate_changed = match (self.sample_rate(), self.published) {
            (Some(rate), Some(p)) => rate != p.sample_rate,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !rate_changed {
            return false;
        }
        let params = self.requested;
        self.update_from_parameters(&params)
    }

    fn publish(&mut self, update: ChainUpdate) {
        let update = match self.backlog.take() {
            Some(older) => update.merged_over(older),
            None => update,
        };
        if let Err(update) = self.link.pending.push(update) {
            warn!("Audio thread is not draining updates, holding back latest coefficients");
            self.backlog = Some(update);
        }
    }

    /// Release retired handles and retry a held-back update
    pub fn flush(&mut self) {
        self.collect_retired();
        self.retry_backlog();
    }

    /// Retry a held-back update; never frees, allocates or logs
    pub fn retry_backlog(&mut self) {
        if let Some(update) = self.backlog.take() {
            if let Err(update) = self.link.pending.push(update) {
                self.backlog = Some(update);
            }
        }
    }

    /// Drop everything the audio thread handed back; returns how many items
    pub fn collect_retired(&mut self) -> usize {
        let mut count = 0;
        while let Some(item) = self.link.retired.pop() {
            drop(item);
            count += 1;
        }
        if count > 0 {
            trace!(count, "Released retired coefficients");
        }
        count
    }

    /// Parameters last handed to `update_from_parameters`, unclamped
    pub fn requested(&self) -> &ControlParameters {
        &self.requested
    }

    /// Clamped parameters of the last published update
    pub fn published(&self) -> Option<&ControlParameters> {
        self.published.as_ref().map(|p| &p.params)
    }

    /// Updates queued for the audio thread
    pub fn pending_updates(&self) -> usize {
        self.link.pending.len() + usize::from(self.backlog.is_some())
    }

    /// Response of what the audio thread is running, or about to
    pub fn snapshot(&self) -> &ResponseSnapshot {
        &self.snapshot
    }

    /// Response curve over `width` log-spaced bins at the published sample rate
    pub fn response_curve(&self, width: usize) -> Vec<f64> {
        self.snapshot.curve(width)
    }
}

/// Audio-thread half: owns the stereo engine and all delay state
#[derive(Debug)]
pub struct EqProcessor {
    engine: StereoEngine,
    link: Arc<UpdateLink>,
    bypass: bool,
}

impl EqProcessor {
    fn new(link: Arc<UpdateLink>) -> Self {
        Self {
            engine: StereoEngine::new(),
            link,
            bypass: false,
        }
    }

    /// (Re)initialize the chains and announce the sample rate to the controller
    ///
    /// Called from the host's setup path, not from the audio callback.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> Result<ProcessSpec> {
        let spec = self.engine.prepare(sample_rate, max_block_size)?;
        self.link
            .sample_rate
            .store(spec.sample_rate.to_bits(), Ordering::Release);
        info!(
            sample_rate = spec.sample_rate,
            max_block_size = spec.max_block_size,
            "Equalizer prepared"
        );
        Ok(spec)
    }

    /// Swap every pending update into both chains
    ///
    /// Stops early when the retired queue could not take a full update's
    /// worth of handles; the rest is picked up on the next block.
    pub fn apply_pending(&mut self) -> usize {
        let retired = &self.link.retired;
        let mut applied = 0;

        while self.link.retired_room() > StereoEngine::MAX_RETIRED_PER_UPDATE {
            let Some(update) = self.link.pending.pop() else {
                break;
            };
            self.engine.apply(&update, &mut |handle| {
                let pushed = retired.push(Retired::Coefficients(handle));
                debug_assert!(pushed.is_ok(), "retired queue sized for a full update");
            });
            let pushed = retired.push(Retired::Update(update));
            debug_assert!(pushed.is_ok(), "retired queue sized for a full update");
            applied += 1;
        }
        applied
    }

    /// Apply pending coefficients, then process the block in place
    pub fn process_block(&mut self, channels: &mut [&mut [f32]], num_samples: usize) -> Result<()> {
        self.apply_pending();
        if self.bypass {
            self.engine.check_block(channels, num_samples)?;
            return Ok(());
        }
        self.engine.process_block(channels, num_samples)
    }

    /// Interleaved stereo variant of [`process_block`](Self::process_block)
    pub fn process_interleaved(&mut self, buffer: &mut [f32]) -> Result<()> {
        self.apply_pending();
        if self.bypass {
            return if self.engine.is_prepared() {
                Ok(())
            } else {
                Err(EqError::NotPrepared)
            };
        }
        self.engine.process_interleaved(buffer)
    }

    pub fn engine(&self) -> &StereoEngine {
        &self.engine
    }

    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
        if bypass {
            self.engine.reset();
        }
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    pub fn reset(&mut self) {
        self.engine.reset();
    }
}
