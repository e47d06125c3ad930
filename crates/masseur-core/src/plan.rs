//! The massage plan: owns the sampling loop and the admission check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::PlanConfig;
use crate::error::StartError;
use crate::sampler::LoadSampler;
use crate::state::{LoadState, LoadTracker, SharedState};

/// Point-in-time view of the engine, for demos and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanStatus {
    pub state: LoadState,
    pub intensity: u32,
    /// Admission checks since the last counter reset.
    pub requested: u64,
    /// Admissions since the last counter reset.
    pub granted: u64,
    /// Most recent valid usage sample, percent.
    pub last_usage: f64,
}

/// The overload-protection engine.
///
/// Construct one per process, [`start`](Plan::start) it once, and call
/// [`need_massage`](Plan::need_massage) on every incoming request. The
/// plan is inert until started and all request-path methods are lock-free,
/// so it can sit in front of the hottest handler.
pub struct Plan {
    shared: Arc<SharedState>,
    started: AtomicBool,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Plan {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SharedState::new()),
            started: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    /// Validate the config and launch the background sampling loop.
    ///
    /// One-shot: a second call fails with [`StartError::AlreadyStarted`]
    /// and leaves the running loop untouched. A config-validation failure
    /// performs no state change, so a later call with a valid config still
    /// succeeds. Must be called from within a Tokio runtime.
    pub fn start(
        &self,
        config: PlanConfig,
        sampler: Box<dyn LoadSampler>,
    ) -> Result<(), StartError> {
        let tuning = config.tuning()?;
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StartError::AlreadyStarted);
        }

        let tracker = LoadTracker::new(tuning, Arc::clone(&self.shared));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_sampling_loop(
            tracker,
            sampler,
            tuning.sample_interval,
            shutdown_rx,
        ));

        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        *worker = Some(Worker {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Per-request admission check: `true` means shed this request now.
    ///
    /// Lock-free and infallible. Returns `false` whenever the plan is
    /// relaxed or was never started; while tired it enforces the current
    /// intensity through the admission gate.
    pub fn need_massage(&self) -> bool {
        if self.shared.load_state() == LoadState::Relaxed {
            return false;
        }
        !self.shared.gate.admit(self.shared.intensity())
    }

    /// Snapshot the published engine state.
    pub fn status(&self) -> PlanStatus {
        PlanStatus {
            state: self.shared.load_state(),
            intensity: self.shared.intensity(),
            requested: self.shared.gate.requested(),
            granted: self.shared.gate.granted(),
            last_usage: self.shared.last_usage(),
        }
    }

    /// Stop the background sampling loop.
    ///
    /// Safe to call repeatedly; mainly for test teardown and orderly
    /// shutdown. Stopping does not re-arm [`start`](Plan::start).
    pub fn stop(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            let _ = worker.shutdown_tx.send(true);
            worker.handle.abort();
            info!("massage plan stopped");
        }
    }
}

impl Default for Plan {
    fn default() -> Self {
        Self::new()
    }
}

/// One sample, one evaluation, one tick of sleep, until shutdown.
async fn run_sampling_loop(
    mut tracker: LoadTracker,
    mut sampler: Box<dyn LoadSampler>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_ms = interval.as_millis() as u64, "sampling loop started");
    loop {
        let sample = sampler.sample();
        if sample.is_none() {
            debug!("load sample unavailable, dropped");
        }
        tracker.observe(sample, Instant::now());

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {
                debug!("sampling loop shutting down");
                break;
            }
        }
    }
}
