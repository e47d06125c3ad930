//! Load state machine and intensity controller.
//!
//! `LoadTracker` is driven by the sampling loop, the only writer. It owns
//! the recorder and the hysteresis timers and publishes everything the
//! request threads need (state tag, intensity, gate resets) through
//! `SharedState`'s atomic cells.
//!
//! Transition rules, evaluated once per sample:
//! - `Relaxed`: when the high-load decile count exceeds the configured
//!   threshold, turn `Tired` at the initial intensity.
//! - `Tired`, count still over the threshold: stamp the latest high-load
//!   time; once high load has held for a full check period since the last
//!   adjustment, raise the intensity.
//! - `Tired`, count at or under the threshold: once low load has held for
//!   a full check period, lower the intensity. Lowering at intensity zero
//!   is the only way back to `Relaxed`.
//!
//! Every intensity change and every state change resets the admission
//! counters, so the gate's duty cycle always reflects the current target.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{FULL_INTENSITY, Tuning};
use crate::gate::AdmissionGate;
use crate::recorder::{Decile, UsageRecorder};

/// Engine state as seen by request threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// No requests are shed; the admission gate is bypassed.
    Relaxed,
    /// `intensity` percent of requests are shed.
    Tired,
}

const STATE_RELAXED: u8 = 0;
const STATE_TIRED: u8 = 1;

/// Values published by the sampling task for lock-free readers.
#[derive(Debug)]
pub(crate) struct SharedState {
    state: AtomicU8,
    intensity: AtomicU32,
    // f64 bits of the most recent valid usage sample.
    last_usage: AtomicU64,
    pub(crate) gate: AdmissionGate,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_RELAXED),
            intensity: AtomicU32::new(0),
            last_usage: AtomicU64::new(0f64.to_bits()),
            gate: AdmissionGate::new(),
        }
    }

    pub(crate) fn load_state(&self) -> LoadState {
        match self.state.load(Ordering::Relaxed) {
            STATE_TIRED => LoadState::Tired,
            _ => LoadState::Relaxed,
        }
    }

    pub(crate) fn intensity(&self) -> u32 {
        self.intensity.load(Ordering::Relaxed)
    }

    pub(crate) fn last_usage(&self) -> f64 {
        f64::from_bits(self.last_usage.load(Ordering::Relaxed))
    }

    fn publish_state(&self, state: LoadState) {
        let tag = match state {
            LoadState::Relaxed => STATE_RELAXED,
            LoadState::Tired => STATE_TIRED,
        };
        self.state.store(tag, Ordering::Relaxed);
    }

    fn publish_intensity(&self, intensity: u32) {
        self.intensity.store(intensity, Ordering::Relaxed);
    }

    fn publish_usage(&self, percent: f64) {
        self.last_usage.store(percent.to_bits(), Ordering::Relaxed);
    }
}

/// Single-writer evaluation engine driven by the sampling loop.
pub(crate) struct LoadTracker {
    decile: Decile,
    high_load_threshold: u32,
    check_period: Duration,
    initial_intensity: u32,
    step: u32,
    state: LoadState,
    intensity: u32,
    recorder: UsageRecorder,
    // Start and most recent stamp of the current high-load run. Owned by
    // the sampling task alone; never read across threads.
    oldest_high_load: Option<Instant>,
    latest_high_load: Option<Instant>,
    shared: Arc<SharedState>,
}

impl LoadTracker {
    pub(crate) fn new(tuning: Tuning, shared: Arc<SharedState>) -> Self {
        Self {
            decile: tuning.decile,
            high_load_threshold: tuning.high_load_threshold,
            check_period: tuning.check_period,
            initial_intensity: tuning.initial_intensity,
            step: tuning.intensity_step,
            state: LoadState::Relaxed,
            intensity: 0,
            recorder: UsageRecorder::new(),
            oldest_high_load: None,
            latest_high_load: None,
            shared,
        }
    }

    /// Feed one tick's sample (or its absence) and re-evaluate the state.
    pub(crate) fn observe(&mut self, sample: Option<f64>, now: Instant) {
        if let Some(percent) = sample {
            self.recorder.add_record(percent);
            if (0.0..=100.0).contains(&percent) {
                self.shared.publish_usage(percent);
            }
        }

        let high_count = self.recorder.count_at_or_above(self.decile);
        match self.state {
            LoadState::Relaxed => {
                if high_count > self.high_load_threshold {
                    self.enter_tired(high_count, now);
                }
            }
            LoadState::Tired => self.evaluate_tired(high_count, now),
        }
    }

    fn evaluate_tired(&mut self, high_count: u32, now: Instant) {
        if high_count > self.high_load_threshold {
            // A broken run restarts here; escalation needs an unbroken
            // check period of high-load evaluations.
            let oldest = *self.oldest_high_load.get_or_insert(now);
            self.latest_high_load = Some(now);
            if now.duration_since(oldest) > self.check_period {
                self.increase(now);
            }
        } else {
            self.oldest_high_load = None;
            if let Some(latest) = self.latest_high_load
                && now.duration_since(latest) > self.check_period
            {
                self.decrease(now);
            }
        }
    }

    fn enter_tired(&mut self, high_count: u32, now: Instant) {
        self.state = LoadState::Tired;
        self.set_intensity(self.initial_intensity);
        self.oldest_high_load = Some(now);
        self.latest_high_load = Some(now);
        self.shared.publish_state(LoadState::Tired);
        self.shared.gate.reset();
        warn!(
            high_count,
            threshold = self.high_load_threshold,
            intensity = self.intensity,
            "sustained high load, shedding begins"
        );
    }

    fn increase(&mut self, now: Instant) {
        self.set_intensity((self.intensity + self.step).min(FULL_INTENSITY));
        self.oldest_high_load = Some(now);
        self.latest_high_load = Some(now);
        self.shared.gate.reset();
        debug!(intensity = self.intensity, "intensity raised");
    }

    fn decrease(&mut self, now: Instant) {
        if self.intensity == 0 {
            self.set_relaxed();
            return;
        }
        self.set_intensity(self.intensity.saturating_sub(self.step));
        self.oldest_high_load = Some(now);
        self.latest_high_load = Some(now);
        self.shared.gate.reset();
        debug!(intensity = self.intensity, "intensity lowered");
    }

    fn set_relaxed(&mut self) {
        self.state = LoadState::Relaxed;
        self.set_intensity(0);
        self.oldest_high_load = None;
        self.latest_high_load = None;
        self.shared.publish_state(LoadState::Relaxed);
        self.shared.gate.reset();
        info!("load subsided, shedding ends");
    }

    fn set_intensity(&mut self, intensity: u32) {
        self.intensity = intensity;
        self.shared.publish_intensity(intensity);
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> LoadState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn intensity(&self) -> u32 {
        self.intensity
    }
}
