//! Deterministic admission gate.
//!
//! A Bresenham-style rate divider: given a reject intensity I, the gate
//! spreads admissions evenly across the call sequence so that after any
//! `r` calls since the last reset exactly `r × (100 − I) / 100` of them
//! were admitted. No randomness, no locks; callers race only on two
//! atomic counters.

use std::sync::atomic::{AtomicU64, Ordering};

const GRANTED_MASK: u64 = 0xFFFF_FFFF;
const REQUESTED_UNIT: u64 = 1 << 32;

/// Lock-free admit/shed decider for concurrent request threads.
#[derive(Debug, Default)]
pub struct AdmissionGate {
    // requested in the high 32 bits, granted in the low 32; packing both
    // into one word lets reset() clear the pair with a single store, so no
    // reader ever sees a mixed pre/post-reset pair.
    counters: AtomicU64,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero both counters together.
    pub fn reset(&self) {
        self.counters.store(0, Ordering::Relaxed);
    }

    /// Decide one admission at the given reject intensity (percent).
    ///
    /// Returns `true` to admit, `false` to shed. Over any run since the
    /// last reset the admitted fraction tracks `(100 − intensity)%`, with
    /// admissions spread evenly rather than in bursts: intensity 50
    /// alternates shed/admit starting with a shed.
    pub fn admit(&self, intensity: u32) -> bool {
        let admit_share = u64::from(100 - intensity.min(100));
        let previous = self.counters.fetch_add(REQUESTED_UNIT, Ordering::Relaxed);
        let requested = (previous >> 32) + 1;
        let target = requested * admit_share / 100;
        loop {
            let current = self.counters.load(Ordering::Relaxed);
            if (current & GRANTED_MASK) >= target {
                return false;
            }
            // Claim one grant; on contention re-read and re-check so the
            // granted count never runs past the target.
            if self
                .counters
                .compare_exchange_weak(current, current + 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Admission checks since the last reset.
    pub fn requested(&self) -> u64 {
        self.counters.load(Ordering::Relaxed) >> 32
    }

    /// Admissions since the last reset. Never exceeds `requested`.
    pub fn granted(&self) -> u64 {
        self.counters.load(Ordering::Relaxed) & GRANTED_MASK
    }
}
