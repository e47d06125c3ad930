//! Usage recorder: ten saturating decile counters over the sample stream.
//!
//! Each counter approximates "how many of the last ~100 valid samples were
//! at or above k·10 percent" by incrementing when the condition holds and
//! decrementing otherwise, clamped to [0, 100]. That trades exactness for
//! O(1) memory: no sample history is kept.

/// Depth of the trailing sample window each counter approximates.
pub const WINDOW: u32 = 100;

/// A 10%-wide load threshold indexing one recorder counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Decile {
    /// Samples at or above 0%.
    P0,
    /// Samples at or above 10%.
    P10,
    /// Samples at or above 20%.
    P20,
    /// Samples at or above 30%.
    P30,
    /// Samples at or above 40%.
    P40,
    /// Samples at or above 50%.
    P50,
    /// Samples at or above 60%.
    P60,
    /// Samples at or above 70%.
    P70,
    /// Samples at or above 80%.
    P80,
    /// Samples at or above 90%.
    P90,
}

impl Decile {
    /// All deciles, lowest threshold first.
    pub const ALL: [Decile; 10] = [
        Decile::P0,
        Decile::P10,
        Decile::P20,
        Decile::P30,
        Decile::P40,
        Decile::P50,
        Decile::P60,
        Decile::P70,
        Decile::P80,
        Decile::P90,
    ];

    /// The decile whose threshold is `percent`, which must be a multiple
    /// of 10 within `0..=90`.
    pub fn from_percent(percent: u32) -> Option<Self> {
        if percent % 10 != 0 {
            return None;
        }
        Self::ALL.get((percent / 10) as usize).copied()
    }

    /// Counter index, `0..=9`.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Threshold in percent, `0..=90`.
    pub fn percent(self) -> u32 {
        self.index() as u32 * 10
    }
}

/// Approximate rolling histogram of the last ~100 load samples.
#[derive(Debug, Clone, Default)]
pub struct UsageRecorder {
    counters: [u32; 10],
}

impl UsageRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one load sample.
    ///
    /// Values outside `[0, 100]` (the negative "reading unavailable"
    /// sentinel, overshoots, NaN) are dropped without touching any counter.
    pub fn add_record(&mut self, percent: f64) {
        if !(0.0..=100.0).contains(&percent) {
            return;
        }
        for decile in Decile::ALL {
            let counter = &mut self.counters[decile.index()];
            if percent >= f64::from(decile.percent()) {
                if *counter < WINDOW {
                    *counter += 1;
                }
            } else if *counter > 0 {
                *counter -= 1;
            }
        }
    }

    /// How many of the last ~100 valid samples were at or above the decile.
    pub fn count_at_or_above(&self, decile: Decile) -> u32 {
        self.counters[decile.index()]
    }
}
