//! masseur-core: the CPU overload-protection engine.
//!
//! A [`Plan`] embeds in a request-serving process, samples load in a
//! background task, and answers one question per incoming request:
//! should this request be shed right now?
//!
//! # Architecture
//!
//! ```text
//! Plan
//!   ├── background sampling task (single writer)
//!   │   ├── LoadSampler       one load percentage per tick
//!   │   ├── UsageRecorder     ten saturating decile counters
//!   │   └── LoadTracker       Relaxed/Tired hysteresis + intensity control
//!   └── need_massage()        lock-free admission check (any thread)
//!         └── AdmissionGate   deterministic Bresenham duty cycle
//! ```
//!
//! While `Relaxed` every request is admitted and the gate is bypassed
//! entirely. Once the recorder shows a sustained share of high-load
//! samples the plan turns `Tired` and sheds `intensity` percent of
//! requests. The intensity rises while load stays high through a full
//! check period, falls once load stays low through one, and the plan
//! only relaxes again after the intensity has decayed all the way to
//! zero.
//!
//! # Usage
//!
//! ```no_run
//! use masseur_core::{Plan, PlanConfig};
//!
//! # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let plan = Plan::new();
//! // any LoadSampler works; masseur-sampler ships /proc and cgroup ones
//! plan.start(PlanConfig::default(), Box::new(|| Some(12.0)))?;
//!
//! // per request, on any thread:
//! if plan.need_massage() {
//!     // refuse the request
//! }
//! # Ok(()) }
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod plan;
pub mod recorder;
pub mod sampler;
pub mod state;

pub use config::{MAX_CHECK_PERIOD_SECS, MAX_INTENSITY_STEP, PlanConfig};
pub use error::{ConfigError, StartError};
pub use gate::AdmissionGate;
pub use plan::{Plan, PlanStatus};
pub use recorder::{Decile, UsageRecorder, WINDOW};
pub use sampler::LoadSampler;
pub use state::LoadState;
