//! masseur-sampler: reference load samplers.
//!
//! Two [`masseur_core::LoadSampler`] implementations feed the engine:
//!
//! - [`HostCpuSampler`] for bare-metal and VM processes, reading the
//!   aggregate counters of `/proc/stat`;
//! - [`CgroupCpuSampler`] for containerized processes, reading the
//!   cgroup v1 `cpuacct` usage counter and normalizing by the CFS quota.
//!
//! Both keep the previous reading and report the usage accumulated
//! between calls, so one sampler instance maps to one sampling loop.

pub mod cgroup;
pub mod host;

pub use cgroup::CgroupCpuSampler;
pub use host::HostCpuSampler;

use thiserror::Error;

/// A sampler could not read or understand its source pseudo-file.
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed content in {0}")]
    Malformed(String),
}
