//! Host-level CPU usage sampler backed by `/proc/stat`.

use std::path::{Path, PathBuf};

use tracing::debug;

use masseur_core::LoadSampler;

use crate::SamplerError;

pub(crate) const DEFAULT_STAT_PATH: &str = "/proc/stat";

/// Cumulative CPU time counters from the aggregate `cpu ` line, in
/// USER_HZ ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CpuTimes {
    user: u64,
    nice: u64,
    system: u64,
    idle: u64,
    iowait: u64,
    irq: u64,
    softirq: u64,
    steal: u64,
    guest: u64,
    guest_nice: u64,
}

impl CpuTimes {
    pub(crate) fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
            + self.guest
            + self.guest_nice
    }

    // Busy time: everything but idle and iowait. The kernel already folds
    // guest time into user/nice, so the guest columns stay out.
    fn used(&self) -> u64 {
        self.user + self.nice + self.system + self.irq + self.softirq + self.steal
    }
}

fn parse_proc_stat(content: &str) -> Option<CpuTimes> {
    let line = content.lines().find(|line| line.starts_with("cpu "))?;
    let mut fields = line.split_ascii_whitespace().skip(1);
    let mut next = || fields.next()?.parse::<u64>().ok();
    Some(CpuTimes {
        user: next()?,
        nice: next()?,
        system: next()?,
        idle: next()?,
        iowait: next()?,
        irq: next()?,
        softirq: next()?,
        steal: next()?,
        // Old kernels stop after steal.
        guest: next().unwrap_or(0),
        guest_nice: next().unwrap_or(0),
    })
}

pub(crate) fn read_cpu_times(path: &Path) -> Result<CpuTimes, SamplerError> {
    let content = std::fs::read_to_string(path).map_err(|source| SamplerError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_proc_stat(&content).ok_or_else(|| SamplerError::Malformed(path.display().to_string()))
}

/// Samples host CPU usage as the busy share of `/proc/stat` deltas.
///
/// The first call reports 0 and takes the baseline; every later call
/// reports the busy percentage since the previous one. An unreadable or
/// malformed stat file yields `None` and leaves the baseline in place.
pub struct HostCpuSampler {
    stat_path: PathBuf,
    last: Option<CpuTimes>,
}

impl HostCpuSampler {
    /// Use the default `/proc/stat`.
    pub fn new() -> Result<Self, SamplerError> {
        Self::with_stat_path(DEFAULT_STAT_PATH)
    }

    /// Use an explicit stat file (tests, alternate proc mounts).
    pub fn with_stat_path(path: impl Into<PathBuf>) -> Result<Self, SamplerError> {
        let stat_path = path.into();
        // Fail fast if the stat file is unusable.
        read_cpu_times(&stat_path)?;
        Ok(Self {
            stat_path,
            last: None,
        })
    }
}

impl LoadSampler for HostCpuSampler {
    fn sample(&mut self) -> Option<f64> {
        let current = match read_cpu_times(&self.stat_path) {
            Ok(times) => times,
            Err(err) => {
                debug!(%err, "host cpu reading unavailable");
                return None;
            }
        };
        let Some(last) = self.last.replace(current) else {
            return Some(0.0);
        };

        let delta_total = current.total().saturating_sub(last.total());
        if delta_total == 0 {
            return Some(0.0);
        }
        let delta_used = current.used().saturating_sub(last.used());
        Some((delta_used * 100 / delta_total) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT_V1: &str = "cpu  100 0 50 800 50 0 0 0 0 0\n\
                           cpu0 100 0 50 800 50 0 0 0 0 0\n\
                           intr 12345\n";
    const STAT_V2: &str = "cpu  200 0 100 850 50 0 0 0 0 0\n\
                           cpu0 200 0 100 850 50 0 0 0 0 0\n\
                           intr 12399\n";

    fn write_stat(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("stat");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn parses_the_aggregate_cpu_line() {
        let times = parse_proc_stat(STAT_V1).unwrap();
        assert_eq!(times.user, 100);
        assert_eq!(times.idle, 800);
        assert_eq!(times.total(), 1000);
        assert_eq!(times.used(), 150);
    }

    #[test]
    fn parses_without_guest_columns() {
        let times = parse_proc_stat("cpu  10 0 5 80 5 0 0 0\n").unwrap();
        assert_eq!(times.guest, 0);
        assert_eq!(times.total(), 100);
    }

    #[test]
    fn rejects_content_without_a_cpu_line() {
        assert!(parse_proc_stat("intr 1 2 3\n").is_none());
        assert!(parse_proc_stat("cpu  nonsense\n").is_none());
    }

    #[test]
    fn constructor_fails_on_a_missing_file() {
        assert!(HostCpuSampler::with_stat_path("/nonexistent/stat").is_err());
    }

    #[test]
    fn first_sample_is_zero_then_deltas() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_stat(&dir, STAT_V1);
        let mut sampler = HostCpuSampler::with_stat_path(&path).unwrap();

        assert_eq!(sampler.sample(), Some(0.0));

        // 150 busy ticks out of a 200-tick window.
        std::fs::write(&path, STAT_V2).unwrap();
        assert_eq!(sampler.sample(), Some(75.0));

        // No movement at all reads as idle.
        assert_eq!(sampler.sample(), Some(0.0));
    }

    #[test]
    fn unreadable_file_yields_none_and_keeps_the_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_stat(&dir, STAT_V1);
        let mut sampler = HostCpuSampler::with_stat_path(&path).unwrap();
        assert_eq!(sampler.sample(), Some(0.0));

        std::fs::remove_file(&path).unwrap();
        assert_eq!(sampler.sample(), None);

        // Once the file returns, the old baseline still applies.
        std::fs::write(&path, STAT_V2).unwrap();
        assert_eq!(sampler.sample(), Some(75.0));
    }
}
