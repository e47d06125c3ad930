//! Container-scoped CPU usage sampler backed by cgroup v1 `cpuacct`.

use std::path::{Path, PathBuf};

use tracing::debug;

use masseur_core::LoadSampler;

use crate::SamplerError;
use crate::host;

const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";
const CLOCK_TICKS_PER_SECOND: u64 = 100;
const NANOS_PER_SECOND: u64 = 1_000_000_000;

#[derive(Debug, Clone, Copy)]
struct CgroupCpuTimes {
    /// Cumulative container CPU usage, nanoseconds.
    cgroup_ns: u64,
    /// Cumulative host-wide CPU time across all categories, nanoseconds.
    host_ns: u64,
}

/// Samples the container's CPU usage as a share of its CFS allotment.
///
/// Reads the monotonically increasing `cpuacct.usage` nanosecond counter
/// and the host-wide `/proc/stat` tick total, and reports
/// `Δcontainer / Δhost × host_cpus / effective_cpus × 100` clamped to
/// 100, where `effective_cpus` comes from the `cpu.cfs_quota_us` /
/// `cpu.cfs_period_us` pair when a quota is set and the host CPU count
/// otherwise.
///
/// The first call reports 0 and takes the baseline. Any later read or
/// parse failure also reports 0, degrading toward "not overloaded".
pub struct CgroupCpuSampler {
    usage_path: PathBuf,
    stat_path: PathBuf,
    host_cpus: u32,
    effective_cpus: f64,
    last: Option<CgroupCpuTimes>,
}

impl CgroupCpuSampler {
    /// Use the default `/sys/fs/cgroup` hierarchy and `/proc/stat`.
    pub fn new() -> Result<Self, SamplerError> {
        Self::with_paths(DEFAULT_CGROUP_ROOT, host::DEFAULT_STAT_PATH)
    }

    /// Use an explicit cgroup root and stat file (tests, unusual mounts).
    ///
    /// Expects `cpuacct/cpuacct.usage`, `cpuacct/cpuacct.usage_percpu`
    /// and, optionally, `cpu/cpu.cfs_quota_us` + `cpu/cpu.cfs_period_us`
    /// under the root.
    pub fn with_paths(
        cgroup_root: impl AsRef<Path>,
        stat_path: impl Into<PathBuf>,
    ) -> Result<Self, SamplerError> {
        let root = cgroup_root.as_ref();
        let usage_path = root.join("cpuacct/cpuacct.usage");
        let percpu_path = root.join("cpuacct/cpuacct.usage_percpu");
        let stat_path = stat_path.into();

        let percpu = read_file(&percpu_path)?;
        let host_cpus = percpu.split_ascii_whitespace().count() as u32;
        if host_cpus == 0 {
            return Err(SamplerError::Malformed(percpu_path.display().to_string()));
        }

        let effective_cpus = effective_cpus(root, host_cpus);

        let sampler = Self {
            usage_path,
            stat_path,
            host_cpus,
            effective_cpus,
            last: None,
        };
        // Fail fast if either counter source is unusable.
        sampler.read_times()?;
        Ok(sampler)
    }

    /// CPUs' worth of run time this container may consume per wall second.
    pub fn effective_cpus(&self) -> f64 {
        self.effective_cpus
    }

    fn read_times(&self) -> Result<CgroupCpuTimes, SamplerError> {
        let cgroup_ns = read_u64(&self.usage_path)?;
        let host = host::read_cpu_times(&self.stat_path)?;
        let host_ns = host.total() / CLOCK_TICKS_PER_SECOND * NANOS_PER_SECOND;
        Ok(CgroupCpuTimes { cgroup_ns, host_ns })
    }
}

impl LoadSampler for CgroupCpuSampler {
    fn sample(&mut self) -> Option<f64> {
        let current = match self.read_times() {
            Ok(times) => times,
            Err(err) => {
                debug!(%err, "cgroup cpu reading unavailable");
                return Some(0.0);
            }
        };
        let Some(last) = self.last.replace(current) else {
            return Some(0.0);
        };

        let delta_cgroup = current.cgroup_ns.saturating_sub(last.cgroup_ns);
        let delta_host = current.host_ns.saturating_sub(last.host_ns);
        if delta_cgroup == 0 || delta_host == 0 {
            return Some(0.0);
        }

        let share = delta_cgroup as f64 / delta_host as f64;
        let percent = share * f64::from(self.host_cpus) / self.effective_cpus * 100.0;
        Some(percent.min(100.0))
    }
}

// A CFS quota of -1 means unlimited; fall back to the host CPU count.
fn effective_cpus(root: &Path, host_cpus: u32) -> f64 {
    let quota = read_i64(&root.join("cpu/cpu.cfs_quota_us"));
    let period = read_i64(&root.join("cpu/cpu.cfs_period_us"));
    match (quota, period) {
        (Some(quota), Some(period)) if quota > 0 && period > 0 => quota as f64 / period as f64,
        _ => f64::from(host_cpus),
    }
}

fn read_file(path: &Path) -> Result<String, SamplerError> {
    std::fs::read_to_string(path).map_err(|source| SamplerError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn read_u64(path: &Path) -> Result<u64, SamplerError> {
    let content = read_file(path)?;
    content
        .trim()
        .parse()
        .map_err(|_| SamplerError::Malformed(path.display().to_string()))
}

fn read_i64(path: &Path) -> Option<i64> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        /// A 4-CPU host with a 2-CPU CFS quota.
        fn new() -> Self {
            let fixture = Self {
                dir: tempfile::tempdir().unwrap(),
            };
            fixture.mkdirs();
            fixture.set_usage(0);
            fixture.write("cpuacct/cpuacct.usage_percpu", "0 0 0 0\n");
            fixture.write("cpu/cpu.cfs_quota_us", "200000\n");
            fixture.write("cpu/cpu.cfs_period_us", "100000\n");
            fixture.set_host_ticks(1000);
            fixture
        }

        fn mkdirs(&self) {
            std::fs::create_dir_all(self.dir.path().join("cpuacct")).unwrap();
            std::fs::create_dir_all(self.dir.path().join("cpu")).unwrap();
        }

        fn write(&self, rel: &str, content: &str) {
            std::fs::write(self.dir.path().join(rel), content).unwrap();
        }

        fn set_usage(&self, nanos: u64) {
            self.write("cpuacct/cpuacct.usage", &format!("{nanos}\n"));
        }

        fn set_host_ticks(&self, total: u64) {
            // All ticks idle; only the total matters to this sampler.
            let line = format!("cpu  0 0 0 {total} 0 0 0 0 0 0\n");
            self.write("stat", &line);
        }

        fn sampler(&self) -> CgroupCpuSampler {
            CgroupCpuSampler::with_paths(self.dir.path(), self.dir.path().join("stat")).unwrap()
        }
    }

    #[test]
    fn quota_pair_sets_the_effective_cpus() {
        let fixture = Fixture::new();
        assert_eq!(fixture.sampler().effective_cpus(), 2.0);
    }

    #[test]
    fn missing_quota_falls_back_to_the_host_cpu_count() {
        let fixture = Fixture::new();
        fixture.write("cpu/cpu.cfs_quota_us", "-1\n");
        assert_eq!(fixture.sampler().effective_cpus(), 4.0);
    }

    #[test]
    fn reports_usage_as_a_share_of_the_allotment() {
        let fixture = Fixture::new();
        let mut sampler = fixture.sampler();
        assert_eq!(sampler.sample(), Some(0.0));

        // Host advances 400 ticks = 4e9 ns; the container burned 1e9 ns.
        // One CPU's worth against a 2-CPU allotment is 50%.
        fixture.set_host_ticks(1400);
        fixture.set_usage(1_000_000_000);
        assert_eq!(sampler.sample(), Some(50.0));
    }

    #[test]
    fn usage_is_clamped_to_one_hundred_percent() {
        let fixture = Fixture::new();
        fixture.write("cpu/cpu.cfs_quota_us", "50000\n");
        let mut sampler = fixture.sampler();
        assert_eq!(sampler.sample(), Some(0.0));

        // Two CPUs' worth against a half-CPU allotment overshoots.
        fixture.set_host_ticks(1400);
        fixture.set_usage(2_000_000_000);
        assert_eq!(sampler.sample(), Some(100.0));
    }

    #[test]
    fn read_failure_reads_as_idle() {
        let fixture = Fixture::new();
        let mut sampler = fixture.sampler();
        assert_eq!(sampler.sample(), Some(0.0));

        std::fs::remove_file(fixture.dir.path().join("cpuacct/cpuacct.usage")).unwrap();
        assert_eq!(sampler.sample(), Some(0.0));
    }

    #[test]
    fn constructor_fails_without_the_cpuacct_controller() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CgroupCpuSampler::with_paths(dir.path(), "/proc/stat").is_err());
    }
}
