//! masseur: demo and measurement tools for the overload-protection engine.
//!
//! ```text
//! masseur watch                      print host and cgroup CPU usage per tick
//! masseur bench --tired --workers 16 measure need_massage() throughput
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::warn;

use masseur_core::{LoadSampler, LoadState, Plan, PlanConfig};
use masseur_sampler::{CgroupCpuSampler, HostCpuSampler};

#[derive(Parser)]
#[command(name = "masseur", about = "CPU overload-protection demo tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print CPU usage from the host and cgroup samplers once per interval.
    Watch {
        /// Sampling interval in milliseconds.
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },
    /// Measure need_massage() throughput across worker tasks.
    Bench {
        /// Total number of admission checks.
        #[arg(long, default_value = "10000000")]
        tasks: u64,

        /// Number of concurrent workers.
        #[arg(long, default_value = "10")]
        workers: u64,

        /// Drive the plan into the tired state before measuring.
        #[arg(long)]
        tired: bool,

        /// PlanConfig TOML file overriding the built-in tuning.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,masseur=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Watch { interval_ms } => run_watch(interval_ms).await,
        Command::Bench {
            tasks,
            workers,
            tired,
            config,
        } => run_bench(tasks, workers, tired, config).await,
    }
}

async fn run_watch(interval_ms: u64) -> anyhow::Result<()> {
    let mut host = HostCpuSampler::new().context("host sampler unavailable")?;
    let mut cgroup = match CgroupCpuSampler::new() {
        Ok(sampler) => Some(sampler),
        Err(err) => {
            warn!(%err, "cgroup sampler unavailable, watching host only");
            None
        }
    };

    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    ticker.tick().await; // the first tick completes immediately
    loop {
        ticker.tick().await;
        let host_usage = format_usage(host.sample());
        match cgroup.as_mut() {
            Some(sampler) => {
                let cgroup_usage = format_usage(sampler.sample());
                println!("host: {host_usage}  cgroup: {cgroup_usage}");
            }
            None => println!("host: {host_usage}"),
        }
    }
}

fn format_usage(sample: Option<f64>) -> String {
    match sample {
        Some(percent) => format!("{percent:5.1}%"),
        None => "   n/a".to_string(),
    }
}

async fn run_bench(
    tasks: u64,
    workers: u64,
    tired: bool,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    if tasks == 0 || workers == 0 {
        bail!("tasks and workers must be greater than zero");
    }

    let config = match config_path {
        Some(path) => PlanConfig::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        // Tired mode: every sample counts as high load and the window is
        // short, so the synthetic full load below tires the plan fast.
        None if tired => PlanConfig {
            high_load_decile: 0,
            high_load_ratio: 0.1,
            check_period_secs: 1,
            sample_interval_ms: 10,
            ..PlanConfig::default()
        },
        None => PlanConfig {
            sample_interval_ms: 10,
            ..PlanConfig::default()
        },
    };

    let synthetic_load = if tired { 100.0 } else { 0.0 };
    let plan = Arc::new(Plan::new());
    plan.start(config, Box::new(move || Some(synthetic_load)))
        .context("starting massage plan")?;

    if tired {
        let deadline = Instant::now() + Duration::from_secs(5);
        while plan.status().state != LoadState::Tired {
            if Instant::now() > deadline {
                bail!("plan never turned tired under synthetic load");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    let per_worker = tasks / workers;
    if per_worker == 0 {
        bail!("tasks must be at least the number of workers");
    }
    let total = per_worker * workers;
    let shed = Arc::new(AtomicU64::new(0));

    let started_at = Instant::now();
    let mut handles = Vec::with_capacity(workers as usize);
    for _ in 0..workers {
        let plan = Arc::clone(&plan);
        let shed = Arc::clone(&shed);
        handles.push(tokio::task::spawn_blocking(move || {
            let mut shed_here = 0u64;
            for _ in 0..per_worker {
                if plan.need_massage() {
                    shed_here += 1;
                }
            }
            shed.fetch_add(shed_here, Ordering::Relaxed);
        }));
    }
    for handle in handles {
        handle.await?;
    }
    let elapsed = started_at.elapsed();
    plan.stop();

    let mode = if tired { "tired" } else { "relaxed" };
    println!(
        "mode:{mode} tasks:{total} workers:{workers} elapsed_ms:{} qps:{:.0}/s ns_per_call:{} shed_ratio:{:.3}",
        elapsed.as_millis(),
        total as f64 / elapsed.as_secs_f64(),
        elapsed.as_nanos() / u128::from(total),
        shed.load(Ordering::Relaxed) as f64 / total as f64,
    );
    Ok(())
}
