//! Measurement harness: runs experiments through warmup and measured loops
//! and collects one DataPoint per size.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use forge_scan::Scanner;

use crate::data_gen::DataGenerator;
use crate::experiments::Experiment;
use crate::stats::{compute_stats, Stats};

/// Seed for every experiment's input data.
const DATA_SEED: u64 = 42;

/// Results for one experiment at one size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPoint {
    pub experiment: String,
    pub size: usize,
    pub engine_stats: Stats,
    pub cpu_stats: Stats,
    pub rayon_stats: Stats,
    /// Sequential mean over engine mean.
    pub speedup: f64,
    /// Rayon mean over engine mean.
    pub speedup_vs_rayon: f64,
    pub validated: bool,
    pub metrics: HashMap<String, f64>,
}

pub struct BenchConfig {
    pub sizes: Vec<usize>,
    pub runs: u32,
    pub warmup: u32,
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Run an experiment across all configured sizes.
///
/// For each size: setup, one validated run of the engine and the sequential
/// baseline, warmup, then measured engine, sequential and rayon loops. A size
/// whose engine run fails is logged and skipped.
pub fn run_experiment(
    exp: &mut dyn Experiment,
    config: &BenchConfig,
    scanner: &Scanner,
    progress_cb: Option<&dyn Fn(&str)>,
) -> Vec<DataPoint> {
    let mut results = Vec::new();
    let mut gen = DataGenerator::new(DATA_SEED);
    let report = |msg: String| {
        if let Some(cb) = progress_cb {
            cb(&msg);
        }
    };

    'sizes: for &size in &config.sizes {
        let label = format_size(size);
        report(format!("{} @ {}: setup", exp.name(), label));
        exp.setup(scanner, size, &mut gen);

        if let Err(e) = exp.run_engine(scanner) {
            error!(experiment = exp.name(), size, error = %e, "engine run failed");
            continue;
        }
        exp.run_cpu();
        let validated = match exp.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(experiment = exp.name(), size, "validation failed: {e}");
                false
            }
        };

        report(format!(
            "{} @ {}: warmup ({} runs)",
            exp.name(),
            label,
            config.warmup
        ));
        for _ in 0..config.warmup {
            if let Err(e) = exp.run_engine(scanner) {
                error!(experiment = exp.name(), size, error = %e, "engine run failed");
                continue 'sizes;
            }
        }

        report(format!(
            "{} @ {}: measuring engine ({} runs)",
            exp.name(),
            label,
            config.runs
        ));
        let mut engine_times = Vec::with_capacity(config.runs as usize);
        for _ in 0..config.runs {
            match exp.run_engine(scanner) {
                Ok(ms) => engine_times.push(ms),
                Err(e) => {
                    error!(experiment = exp.name(), size, error = %e, "engine run failed");
                    continue 'sizes;
                }
            }
        }

        report(format!(
            "{} @ {}: measuring CPU ({} runs)",
            exp.name(),
            label,
            config.runs
        ));
        let cpu_times: Vec<f64> = (0..config.runs).map(|_| exp.run_cpu()).collect();
        let rayon_times: Vec<f64> = (0..config.runs).map(|_| exp.run_rayon()).collect();

        let engine_stats = compute_stats(&engine_times);
        let cpu_stats = compute_stats(&cpu_times);
        let rayon_stats = compute_stats(&rayon_times);
        let speedup = ratio(cpu_stats.mean, engine_stats.mean);
        let speedup_vs_rayon = ratio(rayon_stats.mean, engine_stats.mean);
        let metrics = exp.metrics(engine_stats.mean, size);

        report(format!(
            "{} @ {}: done (speedup={:.1}x)",
            exp.name(),
            label,
            speedup
        ));
        results.push(DataPoint {
            experiment: exp.name().to_string(),
            size,
            engine_stats,
            cpu_stats,
            rayon_stats,
            speedup,
            speedup_vs_rayon,
            validated,
            metrics,
        });
    }

    results
}

/// Format an element count for display (e.g., 1000000 -> "1M").
pub fn format_size(size: usize) -> String {
    if size >= 1_000_000 && size % 1_000_000 == 0 {
        format!("{}M", size / 1_000_000)
    } else if size >= 1_000 && size % 1_000 == 0 {
        format!("{}K", size / 1_000)
    } else {
        format!("{}", size)
    }
}
