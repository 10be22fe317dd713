mod cli;
mod config;
mod cpu_baselines;
mod data_gen;
mod experiments;
mod harness;
mod output;
mod stats;

use clap::Parser;
use cli::ForgeArgs;
use config::{get_profile, parse_sizes, PROFILE_NAMES};
use forge_primitives::{Device, DeviceConfig, HardwareInfo};
use forge_scan::Scanner;
use harness::{run_experiment, BenchConfig, DataPoint};
use output::progress::BenchProgress;
use output::table::render_all_tables;
use tracing_subscriber::EnvFilter;

fn build_device(workers: Option<usize>) -> Device {
    let config = match workers {
        Some(w) => Ok(DeviceConfig::parallel(w)),
        None => DeviceConfig::from_env(),
    };
    match config.and_then(Device::new) {
        Ok(device) => device,
        Err(e) => {
            eprintln!("Error creating device: {}", e);
            std::process::exit(1);
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = ForgeArgs::parse();
    let profile = match args.profile.as_deref() {
        Some(name) => match get_profile(name) {
            Some(p) => Some(p),
            None => {
                eprintln!(
                    "Unknown profile '{}'. Valid: {}",
                    name,
                    PROFILE_NAMES.join(", ")
                );
                std::process::exit(1);
            }
        },
        None => None,
    };

    // --sizes wins over the profile, which wins over the 1M default.
    let sizes = match (&args.sizes, &profile) {
        (Some(raw), _) => match parse_sizes(raw) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error parsing sizes: {}", e);
                std::process::exit(1);
            }
        },
        (None, Some(p)) => p.sizes.clone(),
        (None, None) => vec![1_000_000],
    };

    // Explicit --runs / --warmup override the profile.
    let (runs, warmup) = match &profile {
        Some(p) => (
            if args.runs != 10 { args.runs } else { p.runs },
            if args.warmup != 3 { args.warmup } else { p.warmup },
        ),
        None => (args.runs, args.warmup),
    };

    let device = build_device(args.workers);
    let hardware = HardwareInfo::detect(&device);
    let scanner = Scanner::new(device);

    let mut all_exps = experiments::all_experiments();
    let selected: Vec<usize> = if args.is_all_suite() {
        (0..all_exps.len()).collect()
    } else {
        let mut indices = Vec::new();
        for name in args.experiment_names() {
            match all_exps.iter().position(|e| e.name() == name) {
                Some(idx) => indices.push(idx),
                None => {
                    eprintln!(
                        "Unknown experiment '{}'. Available: {}",
                        name,
                        all_exps
                            .iter()
                            .map(|e| e.name())
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                    std::process::exit(1);
                }
            }
        }
        indices
    };

    println!("forge-bench: single-pass look-back scan benchmark");
    println!("  Device: {}", hardware.summary());
    println!(
        "  Block: {} warps x {} chunks",
        scanner.config().warps_per_block,
        scanner.config().chunks_per_block
    );
    println!("  Experiments:");
    for &idx in &selected {
        println!("    {:<14} {}", all_exps[idx].name(), all_exps[idx].description());
    }
    println!("  Sizes: {:?}", sizes);
    println!("  Runs: {}, Warmup: {}", runs, warmup);
    if let Some(ref path) = args.json_file {
        println!("  JSON output: {}", path);
    }
    println!();

    let config = BenchConfig {
        sizes,
        runs,
        warmup,
    };

    let progress = BenchProgress::new();
    let mut all_results: Vec<DataPoint> = Vec::new();
    for &idx in &selected {
        let exp = &mut *all_exps[idx];
        let cb = progress.callback();
        all_results.extend(run_experiment(exp, &config, &scanner, Some(&cb)));
    }
    progress.finish();

    render_all_tables(&all_results);

    if let Some(ref path) = args.json_file {
        if let Err(e) = output::json::write_json(path, &all_results, &hardware) {
            eprintln!("Error writing JSON: {}", e);
        }
    }

    if all_results.iter().any(|dp| !dp.validated) {
        eprintln!("Some results did not match the sequential baseline.");
        std::process::exit(2);
    }
}
