//! Experiment trait and registry.
//!
//! Each experiment runs the same scan on the engine and on CPU baselines so
//! the harness can compare them.

pub mod scan;

use std::collections::HashMap;

use forge_scan::{ScanMode, Scanner};

use crate::data_gen::DataGenerator;

pub trait Experiment {
    /// Short name used for CLI selection (e.g., "inclusive_u32").
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Generate input data and size output buffers.
    fn setup(&mut self, scanner: &Scanner, size: usize, gen: &mut DataGenerator);

    /// Run the engine. Returns elapsed time in milliseconds.
    fn run_engine(&mut self, scanner: &Scanner) -> Result<f64, String>;

    /// Run the sequential baseline. Returns elapsed time in milliseconds.
    fn run_cpu(&mut self) -> f64;

    /// Run the rayon two-pass baseline. Returns elapsed time in milliseconds.
    fn run_rayon(&mut self) -> f64;

    /// Compare the last engine result with the last sequential result.
    fn validate(&self) -> Result<(), String>;

    fn metrics(&self, elapsed_ms: f64, size: usize) -> HashMap<String, f64>;
}

pub fn all_experiments() -> Vec<Box<dyn Experiment>> {
    vec![
        Box::new(scan::ScanExperiment::<u32>::new(
            "inclusive_u32",
            "Inclusive sum of u32, packed 64-bit status cells",
            ScanMode::Inclusive,
        )),
        Box::new(scan::ScanExperiment::<u32>::new(
            "exclusive_u32",
            "Exclusive sum of u32, packed 64-bit status cells",
            ScanMode::Exclusive,
        )),
        Box::new(scan::ScanExperiment::<u64>::new(
            "inclusive_u64",
            "Inclusive sum of u64, split status cells",
            ScanMode::Inclusive,
        )),
        Box::new(scan::ScanExperiment::<f64>::new(
            "inclusive_f64",
            "Inclusive sum of f64, split status cells, epsilon validation",
            ScanMode::Inclusive,
        )),
    ]
}
