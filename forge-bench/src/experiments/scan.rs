//! Prefix scan experiments: the look-back engine against sequential and
//! rayon scans of the same data.
//!
//! Integer results must match the sequential scan exactly. Float results may
//! differ in the last bits because the engine associates the sums in a
//! timing-dependent order, so they are compared with a relative epsilon.

use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Instant;

use forge_scan::{ScanElement, ScanMode, Scanner};

use crate::cpu_baselines::rayon_scan::rayon_scan;
use crate::cpu_baselines::sequential::sequential_scan;
use crate::data_gen::{u32_bound_for, DataGenerator};

use super::Experiment;

/// Element types the scan experiments know how to generate and compare.
pub trait BenchElement: ScanElement + PartialEq + Debug {
    fn generate(gen: &mut DataGenerator, count: usize) -> Vec<Self>;

    fn close_enough(engine: Self, cpu: Self) -> bool {
        engine == cpu
    }
}

impl BenchElement for u32 {
    fn generate(gen: &mut DataGenerator, count: usize) -> Vec<Self> {
        gen.bounded_u32(count, u32_bound_for(count))
    }
}

impl BenchElement for u64 {
    fn generate(gen: &mut DataGenerator, count: usize) -> Vec<Self> {
        gen.bounded_u64(count, 1 << 32)
    }
}

impl BenchElement for f64 {
    fn generate(gen: &mut DataGenerator, count: usize) -> Vec<Self> {
        gen.unit_f64(count)
    }

    fn close_enough(engine: Self, cpu: Self) -> bool {
        (engine - cpu).abs() <= 1e-9 * cpu.abs().max(1.0)
    }
}

pub struct ScanExperiment<T> {
    name: &'static str,
    description: &'static str,
    mode: ScanMode,
    data: Vec<T>,
    engine_result: Vec<T>,
    engine_total: T,
    cpu_result: Vec<T>,
    cpu_total: T,
    /// Scratch for the rayon baseline, never validated.
    rayon_result: Vec<T>,
    blocks: usize,
}

impl<T: BenchElement> ScanExperiment<T> {
    pub fn new(name: &'static str, description: &'static str, mode: ScanMode) -> Self {
        Self {
            name,
            description,
            mode,
            data: Vec::new(),
            engine_result: Vec::new(),
            engine_total: T::zero(),
            cpu_result: Vec::new(),
            cpu_total: T::zero(),
            rayon_result: Vec::new(),
            blocks: 0,
        }
    }
}

impl<T: BenchElement> Experiment for ScanExperiment<T> {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn setup(&mut self, scanner: &Scanner, size: usize, gen: &mut DataGenerator) {
        self.data = T::generate(gen, size);
        self.engine_result = vec![T::zero(); size];
        self.cpu_result = vec![T::zero(); size];
        self.rayon_result = vec![T::zero(); size];
        self.blocks = scanner.geometry::<T>(size).blocks;
    }

    fn run_engine(&mut self, scanner: &Scanner) -> Result<f64, String> {
        let n = self.data.len();
        let start = Instant::now();
        let total = match self.mode {
            ScanMode::Inclusive => scanner.inclusive_sum(n, &self.data, &mut self.engine_result),
            ScanMode::Exclusive => scanner.exclusive_sum(n, &self.data, &mut self.engine_result),
        }
        .map_err(|e| e.to_string())?;
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        self.engine_total = total;
        Ok(elapsed)
    }

    fn run_cpu(&mut self) -> f64 {
        let start = Instant::now();
        self.cpu_total = sequential_scan(&self.data, &mut self.cpu_result, self.mode);
        start.elapsed().as_secs_f64() * 1000.0
    }

    fn run_rayon(&mut self) -> f64 {
        let start = Instant::now();
        let total = rayon_scan(&self.data, &mut self.rayon_result, self.mode);
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        std::hint::black_box(total);
        elapsed
    }

    fn validate(&self) -> Result<(), String> {
        if self.engine_result.len() != self.cpu_result.len() {
            return Err(format!(
                "Length mismatch: engine={} cpu={}",
                self.engine_result.len(),
                self.cpu_result.len()
            ));
        }
        if !T::close_enough(self.engine_total, self.cpu_total) {
            return Err(format!(
                "Total mismatch: engine={:?} cpu={:?}",
                self.engine_total, self.cpu_total
            ));
        }

        let mismatch = self
            .engine_result
            .iter()
            .zip(&self.cpu_result)
            .position(|(&engine, &cpu)| !T::close_enough(engine, cpu));
        match mismatch {
            None => Ok(()),
            Some(i) => {
                let start = i.saturating_sub(3);
                let end = (i + 4).min(self.engine_result.len());
                Err(format!(
                    "Mismatch at index {}: engine={:?} cpu={:?}\n  engine[{}..{}]: {:?}\n  cpu[{}..{}]: {:?}",
                    i,
                    self.engine_result[i],
                    self.cpu_result[i],
                    start,
                    end,
                    &self.engine_result[start..end],
                    start,
                    end,
                    &self.cpu_result[start..end]
                ))
            }
        }
    }

    fn metrics(&self, elapsed_ms: f64, size: usize) -> HashMap<String, f64> {
        let mut m = HashMap::new();
        // One read and one write per element.
        let bytes = (size * std::mem::size_of::<T>() * 2) as f64;
        let seconds = elapsed_ms / 1000.0;
        let gbs = if seconds > 0.0 { bytes / seconds / 1e9 } else { 0.0 };
        m.insert("gb_per_sec".to_string(), gbs);
        m.insert("bytes_processed".to_string(), bytes);
        m.insert("elements".to_string(), size as f64);
        m.insert("blocks".to_string(), self.blocks as f64);
        m
    }
}

#[cfg(test)]
mod tests {
    use forge_primitives::{Device, DeviceConfig};

    use super::*;

    fn scanner() -> Scanner {
        Scanner::new(Device::new(DeviceConfig::parallel(2)).unwrap())
    }

    fn run_once(exp: &mut dyn Experiment, scanner: &Scanner, size: usize) {
        let mut gen = DataGenerator::new(7);
        exp.setup(scanner, size, &mut gen);
        exp.run_engine(scanner).unwrap();
        exp.run_cpu();
        exp.run_rayon();
    }

    #[test]
    fn test_every_experiment_validates() {
        let scanner = scanner();
        for mut exp in super::super::all_experiments() {
            run_once(exp.as_mut(), &scanner, 20_000);
            exp.validate().unwrap_or_else(|e| panic!("{}: {e}", exp.name()));
        }
    }

    #[test]
    fn test_validate_reports_mismatch() {
        let scanner = scanner();
        let mut exp = ScanExperiment::<u32>::new("t", "t", ScanMode::Exclusive);
        run_once(&mut exp, &scanner, 100);
        exp.engine_result[42] += 1;
        let err = exp.validate().unwrap_err();
        assert!(err.contains("index 42"), "{err}");
    }

    #[test]
    fn test_float_tolerance() {
        assert!(f64::close_enough(1.0 + 1e-12, 1.0));
        assert!(!f64::close_enough(1.001, 1.0));
        assert!(!u32::close_enough(3, 4));
    }

    #[test]
    fn test_metrics() {
        let scanner = scanner();
        let mut exp = ScanExperiment::<u64>::new("t", "t", ScanMode::Inclusive);
        run_once(&mut exp, &scanner, 10_000);
        let m = exp.metrics(1.0, 10_000);
        assert_eq!(m["bytes_processed"], 160_000.0);
        assert!((m["gb_per_sec"] - 0.16).abs() < 1e-9);
        assert_eq!(m["blocks"], scanner.geometry::<u64>(10_000).blocks as f64);
    }
}
