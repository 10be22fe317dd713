use clap::Parser;

/// Benchmark harness for the single-pass look-back prefix scan
#[derive(Parser, Debug)]
#[command(name = "forge-bench", version, about)]
pub struct ForgeArgs {
    /// Experiment names to run (e.g., inclusive_u32 inclusive_f64).
    /// Use "all" to run every experiment.
    #[arg(value_name = "EXPERIMENTS")]
    pub experiments: Vec<String>,

    /// Element counts to benchmark (e.g., 100K, 1M, 2.5M, 1000000)
    #[arg(long, value_delimiter = ',')]
    pub sizes: Option<Vec<String>>,

    /// Number of measured runs per size
    #[arg(long, default_value_t = 10)]
    pub runs: u32,

    /// Number of warmup runs before measurement
    #[arg(long, default_value_t = 3)]
    pub warmup: u32,

    /// Benchmark profile: quick, standard or thorough
    #[arg(long)]
    pub profile: Option<String>,

    /// Write JSON results to file
    #[arg(long)]
    pub json_file: Option<String>,

    /// Worker threads for the scan device (defaults to FORGE_* environment)
    #[arg(long)]
    pub workers: Option<usize>,
}

impl ForgeArgs {
    /// Experiment names, with an empty selection meaning "all".
    pub fn experiment_names(&self) -> Vec<String> {
        if self.experiments.is_empty() {
            vec!["all".to_string()]
        } else {
            self.experiments.clone()
        }
    }

    pub fn is_all_suite(&self) -> bool {
        self.experiment_names()
            .iter()
            .any(|name| name.eq_ignore_ascii_case("all"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = ForgeArgs::parse_from(["forge-bench"]);
        assert!(args.is_all_suite());
        assert_eq!(args.runs, 10);
        assert_eq!(args.warmup, 3);
        assert!(args.workers.is_none());
    }

    #[test]
    fn test_sizes_and_selection() {
        let args = ForgeArgs::parse_from([
            "forge-bench",
            "inclusive_u32",
            "--sizes",
            "100K,1M",
            "--workers",
            "4",
        ]);
        assert!(!args.is_all_suite());
        assert_eq!(args.experiment_names(), vec!["inclusive_u32"]);
        assert_eq!(args.sizes, Some(vec!["100K".to_string(), "1M".to_string()]));
        assert_eq!(args.workers, Some(4));
    }
}
