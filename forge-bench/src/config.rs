use serde::{Deserialize, Serialize};

/// Largest element count the scan engine accepts.
pub const MAX_SIZE: usize = i32::MAX as usize - 1;

/// Preset sizes, runs and warmup for a benchmark session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchProfile {
    pub name: String,
    pub sizes: Vec<usize>,
    pub runs: u32,
    pub warmup: u32,
}

impl BenchProfile {
    fn new(name: &str, sizes: &[usize], runs: u32, warmup: u32) -> Self {
        Self {
            name: name.to_string(),
            sizes: sizes.to_vec(),
            runs,
            warmup,
        }
    }
}

pub const PROFILE_NAMES: [&str; 3] = ["quick", "standard", "thorough"];

/// quick: 100K + 1M, 3 runs, 1 warmup.
pub fn quick_profile() -> BenchProfile {
    BenchProfile::new("quick", &[100_000, 1_000_000], 3, 1)
}

/// standard: 1M + 10M, 10 runs, 3 warmup.
pub fn standard_profile() -> BenchProfile {
    BenchProfile::new("standard", &[1_000_000, 10_000_000], 10, 3)
}

/// thorough: 100K through 50M, 30 runs, 3 warmup.
pub fn thorough_profile() -> BenchProfile {
    BenchProfile::new(
        "thorough",
        &[100_000, 1_000_000, 10_000_000, 50_000_000],
        30,
        3,
    )
}

pub fn get_profile(name: &str) -> Option<BenchProfile> {
    match name.to_ascii_lowercase().as_str() {
        "quick" => Some(quick_profile()),
        "standard" => Some(standard_profile()),
        "thorough" => Some(thorough_profile()),
        _ => None,
    }
}

/// Parse an element count such as `1M`, `2.5m`, `100K`, `1_000_000`.
///
/// Counts must be positive and below `i32::MAX`.
pub fn parse_size(s: &str) -> Result<usize, String> {
    let trimmed = s.trim();
    let (digits, scale) = match trimmed.char_indices().last() {
        Some((i, 'k' | 'K')) => (&trimmed[..i], 1e3),
        Some((i, 'm' | 'M')) => (&trimmed[..i], 1e6),
        _ => (trimmed, 1.0),
    };
    let digits = digits.replace('_', "");

    let size = if scale == 1.0 {
        digits
            .parse::<usize>()
            .map_err(|e| format!("Invalid size '{}': {}", trimmed, e))?
    } else {
        let value: f64 = digits
            .parse()
            .map_err(|e| format!("Invalid size '{}': {}", trimmed, e))?;
        if !value.is_finite() || value < 0.0 {
            return Err(format!("Invalid size '{}'", trimmed));
        }
        (value * scale).round() as usize
    };

    match size {
        0 => Err(format!("Size '{}' must be positive", trimmed)),
        n if n > MAX_SIZE => Err(format!("Size '{}' exceeds {}", trimmed, MAX_SIZE)),
        n => Ok(n),
    }
}

pub fn parse_sizes(raw: &[String]) -> Result<Vec<usize>, String> {
    raw.iter().map(|s| parse_size(s)).collect()
}
