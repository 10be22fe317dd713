use serde::{Deserialize, Serialize};

/// Summary of a set of timing samples, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
    pub cv_percent: f64,
    pub sample_count: usize,
    pub outliers_removed: usize,
}

/// Summarise `samples` after dropping values outside the Tukey fences
/// `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]`.
///
/// Fewer than two survivors means the fences were too tight to be useful, and
/// the full sample set is summarised instead.
pub fn compute_stats(samples: &[f64]) -> Stats {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    if sorted.is_empty() {
        return Stats::default();
    }

    let q1 = percentile(&sorted, 25.0);
    let q3 = percentile(&sorted, 75.0);
    let fence = 1.5 * (q3 - q1);
    let kept: Vec<f64> = sorted
        .iter()
        .copied()
        .filter(|&v| (q1 - fence..=q3 + fence).contains(&v))
        .collect();
    let data = if kept.len() >= 2 { kept } else { sorted };

    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let stddev = if data.len() > 1 {
        (data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };

    Stats {
        mean,
        median: percentile(&data, 50.0),
        p95: percentile(&data, 95.0),
        min: data[0],
        max: data[data.len() - 1],
        stddev,
        cv_percent: if mean > 0.0 { stddev / mean * 100.0 } else { 0.0 },
        sample_count: data.len(),
        outliers_removed: samples.len() - data.len(),
    }
}

/// Linearly interpolated percentile of an ascending slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let rank = pct / 100.0 * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = (lo + 1).min(len - 1);
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}
