//! JSON report: the data points under a hardware header.

use std::fs;
use std::path::Path;

use serde::Serialize;

use forge_primitives::HardwareInfo;

use crate::harness::DataPoint;

#[derive(Serialize)]
struct JsonReport<'a> {
    hardware: HardwareHeader<'a>,
    timestamp: String,
    results: &'a [DataPoint],
}

#[derive(Serialize)]
struct HardwareHeader<'a> {
    backend: &'a str,
    workers: usize,
    warp_size: usize,
    max_threads_per_block: usize,
    logical_cores: usize,
}

fn to_json(data: &[DataPoint], hardware: &HardwareInfo) -> Result<String, String> {
    let report = JsonReport {
        hardware: HardwareHeader {
            backend: &hardware.backend,
            workers: hardware.workers,
            warp_size: hardware.warp_size,
            max_threads_per_block: hardware.max_threads_per_block,
            logical_cores: hardware.logical_cores,
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
        results: data,
    };
    serde_json::to_string_pretty(&report).map_err(|e| format!("JSON serialization failed: {}", e))
}

/// Write the report to `path`, creating parent directories as needed.
pub fn write_json(path: &str, data: &[DataPoint], hardware: &HardwareInfo) -> Result<(), String> {
    let json = to_json(data, hardware)?;

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create directory {}: {}", parent.display(), e))?;
        }
    }
    fs::write(path, json).map_err(|e| format!("Failed to write {}: {}", path, e))?;

    println!("JSON results written to: {}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use forge_primitives::Device;

    use super::*;
    use crate::stats::Stats;

    #[test]
    fn test_report_has_hardware_header() {
        let hardware = HardwareInfo::detect(&Device::sequential());
        let point = DataPoint {
            experiment: "inclusive_u32".to_string(),
            size: 1_000,
            engine_stats: Stats::default(),
            cpu_stats: Stats::default(),
            rayon_stats: Stats::default(),
            speedup: 1.5,
            speedup_vs_rayon: 0.5,
            validated: true,
            metrics: HashMap::from([("blocks".to_string(), 1.0)]),
        };

        let json = to_json(&[point], &hardware).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["hardware"]["backend"], "sequential");
        assert_eq!(value["hardware"]["workers"], 1);
        assert_eq!(value["results"][0]["experiment"], "inclusive_u32");
        assert_eq!(value["results"][0]["metrics"]["blocks"], 1.0);
        assert!(value["timestamp"].as_str().is_some());
    }
}
