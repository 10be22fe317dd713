//! Host and device description for benchmark reports.

use crate::device::{Backend, Device};

/// Hardware information for the current device.
#[derive(Debug, Clone)]
pub struct HardwareInfo {
    /// Human readable backend name.
    pub backend: String,
    /// Blocks that can be resident at once.
    pub workers: usize,
    pub warp_size: usize,
    pub max_threads_per_block: usize,
    /// Logical cores on the host.
    pub logical_cores: usize,
}

impl HardwareInfo {
    pub fn detect(device: &Device) -> Self {
        let backend = match device.backend() {
            Backend::Parallel => "parallel (rayon)",
            Backend::Sequential => "sequential",
        };
        Self {
            backend: backend.to_string(),
            workers: device.worker_count(),
            warp_size: device.warp_size(),
            max_threads_per_block: device.max_threads_per_block(),
            logical_cores: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }

    /// One-line summary, e.g. `parallel (rayon), 8 workers, warp 32, 8 cores`.
    pub fn summary(&self) -> String {
        format!(
            "{}, {} workers, warp {}, {} cores",
            self.backend, self.workers, self.warp_size, self.logical_cores
        )
    }
}
