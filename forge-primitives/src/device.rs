//! Emulated SIMT device: backend selection, worker pool, launch policy.
//!
//! The parallel backend owns a rayon thread pool; every block of a launch runs
//! to completion on one worker. The sequential backend stands in for "no
//! parallel device" and runs blocks one after another on the caller thread.

use std::str::FromStr;

use tracing::debug;

/// Lanes per warp unless configured otherwise.
pub const DEFAULT_WARP_SIZE: usize = 32;

/// Widest warp the exchange primitives support (ballot masks are `u64`).
pub const MAX_WARP_SIZE: usize = 64;

/// Threads per block limit unless configured otherwise.
pub const DEFAULT_MAX_THREADS_PER_BLOCK: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("invalid device configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to start worker pool: {0}")]
    ThreadPool(String),
}

/// How blocks are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Blocks are scheduled across a pool of worker threads.
    Parallel,
    /// Blocks run one at a time on the launching thread.
    Sequential,
}

impl FromStr for Backend {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parallel" => Ok(Backend::Parallel),
            "sequential" | "cpu" => Ok(Backend::Sequential),
            other => Err(DeviceError::InvalidConfig(format!(
                "unknown backend '{other}' (expected parallel or sequential)"
            ))),
        }
    }
}

/// Order in which hardware block ids are handed to the scheduler.
///
/// Kernels must not depend on it; the non-default orders exist to prove that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOrder {
    InOrder,
    Reversed,
    Shuffled { seed: u64 },
}

impl FromStr for LaunchOrder {
    type Err = DeviceError;

    /// Accepts `in-order`, `reversed`, `shuffled` or `shuffled:<seed>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "in-order" | "inorder" => Ok(LaunchOrder::InOrder),
            "reversed" => Ok(LaunchOrder::Reversed),
            "shuffled" => Ok(LaunchOrder::Shuffled { seed: 0 }),
            _ => {
                let seed = s
                    .strip_prefix("shuffled:")
                    .ok_or_else(|| {
                        DeviceError::InvalidConfig(format!("unknown launch order '{s}'"))
                    })?
                    .parse::<u64>()
                    .map_err(|e| DeviceError::InvalidConfig(format!("bad shuffle seed: {e}")))?;
                Ok(LaunchOrder::Shuffled { seed })
            }
        }
    }
}

/// Device configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub backend: Backend,
    /// Worker threads for the parallel backend (0 = one per logical core).
    pub workers: usize,
    /// Lanes per warp. Power of two, at most [`MAX_WARP_SIZE`].
    pub warp_size: usize,
    pub max_threads_per_block: usize,
    pub launch_order: LaunchOrder,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self {
            backend: if cores > 1 {
                Backend::Parallel
            } else {
                Backend::Sequential
            },
            workers: 0,
            warp_size: DEFAULT_WARP_SIZE,
            max_threads_per_block: DEFAULT_MAX_THREADS_PER_BLOCK,
            launch_order: LaunchOrder::InOrder,
        }
    }
}

impl DeviceConfig {
    /// Configuration for the sequential backend.
    pub fn sequential() -> Self {
        Self {
            backend: Backend::Sequential,
            ..Self::default()
        }
    }

    /// Configuration for the parallel backend with `workers` threads.
    pub fn parallel(workers: usize) -> Self {
        Self {
            backend: Backend::Parallel,
            workers,
            ..Self::default()
        }
    }

    pub fn with_warp_size(mut self, warp_size: usize) -> Self {
        self.warp_size = warp_size;
        self
    }

    pub fn with_launch_order(mut self, launch_order: LaunchOrder) -> Self {
        self.launch_order = launch_order;
        self
    }

    /// Defaults overridden by `FORGE_DEVICE`, `FORGE_WORKERS`,
    /// `FORGE_WARP_SIZE` and `FORGE_LAUNCH_ORDER`.
    pub fn from_env() -> Result<Self, DeviceError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DeviceError> {
        let mut config = Self::default();
        if let Some(v) = lookup("FORGE_DEVICE") {
            config.backend = v.parse()?;
        }
        if let Some(v) = lookup("FORGE_WORKERS") {
            config.workers = v
                .trim()
                .parse()
                .map_err(|e| DeviceError::InvalidConfig(format!("FORGE_WORKERS: {e}")))?;
        }
        if let Some(v) = lookup("FORGE_WARP_SIZE") {
            config.warp_size = v
                .trim()
                .parse()
                .map_err(|e| DeviceError::InvalidConfig(format!("FORGE_WARP_SIZE: {e}")))?;
        }
        if let Some(v) = lookup("FORGE_LAUNCH_ORDER") {
            config.launch_order = v.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DeviceError> {
        if !self.warp_size.is_power_of_two() || self.warp_size > MAX_WARP_SIZE {
            return Err(DeviceError::InvalidConfig(format!(
                "warp size {} must be a power of two no larger than {}",
                self.warp_size, MAX_WARP_SIZE
            )));
        }
        if self.max_threads_per_block < self.warp_size {
            return Err(DeviceError::InvalidConfig(format!(
                "max threads per block {} is smaller than one warp ({})",
                self.max_threads_per_block, self.warp_size
            )));
        }
        Ok(())
    }
}

/// The emulated device.
pub struct Device {
    config: DeviceConfig,
    pub(crate) workers: Option<rayon::ThreadPool>,
}

impl Device {
    /// Start a device with the given configuration.
    pub fn new(config: DeviceConfig) -> Result<Self, DeviceError> {
        config.validate()?;

        let workers = match config.backend {
            Backend::Parallel => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(config.workers)
                    .thread_name(|i| format!("forge-sm-{i}"))
                    .build()
                    .map_err(|e| DeviceError::ThreadPool(e.to_string()))?;
                Some(pool)
            }
            Backend::Sequential => None,
        };

        let device = Self { config, workers };
        debug!(
            backend = ?device.config.backend,
            workers = device.worker_count(),
            warp_size = device.config.warp_size,
            "device ready"
        );
        Ok(device)
    }

    /// Start a device configured from the environment.
    pub fn from_env() -> Result<Self, DeviceError> {
        Self::new(DeviceConfig::from_env()?)
    }

    /// A device without parallel hardware. Never fails.
    pub fn sequential() -> Self {
        Self {
            config: DeviceConfig::sequential(),
            workers: None,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn backend(&self) -> Backend {
        self.config.backend
    }

    /// Whether blocks of a launch can run concurrently.
    pub fn is_parallel(&self) -> bool {
        self.workers.is_some()
    }

    pub fn warp_size(&self) -> usize {
        self.config.warp_size
    }

    pub fn max_threads_per_block(&self) -> usize {
        self.config.max_threads_per_block
    }

    /// Number of blocks that can be resident at once.
    pub fn worker_count(&self) -> usize {
        self.workers.as_ref().map_or(1, |pool| pool.current_num_threads())
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("config", &self.config)
            .field("workers", &self.worker_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_launch_order_parse() {
        assert_eq!("in-order".parse::<LaunchOrder>().unwrap(), LaunchOrder::InOrder);
        assert_eq!("Reversed".parse::<LaunchOrder>().unwrap(), LaunchOrder::Reversed);
        assert_eq!(
            "shuffled:7".parse::<LaunchOrder>().unwrap(),
            LaunchOrder::Shuffled { seed: 7 }
        );
        assert!("shuffled:x".parse::<LaunchOrder>().is_err());
        assert!("sideways".parse::<LaunchOrder>().is_err());
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("parallel".parse::<Backend>().unwrap(), Backend::Parallel);
        assert_eq!("SEQUENTIAL".parse::<Backend>().unwrap(), Backend::Sequential);
        assert!("gpu".parse::<Backend>().is_err());
    }

    #[test]
    fn test_config_from_lookup() {
        let config = DeviceConfig::from_lookup(lookup(&[
            ("FORGE_DEVICE", "sequential"),
            ("FORGE_WARP_SIZE", "8"),
            ("FORGE_LAUNCH_ORDER", "reversed"),
        ]))
        .unwrap();
        assert_eq!(config.backend, Backend::Sequential);
        assert_eq!(config.warp_size, 8);
        assert_eq!(config.launch_order, LaunchOrder::Reversed);
    }

    #[test]
    fn test_config_rejects_bad_warp() {
        assert!(DeviceConfig::from_lookup(lookup(&[("FORGE_WARP_SIZE", "12")])).is_err());
        assert!(DeviceConfig::from_lookup(lookup(&[("FORGE_WARP_SIZE", "128")])).is_err());
        assert!(DeviceConfig::from_lookup(lookup(&[("FORGE_WORKERS", "many")])).is_err());
    }

    #[test]
    fn test_sequential_device() {
        let device = Device::sequential();
        assert!(!device.is_parallel());
        assert_eq!(device.worker_count(), 1);
        assert_eq!(device.warp_size(), DEFAULT_WARP_SIZE);
    }

    #[test]
    fn test_parallel_device_workers() {
        let device = Device::new(DeviceConfig::parallel(3)).unwrap();
        assert!(device.is_parallel());
        assert_eq!(device.worker_count(), 3);
    }
}
