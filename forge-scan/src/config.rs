use std::mem::size_of;

use forge_primitives::{Device, LaunchConfig};

use crate::ScanError;

pub const DEFAULT_WARPS_PER_BLOCK: usize = 4;
pub const DEFAULT_CHUNKS_PER_BLOCK: usize = 12;

/// Block shape of the scan kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    /// Warps per block. At most one warp's worth, since a single warp scans
    /// the per-warp sums.
    pub warps_per_block: usize,
    /// Chunks of `threads_per_block` elements each block walks through.
    pub chunks_per_block: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            warps_per_block: DEFAULT_WARPS_PER_BLOCK,
            chunks_per_block: DEFAULT_CHUNKS_PER_BLOCK,
        }
    }
}

impl ScanConfig {
    pub fn new(warps_per_block: usize, chunks_per_block: usize) -> Self {
        Self {
            warps_per_block,
            chunks_per_block,
        }
    }

    /// Shrink the warp count until one block fits `device`.
    pub fn fitted_to(mut self, device: &Device) -> Self {
        let warp = device.warp_size();
        self.warps_per_block = self
            .warps_per_block
            .min(warp)
            .min(device.max_threads_per_block() / warp)
            .max(1);
        self
    }

    pub fn validate(&self, device: &Device) -> Result<(), ScanError> {
        let warp = device.warp_size();
        if self.warps_per_block == 0 || self.chunks_per_block == 0 {
            return Err(ScanError::InvalidConfig(
                "warps and chunks per block must be non-zero".to_string(),
            ));
        }
        if self.warps_per_block > warp {
            return Err(ScanError::InvalidConfig(format!(
                "{} warps per block exceed the warp size {}",
                self.warps_per_block, warp
            )));
        }
        if self.warps_per_block * warp > device.max_threads_per_block() {
            return Err(ScanError::InvalidConfig(format!(
                "{} threads per block exceed the device limit {}",
                self.warps_per_block * warp,
                device.max_threads_per_block()
            )));
        }
        Ok(())
    }
}

/// Grid shape for one scan of `n` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    pub warp_size: usize,
    pub warps_per_block: usize,
    pub threads_per_block: usize,
    pub chunks_per_block: usize,
    pub elements_per_block: usize,
    pub blocks: usize,
    /// Warp sums, scanned warp sums and the broadcast block id.
    pub shared_bytes: usize,
}

impl LaunchGeometry {
    pub fn new<T>(n: usize, warp_size: usize, config: &ScanConfig) -> Self {
        let threads_per_block = config.warps_per_block * warp_size;
        let elements_per_block = threads_per_block * config.chunks_per_block;
        Self {
            warp_size,
            warps_per_block: config.warps_per_block,
            threads_per_block,
            chunks_per_block: config.chunks_per_block,
            elements_per_block,
            blocks: n.div_ceil(elements_per_block),
            shared_bytes: size_of::<T>() * (warp_size + config.warps_per_block)
                + size_of::<u32>(),
        }
    }

    pub fn launch_config(&self) -> LaunchConfig {
        LaunchConfig::new(self.blocks, self.threads_per_block).with_shared_bytes(self.shared_bytes)
    }
}
