//! Grid launch on the emulated device.
//!
//! A launch runs the kernel once per block. Threads of a block execute in
//! lockstep inside the block's worker: the kernel walks its lanes phase by
//! phase, and the end of a phase plays the role of a block-wide barrier.
//! Blocks carry no ordering guarantee among themselves.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::device::{Device, LaunchOrder};

/// Threads per block used by [`Device::parallel_for`].
pub const PARALLEL_FOR_THREADS: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("invalid launch configuration: {0}")]
    InvalidConfig(String),
    #[error("kernel panicked in block {block}: {message}")]
    KernelPanicked { block: usize, message: String },
}

/// Grid geometry of one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub blocks: usize,
    pub threads_per_block: usize,
    /// Block-shared scratch the kernel declares (bookkeeping only).
    pub shared_bytes: usize,
}

impl LaunchConfig {
    pub fn new(blocks: usize, threads_per_block: usize) -> Self {
        Self {
            blocks,
            threads_per_block,
            shared_bytes: 0,
        }
    }

    pub fn with_shared_bytes(mut self, shared_bytes: usize) -> Self {
        self.shared_bytes = shared_bytes;
        self
    }

    pub fn total_threads(&self) -> usize {
        self.blocks * self.threads_per_block
    }
}

/// What a kernel sees of the grid while running one block.
pub struct BlockContext<'a> {
    block_idx: usize,
    grid_dim: usize,
    block_dim: usize,
    warp_size: usize,
    shared_bytes: usize,
    aborted: &'a AtomicBool,
}

impl BlockContext<'_> {
    /// Hardware block id. Says nothing about when this block started.
    pub fn block_idx(&self) -> usize {
        self.block_idx
    }

    pub fn grid_dim(&self) -> usize {
        self.grid_dim
    }

    /// Threads in this block.
    pub fn block_dim(&self) -> usize {
        self.block_dim
    }

    pub fn warp_size(&self) -> usize {
        self.warp_size
    }

    pub fn warps(&self) -> usize {
        self.block_dim / self.warp_size
    }

    pub fn shared_bytes(&self) -> usize {
        self.shared_bytes
    }

    /// Whether another block of this launch has failed. Kernels that spin on
    /// state published by other blocks must poll this and bail out.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

/// Timing and shape of a completed launch.
#[derive(Debug, Clone, Copy)]
pub struct LaunchStats {
    pub blocks: usize,
    pub threads_per_block: usize,
    pub elapsed: Duration,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Device {
    fn validate_launch(&self, config: &LaunchConfig) -> Result<(), LaunchError> {
        let warp = self.warp_size();
        if config.blocks == 0 {
            return Err(LaunchError::InvalidConfig("grid has no blocks".to_string()));
        }
        if config.threads_per_block == 0 || config.threads_per_block % warp != 0 {
            return Err(LaunchError::InvalidConfig(format!(
                "{} threads per block is not a multiple of the warp size {}",
                config.threads_per_block, warp
            )));
        }
        if config.threads_per_block > self.max_threads_per_block() {
            return Err(LaunchError::InvalidConfig(format!(
                "{} threads per block exceeds the device limit {}",
                config.threads_per_block,
                self.max_threads_per_block()
            )));
        }
        Ok(())
    }

    /// Hardware block ids in the order they are handed to the scheduler.
    pub fn block_order(&self, blocks: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..blocks).collect();
        match self.config().launch_order {
            LaunchOrder::InOrder => {}
            LaunchOrder::Reversed => order.reverse(),
            LaunchOrder::Shuffled { seed } => {
                order.shuffle(&mut StdRng::seed_from_u64(seed));
            }
        }
        order
    }

    /// Run `kernel` once per block of the grid and wait for all of them.
    ///
    /// A panicking block aborts the launch: remaining blocks are skipped,
    /// blocks polling [`BlockContext::is_aborted`] leave early, and the first
    /// panic is reported as [`LaunchError::KernelPanicked`].
    pub fn launch<K>(&self, config: &LaunchConfig, kernel: K) -> Result<LaunchStats, LaunchError>
    where
        K: Fn(&BlockContext<'_>) + Sync,
    {
        self.validate_launch(config)?;

        let order = self.block_order(config.blocks);
        let aborted = AtomicBool::new(false);
        let failure: Mutex<Option<(usize, String)>> = Mutex::new(None);
        let start = Instant::now();

        let run_block = |block_idx: usize| {
            if aborted.load(Ordering::Acquire) {
                return;
            }
            let ctx = BlockContext {
                block_idx,
                grid_dim: config.blocks,
                block_dim: config.threads_per_block,
                warp_size: self.warp_size(),
                shared_bytes: config.shared_bytes,
                aborted: &aborted,
            };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| kernel(&ctx))) {
                aborted.store(true, Ordering::Release);
                let mut slot = failure.lock().unwrap_or_else(|e| e.into_inner());
                if slot.is_none() {
                    *slot = Some((block_idx, panic_message(payload.as_ref())));
                }
            }
        };

        match &self.workers {
            Some(pool) => pool.install(|| order.par_iter().for_each(|&b| run_block(b))),
            None => order.iter().for_each(|&b| run_block(b)),
        }

        let elapsed = start.elapsed();
        if let Some((block, message)) = failure.into_inner().unwrap_or_else(|e| e.into_inner()) {
            warn!(block, %message, "launch aborted");
            return Err(LaunchError::KernelPanicked { block, message });
        }

        debug!(
            blocks = config.blocks,
            threads_per_block = config.threads_per_block,
            elapsed_us = elapsed.as_micros() as u64,
            "launch complete"
        );
        Ok(LaunchStats {
            blocks: config.blocks,
            threads_per_block: config.threads_per_block,
            elapsed,
        })
    }

    /// Call `body(i)` for every `i` in `0..n`, one emulated thread per index.
    ///
    /// Blocks hold [`PARALLEL_FOR_THREADS`] threads, or the largest whole
    /// number of warps the device allows per block if that is fewer.
    pub fn parallel_for<F>(&self, n: usize, body: F) -> Result<(), LaunchError>
    where
        F: Fn(usize) + Sync,
    {
        if n == 0 {
            return Ok(());
        }
        let warp = self.warp_size();
        let limit = PARALLEL_FOR_THREADS.min(self.max_threads_per_block());
        let threads = (limit / warp * warp).max(warp);
        let config = LaunchConfig::new(n.div_ceil(threads), threads);
        self.launch(&config, |block| {
            let begin = block.block_idx() * block.block_dim();
            let end = (begin + block.block_dim()).min(n);
            for i in begin..end {
                body(i);
            }
        })?;
        Ok(())
    }
}
