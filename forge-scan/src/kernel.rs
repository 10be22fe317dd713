//! The single-pass scan kernel: one call per block.

use std::sync::atomic::Ordering;

use forge_primitives::BlockContext;

use crate::block_scan::BlockScan;
use crate::config::LaunchGeometry;
use crate::element::{ScanElement, ScanMode};
use crate::lookback;
use crate::scratch::ScanScratch;
use crate::status::{BlockStatus, StatusTag};

pub(crate) struct ScanKernel<'a, T, S, R, W> {
    pub geometry: LaunchGeometry,
    pub n: usize,
    pub mode: ScanMode,
    pub scratch: ScanScratch<'a, S, T>,
    pub read: &'a R,
    pub write: &'a W,
}

impl<T, S, R, W> ScanKernel<'_, T, S, R, W>
where
    T: ScanElement,
    S: BlockStatus<T>,
    R: Fn(usize) -> T + Sync,
    W: Fn(usize, T) + Sync,
{
    /// Logical position of this block. Hardware block ids may start in any
    /// order, so every decision below uses this id instead.
    fn virtual_block_id(&self, ctx: &BlockContext<'_>) -> usize {
        if ctx.grid_dim() > 1 {
            let vid = self.scratch.counter.fetch_add(1, Ordering::Relaxed) as usize;
            debug_assert!(vid < ctx.grid_dim());
            vid
        } else {
            0
        }
    }

    pub(crate) fn run_block(&self, ctx: &BlockContext<'_>) {
        let vid = self.virtual_block_id(ctx);
        let g = &self.geometry;
        let ibegin = g.elements_per_block * vid;
        let iend = (ibegin + g.elements_per_block).min(self.n);
        let status = &self.scratch.statuses[vid];
        let total = self.scratch.total;

        let mut block = BlockScan::new(g);
        let aggregate = block.scan_chunks(ibegin, iend, self.n, self.mode, self.read, total);

        if ctx.grid_dim() > 1 {
            let tag = if vid == 0 {
                StatusTag::Prefix
            } else {
                StatusTag::Aggregate
            };
            status.publish(tag, aggregate);
        }

        let prefix = if vid == 0 {
            None
        } else {
            let aborted = || ctx.is_aborted();
            let Some(prefix) = lookback::exclusive_prefix(
                self.scratch.statuses,
                vid,
                block.lookback_lanes(),
                &aborted,
            ) else {
                return;
            };
            status.publish(StatusTag::Prefix, aggregate + prefix);
            Some(prefix)
        };

        block.write_output(ibegin, iend, self.n, prefix, self.write, total);
    }
}
