//! Block-wide scan over a block's chunks.
//!
//! `BlockScan` holds what a real block keeps in registers and shared memory:
//! one input and one running value per thread, the per-warp sums, and the
//! block-local results of every chunk until the exclusive prefix is known.

use forge_primitives::warp;

use crate::config::LaunchGeometry;
use crate::element::{ScanElement, ScanMode};
use crate::scratch::TotalSum;

pub(crate) struct BlockScan<T> {
    warp_size: usize,
    warps: usize,
    threads: usize,
    chunks: usize,
    /// Each thread's input for the current chunk.
    inputs: Vec<T>,
    /// Each thread's running value.
    lanes: Vec<T>,
    /// Warp sums, then their inclusive scan.
    warp_sums: Vec<T>,
    /// Block-local results, `chunk * threads + thread`.
    tmp_out: Vec<T>,
}

impl<T: ScanElement> BlockScan<T> {
    pub(crate) fn new(geometry: &LaunchGeometry) -> Self {
        let threads = geometry.threads_per_block;
        Self {
            warp_size: geometry.warp_size,
            warps: geometry.warps_per_block,
            threads,
            chunks: geometry.chunks_per_block,
            inputs: vec![T::zero(); threads],
            lanes: vec![T::zero(); threads],
            warp_sums: vec![T::zero(); geometry.warps_per_block],
            tmp_out: vec![T::zero(); threads * geometry.chunks_per_block],
        }
    }

    /// Scan `[ibegin, iend)` chunk by chunk and return the block's sum.
    ///
    /// For an exclusive scan the input at `n - 1` is added to `total` here,
    /// since it does not show up in any exclusive output.
    pub(crate) fn scan_chunks<R>(
        &mut self,
        ibegin: usize,
        iend: usize,
        n: usize,
        mode: ScanMode,
        read: &R,
        total: &TotalSum<T>,
    ) -> T
    where
        R: Fn(usize) -> T,
    {
        let mut sum_prev_chunk = T::zero();
        for chunk in 0..self.chunks {
            let base = ibegin + chunk * self.threads;
            if base >= iend {
                break;
            }

            for tid in 0..self.threads {
                let offset = base + tid;
                let x0 = if offset < iend { read(offset) } else { T::zero() };
                if mode == ScanMode::Exclusive && offset == n - 1 {
                    // SAFETY: only the thread holding index n - 1 touches the total.
                    unsafe { total.add(x0) };
                }
                self.inputs[tid] = x0;
                self.lanes[tid] = x0;
            }

            for (w, lanes) in self.lanes.chunks_exact_mut(self.warp_size).enumerate() {
                warp::inclusive_sum(lanes);
                self.warp_sums[w] = lanes[self.warp_size - 1];
            }
            // barrier
            warp::inclusive_sum(&mut self.warp_sums[..self.warps]);
            // barrier

            for tid in 0..self.threads {
                let w = tid / self.warp_size;
                let sum_prev_warp = if w == 0 {
                    T::zero()
                } else {
                    self.warp_sums[w - 1]
                };
                let x = match mode {
                    ScanMode::Inclusive => self.lanes[tid],
                    ScanMode::Exclusive => self.lanes[tid] - self.inputs[tid],
                };
                self.tmp_out[chunk * self.threads + tid] = sum_prev_warp + sum_prev_chunk + x;
            }
            sum_prev_chunk = sum_prev_chunk + self.warp_sums[self.warps - 1];
        }
        sum_prev_chunk
    }

    /// Warp 0's lanes, free for look-back once the chunks are scanned.
    pub(crate) fn lookback_lanes(&mut self) -> &mut [T] {
        &mut self.lanes[..self.warp_size]
    }

    /// Write every result of `[ibegin, iend)` shifted by `prefix`, and add the
    /// result at `n - 1` to `total`.
    pub(crate) fn write_output<W>(
        &self,
        ibegin: usize,
        iend: usize,
        n: usize,
        prefix: Option<T>,
        write: &W,
        total: &TotalSum<T>,
    ) where
        W: Fn(usize, T),
    {
        for chunk in 0..self.chunks {
            let base = ibegin + chunk * self.threads;
            if base >= iend {
                break;
            }
            for tid in 0..self.threads.min(iend - base) {
                let offset = base + tid;
                let local = self.tmp_out[chunk * self.threads + tid];
                let t = match prefix {
                    Some(p) => local + p,
                    None => local,
                };
                write(offset, t);
                if offset == n - 1 {
                    // SAFETY: only the thread holding index n - 1 touches the total.
                    unsafe { total.add(t) };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use std::cell::RefCell;

    fn scan_single_block(
        input: &[i64],
        mode: ScanMode,
        geometry: &LaunchGeometry,
    ) -> (Vec<i64>, i64, i64) {
        let n = input.len();
        let total = TotalSum::new(0i64);
        let out = RefCell::new(vec![i64::MIN; n]);
        let mut block = BlockScan::new(geometry);
        let aggregate = block.scan_chunks(0, n, n, mode, &|i: usize| input[i], &total);
        let write = |i: usize, v: i64| out.borrow_mut()[i] = v;
        block.write_output(0, n, n, None, &write, &total);
        (out.into_inner(), aggregate, unsafe { total.get() })
    }

    #[test]
    fn test_inclusive_across_warps_and_chunks() {
        let geometry = LaunchGeometry::new::<i64>(29, 4, &ScanConfig::new(3, 3));
        assert_eq!(geometry.blocks, 1);
        let input: Vec<i64> = (0..29).map(|i| (i * 7 % 11) - 5).collect();
        let (out, aggregate, total) = scan_single_block(&input, ScanMode::Inclusive, &geometry);

        let mut acc = 0;
        for (i, &x) in input.iter().enumerate() {
            acc += x;
            assert_eq!(out[i], acc, "index {i}");
        }
        assert_eq!(aggregate, acc);
        assert_eq!(total, acc);
    }

    #[test]
    fn test_exclusive_captures_last_input() {
        let geometry = LaunchGeometry::new::<i64>(5, 2, &ScanConfig::new(2, 2));
        let (out, aggregate, total) =
            scan_single_block(&[1, 2, 3, 4, 5], ScanMode::Exclusive, &geometry);
        assert_eq!(out, vec![0, 1, 3, 6, 10]);
        assert_eq!(aggregate, 15);
        assert_eq!(total, 15);
    }

    #[test]
    fn test_partial_block_writes_only_its_range() {
        let geometry = LaunchGeometry::new::<i64>(10, 2, &ScanConfig::new(2, 2));
        let input = [1i64; 10];
        let total = TotalSum::new(0i64);
        let out = RefCell::new(vec![0i64; 10]);
        let mut block = BlockScan::new(&geometry);
        // Second block of 8: only [8, 10) belongs to it.
        let read = |i: usize| input[i];
        let aggregate = block.scan_chunks(8, 10, 10, ScanMode::Inclusive, &read, &total);
        assert_eq!(aggregate, 2);
        let write = |i: usize, v: i64| out.borrow_mut()[i] = v;
        block.write_output(8, 10, 10, Some(8), &write, &total);
        let out = out.into_inner();
        assert_eq!(&out[..8], &[0; 8]);
        assert_eq!(&out[8..], &[9, 10]);
        assert_eq!(unsafe { total.get() }, 10);
    }
}
