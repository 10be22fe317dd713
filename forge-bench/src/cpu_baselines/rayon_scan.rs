//! Two-pass rayon scan: reduce fixed chunks, scan the chunk sums on the host,
//! then rescan every chunk from its offset.

use rayon::prelude::*;

use forge_scan::{ScanElement, ScanMode};

use super::sequential::sequential_scan;

const CHUNK: usize = 64 * 1024;

pub fn rayon_scan<T: ScanElement>(data: &[T], out: &mut [T], mode: ScanMode) -> T {
    let sums: Vec<T> = data
        .par_chunks(CHUNK)
        .map(|chunk| chunk.iter().fold(T::zero(), |acc, &x| acc + x))
        .collect();

    let mut offsets = vec![T::zero(); sums.len()];
    let total = sequential_scan(&sums, &mut offsets, ScanMode::Exclusive);

    out.par_chunks_mut(CHUNK)
        .zip(data.par_chunks(CHUNK))
        .zip(offsets.par_iter())
        .for_each(|((out, data), &base)| {
            let mut acc = base;
            for (slot, &x) in out.iter_mut().zip(data) {
                match mode {
                    ScanMode::Inclusive => {
                        acc = acc + x;
                        *slot = acc;
                    }
                    ScanMode::Exclusive => {
                        *slot = acc;
                        acc = acc + x;
                    }
                }
            }
        });
    total
}
