#![allow(dead_code)]

use forge_primitives::{Device, DeviceConfig, LaunchOrder};
use forge_scan::{ScanConfig, Scanner};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Scanner on a parallel device with `workers` threads and default geometry.
pub fn parallel_scanner(workers: usize) -> Scanner {
    Scanner::new(Device::new(DeviceConfig::parallel(workers)).unwrap())
}

/// Scanner whose blocks hold only `warp_size * warps * chunks` elements, so
/// small inputs already span many blocks.
pub fn tiny_block_scanner(
    workers: usize,
    warp_size: usize,
    warps: usize,
    chunks: usize,
    order: LaunchOrder,
) -> Scanner {
    let config = DeviceConfig::parallel(workers)
        .with_warp_size(warp_size)
        .with_launch_order(order);
    Scanner::new(Device::new(config).unwrap())
        .with_config(ScanConfig::new(warps, chunks))
        .unwrap()
}

/// Two elements per block: warp of 2, one warp, one chunk.
pub fn two_per_block_scanner(order: LaunchOrder) -> Scanner {
    tiny_block_scanner(4, 2, 1, 1, order)
}

pub fn reference_inclusive<T>(input: &[T]) -> (Vec<T>, T)
where
    T: Copy + std::ops::Add<Output = T> + Default,
{
    let mut acc = T::default();
    let out = input
        .iter()
        .map(|&x| {
            acc = acc + x;
            acc
        })
        .collect();
    (out, acc)
}

pub fn reference_exclusive<T>(input: &[T]) -> (Vec<T>, T)
where
    T: Copy + std::ops::Add<Output = T> + Default,
{
    let mut acc = T::default();
    let out = input
        .iter()
        .map(|&x| {
            let before = acc;
            acc = acc + x;
            before
        })
        .collect();
    (out, acc)
}

/// Relative comparison for sums whose association order differs.
pub fn approx_eq(a: f64, b: f64, rel: f64) -> bool {
    (a - b).abs() <= rel * a.abs().max(b.abs()).max(1.0)
}

/// Index of the first mismatch, or `len` if none.
pub fn first_diff<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    a.iter().zip(b.iter()).position(|(x, y)| x != y).unwrap_or(a.len())
}
