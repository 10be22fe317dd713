//! Single-pass parallel prefix sum with decoupled look-back.
//!
//! Each block scans its own slice of the input, publishes its sum, and then
//! resolves the sum of everything before it by looking back at the status
//! cells of its predecessors. Blocks are ordered by a virtual id taken from an
//! atomic counter when they start, so correctness does not depend on the order
//! in which the device schedules them.
//!
//! ```
//! let input = [1u32, 2, 3, 4, 5];
//! let mut output = [0u32; 5];
//! let total = forge_scan::inclusive_sum(input.len(), &input, &mut output).unwrap();
//! assert_eq!(output, [1, 3, 6, 10, 15]);
//! assert_eq!(total, 15);
//! ```

mod block_scan;
pub mod config;
pub mod element;
mod kernel;
mod lookback;
pub mod scanner;
pub mod scratch;
mod sequential;
pub mod status;

use forge_primitives::{DeviceError, LaunchError, PoolError};
use num_traits::PrimInt;

pub use config::{LaunchGeometry, ScanConfig};
pub use element::{ScanElement, ScanMode};
pub use scanner::Scanner;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("scratch allocation failed: {0}")]
    Allocation(#[from] PoolError),
    #[error("scan launch failed: {0}")]
    Launch(#[from] LaunchError),
    #[error("invalid scan configuration: {0}")]
    InvalidConfig(String),
    #[error("device unavailable: {0}")]
    Device(#[from] DeviceError),
}

/// [`Scanner::prefix_sum`] on the shared scanner.
pub fn prefix_sum<T, N, R, W>(n: N, read: R, write: W, mode: ScanMode) -> Result<T, ScanError>
where
    T: ScanElement,
    N: PrimInt,
    R: Fn(usize) -> T + Sync,
    W: Fn(usize, T) + Sync,
{
    Scanner::shared().prefix_sum(n, read, write, mode)
}

/// [`Scanner::inclusive_sum`] on the shared scanner.
pub fn inclusive_sum<T, N>(n: N, input: &[T], output: &mut [T]) -> Result<T, ScanError>
where
    T: ScanElement,
    N: PrimInt,
{
    Scanner::shared().inclusive_sum(n, input, output)
}

/// [`Scanner::exclusive_sum`] on the shared scanner.
pub fn exclusive_sum<T, N>(n: N, input: &[T], output: &mut [T]) -> Result<T, ScanError>
where
    T: ScanElement,
    N: PrimInt,
{
    Scanner::shared().exclusive_sum(n, input, output)
}

/// [`Scanner::inclusive_scan`] on the shared scanner.
pub fn inclusive_scan<T: ScanElement>(input: &[T], output: &mut [T]) -> Result<usize, ScanError> {
    Scanner::shared().inclusive_scan(input, output)
}

/// [`Scanner::exclusive_scan`] on the shared scanner.
pub fn exclusive_scan<T: ScanElement>(input: &[T], output: &mut [T]) -> Result<usize, ScanError> {
    Scanner::shared().exclusive_scan(input, output)
}
