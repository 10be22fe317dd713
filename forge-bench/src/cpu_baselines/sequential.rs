//! Single-threaded scans: the reference results and the speedup baseline.

use forge_scan::{ScanElement, ScanMode};

/// Scan `data` into `out` in one pass and return the total.
pub fn sequential_scan<T: ScanElement>(data: &[T], out: &mut [T], mode: ScanMode) -> T {
    let mut acc = T::zero();
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
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inclusive() {
        let mut out = [0u32; 5];
        assert_eq!(sequential_scan(&[1, 2, 3, 4, 5], &mut out, ScanMode::Inclusive), 15);
        assert_eq!(out, [1, 3, 6, 10, 15]);
    }

    #[test]
    fn test_exclusive() {
        let mut out = [9u64; 5];
        assert_eq!(sequential_scan(&[1, 2, 3, 4, 5], &mut out, ScanMode::Exclusive), 15);
        assert_eq!(out, [0, 1, 3, 6, 10]);
    }

    #[test]
    fn test_empty() {
        let mut out: [f64; 0] = [];
        assert_eq!(sequential_scan(&[], &mut out, ScanMode::Inclusive), 0.0);
    }
}
