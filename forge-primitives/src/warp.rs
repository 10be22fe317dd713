//! Warp-level exchange primitives.
//!
//! A warp is a slice of lane values, one entry per lane, that steps in
//! lockstep. Each primitive models one collective instruction and touches only
//! the lanes whose result is defined, so lanes that a real device would leave
//! holding garbage are simply left alone here.

use std::ops::Add;

/// `lanes[i] = lanes[i - delta]` for every lane with a source below it.
/// Lanes `0..delta` keep their own value.
pub fn shfl_up<T: Copy>(lanes: &mut [T], delta: usize) {
    for i in (delta..lanes.len()).rev() {
        lanes[i] = lanes[i - delta];
    }
}

/// `lanes[i] = lanes[i + delta]` for every lane with a source above it.
/// The top `delta` lanes keep their own value.
pub fn shfl_down<T: Copy>(lanes: &mut [T], delta: usize) {
    for i in 0..lanes.len().saturating_sub(delta) {
        lanes[i] = lanes[i + delta];
    }
}

/// Hillis-Steele inclusive sum across the warp, in place.
pub fn inclusive_sum<T: Copy + Add<Output = T>>(lanes: &mut [T]) {
    let mut offset = 1;
    while offset < lanes.len() {
        // Walking downward reads each source before it is overwritten, which is
        // what `x += shfl_up(x, offset)` does in one step.
        for i in (offset..lanes.len()).rev() {
            lanes[i] = lanes[i - offset] + lanes[i];
        }
        offset <<= 1;
    }
}

/// Shuffle-down tree reduction. The sum lands in lane 0 and is returned; the
/// other lanes hold partial sums afterwards.
///
/// The lane count must be a power of two.
pub fn reduce_sum<T: Copy + Add<Output = T>>(lanes: &mut [T]) -> Option<T> {
    debug_assert!(lanes.is_empty() || lanes.len().is_power_of_two());
    let mut offset = lanes.len() / 2;
    while offset > 0 {
        for i in 0..offset {
            lanes[i] = lanes[i] + lanes[i + offset];
        }
        offset /= 2;
    }
    lanes.first().copied()
}

/// One bit per lane, set where the predicate holds. Lane 0 is bit 0.
pub fn ballot(predicates: impl IntoIterator<Item = bool>) -> u64 {
    predicates
        .into_iter()
        .take(64)
        .enumerate()
        .fold(0, |mask, (lane, p)| mask | (u64::from(p) << lane))
}
