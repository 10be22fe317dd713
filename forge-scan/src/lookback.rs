//! Decoupled look-back.
//!
//! Warp 0 of block `b` inspects its predecessors a warp-width window at a
//! time, lane `i` looking at block `b - 1 - i` of the window. Once any lane sees
//! a `Prefix` cell, everything before the nearest one is already folded into
//! it and the walk ends. Block 0 always publishes `Prefix`, so the walk ends
//! after at most `b` cells.
//!
//! Precondition: every predecessor has started and keeps running until it has
//! published. Virtual block ids give the first half; the device never
//! suspends a started block, which gives the second.

use forge_primitives::device::MAX_WARP_SIZE;
use forge_primitives::warp;

use crate::element::ScanElement;
use crate::status::{BlockStatus, StatusTag};

/// Sum of every block before `vid`, or `None` if the launch was aborted while
/// waiting on a predecessor.
///
/// `lanes` is warp 0's register file and sets the window width.
pub(crate) fn exclusive_prefix<T, S>(
    statuses: &[S],
    vid: usize,
    lanes: &mut [T],
    aborted: &dyn Fn() -> bool,
) -> Option<T>
where
    T: ScanElement,
    S: BlockStatus<T>,
{
    let width = lanes.len();
    debug_assert!(width.is_power_of_two() && width <= MAX_WARP_SIZE);

    let mut prefix_known = [false; MAX_WARP_SIZE];
    let mut exclusive_prefix = T::zero();
    let mut iblock0 = vid as isize - 1;
    while iblock0 >= 0 {
        for lane in 0..width {
            let iblock = iblock0 - lane as isize;
            let (tag, value) = if iblock >= 0 {
                statuses[iblock as usize].wait(aborted)?
            } else {
                (StatusTag::Prefix, T::zero())
            };
            lanes[lane] = value;
            prefix_known[lane] = tag == StatusTag::Prefix;
        }

        let mask = warp::ballot(prefix_known[..width].iter().copied());
        let mut stop = mask & 1 != 0;
        let window = if stop {
            lanes[0]
        } else {
            if mask != 0 {
                let nearest = mask.trailing_zeros() as usize;
                lanes[nearest + 1..].fill(T::zero());
                stop = true;
            }
            warp::reduce_sum(lanes).unwrap_or_else(T::zero)
        };

        exclusive_prefix = exclusive_prefix + window;
        if stop {
            break;
        }
        iblock0 -= width as isize;
    }
    Some(exclusive_prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{PackedStatus, SplitStatus};

    fn cells(published: &[(StatusTag, u32)]) -> Vec<PackedStatus> {
        published
            .iter()
            .map(|&(tag, value)| {
                let cell = PackedStatus::new();
                cell.publish(tag, value);
                cell
            })
            .collect()
    }

    fn prefix_of(statuses: &[PackedStatus], vid: usize, width: usize) -> u32 {
        let mut lanes = vec![0u32; width];
        exclusive_prefix(statuses, vid, &mut lanes, &|| false).unwrap()
    }

    #[test]
    fn test_walks_back_across_windows() {
        use StatusTag::*;
        let statuses = cells(&[(Prefix, 10), (Aggregate, 5), (Aggregate, 3)]);
        // window {2, 1}: no prefix; window {0, -1}: lane 0 is a prefix.
        assert_eq!(prefix_of(&statuses, 3, 2), 18);
        // one window {2, 1, 0, -1}
        assert_eq!(prefix_of(&statuses, 3, 4), 18);
    }

    #[test]
    fn test_stops_at_nearest_prefix() {
        use StatusTag::*;
        // Block 1 already knows its inclusive sum, so block 0 must not be
        // counted twice.
        let statuses = cells(&[(Prefix, 10), (Prefix, 15), (Aggregate, 3)]);
        assert_eq!(prefix_of(&statuses, 3, 4), 18);
        assert_eq!(prefix_of(&statuses, 3, 1), 18);
        assert_eq!(prefix_of(&statuses, 2, 4), 15);
    }

    #[test]
    fn test_first_successor_reads_block_zero() {
        let statuses = cells(&[(StatusTag::Prefix, 7)]);
        assert_eq!(prefix_of(&statuses, 1, 32), 7);
    }

    #[test]
    fn test_waits_for_late_predecessor() {
        let statuses: Vec<SplitStatus<u64>> = (0..3).map(|_| SplitStatus::new()).collect();
        statuses[0].publish(StatusTag::Prefix, 1);
        statuses[2].publish(StatusTag::Aggregate, 4);
        std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(std::time::Duration::from_millis(5));
                statuses[1].publish(StatusTag::Aggregate, 2);
            });
            let mut lanes = [0u64; 4];
            assert_eq!(exclusive_prefix(&statuses, 3, &mut lanes, &|| false), Some(7));
        });
    }

    #[test]
    fn test_abort_while_waiting() {
        let statuses: Vec<PackedStatus> = (0..2).map(|_| PackedStatus::new()).collect();
        let mut lanes = [0u32; 2];
        assert_eq!(exclusive_prefix(&statuses, 2, &mut lanes, &|| true), None);
    }
}
