//! Per-call scratch state carved out of one pooled device buffer.
//!
//! Layout: `[block statuses | virtual block id counter | total sum]`, each
//! region rounded up to the pool's arena alignment and to its own type's
//! alignment. Types aligned beyond the pool's buffer alignment get slack at the
//! front of the buffer.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::sync::atomic::AtomicU32;

use forge_primitives::buffer_pool::{align, ARENA_ALIGN, BUFFER_ALIGN};
use forge_primitives::DeviceBuffer;

/// Byte offsets of the scratch regions for `blocks` status cells of type `S`
/// and a total of type `T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchLayout {
    pub blocks: usize,
    /// Alignment of the first region, at least [`ARENA_ALIGN`].
    pub base_align: usize,
    pub counter_offset: usize,
    pub total_offset: usize,
    /// Bytes to request from the allocator, slack included.
    pub bytes: usize,
}

fn round_up(offset: usize, to: usize) -> usize {
    offset.div_ceil(to) * to
}

impl ScratchLayout {
    pub fn new<S, T>(blocks: usize) -> Self {
        let base_align = align_of::<S>().max(align_of::<T>()).max(ARENA_ALIGN);
        let status_bytes = align(size_of::<S>() * blocks);
        let counter_offset = round_up(status_bytes, align_of::<AtomicU32>());
        let total_offset = round_up(
            counter_offset + align(size_of::<AtomicU32>()),
            align_of::<T>(),
        );
        let end = total_offset + align(size_of::<T>());
        Self {
            blocks,
            base_align,
            counter_offset,
            total_offset,
            bytes: end + base_align.saturating_sub(BUFFER_ALIGN),
        }
    }
}

/// The grid-wide sum, written only by the block that owns the last element.
#[repr(transparent)]
pub struct TotalSum<T>(UnsafeCell<T>);

// SAFETY: exactly one thread writes during a launch, and reads happen only
// between launches.
unsafe impl<T: Send> Sync for TotalSum<T> {}

impl<T: Copy + std::ops::Add<Output = T>> TotalSum<T> {
    pub fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// # Safety
    /// No other thread may access the total concurrently.
    pub unsafe fn set(&self, value: T) {
        self.0.get().write(value);
    }

    /// # Safety
    /// No other thread may access the total concurrently.
    pub unsafe fn add(&self, value: T) {
        let p = self.0.get();
        p.write(p.read() + value);
    }

    /// # Safety
    /// No launch may be writing the total.
    pub unsafe fn get(&self) -> T {
        self.0.get().read()
    }
}

/// Typed views over one scan's scratch buffer.
pub struct ScanScratch<'a, S, T> {
    pub statuses: &'a [S],
    pub counter: &'a AtomicU32,
    pub total: &'a TotalSum<T>,
    _buffer: PhantomData<&'a DeviceBuffer>,
}

impl<'a, S, T> ScanScratch<'a, S, T> {
    /// # Safety
    /// `buffer` must hold at least `layout.bytes` bytes, must not be used by
    /// anyone else while the views live, and every bit pattern must be a
    /// valid `S` and `T`.
    pub unsafe fn carve(buffer: &'a DeviceBuffer, layout: &ScratchLayout) -> Self {
        assert!(buffer.len() >= layout.bytes, "scratch buffer too small");
        let raw = buffer.as_ptr();
        let base = raw.add(raw.align_offset(layout.base_align));
        Self {
            statuses: std::slice::from_raw_parts(base.cast::<S>(), layout.blocks),
            counter: &*base.add(layout.counter_offset).cast::<AtomicU32>(),
            total: &*base.add(layout.total_offset).cast::<TotalSum<T>>(),
            _buffer: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{BlockStatus, PackedStatus, SplitStatus, StatusTag};
    use forge_primitives::{BufferPool, DeviceAllocator};
    use std::sync::atomic::Ordering;

    #[test]
    fn test_layout_offsets() {
        let layout = ScratchLayout::new::<PackedStatus, u32>(5);
        // 5 * 8 = 40 -> 48, counter 4 -> 16, total 4 -> 16
        assert_eq!(layout.counter_offset, 48);
        assert_eq!(layout.total_offset, 64);
        assert_eq!(layout.bytes, 80);

        let layout = ScratchLayout::new::<SplitStatus<f64>, f64>(3);
        // SplitStatus<f64> is 24 bytes: 72 -> 80
        assert_eq!(layout.counter_offset, 80);
        assert_eq!(layout.total_offset, 96);
        assert_eq!(layout.bytes, 112);
    }

    #[repr(C, align(128))]
    #[derive(Clone, Copy)]
    struct Wide([u64; 2]);

    #[test]
    fn test_over_aligned_types_get_slack_and_aligned_views() {
        let layout = ScratchLayout::new::<SplitStatus<Wide>, Wide>(3);
        assert_eq!(layout.base_align, 128);
        assert_eq!(layout.total_offset % 128, 0);
        assert!(layout.bytes >= layout.total_offset + 128 + (128 - BUFFER_ALIGN));

        let pool = BufferPool::new();
        let buffer = pool.alloc(layout.bytes).unwrap();
        {
            let scratch: ScanScratch<'_, SplitStatus<Wide>, Wide> =
                unsafe { ScanScratch::carve(&buffer, &layout) };
            let statuses = scratch.statuses.as_ptr() as usize;
            let total = scratch.total as *const TotalSum<Wide> as usize;
            assert_eq!(statuses % 128, 0);
            assert_eq!(total % 128, 0);
            assert!(total + 128 <= buffer.as_ptr() as usize + buffer.len());
        }
        pool.free(buffer);
    }

    #[test]
    fn test_carved_views_are_zeroed_and_disjoint() {
        let pool = BufferPool::new();
        let layout = ScratchLayout::new::<SplitStatus<u64>, u64>(4);
        let buffer = pool.alloc(layout.bytes).unwrap();
        {
            let scratch: ScanScratch<'_, SplitStatus<u64>, u64> =
                unsafe { ScanScratch::carve(&buffer, &layout) };
            assert_eq!(scratch.statuses.len(), 4);
            assert!(scratch
                .statuses
                .iter()
                .all(|s| s.read() == (StatusTag::Invalid, 0)));
            assert_eq!(scratch.counter.load(Ordering::Relaxed), 0);

            scratch.statuses[3].publish(StatusTag::Prefix, u64::MAX);
            scratch.counter.store(9, Ordering::Relaxed);
            unsafe {
                scratch.total.set(11);
                scratch.total.add(31);
                assert_eq!(scratch.total.get(), 42);
            }
            assert_eq!(scratch.statuses[3].read(), (StatusTag::Prefix, u64::MAX));
            assert_eq!(scratch.counter.load(Ordering::Relaxed), 9);
        }
        pool.free(buffer);
    }
}
