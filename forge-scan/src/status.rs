//! Per-block status cells for decoupled look-back.
//!
//! A cell moves `Invalid -> Aggregate -> Prefix`, is written only by the block
//! that owns it and read by later blocks. Two encodings exist:
//!
//! - [`PackedStatus`]: tag and a value of at most 32 bits share one
//!   `AtomicU64`, so a reader can never see a tag paired with a stale value.
//! - [`SplitStatus`]: wider values live in plain fields next to an `AtomicU8`
//!   tag. The value is stored first and the tag is published with `Release`;
//!   readers load the tag with `Acquire` before touching the value.
//!
//! Every bit pattern is a valid cell (unknown tags read as `Invalid`), so cells
//! can be viewed over zeroed or recycled pool memory and reset in place.

use std::cell::UnsafeCell;
use std::mem::size_of;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::element::ScanElement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusTag {
    /// Nothing published yet.
    Invalid = 0,
    /// The block's own sum is known.
    Aggregate = 1,
    /// The block's inclusive sum, including every predecessor, is known.
    Prefix = 2,
}

impl StatusTag {
    fn from_bits(bits: u8) -> Self {
        match bits {
            1 => StatusTag::Aggregate,
            2 => StatusTag::Prefix,
            _ => StatusTag::Invalid,
        }
    }
}

/// One block's publication slot.
pub trait BlockStatus<T: ScanElement>: Sync {
    /// Back to `Invalid`. Only called while no launch is using the cell.
    fn reset(&self);

    /// Publish `value` under `tag`. `Aggregate` publishes the block's own sum,
    /// `Prefix` its inclusive sum. Only the owning block calls this.
    fn publish(&self, tag: StatusTag, value: T);

    /// Current tag and the value published with it (zero while `Invalid`).
    fn read(&self) -> (StatusTag, T);

    /// Spin until the owner has published something.
    ///
    /// Returns `None` if `aborted` reports that the launch is being torn
    /// down; the owner may never publish in that case.
    fn wait(&self, aborted: &dyn Fn() -> bool) -> Option<(StatusTag, T)> {
        loop {
            let (tag, value) = self.read();
            if tag != StatusTag::Invalid {
                return Some((tag, value));
            }
            if aborted() {
                return None;
            }
            std::hint::spin_loop();
        }
    }
}

/// Tag in the high half, value bits in the low half of one atomic word.
#[repr(transparent)]
pub struct PackedStatus {
    word: AtomicU64,
}

impl PackedStatus {
    pub fn new() -> Self {
        Self {
            word: AtomicU64::new(0),
        }
    }

    fn pack<T: ScanElement>(tag: StatusTag, value: T) -> u64 {
        let mut bits = [0u8; 4];
        bits[..size_of::<T>()].copy_from_slice(bytemuck::bytes_of(&value));
        (u64::from(tag as u8) << 32) | u64::from(u32::from_ne_bytes(bits))
    }

    fn unpack<T: ScanElement>(word: u64) -> (StatusTag, T) {
        let tag = StatusTag::from_bits((word >> 32) as u8);
        let bits = (word as u32).to_ne_bytes();
        (tag, bytemuck::pod_read_unaligned(&bits[..size_of::<T>()]))
    }
}

impl Default for PackedStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ScanElement> BlockStatus<T> for PackedStatus {
    fn reset(&self) {
        self.word.store(0, Ordering::Relaxed);
    }

    fn publish(&self, tag: StatusTag, value: T) {
        assert!(T::FITS_WORD, "packed status cell needs a value of at most 32 bits");
        self.word.store(Self::pack(tag, value), Ordering::Release);
    }

    fn read(&self) -> (StatusTag, T) {
        match Self::unpack::<T>(self.word.load(Ordering::Acquire)) {
            (StatusTag::Invalid, _) => (StatusTag::Invalid, T::zero()),
            published => published,
        }
    }
}

/// Separate aggregate and inclusive fields behind an atomic tag.
#[repr(C)]
pub struct SplitStatus<T> {
    aggregate: UnsafeCell<T>,
    inclusive: UnsafeCell<T>,
    tag: AtomicU8,
}

// SAFETY: `aggregate` is written only before `Aggregate` is published and
// `inclusive` only before `Prefix` is published, each by the single owning
// block. Readers touch a field only after an `Acquire` load of the tag that
// was published with it, so no field is ever read while being written.
unsafe impl<T: Send + Sync> Sync for SplitStatus<T> {}

impl<T: ScanElement> SplitStatus<T> {
    pub fn new() -> Self {
        Self {
            aggregate: UnsafeCell::new(T::zero()),
            inclusive: UnsafeCell::new(T::zero()),
            tag: AtomicU8::new(StatusTag::Invalid as u8),
        }
    }
}

impl<T: ScanElement> Default for SplitStatus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ScanElement> BlockStatus<T> for SplitStatus<T> {
    fn reset(&self) {
        self.tag.store(StatusTag::Invalid as u8, Ordering::Relaxed);
    }

    fn publish(&self, tag: StatusTag, value: T) {
        let field = match tag {
            StatusTag::Aggregate => &self.aggregate,
            StatusTag::Prefix => &self.inclusive,
            StatusTag::Invalid => {
                self.reset();
                return;
            }
        };
        // SAFETY: only the owning block writes, and nobody reads this field
        // until the tag below is observed.
        unsafe { field.get().write(value) };
        self.tag.store(tag as u8, Ordering::Release);
    }

    fn read(&self) -> (StatusTag, T) {
        let tag = StatusTag::from_bits(self.tag.load(Ordering::Acquire));
        // SAFETY: the field matching an observed tag is never written again
        // during this launch.
        let value = match tag {
            StatusTag::Invalid => T::zero(),
            StatusTag::Aggregate => unsafe { self.aggregate.get().read() },
            StatusTag::Prefix => unsafe { self.inclusive.get().read() },
        };
        (tag, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_packed_round_trip() {
        let cell = PackedStatus::new();
        assert_eq!(BlockStatus::<u32>::read(&cell), (StatusTag::Invalid, 0));

        cell.publish(StatusTag::Aggregate, 0xDEAD_BEEFu32);
        assert_eq!(cell.read(), (StatusTag::Aggregate, 0xDEAD_BEEFu32));

        cell.publish(StatusTag::Prefix, -1.5f32);
        assert_eq!(cell.read(), (StatusTag::Prefix, -1.5f32));

        cell.publish(StatusTag::Aggregate, -7i16);
        assert_eq!(cell.read(), (StatusTag::Aggregate, -7i16));

        BlockStatus::<u32>::reset(&cell);
        assert_eq!(BlockStatus::<u32>::read(&cell), (StatusTag::Invalid, 0));
    }

    #[test]
    fn test_split_keeps_aggregate_after_prefix() {
        let cell = SplitStatus::<u64>::new();
        cell.publish(StatusTag::Aggregate, 40);
        cell.publish(StatusTag::Prefix, 100);
        assert_eq!(cell.read(), (StatusTag::Prefix, 100));
        assert_eq!(unsafe { cell.aggregate.get().read() }, 40);

        cell.reset();
        assert_eq!(cell.read(), (StatusTag::Invalid, 0));
    }

    #[test]
    fn test_unknown_tag_reads_invalid() {
        let cell = PackedStatus {
            word: AtomicU64::new((7u64 << 32) | 5),
        };
        assert_eq!(BlockStatus::<u32>::read(&cell), (StatusTag::Invalid, 0));
    }

    #[test]
    fn test_wait_sees_publication_from_other_thread() {
        let cell = SplitStatus::<f64>::new();
        std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(std::time::Duration::from_millis(5));
                cell.publish(StatusTag::Aggregate, 2.25);
            });
            assert_eq!(cell.wait(&|| false), Some((StatusTag::Aggregate, 2.25)));
        });
    }

    #[test]
    fn test_wait_gives_up_on_abort() {
        let cell = PackedStatus::new();
        let aborted = AtomicBool::new(false);
        std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(std::time::Duration::from_millis(5));
                aborted.store(true, Ordering::Release);
            });
            let seen: Option<(StatusTag, u32)> = cell.wait(&|| aborted.load(Ordering::Acquire));
            assert_eq!(seen, None);
        });
    }
}
