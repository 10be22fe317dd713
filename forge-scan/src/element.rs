use std::ops::{Add, Sub};

use bytemuck::Pod;
use num_traits::Zero;

/// Values the scan engine can sum.
///
/// Any plain-old-data numeric type with a zero qualifies; the blanket impl
/// covers every primitive integer and float. Over-aligned `#[repr(align)]`
/// types work too.
pub trait ScanElement:
    Pod + Zero + Add<Output = Self> + Sub<Output = Self> + Send + Sync + 'static
{
    /// Whether a status tag and one value fit a single 64-bit atomic word.
    const FITS_WORD: bool = std::mem::size_of::<Self>() <= 4;
}

impl<T> ScanElement for T where
    T: Pod + Zero + Add<Output = T> + Sub<Output = T> + Send + Sync + 'static
{
}

/// Inclusive or exclusive running sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanMode {
    /// `out[i] = in[0] + .. + in[i]`
    Inclusive,
    /// `out[i] = in[0] + .. + in[i - 1]`, `out[0] = 0`
    Exclusive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_word() {
        assert!(<u8 as ScanElement>::FITS_WORD);
        assert!(<i16 as ScanElement>::FITS_WORD);
        assert!(<u32 as ScanElement>::FITS_WORD);
        assert!(<f32 as ScanElement>::FITS_WORD);
        assert!(!<u64 as ScanElement>::FITS_WORD);
        assert!(!<f64 as ScanElement>::FITS_WORD);
        assert!(!<i128 as ScanElement>::FITS_WORD);
    }
}
