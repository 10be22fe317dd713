use crate::element::{ScanElement, ScanMode};

/// Running sum on the calling thread, for devices without parallel hardware.
pub(crate) fn prefix_sum<T, R, W>(n: usize, read: &R, write: &W, mode: ScanMode) -> T
where
    T: ScanElement,
    R: Fn(usize) -> T,
    W: Fn(usize, T),
{
    let mut sum = T::zero();
    for i in 0..n {
        let x = read(i);
        match mode {
            ScanMode::Inclusive => {
                sum = sum + x;
                write(i, sum);
            }
            ScanMode::Exclusive => {
                write(i, sum);
                sum = sum + x;
            }
        }
    }
    sum
}
