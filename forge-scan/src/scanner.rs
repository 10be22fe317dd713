//! Scan driver: scratch allocation, initialisation pass, kernel launch,
//! total read-back.

use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use forge_primitives::{BufferPool, Device, DeviceAllocator, DeviceBuffer, DeviceConfig};
use num_traits::PrimInt;
use tracing::{debug, trace, warn};

use crate::config::{LaunchGeometry, ScanConfig};
use crate::element::{ScanElement, ScanMode};
use crate::kernel::ScanKernel;
use crate::scratch::{ScanScratch, ScratchLayout};
use crate::status::{BlockStatus, PackedStatus, SplitStatus};
use crate::{sequential, ScanError};

/// Validate a caller-supplied element count. `None` means there is nothing
/// to scan.
///
/// # Panics
/// If the count does not fit below `i32::MAX`.
fn element_count<N: PrimInt>(n: N) -> Option<usize> {
    if n <= N::zero() {
        return None;
    }
    match n.to_i64() {
        Some(count) if count < i64::from(i32::MAX) => Some(count as usize),
        _ => panic!("element count must be below {}", i32::MAX),
    }
}

/// Destination slice shared by every block of a launch.
struct OutputSlice<'a, T> {
    ptr: *mut T,
    len: usize,
    _slice: PhantomData<&'a mut [T]>,
}

// SAFETY: every index is written by exactly one thread, and the slice is
// borrowed mutably for the lifetime of the view.
unsafe impl<T: Send> Sync for OutputSlice<'_, T> {}

impl<'a, T> OutputSlice<'a, T> {
    fn new(slice: &'a mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            _slice: PhantomData,
        }
    }

    /// # Safety
    /// No other thread may write `index` during the view's lifetime.
    unsafe fn write(&self, index: usize, value: T) {
        assert!(index < self.len);
        self.ptr.add(index).write(value);
    }
}

/// A device, a scratch allocator and a block shape.
///
/// A `Scanner` can be shared between threads; every scan allocates and frees
/// its own scratch region, so concurrent scans never alias state.
pub struct Scanner {
    device: Device,
    allocator: Arc<dyn DeviceAllocator>,
    config: ScanConfig,
}

impl Scanner {
    /// Scanner over `device` with a private buffer pool and the default block
    /// shape, narrowed if the device's warps are small.
    pub fn new(device: Device) -> Self {
        let config = ScanConfig::default().fitted_to(&device);
        Self {
            device,
            allocator: Arc::new(BufferPool::new()),
            config,
        }
    }

    /// Scanner over a device configured from the environment.
    pub fn from_env() -> Result<Self, ScanError> {
        Ok(Self::new(Device::from_env()?))
    }

    /// Process-wide scanner behind the free functions, created on first use.
    pub fn shared() -> &'static Scanner {
        static SHARED: OnceLock<Scanner> = OnceLock::new();
        SHARED.get_or_init(|| {
            Self::from_env().unwrap_or_else(|e| {
                warn!(error = %e, "ignoring device environment, using defaults");
                let device = Device::new(DeviceConfig::default()).unwrap_or_else(|e| {
                    warn!(error = %e, "falling back to the sequential device");
                    Device::sequential()
                });
                Self::new(device)
            })
        })
    }

    /// Draw scratch regions from `allocator` instead of a private pool.
    pub fn with_allocator(mut self, allocator: Arc<dyn DeviceAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn with_config(mut self, config: ScanConfig) -> Result<Self, ScanError> {
        config.validate(&self.device)?;
        self.config = config;
        Ok(self)
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn allocator(&self) -> &Arc<dyn DeviceAllocator> {
        &self.allocator
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Grid shape a scan of `n` elements of `T` would launch.
    pub fn geometry<T>(&self, n: usize) -> LaunchGeometry {
        LaunchGeometry::new::<T>(n, self.device.warp_size(), &self.config)
    }

    /// Scan `n` elements pulled through `read`, pushing results through
    /// `write`, and return the sum of all inputs.
    ///
    /// `read` and `write` are called concurrently from many threads, each
    /// index at most once per call. For `n <= 0` nothing is called and zero
    /// is returned.
    ///
    /// # Panics
    /// If `n` is not below `i32::MAX`.
    pub fn prefix_sum<T, N, R, W>(
        &self,
        n: N,
        read: R,
        write: W,
        mode: ScanMode,
    ) -> Result<T, ScanError>
    where
        T: ScanElement,
        N: PrimInt,
        R: Fn(usize) -> T + Sync,
        W: Fn(usize, T) + Sync,
    {
        match element_count(n) {
            Some(n) => self.scan(n, &read, &write, mode),
            None => Ok(T::zero()),
        }
    }

    /// Inclusive running sum of `input[..n]` into `output[..n]`; returns the
    /// total.
    ///
    /// # Panics
    /// If `n` is not below `i32::MAX` or a slice is shorter than `n`.
    pub fn inclusive_sum<T, N>(&self, n: N, input: &[T], output: &mut [T]) -> Result<T, ScanError>
    where
        T: ScanElement,
        N: PrimInt,
    {
        self.sum_slices(n, input, output, ScanMode::Inclusive)
    }

    /// Exclusive running sum of `input[..n]` into `output[..n]`; returns the
    /// total.
    ///
    /// # Panics
    /// If `n` is not below `i32::MAX` or a slice is shorter than `n`.
    pub fn exclusive_sum<T, N>(&self, n: N, input: &[T], output: &mut [T]) -> Result<T, ScanError>
    where
        T: ScanElement,
        N: PrimInt,
    {
        self.sum_slices(n, input, output, ScanMode::Exclusive)
    }

    /// Inclusive scan of all of `input`; returns how many elements of
    /// `output` were written.
    pub fn inclusive_scan<T: ScanElement>(
        &self,
        input: &[T],
        output: &mut [T],
    ) -> Result<usize, ScanError> {
        self.inclusive_sum(input.len(), input, output)?;
        Ok(input.len())
    }

    /// Exclusive scan of all of `input`; returns how many elements of
    /// `output` were written.
    pub fn exclusive_scan<T: ScanElement>(
        &self,
        input: &[T],
        output: &mut [T],
    ) -> Result<usize, ScanError> {
        self.exclusive_sum(input.len(), input, output)?;
        Ok(input.len())
    }

    fn sum_slices<T, N>(
        &self,
        n: N,
        input: &[T],
        output: &mut [T],
        mode: ScanMode,
    ) -> Result<T, ScanError>
    where
        T: ScanElement,
        N: PrimInt,
    {
        let Some(n) = element_count(n) else {
            return Ok(T::zero());
        };
        assert!(input.len() >= n, "input holds {} of {n} elements", input.len());
        assert!(output.len() >= n, "output holds {} of {n} elements", output.len());

        let out = OutputSlice::new(output);
        let read = |i: usize| input[i];
        // SAFETY: the kernel writes each index below n exactly once.
        let write = |i: usize, x: T| unsafe { out.write(i, x) };
        self.scan(n, &read, &write, mode)
    }

    fn scan<T, R, W>(&self, n: usize, read: &R, write: &W, mode: ScanMode) -> Result<T, ScanError>
    where
        T: ScanElement,
        R: Fn(usize) -> T + Sync,
        W: Fn(usize, T) + Sync,
    {
        if !self.device.is_parallel() {
            debug!(n, ?mode, "no parallel device, sequential prefix sum");
            return Ok(sequential::prefix_sum(n, read, write, mode));
        }
        if T::FITS_WORD {
            self.scan_with::<T, PackedStatus, R, W>(n, read, write, mode)
        } else {
            self.scan_with::<T, SplitStatus<T>, R, W>(n, read, write, mode)
        }
    }

    fn scan_with<T, S, R, W>(
        &self,
        n: usize,
        read: &R,
        write: &W,
        mode: ScanMode,
    ) -> Result<T, ScanError>
    where
        T: ScanElement,
        S: BlockStatus<T>,
        R: Fn(usize) -> T + Sync,
        W: Fn(usize, T) + Sync,
    {
        let geometry = self.geometry::<T>(n);
        let layout = ScratchLayout::new::<S, T>(geometry.blocks);
        let buffer = self.allocator.alloc(layout.bytes)?;
        let result =
            self.run_kernel::<T, S, R, W>(&geometry, &layout, &buffer, n, read, write, mode);
        self.allocator.free(buffer);
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn run_kernel<T, S, R, W>(
        &self,
        geometry: &LaunchGeometry,
        layout: &ScratchLayout,
        buffer: &DeviceBuffer,
        n: usize,
        read: &R,
        write: &W,
        mode: ScanMode,
    ) -> Result<T, ScanError>
    where
        T: ScanElement,
        S: BlockStatus<T>,
        R: Fn(usize) -> T + Sync,
        W: Fn(usize, T) + Sync,
    {
        // SAFETY: the buffer was just taken from the allocator for this call
        // alone and holds `layout.bytes` bytes. Status cells, the counter and
        // `T: Pod` accept any bit pattern.
        let scratch: ScanScratch<'_, S, T> = unsafe { ScanScratch::carve(buffer, layout) };

        self.device.parallel_for(geometry.blocks, |i| {
            scratch.statuses[i].reset();
            if i == 0 {
                scratch.counter.store(0, std::sync::atomic::Ordering::Relaxed);
                // SAFETY: index 0 is the only writer and no kernel is running.
                unsafe { scratch.total.set(T::zero()) };
            }
        })?;

        debug!(
            n,
            ?mode,
            blocks = geometry.blocks,
            threads_per_block = geometry.threads_per_block,
            chunks_per_block = geometry.chunks_per_block,
            packed_status = T::FITS_WORD,
            "launching prefix sum"
        );

        let kernel = ScanKernel {
            geometry: *geometry,
            n,
            mode,
            scratch,
            read,
            write,
        };
        let stats = self
            .device
            .launch(&geometry.launch_config(), |ctx| kernel.run_block(ctx))?;
        trace!(elapsed_us = stats.elapsed.as_micros() as u64, "prefix sum complete");

        // SAFETY: the launch has finished, nothing writes the total anymore.
        Ok(unsafe { kernel.scratch.total.get() })
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("device", &self.device)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
