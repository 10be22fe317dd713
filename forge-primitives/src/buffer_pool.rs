//! Device memory pool with 16-byte arena alignment, recycling, and peak tracking.
//!
//! Regions are zero-filled on first allocation and start on a [`BUFFER_ALIGN`]
//! boundary. A request is served by the smallest cached region that holds it
//! without being more than twice its size, and at most [`MAX_CACHED_BUFFERS`]
//! regions are kept for reuse. Callers carve typed sub-regions out of a single
//! allocation by rounding every sub-region size with [`align`], so each one
//! starts on an [`ARENA_ALIGN`] boundary.

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, trace};

/// Alignment of every sub-region carved out of a pooled buffer.
pub const ARENA_ALIGN: usize = 16;

/// Alignment of the start of every pooled buffer (one cache line).
pub const BUFFER_ALIGN: usize = 64;

/// Regions kept for reuse. Returning one more releases the smallest.
pub const MAX_CACHED_BUFFERS: usize = 8;

/// Round up to the nearest [`ARENA_ALIGN`] boundary.
pub fn align(size: usize) -> usize {
    (size + ARENA_ALIGN - 1) & !(ARENA_ALIGN - 1)
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("device pool exhausted: requested {requested} bytes, {in_use} of {limit} bytes held")]
    OutOfMemory {
        requested: usize,
        limit: usize,
        in_use: usize,
    },
}

/// A contiguous, device-visible region owned by whoever holds it.
///
/// The memory is shared by every block of a launch; typed views over it are
/// created by the caller, which is responsible for the access discipline.
pub struct DeviceBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the buffer is a plain heap region; concurrent access is governed by
// the typed views callers build on top of it.
unsafe impl Send for DeviceBuffer {}
unsafe impl Sync for DeviceBuffer {}

impl DeviceBuffer {
    fn allocate(len: usize) -> Self {
        let layout = Self::layout(len);
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(layout));
        Self { ptr, len }
    }

    fn layout(len: usize) -> Layout {
        // `len` is always a non-zero multiple of ARENA_ALIGN, so this cannot fail.
        Layout::from_size_align(len.max(ARENA_ALIGN), BUFFER_ALIGN)
            .unwrap_or_else(|_| panic!("buffer of {len} bytes exceeds the address space"))
    }

    /// Size of the region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region holds zero bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base address of the region.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated in `allocate` with the same layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), Self::layout(self.len)) };
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

/// A device memory pool handing out scratch regions.
///
/// The returned region must be visible to every block of a launch and must be
/// handed back with [`DeviceAllocator::free`] once the launch that used it has
/// completed.
pub trait DeviceAllocator: Send + Sync {
    fn alloc(&self, bytes: usize) -> Result<DeviceBuffer, PoolError>;

    fn free(&self, buffer: DeviceBuffer);
}

struct PoolState {
    /// Buffers available for reuse.
    available: Vec<DeviceBuffer>,
    /// Bytes currently held by the pool (handed out + available).
    allocated_bytes: usize,
    /// Peak of `allocated_bytes`.
    peak_bytes: usize,
}

/// A recycling buffer pool with arena-aligned allocations and peak tracking.
pub struct BufferPool {
    state: Mutex<PoolState>,
    limit: Option<usize>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    /// Create a new empty pool without a byte limit.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PoolState {
                available: Vec::new(),
                allocated_bytes: 0,
                peak_bytes: 0,
            }),
            limit: None,
        }
    }

    /// Create a pool that never holds more than `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Byte limit, if any.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Current total allocated bytes (including recycled).
    pub fn allocated_bytes(&self) -> usize {
        self.lock().allocated_bytes
    }

    /// Peak total allocated bytes observed.
    pub fn peak_bytes(&self) -> usize {
        self.lock().peak_bytes
    }

    /// Number of buffers currently available for reuse.
    pub fn available_count(&self) -> usize {
        self.lock().available.len()
    }

    /// Release every recycled buffer back to the system.
    pub fn trim(&self) {
        let mut state = self.lock();
        let released: usize = state.available.iter().map(DeviceBuffer::len).sum();
        state.available.clear();
        state.allocated_bytes -= released;
        debug!(released, "buffer pool trimmed");
    }
}

impl DeviceAllocator for BufferPool {
    /// Allocate (or recycle) a region of at least `bytes` bytes.
    fn alloc(&self, bytes: usize) -> Result<DeviceBuffer, PoolError> {
        let aligned = align(bytes).max(ARENA_ALIGN);
        let mut state = self.lock();

        let best_fit = state
            .available
            .iter()
            .enumerate()
            .filter(|(_, b)| (aligned..=aligned.saturating_mul(2)).contains(&b.len()))
            .min_by_key(|(_, b)| b.len())
            .map(|(pos, _)| pos);
        if let Some(pos) = best_fit {
            let buffer = state.available.swap_remove(pos);
            trace!(bytes = aligned, held = buffer.len(), "recycled device buffer");
            return Ok(buffer);
        }

        if let Some(limit) = self.limit {
            // Drop cached buffers of other sizes before giving up.
            while state.allocated_bytes + aligned > limit {
                match state.available.pop() {
                    Some(old) => state.allocated_bytes -= old.len(),
                    None => {
                        return Err(PoolError::OutOfMemory {
                            requested: aligned,
                            limit,
                            in_use: state.allocated_bytes,
                        })
                    }
                }
            }
        }

        let buffer = DeviceBuffer::allocate(aligned);
        state.allocated_bytes += aligned;
        if state.allocated_bytes > state.peak_bytes {
            state.peak_bytes = state.allocated_bytes;
            debug!(peak = state.peak_bytes, "buffer pool grew");
        }
        trace!(bytes = aligned, "allocated device buffer");
        Ok(buffer)
    }

    /// Return a region to the pool for later reuse.
    fn free(&self, buffer: DeviceBuffer) {
        trace!(bytes = buffer.len(), "device buffer returned");
        let mut state = self.lock();
        state.available.push(buffer);
        if state.available.len() > MAX_CACHED_BUFFERS {
            let smallest = state
                .available
                .iter()
                .enumerate()
                .min_by_key(|(_, b)| b.len())
                .map(|(pos, _)| pos);
            if let Some(pos) = smallest {
                let released = state.available.swap_remove(pos);
                state.allocated_bytes -= released.len();
                trace!(bytes = released.len(), "released cached device buffer");
            }
        }
    }
}
