pub mod buffer_pool;
pub mod device;
pub mod dispatch;
pub mod hardware;
pub mod warp;

pub use buffer_pool::{
    align, BufferPool, DeviceAllocator, DeviceBuffer, PoolError, MAX_CACHED_BUFFERS,
};
pub use device::{Backend, Device, DeviceConfig, DeviceError, LaunchOrder};
pub use dispatch::{BlockContext, LaunchConfig, LaunchError, LaunchStats};
pub use hardware::HardwareInfo;
