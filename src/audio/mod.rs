// Module audio - Rendering-domain side of the transport

pub mod performance;
pub mod pool;
pub mod render;
pub mod timing;

pub use performance::{
    CycleMeter, PerformanceMonitor, PerformanceStats, PerformanceStatus, RenderLevel,
};
pub use pool::{ObjectPool, PoolError, PoolHandle, Poolable, ScratchBuffer};
pub use render::{EventSink, RenderSettings, RenderTransport, Voice};
pub use timing::AudioTiming;
