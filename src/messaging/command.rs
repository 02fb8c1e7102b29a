// Message types - Control ↔ render communication

use crate::audio::pool::PoolHandle;
use crate::messaging::batcher::ParameterBatch;
use crate::scheduling::queue::ReadyEvent;
use crate::sequencer::transport::{PositionConfirmation, TransportSnapshot};
use std::time::Duration;

/// Control → render
#[derive(Debug, Clone)]
pub enum Command {
    /// New transport view; replaces the render side's last snapshot
    Snapshot(TransportSnapshot),
    /// Event due within the lookahead window
    Schedule(ReadyEvent),
    Parameters(ParameterBatch),
    Shutdown,
}

/// Render → control
#[derive(Debug, Clone)]
pub enum RenderReport {
    /// Event executed (or dropped as stale); its slot can be released
    Acknowledged(PoolHandle),
    PositionConfirmed(PositionConfirmation),
    /// Measured cycle and the time the buffer allowed
    CycleTimed { duration: Duration, budget: Duration },
    /// Note-ons skipped because every voice was in use
    VoicesExhausted { dropped: u32 },
    /// Events refused because the pending buffer was full
    PendingOverflow { dropped: u32 },
    /// Applied batch, handed back so it is freed off the render thread
    SpentBatch(ParameterBatch),
}
