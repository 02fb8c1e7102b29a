// MyMusic Transport - Library exports for the binary, tests and benchmarks

pub mod audio;
pub mod config;
pub mod engine;
pub mod messaging;
pub mod scheduling;
pub mod sequencer;
pub mod sync;

// Re-export commonly used types for convenience
pub use audio::render::{EventSink, RenderTransport};
pub use audio::timing::AudioTiming;
pub use config::EngineConfig;
pub use engine::{TransportController, TransportEngine};
pub use messaging::batcher::SetOptions;
pub use scheduling::clock::{ClockSource, FrameTicker, ManualClock, SystemClock};
pub use sequencer::{Pattern, PositionClock, StepPosition, Tempo, TransportState};
pub use sync::{SyncConfig, SyncUpdate};
