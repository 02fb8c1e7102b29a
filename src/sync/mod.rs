// Sync module - Position propagation to UI consumers

pub mod broadcaster;

pub use broadcaster::{SyncBroadcaster, SyncCallback, SyncConfig, SyncUpdate};
