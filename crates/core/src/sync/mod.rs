//! Synchronization engine and its port interfaces

pub mod engine;
pub mod ports;

pub use engine::{SyncEngine, SyncSettings};
pub use ports::{BindingStore, CalendarPort, EventDelta, TrackerPort};
