//! # CalBridge Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for the two remote sides and the
//!   binding store
//! - The synchronization engine
//!
//! ## Architecture Principles
//! - Only depends on `calbridge-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod sync;

// Re-export specific items to avoid ambiguity
pub use sync::{BindingStore, CalendarPort, EventDelta, SyncEngine, SyncSettings, TrackerPort};
