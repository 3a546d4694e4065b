//! YouTrack integration

pub mod client;

pub use client::YouTrackClient;
