//! Google Calendar integration

pub mod client;
pub mod oauth;

pub use client::GoogleCalendarClient;
pub use oauth::{TokenManager, TokenSet};
