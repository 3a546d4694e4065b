//! Common data types used throughout the application

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Name of the tracker custom field that carries an issue's scheduled date.
pub const DUE_DATE_FIELD: &str = "Due Date";

/// Persistent pairing between one tracker issue and one calendar event.
///
/// At least one of `event_id` / `issue_id` is always populated; each remote
/// id is unique across all bindings. The per-side `*_updated_at` instants
/// record the last remote update the engine has acted on and only ever move
/// forward within the lifetime of a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Store-assigned local id.
    pub id: i64,
    pub event_id: Option<String>,
    pub issue_id: Option<String>,
    pub event_updated_at: Option<DateTime<Utc>>,
    pub issue_updated_at: Option<DateTime<Utc>>,
}

/// Input for creating a binding; the store assigns the local id.
#[derive(Debug, Clone, Default)]
pub struct NewBinding {
    pub event_id: Option<String>,
    pub issue_id: Option<String>,
    pub event_updated_at: Option<DateTime<Utc>>,
    pub issue_updated_at: Option<DateTime<Utc>>,
}

/// Lifecycle status of a calendar event as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Active,
    Cancelled,
}

/// Calendar event in the shape the sync engine classifies over.
///
/// Cancelled events arrive from the delta feed stripped down to id and
/// status; their remaining fields carry neutral defaults and are never read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub html_link: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: EventStatus,
    pub updated: DateTime<Utc>,
}

/// Tracker issue in the shape the sync engine classifies over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub id_readable: String,
    pub summary: String,
    pub description: String,
    pub updated: DateTime<Utc>,
    pub custom_fields: Vec<CustomField>,
}

/// Loosely-typed tracker custom field.
///
/// The tracker API models field values as arbitrary JSON; only the
/// epoch-millisecond date carried by [`DUE_DATE_FIELD`] matters here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomField {
    pub name: String,
    pub value: serde_json::Value,
}

impl Issue {
    /// Extract the scheduled date from the `"Due Date"` custom field.
    ///
    /// The field value is epoch milliseconds. An absent field, or a value
    /// that is not a JSON number, means the issue has no due date.
    pub fn due_date(&self) -> Option<DateTime<Utc>> {
        let field = self.custom_fields.iter().find(|f| f.name == DUE_DATE_FIELD)?;
        let millis =
            field.value.as_i64().or_else(|| field.value.as_f64().map(|value| value as i64))?;
        Utc.timestamp_millis_opt(millis).single()
    }
}

/// Per-run counters reported by the sync engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub events_observed: usize,
    pub issues_observed: usize,
    pub issues_created: usize,
    pub issues_updated: usize,
    pub events_created: usize,
    pub events_updated: usize,
    pub bindings_removed: usize,
    pub items_failed: usize,
}
