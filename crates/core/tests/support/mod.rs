//! In-memory test doubles for the sync engine ports.
//!
//! Every mock records the write calls it receives so tests can assert on
//! the exact remote traffic a run produced.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use calbridge_core::{BindingStore, CalendarPort, EventDelta, SyncEngine, SyncSettings, TrackerPort};
use calbridge_domain::{
    Binding, CalBridgeError, CalendarEvent, CustomField, EventStatus, Issue, NewBinding, Result,
    DUE_DATE_FIELD,
};
use chrono::{DateTime, TimeZone, Utc};

pub const CALENDAR_ID: &str = "cal-under-sync";
pub const WRITE_PROJECT: &str = "prj-write";
pub const QUERY_PROJECT: &str = "prj-query";
pub const TRACKER_BASE_URL: &str = "https://tracker.example.com";

/// Instant stamped onto events/issues the mocks create on behalf of the
/// engine.
pub fn remote_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
}

pub fn ts_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).unwrap()
}

// ============================================================================
// Builders
// ============================================================================

pub fn active_event(id: &str, summary: &str, updated: DateTime<Utc>) -> CalendarEvent {
    CalendarEvent {
        id: id.to_string(),
        summary: summary.to_string(),
        html_link: format!("https://calendar.example.com/event/{id}"),
        start: remote_now(),
        end: remote_now() + chrono::Duration::hours(1),
        status: EventStatus::Active,
        updated,
    }
}

pub fn cancelled_event(id: &str) -> CalendarEvent {
    CalendarEvent {
        id: id.to_string(),
        summary: String::new(),
        html_link: String::new(),
        start: DateTime::UNIX_EPOCH,
        end: DateTime::UNIX_EPOCH,
        status: EventStatus::Cancelled,
        updated: DateTime::UNIX_EPOCH,
    }
}

pub fn dated_issue(id: &str, summary: &str, updated_ms: i64, due_ms: i64) -> Issue {
    issue_with_due_value(id, summary, updated_ms, serde_json::json!(due_ms))
}

pub fn undated_issue(id: &str, summary: &str, updated_ms: i64) -> Issue {
    Issue {
        id: id.to_string(),
        id_readable: id.to_string(),
        summary: summary.to_string(),
        description: String::new(),
        updated: ts_millis(updated_ms),
        custom_fields: Vec::new(),
    }
}

pub fn issue_with_due_value(
    id: &str,
    summary: &str,
    updated_ms: i64,
    due_value: serde_json::Value,
) -> Issue {
    Issue {
        id: id.to_string(),
        id_readable: id.to_string(),
        summary: summary.to_string(),
        description: String::new(),
        updated: ts_millis(updated_ms),
        custom_fields: vec![CustomField { name: DUE_DATE_FIELD.to_string(), value: due_value }],
    }
}

// ============================================================================
// Calendar mock
// ============================================================================

/// Arguments of one `create_event`/`update_event` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventWrite {
    pub event_id: Option<String>,
    pub summary: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Default)]
pub struct MockCalendar {
    pub events: Mutex<Vec<CalendarEvent>>,
    pub next_delta_token: Mutex<String>,
    pub created: Mutex<Vec<EventWrite>>,
    pub updated: Mutex<Vec<EventWrite>>,
    pub deleted: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl MockCalendar {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delta(self: Arc<Self>, events: Vec<CalendarEvent>, token: &str) -> Arc<Self> {
        *self.events.lock().unwrap() = events;
        *self.next_delta_token.lock().unwrap() = token.to_string();
        self
    }

    pub fn created_events(&self) -> Vec<EventWrite> {
        self.created.lock().unwrap().clone()
    }

    pub fn updated_events(&self) -> Vec<EventWrite> {
        self.updated.lock().unwrap().clone()
    }

    pub fn deleted_events(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarPort for MockCalendar {
    async fn fetch_events(&self, _calendar_id: &str, _delta_token: &str) -> Result<EventDelta> {
        Ok(EventDelta {
            events: self.events.lock().unwrap().clone(),
            next_delta_token: self.next_delta_token.lock().unwrap().clone(),
        })
    }

    async fn create_event(
        &self,
        _calendar_id: &str,
        summary: &str,
        description: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CalendarEvent> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("ev-created-{n}");
        self.created.lock().unwrap().push(EventWrite {
            event_id: None,
            summary: summary.to_string(),
            description: description.to_string(),
            start,
            end,
        });
        Ok(CalendarEvent {
            id: id.clone(),
            summary: summary.to_string(),
            html_link: format!("https://calendar.example.com/event/{id}"),
            start,
            end,
            status: EventStatus::Active,
            updated: remote_now(),
        })
    }

    async fn update_event(
        &self,
        _calendar_id: &str,
        event_id: &str,
        summary: &str,
        description: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CalendarEvent> {
        self.updated.lock().unwrap().push(EventWrite {
            event_id: Some(event_id.to_string()),
            summary: summary.to_string(),
            description: description.to_string(),
            start,
            end,
        });
        Ok(CalendarEvent {
            id: event_id.to_string(),
            summary: summary.to_string(),
            html_link: format!("https://calendar.example.com/event/{event_id}"),
            start,
            end,
            status: EventStatus::Active,
            updated: remote_now(),
        })
    }

    async fn delete_event(&self, _calendar_id: &str, event_id: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(event_id.to_string());
        Ok(())
    }
}

// ============================================================================
// Tracker mock
// ============================================================================

/// Arguments of one `create_issue`/`update_issue` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueWrite {
    pub issue_id: Option<String>,
    pub summary: String,
    pub description: String,
    pub due: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct MockTracker {
    pub issues: Mutex<Vec<Issue>>,
    pub deleted_ids: Mutex<Vec<String>>,
    pub created: Mutex<Vec<IssueWrite>>,
    pub updated: Mutex<Vec<IssueWrite>>,
    pub queried_since: Mutex<Vec<(String, DateTime<Utc>)>>,
    /// Summaries whose `create_issue` call should fail.
    pub fail_creates_for: Mutex<HashSet<String>>,
    next_id: AtomicUsize,
}

impl MockTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_issues(self: Arc<Self>, issues: Vec<Issue>) -> Arc<Self> {
        *self.issues.lock().unwrap() = issues;
        self
    }

    pub fn with_deleted_ids(self: Arc<Self>, ids: Vec<&str>) -> Arc<Self> {
        *self.deleted_ids.lock().unwrap() = ids.into_iter().map(str::to_string).collect();
        self
    }

    pub fn created_issues(&self) -> Vec<IssueWrite> {
        self.created.lock().unwrap().clone()
    }

    pub fn issue_updates(&self) -> Vec<IssueWrite> {
        self.updated.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrackerPort for MockTracker {
    async fn updated_issues(&self, project_id: &str, since: DateTime<Utc>) -> Result<Vec<Issue>> {
        self.queried_since.lock().unwrap().push((project_id.to_string(), since));
        Ok(self.issues.lock().unwrap().clone())
    }

    async fn deleted_issue_ids(
        &self,
        _project_id: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        Ok(self.deleted_ids.lock().unwrap().clone())
    }

    async fn create_issue(
        &self,
        _project_id: &str,
        summary: &str,
        description: &str,
        due: Option<DateTime<Utc>>,
    ) -> Result<Issue> {
        if self.fail_creates_for.lock().unwrap().contains(summary) {
            return Err(CalBridgeError::Network("tracker create refused".into()));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("yt-created-{n}");
        self.created.lock().unwrap().push(IssueWrite {
            issue_id: None,
            summary: summary.to_string(),
            description: description.to_string(),
            due,
        });
        Ok(Issue {
            id: id.clone(),
            id_readable: id,
            summary: summary.to_string(),
            description: description.to_string(),
            updated: remote_now(),
            custom_fields: Vec::new(),
        })
    }

    async fn update_issue(
        &self,
        issue_id: &str,
        summary: &str,
        description: &str,
        due: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.updated.lock().unwrap().push(IssueWrite {
            issue_id: Some(issue_id.to_string()),
            summary: summary.to_string(),
            description: description.to_string(),
            due,
        });
        Ok(())
    }

    fn base_url(&self) -> &str {
        TRACKER_BASE_URL
    }
}

// ============================================================================
// Binding store mock
// ============================================================================

#[derive(Default)]
struct StoreInner {
    bindings: Vec<Binding>,
    next_id: i64,
    delta_token: String,
    watermark: Option<DateTime<Utc>>,
    token_writes: usize,
}

/// In-memory `BindingStore` with the same uniqueness contract as the
/// SQLite implementation.
#[derive(Default)]
pub struct InMemoryBindingStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryBindingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed a binding directly, bypassing the engine.
    pub fn seed(
        self: Arc<Self>,
        event_id: Option<&str>,
        issue_id: Option<&str>,
        event_updated_at: Option<DateTime<Utc>>,
        issue_updated_at: Option<DateTime<Utc>>,
    ) -> Arc<Self> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.bindings.push(Binding {
            id,
            event_id: event_id.map(str::to_string),
            issue_id: issue_id.map(str::to_string),
            event_updated_at,
            issue_updated_at,
        });
        drop(inner);
        self
    }

    pub fn bindings(&self) -> Vec<Binding> {
        self.inner.lock().unwrap().bindings.clone()
    }

    pub fn stored_delta_token(&self) -> String {
        self.inner.lock().unwrap().delta_token.clone()
    }

    /// Seed the stored token without counting it as an engine write.
    pub fn set_stored_delta_token(&self, token: &str) {
        self.inner.lock().unwrap().delta_token = token.to_string();
    }

    pub fn stored_watermark(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().unwrap().watermark
    }

    pub fn token_writes(&self) -> usize {
        self.inner.lock().unwrap().token_writes
    }
}

#[async_trait]
impl BindingStore for InMemoryBindingStore {
    async fn get_by_event_id(&self, event_id: &str) -> Result<Option<Binding>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.bindings.iter().find(|b| b.event_id.as_deref() == Some(event_id)).cloned())
    }

    async fn get_by_issue_id(&self, issue_id: &str) -> Result<Option<Binding>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.bindings.iter().find(|b| b.issue_id.as_deref() == Some(issue_id)).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Binding>> {
        Ok(self.inner.lock().unwrap().bindings.clone())
    }

    async fn create(&self, binding: &NewBinding) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        let duplicate = inner.bindings.iter().any(|existing| {
            (binding.event_id.is_some() && existing.event_id == binding.event_id)
                || (binding.issue_id.is_some() && existing.issue_id == binding.issue_id)
        });
        if duplicate {
            return Err(CalBridgeError::Conflict("remote id already bound".into()));
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.bindings.push(Binding {
            id,
            event_id: binding.event_id.clone(),
            issue_id: binding.issue_id.clone(),
            event_updated_at: binding.event_updated_at,
            issue_updated_at: binding.issue_updated_at,
        });
        Ok(id)
    }

    async fn update(&self, binding: &Binding) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.bindings.iter_mut().find(|b| b.id == binding.id) {
            Some(existing) => {
                *existing = binding.clone();
                Ok(())
            }
            None => Err(CalBridgeError::NotFound(format!("binding {}", binding.id))),
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.inner.lock().unwrap().bindings.retain(|b| b.id != id);
        Ok(())
    }

    async fn delta_token(&self) -> Result<String> {
        Ok(self.inner.lock().unwrap().delta_token.clone())
    }

    async fn set_delta_token(&self, token: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.delta_token = token.to_string();
        inner.token_writes += 1;
        Ok(())
    }

    async fn watermark(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.inner.lock().unwrap().watermark)
    }

    async fn set_watermark(&self, at: DateTime<Utc>) -> Result<()> {
        self.inner.lock().unwrap().watermark = Some(at);
        Ok(())
    }
}

// ============================================================================
// Engine wiring
// ============================================================================

pub fn engine(
    calendar: Arc<MockCalendar>,
    tracker: Arc<MockTracker>,
    store: Arc<InMemoryBindingStore>,
) -> SyncEngine {
    SyncEngine::new(
        calendar,
        tracker,
        store,
        SyncSettings {
            calendar_id: CALENDAR_ID.to_string(),
            write_project_id: WRITE_PROJECT.to_string(),
            query_project_id: QUERY_PROJECT.to_string(),
        },
    )
}
