//! Port interfaces for sync operations
//!
//! These traits define the boundaries between the synchronization engine
//! and infrastructure implementations.

use async_trait::async_trait;
use calbridge_domain::{Binding, CalendarEvent, Issue, NewBinding, Result};
use chrono::{DateTime, Utc};

/// One batch of calendar changes plus the cursor to replay next run.
#[derive(Debug, Clone)]
pub struct EventDelta {
    pub events: Vec<CalendarEvent>,
    /// Opaque token issued by the provider; non-empty on success and
    /// persisted as the run's commit point.
    pub next_delta_token: String,
}

/// Trait for calendar operations consumed by the engine
///
/// `fetch_events` with an empty `delta_token` performs a seeded sync over a
/// bounded recent window; a stale token is handled inside the adapter by
/// transparently re-running the full sync.
#[async_trait]
pub trait CalendarPort: Send + Sync {
    /// Fetch events changed since `delta_token`.
    async fn fetch_events(&self, calendar_id: &str, delta_token: &str) -> Result<EventDelta>;

    /// Create a whole-day event; `end` is the exclusive day after the last.
    async fn create_event(
        &self,
        calendar_id: &str,
        summary: &str,
        description: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CalendarEvent>;

    /// Update an existing event with the same whole-day semantics.
    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        summary: &str,
        description: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CalendarEvent>;

    /// Delete an event; deleting a missing event is not an error.
    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<()>;
}

/// Trait for issue tracker operations consumed by the engine
#[async_trait]
pub trait TrackerPort: Send + Sync {
    /// Issues in the project whose update instant is strictly after `since`.
    async fn updated_issues(&self, project_id: &str, since: DateTime<Utc>) -> Result<Vec<Issue>>;

    /// Ids of issues deleted in the same window.
    async fn deleted_issue_ids(
        &self,
        project_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>>;

    /// Create an issue; a due date is stored in the scheduled-date field.
    async fn create_issue(
        &self,
        project_id: &str,
        summary: &str,
        description: &str,
        due: Option<DateTime<Utc>>,
    ) -> Result<Issue>;

    /// Update an issue; `due = None` clears the due date on the remote.
    /// Fails with `NotFound` when the issue is gone.
    async fn update_issue(
        &self,
        issue_id: &str,
        summary: &str,
        description: &str,
        due: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Root URL used to compose back-links embedded in event descriptions.
    fn base_url(&self) -> &str;
}

/// Trait for the durable binding table and cursor slots
#[async_trait]
pub trait BindingStore: Send + Sync {
    async fn get_by_event_id(&self, event_id: &str) -> Result<Option<Binding>>;

    async fn get_by_issue_id(&self, issue_id: &str) -> Result<Option<Binding>>;

    /// Every binding; used by the cancellation scan.
    async fn list_all(&self) -> Result<Vec<Binding>>;

    /// Create a binding. Fails with `Conflict` when either remote id is
    /// already bound.
    async fn create(&self, binding: &NewBinding) -> Result<i64>;

    /// Overwrite a binding. Fails with `NotFound` for an unknown local id.
    async fn update(&self, binding: &Binding) -> Result<()>;

    /// Delete a binding; deleting an unknown id is not an error.
    async fn delete(&self, id: i64) -> Result<()>;

    /// Calendar delta token; the empty string denotes "never synced".
    async fn delta_token(&self) -> Result<String>;

    async fn set_delta_token(&self, token: &str) -> Result<()>;

    /// Tracker watermark; `None` denotes unset.
    async fn watermark(&self) -> Result<Option<DateTime<Utc>>>;

    async fn set_watermark(&self, at: DateTime<Utc>) -> Result<()>;
}
