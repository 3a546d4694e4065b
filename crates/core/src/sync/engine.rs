//! Synchronization engine
//!
//! Single-pass reconciler between the tracker and the calendar. One run
//! loads the persisted cursors, ingests the delta from both sides,
//! classifies each change against the binding store, applies the resulting
//! create/update/delete calls through the ports, and finally advances the
//! cursors. Cursor advancement is the run's commit point: a run that fails
//! earlier leaves the cursors untouched and re-observes the same window
//! next time.

use std::collections::HashMap;
use std::sync::Arc;

use calbridge_domain::{
    CalBridgeError, CalendarEvent, EventStatus, Issue, NewBinding, Result, SyncReport,
};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, instrument, warn};

use super::ports::{BindingStore, CalendarPort, TrackerPort};

/// Window seeded on the very first run, when no tracker watermark exists.
const INITIAL_LOOKBACK_DAYS: i64 = 30;

/// Identifiers the engine reconciles between.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Calendar under reconciliation; `"primary"` for the default calendar.
    pub calendar_id: String,
    /// Project that receives issues created from calendar events.
    pub write_project_id: String,
    /// Project scope for the tracker delta query.
    pub query_project_id: String,
}

/// Reconciler between one tracker project and one calendar.
///
/// `sync` is safe to invoke repeatedly; the scheduler guarantees that no
/// two invocations overlap within a process.
pub struct SyncEngine {
    calendar: Arc<dyn CalendarPort>,
    tracker: Arc<dyn TrackerPort>,
    store: Arc<dyn BindingStore>,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        calendar: Arc<dyn CalendarPort>,
        tracker: Arc<dyn TrackerPort>,
        store: Arc<dyn BindingStore>,
        settings: SyncSettings,
    ) -> Self {
        Self { calendar, tracker, store, settings }
    }

    /// Perform one synchronization run.
    ///
    /// Infrastructure failures (cursor reads, the two delta fetches, the
    /// binding scan) propagate and leave the cursors untouched; failures on
    /// individual items are logged and skipped so the rest of the run makes
    /// progress.
    #[instrument(skip(self))]
    pub async fn sync(&self) -> Result<SyncReport> {
        let run_started_at = Utc::now();
        info!("starting synchronization run");

        let delta_token = self.store.delta_token().await?;
        let watermark = self
            .store
            .watermark()
            .await?
            .unwrap_or_else(|| run_started_at - Duration::days(INITIAL_LOOKBACK_DAYS));

        let delta = self.calendar.fetch_events(&self.settings.calendar_id, &delta_token).await?;
        let issues =
            self.tracker.updated_issues(&self.settings.query_project_id, watermark).await?;
        let deleted_ids =
            self.tracker.deleted_issue_ids(&self.settings.query_project_id, watermark).await?;

        let mut report = SyncReport {
            events_observed: delta.events.len(),
            issues_observed: issues.len(),
            ..SyncReport::default()
        };

        self.apply_calendar_events(&delta.events, &mut report).await;
        self.apply_tracker_issues(&issues, &mut report).await;
        self.apply_cancellations(&delta.events, &mut report).await?;
        self.apply_tracker_deletions(&deleted_ids, &mut report).await;

        if !delta.next_delta_token.is_empty() && delta.next_delta_token != delta_token {
            if let Err(err) = self.store.set_delta_token(&delta.next_delta_token).await {
                error!(error = %err, "failed to persist calendar delta token");
            }
        }
        if let Err(err) = self.store.set_watermark(run_started_at).await {
            error!(error = %err, "failed to persist tracker watermark");
        }

        info!(
            events = report.events_observed,
            issues = report.issues_observed,
            failed_items = report.items_failed,
            "synchronization run finished"
        );
        Ok(report)
    }

    /// Calendar → tracker pass over the delta batch.
    async fn apply_calendar_events(&self, events: &[CalendarEvent], report: &mut SyncReport) {
        for event in events {
            if event.status == EventStatus::Cancelled {
                continue;
            }
            if let Err(err) = self.apply_calendar_event(event, report).await {
                warn!(event_id = %event.id, error = %err, "skipping calendar event");
                report.items_failed += 1;
            }
        }
    }

    async fn apply_calendar_event(
        &self,
        event: &CalendarEvent,
        report: &mut SyncReport,
    ) -> Result<()> {
        match self.store.get_by_event_id(&event.id).await? {
            None => {
                info!(
                    event_id = %event.id,
                    summary = %event.summary,
                    "creating issue for new calendar event"
                );
                let issue = self
                    .tracker
                    .create_issue(
                        &self.settings.write_project_id,
                        &event.summary,
                        &event.html_link,
                        Some(event.start),
                    )
                    .await?;
                self.store
                    .create(&NewBinding {
                        event_id: Some(event.id.clone()),
                        issue_id: Some(issue.id.clone()),
                        event_updated_at: Some(event.updated),
                        issue_updated_at: Some(issue.updated),
                    })
                    .await?;
                report.issues_created += 1;
            }
            Some(mut binding) => {
                // Strict-greater keeps a re-observed timestamp from looping.
                if binding.event_updated_at.map_or(true, |seen| event.updated > seen) {
                    let issue_id = binding.issue_id.clone().ok_or_else(|| {
                        CalBridgeError::Internal(format!(
                            "binding {} for event {} has no issue id",
                            binding.id, event.id
                        ))
                    })?;
                    info!(event_id = %event.id, issue_id = %issue_id, "updating issue from calendar event");
                    self.tracker
                        .update_issue(
                            &issue_id,
                            &event.summary,
                            &event.html_link,
                            Some(event.start),
                        )
                        .await?;
                    binding.event_updated_at = Some(event.updated);
                    self.store.update(&binding).await?;
                    report.issues_updated += 1;
                }
            }
        }
        Ok(())
    }

    /// Tracker → calendar pass over the updated-issue batch.
    async fn apply_tracker_issues(&self, issues: &[Issue], report: &mut SyncReport) {
        for issue in issues {
            if let Err(err) = self.apply_tracker_issue(issue, report).await {
                warn!(issue_id = %issue.id, error = %err, "skipping tracker issue");
                report.items_failed += 1;
            }
        }
    }

    async fn apply_tracker_issue(&self, issue: &Issue, report: &mut SyncReport) -> Result<()> {
        let due = issue.due_date();

        match self.store.get_by_issue_id(&issue.id).await? {
            None => {
                // Undated issues never spawn calendar entries.
                let Some(due) = due else { return Ok(()) };

                info!(
                    issue_id = %issue.id,
                    summary = %issue.summary,
                    "creating calendar event for new dated issue"
                );
                let (start, end) = whole_day_window(due);
                let event = self
                    .calendar
                    .create_event(
                        &self.settings.calendar_id,
                        &issue.summary,
                        &self.issue_link(issue),
                        start,
                        end,
                    )
                    .await?;
                self.store
                    .create(&NewBinding {
                        event_id: Some(event.id.clone()),
                        issue_id: Some(issue.id.clone()),
                        event_updated_at: Some(event.updated),
                        issue_updated_at: Some(issue.updated),
                    })
                    .await?;
                report.events_created += 1;
            }
            Some(mut binding) => {
                if binding.issue_updated_at.map_or(true, |seen| issue.updated > seen) {
                    match due {
                        Some(due) => {
                            let event_id = binding.event_id.clone().ok_or_else(|| {
                                CalBridgeError::Internal(format!(
                                    "binding {} for issue {} has no event id",
                                    binding.id, issue.id
                                ))
                            })?;
                            info!(issue_id = %issue.id, event_id = %event_id, "updating calendar event from issue");
                            let (start, end) = whole_day_window(due);
                            self.calendar
                                .update_event(
                                    &self.settings.calendar_id,
                                    &event_id,
                                    &issue.summary,
                                    &self.issue_link(issue),
                                    start,
                                    end,
                                )
                                .await?;
                            report.events_updated += 1;
                        }
                        None => {
                            debug!(
                                issue_id = %issue.id,
                                "bound issue has no due date; leaving calendar event untouched"
                            );
                        }
                    }
                    binding.issue_updated_at = Some(issue.updated);
                    self.store.update(&binding).await?;
                }
            }
        }
        Ok(())
    }

    /// Cancellation pass: every binding is checked against the cancelled
    /// events of the current batch. The scan is not bounded to the event
    /// window, so bindings whose events were cancelled are found even when
    /// the active passes never touched them this run.
    async fn apply_cancellations(
        &self,
        events: &[CalendarEvent],
        report: &mut SyncReport,
    ) -> Result<()> {
        let cancelled: HashMap<&str, &CalendarEvent> = events
            .iter()
            .filter(|event| event.status == EventStatus::Cancelled)
            .map(|event| (event.id.as_str(), event))
            .collect();

        if cancelled.is_empty() {
            return Ok(());
        }

        for binding in self.store.list_all().await? {
            let Some(event_id) = binding.event_id.as_deref() else { continue };
            if !cancelled.contains_key(event_id) {
                continue;
            }

            info!(event_id, binding_id = binding.id, "calendar event cancelled; unbinding");
            if let Some(issue_id) = binding.issue_id.as_deref() {
                // The clear call also blanks summary and description.
                if let Err(err) = self.tracker.update_issue(issue_id, "", "", None).await {
                    warn!(issue_id, error = %err, "failed to clear due date on paired issue");
                    report.items_failed += 1;
                }
            }
            if let Err(err) = self.store.delete(binding.id).await {
                warn!(binding_id = binding.id, error = %err, "failed to delete binding");
                report.items_failed += 1;
                continue;
            }
            report.bindings_removed += 1;
        }
        Ok(())
    }

    /// Deletion pass: issues reported deleted take their paired events down.
    async fn apply_tracker_deletions(&self, deleted_ids: &[String], report: &mut SyncReport) {
        for issue_id in deleted_ids {
            if let Err(err) = self.apply_tracker_deletion(issue_id, report).await {
                warn!(issue_id = %issue_id, error = %err, "skipping tracker deletion");
                report.items_failed += 1;
            }
        }
    }

    async fn apply_tracker_deletion(&self, issue_id: &str, report: &mut SyncReport) -> Result<()> {
        let Some(binding) = self.store.get_by_issue_id(issue_id).await? else { return Ok(()) };
        let Some(event_id) = binding.event_id.as_deref() else { return Ok(()) };

        info!(issue_id, event_id, "tracker issue deleted; removing calendar event");
        if let Err(err) = self.calendar.delete_event(&self.settings.calendar_id, event_id).await {
            warn!(event_id, error = %err, "failed to delete calendar event");
            report.items_failed += 1;
        }
        self.store.delete(binding.id).await?;
        report.bindings_removed += 1;
        Ok(())
    }

    fn issue_link(&self, issue: &Issue) -> String {
        format!("{}/issue/{}", self.tracker.base_url(), issue.id)
    }
}

/// Map a due instant onto a whole-day window with an exclusive end.
fn whole_day_window(due: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (due, due + Duration::days(1))
}
