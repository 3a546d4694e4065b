//! Google Calendar API client implementing the calendar port.
//!
//! Delta fetches page through continuation tokens and only surface the new
//! sync token once pagination is exhausted. A token the server reports gone
//! (HTTP 410) triggers a transparent full re-sync over the seeded window.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use calbridge_core::{CalendarPort, EventDelta};
use calbridge_domain::{CalBridgeError, CalendarEvent, EventStatus, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::oauth::TokenManager;
use crate::errors::InfraError;

const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const HTTP_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Window covered by a seeded sync when no delta token exists yet.
const SEED_WINDOW_DAYS: i64 = 30;

/// Google Calendar provider
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
    api_base: String,
}

impl GoogleCalendarClient {
    pub fn new(tokens: Arc<TokenManager>) -> Result<Self> {
        Self::with_api_base(tokens, GOOGLE_CALENDAR_API_BASE)
    }

    fn with_api_base(tokens: Arc<TokenManager>, api_base: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build().map_err(|err| {
            CalBridgeError::Internal(format!("failed to construct HTTP client: {err}"))
        })?;
        Ok(Self { http, tokens, api_base: api_base.into() })
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!("{}/calendars/{}/events", self.api_base, calendar_id)
    }

    /// Fetch one complete window (all pages) for the given token.
    async fn fetch_window(
        &self,
        calendar_id: &str,
        delta_token: &str,
    ) -> std::result::Result<EventDelta, WindowFetchError> {
        let access_token =
            self.tokens.access_token().await.map_err(WindowFetchError::Failed)?;
        let url = self.events_url(calendar_id);

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params: Vec<(&str, String)> = vec![
                ("showDeleted", "true".to_string()),
                ("singleEvents", "false".to_string()),
            ];
            if delta_token.is_empty() {
                let time_min = Utc::now() - Duration::days(SEED_WINDOW_DAYS);
                params.push(("timeMin", time_min.to_rfc3339()));
            } else {
                params.push(("syncToken", delta_token.to_string()));
            }
            if let Some(ref token) = page_token {
                params.push(("pageToken", token.clone()));
            }

            let response = self
                .http
                .get(&url)
                .bearer_auth(&access_token)
                .query(&params)
                .send()
                .await
                .map_err(|err| WindowFetchError::Failed(InfraError::from(err).into()))?;

            if response.status() == StatusCode::GONE {
                return Err(WindowFetchError::TokenExpired);
            }
            if !response.status().is_success() {
                let status = response.status();
                let body =
                    response.text().await.unwrap_or_else(|_| "unknown error".to_string());
                return Err(WindowFetchError::Failed(CalBridgeError::Network(format!(
                    "calendar API error ({status}): {body}"
                ))));
            }

            let page: EventsPage = response.json().await.map_err(|err| {
                WindowFetchError::Failed(CalBridgeError::InvalidInput(format!(
                    "failed to parse calendar response: {err}"
                )))
            })?;

            events.extend(page.items.into_iter().map(EventResource::into_domain));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => {
                    debug!(count = events.len(), "calendar window fetch complete");
                    return Ok(EventDelta {
                        events,
                        next_delta_token: page.next_sync_token.unwrap_or_default(),
                    });
                }
            }
        }
    }
}

#[async_trait]
impl CalendarPort for GoogleCalendarClient {
    async fn fetch_events(&self, calendar_id: &str, delta_token: &str) -> Result<EventDelta> {
        let mut token = delta_token.to_string();
        loop {
            match self.fetch_window(calendar_id, &token).await {
                Ok(delta) => return Ok(delta),
                Err(WindowFetchError::TokenExpired) if !token.is_empty() => {
                    warn!(calendar_id, "delta token rejected by server; running full window sync");
                    token.clear();
                }
                Err(WindowFetchError::TokenExpired) => {
                    return Err(CalBridgeError::Network(
                        "calendar rejected the seeded window sync".into(),
                    ));
                }
                Err(WindowFetchError::Failed(err)) => return Err(err),
            }
        }
    }

    async fn create_event(
        &self,
        calendar_id: &str,
        summary: &str,
        description: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CalendarEvent> {
        let access_token = self.tokens.access_token().await?;
        let response = self
            .http
            .post(self.events_url(calendar_id))
            .bearer_auth(&access_token)
            .json(&EventWriteBody::whole_day(summary, description, start, end))
            .send()
            .await
            .map_err(|err| CalBridgeError::from(InfraError::from(err)))?;

        let response = check_success(response, "create event").await?;
        let resource: EventResource = response.json().await.map_err(|err| {
            CalBridgeError::InvalidInput(format!("failed to parse created event: {err}"))
        })?;
        Ok(resource.into_domain())
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        summary: &str,
        description: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CalendarEvent> {
        let access_token = self.tokens.access_token().await?;
        let response = self
            .http
            .put(format!("{}/{}", self.events_url(calendar_id), event_id))
            .bearer_auth(&access_token)
            .json(&EventWriteBody::whole_day(summary, description, start, end))
            .send()
            .await
            .map_err(|err| CalBridgeError::from(InfraError::from(err)))?;

        let response = check_success(response, "update event").await?;
        let resource: EventResource = response.json().await.map_err(|err| {
            CalBridgeError::InvalidInput(format!("failed to parse updated event: {err}"))
        })?;
        Ok(resource.into_domain())
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<()> {
        let access_token = self.tokens.access_token().await?;
        let response = self
            .http
            .delete(format!("{}/{}", self.events_url(calendar_id), event_id))
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|err| CalBridgeError::from(InfraError::from(err)))?;

        // Already-gone events count as deleted.
        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            debug!(event_id, "event already gone on delete");
            return Ok(());
        }
        check_success(response, "delete event").await?;
        Ok(())
    }
}

enum WindowFetchError {
    TokenExpired,
    Failed(CalBridgeError),
}

async fn check_success(
    response: reqwest::Response,
    operation: &str,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
    Err(CalBridgeError::Network(format!("{operation} failed ({status}): {body}")))
}

/* -------------------------------------------------------------------------- */
/* Wire types */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Serialize)]
struct EventWriteBody<'a> {
    summary: &'a str,
    description: &'a str,
    start: DateBody,
    end: DateBody,
}

impl<'a> EventWriteBody<'a> {
    fn whole_day(
        summary: &'a str,
        description: &'a str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            summary,
            description,
            start: DateBody { date: start.format("%Y-%m-%d").to_string() },
            end: DateBody { date: end.format("%Y-%m-%d").to_string() },
        }
    }
}

#[derive(Debug, Serialize)]
struct DateBody {
    date: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    items: Vec<EventResource>,
    next_page_token: Option<String>,
    next_sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventResource {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    html_link: Option<String>,
    #[serde(default)]
    start: Option<EventTime>,
    #[serde(default)]
    end: Option<EventTime>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<String>,
    date: Option<String>,
}

impl EventResource {
    fn into_domain(self) -> CalendarEvent {
        // Cancelled delta entries arrive stripped to id and status; their
        // remaining fields fall back to neutral defaults.
        let status = match self.status.as_deref() {
            Some("cancelled") => EventStatus::Cancelled,
            _ => EventStatus::Active,
        };

        CalendarEvent {
            id: self.id,
            summary: self.summary.unwrap_or_default(),
            html_link: self.html_link.unwrap_or_default(),
            start: parse_event_time(self.start.as_ref()),
            end: parse_event_time(self.end.as_ref()),
            status,
            updated: self
                .updated
                .as_deref()
                .and_then(parse_rfc3339)
                .unwrap_or(DateTime::UNIX_EPOCH),
        }
    }
}

fn parse_event_time(value: Option<&EventTime>) -> DateTime<Utc> {
    let Some(value) = value else { return DateTime::UNIX_EPOCH };
    if let Some(parsed) = value.date_time.as_deref().and_then(parse_rfc3339) {
        return parsed;
    }
    if let Some(date) = value.date.as_deref() {
        if let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            if let Some(midnight) = parsed.and_hms_opt(0, 0, 0) {
                return midnight.and_utc();
            }
        }
    }
    DateTime::UNIX_EPOCH
}

fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value).ok().map(|parsed| parsed.with_timezone(&Utc))
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
