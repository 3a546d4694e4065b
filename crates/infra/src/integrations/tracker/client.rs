//! YouTrack REST client implementing the tracker port.
//!
//! Due dates travel as epoch milliseconds inside the `"Due Date"` custom
//! field; the delta query is bounded by a `updated: {since} .. {now}` range
//! formatted without a timezone offset at seconds precision.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use calbridge_core::TrackerPort;
use calbridge_domain::{
    CalBridgeError, CustomField, Issue, Result, TrackerConfig, DUE_DATE_FIELD,
};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::InfraError;

const API_PATH: &str = "/api";
const HTTP_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Server-accepted pattern: no timezone offset, seconds precision.
const QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const ISSUE_FIELDS: &str =
    "id,idReadable,summary,description,updated,project(id,name,shortName),customFields(id,name,value($type,name,value))";

/// YouTrack API client
pub struct YouTrackClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl YouTrackClient {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build().map_err(|err| {
            CalBridgeError::Internal(format!("failed to construct HTTP client: {err}"))
        })?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn issues_url(&self) -> String {
        format!("{}{}/issues", self.base_url, API_PATH)
    }
}

#[async_trait]
impl TrackerPort for YouTrackClient {
    async fn updated_issues(&self, project_id: &str, since: DateTime<Utc>) -> Result<Vec<Issue>> {
        let query = format!(
            "project:{} updated: {} .. {{now}}",
            project_id,
            since.format(QUERY_TIME_FORMAT)
        );
        debug!(%query, "fetching updated issues");

        let response = self
            .http
            .get(self.issues_url())
            .bearer_auth(&self.token)
            .query(&[("query", query.as_str()), ("fields", ISSUE_FIELDS)])
            .send()
            .await
            .map_err(|err| CalBridgeError::from(InfraError::from(err)))?;

        let response = check_success(response, "fetch updated issues").await?;
        let issues: Vec<IssueResource> = response.json().await.map_err(|err| {
            CalBridgeError::InvalidInput(format!("failed to parse issues response: {err}"))
        })?;
        Ok(issues.into_iter().map(IssueResource::into_domain).collect())
    }

    async fn deleted_issue_ids(
        &self,
        project_id: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        // The REST API offers no "deleted since" issue query, so deletions
        // are not observable from this adapter.
        debug!(project_id, "tracker exposes no deletion feed; returning empty set");
        Ok(Vec::new())
    }

    async fn create_issue(
        &self,
        project_id: &str,
        summary: &str,
        description: &str,
        due: Option<DateTime<Utc>>,
    ) -> Result<Issue> {
        let body = NewIssueBody {
            type_tag: "Issue",
            summary,
            description,
            project: ProjectRef { type_tag: "Project", id: project_id },
            custom_fields: due.map(|at| vec![due_date_field(Some(at))]),
        };

        let response = self
            .http
            .post(self.issues_url())
            .bearer_auth(&self.token)
            .query(&[("fields", ISSUE_FIELDS)])
            .json(&body)
            .send()
            .await
            .map_err(|err| CalBridgeError::from(InfraError::from(err)))?;

        let response = check_success(response, "create issue").await?;
        let resource: IssueResource = response.json().await.map_err(|err| {
            CalBridgeError::InvalidInput(format!("failed to parse created issue: {err}"))
        })?;
        Ok(resource.into_domain())
    }

    async fn update_issue(
        &self,
        issue_id: &str,
        summary: &str,
        description: &str,
        due: Option<DateTime<Utc>>,
    ) -> Result<()> {
        // The field is always sent: a null value clears the remote due date.
        let body = UpdateIssueBody {
            summary,
            description,
            custom_fields: vec![due_date_field(due)],
        };

        let response = self
            .http
            .post(format!("{}/{}", self.issues_url(), issue_id))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|err| CalBridgeError::from(InfraError::from(err)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CalBridgeError::NotFound(format!("issue {issue_id}")));
        }
        check_success(response, "update issue").await?;
        Ok(())
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
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
struct ProjectRef<'a> {
    #[serde(rename = "$type")]
    type_tag: &'static str,
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct DueDateFieldBody {
    #[serde(rename = "$type")]
    type_tag: &'static str,
    name: &'static str,
    value: Option<i64>,
}

fn due_date_field(due: Option<DateTime<Utc>>) -> DueDateFieldBody {
    DueDateFieldBody {
        type_tag: "DateIssueCustomField",
        name: DUE_DATE_FIELD,
        value: due.map(|at| at.timestamp_millis()),
    }
}

#[derive(Debug, Serialize)]
struct NewIssueBody<'a> {
    #[serde(rename = "$type")]
    type_tag: &'static str,
    summary: &'a str,
    description: &'a str,
    project: ProjectRef<'a>,
    #[serde(rename = "customFields", skip_serializing_if = "Option::is_none")]
    custom_fields: Option<Vec<DueDateFieldBody>>,
}

#[derive(Debug, Serialize)]
struct UpdateIssueBody<'a> {
    summary: &'a str,
    description: &'a str,
    #[serde(rename = "customFields")]
    custom_fields: Vec<DueDateFieldBody>,
}

#[derive(Debug, Deserialize)]
struct IssueResource {
    id: String,
    #[serde(rename = "idReadable", default)]
    id_readable: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    updated: Option<i64>,
    #[serde(rename = "customFields", default)]
    custom_fields: Vec<CustomFieldResource>,
}

#[derive(Debug, Deserialize)]
struct CustomFieldResource {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    value: serde_json::Value,
}

impl IssueResource {
    fn into_domain(self) -> Issue {
        let id_readable = self.id_readable.unwrap_or_else(|| self.id.clone());
        Issue {
            id: self.id,
            id_readable,
            summary: self.summary.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            updated: Utc
                .timestamp_millis_opt(self.updated.unwrap_or(0))
                .single()
                .unwrap_or(DateTime::UNIX_EPOCH),
            custom_fields: self
                .custom_fields
                .into_iter()
                .filter_map(|field| {
                    field.name.map(|name| CustomField { name, value: field.value })
                })
                .collect(),
        }
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
