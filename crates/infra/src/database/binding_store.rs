//! SQLite implementation of the binding store port
//!
//! Maps tracker issue ids to calendar event ids along with the last remote
//! update instants the engine has acted on, and holds the two durable
//! cursor slots.

use std::sync::Arc;

use async_trait::async_trait;
use calbridge_core::BindingStore;
use calbridge_domain::{Binding, CalBridgeError, NewBinding, Result as DomainResult};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Row};
use tokio::task;

use super::manager::{DbConnection, DbManager};
use crate::errors::InfraError;

/// SQLite-backed binding store
pub struct SqliteBindingStore {
    db: Arc<DbManager>,
}

impl SqliteBindingStore {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BindingStore for SqliteBindingStore {
    async fn get_by_event_id(&self, event_id: &str) -> DomainResult<Option<Binding>> {
        let db = Arc::clone(&self.db);
        let event_id = event_id.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<Binding>> {
            let conn = db.get_connection()?;
            query_binding(&conn, "SELECT id, event_id, issue_id, event_updated_at, issue_updated_at FROM bindings WHERE event_id = ?1", &event_id)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn get_by_issue_id(&self, issue_id: &str) -> DomainResult<Option<Binding>> {
        let db = Arc::clone(&self.db);
        let issue_id = issue_id.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<Binding>> {
            let conn = db.get_connection()?;
            query_binding(&conn, "SELECT id, event_id, issue_id, event_updated_at, issue_updated_at FROM bindings WHERE issue_id = ?1", &issue_id)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list_all(&self) -> DomainResult<Vec<Binding>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<Binding>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, event_id, issue_id, event_updated_at, issue_updated_at
                     FROM bindings ORDER BY id ASC",
                )
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map([], map_binding_row)
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?;
            Ok(rows)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn create(&self, binding: &NewBinding) -> DomainResult<i64> {
        let db = Arc::clone(&self.db);
        let binding = binding.clone();

        task::spawn_blocking(move || -> DomainResult<i64> {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO bindings (event_id, issue_id, event_updated_at, issue_updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    binding.event_id,
                    binding.issue_id,
                    to_millis(binding.event_updated_at),
                    to_millis(binding.issue_updated_at),
                ],
            )
            .map_err(map_sql_error)?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn update(&self, binding: &Binding) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let binding = binding.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            let rows = conn
                .execute(
                    "UPDATE bindings
                     SET event_id = ?1, issue_id = ?2, event_updated_at = ?3, issue_updated_at = ?4
                     WHERE id = ?5",
                    params![
                        binding.event_id,
                        binding.issue_id,
                        to_millis(binding.event_updated_at),
                        to_millis(binding.issue_updated_at),
                        binding.id,
                    ],
                )
                .map_err(map_sql_error)?;
            if rows == 0 {
                return Err(CalBridgeError::NotFound(format!("binding {}", binding.id)));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn delete(&self, id: i64) -> DomainResult<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            conn.execute("DELETE FROM bindings WHERE id = ?1", params![id])
                .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn delta_token(&self) -> DomainResult<String> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<String> {
            let conn = db.get_connection()?;
            match conn.query_row(
                "SELECT delta_token FROM sync_cursor WHERE id = 1",
                [],
                |row| row.get::<_, String>(0),
            ) {
                Ok(token) => Ok(token),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(String::new()),
                Err(err) => Err(map_sql_error(err)),
            }
        })
        .await
        .map_err(map_join_error)?
    }

    async fn set_delta_token(&self, token: &str) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let token = token.to_string();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            // Column-level upsert so the watermark slot is preserved.
            conn.execute(
                "INSERT INTO sync_cursor (id, delta_token) VALUES (1, ?1)
                 ON CONFLICT(id) DO UPDATE SET delta_token = excluded.delta_token",
                params![token],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn watermark(&self) -> DomainResult<Option<DateTime<Utc>>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Option<DateTime<Utc>>> {
            let conn = db.get_connection()?;
            match conn.query_row(
                "SELECT watermark FROM sync_cursor WHERE id = 1",
                [],
                |row| row.get::<_, Option<i64>>(0),
            ) {
                Ok(millis) => Ok(millis.and_then(from_millis)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(err) => Err(map_sql_error(err)),
            }
        })
        .await
        .map_err(map_join_error)?
    }

    async fn set_watermark(&self, at: DateTime<Utc>) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let millis = at.timestamp_millis();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO sync_cursor (id, watermark) VALUES (1, ?1)
                 ON CONFLICT(id) DO UPDATE SET watermark = excluded.watermark",
                params![millis],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

/* -------------------------------------------------------------------------- */
/* SQL operations (synchronous) */
/* -------------------------------------------------------------------------- */

fn query_binding(conn: &DbConnection, sql: &str, key: &str) -> DomainResult<Option<Binding>> {
    match conn.query_row(sql, params![key], map_binding_row) {
        Ok(binding) => Ok(Some(binding)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(err) => Err(map_sql_error(err)),
    }
}

fn map_binding_row(row: &Row<'_>) -> rusqlite::Result<Binding> {
    Ok(Binding {
        id: row.get(0)?,
        event_id: row.get(1)?,
        issue_id: row.get(2)?,
        event_updated_at: row.get::<_, Option<i64>>(3)?.and_then(from_millis),
        issue_updated_at: row.get::<_, Option<i64>>(4)?.and_then(from_millis),
    })
}

fn to_millis(at: Option<DateTime<Utc>>) -> Option<i64> {
    at.map(|t| t.timestamp_millis())
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

fn map_sql_error(err: rusqlite::Error) -> CalBridgeError {
    CalBridgeError::from(InfraError::from(err))
}

fn map_join_error(err: task::JoinError) -> CalBridgeError {
    if err.is_cancelled() {
        CalBridgeError::Internal("blocking task cancelled".into())
    } else {
        CalBridgeError::Internal(format!("blocking task failed: {err}"))
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn setup_store() -> (SqliteBindingStore, Arc<DbManager>, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("bindings.db");

        let manager = Arc::new(DbManager::new(&db_path, 4).expect("db manager created"));
        manager.run_migrations().expect("migrations run");

        let store = SqliteBindingStore::new(manager.clone());
        (store, manager, temp_dir)
    }

    fn sample_binding(event_id: &str, issue_id: &str) -> NewBinding {
        NewBinding {
            event_id: Some(event_id.to_string()),
            issue_id: Some(issue_id.to_string()),
            event_updated_at: from_millis(1_700_000_000_000),
            issue_updated_at: from_millis(1_700_000_000_000),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_and_get_by_both_ids() {
        let (store, _manager, _dir) = setup_store().await;

        let id = store.create(&sample_binding("ev-1", "yt-1")).await.expect("binding created");

        let by_event = store
            .get_by_event_id("ev-1")
            .await
            .expect("query succeeded")
            .expect("binding found");
        assert_eq!(by_event.id, id);
        assert_eq!(by_event.issue_id.as_deref(), Some("yt-1"));
        assert_eq!(by_event.event_updated_at, from_millis(1_700_000_000_000));

        let by_issue = store
            .get_by_issue_id("yt-1")
            .await
            .expect("query succeeded")
            .expect("binding found");
        assert_eq!(by_issue.id, id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_binding_returns_none() {
        let (store, _manager, _dir) = setup_store().await;

        assert!(store.get_by_event_id("nope").await.expect("query succeeded").is_none());
        assert!(store.get_by_issue_id("nope").await.expect("query succeeded").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_event_id_is_a_conflict() {
        let (store, _manager, _dir) = setup_store().await;

        store.create(&sample_binding("ev-1", "yt-1")).await.expect("first created");
        let err = store.create(&sample_binding("ev-1", "yt-2")).await.expect_err("second fails");
        assert!(matches!(err, CalBridgeError::Conflict(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_issue_id_is_a_conflict() {
        let (store, _manager, _dir) = setup_store().await;

        store.create(&sample_binding("ev-1", "yt-1")).await.expect("first created");
        let err = store.create(&sample_binding("ev-2", "yt-1")).await.expect_err("second fails");
        assert!(matches!(err, CalBridgeError::Conflict(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_overwrites_all_fields() {
        let (store, _manager, _dir) = setup_store().await;

        let id = store.create(&sample_binding("ev-1", "yt-1")).await.expect("created");
        let mut binding =
            store.get_by_event_id("ev-1").await.expect("query succeeded").expect("found");
        assert_eq!(binding.id, id);

        binding.event_updated_at = from_millis(1_700_000_600_000);
        store.update(&binding).await.expect("updated");

        let reread = store.get_by_event_id("ev-1").await.unwrap().expect("still present");
        assert_eq!(reread.event_updated_at, from_millis(1_700_000_600_000));
        // Fields the caller left alone keep their values.
        assert_eq!(reread.issue_updated_at, from_millis(1_700_000_000_000));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_unknown_id_is_not_found() {
        let (store, _manager, _dir) = setup_store().await;

        let binding = Binding {
            id: 4242,
            event_id: Some("ev-x".into()),
            issue_id: Some("yt-x".into()),
            event_updated_at: None,
            issue_updated_at: None,
        };
        let err = store.update(&binding).await.expect_err("update fails");
        assert!(matches!(err, CalBridgeError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_is_idempotent() {
        let (store, _manager, _dir) = setup_store().await;

        let id = store.create(&sample_binding("ev-1", "yt-1")).await.expect("created");
        store.delete(id).await.expect("first delete");
        store.delete(id).await.expect("second delete is not an error");

        assert!(store.get_by_event_id("ev-1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_all_returns_every_binding() {
        let (store, _manager, _dir) = setup_store().await;

        store.create(&sample_binding("ev-1", "yt-1")).await.expect("created");
        store.create(&sample_binding("ev-2", "yt-2")).await.expect("created");
        store
            .create(&NewBinding { event_id: Some("ev-3".into()), ..NewBinding::default() })
            .await
            .expect("created");

        let all = store.list_all().await.expect("listed");
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].issue_id, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cursor_slots_default_to_unset() {
        let (store, _manager, _dir) = setup_store().await;

        assert_eq!(store.delta_token().await.expect("token read"), "");
        assert_eq!(store.watermark().await.expect("watermark read"), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cursor_slots_round_trip() {
        let (store, _manager, _dir) = setup_store().await;

        store.set_delta_token("tok-1").await.expect("token written");
        assert_eq!(store.delta_token().await.unwrap(), "tok-1");

        let at = from_millis(1_700_000_000_000).unwrap();
        store.set_watermark(at).await.expect("watermark written");
        assert_eq!(store.watermark().await.unwrap(), Some(at));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn writing_one_cursor_slot_preserves_the_other() {
        let (store, _manager, _dir) = setup_store().await;

        let at = from_millis(1_700_000_000_000).unwrap();
        store.set_watermark(at).await.expect("watermark written");
        store.set_delta_token("tok-1").await.expect("token written");

        // The token upsert must not null out the watermark (and vice versa).
        assert_eq!(store.watermark().await.unwrap(), Some(at));
        assert_eq!(store.delta_token().await.unwrap(), "tok-1");

        let later = from_millis(1_700_000_600_000).unwrap();
        store.set_watermark(later).await.expect("watermark rewritten");
        assert_eq!(store.delta_token().await.unwrap(), "tok-1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_token_resets_to_never_synced() {
        let (store, _manager, _dir) = setup_store().await;

        store.set_delta_token("tok-1").await.expect("token written");
        store.set_delta_token("").await.expect("token cleared");
        assert_eq!(store.delta_token().await.unwrap(), "");
    }
}
