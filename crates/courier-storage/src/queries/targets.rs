// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification target registry and delivery counters.

use chrono::{DateTime, Utc};
use courier_core::CourierError;
use courier_core::types::{NewNotificationTarget, NotificationTarget};
use rusqlite::{OptionalExtension, params};

use crate::database::{
    Database, format_ts, json_column, map_tr_err, opt_ts_column, to_json, ts_column,
};

/// Attempts assigned to targets registered without an explicit value.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Timeout assigned to targets registered without an explicit value.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

const TARGET_COLUMNS: &str = "id, name, endpoint_url, secret, subscribed_events, active, \
     retry_attempts, timeout_ms, success_count, failure_count, last_status, last_error, \
     last_triggered_at, created_at";

fn row_to_target(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationTarget> {
    let last_status: Option<String> = row.get(10)?;
    Ok(NotificationTarget {
        id: row.get(0)?,
        name: row.get(1)?,
        endpoint_url: row.get(2)?,
        secret: row.get(3)?,
        subscribed_events: json_column(row, 4)?,
        active: row.get(5)?,
        retry_attempts: row.get(6)?,
        timeout_ms: row.get::<_, i64>(7)? as u64,
        success_count: row.get::<_, i64>(8)? as u64,
        failure_count: row.get::<_, i64>(9)? as u64,
        last_status: last_status.and_then(|s| s.parse().ok()),
        last_error: row.get(11)?,
        last_triggered_at: opt_ts_column(row, 12)?,
        created_at: ts_column(row, 13)?,
    })
}

fn select_target(
    conn: &rusqlite::Connection,
    id: i64,
) -> rusqlite::Result<Option<NotificationTarget>> {
    conn.query_row(
        &format!("SELECT {TARGET_COLUMNS} FROM notification_targets WHERE id = ?1"),
        params![id],
        row_to_target,
    )
    .optional()
}

pub async fn insert_target(
    db: &Database,
    target: NewNotificationTarget,
    now: DateTime<Utc>,
) -> Result<NotificationTarget, CourierError> {
    db.connection()
        .call(move |conn| -> Result<NotificationTarget, rusqlite::Error> {
            conn.execute(
                "INSERT INTO notification_targets
                    (name, endpoint_url, secret, subscribed_events, retry_attempts, timeout_ms,
                     last_status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)",
                params![
                    target.name,
                    target.endpoint_url,
                    target.secret,
                    to_json(&target.subscribed_events)?,
                    target.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
                    target.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS) as i64,
                    format_ts(now),
                ],
            )?;
            let id = conn.last_insert_rowid();
            select_target(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_target(
    db: &Database,
    id: i64,
) -> Result<Option<NotificationTarget>, CourierError> {
    db.connection()
        .call(move |conn| select_target(conn, id))
        .await
        .map_err(map_tr_err)
}

pub async fn list_targets(
    db: &Database,
    active_only: bool,
) -> Result<Vec<NotificationTarget>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Vec<NotificationTarget>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TARGET_COLUMNS} FROM notification_targets
                 WHERE (?1 = 0 OR active = 1)
                 ORDER BY id ASC"
            ))?;
            let rows = stmt.query_map(params![active_only], row_to_target)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn update_target(db: &Database, target: &NotificationTarget) -> Result<(), CourierError> {
    let target = target.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE notification_targets SET name = ?2, endpoint_url = ?3, secret = ?4,
                 subscribed_events = ?5, retry_attempts = ?6, timeout_ms = ?7
                 WHERE id = ?1",
                params![
                    target.id,
                    target.name,
                    target.endpoint_url,
                    target.secret,
                    to_json(&target.subscribed_events)?,
                    target.retry_attempts,
                    target.timeout_ms as i64,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_target_active(db: &Database, id: i64, active: bool) -> Result<bool, CourierError> {
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let updated = conn.execute(
                "UPDATE notification_targets SET active = ?2 WHERE id = ?1",
                params![id, active],
            )?;
            Ok(updated > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_target(db: &Database, id: i64) -> Result<bool, CourierError> {
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let deleted =
                conn.execute("DELETE FROM notification_targets WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn record_delivery_success(
    db: &Database,
    id: i64,
    now: DateTime<Utc>,
) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE notification_targets SET success_count = success_count + 1,
                 last_status = 'success', last_error = NULL, last_triggered_at = ?2
                 WHERE id = ?1",
                params![id, format_ts(now)],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn record_delivery_failure(
    db: &Database,
    id: i64,
    error: &str,
    now: DateTime<Utc>,
) -> Result<(), CourierError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE notification_targets SET failure_count = failure_count + 1,
                 last_status = 'failed', last_error = ?2, last_triggered_at = ?3
                 WHERE id = ?1",
                params![id, error, format_ts(now)],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::types::DeliveryOutcome;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("targets.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn new_target(events: &[&str]) -> NewNotificationTarget {
        NewNotificationTarget {
            name: "crm".into(),
            endpoint_url: "https://example.com/hook".into(),
            secret: Some("s3cret".into()),
            subscribed_events: events.iter().map(|e| e.to_string()).collect(),
            retry_attempts: None,
            timeout_ms: None,
        }
    }

    #[tokio::test]
    async fn insert_applies_defaults() {
        let (db, _dir) = setup_db().await;
        let target = insert_target(&db, new_target(&["message.sent"]), Utc::now())
            .await
            .unwrap();
        assert!(target.active);
        assert_eq!(target.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(target.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(target.last_status, Some(DeliveryOutcome::Pending));
        assert!(target.subscribes_to("message.sent"));
        assert!(!target.subscribes_to("message.read"));
    }

    #[tokio::test]
    async fn toggling_filters_active_list() {
        let (db, _dir) = setup_db().await;
        let a = insert_target(&db, new_target(&["*"]), Utc::now()).await.unwrap();
        insert_target(&db, new_target(&["*"]), Utc::now()).await.unwrap();

        assert!(set_target_active(&db, a.id, false).await.unwrap());
        assert_eq!(list_targets(&db, true).await.unwrap().len(), 1);
        assert_eq!(list_targets(&db, false).await.unwrap().len(), 2);
        assert!(!set_target_active(&db, 999, true).await.unwrap());
    }

    #[tokio::test]
    async fn delivery_counters() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let t = insert_target(&db, new_target(&["*"]), now).await.unwrap();

        record_delivery_failure(&db, t.id, "HTTP 500", now).await.unwrap();
        let failed = get_target(&db, t.id).await.unwrap().unwrap();
        assert_eq!(failed.failure_count, 1);
        assert_eq!(failed.last_status, Some(DeliveryOutcome::Failed));
        assert_eq!(failed.last_error.as_deref(), Some("HTTP 500"));

        record_delivery_success(&db, t.id, now).await.unwrap();
        let ok = get_target(&db, t.id).await.unwrap().unwrap();
        assert_eq!(ok.success_count, 1);
        assert_eq!(ok.failure_count, 1);
        assert_eq!(ok.last_status, Some(DeliveryOutcome::Success));
        assert!(ok.last_error.is_none());
        assert!(ok.last_triggered_at.is_some());
    }

    #[tokio::test]
    async fn update_and_delete() {
        let (db, _dir) = setup_db().await;
        let mut t = insert_target(&db, new_target(&["*"]), Utc::now()).await.unwrap();
        t.name = "renamed".into();
        t.retry_attempts = 7;
        update_target(&db, &t).await.unwrap();
        let fetched = get_target(&db, t.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "renamed");
        assert_eq!(fetched.retry_attempts, 7);

        assert!(delete_target(&db, t.id).await.unwrap());
        assert!(get_target(&db, t.id).await.unwrap().is_none());
    }
}
