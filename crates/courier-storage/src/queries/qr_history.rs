// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential artifact (QR) history.

use chrono::{DateTime, Utc};
use courier_core::CourierError;
use courier_core::types::{ArtifactRecord, ArtifactStats, ArtifactStatus};
use rusqlite::params;

use crate::database::{Database, enum_column, format_ts, map_tr_err, opt_ts_column, ts_column};

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ArtifactRecord> {
    Ok(ArtifactRecord {
        id: row.get(0)?,
        status: enum_column(row, 1)?,
        generated_at: ts_column(row, 2)?,
        expires_at: ts_column(row, 3)?,
        scanned_at: opt_ts_column(row, 4)?,
    })
}

pub async fn insert_artifact(
    db: &Database,
    generated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<ArtifactRecord, CourierError> {
    db.connection()
        .call(move |conn| -> Result<ArtifactRecord, rusqlite::Error> {
            conn.execute(
                "INSERT INTO qr_history (status, generated_at, expires_at)
                 VALUES ('pending', ?1, ?2)",
                params![format_ts(generated_at), format_ts(expires_at)],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                "SELECT id, status, generated_at, expires_at, scanned_at
                 FROM qr_history WHERE id = ?1",
                params![id],
                row_to_record,
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Move a pending artifact to its final status.
pub async fn set_artifact_status(
    db: &Database,
    id: i64,
    status: ArtifactStatus,
    at: DateTime<Utc>,
) -> Result<(), CourierError> {
    let scanned_at = (status == ArtifactStatus::Scanned).then(|| format_ts(at));
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE qr_history SET status = ?2, scanned_at = COALESCE(?3, scanned_at)
                 WHERE id = ?1 AND status = 'pending'",
                params![id, status.to_string(), scanned_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_artifacts(
    db: &Database,
    limit: u64,
) -> Result<Vec<ArtifactRecord>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Vec<ArtifactRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, status, generated_at, expires_at, scanned_at
                 FROM qr_history ORDER BY generated_at DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], row_to_record)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn artifact_stats(db: &Database) -> Result<ArtifactStats, CourierError> {
    db.connection()
        .call(|conn| -> Result<ArtifactStats, rusqlite::Error> {
            let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM qr_history GROUP BY status")?;
            let rows = stmt.query_map([], |row| {
                Ok((enum_column::<ArtifactStatus>(row, 0)?, row.get::<_, i64>(1)?))
            })?;
            let (mut pending, mut scanned, mut expired) = (0, 0, 0);
            for row in rows {
                let (status, count) = row?;
                match status {
                    ArtifactStatus::Pending => pending = count as u64,
                    ArtifactStatus::Scanned => scanned = count as u64,
                    ArtifactStatus::Expired => expired = count as u64,
                }
            }
            Ok(ArtifactStats::new(pending, scanned, expired))
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_artifacts_before(
    db: &Database,
    cutoff: DateTime<Utc>,
) -> Result<u64, CourierError> {
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let deleted = conn.execute(
                "DELETE FROM qr_history WHERE generated_at < ?1",
                params![format_ts(cutoff)],
            )?;
            Ok(deleted as u64)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("qr.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn status_only_moves_from_pending() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let record = insert_artifact(&db, now, now + TimeDelta::seconds(60))
            .await
            .unwrap();
        assert_eq!(record.status, ArtifactStatus::Pending);

        set_artifact_status(&db, record.id, ArtifactStatus::Scanned, now)
            .await
            .unwrap();
        // A late expiry does not overwrite the scan.
        set_artifact_status(&db, record.id, ArtifactStatus::Expired, now)
            .await
            .unwrap();

        let history = list_artifacts(&db, 10).await.unwrap();
        assert_eq!(history[0].status, ArtifactStatus::Scanned);
        assert!(history[0].scanned_at.is_some());
    }

    #[tokio::test]
    async fn stats_compute_scan_rate() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        for i in 0..4 {
            let r = insert_artifact(&db, now, now).await.unwrap();
            let status = if i == 0 {
                ArtifactStatus::Scanned
            } else {
                ArtifactStatus::Expired
            };
            set_artifact_status(&db, r.id, status, now).await.unwrap();
        }
        let stats = artifact_stats(&db).await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.expired, 3);
        assert!((stats.scan_rate - 25.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn cleanup_removes_old_rows() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        insert_artifact(&db, now - TimeDelta::days(8), now - TimeDelta::days(8))
            .await
            .unwrap();
        insert_artifact(&db, now, now).await.unwrap();

        let removed = delete_artifacts_before(&db, now - TimeDelta::days(7))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(list_artifacts(&db, 10).await.unwrap().len(), 1);
    }
}
