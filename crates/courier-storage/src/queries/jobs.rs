// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job queue operations for crash-safe dispatch.

use chrono::{DateTime, Utc};
use courier_core::CourierError;
use courier_core::types::{Job, JobState, NewJob, QueueKind, QueueStats, RemoveOutcome};
use rusqlite::{OptionalExtension, params};

use crate::database::{
    Database, enum_column, format_ts, json_column, map_tr_err, opt_ts_column, to_json, ts_column,
};

const JOB_COLUMNS: &str = "id, queue, payload, priority, attempts_made, max_attempts, state, \
     progress, created_at, available_at, processed_at, finished_at, failure_reason, result";

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let result: Option<String> = row.get(13)?;
    Ok(Job {
        id: row.get(0)?,
        queue: enum_column(row, 1)?,
        payload: json_column(row, 2)?,
        priority: row.get(3)?,
        attempts_made: row.get(4)?,
        max_attempts: row.get(5)?,
        state: enum_column(row, 6)?,
        progress: row.get(7)?,
        created_at: ts_column(row, 8)?,
        available_at: ts_column(row, 9)?,
        processed_at: opt_ts_column(row, 10)?,
        finished_at: opt_ts_column(row, 11)?,
        failure_reason: row.get(12)?,
        result: result.and_then(|r| serde_json::from_str(&r).ok()),
    })
}

fn select_job(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<Job>> {
    conn.query_row(
        &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
        params![id],
        row_to_job,
    )
    .optional()
}

/// Persist a new job. Returns the stored record.
pub async fn insert_job(db: &Database, job: NewJob) -> Result<Job, CourierError> {
    let state = job.initial_state();
    db.connection()
        .call(move |conn| -> Result<Job, rusqlite::Error> {
            conn.execute(
                "INSERT INTO jobs (queue, payload, priority, max_attempts, state, created_at, available_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    job.queue.to_string(),
                    to_json(&job.payload)?,
                    job.priority,
                    job.max_attempts,
                    state.to_string(),
                    format_ts(job.created_at),
                    format_ts(job.available_at),
                ],
            )?;
            let id = conn.last_insert_rowid();
            select_job(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically claim the next eligible job of a queue.
///
/// Selects the highest-priority, oldest `waiting` job (or `delayed` job whose
/// `available_at` has passed) and marks it `active` in the same transaction.
pub async fn claim_next(
    db: &Database,
    queue: QueueKind,
    now: DateTime<Utc>,
) -> Result<Option<Job>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Option<Job>, rusqlite::Error> {
            let now = format_ts(now);
            let tx = conn.transaction()?;

            let next: Option<i64> = tx
                .query_row(
                    "SELECT id FROM jobs
                     WHERE queue = ?1
                       AND (state = 'waiting' OR (state = 'delayed' AND available_at <= ?2))
                     ORDER BY priority DESC, created_at ASC, id ASC
                     LIMIT 1",
                    params![queue.to_string(), now],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(id) = next else {
                tx.commit()?;
                return Ok(None);
            };

            tx.execute(
                "UPDATE jobs SET state = 'active', attempts_made = attempts_made + 1,
                 processed_at = ?2
                 WHERE id = ?1",
                params![id, now],
            )?;
            let job = select_job(&tx, id)?;
            tx.commit()?;
            Ok(job)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark an active job completed.
pub async fn complete_job(
    db: &Database,
    id: i64,
    result: Option<serde_json::Value>,
    now: DateTime<Utc>,
) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let result = result.as_ref().map(to_json).transpose()?;
            conn.execute(
                "UPDATE jobs SET state = 'completed', finished_at = ?2, result = ?3,
                 failure_reason = NULL
                 WHERE id = ?1 AND state = 'active'",
                params![id, format_ts(now), result],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Return an active job to `delayed` until `available_at`.
pub async fn retry_job(
    db: &Database,
    id: i64,
    reason: &str,
    available_at: DateTime<Utc>,
) -> Result<(), CourierError> {
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE jobs SET state = 'delayed', failure_reason = ?2, available_at = ?3
                 WHERE id = ?1 AND state = 'active'",
                params![id, reason, format_ts(available_at)],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark an active job permanently failed.
pub async fn fail_job(
    db: &Database,
    id: i64,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<(), CourierError> {
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE jobs SET state = 'failed', failure_reason = ?2, finished_at = ?3
                 WHERE id = ?1 AND state = 'active'",
                params![id, reason, format_ts(now)],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Return an interrupted job to `waiting` and refund its attempt.
pub async fn release_job(db: &Database, id: i64) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE jobs SET state = 'waiting', processed_at = NULL,
                 attempts_made = MAX(attempts_made - 1, 0)
                 WHERE id = ?1 AND state = 'active'",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn update_progress(db: &Database, id: i64, progress: u8) -> Result<(), CourierError> {
    let progress = progress.min(100);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE jobs SET progress = ?2 WHERE id = ?1",
                params![id, progress],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_job(db: &Database, id: i64) -> Result<Option<Job>, CourierError> {
    db.connection()
        .call(move |conn| select_job(conn, id))
        .await
        .map_err(map_tr_err)
}

/// List jobs of a queue, newest first.
pub async fn list_jobs(
    db: &Database,
    queue: QueueKind,
    state: Option<JobState>,
    offset: u64,
    limit: u64,
) -> Result<Vec<Job>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Job>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs
                 WHERE queue = ?1 AND (?2 IS NULL OR state = ?2)
                 ORDER BY id DESC
                 LIMIT ?3 OFFSET ?4"
            ))?;
            let rows = stmt.query_map(
                params![
                    queue.to_string(),
                    state.map(|s| s.to_string()),
                    limit as i64,
                    offset as i64
                ],
                row_to_job,
            )?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn queue_stats(db: &Database, queue: QueueKind) -> Result<QueueStats, CourierError> {
    db.connection()
        .call(move |conn| -> Result<QueueStats, rusqlite::Error> {
            let mut stmt =
                conn.prepare("SELECT state, COUNT(*) FROM jobs WHERE queue = ?1 GROUP BY state")?;
            let rows = stmt.query_map(params![queue.to_string()], |row| {
                Ok((enum_column::<JobState>(row, 0)?, row.get::<_, i64>(1)?))
            })?;
            let mut stats = QueueStats::default();
            for row in rows {
                let (state, count) = row?;
                stats.add(state, count as u64);
            }
            Ok(stats)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a job unless it is active.
pub async fn remove_job(
    db: &Database,
    queue: QueueKind,
    id: i64,
) -> Result<RemoveOutcome, CourierError> {
    db.connection()
        .call(move |conn| -> Result<RemoveOutcome, rusqlite::Error> {
            let tx = conn.transaction()?;
            let state: Option<JobState> = tx
                .query_row(
                    "SELECT state FROM jobs WHERE id = ?1 AND queue = ?2",
                    params![id, queue.to_string()],
                    |row| enum_column(row, 0),
                )
                .optional()?;
            let outcome = match state {
                None => RemoveOutcome::NotFound,
                Some(JobState::Active) => RemoveOutcome::Active,
                Some(_) => {
                    tx.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
                    RemoveOutcome::Removed
                }
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)
}

/// Earliest `available_at` among delayed jobs.
pub async fn next_available_at(
    db: &Database,
    queue: QueueKind,
) -> Result<Option<DateTime<Utc>>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
            conn.query_row(
                "SELECT MIN(available_at) FROM jobs WHERE queue = ?1 AND state = 'delayed'",
                params![queue.to_string()],
                |row| opt_ts_column(row, 0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Reset jobs left `active` by a crashed process.
///
/// Jobs with attempts remaining go back to `waiting`; exhausted ones fail.
pub async fn recover_stalled(
    db: &Database,
    queue: QueueKind,
    now: DateTime<Utc>,
) -> Result<u64, CourierError> {
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let tx = conn.transaction()?;
            let failed = tx.execute(
                "UPDATE jobs SET state = 'failed', finished_at = ?2,
                 failure_reason = 'job stalled and exhausted its attempts'
                 WHERE queue = ?1 AND state = 'active' AND attempts_made >= max_attempts",
                params![queue.to_string(), format_ts(now)],
            )?;
            let requeued = tx.execute(
                "UPDATE jobs SET state = 'waiting' WHERE queue = ?1 AND state = 'active'",
                params![queue.to_string()],
            )?;
            tx.commit()?;
            Ok((failed + requeued) as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Keep only the `keep` most recently finished jobs in `state`.
pub async fn prune_jobs(
    db: &Database,
    queue: QueueKind,
    state: JobState,
    keep: u64,
) -> Result<u64, CourierError> {
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let deleted = conn.execute(
                "DELETE FROM jobs
                 WHERE queue = ?1 AND state = ?2 AND id NOT IN (
                     SELECT id FROM jobs WHERE queue = ?1 AND state = ?2
                     ORDER BY finished_at DESC, id DESC
                     LIMIT ?3
                 )",
                params![queue.to_string(), state.to_string(), keep as i64],
            )?;
            Ok(deleted as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete jobs in `state` last touched before `older_than`. Never deletes active jobs.
pub async fn clean_jobs(
    db: &Database,
    queue: QueueKind,
    state: JobState,
    older_than: DateTime<Utc>,
) -> Result<u64, CourierError> {
    if state == JobState::Active {
        return Ok(0);
    }
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let deleted = conn.execute(
                "DELETE FROM jobs
                 WHERE queue = ?1 AND state = ?2
                   AND COALESCE(finished_at, created_at) < ?3",
                params![queue.to_string(), state.to_string(), format_ts(older_than)],
            )?;
            Ok(deleted as u64)
        })
        .await
        .map_err(map_tr_err)
}
