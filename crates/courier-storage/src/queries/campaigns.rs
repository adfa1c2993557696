// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign persistence and delivery-receipt bookkeeping.

use chrono::{DateTime, Utc};
use courier_core::CourierError;
use courier_core::types::{Campaign, CampaignStatus, NewCampaign};
use rusqlite::{OptionalExtension, params};

use crate::database::{
    Database, enum_column, format_opt_ts, format_ts, json_column, map_tr_err, opt_ts_column,
    to_json, ts_column,
};

const CAMPAIGN_COLUMNS: &str = "id, name, message, recipients, total_recipients, sent_count, \
     delivered_count, failed_count, status, scheduled_at, started_at, completed_at, created_at";

fn row_to_campaign(row: &rusqlite::Row<'_>) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        message: json_column(row, 2)?,
        recipients: json_column(row, 3)?,
        total_recipients: row.get(4)?,
        sent_count: row.get(5)?,
        delivered_count: row.get(6)?,
        failed_count: row.get(7)?,
        status: enum_column(row, 8)?,
        scheduled_at: opt_ts_column(row, 9)?,
        started_at: opt_ts_column(row, 10)?,
        completed_at: opt_ts_column(row, 11)?,
        created_at: ts_column(row, 12)?,
    })
}

fn select_campaign(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<Campaign>> {
    conn.query_row(
        &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
        params![id],
        row_to_campaign,
    )
    .optional()
}

pub async fn insert_campaign(
    db: &Database,
    campaign: NewCampaign,
    status: CampaignStatus,
    now: DateTime<Utc>,
) -> Result<Campaign, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Campaign, rusqlite::Error> {
            conn.execute(
                "INSERT INTO campaigns (name, message, recipients, total_recipients, status,
                                        scheduled_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    campaign.name,
                    to_json(&campaign.message)?,
                    to_json(&campaign.recipients)?,
                    campaign.recipients.len() as i64,
                    status.to_string(),
                    format_opt_ts(campaign.scheduled_at),
                    format_ts(now),
                ],
            )?;
            let id = conn.last_insert_rowid();
            select_campaign(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_campaign(db: &Database, id: i64) -> Result<Option<Campaign>, CourierError> {
    db.connection()
        .call(move |conn| select_campaign(conn, id))
        .await
        .map_err(map_tr_err)
}

/// List campaigns newest first.
pub async fn list_campaigns(
    db: &Database,
    status: Option<CampaignStatus>,
    offset: u64,
    limit: u64,
) -> Result<Vec<Campaign>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Campaign>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns
                 WHERE (?1 IS NULL OR status = ?1)
                 ORDER BY id DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt.query_map(
                params![status.map(|s| s.to_string()), limit as i64, offset as i64],
                row_to_campaign,
            )?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Overwrite the editable fields of a campaign.
pub async fn update_campaign(db: &Database, campaign: &Campaign) -> Result<(), CourierError> {
    let campaign = campaign.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE campaigns SET name = ?2, message = ?3, recipients = ?4,
                 total_recipients = ?5, scheduled_at = ?6, status = ?7
                 WHERE id = ?1",
                params![
                    campaign.id,
                    campaign.name,
                    to_json(&campaign.message)?,
                    to_json(&campaign.recipients)?,
                    campaign.recipients.len() as i64,
                    format_opt_ts(campaign.scheduled_at),
                    campaign.status.to_string(),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Compare-and-set status transition.
pub async fn transition_campaign(
    db: &Database,
    id: i64,
    from: &[CampaignStatus],
    to: CampaignStatus,
    now: DateTime<Utc>,
) -> Result<bool, CourierError> {
    let from: Vec<String> = from.iter().map(|s| s.to_string()).collect();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            let current: Option<String> = tx
                .query_row(
                    "SELECT status FROM campaigns WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            let allowed = current.is_some_and(|status| from.contains(&status));
            if allowed {
                let now = format_ts(now);
                let (started_at, completed_at) = match to {
                    CampaignStatus::Running => (Some(now), None),
                    s if s.is_terminal() => (None, Some(now)),
                    _ => (None, None),
                };
                tx.execute(
                    "UPDATE campaigns SET status = ?2,
                     started_at = COALESCE(?3, started_at),
                     completed_at = COALESCE(?4, completed_at)
                     WHERE id = ?1",
                    params![id, to.to_string(), started_at, completed_at],
                )?;
            }
            tx.commit()?;
            Ok(allowed)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn record_campaign_progress(
    db: &Database,
    id: i64,
    sent_count: u32,
    failed_count: u32,
) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE campaigns SET sent_count = ?2, failed_count = ?3 WHERE id = ?1",
                params![id, sent_count, failed_count],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_campaign(db: &Database, id: i64) -> Result<bool, CourierError> {
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let deleted = conn.execute("DELETE FROM campaigns WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn link_campaign_message(
    db: &Database,
    message_id: &str,
    campaign_id: i64,
) -> Result<(), CourierError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT OR IGNORE INTO campaign_messages (message_id, campaign_id)
                 VALUES (?1, ?2)",
                params![message_id, campaign_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Count a delivery receipt once per linked message.
pub async fn record_campaign_delivery(
    db: &Database,
    message_id: &str,
) -> Result<Option<i64>, CourierError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<i64>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let campaign_id: Option<i64> = tx
                .query_row(
                    "SELECT campaign_id FROM campaign_messages
                     WHERE message_id = ?1 AND delivered = 0",
                    params![message_id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(campaign_id) = campaign_id {
                tx.execute(
                    "UPDATE campaign_messages SET delivered = 1 WHERE message_id = ?1",
                    params![message_id],
                )?;
                tx.execute(
                    "UPDATE campaigns SET delivered_count = delivered_count + 1 WHERE id = ?1",
                    params![campaign_id],
                )?;
            }
            tx.commit()?;
            Ok(campaign_id)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::types::MessageContent;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("campaigns.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn new_campaign(recipients: &[&str]) -> NewCampaign {
        NewCampaign {
            name: "launch".into(),
            message: MessageContent::text("hello"),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            scheduled_at: None,
        }
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let created = insert_campaign(
            &db,
            new_campaign(&["628111222333", "628111222444"]),
            CampaignStatus::Draft,
            now,
        )
        .await
        .unwrap();
        assert_eq!(created.total_recipients, 2);
        assert_eq!(created.status, CampaignStatus::Draft);

        let fetched = get_campaign(&db, created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(get_campaign(&db, 999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let c = insert_campaign(&db, new_campaign(&["628111222333"]), CampaignStatus::Draft, now)
            .await
            .unwrap();

        let started = transition_campaign(
            &db,
            c.id,
            &[CampaignStatus::Draft, CampaignStatus::Scheduled],
            CampaignStatus::Running,
            now,
        )
        .await
        .unwrap();
        assert!(started);

        // A second start from draft is rejected.
        let again = transition_campaign(
            &db,
            c.id,
            &[CampaignStatus::Draft, CampaignStatus::Scheduled],
            CampaignStatus::Running,
            now,
        )
        .await
        .unwrap();
        assert!(!again);

        transition_campaign(
            &db,
            c.id,
            &[CampaignStatus::Running],
            CampaignStatus::Completed,
            now,
        )
        .await
        .unwrap();
        let done = get_campaign(&db, c.id).await.unwrap().unwrap();
        assert_eq!(done.status, CampaignStatus::Completed);
        assert!(done.started_at.is_some());
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn progress_and_delivery_counters() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let c = insert_campaign(
            &db,
            new_campaign(&["628111222333", "628111222444", "bad"]),
            CampaignStatus::Running,
            now,
        )
        .await
        .unwrap();

        record_campaign_progress(&db, c.id, 2, 1).await.unwrap();
        link_campaign_message(&db, "MSG1", c.id).await.unwrap();

        assert_eq!(record_campaign_delivery(&db, "MSG1").await.unwrap(), Some(c.id));
        // Receipts are counted once.
        assert_eq!(record_campaign_delivery(&db, "MSG1").await.unwrap(), None);
        assert_eq!(record_campaign_delivery(&db, "UNKNOWN").await.unwrap(), None);

        let updated = get_campaign(&db, c.id).await.unwrap().unwrap();
        assert_eq!(updated.sent_count, 2);
        assert_eq!(updated.failed_count, 1);
        assert_eq!(updated.delivered_count, 1);
    }

    #[tokio::test]
    async fn list_filters_by_status_and_delete() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let a = insert_campaign(&db, new_campaign(&["628111222333"]), CampaignStatus::Draft, now)
            .await
            .unwrap();
        insert_campaign(
            &db,
            new_campaign(&["628111222333"]),
            CampaignStatus::Scheduled,
            now,
        )
        .await
        .unwrap();

        let drafts = list_campaigns(&db, Some(CampaignStatus::Draft), 0, 10)
            .await
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(list_campaigns(&db, None, 0, 10).await.unwrap().len(), 2);

        assert!(delete_campaign(&db, a.id).await.unwrap());
        assert!(!delete_campaign(&db, a.id).await.unwrap());
    }
}
