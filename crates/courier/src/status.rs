// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier status` command implementation.
//!
//! Reads queue, campaign and notification-target state straight from the
//! database, so it works whether or not `serve` is running.

use std::io::IsTerminal;
use std::path::Path;

use serde::Serialize;

use courier_config::model::CourierConfig;
use courier_core::traits::{ArtifactHistoryStore, CampaignStore, JobStore, NotificationTargetStore};
use courier_core::types::{ArtifactStats, CampaignStatus, QueueStats};
use courier_core::{CourierError, QueueKind};
use courier_storage::SqliteStorage;

/// Upper bound on running campaigns listed.
const RUNNING_CAMPAIGN_LIMIT: u64 = 20;

#[derive(Debug, Serialize)]
pub struct QueueLine {
    pub queue: QueueKind,
    #[serde(flatten)]
    pub stats: QueueStats,
}

#[derive(Debug, Serialize)]
pub struct CampaignLine {
    pub id: i64,
    pub name: String,
    pub progress: u8,
    pub sent_count: u32,
    pub failed_count: u32,
    pub total_recipients: u32,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub database: String,
    pub queues: Vec<QueueLine>,
    pub running_campaigns: Vec<CampaignLine>,
    pub targets_total: usize,
    pub targets_active: usize,
    pub artifacts: ArtifactStats,
}

pub async fn collect(
    storage: &SqliteStorage,
    database: &str,
) -> Result<StatusReport, CourierError> {
    let mut queues = Vec::with_capacity(QueueKind::ALL.len());
    for queue in QueueKind::ALL {
        queues.push(QueueLine {
            queue,
            stats: storage.queue_stats(queue).await?,
        });
    }

    let running_campaigns = storage
        .list_campaigns(Some(CampaignStatus::Running), 0, RUNNING_CAMPAIGN_LIMIT)
        .await?
        .into_iter()
        .map(|c| CampaignLine {
            id: c.id,
            progress: c.progress_percent(),
            name: c.name,
            sent_count: c.sent_count,
            failed_count: c.failed_count,
            total_recipients: c.total_recipients,
        })
        .collect();

    let targets = storage.list_targets(false).await?;
    Ok(StatusReport {
        database: database.to_string(),
        queues,
        running_campaigns,
        targets_total: targets.len(),
        targets_active: targets.iter().filter(|t| t.active).count(),
        artifacts: storage.artifact_stats().await?,
    })
}

/// Runs the `courier status` command.
pub async fn run_status(
    config: &CourierConfig,
    json: bool,
    plain: bool,
) -> Result<(), CourierError> {
    let path = &config.storage.database_path;
    if !Path::new(path).exists() {
        if json {
            println!("{}", serde_json::json!({ "database": path, "initialized": false }));
        } else {
            println!();
            println!("  courier status");
            println!("  {}", "-".repeat(35));
            println!("    No database at {path}");
            println!();
            println!("  Start with: courier serve");
            println!();
        }
        return Ok(());
    }

    let storage = SqliteStorage::open(&config.storage).await?;
    let report = collect(&storage, path).await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_report(&report, use_color);
    }
    Ok(())
}

fn print_report(report: &StatusReport, use_color: bool) {
    use colored::Colorize;

    println!();
    println!("  courier status");
    println!("  {}", "-".repeat(35));
    println!("    Database: {}", report.database);
    println!();
    println!(
        "    {:<14}{:>8}{:>8}{:>8}{:>10}{:>8}",
        "queue", "waiting", "active", "delayed", "completed", "failed"
    );
    for line in &report.queues {
        let failed = line.stats.failed.to_string();
        let failed = if use_color && line.stats.failed > 0 {
            failed.red().to_string()
        } else {
            failed
        };
        println!(
            "    {:<14}{:>8}{:>8}{:>8}{:>10}{:>8}",
            line.queue.to_string(),
            line.stats.waiting,
            line.stats.active,
            line.stats.delayed,
            line.stats.completed,
            failed
        );
    }

    println!();
    if report.running_campaigns.is_empty() {
        println!("    Campaigns: none running");
    } else {
        println!("    Running campaigns:");
        for c in &report.running_campaigns {
            println!(
                "      #{} {} {}% ({} sent, {} failed of {})",
                c.id, c.name, c.progress, c.sent_count, c.failed_count, c.total_recipients
            );
        }
    }
    println!(
        "    Targets:   {} active of {}",
        report.targets_active, report.targets_total
    );
    println!(
        "    QR codes:  {} generated, {:.1}% scanned",
        report.artifacts.total, report.artifacts.scan_rate
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::types::{MessageContent, NewCampaign, NewJob, QueuePriority};

    #[tokio::test]
    async fn report_reflects_database() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let now = chrono::Utc::now();
        storage
            .insert_job(NewJob {
                queue: QueueKind::Direct,
                payload: serde_json::json!({}),
                priority: QueuePriority::NORMAL,
                max_attempts: 3,
                created_at: now,
                available_at: now,
            })
            .await
            .unwrap();
        storage
            .insert_campaign(
                NewCampaign {
                    name: "promo".into(),
                    message: MessageContent::text("hi"),
                    recipients: vec!["628111222333".into()],
                    scheduled_at: None,
                },
                CampaignStatus::Running,
                now,
            )
            .await
            .unwrap();

        let report = collect(&storage, ":memory:").await.unwrap();
        assert_eq!(report.queues.len(), 3);
        assert_eq!(report.queues[0].stats.waiting, 1);
        assert_eq!(report.running_campaigns.len(), 1);
        assert_eq!(report.targets_total, 0);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["queues"][0]["queue"], "direct");
        assert_eq!(json["queues"][0]["waiting"], 1);
    }
}
