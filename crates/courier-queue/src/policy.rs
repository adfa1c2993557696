// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-queue retry and concurrency policy.

use std::time::Duration;

use courier_config::model::{QueueConfig, QueuePolicyConfig};
use courier_core::types::{QueueKind, QueuePriority};

/// Largest exponent applied to the backoff base.
const MAX_BACKOFF_SHIFT: u32 = 16;

/// Effective policy of one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub concurrency: usize,
    pub retain_completed: u64,
    pub retain_failed: u64,
    /// Priority of jobs enqueued without an explicit one.
    pub default_priority: i32,
}

impl QueuePolicy {
    pub fn from_config(queue: QueueKind, config: &QueuePolicyConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base(),
            concurrency: config.concurrency.max(1),
            retain_completed: config.retain_completed,
            retain_failed: config.retain_failed,
            default_priority: default_priority(queue),
        }
    }

    /// Delay before the next try once `attempts_made` tries have failed.
    pub fn backoff(&self, attempts_made: u32) -> Duration {
        backoff_delay(self.backoff_base, attempts_made)
    }
}

/// `base * 2^(attempts_made - 1)`, saturating.
///
/// `attempts_made` counts the attempt that just failed, so the first retry
/// waits exactly `base`.
pub fn backoff_delay(base: Duration, attempts_made: u32) -> Duration {
    let shift = attempts_made.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    base.saturating_mul(1u32 << shift)
}

pub fn default_priority(queue: QueueKind) -> i32 {
    match queue {
        QueueKind::Direct => QueuePriority::NORMAL,
        QueueKind::Campaign => QueuePriority::LOW,
        QueueKind::Notification => QueuePriority::HIGH,
    }
}

/// Policies of all three queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePolicies {
    pub direct: QueuePolicy,
    pub campaign: QueuePolicy,
    pub notification: QueuePolicy,
}

impl QueuePolicies {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            direct: QueuePolicy::from_config(QueueKind::Direct, &config.direct),
            campaign: QueuePolicy::from_config(QueueKind::Campaign, &config.campaign),
            notification: QueuePolicy::from_config(QueueKind::Notification, &config.notification),
        }
    }

    pub fn get(&self, queue: QueueKind) -> &QueuePolicy {
        match queue {
            QueueKind::Direct => &self.direct,
            QueueKind::Campaign => &self.campaign,
            QueueKind::Notification => &self.notification,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_follow_queue_config() {
        let policies = QueuePolicies::from_config(&QueueConfig::default());
        assert_eq!(policies.direct.max_attempts, 3);
        assert_eq!(policies.direct.backoff_base, Duration::from_secs(2));
        assert_eq!(policies.campaign.backoff_base, Duration::from_secs(3));
        assert_eq!(policies.notification.max_attempts, 5);
        assert_eq!(policies.notification.concurrency, 4);
        assert_eq!(policies.get(QueueKind::Notification).default_priority, 10);
        assert_eq!(policies.get(QueueKind::Campaign).default_priority, 1);
    }

    #[test]
    fn first_retries_of_direct_queue() {
        let base = Duration::from_millis(2000);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(4000));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(8000));
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let config = QueuePolicyConfig {
            max_attempts: 0,
            backoff_base_ms: 10,
            concurrency: 0,
            retain_completed: 1,
            retain_failed: 1,
        };
        let policy = QueuePolicy::from_config(QueueKind::Direct, &config);
        assert_eq!(policy.concurrency, 1);
        assert_eq!(policy.max_attempts, 1);
    }

    proptest! {
        #[test]
        fn backoff_doubles_per_attempt(base_ms in 1u64..10_000, k in 1u32..12) {
            let base = Duration::from_millis(base_ms);
            prop_assert_eq!(backoff_delay(base, k + 1), backoff_delay(base, k) * 2);
        }

        #[test]
        fn attempt_k_waits_base_times_two_to_k_minus_one(base_ms in 1u64..10_000, k in 1u32..12) {
            let expected = Duration::from_millis(base_ms * (1u64 << (k - 1)));
            prop_assert_eq!(backoff_delay(Duration::from_millis(base_ms), k), expected);
        }
    }
}
