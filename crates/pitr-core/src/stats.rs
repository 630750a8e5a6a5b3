//! Read-only aggregates over change logs, backups and rollbacks.

use crate::model::{BackupJob, BackupStatus, ChangeLogEntry, ChangeOperation};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Change counts for a point-in-time window
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PitrStats {
    pub insert_count: u64,
    pub update_count: u64,
    pub delete_count: u64,
    /// Sorted, de-duplicated
    pub affected_tables: Vec<String>,
    pub earliest_change: Option<DateTime<Utc>>,
    pub latest_change: Option<DateTime<Utc>>,
    pub total_operations: u64,
}

impl PitrStats {
    /// Fold one entry into the totals.
    pub fn record(&mut self, entry: &ChangeLogEntry) {
        match entry.operation {
            ChangeOperation::Insert => self.insert_count += 1,
            ChangeOperation::Update => self.update_count += 1,
            ChangeOperation::Delete => self.delete_count += 1,
        }
        self.total_operations += 1;
        if let Err(pos) = self.affected_tables.binary_search(&entry.table_name) {
            self.affected_tables.insert(pos, entry.table_name.clone());
        }
        self.earliest_change = Some(match self.earliest_change {
            Some(t) => t.min(entry.changed_at),
            None => entry.changed_at,
        });
        self.latest_change = Some(match self.latest_change {
            Some(t) => t.max(entry.changed_at),
            None => entry.changed_at,
        });
    }
}

impl<'a> FromIterator<&'a ChangeLogEntry> for PitrStats {
    fn from_iter<I: IntoIterator<Item = &'a ChangeLogEntry>>(iter: I) -> Self {
        let mut stats = PitrStats::default();
        for entry in iter {
            stats.record(entry);
        }
        stats
    }
}

/// Backup health aggregates for one tenant
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BackupStatistics {
    pub successes: u64,
    pub failures: u64,
    pub running: u64,
    /// Mean duration of completed jobs in milliseconds
    pub avg_duration_ms: Option<i64>,
    pub total_size_bytes: u64,
    pub last_backup_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl BackupStatistics {
    pub fn from_jobs(jobs: &[BackupJob]) -> Self {
        let mut stats = BackupStatistics::default();
        let mut durations = Vec::new();
        for job in jobs {
            match job.status {
                BackupStatus::Completed => {
                    stats.successes += 1;
                    stats.total_size_bytes += job.size_bytes;
                    if let Some(d) = job.duration() {
                        durations.push(d.num_milliseconds());
                    }
                    let done = job.completed_at.unwrap_or(job.started_at);
                    stats.last_success_at = Some(stats.last_success_at.map_or(done, |t| t.max(done)));
                }
                BackupStatus::Failed => stats.failures += 1,
                BackupStatus::Running => stats.running += 1,
            }
            stats.last_backup_at = Some(
                stats
                    .last_backup_at
                    .map_or(job.started_at, |t| t.max(job.started_at)),
            );
        }
        if !durations.is_empty() {
            stats.avg_duration_ms = Some(durations.iter().sum::<i64>() / durations.len() as i64);
        }
        stats
    }

    pub fn finished(&self) -> u64 {
        self.successes + self.failures
    }
}

/// Terminal rollback outcomes for one tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RollbackCounts {
    pub completed: u64,
    pub failed: u64,
}

/// Health score in `0..=100`.
///
/// - 60 points scaled by the backup success rate
/// - 20 points scaled by the rollback success rate (full marks when no
///   rollback has run)
/// - 20 points if the last successful backup is under a day old, 10 if
///   under a week old
///
/// A tenant with no backup and no rollback history scores 0.
pub fn health_score(
    backups: &BackupStatistics,
    rollbacks: RollbackCounts,
    now: DateTime<Utc>,
) -> u8 {
    let rollback_total = rollbacks.completed + rollbacks.failed;
    if backups.finished() == 0 && rollback_total == 0 {
        return 0;
    }

    let backup_points = if backups.finished() == 0 {
        0.0
    } else {
        60.0 * backups.successes as f64 / backups.finished() as f64
    };
    let rollback_points = if rollback_total == 0 {
        20.0
    } else {
        20.0 * rollbacks.completed as f64 / rollback_total as f64
    };
    let recency_points = match backups.last_success_at {
        Some(at) if now - at <= Duration::hours(24) => 20.0,
        Some(at) if now - at <= Duration::days(7) => 10.0,
        _ => 0.0,
    };

    (backup_points + rollback_points + recency_points)
        .round()
        .clamp(0.0, 100.0) as u8
}
