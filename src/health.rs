//! Boot-time check for wake-ups the platform failed to deliver.

use serde::Serialize;

use crate::ledger::LedgerEntry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    /// The earliest ledger entry should have fired more than the tolerance ago.
    Overdue {
        scheduled_at: i64,
        reminder_id: Option<i32>,
        overdue_by_ms: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub checked_at: i64,
    pub status: HealthStatus,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthStatus::Ok)
    }

    pub fn warning_text(&self) -> Option<String> {
        match &self.status {
            HealthStatus::Ok => None,
            HealthStatus::Overdue { overdue_by_ms, .. } => Some(format!(
                "A scheduled reminder alarm was not delivered on time (late by {} s). \
                 The system may be dropping alarms, for example through battery saving.",
                overdue_by_ms / 1000
            )),
        }
    }
}

/// Judges the earliest pending ledger entry against `now`.
///
/// No entry, an entry in the future, or one late by at most
/// `tolerance_ms` is healthy.
pub fn assess(earliest: Option<&LedgerEntry>, now: i64, tolerance_ms: i64) -> HealthReport {
    let status = match earliest {
        Some(entry) if entry.scheduled_at < now - tolerance_ms => HealthStatus::Overdue {
            scheduled_at: entry.scheduled_at,
            reminder_id: entry.reminder_id,
            overdue_by_ms: now - entry.scheduled_at,
        },
        _ => HealthStatus::Ok,
    };
    HealthReport {
        checked_at: now,
        status,
    }
}
