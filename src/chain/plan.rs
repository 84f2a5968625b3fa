//! Pure single-timer policy: given the pending queue and the current time,
//! decide which reminders are already due and which one wake-up to arm.

use serde::Serialize;

use crate::config::ChainPolicy;
use crate::interfaces::platform::WakePayload;
use crate::reminders::Reminder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WakeTarget {
    /// Exact wake-up for the earliest future reminder.
    Reminder {
        reminder_id: i32,
        generation: i64,
        at: i64,
    },
    /// Re-check of the queue when nothing is due inside the near-future window.
    HorizonProbe { at: i64 },
}

impl WakeTarget {
    pub fn at(&self) -> i64 {
        match self {
            Self::Reminder { at, .. } | Self::HorizonProbe { at } => *at,
        }
    }

    pub fn reminder_id(&self) -> Option<i32> {
        match self {
            Self::Reminder { reminder_id, .. } => Some(*reminder_id),
            Self::HorizonProbe { .. } => None,
        }
    }

    pub fn payload(&self) -> WakePayload {
        match self {
            Self::Reminder {
                reminder_id,
                generation,
                ..
            } => WakePayload::for_reminder(*reminder_id, *generation),
            Self::HorizonProbe { .. } => WakePayload::horizon_probe(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainPlan {
    /// Reminders to mark notified right away, in scan order.
    pub catch_up: Vec<Reminder>,
    pub next: Option<WakeTarget>,
}

impl ChainPlan {
    pub fn batch_titles(&self) -> Vec<String> {
        batch_titles(&self.catch_up)
    }
}

/// Walks `pending` (earliest first) and stops at the first reminder that is
/// not yet due.
///
/// A reminder due at or before `now + lookahead` is caught up. The first one
/// past it gets an exact wake-up when due before `now + near_future_window`,
/// otherwise a horizon probe is placed at
/// `now + near_future_window - doze_margin`.
pub fn plan_next_alarm(pending: &[Reminder], now: i64, policy: &ChainPolicy) -> ChainPlan {
    let due_limit = now + policy.lookahead_ms;
    let near_future_limit = now + policy.near_future_window_ms;
    let mut plan = ChainPlan::default();

    for reminder in pending {
        if reminder.notified {
            continue;
        }
        if reminder.due_at <= due_limit {
            plan.catch_up.push(reminder.clone());
            continue;
        }

        let target = if reminder.due_at < near_future_limit {
            WakeTarget::Reminder {
                reminder_id: reminder.id,
                generation: reminder.alarm_generation,
                at: reminder.due_at,
            }
        } else {
            WakeTarget::HorizonProbe {
                at: policy.horizon_probe_at(now),
            }
        };
        plan.next = Some(target);
        break;
    }

    plan
}

/// Titles for the combined notification, deduplicated, first occurrence wins.
pub fn batch_titles(reminders: &[Reminder]) -> Vec<String> {
    let mut titles: Vec<String> = Vec::with_capacity(reminders.len());
    for reminder in reminders {
        if !titles.iter().any(|title| title == &reminder.title) {
            titles.push(reminder.title.clone());
        }
    }
    titles
}
