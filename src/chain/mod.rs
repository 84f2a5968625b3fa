use std::sync::Arc;

use serde::Serialize;

use crate::config::ChainPolicy;
use crate::db::SqliteAsyncConn;
use crate::error::Result;
use crate::interfaces::notifier::NotificationPresenter;
use crate::interfaces::platform::{TimerGateway, WakePayload};
use crate::ledger::{self, LedgerEntry};
use crate::reminders;

pub mod plan;

pub use plan::{batch_titles, plan_next_alarm, ChainPlan, WakeTarget};

/// Result of one `set_next_alarm` pass, committed together with the caller's transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChainOutcome {
    /// Ledger entry for the wake-up now armed, if any.
    pub armed: Option<LedgerEntry>,
    pub target: Option<WakeTarget>,
    /// Ids marked notified by the catch-up batch.
    pub caught_up: Vec<i32>,
    /// Titles for the combined notification.
    pub batch_titles: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    ReminderMissing,
    GenerationMismatch { current: i64, delivered: i64 },
    AlreadyNotified,
}

/// What a delivered wake-up turned out to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered { reminder_id: i32, title: String },
    HorizonProbe,
    /// Superseded wake-up; dropped without notifying.
    Stale { reminder_id: i32, reason: StaleReason },
}

/// Keeps exactly one platform wake-up armed for the whole reminder queue.
///
/// Every method that touches storage takes the caller's connection so it
/// runs inside the caller's transaction; notifications are only emitted
/// through the `announce_*` methods once that transaction has committed.
pub struct AlarmChainManager {
    policy: ChainPolicy,
    gateway: Arc<dyn TimerGateway>,
    presenter: Arc<dyn NotificationPresenter>,
}

impl AlarmChainManager {
    pub fn new(
        policy: ChainPolicy,
        gateway: Arc<dyn TimerGateway>,
        presenter: Arc<dyn NotificationPresenter>,
    ) -> Self {
        Self {
            policy,
            gateway,
            presenter,
        }
    }

    pub fn policy(&self) -> &ChainPolicy {
        &self.policy
    }

    pub fn presenter(&self) -> &Arc<dyn NotificationPresenter> {
        &self.presenter
    }

    /// Catches up everything already due and arms the single next wake-up.
    ///
    /// `schedule` replaces whatever the gateway had armed, so a refused
    /// schedule leaves the previous wake-up in place for the rollback. The
    /// gateway is only cancelled when an armed wake-up is superseded and
    /// nothing takes its place.
    pub async fn set_next_alarm(&self, conn: &mut SqliteAsyncConn, now: i64) -> Result<ChainOutcome> {
        let superseded = ledger::clear(conn).await?;
        if superseded > 0 {
            tracing::debug!(superseded, "Cleared superseded ledger entries");
        }

        let pending = reminders::pending(conn).await?;
        let plan = plan_next_alarm(&pending, now, &self.policy);

        let mut caught_up = Vec::with_capacity(plan.catch_up.len());
        for reminder in &plan.catch_up {
            reminders::mark_notified(conn, reminder.id, now).await?;
            caught_up.push(reminder.id);
        }
        if !caught_up.is_empty() {
            tracing::info!(count = caught_up.len(), "Caught up reminders that are already due");
        }

        let armed = match plan.next {
            Some(target) => {
                let entry = ledger::record(conn, target.at(), target.reminder_id(), now).await?;
                self.gateway.schedule(target.at(), target.payload()).await?;
                match target {
                    WakeTarget::Reminder {
                        reminder_id,
                        generation,
                        at,
                    } => tracing::info!(
                        reminder_id,
                        generation,
                        scheduled_at = at,
                        "Armed wake-up for next reminder"
                    ),
                    WakeTarget::HorizonProbe { at } => tracing::info!(
                        scheduled_at = at,
                        "Next reminder is beyond the near-future window; armed horizon probe"
                    ),
                }
                Some(entry)
            }
            None if superseded > 0 => {
                self.gateway.cancel().await?;
                tracing::info!(superseded, "No future reminders; cancelled armed wake-up");
                None
            }
            None => {
                tracing::info!("No future reminders; no wake-up armed");
                None
            }
        };

        Ok(ChainOutcome {
            armed,
            target: plan.next,
            caught_up,
            batch_titles: plan.batch_titles(),
        })
    }

    /// Consumes a delivered wake-up: when it is still authoritative, drops
    /// its ledger entry and marks its reminder notified.
    ///
    /// A stale delivery leaves the ledger alone; whatever it records is still
    /// armed. The caller follows up with [`Self::set_next_alarm`] in the same
    /// transaction.
    pub async fn consume_wakeup(
        &self,
        conn: &mut SqliteAsyncConn,
        payload: WakePayload,
        now: i64,
    ) -> Result<DeliveryOutcome> {
        let Some(reminder_id) = payload.reminder_id else {
            ledger::consume(conn, None).await?;
            tracing::debug!("Horizon probe fired; re-deriving next wake-up");
            return Ok(DeliveryOutcome::HorizonProbe);
        };

        let stale = move |reason| DeliveryOutcome::Stale {
            reminder_id,
            reason,
        };
        let outcome = match reminders::get(conn, reminder_id).await? {
            None => stale(StaleReason::ReminderMissing),
            Some(reminder) if reminder.alarm_generation != payload.generation => {
                stale(StaleReason::GenerationMismatch {
                    current: reminder.alarm_generation,
                    delivered: payload.generation,
                })
            }
            Some(reminder) if reminder.notified => stale(StaleReason::AlreadyNotified),
            Some(reminder) => {
                ledger::consume(conn, Some(reminder.id)).await?;
                reminders::mark_notified(conn, reminder.id, now).await?;
                DeliveryOutcome::Delivered {
                    reminder_id: reminder.id,
                    title: reminder.title,
                }
            }
        };

        if let DeliveryOutcome::Stale {
            reminder_id,
            reason,
        } = &outcome
        {
            tracing::info!(
                reminder_id,
                generation = payload.generation,
                ?reason,
                "Discarding stale wake-up"
            );
        }
        Ok(outcome)
    }

    /// Re-arms the gateway from the committed ledger so the two agree again
    /// after a rolled-back operation.
    ///
    /// A reminder entry is armed with the reminder's current generation (0
    /// when it no longer exists), so a delivery that is no longer wanted
    /// comes back stale and triggers a recompute.
    pub async fn rearm_from_ledger(&self, conn: &mut SqliteAsyncConn) -> Result<Option<LedgerEntry>> {
        let Some(entry) = ledger::earliest(conn).await? else {
            self.gateway.cancel().await?;
            tracing::debug!("Ledger empty; gateway disarmed");
            return Ok(None);
        };

        let payload = match entry.reminder_id {
            None => WakePayload::horizon_probe(),
            Some(reminder_id) => {
                let generation = reminders::get(conn, reminder_id)
                    .await?
                    .map_or(0, |reminder| reminder.alarm_generation);
                WakePayload::for_reminder(reminder_id, generation)
            }
        };
        self.gateway.schedule(entry.scheduled_at, payload).await?;
        tracing::info!(
            scheduled_at = entry.scheduled_at,
            reminder_id = ?entry.reminder_id,
            generation = payload.generation,
            "Re-armed wake-up from ledger"
        );
        Ok(Some(entry))
    }

    /// Emits the combined notification for a committed catch-up batch.
    pub async fn announce_batch(&self, outcome: &ChainOutcome) {
        if outcome.batch_titles.is_empty() {
            return;
        }
        if let Err(err) = self.presenter.notify_batch(&outcome.batch_titles).await {
            tracing::warn!(
                error = %err,
                count = outcome.batch_titles.len(),
                "Unable to notify caught-up reminders"
            );
        }
    }

    pub async fn announce_delivery(&self, delivery: &DeliveryOutcome) {
        if let DeliveryOutcome::Delivered { reminder_id, title } = delivery {
            match self.presenter.notify_one(*reminder_id, title).await {
                Ok(()) => tracing::info!(reminder_id, "Reminder notified"),
                Err(err) => tracing::warn!(
                    error = %err,
                    reminder_id,
                    "Unable to notify reminder"
                ),
            }
        }
    }
}
