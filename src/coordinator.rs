use std::sync::Arc;

use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::AsyncConnection;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};

use crate::chain::{AlarmChainManager, ChainOutcome, DeliveryOutcome};
use crate::clock::{Clock, SystemClock};
use crate::config::ChainConfig;
use crate::db::{Database, SqliteAsyncConn};
use crate::error::{ReminderChainError, Result};
use crate::exchange::{self, ImportSummary};
use crate::health::{self, HealthReport};
use crate::interfaces::notifier::NotificationPresenter;
use crate::interfaces::platform::{TimerGateway, WakePayload};
use crate::ledger::{self, AlarmLedger};
use crate::reminders::{self, normalize_title, Reminder, ReminderStore};
use crate::wake_lock::WakeLock;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Fractional progress sink for bulk operations, called with values in `0.0..=1.0`.
pub type Progress<'a> = &'a (dyn Fn(f32) + Send + Sync);

/// Published after every committed mutation so open views can refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChangeEvent {
    Created { reminder_id: i32 },
    Updated { reminder_id: i32, generation: i64 },
    Deleted { reminder_id: i32 },
    Delivered { reminder_id: i32 },
    CaughtUp { reminder_ids: Vec<i32> },
    Imported { imported: usize, skipped: usize },
    Cleared { deleted: usize },
}

/// Entry point for every operation that mutates reminders or scheduling state.
///
/// All of them run one at a time under a single async mutex, each inside one
/// database transaction that also re-derives the next wake-up.
pub struct ReminderService {
    db: Database,
    chain: AlarmChainManager,
    clock: Arc<dyn Clock>,
    wake_lock: WakeLock,
    work: Mutex<()>,
    events: broadcast::Sender<ChangeEvent>,
    default_title: String,
    health_tolerance_ms: i64,
}

impl ReminderService {
    pub fn new(
        db: Database,
        config: &ChainConfig,
        gateway: Arc<dyn TimerGateway>,
        presenter: Arc<dyn NotificationPresenter>,
    ) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            db,
            chain: AlarmChainManager::new(config.policy, gateway, presenter),
            clock: Arc::new(SystemClock),
            wake_lock: WakeLock::default(),
            work: Mutex::new(()),
            events,
            default_title: config.default_title.clone(),
            health_tolerance_ms: config.policy.health_tolerance_ms,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_wake_lock(mut self, wake_lock: WakeLock) -> Self {
        self.wake_lock = wake_lock;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> ReminderStore {
        ReminderStore::new(self.db.clone())
    }

    pub fn ledger(&self) -> AlarmLedger {
        AlarmLedger::new(self.db.clone())
    }

    pub fn wake_lock(&self) -> &WakeLock {
        &self.wake_lock
    }

    pub async fn create_reminder(&self, title: &str, body: &str, due_at: i64) -> Result<Reminder> {
        let _work = self.work.lock().await;
        let now = self.clock.now_ms();
        let title = normalize_title(title, &self.default_title).to_string();
        let chain = &self.chain;

        let mut pooled = self.db.conn().await?;
        let conn: &mut SqliteAsyncConn = &mut pooled;
        let result = conn
            .transaction::<_, ReminderChainError, _>(|conn| {
                async move {
                    let reminder = reminders::insert(conn, &title, body, due_at, false, now).await?;
                    let outcome = chain.set_next_alarm(conn, now).await?;
                    Ok((reminder, outcome))
                }
                .scope_boxed()
            })
            .await;
        let (reminder, outcome) = match result {
            Ok(done) => done,
            Err(err) => return self.rolled_back(conn, "create", err).await,
        };

        tracing::info!(reminder_id = reminder.id, due_at, "Reminder created");
        self.publish(ChangeEvent::Created {
            reminder_id: reminder.id,
        });
        self.finish_recompute(&outcome).await;
        Ok(reminder)
    }

    /// Rewrites a reminder and returns its new generation.
    pub async fn update_reminder(
        &self,
        id: i32,
        title: &str,
        body: &str,
        due_at: i64,
    ) -> Result<i64> {
        let _work = self.work.lock().await;
        let now = self.clock.now_ms();
        let title = normalize_title(title, &self.default_title).to_string();
        let chain = &self.chain;

        let mut pooled = self.db.conn().await?;
        let conn: &mut SqliteAsyncConn = &mut pooled;
        let result = conn
            .transaction::<_, ReminderChainError, _>(|conn| {
                async move {
                    let generation = reminders::update(conn, id, &title, body, due_at, now).await?;
                    let outcome = chain.set_next_alarm(conn, now).await?;
                    Ok((generation, outcome))
                }
                .scope_boxed()
            })
            .await;
        let (generation, outcome) = match result {
            Ok(done) => done,
            Err(err) => return self.rolled_back(conn, "update", err).await,
        };

        tracing::info!(reminder_id = id, generation, due_at, "Reminder updated");
        self.publish(ChangeEvent::Updated {
            reminder_id: id,
            generation,
        });
        self.finish_recompute(&outcome).await;
        Ok(generation)
    }

    pub async fn delete_reminder(&self, id: i32) -> Result<bool> {
        let _work = self.work.lock().await;
        let now = self.clock.now_ms();
        let chain = &self.chain;

        let mut pooled = self.db.conn().await?;
        let conn: &mut SqliteAsyncConn = &mut pooled;
        let result = conn
            .transaction::<_, ReminderChainError, _>(|conn| {
                async move {
                    let deleted = reminders::delete(conn, id).await?;
                    let outcome = chain.set_next_alarm(conn, now).await?;
                    Ok((deleted, outcome))
                }
                .scope_boxed()
            })
            .await;
        let (deleted, outcome) = match result {
            Ok(done) => done,
            Err(err) => return self.rolled_back(conn, "delete", err).await,
        };

        if deleted {
            tracing::info!(reminder_id = id, "Reminder deleted");
            self.publish(ChangeEvent::Deleted { reminder_id: id });
        }
        self.finish_recompute(&outcome).await;
        Ok(deleted)
    }

    /// Handles a wake-up delivered by the timer gateway.
    pub async fn on_wakeup(&self, payload: WakePayload) -> Result<DeliveryOutcome> {
        let _awake = self.wake_lock.acquire("wakeup");
        let _work = self.work.lock().await;
        let now = self.clock.now_ms();
        let chain = &self.chain;

        let mut pooled = self.db.conn().await?;
        let conn: &mut SqliteAsyncConn = &mut pooled;
        let result = conn
            .transaction::<_, ReminderChainError, _>(|conn| {
                async move {
                    let delivery = chain.consume_wakeup(conn, payload, now).await?;
                    let outcome = chain.set_next_alarm(conn, now).await?;
                    Ok((delivery, outcome))
                }
                .scope_boxed()
            })
            .await;
        let (delivery, outcome) = match result {
            Ok(done) => done,
            Err(err) => return self.rolled_back(conn, "wakeup", err).await,
        };

        self.chain.announce_delivery(&delivery).await;
        if let DeliveryOutcome::Delivered { reminder_id, .. } = &delivery {
            self.publish(ChangeEvent::Delivered {
                reminder_id: *reminder_id,
            });
        }
        self.finish_recompute(&outcome).await;
        Ok(delivery)
    }

    /// Boot / process-start recovery: report missed wake-ups, then re-derive
    /// the chain, catching up whatever became due meanwhile.
    pub async fn on_process_start(&self) -> Result<HealthReport> {
        let _awake = self.wake_lock.acquire("boot");
        let _work = self.work.lock().await;
        let now = self.clock.now_ms();
        let chain = &self.chain;

        let mut pooled = self.db.conn().await?;
        let conn: &mut SqliteAsyncConn = &mut pooled;
        let earliest = ledger::earliest(conn).await?;
        let report = health::assess(earliest.as_ref(), now, self.health_tolerance_ms);
        if let Some(warning) = report.warning_text() {
            tracing::warn!(status = ?report.status, "Wake-up was not delivered on time");
            if let Err(err) = self
                .chain
                .presenter()
                .notify_warning("Reminder alarms delayed", &warning)
                .await
            {
                tracing::warn!(error = %err, "Unable to show health warning");
            }
        } else {
            tracing::info!("Alarm health check passed");
        }

        let result = conn
            .transaction::<_, ReminderChainError, _>(|conn| {
                async move { chain.set_next_alarm(conn, now).await }.scope_boxed()
            })
            .await;
        let outcome = match result {
            Ok(done) => done,
            Err(err) => return self.rolled_back(conn, "boot", err).await,
        };
        self.finish_recompute(&outcome).await;
        Ok(report)
    }

    /// Re-derives the next wake-up without any other mutation.
    pub async fn recompute(&self) -> Result<ChainOutcome> {
        let _work = self.work.lock().await;
        let now = self.clock.now_ms();
        let chain = &self.chain;

        let mut pooled = self.db.conn().await?;
        let conn: &mut SqliteAsyncConn = &mut pooled;
        let result = conn
            .transaction::<_, ReminderChainError, _>(|conn| {
                async move { chain.set_next_alarm(conn, now).await }.scope_boxed()
            })
            .await;
        let outcome = match result {
            Ok(done) => done,
            Err(err) => return self.rolled_back(conn, "recompute", err).await,
        };
        self.finish_recompute(&outcome).await;
        Ok(outcome)
    }

    /// Replaces every reminder with the payload's records.
    ///
    /// A payload that does not parse leaves the store untouched. Imported
    /// reminders that are already past are stored as notified.
    pub async fn import_reminders(
        &self,
        payload: &str,
        progress: Progress<'_>,
    ) -> Result<ImportSummary> {
        let parsed = exchange::parse_import(payload).inspect_err(|err| {
            tracing::warn!(error = %err, "Import payload rejected; reminders unchanged")
        })?;

        let _work = self.work.lock().await;
        let now = self.clock.now_ms();
        let chain = &self.chain;
        let default_title = self.default_title.as_str();
        let records = &parsed.records;

        let mut pooled = self.db.conn().await?;
        let conn: &mut SqliteAsyncConn = &mut pooled;
        let result = conn
            .transaction::<_, ReminderChainError, _>(|conn| {
                async move {
                    let existing = reminders::ids(conn).await?;
                    let removed = existing.len();
                    for (done, id) in existing.into_iter().enumerate() {
                        reminders::delete(conn, id).await?;
                        progress(fraction(done + 1, removed) / 2.0);
                    }
                    progress(0.5);

                    for (done, record) in records.iter().enumerate() {
                        let title = normalize_title(&record.title, default_title);
                        let already_past = record.due_at <= now;
                        reminders::insert(conn, title, &record.body, record.due_at, already_past, now)
                            .await?;
                        progress(0.5 + fraction(done + 1, records.len()) / 2.0);
                    }

                    let outcome = chain.set_next_alarm(conn, now).await?;
                    Ok((removed, outcome))
                }
                .scope_boxed()
            })
            .await;
        let (removed, outcome) = match result {
            Ok(done) => done,
            Err(err) => return self.rolled_back(conn, "import", err).await,
        };
        progress(1.0);

        let summary = ImportSummary {
            imported: parsed.records.len(),
            skipped: parsed.skipped,
        };
        tracing::info!(
            removed,
            imported = summary.imported,
            skipped = summary.skipped,
            "Reminders imported"
        );
        self.publish(ChangeEvent::Imported {
            imported: summary.imported,
            skipped: summary.skipped,
        });
        self.finish_recompute(&outcome).await;
        Ok(summary)
    }

    pub async fn delete_all(&self, progress: Progress<'_>) -> Result<usize> {
        let _work = self.work.lock().await;
        let now = self.clock.now_ms();
        let chain = &self.chain;

        let mut pooled = self.db.conn().await?;
        let conn: &mut SqliteAsyncConn = &mut pooled;
        let result = conn
            .transaction::<_, ReminderChainError, _>(|conn| {
                async move {
                    let existing = reminders::ids(conn).await?;
                    let total = existing.len();
                    for (done, id) in existing.into_iter().enumerate() {
                        reminders::delete(conn, id).await?;
                        progress(fraction(done + 1, total));
                    }
                    let outcome = chain.set_next_alarm(conn, now).await?;
                    Ok((total, outcome))
                }
                .scope_boxed()
            })
            .await;
        let (deleted, outcome) = match result {
            Ok(done) => done,
            Err(err) => return self.rolled_back(conn, "delete_all", err).await,
        };
        progress(1.0);

        tracing::info!(deleted, "All reminders deleted");
        self.publish(ChangeEvent::Cleared { deleted });
        self.finish_recompute(&outcome).await;
        Ok(deleted)
    }

    pub async fn export_reminders(&self) -> Result<String> {
        let all = self.store().list(0, 0).await?;
        exchange::render_export(&all)
    }

    /// Logs a rolled-back operation and puts the gateway back in line with
    /// the ledger that survived it.
    async fn rolled_back<T>(
        &self,
        conn: &mut SqliteAsyncConn,
        operation: &'static str,
        err: ReminderChainError,
    ) -> Result<T> {
        tracing::warn!(error = %err, operation, "Operation rolled back");
        if let Err(rearm_err) = self.chain.rearm_from_ledger(conn).await {
            tracing::error!(
                error = %rearm_err,
                operation,
                "Unable to re-arm wake-up from ledger; next boot health check will report it"
            );
        }
        Err(err)
    }

    async fn finish_recompute(&self, outcome: &ChainOutcome) {
        if !outcome.caught_up.is_empty() {
            self.publish(ChangeEvent::CaughtUp {
                reminder_ids: outcome.caught_up.clone(),
            });
        }
        self.chain.announce_batch(outcome).await;
    }

    fn publish(&self, event: ChangeEvent) {
        let _ = self.events.send(event);
    }
}

fn fraction(done: usize, total: usize) -> f32 {
    if total == 0 {
        1.0
    } else {
        done as f32 / total as f32
    }
}
