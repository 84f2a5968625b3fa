#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use reminder_chain::clock::ManualClock;
use reminder_chain::config::ChainConfig;
use reminder_chain::coordinator::ReminderService;
use reminder_chain::db::Database;
use reminder_chain::error::{ReminderChainError, Result};
use reminder_chain::interfaces::notifier::NotificationPresenter;
use reminder_chain::interfaces::platform::{TimerGateway, WakePayload};
use reminder_chain::interfaces::power::WakeRetention;
use reminder_chain::wake_lock::WakeLock;

pub const NOW: i64 = 1_771_147_543_000;
pub const MINUTE: i64 = 60 * 1000;
pub const HOUR: i64 = 60 * MINUTE;
pub const DAY: i64 = 24 * HOUR;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayCall {
    Schedule { at: i64, payload: WakePayload },
    Cancel,
}

/// Timer gateway that only records what it was asked to do.
#[derive(Default)]
pub struct RecordingGateway {
    calls: Mutex<Vec<GatewayCall>>,
    armed: Mutex<Option<(i64, WakePayload)>>,
    deny: AtomicBool,
    deny_once: AtomicBool,
}

impl RecordingGateway {
    pub fn deny_scheduling(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    /// Refuses only the next schedule request.
    pub fn deny_next_schedule(&self) {
        self.deny_once.store(true, Ordering::SeqCst);
    }

    /// Delivers the armed wake-up, leaving nothing armed.
    pub fn fire(&self) -> Option<WakePayload> {
        self.armed
            .lock()
            .expect("armed lock")
            .take()
            .map(|(_, payload)| payload)
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn schedules(&self) -> Vec<(i64, WakePayload)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Schedule { at, payload } => Some((at, payload)),
                GatewayCall::Cancel => None,
            })
            .collect()
    }

    pub fn armed(&self) -> Option<(i64, WakePayload)> {
        *self.armed.lock().expect("armed lock")
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("calls lock").clear();
    }
}

#[async_trait]
impl TimerGateway for RecordingGateway {
    async fn schedule(&self, at: i64, payload: WakePayload) -> Result<()> {
        if self.deny.load(Ordering::SeqCst) || self.deny_once.swap(false, Ordering::SeqCst) {
            return Err(ReminderChainError::SchedulingDenied(
                "exact alarms not permitted".to_string(),
            ));
        }
        self.calls
            .lock()
            .expect("calls lock")
            .push(GatewayCall::Schedule { at, payload });
        *self.armed.lock().expect("armed lock") = Some((at, payload));
        Ok(())
    }

    async fn cancel(&self) -> Result<()> {
        self.calls.lock().expect("calls lock").push(GatewayCall::Cancel);
        *self.armed.lock().expect("armed lock") = None;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPresenter {
    singles: Mutex<Vec<(i32, String)>>,
    batches: Mutex<Vec<Vec<String>>>,
    warnings: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingPresenter {
    pub fn fail_notifications(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn singles(&self) -> Vec<(i32, String)> {
        self.singles.lock().expect("singles lock").clone()
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().expect("batches lock").clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().expect("warnings lock").clone()
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ReminderChainError::NotificationDenied(
                "notifications disabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationPresenter for RecordingPresenter {
    async fn notify_one(&self, reminder_id: i32, title: &str) -> Result<()> {
        self.check()?;
        self.singles
            .lock()
            .expect("singles lock")
            .push((reminder_id, title.to_string()));
        Ok(())
    }

    async fn notify_batch(&self, titles: &[String]) -> Result<()> {
        self.check()?;
        self.batches
            .lock()
            .expect("batches lock")
            .push(titles.to_vec());
        Ok(())
    }

    async fn notify_warning(&self, title: &str, _body: &str) -> Result<()> {
        self.check()?;
        self.warnings
            .lock()
            .expect("warnings lock")
            .push(title.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingRetention {
    pub holds: AtomicUsize,
    pub releases: AtomicUsize,
}

impl WakeRetention for CountingRetention {
    fn hold(&self) {
        self.holds.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub db: Database,
    pub clock: Arc<ManualClock>,
    pub gateway: Arc<RecordingGateway>,
    pub presenter: Arc<RecordingPresenter>,
    pub retention: Arc<CountingRetention>,
    pub service: ReminderService,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("reminders.db");
        let db = Database::open(db_path.to_string_lossy())
            .await
            .expect("open db");
        let clock = Arc::new(ManualClock::new(NOW));
        let gateway = Arc::new(RecordingGateway::default());
        let presenter = Arc::new(RecordingPresenter::default());
        let retention = Arc::new(CountingRetention::default());
        let service = build_service(&db, &clock, &gateway, &presenter, &retention);
        Self {
            dir,
            db,
            clock,
            gateway,
            presenter,
            retention,
            service,
        }
    }

    /// Simulates a process restart: fresh service, gateway and presenter
    /// over the same database; the clock keeps its current time.
    pub fn restart(self) -> Self {
        let gateway = Arc::new(RecordingGateway::default());
        let presenter = Arc::new(RecordingPresenter::default());
        let service = build_service(&self.db, &self.clock, &gateway, &presenter, &self.retention);
        Self {
            gateway,
            presenter,
            service,
            ..self
        }
    }
}

fn build_service(
    db: &Database,
    clock: &Arc<ManualClock>,
    gateway: &Arc<RecordingGateway>,
    presenter: &Arc<RecordingPresenter>,
    retention: &Arc<CountingRetention>,
) -> ReminderService {
    let config = ChainConfig::convention_defaults(db.path());
    ReminderService::new(db.clone(), &config, gateway.clone(), presenter.clone())
        .expect("service")
        .with_clock(clock.clone())
        .with_wake_lock(WakeLock::new(retention.clone()))
}
