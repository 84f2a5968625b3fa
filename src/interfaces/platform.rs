use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Data handed back by the platform when an armed wake-up fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakePayload {
    /// `None` for a horizon probe.
    pub reminder_id: Option<i32>,
    /// Reminder generation current when the wake-up was armed; 0 for probes.
    pub generation: i64,
}

impl WakePayload {
    pub fn horizon_probe() -> Self {
        Self {
            reminder_id: None,
            generation: 0,
        }
    }

    pub fn for_reminder(reminder_id: i32, generation: i64) -> Self {
        Self {
            reminder_id: Some(reminder_id),
            generation,
        }
    }
}

/// The platform's "wake me at time T" primitive.
///
/// At most one wake-up is armed at a time: `schedule` replaces whatever was
/// armed before. Deliveries may arrive late or more than once.
#[async_trait]
pub trait TimerGateway: Send + Sync {
    /// Arms a wake-up at `at` (ms since epoch). Fails with
    /// `SchedulingDenied` when the platform refuses.
    async fn schedule(&self, at: i64, payload: WakePayload) -> Result<()>;

    /// Disarms the current wake-up; no-op when nothing is armed.
    async fn cancel(&self) -> Result<()>;
}
