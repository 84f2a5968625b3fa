use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::error::{ReminderChainError, Result};
use crate::interfaces::platform::{TimerGateway, WakePayload};

/// In-process timer: one sleeping task per armed wake-up, delivering the
/// payload on a channel when it fires.
///
/// Only lives as long as the process; the ledger covers what is lost on exit.
pub struct TokioTimerGateway {
    clock: Arc<dyn Clock>,
    armed: Mutex<Option<JoinHandle<()>>>,
    deliveries: mpsc::UnboundedSender<WakePayload>,
}

impl TokioTimerGateway {
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<WakePayload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gateway = Self {
            clock,
            armed: Mutex::new(None),
            deliveries: tx,
        };
        (gateway, rx)
    }

    pub async fn is_armed(&self) -> bool {
        self.armed
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

#[async_trait]
impl TimerGateway for TokioTimerGateway {
    async fn schedule(&self, at: i64, payload: WakePayload) -> Result<()> {
        if self.deliveries.is_closed() {
            return Err(ReminderChainError::SchedulingDenied(
                "wake-up receiver has shut down".to_string(),
            ));
        }

        let delay = Duration::from_millis(at.saturating_sub(self.clock.now_ms()).max(0) as u64);
        let tx = self.deliveries.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(payload).is_err() {
                tracing::warn!(?payload, "Wake-up fired after receiver shut down");
            }
        });

        let mut armed = self.armed.lock().await;
        if let Some(previous) = armed.replace(handle) {
            previous.abort();
        }
        tracing::debug!(at, delay_ms = delay.as_millis() as u64, "Timer armed");
        Ok(())
    }

    async fn cancel(&self) -> Result<()> {
        if let Some(handle) = self.armed.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    #[tokio::test]
    async fn delivers_payload_when_timer_fires() {
        let clock = Arc::new(SystemClock);
        let (gateway, mut rx) = TokioTimerGateway::new(clock.clone());

        let payload = WakePayload::for_reminder(7, 2);
        gateway
            .schedule(clock.now_ms() + 20, payload)
            .await
            .expect("schedule");

        let delivered = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("fired in time");
        assert_eq!(delivered, Some(payload));
    }

    #[tokio::test]
    async fn rescheduling_replaces_the_armed_timer() {
        let clock = Arc::new(SystemClock);
        let (gateway, mut rx) = TokioTimerGateway::new(clock.clone());

        gateway
            .schedule(clock.now_ms() + 60, WakePayload::for_reminder(1, 1))
            .await
            .expect("first");
        gateway
            .schedule(clock.now_ms() + 10, WakePayload::horizon_probe())
            .await
            .expect("second");

        let delivered = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("fired in time");
        assert_eq!(delivered, Some(WakePayload::horizon_probe()));

        let nothing_else = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(nothing_else.is_err());
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let clock = Arc::new(SystemClock);
        let (gateway, mut rx) = TokioTimerGateway::new(clock.clone());

        gateway
            .schedule(clock.now_ms() + 50, WakePayload::for_reminder(3, 1))
            .await
            .expect("schedule");
        assert!(gateway.is_armed().await);
        gateway.cancel().await.expect("cancel");
        gateway.cancel().await.expect("cancel twice");
        assert!(!gateway.is_armed().await);

        let fired = tokio::time::timeout(Duration::from_millis(250), rx.recv()).await;
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn closed_receiver_denies_scheduling() {
        let clock = Arc::new(SystemClock);
        let (gateway, rx) = TokioTimerGateway::new(clock.clone());
        drop(rx);

        let err = gateway
            .schedule(clock.now_ms() + 1_000, WakePayload::horizon_probe())
            .await
            .expect_err("denied");
        assert!(matches!(err, ReminderChainError::SchedulingDenied(_)));
    }
}
