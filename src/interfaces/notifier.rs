use async_trait::async_trait;

use crate::error::Result;

/// User-visible notification surface.
///
/// Failures are reported as `NotificationDenied` and never abort scheduling.
#[async_trait]
pub trait NotificationPresenter: Send + Sync {
    async fn notify_one(&self, reminder_id: i32, title: &str) -> Result<()>;

    /// One combined notification for reminders that were caught up late.
    async fn notify_batch(&self, titles: &[String]) -> Result<()>;

    async fn notify_warning(&self, _title: &str, _body: &str) -> Result<()> {
        Ok(())
    }
}
