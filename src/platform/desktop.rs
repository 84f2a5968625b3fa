use async_trait::async_trait;

use crate::error::{ReminderChainError, Result};
use crate::interfaces::notifier::NotificationPresenter;

const APP_SUMMARY: &str = "Reminders";

/// Desktop notifications through the session's notification daemon.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    app_summary: String,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self {
            app_summary: APP_SUMMARY.to_string(),
        }
    }

    async fn show(&self, summary: String, body: String) -> Result<()> {
        tokio::task::spawn_blocking(move || show_blocking(&summary, &body))
            .await
            .map_err(|e| ReminderChainError::Runtime(e.to_string()))?
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationPresenter for DesktopNotifier {
    async fn notify_one(&self, reminder_id: i32, title: &str) -> Result<()> {
        tracing::debug!(reminder_id, "Showing reminder notification");
        self.show(self.app_summary.clone(), title.to_string()).await
    }

    async fn notify_batch(&self, titles: &[String]) -> Result<()> {
        let (summary, body) = batch_text(&self.app_summary, titles);
        self.show(summary, body).await
    }

    async fn notify_warning(&self, title: &str, body: &str) -> Result<()> {
        self.show(title.to_string(), body.to_string()).await
    }
}

fn batch_text(app_summary: &str, titles: &[String]) -> (String, String) {
    match titles {
        [single] => (app_summary.to_string(), single.clone()),
        _ => (
            format!("{app_summary}: {} reminders", titles.len()),
            titles.join("\n"),
        ),
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn show_blocking(summary: &str, body: &str) -> Result<()> {
    notify_rust::Notification::new()
        .summary(summary)
        .body(body)
        .show()
        .map(|_| ())
        .map_err(|e| ReminderChainError::NotificationDenied(e.to_string()))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn show_blocking(summary: &str, body: &str) -> Result<()> {
    tracing::info!(summary, body, "Reminder notification");
    Ok(())
}
