use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::clock::{Clock, SystemClock};
use crate::config::ChainConfig;
use crate::coordinator::{ChangeEvent, ReminderService};
use crate::db::Database;
use crate::error::{ReminderChainError, Result};
use crate::exchange::{self, ImportSummary};
use crate::health::HealthReport;
use crate::platform::{DesktopNotifier, TokioTimerGateway};

/// What the daemon was asked to do on this start.
#[derive(Debug, Clone, Default)]
pub struct DaemonOptions {
    pub db_path: Option<String>,
    pub config_path: Option<PathBuf>,
    /// Replace every reminder with this JSON file before serving.
    pub import: Option<PathBuf>,
    /// Write every reminder to this file (or a dated file inside this directory), then exit.
    pub export: Option<PathBuf>,
}

/// What one daemon start did before it stopped.
#[derive(Debug, Clone, Default)]
pub struct DaemonRun {
    /// Boot health report; absent for a one-shot export.
    pub health: Option<HealthReport>,
    pub imported: Option<ImportSummary>,
    pub exported: Option<PathBuf>,
}

pub async fn run(options: DaemonOptions) -> Result<()> {
    run_with_shutdown(options, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Unable to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    })
    .await
    .map(|_| ())
}

pub async fn run_with_shutdown<F>(options: DaemonOptions, shutdown: F) -> Result<DaemonRun>
where
    F: Future<Output = ()> + Send,
{
    let config = load_config(&options)?;
    let db = Database::open(config.resolve_sqlite_path()).await?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = env!("REMINDER_CHAIN_GIT_SHA"),
        db_path = %db.path(),
        lookahead_ms = config.policy.lookahead_ms,
        near_future_window_ms = config.policy.near_future_window_ms,
        "Reminder daemon starting"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (gateway, mut deliveries) = TokioTimerGateway::new(clock.clone());
    let service = ReminderService::new(
        db,
        &config,
        Arc::new(gateway),
        Arc::new(DesktopNotifier::new()),
    )?
    .with_clock(clock.clone());

    spawn_event_log(service.subscribe());

    let mut run = DaemonRun::default();

    // Boot recovery reads the ledger before an import replaces it.
    if options.export.is_none() {
        let report = service.on_process_start().await?;
        tracing::info!(healthy = report.is_healthy(), "Boot recovery finished");
        run.health = Some(report);
    }
    if let Some(path) = &options.import {
        run.imported = Some(import_file(&service, path).await?);
    }
    if let Some(path) = &options.export {
        run.exported = Some(export_file(&service, path, clock.now_ms()).await?);
        return Ok(run);
    }

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            delivered = deliveries.recv() => {
                let Some(payload) = delivered else {
                    tracing::warn!("Timer channel closed");
                    break;
                };
                match service.on_wakeup(payload).await {
                    Ok(outcome) => tracing::debug!(?outcome, "Wake-up handled"),
                    Err(err) => tracing::error!(error = %err, "Wake-up handling failed"),
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested");
                break;
            }
        }
    }

    Ok(run)
}

fn load_config(options: &DaemonOptions) -> Result<ChainConfig> {
    let config_path = options
        .config_path
        .clone()
        .unwrap_or_else(crate::runtime_paths::default_config_path);

    let mut config = if config_path.exists() {
        ChainConfig::load(&config_path)?
    } else {
        tracing::warn!(
            config_path = %config_path.to_string_lossy(),
            "No config file; using defaults"
        );
        let db_path = crate::runtime_paths::default_db_path();
        ChainConfig::convention_defaults(&db_path)
    };

    if let Some(db_path) = &options.db_path {
        config.sqlite_path = Some(db_path.clone());
    }
    Ok(config)
}

async fn import_file(service: &ReminderService, path: &Path) -> Result<ImportSummary> {
    let payload = tokio::fs::read_to_string(path).await.map_err(|e| {
        ReminderChainError::ImportFormat(format!(
            "Failed to read {}: {e}",
            path.to_string_lossy()
        ))
    })?;
    let progress = |fraction: f32| tracing::debug!(fraction, "Import progress");
    let summary = service.import_reminders(&payload, &progress).await?;
    tracing::info!(
        path = %path.to_string_lossy(),
        imported = summary.imported,
        skipped = summary.skipped,
        "Import finished"
    );
    Ok(summary)
}

async fn export_file(service: &ReminderService, path: &Path, now_ms: i64) -> Result<PathBuf> {
    // A path without an extension names a directory to hold a dated file.
    let target = if path.is_dir() || path.extension().is_none() {
        path.join(exchange::export_file_name(now_ms))
    } else {
        path.to_path_buf()
    };
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ReminderChainError::Runtime(e.to_string()))?;
    }

    let rendered = service.export_reminders().await?;
    tokio::fs::write(&target, rendered)
        .await
        .map_err(|e| ReminderChainError::Runtime(e.to_string()))?;
    tracing::info!(path = %target.to_string_lossy(), "Export written");
    Ok(target)
}

fn spawn_event_log(mut rx: broadcast::Receiver<ChangeEvent>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => tracing::debug!(?event, "Reminder change"),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "Change log lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
