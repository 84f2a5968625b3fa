use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;

use crate::db::{Database, SqliteAsyncConn};
use crate::error::{ReminderChainError, Result};

pub(crate) mod schema;
use schema::alarm_ledger;

/// Durable record of the wake-up currently armed with the platform.
///
/// `reminder_id` is `None` for a horizon probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: i32,
    pub scheduled_at: i64,
    pub reminder_id: Option<i32>,
    pub created_at: i64,
}

impl LedgerEntry {
    pub fn is_horizon_probe(&self) -> bool {
        self.reminder_id.is_none()
    }
}

#[derive(Queryable)]
struct LedgerRow {
    id: i32,
    scheduled_at: i64,
    reminder_id: Option<i32>,
    created_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = alarm_ledger)]
struct NewLedgerEntry {
    scheduled_at: i64,
    reminder_id: Option<i32>,
    created_at: i64,
}

pub async fn record(
    conn: &mut SqliteAsyncConn,
    scheduled_at: i64,
    reminder_id: Option<i32>,
    now: i64,
) -> Result<LedgerEntry> {
    let new = NewLedgerEntry {
        scheduled_at,
        reminder_id,
        created_at: now,
    };
    diesel::insert_into(alarm_ledger::table)
        .values(&new)
        .execute(conn)
        .await
        .map_err(storage_err)?;

    let row: LedgerRow = alarm_ledger::table
        .order(alarm_ledger::id.desc())
        .first(conn)
        .await
        .map_err(storage_err)?;
    Ok(map_row(row))
}

pub async fn clear(conn: &mut SqliteAsyncConn) -> Result<usize> {
    diesel::delete(alarm_ledger::table)
        .execute(conn)
        .await
        .map_err(storage_err)
}

pub async fn remove(conn: &mut SqliteAsyncConn, id: i32) -> Result<bool> {
    let deleted = diesel::delete(alarm_ledger::table.filter(alarm_ledger::id.eq(id)))
        .execute(conn)
        .await
        .map_err(storage_err)?;
    Ok(deleted > 0)
}

/// Drops the entries a delivered wake-up stands for.
pub async fn consume(conn: &mut SqliteAsyncConn, reminder_id: Option<i32>) -> Result<usize> {
    let deleted = match reminder_id {
        Some(id) => {
            diesel::delete(alarm_ledger::table.filter(alarm_ledger::reminder_id.eq(id)))
                .execute(conn)
                .await
        }
        None => {
            diesel::delete(alarm_ledger::table.filter(alarm_ledger::reminder_id.is_null()))
                .execute(conn)
                .await
        }
    };
    deleted.map_err(storage_err)
}

/// Entry with the smallest `scheduled_at`, if any.
pub async fn earliest(conn: &mut SqliteAsyncConn) -> Result<Option<LedgerEntry>> {
    let row = alarm_ledger::table
        .order((alarm_ledger::scheduled_at.asc(), alarm_ledger::id.asc()))
        .first::<LedgerRow>(conn)
        .await
        .optional()
        .map_err(storage_err)?;
    Ok(row.map(map_row))
}

pub async fn entries(conn: &mut SqliteAsyncConn) -> Result<Vec<LedgerEntry>> {
    let rows: Vec<LedgerRow> = alarm_ledger::table
        .order((alarm_ledger::scheduled_at.asc(), alarm_ledger::id.asc()))
        .load(conn)
        .await
        .map_err(storage_err)?;
    Ok(rows.into_iter().map(map_row).collect())
}

/// Read-only view over the alarm ledger.
#[derive(Clone)]
pub struct AlarmLedger {
    db: Database,
}

impl AlarmLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn earliest(&self) -> Result<Option<LedgerEntry>> {
        let mut conn = self.db.conn().await?;
        earliest(&mut conn).await
    }

    pub async fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let mut conn = self.db.conn().await?;
        entries(&mut conn).await
    }
}

fn map_row(row: LedgerRow) -> LedgerEntry {
    LedgerEntry {
        id: row.id,
        scheduled_at: row.scheduled_at,
        reminder_id: row.reminder_id,
        created_at: row.created_at,
    }
}

fn storage_err(err: diesel::result::Error) -> ReminderChainError {
    ReminderChainError::StorageUnavailable(err.to_string())
}
