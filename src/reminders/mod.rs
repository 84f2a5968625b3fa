use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;

use crate::db::{Database, SqliteAsyncConn};
use crate::error::{ReminderChainError, Result};

pub(crate) mod schema;
use schema::reminders;

/// First generation a reminder is created with.
pub const INITIAL_GENERATION: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reminder {
    pub id: i32,
    pub title: String,
    pub body: String,
    pub due_at: i64,
    pub notified: bool,
    pub alarm_generation: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Number of reminders due in one calendar month (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
    pub count: usize,
}

#[derive(Queryable)]
struct ReminderRow {
    id: i32,
    title: String,
    body: String,
    due_at: i64,
    notified: bool,
    alarm_generation: i64,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = reminders)]
struct NewReminder<'a> {
    title: &'a str,
    body: &'a str,
    due_at: i64,
    notified: bool,
    alarm_generation: i64,
    created_at: i64,
    updated_at: i64,
}

/// Falls back to `placeholder` when the user left the title blank.
pub fn normalize_title<'a>(title: &'a str, placeholder: &'a str) -> &'a str {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        placeholder
    } else {
        trimmed
    }
}

pub async fn insert(
    conn: &mut SqliteAsyncConn,
    title: &str,
    body: &str,
    due_at: i64,
    notified: bool,
    now: i64,
) -> Result<Reminder> {
    let new = NewReminder {
        title,
        body,
        due_at,
        notified,
        alarm_generation: INITIAL_GENERATION,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(reminders::table)
        .values(&new)
        .execute(conn)
        .await
        .map_err(storage_err)?;

    let row: ReminderRow = reminders::table
        .order(reminders::id.desc())
        .first(conn)
        .await
        .map_err(storage_err)?;
    Ok(map_row(row))
}

/// Rewrites a reminder and bumps its generation, returning the new generation.
///
/// Any wake-up armed for an older generation becomes stale. The reminder is
/// also made pending again so an edited reminder is rescheduled.
pub async fn update(
    conn: &mut SqliteAsyncConn,
    id: i32,
    title: &str,
    body: &str,
    due_at: i64,
    now: i64,
) -> Result<i64> {
    let updated = diesel::update(reminders::table.filter(reminders::id.eq(id)))
        .set((
            reminders::title.eq(title),
            reminders::body.eq(body),
            reminders::due_at.eq(due_at),
            reminders::notified.eq(false),
            reminders::alarm_generation.eq(reminders::alarm_generation + 1),
            reminders::updated_at.eq(now),
        ))
        .execute(conn)
        .await
        .map_err(storage_err)?;
    if updated == 0 {
        return Err(ReminderChainError::NotFound(id));
    }

    reminders::table
        .filter(reminders::id.eq(id))
        .select(reminders::alarm_generation)
        .first::<i64>(conn)
        .await
        .map_err(storage_err)
}

pub async fn delete(conn: &mut SqliteAsyncConn, id: i32) -> Result<bool> {
    let deleted = diesel::delete(reminders::table.filter(reminders::id.eq(id)))
        .execute(conn)
        .await
        .map_err(storage_err)?;
    Ok(deleted > 0)
}

pub async fn get(conn: &mut SqliteAsyncConn, id: i32) -> Result<Option<Reminder>> {
    let row = reminders::table
        .filter(reminders::id.eq(id))
        .first::<ReminderRow>(conn)
        .await
        .optional()
        .map_err(storage_err)?;
    Ok(row.map(map_row))
}

/// Every not-yet-notified reminder, earliest first.
pub async fn pending(conn: &mut SqliteAsyncConn) -> Result<Vec<Reminder>> {
    let rows: Vec<ReminderRow> = reminders::table
        .filter(reminders::notified.eq(false))
        .order((reminders::due_at.asc(), reminders::id.asc()))
        .load(conn)
        .await
        .map_err(storage_err)?;
    Ok(rows.into_iter().map(map_row).collect())
}

/// Not-yet-notified reminders due at or before `before`, earliest first.
pub async fn fetch_due(conn: &mut SqliteAsyncConn, before: i64) -> Result<Vec<Reminder>> {
    let rows: Vec<ReminderRow> = reminders::table
        .filter(reminders::notified.eq(false))
        .filter(reminders::due_at.le(before))
        .order((reminders::due_at.asc(), reminders::id.asc()))
        .load(conn)
        .await
        .map_err(storage_err)?;
    Ok(rows.into_iter().map(map_row).collect())
}

pub async fn fetch_earliest_pending(conn: &mut SqliteAsyncConn) -> Result<Option<Reminder>> {
    let row = reminders::table
        .filter(reminders::notified.eq(false))
        .order((reminders::due_at.asc(), reminders::id.asc()))
        .first::<ReminderRow>(conn)
        .await
        .optional()
        .map_err(storage_err)?;
    Ok(row.map(map_row))
}

pub async fn mark_notified(conn: &mut SqliteAsyncConn, id: i32, now: i64) -> Result<bool> {
    let updated = diesel::update(
        reminders::table
            .filter(reminders::id.eq(id))
            .filter(reminders::notified.eq(false)),
    )
    .set((
        reminders::notified.eq(true),
        reminders::updated_at.eq(now),
    ))
    .execute(conn)
    .await
    .map_err(storage_err)?;
    Ok(updated > 0)
}

pub async fn list(
    conn: &mut SqliteAsyncConn,
    page: usize,
    page_size: usize,
) -> Result<Vec<Reminder>> {
    let mut query = reminders::table
        .order((reminders::due_at.asc(), reminders::id.asc()))
        .into_boxed();
    if page_size > 0 {
        query = query
            .limit(page_size as i64)
            .offset((page * page_size) as i64);
    }
    let rows: Vec<ReminderRow> = query.load(conn).await.map_err(storage_err)?;
    Ok(rows.into_iter().map(map_row).collect())
}

pub async fn count(conn: &mut SqliteAsyncConn) -> Result<i64> {
    reminders::table
        .count()
        .get_result(conn)
        .await
        .map_err(storage_err)
}

pub async fn ids(conn: &mut SqliteAsyncConn) -> Result<Vec<i32>> {
    reminders::table
        .select(reminders::id)
        .order(reminders::id.asc())
        .load(conn)
        .await
        .map_err(storage_err)
}

pub async fn due_times(conn: &mut SqliteAsyncConn) -> Result<Vec<i64>> {
    reminders::table
        .select(reminders::due_at)
        .order(reminders::due_at.asc())
        .load(conn)
        .await
        .map_err(storage_err)
}

/// Read-only view over the reminder table for listing and browsing.
///
/// Mutations go through [`crate::coordinator::ReminderService`] so they are
/// serialized with wake-up scheduling.
#[derive(Clone)]
pub struct ReminderStore {
    db: Database,
}

impl ReminderStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get(&self, id: i32) -> Result<Option<Reminder>> {
        let mut conn = self.db.conn().await?;
        get(&mut conn, id).await
    }

    pub async fn list(&self, page: usize, page_size: usize) -> Result<Vec<Reminder>> {
        let mut conn = self.db.conn().await?;
        list(&mut conn, page, page_size).await
    }

    pub async fn count(&self) -> Result<i64> {
        let mut conn = self.db.conn().await?;
        count(&mut conn).await
    }

    pub async fn fetch_due(&self, before: i64) -> Result<Vec<Reminder>> {
        let mut conn = self.db.conn().await?;
        fetch_due(&mut conn, before).await
    }

    pub async fn fetch_earliest_pending(&self) -> Result<Option<Reminder>> {
        let mut conn = self.db.conn().await?;
        fetch_earliest_pending(&mut conn).await
    }

    pub async fn month_summary(&self) -> Result<Vec<MonthBucket>> {
        let mut conn = self.db.conn().await?;
        let due = due_times(&mut conn).await?;
        Ok(bucket_by_month(&due))
    }
}

pub fn bucket_by_month(due_times: &[i64]) -> Vec<MonthBucket> {
    let mut buckets: BTreeMap<(i32, u32), usize> = BTreeMap::new();
    for due_at in due_times {
        if let Some(at) = DateTime::<Utc>::from_timestamp_millis(*due_at) {
            *buckets.entry((at.year(), at.month())).or_default() += 1;
        }
    }
    buckets
        .into_iter()
        .map(|((year, month), count)| MonthBucket { year, month, count })
        .collect()
}

fn map_row(row: ReminderRow) -> Reminder {
    Reminder {
        id: row.id,
        title: row.title,
        body: row.body,
        due_at: row.due_at,
        notified: row.notified,
        alarm_generation: row.alarm_generation,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn storage_err(err: diesel::result::Error) -> ReminderChainError {
    ReminderChainError::StorageUnavailable(err.to_string())
}
