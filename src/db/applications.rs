//! Operator applications to staff sessions.
//!
//! Each state change is one conditional `UPDATE` on one row; the session's
//! counters follow through the schema triggers.
use super::model::application_from_row;
use super::sessions::OPEN_STATUSES_SQL;
use super::Pool;
use crate::model::{ApplicationStatus, SessionApplication};
use anyhow::{Context, Result};
use chrono::Utc;
use tracing::instrument;

/// New pending application. `None` when the operator already has one for
/// this session.
#[instrument(skip_all)]
pub async fn insert_application(
    pool: &Pool,
    session_id: i64,
    operator_id: i64,
) -> Result<Option<SessionApplication>> {
    let row = sqlx::query(
        "INSERT INTO session_applications (session_id, operator_id, status, applied_at) \
         VALUES (?, ?, 'pending', ?) \
         ON CONFLICT (session_id, operator_id) DO NOTHING RETURNING *",
    )
    .bind(session_id)
    .bind(operator_id)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await
    .context("failed to insert application")?;
    row.as_ref().map(application_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn get_application(
    pool: &Pool,
    session_id: i64,
    operator_id: i64,
) -> Result<Option<SessionApplication>> {
    let row = sqlx::query(
        "SELECT * FROM session_applications WHERE session_id = ? AND operator_id = ?",
    )
    .bind(session_id)
    .bind(operator_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(application_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn list_applications(
    pool: &Pool,
    session_id: i64,
    status: Option<ApplicationStatus>,
) -> Result<Vec<SessionApplication>> {
    let rows = sqlx::query(
        "SELECT * FROM session_applications \
         WHERE session_id = ? AND (? IS NULL OR status = ?) ORDER BY applied_at, id",
    )
    .bind(session_id)
    .bind(status.map(|s| s.as_str()))
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;
    rows.iter().map(application_from_row).collect()
}

/// Pending → accepted, only while the session is still open. Returns false
/// when no row matched.
#[instrument(skip_all)]
pub async fn accept_application(pool: &Pool, session_id: i64, operator_id: i64) -> Result<bool> {
    let sql = format!(
        "UPDATE session_applications SET status = 'accepted', accepted_at = ? \
         WHERE session_id = ? AND operator_id = ? AND status = 'pending' \
           AND EXISTS (SELECT 1 FROM sessions s \
                       WHERE s.id = session_applications.session_id \
                         AND s.status IN {OPEN_STATUSES_SQL})"
    );
    let res = sqlx::query(&sql)
        .bind(Utc::now())
        .bind(session_id)
        .bind(operator_id)
        .execute(pool)
        .await
        .context("failed to accept application")?;
    Ok(res.rows_affected() == 1)
}

/// Pending → rejected. Returns false when no pending row matched.
#[instrument(skip_all)]
pub async fn reject_application(pool: &Pool, session_id: i64, operator_id: i64) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE session_applications SET status = 'rejected', rejected_at = ? \
         WHERE session_id = ? AND operator_id = ? AND status = 'pending'",
    )
    .bind(Utc::now())
    .bind(session_id)
    .bind(operator_id)
    .execute(pool)
    .await
    .context("failed to reject application")?;
    Ok(res.rows_affected() == 1)
}

/// Removes a still-pending application.
#[instrument(skip_all)]
pub async fn withdraw_application(pool: &Pool, session_id: i64, operator_id: i64) -> Result<bool> {
    let res = sqlx::query(
        "DELETE FROM session_applications \
         WHERE session_id = ? AND operator_id = ? AND status = 'pending'",
    )
    .bind(session_id)
    .bind(operator_id)
    .execute(pool)
    .await
    .context("failed to withdraw application")?;
    Ok(res.rows_affected() == 1)
}
