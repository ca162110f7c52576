use super::model::{session_from_row, session_with_client_from_row, SessionWithClient};
use super::Pool;
use crate::model::{NewSession, Session, SessionStatus};
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use tracing::instrument;

/// Optional filters for session reads. Date bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub region: Option<String>,
    pub status: Option<SessionStatus>,
    pub client_id: Option<i64>,
}

impl SessionFilter {
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        }
    }
}

/// Stored spellings of the statuses that still accept staffing.
pub(crate) const OPEN_STATUSES_SQL: &str = "('pending_confirmation', 'pending', 'confirmed', 'scheduled')";

const SESSION_WITH_CLIENT: &str = "SELECT s.*, c.first_name AS client_first_name, \
     c.last_name AS client_last_name, c.company AS client_company \
     FROM sessions s LEFT JOIN clients c ON c.id = s.client_id";

#[instrument(skip_all)]
pub async fn create_session(pool: &Pool, new: &NewSession) -> Result<Session> {
    if new.region.trim().is_empty() {
        return Err(anyhow!("session region is required"));
    }
    if new.min_operators < 0 {
        return Err(anyhow!("min_operators must not be negative"));
    }
    let row = sqlx::query(
        "INSERT INTO sessions (date, start_time, end_time, region, client_id, title, status, \
         min_operators, marketplace_visible, notes) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(new.date)
    .bind(new.start_time.as_deref())
    .bind(new.end_time.as_deref())
    .bind(new.region.trim())
    .bind(new.client_id)
    .bind(new.title.as_deref())
    .bind(new.status.as_str())
    .bind(new.min_operators)
    .bind(new.marketplace_visible)
    .bind(new.notes.as_deref())
    .fetch_one(pool)
    .await
    .context("failed to insert session")?;
    session_from_row(&row)
}

#[instrument(skip_all)]
pub async fn get_session(pool: &Pool, id: i64) -> Result<Option<Session>> {
    let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(session_from_row).transpose()
}

/// Sessions matching `filter`, joined with client display fields, by date then id.
#[instrument(skip_all)]
pub async fn list_sessions(pool: &Pool, filter: &SessionFilter) -> Result<Vec<SessionWithClient>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SESSION_WITH_CLIENT);
    qb.push(" WHERE 1 = 1");
    if let Some(from) = filter.from {
        qb.push(" AND s.date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND s.date <= ").push_bind(to);
    }
    if let Some(region) = filter.region.as_deref() {
        qb.push(" AND s.region = ").push_bind(region.to_string());
    }
    if let Some(status) = filter.status {
        qb.push(" AND s.status IN (");
        let mut spellings = qb.separated(", ");
        for spelling in status.spellings() {
            spellings.push_bind(*spelling);
        }
        spellings.push_unseparated(")");
    }
    if let Some(client_id) = filter.client_id {
        qb.push(" AND s.client_id = ").push_bind(client_id);
    }
    qb.push(" ORDER BY s.date ASC, s.id ASC");

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(session_with_client_from_row).collect()
}

/// Open, marketplace-visible, understaffed sessions from `today` on that
/// `operator_id` has not applied to yet.
#[instrument(skip_all)]
pub async fn list_marketplace_sessions(
    pool: &Pool,
    operator_id: i64,
    today: NaiveDate,
) -> Result<Vec<SessionWithClient>> {
    let sql = format!(
        "{SESSION_WITH_CLIENT} \
         WHERE s.marketplace_visible = 1 \
           AND s.status IN {OPEN_STATUSES_SQL} \
           AND s.accepted_operators < s.min_operators \
           AND s.date >= ? \
           AND NOT EXISTS (SELECT 1 FROM session_applications a \
                           WHERE a.session_id = s.id AND a.operator_id = ?) \
         ORDER BY s.date ASC, s.id ASC"
    );
    let rows = sqlx::query(&sql)
        .bind(today)
        .bind(operator_id)
        .fetch_all(pool)
        .await?;
    rows.iter().map(session_with_client_from_row).collect()
}

#[instrument(skip_all)]
pub async fn update_session_status(pool: &Pool, id: i64, status: SessionStatus) -> Result<bool> {
    let res = sqlx::query("UPDATE sessions SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update session status")?;
    Ok(res.rows_affected() == 1)
}

#[instrument(skip_all)]
pub async fn set_marketplace_visible(pool: &Pool, id: i64, visible: bool) -> Result<bool> {
    let res = sqlx::query("UPDATE sessions SET marketplace_visible = ? WHERE id = ?")
        .bind(visible)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update marketplace visibility")?;
    Ok(res.rows_affected() == 1)
}

/// Hard delete; applications go with the session.
#[instrument(skip_all)]
pub async fn delete_session(pool: &Pool, id: i64) -> Result<bool> {
    let res = sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete session")?;
    Ok(res.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn new_session(date: NaiveDate, region: &str) -> NewSession {
        NewSession {
            date,
            start_time: Some("09:00".into()),
            end_time: Some("17:00".into()),
            region: region.into(),
            client_id: None,
            title: None,
            status: SessionStatus::PendingConfirmation,
            min_operators: 2,
            marketplace_visible: false,
            notes: None,
        }
    }

    #[tokio::test]
    async fn filters_compose() {
        let pool = memory_pool().await.unwrap();
        create_session(&pool, &new_session(d(2026, 3, 1), "north")).await.unwrap();
        let march_south = create_session(&pool, &new_session(d(2026, 3, 15), "south")).await.unwrap();
        create_session(&pool, &new_session(d(2026, 4, 2), "south")).await.unwrap();

        let march = list_sessions(&pool, &SessionFilter::between(d(2026, 3, 1), d(2026, 3, 31)))
            .await
            .unwrap();
        assert_eq!(march.len(), 2);
        assert!(march[0].session.date <= march[1].session.date);

        let filter = SessionFilter {
            region: Some("south".into()),
            to: Some(d(2026, 3, 31)),
            ..Default::default()
        };
        let rows = list_sessions(&pool, &filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].session.id, march_south.id);
    }

    #[test]
    fn open_status_sql_lists_every_open_spelling() {
        let expected: Vec<String> = SessionStatus::ALL
            .iter()
            .filter(|s| s.is_open())
            .flat_map(|s| s.spellings())
            .map(|spelling| format!("'{spelling}'"))
            .collect();
        assert_eq!(OPEN_STATUSES_SQL, format!("({})", expected.join(", ")));
    }

    #[tokio::test]
    async fn legacy_spellings_match_their_status_filter() {
        let pool = memory_pool().await.unwrap();
        for (legacy, status) in [
            ("scheduled", SessionStatus::Confirmed),
            ("pending", SessionStatus::PendingConfirmation),
            ("canceled", SessionStatus::Cancelled),
        ] {
            let modern = create_session(&pool, &new_session(d(2026, 5, 5), "east")).await.unwrap();
            update_session_status(&pool, modern.id, status).await.unwrap();
            let old = create_session(&pool, &new_session(d(2026, 5, 6), "east")).await.unwrap();
            sqlx::query("UPDATE sessions SET status = ? WHERE id = ?")
                .bind(legacy)
                .bind(old.id)
                .execute(&pool)
                .await
                .unwrap();

            let filter = SessionFilter {
                status: Some(status),
                ..Default::default()
            };
            let rows = list_sessions(&pool, &filter).await.unwrap();
            let ids: Vec<i64> = rows.iter().map(|r| r.session.id).collect();
            assert_eq!(ids, vec![modern.id, old.id], "filter {status}");
            assert!(rows.iter().all(|r| r.session.status == status));
        }
    }

    #[tokio::test]
    async fn deleted_session_leaves_range_fetch() {
        let pool = memory_pool().await.unwrap();
        let s = create_session(&pool, &new_session(d(2026, 6, 10), "west")).await.unwrap();
        let range = SessionFilter::between(d(2026, 6, 1), d(2026, 6, 30));
        assert_eq!(list_sessions(&pool, &range).await.unwrap().len(), 1);

        assert!(delete_session(&pool, s.id).await.unwrap());
        assert!(list_sessions(&pool, &range).await.unwrap().is_empty());
        assert!(get_session(&pool, s.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_region_rejected() {
        let pool = memory_pool().await.unwrap();
        assert!(create_session(&pool, &new_session(d(2026, 1, 1), " ")).await.is_err());
    }
}
