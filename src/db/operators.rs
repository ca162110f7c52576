use super::model::{operator_from_row, rate_from_row};
use super::Pool;
use crate::model::{NewOperator, Operator, OperatorRate, RateKind};
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use sqlx::Row;
use tracing::instrument;

#[instrument(skip_all)]
pub async fn create_operator(pool: &Pool, new: &NewOperator) -> Result<Operator> {
    if new.first_name.trim().is_empty() || new.last_name.trim().is_empty() {
        return Err(anyhow!("operator first and last name are required"));
    }
    let row = sqlx::query(
        "INSERT INTO operators (first_name, last_name, email, phone, employment_type) \
         VALUES (?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(new.first_name.trim())
    .bind(new.last_name.trim())
    .bind(new.email.as_deref())
    .bind(new.phone.as_deref())
    .bind(new.employment_type.as_str())
    .fetch_one(pool)
    .await
    .context("failed to insert operator")?;
    operator_from_row(&row)
}

#[instrument(skip_all)]
pub async fn list_operators(pool: &Pool, only_active: bool) -> Result<Vec<Operator>> {
    let rows = sqlx::query(
        "SELECT * FROM operators WHERE (? = 0 OR active = 1) ORDER BY last_name, first_name, id",
    )
    .bind(only_active)
    .fetch_all(pool)
    .await?;
    rows.iter().map(operator_from_row).collect()
}

#[instrument(skip_all)]
pub async fn set_operator_active(pool: &Pool, id: i64, active: bool) -> Result<bool> {
    let res = sqlx::query("UPDATE operators SET active = ? WHERE id = ?")
        .bind(active)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update operator")?;
    Ok(res.rows_affected() == 1)
}

#[instrument(skip_all)]
pub async fn add_rate(
    pool: &Pool,
    operator_id: i64,
    kind: RateKind,
    amount_cents: i64,
    effective_from: NaiveDate,
    effective_to: Option<NaiveDate>,
) -> Result<OperatorRate> {
    if amount_cents < 0 {
        return Err(anyhow!("rate amount must not be negative"));
    }
    if effective_to.is_some_and(|end| end < effective_from) {
        return Err(anyhow!("rate ends before it starts"));
    }
    let row = sqlx::query(
        "INSERT INTO operator_rates (operator_id, kind, amount_cents, effective_from, effective_to) \
         VALUES (?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(operator_id)
    .bind(kind.as_str())
    .bind(amount_cents)
    .bind(effective_from)
    .bind(effective_to)
    .fetch_one(pool)
    .await
    .context("failed to insert operator rate")?;
    rate_from_row(&row)
}

#[instrument(skip_all)]
pub async fn list_rates(pool: &Pool, operator_id: i64) -> Result<Vec<OperatorRate>> {
    let rows = sqlx::query(
        "SELECT * FROM operator_rates WHERE operator_id = ? ORDER BY kind, effective_from",
    )
    .bind(operator_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(rate_from_row).collect()
}

/// Rate of `kind` in force on `date`; the latest start wins when ranges overlap.
#[instrument(skip_all)]
pub async fn effective_rate(
    pool: &Pool,
    operator_id: i64,
    kind: RateKind,
    date: NaiveDate,
) -> Result<Option<OperatorRate>> {
    let row = sqlx::query(
        "SELECT * FROM operator_rates \
         WHERE operator_id = ? AND kind = ? AND effective_from <= ? \
           AND (effective_to IS NULL OR effective_to >= ?) \
         ORDER BY effective_from DESC, id DESC LIMIT 1",
    )
    .bind(operator_id)
    .bind(kind.as_str())
    .bind(date)
    .bind(date)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(rate_from_row).transpose()
}

/// Operator cost of a session: per-session rate of every accepted operator,
/// falling back to their daily rate. Operators with neither are reported.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StaffingCost {
    pub total_cents: i64,
    pub unpriced_operators: Vec<i64>,
}

#[instrument(skip_all)]
pub async fn staffing_cost(pool: &Pool, session_id: i64) -> Result<StaffingCost> {
    let rows = sqlx::query(
        "SELECT a.operator_id, s.date FROM session_applications a \
         JOIN sessions s ON s.id = a.session_id \
         WHERE a.session_id = ? AND a.status = 'accepted' ORDER BY a.operator_id",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    let mut cost = StaffingCost::default();
    for row in rows {
        let operator_id: i64 = row.try_get("operator_id")?;
        let date: NaiveDate = row.try_get("date")?;
        let rate = match effective_rate(pool, operator_id, RateKind::PerSession, date).await? {
            Some(rate) => Some(rate),
            None => effective_rate(pool, operator_id, RateKind::Daily, date).await?,
        };
        match rate {
            Some(rate) => cost.total_cents += rate.amount_cents,
            None => cost.unpriced_operators.push(operator_id),
        }
    }
    Ok(cost)
}
