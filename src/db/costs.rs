use super::model::cost_from_row;
use super::Pool;
use crate::model::{CostStructure, NewCostStructure};
use anyhow::{anyhow, Context, Result};
use tracing::instrument;

#[instrument(skip_all)]
pub async fn create_cost(pool: &Pool, new: &NewCostStructure) -> Result<CostStructure> {
    if new.name.trim().is_empty() {
        return Err(anyhow!("cost name is required"));
    }
    if new.amount_cents < 0 {
        return Err(anyhow!("cost amount must not be negative"));
    }
    let row = sqlx::query(
        "INSERT INTO cost_structures (name, category, frequency, amount_cents) VALUES (?, ?, ?, ?) RETURNING *",
    )
    .bind(new.name.trim())
    .bind(new.category.trim())
    .bind(new.frequency.as_str())
    .bind(new.amount_cents)
    .fetch_one(pool)
    .await
    .context("failed to insert cost structure")?;
    cost_from_row(&row)
}

#[instrument(skip_all)]
pub async fn list_costs(pool: &Pool, category: Option<&str>) -> Result<Vec<CostStructure>> {
    let rows = sqlx::query(
        "SELECT * FROM cost_structures WHERE (? IS NULL OR category = ?) ORDER BY category, name",
    )
    .bind(category)
    .bind(category)
    .fetch_all(pool)
    .await?;
    rows.iter().map(cost_from_row).collect()
}

#[instrument(skip_all)]
pub async fn set_cost_active(pool: &Pool, id: i64, active: bool) -> Result<bool> {
    let res = sqlx::query("UPDATE cost_structures SET active = ? WHERE id = ?")
        .bind(active)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update cost structure")?;
    Ok(res.rows_affected() == 1)
}

#[instrument(skip_all)]
pub async fn delete_cost(pool: &Pool, id: i64) -> Result<bool> {
    let res = sqlx::query("DELETE FROM cost_structures WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete cost structure")?;
    Ok(res.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::finance;
    use crate::model::CostFrequency;

    #[tokio::test]
    async fn monthly_total_over_stored_costs() {
        let pool = memory_pool().await.unwrap();
        let insurance = NewCostStructure {
            name: "Liability insurance".into(),
            category: "insurance".into(),
            frequency: CostFrequency::Annual,
            amount_cents: 240_000,
        };
        let van = NewCostStructure {
            name: "Van lease".into(),
            category: "vehicles".into(),
            frequency: CostFrequency::Monthly,
            amount_cents: 65_000,
        };
        create_cost(&pool, &insurance).await.unwrap();
        let van = create_cost(&pool, &van).await.unwrap();

        let costs = list_costs(&pool, None).await.unwrap();
        assert_eq!(finance::monthly_cost_total(&costs), 85_000);

        set_cost_active(&pool, van.id, false).await.unwrap();
        let costs = list_costs(&pool, None).await.unwrap();
        assert_eq!(finance::monthly_cost_total(&costs), 20_000);

        assert_eq!(list_costs(&pool, Some("vehicles")).await.unwrap().len(), 1);
        assert!(delete_cost(&pool, van.id).await.unwrap());
        assert!(list_costs(&pool, Some("vehicles")).await.unwrap().is_empty());
    }
}
