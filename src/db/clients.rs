use super::model::client_from_row;
use super::Pool;
use crate::model::{Client, ClientStatus, NewClient};
use anyhow::{anyhow, Context, Result};
use tracing::instrument;

fn blank_to_none(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[instrument(skip_all)]
pub async fn create_client(pool: &Pool, new: &NewClient) -> Result<Client> {
    let first_name = new.first_name.trim();
    let last_name = new.last_name.trim();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(anyhow!("client first and last name are required"));
    }
    let status = new.status.unwrap_or(ClientStatus::Prospect);

    let row = sqlx::query(
        "INSERT INTO clients (first_name, last_name, company, email, phone, structure_type, status, notes) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(first_name)
    .bind(last_name)
    .bind(blank_to_none(&new.company))
    .bind(blank_to_none(&new.email))
    .bind(blank_to_none(&new.phone))
    .bind(blank_to_none(&new.structure_type))
    .bind(status.as_str())
    .bind(blank_to_none(&new.notes))
    .fetch_one(pool)
    .await
    .context("failed to insert client")?;
    client_from_row(&row)
}

#[instrument(skip_all)]
pub async fn get_client(pool: &Pool, id: i64) -> Result<Option<Client>> {
    let row = sqlx::query("SELECT * FROM clients WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(client_from_row).transpose()
}

/// Clients ordered by last then first name, optionally restricted to one status.
#[instrument(skip_all)]
pub async fn list_clients(pool: &Pool, status: Option<ClientStatus>) -> Result<Vec<Client>> {
    let rows = match status {
        Some(status) => {
            sqlx::query("SELECT * FROM clients WHERE status = ? ORDER BY last_name, first_name, id")
                .bind(status.as_str())
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query("SELECT * FROM clients ORDER BY last_name, first_name, id")
                .fetch_all(pool)
                .await?
        }
    };
    rows.iter().map(client_from_row).collect()
}

#[instrument(skip_all)]
pub async fn update_client_status(pool: &Pool, id: i64, status: ClientStatus) -> Result<bool> {
    let res = sqlx::query("UPDATE clients SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update client status")?;
    Ok(res.rows_affected() == 1)
}

/// Hard delete. Returns whether a row was removed.
#[instrument(skip_all)]
pub async fn delete_client(pool: &Pool, id: i64) -> Result<bool> {
    let res = sqlx::query("DELETE FROM clients WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete client")?;
    Ok(res.rows_affected() == 1)
}
