//! Quotes, invoices, amendments and deposits.
//!
//! Totals are computed by [`crate::finance`] on write and stored with the row.
use super::model::{amendment_from_row, deposit_from_row, invoice_from_row, quote_from_row};
use super::Pool;
use crate::finance;
use crate::model::{
    AmendedDocument, Amendment, Deposit, DepositStatus, Invoice, InvoiceStatus, NewInvoice,
    NewQuote, Quote, QuoteStatus,
};
use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{Sqlite, Transaction};
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy)]
enum NumberSeries {
    Quote,
    Invoice,
}

impl NumberSeries {
    fn prefix(self) -> &'static str {
        match self {
            NumberSeries::Quote => "Q",
            NumberSeries::Invoice => "F",
        }
    }
}

/// Next `PREFIX-YYYY-NNNN` in the series, numbered from 1 each year.
async fn next_number(
    tx: &mut Transaction<'_, Sqlite>,
    series: NumberSeries,
    year: i32,
) -> Result<String> {
    let prefix = format!("{}-{}-", series.prefix(), year);
    let sql = match series {
        NumberSeries::Quote => "SELECT MAX(CAST(substr(number, ?) AS INTEGER)) FROM quotes WHERE number LIKE ?",
        NumberSeries::Invoice => "SELECT MAX(CAST(substr(number, ?) AS INTEGER)) FROM invoices WHERE number LIKE ?",
    };
    let max_seq: Option<i64> = sqlx::query_scalar(sql)
        .bind(prefix.len() as i64 + 1)
        .bind(format!("{}%", prefix))
        .fetch_one(&mut **tx)
        .await?;
    Ok(format!("{}{:04}", prefix, max_seq.unwrap_or(0) + 1))
}

#[instrument(skip_all)]
pub async fn create_quote(pool: &Pool, new: &NewQuote) -> Result<Quote> {
    let totals = finance::quote_total(new.subtotal_cents, new.tax_rate)?;
    let mut tx = pool.begin().await?;
    let number = next_number(&mut tx, NumberSeries::Quote, new.issued_on.year()).await?;
    let row = sqlx::query(
        "INSERT INTO quotes (number, client_id, session_id, status, subtotal_cents, tax_rate, \
         total_cents, issued_on, valid_until) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(&number)
    .bind(new.client_id)
    .bind(new.session_id)
    .bind(QuoteStatus::Draft.as_str())
    .bind(totals.subtotal_cents)
    .bind(totals.tax_rate)
    .bind(totals.total_cents)
    .bind(new.issued_on)
    .bind(new.valid_until)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert quote")?;
    let quote = quote_from_row(&row)?;
    tx.commit().await?;
    info!(quote = %quote.number, total = quote.total_cents, "quote created");
    Ok(quote)
}

#[instrument(skip_all)]
pub async fn get_quote(pool: &Pool, id: i64) -> Result<Option<Quote>> {
    let row = sqlx::query("SELECT * FROM quotes WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(quote_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn list_quotes(pool: &Pool, client_id: Option<i64>) -> Result<Vec<Quote>> {
    let rows = sqlx::query(
        "SELECT * FROM quotes WHERE (? IS NULL OR client_id = ?) ORDER BY issued_on DESC, id DESC",
    )
    .bind(client_id)
    .bind(client_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(quote_from_row).collect()
}

#[instrument(skip_all)]
pub async fn update_quote_status(pool: &Pool, id: i64, status: QuoteStatus) -> Result<bool> {
    let res = sqlx::query("UPDATE quotes SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update quote status")?;
    Ok(res.rows_affected() == 1)
}

/// Re-prices a quote; the total is recomputed from the new inputs.
#[instrument(skip_all)]
pub async fn reprice_quote(pool: &Pool, id: i64, subtotal_cents: i64, tax_rate: f64) -> Result<Quote> {
    let totals = finance::quote_total(subtotal_cents, tax_rate)?;
    let row = sqlx::query(
        "UPDATE quotes SET subtotal_cents = ?, tax_rate = ?, total_cents = ? WHERE id = ? RETURNING *",
    )
    .bind(totals.subtotal_cents)
    .bind(totals.tax_rate)
    .bind(totals.total_cents)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to reprice quote")?;
    let row = row.ok_or_else(|| anyhow!("quote {} not found", id))?;
    quote_from_row(&row)
}

#[instrument(skip_all)]
pub async fn create_invoice(pool: &Pool, new: &NewInvoice) -> Result<Invoice> {
    let totals = finance::quote_total(new.subtotal_cents, new.tax_rate)?;
    let mut tx = pool.begin().await?;
    let number = next_number(&mut tx, NumberSeries::Invoice, new.issued_on.year()).await?;
    let row = sqlx::query(
        "INSERT INTO invoices (number, client_id, quote_id, status, subtotal_cents, tax_rate, \
         total_cents, issued_on, due_on) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(&number)
    .bind(new.client_id)
    .bind(new.quote_id)
    .bind(InvoiceStatus::Draft.as_str())
    .bind(totals.subtotal_cents)
    .bind(totals.tax_rate)
    .bind(totals.total_cents)
    .bind(new.issued_on)
    .bind(new.due_on)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert invoice")?;
    let invoice = invoice_from_row(&row)?;
    tx.commit().await?;
    info!(invoice = %invoice.number, total = invoice.total_cents, "invoice created");
    Ok(invoice)
}

/// Invoice carrying over an accepted quote's pricing, plus its signed amendments.
#[instrument(skip_all)]
pub async fn invoice_from_quote(
    pool: &Pool,
    quote_id: i64,
    issued_on: NaiveDate,
    due_on: Option<NaiveDate>,
) -> Result<Invoice> {
    let quote = get_quote(pool, quote_id)
        .await?
        .ok_or_else(|| anyhow!("quote {} not found", quote_id))?;
    if quote.status != QuoteStatus::Accepted {
        return Err(anyhow!("quote {} is {}, not accepted", quote.number, quote.status));
    }
    let amendments = list_amendments(pool, AmendedDocument::Quote(quote_id)).await?;
    let amended_subtotal = finance::adjusted_total(quote.subtotal_cents, &amendments)?;
    create_invoice(
        pool,
        &NewInvoice {
            client_id: quote.client_id,
            quote_id: Some(quote.id),
            subtotal_cents: amended_subtotal,
            tax_rate: quote.tax_rate,
            issued_on,
            due_on,
        },
    )
    .await
}

#[instrument(skip_all)]
pub async fn get_invoice(pool: &Pool, id: i64) -> Result<Option<Invoice>> {
    let row = sqlx::query("SELECT * FROM invoices WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(invoice_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn list_invoices(pool: &Pool, client_id: Option<i64>) -> Result<Vec<Invoice>> {
    let rows = sqlx::query(
        "SELECT * FROM invoices WHERE (? IS NULL OR client_id = ?) ORDER BY issued_on DESC, id DESC",
    )
    .bind(client_id)
    .bind(client_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(invoice_from_row).collect()
}

#[instrument(skip_all)]
pub async fn update_invoice_status(pool: &Pool, id: i64, status: InvoiceStatus) -> Result<bool> {
    let res = sqlx::query("UPDATE invoices SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update invoice status")?;
    Ok(res.rows_affected() == 1)
}

/// Sum of paid invoice totals issued within `[from, to]`.
#[instrument(skip_all)]
pub async fn paid_revenue(pool: &Pool, from: NaiveDate, to: NaiveDate) -> Result<i64> {
    let total: Option<i64> = sqlx::query_scalar(
        "SELECT SUM(total_cents) FROM invoices WHERE status = 'paid' AND issued_on >= ? AND issued_on <= ?",
    )
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await?;
    Ok(total.unwrap_or(0))
}

#[instrument(skip_all)]
pub async fn add_amendment(
    pool: &Pool,
    document: AmendedDocument,
    delta_cents: i64,
    reason: &str,
) -> Result<Amendment> {
    if reason.trim().is_empty() {
        return Err(anyhow!("amendment reason is required"));
    }
    let (quote_id, invoice_id) = match document {
        AmendedDocument::Quote(id) => (Some(id), None),
        AmendedDocument::Invoice(id) => (None, Some(id)),
    };
    let row = sqlx::query(
        "INSERT INTO amendments (quote_id, invoice_id, delta_cents, reason, status) \
         VALUES (?, ?, ?, ?, 'draft') RETURNING *",
    )
    .bind(quote_id)
    .bind(invoice_id)
    .bind(delta_cents)
    .bind(reason.trim())
    .fetch_one(pool)
    .await
    .context("failed to insert amendment")?;
    amendment_from_row(&row)
}

/// Draft → signed. Only signed amendments change a document's total.
#[instrument(skip_all)]
pub async fn sign_amendment(pool: &Pool, id: i64) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE amendments SET status = 'signed', signed_at = ? WHERE id = ? AND status = 'draft'",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("failed to sign amendment")?;
    Ok(res.rows_affected() == 1)
}

#[instrument(skip_all)]
pub async fn list_amendments(pool: &Pool, document: AmendedDocument) -> Result<Vec<Amendment>> {
    let rows = match document {
        AmendedDocument::Quote(id) => {
            sqlx::query("SELECT * FROM amendments WHERE quote_id = ? ORDER BY id")
                .bind(id)
                .fetch_all(pool)
                .await?
        }
        AmendedDocument::Invoice(id) => {
            sqlx::query("SELECT * FROM amendments WHERE invoice_id = ? ORDER BY id")
                .bind(id)
                .fetch_all(pool)
                .await?
        }
    };
    rows.iter().map(amendment_from_row).collect()
}

#[instrument(skip_all)]
pub async fn add_deposit(pool: &Pool, invoice_id: i64, amount_cents: i64) -> Result<Deposit> {
    if amount_cents <= 0 {
        return Err(anyhow!("deposit amount must be positive"));
    }
    let row = sqlx::query(
        "INSERT INTO deposits (invoice_id, amount_cents, status) VALUES (?, ?, 'pending') RETURNING *",
    )
    .bind(invoice_id)
    .bind(amount_cents)
    .fetch_one(pool)
    .await
    .context("failed to insert deposit")?;
    deposit_from_row(&row)
}

#[instrument(skip_all)]
pub async fn update_deposit_status(
    pool: &Pool,
    id: i64,
    status: DepositStatus,
    received_on: Option<NaiveDate>,
) -> Result<bool> {
    let res = sqlx::query("UPDATE deposits SET status = ?, received_on = COALESCE(?, received_on) WHERE id = ?")
        .bind(status.as_str())
        .bind(received_on)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update deposit")?;
    Ok(res.rows_affected() == 1)
}

#[instrument(skip_all)]
pub async fn list_deposits(pool: &Pool, invoice_id: i64) -> Result<Vec<Deposit>> {
    let rows = sqlx::query("SELECT * FROM deposits WHERE invoice_id = ? ORDER BY id")
        .bind(invoice_id)
        .fetch_all(pool)
        .await?;
    rows.iter().map(deposit_from_row).collect()
}

/// What a client still owes on one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceBalance {
    pub invoice_id: i64,
    pub number: String,
    pub total_cents: i64,
    pub adjusted_total_cents: i64,
    pub balance_due_cents: i64,
}

#[instrument(skip_all)]
pub async fn invoice_balance(pool: &Pool, invoice_id: i64) -> Result<InvoiceBalance> {
    let invoice = get_invoice(pool, invoice_id)
        .await?
        .ok_or_else(|| anyhow!("invoice {} not found", invoice_id))?;
    let amendments = list_amendments(pool, AmendedDocument::Invoice(invoice_id)).await?;
    let deposits = list_deposits(pool, invoice_id).await?;
    let adjusted = finance::adjusted_total(invoice.total_cents, &amendments)?;
    Ok(InvoiceBalance {
        invoice_id,
        number: invoice.number,
        total_cents: invoice.total_cents,
        adjusted_total_cents: adjusted,
        balance_due_cents: finance::balance_due(adjusted, &deposits)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_client, memory_pool};
    use crate::model::NewClient;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    async fn client_id(pool: &Pool) -> i64 {
        create_client(
            pool,
            &NewClient {
                first_name: "Gil".into(),
                last_name: "Moreau".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
    }

    fn quote(client_id: i64, subtotal: i64, rate: f64, issued_on: NaiveDate) -> NewQuote {
        NewQuote {
            client_id,
            session_id: None,
            subtotal_cents: subtotal,
            tax_rate: rate,
            issued_on,
            valid_until: None,
        }
    }

    #[tokio::test]
    async fn quote_numbers_restart_each_year() {
        let pool = memory_pool().await.unwrap();
        let cid = client_id(&pool).await;
        let a = create_quote(&pool, &quote(cid, 1_000, 20.0, d(2026, 1, 5))).await.unwrap();
        let b = create_quote(&pool, &quote(cid, 1_000, 20.0, d(2026, 2, 5))).await.unwrap();
        let c = create_quote(&pool, &quote(cid, 1_000, 20.0, d(2027, 1, 5))).await.unwrap();
        assert_eq!(a.number, "Q-2026-0001");
        assert_eq!(b.number, "Q-2026-0002");
        assert_eq!(c.number, "Q-2027-0001");
    }

    #[tokio::test]
    async fn stored_total_matches_finance() {
        let pool = memory_pool().await.unwrap();
        let cid = client_id(&pool).await;
        for rate in [0.0, 5.5, 20.0] {
            let q = create_quote(&pool, &quote(cid, 250_000, rate, d(2026, 3, 1))).await.unwrap();
            let expected = finance::quote_total(250_000, rate).unwrap().total_cents;
            assert_eq!(q.total_cents, expected);
        }
        let repriced = reprice_quote(&pool, 1, 100_000, 10.0).await.unwrap();
        assert_eq!(repriced.total_cents, 110_000);
    }

    #[tokio::test]
    async fn invalid_rate_is_not_persisted() {
        let pool = memory_pool().await.unwrap();
        let cid = client_id(&pool).await;
        assert!(create_quote(&pool, &quote(cid, 1_000, 150.0, d(2026, 1, 1))).await.is_err());
        assert!(list_quotes(&pool, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invoice_requires_accepted_quote_and_tracks_balance() {
        let pool = memory_pool().await.unwrap();
        let cid = client_id(&pool).await;
        let q = create_quote(&pool, &quote(cid, 100_000, 20.0, d(2026, 4, 1))).await.unwrap();
        assert!(invoice_from_quote(&pool, q.id, d(2026, 4, 10), None).await.is_err());

        let amendment = add_amendment(&pool, AmendedDocument::Quote(q.id), 10_000, "extra range hour")
            .await
            .unwrap();
        assert!(sign_amendment(&pool, amendment.id).await.unwrap());
        assert!(update_quote_status(&pool, q.id, QuoteStatus::Accepted).await.unwrap());

        let invoice = invoice_from_quote(&pool, q.id, d(2026, 4, 10), Some(d(2026, 5, 10)))
            .await
            .unwrap();
        assert_eq!(invoice.number, "F-2026-0001");
        assert_eq!(invoice.subtotal_cents, 110_000);
        assert_eq!(invoice.total_cents, 132_000);

        let deposit = add_deposit(&pool, invoice.id, 32_000).await.unwrap();
        let balance = invoice_balance(&pool, invoice.id).await.unwrap();
        assert_eq!(balance.balance_due_cents, 132_000);

        update_deposit_status(&pool, deposit.id, DepositStatus::Received, Some(d(2026, 4, 12)))
            .await
            .unwrap();
        let discount = add_amendment(&pool, AmendedDocument::Invoice(invoice.id), -2_000, "loyalty")
            .await
            .unwrap();
        sign_amendment(&pool, discount.id).await.unwrap();

        let balance = invoice_balance(&pool, invoice.id).await.unwrap();
        assert_eq!(balance.adjusted_total_cents, 130_000);
        assert_eq!(balance.balance_due_cents, 98_000);
    }

    #[tokio::test]
    async fn revenue_counts_only_paid_invoices() {
        let pool = memory_pool().await.unwrap();
        let cid = client_id(&pool).await;
        let new = |issued_on| NewInvoice {
            client_id: cid,
            quote_id: None,
            subtotal_cents: 10_000,
            tax_rate: 0.0,
            issued_on,
            due_on: None,
        };
        let paid = create_invoice(&pool, &new(d(2026, 5, 3))).await.unwrap();
        create_invoice(&pool, &new(d(2026, 5, 4))).await.unwrap();
        update_invoice_status(&pool, paid.id, InvoiceStatus::Paid).await.unwrap();
        assert_eq!(paid_revenue(&pool, d(2026, 5, 1), d(2026, 5, 31)).await.unwrap(), 10_000);
        assert_eq!(paid_revenue(&pool, d(2026, 6, 1), d(2026, 6, 30)).await.unwrap(), 0);
    }
}
