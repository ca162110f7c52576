//! Row mappers and view models returned by repositories.
//!
//! Enum columns are stored as text; an unknown value is an error rather than
//! a silent default.

use crate::model::{
    AmendedDocument, Amendment, AmendmentStatus, ApplicationStatus, Client, ClientStatus,
    CostFrequency, CostStructure, Deposit, DepositStatus, EmploymentType, Invoice, InvoiceStatus,
    Operator, OperatorRate, Quote, QuoteStatus, RateKind, Session, SessionApplication,
    SessionStatus,
};
use anyhow::{anyhow, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

fn parse_column<T>(row: &SqliteRow, column: &str, parse: fn(&str) -> Option<T>) -> Result<T> {
    let raw: String = row.try_get(column)?;
    parse(&raw).ok_or_else(|| anyhow!("unknown {} value '{}'", column, raw))
}

pub(crate) fn client_from_row(row: &SqliteRow) -> Result<Client> {
    Ok(Client {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        company: row.try_get("company")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        structure_type: row.try_get("structure_type")?,
        status: parse_column(row, "status", ClientStatus::parse)?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
    })
}

pub(crate) fn operator_from_row(row: &SqliteRow) -> Result<Operator> {
    Ok(Operator {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        employment_type: parse_column(row, "employment_type", EmploymentType::parse)?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

pub(crate) fn rate_from_row(row: &SqliteRow) -> Result<OperatorRate> {
    Ok(OperatorRate {
        id: row.try_get("id")?,
        operator_id: row.try_get("operator_id")?,
        kind: parse_column(row, "kind", RateKind::parse)?,
        amount_cents: row.try_get("amount_cents")?,
        effective_from: row.try_get("effective_from")?,
        effective_to: row.try_get("effective_to")?,
    })
}

pub(crate) fn session_from_row(row: &SqliteRow) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id")?,
        date: row.try_get("date")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        region: row.try_get("region")?,
        client_id: row.try_get("client_id")?,
        title: row.try_get("title")?,
        status: parse_column(row, "status", SessionStatus::parse)?,
        min_operators: row.try_get("min_operators")?,
        accepted_operators: row.try_get("accepted_operators")?,
        pending_operators: row.try_get("pending_operators")?,
        marketplace_visible: row.try_get("marketplace_visible")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
    })
}

pub(crate) fn application_from_row(row: &SqliteRow) -> Result<SessionApplication> {
    Ok(SessionApplication {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        operator_id: row.try_get("operator_id")?,
        status: parse_column(row, "status", ApplicationStatus::parse)?,
        applied_at: row.try_get("applied_at")?,
        accepted_at: row.try_get("accepted_at")?,
        rejected_at: row.try_get("rejected_at")?,
    })
}

pub(crate) fn quote_from_row(row: &SqliteRow) -> Result<Quote> {
    Ok(Quote {
        id: row.try_get("id")?,
        number: row.try_get("number")?,
        client_id: row.try_get("client_id")?,
        session_id: row.try_get("session_id")?,
        status: parse_column(row, "status", QuoteStatus::parse)?,
        subtotal_cents: row.try_get("subtotal_cents")?,
        tax_rate: row.try_get("tax_rate")?,
        total_cents: row.try_get("total_cents")?,
        issued_on: row.try_get("issued_on")?,
        valid_until: row.try_get("valid_until")?,
    })
}

pub(crate) fn invoice_from_row(row: &SqliteRow) -> Result<Invoice> {
    Ok(Invoice {
        id: row.try_get("id")?,
        number: row.try_get("number")?,
        client_id: row.try_get("client_id")?,
        quote_id: row.try_get("quote_id")?,
        status: parse_column(row, "status", InvoiceStatus::parse)?,
        subtotal_cents: row.try_get("subtotal_cents")?,
        tax_rate: row.try_get("tax_rate")?,
        total_cents: row.try_get("total_cents")?,
        issued_on: row.try_get("issued_on")?,
        due_on: row.try_get("due_on")?,
    })
}

pub(crate) fn amendment_from_row(row: &SqliteRow) -> Result<Amendment> {
    let quote_id: Option<i64> = row.try_get("quote_id")?;
    let invoice_id: Option<i64> = row.try_get("invoice_id")?;
    let id: i64 = row.try_get("id")?;
    let document = match (quote_id, invoice_id) {
        (Some(q), None) => AmendedDocument::Quote(q),
        (None, Some(i)) => AmendedDocument::Invoice(i),
        _ => return Err(anyhow!("amendment {} must reference exactly one document", id)),
    };
    Ok(Amendment {
        id,
        document,
        delta_cents: row.try_get("delta_cents")?,
        reason: row.try_get("reason")?,
        status: parse_column(row, "status", AmendmentStatus::parse)?,
        signed_at: row.try_get("signed_at")?,
    })
}

pub(crate) fn deposit_from_row(row: &SqliteRow) -> Result<Deposit> {
    Ok(Deposit {
        id: row.try_get("id")?,
        invoice_id: row.try_get("invoice_id")?,
        amount_cents: row.try_get("amount_cents")?,
        status: parse_column(row, "status", DepositStatus::parse)?,
        received_on: row.try_get("received_on")?,
    })
}

pub(crate) fn cost_from_row(row: &SqliteRow) -> Result<CostStructure> {
    Ok(CostStructure {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        frequency: parse_column(row, "frequency", CostFrequency::parse)?,
        amount_cents: row.try_get("amount_cents")?,
        active: row.try_get("active")?,
    })
}

/// Session row joined with its client's display fields, as read by planning.
#[derive(Debug, Clone)]
pub struct SessionWithClient {
    pub session: Session,
    pub client_first_name: Option<String>,
    pub client_last_name: Option<String>,
    pub client_company: Option<String>,
}

impl SessionWithClient {
    pub fn client_name(&self) -> Option<String> {
        if let Some(company) = self.client_company.as_deref().filter(|c| !c.trim().is_empty()) {
            return Some(company.to_string());
        }
        match (&self.client_first_name, &self.client_last_name) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            _ => None,
        }
    }
}

pub(crate) fn session_with_client_from_row(row: &SqliteRow) -> Result<SessionWithClient> {
    Ok(SessionWithClient {
        session: session_from_row(row)?,
        client_first_name: row.try_get("client_first_name")?,
        client_last_name: row.try_get("client_last_name")?,
        client_company: row.try_get("client_company")?,
    })
}
