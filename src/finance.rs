//! Money arithmetic for quotes, invoices and costs.
//!
//! Every stored total goes through these functions; amounts are integer
//! cents and tax rates are percentages.
use crate::model::{
    Amendment, AmendmentStatus, CostFrequency, CostStructure, Deposit, DepositStatus,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FinanceError {
    #[error("amount must not be negative (got {0} cents)")]
    NegativeAmount(i64),
    #[error("tax rate must be within 0..=100 (got {0})")]
    InvalidTaxRate(f64),
    #[error("quantity must be positive (got {0})")]
    InvalidQuantity(i64),
    #[error("amount does not fit in 64-bit cents")]
    Overflow,
}

/// One priced line of a quote or invoice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineItem {
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

/// Subtotal, tax and total of a document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Totals {
    pub subtotal_cents: i64,
    pub tax_rate: f64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

pub fn check_tax_rate(rate: f64) -> Result<(), FinanceError> {
    if rate.is_finite() && (0.0..=100.0).contains(&rate) {
        Ok(())
    } else {
        Err(FinanceError::InvalidTaxRate(rate))
    }
}

/// Rate in hundredths of a percent; `20.0` is `2000`.
fn rate_basis_points(tax_rate: f64) -> Result<i64, FinanceError> {
    check_tax_rate(tax_rate)?;
    Ok((tax_rate * 100.0).round() as i64)
}

/// `subtotal × rate / 100`, rounded half away from zero. The rate is taken to
/// hundredths of a percent and the division is done in integers.
pub fn tax_amount(subtotal_cents: i64, tax_rate: f64) -> Result<i64, FinanceError> {
    if subtotal_cents < 0 {
        return Err(FinanceError::NegativeAmount(subtotal_cents));
    }
    let bp = i128::from(rate_basis_points(tax_rate)?);
    let tax = (i128::from(subtotal_cents) * bp * 2 + 10_000) / 20_000;
    i64::try_from(tax).map_err(|_| FinanceError::Overflow)
}

/// `subtotal + subtotal × rate / 100`.
pub fn quote_total(subtotal_cents: i64, tax_rate: f64) -> Result<Totals, FinanceError> {
    let tax_cents = tax_amount(subtotal_cents, tax_rate)?;
    Ok(Totals {
        subtotal_cents,
        tax_rate,
        tax_cents,
        total_cents: subtotal_cents
            .checked_add(tax_cents)
            .ok_or(FinanceError::Overflow)?,
    })
}

pub fn line_subtotal(lines: &[LineItem]) -> Result<i64, FinanceError> {
    lines.iter().try_fold(0_i64, |acc, line| {
        if line.quantity <= 0 {
            return Err(FinanceError::InvalidQuantity(line.quantity));
        }
        if line.unit_price_cents < 0 {
            return Err(FinanceError::NegativeAmount(line.unit_price_cents));
        }
        line.quantity
            .checked_mul(line.unit_price_cents)
            .and_then(|amount| acc.checked_add(amount))
            .ok_or(FinanceError::Overflow)
    })
}

fn checked_sum(mut amounts: impl Iterator<Item = i64>) -> Result<i64, FinanceError> {
    amounts.try_fold(0_i64, |acc, a| acc.checked_add(a).ok_or(FinanceError::Overflow))
}

/// Document total after signed amendments; drafts don't count.
pub fn adjusted_total(total_cents: i64, amendments: &[Amendment]) -> Result<i64, FinanceError> {
    let delta = checked_sum(
        amendments
            .iter()
            .filter(|a| a.status == AmendmentStatus::Signed)
            .map(|a| a.delta_cents),
    )?;
    total_cents.checked_add(delta).ok_or(FinanceError::Overflow)
}

/// Amount still owed once received deposits are subtracted.
pub fn balance_due(adjusted_total_cents: i64, deposits: &[Deposit]) -> Result<i64, FinanceError> {
    let received = checked_sum(
        deposits
            .iter()
            .filter(|d| d.status == DepositStatus::Received)
            .map(|d| d.amount_cents),
    )?;
    adjusted_total_cents
        .checked_sub(received)
        .ok_or(FinanceError::Overflow)
}

pub fn monthly_cost(cost: &CostStructure) -> i64 {
    match cost.frequency {
        CostFrequency::Monthly => cost.amount_cents,
        CostFrequency::Annual => (cost.amount_cents as f64 / 12.0).round() as i64,
    }
}

pub fn monthly_cost_total(costs: &[CostStructure]) -> i64 {
    costs.iter().filter(|c| c.active).map(monthly_cost).sum()
}

/// Gross margin as a percentage of revenue. `None` when there is no revenue.
pub fn margin_percent(revenue_cents: i64, cost_cents: i64) -> Option<f64> {
    if revenue_cents <= 0 {
        return None;
    }
    Some((revenue_cents as f64 - cost_cents as f64) * 100.0 / revenue_cents as f64)
}

pub fn meets_margin_target(revenue_cents: i64, cost_cents: i64, target_percent: f64) -> bool {
    margin_percent(revenue_cents, cost_cents).is_some_and(|m| m >= target_percent)
}

/// Formats cents as `1234.56`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
