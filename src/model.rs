//! Domain records and the string-backed enums stored in their rows.
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares an enum stored as lowercase text, with `as_str`/`parse` and `Display`.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::parse(s).ok_or_else(|| format!("unknown {} '{}'", stringify!($name), s))
            }
        }
    };
}

text_enum!(
    /// Sales lifecycle of a client.
    ClientStatus {
        Prospect => "prospect",
        Active => "active",
        Inactive => "inactive",
    }
);

impl ClientStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prospect" => Some(Self::Prospect),
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

text_enum!(
    /// Session lifecycle. One vocabulary for every caller.
    SessionStatus {
        PendingConfirmation => "pending_confirmation",
        Confirmed => "confirmed",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
);

impl SessionStatus {
    /// Every text this status may be stored as, canonical spelling first.
    /// `scheduled`, `pending` and `canceled` come from older rows.
    pub fn spellings(&self) -> &'static [&'static str] {
        match self {
            Self::PendingConfirmation => &["pending_confirmation", "pending"],
            Self::Confirmed => &["confirmed", "scheduled"],
            Self::InProgress => &["in_progress"],
            Self::Completed => &["completed"],
            Self::Cancelled => &["cancelled", "canceled"],
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.spellings().contains(&s.as_str()))
    }

    /// Whether operators can still be staffed onto a session in this state.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::PendingConfirmation | Self::Confirmed)
    }
}

text_enum!(
    EmploymentType {
        Salary => "salary",
        Freelance => "freelance",
    }
);

impl EmploymentType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "salary" | "salaried" => Some(Self::Salary),
            "freelance" => Some(Self::Freelance),
            _ => None,
        }
    }
}

text_enum!(
    RateKind {
        Hourly => "hourly",
        Daily => "daily",
        PerSession => "per_session",
        Monthly => "monthly",
    }
);

impl RateKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            "per_session" | "session" => Some(Self::PerSession),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }
}

text_enum!(
    /// State of one operator's application to staff one session.
    ApplicationStatus {
        Pending => "pending",
        Accepted => "accepted",
        Rejected => "rejected",
    }
);

impl ApplicationStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

text_enum!(
    QuoteStatus {
        Draft => "draft",
        Sent => "sent",
        Accepted => "accepted",
        Rejected => "rejected",
        Expired => "expired",
    }
);

impl QuoteStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "sent" => Some(Self::Sent),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

text_enum!(
    InvoiceStatus {
        Draft => "draft",
        Sent => "sent",
        Paid => "paid",
        Overdue => "overdue",
        Cancelled => "cancelled",
    }
);

impl InvoiceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "sent" => Some(Self::Sent),
            "paid" => Some(Self::Paid),
            "overdue" => Some(Self::Overdue),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

text_enum!(
    AmendmentStatus {
        Draft => "draft",
        Signed => "signed",
    }
);

impl AmendmentStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "signed" => Some(Self::Signed),
            _ => None,
        }
    }
}

text_enum!(
    DepositStatus {
        Pending => "pending",
        Received => "received",
        Refunded => "refunded",
    }
);

impl DepositStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "received" => Some(Self::Received),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }
}

text_enum!(
    CostFrequency {
        Monthly => "monthly",
        Annual => "annual",
    }
);

impl CostFrequency {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Some(Self::Monthly),
            "annual" | "yearly" => Some(Self::Annual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub structure_type: Option<String>,
    pub status: ClientStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn display_name(&self) -> String {
        match self.company.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(company) => company.to_string(),
            None => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewClient {
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub structure_type: Option<String>,
    pub status: Option<ClientStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operator {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub employment_type: EmploymentType,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOperator {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub employment_type: EmploymentType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorRate {
    pub id: i64,
    pub operator_id: i64,
    pub kind: RateKind,
    pub amount_cents: i64,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}

impl OperatorRate {
    /// Whether the rate is in force on `date` (both bounds inclusive).
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.effective_from <= date && self.effective_to.map_or(true, |end| date <= end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub date: NaiveDate,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub region: String,
    pub client_id: Option<i64>,
    pub title: Option<String>,
    pub status: SessionStatus,
    pub min_operators: i64,
    pub accepted_operators: i64,
    pub pending_operators: i64,
    pub marketplace_visible: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub date: NaiveDate,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub region: String,
    pub client_id: Option<i64>,
    pub title: Option<String>,
    pub status: SessionStatus,
    pub min_operators: i64,
    pub marketplace_visible: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionApplication {
    pub id: i64,
    pub session_id: i64,
    pub operator_id: i64,
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: i64,
    pub number: String,
    pub client_id: i64,
    pub session_id: Option<i64>,
    pub status: QuoteStatus,
    pub subtotal_cents: i64,
    pub tax_rate: f64,
    pub total_cents: i64,
    pub issued_on: NaiveDate,
    pub valid_until: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuote {
    pub client_id: i64,
    pub session_id: Option<i64>,
    pub subtotal_cents: i64,
    pub tax_rate: f64,
    pub issued_on: NaiveDate,
    pub valid_until: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub number: String,
    pub client_id: i64,
    pub quote_id: Option<i64>,
    pub status: InvoiceStatus,
    pub subtotal_cents: i64,
    pub tax_rate: f64,
    pub total_cents: i64,
    pub issued_on: NaiveDate,
    pub due_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    pub client_id: i64,
    pub quote_id: Option<i64>,
    pub subtotal_cents: i64,
    pub tax_rate: f64,
    pub issued_on: NaiveDate,
    pub due_on: Option<NaiveDate>,
}

/// The document an amendment adjusts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum AmendedDocument {
    Quote(i64),
    Invoice(i64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amendment {
    pub id: i64,
    pub document: AmendedDocument,
    pub delta_cents: i64,
    pub reason: String,
    pub status: AmendmentStatus,
    pub signed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
    pub id: i64,
    pub invoice_id: i64,
    pub amount_cents: i64,
    pub status: DepositStatus,
    pub received_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostStructure {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub frequency: CostFrequency,
    pub amount_cents: i64,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCostStructure {
    pub name: String,
    pub category: String,
    pub frequency: CostFrequency,
    pub amount_cents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_scheduled_maps_to_confirmed() {
        assert_eq!(SessionStatus::parse("scheduled"), Some(SessionStatus::Confirmed));
        assert_eq!(SessionStatus::parse("in_progress"), Some(SessionStatus::InProgress));
        assert_eq!(SessionStatus::parse("bogus"), None);
    }

    #[test]
    fn every_status_round_trips_through_text() {
        for status in SessionStatus::ALL {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(*status));
        }
        for status in InvoiceStatus::ALL {
            assert_eq!(status.as_str().parse::<InvoiceStatus>().unwrap(), *status);
        }
    }

    #[test]
    fn rate_covers_inclusive_range() {
        let rate = OperatorRate {
            id: 1,
            operator_id: 1,
            kind: RateKind::Daily,
            amount_cents: 30_000,
            effective_from: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            effective_to: Some(NaiveDate::from_ymd_opt(2026, 6, 30).unwrap()),
        };
        assert!(rate.covers(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));
        assert!(rate.covers(NaiveDate::from_ymd_opt(2026, 6, 30).unwrap()));
        assert!(!rate.covers(NaiveDate::from_ymd_opt(2026, 7, 1).unwrap()));
        assert!(!rate.covers(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()));
    }

    #[test]
    fn client_display_name_prefers_company() {
        let mut client = Client {
            id: 1,
            first_name: "Ana".into(),
            last_name: "Silva".into(),
            company: Some("Metro PD".into()),
            email: None,
            phone: None,
            structure_type: Some("police".into()),
            status: ClientStatus::Active,
            notes: None,
            created_at: Utc::now(),
        };
        assert_eq!(client.display_name(), "Metro PD");
        client.company = None;
        assert_eq!(client.display_name(), "Ana Silva");
    }
}
