use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeStatus {
    Pending,
    Overdue,
    Paid,
    Waived,
}

impl FeeStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "unpaid" => Some(Self::Pending),
            "overdue" => Some(Self::Overdue),
            "paid" => Some(Self::Paid),
            "waived" => Some(Self::Waived),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Overdue => "overdue",
            Self::Paid => "paid",
            Self::Waived => "waived",
        }
    }

    /// Paid and waived cycles are never touched by automatic processing.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Paid | Self::Waived)
    }

    /// Initial status for a freshly generated cycle.
    pub fn initial_for(period_end: NaiveDate, today: NaiveDate) -> Self {
        if period_end < today {
            Self::Overdue
        } else {
            Self::Pending
        }
    }
}

impl fmt::Display for FeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeAction {
    Paid,
    Waived,
}

impl FeeAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "paid" => Some(Self::Paid),
            "waived" => Some(Self::Waived),
            _ => None,
        }
    }

    pub fn status(self) -> FeeStatus {
        match self {
            Self::Paid => FeeStatus::Paid,
            Self::Waived => FeeStatus::Waived,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeCycle {
    /// Insertion order; breaks ties between rows created at the same instant.
    #[serde(skip)]
    pub seq: i64,
    pub id: String,
    pub student_id: String,
    pub label: String,
    pub amount: Decimal,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub status: FeeStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub settled_by: Option<String>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FeeCycle {
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.period_start <= end && start <= self.period_end
    }
}

/// Billing parameters read from the roster. Either field may be unset while a
/// student is "not yet configured".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingParams {
    pub join_date: Option<NaiveDate>,
    pub monthly_fee: Option<Decimal>,
}

impl BillingParams {
    /// Both parameters present and the fee positive.
    pub fn valid(&self) -> Option<(NaiveDate, Decimal)> {
        match (self.join_date, self.monthly_fee) {
            (Some(d), Some(fee)) if fee > Decimal::ZERO => Some((d, fee)),
            _ => None,
        }
    }
}
