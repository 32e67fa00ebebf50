//! Calendar-month billing periods derived from a join date.
//!
//! Every period starts on the first day of a month and ends on the last day of
//! the same month (inclusive). The first period is the month containing the
//! join date.

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

/// Absolute ceiling on periods produced by one call.
pub const HARD_CAP_PERIODS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePeriod {
    pub label: String,
    pub amount: Decimal,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationLimits {
    pub horizon_months: u32,
    pub max_periods: usize,
}

impl GenerationLimits {
    pub fn new(horizon_months: u32, max_periods: usize) -> Self {
        Self {
            horizon_months,
            max_periods: max_periods.min(HARD_CAP_PERIODS),
        }
    }

    /// Last admissible `period_start` for the given day.
    fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_add_months(Months::new(self.horizon_months))
            .unwrap_or(NaiveDate::MAX)
    }
}

pub fn month_start(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

pub fn month_end(d: NaiveDate) -> NaiveDate {
    month_start(d)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(d)
}

pub fn next_month(d: NaiveDate) -> Option<NaiveDate> {
    month_start(d).checked_add_months(Months::new(1))
}

pub fn period_label(period_start: NaiveDate) -> String {
    period_start.format("%B %Y Fee").to_string()
}

pub fn candidate_for(month: NaiveDate, amount: Decimal) -> CandidatePeriod {
    let start = month_start(month);
    CandidatePeriod {
        label: period_label(start),
        amount,
        period_start: start,
        period_end: month_end(start),
    }
}

/// Full schedule from the join month up to the horizon.
pub fn generate(
    join_date: NaiveDate,
    amount: Decimal,
    limits: GenerationLimits,
    today: NaiveDate,
) -> Vec<CandidatePeriod> {
    generate_from(join_date, amount, usize::MAX, limits, today)
}

/// At most `count` consecutive periods beginning with the month containing
/// `from`, still bounded by the horizon and the period cap.
pub fn generate_from(
    from: NaiveDate,
    amount: Decimal,
    count: usize,
    limits: GenerationLimits,
    today: NaiveDate,
) -> Vec<CandidatePeriod> {
    let cutoff = limits.cutoff(today);
    let take = count.min(limits.max_periods).min(HARD_CAP_PERIODS);
    let mut out = Vec::new();
    let mut cursor = Some(month_start(from));
    while let Some(start) = cursor {
        if out.len() >= take || start > cutoff {
            break;
        }
        out.push(candidate_for(start, amount));
        cursor = next_month(start);
    }
    out
}
