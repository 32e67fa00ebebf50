//! Bulk import of historical fee records keyed by student name.

use crate::fees::batch::{run_queue, BatchReport};
use crate::fees::model::FeeStatus;
use crate::fees::store::{self, ImportedCycle};
use crate::fees::{parse_day, parse_instant, FeeEngine, FeeError, FeeResult};
use crate::roster;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFeeImport {
    pub student_name: String,
    #[serde(default)]
    pub joining_date: Option<String>,
    #[serde(default)]
    pub monthly_fee: Option<Decimal>,
    #[serde(default)]
    pub fees: Vec<FeeImport>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeImport {
    pub fee_name: String,
    pub fee_amount: Decimal,
    pub period_start: String,
    pub period_end: String,
    pub status: String,
    #[serde(default)]
    pub paid_date: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub student_id: String,
    pub student_name: String,
    pub created: usize,
    pub updated: usize,
}

fn validate_fee(fee: &FeeImport) -> FeeResult<ImportedCycle> {
    let bad = |msg: String| FeeError::Validation(format!("{}: {}", fee.fee_name, msg));
    let period_start =
        parse_day(&fee.period_start).ok_or_else(|| bad("invalid periodStart".to_string()))?;
    let period_end =
        parse_day(&fee.period_end).ok_or_else(|| bad("invalid periodEnd".to_string()))?;
    if period_end < period_start {
        return Err(bad("periodEnd precedes periodStart".to_string()));
    }
    if fee.fee_amount <= Decimal::ZERO {
        return Err(bad("feeAmount must be greater than zero".to_string()));
    }
    let status = FeeStatus::parse(&fee.status)
        .ok_or_else(|| bad(format!("unknown status {:?}", fee.status)))?;
    let paid_at = match fee.paid_date.as_deref() {
        Some(raw) => Some(parse_instant(raw).ok_or_else(|| bad("invalid paidDate".to_string()))?),
        None => None,
    };
    Ok(ImportedCycle {
        label: fee.fee_name.trim().to_string(),
        amount: fee.fee_amount,
        period_start,
        period_end,
        status,
        paid_at: if status.is_settled() { paid_at } else { None },
        remarks: fee.remarks.clone().filter(|r| !r.trim().is_empty()),
    })
}

impl<'a> FeeEngine<'a> {
    /// Imports one student's record atomically: either every fee row lands or
    /// none does.
    pub fn import_student(&self, record: &StudentFeeImport, actor_id: &str) -> FeeResult<ImportOutcome> {
        let name = record.student_name.trim();
        let student = roster::find_by_name(self.conn, name)?
            .ok_or_else(|| FeeError::StudentNotFound(name.to_string()))?;

        let joining_date = match record.joining_date.as_deref() {
            Some(raw) => Some(
                parse_day(raw)
                    .ok_or_else(|| FeeError::Validation(format!("invalid joiningDate {raw:?}")))?,
            ),
            None => None,
        };
        if let Some(fee) = record.monthly_fee {
            if fee <= Decimal::ZERO {
                return Err(FeeError::Validation(
                    "monthlyFee must be greater than zero".to_string(),
                ));
            }
        }
        let fees = record
            .fees
            .iter()
            .map(validate_fee)
            .collect::<FeeResult<Vec<_>>>()?;

        let now = self.clock.now();
        let tx = self.conn.unchecked_transaction()?;
        if joining_date.is_some() || record.monthly_fee.is_some() {
            roster::update_billing_params(
                &tx,
                &student.id,
                joining_date.or(student.join_date),
                record.monthly_fee.or(student.monthly_fee),
            )?;
        }
        let mut created = 0;
        let mut updated = 0;
        for fee in &fees {
            if !store::find_overlapping(&tx, &student.id, fee.period_start, fee.period_end)?
                .is_empty()
            {
                return Err(FeeError::Validation(format!(
                    "{}: {}..{} overlaps an existing fee period",
                    fee.label,
                    fee.period_start,
                    fee.period_end
                )));
            }
            if store::upsert_imported(&tx, &student.id, fee, actor_id, now)? {
                created += 1;
            } else {
                updated += 1;
            }
        }
        tx.commit()?;
        debug!(student_id = %student.id, created, updated, "fee import applied");

        Ok(ImportOutcome {
            student_id: student.id,
            student_name: student.name,
            created,
            updated,
        })
    }

    pub fn import_records(
        &self,
        records: &[StudentFeeImport],
        actor_id: &str,
    ) -> BatchReport<ImportOutcome> {
        run_queue(
            "fee-import",
            records,
            |r| r.student_name.clone(),
            |r| self.import_student(r, actor_id).map(Some),
        )
    }
}
