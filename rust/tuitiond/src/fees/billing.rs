use crate::fees::reconcile::ReconcileOutcome;
use crate::fees::repair::RegenerateOutcome;
use crate::fees::{FeeEngine, FeeError, FeeResult};
use crate::roster::{self, StudentRecord};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct BillingUpdate {
    pub join_date: Option<NaiveDate>,
    pub monthly_fee: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingOutcome {
    pub student: StudentRecord,
    pub join_date_changed: bool,
    pub monthly_fee_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regenerated: Option<RegenerateOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciled: Option<ReconcileOutcome>,
}

impl<'a> FeeEngine<'a> {
    /// Changes a student's join date and/or monthly fee.
    ///
    /// A new join date moves every period, so the student is regenerated. A fee
    /// change alone leaves existing cycles at their snapshot amount; only cycles
    /// generated from now on use the new fee.
    pub fn update_billing(&self, student_id: &str, update: BillingUpdate) -> FeeResult<BillingOutcome> {
        if update.join_date.is_none() && update.monthly_fee.is_none() {
            return Err(FeeError::Validation(
                "provide joinDate and/or monthlyFee".to_string(),
            ));
        }
        if let Some(fee) = update.monthly_fee {
            if fee <= Decimal::ZERO {
                return Err(FeeError::Validation(
                    "monthlyFee must be greater than zero".to_string(),
                ));
            }
        }
        let before = roster::get_student(self.conn, student_id)?
            .ok_or_else(|| FeeError::StudentNotFound(student_id.to_string()))?;

        let join_date = update.join_date.or(before.join_date);
        let monthly_fee = update.monthly_fee.or(before.monthly_fee);
        let join_date_changed = update.join_date.is_some() && join_date != before.join_date;
        let monthly_fee_changed = update.monthly_fee.is_some() && monthly_fee != before.monthly_fee;

        roster::update_billing_params(self.conn, student_id, join_date, monthly_fee)?;
        info!(
            student_id,
            join_date_changed, monthly_fee_changed, "billing parameters updated"
        );

        let configured = join_date.is_some() && monthly_fee.is_some();
        let (regenerated, reconciled) = if join_date_changed && configured {
            (Some(self.regenerate_student(student_id)?), None)
        } else {
            (None, Some(self.ensure_cycles(student_id)?))
        };

        let student = roster::get_student(self.conn, student_id)?
            .ok_or_else(|| FeeError::StudentNotFound(student_id.to_string()))?;
        Ok(BillingOutcome {
            student,
            join_date_changed,
            monthly_fee_changed,
            regenerated,
            reconciled,
        })
    }
}
