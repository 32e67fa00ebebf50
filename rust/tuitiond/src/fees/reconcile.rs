use crate::fees::generator::{generate_from, next_month, CandidatePeriod};
use crate::fees::model::FeeCycle;
use crate::fees::{store, FeeConfig, FeeEngine, FeeError, FeeResult};
use crate::roster;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub inserted: usize,
    pub marked_overdue: usize,
}

/// Candidates needed to bring the student's open cycles back up to the buffer.
///
/// Resumes one month after the latest existing period (or at the join month
/// when nothing exists) and never proposes a period that overlaps a stored one.
pub fn plan_replenishment(
    existing: &[FeeCycle],
    join_date: NaiveDate,
    monthly_fee: Decimal,
    config: &FeeConfig,
    today: NaiveDate,
) -> Vec<CandidatePeriod> {
    let open = existing.iter().filter(|c| !c.status.is_settled()).count();
    if open >= config.min_unpaid_buffer {
        return Vec::new();
    }
    let resume = match existing.iter().map(|c| c.period_start).max() {
        Some(latest) => match next_month(latest) {
            Some(d) => d,
            None => return Vec::new(),
        },
        None => join_date,
    };
    // Months blocked by a stored period are skipped, not counted.
    generate_from(resume, monthly_fee, config.max_periods, config.limits(), today)
        .into_iter()
        .filter(|c| !existing.iter().any(|e| e.overlaps(c.period_start, c.period_end)))
        .take(config.min_unpaid_buffer - open)
        .collect()
}

impl<'a> FeeEngine<'a> {
    /// Sweeps the student's elapsed cycles to overdue and tops up the unpaid
    /// buffer. Students without a join date or a positive fee only get the
    /// sweep.
    pub fn ensure_cycles(&self, student_id: &str) -> FeeResult<ReconcileOutcome> {
        let student = roster::get_student(self.conn, student_id)?
            .ok_or_else(|| FeeError::StudentNotFound(student_id.to_string()))?;
        let today = self.clock.today();

        let tx = self.conn.unchecked_transaction()?;
        let marked_overdue = store::mark_overdue(&tx, Some(student_id), today)?;
        let existing = store::load_cycles(&tx, student_id)?;
        let candidates = match student.billing().valid() {
            Some((join_date, fee)) => {
                plan_replenishment(&existing, join_date, fee, &self.config, today)
            }
            None => {
                debug!(student_id, "billing not configured, skipping generation");
                Vec::new()
            }
        };
        let inserted = if candidates.is_empty() {
            0
        } else {
            store::insert_candidates(&tx, student_id, &candidates, today, self.clock.now())?
        };
        tx.commit()?;

        if inserted > 0 || marked_overdue > 0 {
            info!(student_id, inserted, marked_overdue, "fee cycles reconciled");
        }
        Ok(ReconcileOutcome {
            inserted,
            marked_overdue,
        })
    }

    /// Read-path variant: failures are logged and swallowed so the caller can
    /// still return whatever cycles already exist.
    pub fn ensure_cycles_lenient(&self, student_id: &str) -> Option<ReconcileOutcome> {
        match self.ensure_cycles(student_id) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(student_id, error = %e, "fee reconciliation failed");
                None
            }
        }
    }

    /// Flips elapsed pending cycles to overdue for one student, or for everyone
    /// when `student_id` is `None`.
    pub fn sweep_overdue(&self, student_id: Option<&str>) -> FeeResult<usize> {
        let flipped = store::mark_overdue(self.conn, student_id, self.clock.today())?;
        if flipped > 0 {
            info!(student_id = student_id.unwrap_or("*"), flipped, "overdue sweep");
        }
        Ok(flipped)
    }
}
