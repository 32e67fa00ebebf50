use crate::fees::model::{FeeCycle, FeeStatus};
use crate::fees::{store, FeeEngine, FeeError, FeeResult};
use crate::roster::{self, StudentQuery, StudentRecord};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeCounts {
    pub pending: usize,
    pub overdue: usize,
    pub paid: usize,
    pub waived: usize,
    pub outstanding: Decimal,
    pub next_due_date: Option<NaiveDate>,
}

impl FeeCounts {
    pub fn from_cycles(cycles: &[FeeCycle]) -> Self {
        let mut counts = Self::default();
        for c in cycles {
            match c.status {
                FeeStatus::Pending => counts.pending += 1,
                FeeStatus::Overdue => counts.overdue += 1,
                FeeStatus::Paid => counts.paid += 1,
                FeeStatus::Waived => counts.waived += 1,
            }
            if !c.status.is_settled() {
                counts.outstanding += c.amount;
                counts.next_due_date = Some(match counts.next_due_date {
                    Some(cur) => cur.min(c.period_start),
                    None => c.period_start,
                });
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFees {
    pub student: StudentRecord,
    pub summary: FeeCounts,
    pub fees: Vec<FeeCycle>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFeeRow {
    pub student: StudentRecord,
    #[serde(flatten)]
    pub counts: FeeCounts,
}

impl<'a> FeeEngine<'a> {
    /// Student plus all of its cycles. Reconciles first; a reconcile failure
    /// does not fail the read.
    pub fn student_fees(&self, student_id: &str) -> FeeResult<StudentFees> {
        let student = roster::get_student(self.conn, student_id)?
            .ok_or_else(|| FeeError::StudentNotFound(student_id.to_string()))?;
        self.ensure_cycles_lenient(student_id);
        let fees = store::load_cycles(self.conn, student_id)?;
        Ok(StudentFees {
            student,
            summary: FeeCounts::from_cycles(&fees),
            fees,
        })
    }

    /// One page of students with their fee counts, reconciling each student
    /// on the page.
    pub fn all_students(&self, query: &StudentQuery) -> FeeResult<(Vec<StudentFeeRow>, i64)> {
        let (students, total) = roster::list_students(self.conn, query)?;
        let mut rows = Vec::with_capacity(students.len());
        for student in students {
            self.ensure_cycles_lenient(&student.id);
            let cycles = store::load_cycles(self.conn, &student.id)?;
            rows.push(StudentFeeRow {
                counts: FeeCounts::from_cycles(&cycles),
                student,
            });
        }
        Ok((rows, total))
    }

    /// Overdue count after a best-effort sweep. `parent_id` narrows the count
    /// to one family's students.
    pub fn overdue_count(&self, parent_id: Option<&str>) -> FeeResult<i64> {
        if let Err(e) = self.sweep_overdue(None) {
            warn!(error = %e, "overdue sweep failed before counting");
        }
        Ok(store::count_with_status(
            self.conn,
            FeeStatus::Overdue,
            parent_id,
        )?)
    }
}
