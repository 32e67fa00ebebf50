use crate::fees::model::{FeeAction, FeeCycle};
use crate::fees::{store, FeeEngine, FeeError, FeeResult};
use crate::roster;
use chrono::{DateTime, Utc};
use tracing::info;

impl<'a> FeeEngine<'a> {
    /// Settles one cycle as paid or waived.
    ///
    /// Re-settling an already settled cycle overwrites the settlement metadata
    /// (date, actor, remarks) so corrections are possible; the cycle can never
    /// go back to pending or overdue. Period bounds and amount are untouched.
    /// The student's unpaid buffer is replenished afterwards.
    pub fn apply_action(
        &self,
        fee_id: &str,
        action: &str,
        actor_id: &str,
        occurred_at: Option<DateTime<Utc>>,
        remarks: Option<&str>,
    ) -> FeeResult<FeeCycle> {
        let cycle = store::get_cycle(self.conn, fee_id)?
            .ok_or_else(|| FeeError::NotFound(fee_id.to_string()))?;
        let action =
            FeeAction::parse(action).ok_or_else(|| FeeError::InvalidAction(action.to_string()))?;
        let paid_at = occurred_at.unwrap_or_else(|| self.clock.now());
        let remarks = remarks.map(str::trim).filter(|r| !r.is_empty());

        store::settle(
            self.conn,
            fee_id,
            action.status(),
            paid_at,
            actor_id,
            remarks,
        )?;
        info!(
            fee_id,
            student_id = %cycle.student_id,
            previous = %cycle.status,
            status = %action.status(),
            actor_id,
            "fee cycle settled"
        );

        self.ensure_cycles_lenient(&cycle.student_id);

        store::get_cycle(self.conn, fee_id)?.ok_or_else(|| FeeError::NotFound(fee_id.to_string()))
    }

    /// Pays the open cycle with the earliest period start.
    pub fn mark_earliest_unpaid(
        &self,
        student_id: &str,
        actor_id: &str,
        remarks: Option<&str>,
    ) -> FeeResult<FeeCycle> {
        if roster::get_student(self.conn, student_id)?.is_none() {
            return Err(FeeError::StudentNotFound(student_id.to_string()));
        }
        // Cycles may not exist yet for a student nobody has viewed.
        self.ensure_cycles_lenient(student_id);

        let earliest = store::load_cycles(self.conn, student_id)?
            .into_iter()
            .filter(|c| !c.status.is_settled())
            .min_by_key(|c| (c.period_start, c.seq))
            .ok_or_else(|| FeeError::NoUnpaidCycles(student_id.to_string()))?;

        self.apply_action(&earliest.id, "paid", actor_id, None, remarks)
    }
}
