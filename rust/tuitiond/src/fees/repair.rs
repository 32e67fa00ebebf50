use crate::fees::batch::{run_queue, BatchReport};
use crate::fees::generator::{generate, month_end, month_start, period_label, GenerationLimits};
use crate::fees::model::FeeCycle;
use crate::fees::{store, FeeEngine, FeeError, FeeResult};
use crate::roster;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::info;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupOutcome {
    pub student_id: String,
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateOutcome {
    pub student_id: String,
    pub settled_realigned: usize,
    pub unsettled_removed: usize,
    pub created: usize,
}

/// Ids to delete so that each calendar month keeps exactly one cycle.
///
/// Survivor per month: settled before unsettled, then earliest created.
pub fn plan_dedup(cycles: &[FeeCycle]) -> Vec<String> {
    let mut by_month: BTreeMap<(i32, u32), Vec<&FeeCycle>> = BTreeMap::new();
    for c in cycles {
        by_month
            .entry((c.period_start.year(), c.period_start.month()))
            .or_default()
            .push(c);
    }
    let mut doomed = Vec::new();
    for group in by_month.values().filter(|g| g.len() > 1) {
        let keep = group
            .iter()
            .min_by_key(|c| (!c.status.is_settled(), c.created_at, c.seq))
            .map(|c| c.id.as_str());
        doomed.extend(
            group
                .iter()
                .filter(|c| Some(c.id.as_str()) != keep)
                .map(|c| c.id.clone()),
        );
    }
    doomed
}

impl<'a> FeeEngine<'a> {
    pub fn dedup_student(&self, student_id: &str) -> FeeResult<DedupOutcome> {
        let tx = self.conn.unchecked_transaction()?;
        let cycles = store::load_cycles(&tx, student_id)?;
        let doomed = plan_dedup(&cycles);
        for id in &doomed {
            store::delete_cycle(&tx, id)?;
        }
        tx.commit()?;
        if !doomed.is_empty() {
            info!(student_id, removed = doomed.len(), "duplicate fee cycles removed");
        }
        Ok(DedupOutcome {
            student_id: student_id.to_string(),
            removed: doomed.len(),
        })
    }

    /// Rebuilds a student's schedule from its billing parameters.
    ///
    /// Settled cycles keep status and amount; only their bounds are snapped to
    /// the calendar month of their start. Unsettled cycles are dropped and
    /// every month from the join month through the current one (or the latest
    /// settled month, if later) that has no settled cycle is generated again,
    /// then the future buffer is topped up.
    pub fn regenerate_student(&self, student_id: &str) -> FeeResult<RegenerateOutcome> {
        let student = roster::get_student(self.conn, student_id)?
            .ok_or_else(|| FeeError::StudentNotFound(student_id.to_string()))?;
        let (join_date, fee) = student.billing().valid().ok_or_else(|| {
            FeeError::Validation(format!(
                "student {student_id} has no join date or positive monthly fee"
            ))
        })?;
        let today = self.clock.today();

        let tx = self.conn.unchecked_transaction()?;
        let settled: Vec<FeeCycle> = store::load_cycles(&tx, student_id)?
            .into_iter()
            .filter(|c| c.status.is_settled())
            .collect();

        let mut covered: HashSet<NaiveDate> = HashSet::new();
        for c in &settled {
            let start = month_start(c.period_start);
            if !covered.insert(start) {
                return Err(FeeError::Validation(format!(
                    "student {student_id} has more than one settled cycle for {}; remove duplicates first",
                    start.format("%Y-%m")
                )));
            }
        }

        let unsettled_removed = store::delete_unsettled(&tx, student_id)?;

        let mut settled_realigned = 0;
        for c in &settled {
            let start = month_start(c.period_start);
            let end = month_end(start);
            let label = period_label(start);
            if c.period_start != start || c.period_end != end || c.label != label {
                store::update_bounds(&tx, &c.id, &label, start, end)?;
                settled_realigned += 1;
            }
        }

        // Gaps before a prepaid future month are billed too, not just the
        // months up to today.
        let through = covered
            .iter()
            .copied()
            .max()
            .map_or(month_start(today), |latest| latest.max(month_start(today)));
        let months_ahead = (through.year() - today.year()) * 12 + through.month() as i32
            - today.month() as i32;
        let limits = GenerationLimits::new(months_ahead.max(0) as u32, self.config.max_periods);
        let missing: Vec<_> = generate(join_date, fee, limits, today)
            .into_iter()
            .filter(|c| !covered.contains(&c.period_start))
            .collect();
        let mut created = store::insert_candidates(&tx, student_id, &missing, today, self.clock.now())?;
        tx.commit()?;

        created += self.ensure_cycles(student_id)?.inserted;

        info!(
            student_id,
            settled_realigned, unsettled_removed, created, "fee cycles regenerated"
        );
        Ok(RegenerateOutcome {
            student_id: student_id.to_string(),
            settled_realigned,
            unsettled_removed,
            created,
        })
    }

    /// Deletes every cycle of the student and clears its billing parameters.
    pub fn reset_student(&self, student_id: &str) -> FeeResult<usize> {
        if roster::get_student(self.conn, student_id)?.is_none() {
            return Err(FeeError::StudentNotFound(student_id.to_string()));
        }
        let tx = self.conn.unchecked_transaction()?;
        let removed = store::delete_all_for_student(&tx, student_id)?;
        roster::update_billing_params(&tx, student_id, None, None)?;
        tx.commit()?;
        info!(student_id, removed, "fee billing reset");
        Ok(removed)
    }

    pub fn delete_fee(&self, fee_id: &str) -> FeeResult<FeeCycle> {
        let cycle = store::get_cycle(self.conn, fee_id)?
            .ok_or_else(|| FeeError::NotFound(fee_id.to_string()))?;
        store::delete_cycle(self.conn, fee_id)?;
        info!(fee_id, student_id = %cycle.student_id, status = %cycle.status, "fee cycle deleted");
        Ok(cycle)
    }

    pub fn cleanup_duplicates_all(&self) -> FeeResult<BatchReport<DedupOutcome>> {
        let ids = roster::all_student_ids(self.conn)?;
        Ok(run_queue(
            "cleanup-duplicates",
            ids,
            |id| id.clone(),
            |id| {
                let outcome = self.dedup_student(id)?;
                Ok((outcome.removed > 0).then_some(outcome))
            },
        ))
    }

    /// Regenerates every student with usable billing parameters; the rest are
    /// counted as skipped.
    pub fn regenerate_all(&self) -> FeeResult<BatchReport<RegenerateOutcome>> {
        let ids = roster::all_student_ids(self.conn)?;
        Ok(run_queue(
            "regenerate-cycles",
            ids,
            |id| id.clone(),
            |id| {
                let configured = roster::get_student(self.conn, id)?
                    .map(|s| s.billing().valid().is_some())
                    .unwrap_or(false);
                if !configured {
                    return Ok(None);
                }
                self.regenerate_student(id).map(Some)
            },
        ))
    }
}
