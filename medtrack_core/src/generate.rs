//! Dose generation: materializing concrete doses from schedules.
//!
//! Generation is idempotent and safe to re-run: each schedule carries a
//! `generated_through` watermark, and the store's (schedule, datetime)
//! uniqueness check catches anything the watermark misses (e.g. two
//! processes generating the same horizon at once). Callers invoke this
//! with a bounded horizon (today + lookahead) so unbounded recurrence
//! rules never require unbounded materialization.

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::MedicationDose;
use chrono::NaiveDate;
use std::cmp::max;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Materialize all doses of one schedule through `through` (inclusive).
///
/// Returns the number of doses created. No-op (returns 0) when the
/// owning medication is inactive: inactive medications never produce
/// new doses, but their existing doses are left untouched for history.
pub fn ensure_generated(store: &Store, schedule_id: Uuid, through: NaiveDate) -> Result<usize> {
    store.update(|data| {
        let schedule = data
            .schedule(schedule_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("schedule {}", schedule_id)))?;

        let active = data
            .medication(schedule.medication_id)
            .ok_or_else(|| Error::NotFound(format!("medication {}", schedule.medication_id)))?
            .is_active;
        if !active {
            tracing::debug!(
                "Medication {} inactive, skipping generation for schedule {}",
                schedule.medication_id,
                schedule_id
            );
            return Ok(0);
        }

        let from = match schedule.generated_through {
            Some(watermark) => {
                let resume = watermark.succ_opt().unwrap_or(NaiveDate::MAX);
                max(schedule.start_date, resume)
            }
            None => schedule.start_date,
        };

        let mut created = 0;
        for day in schedule
            .rule
            .days_in_range(schedule.start_date, from, through)
        {
            let scheduled_at = day.and_time(schedule.dose_time);
            if data.insert_dose(MedicationDose::new(schedule_id, scheduled_at)) {
                created += 1;
            }
        }

        let advanced = schedule.generated_through.map_or(true, |w| through > w);
        if advanced {
            if let Some(s) = data.schedule_mut(schedule_id) {
                s.generated_through = Some(through);
            }
        }

        if created > 0 {
            tracing::info!(
                "Generated {} doses for schedule {} through {}",
                created,
                schedule_id,
                through
            );
        }
        Ok(created)
    })
}

/// Run generation for every schedule in the store.
///
/// Each schedule is its own atomic unit; the cancellation flag is
/// checked between schedules so a background refresh can be stopped
/// without losing the work already committed.
pub fn refresh_all(store: &Store, through: NaiveDate, cancel: &AtomicBool) -> Result<usize> {
    let schedule_ids: Vec<Uuid> = store.read()?.schedules.iter().map(|s| s.id).collect();

    let mut created = 0;
    for schedule_id in schedule_ids {
        if cancel.load(Ordering::Relaxed) {
            tracing::info!("Refresh cancelled after {} new doses", created);
            break;
        }
        created += ensure_generated(store, schedule_id, through)?;
    }
    Ok(created)
}
