//! Dose lifecycle state machine.
//!
//! A dose starts `scheduled` and ends in exactly one of two terminal
//! states: `taken` (user action) or `missed` (background sweep). Every
//! transition runs inside [`Store::update`], so the current status is
//! re-read under the exclusive lock before it is changed. When a user
//! action and the sweep race on the same dose, whichever arrives second
//! sees the dose is no longer `scheduled`: the sweep silently no-ops,
//! the user action surfaces `InvalidTransition` with the status it
//! found, and the caller may then offer [`force_mark_taken`].

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{DoseStatus, MedicationDose};
use chrono::{Duration, NaiveDateTime};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Record that the user took a dose. Allowed only from `scheduled`.
///
/// A second call is an error, never a silent success: double-counting
/// an intake is unsafe. No lower bound is placed on `at`; taking a dose
/// before its scheduled time is permitted.
pub fn mark_taken(store: &Store, dose_id: Uuid, at: NaiveDateTime) -> Result<MedicationDose> {
    store.update(|data| {
        let dose = data
            .dose_mut(dose_id)
            .ok_or_else(|| Error::NotFound(format!("dose {}", dose_id)))?;

        match dose.status {
            DoseStatus::Scheduled => {
                dose.status = DoseStatus::Taken;
                dose.taken_at = Some(at);
                tracing::info!("Dose {} taken at {}", dose_id, at);
                Ok(dose.clone())
            }
            current => Err(Error::InvalidTransition { dose_id, current }),
        }
    })
}

/// Explicit override: take a dose that was already swept to `missed`.
///
/// A user taking a "missed" dose late is a valid real-world action, but
/// it is never implicit; this is the only exit from a terminal state.
pub fn force_mark_taken(
    store: &Store,
    dose_id: Uuid,
    at: NaiveDateTime,
) -> Result<MedicationDose> {
    store.update(|data| {
        let dose = data
            .dose_mut(dose_id)
            .ok_or_else(|| Error::NotFound(format!("dose {}", dose_id)))?;

        match dose.status {
            DoseStatus::Missed => {
                dose.status = DoseStatus::Taken;
                dose.taken_at = Some(at);
                tracing::info!("Dose {} force-taken at {} (was missed)", dose_id, at);
                Ok(dose.clone())
            }
            current => Err(Error::InvalidTransition { dose_id, current }),
        }
    })
}

/// Sweep a single dose to `missed` if its grace period has run out.
///
/// Returns whether the dose transitioned. A dose that is already
/// terminal, or still inside its grace window, is left alone; neither
/// is an error.
pub fn sweep_missed(
    store: &Store,
    dose_id: Uuid,
    now: NaiveDateTime,
    grace: Duration,
) -> Result<bool> {
    store.update(|data| {
        let dose = data
            .dose_mut(dose_id)
            .ok_or_else(|| Error::NotFound(format!("dose {}", dose_id)))?;

        if dose.status != DoseStatus::Scheduled {
            return Ok(false);
        }
        if now <= dose.scheduled_at + grace {
            return Ok(false);
        }

        dose.status = DoseStatus::Missed;
        tracing::info!(
            "Dose {} missed (was due {}, grace {} min)",
            dose_id,
            dose.scheduled_at,
            grace.num_minutes()
        );
        Ok(true)
    })
}

/// Sweep every overdue `scheduled` dose to `missed`.
///
/// Candidates are snapshotted first, then swept one atomic update at a
/// time with a cancellation checkpoint in between; the sweep is a
/// low-priority background pass, not one big transaction. Each dose is
/// re-checked under the lock, so doses taken mid-sweep stay taken.
pub fn sweep_all(
    store: &Store,
    now: NaiveDateTime,
    grace: Duration,
    cancel: &AtomicBool,
) -> Result<usize> {
    let candidates: Vec<Uuid> = store
        .read()?
        .doses
        .iter()
        .filter(|d| d.status == DoseStatus::Scheduled && now > d.scheduled_at + grace)
        .map(|d| d.id)
        .collect();

    let mut swept = 0;
    for dose_id in candidates {
        if cancel.load(Ordering::Relaxed) {
            tracing::info!("Sweep cancelled after {} doses", swept);
            break;
        }
        if sweep_missed(store, dose_id, now, grace)? {
            swept += 1;
        }
    }

    if swept > 0 {
        tracing::info!("Swept {} doses to missed", swept);
    }
    Ok(swept)
}
