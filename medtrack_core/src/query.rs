//! Read-only queries over materialized doses.
//!
//! Queries operate on whatever generation has already written and never
//! trigger generation themselves; keeping the read path side-effect
//! free is what makes the "today" view and the notification consumer
//! safe to call from anywhere. Results are flattened rows joining the
//! owning medication's name for display.

use crate::error::Result;
use crate::store::{Store, StoreData};
use crate::types::DoseStatus;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use uuid::Uuid;

/// One dose joined with its medication, ready for display
#[derive(Clone, Debug, Serialize)]
pub struct DoseRow {
    pub dose_id: Uuid,
    pub schedule_id: Uuid,
    pub medication: String,
    pub scheduled_at: NaiveDateTime,
    pub status: DoseStatus,
    pub taken_at: Option<NaiveDateTime>,
}

fn build_rows(data: &StoreData) -> Vec<DoseRow> {
    data.doses
        .iter()
        .filter_map(|dose| {
            let schedule = data.schedule(dose.schedule_id)?;
            let medication = data.medication(schedule.medication_id)?;
            Some(DoseRow {
                dose_id: dose.id,
                schedule_id: dose.schedule_id,
                medication: medication.name.clone(),
                scheduled_at: dose.scheduled_at,
                status: dose.status,
                taken_at: dose.taken_at,
            })
        })
        .collect()
}

/// All doses on one calendar day, sorted by scheduled time ascending
pub fn doses_on(store: &Store, date: NaiveDate) -> Result<Vec<DoseRow>> {
    let data = store.read()?;
    let mut rows: Vec<DoseRow> = build_rows(&data)
        .into_iter()
        .filter(|r| r.scheduled_at.date() == date)
        .collect();
    rows.sort_by(|a, b| {
        a.scheduled_at
            .cmp(&b.scheduled_at)
            .then_with(|| a.medication.cmp(&b.medication))
    });
    Ok(rows)
}

/// All doses with `start <= scheduled date < end`, sorted ascending
pub fn doses_in_range(store: &Store, start: NaiveDate, end: NaiveDate) -> Result<Vec<DoseRow>> {
    let data = store.read()?;
    let mut rows: Vec<DoseRow> = build_rows(&data)
        .into_iter()
        .filter(|r| {
            let day = r.scheduled_at.date();
            day >= start && day < end
        })
        .collect();
    rows.sort_by(|a, b| {
        a.scheduled_at
            .cmp(&b.scheduled_at)
            .then_with(|| a.medication.cmp(&b.medication))
    });
    Ok(rows)
}

/// All missed doses, most recent first
pub fn missed_doses(store: &Store) -> Result<Vec<DoseRow>> {
    let data = store.read()?;
    let mut rows: Vec<DoseRow> = build_rows(&data)
        .into_iter()
        .filter(|r| r.status == DoseStatus::Missed)
        .collect();
    rows.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at));
    Ok(rows)
}

/// Full dose history, sorted ascending (used by the CSV export)
pub fn all_doses(store: &Store) -> Result<Vec<DoseRow>> {
    let data = store.read()?;
    let mut rows = build_rows(&data);
    rows.sort_by(|a, b| {
        a.scheduled_at
            .cmp(&b.scheduled_at)
            .then_with(|| a.medication.cmp(&b.medication))
    });
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recurrence::RecurrenceRule;
    use crate::types::{Medication, MedicationDose, MedicationSchedule};
    use chrono::NaiveTime;
    use std::time::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Two medications, each with one schedule and hand-placed doses
    fn setup() -> (tempfile::TempDir, Store) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = Store::open(temp_dir.path(), Duration::from_secs(5)).unwrap();

        store
            .update(|data| {
                for (name, hour) in [("Ibuprofen", 13u32), ("Insulin", 8u32)] {
                    let med = Medication::new(name, None, date(2026, 1, 1));
                    let schedule = MedicationSchedule::new(
                        &med,
                        NaiveTime::from_hms_opt(hour, 30, 0).unwrap(),
                        RecurrenceRule::Daily,
                        date(2026, 1, 1),
                    )?;
                    let schedule_id = schedule.id;
                    data.insert_medication(med);
                    data.insert_schedule(schedule)?;
                    for day in 1..=3 {
                        data.insert_dose(MedicationDose::new(
                            schedule_id,
                            date(2026, 1, day).and_hms_opt(hour, 30, 0).unwrap(),
                        ));
                    }
                }
                Ok(())
            })
            .unwrap();

        (temp_dir, store)
    }

    #[test]
    fn test_doses_on_returns_that_day_sorted_by_time() {
        let (_dir, store) = setup();

        let rows = doses_on(&store, date(2026, 1, 2)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].medication, "Insulin"); // 08:30
        assert_eq!(rows[1].medication, "Ibuprofen"); // 13:30
        assert!(rows.iter().all(|r| r.scheduled_at.date() == date(2026, 1, 2)));
    }

    #[test]
    fn test_doses_on_empty_day() {
        let (_dir, store) = setup();
        assert!(doses_on(&store, date(2026, 2, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_doses_in_range_end_is_exclusive() {
        let (_dir, store) = setup();

        let rows = doses_in_range(&store, date(2026, 1, 1), date(2026, 1, 3)).unwrap();
        assert_eq!(rows.len(), 4); // two meds x two days
        assert!(rows.iter().all(|r| r.scheduled_at.date() < date(2026, 1, 3)));

        // Ascending order
        for pair in rows.windows(2) {
            assert!(pair[0].scheduled_at <= pair[1].scheduled_at);
        }
    }

    #[test]
    fn test_missed_doses_most_recent_first() {
        let (_dir, store) = setup();

        // Sweep everything overdue as of well past the horizon
        let cancel = std::sync::atomic::AtomicBool::new(false);
        crate::lifecycle::sweep_all(
            &store,
            date(2026, 1, 10).and_hms_opt(0, 0, 0).unwrap(),
            chrono::Duration::hours(2),
            &cancel,
        )
        .unwrap();

        let rows = missed_doses(&store).unwrap();
        assert_eq!(rows.len(), 6);
        for pair in rows.windows(2) {
            assert!(pair[0].scheduled_at >= pair[1].scheduled_at);
        }
    }

    #[test]
    fn test_queries_never_materialize() {
        let (_dir, store) = setup();

        let before = store.read().unwrap().doses.len();
        doses_on(&store, date(2026, 1, 2)).unwrap();
        doses_in_range(&store, date(2026, 1, 1), date(2026, 2, 1)).unwrap();
        missed_doses(&store).unwrap();
        assert_eq!(store.read().unwrap().doses.len(), before);
    }
}
