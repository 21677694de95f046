//! Core domain types for the medtrack system.
//!
//! This module defines the entities the scheduling engine operates on:
//! - Medications and their recurring schedules
//! - Concrete dose occurrences and their lifecycle status
//!
//! Ownership follows a strict chain: a medication owns its schedules,
//! each schedule owns its doses. Deleting an owner removes all owned
//! descendants.

use crate::error::{Error, Result};
use crate::recurrence::RecurrenceRule;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A drug the user takes
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Medication {
    pub id: Uuid,
    pub name: String,
    pub note: Option<String>,
    /// Immutable after creation; schedules may not start before it
    pub start_date: NaiveDate,
    /// `false` soft-deletes: existing doses remain, future generation stops
    pub is_active: bool,
}

impl Medication {
    /// Create a new active medication.
    ///
    /// Field validation (name non-emptiness etc.) is the entry form's
    /// responsibility; the engine only reacts to rows that exist.
    pub fn new(name: impl Into<String>, note: Option<String>, start_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            note,
            start_date,
            is_active: true,
        }
    }
}

/// One recurring dosing instruction belonging to exactly one medication
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MedicationSchedule {
    pub id: Uuid,
    pub medication_id: Uuid,
    /// Time of day every dose of this schedule is due
    pub dose_time: NaiveTime,
    pub rule: RecurrenceRule,
    pub start_date: NaiveDate,
    /// Furthest date through which doses have been materialized
    #[serde(default)]
    pub generated_through: Option<NaiveDate>,
}

impl MedicationSchedule {
    /// Create a schedule for a medication, validating the recurrence rule
    /// and that the schedule does not start before the medication does.
    pub fn new(
        medication: &Medication,
        dose_time: NaiveTime,
        rule: RecurrenceRule,
        start_date: NaiveDate,
    ) -> Result<Self> {
        rule.validate()?;
        if start_date < medication.start_date {
            return Err(Error::Validation(format!(
                "schedule start {} is before medication start {}",
                start_date, medication.start_date
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            medication_id: medication.id,
            dose_time,
            rule,
            start_date,
            generated_through: None,
        })
    }
}

/// Lifecycle status of a dose.
///
/// `Taken` and `Missed` are terminal; the only exit from a terminal
/// state is the explicit missed-to-taken override in the lifecycle
/// module.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DoseStatus {
    Scheduled,
    Taken,
    Missed,
}

impl fmt::Display for DoseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoseStatus::Scheduled => write!(f, "scheduled"),
            DoseStatus::Taken => write!(f, "taken"),
            DoseStatus::Missed => write!(f, "missed"),
        }
    }
}

/// One concrete, dated occurrence of a schedule.
///
/// At most one dose exists per (schedule, scheduled_at) pair; the store
/// enforces this on insert, which is what makes generation idempotent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MedicationDose {
    pub id: Uuid,
    pub schedule_id: Uuid,
    /// Dosing day combined with the schedule's time of day (local wall clock)
    pub scheduled_at: NaiveDateTime,
    pub status: DoseStatus,
    /// Present iff status is `Taken`
    pub taken_at: Option<NaiveDateTime>,
}

impl MedicationDose {
    pub fn new(schedule_id: Uuid, scheduled_at: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            schedule_id,
            scheduled_at,
            status: DoseStatus::Scheduled,
            taken_at: None,
        }
    }
}
