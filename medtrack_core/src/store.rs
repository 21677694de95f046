//! Persistent store for medications, schedules and doses.
//!
//! The whole data set lives in one JSON document, guarded by a sidecar
//! lock file. Readers take a shared lock; every mutating operation runs
//! through [`Store::update`], which holds the exclusive lock across the
//! full load-modify-save cycle. The closure therefore always sees the
//! freshest state, which is the per-row compare-and-set the dose
//! lifecycle relies on: two racing writers are serialized, and the
//! second one observes what the first one wrote.
//!
//! Lock waits are bounded; contention past the timeout surfaces as
//! `StorageUnavailable` instead of hanging.
//!
//! Saves are atomic: write to a temp file in the same directory, sync,
//! rename over the original. The lock file itself is never renamed.

use crate::error::{Error, Result};
use crate::types::{Medication, MedicationDose, MedicationSchedule};
use chrono::NaiveDateTime;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use uuid::Uuid;

const STORE_FILE: &str = "medtrack.json";
const LOCK_FILE: &str = "medtrack.json.lock";

/// The persisted document: all entities, keyed by their uuids
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoreData {
    pub medications: Vec<Medication>,
    pub schedules: Vec<MedicationSchedule>,
    pub doses: Vec<MedicationDose>,
}

impl StoreData {
    pub fn medication(&self, id: Uuid) -> Option<&Medication> {
        self.medications.iter().find(|m| m.id == id)
    }

    pub fn medication_mut(&mut self, id: Uuid) -> Option<&mut Medication> {
        self.medications.iter_mut().find(|m| m.id == id)
    }

    pub fn schedule(&self, id: Uuid) -> Option<&MedicationSchedule> {
        self.schedules.iter().find(|s| s.id == id)
    }

    pub fn schedule_mut(&mut self, id: Uuid) -> Option<&mut MedicationSchedule> {
        self.schedules.iter_mut().find(|s| s.id == id)
    }

    pub fn dose(&self, id: Uuid) -> Option<&MedicationDose> {
        self.doses.iter().find(|d| d.id == id)
    }

    pub fn dose_mut(&mut self, id: Uuid) -> Option<&mut MedicationDose> {
        self.doses.iter_mut().find(|d| d.id == id)
    }

    pub fn schedules_of(&self, medication_id: Uuid) -> impl Iterator<Item = &MedicationSchedule> {
        self.schedules
            .iter()
            .filter(move |s| s.medication_id == medication_id)
    }

    pub fn insert_medication(&mut self, medication: Medication) {
        tracing::debug!("Inserting medication {} ({})", medication.name, medication.id);
        self.medications.push(medication);
    }

    /// Insert a schedule; its owning medication must already exist.
    pub fn insert_schedule(&mut self, schedule: MedicationSchedule) -> Result<()> {
        if self.medication(schedule.medication_id).is_none() {
            return Err(Error::NotFound(format!(
                "medication {}",
                schedule.medication_id
            )));
        }
        tracing::debug!(
            "Inserting schedule {} for medication {}",
            schedule.id,
            schedule.medication_id
        );
        self.schedules.push(schedule);
        Ok(())
    }

    /// Is there already a dose for this (schedule, scheduled datetime)?
    pub fn has_dose_at(&self, schedule_id: Uuid, scheduled_at: NaiveDateTime) -> bool {
        self.doses
            .iter()
            .any(|d| d.schedule_id == schedule_id && d.scheduled_at == scheduled_at)
    }

    /// Insert a dose unless one already exists for the same
    /// (schedule, scheduled datetime). Returns whether the dose was
    /// inserted; a duplicate means "already generated", not an error.
    pub fn insert_dose(&mut self, dose: MedicationDose) -> bool {
        if self.has_dose_at(dose.schedule_id, dose.scheduled_at) {
            tracing::debug!(
                "Dose for schedule {} at {} already exists, skipping",
                dose.schedule_id,
                dose.scheduled_at
            );
            return false;
        }
        self.doses.push(dose);
        true
    }

    /// Soft-delete: stop future generation, keep existing doses for history.
    pub fn set_active(&mut self, medication_id: Uuid, active: bool) -> Result<()> {
        let medication = self
            .medication_mut(medication_id)
            .ok_or_else(|| Error::NotFound(format!("medication {}", medication_id)))?;
        medication.is_active = active;
        tracing::info!("Medication {} active = {}", medication_id, active);
        Ok(())
    }

    /// Hard delete: removes the medication, its schedules and their doses.
    pub fn remove_medication(&mut self, medication_id: Uuid) -> Result<()> {
        if self.medication(medication_id).is_none() {
            return Err(Error::NotFound(format!("medication {}", medication_id)));
        }

        let schedule_ids: Vec<Uuid> = self
            .schedules_of(medication_id)
            .map(|s| s.id)
            .collect();

        self.doses.retain(|d| !schedule_ids.contains(&d.schedule_id));
        self.schedules.retain(|s| s.medication_id != medication_id);
        self.medications.retain(|m| m.id != medication_id);

        tracing::info!(
            "Removed medication {} with {} schedules (cascade)",
            medication_id,
            schedule_ids.len()
        );
        Ok(())
    }
}

/// Handle to the on-disk store
#[derive(Clone, Debug)]
pub struct Store {
    data_path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
}

impl Store {
    /// Open (and create if needed) the store directory.
    pub fn open(data_dir: &Path, lock_timeout: Duration) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            data_path: data_dir.join(STORE_FILE),
            lock_path: data_dir.join(LOCK_FILE),
            lock_timeout,
        })
    }

    /// Read a consistent snapshot of the store (shared lock).
    pub fn read(&self) -> Result<StoreData> {
        let lock = self.acquire_lock(false)?;
        let result = self.load_unlocked();
        let _ = lock.unlock();
        result
    }

    /// Atomic read-modify-write. The closure runs with the exclusive
    /// lock held; if it returns an error, nothing is persisted.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut StoreData) -> Result<T>,
    {
        let lock = self.acquire_lock(true)?;
        let result = (|| {
            let mut data = self.load_unlocked()?;
            let out = f(&mut data)?;
            self.persist_unlocked(&data)?;
            Ok(out)
        })();
        let _ = lock.unlock();
        result
    }

    fn acquire_lock(&self, exclusive: bool) -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.lock_path)?;

        let deadline = Instant::now() + self.lock_timeout;
        loop {
            // Call through the trait: newer std has same-named inherent
            // methods on File with different signatures
            let attempt = if exclusive {
                FileExt::try_lock_exclusive(&file)
            } else {
                FileExt::try_lock_shared(&file)
            };
            match attempt {
                Ok(()) => return Ok(file),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(Error::StorageUnavailable(format!(
                            "store lock not acquired within {:?}",
                            self.lock_timeout
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn load_unlocked(&self) -> Result<StoreData> {
        if !self.data_path.exists() {
            tracing::debug!("No store file at {:?}, starting empty", self.data_path);
            return Ok(StoreData::default());
        }
        let contents = std::fs::read_to_string(&self.data_path)?;
        let data: StoreData = serde_json::from_str(&contents)?;
        Ok(data)
    }

    fn persist_unlocked(&self, data: &StoreData) -> Result<()> {
        let parent = self.data_path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "store path missing parent")
        })?;

        // Unique temp file in the same directory for atomic rename
        let temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(data)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;

        // Atomically replace the old document
        temp.persist(&self.data_path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!(
            "Saved store ({} medications, {} schedules, {} doses)",
            data.medications.len(),
            data.schedules.len(),
            data.doses.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recurrence::RecurrenceRule;
    use chrono::{NaiveDate, NaiveTime};

    fn test_store(dir: &Path) -> Store {
        Store::open(dir, Duration::from_secs(5)).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_medication() -> Medication {
        Medication::new("Ibuprofen", Some("after meals".into()), date(2026, 1, 1))
    }

    fn sample_schedule(med: &Medication) -> MedicationSchedule {
        MedicationSchedule::new(
            med,
            NaiveTime::from_hms_opt(13, 30, 0).unwrap(),
            RecurrenceRule::Daily,
            med.start_date,
        )
        .unwrap()
    }

    #[test]
    fn test_empty_store_reads_default() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());

        let data = store.read().unwrap();
        assert!(data.medications.is_empty());
        assert!(data.doses.is_empty());
    }

    #[test]
    fn test_update_and_read_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());

        let med = sample_medication();
        let med_id = med.id;
        let schedule = sample_schedule(&med);

        store
            .update(|data| {
                data.insert_medication(med.clone());
                data.insert_schedule(schedule.clone())?;
                Ok(())
            })
            .unwrap();

        let data = store.read().unwrap();
        assert_eq!(data.medications.len(), 1);
        assert_eq!(data.schedules.len(), 1);
        assert_eq!(data.medication(med_id).unwrap().name, "Ibuprofen");
    }

    #[test]
    fn test_failed_update_persists_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());

        let result: Result<()> = store.update(|data| {
            data.insert_medication(sample_medication());
            Err(Error::Validation("abort".into()))
        });
        assert!(result.is_err());

        let data = store.read().unwrap();
        assert!(data.medications.is_empty());
    }

    #[test]
    fn test_schedule_requires_existing_medication() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());

        let med = sample_medication();
        let schedule = sample_schedule(&med);

        // Medication never inserted
        let result = store.update(|data| data.insert_schedule(schedule.clone()));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_dose_uniqueness() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());

        let med = sample_medication();
        let schedule = sample_schedule(&med);
        let schedule_id = schedule.id;
        let at = date(2026, 1, 1).and_hms_opt(13, 30, 0).unwrap();

        let inserted = store
            .update(|data| {
                data.insert_medication(med.clone());
                data.insert_schedule(schedule.clone())?;
                let first = data.insert_dose(MedicationDose::new(schedule_id, at));
                let second = data.insert_dose(MedicationDose::new(schedule_id, at));
                Ok((first, second))
            })
            .unwrap();

        assert_eq!(inserted, (true, false));
        assert_eq!(store.read().unwrap().doses.len(), 1);
    }

    #[test]
    fn test_cascade_delete() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());

        let med = sample_medication();
        let med_id = med.id;
        let schedule = sample_schedule(&med);
        let schedule_id = schedule.id;

        store
            .update(|data| {
                data.insert_medication(med.clone());
                data.insert_schedule(schedule.clone())?;
                data.insert_dose(MedicationDose::new(
                    schedule_id,
                    date(2026, 1, 1).and_hms_opt(13, 30, 0).unwrap(),
                ));
                data.insert_dose(MedicationDose::new(
                    schedule_id,
                    date(2026, 1, 2).and_hms_opt(13, 30, 0).unwrap(),
                ));
                Ok(())
            })
            .unwrap();

        store.update(|data| data.remove_medication(med_id)).unwrap();

        let data = store.read().unwrap();
        assert!(data.medications.is_empty());
        assert!(data.schedules.is_empty());
        assert!(data.doses.is_empty());
    }

    #[test]
    fn test_lock_timeout_surfaces_storage_unavailable() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = Store::open(temp_dir.path(), Duration::from_millis(50)).unwrap();

        // Hold the exclusive lock from outside
        let blocker = OpenOptions::new()
            .create(true)
            .write(true)
            .open(temp_dir.path().join(LOCK_FILE))
            .unwrap();
        blocker.lock_exclusive().unwrap();

        let result = store.read();
        assert!(matches!(result, Err(Error::StorageUnavailable(_))));

        blocker.unlock().unwrap();
        assert!(store.read().is_ok());
    }

    #[test]
    fn test_atomic_save_leaves_no_temp_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());

        store
            .update(|data| {
                data.insert_medication(sample_medication());
                Ok(())
            })
            .unwrap();

        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name != STORE_FILE && name != LOCK_FILE)
            .collect();
        assert!(extras.is_empty(), "unexpected files: {:?}", extras);
    }
}
