//! CSV export of the dose history.
//!
//! Produces a flat file of every materialized dose with its medication
//! name and outcome, for the calendar/overview surface or external
//! analysis.

use crate::error::Result;
use crate::query;
use crate::store::Store;
use std::fs::OpenOptions;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    dose_id: String,
    medication: String,
    scheduled_at: String,
    status: String,
    taken_at: Option<String>,
}

/// Write the full dose history to `csv_path`, replacing any previous
/// export. Returns the number of rows written.
pub fn export_history(store: &Store, csv_path: &Path) -> Result<usize> {
    let rows = query::all_doses(store)?;

    // Ensure parent directory exists
    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(csv_path)?;

    let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(file);

    for row in &rows {
        writer.serialize(CsvRow {
            dose_id: row.dose_id.to_string(),
            medication: row.medication.clone(),
            scheduled_at: row.scheduled_at.to_string(),
            status: row.status.to_string(),
            taken_at: row.taken_at.map(|t| t.to_string()),
        })?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    tracing::info!("Exported {} doses to {:?}", rows.len(), csv_path);
    Ok(rows.len())
}
