#![forbid(unsafe_code)]

//! Core domain model and scheduling engine for the medtrack medication
//! reminder system.
//!
//! This crate provides:
//! - Domain types (medications, schedules, doses)
//! - Recurrence rule evaluation
//! - Idempotent dose generation
//! - The dose lifecycle state machine
//! - Read queries and CSV export
//! - Persistence (locked JSON store)

pub mod types;
pub mod error;
pub mod recurrence;
pub mod clock;
pub mod config;
pub mod logging;
pub mod store;
pub mod generate;
pub mod lifecycle;
pub mod query;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use recurrence::RecurrenceRule;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use store::{Store, StoreData};
pub use generate::{ensure_generated, refresh_all};
pub use lifecycle::{force_mark_taken, mark_taken, sweep_all, sweep_missed};
pub use query::{doses_in_range, doses_on, missed_doses, DoseRow};
pub use export::export_history;
