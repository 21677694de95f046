use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use clap::{Parser, Subcommand};
use medtrack_core::*;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "medtrack")]
#[command(about = "Medication dose scheduling and tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override current time (for testing), e.g. 2026-01-03T08:00
    #[arg(long, global = true)]
    now: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a medication with its first dosing schedule
    Add {
        /// Medication name
        #[arg(long)]
        name: String,

        /// Optional note (e.g. "before meals")
        #[arg(long)]
        note: Option<String>,

        /// Start date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        start: Option<String>,

        /// Time of day the dose is due (HH:MM)
        #[arg(long)]
        time: String,

        /// Recurrence: once, daily, every<N>days, weekdays, weekends, or mon,wed,fri
        #[arg(long)]
        rule: String,
    },

    /// Attach an additional dosing schedule to an existing medication
    Schedule {
        /// Medication id
        medication: String,

        /// Time of day the dose is due (HH:MM)
        #[arg(long)]
        time: String,

        /// Recurrence: once, daily, every<N>days, weekdays, weekends, or mon,wed,fri
        #[arg(long)]
        rule: String,

        /// Schedule start date (YYYY-MM-DD), defaults to the medication's start date
        #[arg(long)]
        start: Option<String>,
    },

    /// List medications and their schedules
    List,

    /// Materialize upcoming doses for every schedule
    Refresh {
        /// Lookahead horizon in days (defaults to config)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Show the doses of one day (default: today)
    Due {
        /// Date to show (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Mark a dose as taken
    Take {
        /// Dose id
        dose: String,

        /// Intake time (defaults to now)
        #[arg(long)]
        at: Option<String>,

        /// Take a dose that was already marked missed
        #[arg(long)]
        force: bool,
    },

    /// Sweep overdue scheduled doses to missed
    Sweep {
        /// Grace period in minutes (defaults to config)
        #[arg(long)]
        grace_minutes: Option<u32>,
    },

    /// List missed doses, most recent first
    Missed,

    /// Stop generating doses for a medication (history is kept)
    Deactivate {
        /// Medication id
        medication: String,
    },

    /// Delete a medication, its schedules and all their doses
    Remove {
        /// Medication id
        medication: String,
    },

    /// Export the full dose history to CSV
    Export {
        /// Output file path
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    medtrack_core::logging::init();

    let cli = Cli::parse();

    // Determine data directory
    let config = Config::load()?;
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data.data_dir.clone());
    let store = Store::open(&data_dir, config.storage.lock_timeout())?;

    let clock: Box<dyn Clock> = match cli.now.as_deref() {
        Some(s) => Box::new(FixedClock::new(parse_datetime(s)?)),
        None => Box::new(SystemClock),
    };

    match cli.command {
        Some(Commands::Add {
            name,
            note,
            start,
            time,
            rule,
        }) => cmd_add(&store, clock.as_ref(), name, note, start, time, rule),
        Some(Commands::Schedule {
            medication,
            time,
            rule,
            start,
        }) => cmd_schedule(&store, medication, time, rule, start),
        Some(Commands::List) => cmd_list(&store),
        Some(Commands::Refresh { days }) => cmd_refresh(&store, clock.as_ref(), &config, days),
        Some(Commands::Due { date }) => cmd_due(&store, clock.as_ref(), date),
        Some(Commands::Take { dose, at, force }) => {
            cmd_take(&store, clock.as_ref(), dose, at, force)
        }
        Some(Commands::Sweep { grace_minutes }) => {
            cmd_sweep(&store, clock.as_ref(), &config, grace_minutes)
        }
        Some(Commands::Missed) => cmd_missed(&store),
        Some(Commands::Deactivate { medication }) => cmd_deactivate(&store, medication),
        Some(Commands::Remove { medication }) => cmd_remove(&store, medication),
        Some(Commands::Export { out }) => cmd_export(&store, &out),
        None => {
            // Default to today's doses
            cmd_due(&store, clock.as_ref(), None)
        }
    }
}

fn cmd_add(
    store: &Store,
    clock: &dyn Clock,
    name: String,
    note: Option<String>,
    start: Option<String>,
    time: String,
    rule: String,
) -> Result<()> {
    let start_date = match start.as_deref() {
        Some(s) => parse_date(s)?,
        None => clock.today(),
    };
    let dose_time = parse_time(&time)?;
    let rule: RecurrenceRule = rule.parse()?;

    let note = note.filter(|n| !n.trim().is_empty());
    let medication = Medication::new(name.trim(), note, start_date);
    let schedule = MedicationSchedule::new(&medication, dose_time, rule.clone(), start_date)?;

    let med_id = medication.id;
    let schedule_id = schedule.id;
    store.update(|data| {
        data.insert_medication(medication.clone());
        data.insert_schedule(schedule.clone())
    })?;

    println!(
        "✓ Added {} ({} at {})",
        name.trim(),
        rule,
        dose_time.format("%H:%M")
    );
    println!("  Medication: {}", med_id);
    println!("  Schedule:   {}", schedule_id);
    Ok(())
}

fn cmd_schedule(
    store: &Store,
    medication: String,
    time: String,
    rule: String,
    start: Option<String>,
) -> Result<()> {
    let medication_id = parse_uuid(&medication)?;
    let dose_time = parse_time(&time)?;
    let rule: RecurrenceRule = rule.parse()?;
    let start = start.as_deref().map(parse_date).transpose()?;

    let schedule_id = store.update(|data| {
        let med = data
            .medication(medication_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("medication {}", medication_id)))?;
        let schedule = MedicationSchedule::new(
            &med,
            dose_time,
            rule.clone(),
            start.unwrap_or(med.start_date),
        )?;
        let id = schedule.id;
        data.insert_schedule(schedule)?;
        Ok(id)
    })?;

    println!("✓ Added schedule ({} at {})", rule, dose_time.format("%H:%M"));
    println!("  Schedule: {}", schedule_id);
    Ok(())
}

fn cmd_list(store: &Store) -> Result<()> {
    let data = store.read()?;

    if data.medications.is_empty() {
        println!("No medications registered.");
        return Ok(());
    }

    for med in &data.medications {
        let marker = if med.is_active { "" } else { " [inactive]" };
        println!("{}{}  ({})", med.name, marker, med.id);
        if let Some(ref note) = med.note {
            println!("  note: {}", note);
        }
        println!("  since {}", med.start_date);
        for schedule in data.schedules_of(med.id) {
            println!(
                "  - {} at {}  ({})",
                schedule.rule,
                schedule.dose_time.format("%H:%M"),
                schedule.id
            );
        }
    }
    Ok(())
}

fn cmd_refresh(
    store: &Store,
    clock: &dyn Clock,
    config: &Config,
    days: Option<u32>,
) -> Result<()> {
    let lookahead = days.unwrap_or(config.generation.lookahead_days);
    let through = clock
        .today()
        .checked_add_days(Days::new(u64::from(lookahead)))
        .unwrap_or(NaiveDate::MAX);

    let cancel = AtomicBool::new(false);
    let created = refresh_all(store, through, &cancel)?;

    println!("✓ Generated {} doses through {}", created, through);
    Ok(())
}

fn cmd_due(store: &Store, clock: &dyn Clock, date: Option<String>) -> Result<()> {
    let date = match date.as_deref() {
        Some(s) => parse_date(s)?,
        None => clock.today(),
    };

    let rows = doses_on(store, date)?;
    if rows.is_empty() {
        println!("No doses on {}.", date);
        return Ok(());
    }

    println!("Doses on {}:", date);
    for row in &rows {
        println!(
            "  {}  {:<9}  {}  {}",
            row.scheduled_at.format("%H:%M"),
            row.status.to_string(),
            row.medication,
            row.dose_id
        );
    }
    Ok(())
}

fn cmd_take(
    store: &Store,
    clock: &dyn Clock,
    dose: String,
    at: Option<String>,
    force: bool,
) -> Result<()> {
    let dose_id = parse_uuid(&dose)?;
    let at = match at.as_deref() {
        Some(s) => parse_datetime(s)?,
        None => clock.now(),
    };

    let result = if force {
        force_mark_taken(store, dose_id, at)
    } else {
        mark_taken(store, dose_id, at)
    };

    match result {
        Ok(dose) => {
            println!("✓ Dose {} taken at {}", dose.id, at.format("%Y-%m-%d %H:%M"));
            Ok(())
        }
        Err(Error::InvalidTransition { dose_id, current }) => {
            match current {
                DoseStatus::Missed => {
                    eprintln!("Dose is marked missed. Re-run with --force to record a late intake.")
                }
                DoseStatus::Taken => eprintln!("Dose is already taken."),
                DoseStatus::Scheduled => {
                    eprintln!("Dose is still scheduled; take it without --force.")
                }
            }
            Err(Error::InvalidTransition { dose_id, current })
        }
        Err(e) => Err(e),
    }
}

fn cmd_sweep(
    store: &Store,
    clock: &dyn Clock,
    config: &Config,
    grace_minutes: Option<u32>,
) -> Result<()> {
    let grace = chrono::Duration::minutes(i64::from(
        grace_minutes.unwrap_or(config.sweep.grace_minutes),
    ));

    let cancel = AtomicBool::new(false);
    let swept = sweep_all(store, clock.now(), grace, &cancel)?;

    println!("✓ Swept {} doses to missed", swept);
    Ok(())
}

fn cmd_missed(store: &Store) -> Result<()> {
    let rows = missed_doses(store)?;
    if rows.is_empty() {
        println!("No missed doses.");
        return Ok(());
    }

    println!("Missed doses:");
    for row in &rows {
        println!(
            "  {}  {}  {}",
            row.scheduled_at.format("%Y-%m-%d %H:%M"),
            row.medication,
            row.dose_id
        );
    }
    Ok(())
}

fn cmd_deactivate(store: &Store, medication: String) -> Result<()> {
    let medication_id = parse_uuid(&medication)?;
    store.update(|data| data.set_active(medication_id, false))?;
    println!("✓ Deactivated {}", medication_id);
    Ok(())
}

fn cmd_remove(store: &Store, medication: String) -> Result<()> {
    let medication_id = parse_uuid(&medication)?;
    store.update(|data| data.remove_medication(medication_id))?;
    println!("✓ Removed {}", medication_id);
    Ok(())
}

fn cmd_export(store: &Store, out: &PathBuf) -> Result<()> {
    let count = export_history(store, out)?;
    println!("✓ Exported {} doses", count);
    println!("  CSV: {}", out.display());
    Ok(())
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| Error::Validation(format!("invalid date: {}", s)))
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| Error::Validation(format!("invalid time: {}", s)))
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .map_err(|_| Error::Validation(format!("invalid datetime: {}", s)))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s.trim()).map_err(|_| Error::Validation(format!("invalid id: {}", s)))
}
