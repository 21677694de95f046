//! Recurrence rules: when does a schedule produce a dose?
//!
//! A rule is a pure value; evaluation is a function of
//! (rule, schedule start date, candidate date) with no hidden state, so
//! repeated evaluation always yields the same answer. No rule is ever
//! true before its schedule's start date.
//!
//! Weekdays use ISO numbering: Mon=1 .. Sun=7.

use crate::error::{Error, Result};
use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DAY_NAME_TO_ISO: [(&str, u8); 7] = [
    ("mon", 1),
    ("tue", 2),
    ("wed", 3),
    ("thu", 4),
    ("fri", 5),
    ("sat", 6),
    ("sun", 7),
];

fn iso_to_day_name(d: u8) -> Option<&'static str> {
    DAY_NAME_TO_ISO
        .iter()
        .find(|(_, iso)| *iso == d)
        .map(|(name, _)| *name)
}

/// Closed set of recurrence variants.
///
/// The persisted form is tagged (`{"type": "every_n_days", "n": 2}`) so
/// evaluation stays total instead of string-matched.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecurrenceRule {
    /// Only on the schedule's start date
    Once,
    /// Every calendar day from the start date on
    Daily,
    /// Every n-th day counted from the start date
    EveryNDays { n: u32 },
    /// On the listed ISO weekdays (Mon=1 .. Sun=7)
    Weekdays { days: Vec<u8> },
}

impl RecurrenceRule {
    /// Validate rule parameters. Invalid rules are rejected here, at
    /// construction, and never persisted.
    pub fn validate(&self) -> Result<()> {
        match self {
            RecurrenceRule::Once | RecurrenceRule::Daily => Ok(()),
            RecurrenceRule::EveryNDays { n } => {
                if *n < 1 {
                    return Err(Error::Validation("every_n_days requires n >= 1".into()));
                }
                Ok(())
            }
            RecurrenceRule::Weekdays { days } => {
                if days.is_empty() {
                    return Err(Error::Validation("weekday set must not be empty".into()));
                }
                for d in days {
                    if !(1..=7).contains(d) {
                        return Err(Error::Validation(format!(
                            "invalid ISO weekday number: {}",
                            d
                        )));
                    }
                }
                Ok(())
            }
        }
    }

    /// Does dosing occur on `candidate`? Calendar-day comparison; always
    /// false before the schedule start date.
    pub fn occurs_on(&self, start: NaiveDate, candidate: NaiveDate) -> bool {
        if candidate < start {
            return false;
        }
        match self {
            RecurrenceRule::Once => candidate == start,
            RecurrenceRule::Daily => true,
            RecurrenceRule::EveryNDays { n } => {
                let n = i64::from((*n).max(1));
                let offset = candidate.signed_duration_since(start).num_days();
                offset % n == 0
            }
            RecurrenceRule::Weekdays { days } => {
                let iso = candidate.weekday().number_from_monday() as u8;
                days.contains(&iso)
            }
        }
    }

    /// Lazily enumerate the dosing days in `[from, through]` (both ends
    /// inclusive). A simple forward scan filtered by `occurs_on`; the
    /// iterator is `Clone`, so it can be restarted.
    pub fn days_in_range(
        &self,
        start: NaiveDate,
        from: NaiveDate,
        through: NaiveDate,
    ) -> DosingDays {
        DosingDays {
            rule: self.clone(),
            start,
            cursor: from,
            through,
        }
    }
}

/// Iterator over the dosing days of a rule within a date range
#[derive(Clone, Debug)]
pub struct DosingDays {
    rule: RecurrenceRule,
    start: NaiveDate,
    cursor: NaiveDate,
    through: NaiveDate,
}

impl Iterator for DosingDays {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        while self.cursor <= self.through {
            let day = self.cursor;
            self.cursor = self.cursor.checked_add_days(Days::new(1))?;
            if self.rule.occurs_on(self.start, day) {
                return Some(day);
            }
        }
        None
    }
}

impl FromStr for RecurrenceRule {
    type Err = Error;

    /// Parse the user-facing rule spellings: `once`, `daily`/`everyday`,
    /// `every<N>days` (e.g. `every2days`), `weekdays`, `weekends`, or a
    /// comma list of day names (`mon,wed,fri`).
    fn from_str(raw: &str) -> Result<Self> {
        let pattern = raw.trim().to_lowercase();

        let rule = match pattern.as_str() {
            "" => return Err(Error::Validation("empty recurrence pattern".into())),
            "once" => RecurrenceRule::Once,
            "daily" | "everyday" => RecurrenceRule::Daily,
            "weekdays" => RecurrenceRule::Weekdays {
                days: vec![1, 2, 3, 4, 5],
            },
            "weekends" => RecurrenceRule::Weekdays { days: vec![6, 7] },
            _ => {
                if let Some(middle) = pattern
                    .strip_prefix("every")
                    .and_then(|rest| rest.strip_suffix("days"))
                {
                    let n: u32 = middle.parse().map_err(|_| {
                        Error::Validation(format!("invalid recurrence pattern: {}", raw))
                    })?;
                    let rule = RecurrenceRule::EveryNDays { n };
                    rule.validate()?;
                    return Ok(rule);
                }

                let mut days: Vec<u8> = Vec::new();
                for part in pattern.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                    let iso = DAY_NAME_TO_ISO
                        .iter()
                        .find(|(name, _)| *name == part)
                        .map(|(_, d)| *d)
                        .ok_or_else(|| {
                            Error::Validation(format!("invalid recurrence pattern: {}", raw))
                        })?;
                    if !days.contains(&iso) {
                        days.push(iso);
                    }
                }
                days.sort_unstable();
                let rule = RecurrenceRule::Weekdays { days };
                rule.validate()?;
                rule
            }
        };

        Ok(rule)
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecurrenceRule::Once => write!(f, "once"),
            RecurrenceRule::Daily => write!(f, "daily"),
            RecurrenceRule::EveryNDays { n } => write!(f, "every{}days", n),
            RecurrenceRule::Weekdays { days } => {
                let mut days = days.clone();
                days.sort_unstable();
                if days == [1, 2, 3, 4, 5] {
                    return write!(f, "weekdays");
                }
                if days == [6, 7] {
                    return write!(f, "weekends");
                }
                let names: Vec<&str> = days.iter().filter_map(|d| iso_to_day_name(*d)).collect();
                write!(f, "{}", names.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_never_occurs_before_start() {
        let start = date(2026, 1, 10);
        let before = date(2026, 1, 9);

        let rules = [
            RecurrenceRule::Once,
            RecurrenceRule::Daily,
            RecurrenceRule::EveryNDays { n: 1 },
            RecurrenceRule::Weekdays {
                days: vec![1, 2, 3, 4, 5, 6, 7],
            },
        ];
        for rule in rules {
            assert!(!rule.occurs_on(start, before), "rule {:?}", rule);
        }
    }

    #[test]
    fn test_once_only_on_start_date() {
        let rule = RecurrenceRule::Once;
        let start = date(2026, 1, 1);

        assert!(rule.occurs_on(start, start));
        assert!(!rule.occurs_on(start, date(2026, 1, 2)));
    }

    #[test]
    fn test_every_n_days_occurs_on_start() {
        let start = date(2026, 1, 1);
        for n in [1, 2, 3, 30] {
            let rule = RecurrenceRule::EveryNDays { n };
            assert!(rule.occurs_on(start, start), "n = {}", n);
        }
    }

    #[test]
    fn test_every_n_days_offsets() {
        let rule = RecurrenceRule::EveryNDays { n: 3 };
        let start = date(2026, 1, 1);

        assert!(rule.occurs_on(start, date(2026, 1, 4)));
        assert!(rule.occurs_on(start, date(2026, 1, 7)));
        assert!(!rule.occurs_on(start, date(2026, 1, 2)));
        assert!(!rule.occurs_on(start, date(2026, 1, 3)));
        // Crosses the month boundary: day 31 is offset 30
        assert!(rule.occurs_on(start, date(2026, 1, 31)));
    }

    #[test]
    fn test_weekdays_rule() {
        // 2026-01-05 is a Monday
        let rule = RecurrenceRule::Weekdays { days: vec![1, 3] };
        let start = date(2026, 1, 5);

        assert!(rule.occurs_on(start, date(2026, 1, 5))); // Mon
        assert!(!rule.occurs_on(start, date(2026, 1, 6))); // Tue
        assert!(rule.occurs_on(start, date(2026, 1, 7))); // Wed
        assert!(rule.occurs_on(start, date(2026, 1, 12))); // next Mon
    }

    #[test]
    fn test_days_in_range_daily() {
        let rule = RecurrenceRule::Daily;
        let start = date(2026, 1, 1);

        let days: Vec<NaiveDate> = rule
            .days_in_range(start, start, date(2026, 1, 3))
            .collect();
        assert_eq!(
            days,
            vec![date(2026, 1, 1), date(2026, 1, 2), date(2026, 1, 3)]
        );
    }

    #[test]
    fn test_days_in_range_clamps_to_start() {
        let rule = RecurrenceRule::Daily;
        let start = date(2026, 1, 10);

        // Range opens before the schedule starts; nothing before start shows up
        let days: Vec<NaiveDate> = rule
            .days_in_range(start, date(2026, 1, 8), date(2026, 1, 11))
            .collect();
        assert_eq!(days, vec![date(2026, 1, 10), date(2026, 1, 11)]);
    }

    #[test]
    fn test_days_in_range_empty_when_inverted() {
        let rule = RecurrenceRule::Daily;
        let start = date(2026, 1, 1);

        let days: Vec<NaiveDate> = rule
            .days_in_range(start, date(2026, 1, 5), date(2026, 1, 4))
            .collect();
        assert!(days.is_empty());
    }

    #[test]
    fn test_days_in_range_is_restartable() {
        let rule = RecurrenceRule::EveryNDays { n: 2 };
        let start = date(2026, 1, 1);

        let iter = rule.days_in_range(start, start, date(2026, 1, 7));
        let first: Vec<NaiveDate> = iter.clone().collect();
        let second: Vec<NaiveDate> = iter.collect();
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![date(2026, 1, 1), date(2026, 1, 3), date(2026, 1, 5), date(2026, 1, 7)]
        );
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        assert!(RecurrenceRule::EveryNDays { n: 0 }.validate().is_err());
        assert!(RecurrenceRule::Weekdays { days: vec![] }.validate().is_err());
        assert!(RecurrenceRule::Weekdays { days: vec![8] }.validate().is_err());
        assert!(RecurrenceRule::Weekdays { days: vec![1, 7] }.validate().is_ok());
    }

    #[test]
    fn test_parse_spellings() {
        assert_eq!("once".parse::<RecurrenceRule>().unwrap(), RecurrenceRule::Once);
        assert_eq!("daily".parse::<RecurrenceRule>().unwrap(), RecurrenceRule::Daily);
        assert_eq!(
            "everyday".parse::<RecurrenceRule>().unwrap(),
            RecurrenceRule::Daily
        );
        assert_eq!(
            "every2days".parse::<RecurrenceRule>().unwrap(),
            RecurrenceRule::EveryNDays { n: 2 }
        );
        assert_eq!(
            "weekdays".parse::<RecurrenceRule>().unwrap(),
            RecurrenceRule::Weekdays {
                days: vec![1, 2, 3, 4, 5]
            }
        );
        assert_eq!(
            "mon,wed,fri".parse::<RecurrenceRule>().unwrap(),
            RecurrenceRule::Weekdays { days: vec![1, 3, 5] }
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<RecurrenceRule>().is_err());
        assert!("every0days".parse::<RecurrenceRule>().is_err());
        assert!("everydays".parse::<RecurrenceRule>().is_err());
        assert!("mon,funday".parse::<RecurrenceRule>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for spelling in ["once", "daily", "every3days", "weekdays", "weekends", "mon,wed,fri"] {
            let rule: RecurrenceRule = spelling.parse().unwrap();
            assert_eq!(rule.to_string(), spelling);
        }
    }

    #[test]
    fn test_tagged_wire_format() {
        let rule = RecurrenceRule::EveryNDays { n: 2 };
        let json = serde_json::to_string(&rule).unwrap();
        assert_eq!(json, r#"{"type":"every_n_days","n":2}"#);

        let parsed: RecurrenceRule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rule);
    }
}
