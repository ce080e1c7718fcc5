use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::calendar::blocked_slot::{DateRange, SlotKey};
use crate::calendar::time_grid::{GridError, TimeSlots};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly { weekday: Weekday },
    Monthly { day_of_month: u32 },
}

impl Frequency {
    pub fn matches(&self, date: NaiveDate) -> bool {
        match self {
            Frequency::Daily => true,
            Frequency::Weekly { weekday } => date.weekday() == *weekday,
            Frequency::Monthly { day_of_month } => date.day() == *day_of_month,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Coverage {
    AllDay,
    Times { times: Vec<String> },
    Range { start: String, end: String },
}

/// A standing rule such as "every Sunday, all day" or "weekdays 12:00-13:30".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringBlock {
    pub frequency: Frequency,
    pub coverage: Coverage,
    #[serde(default)]
    pub reason: Option<String>,
}

impl RecurringBlock {
    /// Slot keys this rule produces for every matching date of `range`.
    pub fn expand(&self, range: DateRange, slots: &TimeSlots) -> Result<Vec<SlotKey>, GridError> {
        let times: Vec<&str> = match &self.coverage {
            Coverage::AllDay => Vec::new(),
            Coverage::Times { times } => {
                for time in times {
                    slots.index_of(time)?;
                }
                times.iter().map(String::as_str).collect()
            }
            Coverage::Range { start, end } => {
                slots.span(start, end)?.iter().map(String::as_str).collect()
            }
        };

        let mut keys = Vec::new();
        for date in range.dates() {
            if !self.frequency.matches(date) {
                continue;
            }
            match self.coverage {
                Coverage::AllDay => keys.push(SlotKey::WholeDay(date)),
                _ => keys.extend(times.iter().map(|time| SlotKey::timed(date, time))),
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn march() -> DateRange {
        DateRange::new(date(2025, 3, 1), date(2025, 3, 31))
    }

    #[test]
    fn weekly_all_day_rule_hits_each_sunday() {
        let rule = RecurringBlock {
            frequency: Frequency::Weekly { weekday: Weekday::Sun },
            coverage: Coverage::AllDay,
            reason: Some("Fermé".to_string()),
        };

        let keys = rule.expand(march(), &TimeSlots::default()).unwrap();

        assert_eq!(keys.len(), 5);
        assert!(keys.iter().all(|k| k.is_whole_day() && k.date().weekday() == Weekday::Sun));
    }

    #[test]
    fn monthly_range_rule_expands_inclusive_time_span() {
        let rule = RecurringBlock {
            frequency: Frequency::Monthly { day_of_month: 15 },
            coverage: Coverage::Range {
                start: "12:00".to_string(),
                end: "13:00".to_string(),
            },
            reason: None,
        };

        let keys = rule.expand(march(), &TimeSlots::default()).unwrap();

        assert_eq!(
            keys,
            vec![
                SlotKey::timed(date(2025, 3, 15), "12:00"),
                SlotKey::timed(date(2025, 3, 15), "12:30"),
                SlotKey::timed(date(2025, 3, 15), "13:00"),
            ]
        );
    }

    #[test]
    fn daily_times_rule_covers_every_date() {
        let rule = RecurringBlock {
            frequency: Frequency::Daily,
            coverage: Coverage::Times {
                times: vec!["09:00".to_string()],
            },
            reason: None,
        };

        let keys = rule
            .expand(DateRange::new(date(2025, 3, 1), date(2025, 3, 7)), &TimeSlots::default())
            .unwrap();

        assert_eq!(keys.len(), 7);
    }

    #[test]
    fn unknown_time_in_rule_is_invalid_time_slot() {
        let rule = RecurringBlock {
            frequency: Frequency::Daily,
            coverage: Coverage::Times {
                times: vec!["09:15".to_string()],
            },
            reason: None,
        };

        let result = rule.expand(march(), &TimeSlots::default());

        assert_eq!(result, Err(GridError::InvalidTimeSlot("09:15".to_string())));
    }

    #[test]
    fn rule_parses_from_toml_inline_tables() {
        let rule: RecurringBlock = toml::from_str(
            r#"
                reason = "Pause déjeuner"
                frequency = { kind = "weekly", weekday = "Mon" }
                coverage = { kind = "range", start = "12:00", end = "13:30" }
            "#,
        )
        .unwrap();

        assert_eq!(rule.frequency, Frequency::Weekly { weekday: Weekday::Mon });
        assert_eq!(rule.reason.as_deref(), Some("Pause déjeuner"));
    }
}
