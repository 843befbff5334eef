//! Expansion of a recurrence pattern into dated sessions.
//!
//! # Algorithm
//!
//! 1. Start at `start_date`, or at the local date of `regenerate_from` when that
//!    is later.
//! 2. For every day up to `end_date` inclusive, look up the weekday's slot.
//! 3. Resolve both ends of the slot against the timezone rules of that date.
//!    A slot ending at `00:00` ends at the start of the following day.
//! 4. When regenerating, drop sessions that already ended before the cutoff;
//!    those belong to history.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::class::{ClassSchedule, PlannedSession};
use crate::error::ScheduleError;
use crate::recurrence::RecurrencePattern;
use crate::time_codec::local_to_instant;

/// Materializes sessions for `[start_date, end_date]`.
///
/// `regenerate_from` is `None` on initial creation (every date in range is
/// emitted) and the current instant when rebuilding after an edit.
///
/// Output is in ascending date order and depends only on the inputs.
pub fn materialize(
    pattern: &RecurrencePattern,
    tz: Tz,
    start_date: NaiveDate,
    end_date: NaiveDate,
    regenerate_from: Option<DateTime<Utc>>,
) -> Result<Vec<PlannedSession>, ScheduleError> {
    if end_date < start_date {
        return Err(ScheduleError::InvalidDateRange {
            start: start_date,
            end: end_date,
        });
    }

    let first = regenerate_from.map_or(start_date, |cutoff| {
        start_date.max(cutoff.with_timezone(&tz).date_naive())
    });

    let mut sessions = Vec::new();
    let mut day = first;
    while day <= end_date {
        if let Some(slot) = pattern.get(day.weekday()) {
            let start = local_to_instant(day, slot.start(), tz);
            let end = if slot.ends_at_midnight() {
                let next = day
                    .checked_add_days(Days::new(1))
                    .ok_or_else(|| out_of_range(day))?;
                local_to_instant(next, NaiveTime::MIN, tz)
            } else {
                local_to_instant(day, slot.end(), tz)
            };

            let already_over = regenerate_from.is_some_and(|cutoff| end < cutoff);
            if !already_over {
                sessions.push(PlannedSession {
                    date: day,
                    start,
                    end,
                });
            }
        }
        let Some(next) = day.succ_opt() else {
            break;
        };
        day = next;
    }

    tracing::debug!(
        timezone = tz.name(),
        %first,
        %end_date,
        count = sessions.len(),
        "materialized sessions"
    );
    Ok(sessions)
}

/// Materializes a whole class schedule.
pub fn materialize_schedule(
    schedule: &ClassSchedule,
    regenerate_from: Option<DateTime<Utc>>,
) -> Result<Vec<PlannedSession>, ScheduleError> {
    materialize(
        &schedule.recurrence,
        schedule.timezone,
        schedule.start_date,
        schedule.end_date,
        regenerate_from,
    )
}

fn out_of_range(day: NaiveDate) -> ScheduleError {
    ScheduleError::InvalidDateRange {
        start: day,
        end: NaiveDate::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};

    use crate::recurrence::TimeSlot;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn slot(s: &str) -> TimeSlot {
        s.parse().unwrap()
    }

    fn toronto() -> Tz {
        chrono_tz::America::Toronto
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).single().unwrap()
    }

    #[test]
    fn mondays_in_march_cross_dst() {
        let pattern = RecurrencePattern::new().with(Weekday::Mon, slot("09:00-10:00"));
        let sessions =
            materialize(&pattern, toronto(), date(2024, 3, 1), date(2024, 3, 31), None).unwrap();

        // 2024-03-01 is a Friday, so March has four Mondays.
        let dates: Vec<NaiveDate> = sessions.iter().map(|s| s.date).collect();
        assert_eq!(
            dates,
            vec![date(2024, 3, 4), date(2024, 3, 11), date(2024, 3, 18), date(2024, 3, 25)]
        );
        // EST (UTC-5) on the 4th, EDT (UTC-4) after the 10th.
        assert_eq!(sessions[0].start, utc(2024, 3, 4, 14, 0));
        assert_eq!(sessions[0].end, utc(2024, 3, 4, 15, 0));
        assert_eq!(sessions[1].start, utc(2024, 3, 11, 13, 0));
        assert_eq!(sessions[3].end, utc(2024, 3, 25, 14, 0));
    }

    #[test]
    fn emits_a_session_iff_weekday_is_scheduled() {
        let pattern = RecurrencePattern::new()
            .with(Weekday::Tue, slot("17:00-18:30"))
            .with(Weekday::Sat, slot("08:00-09:00"));
        let tz = chrono_tz::Europe::Berlin;
        let (start, end) = (date(2024, 1, 1), date(2024, 12, 31));
        let sessions = materialize(&pattern, tz, start, end, None).unwrap();

        let mut day = start;
        let mut expected = 0;
        while day <= end {
            let scheduled = pattern.get(day.weekday()).is_some();
            let emitted = sessions.iter().filter(|s| s.date == day).count();
            assert_eq!(emitted, usize::from(scheduled), "{day}");
            expected += usize::from(scheduled);
            day = day.succ_opt().unwrap();
        }
        assert_eq!(sessions.len(), expected);
        assert!(sessions.windows(2).all(|w| w[0].start < w[1].start));
    }

    #[test]
    fn repeated_calls_are_identical() {
        let pattern = RecurrencePattern::new()
            .with(Weekday::Wed, slot("12:00-13:00"))
            .with(Weekday::Fri, slot("23:00-00:00"));
        let tz = chrono_tz::Australia::Sydney;
        let first = materialize(&pattern, tz, date(2024, 3, 1), date(2024, 5, 1), None).unwrap();
        let second = materialize(&pattern, tz, date(2024, 3, 1), date(2024, 5, 1), None).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn midnight_end_rolls_to_next_local_day() {
        let pattern = RecurrencePattern::new().with(Weekday::Sat, slot("22:00-00:00"));
        let sessions =
            materialize(&pattern, toronto(), date(2024, 3, 9), date(2024, 3, 9), None).unwrap();
        assert_eq!(sessions.len(), 1);
        // Saturday 22:00 EST to Sunday 00:00 EST, before the 02:00 switch.
        assert_eq!(sessions[0].start, utc(2024, 3, 10, 3, 0));
        assert_eq!(sessions[0].end, utc(2024, 3, 10, 5, 0));
    }

    #[test]
    fn regeneration_skips_finished_sessions() {
        let pattern = RecurrencePattern::new().with(Weekday::Mon, slot("09:00-10:00"));
        let (start, end) = (date(2024, 3, 1), date(2024, 3, 31));

        // 09:30 EDT on Monday the 11th: that session is still running.
        let during = utc(2024, 3, 11, 13, 30);
        let sessions = materialize(&pattern, toronto(), start, end, Some(during)).unwrap();
        let dates: Vec<NaiveDate> = sessions.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![date(2024, 3, 11), date(2024, 3, 18), date(2024, 3, 25)]);

        let after = utc(2024, 3, 11, 14, 30);
        let sessions = materialize(&pattern, toronto(), start, end, Some(after)).unwrap();
        assert_eq!(sessions.first().map(|s| s.date), Some(date(2024, 3, 18)));
    }

    #[test]
    fn regeneration_cutoff_before_range_starts_at_start_date() {
        let pattern = RecurrencePattern::new().with(Weekday::Mon, slot("09:00-10:00"));
        let early = utc(2023, 1, 1, 0, 0);
        let sessions = materialize(
            &pattern,
            toronto(),
            date(2024, 3, 1),
            date(2024, 3, 31),
            Some(early),
        )
        .unwrap();
        assert_eq!(sessions.len(), 4);
    }

    #[test]
    fn rejects_inverted_range() {
        let pattern = RecurrencePattern::new().with(Weekday::Mon, slot("09:00-10:00"));
        let err = materialize(&pattern, toronto(), date(2024, 3, 2), date(2024, 3, 1), None);
        assert!(matches!(err, Err(ScheduleError::InvalidDateRange { .. })));
    }
}
