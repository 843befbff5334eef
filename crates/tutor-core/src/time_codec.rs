//! Conversion between local wall-clock times and UTC instants.
//!
//! Every conversion goes through the IANA rule data shipped with `chrono-tz`,
//! never a fixed numeric offset, so DST transitions land where they should.
//!
//! # DST resolution
//!
//! - A local time that occurs twice (fall-back) resolves to the earlier instant.
//! - A local time that never occurs (spring-forward gap) is read with the offset
//!   in force before the gap, which places it after the gap: 02:30 on a night
//!   that jumps from 02:00 to 03:00 becomes 03:30.

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone,
    Timelike, Utc,
};
use chrono_tz::Tz;

use crate::error::ScheduleError;

/// Parses an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, ScheduleError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ScheduleError::UnknownTimezone {
            name: name.to_string(),
        })
}

/// Parses a 24-hour `HH:MM` wall-clock time.
///
/// Legacy `HH:MM:SS` values are accepted; the seconds are dropped.
pub fn parse_time(value: &str) -> Result<NaiveTime, ScheduleError> {
    let invalid = || ScheduleError::InvalidTime {
        value: value.to_string(),
    };
    let trimmed = value.trim();
    let mut parts = trimmed.split(':');
    let (Some(hour), Some(minute)) = (parts.next(), parts.next()) else {
        return Err(invalid());
    };
    if let Some(seconds) = parts.next() {
        if seconds.len() != 2 || !seconds.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
    }
    if parts.next().is_some() {
        return Err(invalid());
    }
    let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
    if !two_digits(hour) || !two_digits(minute) {
        return Err(invalid());
    }
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Formats a time of day as `HH:MM`.
pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Minutes since local midnight.
pub fn minutes_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Interprets `time` on `date` as wall-clock time in `tz` and returns the instant.
pub fn local_to_instant(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let local = date.and_time(time);
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        LocalResult::None => {
            // Gaps never occur twice within a day, so the offset one day earlier
            // is the one in force before the jump.
            let before = tz
                .offset_from_utc_datetime(&(local - Duration::days(1)))
                .fix()
                .local_minus_utc();
            Utc.from_utc_datetime(&(local - Duration::seconds(i64::from(before))))
        }
    }
}

/// Projects an instant into `tz` and returns the local date and time.
pub fn instant_to_local_datetime(instant: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
    instant.with_timezone(&tz).naive_local()
}

/// Projects an instant into `tz` and returns the local time of day.
pub fn instant_to_local(instant: DateTime<Utc>, tz: Tz) -> NaiveTime {
    instant_to_local_datetime(instant, tz).time()
}

/// Re-expresses a wall-clock time from one zone in another.
///
/// `date` anchors the conversion: offsets differ across the year, and the
/// returned date tells the caller when the conversion crossed midnight.
pub fn convert_local_between_zones(
    date: NaiveDate,
    time: NaiveTime,
    source: Tz,
    target: Tz,
) -> NaiveDateTime {
    instant_to_local_datetime(local_to_instant(date, time, source), target)
}
