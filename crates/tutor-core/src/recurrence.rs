//! Weekly recurrence patterns.
//!
//! A [`RecurrencePattern`] holds at most one [`TimeSlot`] per weekday, in the
//! class's local wall-clock time. Its persisted form is a JSON object keyed by
//! lowercase weekday names:
//!
//! ```json
//! {"monday": {"start": "09:00", "end": "10:00"}}
//! ```
//!
//! Older rows use other shapes. [`normalize_pattern`] is the single place that
//! understands them; everything past the read boundary sees only the canonical
//! type.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Weekday};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::ScheduleError;
use crate::time_codec::{format_time, minutes_of_day, parse_time};

/// Weekdays in pattern order.
pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Canonical lowercase name of a weekday.
pub const fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Capitalized weekday name for messages.
pub const fn weekday_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Parses a weekday name, full or three-letter, in any case.
pub fn parse_weekday(value: &str) -> Result<Weekday, ScheduleError> {
    let lower = value.trim().to_ascii_lowercase();
    WEEKDAYS
        .into_iter()
        .find(|day| {
            let name = weekday_name(*day);
            lower == name || lower == name[..3]
        })
        .ok_or_else(|| ScheduleError::pattern(format!("unknown weekday {value:?}")))
}

/// A local start/end time pair.
///
/// `end` must be later in the day than `start`, except that an `end` of
/// `00:00` means end-of-day, which lets a slot run up to midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSlot", into = "RawSlot")]
pub struct TimeSlot {
    start: NaiveTime,
    end: NaiveTime,
}

#[derive(Serialize, Deserialize)]
struct RawSlot {
    start: String,
    end: String,
}

impl TryFrom<RawSlot> for TimeSlot {
    type Error = ScheduleError;

    fn try_from(raw: RawSlot) -> Result<Self, Self::Error> {
        Self::parse(&raw.start, &raw.end)
    }
}

impl From<TimeSlot> for RawSlot {
    fn from(slot: TimeSlot) -> Self {
        Self {
            start: format_time(slot.start),
            end: format_time(slot.end),
        }
    }
}

impl TimeSlot {
    /// Creates a slot after checking its invariants.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, ScheduleError> {
        if start == end {
            return Err(ScheduleError::pattern(format!(
                "start and end are both {}",
                format_time(start)
            )));
        }
        if end < start && end != NaiveTime::MIN {
            return Err(ScheduleError::pattern(format!(
                "{} ends before it starts; only 00:00 may close a slot past midnight",
                Self { start, end }
            )));
        }
        Ok(Self { start, end })
    }

    /// Parses and validates a pair of `HH:MM` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, ScheduleError> {
        Self::new(parse_time(start)?, parse_time(end)?)
    }

    pub const fn start(&self) -> NaiveTime {
        self.start
    }

    pub const fn end(&self) -> NaiveTime {
        self.end
    }

    /// Whether the slot closes at the following midnight.
    pub fn ends_at_midnight(&self) -> bool {
        self.end == NaiveTime::MIN
    }

    /// Start as minutes since midnight.
    pub fn start_minutes(&self) -> u32 {
        minutes_of_day(self.start)
    }

    /// End as minutes since midnight, with end-of-day as 1440.
    pub fn end_minutes(&self) -> u32 {
        if self.ends_at_midnight() {
            MINUTES_PER_DAY
        } else {
            minutes_of_day(self.end)
        }
    }

    /// Half-open overlap: slots that only touch do not overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        spans_overlap(
            (self.start_minutes(), self.end_minutes()),
            (other.start_minutes(), other.end_minutes()),
        )
    }

    /// Whether `other` lies entirely inside this slot.
    pub fn contains(&self, other: &Self) -> bool {
        self.start_minutes() <= other.start_minutes() && other.end_minutes() <= self.end_minutes()
    }
}

/// Half-open interval overlap on any ordered scale.
pub fn spans_overlap<T: PartialOrd>(a: (T, T), b: (T, T)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_time(self.start), format_time(self.end))
    }
}

impl FromStr for TimeSlot {
    type Err = ScheduleError;

    /// Parses `HH:MM-HH:MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| ScheduleError::pattern(format!("expected HH:MM-HH:MM, got {s:?}")))?;
        Self::parse(start, end)
    }
}

/// Per-weekday schedule of a class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "HashMap<String, Option<TimeSlot>>")]
pub struct RecurrencePattern {
    slots: [Option<TimeSlot>; 7],
}

impl RecurrencePattern {
    /// An empty pattern with no scheduled days.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    #[must_use]
    pub fn with(mut self, day: Weekday, slot: TimeSlot) -> Self {
        self.set(day, Some(slot));
        self
    }

    pub fn set(&mut self, day: Weekday, slot: Option<TimeSlot>) {
        self.slots[day.num_days_from_monday() as usize] = slot;
    }

    pub fn get(&self, day: Weekday) -> Option<&TimeSlot> {
        self.slots[day.num_days_from_monday() as usize].as_ref()
    }

    /// Scheduled days with their slots, Monday first.
    pub fn iter(&self) -> impl Iterator<Item = (Weekday, &TimeSlot)> {
        WEEKDAYS
            .into_iter()
            .zip(self.slots.iter())
            .filter_map(|(day, slot)| slot.as_ref().map(|slot| (day, slot)))
    }

    pub fn days(&self) -> Vec<Weekday> {
        self.iter().map(|(day, _)| day).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Replaces the slots of the given days, leaving the others alone.
    #[must_use]
    pub fn overlay(&self, day_times: &[(Weekday, TimeSlot)]) -> Self {
        let mut merged = self.clone();
        for (day, slot) in day_times {
            merged.set(*day, Some(*slot));
        }
        merged
    }

    /// Canonical JSON text for storage.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for RecurrencePattern {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.iter().count()))?;
        for (day, slot) in self.iter() {
            map.serialize_entry(weekday_name(day), slot)?;
        }
        map.end()
    }
}

impl TryFrom<HashMap<String, Option<TimeSlot>>> for RecurrencePattern {
    type Error = ScheduleError;

    fn try_from(map: HashMap<String, Option<TimeSlot>>) -> Result<Self, Self::Error> {
        let mut pattern = Self::new();
        for (key, slot) in map {
            pattern.set(parse_weekday(&key)?, slot);
        }
        Ok(pattern)
    }
}

impl fmt::Display for RecurrencePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(no days)");
        }
        let parts: Vec<String> = self
            .iter()
            .map(|(day, slot)| format!("{} {slot}", &weekday_label(day)[..3]))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Result of reading a stored pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPattern {
    pub pattern: RecurrencePattern,
    /// Days whose times were absent in the stored row and were filled with
    /// the `00:00`-`01:00` placeholder.
    pub defaulted_days: Vec<Weekday>,
}

impl NormalizedPattern {
    pub fn needs_migration(&self) -> bool {
        !self.defaulted_days.is_empty()
    }
}

/// Placeholder slot for legacy rows that stored days without times.
fn legacy_placeholder() -> TimeSlot {
    TimeSlot {
        start: NaiveTime::MIN,
        end: NaiveTime::from_hms_opt(1, 0, 0).unwrap_or(NaiveTime::MIN),
    }
}

/// Reads a stored pattern in any of its historical shapes.
///
/// Accepted shapes:
/// - canonical object: `{"monday": {"start": "09:00", "end": "10:00"}}`
/// - comma-separated day list: `"monday,wednesday"`
/// - array of days: `["monday", "wednesday"]`
/// - array of entries: `[{"day": "monday", "start_time": "09:00", "end_time": "10:00"}]`
///
/// Days listed without times get the placeholder slot and are reported in
/// [`NormalizedPattern::defaulted_days`].
pub fn normalize_pattern(value: &Value) -> Result<NormalizedPattern, ScheduleError> {
    let mut builder = PatternBuilder::default();
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, entry) in map {
                let day = parse_weekday(key)?;
                match entry {
                    Value::Null | Value::Bool(false) => {}
                    Value::Object(fields) => builder.add(day, fields, "start", "end")?,
                    Value::Bool(true) => builder.add_placeholder(day),
                    other => {
                        return Err(ScheduleError::pattern(format!(
                            "unexpected value for {key}: {other}"
                        )));
                    }
                }
            }
        }
        Value::String(list) => {
            for name in list.split(',').map(str::trim).filter(|name| !name.is_empty()) {
                builder.add_placeholder(parse_weekday(name)?);
            }
        }
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(name) => builder.add_placeholder(parse_weekday(name)?),
                    Value::Object(fields) => {
                        let day = fields
                            .get("day")
                            .and_then(Value::as_str)
                            .ok_or_else(|| ScheduleError::pattern("entry is missing its day"))?;
                        builder.add(parse_weekday(day)?, fields, "start_time", "end_time")?;
                    }
                    other => {
                        return Err(ScheduleError::pattern(format!(
                            "unexpected pattern entry: {other}"
                        )));
                    }
                }
            }
        }
        other => {
            return Err(ScheduleError::pattern(format!(
                "unexpected pattern shape: {other}"
            )));
        }
    }
    Ok(builder.finish())
}

/// Reads pattern text from storage: JSON first, then a bare day list.
pub fn normalize_pattern_text(text: &str) -> Result<NormalizedPattern, ScheduleError> {
    let value = serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.into()));
    normalize_pattern(&value)
}

#[derive(Default)]
struct PatternBuilder {
    pattern: RecurrencePattern,
    defaulted_days: Vec<Weekday>,
}

impl PatternBuilder {
    fn add(
        &mut self,
        day: Weekday,
        fields: &serde_json::Map<String, Value>,
        start_key: &str,
        end_key: &str,
    ) -> Result<(), ScheduleError> {
        let field = |primary: &str, fallback: &str| {
            fields
                .get(primary)
                .or_else(|| fields.get(fallback))
                .and_then(Value::as_str)
                .filter(|value| !value.trim().is_empty())
        };
        match (field(start_key, "start"), field(end_key, "end")) {
            (Some(start), Some(end)) => {
                self.defaulted_days.retain(|d| *d != day);
                self.pattern.set(day, Some(TimeSlot::parse(start, end)?));
            }
            (None, None) => self.add_placeholder(day),
            _ => {
                return Err(ScheduleError::pattern(format!(
                    "{} has only one of its start/end times",
                    weekday_label(day)
                )));
            }
        }
        Ok(())
    }

    fn add_placeholder(&mut self, day: Weekday) {
        if !self.defaulted_days.contains(&day) {
            self.defaulted_days.push(day);
        }
        self.pattern.set(day, Some(legacy_placeholder()));
    }

    fn finish(mut self) -> NormalizedPattern {
        self.defaulted_days.sort_by_key(Weekday::num_days_from_monday);
        NormalizedPattern {
            pattern: self.pattern,
            defaulted_days: self.defaulted_days,
        }
    }
}
