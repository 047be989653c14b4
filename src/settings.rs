//! Schedule configuration persisted as key/value rows in `system_settings`.
//!
//! The typed [`ScheduleConfig`] is the only view the rest of the crate uses. Admin
//! updates arrive in the frontend shape ([`MeetingMetadata`], 12-hour clock with
//! AM/PM periods) and are canonicalized to 24-hour wall-clock times here.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use chrono::{NaiveDate, NaiveTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::models::{NewSetting, SettingRow};

pub const KEY_MEETINGS_ENABLED: &str = "meetings_enabled";
pub const KEY_MEETING_DURATION: &str = "meeting_duration";
pub const KEY_MEETING_INTERVAL: &str = "meeting_interval";
pub const KEY_DAY_START_TIME: &str = "day_start_time";
pub const KEY_DAY_END_TIME: &str = "day_end_time";
pub const KEY_MEETING_BREAKS: &str = "meeting_breaks";
pub const KEY_MAX_SELLER_ATTENDEES: &str = "max_seller_attendees_per_day";
pub const KEY_MAX_BUYER_MEETINGS: &str = "max_buyer_meetings_per_day";
pub const KEY_EVENT_NAME: &str = "event_name";
pub const KEY_EVENT_START_DATE: &str = "event_start_date";
pub const KEY_EVENT_END_DATE: &str = "event_end_date";
pub const KEY_EVENT_VENUE: &str = "event_venue";

pub const MIN_MEETING_DURATION: i64 = 10;
pub const MAX_MEETING_DURATION: i64 = 60;
pub const MIN_MEETING_INTERVAL: i64 = 0;
pub const MAX_MEETING_INTERVAL: i64 = 30;

const CLOCK_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingBreak {
    pub label: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl MeetingBreak {
    /// True when the half-open interval `[start, end)` shares any instant with this break.
    pub fn intersects(&self, start: NaiveTime, end: NaiveTime) -> bool {
        start < self.end && self.start < end
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventDetails {
    pub name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub venue: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleConfig {
    pub meetings_enabled: bool,
    /// Minutes.
    pub meeting_duration: i64,
    /// Minutes between the end of one slot and the start of the next.
    pub meeting_interval: i64,
    pub day_start_time: NaiveTime,
    pub day_end_time: NaiveTime,
    pub breaks: Vec<MeetingBreak>,
    pub max_seller_attendees_per_day: i64,
    pub max_buyer_meetings_per_day: i64,
    pub event: EventDetails,
}

fn clock(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            meetings_enabled: true,
            meeting_duration: 10,
            meeting_interval: 5,
            day_start_time: clock(9, 0),
            day_end_time: clock(17, 0),
            breaks: vec![MeetingBreak {
                label: "Lunch".to_string(),
                start: clock(12, 0),
                end: clock(13, 0),
            }],
            max_seller_attendees_per_day: 230,
            max_buyer_meetings_per_day: 30,
            event: EventDetails::default(),
        }
    }
}

/// Partial update; `None` leaves the current value untouched.
#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    pub meeting_duration: Option<i64>,
    pub meeting_interval: Option<i64>,
    pub day_start_time: Option<NaiveTime>,
    pub day_end_time: Option<NaiveTime>,
    pub breaks: Option<Vec<MeetingBreak>>,
    pub max_seller_attendees_per_day: Option<i64>,
    pub max_buyer_meetings_per_day: Option<i64>,
    pub event_name: Option<String>,
    pub event_start_date: Option<NaiveDate>,
    pub event_end_date: Option<NaiveDate>,
    pub event_venue: Option<String>,
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if !(MIN_MEETING_DURATION..=MAX_MEETING_DURATION).contains(&self.meeting_duration) {
            return Err(ServiceError::validation(format!(
                "meeting_duration must be between {} and {} minutes",
                MIN_MEETING_DURATION, MAX_MEETING_DURATION
            )));
        }
        if !(MIN_MEETING_INTERVAL..=MAX_MEETING_INTERVAL).contains(&self.meeting_interval) {
            return Err(ServiceError::validation(format!(
                "meeting_interval must be between {} and {} minutes",
                MIN_MEETING_INTERVAL, MAX_MEETING_INTERVAL
            )));
        }
        if self.day_start_time >= self.day_end_time {
            return Err(ServiceError::validation("day_start_time must be before day_end_time"));
        }
        for b in &self.breaks {
            if b.start >= b.end {
                return Err(ServiceError::validation(format!(
                    "break '{}' must start before it ends",
                    b.label
                )));
            }
            if b.start < self.day_start_time || b.end > self.day_end_time {
                return Err(ServiceError::validation(format!(
                    "break '{}' must fall within the meeting day",
                    b.label
                )));
            }
        }
        let mut ordered: Vec<&MeetingBreak> = self.breaks.iter().collect();
        ordered.sort_by_key(|b| b.start);
        for pair in ordered.windows(2) {
            if pair[0].end > pair[1].start {
                return Err(ServiceError::validation(format!(
                    "breaks '{}' and '{}' overlap",
                    pair[0].label, pair[1].label
                )));
            }
        }
        if self.max_seller_attendees_per_day <= 0 || self.max_buyer_meetings_per_day <= 0 {
            return Err(ServiceError::validation("per-day caps must be positive integers"));
        }
        if let (Some(start), Some(end)) = (self.event.start_date, self.event.end_date) {
            if end < start {
                return Err(ServiceError::validation("event_end_date must not precede event_start_date"));
            }
        }
        Ok(())
    }

    /// Applies a partial update and validates the result. `self` is left unchanged.
    pub fn apply(&self, update: ScheduleUpdate) -> Result<ScheduleConfig, ServiceError> {
        let mut next = self.clone();
        if let Some(v) = update.meeting_duration {
            next.meeting_duration = v;
        }
        if let Some(v) = update.meeting_interval {
            next.meeting_interval = v;
        }
        if let Some(v) = update.day_start_time {
            next.day_start_time = v;
        }
        if let Some(v) = update.day_end_time {
            next.day_end_time = v;
        }
        if let Some(mut breaks) = update.breaks {
            breaks.sort_by_key(|b| b.start);
            next.breaks = breaks;
        }
        if let Some(v) = update.max_seller_attendees_per_day {
            next.max_seller_attendees_per_day = v;
        }
        if let Some(v) = update.max_buyer_meetings_per_day {
            next.max_buyer_meetings_per_day = v;
        }
        if let Some(v) = update.event_name {
            next.event.name = non_empty(v);
        }
        if let Some(v) = update.event_start_date {
            next.event.start_date = Some(v);
        }
        if let Some(v) = update.event_end_date {
            next.event.end_date = Some(v);
        }
        if let Some(v) = update.event_venue {
            next.event.venue = non_empty(v);
        }
        next.validate()?;
        Ok(next)
    }

    fn to_rows(&self) -> Result<Vec<(&'static str, String)>, ServiceError> {
        Ok(vec![
            (KEY_MEETINGS_ENABLED, self.meetings_enabled.to_string()),
            (KEY_MEETING_DURATION, self.meeting_duration.to_string()),
            (KEY_MEETING_INTERVAL, self.meeting_interval.to_string()),
            (KEY_DAY_START_TIME, self.day_start_time.format(CLOCK_FORMAT).to_string()),
            (KEY_DAY_END_TIME, self.day_end_time.format(CLOCK_FORMAT).to_string()),
            (KEY_MEETING_BREAKS, serde_json::to_string(&self.breaks)?),
            (KEY_MAX_SELLER_ATTENDEES, self.max_seller_attendees_per_day.to_string()),
            (KEY_MAX_BUYER_MEETINGS, self.max_buyer_meetings_per_day.to_string()),
            (KEY_EVENT_NAME, self.event.name.clone().unwrap_or_default()),
            (
                KEY_EVENT_START_DATE,
                self.event.start_date.map(|d| d.to_string()).unwrap_or_default(),
            ),
            (
                KEY_EVENT_END_DATE,
                self.event.end_date.map(|d| d.to_string()).unwrap_or_default(),
            ),
            (KEY_EVENT_VENUE, self.event.venue.clone().unwrap_or_default()),
        ])
    }

    /// Missing keys fall back to defaults; present but unreadable values are an internal error.
    fn from_rows(rows: &HashMap<String, String>) -> Result<ScheduleConfig, ServiceError> {
        let defaults = ScheduleConfig::default();
        let get = |key: &str| rows.get(key).map(|v| v.trim());

        let corrupt = |key: &str, value: &str| {
            ServiceError::internal(format!("Stored setting {} has unreadable value '{}'", key, value))
        };
        let number = |key: &'static str, default: i64| -> Result<i64, ServiceError> {
            match get(key) {
                Some(v) => v.parse().map_err(|_| corrupt(key, v)),
                None => Ok(default),
            }
        };
        let time = |key: &'static str, default: NaiveTime| -> Result<NaiveTime, ServiceError> {
            match get(key) {
                Some(v) => NaiveTime::parse_from_str(v, CLOCK_FORMAT).map_err(|_| corrupt(key, v)),
                None => Ok(default),
            }
        };
        let date = |key: &'static str| -> Result<Option<NaiveDate>, ServiceError> {
            match get(key) {
                Some("") | None => Ok(None),
                Some(v) => v.parse().map(Some).map_err(|_| corrupt(key, v)),
            }
        };
        let text = |key: &'static str| get(key).and_then(|v| non_empty(v.to_string()));

        let meetings_enabled = match get(KEY_MEETINGS_ENABLED) {
            Some(v) => v.parse().map_err(|_| corrupt(KEY_MEETINGS_ENABLED, v))?,
            None => defaults.meetings_enabled,
        };
        let breaks = match get(KEY_MEETING_BREAKS) {
            Some(v) => serde_json::from_str(v).map_err(|_| corrupt(KEY_MEETING_BREAKS, v))?,
            None => defaults.breaks.clone(),
        };

        Ok(ScheduleConfig {
            meetings_enabled,
            meeting_duration: number(KEY_MEETING_DURATION, defaults.meeting_duration)?,
            meeting_interval: number(KEY_MEETING_INTERVAL, defaults.meeting_interval)?,
            day_start_time: time(KEY_DAY_START_TIME, defaults.day_start_time)?,
            day_end_time: time(KEY_DAY_END_TIME, defaults.day_end_time)?,
            breaks,
            max_seller_attendees_per_day: number(
                KEY_MAX_SELLER_ATTENDEES,
                defaults.max_seller_attendees_per_day,
            )?,
            max_buyer_meetings_per_day: number(
                KEY_MAX_BUYER_MEETINGS,
                defaults.max_buyer_meetings_per_day,
            )?,
            event: EventDetails {
                name: text(KEY_EVENT_NAME),
                start_date: date(KEY_EVENT_START_DATE)?,
                end_date: date(KEY_EVENT_END_DATE)?,
                venue: text(KEY_EVENT_VENUE),
            },
        })
    }
}

fn non_empty(v: String) -> Option<String> {
    let trimmed = v.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn load(conn: &mut PgConnection) -> Result<ScheduleConfig, ServiceError> {
    use crate::schema::system_settings::dsl::system_settings;

    let rows = system_settings
        .select(SettingRow::as_select())
        .load::<SettingRow>(conn)?;
    let map = rows.into_iter().map(|r| (r.key, r.value)).collect();
    ScheduleConfig::from_rows(&map)
}

fn upsert_rows(conn: &mut PgConnection, rows: Vec<(&'static str, String)>) -> Result<(), ServiceError> {
    use crate::schema::system_settings::dsl::{key, system_settings, updated_at, value};

    let now = Utc::now().naive_utc();
    let records = rows
        .into_iter()
        .map(|(k, v)| NewSetting {
            key: k.to_string(),
            value: v,
            updated_at: now,
        })
        .collect::<Vec<_>>();

    diesel::insert_into(system_settings)
        .values(&records)
        .on_conflict(key)
        .do_update()
        .set((value.eq(excluded(value)), updated_at.eq(excluded(updated_at))))
        .execute(conn)?;
    Ok(())
}

/// Populates default values for every key not yet stored. Existing values are kept.
pub fn initialize(conn: &mut PgConnection) -> Result<ScheduleConfig, ServiceError> {
    use crate::schema::system_settings::dsl::system_settings;

    conn.transaction(|conn| {
        let now = Utc::now().naive_utc();
        let records = ScheduleConfig::default()
            .to_rows()?
            .into_iter()
            .map(|(k, v)| NewSetting {
                key: k.to_string(),
                value: v,
                updated_at: now,
            })
            .collect::<Vec<_>>();

        let inserted = diesel::insert_into(system_settings)
            .values(&records)
            .on_conflict_do_nothing()
            .execute(conn)?;
        if inserted > 0 {
            log::info!("Initialized {} schedule settings with defaults", inserted);
        }
        load(conn)
    })
}

/// Validated partial update. The meetings toggle is not touched; see `toggle::set_enabled`.
pub fn update(conn: &mut PgConnection, changes: ScheduleUpdate) -> Result<ScheduleConfig, ServiceError> {
    use crate::schema::system_settings::dsl::system_settings;

    conn.transaction(|conn| {
        let rows = system_settings
            .select(SettingRow::as_select())
            .for_update()
            .load::<SettingRow>(conn)?;
        let map = rows.into_iter().map(|r| (r.key, r.value)).collect();
        let current = ScheduleConfig::from_rows(&map)?;
        let next = current.apply(changes)?;

        let rows = next
            .to_rows()?
            .into_iter()
            .filter(|(k, _)| *k != KEY_MEETINGS_ENABLED)
            .collect();
        upsert_rows(conn, rows)?;
        Ok(next)
    })
}

/// Reads the toggle while holding a row lock, so a concurrent toggle serializes against the caller.
/// `exclusive` takes `FOR UPDATE`, otherwise `FOR SHARE`.
pub fn meetings_enabled_locked(conn: &mut PgConnection, exclusive: bool) -> Result<bool, ServiceError> {
    use crate::schema::system_settings::dsl::{key, system_settings, value};

    let query = system_settings.filter(key.eq(KEY_MEETINGS_ENABLED)).select(value);
    let stored: Option<String> = if exclusive {
        query.for_update().first(conn).optional()?
    } else {
        query.for_share().first(conn).optional()?
    };

    match stored {
        Some(v) => v.trim().parse().map_err(|_| {
            ServiceError::internal(format!("Stored setting {} has unreadable value '{}'", KEY_MEETINGS_ENABLED, v))
        }),
        None => Ok(ScheduleConfig::default().meetings_enabled),
    }
}

pub fn write_meetings_enabled(conn: &mut PgConnection, enabled: bool) -> Result<(), ServiceError> {
    upsert_rows(conn, vec![(KEY_MEETINGS_ENABLED, enabled.to_string())])
}

/// Process-wide cache of the typed config. Writes go through [`ScheduleCache::write`] so
/// that no reader can repopulate the cache between a commit and its invalidation.
#[derive(Debug, Default)]
pub struct ScheduleCache {
    current: Mutex<Option<ScheduleConfig>>,
}

impl ScheduleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&self, conn: &mut PgConnection) -> Result<ScheduleConfig, ServiceError> {
        let mut guard = self.current.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(config) = guard.as_ref() {
            return Ok(config.clone());
        }
        let config = load(conn)?;
        *guard = Some(config.clone());
        Ok(config)
    }

    pub fn store(&self, config: ScheduleConfig) {
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = Some(config);
    }

    /// Runs a settings write while holding the cache lock and drops the cached copy afterwards,
    /// whether or not the write committed.
    pub fn write<T, F>(&self, conn: &mut PgConnection, op: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut PgConnection) -> Result<T, ServiceError>,
    {
        let mut guard = self.current.lock().unwrap_or_else(|p| p.into_inner());
        let result = op(conn);
        *guard = None;
        result
    }
}

// Frontend wire format

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub label: Option<String>,
    pub start_time: String,
    #[serde(default)]
    pub start_period: Option<String>,
    pub end_time: String,
    #[serde(default)]
    pub end_period: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeetingMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meetings_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_between_slots: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_start_period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_end_period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breaks: Option<Vec<BreakMetadata>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_seller_attendees: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_buyer_meetings: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_venue: Option<String>,
}

fn clock_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d{1,2}):(\d{2})$").expect("clock pattern compiles"))
}

/// Parses `"hh:mm"` with an optional `"AM"`/`"PM"` period. Without a period the clock is 24-hour.
pub fn parse_clock(raw: &str, period: Option<&str>) -> Result<NaiveTime, ServiceError> {
    let invalid = || ServiceError::validation(format!("invalid time '{}'", raw));
    let caps = clock_pattern().captures(raw.trim()).ok_or_else(invalid)?;
    let hour: u32 = caps[1].parse().map_err(|_| invalid())?;
    let minute: u32 = caps[2].parse().map_err(|_| invalid())?;

    let hour = match period.map(|p| p.trim().to_ascii_uppercase()) {
        None => hour,
        Some(p) if p.is_empty() => hour,
        Some(p) => {
            if !(1..=12).contains(&hour) {
                return Err(invalid());
            }
            match p.as_str() {
                "AM" => hour % 12,
                "PM" => hour % 12 + 12,
                other => {
                    return Err(ServiceError::validation(format!(
                        "period must be AM or PM, got '{}'",
                        other
                    )))
                }
            }
        }
    };
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Inverse of [`parse_clock`]: `("hh:mm", "AM"|"PM")`.
pub fn format_clock(t: NaiveTime) -> (String, String) {
    (t.format("%I:%M").to_string(), t.format("%p").to_string())
}

impl TryFrom<MeetingMetadata> for ScheduleUpdate {
    type Error = ServiceError;

    fn try_from(m: MeetingMetadata) -> Result<Self, Self::Error> {
        let day_start_time = m
            .day_start_time
            .as_deref()
            .map(|t| parse_clock(t, m.day_start_period.as_deref()))
            .transpose()?;
        let day_end_time = m
            .day_end_time
            .as_deref()
            .map(|t| parse_clock(t, m.day_end_period.as_deref()))
            .transpose()?;
        let breaks = m
            .breaks
            .map(|items| {
                items
                    .into_iter()
                    .map(|b| -> Result<MeetingBreak, ServiceError> {
                        Ok(MeetingBreak {
                            label: b
                                .label
                                .and_then(non_empty)
                                .unwrap_or_else(|| "Break".to_string()),
                            start: parse_clock(&b.start_time, b.start_period.as_deref())?,
                            end: parse_clock(&b.end_time, b.end_period.as_deref())?,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        Ok(ScheduleUpdate {
            meeting_duration: m.meeting_duration,
            meeting_interval: m.interval_between_slots,
            day_start_time,
            day_end_time,
            breaks,
            max_seller_attendees_per_day: m.max_seller_attendees,
            max_buyer_meetings_per_day: m.max_buyer_meetings,
            event_name: m.event_name,
            event_start_date: m.event_start_date,
            event_end_date: m.event_end_date,
            event_venue: m.event_venue,
        })
    }
}

impl From<&ScheduleConfig> for MeetingMetadata {
    fn from(c: &ScheduleConfig) -> Self {
        let (day_start_time, day_start_period) = format_clock(c.day_start_time);
        let (day_end_time, day_end_period) = format_clock(c.day_end_time);
        let breaks = c
            .breaks
            .iter()
            .enumerate()
            .map(|(i, b)| {
                let (start_time, start_period) = format_clock(b.start);
                let (end_time, end_period) = format_clock(b.end);
                BreakMetadata {
                    id: Some(serde_json::Value::from(i + 1)),
                    label: Some(b.label.clone()),
                    start_time,
                    start_period: Some(start_period),
                    end_time,
                    end_period: Some(end_period),
                }
            })
            .collect();

        MeetingMetadata {
            meetings_enabled: Some(c.meetings_enabled),
            meeting_duration: Some(c.meeting_duration),
            interval_between_slots: Some(c.meeting_interval),
            day_start_time: Some(day_start_time),
            day_start_period: Some(day_start_period),
            day_end_time: Some(day_end_time),
            day_end_period: Some(day_end_period),
            breaks: Some(breaks),
            max_seller_attendees: Some(c.max_seller_attendees_per_day),
            max_buyer_meetings: Some(c.max_buyer_meetings_per_day),
            event_name: c.event.name.clone(),
            event_start_date: c.event.start_date,
            event_end_date: c.event.end_date,
            event_venue: c.event.venue.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ScheduleConfig::default();
        config.validate().unwrap();
        assert_eq!(config.meeting_duration, 10);
        assert_eq!(config.meeting_interval, 5);
        assert_eq!(config.breaks[0].label, "Lunch");
        assert_eq!(config.max_seller_attendees_per_day, 230);
        assert_eq!(config.max_buyer_meetings_per_day, 30);
    }

    #[test]
    fn test_duration_below_minimum_is_rejected() {
        let current = ScheduleConfig::default();
        let err = current
            .apply(ScheduleUpdate {
                meeting_duration: Some(5),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");
        assert_eq!(current.meeting_duration, 10);
    }

    #[test]
    fn test_interval_bounds() {
        let current = ScheduleConfig::default();
        for ok in [0, 30] {
            current
                .apply(ScheduleUpdate { meeting_interval: Some(ok), ..Default::default() })
                .unwrap();
        }
        for bad in [-1, 31] {
            assert!(current
                .apply(ScheduleUpdate { meeting_interval: Some(bad), ..Default::default() })
                .is_err());
        }
    }

    #[test]
    fn test_day_bounds_must_be_ordered() {
        let err = ScheduleConfig::default()
            .apply(ScheduleUpdate {
                day_start_time: Some(t(17, 0)),
                day_end_time: Some(t(9, 0)),
                breaks: Some(vec![]),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");
    }

    #[test]
    fn test_break_outside_day_is_rejected() {
        let err = ScheduleConfig::default()
            .apply(ScheduleUpdate {
                breaks: Some(vec![MeetingBreak {
                    label: "Dinner".into(),
                    start: t(16, 30),
                    end: t(17, 30),
                }]),
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("Dinner"));
    }

    #[test]
    fn test_overlapping_breaks_are_rejected() {
        let err = ScheduleConfig::default()
            .apply(ScheduleUpdate {
                breaks: Some(vec![
                    MeetingBreak { label: "Tea".into(), start: t(15, 0), end: t(15, 30) },
                    MeetingBreak { label: "Lunch".into(), start: t(12, 0), end: t(13, 0) },
                    MeetingBreak { label: "Talk".into(), start: t(12, 45), end: t(13, 15) },
                ]),
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_adjacent_breaks_are_allowed_and_sorted() {
        let next = ScheduleConfig::default()
            .apply(ScheduleUpdate {
                breaks: Some(vec![
                    MeetingBreak { label: "Coffee".into(), start: t(13, 0), end: t(13, 15) },
                    MeetingBreak { label: "Lunch".into(), start: t(12, 0), end: t(13, 0) },
                ]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(next.breaks[0].label, "Lunch");
        assert_eq!(next.breaks[1].label, "Coffee");
    }

    #[test]
    fn test_caps_must_be_positive() {
        assert!(ScheduleConfig::default()
            .apply(ScheduleUpdate { max_buyer_meetings_per_day: Some(0), ..Default::default() })
            .is_err());
    }

    #[test]
    fn test_parse_clock_periods() {
        assert_eq!(parse_clock("01:30", Some("PM")).unwrap(), t(13, 30));
        assert_eq!(parse_clock("12:00", Some("AM")).unwrap(), t(0, 0));
        assert_eq!(parse_clock("12:15", Some("pm")).unwrap(), t(12, 15));
        assert_eq!(parse_clock("9:05", Some("AM")).unwrap(), t(9, 5));
        assert_eq!(parse_clock("17:00", None).unwrap(), t(17, 0));
        assert!(parse_clock("13:00", Some("PM")).is_err());
        assert!(parse_clock("10:00", Some("XM")).is_err());
        assert!(parse_clock("10h00", None).is_err());
    }

    #[test]
    fn test_metadata_round_trip_keeps_schedule() {
        let config = ScheduleConfig::default();
        let wire = MeetingMetadata::from(&config);
        assert_eq!(wire.day_start_time.as_deref(), Some("09:00"));
        assert_eq!(wire.day_start_period.as_deref(), Some("AM"));
        assert_eq!(wire.day_end_time.as_deref(), Some("05:00"));
        assert_eq!(wire.day_end_period.as_deref(), Some("PM"));

        let update = ScheduleUpdate::try_from(wire).unwrap();
        assert_eq!(config.apply(update).unwrap(), config);
    }

    #[test]
    fn test_metadata_deserializes_frontend_payload() {
        let json = r#"{
            "meetingDuration": 30,
            "intervalBetweenSlots": 0,
            "dayStartTime": "09:00", "dayStartPeriod": "AM",
            "dayEndTime": "05:00", "dayEndPeriod": "PM",
            "breaks": [{"id": 1, "label": "Lunch", "startTime": "12:00", "startPeriod": "PM",
                        "endTime": "01:00", "endPeriod": "PM"}]
        }"#;
        let wire: MeetingMetadata = serde_json::from_str(json).unwrap();
        let next = ScheduleConfig::default()
            .apply(ScheduleUpdate::try_from(wire).unwrap())
            .unwrap();
        assert_eq!(next.meeting_duration, 30);
        assert_eq!(next.meeting_interval, 0);
        assert_eq!(next.breaks, vec![MeetingBreak { label: "Lunch".into(), start: t(12, 0), end: t(13, 0) }]);
        assert_eq!(next.max_buyer_meetings_per_day, 30);
    }

    #[test]
    fn test_rows_round_trip_and_missing_keys_default() {
        let mut config = ScheduleConfig::default();
        config.meetings_enabled = false;
        config.event.name = Some("Splash25".into());
        config.event.start_date = NaiveDate::from_ymd_opt(2025, 6, 2);

        let rows: HashMap<String, String> = config
            .to_rows()
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(ScheduleConfig::from_rows(&rows).unwrap(), config);

        assert_eq!(ScheduleConfig::from_rows(&HashMap::new()).unwrap(), ScheduleConfig::default());
    }

    #[test]
    fn test_corrupt_row_is_internal_error() {
        let mut rows = HashMap::new();
        rows.insert(KEY_MEETING_DURATION.to_string(), "ten".to_string());
        let err = ScheduleConfig::from_rows(&rows).unwrap_err();
        assert_eq!(err.kind(), "INTERNAL");
    }
}
