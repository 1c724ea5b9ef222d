//! Free-text appointment time parsing.
//!
//! Customers write times the way they speak ("tomorrow at 3pm", "March 15
//! at 10 AM", "next friday"). Everything here is interpreted as wall-clock
//! time in the business timezone, relative to an explicit `now`.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
    Weekday,
};
use chrono_tz::Tz;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use cb_core::constants::PARSED_DATETIME_FORMAT;
use cb_core::error::{CbError, CbResult};

/// Slot length used when none is configured.
pub const DEFAULT_SLOT_MINUTES: u32 = 60;

const MONTHS: &str = r"jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";
const WEEKDAYS: &str = r"monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tues|tue|wed|thurs|thur|thu|fri|sat|sun";
const TIME: &str = r"\d{1,2}(?::\d{2}){0,2}\s*(?:am|pm|a\.m\.|p\.m\.)?|noon|midnight";

lazy_static! {
    static ref ISO_RE: Regex =
        Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[t\s]+(.+))?$").unwrap();
    static ref US_RE: Regex =
        Regex::new(r"^(\d{1,2})/(\d{1,2})(?:/(\d{2}|\d{4}))?(?:\s+(?:at\s+)?(.+))?$").unwrap();
    static ref MONTH_FIRST_RE: Regex = Regex::new(&format!(
        r"^({MONTHS})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?(?:\s+(\d{{4}}))?(?:\s+(?:at\s+)?(.+))?$"
    ))
    .unwrap();
    static ref DAY_FIRST_RE: Regex = Regex::new(&format!(
        r"^(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({MONTHS})\.?(?:\s+(\d{{4}}))?(?:\s+(?:at\s+)?(.+))?$"
    ))
    .unwrap();
    static ref RELATIVE_RE: Regex = Regex::new(&format!(
        r"^(?:(today|tomorrow)|(?:this\s+)?(next\s+)?({WEEKDAYS}))(?:\s+(?:at\s+)?(.+))?$"
    ))
    .unwrap();
    static ref TIME_FIRST_RE: Regex =
        Regex::new(&format!(r"^(?:at\s+)?({TIME})\s+(?:on\s+)?(.+)$")).unwrap();
    static ref TIME_RE: Regex = Regex::new(
        r"^(\d{1,2})(?::(\d{2}))?(?::(\d{2}))?(?:\.\d+)?\s*(am|pm|a\.m\.|p\.m\.)?(?:z|[+-]\d{2}:?\d{2})?$"
    )
    .unwrap();
    static ref SPACES_RE: Regex = Regex::new(r"\s+").unwrap();
}

/// A parsed appointment time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParsedDateTime {
    /// Wall-clock time in the business timezone.
    pub local: NaiveDateTime,
    pub utc: DateTime<Utc>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl ParsedDateTime {
    /// Build from a business-local time. Nonexistent local times (DST gaps)
    /// move forward by the gap; ambiguous ones take the earlier instant.
    pub fn from_local(local: NaiveDateTime, tz: Tz, slot_minutes: u32) -> CbResult<Self> {
        let (local, utc) = resolve_local(local, tz)?;
        let end = local + Duration::minutes(i64::from(slot_minutes));
        Ok(Self {
            local,
            utc,
            date: local.date(),
            start_time: local.time(),
            end_time: end.time(),
        })
    }

    /// `YYYY-MM-DD HH:MM`, as shown in tool results.
    pub fn display(&self) -> String {
        self.local.format(PARSED_DATETIME_FORMAT).to_string()
    }
}

fn resolve_local(local: NaiveDateTime, tz: Tz) -> CbResult<(NaiveDateTime, DateTime<Utc>)> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Ok((local, dt.with_timezone(&Utc))),
        LocalResult::Ambiguous(earliest, _) => Ok((local, earliest.with_timezone(&Utc))),
        LocalResult::None => {
            // Gaps are at most an hour in every zone we care about; step forward.
            for minutes in [30, 60, 90, 120] {
                let shifted = local + Duration::minutes(minutes);
                if let LocalResult::Single(dt) = tz.from_local_datetime(&shifted) {
                    return Ok((shifted, dt.with_timezone(&Utc)));
                }
            }
            Err(CbError::Validation(format!(
                "Time does not exist in {}: {}",
                tz.name(),
                local
            )))
        }
    }
}

/// Resolve an IANA timezone name, falling back to UTC.
pub fn parse_timezone(name: &str) -> Tz {
    name.trim().parse::<Tz>().unwrap_or_else(|_| {
        if !name.trim().is_empty() {
            warn!("Unknown timezone '{}', using UTC", name);
        }
        Tz::UTC
    })
}

/// Parse a customer-written date and time with a one-hour slot.
pub fn parse_business_datetime(text: &str, tz: Tz, now: DateTime<Utc>) -> CbResult<ParsedDateTime> {
    parse_business_datetime_with_slot(text, tz, now, DEFAULT_SLOT_MINUTES)
}

/// Parse a customer-written date and time.
pub fn parse_business_datetime_with_slot(
    text: &str,
    tz: Tz,
    now: DateTime<Utc>,
    slot_minutes: u32,
) -> CbResult<ParsedDateTime> {
    let cleaned = SPACES_RE
        .replace_all(&text.trim().to_lowercase().replace(',', " "), " ")
        .trim()
        .to_string();
    let today = now.with_timezone(&tz).date_naive();

    let local = parse_date_and_time(&cleaned, today)
        .or_else(|| {
            let caps = TIME_FIRST_RE.captures(&cleaned)?;
            let time = parse_time(caps.get(1)?.as_str())?;
            let (date, inline_time) = parse_date_part(caps.get(2)?.as_str(), today)?;
            if inline_time.is_some() {
                return None;
            }
            Some(date.and_time(time))
        })
        .ok_or_else(|| CbError::Validation(format!("Could not understand the date and time: {text}")))?;

    ParsedDateTime::from_local(local, tz, slot_minutes)
}

fn default_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn parse_date_and_time(text: &str, today: NaiveDate) -> Option<NaiveDateTime> {
    let (date, time) = parse_date_part(text, today)?;
    Some(date.and_time(time.unwrap_or_else(default_time)))
}

/// Parse the date and an optional trailing time. A trailing part that is
/// present but is not a time rejects the whole input.
fn parse_date_part(text: &str, today: NaiveDate) -> Option<(NaiveDate, Option<NaiveTime>)> {
    if let Some(c) = ISO_RE.captures(text) {
        let date = NaiveDate::from_ymd_opt(num(&c, 1)?, num(&c, 2)?, num(&c, 3)?)?;
        return with_time(date, c.get(4).map(|m| m.as_str()));
    }

    if let Some(c) = US_RE.captures(text) {
        let month: u32 = num(&c, 1)?;
        let day: u32 = num(&c, 2)?;
        let date = match c.get(3) {
            Some(y) => {
                let mut year: i32 = y.as_str().parse().ok()?;
                if year < 100 {
                    year += 2000;
                }
                NaiveDate::from_ymd_opt(year, month, day)?
            }
            None => upcoming_month_day(month, day, today)?,
        };
        return with_time(date, c.get(4).map(|m| m.as_str()));
    }

    if let Some(c) = MONTH_FIRST_RE.captures(text) {
        let month = month_number(c.get(1)?.as_str())?;
        let day: u32 = num(&c, 2)?;
        let date = match c.get(3) {
            Some(y) => NaiveDate::from_ymd_opt(y.as_str().parse().ok()?, month, day)?,
            None => upcoming_month_day(month, day, today)?,
        };
        return with_time(date, c.get(4).map(|m| m.as_str()));
    }

    if let Some(c) = DAY_FIRST_RE.captures(text) {
        let day: u32 = num(&c, 1)?;
        let month = month_number(c.get(2)?.as_str())?;
        let date = match c.get(3) {
            Some(y) => NaiveDate::from_ymd_opt(y.as_str().parse().ok()?, month, day)?,
            None => upcoming_month_day(month, day, today)?,
        };
        return with_time(date, c.get(4).map(|m| m.as_str()));
    }

    if let Some(c) = RELATIVE_RE.captures(text) {
        let date = match c.get(1).map(|m| m.as_str()) {
            Some("today") => today,
            Some(_) => today.succ_opt()?,
            None => {
                let weekday = weekday_from_name(c.get(3)?.as_str())?;
                next_weekday(today, weekday, c.get(2).is_some())
            }
        };
        return with_time(date, c.get(4).map(|m| m.as_str()));
    }

    None
}

fn with_time(date: NaiveDate, time: Option<&str>) -> Option<(NaiveDate, Option<NaiveTime>)> {
    match time {
        None => Some((date, None)),
        Some(t) => Some((date, Some(parse_time(t)?))),
    }
}

fn num<T: std::str::FromStr>(caps: &regex::Captures<'_>, group: usize) -> Option<T> {
    caps.get(group)?.as_str().parse().ok()
}

/// Parse `2pm`, `2:30 PM`, `14:00`, `10:00:00`, `noon` or `midnight`.
/// Without am/pm the hour is read on a 24-hour clock.
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let t = text.trim().to_lowercase();
    match t.as_str() {
        "noon" | "midday" => return NaiveTime::from_hms_opt(12, 0, 0),
        "midnight" => return NaiveTime::from_hms_opt(0, 0, 0),
        _ => {}
    }

    let caps = TIME_RE.captures(&t)?;
    let mut hour: u32 = num(&caps, 1)?;
    let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let second: u32 = caps.get(3).map_or(Some(0), |m| m.as_str().parse().ok())?;

    if let Some(meridiem) = caps.get(4) {
        if hour == 0 || hour > 12 {
            return None;
        }
        let pm = meridiem.as_str().starts_with('p');
        hour = match (pm, hour) {
            (false, 12) => 0,
            (true, 12) => 12,
            (true, h) => h + 12,
            (false, h) => h,
        };
    }

    NaiveTime::from_hms_opt(hour, minute, second)
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    let day = match name.get(..3)? {
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

/// This year's date, or next year's once it has passed.
fn upcoming_month_day(month: u32, day: u32, today: NaiveDate) -> Option<NaiveDate> {
    match NaiveDate::from_ymd_opt(today.year(), month, day) {
        Some(date) if date >= today => Some(date),
        _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
    }
}

/// The given weekday: today if it matches (unless `strictly_after`),
/// otherwise the next one.
fn next_weekday(today: NaiveDate, weekday: Weekday, strictly_after: bool) -> NaiveDate {
    let ahead = (weekday.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7;
    let ahead = if ahead == 0 && strictly_after { 7 } else { ahead };
    today + Duration::days(i64::from(ahead))
}

/// `2025-03-12 10:00 AM (Wednesday) CDT` in the business timezone.
pub fn format_current_time(now: DateTime<Utc>, tz: Tz) -> String {
    now.with_timezone(&tz)
        .format("%Y-%m-%d %I:%M %p (%A) %Z")
        .to_string()
}
