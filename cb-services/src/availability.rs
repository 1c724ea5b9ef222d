//! Cleaner availability matching.
//!
//! A slot is free when at least one active cleaner works at that time on
//! that weekday and has no live booking overlapping the slot window.
//! Everything is compared in business-local wall-clock time.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc, Weekday};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use cb_core::config::SchedulingConfig;
use cb_core::constants::SLOT_FORMAT;
use cb_core::error::{CbError, CbResult};
use cb_models::queries::{self, BookingFilter};
use cb_models::{Booking, Business, Cleaner, CleanerAvailability};

use crate::context::ServiceContext;
use crate::datetime::{self, ParsedDateTime};
use crate::service::{Service, ServiceState};

const DEFAULT_SLOT_MINUTES: i64 = 60;

/// Active cleaners of one business with their weekly hours and live bookings.
#[derive(Debug, Clone)]
pub struct Roster {
    pub cleaners: Vec<Cleaner>,
    pub availability: HashMap<i64, Vec<CleanerAvailability>>,
    pub bookings: Vec<Booking>,
    /// Length of the window a new booking would take.
    pub slot: Duration,
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            cleaners: Vec::new(),
            availability: HashMap::new(),
            bookings: Vec::new(),
            slot: Duration::minutes(DEFAULT_SLOT_MINUTES),
        }
    }
}

impl Roster {
    /// Load the roster of `business`, with bookings that can still overlap
    /// a `slot_minutes` window on `from` or later.
    ///
    /// High-rated assignment orders cleaners by rating, best first; otherwise
    /// they keep creation order.
    pub fn load(conn: &Connection, business: &Business, from: NaiveDate, slot_minutes: u32) -> CbResult<Self> {
        let business_id = business
            .id
            .ok_or_else(|| CbError::Database("business has no id".into()))?;

        let mut cleaners = queries::list_cleaners(conn, business_id, true)?;
        if business.prefers_high_rated() {
            // Stable, so equal ratings keep creation order.
            cleaners.sort_by(|a, b| b.rating.cmp(&a.rating));
        }

        let availability = queries::availability_by_cleaner(conn, business_id)?;
        let bookings = queries::list_bookings(
            conn,
            &BookingFilter {
                business_id: Some(business_id),
                // A booking late the day before can run past midnight.
                from_date: Some(from.pred_opt().unwrap_or(from)),
                include_completed: true,
                ..BookingFilter::default()
            },
        )?;

        debug!(
            "roster for {}: {} cleaners, {} bookings from {}",
            business.business_id,
            cleaners.len(),
            bookings.len(),
            from
        );
        Ok(Self {
            cleaners,
            availability,
            bookings,
            slot: Duration::minutes(i64::from(slot_minutes.max(1))),
        })
    }

    /// The same roster without one booking, used when moving that booking.
    pub fn excluding_booking(mut self, booking_id: &str) -> Self {
        self.bookings.retain(|b| b.booking_id != booking_id);
        self
    }

    fn rows_for(&self, cleaner: &Cleaner) -> &[CleanerAvailability] {
        cleaner
            .id
            .and_then(|id| self.availability.get(&id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Availability rows of every rostered cleaner for `weekday`, in roster order.
    pub fn rows_on(&self, weekday: Weekday) -> Vec<&CleanerAvailability> {
        self.cleaners
            .iter()
            .flat_map(|c| self.rows_for(c))
            .filter(|row| row.day_of_week == weekday)
            .collect()
    }

    /// Latest end time on `weekday` across the roster.
    pub fn latest_end(&self, weekday: Weekday) -> Option<NaiveTime> {
        self.rows_on(weekday).into_iter().map(|row| row.end_time).max()
    }

    fn is_booked(&self, cleaner: &Cleaner, at: NaiveDateTime) -> bool {
        let end = at + self.slot;
        self.bookings
            .iter()
            .filter(|b| b.cleaner_id.is_some() && b.cleaner_id == cleaner.id)
            .any(|b| b.overlaps(at, end))
    }

    fn works_at(&self, cleaner: &Cleaner, at: NaiveDateTime) -> bool {
        let weekday = at.weekday();
        self.rows_for(cleaner)
            .iter()
            .any(|row| row.day_of_week == weekday && row.covers(at.time()))
    }

    /// Whether this particular cleaner is free at `at`.
    pub fn cleaner_is_free(&self, cleaner: &Cleaner, at: NaiveDateTime) -> bool {
        self.works_at(cleaner, at) && !self.is_booked(cleaner, at)
    }
}

/// First cleaner, in roster order, who works at `at` and is not booked.
pub fn find_available_cleaner(roster: &Roster, at: NaiveDateTime) -> Option<&Cleaner> {
    roster.cleaners.iter().find(|c| roster.cleaner_is_free(c, at))
}

/// Whether any cleaner is free at `at`.
pub fn is_slot_available(roster: &Roster, at: NaiveDateTime) -> bool {
    find_available_cleaner(roster, at).is_some()
}

/// Bounds of the alternate-slot search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSearch {
    pub max_alternates: usize,
    pub same_day_attempts: u32,
    pub lookahead_days: u32,
}

impl Default for SlotSearch {
    fn default() -> Self {
        Self {
            max_alternates: 3,
            same_day_attempts: 10,
            lookahead_days: 7,
        }
    }
}

impl From<&SchedulingConfig> for SlotSearch {
    fn from(config: &SchedulingConfig) -> Self {
        Self {
            max_alternates: config.max_alternates,
            same_day_attempts: config.same_day_attempts,
            lookahead_days: config.lookahead_days,
        }
    }
}

/// Suggest up to `search.max_alternates` free slots near `at`.
///
/// Tries each hour after `at` on the same day first, stopping once a try
/// reaches the latest shift end of its weekday. If that is not enough, walks
/// the following days shift by shift from each shift's start hour.
pub fn find_alternate_slots(roster: &Roster, at: NaiveDateTime, search: SlotSearch) -> Vec<String> {
    let max = search.max_alternates;
    let mut slots: Vec<String> = Vec::new();
    let step = Duration::hours(1);
    let mut candidate = at + step;
    for _ in 0..search.same_day_attempts {
        if slots.len() >= max {
            break;
        }
        if is_slot_available(roster, candidate) {
            push_unique(&mut slots, candidate);
        }
        if let Some(latest) = roster.latest_end(candidate.weekday()) {
            if candidate.time() >= latest {
                break;
            }
        }
        candidate += step;
    }

    if slots.len() < max {
        let mut day = at.date();
        for _ in 0..search.lookahead_days {
            day = match day.succ_opt() {
                Some(d) => d,
                None => break,
            };
            for row in roster.rows_on(day.weekday()) {
                let Some(start) = NaiveTime::from_hms_opt(row.start_time.hour(), 0, 0) else {
                    continue;
                };
                let end = day.and_time(row.end_time);
                let mut slot = day.and_time(start);
                while slot < end {
                    if is_slot_available(roster, slot) {
                        push_unique(&mut slots, slot);
                    }
                    if slots.len() >= max {
                        return slots;
                    }
                    slot += step;
                }
            }
        }
    }

    slots.truncate(max);
    slots
}

fn push_unique(slots: &mut Vec<String>, t: NaiveDateTime) {
    let formatted = t.format(SLOT_FORMAT).to_string();
    if !slots.contains(&formatted) {
        slots.push(formatted);
    }
}

/// Truncate to the start of the hour.
pub fn round_down_to_hour(at: NaiveDateTime) -> NaiveDateTime {
    at.date()
        .and_hms_opt(at.hour(), 0, 0)
        .unwrap_or(at)
}

/// Outcome of an availability check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailabilityCheck {
    pub success: bool,
    /// The requested time as understood, `YYYY-MM-DD HH:MM`.
    pub parsed_datetime: String,
    pub available: bool,
    pub alternative_slots: Vec<String>,
    /// The checked slot, `YYYY-MM-DD HH:MM:SS`.
    pub timeslot: String,
}

/// Availability checks against a business roster.
pub struct AvailabilityService {
    state: ServiceState,
    ctx: ServiceContext,
}

impl AvailabilityService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            state: ServiceState::Created,
            ctx,
        }
    }

    pub fn search(&self) -> SlotSearch {
        SlotSearch::from(&self.ctx.config.scheduling)
    }

    /// Business timezone, or the configured default.
    pub fn timezone_of(&self, business: &Business) -> chrono_tz::Tz {
        if business.timezone.trim().is_empty() {
            datetime::parse_timezone(&self.ctx.config.scheduling.default_timezone)
        } else {
            datetime::parse_timezone(&business.timezone)
        }
    }

    /// Parse `text` in the business timezone using the configured slot length.
    pub fn parse_for(&self, business: &Business, text: &str, now: DateTime<Utc>) -> CbResult<ParsedDateTime> {
        datetime::parse_business_datetime_with_slot(
            text,
            self.timezone_of(business),
            now,
            self.ctx.config.scheduling.slot_minutes,
        )
    }

    pub fn roster(&self, business: &Business, from: NaiveDate) -> CbResult<Roster> {
        let conn = self.ctx.database.conn()?;
        Roster::load(&conn, business, from, self.ctx.config.scheduling.slot_minutes)
    }

    /// Check a customer-written time for a business.
    pub fn check_availability(&self, business: &Business, text: &str) -> CbResult<AvailabilityCheck> {
        self.check_availability_at(business, text, Utc::now())
    }

    pub fn check_availability_at(
        &self,
        business: &Business,
        text: &str,
        now: DateTime<Utc>,
    ) -> CbResult<AvailabilityCheck> {
        let parsed = self.parse_for(business, text, now)?;
        let slot = round_down_to_hour(parsed.local);
        let roster = self.roster(business, slot.date())?;

        let available = is_slot_available(&roster, slot);
        let alternative_slots = if available {
            Vec::new()
        } else {
            find_alternate_slots(&roster, slot, self.search())
        };

        info!(
            "availability {} at {}: {} ({} alternates)",
            business.business_id,
            slot,
            available,
            alternative_slots.len()
        );

        Ok(AvailabilityCheck {
            success: true,
            parsed_datetime: parsed.display(),
            available,
            alternative_slots,
            timeslot: slot.format(SLOT_FORMAT).to_string(),
        })
    }
}

impl Service for AvailabilityService {
    fn name(&self) -> &str {
        "availability"
    }

    fn state(&self) -> ServiceState {
        self.state
    }

    fn init(&mut self) -> CbResult<()> {
        self.state = ServiceState::Running;
        Ok(())
    }

    fn shutdown(&mut self) -> CbResult<()> {
        self.state = ServiceState::Stopped;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // 2025-03-17 is a Monday
    fn monday(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 17).unwrap().and_time(t(h, 0))
    }

    fn cleaner(id: i64, name: &str, rating: i64) -> Cleaner {
        let mut c = Cleaner::new(1, name);
        c.id = Some(id);
        c.rating = rating;
        c
    }

    fn hours(cleaner_id: i64, day: Weekday, start: u32, end: u32) -> CleanerAvailability {
        CleanerAvailability::new(cleaner_id, day, t(start, 0), t(end, 0))
    }

    fn booking(id: &str, cleaner_id: i64, at: NaiveDateTime) -> Booking {
        let mut b = Booking::new(1, "Ann", at.date(), at.time(), at.time() + Duration::hours(1));
        b.booking_id = id.to_string();
        b.cleaner_id = Some(cleaner_id);
        b
    }

    fn roster() -> Roster {
        let mut availability = HashMap::new();
        availability.insert(1, vec![hours(1, Weekday::Mon, 9, 12)]);
        availability.insert(2, vec![hours(2, Weekday::Mon, 13, 17), hours(2, Weekday::Wed, 9, 11)]);
        Roster {
            cleaners: vec![cleaner(1, "Alice", 3), cleaner(2, "Bob", 5)],
            availability,
            ..Roster::default()
        }
    }

    #[test]
    fn test_slot_inside_hours() {
        let r = roster();
        assert_eq!(find_available_cleaner(&r, monday(9)).unwrap().name, "Alice");
        assert_eq!(find_available_cleaner(&r, monday(14)).unwrap().name, "Bob");
        assert!(!is_slot_available(&r, monday(12)));
        assert!(!is_slot_available(&r, monday(8)));
        assert!(!is_slot_available(&r, monday(17)));
    }

    #[test]
    fn test_booking_blocks_its_cleaner() {
        let mut r = roster();
        r.bookings.push(booking("BKaaaaa", 1, monday(10)));
        assert!(is_slot_available(&r, monday(9)));
        assert!(!is_slot_available(&r, monday(10)));
        assert!(is_slot_available(&r, monday(11)));
    }

    #[test]
    fn test_half_hour_booking_blocks_both_hours() {
        let mut r = roster();
        let half_past = monday(10) + Duration::minutes(30);
        r.bookings.push(booking("BKaaaaa", 1, half_past));
        assert!(!is_slot_available(&r, monday(10)));
        assert!(!is_slot_available(&r, half_past));
        assert!(!is_slot_available(&r, monday(11)));
        assert!(is_slot_available(&r, monday(9)));
        assert!(is_slot_available(&r, monday(11) + Duration::minutes(30)));
    }

    #[test]
    fn test_booking_across_midnight_blocks_next_day() {
        let mut r = roster();
        r.availability.insert(1, vec![hours(1, Weekday::Sun, 22, 23), hours(1, Weekday::Mon, 0, 12)]);
        // Sunday 23:30 to Monday 00:30
        let late = NaiveDate::from_ymd_opt(2025, 3, 16).unwrap().and_time(t(23, 30));
        r.bookings.push(booking("BKlate", 1, late));
        assert!(!is_slot_available(&r, monday(0)));
        assert!(is_slot_available(&r, monday(1)));
    }

    #[test]
    fn test_longer_slot_reaches_later_booking() {
        let mut r = roster();
        r.bookings.push(booking("BKaaaaa", 1, monday(11)));
        assert!(is_slot_available(&r, monday(9)));
        r.slot = Duration::hours(3);
        assert!(!is_slot_available(&r, monday(9)));
    }

    #[test]
    fn test_cancelled_booking_does_not_block() {
        let mut r = roster();
        let mut b = booking("BKaaaaa", 1, monday(10));
        b.cancelled_at = Some(Utc::now());
        r.bookings.push(b);
        assert!(is_slot_available(&r, monday(10)));
    }

    #[test]
    fn test_excluding_booking() {
        let mut r = roster();
        r.bookings.push(booking("BKaaaaa", 1, monday(10)));
        let r = r.excluding_booking("BKaaaaa");
        assert!(is_slot_available(&r, monday(10)));
    }

    #[test]
    fn test_overlap_never_available() {
        let mut r = roster();
        for h in 9..12 {
            r.bookings.push(booking(&format!("BK{h}"), 1, monday(h)));
        }
        for h in 13..17 {
            r.bookings.push(booking(&format!("BX{h}"), 2, monday(h)));
        }
        for h in 0..24 {
            assert!(!is_slot_available(&r, monday(h)), "hour {h}");
        }
    }

    #[test]
    fn test_latest_end() {
        let r = roster();
        assert_eq!(r.latest_end(Weekday::Mon), Some(t(17, 0)));
        assert_eq!(r.latest_end(Weekday::Sun), None);
    }

    #[test]
    fn test_alternates_same_day() {
        let mut r = roster();
        r.bookings.push(booking("BKaaaaa", 1, monday(9)));
        let slots = find_alternate_slots(&r, monday(9), SlotSearch::default());
        assert_eq!(
            slots,
            vec!["2025-03-17 10:00:00", "2025-03-17 11:00:00", "2025-03-17 13:00:00"]
        );
    }

    #[test]
    fn test_alternates_spill_to_next_days() {
        let r = roster();
        // 16:00 Monday: 17:00 is past the last shift, so the scan moves on to
        // Wednesday's 9-11 shift.
        let slots = find_alternate_slots(&r, monday(16), SlotSearch::default());
        assert_eq!(
            slots,
            vec!["2025-03-19 09:00:00", "2025-03-19 10:00:00", "2025-03-24 09:00:00"]
        );
    }

    #[test]
    fn test_alternates_respect_max_and_are_unique() {
        let r = roster();
        let search = SlotSearch { max_alternates: 5, ..SlotSearch::default() };
        let slots = find_alternate_slots(&r, monday(8), search);
        assert_eq!(slots.len(), 5);
        let mut deduped = slots.clone();
        deduped.dedup();
        assert_eq!(deduped, slots);
    }

    #[test]
    fn test_empty_roster_has_no_alternates() {
        let slots = find_alternate_slots(&Roster::default(), monday(9), SlotSearch::default());
        assert!(slots.is_empty());
    }

    #[test]
    fn test_round_down_to_hour() {
        let at = NaiveDate::from_ymd_opt(2025, 3, 17).unwrap().and_time(t(10, 45));
        assert_eq!(round_down_to_hour(at), monday(10));
    }
}
