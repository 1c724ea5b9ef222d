//! Cleaner entity model and weekly availability.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, Row};
use cb_core::constants::id_prefix;
use cb_core::error::{CbError, CbResult};
use cb_core::ids::generate_id;

/// A cleaner employed by a business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cleaner {
    pub id: Option<i64>,
    pub cleaner_id: String,
    pub business_id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Higher is better. Used when the business assigns jobs by rating.
    pub rating: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Cleaner {
    pub fn new(business_id: i64, name: impl Into<String>) -> Self {
        Self {
            id: None,
            cleaner_id: String::new(),
            business_id,
            name: name.into(),
            phone: None,
            email: None,
            rating: 0,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            cleaner_id: row.get("cleaner_id")?,
            business_id: row.get("business_id")?,
            name: row.get("name")?,
            phone: row.get("phone")?,
            email: row.get("email")?,
            rating: row.get("rating")?,
            is_active: row.get::<_, i32>("is_active")? != 0,
            created_at: row.get("created_at")?,
        })
    }

    // ─── Static finders ──────────────────────────────────────────────────

    pub fn find_by_id(conn: &Connection, id: i64) -> CbResult<Option<Self>> {
        match conn.query_row("SELECT * FROM cleaners WHERE id = ?1", [id], Self::from_row) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    pub fn find_by_cleaner_id(conn: &Connection, cleaner_id: &str) -> CbResult<Option<Self>> {
        match conn.query_row(
            "SELECT * FROM cleaners WHERE cleaner_id = ?1",
            [cleaner_id],
            Self::from_row,
        ) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    /// Weekly availability rows of this cleaner.
    pub fn availability(&self, conn: &Connection) -> CbResult<Vec<CleanerAvailability>> {
        match self.id {
            Some(id) => CleanerAvailability::list_for_cleaner(conn, id),
            None => Ok(Vec::new()),
        }
    }

    // ─── Persistence ─────────────────────────────────────────────────────

    pub fn save(&mut self, conn: &Connection) -> CbResult<i64> {
        if self.cleaner_id.is_empty() {
            self.cleaner_id = generate_id(id_prefix::CLEANER);
        }

        conn.execute(
            "INSERT INTO cleaners (
                cleaner_id, business_id, name, phone, email, rating, is_active, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
            ON CONFLICT(cleaner_id) DO UPDATE SET
                name = excluded.name,
                phone = excluded.phone,
                email = excluded.email,
                rating = excluded.rating,
                is_active = excluded.is_active",
            params![
                self.cleaner_id,
                self.business_id,
                self.name,
                self.phone,
                self.email,
                self.rating,
                self.is_active as i32,
                self.created_at,
            ],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;

        let real_id: i64 = conn
            .query_row(
                "SELECT id FROM cleaners WHERE cleaner_id = ?1",
                [&self.cleaner_id],
                |row| row.get(0),
            )
            .map_err(|e| CbError::Database(e.to_string()))?;
        self.id = Some(real_id);
        Ok(real_id)
    }
}

/// One weekly working window of a cleaner, in business-local time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanerAvailability {
    pub id: Option<i64>,
    pub cleaner_id: i64,
    pub day_of_week: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl CleanerAvailability {
    pub fn new(cleaner_id: i64, day_of_week: Weekday, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            id: None,
            cleaner_id,
            day_of_week,
            start_time,
            end_time,
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let day: String = row.get("day_of_week")?;
        let day_of_week = parse_weekday(&day).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("invalid day_of_week '{day}'").into(),
            )
        })?;
        Ok(Self {
            id: row.get("id")?,
            cleaner_id: row.get("cleaner_id")?,
            day_of_week,
            start_time: row.get("start_time")?,
            end_time: row.get("end_time")?,
        })
    }

    pub fn list_for_cleaner(conn: &Connection, cleaner_id: i64) -> CbResult<Vec<Self>> {
        let mut stmt = conn
            .prepare("SELECT * FROM cleaner_availability WHERE cleaner_id = ?1 ORDER BY id")
            .map_err(|e| CbError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([cleaner_id], Self::from_row)
            .map_err(|e| CbError::Database(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| CbError::Database(e.to_string()))
    }

    /// Whether `time` falls in `[start, end)`.
    pub fn covers(&self, time: NaiveTime) -> bool {
        self.start_time <= time && time < self.end_time
    }

    pub fn delete(conn: &Connection, id: i64) -> CbResult<bool> {
        let changed = conn
            .execute("DELETE FROM cleaner_availability WHERE id = ?1", [id])
            .map_err(|e| CbError::Database(e.to_string()))?;
        Ok(changed > 0)
    }

    pub fn save(&mut self, conn: &Connection) -> CbResult<i64> {
        if self.end_time <= self.start_time {
            return Err(CbError::Validation(format!(
                "availability must end after it starts ({} - {})",
                self.start_time, self.end_time
            )));
        }
        match self.id {
            Some(id) => {
                conn.execute(
                    "UPDATE cleaner_availability SET day_of_week = ?1, start_time = ?2, end_time = ?3
                     WHERE id = ?4",
                    params![weekday_name(self.day_of_week), self.start_time, self.end_time, id],
                )
                .map_err(|e| CbError::Database(e.to_string()))?;
                Ok(id)
            }
            None => {
                conn.execute(
                    "INSERT INTO cleaner_availability (cleaner_id, day_of_week, start_time, end_time)
                     VALUES (?1,?2,?3,?4)",
                    params![
                        self.cleaner_id,
                        weekday_name(self.day_of_week),
                        self.start_time,
                        self.end_time,
                    ],
                )
                .map_err(|e| CbError::Database(e.to_string()))?;
                let id = conn.last_insert_rowid();
                self.id = Some(id);
                Ok(id)
            }
        }
    }
}

/// Full English weekday name, as stored.
pub fn weekday_name(day: Weekday) -> &'static str {
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

/// Parse a full or abbreviated English weekday name, any case.
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    name.trim().parse::<Weekday>().ok()
}
