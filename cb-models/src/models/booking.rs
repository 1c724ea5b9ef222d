//! Booking entity model and its custom add-on lines.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use cb_core::constants::{id_prefix, recurring, service_type};
use cb_core::error::{CbError, CbResult};
use cb_core::ids::generate_id;

use super::addon::{Addon, AddonTable};

/// A scheduled cleaning.
///
/// `cleaning_date`, `start_time` and `end_time` are wall-clock values in the
/// owning business's timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Option<i64>,
    pub booking_id: String,
    pub business_id: i64,
    pub customer_id: Option<i64>,
    pub cleaner_id: Option<i64>,

    // Contact
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,

    // Address
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state_or_province: Option<String>,
    pub zip_code: Option<String>,

    // Property
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub square_feet: i64,

    // Service
    pub cleaning_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub service_type: String,
    pub recurring: String,
    pub addons: AddonTable<i64>,

    pub other_requests: Option<String>,
    pub payment_method: Option<String>,
    pub total_price: f64,
    pub tax: f64,
    pub used_custom_pricing: bool,
    /// Price breakdown at booking time.
    pub pricing_snapshot: Option<serde_json::Value>,
    pub tip: f64,

    // Lifecycle
    pub is_completed: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_reason: Option<String>,
    pub rescheduled_at: Option<DateTime<Utc>>,
    pub rescheduled_reason: Option<String>,
    pub will_someone_be_home: Option<bool>,
    pub key_location: Option<String>,
    pub payment_reminder_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// A new, unsaved one-time standard booking.
    pub fn new(
        business_id: i64,
        first_name: impl Into<String>,
        cleaning_date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Self {
        Self {
            id: None,
            booking_id: String::new(),
            business_id,
            customer_id: None,
            cleaner_id: None,
            first_name: first_name.into(),
            last_name: None,
            email: None,
            phone_number: None,
            address1: None,
            address2: None,
            city: None,
            state_or_province: None,
            zip_code: None,
            bedrooms: 0,
            bathrooms: 0,
            square_feet: 0,
            cleaning_date,
            start_time,
            end_time,
            service_type: service_type::STANDARD.to_string(),
            recurring: recurring::ONE_TIME.to_string(),
            addons: AddonTable::default(),
            other_requests: None,
            payment_method: None,
            total_price: 0.0,
            tax: 0.0,
            used_custom_pricing: false,
            pricing_snapshot: None,
            tip: 0.0,
            is_completed: false,
            cancelled_at: None,
            cancelled_reason: None,
            rescheduled_at: None,
            rescheduled_reason: None,
            will_someone_be_home: None,
            key_location: None,
            payment_reminder_sent_at: None,
            created_at: Utc::now(),
        }
    }

    /// Construct a Booking from a database row.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mut addons = AddonTable::default();
        for addon in Addon::ALL {
            addons.set(addon, row.get(addon.quantity_column().as_str())?);
        }

        let snapshot: Option<String> = row.get("pricing_snapshot")?;
        let pricing_snapshot = match snapshot {
            Some(text) => Some(serde_json::from_str(&text).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
            })?),
            None => None,
        };

        Ok(Self {
            id: row.get("id")?,
            booking_id: row.get("booking_id")?,
            business_id: row.get("business_id")?,
            customer_id: row.get("customer_id")?,
            cleaner_id: row.get("cleaner_id")?,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
            email: row.get("email")?,
            phone_number: row.get("phone_number")?,
            address1: row.get("address1")?,
            address2: row.get("address2")?,
            city: row.get("city")?,
            state_or_province: row.get("state_or_province")?,
            zip_code: row.get("zip_code")?,
            bedrooms: row.get("bedrooms")?,
            bathrooms: row.get("bathrooms")?,
            square_feet: row.get("square_feet")?,
            cleaning_date: row.get("cleaning_date")?,
            start_time: row.get("start_time")?,
            end_time: row.get("end_time")?,
            service_type: row.get("service_type")?,
            recurring: row.get("recurring")?,
            addons,
            other_requests: row.get("other_requests")?,
            payment_method: row.get("payment_method")?,
            total_price: row.get("total_price")?,
            tax: row.get("tax")?,
            used_custom_pricing: row.get::<_, i32>("used_custom_pricing")? != 0,
            pricing_snapshot,
            tip: row.get("tip")?,
            is_completed: row.get::<_, i32>("is_completed")? != 0,
            cancelled_at: row.get("cancelled_at")?,
            cancelled_reason: row.get("cancelled_reason")?,
            rescheduled_at: row.get("rescheduled_at")?,
            rescheduled_reason: row.get("rescheduled_reason")?,
            will_someone_be_home: row.get::<_, Option<i32>>("will_someone_be_home")?.map(|v| v != 0),
            key_location: row.get("key_location")?,
            payment_reminder_sent_at: row.get("payment_reminder_sent_at")?,
            created_at: row.get("created_at")?,
        })
    }

    // ─── Static finders ──────────────────────────────────────────────────

    pub fn find_by_id(conn: &Connection, id: i64) -> CbResult<Option<Self>> {
        match conn.query_row("SELECT * FROM bookings WHERE id = ?1", [id], Self::from_row) {
            Ok(b) => Ok(Some(b)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    pub fn find_by_booking_id(conn: &Connection, booking_id: &str) -> CbResult<Option<Self>> {
        match conn.query_row(
            "SELECT * FROM bookings WHERE booking_id = ?1",
            [booking_id],
            Self::from_row,
        ) {
            Ok(b) => Ok(Some(b)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    /// Delete a booking. Its invoice, payments and add-on lines cascade.
    pub fn delete(conn: &Connection, id: i64) -> CbResult<bool> {
        let changed = conn
            .execute("DELETE FROM bookings WHERE id = ?1", [id])
            .map_err(|e| CbError::Database(e.to_string()))?;
        Ok(changed > 0)
    }

    // ─── Computed properties ─────────────────────────────────────────────

    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }

    /// Local start of the appointment.
    pub fn starts_at(&self) -> NaiveDateTime {
        self.cleaning_date.and_time(self.start_time)
    }

    /// Local end of the appointment. An end at or before the start time
    /// falls on the next day.
    pub fn ends_at(&self) -> NaiveDateTime {
        let end = self.cleaning_date.and_time(self.end_time);
        if self.end_time <= self.start_time {
            end + Duration::days(1)
        } else {
            end
        }
    }

    /// Whether the live booking overlaps the window `[start, end)`.
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        !self.is_cancelled() && self.starts_at() < end && start < self.ends_at()
    }

    pub fn customer_name(&self) -> String {
        match self.last_name.as_deref().filter(|l| !l.is_empty()) {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }

    /// Custom add-on lines attached to this booking.
    pub fn custom_addon_lines(&self, conn: &Connection) -> CbResult<Vec<BookingCustomAddon>> {
        match self.id {
            Some(id) => BookingCustomAddon::list_for_booking(conn, id),
            None => Ok(Vec::new()),
        }
    }

    // ─── Persistence ─────────────────────────────────────────────────────

    /// Insert or update this booking. Returns the local database ID.
    pub fn save(&mut self, conn: &Connection) -> CbResult<i64> {
        if self.booking_id.is_empty() {
            self.booking_id = generate_id(id_prefix::BOOKING);
        }
        let snapshot = self
            .pricing_snapshot
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            "INSERT INTO bookings (
                booking_id, business_id, customer_id, cleaner_id,
                first_name, last_name, email, phone_number,
                address1, address2, city, state_or_province, zip_code,
                bedrooms, bathrooms, square_feet,
                cleaning_date, start_time, end_time, service_type, recurring,
                other_requests, payment_method, total_price, tax,
                used_custom_pricing, pricing_snapshot, tip, is_completed,
                cancelled_at, cancelled_reason, rescheduled_at, rescheduled_reason,
                will_someone_be_home, key_location, payment_reminder_sent_at, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,
                      ?20,?21,?22,?23,?24,?25,?26,?27,?28,?29,?30,?31,?32,?33,?34,?35,?36,?37)
            ON CONFLICT(booking_id) DO UPDATE SET
                customer_id = excluded.customer_id,
                cleaner_id = excluded.cleaner_id,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                email = excluded.email,
                phone_number = excluded.phone_number,
                address1 = excluded.address1,
                address2 = excluded.address2,
                city = excluded.city,
                state_or_province = excluded.state_or_province,
                zip_code = excluded.zip_code,
                bedrooms = excluded.bedrooms,
                bathrooms = excluded.bathrooms,
                square_feet = excluded.square_feet,
                cleaning_date = excluded.cleaning_date,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                service_type = excluded.service_type,
                recurring = excluded.recurring,
                other_requests = excluded.other_requests,
                payment_method = excluded.payment_method,
                total_price = excluded.total_price,
                tax = excluded.tax,
                used_custom_pricing = excluded.used_custom_pricing,
                pricing_snapshot = excluded.pricing_snapshot,
                tip = excluded.tip,
                is_completed = excluded.is_completed,
                cancelled_at = excluded.cancelled_at,
                cancelled_reason = excluded.cancelled_reason,
                rescheduled_at = excluded.rescheduled_at,
                rescheduled_reason = excluded.rescheduled_reason,
                will_someone_be_home = excluded.will_someone_be_home,
                key_location = excluded.key_location,
                payment_reminder_sent_at = excluded.payment_reminder_sent_at",
            params![
                self.booking_id,
                self.business_id,
                self.customer_id,
                self.cleaner_id,
                self.first_name,
                self.last_name,
                self.email,
                self.phone_number,
                self.address1,
                self.address2,
                self.city,
                self.state_or_province,
                self.zip_code,
                self.bedrooms,
                self.bathrooms,
                self.square_feet,
                self.cleaning_date,
                self.start_time,
                self.end_time,
                self.service_type,
                self.recurring,
                self.other_requests,
                self.payment_method,
                self.total_price,
                self.tax,
                self.used_custom_pricing as i32,
                snapshot,
                self.tip,
                self.is_completed as i32,
                self.cancelled_at,
                self.cancelled_reason,
                self.rescheduled_at,
                self.rescheduled_reason,
                self.will_someone_be_home.map(|v| v as i32),
                self.key_location,
                self.payment_reminder_sent_at,
                self.created_at,
            ],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;

        let real_id: i64 = conn
            .query_row(
                "SELECT id FROM bookings WHERE booking_id = ?1",
                [&self.booking_id],
                |row| row.get(0),
            )
            .map_err(|e| CbError::Database(e.to_string()))?;
        self.id = Some(real_id);

        self.save_addons(conn, real_id)?;
        Ok(real_id)
    }

    fn save_addons(&self, conn: &Connection, id: i64) -> CbResult<()> {
        let assignments: Vec<String> = Addon::ALL
            .iter()
            .enumerate()
            .map(|(i, a)| format!("{} = ?{}", a.quantity_column(), i + 1))
            .collect();
        let sql = format!(
            "UPDATE bookings SET {} WHERE id = ?{}",
            assignments.join(", "),
            Addon::ALL.len() + 1
        );
        let mut values: Vec<Value> = self.addons.iter().map(|(_, q)| Value::Integer(q)).collect();
        values.push(Value::Integer(id));
        conn.execute(&sql, params_from_iter(values))
            .map_err(|e| CbError::Database(e.to_string()))?;
        Ok(())
    }

    /// Replace the custom add-on lines of this booking.
    pub fn set_custom_addon_lines(&self, conn: &Connection, lines: &[(i64, i64)]) -> CbResult<()> {
        let id = self
            .id
            .ok_or_else(|| CbError::Database("booking has no id for add-on lines".into()))?;
        conn.execute("DELETE FROM booking_custom_addons WHERE booking_id = ?1", [id])
            .map_err(|e| CbError::Database(e.to_string()))?;
        for (addon_id, qty) in lines.iter().filter(|(_, qty)| *qty > 0) {
            conn.execute(
                "INSERT INTO booking_custom_addons (booking_id, addon_id, qty) VALUES (?1,?2,?3)",
                params![id, addon_id, qty],
            )
            .map_err(|e| CbError::Database(e.to_string()))?;
        }
        Ok(())
    }
}

/// Quantity of one custom add-on on a booking, joined with its name and price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingCustomAddon {
    pub addon_id: i64,
    pub name: String,
    pub data_name: String,
    pub price: f64,
    pub qty: i64,
}

impl BookingCustomAddon {
    pub fn list_for_booking(conn: &Connection, booking_id: i64) -> CbResult<Vec<Self>> {
        let mut stmt = conn
            .prepare(
                "SELECT l.addon_id, a.name, a.data_name, a.price, l.qty
                 FROM booking_custom_addons l
                 JOIN custom_addons a ON a.id = l.addon_id
                 WHERE l.booking_id = ?1
                 ORDER BY l.id",
            )
            .map_err(|e| CbError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([booking_id], |row| {
                Ok(Self {
                    addon_id: row.get(0)?,
                    name: row.get(1)?,
                    data_name: row.get(2)?,
                    price: row.get(3)?,
                    qty: row.get(4)?,
                })
            })
            .map_err(|e| CbError::Database(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| CbError::Database(e.to_string()))
    }

    pub fn line_total(&self) -> f64 {
        self.price * self.qty as f64
    }
}
