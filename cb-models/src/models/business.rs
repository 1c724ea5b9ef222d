//! Business (tenant) entity and its one-to-one configuration records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use cb_core::constants::job_assignment;
use cb_core::error::{CbError, CbResult};
use cb_core::ids::{generate_business_id, slugify_addon_name};

use super::addon::{Addon, AddonTable};

/// A cleaning business. Every other record is owned by one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub id: Option<i64>,
    pub business_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// IANA timezone name, e.g. `America/New_York`.
    pub timezone: String,
    pub is_active: bool,
    pub cleaner_pay_percentage: i64,
    /// `high_rated` or `all_available`.
    pub job_assignment: String,
    /// Fall back to a voice call when an SMS fails.
    pub use_call: bool,
    /// Minutes to wait before following up with a new lead.
    pub time_to_wait: i64,
    pub created_at: DateTime<Utc>,
}

impl Business {
    /// A new, unsaved business with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            business_id: String::new(),
            name: name.into(),
            email: None,
            phone: None,
            address: None,
            timezone: "UTC".to_string(),
            is_active: true,
            cleaner_pay_percentage: 25,
            job_assignment: job_assignment::ALL_AVAILABLE.to_string(),
            use_call: false,
            time_to_wait: 0,
            created_at: Utc::now(),
        }
    }

    /// Construct a Business from a database row.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            business_id: row.get("business_id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            phone: row.get("phone")?,
            address: row.get("address")?,
            timezone: row.get("timezone")?,
            is_active: row.get::<_, i32>("is_active")? != 0,
            cleaner_pay_percentage: row.get("cleaner_pay_percentage")?,
            job_assignment: row.get("job_assignment")?,
            use_call: row.get::<_, i32>("use_call")? != 0,
            time_to_wait: row.get("time_to_wait")?,
            created_at: row.get("created_at")?,
        })
    }

    // ─── Static finders ──────────────────────────────────────────────────

    /// Find a business by its local database ID.
    pub fn find_by_id(conn: &Connection, id: i64) -> CbResult<Option<Self>> {
        match conn.query_row("SELECT * FROM businesses WHERE id = ?1", [id], Self::from_row) {
            Ok(b) => Ok(Some(b)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    /// Find a business by its public `BUS-nnnn` id.
    pub fn find_by_business_id(conn: &Connection, business_id: &str) -> CbResult<Option<Self>> {
        match conn.query_row(
            "SELECT * FROM businesses WHERE business_id = ?1",
            [business_id],
            Self::from_row,
        ) {
            Ok(b) => Ok(Some(b)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    /// Resolve a business from the secret key of its API credentials.
    pub fn find_by_secret_key(conn: &Connection, secret_key: &str) -> CbResult<Option<Self>> {
        match conn.query_row(
            "SELECT b.* FROM businesses b
             JOIN api_credentials c ON c.business_id = b.id
             WHERE c.secret_key = ?1",
            [secret_key],
            Self::from_row,
        ) {
            Ok(b) => Ok(Some(b)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    /// Delete a business and, through cascades, everything it owns.
    pub fn delete(conn: &Connection, id: i64) -> CbResult<bool> {
        let changed = conn
            .execute("DELETE FROM businesses WHERE id = ?1", [id])
            .map_err(|e| CbError::Database(e.to_string()))?;
        Ok(changed > 0)
    }

    // ─── Related records ─────────────────────────────────────────────────

    fn require_id(&self) -> CbResult<i64> {
        self.id
            .ok_or_else(|| CbError::Database("business has no id".into()))
    }

    /// The business price sheet.
    pub fn settings(&self, conn: &Connection) -> CbResult<BusinessSettings> {
        let id = self.require_id()?;
        BusinessSettings::find_by_business(conn, id)?
            .ok_or_else(|| CbError::not_found("business settings", &self.business_id))
    }

    /// Messaging credentials, if configured.
    pub fn credentials(&self, conn: &Connection) -> CbResult<Option<ApiCredential>> {
        ApiCredential::find_by_business(conn, self.require_id()?)
    }

    /// The custom agent prompt, empty if none was set.
    pub fn agent_prompt(&self, conn: &Connection) -> CbResult<String> {
        let id = self.require_id()?;
        Ok(AgentConfiguration::find_by_business(conn, id)?
            .map(|c| c.prompt)
            .unwrap_or_default())
    }

    /// Custom add-ons offered by this business.
    pub fn custom_addons(&self, conn: &Connection) -> CbResult<Vec<CustomAddon>> {
        CustomAddon::list_for_business(conn, self.require_id()?)
    }

    // ─── Computed properties ─────────────────────────────────────────────

    /// Whether jobs go to the highest-rated free cleaner first.
    pub fn prefers_high_rated(&self) -> bool {
        self.job_assignment == job_assignment::HIGH_RATED
    }

    // ─── Persistence ─────────────────────────────────────────────────────

    /// Insert or update this business. A new business gets a fresh public id,
    /// an empty price sheet and an empty agent configuration.
    pub fn save(&mut self, conn: &Connection) -> CbResult<i64> {
        if self.business_id.is_empty() {
            self.business_id = unused_business_id(conn)?;
        }

        conn.execute(
            "INSERT INTO businesses (
                business_id, name, email, phone, address, timezone, is_active,
                cleaner_pay_percentage, job_assignment, use_call, time_to_wait, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)
            ON CONFLICT(business_id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                phone = excluded.phone,
                address = excluded.address,
                timezone = excluded.timezone,
                is_active = excluded.is_active,
                cleaner_pay_percentage = excluded.cleaner_pay_percentage,
                job_assignment = excluded.job_assignment,
                use_call = excluded.use_call,
                time_to_wait = excluded.time_to_wait",
            params![
                self.business_id,
                self.name,
                self.email,
                self.phone,
                self.address,
                self.timezone,
                self.is_active as i32,
                self.cleaner_pay_percentage,
                self.job_assignment,
                self.use_call as i32,
                self.time_to_wait,
                self.created_at,
            ],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;

        let real_id: i64 = conn
            .query_row(
                "SELECT id FROM businesses WHERE business_id = ?1",
                [&self.business_id],
                |row| row.get(0),
            )
            .map_err(|e| CbError::Database(e.to_string()))?;
        self.id = Some(real_id);

        conn.execute(
            "INSERT OR IGNORE INTO business_settings (business_id) VALUES (?1)",
            [real_id],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;
        conn.execute(
            "INSERT OR IGNORE INTO agent_configurations (business_id) VALUES (?1)",
            [real_id],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;

        Ok(real_id)
    }
}

fn unused_business_id(conn: &Connection) -> CbResult<String> {
    loop {
        let candidate = generate_business_id();
        if Business::find_by_business_id(conn, &candidate)?.is_none() {
            return Ok(candidate);
        }
    }
}

// ─── Prices ─────────────────────────────────────────────────────────────────

/// A single priced field of a price sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    BedroomPrice,
    BathroomPrice,
    DepositFee,
    TaxPercent,
    BasePrice,
    SqftStandard,
    SqftDeep,
    SqftMoveInOut,
    SqftAirbnb,
    Addon(Addon),
}

impl PriceField {
    const SCALARS: [PriceField; 9] = [
        PriceField::BedroomPrice,
        PriceField::BathroomPrice,
        PriceField::DepositFee,
        PriceField::TaxPercent,
        PriceField::BasePrice,
        PriceField::SqftStandard,
        PriceField::SqftDeep,
        PriceField::SqftMoveInOut,
        PriceField::SqftAirbnb,
    ];

    /// Every field, scalars first then add-ons.
    pub fn all() -> impl Iterator<Item = PriceField> {
        Self::SCALARS
            .into_iter()
            .chain(Addon::ALL.into_iter().map(PriceField::Addon))
    }

    /// Column name in `business_settings` and `customer_pricing`.
    pub fn column(self) -> String {
        match self {
            PriceField::BedroomPrice => "bedroom_price".into(),
            PriceField::BathroomPrice => "bathroom_price".into(),
            PriceField::DepositFee => "deposit_fee".into(),
            PriceField::TaxPercent => "tax_percent".into(),
            PriceField::BasePrice => "base_price".into(),
            PriceField::SqftStandard => "sqft_multiplier_standard".into(),
            PriceField::SqftDeep => "sqft_multiplier_deep".into(),
            PriceField::SqftMoveInOut => "sqft_multiplier_moveinout".into(),
            PriceField::SqftAirbnb => "sqft_multiplier_airbnb".into(),
            PriceField::Addon(a) => a.price_column(),
        }
    }

    /// Parse a column name, or an add-on key/alias.
    pub fn parse(name: &str) -> Option<PriceField> {
        PriceField::all()
            .find(|f| f.column() == name)
            .or_else(|| Addon::parse(name).map(PriceField::Addon))
    }
}

/// The full set of prices used to quote a cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceSheet {
    pub bedroom_price: f64,
    pub bathroom_price: f64,
    pub deposit_fee: f64,
    pub tax_percent: f64,
    pub base_price: f64,
    pub sqft_multiplier_standard: f64,
    pub sqft_multiplier_deep: f64,
    pub sqft_multiplier_moveinout: f64,
    pub sqft_multiplier_airbnb: f64,
    pub addons: AddonTable<f64>,
}

impl PriceSheet {
    pub fn get(&self, field: PriceField) -> f64 {
        match field {
            PriceField::BedroomPrice => self.bedroom_price,
            PriceField::BathroomPrice => self.bathroom_price,
            PriceField::DepositFee => self.deposit_fee,
            PriceField::TaxPercent => self.tax_percent,
            PriceField::BasePrice => self.base_price,
            PriceField::SqftStandard => self.sqft_multiplier_standard,
            PriceField::SqftDeep => self.sqft_multiplier_deep,
            PriceField::SqftMoveInOut => self.sqft_multiplier_moveinout,
            PriceField::SqftAirbnb => self.sqft_multiplier_airbnb,
            PriceField::Addon(a) => self.addons.get(a),
        }
    }

    pub fn set(&mut self, field: PriceField, value: f64) {
        match field {
            PriceField::BedroomPrice => self.bedroom_price = value,
            PriceField::BathroomPrice => self.bathroom_price = value,
            PriceField::DepositFee => self.deposit_fee = value,
            PriceField::TaxPercent => self.tax_percent = value,
            PriceField::BasePrice => self.base_price = value,
            PriceField::SqftStandard => self.sqft_multiplier_standard = value,
            PriceField::SqftDeep => self.sqft_multiplier_deep = value,
            PriceField::SqftMoveInOut => self.sqft_multiplier_moveinout = value,
            PriceField::SqftAirbnb => self.sqft_multiplier_airbnb = value,
            PriceField::Addon(a) => self.addons.set(a, value),
        }
    }

    /// Apply customer overrides. Returns the merged sheet and whether any
    /// override was present.
    pub fn with_overrides(&self, overrides: &PriceOverrides) -> (PriceSheet, bool) {
        let mut merged = *self;
        let mut applied = false;
        for field in PriceField::all() {
            if let Some(v) = overrides.get(field) {
                merged.set(field, v);
                applied = true;
            }
        }
        (merged, applied)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mut sheet = PriceSheet::default();
        for field in PriceField::all() {
            sheet.set(field, row.get(field.column().as_str())?);
        }
        Ok(sheet)
    }
}

/// Optional per-customer replacements for price sheet fields.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceOverrides {
    scalars: [Option<f64>; 9],
    addons: AddonTable<Option<f64>>,
}

impl PriceOverrides {
    pub fn get(&self, field: PriceField) -> Option<f64> {
        match field {
            PriceField::Addon(a) => self.addons.get(a),
            scalar => scalar_index(scalar).and_then(|i| self.scalars[i]),
        }
    }

    pub fn set(&mut self, field: PriceField, value: Option<f64>) {
        match field {
            PriceField::Addon(a) => self.addons.set(a, value),
            scalar => {
                if let Some(i) = scalar_index(scalar) {
                    self.scalars[i] = value;
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        PriceField::all().all(|f| self.get(f).is_none())
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mut overrides = PriceOverrides::default();
        for field in PriceField::all() {
            overrides.set(field, row.get(field.column().as_str())?);
        }
        Ok(overrides)
    }
}

fn scalar_index(field: PriceField) -> Option<usize> {
    PriceField::SCALARS.iter().position(|f| *f == field)
}

/// Build `INSERT ... ON CONFLICT(owner) DO UPDATE` for a price table.
fn price_upsert_sql(table: &str, owner_column: &str) -> String {
    let columns: Vec<String> = PriceField::all().map(|f| f.column()).collect();
    let placeholders: Vec<String> = (2..=columns.len() + 1).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = columns.iter().map(|c| format!("{c} = excluded.{c}")).collect();
    format!(
        "INSERT INTO {table} ({owner_column}, {}) VALUES (?1, {})
         ON CONFLICT({owner_column}) DO UPDATE SET {}",
        columns.join(", "),
        placeholders.join(", "),
        updates.join(", "),
    )
}

/// Price sheet row of one business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessSettings {
    pub id: Option<i64>,
    pub business_id: i64,
    pub prices: PriceSheet,
}

impl BusinessSettings {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            business_id: row.get("business_id")?,
            prices: PriceSheet::from_row(row)?,
        })
    }

    pub fn find_by_business(conn: &Connection, business_id: i64) -> CbResult<Option<Self>> {
        match conn.query_row(
            "SELECT * FROM business_settings WHERE business_id = ?1",
            [business_id],
            Self::from_row,
        ) {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    pub fn save(&mut self, conn: &Connection) -> CbResult<i64> {
        let mut values = vec![Value::Integer(self.business_id)];
        values.extend(PriceField::all().map(|f| Value::Real(self.prices.get(f))));
        conn.execute(
            &price_upsert_sql("business_settings", "business_id"),
            params_from_iter(values),
        )
        .map_err(|e| CbError::Database(e.to_string()))?;

        let real_id: i64 = conn
            .query_row(
                "SELECT id FROM business_settings WHERE business_id = ?1",
                [self.business_id],
                |row| row.get(0),
            )
            .map_err(|e| CbError::Database(e.to_string()))?;
        self.id = Some(real_id);
        Ok(real_id)
    }
}

/// Customer-specific price overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerPricing {
    pub id: Option<i64>,
    pub customer_id: i64,
    pub overrides: PriceOverrides,
}

impl CustomerPricing {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            customer_id: row.get("customer_id")?,
            overrides: PriceOverrides::from_row(row)?,
        })
    }

    pub fn find_by_customer(conn: &Connection, customer_id: i64) -> CbResult<Option<Self>> {
        match conn.query_row(
            "SELECT * FROM customer_pricing WHERE customer_id = ?1",
            [customer_id],
            Self::from_row,
        ) {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    pub fn save(&mut self, conn: &Connection) -> CbResult<i64> {
        let mut values = vec![Value::Integer(self.customer_id)];
        values.extend(
            PriceField::all().map(|f| self.overrides.get(f).map(Value::Real).unwrap_or(Value::Null)),
        );
        conn.execute(
            &price_upsert_sql("customer_pricing", "customer_id"),
            params_from_iter(values),
        )
        .map_err(|e| CbError::Database(e.to_string()))?;

        let real_id: i64 = conn
            .query_row(
                "SELECT id FROM customer_pricing WHERE customer_id = ?1",
                [self.customer_id],
                |row| row.get(0),
            )
            .map_err(|e| CbError::Database(e.to_string()))?;
        self.id = Some(real_id);
        Ok(real_id)
    }
}

// ─── Credentials and agent ──────────────────────────────────────────────────

/// SMS / voice credentials of one business.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiCredential {
    pub id: Option<i64>,
    pub business_id: i64,
    pub twilio_account_sid: Option<String>,
    #[serde(skip_serializing)]
    pub twilio_auth_token: Option<String>,
    pub twilio_sms_number: Option<String>,
    pub voice_agent_number: Option<String>,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
}

impl ApiCredential {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            business_id: row.get("business_id")?,
            twilio_account_sid: row.get("twilio_account_sid")?,
            twilio_auth_token: row.get("twilio_auth_token")?,
            twilio_sms_number: row.get("twilio_sms_number")?,
            voice_agent_number: row.get("voice_agent_number")?,
            secret_key: row.get("secret_key")?,
        })
    }

    pub fn find_by_business(conn: &Connection, business_id: i64) -> CbResult<Option<Self>> {
        match conn.query_row(
            "SELECT * FROM api_credentials WHERE business_id = ?1",
            [business_id],
            Self::from_row,
        ) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    /// Whether SMS can be sent with these credentials.
    pub fn can_send_sms(&self) -> bool {
        [&self.twilio_account_sid, &self.twilio_auth_token, &self.twilio_sms_number]
            .iter()
            .all(|v| v.as_deref().map(|s| !s.is_empty()).unwrap_or(false))
    }

    pub fn save(&mut self, conn: &Connection) -> CbResult<i64> {
        conn.execute(
            "INSERT INTO api_credentials (
                business_id, twilio_account_sid, twilio_auth_token,
                twilio_sms_number, voice_agent_number, secret_key
            ) VALUES (?1,?2,?3,?4,?5,?6)
            ON CONFLICT(business_id) DO UPDATE SET
                twilio_account_sid = COALESCE(excluded.twilio_account_sid, twilio_account_sid),
                twilio_auth_token = COALESCE(excluded.twilio_auth_token, twilio_auth_token),
                twilio_sms_number = COALESCE(excluded.twilio_sms_number, twilio_sms_number),
                voice_agent_number = COALESCE(excluded.voice_agent_number, voice_agent_number),
                secret_key = COALESCE(excluded.secret_key, secret_key)",
            params![
                self.business_id,
                self.twilio_account_sid,
                self.twilio_auth_token,
                self.twilio_sms_number,
                self.voice_agent_number,
                self.secret_key,
            ],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;

        let real_id: i64 = conn
            .query_row(
                "SELECT id FROM api_credentials WHERE business_id = ?1",
                [self.business_id],
                |row| row.get(0),
            )
            .map_err(|e| CbError::Database(e.to_string()))?;
        self.id = Some(real_id);
        Ok(real_id)
    }
}

/// Free-form instructions appended to the agent system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfiguration {
    pub id: Option<i64>,
    pub business_id: i64,
    pub prompt: String,
}

impl AgentConfiguration {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            business_id: row.get("business_id")?,
            prompt: row.get("prompt")?,
        })
    }

    pub fn find_by_business(conn: &Connection, business_id: i64) -> CbResult<Option<Self>> {
        match conn.query_row(
            "SELECT * FROM agent_configurations WHERE business_id = ?1",
            [business_id],
            Self::from_row,
        ) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    pub fn save(&mut self, conn: &Connection) -> CbResult<i64> {
        conn.execute(
            "INSERT INTO agent_configurations (business_id, prompt) VALUES (?1, ?2)
             ON CONFLICT(business_id) DO UPDATE SET prompt = excluded.prompt",
            params![self.business_id, self.prompt],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;

        let real_id: i64 = conn
            .query_row(
                "SELECT id FROM agent_configurations WHERE business_id = ?1",
                [self.business_id],
                |row| row.get(0),
            )
            .map_err(|e| CbError::Database(e.to_string()))?;
        self.id = Some(real_id);
        Ok(real_id)
    }
}

// ─── Custom add-ons ─────────────────────────────────────────────────────────

/// A business-defined add-on beyond the standard twelve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomAddon {
    pub id: Option<i64>,
    pub business_id: i64,
    pub name: String,
    /// Summary key for quantities, derived from `name`.
    pub data_name: String,
    pub price: f64,
}

impl CustomAddon {
    pub fn new(business_id: i64, name: impl Into<String>, price: f64) -> Self {
        let name = name.into();
        Self {
            id: None,
            business_id,
            data_name: slugify_addon_name(&name),
            name,
            price,
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            business_id: row.get("business_id")?,
            name: row.get("name")?,
            data_name: row.get("data_name")?,
            price: row.get("price")?,
        })
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> CbResult<Option<Self>> {
        match conn.query_row("SELECT * FROM custom_addons WHERE id = ?1", [id], Self::from_row) {
            Ok(a) => Ok(Some(a)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    pub fn list_for_business(conn: &Connection, business_id: i64) -> CbResult<Vec<Self>> {
        let mut stmt = conn
            .prepare("SELECT * FROM custom_addons WHERE business_id = ?1 ORDER BY id")
            .map_err(|e| CbError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([business_id], Self::from_row)
            .map_err(|e| CbError::Database(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| CbError::Database(e.to_string()))
    }

    pub fn delete(conn: &Connection, id: i64) -> CbResult<bool> {
        let changed = conn
            .execute("DELETE FROM custom_addons WHERE id = ?1", [id])
            .map_err(|e| CbError::Database(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Insert or update by `(business, data_name)`.
    pub fn save(&mut self, conn: &Connection) -> CbResult<i64> {
        if self.data_name.is_empty() {
            self.data_name = slugify_addon_name(&self.name);
        }
        if self.data_name.is_empty() {
            return Err(CbError::Validation(format!(
                "add-on name '{}' has no letters or digits",
                self.name
            )));
        }

        conn.execute(
            "INSERT INTO custom_addons (business_id, name, data_name, price) VALUES (?1,?2,?3,?4)
             ON CONFLICT(business_id, data_name) DO UPDATE SET
                name = excluded.name, price = excluded.price",
            params![self.business_id, self.name, self.data_name, self.price],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;

        let real_id: i64 = conn
            .query_row(
                "SELECT id FROM custom_addons WHERE business_id = ?1 AND data_name = ?2",
                params![self.business_id, self.data_name],
                |row| row.get(0),
            )
            .map_err(|e| CbError::Database(e.to_string()))?;
        self.id = Some(real_id);
        Ok(real_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        schema::create_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn test_save_assigns_business_id_and_children() {
        let conn = conn();
        let mut business = Business::new("Sparkle Clean");
        let id = business.save(&conn).unwrap();
        assert!(business.business_id.starts_with("BUS-"));

        let settings = business.settings(&conn).unwrap();
        assert_eq!(settings.business_id, id);
        assert_eq!(settings.prices, PriceSheet::default());
        assert_eq!(business.agent_prompt(&conn).unwrap(), "");
    }

    #[test]
    fn test_save_is_stable_on_update() {
        let conn = conn();
        let mut business = Business::new("Sparkle");
        let id = business.save(&conn).unwrap();
        let public = business.business_id.clone();

        business.timezone = "America/Chicago".into();
        assert_eq!(business.save(&conn).unwrap(), id);
        assert_eq!(business.business_id, public);

        let loaded = Business::find_by_business_id(&conn, &public).unwrap().unwrap();
        assert_eq!(loaded.timezone, "America/Chicago");
    }

    #[test]
    fn test_settings_round_trip() {
        let conn = conn();
        let mut business = Business::new("Prices");
        business.save(&conn).unwrap();

        let mut settings = business.settings(&conn).unwrap();
        settings.prices.bedroom_price = 20.0;
        settings.prices.set(PriceField::Addon(Addon::Oven), 35.5);
        settings.save(&conn).unwrap();

        let loaded = business.settings(&conn).unwrap();
        assert_eq!(loaded.prices.bedroom_price, 20.0);
        assert_eq!(loaded.prices.addons.get(Addon::Oven), 35.5);
    }

    #[test]
    fn test_overrides_merge() {
        let mut sheet = PriceSheet::default();
        sheet.bedroom_price = 20.0;
        sheet.bathroom_price = 15.0;

        let mut overrides = PriceOverrides::default();
        assert!(overrides.is_empty());
        assert_eq!(sheet.with_overrides(&overrides), (sheet, false));

        overrides.set(PriceField::BedroomPrice, Some(12.0));
        let (merged, applied) = sheet.with_overrides(&overrides);
        assert!(applied);
        assert_eq!(merged.bedroom_price, 12.0);
        assert_eq!(merged.bathroom_price, 15.0);
    }

    #[test]
    fn test_price_field_parse() {
        assert_eq!(PriceField::parse("tax_percent"), Some(PriceField::TaxPercent));
        assert_eq!(PriceField::parse("oven"), Some(PriceField::Addon(Addon::Oven)));
        assert_eq!(PriceField::parse("addon_price_window"), Some(PriceField::Addon(Addon::Windows)));
        assert_eq!(PriceField::parse("nope"), None);
    }

    #[test]
    fn test_custom_addon_upsert_by_data_name() {
        let conn = conn();
        let mut business = Business::new("Addons");
        let bid = business.save(&conn).unwrap();

        let mut addon = CustomAddon::new(bid, "Inside Microwave", 10.0);
        let first = addon.save(&conn).unwrap();
        assert_eq!(addon.data_name, "inside_microwave");

        let mut again = CustomAddon::new(bid, "inside microwave", 12.0);
        assert_eq!(again.save(&conn).unwrap(), first);
        let all = business.custom_addons(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].price, 12.0);
    }

    #[test]
    fn test_find_by_secret_key() {
        let conn = conn();
        let mut business = Business::new("Secret");
        let bid = business.save(&conn).unwrap();
        let mut creds = ApiCredential {
            business_id: bid,
            secret_key: Some("s3cret".into()),
            ..Default::default()
        };
        creds.save(&conn).unwrap();
        assert!(!creds.can_send_sms());

        let found = Business::find_by_secret_key(&conn, "s3cret").unwrap().unwrap();
        assert_eq!(found.id, Some(bid));
        assert!(Business::find_by_secret_key(&conn, "other").unwrap().is_none());
    }

    #[test]
    fn test_delete_cascades() {
        let conn = conn();
        let mut business = Business::new("Gone");
        let bid = business.save(&conn).unwrap();
        assert!(Business::delete(&conn, bid).unwrap());
        assert!(BusinessSettings::find_by_business(&conn, bid).unwrap().is_none());
    }
}
