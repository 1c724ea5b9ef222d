//! Database schema definitions and table creation.
//!
//! Every business-owned table references `businesses(id)` with
//! `ON DELETE CASCADE`, so deleting a business removes all of its data.
//! Dates are stored as `YYYY-MM-DD`, wall-clock times as `HH:MM:SS`, and
//! instants as UTC timestamps with offset.

use rusqlite::Connection;
use cb_core::error::{CbError, CbResult};
use tracing::info;

/// Create all database tables and indexes if they do not exist.
pub fn create_tables(conn: &Connection) -> CbResult<()> {
    conn.execute_batch(SCHEMA_SQL)
        .map_err(|e| CbError::Database(format!("failed to create schema: {e}")))?;
    info!("database schema verified");
    Ok(())
}

/// Drop all tables (used for database reset).
pub fn drop_tables(conn: &Connection) -> CbResult<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys=OFF;
         DROP TABLE IF EXISTS notification_tracker;
         DROP TABLE IF EXISTS chat_messages;
         DROP TABLE IF EXISTS chats;
         DROP TABLE IF EXISTS coupon_usages;
         DROP TABLE IF EXISTS coupons;
         DROP TABLE IF EXISTS payments;
         DROP TABLE IF EXISTS invoices;
         DROP TABLE IF EXISTS booking_custom_addons;
         DROP TABLE IF EXISTS bookings;
         DROP TABLE IF EXISTS cleaner_availability;
         DROP TABLE IF EXISTS cleaners;
         DROP TABLE IF EXISTS leads;
         DROP TABLE IF EXISTS customer_pricing;
         DROP TABLE IF EXISTS customers;
         DROP TABLE IF EXISTS agent_configurations;
         DROP TABLE IF EXISTS custom_addons;
         DROP TABLE IF EXISTS api_credentials;
         DROP TABLE IF EXISTS business_settings;
         DROP TABLE IF EXISTS businesses;
         DROP TABLE IF EXISTS schema_version;
         PRAGMA foreign_keys=ON;",
    )
    .map_err(|e| CbError::Database(format!("failed to drop tables: {e}")))?;
    Ok(())
}

/// Tables reported by `Database::stats`, in display order.
pub const COUNTED_TABLES: &[&str] = &[
    "businesses",
    "customers",
    "leads",
    "cleaners",
    "bookings",
    "invoices",
    "payments",
    "coupons",
    "chats",
    "chat_messages",
];

/// Complete SQL schema for all tables.
const SCHEMA_SQL: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Tenants
CREATE TABLE IF NOT EXISTS businesses (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    business_id             TEXT NOT NULL UNIQUE,
    name                    TEXT NOT NULL,
    email                   TEXT,
    phone                   TEXT,
    address                 TEXT,
    timezone                TEXT NOT NULL DEFAULT 'UTC',
    is_active               INTEGER NOT NULL DEFAULT 1,
    cleaner_pay_percentage  INTEGER NOT NULL DEFAULT 25,
    job_assignment          TEXT NOT NULL DEFAULT 'all_available',
    use_call                INTEGER NOT NULL DEFAULT 0,
    time_to_wait            INTEGER NOT NULL DEFAULT 0,
    created_at              TEXT NOT NULL
);

-- Price sheet, one row per business
CREATE TABLE IF NOT EXISTS business_settings (
    id                          INTEGER PRIMARY KEY AUTOINCREMENT,
    business_id                 INTEGER NOT NULL UNIQUE REFERENCES businesses(id) ON DELETE CASCADE,
    bedroom_price               REAL NOT NULL DEFAULT 0,
    bathroom_price              REAL NOT NULL DEFAULT 0,
    deposit_fee                 REAL NOT NULL DEFAULT 0,
    tax_percent                 REAL NOT NULL DEFAULT 0,
    base_price                  REAL NOT NULL DEFAULT 0,
    sqft_multiplier_standard    REAL NOT NULL DEFAULT 0,
    sqft_multiplier_deep        REAL NOT NULL DEFAULT 0,
    sqft_multiplier_moveinout   REAL NOT NULL DEFAULT 0,
    sqft_multiplier_airbnb      REAL NOT NULL DEFAULT 0,
    addon_price_dishes          REAL NOT NULL DEFAULT 0,
    addon_price_laundry         REAL NOT NULL DEFAULT 0,
    addon_price_window          REAL NOT NULL DEFAULT 0,
    addon_price_pets            REAL NOT NULL DEFAULT 0,
    addon_price_fridge          REAL NOT NULL DEFAULT 0,
    addon_price_oven            REAL NOT NULL DEFAULT 0,
    addon_price_baseboard       REAL NOT NULL DEFAULT 0,
    addon_price_blinds          REAL NOT NULL DEFAULT 0,
    addon_price_green           REAL NOT NULL DEFAULT 0,
    addon_price_cabinets        REAL NOT NULL DEFAULT 0,
    addon_price_patio           REAL NOT NULL DEFAULT 0,
    addon_price_garage          REAL NOT NULL DEFAULT 0
);

-- Messaging credentials, one row per business
CREATE TABLE IF NOT EXISTS api_credentials (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    business_id             INTEGER NOT NULL UNIQUE REFERENCES businesses(id) ON DELETE CASCADE,
    twilio_account_sid      TEXT,
    twilio_auth_token       TEXT,
    twilio_sms_number       TEXT,
    voice_agent_number      TEXT,
    secret_key              TEXT UNIQUE
);

CREATE TABLE IF NOT EXISTS custom_addons (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    business_id             INTEGER NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
    name                    TEXT NOT NULL,
    data_name               TEXT NOT NULL,
    price                   REAL NOT NULL DEFAULT 0,
    UNIQUE(business_id, data_name)
);

CREATE TABLE IF NOT EXISTS agent_configurations (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    business_id             INTEGER NOT NULL UNIQUE REFERENCES businesses(id) ON DELETE CASCADE,
    prompt                  TEXT NOT NULL DEFAULT ''
);

-- Customers and their negotiated prices
CREATE TABLE IF NOT EXISTS customers (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id             TEXT NOT NULL UNIQUE,
    business_id             INTEGER NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
    first_name              TEXT NOT NULL,
    last_name               TEXT,
    email                   TEXT,
    phone                   TEXT,
    address1                TEXT,
    city                    TEXT,
    state                   TEXT,
    zip_code                TEXT,
    created_at              TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_customers_business_phone ON customers(business_id, phone);
CREATE INDEX IF NOT EXISTS idx_customers_business_email ON customers(business_id, email);

CREATE TABLE IF NOT EXISTS customer_pricing (
    id                          INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id                 INTEGER NOT NULL UNIQUE REFERENCES customers(id) ON DELETE CASCADE,
    bedroom_price               REAL,
    bathroom_price              REAL,
    deposit_fee                 REAL,
    tax_percent                 REAL,
    base_price                  REAL,
    sqft_multiplier_standard    REAL,
    sqft_multiplier_deep        REAL,
    sqft_multiplier_moveinout   REAL,
    sqft_multiplier_airbnb      REAL,
    addon_price_dishes          REAL,
    addon_price_laundry         REAL,
    addon_price_window          REAL,
    addon_price_pets            REAL,
    addon_price_fridge          REAL,
    addon_price_oven            REAL,
    addon_price_baseboard       REAL,
    addon_price_blinds          REAL,
    addon_price_green           REAL,
    addon_price_cabinets        REAL,
    addon_price_patio           REAL,
    addon_price_garage          REAL
);

-- Leads
CREATE TABLE IF NOT EXISTS leads (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    lead_id                 TEXT NOT NULL UNIQUE,
    business_id             INTEGER NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
    name                    TEXT NOT NULL,
    email                   TEXT,
    phone_number            TEXT,
    notes                   TEXT,
    content                 TEXT,
    source                  TEXT,
    email_sent_at           TEXT,
    is_converted            INTEGER NOT NULL DEFAULT 0,
    created_at              TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_leads_business ON leads(business_id, created_at);

-- Cleaners and their weekly hours
CREATE TABLE IF NOT EXISTS cleaners (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    cleaner_id              TEXT NOT NULL UNIQUE,
    business_id             INTEGER NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
    name                    TEXT NOT NULL,
    phone                   TEXT,
    email                   TEXT,
    rating                  INTEGER NOT NULL DEFAULT 0,
    is_active               INTEGER NOT NULL DEFAULT 1,
    created_at              TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cleaners_business ON cleaners(business_id, is_active);

CREATE TABLE IF NOT EXISTS cleaner_availability (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    cleaner_id              INTEGER NOT NULL REFERENCES cleaners(id) ON DELETE CASCADE,
    day_of_week             TEXT NOT NULL,
    start_time              TEXT NOT NULL,
    end_time                TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_availability_cleaner ON cleaner_availability(cleaner_id, day_of_week);

-- Bookings
CREATE TABLE IF NOT EXISTS bookings (
    id                          INTEGER PRIMARY KEY AUTOINCREMENT,
    booking_id                  TEXT NOT NULL UNIQUE,
    business_id                 INTEGER NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
    customer_id                 INTEGER REFERENCES customers(id) ON DELETE SET NULL,
    cleaner_id                  INTEGER REFERENCES cleaners(id) ON DELETE SET NULL,
    first_name                  TEXT NOT NULL,
    last_name                   TEXT,
    email                       TEXT,
    phone_number                TEXT,
    address1                    TEXT,
    address2                    TEXT,
    city                        TEXT,
    state_or_province           TEXT,
    zip_code                    TEXT,
    bedrooms                    INTEGER NOT NULL DEFAULT 0,
    bathrooms                   INTEGER NOT NULL DEFAULT 0,
    square_feet                 INTEGER NOT NULL DEFAULT 0,
    cleaning_date               TEXT NOT NULL,
    start_time                  TEXT NOT NULL,
    end_time                    TEXT NOT NULL,
    service_type                TEXT NOT NULL DEFAULT 'standard',
    recurring                   TEXT NOT NULL DEFAULT 'one-time',
    addon_dishes                INTEGER NOT NULL DEFAULT 0,
    addon_laundry               INTEGER NOT NULL DEFAULT 0,
    addon_window                INTEGER NOT NULL DEFAULT 0,
    addon_pets                  INTEGER NOT NULL DEFAULT 0,
    addon_fridge                INTEGER NOT NULL DEFAULT 0,
    addon_oven                  INTEGER NOT NULL DEFAULT 0,
    addon_baseboard             INTEGER NOT NULL DEFAULT 0,
    addon_blinds                INTEGER NOT NULL DEFAULT 0,
    addon_green                 INTEGER NOT NULL DEFAULT 0,
    addon_cabinets              INTEGER NOT NULL DEFAULT 0,
    addon_patio                 INTEGER NOT NULL DEFAULT 0,
    addon_garage                INTEGER NOT NULL DEFAULT 0,
    other_requests              TEXT,
    payment_method              TEXT,
    total_price                 REAL NOT NULL DEFAULT 0,
    tax                         REAL NOT NULL DEFAULT 0,
    used_custom_pricing         INTEGER NOT NULL DEFAULT 0,
    pricing_snapshot            TEXT,
    tip                         REAL NOT NULL DEFAULT 0,
    is_completed                INTEGER NOT NULL DEFAULT 0,
    cancelled_at                TEXT,
    cancelled_reason            TEXT,
    rescheduled_at              TEXT,
    rescheduled_reason          TEXT,
    will_someone_be_home        INTEGER,
    key_location                TEXT,
    payment_reminder_sent_at    TEXT,
    created_at                  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bookings_business_date ON bookings(business_id, cleaning_date);
CREATE INDEX IF NOT EXISTS idx_bookings_cleaner_date ON bookings(cleaner_id, cleaning_date);

CREATE TABLE IF NOT EXISTS booking_custom_addons (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    booking_id              INTEGER NOT NULL REFERENCES bookings(id) ON DELETE CASCADE,
    addon_id                INTEGER NOT NULL REFERENCES custom_addons(id) ON DELETE CASCADE,
    qty                     INTEGER NOT NULL DEFAULT 0,
    UNIQUE(booking_id, addon_id)
);

-- Billing
CREATE TABLE IF NOT EXISTS invoices (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    invoice_id              TEXT NOT NULL UNIQUE,
    booking_id              INTEGER NOT NULL UNIQUE REFERENCES bookings(id) ON DELETE CASCADE,
    amount                  REAL NOT NULL DEFAULT 0,
    is_paid                 INTEGER NOT NULL DEFAULT 0,
    created_at              TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS payments (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    payment_id              TEXT NOT NULL UNIQUE,
    invoice_id              INTEGER NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
    amount                  REAL NOT NULL DEFAULT 0,
    method                  TEXT,
    status                  TEXT NOT NULL DEFAULT 'PENDING',
    external_id             TEXT,
    paid_at                 TEXT,
    created_at              TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_payments_invoice ON payments(invoice_id);

CREATE TABLE IF NOT EXISTS coupons (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    business_id             INTEGER NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
    code                    TEXT NOT NULL,
    discount_type           TEXT NOT NULL DEFAULT 'percentage',
    discount_value          REAL NOT NULL DEFAULT 0,
    limit_type              TEXT NOT NULL DEFAULT 'overall',
    usage_limit             INTEGER,
    times_used              INTEGER NOT NULL DEFAULT 0,
    expiry_date             TEXT,
    is_active               INTEGER NOT NULL DEFAULT 1,
    UNIQUE(business_id, code)
);

CREATE TABLE IF NOT EXISTS coupon_usages (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    coupon_id               INTEGER NOT NULL REFERENCES coupons(id) ON DELETE CASCADE,
    customer_email          TEXT NOT NULL,
    used_at                 TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_coupon_usages_email ON coupon_usages(coupon_id, customer_email);

-- Conversations with the booking agent
CREATE TABLE IF NOT EXISTS chats (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id                 TEXT NOT NULL UNIQUE,
    business_id             INTEGER NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
    client_key              TEXT NOT NULL,
    summary                 TEXT NOT NULL DEFAULT '{}',
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL,
    UNIQUE(business_id, client_key)
);

CREATE TABLE IF NOT EXISTS chat_messages (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id                 INTEGER NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
    role                    TEXT NOT NULL,
    message                 TEXT NOT NULL,
    is_first_message        INTEGER NOT NULL DEFAULT 0,
    created_at              TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chat_messages_chat ON chat_messages(chat_id, id);

-- Insert-once guard for outbound notifications
CREATE TABLE IF NOT EXISTS notification_tracker (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    business_id             INTEGER NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
    kind                    TEXT NOT NULL,
    target_key              TEXT NOT NULL,
    sent_at                 TEXT NOT NULL,
    UNIQUE(business_id, kind, target_key)
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();

        for table in COUNTED_TABLES {
            let sql = format!("SELECT COUNT(*) FROM {table}");
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0)).unwrap();
            assert_eq!(count, 0, "{table} should start empty");
        }
    }

    #[test]
    fn test_drop_and_recreate() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        drop_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM notification_tracker", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
