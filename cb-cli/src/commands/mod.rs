//! CLI command implementations.

pub mod availability;
pub mod booking;
pub mod business;
pub mod chat;
pub mod cleaner;
pub mod coupon;
pub mod db;
pub mod invoice;
pub mod lead;
pub mod quote;
pub mod status;
pub mod sweep;

use std::time::Duration;

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::sync::broadcast;

use cb_core::config::ConfigHandle;
use cb_core::error::{CbError, CbResult};
use cb_models::{Business, Database};
use cb_services::{AppEvent, AutomationListener, ServiceRegistry};

/// Helper to initialize the database from config.
pub async fn init_database(config: &ConfigHandle) -> CbResult<Database> {
    let cfg = config.read().await;
    let db_path = cfg.effective_db_path()?;
    Database::init(&db_path, &cfg.database)
}

/// Look up a business by its public id.
pub fn find_business(conn: &rusqlite::Connection, business_id: &str) -> CbResult<Business> {
    Business::find_by_business_id(conn, business_id)?
        .ok_or_else(|| CbError::not_found("business", business_id))
}

/// Build and initialize every service.
pub async fn open_services(config: &ConfigHandle) -> CbResult<ServiceRegistry> {
    let mut registry = ServiceRegistry::from_config(config.clone()).await?;
    registry.register_all();
    registry.init_all().await?;
    Ok(registry)
}

/// Run the automation side effects (texts, webhook) for the events a
/// command produced, then give spawned webhook posts a moment to finish.
pub async fn settle(registry: &ServiceRegistry, rx: &mut broadcast::Receiver<AppEvent>) {
    let listener = AutomationListener::new(registry.ctx.clone());
    if listener.drain(rx).await > 0 && registry.ctx.webhook.is_some() {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// A table with the standard look.
pub fn new_table<T: Into<comfy_table::Cell>>(header: Vec<T>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn print_json<T: Serialize>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

/// A steady spinner for slow calls.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Human-readable byte size.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

pub fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "-".to_string())
}

/// Truncate a string to a maximum length, appending an ellipsis if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    } else {
        s.chars().take(max_len).collect()
    }
}
