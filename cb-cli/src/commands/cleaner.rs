//! Cleaner commands.

use chrono::NaiveTime;
use clap::Subcommand;
use console::style;
use serde_json::json;

use cb_core::config::ConfigHandle;
use cb_core::error::{CbError, CbResult};
use cb_models::models::cleaner::{parse_weekday, weekday_name};
use cb_models::{queries, Cleaner, CleanerAvailability};
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum CleanerAction {
    /// Add a cleaner to a business.
    Add {
        /// Business id (BUS-nnnn).
        business: String,
        name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Rating used by high-rated job assignment.
        #[arg(long, default_value = "0")]
        rating: i64,
    },
    /// List cleaners with their weekly hours.
    List {
        business: String,
        /// Include deactivated cleaners.
        #[arg(long)]
        all: bool,
    },
    /// Add a weekly working window, e.g. `CLab12C monday 09:00 17:00`.
    AvailabilityAdd {
        /// Cleaner id (CL...).
        cleaner: String,
        day: String,
        start: String,
        end: String,
    },
    /// Stop assigning jobs to a cleaner.
    Deactivate {
        cleaner: String,
    },
}

fn parse_hm(text: &str) -> CbResult<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(text.trim(), "%H:%M:%S"))
        .map_err(|_| CbError::Validation(format!("Invalid time '{text}', expected HH:MM")))
}

pub(super) fn find_cleaner(conn: &rusqlite::Connection, cleaner_id: &str) -> CbResult<Cleaner> {
    Cleaner::find_by_cleaner_id(conn, cleaner_id)?.ok_or_else(|| CbError::not_found("cleaner", cleaner_id))
}

pub async fn run(config: ConfigHandle, action: CleanerAction, format: OutputFormat) -> CbResult<()> {
    let db = super::init_database(&config).await?;
    let conn = db.conn()?;

    match action {
        CleanerAction::Add { business, name, phone, email, rating } => {
            let business = super::find_business(&conn, &business)?;
            if name.trim().is_empty() {
                return Err(CbError::Validation("Cleaner name is required".into()));
            }
            let mut cleaner = Cleaner::new(business.id.unwrap_or_default(), name.trim());
            cleaner.phone = phone;
            cleaner.email = email;
            cleaner.rating = rating;
            cleaner.save(&conn)?;
            match format {
                OutputFormat::Json => super::print_json(&cleaner),
                OutputFormat::Text => println!(
                    "  {} Added {} ({}). Add working hours with `cleanbiz cleaner availability-add`.",
                    style("OK").green().bold(),
                    cleaner.name,
                    style(&cleaner.cleaner_id).cyan()
                ),
            }
        }
        CleanerAction::List { business, all } => {
            let business = super::find_business(&conn, &business)?;
            let cleaners = queries::list_cleaners(&conn, business.id.unwrap_or_default(), !all)?;
            let mut rows = Vec::with_capacity(cleaners.len());
            for cleaner in cleaners {
                let hours = cleaner.availability(&conn)?;
                rows.push((cleaner, hours));
            }

            match format {
                OutputFormat::Json => {
                    let out: Vec<_> = rows
                        .iter()
                        .map(|(c, hours)| json!({"cleaner": c, "availability": hours}))
                        .collect();
                    super::print_json(&out);
                }
                OutputFormat::Text => {
                    if rows.is_empty() {
                        println!("No cleaners found.");
                        return Ok(());
                    }
                    let mut table = super::new_table(vec!["ID", "Name", "Rating", "Active", "Hours"]);
                    for (c, hours) in &rows {
                        let hours = hours
                            .iter()
                            .map(|h| {
                                format!(
                                    "{} {}-{}",
                                    &weekday_name(h.day_of_week)[..3],
                                    h.start_time.format("%H:%M"),
                                    h.end_time.format("%H:%M")
                                )
                            })
                            .collect::<Vec<_>>()
                            .join("\n");
                        table.add_row(vec![
                            c.cleaner_id.clone(),
                            c.name.clone(),
                            c.rating.to_string(),
                            if c.is_active { "yes" } else { "no" }.to_string(),
                            if hours.is_empty() { "-".to_string() } else { hours },
                        ]);
                    }
                    println!("{table}");
                }
            }
        }
        CleanerAction::AvailabilityAdd { cleaner, day, start, end } => {
            let cleaner = find_cleaner(&conn, &cleaner)?;
            let weekday = parse_weekday(&day)
                .ok_or_else(|| CbError::Validation(format!("Unknown day '{day}'")))?;
            let (start, end) = (parse_hm(&start)?, parse_hm(&end)?);
            if end <= start {
                return Err(CbError::Validation("End time must be after start time".into()));
            }
            let mut slot = CleanerAvailability::new(cleaner.id.unwrap_or_default(), weekday, start, end);
            slot.save(&conn)?;
            println!(
                "  {} {} works {} {}-{}",
                style("OK").green().bold(),
                cleaner.name,
                weekday_name(weekday),
                start.format("%H:%M"),
                end.format("%H:%M")
            );
        }
        CleanerAction::Deactivate { cleaner } => {
            let mut cleaner = find_cleaner(&conn, &cleaner)?;
            cleaner.is_active = false;
            cleaner.save(&conn)?;
            println!("  {} {} will not get new jobs.", style("OK").green().bold(), cleaner.name);
        }
    }

    Ok(())
}
