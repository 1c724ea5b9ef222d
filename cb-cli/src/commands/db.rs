//! Database management commands.

use clap::Subcommand;
use console::style;
use dialoguer::Confirm;
use serde_json::json;

use cb_core::config::ConfigHandle;
use cb_core::error::{CbError, CbResult};
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum DbAction {
    /// Show row counts and storage details.
    Stats,
    /// Run an integrity check.
    Check,
    /// Reset the database (WARNING: destroys all data).
    Reset {
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the database file path.
    Path,
}

fn pragma_i64(conn: &rusqlite::Connection, name: &str) -> i64 {
    conn.query_row(&format!("PRAGMA {name}"), [], |row| row.get(0))
        .unwrap_or(0)
}

fn foreign_key_violations(conn: &rusqlite::Connection) -> CbResult<Vec<String>> {
    let mut stmt = conn
        .prepare("PRAGMA foreign_key_check")
        .map_err(|e| CbError::Database(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            let table: String = row.get(0)?;
            let rowid: i64 = row.get(1)?;
            let parent: String = row.get(2)?;
            Ok(format!("{table} row {rowid} -> {parent}"))
        })
        .map_err(|e| CbError::Database(e.to_string()))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

pub async fn run(config: ConfigHandle, action: DbAction, format: OutputFormat) -> CbResult<()> {
    let db_path = config.read().await.effective_db_path()?;

    match action {
        DbAction::Stats => {
            let db = super::init_database(&config).await?;
            let stats = db.stats()?;
            let file_size = std::fs::metadata(&db_path).ok().map(|m| m.len());
            let wal_size = std::fs::metadata(db_path.with_extension("db-wal")).ok().map(|m| m.len());

            let conn = db.conn()?;
            let journal_mode: String = conn
                .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                .unwrap_or_else(|_| "unknown".to_string());
            let page_size = pragma_i64(&conn, "page_size");
            let freelist_count = pragma_i64(&conn, "freelist_count");

            match format {
                OutputFormat::Json => {
                    let tables: serde_json::Map<String, serde_json::Value> =
                        stats.tables.iter().map(|(name, n)| (name.to_string(), json!(n))).collect();
                    super::print_json(&json!({
                        "path": db_path.display().to_string(),
                        "tables": tables,
                        "file_size_bytes": file_size,
                        "wal_size_bytes": wal_size,
                        "journal_mode": journal_mode,
                        "page_size": page_size,
                        "freelist_count": freelist_count,
                    }));
                }
                OutputFormat::Text => {
                    println!("{}", style("Database Statistics").bold().underlined());
                    println!("  Path:          {}", db_path.display());
                    println!("  Journal mode:  {journal_mode}");
                    println!();

                    let mut table = super::new_table(vec!["Table", "Row Count"]);
                    for (name, n) in &stats.tables {
                        table.add_row(vec![name.to_string(), n.to_string()]);
                    }
                    println!("{table}");

                    println!();
                    println!("{}", style("Storage").bold().underlined());
                    if let Some(size) = file_size {
                        println!("  Database:      {}", super::format_bytes(size));
                    }
                    if let Some(size) = wal_size {
                        println!("  WAL file:      {}", super::format_bytes(size));
                    }
                    if freelist_count > 0 {
                        println!(
                            "  Reclaimable:   {} (run VACUUM to reclaim)",
                            super::format_bytes((freelist_count * page_size) as u64)
                        );
                    }
                }
            }
        }
        DbAction::Check => {
            println!("  {} Running integrity check...", style("...").dim());
            let db = super::init_database(&config).await?;
            let conn = db.conn()?;

            let quick: String = conn
                .query_row("PRAGMA quick_check", [], |row| row.get(0))
                .unwrap_or_else(|_| "error".to_string());
            if quick == "ok" {
                println!("  {} Quick check passed.", style("OK").green().bold());
            } else {
                println!("  {} Quick check issue: {}", style("WARN").yellow().bold(), quick);
            }

            match db.run_integrity_check() {
                Ok(()) => println!("  {} Full integrity check passed.", style("OK").green().bold()),
                Err(e) => println!("  {} Integrity check failed: {}", style("FAIL").red().bold(), e),
            }

            let violations = foreign_key_violations(&conn)?;
            if violations.is_empty() {
                println!("  {} Foreign key constraints OK.", style("OK").green().bold());
            } else {
                println!(
                    "  {} {} foreign key violation(s):",
                    style("WARN").yellow().bold(),
                    violations.len()
                );
                for v in violations.iter().take(10) {
                    println!("    - {v}");
                }
                if violations.len() > 10 {
                    println!("    ... and {} more", violations.len() - 10);
                }
            }
        }
        DbAction::Reset { yes } => {
            println!(
                "  {} This deletes every business, booking, invoice and chat.",
                style("WARNING").red().bold()
            );
            println!("  Database: {}", db_path.display());

            let confirmed = yes
                || Confirm::new()
                    .with_prompt("  Are you sure you want to reset the database?")
                    .default(false)
                    .interact()
                    .unwrap_or(false);
            if !confirmed {
                println!("  Reset cancelled.");
                return Ok(());
            }

            let db = super::init_database(&config).await?;
            db.reset()?;
            println!("  {} Database reset complete.", style("OK").green().bold());
        }
        DbAction::Path => match format {
            OutputFormat::Json => super::print_json(&json!({"path": db_path.display().to_string()})),
            OutputFormat::Text => println!("{}", db_path.display()),
        },
    }

    Ok(())
}
