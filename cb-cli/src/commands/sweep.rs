//! Reminder sweep: payment reminders, releasing unpaid slots, appointment
//! reminders, follow-ups and lead calls, once or on an interval.

use std::time::Duration;

use chrono::Utc;
use console::style;
use tracing::{error, info};

use cb_core::config::ConfigHandle;
use cb_core::error::{CbError, CbResult};
use cb_services::{ReminderService, SweepReport};
use crate::OutputFormat;

fn print_report(report: &SweepReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => super::print_json(report),
        OutputFormat::Text => {
            if report.is_empty() {
                println!("  {} Nothing due.", style("OK").green().bold());
                return;
            }
            let mut table = super::new_table(vec!["Action", "Targets"]);
            let rows = [
                ("Payment reminders", &report.payment_reminders),
                ("Released", &report.released),
                ("Appointment reminders", &report.appointment_reminders),
                ("Cleaner reminders", &report.cleaner_reminders),
                ("Final reminders", &report.final_reminders),
                ("Follow-ups", &report.follow_ups),
                ("Lead calls", &report.lead_calls),
            ];
            for (label, ids) in rows.into_iter().filter(|(_, ids)| !ids.is_empty()) {
                table.add_row(vec![label.to_string(), ids.join("\n")]);
            }
            println!("{table}");
            if report.failures > 0 {
                println!(
                    "  {} {} message(s) could not be sent and will be retried.",
                    style("WARN").yellow().bold(),
                    report.failures
                );
            }
        }
    }
}

pub async fn run(config: ConfigHandle, watch: Option<u64>, format: OutputFormat) -> CbResult<()> {
    let registry = super::open_services(&config).await?;
    let reminders = ReminderService::new(registry.ctx.clone());

    match watch {
        None => {
            let report = reminders.run_all(Utc::now()).await?;
            print_report(&report, format);
        }
        Some(0) => return Err(CbError::Validation("--watch needs a positive number of seconds".into())),
        Some(secs) => {
            info!("sweeping every {}s", secs);
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match reminders.run_all(Utc::now()).await {
                            Ok(report) if report.is_empty() => {}
                            Ok(report) => print_report(&report, format),
                            Err(e) => error!("sweep failed: {e}"),
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        println!("  Stopping.");
                        break;
                    }
                }
            }
        }
    }

    registry.shutdown_all().await
}
