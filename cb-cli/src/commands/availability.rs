//! Availability commands.

use clap::Subcommand;
use console::style;

use cb_core::config::ConfigHandle;
use cb_core::error::CbResult;
use cb_services::AvailabilityService;
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum AvailabilityAction {
    /// Check a time written the way a customer would, e.g. "next friday at 2pm".
    Check {
        /// Business id (BUS-nnnn).
        business: String,
        when: String,
    },
}

pub async fn run(config: ConfigHandle, action: AvailabilityAction, format: OutputFormat) -> CbResult<()> {
    let registry = super::open_services(&config).await?;
    let availability = AvailabilityService::new(registry.ctx.clone());

    match action {
        AvailabilityAction::Check { business, when } => {
            let business = registry.ctx.business(&business)?;
            let check = availability.check_availability(&business, &when)?;
            match format {
                OutputFormat::Json => super::print_json(&check),
                OutputFormat::Text => {
                    println!("  Requested: {}", check.parsed_datetime);
                    if check.available {
                        println!("  {} {} is open", style("AVAILABLE").green().bold(), check.timeslot);
                    } else {
                        println!("  {} {} is taken", style("UNAVAILABLE").red().bold(), check.timeslot);
                        if check.alternative_slots.is_empty() {
                            println!("  No open slots nearby.");
                        } else {
                            println!("  Nearby open slots:");
                            for slot in &check.alternative_slots {
                                println!("    - {slot}");
                            }
                        }
                    }
                }
            }
        }
    }

    registry.shutdown_all().await
}
