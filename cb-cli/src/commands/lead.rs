//! Lead commands.

use clap::Subcommand;
use console::style;

use cb_core::config::ConfigHandle;
use cb_core::error::CbResult;
use cb_services::{LeadService, NewLead};
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum LeadAction {
    /// Capture a lead. A phone number triggers the outreach text.
    Add {
        /// Business id (BUS-nnnn).
        business: String,
        name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Where the lead came from (website, thumbtack, ...).
        #[arg(long)]
        source: Option<String>,
    },
    /// List leads, newest first.
    List {
        business: String,
        /// Include converted leads.
        #[arg(long)]
        all: bool,
        #[arg(short = 'n', long, default_value = "25")]
        limit: i64,
    },
    /// Mark a lead as converted.
    Convert {
        /// Lead id (LD...).
        lead: String,
    },
}

pub async fn run(config: ConfigHandle, action: LeadAction, format: OutputFormat) -> CbResult<()> {
    let registry = super::open_services(&config).await?;
    let leads = LeadService::new(registry.ctx.clone());

    match action {
        LeadAction::Add { business, name, phone, email, notes, source } => {
            let business = registry.ctx.business(&business)?;
            let mut rx = registry.event_bus().subscribe();
            let lead = leads.create_lead(
                &business,
                NewLead {
                    name,
                    email,
                    phone_number: phone,
                    notes,
                    content: None,
                    source,
                },
            )?;
            super::settle(&registry, &mut rx).await;
            let lead = leads.get(&lead.lead_id)?;

            match format {
                OutputFormat::Json => super::print_json(&lead),
                OutputFormat::Text => {
                    println!(
                        "  {} Lead {} captured for {}",
                        style("OK").green().bold(),
                        style(&lead.lead_id).cyan(),
                        lead.name
                    );
                    match lead.email_sent_at {
                        Some(at) => println!("  Outreach sent at {}", at.format("%Y-%m-%d %H:%M UTC")),
                        None if lead.phone_number.is_some() => {
                            println!("  {} Outreach was not delivered; see the log.", style("WARN").yellow().bold())
                        }
                        None => println!("  No phone number, so no outreach text."),
                    }
                }
            }
        }
        LeadAction::List { business, all, limit } => {
            let business = registry.ctx.business(&business)?;
            let list = leads.list_leads(&business, all, limit)?;
            match format {
                OutputFormat::Json => super::print_json(&list),
                OutputFormat::Text => {
                    if list.is_empty() {
                        println!("No leads found.");
                    } else {
                        let mut table =
                            super::new_table(vec!["ID", "Name", "Phone", "Source", "Contacted", "Converted"]);
                        for l in &list {
                            table.add_row(vec![
                                l.lead_id.clone(),
                                super::truncate(&l.name, 24),
                                super::opt(&l.phone_number),
                                super::opt(&l.source),
                                l.email_sent_at
                                    .map(|t| t.format("%Y-%m-%d").to_string())
                                    .unwrap_or_else(|| "-".into()),
                                if l.is_converted { "yes" } else { "no" }.to_string(),
                            ]);
                        }
                        println!("{table}");
                    }
                }
            }
        }
        LeadAction::Convert { lead } => {
            let lead = leads.convert_lead(&lead)?;
            match format {
                OutputFormat::Json => super::print_json(&lead),
                OutputFormat::Text => {
                    println!("  {} {} marked as converted.", style("OK").green().bold(), lead.lead_id)
                }
            }
        }
    }

    registry.shutdown_all().await
}
