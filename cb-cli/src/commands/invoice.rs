//! Invoice and payment commands.

use clap::Subcommand;
use console::style;
use serde_json::json;

use cb_core::config::ConfigHandle;
use cb_core::constants::payment_status;
use cb_core::error::CbResult;
use cb_core::money::format_usd;
use cb_services::invoice::{suggested_tips, PaymentOutcome};
use cb_services::InvoiceService;
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum InvoiceAction {
    /// Show an invoice with its payments and balance.
    Show {
        /// Invoice id (INV...).
        invoice: String,
    },
    /// Record a payment against an invoice.
    Pay {
        invoice: String,
        amount: f64,
        /// card, cash, zelle, ...
        #[arg(long)]
        method: Option<String>,
        /// PENDING, COMPLETED, SUBMITTED, APPROVED, REJECTED or FAILED.
        #[arg(long, default_value = payment_status::COMPLETED)]
        status: String,
        /// Processor reference.
        #[arg(long)]
        external_id: Option<String>,
    },
    /// Change the status of a recorded payment.
    PaymentStatus {
        /// Payment id (PAY...).
        payment: String,
        status: String,
    },
    /// Suggested tip amounts for an invoice.
    Tips {
        invoice: String,
    },
}

fn print_outcome(outcome: &PaymentOutcome) {
    println!(
        "  {} Payment {} of {} is {}",
        style("OK").green().bold(),
        style(&outcome.payment.payment_id).cyan(),
        format_usd(outcome.payment.amount),
        outcome.payment.status
    );
    if outcome.became_paid {
        println!("  Invoice {} is now {}", outcome.invoice.invoice_id, style("PAID").green().bold());
    } else if outcome.invoice.is_paid {
        println!("  Invoice {} is paid.", outcome.invoice.invoice_id);
    } else {
        println!("  Invoice {} is still open.", outcome.invoice.invoice_id);
    }
}

pub async fn run(config: ConfigHandle, action: InvoiceAction, format: OutputFormat) -> CbResult<()> {
    let registry = super::open_services(&config).await?;
    let invoices = InvoiceService::new(registry.ctx.clone());

    match action {
        InvoiceAction::Show { invoice } => {
            let invoice = invoices.get(&invoice)?;
            let payments = invoices.payments(&invoice)?;
            let balance = invoices.balance(&invoice)?;
            let link = invoices.link(&invoice);

            match format {
                OutputFormat::Json => super::print_json(&json!({
                    "invoice": invoice,
                    "payments": payments,
                    "balance": balance,
                    "link": link,
                })),
                OutputFormat::Text => {
                    println!("{}", style(format!("Invoice {}", invoice.invoice_id)).bold().underlined());
                    println!("  Amount:  {}", format_usd(invoice.amount));
                    println!("  Balance: {}", format_usd(balance));
                    println!(
                        "  Status:  {}",
                        if invoice.is_paid {
                            style("paid").green()
                        } else {
                            style("unpaid").yellow()
                        }
                    );
                    println!("  Link:    {link}");
                    if !payments.is_empty() {
                        let mut table = super::new_table(vec!["Payment", "Amount", "Method", "Status", "Created"]);
                        for p in &payments {
                            table.add_row(vec![
                                p.payment_id.clone(),
                                format_usd(p.amount),
                                super::opt(&p.method),
                                p.status.clone(),
                                p.created_at.format("%Y-%m-%d %H:%M").to_string(),
                            ]);
                        }
                        println!("{table}");
                    }
                }
            }
        }
        InvoiceAction::Pay { invoice, amount, method, status, external_id } => {
            let mut rx = registry.event_bus().subscribe();
            let outcome =
                invoices.record_payment(&invoice, amount, method.as_deref(), &status, external_id.as_deref())?;
            super::settle(&registry, &mut rx).await;
            match format {
                OutputFormat::Json => super::print_json(&outcome),
                OutputFormat::Text => print_outcome(&outcome),
            }
        }
        InvoiceAction::PaymentStatus { payment, status } => {
            let mut rx = registry.event_bus().subscribe();
            let outcome = invoices.update_payment_status(&payment, &status)?;
            super::settle(&registry, &mut rx).await;
            match format {
                OutputFormat::Json => super::print_json(&outcome),
                OutputFormat::Text => print_outcome(&outcome),
            }
        }
        InvoiceAction::Tips { invoice } => {
            let invoice = invoices.get(&invoice)?;
            let tips = suggested_tips(invoice.amount);
            match format {
                OutputFormat::Json => super::print_json(&tips),
                OutputFormat::Text => {
                    let mut table = super::new_table(vec!["Tip", "Amount"]);
                    for t in &tips {
                        table.add_row(vec![t.label.clone(), format_usd(t.amount)]);
                    }
                    println!("{table}");
                }
            }
        }
    }

    registry.shutdown_all().await
}
