//! Booking commands.

use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use console::style;
use serde_json::{json, Value};

use cb_core::config::ConfigHandle;
use cb_core::error::{CbError, CbResult};
use cb_core::money::format_usd;
use cb_models::queries::{BookingFilter, SortDirection};
use cb_models::Booking;
use cb_services::invoice::calculate_percentage_tip;
use cb_services::{BookingService, InvoiceService, RescheduleOutcome};
use super::quote::SummaryArgs;
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum BookingAction {
    /// Book an appointment. Flags fill the same summary the agent builds.
    Create {
        /// Business id (BUS-nnnn).
        business: String,
        /// Appointment time, e.g. "2025-03-14 10am" or "next friday at 2pm".
        when: String,
        #[command(flatten)]
        details: SummaryArgs,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        zip: Option<String>,
        #[arg(long)]
        coupon: Option<String>,
        /// one-time, weekly, biweekly or monthly.
        #[arg(long)]
        recurring: Option<String>,
        #[arg(long)]
        payment_method: Option<String>,
        /// Assign this cleaner (CL...) instead of the best free one.
        #[arg(long)]
        cleaner: Option<String>,
    },
    /// List bookings by appointment date.
    List {
        business: String,
        /// First day, YYYY-MM-DD.
        #[arg(long)]
        from: Option<String>,
        /// Last day, YYYY-MM-DD.
        #[arg(long)]
        to: Option<String>,
        /// Include cancelled bookings.
        #[arg(long)]
        cancelled: bool,
        /// Newest appointments first.
        #[arg(long)]
        desc: bool,
        #[arg(short = 'n', long, default_value = "50")]
        limit: i64,
    },
    /// Show a booking and its invoice.
    Show {
        /// Booking id (BK...).
        booking: String,
    },
    /// Move a booking to a new time.
    Reschedule {
        business: String,
        booking: String,
        when: String,
        #[arg(long)]
        reason: Option<String>,
    },
    Cancel {
        business: String,
        booking: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Mark a booking as done.
    Complete {
        business: String,
        booking: String,
    },
    /// Set the tip, as an amount or as a percentage of the bill.
    Tip {
        booking: String,
        #[arg(long, conflicts_with = "percent")]
        amount: Option<f64>,
        #[arg(long)]
        percent: Option<f64>,
    },
}

fn parse_date(text: Option<&str>) -> CbResult<Option<NaiveDate>> {
    text.map(|t| {
        NaiveDate::parse_from_str(t.trim(), "%Y-%m-%d")
            .map_err(|_| CbError::Validation(format!("Invalid date '{t}', expected YYYY-MM-DD")))
    })
    .transpose()
}

#[allow(clippy::too_many_arguments)]
fn booking_summary(
    details: &SummaryArgs,
    when: &str,
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    city: Option<String>,
    state: Option<String>,
    zip: Option<String>,
    coupon: Option<String>,
    recurring: Option<String>,
    payment_method: Option<String>,
) -> CbResult<Value> {
    let mut summary = details.to_summary()?;
    if let Some(obj) = summary.as_object_mut() {
        obj.insert("appointmentDateTime".into(), json!(when));
        let fields = [
            ("firstName", first_name),
            ("lastName", last_name),
            ("phoneNumber", phone),
            ("address1", address),
            ("city", city),
            ("state", state),
            ("zipCode", zip),
            ("couponCode", coupon),
            ("recurring", recurring),
            ("paymentMethod", payment_method),
        ];
        for (key, value) in fields {
            if let Some(v) = value {
                obj.insert(key.into(), json!(v));
            }
        }
    }
    Ok(summary)
}

fn status_of(booking: &Booking) -> String {
    if booking.is_cancelled() {
        style("cancelled").red().to_string()
    } else if booking.is_completed {
        style("completed").green().to_string()
    } else {
        "scheduled".to_string()
    }
}

fn print_booking(booking: &Booking) {
    println!("{}", style(format!("Booking {}", booking.booking_id)).bold().underlined());
    println!("  Customer:  {}", booking.customer_name());
    println!("  Phone:     {}", super::opt(&booking.phone_number));
    println!(
        "  When:      {} {}-{}",
        booking.cleaning_date.format("%a %Y-%m-%d"),
        booking.start_time.format("%H:%M"),
        booking.end_time.format("%H:%M")
    );
    println!(
        "  Property:  {} bed, {} bath, {} sqft",
        booking.bedrooms, booking.bathrooms, booking.square_feet
    );
    println!("  Service:   {} ({})", booking.service_type, booking.recurring);
    println!("  Total:     {} (tax {})", format_usd(booking.total_price), format_usd(booking.tax));
    if booking.tip > 0.0 {
        println!("  Tip:       {}", format_usd(booking.tip));
    }
    println!("  Status:    {}", status_of(booking));
    if let Some(reason) = &booking.cancelled_reason {
        println!("  Cancelled: {reason}");
    }
    if let Some(reason) = &booking.rescheduled_reason {
        println!("  Moved:     {reason}");
    }
}

pub async fn run(config: ConfigHandle, action: BookingAction, format: OutputFormat) -> CbResult<()> {
    let registry = super::open_services(&config).await?;
    let bookings = BookingService::new(registry.ctx.clone());
    let invoices = InvoiceService::new(registry.ctx.clone());

    match action {
        BookingAction::Create {
            business,
            when,
            details,
            first_name,
            last_name,
            phone,
            address,
            city,
            state,
            zip,
            coupon,
            recurring,
            payment_method,
            cleaner,
        } => {
            let business = registry.ctx.business(&business)?;
            let cleaner_id = match cleaner {
                Some(cleaner_id) => {
                    let conn = registry.ctx.database.conn()?;
                    let cleaner = super::cleaner::find_cleaner(&conn, &cleaner_id)?;
                    if cleaner.business_id != business.id.unwrap_or_default() {
                        return Err(CbError::not_found("cleaner", cleaner_id));
                    }
                    cleaner.id
                }
                None => None,
            };
            let summary = booking_summary(
                &details,
                &when,
                first_name,
                last_name,
                phone,
                address,
                city,
                state,
                zip,
                coupon,
                recurring,
                payment_method,
            )?;

            let mut rx = registry.event_bus().subscribe();
            let created = bookings.book_with_cleaner_at(&business, &summary, cleaner_id, Utc::now())?;
            super::settle(&registry, &mut rx).await;

            match format {
                OutputFormat::Json => super::print_json(&created),
                OutputFormat::Text => {
                    println!(
                        "  {} Booked {} for {}",
                        style("OK").green().bold(),
                        style(&created.booking.booking_id).cyan(),
                        created.booking.customer_name()
                    );
                    println!(
                        "  {} at {} with {}",
                        created.booking.cleaning_date.format("%A, %B %-d, %Y"),
                        created.booking.start_time.format("%-I:%M %p"),
                        created.cleaner_name.as_deref().unwrap_or("an available cleaner")
                    );
                    if created.discount > 0.0 {
                        println!("  Discount:  -{}", format_usd(created.discount));
                    }
                    println!("  Total:     {}", format_usd(created.booking.total_price));
                    println!("  Invoice:   {}", invoices.link(&created.invoice));
                }
            }
        }
        BookingAction::List { business, from, to, cancelled, desc, limit } => {
            let business = registry.ctx.business(&business)?;
            let filter = BookingFilter {
                business_id: business.id,
                from_date: parse_date(from.as_deref())?,
                to_date: parse_date(to.as_deref())?,
                include_cancelled: cancelled,
                include_completed: true,
                direction: if desc { SortDirection::Desc } else { SortDirection::Asc },
                limit: Some(limit),
                ..BookingFilter::default()
            };
            let list = bookings.list(&filter)?;

            match format {
                OutputFormat::Json => super::print_json(&list),
                OutputFormat::Text => {
                    if list.is_empty() {
                        println!("No bookings found.");
                    } else {
                        let mut table =
                            super::new_table(vec!["ID", "Date", "Time", "Customer", "Service", "Total", "Status"]);
                        for b in &list {
                            table.add_row(vec![
                                b.booking_id.clone(),
                                b.cleaning_date.format("%Y-%m-%d").to_string(),
                                b.start_time.format("%H:%M").to_string(),
                                super::truncate(&b.customer_name(), 24),
                                b.service_type.clone(),
                                format_usd(b.total_price),
                                status_of(b),
                            ]);
                        }
                        println!("{table}");
                    }
                }
            }
        }
        BookingAction::Show { booking } => {
            let booking = bookings.get(&booking)?;
            let invoice = bookings.invoice_for(&booking)?;
            match format {
                OutputFormat::Json => super::print_json(&json!({"booking": booking, "invoice": invoice})),
                OutputFormat::Text => {
                    print_booking(&booking);
                    match invoice {
                        Some(inv) => println!(
                            "  Invoice:   {} {} ({})",
                            inv.invoice_id,
                            format_usd(inv.amount),
                            if inv.is_paid { "paid" } else { "unpaid" }
                        ),
                        None => println!("  Invoice:   -"),
                    }
                }
            }
        }
        BookingAction::Reschedule { business, booking, when, reason } => {
            let business = registry.ctx.business(&business)?;
            let mut rx = registry.event_bus().subscribe();
            let outcome = bookings.reschedule(&business, &booking, &when, reason.as_deref())?;
            super::settle(&registry, &mut rx).await;

            match outcome {
                RescheduleOutcome::Moved(moved) => match format {
                    OutputFormat::Json => super::print_json(&json!({"success": true, "booking": moved})),
                    OutputFormat::Text => println!(
                        "  {} {} moved to {} at {}",
                        style("OK").green().bold(),
                        moved.booking_id,
                        moved.cleaning_date.format("%A, %B %-d, %Y"),
                        moved.start_time.format("%-I:%M %p")
                    ),
                },
                RescheduleOutcome::Unavailable { alternative_slots } => match format {
                    OutputFormat::Json => super::print_json(&json!({
                        "success": false,
                        "alternative_slots": alternative_slots,
                    })),
                    OutputFormat::Text => {
                        println!("  {} Nobody is free at that time.", style("UNAVAILABLE").red().bold());
                        for slot in &alternative_slots {
                            println!("    - {slot}");
                        }
                    }
                },
            }
        }
        BookingAction::Cancel { business, booking, reason } => {
            let business = registry.ctx.business(&business)?;
            let mut rx = registry.event_bus().subscribe();
            let cancelled = bookings.cancel(&business, &booking, reason.as_deref())?;
            super::settle(&registry, &mut rx).await;
            match format {
                OutputFormat::Json => super::print_json(&cancelled),
                OutputFormat::Text => {
                    println!("  {} {} cancelled.", style("OK").green().bold(), cancelled.booking_id)
                }
            }
        }
        BookingAction::Complete { business, booking } => {
            let business = registry.ctx.business(&business)?;
            let done = bookings.complete(&business, &booking)?;
            match format {
                OutputFormat::Json => super::print_json(&done),
                OutputFormat::Text => {
                    println!("  {} {} marked as completed.", style("OK").green().bold(), done.booking_id)
                }
            }
        }
        BookingAction::Tip { booking, amount, percent } => {
            let tip = match (amount, percent) {
                (Some(a), _) => a,
                (None, Some(pct)) => {
                    let (current, invoice) = invoices.for_booking(&booking)?;
                    calculate_percentage_tip(invoice.amount - current.tip, pct)
                }
                (None, None) => return Err(CbError::Validation("Give --amount or --percent".into())),
            };
            let (booking, invoice) = invoices.add_tip(&booking, tip)?;
            match format {
                OutputFormat::Json => super::print_json(&json!({"booking": booking, "invoice": invoice})),
                OutputFormat::Text => println!(
                    "  {} Tip of {} added; invoice {} is now {}",
                    style("OK").green().bold(),
                    format_usd(booking.tip),
                    invoice.invoice_id,
                    format_usd(invoice.amount)
                ),
            }
        }
    }

    registry.shutdown_all().await
}
