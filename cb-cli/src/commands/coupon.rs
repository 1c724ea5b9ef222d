//! Coupon commands.

use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use console::style;

use cb_core::config::ConfigHandle;
use cb_core::error::{CbError, CbResult};
use cb_core::money::format_usd;
use cb_models::models::coupon::{DISCOUNT_FIXED, DISCOUNT_PERCENTAGE, LIMIT_OVERALL, LIMIT_PER_USER};
use cb_models::Coupon;
use cb_services::CouponService;
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum CouponAction {
    /// Create a discount code.
    Create {
        /// Business id (BUS-nnnn).
        business: String,
        code: String,
        /// Percent off the total.
        #[arg(long, conflicts_with = "fixed")]
        percent: Option<f64>,
        /// Dollars off the total.
        #[arg(long)]
        fixed: Option<f64>,
        /// Count the usage limit per customer email instead of overall.
        #[arg(long)]
        per_user: bool,
        #[arg(long)]
        usage_limit: Option<i64>,
        /// Last valid day, YYYY-MM-DD.
        #[arg(long)]
        expiry: Option<String>,
    },
    List {
        business: String,
    },
    /// Check a code against a price without redeeming it.
    Check {
        business: String,
        code: String,
        price: f64,
        #[arg(long)]
        email: Option<String>,
    },
}

/// The discount type and value given on the command line.
fn discount_of(percent: Option<f64>, fixed: Option<f64>) -> CbResult<(&'static str, f64)> {
    match (percent, fixed) {
        (Some(p), None) if p > 0.0 && p <= 100.0 => Ok((DISCOUNT_PERCENTAGE, p)),
        (Some(_), None) => Err(CbError::Validation("Percent must be between 0 and 100".into())),
        (None, Some(f)) if f > 0.0 => Ok((DISCOUNT_FIXED, f)),
        (None, Some(_)) => Err(CbError::Validation("Fixed discount must be positive".into())),
        _ => Err(CbError::Validation("Give exactly one of --percent or --fixed".into())),
    }
}

fn describe(coupon: &Coupon) -> String {
    if coupon.discount_type == DISCOUNT_PERCENTAGE {
        format!("{}% off", coupon.discount_value)
    } else {
        format!("{} off", format_usd(coupon.discount_value))
    }
}

pub async fn run(config: ConfigHandle, action: CouponAction, format: OutputFormat) -> CbResult<()> {
    let registry = super::open_services(&config).await?;
    let coupons = CouponService::new(registry.ctx.clone());

    match action {
        CouponAction::Create { business, code, percent, fixed, per_user, usage_limit, expiry } => {
            let business = registry.ctx.business(&business)?;
            if code.trim().is_empty() {
                return Err(CbError::Validation("Coupon code is required".into()));
            }
            let (kind, value) = discount_of(percent, fixed)?;
            let mut coupon = Coupon::new(business.id.unwrap_or_default(), &code, kind, value);
            coupon.limit_type = if per_user { LIMIT_PER_USER } else { LIMIT_OVERALL }.to_string();
            coupon.usage_limit = usage_limit;
            coupon.expiry_date = expiry
                .as_deref()
                .map(|d| {
                    NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
                        .map_err(|_| CbError::Validation(format!("Invalid expiry '{d}', expected YYYY-MM-DD")))
                })
                .transpose()?;
            coupons.create(&mut coupon)?;

            match format {
                OutputFormat::Json => super::print_json(&coupon),
                OutputFormat::Text => println!(
                    "  {} Coupon {} created: {}",
                    style("OK").green().bold(),
                    style(&coupon.code).cyan(),
                    describe(&coupon)
                ),
            }
        }
        CouponAction::List { business } => {
            let business = registry.ctx.business(&business)?;
            let list = coupons.list(&business)?;
            match format {
                OutputFormat::Json => super::print_json(&list),
                OutputFormat::Text => {
                    if list.is_empty() {
                        println!("No coupons found.");
                    } else {
                        let mut table =
                            super::new_table(vec!["Code", "Discount", "Limit", "Used", "Expires", "Active"]);
                        for c in &list {
                            let limit = match c.usage_limit {
                                Some(n) => format!("{n} {}", c.limit_type),
                                None => "-".to_string(),
                            };
                            table.add_row(vec![
                                c.code.clone(),
                                describe(c),
                                limit,
                                c.times_used.to_string(),
                                c.expiry_date.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
                                if c.is_active { "yes" } else { "no" }.to_string(),
                            ]);
                        }
                        println!("{table}");
                    }
                }
            }
        }
        CouponAction::Check { business, code, price, email } => {
            let business = registry.ctx.business(&business)?;
            let check = coupons.validate(&business, &code, email.as_deref(), price, Utc::now().date_naive())?;
            match format {
                OutputFormat::Json => super::print_json(&check),
                OutputFormat::Text if check.valid => println!(
                    "  {} saves {}, final price {}",
                    style("VALID").green().bold(),
                    format_usd(check.discount_amount),
                    format_usd(check.final_price)
                ),
                OutputFormat::Text => println!("  {} {}", style("INVALID").red().bold(), check.message),
            }
        }
    }

    registry.shutdown_all().await
}
