//! Quote command, and the booking-summary flags shared with `booking create`.

use chrono::Utc;
use clap::Args;
use console::style;
use serde_json::{json, Map, Value};

use cb_core::config::ConfigHandle;
use cb_core::error::{CbError, CbResult};
use cb_core::money::format_usd;
use cb_models::{Addon, Customer};
use cb_services::{pricing, CouponService};
use crate::OutputFormat;

/// Property and contact details, as flags or as a summary JSON object.
#[derive(Args, Debug, Clone, Default)]
pub struct SummaryArgs {
    /// A summary JSON object; flags below override its fields.
    #[arg(long)]
    pub summary: Option<String>,
    #[arg(long)]
    pub bedrooms: Option<i64>,
    #[arg(long)]
    pub bathrooms: Option<i64>,
    #[arg(long)]
    pub sqft: Option<i64>,
    /// standard, deep, move in/out or airbnb.
    #[arg(long)]
    pub service: Option<String>,
    /// Add-on quantity as KEY=QTY, e.g. oven=1 or addonLaundryLoads=2. Repeatable.
    #[arg(long = "addon", value_name = "KEY=QTY")]
    pub addons: Vec<String>,
    #[arg(long)]
    pub email: Option<String>,
}

impl SummaryArgs {
    /// Merge the JSON object and the flags into one summary.
    pub fn to_summary(&self) -> CbResult<Value> {
        let mut summary = match self.summary.as_deref() {
            Some(text) => match serde_json::from_str::<Value>(text)? {
                Value::Object(map) => map,
                _ => return Err(CbError::Validation("--summary must be a JSON object".into())),
            },
            None => Map::new(),
        };

        let mut put = |key: &str, value: Value| {
            summary.insert(key.to_string(), value);
        };
        if let Some(n) = self.bedrooms {
            put("bedrooms", json!(n));
        }
        if let Some(n) = self.bathrooms {
            put("bathrooms", json!(n));
        }
        if let Some(n) = self.sqft {
            put("squareFeet", json!(n));
        }
        if let Some(s) = &self.service {
            put("serviceType", json!(s));
        }
        if let Some(e) = &self.email {
            put("email", json!(e));
        }
        for spec in &self.addons {
            let (key, qty) = parse_addon(spec)?;
            put(&key, json!(qty));
        }
        Ok(Value::Object(summary))
    }
}

/// `oven=2` → (`addonOvenCleaning`, 2). Unknown keys pass through so custom
/// add-ons can be named by their summary key.
fn parse_addon(spec: &str) -> CbResult<(String, i64)> {
    let (key, qty) = spec
        .split_once('=')
        .ok_or_else(|| CbError::Validation(format!("Invalid add-on '{spec}', expected KEY=QTY")))?;
    let qty: i64 = qty
        .trim()
        .parse()
        .map_err(|_| CbError::Validation(format!("Invalid add-on quantity in '{spec}'")))?;
    let key = key.trim();
    let key = Addon::parse(key).map(|a| a.summary_key().to_string()).unwrap_or_else(|| key.to_string());
    Ok((key, qty))
}

#[derive(Args, Debug)]
pub struct QuoteArgs {
    /// Business id (BUS-nnnn).
    pub business: String,
    #[command(flatten)]
    pub details: SummaryArgs,
    /// Check a coupon against the quoted total.
    #[arg(long)]
    pub coupon: Option<String>,
}

pub async fn run(config: ConfigHandle, args: QuoteArgs, format: OutputFormat) -> CbResult<()> {
    let registry = super::open_services(&config).await?;
    let ctx = registry.ctx.clone();
    let business = ctx.business(&args.business)?;
    let summary = args.details.to_summary()?;

    let breakdown = {
        let conn = ctx.database.conn()?;
        let customer = match args.details.email.as_deref() {
            Some(email) => Customer::find_by_contact(&conn, business.id.unwrap_or_default(), None, Some(email))?,
            None => None,
        };
        pricing::quote(&conn, &business, customer.as_ref(), &summary)?
    };

    let coupon = match args.coupon.as_deref() {
        Some(code) => Some(CouponService::new(ctx.clone()).validate(
            &business,
            code,
            args.details.email.as_deref(),
            breakdown.total_amount,
            Utc::now().date_naive(),
        )?),
        None => None,
    };

    match format {
        OutputFormat::Json => super::print_json(&json!({"quote": breakdown, "coupon": coupon})),
        OutputFormat::Text => {
            println!(
                "{} ({} pricing, {})",
                style(format!("Quote for {}", business.name)).bold().underlined(),
                breakdown.pricing_type,
                breakdown.service_type
            );
            let mut table = super::new_table(vec!["Item", "Amount"]);
            let lines = [
                ("Base", breakdown.base_price),
                ("Bedrooms", breakdown.bedroom_total),
                ("Bathrooms", breakdown.bathroom_total),
                ("Square footage", breakdown.sqft_price),
                ("Add-ons", breakdown.addons_total),
                ("Custom add-ons", breakdown.custom_addon_total),
            ];
            for (label, amount) in lines.into_iter().filter(|(_, a)| *a != 0.0) {
                table.add_row(vec![label.to_string(), format_usd(amount)]);
            }
            table.add_row(vec!["Subtotal".to_string(), format_usd(breakdown.sub_total)]);
            table.add_row(vec![format!("Tax ({}%)", breakdown.tax_rate), format_usd(breakdown.tax)]);
            table.add_row(vec![
                style("Total").bold().to_string(),
                style(format_usd(breakdown.total_amount)).bold().to_string(),
            ]);
            println!("{table}");

            if let Some(check) = coupon {
                if check.valid {
                    println!(
                        "  {} {} saves {} → {}",
                        style("COUPON").green().bold(),
                        check.code.unwrap_or_default(),
                        format_usd(check.discount_amount),
                        format_usd(check.final_price)
                    );
                } else {
                    println!("  {} {}", style("COUPON").yellow().bold(), check.message);
                }
            }
        }
    }

    registry.shutdown_all().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addon_maps_aliases() {
        assert_eq!(parse_addon("addonOvenCleaning=2").unwrap(), ("addonOvenCleaning".into(), 2));
        assert_eq!(parse_addon("patio=1").unwrap(), ("addonPatioSweeping".into(), 1));
        assert_eq!(parse_addon("addonHotTub=1").unwrap().0, "addonHotTub");
        assert!(parse_addon("oven").is_err());
        assert!(parse_addon("oven=lots").is_err());
    }

    #[test]
    fn test_flags_override_summary_json() {
        let args = SummaryArgs {
            summary: Some(r#"{"bedrooms": 2, "city": "Austin"}"#.into()),
            bedrooms: Some(4),
            service: Some("deep".into()),
            ..SummaryArgs::default()
        };
        let summary = args.to_summary().unwrap();
        assert_eq!(summary["bedrooms"], 4);
        assert_eq!(summary["city"], "Austin");
        assert_eq!(summary["serviceType"], "deep");
    }

    #[test]
    fn test_summary_must_be_object() {
        let args = SummaryArgs {
            summary: Some("[1, 2]".into()),
            ..SummaryArgs::default()
        };
        assert!(args.to_summary().is_err());
    }
}
