//! Business commands.

use clap::Subcommand;
use console::style;
use serde_json::json;

use cb_core::config::ConfigHandle;
use cb_core::constants::job_assignment;
use cb_core::error::{CbError, CbResult};
use cb_core::money::format_usd;
use cb_models::{queries, AgentConfiguration, ApiCredential, Business, CustomAddon, PriceField};
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum BusinessAction {
    /// Create a business with an empty price sheet.
    Create {
        /// Business name.
        name: String,
        /// IANA timezone, e.g. America/Chicago.
        #[arg(short, long, default_value = "UTC")]
        timezone: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        address: Option<String>,
        /// Give jobs to the best-rated free cleaner.
        #[arg(long)]
        high_rated: bool,
        /// Call customers when an SMS cannot be delivered.
        #[arg(long)]
        use_call: bool,
    },
    /// List all businesses.
    List,
    /// Show a business with its headline numbers.
    Show {
        /// Business id (BUS-nnnn).
        business: String,
    },
    /// Show the price sheet.
    Settings {
        business: String,
    },
    /// Set one price, e.g. `bedroom_price 25` or `addonOvenCleaning 30`.
    SetPrice {
        business: String,
        field: String,
        value: f64,
    },
    /// Add a custom add-on.
    AddonAdd {
        business: String,
        name: String,
        price: f64,
    },
    /// Show or replace the agent instructions.
    AgentPrompt {
        business: String,
        /// New instructions; omit to print the current ones.
        prompt: Option<String>,
    },
    /// Show or update SMS and voice credentials.
    Credentials {
        business: String,
        #[arg(long)]
        account_sid: Option<String>,
        #[arg(long)]
        auth_token: Option<String>,
        #[arg(long)]
        sms_number: Option<String>,
        #[arg(long)]
        voice_number: Option<String>,
        #[arg(long)]
        secret_key: Option<String>,
    },
}

pub async fn run(config: ConfigHandle, action: BusinessAction, format: OutputFormat) -> CbResult<()> {
    let db = super::init_database(&config).await?;
    let conn = db.conn()?;

    match action {
        BusinessAction::Create { name, timezone, phone, email, address, high_rated, use_call } => {
            if timezone.parse::<chrono_tz::Tz>().is_err() {
                return Err(CbError::Validation(format!("Unknown timezone '{timezone}'")));
            }
            let mut business = Business::new(name.trim());
            business.timezone = timezone;
            business.phone = phone;
            business.email = email;
            business.address = address;
            business.use_call = use_call;
            if high_rated {
                business.job_assignment = job_assignment::HIGH_RATED.to_string();
            }
            business.save(&conn)?;

            match format {
                OutputFormat::Json => super::print_json(&business),
                OutputFormat::Text => println!(
                    "  {} Created {} ({})",
                    style("OK").green().bold(),
                    business.name,
                    style(&business.business_id).cyan()
                ),
            }
        }
        BusinessAction::List => {
            let businesses = queries::list_businesses(&conn)?;
            match format {
                OutputFormat::Json => super::print_json(&businesses),
                OutputFormat::Text => {
                    if businesses.is_empty() {
                        println!("No businesses yet. Create one with `cleanbiz business create`.");
                        return Ok(());
                    }
                    let mut table = super::new_table(vec!["ID", "Name", "Timezone", "Phone", "Assignment"]);
                    for b in &businesses {
                        table.add_row(vec![
                            b.business_id.clone(),
                            super::truncate(&b.name, 30),
                            b.timezone.clone(),
                            super::opt(&b.phone),
                            b.job_assignment.clone(),
                        ]);
                    }
                    println!("{table}");
                }
            }
        }
        BusinessAction::Show { business } => {
            let business = super::find_business(&conn, &business)?;
            let summary = queries::business_summary(&conn, business.id.unwrap_or_default())?;
            match format {
                OutputFormat::Json => super::print_json(&json!({
                    "business": business,
                    "cleaners": summary.cleaners,
                    "customers": summary.customers,
                    "leads": summary.leads,
                    "bookings": summary.bookings,
                    "cancelled_bookings": summary.cancelled_bookings,
                    "unpaid_invoices": summary.unpaid_invoices,
                    "collected": summary.collected,
                    "outstanding": summary.outstanding,
                })),
                OutputFormat::Text => {
                    println!("{}", style(&business.name).bold().underlined());
                    println!("  ID:            {}", business.business_id);
                    println!("  Timezone:      {}", business.timezone);
                    println!("  Phone:         {}", super::opt(&business.phone));
                    println!("  Email:         {}", super::opt(&business.email));
                    println!("  Assignment:    {}", business.job_assignment);
                    println!("  Call fallback: {}", if business.use_call { "yes" } else { "no" });
                    println!();
                    println!("  Cleaners:      {}", summary.cleaners);
                    println!("  Customers:     {}", summary.customers);
                    println!("  Leads:         {}", summary.leads);
                    println!(
                        "  Bookings:      {} ({} cancelled)",
                        summary.bookings, summary.cancelled_bookings
                    );
                    println!("  Unpaid:        {}", summary.unpaid_invoices);
                    println!("  Collected:     {}", format_usd(summary.collected));
                    println!("  Outstanding:   {}", format_usd(summary.outstanding));
                }
            }
        }
        BusinessAction::Settings { business } => {
            let business = super::find_business(&conn, &business)?;
            let settings = business.settings(&conn)?;
            let custom = business.custom_addons(&conn)?;
            match format {
                OutputFormat::Json => super::print_json(&json!({
                    "prices": settings.prices,
                    "custom_addons": custom,
                })),
                OutputFormat::Text => {
                    let mut table = super::new_table(vec!["Field", "Value"]);
                    for field in PriceField::all() {
                        table.add_row(vec![field.column(), settings.prices.get(field).to_string()]);
                    }
                    for addon in &custom {
                        table.add_row(vec![format!("{} (custom)", addon.data_name), addon.price.to_string()]);
                    }
                    println!("{table}");
                }
            }
        }
        BusinessAction::SetPrice { business, field, value } => {
            let business = super::find_business(&conn, &business)?;
            let parsed = PriceField::parse(&field).ok_or_else(|| {
                let known: Vec<String> = PriceField::all().map(PriceField::column).collect();
                CbError::Validation(format!("Unknown price field '{field}'. Known: {}", known.join(", ")))
            })?;
            if value < 0.0 || !value.is_finite() {
                return Err(CbError::Validation("Prices cannot be negative".into()));
            }
            let mut settings = business.settings(&conn)?;
            settings.prices.set(parsed, value);
            settings.save(&conn)?;
            println!(
                "  {} {} = {} for {}",
                style("OK").green().bold(),
                parsed.column(),
                value,
                business.business_id
            );
        }
        BusinessAction::AddonAdd { business, name, price } => {
            let business = super::find_business(&conn, &business)?;
            if name.trim().is_empty() {
                return Err(CbError::Validation("Add-on name is required".into()));
            }
            let mut addon = CustomAddon::new(business.id.unwrap_or_default(), name.trim(), price);
            addon.save(&conn)?;
            match format {
                OutputFormat::Json => super::print_json(&addon),
                OutputFormat::Text => println!(
                    "  {} Added {} at {} (summary key {})",
                    style("OK").green().bold(),
                    addon.name,
                    format_usd(addon.price),
                    style(&addon.data_name).cyan()
                ),
            }
        }
        BusinessAction::AgentPrompt { business, prompt } => {
            let business = super::find_business(&conn, &business)?;
            match prompt {
                Some(text) => {
                    let mut agent = AgentConfiguration::find_by_business(&conn, business.id.unwrap_or_default())?
                        .unwrap_or(AgentConfiguration {
                            id: None,
                            business_id: business.id.unwrap_or_default(),
                            prompt: String::new(),
                        });
                    agent.prompt = text;
                    agent.save(&conn)?;
                    println!("  {} Agent instructions updated.", style("OK").green().bold());
                }
                None => {
                    let current = business.agent_prompt(&conn)?;
                    match format {
                        OutputFormat::Json => super::print_json(&json!({"prompt": current})),
                        OutputFormat::Text if current.trim().is_empty() => println!("(no instructions set)"),
                        OutputFormat::Text => println!("{current}"),
                    }
                }
            }
        }
        BusinessAction::Credentials { business, account_sid, auth_token, sms_number, voice_number, secret_key } => {
            let business = super::find_business(&conn, &business)?;
            let mut creds = business.credentials(&conn)?.unwrap_or(ApiCredential {
                business_id: business.id.unwrap_or_default(),
                ..ApiCredential::default()
            });
            let changing = account_sid.is_some()
                || auth_token.is_some()
                || sms_number.is_some()
                || voice_number.is_some()
                || secret_key.is_some();
            if let Some(v) = account_sid {
                creds.twilio_account_sid = Some(v);
            }
            if let Some(v) = auth_token {
                creds.twilio_auth_token = Some(v);
            }
            if let Some(v) = sms_number {
                creds.twilio_sms_number = Some(v);
            }
            if let Some(v) = voice_number {
                creds.voice_agent_number = Some(v);
            }
            if let Some(v) = secret_key {
                creds.secret_key = Some(v);
            }
            if changing {
                creds.save(&conn)?;
            }

            match format {
                OutputFormat::Json => super::print_json(&json!({
                    "credentials": creds,
                    "can_send_sms": creds.can_send_sms(),
                })),
                OutputFormat::Text => {
                    if changing {
                        println!("  {} Credentials saved.", style("OK").green().bold());
                    }
                    println!("  Account SID:   {}", super::opt(&creds.twilio_account_sid));
                    println!(
                        "  Auth token:    {}",
                        if creds.twilio_auth_token.is_some() { "(set)" } else { "-" }
                    );
                    println!("  SMS number:    {}", super::opt(&creds.twilio_sms_number));
                    println!("  Voice number:  {}", super::opt(&creds.voice_agent_number));
                    println!(
                        "  SMS ready:     {}",
                        if creds.can_send_sms() {
                            style("yes").green()
                        } else {
                            style("no").yellow()
                        }
                    );
                }
            }
        }
    }

    Ok(())
}
