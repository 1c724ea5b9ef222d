//! CleanBiz CLI - command-line interface for the cleaning-business backend.
//!
//! Manages businesses, cleaners, leads and bookings, quotes prices, runs the
//! booking agent against a chat, and runs the reminder sweeps.

mod commands;

use clap::{Parser, Subcommand};
use tracing::info;

use cb_core::config::{AppConfig, ConfigHandle};
use cb_core::error::CbResult;
use cb_core::logging;

/// CleanBiz - bookings, invoices and an SMS booking agent for cleaning companies.
#[derive(Parser)]
#[command(
    name = "cleanbiz",
    version,
    about = "CleanBiz cleaning-business backend CLI",
    long_about = "A command-line interface for the CleanBiz backend.\n\
                   Price cleanings, match cleaners to slots, take bookings and payments,\n\
                   and talk to the booking agent from the terminal."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and configure businesses.
    Business {
        #[command(subcommand)]
        action: commands::business::BusinessAction,
    },
    /// Manage cleaners and their weekly availability.
    Cleaner {
        #[command(subcommand)]
        action: commands::cleaner::CleanerAction,
    },
    /// Capture and follow up leads.
    Lead {
        #[command(subcommand)]
        action: commands::lead::LeadAction,
    },
    /// Price a cleaning without booking it.
    Quote(commands::quote::QuoteArgs),
    /// Check whether a time can be booked.
    Availability {
        #[command(subcommand)]
        action: commands::availability::AvailabilityAction,
    },
    /// Create and manage bookings.
    Booking {
        #[command(subcommand)]
        action: commands::booking::BookingAction,
    },
    /// Invoices, payments and tips.
    Invoice {
        #[command(subcommand)]
        action: commands::invoice::InvoiceAction,
    },
    /// Discount coupons.
    Coupon {
        #[command(subcommand)]
        action: commands::coupon::CouponAction,
    },
    /// Talk to the booking agent and manage chats.
    Chat {
        #[command(subcommand)]
        action: commands::chat::ChatAction,
    },
    /// Run the payment-reminder, release and appointment-reminder sweeps.
    Sweep {
        /// Keep running, sweeping every N seconds.
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },
    /// Database management commands.
    Db {
        #[command(subcommand)]
        action: commands::db::DbAction,
    },
    /// Show configuration and service health.
    Status,
}

#[tokio::main]
async fn main() -> CbResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match cli.config.as_deref() {
        Some(path) => AppConfig::load_from_file(std::path::Path::new(path))?,
        None => AppConfig::load_default()?,
    };

    // Initialize logging
    let log_level = if cli.verbose { "debug".to_string() } else { config.logging.level.clone() };
    let log_dir = config
        .effective_log_dir()
        .unwrap_or_else(|_| std::path::PathBuf::from("logs"));
    let _guard = logging::init_logging(&log_level, &log_dir, config.logging.json_output)?;

    let config_handle = ConfigHandle::new(config);

    info!("CleanBiz CLI v{}", cb_core::constants::APP_VERSION);

    // Dispatch to command handlers
    match cli.command {
        Commands::Business { action } => commands::business::run(config_handle, action, cli.format).await,
        Commands::Cleaner { action } => commands::cleaner::run(config_handle, action, cli.format).await,
        Commands::Lead { action } => commands::lead::run(config_handle, action, cli.format).await,
        Commands::Quote(args) => commands::quote::run(config_handle, args, cli.format).await,
        Commands::Availability { action } => {
            commands::availability::run(config_handle, action, cli.format).await
        }
        Commands::Booking { action } => commands::booking::run(config_handle, action, cli.format).await,
        Commands::Invoice { action } => commands::invoice::run(config_handle, action, cli.format).await,
        Commands::Coupon { action } => commands::coupon::run(config_handle, action, cli.format).await,
        Commands::Chat { action } => commands::chat::run(config_handle, action, cli.format).await,
        Commands::Sweep { watch } => commands::sweep::run(config_handle, watch, cli.format).await,
        Commands::Db { action } => commands::db::run(config_handle, action, cli.format).await,
        Commands::Status => commands::status::run(config_handle, cli.format).await,
    }
}
