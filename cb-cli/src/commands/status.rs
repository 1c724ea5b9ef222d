//! Status command - configuration, database and service health.

use console::style;
use serde_json::json;

use cb_core::config::ConfigHandle;
use cb_core::constants::APP_VERSION;
use cb_core::error::CbResult;
use cb_services::{ServiceHealth, ServiceState};
use crate::OutputFormat;

fn state_label(health: &ServiceHealth) -> String {
    match health.state {
        ServiceState::Running if health.healthy => style("running").green().to_string(),
        ServiceState::Degraded => style("degraded").yellow().to_string(),
        ServiceState::Failed => style("failed").red().to_string(),
        other => other.to_string(),
    }
}

/// Run the status command.
pub async fn run(config: ConfigHandle, format: OutputFormat) -> CbResult<()> {
    let cfg = config.snapshot().await;
    let db_path = cfg.effective_db_path()?;
    let llm_ready = cfg.is_llm_configured();

    let registry = super::open_services(&config).await?;
    let health = registry.health_check().await;
    let stats = registry.database().stats()?;
    let file_size = std::fs::metadata(&db_path).ok().map(|m| m.len());

    match format {
        OutputFormat::Json => {
            let tables: serde_json::Map<String, serde_json::Value> =
                stats.tables.iter().map(|(name, n)| (name.to_string(), json!(n))).collect();
            super::print_json(&json!({
                "version": APP_VERSION,
                "database": {
                    "path": db_path.display().to_string(),
                    "file_size_bytes": file_size,
                    "tables": tables,
                },
                "llm": {
                    "configured": llm_ready,
                    "model": cfg.llm.model,
                    "api_base": cfg.llm.api_base,
                },
                "base_url": cfg.app.base_url,
                "webhook_enabled": !cfg.webhooks.booking_url.is_empty(),
                "services": health,
            }));
        }
        OutputFormat::Text => {
            println!("{} {}", style("cleanbiz").bold(), APP_VERSION);
            println!();
            println!("{}", style("Configuration").bold().underlined());
            println!("  Database:  {}", db_path.display());
            if let Some(size) = file_size {
                println!("  Size:      {}", super::format_bytes(size));
            }
            println!(
                "  LLM:       {}",
                if llm_ready {
                    format!("{} ({})", style("configured").green(), cfg.llm.model)
                } else {
                    style("not configured").yellow().to_string()
                }
            );
            println!("  Base URL:  {}", cfg.app.base_url);
            println!(
                "  Webhook:   {}",
                if cfg.webhooks.booking_url.is_empty() { "-" } else { cfg.webhooks.booking_url.as_str() }
            );
            println!();
            println!("{}", style("Data").bold().underlined());
            println!("  {stats}");
            println!();

            let mut table = super::new_table(vec!["Service", "State", "Note"]);
            for h in &health {
                table.add_row(vec![h.name.clone(), state_label(h), h.detail.clone().unwrap_or_default()]);
            }
            println!("{table}");
        }
    }

    registry.shutdown_all().await
}
