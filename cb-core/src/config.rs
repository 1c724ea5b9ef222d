//! Application configuration management.
//!
//! Handles loading, saving, and accessing application configuration including
//! the database location, LLM endpoint, messaging provider, scheduling rules,
//! and reminder windows. Configuration is persisted as TOML on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{CbError, CbResult};
use crate::paths;

/// Environment variable consulted when `llm.api_key` is empty.
pub const LLM_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Language model endpoint used by the booking agent.
    #[serde(default)]
    pub llm: LlmConfig,

    /// SMS / voice provider settings.
    #[serde(default)]
    pub sms: SmsConfig,

    /// Outbound webhook settings.
    #[serde(default)]
    pub webhooks: WebhookConfig,

    /// Slot and availability search settings.
    #[serde(default)]
    pub scheduling: SchedulingConfig,

    /// Reminder sweep windows.
    #[serde(default)]
    pub reminders: ReminderConfig,

    /// Public-facing application settings.
    #[serde(default)]
    pub app: PublicConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file. If empty, uses default location.
    #[serde(default)]
    pub path: String,

    /// Enable WAL (Write-Ahead Logging) mode. Always recommended.
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Run integrity check on startup.
    #[serde(default = "default_true")]
    pub integrity_check_on_startup: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

/// Chat-completions endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,

    /// Bearer token. Empty means read `OPENAI_API_KEY`.
    #[serde(default)]
    pub api_key: String,

    /// Model name sent with every request.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature for conversation turns.
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,

    /// Token cap for conversation turns.
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature for summary extraction.
    #[serde(default = "default_summary_temperature")]
    pub summary_temperature: f32,

    /// Token cap for summary extraction.
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,

    /// Request timeout in milliseconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_ms: u64,

    /// Persona name used in prompts.
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
}

/// SMS / voice provider configuration.
///
/// Account credentials are stored per business in the database; this only
/// holds transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    /// Base URL of the Twilio-compatible REST API.
    #[serde(default = "default_sms_api_base")]
    pub api_base: String,

    /// Request timeout in milliseconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_ms: u64,

    /// Place a voice call when an SMS cannot be delivered.
    #[serde(default = "default_true")]
    pub call_fallback: bool,

    /// TwiML URL announced on fallback calls.
    #[serde(default)]
    pub call_twiml_url: String,
}

/// Outbound webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// URL receiving new-booking payloads. Empty disables the webhook.
    #[serde(default)]
    pub booking_url: String,

    /// Request timeout in milliseconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_ms: u64,
}

/// Availability search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Length of one booking slot in minutes.
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,

    /// Maximum number of alternate slots suggested.
    #[serde(default = "default_max_alternates")]
    pub max_alternates: usize,

    /// Hourly tries on the requested day before scanning later days.
    #[serde(default = "default_same_day_attempts")]
    pub same_day_attempts: u32,

    /// Days scanned after the requested day.
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: u32,

    /// Timezone assumed for businesses without one.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

/// Reminder sweep windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Minutes after booking creation before an unpaid booking is reminded.
    #[serde(default = "default_payment_reminder_after")]
    pub payment_reminder_after_minutes: i64,

    /// Minutes after booking creation before a reminded, unpaid booking is released.
    #[serde(default = "default_release_unpaid_after")]
    pub release_unpaid_after_minutes: i64,

    /// Hours ahead of an appointment to send the appointment reminder.
    #[serde(default = "default_appointment_reminder_hours")]
    pub appointment_reminder_hours: i64,

    /// Minutes ahead of an appointment when the final reminder window opens.
    /// The window stays open for one hour.
    #[serde(default = "default_final_reminder_minutes")]
    pub final_reminder_minutes: i64,
}

/// Public-facing application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicConfig {
    /// Base URL used to build customer-facing links.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

// Default value functions for serde

fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_llm_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o".to_string()
}

fn default_llm_temperature() -> f32 {
    0.5
}

fn default_llm_max_tokens() -> u32 {
    1024
}

fn default_summary_temperature() -> f32 {
    0.1
}

fn default_summary_max_tokens() -> u32 {
    1000
}

fn default_llm_timeout() -> u64 {
    60_000
}

fn default_agent_name() -> String {
    "Sarah".to_string()
}

fn default_sms_api_base() -> String {
    "https://api.twilio.com/2010-04-01".to_string()
}

fn default_http_timeout() -> u64 {
    15_000
}

fn default_slot_minutes() -> u32 {
    60
}

fn default_max_alternates() -> usize {
    3
}

fn default_same_day_attempts() -> u32 {
    10
}

fn default_lookahead_days() -> u32 {
    7
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_payment_reminder_after() -> i64 {
    120
}

fn default_release_unpaid_after() -> i64 {
    180
}

fn default_appointment_reminder_hours() -> i64 {
    24
}

fn default_final_reminder_minutes() -> i64 {
    60
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            wal_mode: true,
            pool_size: default_pool_size(),
            integrity_check_on_startup: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_llm_api_base(),
            api_key: String::new(),
            model: default_llm_model(),
            temperature: default_llm_temperature(),
            max_tokens: default_llm_max_tokens(),
            summary_temperature: default_summary_temperature(),
            summary_max_tokens: default_summary_max_tokens(),
            timeout_ms: default_llm_timeout(),
            agent_name: default_agent_name(),
        }
    }
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            api_base: default_sms_api_base(),
            timeout_ms: default_http_timeout(),
            call_fallback: true,
            call_twiml_url: String::new(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            booking_url: String::new(),
            timeout_ms: default_http_timeout(),
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            slot_minutes: default_slot_minutes(),
            max_alternates: default_max_alternates(),
            same_day_attempts: default_same_day_attempts(),
            lookahead_days: default_lookahead_days(),
            default_timezone: default_timezone(),
        }
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            payment_reminder_after_minutes: default_payment_reminder_after(),
            release_unpaid_after_minutes: default_release_unpaid_after(),
            appointment_reminder_hours: default_appointment_reminder_hours(),
            final_reminder_minutes: default_final_reminder_minutes(),
        }
    }
}

impl Default for PublicConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl LlmConfig {
    /// The API key from config, or from `OPENAI_API_KEY` when unset.
    pub fn effective_api_key(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var(LLM_API_KEY_ENV).ok().filter(|k| !k.is_empty())
    }
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> CbResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> CbResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default config file path.
    pub fn save_default(&self) -> CbResult<()> {
        let path = Self::default_config_path()?;
        self.save_to_file(&path)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> CbResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| CbError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> CbResult<PathBuf> {
        let config_dir = paths::config_dir()?;
        Ok(config_dir.join("config.toml"))
    }

    /// Get the effective database path, using the configured path or the default.
    pub fn effective_db_path(&self) -> CbResult<PathBuf> {
        if self.database.path.is_empty() {
            let data_dir = paths::data_dir()?;
            Ok(data_dir.join("cleanbiz.db"))
        } else {
            Ok(PathBuf::from(&self.database.path))
        }
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> CbResult<PathBuf> {
        if self.logging.directory.is_empty() {
            let data_dir = paths::data_dir()?;
            Ok(data_dir.join("logs"))
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Reject values that would make the scheduler or sweeps misbehave.
    pub fn validate(&self) -> CbResult<()> {
        if self.scheduling.slot_minutes == 0 {
            return Err(CbError::Config("scheduling.slot_minutes must be positive".into()));
        }
        if self.reminders.release_unpaid_after_minutes < self.reminders.payment_reminder_after_minutes {
            return Err(CbError::Config(
                "reminders.release_unpaid_after_minutes must not be shorter than the reminder window".into(),
            ));
        }
        if self.reminders.final_reminder_minutes < 0 {
            return Err(CbError::Config("reminders.final_reminder_minutes must not be negative".into()));
        }
        Ok(())
    }

    /// Whether a language model endpoint can be called.
    pub fn is_llm_configured(&self) -> bool {
        !self.llm.api_base.is_empty() && self.llm.effective_api_key().is_some()
    }
}

/// Thread-safe configuration holder for shared access across services.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
}

impl ConfigHandle {
    /// Create a new configuration handle.
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Read the configuration.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.inner.read().await
    }

    /// Write/update the configuration.
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AppConfig> {
        self.inner.write().await
    }

    /// Clone the current configuration out of the lock.
    pub async fn snapshot(&self) -> AppConfig {
        self.inner.read().await.clone()
    }

    /// Save the current configuration to disk.
    pub async fn save(&self) -> CbResult<()> {
        let config = self.inner.read().await;
        config.save_default()
    }
}
