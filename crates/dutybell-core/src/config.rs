//! DutyBell configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DutyBellError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DutyBellConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub reminders: ReminderConfig,
}

impl DutyBellConfig {
    /// Load config from the default path (~/.dutybell/config.toml), then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific path. Env overrides are not applied.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DutyBellError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| DutyBellError::Config(format!("Failed to parse config: {e}")))
    }

    /// Overlay credentials from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Overlay credentials from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(channel) = get("TELEGRAM_CHANNEL_ID") {
            self.telegram.channel_id = Some(channel);
        }
        if let Some(secret) = get("CRON_SECRET") {
            self.gateway.cron_secret = Some(secret);
        }
        if let Some(token) = get("DUTYBELL_OPERATOR_TOKEN") {
            self.gateway.operator_token = Some(token);
        }
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the DutyBell home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dutybell")
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.dutybell/dutybell.db".into() }

impl DatabaseConfig {
    /// Database path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Shared secret for the scheduled trigger. `None` leaves it open.
    #[serde(default)]
    pub cron_secret: Option<String>,
    /// Token for operator endpoints (manual reminders, log listing). `None` leaves them open.
    #[serde(default)]
    pub operator_token: Option<String>,
}

fn default_port() -> u16 { 3000 }
fn default_host() -> String { "127.0.0.1".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            cron_secret: None,
            operator_token: None,
        }
    }
}

/// Telegram channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Destination chat or channel id.
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String { "https://api.telegram.org".into() }
fn default_timeout_secs() -> u64 { 10 }

impl TelegramConfig {
    /// Both credentials present and non-empty.
    pub fn is_configured(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        set(&self.bot_token) && set(&self.channel_id)
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            channel_id: None,
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// How a scheduled run renders its messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageMode {
    /// One message per obligation that is due a reminder.
    #[default]
    PerTask,
    /// One consolidated message covering every obligation due a reminder.
    Digest,
}

/// Reminder run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default)]
    pub mode: MessageMode,
    /// Upper bound on one run's wall-clock time.
    #[serde(default = "default_run_budget")]
    pub run_budget_secs: u64,
    /// Link appended to digest messages.
    #[serde(default)]
    pub dashboard_url: Option<String>,
    /// Optional 5-field cron expression for the in-process schedule.
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

fn default_run_budget() -> u64 { 120 }
fn default_check_interval() -> u64 { 30 }

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            mode: MessageMode::default(),
            run_budget_secs: default_run_budget(),
            dashboard_url: None,
            schedule: None,
            check_interval_secs: default_check_interval(),
        }
    }
}
