use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use std::env;

use crate::time_window::{self, DailyReset, NotificationWindow};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub run_migrations: bool,

    // Starknet account
    pub rpc_url: String,
    pub account_address: String,
    pub private_key: String,
    pub explorer_tx_url: String,

    // Contract tasks
    pub daily_mission_contract_address: Option<String>,
    pub daily_mission_cron_schedule: String,
    pub cron1_contract_address: Option<String>,
    pub cron1_interval_minutes: u64,
    pub cron1_entrypoint: String,
    pub cron1_calldata: Vec<String>,

    // Notifications
    pub data_api_url: String,
    pub notification_window: NotificationWindow,
    pub daily_missions_notification_hour: u32,
    pub missions_reset: DailyReset,
    pub notifications_cron_schedule: String,
    pub free_packs_cron_schedule: String,
    pub custom_notifications_cron_schedule: String,
    pub enabled_tasks: Option<Vec<String>>,
    pub cron_timezone: Tz,

    pub apns_key_path: String,
    pub apns_key_id: String,
    pub apns_team_id: String,
    pub apns_topic: String,
    pub apns_production: bool,

    // HTTP trigger
    pub api_enabled: bool,
    pub api_bind_address: String,
    pub cron_trigger_user_agent: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} must be set", key))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or_default = |key: &str, default: &str| optional(key).unwrap_or_else(|| default.to_string());
        let flag = |key: &str| optional(key).map(|v| parse_bool(&v)).unwrap_or(false);
        let bounded = |key: &str, default: u32, max: u32| -> Result<u32> {
            match optional(key) {
                Some(value) => parse_hour(key, &value, max),
                None => Ok(default),
            }
        };
        let hour = |key: &str, default: u32| bounded(key, default, 23);

        // The window is half-open, so 24 lets sends run through 23:59.
        let notification_window = NotificationWindow::new(
            hour("NOTIFICATIONS_MIN_HOUR", 9)?,
            bounded("NOTIFICATIONS_MAX_HOUR", 20, 24)?,
        );
        if notification_window.min_hour >= notification_window.max_hour {
            bail!(
                "NOTIFICATIONS_MIN_HOUR ({}) must be lower than NOTIFICATIONS_MAX_HOUR ({})",
                notification_window.min_hour,
                notification_window.max_hour
            );
        }

        let reset_timezone = or_default("MISSIONS_RESET_TIMEZONE", "America/Argentina/Buenos_Aires");
        let reset_timezone: Tz = time_window::parse_timezone(&reset_timezone)
            .ok_or_else(|| anyhow!("MISSIONS_RESET_TIMEZONE is not a valid IANA timezone: {}", reset_timezone))?;

        let cron_timezone = or_default("CRON_TIMEZONE", "UTC");
        let cron_timezone: Tz = time_window::parse_timezone(&cron_timezone)
            .ok_or_else(|| anyhow!("CRON_TIMEZONE is not a valid IANA timezone: {}", cron_timezone))?;

        let cron1_interval_minutes = match optional("CRON1_INTERVAL_MINUTES") {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|minutes| *minutes > 0)
                .with_context(|| format!("CRON1_INTERVAL_MINUTES must be a positive integer, got {}", value))?,
            None => 5,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            run_migrations: flag("RUN_MIGRATIONS"),

            rpc_url: required("RPC_URL")?,
            account_address: required("ADDRESS")?,
            private_key: required("PRIVATE_KEY")?,
            explorer_tx_url: or_default("EXPLORER_TX_URL", "https://starkscan.co/tx/"),

            daily_mission_contract_address: optional("DAILY_MISSION_CONTRACT_ADDRESS"),
            daily_mission_cron_schedule: or_default("DAILY_MISSION_CRON_SCHEDULE", "1 0 * * *"),
            cron1_contract_address: optional("CRON1_CONTRACT_ADDRESS"),
            cron1_interval_minutes,
            cron1_entrypoint: or_default("CRON1_ENTRYPOINT", "increase_balance"),
            cron1_calldata: parse_list(&or_default("CRON1_CALLDATA", "5")),

            data_api_url: required("DATA_API_URL")?,
            notification_window,
            daily_missions_notification_hour: hour("DAILY_MISSIONS_NOTIFICATION_HOUR", 20)?,
            missions_reset: DailyReset::new(reset_timezone, hour("MISSIONS_RESET_HOUR", 3)?),
            notifications_cron_schedule: or_default("NOTIFICATIONS_CRON_SCHEDULE", "0 * * * *"),
            free_packs_cron_schedule: or_default("FREE_PACKS_CRON_SCHEDULE", "*/15 * * * *"),
            custom_notifications_cron_schedule: or_default("CUSTOM_NOTIFICATIONS_CRON_SCHEDULE", "* * * * *"),
            enabled_tasks: optional("ENABLED_TASKS").map(|v| parse_list(&v)),
            cron_timezone,

            apns_key_path: required("APNS_KEY_PATH")?,
            apns_key_id: required("APNS_KEY_ID")?,
            apns_team_id: required("APNS_TEAM_ID")?,
            apns_topic: required("APNS_TOPIC")?,
            apns_production: flag("APNS_PRODUCTION"),

            api_enabled: flag("API_ENABLED"),
            api_bind_address: or_default("API_BIND_ADDRESS", "0.0.0.0:8080"),
            cron_trigger_user_agent: or_default("CRON_TRIGGER_USER_AGENT", "vercel-cron/1.0"),
        })
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_hour(key: &str, value: &str, max: u32) -> Result<u32> {
    value
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|hour| *hour <= max)
        .with_context(|| format!("{} must be an hour between 0 and {}, got {}", key, max, value))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
