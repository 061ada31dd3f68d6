use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::{uuid::Uuid, Json};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::localization::LocalizedMessage;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PushDevice {
    pub wallet: String,
    #[sqlx(rename = "fcm_token")]
    pub push_token: String,
    pub platform: Option<String>,
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserPreferences {
    pub wallet: String,
    pub push_daily_missions_enabled: bool,
    pub push_reminders_enabled: bool,
    pub push_events_enabled: bool,
    pub push_daily_packs_enabled: bool,
    pub push_extra1_enabled: bool,
    pub push_extra2_enabled: bool,
    pub timezone: String,
    pub language: String,
}

impl UserPreferences {
    pub fn is_enabled(&self, key: PreferenceKey) -> bool {
        match key {
            PreferenceKey::DailyMissions => self.push_daily_missions_enabled,
            PreferenceKey::Reminders => self.push_reminders_enabled,
            PreferenceKey::Events => self.push_events_enabled,
            PreferenceKey::DailyPacks => self.push_daily_packs_enabled,
            PreferenceKey::Extra1 => self.push_extra1_enabled,
            PreferenceKey::Extra2 => self.push_extra2_enabled,
        }
    }
}

/// One boolean toggle column of `user_preferences`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PreferenceKey {
    DailyMissions,
    Reminders,
    Events,
    DailyPacks,
    Extra1,
    Extra2,
}

impl PreferenceKey {
    pub fn column(&self) -> &'static str {
        match self {
            PreferenceKey::DailyMissions => "push_daily_missions_enabled",
            PreferenceKey::Reminders => "push_reminders_enabled",
            PreferenceKey::Events => "push_events_enabled",
            PreferenceKey::DailyPacks => "push_daily_packs_enabled",
            PreferenceKey::Extra1 => "push_extra1_enabled",
            PreferenceKey::Extra2 => "push_extra2_enabled",
        }
    }

    pub fn from_column(column: &str) -> Option<Self> {
        [
            PreferenceKey::DailyMissions,
            PreferenceKey::Reminders,
            PreferenceKey::Events,
            PreferenceKey::DailyPacks,
            PreferenceKey::Extra1,
            PreferenceKey::Extra2,
        ]
        .into_iter()
        .find(|key| key.column() == column)
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CustomNotification {
    pub id: Uuid,
    /// Name of the preference column gating this notification.
    pub notification_type: String,
    pub scheduled_date: NaiveDate,
    /// `None` sends at any hour of the notification window.
    pub scheduled_hour: Option<i32>,
    /// Decoded per row by `message_map`, so one bad row cannot fail the query.
    pub messages: Json<serde_json::Value>,
    pub active: bool,
}

impl CustomNotification {
    /// `None` unless `messages` is an object of language to `{title, body}`.
    pub fn message_map(&self) -> Option<BTreeMap<String, LocalizedMessage>> {
        serde_json::from_value(self.messages.0.clone()).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationLog {
    pub id: Uuid,
    pub wallet: String,
    pub notification_type: String,
    pub reference_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    #[serde(default)]
    pub player: Option<String>,
    #[serde(default)]
    pub day: Option<u64>,
    #[serde(default)]
    pub mission_id: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyMissionsResponse {
    #[serde(default)]
    pub player: Option<String>,
    #[serde(default)]
    pub missions: Vec<Option<Mission>>,
}

impl DailyMissionsResponse {
    pub fn pending_count(&self) -> usize {
        self.missions
            .iter()
            .filter(|m| !m.as_ref().map(|m| m.completed).unwrap_or(false))
            .count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreePackResponse {
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub next_free_pack_timestamp: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub wallet: String,
    pub device_token: String,
    pub notification_type: String,
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
}
