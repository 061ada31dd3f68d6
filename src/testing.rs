//! In-memory stand-ins for the database, push gateway, data API and chain.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::{
    chain::{ContractCall, ContractInvoker},
    db::UserDirectory,
    game_state::GameStateSource,
    ledger::{LedgerKey, NotificationLedger},
    models::{
        CustomNotification, DailyMissionsResponse, FreePackResponse, Mission, NotificationLog,
        NotificationPayload, PushDevice, UserPreferences,
    },
    push::PushGateway,
};

pub fn preferences(wallet: &str, timezone: &str, language: &str) -> UserPreferences {
    UserPreferences {
        wallet: wallet.to_string(),
        push_daily_missions_enabled: true,
        push_reminders_enabled: true,
        push_events_enabled: true,
        push_daily_packs_enabled: true,
        push_extra1_enabled: false,
        push_extra2_enabled: false,
        timezone: timezone.to_string(),
        language: language.to_string(),
    }
}

pub fn device(wallet: &str, token: &str) -> PushDevice {
    PushDevice {
        wallet: wallet.to_string(),
        push_token: token.to_string(),
        platform: Some("ios".to_string()),
        disabled: false,
    }
}

#[derive(Default)]
pub struct MemoryDirectory {
    pub devices: Vec<PushDevice>,
    pub preferences: HashMap<String, UserPreferences>,
    pub custom_notifications: Vec<CustomNotification>,
    pub fail_devices: bool,
    pub preference_lookups: AtomicUsize,
}

impl MemoryDirectory {
    pub fn with_user(mut self, prefs: UserPreferences, tokens: &[&str]) -> Self {
        for token in tokens {
            self.devices.push(device(&prefs.wallet, token));
        }
        self.preferences.insert(prefs.wallet.clone(), prefs);
        self
    }
}

impl UserDirectory for MemoryDirectory {
    async fn enabled_devices(&self) -> Result<Vec<PushDevice>> {
        if self.fail_devices {
            return Err(anyhow!("connection refused"));
        }
        Ok(self.devices.iter().filter(|d| !d.disabled).cloned().collect())
    }

    async fn user_preferences(&self, wallet: &str) -> Result<Option<UserPreferences>> {
        self.preference_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.preferences.get(wallet).cloned())
    }

    async fn active_custom_notifications(&self) -> Result<Vec<CustomNotification>> {
        Ok(self
            .custom_notifications
            .iter()
            .filter(|n| n.active)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<NotificationLog>>,
    fail_reads: bool,
    fail_writes: bool,
}

impl MemoryLedger {
    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn insert_at(&self, key: &LedgerKey, sent_at: DateTime<Utc>) {
        self.entries.lock().unwrap().push(NotificationLog {
            id: uuid::Uuid::new_v4(),
            wallet: key.wallet.clone(),
            notification_type: key.notification_type.clone(),
            reference_id: key.reference_id.clone(),
            sent_at,
        });
    }

    pub fn keys(&self) -> Vec<LedgerKey> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| LedgerKey::new(e.wallet.as_str(), e.notification_type.as_str(), e.reference_id.clone()))
            .collect()
    }
}

impl NotificationLedger for MemoryLedger {
    async fn has_been_notified(&self, key: &LedgerKey, since: Option<DateTime<Utc>>) -> Result<bool> {
        if self.fail_reads {
            return Err(anyhow!("notification_logs unavailable"));
        }
        let entries = self.entries.lock().unwrap();
        Ok(entries.iter().any(|e| {
            e.wallet == key.wallet
                && e.notification_type == key.notification_type
                && key
                    .reference_id
                    .as_ref()
                    .map(|r| e.reference_id.as_ref() == Some(r))
                    .unwrap_or(true)
                && since.map(|s| e.sent_at >= s).unwrap_or(true)
        }))
    }

    async fn record_notified(&self, key: &LedgerKey) -> Result<()> {
        if self.fail_writes {
            return Err(anyhow!("insert rejected"));
        }
        self.insert_at(key, Utc::now());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPush {
    sent: Mutex<Vec<NotificationPayload>>,
    rejected_tokens: HashSet<String>,
}

impl RecordingPush {
    pub fn rejecting(tokens: &[&str]) -> Self {
        Self {
            rejected_tokens: tokens.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<NotificationPayload> {
        self.sent.lock().unwrap().clone()
    }
}

impl PushGateway for RecordingPush {
    async fn send(&self, payload: &NotificationPayload) -> bool {
        if self.rejected_tokens.contains(&payload.device_token) {
            return false;
        }
        self.sent.lock().unwrap().push(payload.clone());
        true
    }
}

#[derive(Default)]
pub struct StaticGameState {
    missions: HashMap<String, DailyMissionsResponse>,
    packs: HashMap<String, FreePackResponse>,
    calls: AtomicUsize,
}

impl StaticGameState {
    pub fn with_missions(mut self, wallet: &str, completed: &[bool]) -> Self {
        let missions = completed
            .iter()
            .map(|done| {
                Some(Mission {
                    player: Some(wallet.to_string()),
                    day: Some(1),
                    mission_id: None,
                    completed: *done,
                })
            })
            .collect();
        self.missions.insert(
            wallet.to_string(),
            DailyMissionsResponse {
                player: Some(wallet.to_string()),
                missions,
            },
        );
        self
    }

    pub fn with_pack(mut self, wallet: &str, timestamp: Option<i64>) -> Self {
        self.packs.insert(
            wallet.to_string(),
            FreePackResponse {
                recipient: Some(wallet.to_string()),
                next_free_pack_timestamp: timestamp,
            },
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GameStateSource for StaticGameState {
    async fn daily_missions(&self, wallet: &str) -> Result<DailyMissionsResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.missions
            .get(wallet)
            .cloned()
            .ok_or_else(|| anyhow!("data API unavailable for {}", wallet))
    }

    async fn next_free_pack(&self, wallet: &str) -> Result<FreePackResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.packs
            .get(wallet)
            .cloned()
            .ok_or_else(|| anyhow!("data API unavailable for {}", wallet))
    }
}

#[derive(Default)]
pub struct RecordingInvoker {
    pub calls: Mutex<Vec<ContractCall>>,
    pub fail: bool,
}

impl ContractInvoker for RecordingInvoker {
    async fn execute(&self, call: &ContractCall) -> Result<String> {
        if self.fail {
            return Err(anyhow!("nonce too low"));
        }
        let mut calls = self.calls.lock().unwrap();
        calls.push(call.clone());
        Ok(format!("0x{:x}", calls.len()))
    }
}
