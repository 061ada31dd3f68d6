use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::fmt;
use tracing::{debug, warn};

use crate::{
    game_state::GameStateSource,
    ledger::{LedgerKey, NotificationLedger},
    localization::{self, MessageTable, MessageVars},
    models::{CustomNotification, DailyMissionsResponse, FreePackResponse, PreferenceKey, UserPreferences},
    time_window::{self, DailyReset, NotificationWindow},
};

pub const MISSIONS_REMINDER: &str = "missions_reminder";
pub const FREE_PACKS: &str = "free_packs";
pub const CUSTOM_NOTIFICATION: &str = "custom_notification";

/// When a kind may fire, in the user's local clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Any hour inside the configured notification window.
    Window,
    /// Exactly this local hour.
    AtHour(u32),
    /// This local date; at `hour` if given, otherwise inside the window.
    OnDate { date: NaiveDate, hour: Option<u32> },
}

/// Remote state that must hold before a derived-state kind fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessRule {
    /// At least one of today's missions is still incomplete.
    MissionsPending { reset: DailyReset },
    /// A free pack timestamp exists, is non-zero and has passed.
    FreePackAvailable,
}

/// How the ledger reference id is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Reference id produced by the readiness rule.
    Instance,
    /// Fixed reference id.
    Reference(String),
    /// No reference id; one send per local day.
    LocalDay,
}

/// Everything that distinguishes one notification kind from another.
#[derive(Debug, Clone)]
pub struct NotificationKind {
    pub tag: String,
    pub preference: PreferenceKey,
    pub schedule: Schedule,
    pub readiness: Option<ReadinessRule>,
    pub dedup: DedupPolicy,
    pub messages: MessageTable,
}

impl NotificationKind {
    pub fn missions_reminder(hour: u32, reset: DailyReset) -> Self {
        Self {
            tag: MISSIONS_REMINDER.to_string(),
            preference: PreferenceKey::Reminders,
            schedule: Schedule::AtHour(hour),
            readiness: Some(ReadinessRule::MissionsPending { reset }),
            dedup: DedupPolicy::LocalDay,
            messages: localization::missions_reminder_messages(),
        }
    }

    pub fn free_packs() -> Self {
        Self {
            tag: FREE_PACKS.to_string(),
            preference: PreferenceKey::DailyPacks,
            schedule: Schedule::Window,
            readiness: Some(ReadinessRule::FreePackAvailable),
            dedup: DedupPolicy::Instance,
            messages: localization::free_packs_messages(),
        }
    }

    /// `None` when the row names an unknown preference column, an
    /// impossible hour or a `messages` value that is not a language map.
    pub fn custom(notification: &CustomNotification) -> Option<Self> {
        let preference = PreferenceKey::from_column(&notification.notification_type)?;
        let hour = match notification.scheduled_hour {
            Some(hour) => Some(u32::try_from(hour).ok().filter(|hour| *hour < 24)?),
            None => None,
        };
        let messages = notification.message_map()?;

        Some(Self {
            tag: CUSTOM_NOTIFICATION.to_string(),
            preference,
            schedule: Schedule::OnDate {
                date: notification.scheduled_date,
                hour,
            },
            readiness: None,
            dedup: DedupPolicy::Reference(notification.id.to_string()),
            messages: MessageTable::from_map(messages),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipReason {
    NoPreferences,
    Disabled,
    OutsideHours,
    WrongDate,
    NotReady,
    AlreadySent,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoPreferences => "no_preferences",
            SkipReason::Disabled => "disabled",
            SkipReason::OutsideHours => "outside_hours",
            SkipReason::WrongDate => "wrong_date",
            SkipReason::NotReady => "not_ready",
            SkipReason::AlreadySent => "already_sent",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub key: LedgerKey,
    pub language: String,
    pub vars: MessageVars,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Admit(Admission),
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready {
        reference_id: Option<String>,
        vars: MessageVars,
    },
    NotReady,
}

pub fn missions_readiness(
    missions: &DailyMissionsResponse,
    reset: &DailyReset,
    now: DateTime<Utc>,
) -> Readiness {
    let pending = missions.pending_count();
    if pending == 0 {
        return Readiness::NotReady;
    }

    Readiness::Ready {
        reference_id: None,
        vars: MessageVars::new()
            .with("pending", pending)
            .with("hours", reset.hours_until_at(now)),
    }
}

pub fn free_pack_readiness(pack: &FreePackResponse, now: DateTime<Utc>) -> Readiness {
    match pack.next_free_pack_timestamp {
        Some(timestamp) if timestamp != 0 => {
            if timestamp.saturating_mul(1000) > now.timestamp_millis() {
                Readiness::NotReady
            } else {
                Readiness::Ready {
                    reference_id: Some(timestamp.to_string()),
                    vars: MessageVars::new(),
                }
            }
        }
        _ => Readiness::NotReady,
    }
}

/// Shared inputs of one evaluation. Holds no state between users.
pub struct EligibilityContext<'a, G, L> {
    pub window: NotificationWindow,
    pub now: DateTime<Utc>,
    pub game_state: &'a G,
    pub ledger: &'a L,
}

impl<'a, G, L> EligibilityContext<'a, G, L>
where
    G: GameStateSource + Sync,
    L: NotificationLedger + Sync,
{
    /// Runs the checks in order and stops at the first failure. Remote
    /// fetches only happen for users who passed every local check.
    pub async fn evaluate(
        &self,
        kind: &NotificationKind,
        wallet: &str,
        preferences: Option<&UserPreferences>,
    ) -> Result<Eligibility> {
        let Some(preferences) = preferences else {
            return Ok(Eligibility::Skip(SkipReason::NoPreferences));
        };

        if !preferences.is_enabled(kind.preference) {
            return Ok(Eligibility::Skip(SkipReason::Disabled));
        }

        let hour = time_window::local_hour_at(&preferences.timezone, self.now);
        let hour_matches = match &kind.schedule {
            Schedule::AtHour(target) | Schedule::OnDate { hour: Some(target), .. } => {
                hour == Some(*target)
            }
            Schedule::Window | Schedule::OnDate { hour: None, .. } => self.window.admits(hour),
        };
        if !hour_matches {
            return Ok(Eligibility::Skip(SkipReason::OutsideHours));
        }

        if let Schedule::OnDate { date, .. } = &kind.schedule {
            if time_window::local_date_at(&preferences.timezone, self.now) != Some(*date) {
                return Ok(Eligibility::Skip(SkipReason::WrongDate));
            }
        }

        let (instance_reference, vars) = match &kind.readiness {
            Some(rule) => match self.check_readiness(rule, wallet).await? {
                Readiness::Ready { reference_id, vars } => (reference_id, vars),
                Readiness::NotReady => return Ok(Eligibility::Skip(SkipReason::NotReady)),
            },
            None => (None, MessageVars::new()),
        };

        let (reference_id, since) = match &kind.dedup {
            DedupPolicy::Instance => (instance_reference, None),
            DedupPolicy::Reference(reference) => (Some(reference.clone()), None),
            DedupPolicy::LocalDay => (
                None,
                Some(
                    time_window::start_of_local_day(&preferences.timezone, self.now)
                        .unwrap_or(self.now - Duration::hours(24)),
                ),
            ),
        };

        let key = LedgerKey::new(wallet, kind.tag.as_str(), reference_id);
        match self.ledger.has_been_notified(&key, since).await {
            Ok(false) => {}
            Ok(true) => {
                debug!(key = %key, "Already notified");
                return Ok(Eligibility::Skip(SkipReason::AlreadySent));
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Notification log check failed, treating as sent");
                return Ok(Eligibility::Skip(SkipReason::AlreadySent));
            }
        }

        Ok(Eligibility::Admit(Admission {
            key,
            language: preferences.language.clone(),
            vars,
        }))
    }

    async fn check_readiness(&self, rule: &ReadinessRule, wallet: &str) -> Result<Readiness> {
        match rule {
            ReadinessRule::MissionsPending { reset } => {
                let missions = self.game_state.daily_missions(wallet).await?;
                Ok(missions_readiness(&missions, reset, self.now))
            }
            ReadinessRule::FreePackAvailable => {
                let pack = self.game_state.next_free_pack(wallet).await?;
                let readiness = free_pack_readiness(&pack, self.now);
                if readiness == Readiness::NotReady {
                    debug!(
                        wallet = %wallet,
                        timestamp = ?pack.next_free_pack_timestamp,
                        "No free pack available"
                    );
                }
                Ok(readiness)
            }
        }
    }
}
