use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info};

use crate::{
    db::UserDirectory,
    eligibility::{Admission, Eligibility, EligibilityContext, NotificationKind, SkipReason},
    game_state::GameStateSource,
    ledger::NotificationLedger,
    metrics,
    models::{NotificationPayload, PushDevice, UserPreferences},
    push::PushGateway,
    time_window::NotificationWindow,
};

/// What happened to one user for one notification kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Sent { devices: usize },
    Skipped(SkipReason),
    DeliveryFailed,
}

/// Counters for one pass of one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub task: String,
    pub users: usize,
    pub notified: usize,
    pub devices_notified: usize,
    pub delivery_failed: usize,
    pub errors: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
}

impl PassReport {
    pub fn new(task: &str) -> Self {
        Self {
            task: task.to_string(),
            ..Self::default()
        }
    }

    pub fn skipped(&self, reason: SkipReason) -> usize {
        self.skipped.get(&reason).copied().unwrap_or(0)
    }

    fn record(&mut self, notification_type: &str, outcome: Outcome) {
        match outcome {
            Outcome::Sent { devices } => {
                self.notified += 1;
                self.devices_notified += devices;
                metrics::NOTIFICATIONS_SENT
                    .with_label_values(&[notification_type])
                    .inc();
            }
            Outcome::Skipped(reason) => {
                *self.skipped.entry(reason).or_insert(0) += 1;
                metrics::NOTIFICATIONS_SKIPPED
                    .with_label_values(&[notification_type, reason.as_str()])
                    .inc();
            }
            Outcome::DeliveryFailed => {
                self.delivery_failed += 1;
                metrics::DELIVERY_FAILURES
                    .with_label_values(&[notification_type])
                    .inc();
            }
        }
    }

    fn record_error(&mut self, notification_type: &str) {
        self.errors += 1;
        metrics::USER_ERRORS
            .with_label_values(&[notification_type])
            .inc();
    }

    fn log(&self) {
        info!(
            task = %self.task,
            users = self.users,
            notified = self.notified,
            devices = self.devices_notified,
            no_preferences = self.skipped(SkipReason::NoPreferences),
            disabled = self.skipped(SkipReason::Disabled),
            outside_hours = self.skipped(SkipReason::OutsideHours),
            wrong_date = self.skipped(SkipReason::WrongDate),
            not_ready = self.skipped(SkipReason::NotReady),
            already_sent = self.skipped(SkipReason::AlreadySent),
            delivery_failed = self.delivery_failed,
            errors = self.errors,
            "Notification pass finished"
        );
    }
}

/// Devices grouped per wallet, in first-seen order.
fn group_by_wallet(devices: Vec<PushDevice>) -> Vec<(String, Vec<PushDevice>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut users: Vec<(String, Vec<PushDevice>)> = Vec::new();

    for device in devices {
        match index.get(&device.wallet) {
            Some(&i) => users[i].1.push(device),
            None => {
                index.insert(device.wallet.clone(), users.len());
                users.push((device.wallet.clone(), vec![device]));
            }
        }
    }

    users
}

pub struct Notifier<D, L, P, G> {
    directory: D,
    ledger: L,
    push: P,
    game_state: G,
    window: NotificationWindow,
    missions_reminder: NotificationKind,
    free_packs: NotificationKind,
}

impl<D, L, P, G> Notifier<D, L, P, G>
where
    D: UserDirectory + Sync,
    L: NotificationLedger + Sync,
    P: PushGateway + Sync,
    G: GameStateSource + Sync,
{
    pub fn new(
        directory: D,
        ledger: L,
        push: P,
        game_state: G,
        window: NotificationWindow,
        missions_reminder: NotificationKind,
    ) -> Self {
        Self {
            directory,
            ledger,
            push,
            game_state,
            window,
            missions_reminder,
            free_packs: NotificationKind::free_packs(),
        }
    }

    pub async fn missions_reminder_pass(&self, now: DateTime<Utc>) -> Result<PassReport> {
        self.run_pass("missions-reminder", std::slice::from_ref(&self.missions_reminder), now)
            .await
    }

    pub async fn free_packs_pass(&self, now: DateTime<Utc>) -> Result<PassReport> {
        self.run_pass("free-packs", std::slice::from_ref(&self.free_packs), now)
            .await
    }

    pub async fn custom_notifications_pass(&self, now: DateTime<Utc>) -> Result<PassReport> {
        let notifications = self.directory.active_custom_notifications().await?;
        if notifications.is_empty() {
            info!("No active custom notifications");
            return Ok(PassReport::new("custom-notifications"));
        }
        info!(count = notifications.len(), "Active custom notifications");

        let kinds: Vec<NotificationKind> = notifications
            .iter()
            .filter_map(|notification| {
                let kind = NotificationKind::custom(notification);
                if kind.is_none() {
                    error!(
                        id = %notification.id,
                        notification_type = %notification.notification_type,
                        hour = ?notification.scheduled_hour,
                        "Ignoring malformed custom notification"
                    );
                }
                kind
            })
            .collect();

        self.run_pass("custom-notifications", &kinds, now).await
    }

    /// One sequential sweep over every enabled device for each kind. Failing
    /// to list devices aborts the pass; anything that goes wrong for a single
    /// user is logged and counted.
    pub async fn run_pass(
        &self,
        task: &str,
        kinds: &[NotificationKind],
        now: DateTime<Utc>,
    ) -> Result<PassReport> {
        let devices = self.directory.enabled_devices().await?;
        let users = group_by_wallet(devices);
        info!(task = %task, users = users.len(), "Enabled users loaded");

        let mut report = PassReport::new(task);
        report.users = users.len();

        let ctx = EligibilityContext {
            window: self.window,
            now,
            game_state: &self.game_state,
            ledger: &self.ledger,
        };
        let mut preferences: HashMap<String, Option<UserPreferences>> = HashMap::new();

        for kind in kinds {
            for (wallet, devices) in &users {
                match self
                    .process_user(&ctx, kind, wallet, devices, &mut preferences)
                    .await
                {
                    Ok(outcome) => {
                        debug!(
                            wallet = %wallet,
                            notification_type = %kind.tag,
                            outcome = ?outcome,
                            "Processed user"
                        );
                        report.record(&kind.tag, outcome);
                    }
                    Err(e) => {
                        error!(
                            wallet = %wallet,
                            notification_type = %kind.tag,
                            error = %e,
                            "Error processing user"
                        );
                        report.record_error(&kind.tag);
                    }
                }
            }
        }

        report.log();
        Ok(report)
    }

    async fn process_user(
        &self,
        ctx: &EligibilityContext<'_, G, L>,
        kind: &NotificationKind,
        wallet: &str,
        devices: &[PushDevice],
        preferences: &mut HashMap<String, Option<UserPreferences>>,
    ) -> Result<Outcome> {
        let user_preferences = match preferences.get(wallet) {
            Some(cached) => cached.clone(),
            None => {
                let fetched = self.directory.user_preferences(wallet).await?;
                preferences.insert(wallet.to_string(), fetched.clone());
                fetched
            }
        };

        match ctx.evaluate(kind, wallet, user_preferences.as_ref()).await? {
            Eligibility::Skip(reason) => Ok(Outcome::Skipped(reason)),
            Eligibility::Admit(admission) => Ok(self.deliver(kind, devices, admission).await),
        }
    }

    /// Pushes to every device of the user; one accepted delivery counts as
    /// notified and is written to the ledger.
    async fn deliver(
        &self,
        kind: &NotificationKind,
        devices: &[PushDevice],
        admission: Admission,
    ) -> Outcome {
        let message = kind
            .messages
            .resolve_with(&admission.language, &admission.vars);

        let mut delivered = 0;
        for device in devices {
            let payload = NotificationPayload {
                wallet: admission.key.wallet.clone(),
                device_token: device.push_token.clone(),
                notification_type: kind.tag.clone(),
                title: message.title.clone(),
                body: message.body.clone(),
                data: HashMap::from([("type".to_string(), kind.tag.clone())]),
            };
            if self.push.send(&payload).await {
                delivered += 1;
            }
        }

        if delivered == 0 {
            return Outcome::DeliveryFailed;
        }

        info!(
            wallet = %admission.key.wallet,
            notification_type = %kind.tag,
            language = %admission.language,
            devices = delivered,
            "Notification sent"
        );

        if let Err(e) = self.ledger.record_notified(&admission.key).await {
            error!(key = %admission.key, error = %e, "Failed to record sent notification");
        }

        Outcome::Sent { devices: delivered }
    }
}
