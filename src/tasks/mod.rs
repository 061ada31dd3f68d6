//! The catalog of scheduled tasks and the `ENABLED_TASKS` filter.

mod contract;

use chrono::Utc;
use futures::FutureExt;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    chain::{ContractCall, ContractInvoker},
    config::Config,
    db::UserDirectory,
    game_state::GameStateSource,
    ledger::NotificationLedger,
    notifier::Notifier,
    push::PushGateway,
    scheduler::{CronTask, TaskSchedule},
};

pub use contract::run_contract_task;

pub const GENERATE_MISSIONS: &str = "generate-missions";
pub const CONTRACT_HEARTBEAT: &str = "contract-heartbeat";
pub const MISSIONS_REMINDER: &str = "missions-reminder";
pub const FREE_PACKS: &str = "free-packs";
pub const CUSTOM_NOTIFICATIONS: &str = "custom-notifications";

pub const ALL_TASKS: [&str; 5] = [
    GENERATE_MISSIONS,
    CONTRACT_HEARTBEAT,
    MISSIONS_REMINDER,
    FREE_PACKS,
    CUSTOM_NOTIFICATIONS,
];

pub const GENERATE_MISSIONS_ENTRYPOINT: &str = "generate_daily_missions";

/// The heartbeat call the HTTP trigger also performs, if configured.
pub fn heartbeat_call(config: &Config) -> Option<ContractCall> {
    config.cron1_contract_address.as_deref().map(|address| {
        ContractCall::new(
            address,
            &config.cron1_entrypoint,
            config.cron1_calldata.clone(),
        )
    })
}

fn generate_missions_call(config: &Config) -> Option<ContractCall> {
    config
        .daily_mission_contract_address
        .as_deref()
        .map(|address| ContractCall::new(address, GENERATE_MISSIONS_ENTRYPOINT, Vec::new()))
}

fn is_enabled(config: &Config, name: &str) -> bool {
    match &config.enabled_tasks {
        Some(names) => names.iter().any(|n| n == name),
        None => true,
    }
}

fn contract_task<C>(
    name: &'static str,
    schedule: TaskSchedule,
    call: ContractCall,
    invoker: Arc<C>,
    explorer_base: String,
) -> CronTask
where
    C: ContractInvoker + Send + Sync + 'static,
{
    CronTask::new(name, schedule, move || {
        let invoker = invoker.clone();
        let call = call.clone();
        let explorer_base = explorer_base.clone();
        async move { run_contract_task(name, invoker.as_ref(), &call, &explorer_base).await }.boxed()
    })
}

/// Every task the configuration can run, narrowed by `ENABLED_TASKS`.
/// Contract tasks whose address is missing are left out.
pub fn build_catalog<D, L, P, G, C>(
    config: &Config,
    notifier: Arc<Notifier<D, L, P, G>>,
    invoker: Arc<C>,
) -> Vec<CronTask>
where
    D: UserDirectory + Send + Sync + 'static,
    L: NotificationLedger + Send + Sync + 'static,
    P: PushGateway + Send + Sync + 'static,
    G: GameStateSource + Send + Sync + 'static,
    C: ContractInvoker + Send + Sync + 'static,
{
    if let Some(names) = &config.enabled_tasks {
        for name in names {
            if !ALL_TASKS.contains(&name.as_str()) {
                warn!(task = %name, "Unknown task in ENABLED_TASKS");
            }
        }
    }

    let mut tasks = Vec::new();

    if is_enabled(config, GENERATE_MISSIONS) {
        match generate_missions_call(config) {
            Some(call) => tasks.push(contract_task(
                GENERATE_MISSIONS,
                TaskSchedule::Cron(config.daily_mission_cron_schedule.clone()),
                call,
                invoker.clone(),
                config.explorer_tx_url.clone(),
            )),
            None => info!(task = GENERATE_MISSIONS, "DAILY_MISSION_CONTRACT_ADDRESS not set, skipping"),
        }
    }

    if is_enabled(config, CONTRACT_HEARTBEAT) {
        match heartbeat_call(config) {
            Some(call) => tasks.push(contract_task(
                CONTRACT_HEARTBEAT,
                TaskSchedule::Every(Duration::from_secs(config.cron1_interval_minutes * 60)),
                call,
                invoker.clone(),
                config.explorer_tx_url.clone(),
            )),
            None => info!(task = CONTRACT_HEARTBEAT, "CRON1_CONTRACT_ADDRESS not set, skipping"),
        }
    }

    if is_enabled(config, MISSIONS_REMINDER) {
        let notifier = notifier.clone();
        tasks.push(CronTask::new(
            MISSIONS_REMINDER,
            TaskSchedule::Cron(config.notifications_cron_schedule.clone()),
            move || {
                let notifier = notifier.clone();
                async move { notifier.missions_reminder_pass(Utc::now()).await.map(|_| ()) }.boxed()
            },
        ));
    }

    if is_enabled(config, FREE_PACKS) {
        let notifier = notifier.clone();
        tasks.push(CronTask::new(
            FREE_PACKS,
            TaskSchedule::Cron(config.free_packs_cron_schedule.clone()),
            move || {
                let notifier = notifier.clone();
                async move { notifier.free_packs_pass(Utc::now()).await.map(|_| ()) }.boxed()
            },
        ));
    }

    if is_enabled(config, CUSTOM_NOTIFICATIONS) {
        tasks.push(CronTask::new(
            CUSTOM_NOTIFICATIONS,
            TaskSchedule::Cron(config.custom_notifications_cron_schedule.clone()),
            move || {
                let notifier = notifier.clone();
                async move { notifier.custom_notifications_pass(Utc::now()).await.map(|_| ()) }
                    .boxed()
            },
        ));
    }

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::NotificationKind;
    use crate::testing::{
        preferences, MemoryDirectory, MemoryLedger, RecordingInvoker, RecordingPush,
        StaticGameState,
    };
    use crate::time_window::NotificationWindow;

    type TestNotifier = Notifier<MemoryDirectory, MemoryLedger, RecordingPush, StaticGameState>;

    fn config(extra: &[(&'static str, &'static str)]) -> Config {
        let mut vars = std::collections::HashMap::from([
            ("DATABASE_URL", "postgres://localhost/game"),
            ("RPC_URL", "https://rpc.example"),
            ("ADDRESS", "0x123"),
            ("PRIVATE_KEY", "0x456"),
            ("DATA_API_URL", "https://api.example"),
            ("APNS_KEY_PATH", "/keys/AuthKey.p8"),
            ("APNS_KEY_ID", "KEYID"),
            ("APNS_TEAM_ID", "TEAMID"),
            ("APNS_TOPIC", "com.example.game"),
        ]);
        vars.extend(extra.iter().copied());
        Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
    }

    fn notifier(config: &Config, directory: MemoryDirectory) -> Arc<TestNotifier> {
        Arc::new(Notifier::new(
            directory,
            MemoryLedger::default(),
            RecordingPush::default(),
            StaticGameState::default(),
            NotificationWindow::default(),
            NotificationKind::missions_reminder(
                config.daily_missions_notification_hour,
                config.missions_reset,
            ),
        ))
    }

    fn names(tasks: &[CronTask]) -> Vec<&str> {
        tasks.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_contract_tasks_require_addresses() {
        let config = config(&[]);
        let tasks = build_catalog(
            &config,
            notifier(&config, MemoryDirectory::default()),
            Arc::new(RecordingInvoker::default()),
        );
        assert_eq!(
            names(&tasks),
            vec![MISSIONS_REMINDER, FREE_PACKS, CUSTOM_NOTIFICATIONS]
        );
    }

    #[test]
    fn test_full_catalog_and_schedules() {
        let config = config(&[
            ("DAILY_MISSION_CONTRACT_ADDRESS", "0xdaily"),
            ("CRON1_CONTRACT_ADDRESS", "0xcron"),
            ("CRON1_INTERVAL_MINUTES", "2"),
        ]);
        let tasks = build_catalog(
            &config,
            notifier(&config, MemoryDirectory::default()),
            Arc::new(RecordingInvoker::default()),
        );
        assert_eq!(names(&tasks), ALL_TASKS.to_vec());
        assert_eq!(tasks[0].schedule, TaskSchedule::Cron("1 0 * * *".to_string()));
        assert_eq!(tasks[1].schedule, TaskSchedule::Every(Duration::from_secs(120)));
        assert_eq!(tasks[3].schedule, TaskSchedule::Cron("*/15 * * * *".to_string()));
    }

    #[test]
    fn test_enabled_tasks_filter() {
        let config = config(&[
            ("CRON1_CONTRACT_ADDRESS", "0xcron"),
            ("ENABLED_TASKS", "free-packs,contract-heartbeat,bogus"),
        ]);
        let tasks = build_catalog(
            &config,
            notifier(&config, MemoryDirectory::default()),
            Arc::new(RecordingInvoker::default()),
        );
        assert_eq!(names(&tasks), vec![CONTRACT_HEARTBEAT, FREE_PACKS]);
    }

    #[tokio::test]
    async fn test_heartbeat_action_submits_configured_call() {
        let config = config(&[
            ("CRON1_CONTRACT_ADDRESS", "0xcron"),
            ("ENABLED_TASKS", "contract-heartbeat"),
        ]);
        let invoker = Arc::new(RecordingInvoker::default());
        let tasks = build_catalog(
            &config,
            notifier(&config, MemoryDirectory::default()),
            invoker.clone(),
        );

        assert!(tasks[0].run_once().await);
        assert_eq!(
            invoker.calls.lock().unwrap().as_slice(),
            &[ContractCall::new("0xcron", "increase_balance", vec!["5".to_string()])]
        );
    }

    #[tokio::test]
    async fn test_notification_pass_failure_is_reported() {
        let config = config(&[("ENABLED_TASKS", "free-packs")]);
        let directory = MemoryDirectory {
            fail_devices: true,
            ..MemoryDirectory::default()
        }
        .with_user(
            preferences("0xabc", "America/Argentina/Buenos_Aires", "en"),
            &["token-1"],
        );
        let tasks = build_catalog(
            &config,
            notifier(&config, directory),
            Arc::new(RecordingInvoker::default()),
        );

        assert!(!tasks[0].run_once().await);
    }
}
