mod api;
mod chain;
mod config;
mod db;
mod eligibility;
mod game_state;
mod ledger;
mod localization;
mod logging;
mod metrics;
mod models;
mod notifier;
mod push;
mod scheduler;
mod tasks;
mod time_window;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use crate::{
    chain::StarknetInvoker,
    db::PgDirectory,
    eligibility::NotificationKind,
    game_state::DataApiClient,
    ledger::PgLedger,
    notifier::Notifier,
    push::ApnsGateway,
    scheduler::TaskScheduler,
};

fn main() -> Result<()> {
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(num_cpus::get);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async {
        // Load environment variables from .env file if present
        dotenv::dotenv().ok();

        logging::setup_logging();

        info!(worker_threads, "Starting game cron service");

        let config = config::Config::from_env()?;

        let db_pool = db::init_db_pool(&config.database_url, config.run_migrations).await?;

        let invoker = Arc::new(
            StarknetInvoker::connect(&config.rpc_url, &config.account_address, &config.private_key)
                .await?,
        );

        let push = ApnsGateway::new(
            &config.apns_key_path,
            &config.apns_key_id,
            &config.apns_team_id,
            &config.apns_topic,
            config.apns_production,
        )?;

        let notifier = Arc::new(Notifier::new(
            PgDirectory::new(db_pool.clone()),
            PgLedger::new(db_pool.clone()),
            push,
            DataApiClient::new(&config.data_api_url)?,
            config.notification_window,
            NotificationKind::missions_reminder(
                config.daily_missions_notification_hour,
                config.missions_reset,
            ),
        ));

        let task_scheduler = TaskScheduler::new(config.cron_timezone).await?;
        let catalog = tasks::build_catalog(&config, notifier, invoker.clone());
        if catalog.is_empty() {
            warn!("No tasks enabled");
        }
        for task in catalog {
            task_scheduler.register(task).await?;
        }
        task_scheduler.start().await?;

        let api_handle = if config.api_enabled {
            let api_state = Arc::new(api::ApiState {
                invoker: invoker.clone(),
                heartbeat: tasks::heartbeat_call(&config),
                explorer_tx_url: config.explorer_tx_url.clone(),
                trigger_user_agent: config.cron_trigger_user_agent.clone(),
            });
            let api_router = api::create_api_router(api_state);

            let listener = tokio::net::TcpListener::bind(&config.api_bind_address)
                .await
                .with_context(|| format!("Failed to bind {}", config.api_bind_address))?;
            info!("Starting API server on {}", config.api_bind_address);

            Some(tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, api_router).await {
                    error!("API server error: {}", e);
                }
            }))
        } else {
            None
        };

        signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        info!("Received shutdown signal, shutting down gracefully");

        if let Err(e) = task_scheduler.shutdown().await {
            error!("{}", e);
        }
        if let Some(handle) = api_handle {
            handle.abort();
        }
        db_pool.close().await;

        info!("Shutdown complete");
        Ok(())
    })
}
