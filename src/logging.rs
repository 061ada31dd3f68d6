use std::env;
use tracing_subscriber::{fmt, EnvFilter};

pub fn setup_logging() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    // RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(&log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    tracing::info!(level = %log_level, "Logging initialized");
}

fn default_filter(log_level: &str) -> EnvFilter {
    let filter = EnvFilter::try_new(format!("starknet_game_cron={}", log_level))
        .unwrap_or_else(|_| EnvFilter::new("starknet_game_cron=info"));

    [
        // Per-job chatter from the scheduler itself
        "tokio_cron_scheduler=warn",
        "tower_http=warn",
        "sqlx=warn",
        "hyper=warn",
        "reqwest=warn",
        "a2=warn",
    ]
    .iter()
    .filter_map(|directive| directive.parse().ok())
    .fold(filter, |filter, directive| filter.add_directive(directive))
}
