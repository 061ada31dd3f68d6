use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use tracing::info;

use crate::models::{CustomNotification, PushDevice, UserPreferences};

pub async fn init_db_pool(database_url: &str, run_migrations: bool) -> Result<Pool<Postgres>> {
    info!("Initializing database connection pool");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    // The tables are normally owned by the registration backend.
    if run_migrations {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
    }

    Ok(pool)
}

/// Read side of the registration backend: devices, preferences and
/// operator-scheduled notifications.
#[trait_variant::make(UserDirectory: Send)]
pub trait LocalUserDirectory {
    async fn enabled_devices(&self) -> Result<Vec<PushDevice>>;

    async fn user_preferences(&self, wallet: &str) -> Result<Option<UserPreferences>>;

    async fn active_custom_notifications(&self) -> Result<Vec<CustomNotification>>;
}

// The registration app stores the device token in `fcm_token`.
const ENABLED_DEVICES_QUERY: &str = r#"
    SELECT wallet, fcm_token, platform, disabled
    FROM push_devices
    WHERE disabled = false
"#;

#[derive(Clone)]
pub struct PgDirectory {
    db_pool: Pool<Postgres>,
}

impl PgDirectory {
    pub fn new(db_pool: Pool<Postgres>) -> Self {
        Self { db_pool }
    }
}

impl UserDirectory for PgDirectory {
    async fn enabled_devices(&self) -> Result<Vec<PushDevice>> {
        let devices = sqlx::query_as::<_, PushDevice>(ENABLED_DEVICES_QUERY)
        .fetch_all(&self.db_pool)
        .await
        .context("Failed to fetch enabled push devices")?;

        Ok(devices)
    }

    async fn user_preferences(&self, wallet: &str) -> Result<Option<UserPreferences>> {
        let preferences = sqlx::query_as::<_, UserPreferences>(
            r#"
            SELECT wallet, push_daily_missions_enabled, push_reminders_enabled,
                   push_events_enabled, push_daily_packs_enabled,
                   push_extra1_enabled, push_extra2_enabled, timezone, language
            FROM user_preferences
            WHERE wallet = $1
            "#,
        )
        .bind(wallet)
        .fetch_optional(&self.db_pool)
        .await
        .with_context(|| format!("Failed to fetch preferences for {}", wallet))?;

        Ok(preferences)
    }

    async fn active_custom_notifications(&self) -> Result<Vec<CustomNotification>> {
        let notifications = sqlx::query_as::<_, CustomNotification>(
            r#"
            SELECT id, notification_type, scheduled_date, scheduled_hour, messages, active
            FROM custom_notifications
            WHERE active = true
            "#,
        )
        .fetch_all(&self.db_pool)
        .await
        .context("Failed to fetch active custom notifications")?;

        Ok(notifications)
    }
}

#[cfg(test)]
mod tests {
    use super::ENABLED_DEVICES_QUERY;

    #[test]
    fn test_devices_query_matches_registration_schema() {
        let schema = include_str!("../migrations/20240101000000_init.sql");
        assert!(schema.contains("fcm_token TEXT NOT NULL"));
        assert!(ENABLED_DEVICES_QUERY.contains("fcm_token"));
        assert!(!ENABLED_DEVICES_QUERY.contains("push_token"));
        assert!(!schema.contains("push_token"));
    }
}
