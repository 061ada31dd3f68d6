use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, QueryBuilder};
use std::fmt;
use tracing::debug;

/// Identity of one logical notification in `notification_logs`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    pub wallet: String,
    pub notification_type: String,
    pub reference_id: Option<String>,
}

impl LedgerKey {
    pub fn new(
        wallet: impl Into<String>,
        notification_type: impl Into<String>,
        reference_id: Option<String>,
    ) -> Self {
        Self {
            wallet: wallet.into(),
            notification_type: notification_type.into(),
            reference_id,
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference_id {
            Some(reference) => write!(f, "{}/{}/{}", self.wallet, self.notification_type, reference),
            None => write!(f, "{}/{}", self.wallet, self.notification_type),
        }
    }
}

/// Append-only record of delivered notifications.
///
/// A key without `reference_id` matches every entry of that wallet and type.
/// `since` restricts the lookup to entries sent at or after that instant.
#[trait_variant::make(NotificationLedger: Send)]
pub trait LocalNotificationLedger {
    async fn has_been_notified(&self, key: &LedgerKey, since: Option<DateTime<Utc>>) -> Result<bool>;

    async fn record_notified(&self, key: &LedgerKey) -> Result<()>;
}

#[derive(Clone)]
pub struct PgLedger {
    db_pool: Pool<Postgres>,
}

impl PgLedger {
    pub fn new(db_pool: Pool<Postgres>) -> Self {
        Self { db_pool }
    }
}

impl NotificationLedger for PgLedger {
    async fn has_been_notified(&self, key: &LedgerKey, since: Option<DateTime<Utc>>) -> Result<bool> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT id FROM notification_logs WHERE wallet = ");
        query.push_bind(&key.wallet);
        query.push(" AND notification_type = ");
        query.push_bind(&key.notification_type);

        if let Some(reference_id) = &key.reference_id {
            query.push(" AND reference_id = ");
            query.push_bind(reference_id);
        }
        if let Some(since) = since {
            query.push(" AND sent_at >= ");
            query.push_bind(since);
        }
        query.push(" LIMIT 1");

        let row = query
            .build()
            .fetch_optional(&self.db_pool)
            .await
            .with_context(|| format!("Failed to check notification log for {}", key))?;

        debug!(key = %key, found = row.is_some(), "Checked notification log");
        Ok(row.is_some())
    }

    async fn record_notified(&self, key: &LedgerKey) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_logs (id, wallet, notification_type, reference_id, sent_at)
            VALUES ($1, $2, $3, $4, NOW())
            "#,
        )
        .bind(uuid::Uuid::new_v4())
        .bind(&key.wallet)
        .bind(&key.notification_type)
        .bind(&key.reference_id)
        .execute(&self.db_pool)
        .await
        .with_context(|| format!("Failed to log notification {}", key))?;

        Ok(())
    }
}
