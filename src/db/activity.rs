use chrono::{DateTime, Duration, Utc};
use log::debug;
use sqlx::sqlite::SqlitePool;

use crate::error::Result;

/// A chat member seen recently
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ActiveUser {
    pub user_id: String,
    pub username: Option<String>,
}

/// Last-seen timestamps per (chat, user), used to pick rain recipients
#[derive(Clone)]
pub struct ActivityLog {
    pool: SqlitePool,
}

impl ActivityLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert the last-seen time of a user in a chat
    pub async fn record_activity(
        &self,
        chat_id: &str,
        user_id: &str,
        username: Option<&str>,
        is_bot: bool,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO activity (chat_id, user_id, username, last_active, is_bot)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(chat_id, user_id) DO UPDATE SET
                username = excluded.username,
                last_active = MAX(activity.last_active, excluded.last_active),
                is_bot = excluded.is_bot",
        )
        .bind(chat_id)
        .bind(user_id)
        .bind(username)
        .bind(at.timestamp())
        .bind(is_bot)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Non-bot users of `chat_id` seen within `window` before `now`, most recent first
    pub async fn query_active(
        &self,
        chat_id: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<ActiveUser>> {
        let since = (now - window).timestamp();
        let users = sqlx::query_as::<_, ActiveUser>(
            "SELECT user_id, username FROM activity
             WHERE chat_id = ? AND last_active >= ? AND is_bot = FALSE
             ORDER BY last_active DESC, user_id",
        )
        .bind(chat_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    /// Delete rows older than `retention`. Returns how many were removed.
    pub async fn prune_older_than(&self, retention: Duration, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = (now - retention).timestamp();
        let removed = sqlx::query("DELETE FROM activity WHERE last_active < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if removed > 0 {
            debug!("Pruned {} stale activity rows", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;

    #[tokio::test]
    async fn test_query_active_excludes_bots_and_stale_users() {
        let log = init_test_db().await.unwrap().activity();
        let now = Utc::now();
        log.record_activity("chat", "1", Some("alice"), false, now).await.unwrap();
        log.record_activity("chat", "2", Some("helperbot"), true, now).await.unwrap();
        log.record_activity("chat", "3", Some("carol"), false, now - Duration::hours(3)).await.unwrap();
        log.record_activity("other", "4", Some("dave"), false, now).await.unwrap();

        let active = log.query_active("chat", Duration::hours(1), now).await.unwrap();
        assert_eq!(
            active,
            vec![ActiveUser {
                user_id: "1".to_string(),
                username: Some("alice".to_string())
            }]
        );

        let wider = log.query_active("chat", Duration::hours(4), now).await.unwrap();
        assert_eq!(wider.len(), 2);
    }

    #[tokio::test]
    async fn test_record_activity_keeps_latest_timestamp() {
        let log = init_test_db().await.unwrap().activity();
        let now = Utc::now();
        log.record_activity("chat", "1", Some("alice"), false, now).await.unwrap();
        // An out-of-order older message must not push the user out of the window
        log.record_activity("chat", "1", Some("alice_new"), false, now - Duration::hours(5))
            .await
            .unwrap();

        let active = log.query_active("chat", Duration::hours(1), now).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].username.as_deref(), Some("alice_new"));
    }

    #[tokio::test]
    async fn test_prune_older_than() {
        let log = init_test_db().await.unwrap().activity();
        let now = Utc::now();
        log.record_activity("chat", "1", None, false, now - Duration::hours(30)).await.unwrap();
        log.record_activity("chat", "2", None, false, now).await.unwrap();

        assert_eq!(log.prune_older_than(Duration::hours(24), now).await.unwrap(), 1);
        let remaining = log.query_active("chat", Duration::hours(48), now).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, "2");
    }
}
