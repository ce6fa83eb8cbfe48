use crate::record::{ConnectionStatus, UserRecord, UserRow};
use anyhow::Result;
use std::future::Future;
use tracing::{error, info, warn};

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

const SELECT_COLUMNS: &str = "chat_id, wallet_address, private_key, status, balance, \
     free_collateral, created_at, updated_at, status_changed_at";

/// URI-addressed store of [`UserRecord`]s.
///
/// Every accessor is tolerant of a disconnected backing store: a failed query
/// is retried once, and a second failure degrades to a neutral
/// `None`/`false`/empty result instead of propagating. Callers must treat
/// those as "temporarily unavailable or absent", not as hard errors.
#[derive(Clone)]
pub struct UserDirectory {
    pool: SqlitePool,
}

impl UserDirectory {
    /// Connects the pool and runs migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial connection or a migration fails;
    /// startup failures are not degraded.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!(database_url, "user directory connected");
        Ok(Self { pool })
    }

    /// Creates an in-memory directory for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if connection fails.
    pub async fn new_in_memory() -> Result<Self> {
        // A single connection: every pooled connection to `:memory:` would
        // otherwise see its own empty database.
        Self::new("sqlite::memory:", 1).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn get_by_chat_id(&self, chat_id: i64) -> Option<UserRecord> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM users WHERE chat_id = ?1");
        let sql = sql.as_str();
        self.guarded("get_by_chat_id", || async move {
            sqlx::query_as::<_, UserRow>(sql)
                .bind(chat_id)
                .fetch_optional(&self.pool)
                .await
        })
        .await
        .flatten()
        .map(UserRecord::from_row)
    }

    pub async fn get_by_wallet(&self, wallet_address: &str) -> Option<UserRecord> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM users WHERE wallet_address = ?1");
        let sql = sql.as_str();
        self.guarded("get_by_wallet", || async move {
            sqlx::query_as::<_, UserRow>(sql)
                .bind(wallet_address)
                .fetch_optional(&self.pool)
                .await
        })
        .await
        .flatten()
        .map(UserRecord::from_row)
    }

    /// Inserts or fully refreshes a user record. Returns `false` on store
    /// failure.
    pub async fn upsert_user(
        &self,
        chat_id: i64,
        wallet_address: &str,
        private_key: &str,
        status: ConnectionStatus,
        balance: f64,
        free_collateral: f64,
    ) -> bool {
        let now = chrono::Utc::now().timestamp();
        let status = status.as_str();
        self.guarded("upsert_user", || async move {
            sqlx::query(
                r"
                INSERT INTO users (chat_id, wallet_address, private_key, status, balance,
                                   free_collateral, created_at, updated_at, status_changed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?7)
                ON CONFLICT(chat_id) DO UPDATE SET
                    wallet_address = excluded.wallet_address,
                    private_key = excluded.private_key,
                    status = excluded.status,
                    balance = excluded.balance,
                    free_collateral = excluded.free_collateral,
                    updated_at = excluded.updated_at,
                    status_changed_at = excluded.status_changed_at
                ",
            )
            .bind(chat_id)
            .bind(wallet_address)
            .bind(private_key)
            .bind(status)
            .bind(balance)
            .bind(free_collateral)
            .bind(now)
            .execute(&self.pool)
            .await
        })
        .await
        .is_some()
    }

    /// Records a status transition. Returns `false` if the user is unknown or
    /// the store is unavailable.
    pub async fn update_status(&self, chat_id: i64, status: ConnectionStatus) -> bool {
        let now = chrono::Utc::now().timestamp();
        let status = status.as_str();
        self.guarded("update_status", || async move {
            sqlx::query(
                "UPDATE users SET status = ?2, updated_at = ?3, status_changed_at = ?3 \
                 WHERE chat_id = ?1",
            )
            .bind(chat_id)
            .bind(status)
            .bind(now)
            .execute(&self.pool)
            .await
        })
        .await
        .is_some_and(|done| done.rows_affected() > 0)
    }

    /// Refreshes the last known balance snapshot.
    pub async fn update_balance(&self, chat_id: i64, balance: f64, free_collateral: f64) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.guarded("update_balance", || async move {
            sqlx::query(
                "UPDATE users SET balance = ?2, free_collateral = ?3, updated_at = ?4 \
                 WHERE chat_id = ?1",
            )
            .bind(chat_id)
            .bind(balance)
            .bind(free_collateral)
            .bind(now)
            .execute(&self.pool)
            .await
        })
        .await
        .is_some_and(|done| done.rows_affected() > 0)
    }

    /// Explicitly deletes a user record. Returns `false` if absent.
    pub async fn delete(&self, chat_id: i64) -> bool {
        self.guarded("delete", || async move {
            sqlx::query("DELETE FROM users WHERE chat_id = ?1")
                .bind(chat_id)
                .execute(&self.pool)
                .await
        })
        .await
        .is_some_and(|done| done.rows_affected() > 0)
    }

    pub async fn all(&self) -> Vec<UserRecord> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM users ORDER BY created_at DESC");
        let sql = sql.as_str();
        self.guarded("all", || async move {
            sqlx::query_as::<_, UserRow>(sql).fetch_all(&self.pool).await
        })
        .await
        .unwrap_or_default()
        .into_iter()
        .map(UserRecord::from_row)
        .collect()
    }

    /// Most recently registered users, newest first.
    pub async fn latest(&self, limit: i64) -> Vec<UserRecord> {
        let sql =
            format!("SELECT {SELECT_COLUMNS} FROM users ORDER BY created_at DESC LIMIT ?1");
        let sql = sql.as_str();
        self.guarded("latest", || async move {
            sqlx::query_as::<_, UserRow>(sql)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
        })
        .await
        .unwrap_or_default()
        .into_iter()
        .map(UserRecord::from_row)
        .collect()
    }

    pub async fn count_all(&self) -> i64 {
        self.guarded("count_all", || async move {
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM users")
                .fetch_one(&self.pool)
                .await
        })
        .await
        .map_or(0, |(n,)| n)
    }

    /// Counts of users per persisted status string.
    pub async fn count_by_status(&self) -> Vec<(String, i64)> {
        self.guarded("count_by_status", || async move {
            sqlx::query_as::<_, (String, i64)>(
                "SELECT status, COUNT(*) FROM users GROUP BY status ORDER BY status",
            )
            .fetch_all(&self.pool)
            .await
        })
        .await
        .unwrap_or_default()
    }

    /// Runs a query, retrying once on failure; a second failure is logged and
    /// swallowed so callers see a neutral result.
    async fn guarded<T, F, Fut>(&self, op: &'static str, query: F) -> Option<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        match query().await {
            Ok(value) => Some(value),
            Err(first) => {
                warn!(op, error = %first, "user directory query failed, retrying once");
                match query().await {
                    Ok(value) => Some(value),
                    Err(second) => {
                        error!(op, error = %second, "user directory unavailable");
                        None
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn directory_with_user(chat_id: i64, wallet: &str) -> UserDirectory {
        let dir = UserDirectory::new_in_memory().await.unwrap();
        assert!(
            dir.upsert_user(chat_id, wallet, "0xkey", ConnectionStatus::Connected, 100.0, 80.0)
                .await
        );
        dir
    }

    #[tokio::test]
    async fn round_trip_by_chat_id_and_wallet() {
        let dir = directory_with_user(42, "0xabc").await;

        let rec = dir.get_by_chat_id(42).await.unwrap();
        assert_eq!(rec.wallet_address, "0xabc");
        assert_eq!(rec.status, ConnectionStatus::Connected);
        assert!((rec.balance - 100.0).abs() < f64::EPSILON);

        let by_wallet = dir.get_by_wallet("0xabc").await.unwrap();
        assert_eq!(by_wallet.chat_id, 42);

        assert!(dir.get_by_chat_id(7).await.is_none());
        assert!(dir.get_by_wallet("0xmissing").await.is_none());
    }

    #[tokio::test]
    async fn upsert_refreshes_existing_record() {
        let dir = directory_with_user(42, "0xabc").await;
        assert!(
            dir.upsert_user(42, "0xdef", "0xkey2", ConnectionStatus::Trading, 50.0, 25.0)
                .await
        );

        let rec = dir.get_by_chat_id(42).await.unwrap();
        assert_eq!(rec.wallet_address, "0xdef");
        assert_eq!(rec.status, ConnectionStatus::Trading);
        assert_eq!(dir.count_all().await, 1);
    }

    #[tokio::test]
    async fn status_and_balance_updates() {
        let dir = directory_with_user(42, "0xabc").await;

        assert!(dir.update_status(42, ConnectionStatus::Trading).await);
        assert_eq!(
            dir.get_by_chat_id(42).await.unwrap().status,
            ConnectionStatus::Trading
        );
        assert!(!dir.update_status(7, ConnectionStatus::Trading).await);

        assert!(dir.update_balance(42, 150.0, 120.0).await);
        let rec = dir.get_by_chat_id(42).await.unwrap();
        assert!((rec.balance - 150.0).abs() < f64::EPSILON);
        assert!((rec.free_collateral - 120.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn delete_reports_absence() {
        let dir = directory_with_user(42, "0xabc").await;
        assert!(dir.delete(42).await);
        assert!(!dir.delete(42).await);
        assert!(dir.get_by_chat_id(42).await.is_none());
    }

    #[tokio::test]
    async fn counts_group_by_status() {
        let dir = directory_with_user(1, "0xa").await;
        dir.upsert_user(2, "0xb", "0xk", ConnectionStatus::Trading, 0.0, 0.0)
            .await;
        dir.upsert_user(3, "0xc", "0xk", ConnectionStatus::Trading, 0.0, 0.0)
            .await;

        assert_eq!(dir.count_all().await, 3);
        let counts = dir.count_by_status().await;
        assert_eq!(
            counts,
            vec![("connected".to_string(), 1), ("trading".to_string(), 2)]
        );
    }
}
