//! Refresh token storage for revocation tracking.
//!
//! Only refresh tokens are stored; access tokens are stateless and expire on
//! their own within 15 minutes. A refresh token is valid only while its `jti`
//! row exists, so revocation is a single-row delete.

use chrono::DateTime;
use sqlx::sqlite::SqlitePool;

/// A stored refresh token.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub jti: String,
    pub user_id: i64,
    pub issued_at: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: i64,
    jti: String,
    user_id: i64,
    issued_at: String,
    expires_at: String,
    created_at: String,
}

impl From<TokenRow> for RefreshTokenRecord {
    fn from(row: TokenRow) -> Self {
        Self {
            id: row.id,
            jti: row.jti,
            user_id: row.user_id,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

/// Store for managing refresh tokens.
pub struct TokenStore {
    pool: SqlitePool,
}

impl TokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a newly issued refresh token.
    pub async fn create(
        &self,
        jti: &str,
        user_id: i64,
        issued_at: u64,
        expires_at: u64,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO refresh_tokens (jti, user_id, issued_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(jti)
        .bind(user_id)
        .bind(timestamp_to_datetime(issued_at))
        .bind(timestamp_to_datetime(expires_at))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Get a stored token by its JWT ID.
    pub async fn get_by_jti(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, sqlx::Error> {
        let row: Option<TokenRow> = sqlx::query_as(
            "SELECT id, jti, user_id, issued_at, expires_at, created_at
             FROM refresh_tokens WHERE jti = ?",
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RefreshTokenRecord::from))
    }

    /// Delete a token by its JWT ID (revoke). Returns whether a row existed.
    pub async fn delete_by_jti(&self, jti: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE jti = ?")
            .bind(jti)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all expired tokens. Hygiene only: validation checks the JWT
    /// `exp` claim, so an expired row that lingers is never accepted.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < datetime('now')")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// List all unexpired tokens for a user, newest first.
    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<RefreshTokenRecord>, sqlx::Error> {
        let rows: Vec<TokenRow> = sqlx::query_as(
            "SELECT id, jti, user_id, issued_at, expires_at, created_at
             FROM refresh_tokens
             WHERE user_id = ? AND expires_at >= datetime('now')
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RefreshTokenRecord::from).collect())
    }

    /// Delete all tokens for a user (logout everywhere).
    pub async fn delete_all_by_user(&self, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Convert a Unix timestamp to the `YYYY-MM-DD HH:MM:SS` form SQLite's
/// datetime functions compare against.
fn timestamp_to_datetime(timestamp: u64) -> String {
    DateTime::from_timestamp(timestamp as i64, 0)
        .unwrap_or_default()
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, NewUser, UserStatus};

    #[test]
    fn test_timestamp_to_datetime() {
        // 2024-01-15 12:30:45 UTC
        assert_eq!(timestamp_to_datetime(1705321845), "2024-01-15 12:30:45");
        assert_eq!(timestamp_to_datetime(0), "1970-01-01 00:00:00");
    }

    async fn setup_user(db: &Database) -> i64 {
        db.users()
            .create(&NewUser {
                uuid: "uuid-1",
                name: "Alice",
                email: "alice@clinic.test",
                password_hash: "$argon2id$fake",
                role: "doctor",
                status: UserStatus::Active,
                phone_number: None,
                department: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_revoke() {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = setup_user(&db).await;

        let now = 2_000_000_000u64;
        db.tokens()
            .create("jti-1", user_id, now, now + 604_800)
            .await
            .unwrap();

        let record = db.tokens().get_by_jti("jti-1").await.unwrap().unwrap();
        assert_eq!(record.user_id, user_id);

        assert!(db.tokens().delete_by_jti("jti-1").await.unwrap());
        assert!(db.tokens().get_by_jti("jti-1").await.unwrap().is_none());

        // Revoking an already-revoked token reports no row
        assert!(!db.tokens().delete_by_jti("jti-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_expired_keeps_live_tokens() {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = setup_user(&db).await;

        // One token expired long ago, one far in the future
        db.tokens()
            .create("jti-old", user_id, 1_000_000_000, 1_000_604_800)
            .await
            .unwrap();
        db.tokens()
            .create("jti-new", user_id, 4_000_000_000, 4_000_604_800)
            .await
            .unwrap();

        let removed = db.tokens().delete_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert!(db.tokens().get_by_jti("jti-old").await.unwrap().is_none());
        assert!(db.tokens().get_by_jti("jti-new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_and_delete_all_by_user() {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = setup_user(&db).await;

        db.tokens()
            .create("jti-1", user_id, 4_000_000_000, 4_000_604_800)
            .await
            .unwrap();
        db.tokens()
            .create("jti-2", user_id, 4_000_000_100, 4_000_604_900)
            .await
            .unwrap();

        let tokens = db.tokens().list_by_user(user_id).await.unwrap();
        assert_eq!(tokens.len(), 2);

        let removed = db.tokens().delete_all_by_user(user_id).await.unwrap();
        assert_eq!(removed, 2);
        assert!(db.tokens().list_by_user(user_id).await.unwrap().is_empty());
    }
}
