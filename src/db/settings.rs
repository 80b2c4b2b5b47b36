//! Clinic configuration as open string sets.
//!
//! Each setting key holds a set of string values rather than a closed enum,
//! so admins can add roles, departments and places without a code change.
//! `signup_flags` holds feature toggles for the signup flow.

use sqlx::sqlite::SqlitePool;

pub const KEY_ROLES: &str = "roles";
pub const KEY_DEPARTMENTS: &str = "departments";
pub const KEY_PLACES: &str = "places";
pub const KEY_SIGNUP_FLAGS: &str = "signup_flags";

/// The set of recognized setting keys. Writes to any other key are rejected.
pub const SETTING_KEYS: [&str; 4] = [KEY_ROLES, KEY_DEPARTMENTS, KEY_PLACES, KEY_SIGNUP_FLAGS];

/// When set, new signups are created `pending` and need admin approval.
pub const FLAG_MANUAL_APPROVAL: &str = "manual_approval";
/// When set, the admin role may be requested at signup.
pub const FLAG_ADMIN_SIGNUP: &str = "admin_signup";

/// All settings, one value list per key.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Settings {
    pub roles: Vec<String>,
    pub departments: Vec<String>,
    pub places: Vec<String>,
    pub signup_flags: Vec<String>,
}

#[derive(Clone)]
pub struct SettingStore {
    pool: SqlitePool,
}

impl SettingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn is_known_key(key: &str) -> bool {
        SETTING_KEYS.contains(&key)
    }

    /// All values for a key, sorted.
    pub async fn values(&self, key: &str) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT value FROM settings WHERE key = ? ORDER BY value")
                .bind(key)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Whether a key contains a value.
    pub async fn contains(&self, key: &str, value: &str) -> Result<bool, sqlx::Error> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM settings WHERE key = ? AND value = ?")
                .bind(key)
                .bind(value)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0 > 0)
    }

    /// Whether a signup flag is set.
    pub async fn flag_set(&self, flag: &str) -> Result<bool, sqlx::Error> {
        self.contains(KEY_SIGNUP_FLAGS, flag).await
    }

    /// Add a value to a key. Fails on duplicate (unique constraint).
    pub async fn add(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove a value from a key. Returns whether a row existed.
    pub async fn remove(&self, key: &str, value: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM settings WHERE key = ? AND value = ?")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Load every setting key at once.
    pub async fn all(&self) -> Result<Settings, sqlx::Error> {
        Ok(Settings {
            roles: self.values(KEY_ROLES).await?,
            departments: self.values(KEY_DEPARTMENTS).await?,
            places: self.values(KEY_PLACES).await?,
            signup_flags: self.values(KEY_SIGNUP_FLAGS).await?,
        })
    }
}
