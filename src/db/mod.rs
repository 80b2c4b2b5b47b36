mod patient;
mod settings;
mod token;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use patient::{
    DepartmentCount, MonthlyCount, NewPatient, Patient, PatientFilter, PatientPage, PatientStore,
    SortOrder,
};
pub use settings::{
    FLAG_ADMIN_SIGNUP, FLAG_MANUAL_APPROVAL, KEY_DEPARTMENTS, KEY_PLACES, KEY_ROLES,
    KEY_SIGNUP_FLAGS, SETTING_KEYS, SettingStore, Settings,
};
pub use token::{RefreshTokenRecord, TokenStore};
pub use user::{ADMIN_ROLE, NewUser, User, UserStatus, UserStore, UserSummary};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        // An in-memory database exists per connection, so the pool must be
        // capped at a single connection or each checkout sees a different db.
        let (url, max_connections) = if path == ":memory:" {
            ("sqlite::memory:".to_string(), 1)
        } else {
            (format!("sqlite:{}?mode=rwc", path), 5)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                // Staff accounts
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    name TEXT NOT NULL,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    password_hash TEXT NOT NULL,
                    role TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'active',
                    phone_number TEXT,
                    department TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_users_uuid ON users(uuid)",
                "CREATE INDEX idx_users_email ON users(email)",
                "CREATE INDEX idx_users_role_status ON users(role, status)",
                // Refresh tokens, tracked by jti so individual sessions can be revoked
                "CREATE TABLE refresh_tokens (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    jti TEXT UNIQUE NOT NULL,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    issued_at TEXT NOT NULL,
                    expires_at TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_refresh_tokens_jti ON refresh_tokens(jti)",
                "CREATE INDEX idx_refresh_tokens_user_id ON refresh_tokens(user_id)",
                "CREATE INDEX idx_refresh_tokens_expires_at ON refresh_tokens(expires_at)",
                // Open string sets: roles, departments, places, signup_flags
                "CREATE TABLE settings (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    UNIQUE(key, value)
                )",
                "CREATE INDEX idx_settings_key ON settings(key)",
                // Patient registry
                "CREATE TABLE patients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    name TEXT NOT NULL,
                    age INTEGER NOT NULL,
                    sex TEXT NOT NULL,
                    phone_number TEXT NOT NULL,
                    whatsapp_number TEXT NOT NULL,
                    place TEXT NOT NULL,
                    department TEXT NOT NULL,
                    doctor TEXT NOT NULL,
                    registered_by TEXT NOT NULL,
                    registered_by_role TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_patients_uuid ON patients(uuid)",
                "CREATE INDEX idx_patients_department ON patients(department)",
                "CREATE INDEX idx_patients_created_at ON patients(created_at)",
                // Default settings. Seeded once here so admins can prune them.
                "INSERT INTO settings (key, value) VALUES
                    ('roles', 'admin'),
                    ('roles', 'doctor'),
                    ('roles', 'nurse'),
                    ('departments', 'General'),
                    ('departments', 'Cardiology'),
                    ('departments', 'Pediatrics'),
                    ('departments', 'Dental'),
                    ('places', 'Kasaragod'),
                    ('places', 'Kanhangad'),
                    ('places', 'Payyanur'),
                    ('signup_flags', 'admin_signup')",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the refresh token store.
    pub fn tokens(&self) -> TokenStore {
        TokenStore::new(self.pool.clone())
    }

    /// Get the settings store.
    pub fn settings(&self) -> SettingStore {
        SettingStore::new(self.pool.clone())
    }

    /// Get the patient store.
    pub fn patients(&self) -> PatientStore {
        PatientStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
