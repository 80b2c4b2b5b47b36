use sqlx::sqlite::SqlitePool;

/// The reserved role name. It always grants admin access and can never be
/// removed from the configured role list.
pub const ADMIN_ROLE: &str = "admin";

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// Account status. New signups start as `pending` when manual approval is
/// enabled, otherwise `active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Pending,
    Rejected,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Pending => "pending",
            UserStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => UserStatus::Pending,
            "rejected" => UserStatus::Rejected,
            _ => UserStatus::Active,
        }
    }
}

/// A staff account. Roles are open strings validated against the settings
/// store, not an enum; the only name with fixed meaning is [`ADMIN_ROLE`].
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub status: UserStatus,
    pub phone_number: Option<String>,
    pub department: Option<String>,
    pub created_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    uuid: String,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    status: String,
    phone_number: Option<String>,
    department: Option<String>,
    created_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role,
            status: UserStatus::from_str(&row.status),
            phone_number: row.phone_number,
            department: row.department,
            created_at: row.created_at,
        }
    }
}

/// Public user summary for the admin dashboard. Does not expose internal
/// database IDs or the password hash.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub uuid: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub status: UserStatus,
    pub phone_number: Option<String>,
    pub department: Option<String>,
    pub created_at: String,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            uuid: user.uuid,
            name: user.name,
            email: user.email,
            role: user.role,
            status: user.status,
            phone_number: user.phone_number,
            department: user.department,
            created_at: user.created_at,
        }
    }
}

/// Fields for creating a user.
pub struct NewUser<'a> {
    pub uuid: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: &'a str,
    pub status: UserStatus,
    pub phone_number: Option<&'a str>,
    pub department: Option<&'a str>,
}

const USER_COLUMNS: &str =
    "id, uuid, name, email, password_hash, role, status, phone_number, department, created_at";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user. Returns the user ID.
    /// Fails on duplicate email (unique, case-insensitive).
    pub async fn create(&self, user: &NewUser<'_>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (uuid, name, email, password_hash, role, status, phone_number, department)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.uuid)
        .bind(user.name)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.role)
        .bind(user.status.as_str())
        .bind(user.phone_number)
        .bind(user.department)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a user by email (case-insensitive, per the column collation).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE uuid = ?"))
                .bind(uuid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Set the status for a user.
    pub async fn set_status(&self, id: i64, status: UserStatus) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user by ID.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List all users, newest first (for the admin dashboard).
    pub async fn list_all(&self) -> Result<Vec<UserSummary>, sqlx::Error> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| UserSummary::from(User::from(row)))
            .collect())
    }

    /// Total number of accounts.
    pub async fn count_total(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Account counts grouped by role.
    pub async fn count_by_role(&self) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as("SELECT role, COUNT(*) FROM users GROUP BY role ORDER BY role")
            .fetch_all(&self.pool)
            .await
    }

    /// Number of active accounts holding the admin role. Deleting a user is
    /// refused when it would drop this to zero.
    pub async fn count_active_admins(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = ? AND status = 'active'")
                .bind(ADMIN_ROLE)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }

    /// Whether any active admin account exists (for startup bootstrap).
    pub async fn has_active_admin(&self) -> Result<bool, sqlx::Error> {
        Ok(self.count_active_admins().await? > 0)
    }
}
