//! CLI argument parsing, validation, and startup helpers.

use crate::db::{ADMIN_ROLE, Database, NewUser, UserStatus};
use crate::password;
use clap::Parser;
use tracing::{error, info};
use uuid::Uuid;

const MIN_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "Frontdesk", about = "Clinic front-desk service")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7350")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "frontdesk.db")]
    pub database: String,

    /// Path to file containing the access token secret.
    /// Prefer using the ACCESS_TOKEN_SECRET env var instead
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret.
    /// Prefer using the REFRESH_TOKEN_SECRET env var instead
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Create an initial active admin account on startup if none exists
    #[arg(long, requires = "admin_email", requires = "admin_password")]
    pub bootstrap_admin: bool,

    /// Email for the bootstrap admin account
    #[arg(long)]
    pub admin_email: Option<String>,

    /// Display name for the bootstrap admin account
    #[arg(long, default_value = "Administrator")]
    pub admin_name: String,

    /// Password for the bootstrap admin account
    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a token secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_token_secret(env_var: &str, secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            "Token secret is required. Set the {} environment variable (recommended) or use a secret file",
            env_var
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            "Token secret is shorter than {} characters. Use a longer secret",
            MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load both token secrets. The two must differ.
pub fn load_secrets(args: &Args) -> Option<(String, String)> {
    let access = load_token_secret("ACCESS_TOKEN_SECRET", args.access_secret_file.as_deref())?;
    let refresh = load_token_secret("REFRESH_TOKEN_SECRET", args.refresh_secret_file.as_deref())?;

    if access == refresh {
        error!("Access and refresh token secrets must differ");
        return None;
    }

    Some((access, refresh))
}

/// Handle the --bootstrap-admin flag: create an initial active admin account
/// when no active admin exists yet.
pub async fn handle_bootstrap_admin(db: &Database, email: &str, name: &str, admin_password: &str) {
    match db.users().has_active_admin().await {
        Ok(true) => {
            info!("An active admin already exists, skipping bootstrap");
        }
        Ok(false) => {
            let password_hash = match password::hash_password(admin_password) {
                Ok(hash) => hash,
                Err(e) => {
                    error!(error = %e, "Failed to hash admin password");
                    std::process::exit(1);
                }
            };
            let uuid = Uuid::new_v4().to_string();
            let new_user = NewUser {
                uuid: &uuid,
                name,
                email,
                password_hash: &password_hash,
                role: ADMIN_ROLE,
                status: UserStatus::Active,
                phone_number: None,
                department: None,
            };
            match db.users().create(&new_user).await {
                Ok(_) => info!(email = %email, "Bootstrap admin created"),
                Err(e) => {
                    error!(error = %e, "Failed to create bootstrap admin");
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to check for existing admin");
            std::process::exit(1);
        }
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
