//! Client-side session cache.
//!
//! The access token lives in memory only and is lost on restart; the
//! refresh token and profile are persisted so the session survives. Being
//! signed in is defined by holding a refresh token: an expired or missing
//! access token just means the next request refreshes first.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

const USER_FILE: &str = "user.json";
const REFRESH_TOKEN_FILE: &str = "refresh_token";

/// The signed-in account's profile as the server reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uuid: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub status: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    pub created_at: String,
}

#[derive(Default)]
struct SessionState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<UserProfile>,
}

/// Session cache backed by files in a directory.
pub struct Session {
    dir: PathBuf,
    state: Mutex<SessionState>,
}

impl Session {
    /// Load the session from a directory, creating it if needed.
    /// Missing files mean signed out; an unreadable profile file is treated
    /// the same rather than blocking startup.
    pub fn load(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let refresh_token = match std::fs::read_to_string(dir.join(REFRESH_TOKEN_FILE)) {
            Ok(content) => {
                let token = content.trim().to_string();
                if token.is_empty() { None } else { Some(token) }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        let user = match std::fs::read_to_string(dir.join(USER_FILE)) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!("Ignoring unreadable profile file: {}", e);
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        Ok(Self {
            dir,
            state: Mutex::new(SessionState {
                access_token: None,
                refresh_token,
                user,
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a session exists. Defined by refresh-token presence; the
    /// access token being absent or stale does not count as signed out.
    pub fn is_authenticated(&self) -> bool {
        self.lock().refresh_token.is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock().refresh_token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.lock().user.clone()
    }

    /// Replace the in-memory access token. Never persisted.
    pub fn set_access_token(&self, token: String) {
        self.lock().access_token = Some(token);
    }

    /// Store a fresh login: profile and refresh token on disk, access token
    /// in memory.
    pub fn store_login(
        &self,
        user: UserProfile,
        access_token: String,
        refresh_token: String,
    ) -> io::Result<()> {
        let user_json = serde_json::to_string_pretty(&user)?;
        std::fs::write(self.dir.join(USER_FILE), user_json)?;
        std::fs::write(self.dir.join(REFRESH_TOKEN_FILE), &refresh_token)?;

        let mut state = self.lock();
        state.access_token = Some(access_token);
        state.refresh_token = Some(refresh_token);
        state.user = Some(user);
        Ok(())
    }

    /// Wipe the session, memory and files both.
    pub fn clear(&self) -> io::Result<()> {
        {
            let mut state = self.lock();
            state.access_token = None;
            state.refresh_token = None;
            state.user = None;
        }

        for file in [USER_FILE, REFRESH_TOKEN_FILE] {
            match std::fs::remove_file(self.dir.join(file)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
