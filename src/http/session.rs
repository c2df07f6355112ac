//! In-memory admin sessions behind the `tlinky_session` cookie.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;

pub const COOKIE_NAME: &str = "tlinky_session";
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: i64,
    pub email: String,
    pub role: String,
}

struct Entry {
    session: Session,
    last_seen: Instant,
}

pub struct SessionStore {
    idle: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl SessionStore {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn create(&self, session: Session) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        if let Ok(mut entries) = self.entries.lock() {
            let idle = self.idle;
            entries.retain(|_, e| e.last_seen.elapsed() < idle);
            entries.insert(
                id.clone(),
                Entry {
                    session,
                    last_seen: Instant::now(),
                },
            );
        }
        id
    }

    /// Returns the live session and refreshes its idle clock.
    pub fn touch(&self, id: &str) -> Option<Session> {
        let mut entries = self.entries.lock().ok()?;
        let expired = entries.get(id)?.last_seen.elapsed() >= self.idle;
        if expired {
            entries.remove(id);
            return None;
        }
        let entry = entries.get_mut(id)?;
        entry.last_seen = Instant::now();
        Some(entry.session.clone())
    }

    pub fn remove(&self, id: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(id);
        }
    }
}

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

pub fn set_cookie(id: &str) -> String {
    format!("{COOKIE_NAME}={id}; HttpOnly; Path=/; SameSite=Lax")
}

pub fn clear_cookie() -> String {
    format!("{COOKIE_NAME}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0")
}
