//! Session Gate.
//!
//! One administrator credential comes from config: a username compared in
//! constant time and an argon2 PHC hash. A successful login issues a fresh
//! random session id and drops any id the caller held before, so a session
//! id seen before login is never the one that becomes authorized. A failed
//! login sleeps for the configured delay before answering.
//!
//! Sessions live in memory only and expire after the configured idle time.
//! A restart logs everyone out.

use crate::config::SiteConfig;
use crate::error::{Error, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use dashmap::DashMap;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

/// Hash a password with argon2id; returns the PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::store(format!("failed to hash password: {e}")))
}

/// Check a password against a PHC hash. A malformed hash never verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "stored password hash is malformed");
            false
        }
    }
}

struct Session {
    last_seen: Instant,
}

pub struct SessionGate {
    username: String,
    password_hash: String,
    sessions: DashMap<String, Session>,
    ttl: Duration,
    failure_delay: Duration,
}

impl SessionGate {
    pub fn new(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        ttl: Duration,
        failure_delay: Duration,
    ) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            sessions: DashMap::new(),
            ttl,
            failure_delay,
        }
    }

    pub fn from_config(config: &SiteConfig) -> Self {
        Self::new(
            config.admin.username.clone(),
            config.admin.password_hash.clone(),
            Duration::from_secs(config.server.session_ttl_secs),
            Duration::from_millis(config.server.login_failure_delay_ms),
        )
    }

    /// Whether any login can succeed at all.
    pub fn is_configured(&self) -> bool {
        !self.password_hash.is_empty()
    }

    /// Check the credential. On success returns the new session id and
    /// forgets `previous`; on failure waits out the delay and returns `None`.
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
        previous: Option<&str>,
    ) -> Option<String> {
        let user_ok: bool = username
            .as_bytes()
            .ct_eq(self.username.as_bytes())
            .into();
        // Always run the hash check so a wrong username costs the same.
        let pass_ok = self.is_configured() && verify_password(password, &self.password_hash);

        if !(user_ok & pass_ok) {
            warn!(username, "login failed");
            std::thread::sleep(self.failure_delay);
            return None;
        }

        if let Some(old) = previous {
            self.sessions.remove(old);
        }
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.sessions.insert(
            id.clone(),
            Session {
                last_seen: Instant::now(),
            },
        );
        info!(username, "login succeeded");
        Some(id)
    }

    /// Fail with [`Error::Unauthorized`] unless `session` is live.
    pub fn require_grant(&self, session: Option<&str>) -> Result<()> {
        let id = session.ok_or(Error::Unauthorized)?;
        let expired = match self.sessions.get_mut(id) {
            None => return Err(Error::Unauthorized),
            Some(mut s) => {
                if s.last_seen.elapsed() > self.ttl {
                    true
                } else {
                    s.last_seen = Instant::now();
                    false
                }
            }
        };
        if expired {
            self.sessions.remove(id);
            debug!("session expired");
            return Err(Error::Unauthorized);
        }
        Ok(())
    }

    pub fn is_authorized(&self, session: Option<&str>) -> bool {
        self.require_grant(session).is_ok()
    }

    pub fn logout(&self, session: Option<&str>) {
        if let Some(id) = session {
            if self.sessions.remove(id).is_some() {
                info!("logged out");
            }
        }
    }

    /// Drop every expired session.
    pub fn purge_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.last_seen.elapsed() <= self.ttl);
        before - self.sessions.len()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}
