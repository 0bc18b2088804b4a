//! Admin sessions

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::config::AdminConfig;

/// Decides who may use the admin surface
pub trait SessionGate: Send + Sync {
    /// Exchange a password for a session token
    fn create_session(&self, password: &str) -> Option<String>;

    fn is_authenticated(&self, token: &str) -> bool;
}

/// Single shared password, tokens held in memory until they expire
pub struct PasswordSessions {
    password_digest: Option<[u8; 32]>,
    ttl: Duration,
    sessions: RwLock<HashMap<String, Instant>>,
}

impl PasswordSessions {
    pub fn new(password: Option<&str>, ttl: Duration) -> Self {
        Self {
            password_digest: password.filter(|p| !p.is_empty()).map(digest),
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &AdminConfig) -> Self {
        Self::new(
            config.password.as_deref(),
            Duration::from_secs(config.session_ttl_secs),
        )
    }

    /// Drop a session early
    pub fn revoke(&self, token: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(token);
    }

    /// 256 bits from the OS-seeded thread RNG, hex encoded
    fn issue(&self) -> String {
        let bytes: [u8; 32] = rand::random();
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl SessionGate for PasswordSessions {
    fn create_session(&self, password: &str) -> Option<String> {
        let expected = self.password_digest?;
        if digest(password) != expected {
            tracing::warn!("Rejected admin login");
            return None;
        }

        let token = self.issue();
        let now = Instant::now();
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.retain(|_, issued| now.saturating_duration_since(*issued) < self.ttl);
        sessions.insert(token.clone(), now);
        tracing::info!("Admin session created");
        Some(token)
    }

    fn is_authenticated(&self, token: &str) -> bool {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(token)
            .is_some_and(|issued| Instant::now().saturating_duration_since(*issued) < self.ttl)
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_password_means_no_sessions() {
        let gate = PasswordSessions::new(None, Duration::from_secs(60));
        assert_eq!(gate.create_session(""), None);
        assert_eq!(gate.create_session("anything"), None);

        let gate = PasswordSessions::new(Some(""), Duration::from_secs(60));
        assert_eq!(gate.create_session(""), None);
    }

    #[tokio::test]
    async fn test_login_and_check() {
        let gate = PasswordSessions::new(Some("hunter2"), Duration::from_secs(60));
        assert!(gate.create_session("wrong").is_none());

        let token = gate.create_session("hunter2").unwrap();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(gate.is_authenticated(&token));
        assert!(!gate.is_authenticated("not-a-token"));

        let other = gate.create_session("hunter2").unwrap();
        assert_ne!(token, other);

        gate.revoke(&token);
        assert!(!gate.is_authenticated(&token));
        assert!(gate.is_authenticated(&other));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sessions_expire() {
        let gate = PasswordSessions::new(Some("pw"), Duration::from_secs(60));
        let token = gate.create_session("pw").unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(gate.is_authenticated(&token));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!gate.is_authenticated(&token));
    }
}
