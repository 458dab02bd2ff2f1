//! Credential hashing and bearer-token sessions.

use std::sync::Arc;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::ServiceError;

pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())
        .map_err(|e| ServiceError::Internal(format!("argon2 salt: {}", e)))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::Internal(format!("argon2: {}", e)))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::warn!("Stored password hash could not be parsed: {}", e);
            false
        }
    }
}

#[derive(Clone, Debug)]
struct Session {
    user_id: String,
    expires_at: DateTime<Utc>,
}

/// In-memory bearer sessions; tokens are lost on restart.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl_hours: i64) -> Self {
        SessionStore {
            sessions: Arc::new(DashMap::new()),
            ttl: Duration::hours(ttl_hours.max(1)),
        }
    }

    pub fn create(&self, user_id: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.sessions.insert(
            token.clone(),
            Session {
                user_id: user_id.to_string(),
                expires_at: Utc::now() + self.ttl,
            },
        );
        self.purge_expired();

        token
    }

    pub fn resolve(&self, token: &str) -> Option<String> {
        let now = Utc::now();
        let user_id = {
            let session = self.sessions.get(token)?;
            if session.expires_at > now {
                Some(session.user_id.clone())
            } else {
                None
            }
        };

        if user_id.is_none() {
            self.sessions.remove(token);
        }

        user_id
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    fn purge_expired(&self) {
        let now = Utc::now();
        self.sessions.retain(|_, session| session.expires_at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("hunter2-but-longer").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2-but-longer", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_session_lifecycle() {
        let store = SessionStore::new(1);
        let token = store.create("user-1");

        assert_eq!(store.resolve(&token).as_deref(), Some("user-1"));
        assert!(store.revoke(&token));
        assert_eq!(store.resolve(&token), None);
        assert!(!store.revoke(&token));
    }

    #[test]
    fn test_expired_session_is_dropped() {
        let store = SessionStore::new(1);
        store.sessions.insert(
            "stale".to_string(),
            Session {
                user_id: "user-2".to_string(),
                expires_at: Utc::now() - Duration::minutes(1),
            },
        );

        assert_eq!(store.resolve("stale"), None);
        assert!(!store.sessions.contains_key("stale"));
    }
}
