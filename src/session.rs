use crate::crypto::random_bytes;
use crate::error::TokenError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Bytes of entropy in a session token
pub const SESSION_TOKEN_BYTES: usize = 24;

#[derive(Debug)]
struct SessionEntry {
    username: String,
    created: Instant,
}

/// Maps session tokens handed out at login to usernames.
///
/// Lookups do not consume a token. With a TTL configured, expired entries
/// are dropped when next looked up.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    ttl: Option<Duration>,
}

impl SessionRegistry {
    /// Registry whose sessions never expire
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn create_session(&self, username: &str) -> Result<String, TokenError> {
        let token = URL_SAFE_NO_PAD.encode(random_bytes::<SESSION_TOKEN_BYTES>()?);
        self.sessions.write().insert(
            token.clone(),
            SessionEntry {
                username: username.to_string(),
                created: Instant::now(),
            },
        );
        debug!(user = %username, "session created");
        Ok(token)
    }

    pub fn resolve(&self, token: &str) -> Option<String> {
        {
            let sessions = self.sessions.read();
            let entry = sessions.get(token)?;
            match self.ttl {
                Some(ttl) if entry.created.elapsed() >= ttl => {}
                _ => return Some(entry.username.clone()),
            }
        }

        self.sessions.write().remove(token);
        debug!("expired session dropped");
        None
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_create_and_resolve() {
        let registry = SessionRegistry::new();
        let token = registry.create_session("user1").unwrap();

        assert_eq!(registry.resolve(&token).as_deref(), Some("user1"));
        assert_eq!(registry.resolve(&token).as_deref(), Some("user1"));
        assert_eq!(registry.resolve("garbage"), None);
    }

    #[test]
    fn test_tokens_are_printable_and_unique() {
        let registry = SessionRegistry::new();
        let tokens: HashSet<String> = (0..100)
            .map(|_| registry.create_session("user1").unwrap())
            .collect();

        assert_eq!(tokens.len(), 100);
        for token in &tokens {
            assert_eq!(token.len(), 32);
            assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn test_expired_session_dropped() {
        let registry = SessionRegistry::with_ttl(Some(Duration::ZERO));
        let token = registry.create_session("user1").unwrap();

        assert_eq!(registry.resolve(&token), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_sessions() {
        let registry = Arc::new(SessionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let user = format!("user{i}");
                    let token = registry.create_session(&user).unwrap();
                    assert_eq!(registry.resolve(&token), Some(user));
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 8);
    }
}
